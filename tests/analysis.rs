mod common;

use common::{home_project, Project, LOADER};
use pretty_assertions::assert_eq;
use spa_route_api_analyzer::report;
use spa_route_api_analyzer::routes::EdgeSource;
use spa_route_api_analyzer::{AnalyzerConfig, OutputMode};

#[test]
fn home_route_is_joined_with_its_api_call() {
    let project = home_project();
    let analysis = project.analyze(OutputMode::Routes);

    assert_eq!(analysis.rows.len(), 1);
    let row = &analysis.rows[0];
    assert_eq!(row.subject, "home");
    assert_eq!(row.route_path, "/home");
    assert_eq!(row.depth, 1);
    assert_eq!(row.parent, "");
    assert_eq!(row.kind, "level 1 route");
    assert_eq!(row.component_path, "/views/modules/home/index.vue");
    assert_eq!(row.api_function, "getList");
    assert_eq!(row.api_module, "/api/list.js");
    assert_eq!(row.url, "/api/list");
    assert!(row.url_resolved);
    assert_eq!(row.description, "一覧を取得");
    assert_eq!(row.source_file, "/router/routes.js");
    assert!(row.has_api_calls);
    assert!(!row.from_child);
}

#[test]
fn rerunning_gives_identical_rows() {
    let project = home_project();
    let first = project.analyze(OutputMode::Routes);
    let second = project.analyze(OutputMode::Routes);
    assert_eq!(first.rows, second.rows);
}

#[test]
fn missing_component_gives_one_row_and_no_component_gives_none() {
    let project = Project::new();
    project.write(
        "router/routes.js",
        &format!(
            "{LOADER}
export default [
  {{ path: '/ghost', name: 'ghost', component: _import('/modules/ghost') }},
  {{ path: '/', name: 'root', redirect: '/ghost' }},
]
"
        ),
    );
    let analysis = project.analyze(OutputMode::Routes);

    assert_eq!(analysis.routes.len(), 2);
    assert_eq!(analysis.rows.len(), 1);
    let row = &analysis.rows[0];
    assert_eq!(row.subject, "ghost");
    assert_eq!(row.component_path, "/views/modules/ghost.vue");
    assert!(!row.has_api_calls);
    assert_eq!(row.api_function, "");
}

#[test]
fn calls_from_child_components_name_the_declaring_child() {
    let project = home_project();
    project
        .write(
            "views/modules/home/index.vue",
            "<script>
import { getList } from '@/api/list'
import Card from './components/Card.vue'
export default { components: { Card } }
</script>
",
        )
        .write(
            "views/modules/home/components/Card.vue",
            "<script>
import { getList, getItem } from '@/api/list'
export default {}
</script>
",
        )
        .write(
            "api/list.js",
            "// 一覧を取得
export function getList() {
  return request({ url: '/api/list' })
}

/**
 * 詳細を取得
 * @param id ID
 */
export function getItem(id) {
  return request({ url: '/api/item/' + id, method: 'get' })
}
",
        );

    let analysis = project.analyze(OutputMode::Routes);
    let rows = &analysis.rows;
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0].api_function, "getList");
    assert!(!rows[0].from_child);

    assert_eq!(rows[1].api_function, "getItem");
    assert_eq!(rows[1].method, "GET");
    assert_eq!(rows[1].url, "/api/item/{id}");
    assert!(!rows[1].url_resolved);
    assert!(rows[1].description.starts_with("詳細を取得"));
    assert!(rows[1].from_child);
    assert_eq!(rows[1].child_source_path, "/views/modules/home/components/Card.vue");
    assert_eq!(rows[1].child_components, "Card");
    assert_eq!(rows[1].child_component_paths, "/views/modules/home/components/Card.vue");
    assert_eq!(rows[1].component_imports, "Card");
}

#[test]
fn urls_are_resolved_through_base_url_constants() {
    let project = home_project();
    project
        .write(
            "api/baseUrl.js",
            "export const BASE_API = '/api/v1'
export const gateway = () => {
  return process.env.GATEWAY ? '/gw' : ''
}
",
        )
        .write(
            "api/list.js",
            "import { BASE_API, gateway } from './baseUrl'

export function getList() {
  return request({ url: `${BASE_API}/list`, method: 'post' })
}

export const getOrders = () => request.get(gateway() + '/orders')

export const getUser = id => request({ url: `${BASE_API}/user/${id}` })
",
        )
        .write(
            "views/modules/home/index.vue",
            "<script>
import { getList, getOrders, getUser } from '@/api/list'
</script>
",
        );

    let analysis = project.analyze(OutputMode::Routes);
    let by_function = |name: &str| {
        analysis
            .rows
            .iter()
            .find(|row| row.api_function == name)
            .unwrap_or_else(|| panic!("row for {name}"))
    };

    let list = by_function("getList");
    assert_eq!(list.url, "/api/v1/list");
    assert_eq!(list.method, "POST");
    assert!(list.url_resolved);

    let orders = by_function("getOrders");
    assert_eq!(orders.url, "/gw/orders");
    assert_eq!(orders.method, "GET");
    assert!(orders.url_resolved);

    let user = by_function("getUser");
    assert_eq!(user.url, "/api/v1/user/{id}");
    assert!(!user.url_resolved);
}

#[test]
fn fallback_constants_come_from_configuration() {
    let project = home_project();
    project.write(
        "api/list.js",
        "export function getList() {
  return request({ url: LEGACY_API + '/list' })
}
",
    );
    let config = AnalyzerConfig::from_overrides(serde_json::json!({
        "urlConstants": { "mappings": { "LEGACY_API": "/legacy" } }
    }))
    .unwrap();

    let analysis = project.analyze_with(config, OutputMode::Routes);
    assert_eq!(analysis.rows[0].url, "/legacy/list");
    assert!(analysis.rows[0].url_resolved);

    let without = project.analyze(OutputMode::Routes);
    assert_eq!(without.rows[0].url, "{LEGACY_API}/list");
    assert!(!without.rows[0].url_resolved);
}

#[test]
fn relations_follow_children_then_path_prefix_then_navigation() {
    let project = Project::new();
    project
        .write(
            "router/routes.js",
            &format!(
                "{LOADER}
export default [
  {{
    path: '/system',
    name: 'system',
    component: _import('/modules/system/index'),
    children: [
      {{ path: 'user', name: 'system-user', component: _import('/modules/system/user') }},
    ],
  }},
  {{ path: '/system/role', name: 'system-role', component: _import('/modules/system/role') }},
  {{ path: '/detail', name: 'detail', component: _import('/modules/detail') }},
]
"
            ),
        )
        .write(
            "views/modules/system/index.vue",
            "<script>
export default {
  methods: { open() { this.$router.push({ name: 'detail' }) } }
}
</script>
",
        )
        .write("views/modules/system/user.vue", "<template />")
        .write("views/modules/system/role.vue", "<template />")
        .write("views/modules/detail.vue", "<template />");

    let analysis = project.analyze(OutputMode::Routes);
    let relations = &analysis.relations;

    let user = relations.edge("system-user").unwrap();
    assert_eq!(user.parent, "system");
    assert_eq!(user.source, EdgeSource::Declared);

    let role = relations.edge("system-role").unwrap();
    assert_eq!(role.parent, "system");
    assert_eq!(role.source, EdgeSource::PathPrefix);

    let detail = relations.edge("detail").unwrap();
    assert_eq!(detail.parent, "system");
    assert_eq!(detail.source, EdgeSource::Navigation);

    assert_eq!(relations.parent_of("system"), None);

    let user_route = analysis.routes.get("system-user").unwrap();
    assert_eq!(user_route.path, "/system/user");
    assert_eq!(user_route.depth, 2);

    let user_row = analysis.rows.iter().find(|r| r.subject == "system-user").unwrap();
    assert_eq!(user_row.parent, "system");
    assert_eq!(user_row.kind, "level 2 route");
    assert!(!user_row.has_api_calls);
}

#[test]
fn component_cycles_terminate() {
    let project = Project::new();
    project
        .write("views/a.vue", "<script>\nimport B from './b.vue'\n</script>\n")
        .write("views/b.vue", "<script>\nimport A from './a.vue'\n</script>\n");

    let analysis = project.analyze(OutputMode::Components);
    assert_eq!(analysis.graph.len(), 2);
    assert_eq!(analysis.rows.len(), 2);
    assert!(analysis.rows.iter().all(|row| !row.has_api_calls));
}

#[test]
fn components_mode_lists_every_component_by_level() {
    let project = home_project();
    project
        .write(
            "views/modules/home/index.vue",
            "<script>
import { getList } from '@/api/list'
import Card from './Card.vue'
</script>
",
        )
        .write("views/modules/home/Card.vue", "<template />");

    let analysis = project.analyze(OutputMode::Components);
    assert!(analysis.routes.is_empty());

    let subjects: Vec<&str> = analysis.rows.iter().map(|r| r.subject.as_str()).collect();
    assert_eq!(
        subjects,
        vec!["/views/modules/home/index.vue", "/views/modules/home/Card.vue"]
    );
    assert_eq!(analysis.rows[0].kind, "root");
    assert_eq!(analysis.rows[0].api_function, "getList");
    assert_eq!(analysis.rows[1].kind, "level 2");
    assert_eq!(analysis.rows[1].parent, "/views/modules/home/index.vue");

    let out = project.root().join("components.csv");
    report::write_csv(&out, &analysis.rows, OutputMode::Components).unwrap();
    let csv = std::fs::read_to_string(&out).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("filePath,kind,parentComponent"));
    assert!(lines.next().unwrap().starts_with("\"/views/modules/home/index.vue\",\"root\""));
}

#[test]
fn route_log_contains_routes_and_relations() {
    let project = home_project();
    let analysis = project.analyze(OutputMode::Routes);

    let out = project.root().join("routes.json");
    report::write_route_log(&out, &analysis.routes, &analysis.relations).unwrap();
    let log: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();

    assert_eq!(log["routes"]["home"]["path"], "/home");
    assert_eq!(log["routes"]["home"]["component"], "/views/modules/home/index.vue");
    assert_eq!(log["relations"], serde_json::json!({}));
}

#[test]
fn broken_route_file_falls_back_to_scanning() {
    let project = home_project();
    project.write(
        "router/routes.js",
        &format!(
            "{LOADER}
export default [
  {{ path: '/home', name: 'home', component: _import('/modules/home') }},
]
const broken = {{{{
"
        ),
    );

    let analysis = project.analyze(OutputMode::Routes);
    let home = analysis.routes.get("home").unwrap();
    assert_eq!(home.component.as_deref(), Some("/views/modules/home/index.vue"));
}

#[test]
fn custom_api_directory_is_scanned_for_endpoints() {
    let project = Project::new();
    project
        .write(
            "services/user.js",
            "export function getUser() {
  return request({ url: '/user', method: 'get' })
}
",
        )
        .write(
            "views/a.vue",
            "<script>\nimport { getUser } from '@/services/user'\n</script>\n",
        );
    let config = AnalyzerConfig::from_overrides(serde_json::json!({
        "paths": { "api": { "directories": ["services"] } }
    }))
    .unwrap();

    let analysis = project.analyze_with(config, OutputMode::Components);
    assert_eq!(analysis.catalog.len(), 1);
    assert_eq!(analysis.rows.len(), 1);
    let row = &analysis.rows[0];
    assert_eq!(row.subject, "/views/a.vue");
    assert_eq!(row.api_function, "getUser");
    assert_eq!(row.api_module, "/services/user.js");
    assert_eq!(row.url, "/user");
    assert_eq!(row.method, "GET");
    assert!(row.has_api_calls);
}

#[test]
fn relative_api_import_is_matched_to_the_catalog() {
    let project = home_project();
    project.write(
        "views/modules/home/index.vue",
        "<script>\nimport { getList } from '../../../api/list'\n</script>\n",
    );

    let analysis = project.analyze(OutputMode::Routes);
    assert_eq!(analysis.rows.len(), 1);
    let row = &analysis.rows[0];
    assert_eq!(row.api_function, "getList");
    assert_eq!(row.api_module, "/api/list.js");
    assert_eq!(row.url, "/api/list");
    assert!(row.has_api_calls);
}
