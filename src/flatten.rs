//! ルート / コンポーネントと API 呼び出しを結合して出力行を作る。

use std::collections::HashSet;
use tracing::{debug, info};

use crate::api::ApiCatalog;
use crate::components::{component_name, ComponentGraph};
use crate::model::{EndpointKey, ResultRow, RouteNode};
use crate::routes::{RouteRelations, RouteTable};
use crate::symbols::UrlConstantCache;
use crate::url::{has_placeholder, normalize_url};

/// コンポーネントから到達できた API 呼び出し 1 件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachedCall {
    pub key: EndpointKey,
    /// 子コンポーネント経由なら、その import を宣言していたコンポーネント
    pub via: Option<String>,
}

pub struct Flattener<'a> {
    graph: &'a ComponentGraph,
    catalog: &'a ApiCatalog,
    constants: &'a UrlConstantCache,
    max_depth: usize,
}

impl<'a> Flattener<'a> {
    pub fn new(
        graph: &'a ComponentGraph,
        catalog: &'a ApiCatalog,
        constants: &'a UrlConstantCache,
        max_depth: usize,
    ) -> Self {
        Flattener {
            graph,
            catalog,
            constants,
            max_depth,
        }
    }

    /// ルートモード: ルートごとに (ルート, API 呼び出し) の行を作る。
    ///
    /// コンポーネント参照を持たないルートは行を出さない。
    /// 参照先のファイルが無いルートは「API 呼び出しなし」の 1 行になる。
    pub fn flatten_routes(&self, routes: &RouteTable, relations: &RouteRelations) -> Vec<ResultRow> {
        info!("最終結果の構築を開始");
        let mut rows = Vec::new();

        for route in routes.iter() {
            let Some(component) = &route.component else {
                debug!("コンポーネントの無いルートをスキップ: {}", route.name);
                continue;
            };
            let parent = relations
                .parent_of(&route.name)
                .or(route.parent.as_deref())
                .unwrap_or_default()
                .to_string();
            let calls = self.collect_calls(component);
            let child_sources = child_sources(&calls);

            let base = ResultRow {
                subject: route.name.clone(),
                route_path: route.path.clone(),
                parent,
                depth: route.depth,
                kind: route_kind(route),
                component_path: component.clone(),
                source_file: route.source_file.clone(),
                child_components: join_names(child_sources.iter().map(|p| component_name(p))),
                child_component_paths: child_sources.join(", "),
                component_imports: self.import_names(component),
                ..ResultRow::default()
            };

            let before = rows.len();
            for call in &calls {
                if let Some(row) = self.call_row(&base, call) {
                    rows.push(row);
                }
            }
            if rows.len() == before {
                rows.push(base);
            }
        }

        info!("{} 行を生成しました", rows.len());
        rows
    }

    /// コンポーネントモード: 階層順にコンポーネントごとの直接の API 呼び出しを並べる
    pub fn flatten_components(&self) -> Vec<ResultRow> {
        let mut rows = Vec::new();
        for node in self.graph.level_order() {
            let parent = node
                .parents
                .iter()
                .next()
                .map(|&id| self.graph.node(id).path.clone())
                .unwrap_or_default();
            let base = ResultRow {
                subject: node.path.clone(),
                parent,
                depth: node.depth,
                kind: node.kind().to_string(),
                component_path: node.path.clone(),
                component_imports: join_names(node.imports.iter().map(|i| i.name.as_str())),
                ..ResultRow::default()
            };

            let before = rows.len();
            for key in &node.api_calls {
                let call = ReachedCall {
                    key: key.clone(),
                    via: None,
                };
                if let Some(row) = self.call_row(&base, &call) {
                    rows.push(row);
                }
            }
            if rows.len() == before {
                rows.push(base);
            }
        }
        rows
    }

    /// コンポーネント自身と、子コンポーネントから到達できる API 呼び出し。
    /// (関数, モジュール) が同じ呼び出しは最初に見つけたものだけ残す。
    pub fn collect_calls(&self, component: &str) -> Vec<ReachedCall> {
        let mut calls = Vec::new();
        let mut seen = HashSet::new();
        let mut path = Vec::new();
        if let Some(id) = self.graph.id_of(component) {
            self.walk(id, 0, &mut path, &mut seen, &mut calls);
        }
        calls
    }

    fn walk(
        &self,
        id: usize,
        depth: usize,
        path: &mut Vec<usize>,
        seen: &mut HashSet<EndpointKey>,
        calls: &mut Vec<ReachedCall>,
    ) {
        // 同じ経路上のノードには再突入しない
        if depth > self.max_depth || path.contains(&id) {
            return;
        }
        let node = self.graph.node(id);
        path.push(id);

        for key in &node.api_calls {
            if seen.insert(key.clone()) {
                calls.push(ReachedCall {
                    key: key.clone(),
                    via: (depth > 0).then(|| node.path.clone()),
                });
            }
        }
        for &child in &node.children {
            self.walk(child, depth + 1, path, seen, calls);
        }

        path.pop();
    }

    fn call_row(&self, base: &ResultRow, call: &ReachedCall) -> Option<ResultRow> {
        let endpoint = self.catalog.get(&call.key)?;
        let url = normalize_url(endpoint.url.value(), self.constants, |name| {
            self.catalog.find_string_constant(name)
        });
        let url_resolved = endpoint.url.is_resolved() || (!url.is_empty() && !has_placeholder(&url));

        Some(ResultRow {
            api_function: call.key.function.clone(),
            api_module: call.key.module.clone(),
            method: endpoint.method.clone().unwrap_or_default(),
            url,
            url_resolved,
            description: endpoint.description.clone(),
            has_api_calls: true,
            from_child: call.via.is_some(),
            child_source_path: call.via.clone().unwrap_or_default(),
            ..base.clone()
        })
    }

    fn import_names(&self, component: &str) -> String {
        self.graph
            .get(component)
            .map(|node| join_names(node.imports.iter().map(|i| i.name.as_str())))
            .unwrap_or_default()
    }
}

fn route_kind(route: &RouteNode) -> String {
    format!("level {} route", route.depth)
}

fn child_sources(calls: &[ReachedCall]) -> Vec<&str> {
    let mut sources: Vec<&str> = Vec::new();
    for via in calls.iter().filter_map(|c| c.via.as_deref()) {
        if !sources.contains(&via) {
            sources.push(via);
        }
    }
    sources
}

fn join_names<'n>(names: impl Iterator<Item = &'n str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ParsedFunction, ParsedModule};
    use crate::components::{ComponentImport, ParsedComponent};
    use crate::model::Resolution;
    use std::collections::BTreeMap;

    fn catalog() -> ApiCatalog {
        let mut catalog = ApiCatalog::new();
        let function = |name: &str, url: &str| ParsedFunction {
            name: name.to_string(),
            url: Resolution::Resolved(url.to_string()),
            method: None,
            description: name.to_string(),
        };
        catalog.ingest(
            "/api/list.js",
            ParsedModule {
                functions: vec![function("getList", "/api/list"), function("getItem", "/api/item")],
                ..ParsedModule::default()
            },
        );
        catalog
    }

    fn component(calls: &[&str], imports: &[&str]) -> ParsedComponent {
        ParsedComponent {
            api_calls: calls.iter().map(|f| EndpointKey::new(*f, "/api/list.js")).collect(),
            imports: imports
                .iter()
                .map(|p| ComponentImport {
                    name: component_name(p).to_string(),
                    path: p.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn child_calls_are_attributed_to_declaring_component() {
        let graph = ComponentGraph::from_parsed(BTreeMap::from([
            ("/views/page.vue".to_string(), component(&["getList"], &["/views/Card.vue"])),
            ("/views/Card.vue".to_string(), component(&["getList", "getItem"], &["/views/page.vue"])),
        ]));
        let catalog = catalog();
        let constants = UrlConstantCache::new();
        let flattener = Flattener::new(&graph, &catalog, &constants, 3);

        let calls = flattener.collect_calls("/views/page.vue");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].via, None);
        assert_eq!(calls[1].key.function, "getItem");
        assert_eq!(calls[1].via.as_deref(), Some("/views/Card.vue"));
    }

    #[test]
    fn traversal_stops_at_max_depth() {
        let graph = ComponentGraph::from_parsed(BTreeMap::from([
            ("/views/a.vue".to_string(), component(&[], &["/views/b.vue"])),
            ("/views/b.vue".to_string(), component(&[], &["/views/c.vue"])),
            ("/views/c.vue".to_string(), component(&["getList"], &[])),
        ]));
        let catalog = catalog();
        let constants = UrlConstantCache::new();

        assert_eq!(Flattener::new(&graph, &catalog, &constants, 2).collect_calls("/views/a.vue").len(), 1);
        assert!(Flattener::new(&graph, &catalog, &constants, 1).collect_calls("/views/a.vue").is_empty());
    }

    #[test]
    fn components_without_calls_still_get_a_row() {
        let graph = ComponentGraph::from_parsed(BTreeMap::from([
            ("/views/a.vue".to_string(), component(&["getList"], &["/views/b.vue"])),
            ("/views/b.vue".to_string(), component(&[], &[])),
        ]));
        let catalog = catalog();
        let constants = UrlConstantCache::new();
        let rows = Flattener::new(&graph, &catalog, &constants, 3).flatten_components();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].subject, "/views/a.vue");
        assert_eq!(rows[0].kind, "root");
        assert_eq!(rows[0].url, "/api/list");
        assert_eq!(rows[0].component_imports, "b");
        assert_eq!(rows[1].subject, "/views/b.vue");
        assert_eq!(rows[1].parent, "/views/a.vue");
        assert_eq!(rows[1].kind, "level 2");
        assert!(!rows[1].has_api_calls);
    }
}
