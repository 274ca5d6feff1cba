//! ルート定義ファイルからルート表を組み立て、親子関係を推定する。

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::config::AnalyzerConfig;
use crate::model::{ComponentRef, ComponentRefKind, RawDeclaration, RouteNode};
use crate::parser::extract_route_declarations;
use crate::resolver::{is_relative, normalize_separators, ProjectPaths};
use crate::scanner::strip_interpolations;

/// 子ルートの path を親の path と結合する。
///
/// - 子が `/` 始まりなら親に関係なく子をそのまま使う
/// - 親が `/` なら `/` + 子
/// - それ以外は `親/子`
pub fn build_full_path(parent: &str, child: &str) -> String {
    if child.starts_with('/') {
        return child.to_string();
    }
    if parent == "/" {
        return format!("/{child}");
    }
    format!("{parent}/{child}")
}

/// 親を持たないルートの深さ: `/` は 1、それ以外は空でないセグメント数 (最小 1)
pub fn route_depth(path: &str) -> u32 {
    if path == "/" {
        return 1;
    }
    let segments = path.split('/').filter(|s| !s.is_empty()).count();
    u32::try_from(segments).unwrap_or(u32::MAX).max(1)
}

/// ルート名をキーにしたルート表。再宣言は後勝ち。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RouteTable {
    routes: BTreeMap<String, RouteNode>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登録して、上書きされた古いエントリを返す
    pub fn insert(&mut self, node: RouteNode) -> Option<RouteNode> {
        self.routes.insert(node.name.clone(), node)
    }

    pub fn get(&self, name: &str) -> Option<&RouteNode> {
        self.routes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// 名前順
    pub fn iter(&self) -> impl Iterator<Item = &RouteNode> {
        self.routes.values()
    }

    /// path が一致する最初のルート (名前順)
    pub fn find_by_path(&self, path: &str) -> Option<&RouteNode> {
        self.routes.values().find(|r| r.path == path)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// 親ルートの情報 (children の再帰用)
struct ParentContext<'p> {
    name: Option<&'p str>,
    path: &'p str,
    depth: u32,
}

pub struct RouteGraphBuilder<'a> {
    paths: &'a ProjectPaths,
    config: &'a AnalyzerConfig,
}

impl<'a> RouteGraphBuilder<'a> {
    pub fn new(paths: &'a ProjectPaths, config: &'a AnalyzerConfig) -> Self {
        RouteGraphBuilder { paths, config }
    }

    /// 設定の順 (内側のファイルが先) にルート定義ファイルを解析する
    pub fn build(&self) -> RouteTable {
        let mut table = RouteTable::new();
        info!("ルート定義ファイルの解析を開始");

        for rel in &self.config.paths.routes.search_paths {
            let source_file = root_relative(rel);
            let file = self.paths.to_fs(&source_file);
            if !file.is_file() {
                debug!("ルート定義ファイルが存在しません: {source_file}");
                continue;
            }
            match fs::read_to_string(&file) {
                Ok(source) => {
                    info!("ルート定義ファイルを解析: {source_file}");
                    self.parse_source(&mut table, &source, &source_file);
                }
                Err(err) => warn!("ルート定義ファイルを読み込めません: {source_file} - {err}"),
            }
        }

        info!("ルートを {} 件発見", table.len());
        table
    }

    /// 1 ファイル分のソースを解析してルート表に追加する
    pub fn parse_source(&self, table: &mut RouteTable, source: &str, source_file: &str) {
        let declarations = extract_route_declarations(
            source,
            &self.paths.to_fs(source_file),
            &self.config.paths.routes.loader_functions,
        );
        for declaration in &declarations {
            self.insert_declaration(table, declaration, None, source_file);
        }
    }

    fn insert_declaration(
        &self,
        table: &mut RouteTable,
        declaration: &RawDeclaration,
        parent: Option<&ParentContext<'_>>,
        source_file: &str,
    ) {
        let path = match parent {
            Some(p) => build_full_path(p.path, &declaration.path),
            None => declaration.path.clone(),
        };
        let depth = parent.map_or_else(|| route_depth(&path), |p| p.depth + 1);
        let component = declaration
            .component
            .as_ref()
            .and_then(|reference| self.normalize_component(reference, source_file));

        if let Some(name) = &declaration.name {
            debug!(
                "ルート: {name} ({path}) -> {}",
                component.as_deref().unwrap_or("-")
            );
            let previous = table.insert(RouteNode {
                name: name.clone(),
                path: path.clone(),
                component,
                source_file: source_file.to_string(),
                depth,
                parent: parent.and_then(|p| p.name).map(str::to_string),
            });
            if let Some(previous) = previous {
                debug!("ルート {name} を上書き (元: {})", previous.source_file);
            }
        }

        let context = ParentContext {
            name: declaration.name.as_deref(),
            path: &path,
            depth,
        };
        for child in &declaration.children {
            self.insert_declaration(table, child, Some(&context), source_file);
        }
    }

    /// コンポーネント参照を src ルート相対のファイルパスに正規化する。
    ///
    /// 1) `${...}` を空文字に
    /// 2) エイリアス / 相対 / ローダー規約でルート相対に
    /// 3) `/modules` → `/views/modules` のような書き換え
    /// 4) 拡張子が無ければ `<path>/index.vue` を優先、無ければ `<path>.vue`
    pub fn normalize_component(&self, reference: &ComponentRef, source_file: &str) -> Option<String> {
        let views = &self.config.paths.views;
        let specifier = normalize_separators(strip_interpolations(&reference.specifier).trim());
        if specifier.is_empty() {
            return None;
        }

        let mut path = if let Some(rest) = specifier.strip_prefix(views.alias.as_str()) {
            format!("/{}", rest.trim_start_matches('/'))
        } else if is_relative(&specifier) {
            let dir = match source_file.rfind('/') {
                Some(idx) => &source_file[..idx],
                None => "",
            };
            self.paths.relativize(&self.paths.to_fs(dir).join(&specifier))?
        } else {
            format!("/{}", specifier.trim_start_matches('/'))
        };

        for mapping in &views.mappings {
            if let Some(rest) = strip_segment_prefix(&path, &mapping.from) {
                path = format!("{}{}", mapping.to.trim_end_matches('/'), rest);
                break;
            }
        }

        let views_root = self.paths.views_root();
        if reference.kind == ComponentRefKind::Loader && strip_segment_prefix(&path, views_root).is_none() {
            path = format!("{views_root}{path}");
        }

        let path = path.trim_end_matches('/').to_string();
        let extension = self.config.component_extension();
        if path.ends_with(&extension) {
            return Some(path);
        }
        if has_file_extension(&path) && self.paths.exists(&path) {
            return Some(path);
        }

        let index = format!("{path}/index{extension}");
        if self.paths.exists(&index) {
            return Some(index);
        }
        Some(format!("{path}{extension}"))
    }
}

fn root_relative(rel: &str) -> String {
    format!("/{}", normalize_separators(rel).trim_start_matches('/'))
}

/// `prefix` がセグメント境界で一致するなら残りを返す
fn strip_segment_prefix<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    let prefix = prefix.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

fn has_file_extension(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .is_some_and(|last| last.contains('.'))
}

fn re_navigation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?:\$router|\brouter)\s*\.\s*(?:push|replace)\s*\(\s*(?:['"`]([^'"`]+)['"`]|\{\s*(name|path)\s*:\s*['"`]([^'"`]+)['"`])"#,
        )
        .expect("valid regex")
    })
}

/// 親子関係をどの方法で見つけたか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeSource {
    /// children ブロック
    Declared,
    /// 既存ルートの path が前方一致
    PathPrefix,
    /// 親コンポーネント内の `$router.push` / `replace`
    Navigation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentEdge {
    pub parent: String,
    pub source: EdgeSource,
}

/// 子ルート名 → 親ルート。1 つの子に親は 1 つだけで、先に見つけた方法が勝つ。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RouteRelations {
    edges: BTreeMap<String, ParentEdge>,
}

impl RouteRelations {
    pub fn new() -> Self {
        Self::default()
    }

    /// 3 つの方法を優先順に適用する
    pub fn infer(table: &RouteTable, paths: &ProjectPaths) -> Self {
        let mut relations = Self::new();
        info!("親子関係の分析を開始");

        // 1) children で明示された親
        for route in table.iter() {
            if let Some(parent) = &route.parent {
                if relations.link(&route.name, parent, EdgeSource::Declared) {
                    debug!("宣言された親子関係: {parent} -> {}", route.name);
                }
            }
        }

        // 2) path の前方一致 (長い親から)
        for route in table.iter() {
            if relations.contains(&route.name) {
                continue;
            }
            let segments: Vec<&str> = route.path.split('/').filter(|s| !s.is_empty()).collect();
            for len in (1..segments.len()).rev() {
                let parent_path = format!("/{}", segments[..len].join("/"));
                let parent = table
                    .iter()
                    .find(|candidate| candidate.path == parent_path && candidate.name != route.name);
                if let Some(parent) = parent {
                    relations.link(&route.name, &parent.name, EdgeSource::PathPrefix);
                    debug!("推定した親子関係: {} -> {}", parent.name, route.name);
                    break;
                }
            }
        }

        // 3) コンポーネント内の画面遷移
        for route in table.iter() {
            let Some(component) = &route.component else {
                continue;
            };
            let file = paths.to_fs(component);
            if !file.is_file() {
                continue;
            }
            let source = match fs::read_to_string(&file) {
                Ok(source) => source,
                Err(err) => {
                    warn!("コンポーネントを読み込めません: {component} - {err}");
                    continue;
                }
            };
            for target in navigation_targets(&source, table) {
                if relations.link(&target, &route.name, EdgeSource::Navigation) {
                    debug!("画面遷移から推定した親子関係: {} -> {target}", route.name);
                }
            }
        }

        info!("親子関係を {} 件発見", relations.len());
        relations
    }

    /// まだ親が無い場合だけ登録する
    pub fn link(&mut self, child: &str, parent: &str, source: EdgeSource) -> bool {
        if child == parent || self.edges.contains_key(child) {
            return false;
        }
        self.edges.insert(
            child.to_string(),
            ParentEdge {
                parent: parent.to_string(),
                source,
            },
        );
        true
    }

    pub fn parent_of(&self, child: &str) -> Option<&str> {
        self.edges.get(child).map(|e| e.parent.as_str())
    }

    pub fn edge(&self, child: &str) -> Option<&ParentEdge> {
        self.edges.get(child)
    }

    pub fn contains(&self, child: &str) -> bool {
        self.edges.contains_key(child)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// コンポーネントのソースから遷移先のルート名を集める (ルート表にあるものだけ)
fn navigation_targets(source: &str, table: &RouteTable) -> Vec<String> {
    re_navigation()
        .captures_iter(source)
        .filter_map(|caps| {
            if let Some(path) = caps.get(1) {
                return table.find_by_path(path.as_str()).map(|r| r.name.clone());
            }
            let value = caps.get(3)?.as_str();
            match caps.get(2)?.as_str() {
                "name" => table.contains(value).then(|| value.to_string()),
                _ => table.find_by_path(value).map(|r| r.name.clone()),
            }
        })
        .collect()
}
