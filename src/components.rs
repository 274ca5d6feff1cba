//! コンポーネントの import グラフ。
//!
//! ノードは path 順に並んだ配列 (アリーナ) で持ち、辺はインデックスの集合。
//! 深さは全ノードと辺が揃ってから反復的な DFS で計算する。

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::api::ApiCatalog;
use crate::config::AnalyzerConfig;
use crate::model::EndpointKey;
use crate::resolver::ProjectPaths;

fn re_named_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"import\s+(?:[A-Za-z_$][\w$]*\s*,\s*)?\{([^}]+)\}\s*from\s*['"`]([^'"`]+)['"`]"#)
            .expect("valid regex")
    })
}

fn re_default_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"import\s+([A-Za-z_$][\w$]*)\s+from\s*['"`]([^'"`]+)['"`]"#).expect("valid regex")
    })
}

fn re_async_component() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"['"]?([A-Za-z_$][\w$-]*)['"]?\s*:\s*\(\s*\)\s*=>\s*import\s*\(\s*['"`]([^'"`]+)['"`]\s*\)"#,
        )
        .expect("valid regex")
    })
}

/// 深さから決まる分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    /// 親を持たない
    Root,
    /// 親からの最長距離 (1 以上)
    Nested(u32),
}

impl ComponentKind {
    pub fn from_depth(depth: u32) -> Self {
        if depth == 0 {
            ComponentKind::Root
        } else {
            ComponentKind::Nested(depth)
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Root => write!(f, "root"),
            ComponentKind::Nested(depth) => write!(f, "level {}", depth + 1),
        }
    }
}

/// 子コンポーネントの import (`import Card from './Card.vue'`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentImport {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentNode {
    pub path: String,
    /// 直接 import している API 関数
    pub api_calls: Vec<EndpointKey>,
    pub imports: Vec<ComponentImport>,
    pub children: BTreeSet<usize>,
    pub parents: BTreeSet<usize>,
    /// 0 = ルート
    pub depth: u32,
}

impl ComponentNode {
    pub fn kind(&self) -> ComponentKind {
        ComponentKind::from_depth(self.depth)
    }
}

pub fn component_name(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
}

/// 1 ファイル分の解析結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedComponent {
    pub api_calls: Vec<EndpointKey>,
    pub imports: Vec<ComponentImport>,
}

/// コンポーネントファイルから API import と子コンポーネント import を拾う
pub struct ComponentParser<'a> {
    paths: &'a ProjectPaths,
    config: &'a AnalyzerConfig,
    catalog: &'a ApiCatalog,
}

impl<'a> ComponentParser<'a> {
    pub fn new(paths: &'a ProjectPaths, config: &'a AnalyzerConfig, catalog: &'a ApiCatalog) -> Self {
        ComponentParser { paths, config, catalog }
    }

    pub fn parse(&self, rel: &str, source: &str) -> ParsedComponent {
        ParsedComponent {
            api_calls: self.api_calls(rel, source),
            imports: self.child_imports(rel, source),
        }
    }

    /// `import { a, b as c } from '@/api/x'` をエンドポイントキャッシュと突き合わせる
    fn api_calls(&self, rel: &str, source: &str) -> Vec<EndpointKey> {
        let extensions = self.config.api_extensions();
        let mut calls: Vec<EndpointKey> = Vec::new();

        for caps in re_named_import().captures_iter(source) {
            let (Some(names), Some(specifier)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let modules: Vec<String> = self
                .paths
                .module_candidates(specifier.as_str(), rel, &extensions)
                .into_iter()
                .filter(|candidate| self.catalog.has_module(candidate))
                .collect();
            if modules.is_empty() {
                continue;
            }

            for name in imported_names(names.as_str()) {
                let found = modules
                    .iter()
                    .find_map(|module| self.catalog.lookup(name, module))
                    .map(|endpoint| endpoint.key.clone());
                match found {
                    Some(key) if !calls.contains(&key) => {
                        debug!("  API import: {rel} -> {key}");
                        calls.push(key);
                    }
                    Some(_) => {}
                    None => debug!("  キャッシュに無い API 関数: {name} ({})", specifier.as_str()),
                }
            }
        }
        calls
    }

    /// 同じフレームワークの子コンポーネント (実在するものだけ)
    fn child_imports(&self, rel: &str, source: &str) -> Vec<ComponentImport> {
        let extension = [self.config.component_extension()];
        let views_root = self.paths.views_root();
        let mut imports: Vec<ComponentImport> = Vec::new();

        let found = re_default_import()
            .captures_iter(source)
            .chain(re_async_component().captures_iter(source));
        for caps in found {
            let (Some(name), Some(specifier)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let specifier = specifier.as_str();
            if self.is_skipped(specifier, views_root) {
                continue;
            }
            let Some(path) = self.paths.resolve_module(specifier, rel, &extension) else {
                debug!("  子コンポーネントが見つかりません: {specifier} ({rel})");
                continue;
            };
            if path == rel || imports.iter().any(|i| i.path == path) {
                continue;
            }
            imports.push(ComponentImport {
                name: name.as_str().to_string(),
                path,
            });
        }
        imports
    }

    fn is_skipped(&self, specifier: &str, views_root: &str) -> bool {
        if self
            .config
            .filters
            .component_skip_patterns
            .iter()
            .any(|pattern| specifier.contains(pattern.as_str()))
        {
            return true;
        }
        // views 配下以外のスクリプトはコンポーネントではない
        let script = self
            .config
            .api_extensions()
            .iter()
            .any(|ext| specifier.ends_with(ext.as_str()));
        script && !specifier.contains(views_root)
    }
}

/// `a, b as c, type D` から元の関数名を取り出す
fn imported_names(list: &str) -> Vec<&str> {
    list.split(',')
        .filter_map(|item| {
            let item = item.trim();
            let item = item.strip_prefix("type ").unwrap_or(item);
            item.split_whitespace().next()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Default)]
pub struct ComponentGraph {
    nodes: Vec<ComponentNode>,
    index: HashMap<String, usize>,
}

impl ComponentGraph {
    /// views ルート配下の全コンポーネントと `seeds` (ルートが指すコンポーネント) から
    /// import をたどってグラフを作る
    pub fn build(
        paths: &ProjectPaths,
        config: &AnalyzerConfig,
        catalog: &ApiCatalog,
        seeds: &[String],
    ) -> Self {
        info!("コンポーネントグラフの構築を開始");
        let parser = ComponentParser::new(paths, config, catalog);

        let mut queue: VecDeque<String> = scan_components(paths, config).into();
        queue.extend(seeds.iter().filter(|seed| paths.exists(seed)).cloned());

        // 1) ファイルごとに一度だけ解析
        let mut parsed: BTreeMap<String, ParsedComponent> = BTreeMap::new();
        while let Some(rel) = queue.pop_front() {
            if parsed.contains_key(&rel) {
                continue;
            }
            let component = match fs::read_to_string(paths.to_fs(&rel)) {
                Ok(source) => parser.parse(&rel, &source),
                Err(err) => {
                    warn!("コンポーネントを読み込めません: {rel} - {err}");
                    ParsedComponent::default()
                }
            };
            queue.extend(component.imports.iter().map(|i| i.path.clone()));
            parsed.insert(rel, component);
        }

        let graph = Self::from_parsed(parsed);
        info!("コンポーネントを {} 件解析しました", graph.len());
        graph
    }

    /// 解析済みのファイルからノードと辺を作り、深さを計算する
    pub fn from_parsed(parsed: BTreeMap<String, ParsedComponent>) -> Self {
        // 2) path 順にノードを並べる
        let mut nodes: Vec<ComponentNode> = Vec::with_capacity(parsed.len());
        let mut index: HashMap<String, usize> = HashMap::with_capacity(parsed.len());
        for (id, (path, component)) in parsed.into_iter().enumerate() {
            index.insert(path.clone(), id);
            nodes.push(ComponentNode {
                path,
                api_calls: component.api_calls,
                imports: component.imports,
                children: BTreeSet::new(),
                parents: BTreeSet::new(),
                depth: 0,
            });
        }

        // 3) 辺 (自己参照は張らない)
        for parent in 0..nodes.len() {
            let targets: Vec<usize> = nodes[parent]
                .imports
                .iter()
                .filter_map(|i| index.get(&i.path).copied())
                .filter(|&child| child != parent)
                .collect();
            for child in targets {
                nodes[parent].children.insert(child);
                nodes[child].parents.insert(parent);
            }
        }

        let mut graph = ComponentGraph { nodes, index };
        graph.compute_depths();
        graph
    }

    /// 深さ = 親の深さの最大 + 1 (親が無ければ 0)。
    /// 探索中の親 (循環) はその経路では 0 として扱う。
    fn compute_depths(&mut self) {
        let count = self.nodes.len();
        let mut marks = vec![Mark::Unvisited; count];
        let mut depths = vec![0u32; count];

        for start in 0..count {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            let mut stack: Vec<(usize, bool)> = vec![(start, false)];
            while let Some((id, expanded)) = stack.pop() {
                if expanded {
                    let parents = &self.nodes[id].parents;
                    let depth = if parents.is_empty() {
                        0
                    } else {
                        parents
                            .iter()
                            .map(|&p| if marks[p] == Mark::Done { depths[p] } else { 0 })
                            .max()
                            .unwrap_or(0)
                            + 1
                    };
                    depths[id] = depth;
                    marks[id] = Mark::Done;
                    continue;
                }
                if marks[id] != Mark::Unvisited {
                    continue;
                }
                marks[id] = Mark::InProgress;
                stack.push((id, true));
                stack.extend(
                    self.nodes[id]
                        .parents
                        .iter()
                        .rev()
                        .filter(|&&p| marks[p] == Mark::Unvisited)
                        .map(|&p| (p, false)),
                );
            }
        }

        for (node, depth) in self.nodes.iter_mut().zip(depths) {
            node.depth = depth;
        }
    }

    pub fn id_of(&self, path: &str) -> Option<usize> {
        self.index.get(path).copied()
    }

    pub fn node(&self, id: usize) -> &ComponentNode {
        &self.nodes[id]
    }

    pub fn get(&self, path: &str) -> Option<&ComponentNode> {
        self.id_of(path).map(|id| &self.nodes[id])
    }

    /// 深さの浅い順、同じ深さの中では path 順
    pub fn level_order(&self) -> Vec<&ComponentNode> {
        let mut ordered: Vec<&ComponentNode> = self.nodes.iter().collect();
        ordered.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.path.cmp(&b.path)));
        ordered
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// views ルート配下のコンポーネントファイル (path 順)
fn scan_components(paths: &ProjectPaths, config: &AnalyzerConfig) -> Vec<String> {
    let root = paths.to_fs(paths.views_root());
    if !root.is_dir() {
        warn!("views ディレクトリが存在しません: {}", root.display());
        return Vec::new();
    }
    let extension = config.component_extension();
    let mut found: Vec<String> = WalkDir::new(&root)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || e.file_name()
                    .to_str()
                    .is_some_and(|n| !n.starts_with('.') && n != "node_modules")
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().to_string_lossy().ends_with(extension.as_str()))
        .filter_map(|e| paths.relativize(e.path()))
        .collect();
    found.sort();
    found
}
