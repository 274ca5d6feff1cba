//! 解析パイプライン。
//!
//! 各フェーズは必ずこの順に実行する:
//! 1) URL 定数の読み込み
//! 2) API モジュールの読み込み (エンドポイントキャッシュを完成させる)
//! 3) ルート表の構築
//! 4) 親子関係の推定
//! 5) コンポーネントグラフの構築
//! 6) 行への展開
//!
//! 前のフェーズの結果は後のフェーズから読むだけで、書き換えない。

use std::path::Path;
use tracing::info;

use crate::api::ApiCatalog;
use crate::components::ComponentGraph;
use crate::config::AnalyzerConfig;
use crate::flatten::Flattener;
use crate::model::ResultRow;
use crate::resolver::ProjectPaths;
use crate::routes::{RouteGraphBuilder, RouteRelations, RouteTable};
use crate::symbols::UrlConstantCache;

/// 出力の単位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// (ルート, API 呼び出し)
    #[default]
    Routes,
    /// (コンポーネント, API 呼び出し)
    Components,
}

/// 1 回の実行で作ったものすべて
#[derive(Debug)]
pub struct Analysis {
    pub mode: OutputMode,
    pub paths: ProjectPaths,
    pub constants: UrlConstantCache,
    pub catalog: ApiCatalog,
    pub routes: RouteTable,
    pub relations: RouteRelations,
    pub graph: ComponentGraph,
    pub rows: Vec<ResultRow>,
}

pub struct Analyzer {
    config: AnalyzerConfig,
    paths: ProjectPaths,
}

impl Analyzer {
    /// `start` から src ルートを探して解析器を作る
    pub fn new(start: &Path, config: AnalyzerConfig) -> Self {
        let paths = ProjectPaths::discover(start, &config.paths.views);
        Analyzer { config, paths }
    }

    pub fn with_paths(paths: ProjectPaths, config: AnalyzerConfig) -> Self {
        Analyzer { config, paths }
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn run(&self, mode: OutputMode) -> Analysis {
        info!("解析を開始: {}", self.paths.src_root().display());
        let config = &self.config;
        let paths = &self.paths;

        let constants = UrlConstantCache::load(paths, config);
        info!("URL 定数を {} 件読み込みました", constants.len());

        let catalog = ApiCatalog::load(paths, config, &constants);

        let (routes, relations) = match mode {
            OutputMode::Routes => {
                let routes = RouteGraphBuilder::new(paths, config).build();
                let relations = RouteRelations::infer(&routes, paths);
                (routes, relations)
            }
            OutputMode::Components => (RouteTable::new(), RouteRelations::new()),
        };

        let seeds: Vec<String> = routes.iter().filter_map(|r| r.component.clone()).collect();
        let graph = ComponentGraph::build(paths, config, &catalog, &seeds);

        let flattener = Flattener::new(&graph, &catalog, &constants, config.analysis.max_traversal_depth);
        let rows = match mode {
            OutputMode::Routes => flattener.flatten_routes(&routes, &relations),
            OutputMode::Components => flattener.flatten_components(),
        };

        info!("解析完了");
        Analysis {
            mode,
            paths: paths.clone(),
            constants,
            catalog,
            routes,
            relations,
            graph,
            rows,
        }
    }
}
