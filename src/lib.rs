//! SPA (Vue) のソースツリーを静的に解析し、画面ごとに呼び出している
//! バックエンド API を一覧にする。
//!
//! - ルート定義からルート表と親子関係を作る
//! - コンポーネントの import グラフをたどり、構成上の深さを求める
//! - API モジュールの URL 式を定数表を使ってリテラルに還元する
//!
//! 結果は (ルートまたはコンポーネント, API 呼び出し) ごとの 1 行にまとめる。

pub mod analyzer;
pub mod api;
pub mod components;
pub mod config;
pub mod error;
pub mod flatten;
pub mod logger;
pub mod model;
pub mod parser;
pub mod report;
pub mod resolver;
pub mod routes;
pub mod scanner;
pub mod symbols;
pub mod url;

pub use analyzer::{Analysis, Analyzer, OutputMode};
pub use config::AnalyzerConfig;
pub use error::{AnalyzerError, ConfigError};
pub use model::{ApiEndpoint, EndpointKey, Resolution, ResultRow, RouteNode};
