//! 出力: CSV / JSON、ルート表のログ、実行サマリ。

use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::analyzer::{Analysis, OutputMode};
use crate::error::{AnalyzerError, Result};
use crate::model::ResultRow;
use crate::routes::{RouteRelations, RouteTable};

const ROUTE_HEADER: &[&str] = &[
    "routeName",
    "routePath",
    "parentRoute",
    "depth",
    "kind",
    "componentPath",
    "apiFunction",
    "apiModule",
    "method",
    "url",
    "urlResolved",
    "description",
    "sourceFile",
    "hasApiCalls",
    "fromChild",
    "childSourcePath",
    "childComponents",
    "childComponentPaths",
    "componentImports",
];

const COMPONENT_HEADER: &[&str] = &[
    "filePath",
    "kind",
    "parentComponent",
    "apiFunction",
    "apiModule",
    "method",
    "url",
    "urlResolved",
    "description",
    "componentImports",
    "hasApiCalls",
];

/// すべてのフィールドを `"` で囲み、中の `"` は二重にする
fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn csv_line(fields: &[String]) -> String {
    fields.iter().map(|f| quote(f)).collect::<Vec<_>>().join(",")
}

fn route_fields(row: &ResultRow) -> Vec<String> {
    vec![
        row.subject.clone(),
        row.route_path.clone(),
        row.parent.clone(),
        row.depth.to_string(),
        row.kind.clone(),
        row.component_path.clone(),
        row.api_function.clone(),
        row.api_module.clone(),
        row.method.clone(),
        row.url.clone(),
        row.url_resolved.to_string(),
        row.description.clone(),
        row.source_file.clone(),
        row.has_api_calls.to_string(),
        row.from_child.to_string(),
        row.child_source_path.clone(),
        row.child_components.clone(),
        row.child_component_paths.clone(),
        row.component_imports.clone(),
    ]
}

fn component_fields(row: &ResultRow) -> Vec<String> {
    vec![
        row.subject.clone(),
        row.kind.clone(),
        row.parent.clone(),
        row.api_function.clone(),
        row.api_module.clone(),
        row.method.clone(),
        row.url.clone(),
        row.url_resolved.to_string(),
        row.description.clone(),
        row.component_imports.clone(),
        row.has_api_calls.to_string(),
    ]
}

/// 行を CSV 文字列にする (ヘッダ付き、改行区切り)
pub fn to_csv(rows: &[ResultRow], mode: OutputMode) -> String {
    let (header, fields): (&[&str], fn(&ResultRow) -> Vec<String>) = match mode {
        OutputMode::Routes => (ROUTE_HEADER, route_fields),
        OutputMode::Components => (COMPONENT_HEADER, component_fields),
    };
    let mut out = header.join(",");
    out.push('\n');
    for row in rows {
        out.push_str(&csv_line(&fields(row)));
        out.push('\n');
    }
    out
}

pub fn write_csv(path: &Path, rows: &[ResultRow], mode: OutputMode) -> Result<()> {
    fs::write(path, to_csv(rows, mode)).map_err(|e| AnalyzerError::io(path, e))
}

pub fn to_json(rows: &[ResultRow]) -> Result<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}

pub fn write_json(path: &Path, rows: &[ResultRow]) -> Result<()> {
    fs::write(path, to_json(rows)?).map_err(|e| AnalyzerError::io(path, e))
}

/// 解決済みのルート表と親子関係を JSON で書き出す
pub fn write_route_log(path: &Path, routes: &RouteTable, relations: &RouteRelations) -> Result<()> {
    let log = json!({
        "routes": routes,
        "relations": relations,
    });
    let text = serde_json::to_string_pretty(&log)?;
    fs::write(path, text).map_err(|e| AnalyzerError::io(path, e))
}

/// 実行結果の集計
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub routes: usize,
    pub api_functions: usize,
    pub url_constants: usize,
    pub relations: usize,
    pub components: usize,
    pub rows: usize,
    pub rows_with_api: usize,
    /// 深さ → 行数
    pub depth_distribution: BTreeMap<u32, usize>,
    /// (URL, 出現回数) の多い順
    pub top_urls: Vec<(String, usize)>,
}

impl Summary {
    pub fn from_analysis(analysis: &Analysis) -> Self {
        let rows = &analysis.rows;

        let mut depth_distribution = BTreeMap::new();
        for row in rows {
            *depth_distribution.entry(row.depth).or_insert(0) += 1;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for row in rows.iter().filter(|r| !r.url.is_empty()) {
            *counts.entry(row.url.as_str()).or_insert(0) += 1;
        }
        let mut top_urls: Vec<(String, usize)> =
            counts.into_iter().map(|(url, n)| (url.to_string(), n)).collect();
        top_urls.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_urls.truncate(10);

        Summary {
            routes: analysis.routes.len(),
            api_functions: analysis.catalog.len(),
            url_constants: analysis.constants.len(),
            relations: analysis.relations.len(),
            components: analysis.graph.len(),
            rows: rows.len(),
            rows_with_api: rows.iter().filter(|r| r.has_api_calls).count(),
            depth_distribution,
            top_urls,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== 解析サマリ ===")?;
        writeln!(f, "ルート数: {}", self.routes)?;
        writeln!(f, "API 関数: {}", self.api_functions)?;
        writeln!(f, "URL 定数: {}", self.url_constants)?;
        writeln!(f, "親子関係: {}", self.relations)?;
        writeln!(f, "コンポーネント: {}", self.components)?;
        writeln!(f, "出力行数: {} (API 呼び出しあり: {})", self.rows, self.rows_with_api)?;
        writeln!(f, "深さ別の行数:")?;
        for (depth, count) in &self.depth_distribution {
            writeln!(f, "  {depth}: {count}")?;
        }
        if !self.top_urls.is_empty() {
            writeln!(f, "よく使われる URL (上位 {}):", self.top_urls.len())?;
            for (url, count) in &self.top_urls {
                writeln!(f, "  {count:>4}  {url}")?;
            }
        }
        Ok(())
    }
}
