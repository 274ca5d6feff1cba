//! API モジュールの解析とエンドポイントキャッシュ。
//!
//! 対象ディレクトリ配下の API モジュールを一度だけ読み込み、
//! (関数名, モジュールパス) → エンドポイント の表を作る。
//! 以降のフェーズはこの表を読むだけ。

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::AnalyzerConfig;
use crate::model::{ApiEndpoint, EndpointKey, Resolution};
use crate::resolver::ProjectPaths;
use crate::scanner::{matching_close, object_body, object_props, split_top_level, unquote};
use crate::symbols::{SymbolTable, UrlConstantCache};
use crate::url::UrlResolver;

const HTTP_METHODS: &[&str] = &["get", "post", "put", "delete", "patch", "head", "options"];

fn re_export_function() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*export\s+(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*\(")
            .expect("valid regex")
    })
}

fn re_export_arrow() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^[ \t]*export\s+(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s*)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>\s*",
        )
        .expect("valid regex")
    })
}

fn re_comment_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[@\\]\w+\s*").expect("valid regex"))
}

/// 解析済みの API 関数 1 件 (キャッシュ登録前)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFunction {
    pub name: String,
    pub url: Resolution,
    pub method: Option<String>,
    pub description: String,
}

/// 1 モジュール分の解析結果
#[derive(Debug, Clone, Default)]
pub struct ParsedModule {
    pub functions: Vec<ParsedFunction>,
    pub symbols: SymbolTable,
}

/// API モジュールのパーサ
pub struct ApiModuleParser<'a> {
    resolver: UrlResolver<'a>,
    callee_pattern: Regex,
    max_symbol_depth: usize,
    description_max_chars: usize,
    comment_window: usize,
}

impl<'a> ApiModuleParser<'a> {
    pub fn new(config: &'a AnalyzerConfig, constants: &'a UrlConstantCache) -> Self {
        let callees: Vec<String> = config
            .paths
            .api
            .request_callees
            .iter()
            .map(|c| regex::escape(c))
            .collect();
        let callees = if callees.is_empty() {
            "request".to_string()
        } else {
            callees.join("|")
        };
        let pattern = format!(r"\b(?:{callees})\s*(?:\.\s*([A-Za-z]+)\s*)?\(");
        let callee_pattern = Regex::new(&pattern)
            .unwrap_or_else(|_| Regex::new(r"\brequest\s*(?:\.\s*([A-Za-z]+)\s*)?\(").expect("valid regex"));

        ApiModuleParser {
            resolver: UrlResolver::new(constants, &config.url_constants.mappings),
            callee_pattern,
            max_symbol_depth: config.analysis.max_symbol_depth,
            description_max_chars: config.analysis.description_max_chars,
            comment_window: config.analysis.comment_window,
        }
    }

    /// モジュールのソースから export された API 関数を抜き出す
    pub fn parse(&self, source: &str) -> ParsedModule {
        let symbols = SymbolTable::from_source(source, self.max_symbol_depth);
        let mut functions = Vec::new();

        // 1) export function f(...) { ... }
        for caps in re_export_function().captures_iter(source) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let Some(params_close) = matching_close(source, whole.end() - 1) else {
                continue;
            };
            let Some(open) = source[params_close..].find('{').map(|i| params_close + i) else {
                continue;
            };
            let Some(close) = matching_close(source, open) else {
                continue;
            };
            if let Some(function) =
                self.parse_function(name.as_str(), &source[open + 1..close], whole.start(), source, &symbols)
            {
                functions.push(function);
            }
        }

        // 2) export const f = (...) => ...
        for caps in re_export_arrow().captures_iter(source) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let body = arrow_body(source, whole.end());
            if let Some(function) = self.parse_function(name.as_str(), body, whole.start(), source, &symbols) {
                functions.push(function);
            }
        }

        ParsedModule { functions, symbols }
    }

    fn parse_function(
        &self,
        name: &str,
        body: &str,
        start: usize,
        source: &str,
        symbols: &SymbolTable,
    ) -> Option<ParsedFunction> {
        let (url_expr, method) = self.request_call(body)?;
        let url = self.resolver.resolve(&url_expr, symbols, source);
        let description = preceding_comment(source, start, self.comment_window)
            .map(|comment| truncate_chars(&comment, self.description_max_chars))
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| name.to_string());

        Some(ParsedFunction {
            name: name.to_string(),
            url,
            method,
            description,
        })
    }

    /// 関数本体の最初の HTTP 呼び出しから (URL 式, メソッド) を取り出す
    fn request_call(&self, body: &str) -> Option<(String, Option<String>)> {
        for caps in self.callee_pattern.captures_iter(body) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let shorthand = caps
                .get(1)
                .map(|m| m.as_str().to_ascii_lowercase())
                .filter(|m| HTTP_METHODS.contains(&m.as_str()));
            if caps.get(1).is_some() && shorthand.is_none() {
                continue;
            }
            let open = whole.end() - 1;
            let Some(close) = matching_close(body, open) else {
                continue;
            };
            let args = split_top_level(&body[open + 1..close], b',');
            let Some(first) = args.first() else {
                continue;
            };

            if let Some(object) = object_body(first) {
                let props = object_props(object);
                let Some(url) = props.iter().find(|(k, _)| k == "url").map(|(_, v)| v.to_string()) else {
                    continue;
                };
                let method = props
                    .iter()
                    .find(|(k, _)| k == "method")
                    .and_then(|(_, v)| unquote(v))
                    .map(|m| m.to_ascii_uppercase())
                    .or_else(|| shorthand.as_ref().map(|m| m.to_ascii_uppercase()));
                return Some((url, method));
            }

            return Some((first.to_string(), shorthand.map(|m| m.to_ascii_uppercase())));
        }
        None
    }
}

/// `=>` の直後から関数本体を切り出す (ブロックなら中身、式なら行末または `;` まで)
fn arrow_body(source: &str, start: usize) -> &str {
    let rest = &source[start..];
    if rest.starts_with('{') {
        return match matching_close(source, start) {
            Some(close) => &source[start + 1..close],
            None => rest,
        };
    }
    if rest.starts_with('(') {
        if let Some(close) = matching_close(source, start) {
            return &source[start..=close];
        }
    }
    let end = rest
        .find(|c| c == ';' || c == '\n')
        .map_or(rest.len(), |i| i);
    // 式本体が複数行にまたがる呼び出しの場合は括弧の対応で延ばす
    let line = &rest[..end];
    if let Some(paren) = line.find('(') {
        if let Some(close) = matching_close(source, start + paren) {
            return &source[start..=close];
        }
    }
    line
}

/// 関数宣言の直前のコメントを説明文として取り出す
fn preceding_comment(source: &str, start: usize, window: usize) -> Option<String> {
    let mut from = start.saturating_sub(window);
    while !source.is_char_boundary(from) {
        from += 1;
    }
    let before = source[from..start].trim_end();

    let raw_lines: Vec<&str> = if before.ends_with("*/") {
        let open = before.rfind("/*")?;
        before[open..].lines().collect()
    } else {
        let mut lines: Vec<&str> = before
            .lines()
            .rev()
            .take_while(|line| line.trim_start().starts_with("//"))
            .collect();
        lines.reverse();
        lines
    };
    if raw_lines.is_empty() {
        return None;
    }

    let cleaned: Vec<String> = raw_lines
        .iter()
        .map(|line| {
            let line = line.trim();
            let line = line.trim_start_matches("/**").trim_start_matches("/*");
            let line = line.trim_end_matches("*/");
            let line = line.trim_start_matches("//").trim_start_matches('*').trim();
            re_comment_tag().replace(line, "").trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .collect();

    (!cleaned.is_empty()).then(|| cleaned.join("; "))
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// プロセス全体で共有する API エンドポイントの表
#[derive(Debug, Clone, Default)]
pub struct ApiCatalog {
    endpoints: HashMap<EndpointKey, ApiEndpoint>,
    modules: BTreeMap<String, SymbolTable>,
}

impl ApiCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 設定の API ディレクトリを走査してキャッシュを作る
    pub fn load(paths: &ProjectPaths, config: &AnalyzerConfig, constants: &UrlConstantCache) -> Self {
        let parser = ApiModuleParser::new(config, constants);
        let extensions = config.api_extensions();
        let mut catalog = Self::new();

        info!("API ファイルの事前読み込みを開始");
        for dir in &config.paths.api.directories {
            let root = paths.to_fs(dir);
            if !root.is_dir() {
                debug!("存在しないディレクトリをスキップ: {dir}");
                continue;
            }
            info!("API ディレクトリを走査: {dir}");

            let files = WalkDir::new(&root)
                .into_iter()
                .filter_entry(|e| !is_hidden(e))
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && has_extension(e.path(), &extensions));

            for entry in files {
                let Some(rel) = paths.relativize(entry.path()) else {
                    continue;
                };
                match fs::read_to_string(entry.path()) {
                    Ok(source) => catalog.ingest(&rel, parser.parse(&source)),
                    Err(err) => warn!("API ファイルを読み込めません: {rel} - {err}"),
                }
            }
        }
        info!("API 関数を {} 件キャッシュしました", catalog.len());
        catalog
    }

    /// 1 モジュール分の解析結果を登録する
    pub fn ingest(&mut self, module: &str, parsed: ParsedModule) {
        if self.modules.contains_key(module) {
            return;
        }
        for function in parsed.functions {
            let key = EndpointKey::new(&function.name, module);
            debug!("API 関数をキャッシュ: {} -> {}", key, function.url.value());
            self.endpoints.entry(key.clone()).or_insert(ApiEndpoint {
                key,
                url: function.url,
                method: function.method,
                description: function.description,
            });
        }
        self.modules.insert(module.to_string(), parsed.symbols);
    }

    pub fn lookup(&self, function: &str, module: &str) -> Option<&ApiEndpoint> {
        self.endpoints.get(&EndpointKey::new(function, module))
    }

    pub fn get(&self, key: &EndpointKey) -> Option<&ApiEndpoint> {
        self.endpoints.get(key)
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    /// すべての API モジュールの文字列定数から `name` を探す (モジュールパス順)
    pub fn find_string_constant(&self, name: &str) -> Option<String> {
        self.modules
            .values()
            .find_map(|table| table.string_constant(name))
            .map(str::to_string)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.') || name == "node_modules")
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let name = path.to_string_lossy();
    extensions.iter().any(|ext| name.ends_with(ext.as_str()))
}
