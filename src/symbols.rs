//! ソースファイル単位のシンボル表と、baseUrl ファイルから作る URL 定数キャッシュ。

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::config::AnalyzerConfig;
use crate::model::Resolution;
use crate::resolver::ProjectPaths;
use crate::scanner::{matching_close, split_top_level, unquote};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// `const X = () => { return ... }`
    Function,
    /// `const X = '...'`
    String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub value: Resolution,
}

/// 解析前の定義
enum Definition {
    Function(String),
    Literal(String),
}

fn re_block_function() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^\s*(?:export\s+)?(?:(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s*)?\(\s*\)\s*=>|function\s+([A-Za-z_$][\w$]*)\s*\(\s*\))\s*\{",
        )
        .expect("valid regex")
    })
}

fn re_expression_function() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*\(\s*\)\s*=>\s*([^\s{][^\n;]*)")
            .expect("valid regex")
    })
}

fn re_string_constant() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(['"`][^'"`\n]*['"`])\s*;?\s*$"#)
            .expect("valid regex")
    })
}

fn re_return() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\breturn\b").expect("valid regex"))
}

fn re_ternary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^!?\s*[A-Za-z_$][\w$.]*\s*(?:\(\s*\))?\s*\?\s*['"`]([^'"`]*)['"`]\s*:\s*['"`]([^'"`]*)['"`]$"#,
        )
        .expect("valid regex")
    })
}

fn re_zero_arg_call() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_$][\w$]*)\s*\(\s*\)$").expect("valid regex"))
}

/// 1 ファイル分のシンボル表 (名前 → 解決値)
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: BTreeMap<String, Symbol>,
}

impl SymbolTable {
    /// ソースからゼロ引数関数定数と文字列定数を抜き出して解決する。
    /// 関数呼び出しの連鎖は `max_depth` 段までたどる。
    pub fn from_source(source: &str, max_depth: usize) -> Self {
        let definitions = collect_definitions(source);
        let mut entries = BTreeMap::new();
        for (name, definition) in &definitions {
            let symbol = match definition {
                Definition::Literal(value) => Symbol {
                    kind: SymbolKind::String,
                    value: Resolution::Resolved(value.clone()),
                },
                Definition::Function(expr) => Symbol {
                    kind: SymbolKind::Function,
                    value: resolve_return(expr, &definitions, max_depth),
                },
            };
            entries.insert(name.clone(), symbol);
        }
        SymbolTable { entries }
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.entries.get(name)
    }

    /// `NAME` は文字列定数、`NAME()` は関数定数として引く。解決済みの値だけ返す。
    pub fn lookup(&self, reference: &str) -> Option<&str> {
        let reference = reference.trim();
        let (name, kind) = match reference.strip_suffix("()") {
            Some(name) => (name.trim_end(), SymbolKind::Function),
            None => (reference, SymbolKind::String),
        };
        let symbol = self.entries.get(name)?;
        if symbol.kind != kind {
            return None;
        }
        symbol.value.resolved()
    }

    /// 解決済みの文字列定数
    pub fn string_constant(&self, name: &str) -> Option<&str> {
        self.entries
            .get(name)
            .filter(|s| s.kind == SymbolKind::String)
            .and_then(|s| s.value.resolved())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Symbol)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn collect_definitions(source: &str) -> HashMap<String, Definition> {
    let mut definitions = HashMap::new();

    for caps in re_string_constant().captures_iter(source) {
        let (Some(name), Some(literal)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if let Some(value) = unquote(literal.as_str()) {
            definitions.insert(name.as_str().to_string(), Definition::Literal(value.to_string()));
        }
    }

    for caps in re_expression_function().captures_iter(source) {
        let (Some(name), Some(expr)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        definitions.insert(
            name.as_str().to_string(),
            Definition::Function(expr.as_str().trim().to_string()),
        );
    }

    for caps in re_block_function().captures_iter(source) {
        let Some(name) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let open = whole.end() - 1;
        let Some(close) = matching_close(source, open) else {
            continue;
        };
        if let Some(expr) = return_expression(&source[open + 1..close]) {
            definitions.insert(name.as_str().to_string(), Definition::Function(expr));
        }
    }

    definitions
}

/// 関数本体の最初の `return` の式 (空白は 1 つにまとめる)
fn return_expression(body: &str) -> Option<String> {
    let found = re_return().find(body)?;
    let rest = &body[found.end()..];
    let expr = split_top_level(rest, b';').into_iter().next()?;
    let compact = expr.split_whitespace().collect::<Vec<_>>().join(" ");
    (!compact.is_empty()).then_some(compact)
}

/// return 式の解決。優先順位:
/// 1) 三項演算子 → 空でない方のリテラル
/// 2) 定義済みゼロ引数関数の呼び出し → 再帰的に解決
/// 3) 文字列リテラル単体
/// 4) それ以外は元の式のまま (未解決)
fn resolve_return(expr: &str, definitions: &HashMap<String, Definition>, depth_left: usize) -> Resolution {
    let expr = expr.trim().trim_end_matches(';').trim();

    if let Some(caps) = re_ternary().captures(expr) {
        let when_true = caps.get(1).map_or("", |m| m.as_str());
        let when_false = caps.get(2).map_or("", |m| m.as_str());
        let chosen = if when_true.is_empty() { when_false } else { when_true };
        return Resolution::Resolved(chosen.to_string());
    }

    if let Some(caps) = re_zero_arg_call().captures(expr) {
        let callee = caps.get(1).map_or("", |m| m.as_str());
        match definitions.get(callee) {
            Some(_) if depth_left == 0 => return Resolution::Unresolved(expr.to_string()),
            Some(Definition::Literal(value)) => return Resolution::Resolved(value.clone()),
            Some(Definition::Function(inner)) => {
                return match resolve_return(inner, definitions, depth_left - 1) {
                    Resolution::Resolved(v) => Resolution::Resolved(v),
                    Resolution::Unresolved(_) => Resolution::Unresolved(expr.to_string()),
                };
            }
            None => {}
        }
    }

    if let Some(value) = unquote(expr) {
        return Resolution::Resolved(value.to_string());
    }

    Resolution::Unresolved(expr.to_string())
}

/// プロセス全体で共有する URL 定数キャッシュ。
///
/// 関数定数は `{NAME()}` と `NAME()`、文字列定数は `{NAME}` と `NAME` の
/// 両方のキーで登録する。
#[derive(Debug, Clone, Default)]
pub struct UrlConstantCache {
    entries: HashMap<String, String>,
}

impl UrlConstantCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 設定の baseUrl 候補ファイルをすべて読み込む
    pub fn load(paths: &ProjectPaths, config: &AnalyzerConfig) -> Self {
        let mut cache = Self::new();
        for rel in &config.paths.base_url.search_paths {
            let file = paths.to_fs(rel);
            if !file.is_file() {
                continue;
            }
            match fs::read_to_string(&file) {
                Ok(source) => {
                    let table = SymbolTable::from_source(&source, config.analysis.max_symbol_depth);
                    info!("baseUrl ファイルを解析: {} ({} 個の定義)", rel, table.len());
                    cache.absorb(&table);
                }
                Err(err) => warn!("baseUrl ファイルを読み込めません: {} - {err}", file.display()),
            }
        }
        cache
    }

    /// シンボル表の解決済みエントリを取り込む
    pub fn absorb(&mut self, table: &SymbolTable) {
        for (name, symbol) in table.iter() {
            let Some(value) = symbol.value.resolved() else {
                debug!("未解決の定数をスキップ: {name}");
                continue;
            };
            match symbol.kind {
                SymbolKind::Function => {
                    self.insert(format!("{{{name}()}}"), value);
                    self.insert(format!("{name}()"), value);
                }
                SymbolKind::String => {
                    self.insert(format!("{{{name}}}"), value);
                    self.insert(name.clone(), value);
                }
            }
        }
    }

    pub fn insert(&mut self, key: String, value: &str) {
        self.entries.insert(key, value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// 長いキーから順に並べたエントリ (部分一致の置換で短いキーが先に当たらないように)
    pub fn entries_longest_first(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
        entries
    }

    /// 式に含まれる最初のキーを 1 箇所だけ置換する
    pub fn substitute_first(&self, text: &str) -> Option<String> {
        self.entries_longest_first()
            .into_iter()
            .find(|(key, _)| contains_token(text, key))
            .map(|(key, value)| replace_token(text, key, value, true))
    }

    /// すべてのキーを置換する
    pub fn substitute_all(&self, text: &str) -> String {
        self.entries_longest_first()
            .into_iter()
            .fold(text.to_string(), |acc, (key, value)| replace_token(&acc, key, value, false))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// 識別子の途中に埋もれていない出現位置
fn token_positions<'a>(text: &'a str, key: &'a str) -> impl Iterator<Item = usize> + 'a {
    let bytes = text.as_bytes();
    let key_bytes = key.as_bytes();
    let check_start = key_bytes.first().is_some_and(|&b| is_ident_byte(b));
    let check_end = key_bytes.last().is_some_and(|&b| is_ident_byte(b));
    text.match_indices(key).map(|(pos, _)| pos).filter(move |&pos| {
        let end = pos + key.len();
        let start_ok = !check_start || pos == 0 || !is_ident_byte(bytes[pos - 1]);
        let end_ok = !check_end || end >= bytes.len() || !is_ident_byte(bytes[end]);
        start_ok && end_ok
    })
}

pub(crate) fn contains_token(text: &str, key: &str) -> bool {
    !key.is_empty() && token_positions(text, key).next().is_some()
}

pub(crate) fn replace_token(text: &str, key: &str, value: &str, first_only: bool) -> String {
    if key.is_empty() {
        return text.to_string();
    }
    let positions: Vec<usize> = if first_only {
        token_positions(text, key).take(1).collect()
    } else {
        token_positions(text, key).collect()
    };
    if positions.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for pos in positions {
        if pos < last {
            continue;
        }
        out.push_str(&text[last..pos]);
        out.push_str(value);
        last = pos + key.len();
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE_URL_JS: &str = r#"
export const SINGLE_APP = () => {
  return false
}
export const BASE_URL = () => {
  return SINGLE_APP() ? '' : '/api/v3'
}
export const USER_URL = () => {
  return BASE_URL()
}
export const ORDER_URL = () => '/order/v1'
export const BROKEN_URL = () => {
  return window.location.origin + '/x'
}
export const UPLOAD = '/upload'
"#;

    #[test]
    fn resolves_ternary_preferring_non_empty_branch() {
        let table = SymbolTable::from_source(BASE_URL_JS, 8);
        assert_eq!(table.lookup("BASE_URL()"), Some("/api/v3"));
    }

    #[test]
    fn follows_function_chain() {
        let table = SymbolTable::from_source(BASE_URL_JS, 8);
        assert_eq!(table.lookup("USER_URL()"), Some("/api/v3"));
    }

    #[test]
    fn chain_stops_at_depth_limit() {
        let table = SymbolTable::from_source(BASE_URL_JS, 0);
        assert_eq!(
            table.get("USER_URL").map(|s| &s.value),
            Some(&Resolution::Unresolved("BASE_URL()".to_string()))
        );
    }

    #[test]
    fn expression_bodied_arrow_and_string_constants() {
        let table = SymbolTable::from_source(BASE_URL_JS, 8);
        assert_eq!(table.lookup("ORDER_URL()"), Some("/order/v1"));
        assert_eq!(table.lookup("UPLOAD"), Some("/upload"));
        // 関数として引いた文字列定数は見つからない
        assert_eq!(table.lookup("UPLOAD()"), None);
    }

    #[test]
    fn unresolvable_returns_are_kept_raw() {
        let table = SymbolTable::from_source(BASE_URL_JS, 8);
        let symbol = table.get("BROKEN_URL").unwrap();
        assert_eq!(
            symbol.value,
            Resolution::Unresolved("window.location.origin + '/x'".to_string())
        );
    }

    #[test]
    fn self_recursive_function_terminates() {
        let source = "export const LOOP = () => {\n  return LOOP()\n}\n";
        let table = SymbolTable::from_source(source, 8);
        assert!(!table.get("LOOP").unwrap().value.is_resolved());
    }

    #[test]
    fn cache_registers_wrapped_and_bare_keys() {
        let mut cache = UrlConstantCache::new();
        cache.absorb(&SymbolTable::from_source(BASE_URL_JS, 8));

        assert_eq!(cache.get("{BASE_URL()}"), Some("/api/v3"));
        assert_eq!(cache.get("BASE_URL()"), Some("/api/v3"));
        assert_eq!(cache.get("{UPLOAD}"), Some("/upload"));
        assert_eq!(cache.get("UPLOAD"), Some("/upload"));
        assert!(!cache.contains("{BROKEN_URL()}"));
    }

    #[test]
    fn substitution_prefers_longest_key_and_respects_word_boundaries() {
        let mut cache = UrlConstantCache::new();
        cache.absorb(&SymbolTable::from_source(BASE_URL_JS, 8));

        assert_eq!(cache.substitute_all("{BASE_URL()}/user/list"), "/api/v3/user/list");
        assert_eq!(cache.substitute_all("UPLOAD_FILE/x"), "UPLOAD_FILE/x");
        assert_eq!(cache.substitute_first("BASE_URL()"), Some("/api/v3".to_string()));
    }
}
