//! API モジュールに書かれた URL 式をできるだけリテラルに還元する。

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::model::Resolution;
use crate::scanner::{matching_close, split_top_level, unquote};
use crate::symbols::{SymbolTable, UrlConstantCache, contains_token, replace_token};

fn re_symbol() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*(?:\(\s*\))?$").expect("valid regex")
    })
}

fn re_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*\}").expect("valid regex"))
}

fn re_upper_constant() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z_][A-Z0-9_]*\b").expect("valid regex"))
}

fn re_plus() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\+\s*").expect("valid regex"))
}

/// `{NAME}` のような未解決プレースホルダが残っているか
pub fn has_placeholder(url: &str) -> bool {
    re_placeholder().is_match(url)
}

/// URL 式リゾルバ。
///
/// - `constants`: baseUrl ファイルから作ったプロセス全体の定数キャッシュ
/// - `fallbacks`: 設定の `urlConstants.mappings`
#[derive(Debug, Clone, Copy)]
pub struct UrlResolver<'a> {
    constants: &'a UrlConstantCache,
    fallbacks: &'a BTreeMap<String, String>,
}

impl<'a> UrlResolver<'a> {
    pub fn new(constants: &'a UrlConstantCache, fallbacks: &'a BTreeMap<String, String>) -> Self {
        UrlResolver { constants, fallbacks }
    }

    /// `expr` を解決する。
    ///
    /// 1) 文字列リテラル → 中身
    /// 2) テンプレート → `${}` ごとに置換
    /// 3) `+` 連結 → 各項を解決して連結
    /// 4) 単独のシンボル → ローカル / ファイル内 / フォールバック / キャッシュ
    ///
    /// どの形にも当てはまらなければ元の式のまま `Unresolved` を返す。
    pub fn resolve(&self, expr: &str, locals: &SymbolTable, source: &str) -> Resolution {
        let expr = expr.trim();
        if expr.is_empty() {
            return Resolution::Unresolved(String::new());
        }

        if let Some(inner) = quoted(expr) {
            return Resolution::Resolved(inner.to_string());
        }

        if is_template(expr) {
            return self
                .resolve_template(expr, locals, source)
                .unwrap_or_else(|| Resolution::Unresolved(expr.to_string()));
        }

        let parts = split_top_level(expr, b'+');
        if parts.len() > 1 {
            return self.resolve_concat(&parts, locals, source);
        }

        self.resolve_bare(expr, locals, source)
    }

    fn resolve_template(&self, expr: &str, locals: &SymbolTable, source: &str) -> Option<Resolution> {
        let body = &expr[1..expr.len() - 1];
        let mut out = String::with_capacity(body.len());
        let mut resolved = true;
        let mut rest = body;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let close = matching_close(rest, start + 1)?;
            let name = rest[start + 2..close].trim();
            match self.lookup_symbol(name, locals, source) {
                Some(value) => out.push_str(&value),
                None => {
                    resolved = false;
                    out.push_str(&format!("{{{name}}}"));
                }
            }
            rest = &rest[close + 1..];
        }
        out.push_str(rest);

        Some(if resolved {
            Resolution::Resolved(out)
        } else {
            Resolution::Unresolved(out)
        })
    }

    fn resolve_concat(&self, parts: &[&str], locals: &SymbolTable, source: &str) -> Resolution {
        let mut out = String::new();
        let mut resolved = true;
        for part in parts {
            let value = if let Some(inner) = quoted(part) {
                Resolution::Resolved(inner.to_string())
            } else if is_template(part) {
                self.resolve_template(part, locals, source)
                    .unwrap_or_else(|| Resolution::Unresolved(format!("{{{part}}}")))
            } else {
                match self.lookup_symbol(part, locals, source) {
                    Some(value) => Resolution::Resolved(value),
                    None => Resolution::Unresolved(format!("{{{part}}}")),
                }
            };
            resolved &= value.is_resolved();
            out.push_str(value.value());
        }
        if resolved {
            Resolution::Resolved(out)
        } else {
            Resolution::Unresolved(out)
        }
    }

    fn resolve_bare(&self, expr: &str, locals: &SymbolTable, source: &str) -> Resolution {
        if !re_symbol().is_match(expr) {
            return Resolution::Unresolved(expr.to_string());
        }
        if let Some(value) = self.lookup_symbol(expr, locals, source) {
            return Resolution::Resolved(value);
        }
        // キャッシュのキーを部分一致で置換
        match self.constants.substitute_first(expr) {
            Some(value) if value != expr => Resolution::Resolved(value),
            _ => Resolution::Unresolved(expr.to_string()),
        }
    }

    /// ローカル → ファイル内の定数宣言 → フォールバック表 → キャッシュ (完全一致)
    fn lookup_symbol(&self, name: &str, locals: &SymbolTable, source: &str) -> Option<String> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        if let Some(value) = locals.lookup(name) {
            return Some(value.to_string());
        }
        if let Some(value) = declared_constant(source, name) {
            return Some(value);
        }
        let bare = name.strip_suffix("()").map_or(name, str::trim_end);
        if let Some(value) = self.fallbacks.get(bare) {
            return Some(value.clone());
        }
        self.constants
            .get(&format!("{{{name}}}"))
            .or_else(|| self.constants.get(name))
            .map(str::to_string)
    }
}

/// `const NAME = '...'` をソース全体から探す
fn declared_constant(source: &str, name: &str) -> Option<String> {
    if !re_symbol().is_match(name) || name.ends_with(')') {
        return None;
    }
    let literal = re_declared_constant()
        .captures_iter(source)
        .find(|caps| caps.get(1).is_some_and(|m| m.as_str() == name))?
        .get(2)?
        .as_str();
    unquote(literal).map(str::to_string)
}

fn re_declared_constant() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(['"`][^'"`\n]*['"`])"#).expect("valid regex")
    })
}

fn quoted(expr: &str) -> Option<&str> {
    if expr.starts_with('`') {
        return None;
    }
    unquote(expr)
}

fn is_template(expr: &str) -> bool {
    expr.len() >= 2 && expr.starts_with('`') && expr.ends_with('`')
}

/// 出力直前の URL 正規化。
///
/// 1) キャッシュのキーをすべて置換 (長いキー優先)
/// 2) 残った大文字定数を `lookup` (API モジュールの文字列定数) で置換
/// 3) `+` と余分な空白を取り除く
pub fn normalize_url<F>(url: &str, constants: &UrlConstantCache, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut processed = constants.substitute_all(url);

    let leftovers: Vec<String> = re_upper_constant()
        .find_iter(&processed)
        .map(|m| m.as_str().to_string())
        .collect();
    for name in leftovers {
        if constants.contains(&name) || constants.contains(&format!("{name}()")) {
            continue;
        }
        let Some(value) = lookup(&name) else {
            continue;
        };
        let wrapped = format!("{{{name}}}");
        if processed.contains(&wrapped) {
            processed = processed.replace(&wrapped, &value);
        }
        if contains_token(&processed, &name) {
            processed = replace_token(&processed, &name, &value, false);
        }
    }

    let joined = re_plus().replace_all(&processed, "");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> UrlConstantCache {
        let mut cache = UrlConstantCache::new();
        cache.absorb(&SymbolTable::from_source(
            "export const BASE_URL = () => {\n  return '/api/v3'\n}\n",
            8,
        ));
        cache
    }

    fn resolve(expr: &str, source: &str) -> Resolution {
        let constants = cache();
        let fallbacks = BTreeMap::from([("PATH".to_string(), "/xssw/v3".to_string())]);
        let resolver = UrlResolver::new(&constants, &fallbacks);
        let locals = SymbolTable::from_source(source, 8);
        resolver.resolve(expr, &locals, source)
    }

    #[test]
    fn literal_is_unquoted() {
        assert_eq!(resolve("'/api/user'", ""), Resolution::Resolved("/api/user".into()));
    }

    #[test]
    fn template_substitutes_known_constant() {
        let source = "const X = '/users'\n";
        assert_eq!(resolve("`${X}/list`", source), Resolution::Resolved("/users/list".into()));
    }

    #[test]
    fn template_keeps_unknown_as_placeholder() {
        assert_eq!(resolve("`${Y}/list`", ""), Resolution::Unresolved("{Y}/list".into()));
    }

    #[test]
    fn template_uses_cache_and_fallbacks() {
        assert_eq!(
            resolve("`${BASE_URL()}/user/${PATH}`", ""),
            Resolution::Resolved("/api/v3/user//xssw/v3".into())
        );
    }

    #[test]
    fn concatenation_resolves_each_operand() {
        let source = "const A_URL = '/api/a'\n";
        assert_eq!(resolve("A_URL + '/detail'", source), Resolution::Resolved("/api/a/detail".into()));
    }

    #[test]
    fn concatenation_with_unknown_operand_is_unresolved() {
        assert_eq!(
            resolve("UNKNOWN + '/detail'", ""),
            Resolution::Unresolved("{UNKNOWN}/detail".into())
        );
    }

    #[test]
    fn bare_symbol_falls_back_to_cache_substring() {
        assert_eq!(resolve("BASE_URL()", ""), Resolution::Resolved("/api/v3".into()));
        assert_eq!(resolve("NOPE", ""), Resolution::Unresolved("NOPE".into()));
    }

    #[test]
    fn arbitrary_expression_is_kept() {
        assert_eq!(
            resolve("buildUrl(id)", ""),
            Resolution::Unresolved("buildUrl(id)".into())
        );
    }

    #[test]
    fn broken_template_keeps_original() {
        assert_eq!(resolve("`${A/list`", ""), Resolution::Unresolved("`${A/list`".into()));
    }

    #[test]
    fn normalize_replaces_leftovers_and_joins() {
        let constants = cache();
        let url = normalize_url("{BASE_URL()} + {MODULE}/list", &constants, |name| {
            (name == "MODULE").then(|| "/order".to_string())
        });
        assert_eq!(url, "/api/v3/order/list");
    }

    #[test]
    fn inline_constant_declaration_is_found_by_exact_name() {
        let source = "function f() { const ID_PATH_LONG = '/no'; const ID_PATH = '/id'; return 1 }";
        assert_eq!(resolve("ID_PATH + '/x'", source), Resolution::Resolved("/id/x".into()));
        assert_eq!(declared_constant(source, "ID_PATH_LONG").as_deref(), Some("/no"));
        assert_eq!(declared_constant(source, "ID"), None);
    }

    #[test]
    fn placeholder_detection() {
        assert!(has_placeholder("{Y}/list"));
        assert!(!has_placeholder("/api/list"));
    }
}
