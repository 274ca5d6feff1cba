//! 文字列・コメントを読み飛ばしながら括弧の対応を取る軽量スキャナ。
//!
//! 完全な構文解析はせず、オブジェクト / 配列リテラルの境界だけを見つける。
//! 壊れた入力でもパニックせず `None` や空の結果を返す。

use regex::Regex;
use std::sync::OnceLock;

use crate::model::{ComponentRef, ComponentRefKind, RawDeclaration};

fn closer(open: u8) -> Option<u8> {
    match open {
        b'{' => Some(b'}'),
        b'[' => Some(b']'),
        b'(' => Some(b')'),
        _ => None,
    }
}

/// `'...'` / `"..."` の終端クォートの位置
fn skip_quoted(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'\n' => return None,
            b if b == quote => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// テンプレートリテラルの終端バッククォートの位置 (`${...}` のネストも考慮)
fn skip_template(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'`' => return Some(i),
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                i = matching_close(text, i + 1)?;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// コメントの最後の文字の位置。コメントでなければ `None`。
fn skip_comment(bytes: &[u8], start: usize) -> Option<usize> {
    match bytes.get(start + 1) {
        Some(b'/') => {
            let end = bytes[start..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |p| start + p);
            Some(end.saturating_sub(1).max(start + 1))
        }
        Some(b'*') => {
            let mut i = start + 2;
            while i + 1 < bytes.len() {
                if bytes[i] == b'*' && bytes[i + 1] == b'/' {
                    return Some(i + 1);
                }
                i += 1;
            }
            Some(bytes.len() - 1)
        }
        _ => None,
    }
}

/// 文字列・テンプレート・コメントなら、その終端位置を返す
fn skip_literal(text: &str, i: usize) -> Option<Option<usize>> {
    let bytes = text.as_bytes();
    match bytes[i] {
        b'\'' | b'"' => Some(skip_quoted(bytes, i)),
        b'`' => Some(skip_template(text, i)),
        b'/' => skip_comment(bytes, i).map(Some),
        _ => None,
    }
}

/// `open` にある `{` / `[` / `(` に対応する閉じ括弧の位置
pub fn matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut stack = vec![closer(*bytes.get(open)?)?];
    let mut i = open + 1;
    while i < bytes.len() {
        if let Some(end) = skip_literal(text, i) {
            i = end? + 1;
            continue;
        }
        match bytes[i] {
            b @ (b'{' | b'[' | b'(') => stack.extend(closer(b)),
            b @ (b'}' | b']' | b')') => {
                if stack.last() != Some(&b) {
                    return None;
                }
                stack.pop();
                if stack.is_empty() {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// ネストの外側にある `sep` で分割する。各要素は trim 済みで空要素は除く。
pub fn split_top_level(text: &str, sep: u8) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut last = 0;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(end) = skip_literal(text, i) {
            match end {
                Some(end) => {
                    i = end + 1;
                    continue;
                }
                None => break,
            }
        }
        match bytes[i] {
            b'{' | b'[' | b'(' => depth += 1,
            b'}' | b']' | b')' => depth = depth.saturating_sub(1),
            b if b == sep && depth == 0 => {
                parts.push(text[last..i].trim());
                last = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(text[last..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// ネストの外側で最初に現れる `target` の位置
pub fn find_top_level(text: &str, target: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(end) = skip_literal(text, i) {
            i = end? + 1;
            continue;
        }
        match bytes[i] {
            b'{' | b'[' | b'(' => depth += 1,
            b'}' | b']' | b')' => depth = depth.saturating_sub(1),
            b if b == target && depth == 0 => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// `{ ... }` の中身を `key: value` の組に分解する。
/// スプレッドやメソッド定義など `:` を持たない要素は無視する。
pub fn object_props(body: &str) -> Vec<(String, &str)> {
    split_top_level(body, b',')
        .into_iter()
        .filter_map(|prop| {
            let colon = find_top_level(prop, b':')?;
            let key = unquote(prop[..colon].trim()).unwrap_or_else(|| prop[..colon].trim());
            Some((key.to_string(), prop[colon + 1..].trim()))
        })
        .collect()
}

/// 式全体が `{...}` なら中身を返す
pub fn object_body(expr: &str) -> Option<&str> {
    let expr = expr.trim();
    if !expr.starts_with('{') {
        return None;
    }
    let close = matching_close(expr, 0)?;
    Some(&expr[1..close])
}

/// `'x'` / `"x"` / 補間なしの `` `x` `` を剥がす
pub fn unquote(expr: &str) -> Option<&str> {
    let expr = expr.trim();
    let bytes = expr.as_bytes();
    if bytes.len() < 2 {
        return None;
    }
    let quote = bytes[0];
    if !matches!(quote, b'\'' | b'"' | b'`') {
        return None;
    }
    let end = if quote == b'`' {
        skip_template(expr, 0)?
    } else {
        skip_quoted(bytes, 0)?
    };
    if end != bytes.len() - 1 {
        return None;
    }
    let inner = &expr[1..end];
    if quote == b'`' && inner.contains("${") {
        return None;
    }
    Some(inner)
}

fn re_call_with_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_$][\w$]*)\s*\(\s*['"`]([^'"`]*)['"`]"#).expect("valid regex")
    })
}

fn re_interpolation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{[^}]*\}").expect("valid regex"))
}

/// テンプレートの `${...}` を空文字に置換する
pub fn strip_interpolations(text: &str) -> String {
    re_interpolation().replace_all(text, "").into_owned()
}

/// `_import('/x')`, `() => import('./x.vue')`, `require('x')` からコンポーネント参照を取り出す
pub fn component_ref_in(expr: &str, loaders: &[String]) -> Option<ComponentRef> {
    re_call_with_literal().captures_iter(expr).find_map(|caps| {
        let callee = caps.get(1)?.as_str();
        let kind = if loaders.iter().any(|l| l == callee) {
            ComponentRefKind::Loader
        } else if callee == "import" || callee == "require" {
            ComponentRefKind::Import
        } else {
            return None;
        };
        Some(ComponentRef {
            kind,
            specifier: strip_interpolations(caps.get(2)?.as_str()),
        })
    })
}

/// AST 解析に失敗したファイル向けのフォールバック抽出。
///
/// 要素が `path:` / `component:` を持つオブジェクトの配列をルート配列とみなす。
/// 見つけた配列の内側 (children) は配列ごと再帰的に処理するので二重には数えない。
pub fn scan_route_declarations(text: &str, loaders: &[String]) -> Vec<RawDeclaration> {
    let bytes = text.as_bytes();
    let mut declarations = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if let Some(end) = skip_literal(text, i) {
            match end {
                Some(end) => {
                    i = end + 1;
                    continue;
                }
                None => break,
            }
        }
        if bytes[i] == b'[' {
            if let Some(close) = matching_close(text, i) {
                let inner = &text[i + 1..close];
                if is_route_array(inner) {
                    declarations.extend(parse_route_array(inner, loaders));
                    i = close + 1;
                    continue;
                }
            }
        }
        i += 1;
    }
    declarations
}

fn is_route_array(inner: &str) -> bool {
    split_top_level(inner, b',').into_iter().any(|element| {
        object_body(element).is_some_and(|body| {
            object_props(body)
                .iter()
                .any(|(key, _)| key == "path" || key == "component")
        })
    })
}

fn parse_route_array(inner: &str, loaders: &[String]) -> Vec<RawDeclaration> {
    split_top_level(inner, b',')
        .into_iter()
        .filter_map(object_body)
        .filter_map(|body| parse_route_object(body, loaders))
        .collect()
}

fn parse_route_object(body: &str, loaders: &[String]) -> Option<RawDeclaration> {
    let mut path = None;
    let mut name = None;
    let mut component = None;
    let mut children = Vec::new();

    for (key, value) in object_props(body) {
        match key.as_str() {
            "path" => path = literal_value(value),
            "name" => name = literal_value(value),
            "component" => component = component_ref_in(value, loaders),
            "children" => {
                let value = value.trim();
                if value.starts_with('[') {
                    if let Some(close) = matching_close(value, 0) {
                        children = parse_route_array(&value[1..close], loaders);
                    }
                }
            }
            _ => {}
        }
    }

    Some(RawDeclaration {
        path: path?,
        name: name.filter(|n| !n.is_empty()),
        component,
        children,
    })
}

/// 文字列リテラル (補間は空文字扱い) の値
fn literal_value(expr: &str) -> Option<String> {
    if let Some(inner) = unquote(expr) {
        return Some(inner.to_string());
    }
    let expr = expr.trim();
    if expr.len() >= 2 && expr.starts_with('`') && expr.ends_with('`') {
        return Some(strip_interpolations(&expr[1..expr.len() - 1]));
    }
    None
}
