use swc_common::{sync::Lrc, FileName, SourceMap};
use swc_ecma_ast::*;
use swc_ecma_parser::{lexer::Lexer, Parser as SwcParser, StringInput, Syntax, TsConfig};
use swc_ecma_visit::{Visit, VisitWith};
use std::collections::HashMap;

use std::path::Path;
use tracing::{debug, warn};

use crate::model::{ComponentRef, ComponentRefKind, RawDeclaration};
use crate::scanner;

/// AST をトラバースしてルート宣言を抽出するための Visitor
struct RouteVisitor<'a> {
    /// `_import` のようなプロジェクト独自ローダー
    loaders: &'a [String],
    /// 見つかったルート宣言
    pub routes: Vec<RawDeclaration>,
    /// `import Home from '...'` のデフォルト import (ローカル名 → 指定子)
    default_imports: HashMap<String, String>,
}

impl<'a> RouteVisitor<'a> {
    fn new(loaders: &'a [String]) -> Self {
        RouteVisitor {
            loaders,
            routes: Vec::new(),
            default_imports: HashMap::new(),
        }
    }

    /// ObjectLit (例: `{ path: "/home", name: "home", component: _import("/modules/home") }`) を
    /// RawDeclaration に変換する。path が無ければ `None`。
    fn parse_route_object(&self, obj_lit: &ObjectLit) -> Option<RawDeclaration> {
        let mut path: Option<String> = None;
        let mut name: Option<String> = None;
        let mut component: Option<ComponentRef> = None;
        let mut children: Vec<RawDeclaration> = Vec::new();

        for prop in &obj_lit.props {
            let PropOrSpread::Prop(boxed_prop) = prop else {
                continue;
            };
            match &**boxed_prop {
                Prop::KeyValue(KeyValueProp { key, value }) => {
                    let Some(key_name) = prop_name(key) else {
                        continue;
                    };
                    match key_name.as_str() {
                        "path" => path = literal_text(value),
                        "name" => name = literal_text(value),
                        "component" => component = self.component_ref(value),
                        "children" => {
                            if let Expr::Array(arr_lit) = unwrap_paren(value) {
                                children = self.extract_routes_from_array(arr_lit);
                            }
                        }
                        _ => {}
                    }
                }
                // `{ path: '/x', component }` の省略記法
                Prop::Shorthand(ident) if &*ident.sym == "component" => {
                    component = self.imported_component(&ident.sym);
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

    /// 配列からルート宣言を抽出する
    fn extract_routes_from_array(&self, arr_lit: &ArrayLit) -> Vec<RawDeclaration> {
        arr_lit
            .elems
            .iter()
            .flatten()
            .filter_map(|elem| match unwrap_paren(&elem.expr) {
                Expr::Object(obj_lit) => self.parse_route_object(obj_lit),
                _ => None,
            })
            .collect()
    }

    fn component_ref(&self, value: &Expr) -> Option<ComponentRef> {
        if let Expr::Ident(ident) = unwrap_paren(value) {
            return self.imported_component(&ident.sym);
        }
        let mut visitor = ComponentRefVisitor {
            loaders: self.loaders,
            found: None,
        };
        value.visit_with(&mut visitor);
        visitor.found
    }

    fn imported_component(&self, local: &str) -> Option<ComponentRef> {
        self.default_imports.get(local).map(|specifier| ComponentRef {
            kind: ComponentRefKind::Import,
            specifier: specifier.clone(),
        })
    }
}

impl Visit for RouteVisitor<'_> {
    fn visit_import_decl(&mut self, import: &ImportDecl) {
        for specifier in &import.specifiers {
            if let ImportSpecifier::Default(default) = specifier {
                self.default_imports
                    .insert(default.local.sym.to_string(), import.src.value.to_string());
            }
        }
    }

    /// ルート配列を見つけたら丸ごと抽出し、内側 (children) には降りない
    fn visit_array_lit(&mut self, arr_lit: &ArrayLit) {
        if is_route_array(arr_lit) {
            let extracted = self.extract_routes_from_array(arr_lit);
            debug!("ルート配列発見: {} 要素 → {} 件", arr_lit.elems.len(), extracted.len());
            self.routes.extend(extracted);
            return;
        }
        arr_lit.visit_children_with(self);
    }

    /// `const home = { path: '/home', component: ... }` のような単独オブジェクトの変数
    fn visit_var_declarator(&mut self, declarator: &VarDeclarator) {
        if let Some(init) = &declarator.init {
            if let Expr::Object(obj_lit) = unwrap_paren(init) {
                if is_standalone_route(obj_lit) {
                    if let Some(route) = self.parse_route_object(obj_lit) {
                        debug!("単独ルートオブジェクト発見: {}", route.path);
                        self.routes.push(route);
                    }
                    return;
                }
            }
        }
        declarator.visit_children_with(self);
    }
}

/// 動的 import / require / ローダー呼び出しの最初の文字列引数を探す Visitor
struct ComponentRefVisitor<'a> {
    loaders: &'a [String],
    found: Option<ComponentRef>,
}

impl Visit for ComponentRefVisitor<'_> {
    fn visit_call_expr(&mut self, call: &CallExpr) {
        if self.found.is_some() {
            return;
        }

        let kind = match &call.callee {
            Callee::Import(_) => Some(ComponentRefKind::Import),
            Callee::Expr(expr) => match &**expr {
                Expr::Ident(ident) if self.loaders.iter().any(|l| l.as_str() == &*ident.sym) => {
                    Some(ComponentRefKind::Loader)
                }
                Expr::Ident(ident) if &*ident.sym == "require" => Some(ComponentRefKind::Import),
                _ => None,
            },
            _ => None,
        };

        if let Some(kind) = kind {
            let specifier = call.args.first().and_then(|arg| match unwrap_paren(&arg.expr) {
                // require(['@/views/x'], resolve)
                Expr::Array(arr_lit) => arr_lit
                    .elems
                    .iter()
                    .flatten()
                    .next()
                    .and_then(|elem| literal_text(&elem.expr)),
                other => literal_text(other),
            });
            if let Some(specifier) = specifier {
                self.found = Some(ComponentRef { kind, specifier });
                return;
            }
        }

        call.visit_children_with(self);
    }
}

fn prop_name(key: &PropName) -> Option<String> {
    match key {
        PropName::Ident(ident) => Some(ident.sym.to_string()),
        PropName::Str(Str { value, .. }) => Some(value.to_string()),
        _ => None,
    }
}

fn unwrap_paren(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(ParenExpr { expr, .. }) => unwrap_paren(expr),
        other => other,
    }
}

/// 文字列リテラルの値。テンプレートは `${...}` を空文字にして連結する。
fn literal_text(expr: &Expr) -> Option<String> {
    match unwrap_paren(expr) {
        Expr::Lit(Lit::Str(Str { value, .. })) => Some(value.to_string()),
        Expr::Tpl(Tpl { quasis, .. }) => Some(quasis.iter().map(|q| q.raw.to_string()).collect()),
        _ => None,
    }
}

fn object_keys(obj_lit: &ObjectLit) -> Vec<String> {
    obj_lit
        .props
        .iter()
        .filter_map(|prop| match prop {
            PropOrSpread::Prop(boxed_prop) => match &**boxed_prop {
                Prop::KeyValue(KeyValueProp { key, .. }) => prop_name(key),
                Prop::Shorthand(ident) => Some(ident.sym.to_string()),
                _ => None,
            },
            PropOrSpread::Spread(_) => None,
        })
        .collect()
}

/// 要素のどれかが `path` か `component` を持つオブジェクトならルート配列
fn is_route_array(arr_lit: &ArrayLit) -> bool {
    arr_lit.elems.iter().flatten().any(|elem| match unwrap_paren(&elem.expr) {
        Expr::Object(obj_lit) => object_keys(obj_lit)
            .iter()
            .any(|key| key == "path" || key == "component"),
        _ => false,
    })
}

fn is_standalone_route(obj_lit: &ObjectLit) -> bool {
    let keys = object_keys(obj_lit);
    keys.iter().any(|k| k == "path") && keys.iter().any(|k| k == "component" || k == "children")
}

fn parse_module(source: &str, file_path: &Path) -> Result<Module, String> {
    let cm: Lrc<SourceMap> = Default::default();

    let fm = cm.new_source_file(FileName::Real(file_path.to_path_buf()), source.to_string());

    // TypeScript 構文でパースする (素の JS もそのまま通る)
    let syntax = Syntax::Typescript(TsConfig {
        tsx: false,
        decorators: true,
        dts: false,
        no_early_errors: true,
        disallow_ambiguous_jsx_like: true,
    });

    let lexer = Lexer::new(
        syntax,
        Default::default(), // es version
        StringInput::from(&*fm),
        None,
    );

    let mut parser = SwcParser::new_from(lexer);

    parser.parse_module().map_err(|e| format!("{:?}", e.kind()))
}

/// ルート定義ファイルのテキストからルート宣言を抽出する。
///
/// AST 解析が第一。構文エラーで解析できないファイルは
/// 文字列・括弧を意識したスキャナで同じ形の宣言を拾う。
pub fn extract_route_declarations(
    source: &str,
    file_path: &Path,
    loaders: &[String],
) -> Vec<RawDeclaration> {
    match parse_module(source, file_path) {
        Ok(module) => {
            let mut visitor = RouteVisitor::new(loaders);
            visitor.visit_module(&module);
            visitor.routes
        }
        Err(err) => {
            warn!(
                "AST 解析に失敗したためスキャナで抽出します: {} ({err})",
                file_path.display()
            );
            scanner::scan_route_declarations(source, loaders)
        }
    }
}
