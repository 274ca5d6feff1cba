// src/model.rs
use serde::Serialize;
use std::fmt;

/// ルート定義ファイルから抽出した 1 件のルート宣言 (グラフ構築前の生データ)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDeclaration {
    /// 宣言に書かれたままの path (例: "/home", "detail")
    pub path: String,

    /// name が無い宣言はルート表には入らない
    pub name: Option<String>,

    pub component: Option<ComponentRef>,

    pub children: Vec<RawDeclaration>,
}

/// `component:` に書かれた読み込み呼び出しの引数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRef {
    pub kind: ComponentRefKind,
    /// `${...}` を空文字にした後の指定子
    pub specifier: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentRefKind {
    /// `_import('/modules/x')` のようなプロジェクト独自ローダー
    Loader,
    /// `import('...')` / `require('...')`
    Import,
}

/// ルート表の 1 エントリ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteNode {
    pub name: String,

    /// 親の path と結合済みの path
    pub path: String,

    /// src ルート相対のコンポーネントファイル (例: "/views/home/index.vue")
    pub component: Option<String>,

    /// このルートを宣言していたファイル
    pub source_file: String,

    /// 1 始まりの構造上の深さ
    pub depth: u32,

    /// children で明示されていた親ルート名
    pub parent: Option<String>,
}

/// 解決の結果。未解決でも、できるところまで置換した文字列を保持する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "camelCase")]
pub enum Resolution {
    Resolved(String),
    Unresolved(String),
}

impl Resolution {
    pub fn value(&self) -> &str {
        match self {
            Resolution::Resolved(v) | Resolution::Unresolved(v) => v,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }

    pub fn resolved(&self) -> Option<&str> {
        match self {
            Resolution::Resolved(v) => Some(v),
            Resolution::Unresolved(_) => None,
        }
    }
}

/// API 関数の識別子: (関数名, 宣言モジュールのルート相対パス)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EndpointKey {
    pub function: String,
    pub module: String,
}

impl EndpointKey {
    pub fn new(function: impl Into<String>, module: impl Into<String>) -> Self {
        EndpointKey {
            function: function.into(),
            module: module.into(),
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.function, self.module)
    }
}

/// API モジュールから抽出したエンドポイント
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    pub key: EndpointKey,
    pub url: Resolution,
    pub method: Option<String>,
    pub description: String,
}

/// 出力テーブルの 1 行 = (ルートまたはコンポーネント, API 呼び出し)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRow {
    /// ルート名 (ルートモード) またはコンポーネントパス (コンポーネントモード)
    pub subject: String,
    pub route_path: String,
    pub parent: String,
    pub depth: u32,
    pub kind: String,
    pub component_path: String,
    pub api_function: String,
    pub api_module: String,
    pub method: String,
    pub url: String,
    pub url_resolved: bool,
    pub description: String,
    pub source_file: String,
    pub has_api_calls: bool,
    pub from_child: bool,
    pub child_source_path: String,
    /// 呼び出し元になった子コンポーネントの名前 (`, ` 区切り)
    pub child_components: String,
    /// 同じ子コンポーネントのパス (名前と同じ順)
    pub child_component_paths: String,
    pub component_imports: String,
}
