//! 解析器の設定。
//!
//! 優先順位: `--config` で指定したファイル > カレントディレクトリの
//! `route-api-analyzer.config.json` > 組み込みデフォルト。
//! ユーザー設定はデフォルトの上にディープマージされる。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::ConfigError;

/// カレントディレクトリで自動的に探すプロジェクト設定ファイル名
pub const PROJECT_CONFIG_FILE: &str = "route-api-analyzer.config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzerConfig {
    pub paths: PathsConfig,
    pub url_constants: UrlConstantsConfig,
    pub analysis: AnalysisConfig,
    pub filters: FilterConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathsConfig {
    pub base_url: BaseUrlPaths,
    pub routes: RoutePaths,
    pub api: ApiPaths,
    pub views: ViewPaths,
}

/// baseUrl 定義ファイルの候補 (src ルートからの相対パス)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BaseUrlPaths {
    pub search_paths: Vec<String>,
}

/// ルート定義ファイルの候補。最も内側のファイルから順に並べる。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutePaths {
    pub search_paths: Vec<String>,
    /// `_import('/modules/x')` のようなプロジェクト独自のローダー関数名
    pub loader_functions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiPaths {
    pub directories: Vec<String>,
    pub extensions: Vec<String>,
    /// URL を受け取る HTTP クライアント関数名 (`request({ url })` など)
    pub request_callees: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewPaths {
    pub root: String,
    pub extension: String,
    pub alias: String,
    pub mappings: Vec<ViewPathMapping>,
}

/// コンポーネント参照のプレフィックス書き換えルール
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewPathMapping {
    pub from: String,
    pub to: String,
}

/// シンボルを解決できなかったときに使う定数名 → URL の対応表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UrlConstantsConfig {
    pub mappings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisConfig {
    pub max_traversal_depth: usize,
    pub max_symbol_depth: usize,
    pub description_max_chars: usize,
    pub comment_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterConfig {
    /// 子コンポーネントとして扱わない import パスの部分文字列
    pub component_skip_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputConfig {
    pub filename: String,
}

impl Default for BaseUrlPaths {
    fn default() -> Self {
        BaseUrlPaths {
            search_paths: strings(&[
                "api/baseUrl.js",
                "utils/baseUrl.js",
                "config/baseUrl.js",
                "constants/baseUrl.js",
                "common/baseUrl.js",
            ]),
        }
    }
}

impl Default for RoutePaths {
    fn default() -> Self {
        RoutePaths {
            search_paths: strings(&["router/routes.js", "router/index.js", "router/index.ts"]),
            loader_functions: strings(&["_import"]),
        }
    }
}

impl Default for ApiPaths {
    fn default() -> Self {
        ApiPaths {
            directories: strings(&["api", "views/modules"]),
            extensions: strings(&["js", "ts"]),
            request_callees: strings(&["request"]),
        }
    }
}

impl Default for ViewPaths {
    fn default() -> Self {
        ViewPaths {
            root: "views".to_string(),
            extension: "vue".to_string(),
            alias: "@/".to_string(),
            mappings: vec![ViewPathMapping {
                from: "/modules".to_string(),
                to: "/views/modules".to_string(),
            }],
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            max_traversal_depth: 3,
            max_symbol_depth: 8,
            description_max_chars: 200,
            comment_window: 300,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            component_skip_patterns: strings(&[
                "/api/",
                "/utils/",
                "/mixins/",
                "node_modules",
                "@/assets/",
                "@/styles/",
            ]),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            filename: "${projectName}_route_api_analysis.csv".to_string(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl AnalyzerConfig {
    /// 設定を読み込み、デフォルトとマージして検証する。
    ///
    /// - `custom`: `--config` で指定されたファイル (任意)
    /// - `cwd`: プロジェクト設定ファイルを探すディレクトリ
    pub fn load(custom: Option<&Path>, cwd: &Path) -> Result<Self, ConfigError> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(path) = custom {
            candidates.push(path.to_path_buf());
        }
        candidates.push(cwd.join(PROJECT_CONFIG_FILE));

        // 1) 最初に読めた設定ファイルを採用する (壊れていれば警告して次へ)
        let mut user_value: Option<Value> = None;
        for path in candidates {
            if !path.is_file() {
                continue;
            }
            match read_json(&path) {
                Ok(value) => {
                    info!("設定ファイルを読み込みました: {}", path.display());
                    user_value = Some(value);
                    break;
                }
                Err(err) => warn!("{err}"),
            }
        }

        // 2) デフォルトにマージ
        let config = match user_value {
            Some(value) => Self::from_overrides(value)?,
            None => {
                info!("組み込みのデフォルト設定を使用します");
                Self::default()
            }
        };

        // 3) 検証
        config.validate()?;
        Ok(config)
    }

    /// デフォルト設定の上に JSON の部分設定を重ねる
    pub fn from_overrides(overrides: Value) -> Result<Self, ConfigError> {
        let mut merged = serde_json::to_value(Self::default()).map_err(|source| {
            ConfigError::Parse {
                path: PathBuf::from("<default>"),
                source,
            }
        })?;
        merge_values(&mut merged, overrides);
        serde_json::from_value(merged).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<merged>"),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let arrays: [(&'static str, &Vec<String>); 3] = [
            ("paths.baseUrl.searchPaths", &self.paths.base_url.search_paths),
            ("paths.routes.searchPaths", &self.paths.routes.search_paths),
            ("paths.api.directories", &self.paths.api.directories),
        ];
        for (field, value) in arrays {
            if value.is_empty() {
                return Err(ConfigError::Empty(field));
            }
        }
        if self.paths.views.root.trim().is_empty() {
            return Err(ConfigError::Missing("paths.views.root"));
        }
        if self.paths.views.extension.trim().is_empty() {
            return Err(ConfigError::Missing("paths.views.extension"));
        }
        Ok(())
    }

    /// `output.filename` の `${projectName}` を置換した出力ファイル名
    pub fn output_file_name(&self, project_name: &str) -> String {
        self.output.filename.replace("${projectName}", project_name)
    }

    /// `.vue` のように先頭ドット付きで返すコンポーネント拡張子
    pub fn component_extension(&self) -> String {
        dotted(&self.paths.views.extension)
    }

    pub fn api_extensions(&self) -> Vec<String> {
        self.paths.api.extensions.iter().map(|e| dotted(e)).collect()
    }
}

fn dotted(ext: &str) -> String {
    let ext = ext.trim();
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}

fn read_json(path: &Path) -> Result<Value, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// オブジェクト同士はキーごとに再帰マージ、それ以外は上書き
fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                let nested = value.is_object() && target_map.get(&key).is_some_and(Value::is_object);
                if nested {
                    if let Some(existing) = target_map.get_mut(&key) {
                        merge_values(existing, value);
                    }
                } else {
                    target_map.insert(key, value);
                }
            }
        }
        (target, source) => *target = source,
    }
}

/// `--init-config` で書き出すサンプル設定
pub fn example_config() -> Value {
    serde_json::json!({
        "urlConstants": {
            "mappings": {
                "BASE_API": "/api/v1",
                "CUSTOM_API_URL": "/your/custom/api/v1"
            }
        },
        "paths": {
            "baseUrl": {
                "searchPaths": ["api/baseUrl.js", "api/your-custom-baseUrl.js"]
            },
            "routes": {
                "searchPaths": ["router/modules/children.js", "router/routes.js", "router/index.js"]
            }
        },
        "output": {
            "filename": "${projectName}_route_api_analysis.csv"
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_valid() {
        let config = AnalyzerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.component_extension(), ".vue");
        assert_eq!(config.api_extensions(), vec![".js", ".ts"]);
    }

    #[test]
    fn overrides_merge_into_defaults() {
        let config = AnalyzerConfig::from_overrides(json!({
            "urlConstants": { "mappings": { "PATH": "/xssw/v3" } },
            "paths": { "views": { "extension": ".tsx" } }
        }))
        .unwrap();

        assert_eq!(config.url_constants.mappings["PATH"], "/xssw/v3");
        assert_eq!(config.paths.views.extension, ".tsx");
        // 上書きしていないキーはデフォルトのまま
        assert_eq!(config.paths.views.root, "views");
        assert_eq!(config.analysis.max_traversal_depth, 3);
    }

    #[test]
    fn arrays_are_replaced_not_merged() {
        let config = AnalyzerConfig::from_overrides(json!({
            "paths": { "api": { "directories": ["services"] } }
        }))
        .unwrap();
        assert_eq!(config.paths.api.directories, vec!["services"]);
    }

    #[test]
    fn empty_route_paths_fail_validation() {
        let config = AnalyzerConfig::from_overrides(json!({
            "paths": { "routes": { "searchPaths": [] } }
        }))
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Empty("paths.routes.searchPaths"))
        ));
    }

    #[test]
    fn output_file_name_substitutes_project() {
        let config = AnalyzerConfig::default();
        assert_eq!(
            config.output_file_name("shop"),
            "shop_route_api_analysis.csv"
        );
    }

    #[test]
    fn load_falls_back_to_defaults_for_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();

        let config = AnalyzerConfig::load(Some(&broken), dir.path()).unwrap();
        assert_eq!(config.paths.views.root, "views");
    }

    #[test]
    fn load_reads_project_config_from_cwd() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            r#"{ "analysis": { "maxTraversalDepth": 5 } }"#,
        )
        .unwrap();

        let config = AnalyzerConfig::load(None, dir.path()).unwrap();
        assert_eq!(config.analysis.max_traversal_depth, 5);
    }
}
