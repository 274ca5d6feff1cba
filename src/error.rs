//! エラー型。
//!
//! 解析処理そのものは個々のファイル単位で失敗を握りつぶして継続するため、
//! 呼び出し元まで伝播するのは設定エラーと出力書き込みエラーだけ。

use std::path::PathBuf;
use thiserror::Error;

/// 解析全体を中断させるエラー
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("設定エラー: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O エラー: {source} (path: {})", path.display())]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("JSON エラー: {0}")]
    Json(#[from] serde_json::Error),
}

/// 設定ファイルの読み込み・検証エラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("設定ファイルを読み込めません: {} ({source})", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("設定ファイルを解析できません: {} ({source})", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("必須の設定項目がありません: '{0}'")]
    Missing(&'static str),

    #[error("'{0}' は空でない配列である必要があります")]
    Empty(&'static str),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;

impl AnalyzerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnalyzerError::Io {
            source,
            path: path.into(),
        }
    }
}
