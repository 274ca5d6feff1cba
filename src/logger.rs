//! tracing によるログ出力の初期化。
//!
//! ログは stderr に出す。

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CRATE_TARGET: &str = "spa_route_api_analyzer";

/// フラグからフィルタを決める。
///
/// 1) `--verbose` → このクレートは DEBUG
/// 2) `--quiet` → ERROR のみ
/// 3) `RUST_LOG` があればそれ
/// 4) それ以外は INFO
pub fn build_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(format!("{CRATE_TARGET}=debug"))
    } else if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("{CRATE_TARGET}=info")))
    }
}

/// プログラム開始時に一度だけ呼ぶ
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    tracing_subscriber::registry()
        .with(build_filter(verbose, quiet))
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    // グローバルな subscriber は一度しか設定できないので、フィルタの組み立てだけ確認する
    #[test]
    fn verbose_filter_targets_this_crate() {
        let filter = build_filter(true, false);
        assert!(filter.to_string().contains("spa_route_api_analyzer=debug"));
    }

    #[test]
    fn quiet_filter_is_error_only() {
        assert_eq!(build_filter(false, true).to_string(), "error");
    }
}
