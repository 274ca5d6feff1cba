// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};

use spa_route_api_analyzer::config::{example_config, AnalyzerConfig};
use spa_route_api_analyzer::logger::init_logger;
use spa_route_api_analyzer::report::{self, Summary};
use spa_route_api_analyzer::{Analyzer, OutputMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Csv,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// (ルート, API 呼び出し) ごとに 1 行
    Routes,
    /// (コンポーネント, API 呼び出し) ごとに 1 行
    Components,
}

impl From<Mode> for OutputMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Routes => OutputMode::Routes,
            Mode::Components => OutputMode::Components,
        }
    }
}

/// CLI 引数定義
#[derive(Parser, Debug)]
#[command(
    name = "SPA Route API Analyzer",
    version,
    about = "Vue プロジェクトのルート・コンポーネントと API 呼び出しの関係を静的に解析する CLI ツール"
)]
struct Cli {
    /// 解析対象の src ディレクトリ
    /// 例: `./my-vue-project/src`
    #[arg(value_name = "SRC", default_value = "./src")]
    src: PathBuf,

    /// 出力ファイル (省略時は設定の output.filename、`--format json` なら stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    #[arg(long, value_enum, default_value_t = Mode::Routes)]
    mode: Mode,

    /// 設定ファイル (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 解決済みのルート表と親子関係を JSON で書き出す
    #[arg(long = "routes-log", value_name = "FILE")]
    routes_log: Option<PathBuf>,

    /// サンプル設定ファイルを書き出して終了する
    #[arg(long = "init-config", value_name = "FILE")]
    init_config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[arg(long = "no-color")]
    no_color: bool,
}

fn main() -> Result<()> {
    // 1) CLI 引数をパースし、ログを初期化
    let cli = Cli::parse();
    init_logger(cli.verbose, cli.quiet, cli.no_color);

    // 2) --init-config ならサンプル設定を書いて終了
    if let Some(path) = &cli.init_config {
        let text = serde_json::to_string_pretty(&example_config())?;
        fs::write(path, text).with_context(|| format!("書き込みに失敗しました: {}", path.display()))?;
        println!("サンプル設定を作成しました: {}", path.display());
        return Ok(());
    }

    // 解析対象が無ければエラー
    if !cli.src.exists() {
        eprintln!("Error: ソースディレクトリが見つかりません: {}", cli.src.display());
        std::process::exit(1);
    }

    // 3) 設定を読み込む (ここでの失敗だけは致命的)
    let cwd = std::env::current_dir()?;
    let config = AnalyzerConfig::load(cli.config.as_deref(), &cwd).context("設定の読み込みに失敗しました")?;

    // 4) 解析
    let mode = OutputMode::from(cli.mode);
    let analyzer = Analyzer::new(&cli.src, config);
    let analysis = analyzer.run(mode);

    // 5) 出力 (JSON でファイル指定が無ければ stdout、その場合サマリ類は stderr)
    let output = match (cli.format, cli.output.clone()) {
        (Format::Json, None) => {
            println!("{}", report::to_json(&analysis.rows)?);
            None
        }
        (Format::Json, Some(path)) => {
            report::write_json(&path, &analysis.rows)?;
            Some(path)
        }
        (Format::Csv, path) => {
            let path = path.unwrap_or_else(|| {
                let project = project_name(analyzer.paths().src_root());
                PathBuf::from(analyzer.config().output_file_name(&project))
            });
            report::write_csv(&path, &analysis.rows, mode)?;
            Some(path)
        }
    };
    let to_stdout = output.is_none();

    if let Some(path) = &cli.routes_log {
        report::write_route_log(path, &analysis.routes, &analysis.relations)?;
        notice(to_stdout, &format!("ルート表を出力しました: {}", path.display()));
    }

    // 6) サマリ (個々のファイルが失敗していても必ず出す)
    notice(to_stdout, &Summary::from_analysis(&analysis).to_string());
    if let Some(path) = &output {
        println!("出力しました: {}", path.display());
    }

    Ok(())
}

/// 結果を stdout に出した場合は stderr に回す
fn notice(to_stdout: bool, text: &str) {
    let text = text.trim_end();
    if to_stdout {
        eprintln!("{text}");
    } else {
        println!("{text}");
    }
}

/// `.../my-app/src` → `my-app`
fn project_name(src_root: &Path) -> String {
    let dir = if src_root.file_name().is_some_and(|n| n == "src") {
        src_root.parent().unwrap_or(src_root)
    } else {
        src_root
    };
    dir.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("project")
        .to_string()
}
