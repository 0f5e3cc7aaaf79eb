//! CLI 引数の解析（`clap` derive）。

use clap::{Parser, ValueEnum};

/// `minish` のコマンドライン引数。
#[derive(Debug, Clone, Parser)]
#[command(
    name = "minish",
    version,
    about = "A small interactive command interpreter with pipes, redirection and background jobs.",
    long_about = None
)]
pub struct CliArgs {
    /// 各行をトークン一覧として表示するだけで、コマンドは実行しない。
    #[arg(long)]
    pub print_tokens: bool,

    /// ログレベル（error, warn, info, debug, trace）。
    ///
    /// 省略時は環境変数 `MINISH_LOG`、それもなければ `warn`。
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// CLI で指定できるログレベル。
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
