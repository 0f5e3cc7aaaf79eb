//! 実行時設定。CLI 引数と環境変数から組み立てる。
//!
//! ログレベルの優先順位:
//! 1. `--log-level`
//! 2. 環境変数 `MINISH_LOG`（"info", "debug" など）
//! 3. `warn`

use tracing::Level;

use crate::cli::{CliArgs, LogLevel};

/// ログレベルを指定する環境変数。
pub const LOG_ENV: &str = "MINISH_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// トークン一覧表示モード。
    pub print_tokens: bool,
    pub log_level: Level,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            print_tokens: false,
            log_level: Level::WARN,
        }
    }
}

impl Config {
    /// CLI 引数と環境変数 `MINISH_LOG` から組み立てる。
    pub fn from_env(args: &CliArgs) -> Self {
        Self::resolve(args, std::env::var(LOG_ENV).ok().as_deref())
    }

    pub fn resolve(args: &CliArgs, env_level: Option<&str>) -> Self {
        let log_level = args
            .log_level
            .map(level_from_log_level)
            .or_else(|| env_level.and_then(parse_level_str))
            .unwrap_or(Level::WARN);
        Self {
            print_tokens: args.print_tokens,
            log_level,
        }
    }
}

fn level_from_log_level(lvl: LogLevel) -> Level {
    match lvl {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(v: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(v).unwrap()
    }

    #[test]
    fn default_level_is_warn() {
        let c = Config::resolve(&args(&["minish"]), None);
        assert_eq!(c, Config::default());
    }

    #[test]
    fn env_level_used_without_flag() {
        let c = Config::resolve(&args(&["minish"]), Some(" Debug "));
        assert_eq!(c.log_level, Level::DEBUG);
    }

    #[test]
    fn flag_beats_env() {
        let c = Config::resolve(&args(&["minish", "--log-level", "error"]), Some("trace"));
        assert_eq!(c.log_level, Level::ERROR);
    }

    #[test]
    fn garbage_env_falls_back() {
        let c = Config::resolve(&args(&["minish", "--print-tokens"]), Some("loud"));
        assert_eq!(c.log_level, Level::WARN);
        assert!(c.print_tokens);
    }
}
