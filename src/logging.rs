//! `tracing` + `tracing-subscriber` によるログ設定。
//!
//! ログは stderr に出す。stdout はプロンプトと子プロセスの出力専用。
//! SIGCHLD ハンドラからは決してログを出さない（非同期シグナル安全でないため）。

use tracing::Level;
use tracing_subscriber::fmt;

/// グローバルなサブスクライバを登録する。起動時に 1 回だけ呼ぶ。
pub fn init_logging(level: Level) -> Result<(), String> {
    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| e.to_string())
}
