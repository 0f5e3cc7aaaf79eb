//! minish: パイプ、リダイレクト、バックグラウンド実行に対応した小さなコマンドインタプリタ。
//!
//! 起動 → SIGCHLD ハンドラ登録 → `> ` プロンプト → 1 行ずつ実行 → 入力終端で `^D` を出して終了。

use std::io;

use minish::config::Config;
use minish::shell::Shell;
use minish::{cli, logging};

fn main() {
    let args = cli::parse();
    let config = Config::from_env(&args);
    if let Err(e) = logging::init_logging(config.log_level) {
        eprintln!("minish: logging: {}", e);
    }

    let mut shell = match Shell::new(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("minish: {}", e);
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    if let Err(e) = shell.run(stdin.lock(), &mut stdout) {
        eprintln!("minish: read error: {}", e);
        std::process::exit(1);
    }

    // Shell の Drop で SIGCHLD ハンドラを元に戻してから終了する
    drop(shell);
    std::process::exit(0);
}
