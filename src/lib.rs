//! minish ライブラリ。テストとベンチマークのためにモジュールを公開する。
//!
//! バイナリ本体は `main.rs`。1 行ごとに
//! トークナイザ → パイプラインビルダ → 起動 → 回収 の順に処理する。
//!
//! ## モジュール構成
//!
//! | モジュール | 役割 |
//! |-----------|------|
//! | [`input`] | `EINTR` をリトライする 1 バイト読み取り |
//! | [`tokenizer`] | 文字単位のトークナイザ（クォート、エスケープ、`&&`/`>>`/`||` の先読み） |
//! | [`parser`] | パイプラインビルダ（argv、リダイレクト状態、パイプ連結、`&`、構文エラー検出） |
//! | [`executor`] | プロセス起動（パイプ表、リダイレクトファイル、段ごとの fork/exec） |
//! | [`spawn`] | `fork` + `execvp` ラッパー |
//! | [`job`] | 子プロセス回収（フォアグラウンド同期待機、SIGCHLD による非同期回収） |
//! | [`builtins`] | ビルトイン（`cd`） |
//! | [`shell`] | REPL ループ（プロンプト、エラー報告、終了バナー） |
//! | [`cli`] / [`config`] / [`logging`] | 引数解析、設定、`tracing` の初期化 |
//! | [`error`] | エラー型 |

pub mod builtins;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod input;
pub mod job;
pub mod logging;
pub mod parser;
pub mod shell;
pub mod spawn;
pub mod tokenizer;
