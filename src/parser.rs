//! パイプラインビルダ: トークン列からコマンド記述子の列を構築する。
//!
//! リダイレクト、パイプ、バックグラウンド指定に関する構文検査はすべてここで行う。
//! システムコールは一切呼ばない（パイプは [`executor`](crate::executor) が
//! 行全体の検査が通った後に作成する）ため、構文エラーで fd がリークすることはない。
//!
//! ## 検出するエラー
//!
//! | 入力例 | エラー |
//! |--------|--------|
//! | `\| ls`, `ls \| \| wc`, `ls \|` | [`SyntaxError::PipeMisuse`] |
//! | `ls > \| wc` | [`SyntaxError::OperatorAfterRedirection`] |
//! | `ls > out extra` | [`SyntaxError::WordAfterRedirection`] |
//! | `ls > a > b`, `ls > a >> b` | [`SyntaxError::DoubleRedirection`] |
//! | `ls >` | [`SyntaxError::MissingRedirectTarget`] |
//! | `ls &x` | [`SyntaxError::BackgroundNotFinal`] |
//! | `a ; b`, `a && b`, `(a)` | [`SyntaxError::NotImplemented`] |

use std::ffi::{OsStr, OsString};

use libc::pid_t;

use crate::error::SyntaxError;
use crate::tokenizer::{Operator, Token};

// ── コマンド記述子 ───────────────────────────────────────────────────

/// ストリーム 1 方向分のリダイレクト状態。
///
/// `awaiting_filename` なら必ず `active`。
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct IoStatus {
    pub active: bool,
    pub awaiting_filename: bool,
    pub filename: Option<OsString>,
}

impl IoStatus {
    fn start(&mut self) {
        self.active = true;
        self.awaiting_filename = true;
    }

    /// 有効かつファイル名が確定していればそのファイル名。
    pub fn target(&self) -> Option<&OsStr> {
        if self.active {
            self.filename.as_deref()
        } else {
            None
        }
    }
}

/// リダイレクト対象のストリーム。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Input,
    OutputTrunc,
    OutputAppend,
}

/// パイプラインの 1 段。
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Command {
    /// 実行するプログラムと引数。入力のバイト列のまま保持し、NULL 終端は spawn 時に付与する。
    pub argv: Vec<OsString>,
    pub input: IoStatus,
    pub output_trunc: IoStatus,
    pub output_append: IoStatus,
    /// 起動後に executor が設定する。
    pub pid: Option<pid_t>,
}

impl Command {
    /// ファイル名待ちのストリームがあれば返す。
    fn awaiting_mut(&mut self) -> Option<&mut IoStatus> {
        [
            &mut self.input,
            &mut self.output_trunc,
            &mut self.output_append,
        ]
        .into_iter()
        .find(|io| io.awaiting_filename)
    }

    fn is_awaiting(&self) -> bool {
        self.input.awaiting_filename
            || self.output_trunc.awaiting_filename
            || self.output_append.awaiting_filename
    }

    fn has_redirection(&self) -> bool {
        self.input.active || self.output_trunc.active || self.output_append.active
    }

    /// 引数もリダイレクトもない空の段か。
    pub fn is_empty(&self) -> bool {
        self.argv.is_empty() && !self.has_redirection()
    }

    /// 出力リダイレクト先（`>` または `>>`）。`bool` は追記モードか。
    pub fn output_target(&self) -> Option<(&OsStr, bool)> {
        self.output_trunc
            .target()
            .map(|f| (f, false))
            .or_else(|| self.output_append.target().map(|f| (f, true)))
    }

    fn start_redirect(&mut self, stream: Stream) -> Result<(), SyntaxError> {
        let taken = match stream {
            Stream::Input => self.input.active,
            Stream::OutputTrunc | Stream::OutputAppend => {
                self.output_trunc.active || self.output_append.active
            }
        };
        if taken {
            return Err(SyntaxError::DoubleRedirection);
        }
        match stream {
            Stream::Input => self.input.start(),
            Stream::OutputTrunc => self.output_trunc.start(),
            Stream::OutputAppend => self.output_append.start(),
        }
        Ok(())
    }
}

/// 1 行分のパイプライン。段は左から右の実行順。
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Pipeline {
    pub stages: Vec<Command>,
    /// 末尾に `&` が指定された場合に `true`。
    pub background: bool,
}

impl Pipeline {
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// 段間のパイプ数（段数 - 1）。
    pub fn pipe_count(&self) -> usize {
        self.stages.len().saturating_sub(1)
    }

    /// 先頭段の `argv[0]`。
    pub fn program(&self) -> Option<&OsStr> {
        self.stages
            .first()
            .and_then(|c| c.argv.first())
            .map(|s| s.as_os_str())
    }

    /// 起動済みの段の PID。
    pub fn pids(&self) -> Vec<pid_t> {
        self.stages.iter().filter_map(|c| c.pid).collect()
    }
}

// ── ビルダ ───────────────────────────────────────────────────────────

/// トークン列をパイプラインに変換する。空の行なら `Ok(None)`。
pub fn build(tokens: &[Token]) -> Result<Option<Pipeline>, SyntaxError> {
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut stages = Vec::new();
    let mut cur = Command::default();
    let mut background = false;

    for token in tokens {
        if background {
            return Err(SyntaxError::BackgroundNotFinal);
        }
        match token {
            Token::Word(w) => {
                if let Some(io) = cur.awaiting_mut() {
                    io.filename = Some(w.clone());
                    io.awaiting_filename = false;
                } else if cur.has_redirection() {
                    return Err(SyntaxError::WordAfterRedirection);
                } else {
                    cur.argv.push(w.clone());
                }
            }
            Token::Op(op) => {
                if cur.is_awaiting() {
                    return Err(SyntaxError::OperatorAfterRedirection);
                }
                match op {
                    Operator::Pipe => {
                        if cur.is_empty() {
                            return Err(SyntaxError::PipeMisuse);
                        }
                        stages.push(std::mem::take(&mut cur));
                    }
                    Operator::RedirectIn => cur.start_redirect(Stream::Input)?,
                    Operator::RedirectOut => cur.start_redirect(Stream::OutputTrunc)?,
                    Operator::RedirectAppend => cur.start_redirect(Stream::OutputAppend)?,
                    Operator::Background => background = true,
                    Operator::Sequence
                    | Operator::GroupOpen
                    | Operator::GroupClose
                    | Operator::And
                    | Operator::Or => return Err(SyntaxError::NotImplemented(op.symbol())),
                }
            }
        }
    }

    if cur.is_awaiting() {
        return Err(SyntaxError::MissingRedirectTarget);
    }
    // 行末の `|`
    if !stages.is_empty() && cur.is_empty() {
        return Err(SyntaxError::PipeMisuse);
    }
    stages.push(cur);

    Ok(Some(Pipeline { stages, background }))
}
