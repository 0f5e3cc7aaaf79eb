//! トークナイザ: 入力を 1 文字ずつ読み、1 行分のワード/演算子トークン列を生成する。
//!
//! ## 対応構文
//!
//! - 空白区切り（スペース/タブ）
//! - ダブルクォート: `"a b"` → 1 ワード、`""` → 空文字列ワード
//! - エスケープ: `\"`, `\\` のみ（それ以外は行エラー）
//! - 単一文字演算子: `<`, `;`, `(`, `)`
//! - 二重化しうる演算子: `&`/`&&`, `>`/`>>`, `|`/`||`
//!
//! プロセスについては何も知らない。トークン列は [`parser::build`](crate::parser::build)
//! が消費する。

use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::os::unix::ffi::{OsStrExt, OsStringExt};

use crate::error::{Result, SyntaxError};
use crate::input::SignalSafeReader;

// ── トークン ─────────────────────────────────────────────────────────

/// 演算子の種別。
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Operator {
    Background,     // &
    And,            // &&
    Or,             // ||
    Pipe,           // |
    RedirectIn,     // <
    RedirectOut,    // >
    RedirectAppend, // >>
    Sequence,       // ;
    GroupOpen,      // (
    GroupClose,     // )
}

impl Operator {
    /// 演算子の表記。
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Background => "&",
            Self::And => "&&",
            Self::Or => "||",
            Self::Pipe => "|",
            Self::RedirectIn => "<",
            Self::RedirectOut => ">",
            Self::RedirectAppend => ">>",
            Self::Sequence => ";",
            Self::GroupOpen => "(",
            Self::GroupClose => ")",
        }
    }

    /// `--print-tokens` モードで表示する名前。
    pub fn name(self) -> &'static str {
        match self {
            Self::Background => "background_operator",
            Self::And => "and_operator",
            Self::Or => "or_operator",
            Self::Pipe => "pipe_operator",
            Self::RedirectIn => "input_redirection",
            Self::RedirectOut => "output_redirection",
            Self::RedirectAppend => "output_append_redirection",
            Self::Sequence => "command_separator",
            Self::GroupOpen => "open_parenthesis",
            Self::GroupClose => "close_parenthesis",
        }
    }

    fn single(c: u8) -> Option<Self> {
        match c {
            b'&' => Some(Self::Background),
            b'|' => Some(Self::Pipe),
            b'<' => Some(Self::RedirectIn),
            b'>' => Some(Self::RedirectOut),
            b';' => Some(Self::Sequence),
            b'(' => Some(Self::GroupOpen),
            b')' => Some(Self::GroupClose),
            _ => None,
        }
    }

    fn doubled(c: u8) -> Option<Self> {
        match c {
            b'&' => Some(Self::And),
            b'|' => Some(Self::Or),
            b'>' => Some(Self::RedirectAppend),
            _ => None,
        }
    }
}

/// 1 行を構成するトークン。挿入順に意味がある。
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Token {
    /// 通常ワード（空文字列もありうる）。入力のバイト列をそのまま保持する。
    Word(OsString),
    Op(Operator),
}

impl Token {
    pub fn word(s: &str) -> Self {
        Self::Word(OsString::from(s))
    }

    /// トークン一覧表示用のバイト列。ワードは入力のバイトをそのまま出す。
    pub fn listing_bytes(&self) -> Vec<u8> {
        let body = match self {
            Self::Word(w) => w.as_bytes(),
            Self::Op(op) => op.name().as_bytes(),
        };
        let mut out = Vec::with_capacity(body.len() + 2);
        out.push(b'[');
        out.extend_from_slice(body);
        out.push(b']');
        out
    }
}

/// `[word]` / `[pipe_operator]`。UTF-8 でないバイトは置換文字で表示する。
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(w) => write!(f, "[{}]", w.to_string_lossy()),
            Self::Op(op) => write!(f, "[{}]", op.name()),
        }
    }
}

// ── トークナイザ ─────────────────────────────────────────────────────

/// 1 文字処理の結果。
enum Step {
    Continue,
    LineEnd,
}

/// 文字単位のトークナイザ。状態は行ごとにリセットされる。
///
/// ワードバッファ（`word`）は行をまたいで再利用し、容量だけを保持する。
pub struct Tokenizer {
    quoting: bool,
    escaping: bool,
    /// 現在ワードを構築中か。`""` のような空ワードを表現するためバッファ長とは独立。
    word_open: bool,
    word: Vec<u8>,
    tokens: Vec<Token>,
    /// 二重演算子の先読みで消費した未処理の 1 文字。
    pending: Option<u8>,
    /// 入力終端に到達済み。端末では終端後の `read` が再びブロックするため記録しておく。
    eof: bool,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            quoting: false,
            escaping: false,
            word_open: false,
            word: Vec::with_capacity(16),
            tokens: Vec::new(),
            pending: None,
            eof: false,
        }
    }

    /// 1 行を読み取りトークン列を返す。
    ///
    /// - `Ok(None)`: この行で 1 文字も読めずに入力終端に達した
    /// - `Err(ShellError::Syntax(_))`: 行エラー。行の残りは読み捨て済み
    ///
    /// 終端記号のない最終行は終端されたものとして扱う。
    pub fn read_line<R: Read>(
        &mut self,
        reader: &mut SignalSafeReader<R>,
    ) -> Result<Option<Vec<Token>>> {
        self.reset();
        let mut line_start = true;
        loop {
            let c = match self.next_raw(reader)? {
                Some(c) => c,
                None if line_start => return Ok(None),
                None => b'\n',
            };
            line_start = false;
            match self.feed(c, reader) {
                Ok(Step::Continue) => {}
                Ok(Step::LineEnd) => break,
                Err(e) => {
                    self.reset();
                    return Err(e);
                }
            }
        }
        Ok(Some(std::mem::take(&mut self.tokens)))
    }

    /// 行開始時の状態に戻す。
    fn reset(&mut self) {
        self.quoting = false;
        self.escaping = false;
        self.word_open = false;
        self.word.clear();
        self.tokens.clear();
        self.pending = None;
    }

    fn next_raw<R: Read>(&mut self, reader: &mut SignalSafeReader<R>) -> Result<Option<u8>> {
        if let Some(c) = self.pending.take() {
            return Ok(Some(c));
        }
        if self.eof {
            return Ok(None);
        }
        let b = reader.next_byte()?;
        if b.is_none() {
            self.eof = true;
        }
        Ok(b)
    }

    /// 1 文字を優先順位どおりに処理する。
    fn feed<R: Read>(&mut self, c: u8, reader: &mut SignalSafeReader<R>) -> Result<Step> {
        // 1. 不正なエスケープ: 行の残りを捨てる（終端記号そのものなら捨てるものはない）
        if self.escaping && c != b'"' && c != b'\\' {
            if c != b'\n' && !self.eof {
                reader.discard_line()?;
            }
            return Err(SyntaxError::IllegalEscape.into());
        }

        match c {
            b' ' | b'\t' => {
                if self.quoting {
                    self.push(c);
                } else {
                    self.close_word();
                }
            }
            b'\n' => {
                if self.quoting {
                    return Err(SyntaxError::UnmatchedQuotes.into());
                }
                self.close_word();
                return Ok(Step::LineEnd);
            }
            b'\\' => {
                if self.escaping {
                    self.push(c);
                    self.escaping = false;
                } else {
                    self.escaping = true;
                }
            }
            b'"' => {
                if self.escaping {
                    self.push(c);
                    self.escaping = false;
                } else {
                    self.quoting = !self.quoting;
                    // 閉じたワードの後の `"` は新しいワードを開く（`""` は空ワード）
                    self.word_open = true;
                }
            }
            b'<' | b';' | b'(' | b')' if !self.quoting => {
                self.close_word();
                if let Some(op) = Operator::single(c) {
                    self.tokens.push(Token::Op(op));
                }
            }
            b'&' | b'>' | b'|' if !self.quoting => {
                self.close_word();
                let next = self.next_raw(reader)?;
                let op = if next == Some(c) {
                    Operator::doubled(c)
                } else {
                    // 先読み文字は未処理なので次の周回で改めて振り分ける
                    self.pending = next;
                    Operator::single(c)
                };
                if let Some(op) = op {
                    self.tokens.push(Token::Op(op));
                }
            }
            _ => self.push(c),
        }
        Ok(Step::Continue)
    }

    fn push(&mut self, c: u8) {
        self.word.push(c);
        self.word_open = true;
    }

    fn close_word(&mut self) {
        if self.word_open {
            // 容量はバッファに残し、中身だけを新しい OsString に移す
            let w = OsString::from_vec(self.word.clone());
            self.tokens.push(Token::Word(w));
            self.word.clear();
            self.word_open = false;
        }
    }

    /// 行開始時と同じ状態か（ワードバッファの容量は問わない）。
    pub fn is_reset(&self) -> bool {
        !self.quoting
            && !self.escaping
            && !self.word_open
            && self.word.is_empty()
            && self.tokens.is_empty()
            && self.pending.is_none()
    }
}

/// 文字列全体をトークン化する。テスト・ベンチマーク用の簡易 API。
///
/// 各行の結果を順に返す。
pub fn tokenize_all(input: &str) -> Vec<Result<Vec<Token>>> {
    let mut reader = SignalSafeReader::new(input.as_bytes());
    let mut tok = Tokenizer::new();
    let mut lines = Vec::new();
    loop {
        match tok.read_line(&mut reader) {
            Ok(Some(tokens)) => lines.push(Ok(tokens)),
            Ok(None) => break,
            Err(e) => lines.push(Err(e)),
        }
    }
    lines
}
