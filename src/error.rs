//! エラー型。
//!
//! 行単位のエラー（[`SyntaxError`], [`LaunchError`]）はインタプリタ自体を終了させない。
//! 呼び出し側（[`shell`](crate::shell)）が `minish: ...` 形式で stderr に報告し、
//! 次のプロンプトへ戻る。

use std::io;
use std::panic::Location;
use std::path::PathBuf;

use thiserror::Error;

/// トークナイザ・パイプラインビルダが検出する構文エラー。
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum SyntaxError {
    /// `\` の後に `"` / `\` 以外の文字が続いた。
    #[error("only the characters `\"` and `\\` can be escaped")]
    IllegalEscape,
    /// 行末までクォートが閉じられなかった。
    #[error("unmatched quotes")]
    UnmatchedQuotes,
    /// 先行するコマンドのない `|`（行頭、`| |`、行末の `|`）。
    #[error("pipe operator misuse")]
    PipeMisuse,
    /// リダイレクト演算子の直後に別の演算子が来た。
    #[error("an operator right after input/output redirection")]
    OperatorAfterRedirection,
    /// リダイレクトのファイル名の後に 2 つ目のワードが来た。
    #[error("second word after input/output redirection")]
    WordAfterRedirection,
    /// 同じ向きのストリームを 2 回リダイレクトした（`>` と `>>` の混在を含む）。
    #[error("input/output redirection used twice")]
    DoubleRedirection,
    /// リダイレクト演算子の後、ファイル名がないまま行が終わった。
    #[error("missing file name after input/output redirection")]
    MissingRedirectTarget,
    /// `&` が行末にない。
    #[error("the background operator must be at the end of the line")]
    BackgroundNotFinal,
    /// 構文上は認識するが実行をサポートしない演算子（`;`, `(`, `)`, `&&`, `||`）。
    #[error("`{0}`: feature not implemented yet")]
    NotImplemented(&'static str),
}

/// OS 呼び出しの失敗。操作名と呼び出し位置を保持する。
#[derive(Error, Debug)]
#[error("{op} failed at {location}: {source}")]
pub struct OsError {
    pub op: &'static str,
    pub location: &'static Location<'static>,
    #[source]
    pub source: io::Error,
}

impl OsError {
    /// 直前の `errno` から構築する。位置は呼び出し元。
    #[track_caller]
    pub fn last(op: &'static str) -> Self {
        Self::new(op, io::Error::last_os_error())
    }

    #[track_caller]
    pub fn new(op: &'static str, source: io::Error) -> Self {
        Self {
            op,
            location: Location::caller(),
            source,
        }
    }
}

/// プロセス起動時のエラー。
#[derive(Error, Debug)]
pub enum LaunchError {
    /// 入力リダイレクトのファイルが存在しない。パイプライン全体を起動前に中止する。
    #[error("{}: No such file or directory", .0.display())]
    MissingInput(PathBuf),
    /// リダイレクトファイルを開けなかった。
    #[error("{}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Os(#[from] OsError),
}

/// シェル全体のエラー。
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Error: {0}")]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Os(#[from] OsError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ShellError>;
