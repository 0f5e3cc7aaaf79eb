//! `fork()` + `execvp()` による子プロセス起動。
//!
//! ## 構成
//!
//! | 型 | 役割 |
//! |-----|------|
//! | [`CStringVec`] | argv 用の NULL 終端ポインタ配列 |
//! | [`ExecFailure`] | exec 失敗時に子が書き出す診断メッセージ（fork 前に用意） |
//! | [`spawn`] | fork して子側で fd を配線し exec する公開関数 |
//!
//! fork 後の子プロセスではヒープ確保やロック取得を行わない。必要なものは
//! すべて fork 前に確保し、子は `dup2` / `close` / `execvp` / `write` / `_exit`
//! だけを呼ぶ。

use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

use crate::error::OsError;

// ── CStringVec ────────────────────────────────────────────────────

/// argv 用の CString ベクタ。NULL 終端のポインタ配列を構築する。
struct CStringVec {
    _strings: Vec<CString>,
    ptrs: Vec<*const libc::c_char>,
}

impl CStringVec {
    /// 引数リストから構築する。内部 NUL を含む引数は NUL 以降を切り捨てる。
    fn from_args(args: &[OsString]) -> Self {
        let strings: Vec<CString> = args
            .iter()
            .map(|s| {
                let bytes = s.as_bytes();
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                CString::new(&bytes[..end]).unwrap_or_default()
            })
            .collect();
        let mut ptrs: Vec<*const libc::c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(std::ptr::null()); // NULL 終端
        Self {
            _strings: strings,
            ptrs,
        }
    }

    fn program(&self) -> *const libc::c_char {
        self.ptrs[0]
    }

    fn as_ptr(&self) -> *const *const libc::c_char {
        self.ptrs.as_ptr()
    }
}

// ── exec 失敗メッセージ ───────────────────────────────────────────

/// 子プロセス側の失敗時の診断メッセージ。全文を fork 前に組み立てておく。
struct ExecFailure {
    not_found: Vec<u8>,
    denied: Vec<u8>,
    other: Vec<u8>,
    dup_stdin: Vec<u8>,
    dup_stdout: Vec<u8>,
}

impl ExecFailure {
    fn new(command: &OsStr) -> Self {
        let line = |subject: &[u8], msg: &str| {
            let mut v = b"minish: ".to_vec();
            v.extend_from_slice(subject);
            v.extend_from_slice(b": ");
            v.extend_from_slice(msg.as_bytes());
            v.push(b'\n');
            v
        };
        let name = command.as_bytes();
        Self {
            not_found: line(name, "command not found"),
            denied: line(name, "permission denied"),
            other: line(name, "exec failed"),
            dup_stdin: line(b"dup2", "cannot redirect standard input"),
            dup_stdout: line(b"dup2", "cannot redirect standard output"),
        }
    }

    fn message(&self, errno: i32) -> &[u8] {
        match errno {
            libc::ENOENT => &self.not_found,
            libc::EACCES => &self.denied,
            _ => &self.other,
        }
    }
}

// ── 子プロセス側 ──────────────────────────────────────────────────

/// 子プロセスで fd を配線し exec する。戻らない。
///
/// # Safety
///
/// fork 直後の子プロセスからのみ呼ぶこと。
unsafe fn exec_child(
    argv: &CStringVec,
    failure: &ExecFailure,
    stdin_fd: Option<i32>,
    stdout_fd: Option<i32>,
    fds_to_close: &[i32],
) -> ! {
    if let Some(fd) = stdin_fd {
        if libc::dup2(fd, libc::STDIN_FILENO) == -1 {
            fail(&failure.dup_stdin);
        }
    }
    if let Some(fd) = stdout_fd {
        if libc::dup2(fd, libc::STDOUT_FILENO) == -1 {
            fail(&failure.dup_stdout);
        }
    }
    // dup2 済みの元 fd と、この段に無関係なパイプ端をすべて閉じる
    for fd in stdin_fd.iter().chain(stdout_fd.iter()).chain(fds_to_close) {
        if *fd > libc::STDERR_FILENO {
            libc::close(*fd);
        }
    }

    libc::execvp(argv.program(), argv.as_ptr());

    let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
    fail(failure.message(errno));
}

/// 子プロセス側で診断を stderr に書いて終了する。非同期シグナル安全な呼び出しのみ使う。
unsafe fn fail(msg: &[u8]) -> ! {
    libc::write(
        libc::STDERR_FILENO,
        msg.as_ptr() as *const libc::c_void,
        msg.len(),
    );
    libc::_exit(1);
}

// ── spawn 関数 ────────────────────────────────────────────────────

/// 子プロセスを起動する。成功時は子 PID を返す。
///
/// - `args`: コマンドと引数（`args[0]` がコマンド名、PATH 検索付き）。空であってはならない
/// - `stdin_fd`: stdin に接続する fd（`None` なら継承）
/// - `stdout_fd`: stdout に接続する fd（`None` なら継承）
/// - `fds_to_close`: 子プロセスで閉じる fd のリスト（この段が使わないパイプ端）
///
/// exec の失敗は子プロセス側で報告され、子は終了ステータス 1 で終わる。
/// ここで返すエラーは `fork` 自体の失敗のみ。
#[track_caller]
pub fn spawn(
    args: &[OsString],
    stdin_fd: Option<i32>,
    stdout_fd: Option<i32>,
    fds_to_close: &[i32],
) -> Result<libc::pid_t, OsError> {
    debug_assert!(!args.is_empty());
    let argv = CStringVec::from_args(args);
    let failure = ExecFailure::new(&args[0]);

    let pid = unsafe { libc::fork() };
    match pid {
        -1 => Err(OsError::last("fork")),
        0 => unsafe { exec_child(&argv, &failure, stdin_fd, stdout_fd, fds_to_close) },
        child => Ok(child),
    }
}
