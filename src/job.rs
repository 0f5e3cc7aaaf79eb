//! 子プロセスの回収（reap）。
//!
//! - フォアグラウンド: [`ForegroundWait::wait_all`] でパイプラインの全 PID の終了を同期待機
//! - バックグラウンド: SIGCHLD ハンドラが `waitpid(-1, WNOHANG)` で非同期に回収
//!
//! 同じ PID を両側で二重に回収しないよう、フォアグラウンド待機中は
//! [`FOREGROUND_ACTIVE`] を立てる。ハンドラはこのフラグを見て何もせずに戻り、
//! その間の終了はすべて同期側のループが回収する。フラグはパイプラインの
//! 起動前に立てるので、起動直後に終了した子をハンドラが先に回収することもない。

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use libc::pid_t;
use tracing::{debug, trace};

use crate::error::OsError;

/// フォアグラウンド待機中は `true`。SIGCHLD ハンドラはこの間何もしない。
static FOREGROUND_ACTIVE: AtomicBool = AtomicBool::new(false);

/// SIGCHLD ハンドラが回収した子プロセスの累計。
static BACKGROUND_REAPED: AtomicUsize = AtomicUsize::new(0);

// ── 終了ステータス ───────────────────────────────────────────────────

/// `waitpid` の raw status を終了コードに変換する。シグナル終了は `128 + signo`。
pub fn exit_code(raw_status: i32) -> i32 {
    if libc::WIFEXITED(raw_status) {
        libc::WEXITSTATUS(raw_status)
    } else if libc::WIFSIGNALED(raw_status) {
        128 + libc::WTERMSIG(raw_status)
    } else {
        1
    }
}

// ── SIGCHLD ハンドラ ─────────────────────────────────────────────────

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__errno_location()
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
unsafe fn errno_location() -> *mut libc::c_int {
    libc::__error()
}

/// 非同期シグナル安全な stderr 出力。
fn write_stderr(msg: &[u8]) {
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            msg.as_ptr() as *const libc::c_void,
            msg.len(),
        );
    }
}

/// 終了済みの子を残らず非ブロッキングで回収する。回収数を返す。
///
/// シグナルハンドラから呼ばれるため、`waitpid` と `write` 以外は使わない。
fn drain_exited() -> usize {
    let mut reaped = 0;
    loop {
        let pid = unsafe { libc::waitpid(-1, std::ptr::null_mut(), libc::WNOHANG) };
        if pid > 0 {
            reaped += 1;
            continue;
        }
        if pid == -1 {
            let errno = unsafe { *errno_location() };
            match errno {
                libc::ECHILD => {}
                libc::EINTR => continue,
                libc::EINVAL => write_stderr(b"minish: waitpid: invalid options\n"),
                _ => write_stderr(b"minish: waitpid: unexpected errno\n"),
            }
        }
        break;
    }
    reaped
}

extern "C" fn reap_background(_signo: libc::c_int) {
    if FOREGROUND_ACTIVE.load(Ordering::SeqCst) {
        return;
    }
    // 中断された側の errno を壊さない
    let saved = unsafe { *errno_location() };
    let reaped = drain_exited();
    BACKGROUND_REAPED.fetch_add(reaped, Ordering::SeqCst);
    unsafe {
        *errno_location() = saved;
    }
}

#[track_caller]
fn set_sigchld(handler: libc::sighandler_t) -> Result<(), OsError> {
    unsafe {
        let mut act: libc::sigaction = std::mem::zeroed();
        act.sa_sigaction = handler;
        libc::sigemptyset(&mut act.sa_mask);
        // SA_RESTART なし: ブロッキング read は EINTR で戻り、input 層がリトライする
        act.sa_flags = libc::SA_NOCLDSTOP;
        if libc::sigaction(libc::SIGCHLD, &act, std::ptr::null_mut()) == -1 {
            return Err(OsError::last("sigaction"));
        }
    }
    Ok(())
}

// ── ProcessControl ───────────────────────────────────────────────────

/// SIGCHLD ハンドラの登録期間を表すハンドル。
///
/// [`install`](Self::install) でハンドラを登録し、Drop で `SIG_DFL` に戻す。
/// プロセス全体で同時に 1 つだけ存在させること。
pub struct ProcessControl {
    _private: (),
}

impl ProcessControl {
    pub fn install() -> Result<Self, OsError> {
        FOREGROUND_ACTIVE.store(false, Ordering::SeqCst);
        set_sigchld(reap_background as extern "C" fn(libc::c_int) as libc::sighandler_t)?;
        debug!("SIGCHLD handler installed");
        Ok(Self { _private: () })
    }

    /// フォアグラウンド待機を開始する。パイプラインを起動する前に呼ぶこと。
    pub fn foreground(&self) -> ForegroundWait<'_> {
        FOREGROUND_ACTIVE.store(true, Ordering::SeqCst);
        ForegroundWait { _control: self }
    }

    /// 取りこぼした終了済みの子を非ブロッキングで回収する。各行の処理後に呼ばれる。
    pub fn reap_pending(&self) -> usize {
        let n = drain_exited();
        if n > 0 {
            trace!(reaped = n, "reaped pending children");
        }
        n
    }

    /// SIGCHLD ハンドラがこれまでに回収した子の数。
    pub fn background_reaped(&self) -> usize {
        BACKGROUND_REAPED.load(Ordering::SeqCst)
    }
}

impl Drop for ProcessControl {
    fn drop(&mut self) {
        if let Err(e) = set_sigchld(libc::SIG_DFL) {
            eprintln!("minish: {}", e);
        }
        debug!("SIGCHLD handler restored to default");
    }
}

// ── フォアグラウンド待機 ─────────────────────────────────────────────

/// フォアグラウンド待機の期間。生存中は SIGCHLD ハンドラが回収を行わない。
///
/// Drop でフラグを下ろし、待機中に届いた終了通知の取りこぼしを回収する。
pub struct ForegroundWait<'a> {
    _control: &'a ProcessControl,
}

impl ForegroundWait<'_> {
    /// `pids` の全プロセスが終了するまでブロックする。
    ///
    /// `waitpid(-1)` で任意の子の終了を待ち、`pids` に含まれないもの（以前の
    /// バックグラウンドジョブ）は読み捨てる。戻り値は最後の段の終了コード
    /// （`pids` が空なら 0）。
    pub fn wait_all(&self, pids: &[pid_t]) -> Result<i32, OsError> {
        let mut remaining: Vec<pid_t> = pids.to_vec();
        let mut last_status = 0;
        let last_pid = pids.last().copied();

        while !remaining.is_empty() {
            let mut raw_status: i32 = 0;
            let pid = unsafe { libc::waitpid(-1, &mut raw_status, 0) };
            if pid == -1 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(libc::EINTR) => continue,
                    // 待つべき子がもういない
                    Some(libc::ECHILD) => break,
                    _ => return Err(OsError::new("waitpid", err)),
                }
            }

            match remaining.iter().position(|&p| p == pid) {
                Some(i) => {
                    remaining.swap_remove(i);
                    let code = exit_code(raw_status);
                    debug!(pid, code, "foreground stage exited");
                    if Some(pid) == last_pid {
                        last_status = code;
                    }
                }
                None => trace!(pid, "reaped orphaned background child"),
            }
        }
        Ok(last_status)
    }
}

impl Drop for ForegroundWait<'_> {
    fn drop(&mut self) {
        FOREGROUND_ACTIVE.store(false, Ordering::SeqCst);
        // フラグが立っている間に届いた SIGCHLD は無視されているので、ここで回収する
        let n = drain_exited();
        if n > 0 {
            trace!(reaped = n, "reaped children after foreground wait");
        }
    }
}
