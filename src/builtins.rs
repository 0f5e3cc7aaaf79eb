//! ビルトインコマンドの実装。
//!
//! ビルトインは fork/exec を経由せずプロセス内で直接実行される。
//! 現在は `cd` のみ。

use std::env;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use tracing::debug;

/// 行の先頭ワードがビルトインか。
pub fn is_builtin(name: &OsStr) -> bool {
    name == "cd"
}

/// `cd [dir]`: カレントディレクトリを変更する。引数省略時は `$HOME` に移動。
///
/// `args[0]` は `cd` 自身。引数が 2 つ以上なら何もせずエラーを出す。
pub fn cd(args: &[OsString]) -> i32 {
    let target: PathBuf = match args {
        [_] | [] => match env::var_os("HOME") {
            Some(home) => home.into(),
            None => {
                eprintln!("minish: cd: HOME not set");
                return 1;
            }
        },
        [_, dir] => dir.into(),
        _ => {
            eprintln!("minish: cd: too many arguments");
            return 1;
        }
    };

    if let Err(e) = env::set_current_dir(&target) {
        eprintln!("minish: cd: {}: {}", target.display(), e);
        1
    } else {
        debug!(dir = %target.display(), "changed directory");
        0
    }
}
