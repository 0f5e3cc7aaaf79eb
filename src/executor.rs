//! コマンド実行: ビルトイン判定、リダイレクト適用、パイプライン接続、回収。
//!
//! - [`execute`]: 1 行分のパイプラインを実行し、フォアグラウンドなら全段の終了を待つ
//! - `cd` で始まる行: fork せずプロセス内で [`builtins::cd`] を実行
//! - それ以外: [`launch`] で各段を fork/exec
//!   - 入力リダイレクトのファイルは全段ぶんを起動前に開く（存在しなければ 1 段も起動しない）
//!   - 出力リダイレクトは段ごとに create/truncate または create/append で開く
//!   - 全段の起動後、親に残ったパイプ fd をすべて閉じる

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use tracing::{debug, warn};

use crate::builtins;
use crate::error::{LaunchError, OsError};
use crate::job::ProcessControl;
use crate::parser::{Command, Pipeline};
use crate::spawn;

// ── パイプ表 ─────────────────────────────────────────────────────────

/// 段間のパイプの表。`pipes[i]` は段 `i` の stdout と段 `i + 1` の stdin をつなぐ。
///
/// 閉じた端は `-1`。Drop で残りをすべて閉じる。
pub struct PipeTable {
    pipes: Vec<[i32; 2]>,
}

impl PipeTable {
    /// `n` 個のパイプを作成する。途中で失敗したら作成済みのものを閉じる。
    #[track_caller]
    pub fn open(n: usize) -> Result<Self, OsError> {
        let mut table = Self {
            pipes: Vec::with_capacity(n),
        };
        for _ in 0..n {
            let mut fds = [-1i32; 2];
            if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
                // table の Drop が作成済みのパイプを閉じる
                return Err(OsError::last("pipe"));
            }
            table.pipes.push(fds);
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }

    /// 段 `stage` が stdin として読むパイプの読み取り端。
    fn read_end_for(&self, stage: usize) -> Option<i32> {
        stage
            .checked_sub(1)
            .and_then(|i| self.pipes.get(i))
            .map(|p| p[0])
            .filter(|&fd| fd >= 0)
    }

    /// 段 `stage` が stdout として書くパイプの書き込み端。
    fn write_end_for(&self, stage: usize) -> Option<i32> {
        self.pipes.get(stage).map(|p| p[1]).filter(|&fd| fd >= 0)
    }

    /// まだ開いている fd のうち `keep` 以外。
    fn open_fds_except(&self, keep: &[Option<i32>]) -> Vec<i32> {
        self.pipes
            .iter()
            .flatten()
            .copied()
            .filter(|&fd| fd >= 0 && !keep.contains(&Some(fd)))
            .collect()
    }

    /// 段 `stage` に渡し終えたパイプ端を親側で閉じる。
    fn release_stage(&mut self, stage: usize) {
        if let Some(i) = stage.checked_sub(1) {
            close_fd(&mut self.pipes[i][0]);
        }
        if let Some(p) = self.pipes.get_mut(stage) {
            close_fd(&mut p[1]);
        }
    }

    /// 開いている fd の数。
    pub fn open_count(&self) -> usize {
        self.pipes.iter().flatten().filter(|&&fd| fd >= 0).count()
    }

    pub fn close_all(&mut self) {
        for p in &mut self.pipes {
            close_fd(&mut p[0]);
            close_fd(&mut p[1]);
        }
    }
}

impl Drop for PipeTable {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn close_fd(fd: &mut i32) {
    if *fd >= 0 {
        unsafe {
            libc::close(*fd);
        }
        *fd = -1;
    }
}

// ── リダイレクト ─────────────────────────────────────────────────────

/// 入力リダイレクトのファイルを開く。
fn open_input(cmd: &Command) -> Result<Option<File>, LaunchError> {
    let Some(path) = cmd.input.target().map(Path::new) else {
        return Ok(None);
    };
    match File::open(path) {
        Ok(f) => Ok(Some(f)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(LaunchError::MissingInput(path.to_path_buf()))
        }
        Err(e) => Err(LaunchError::Open {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// 出力リダイレクトのファイルを開く。`>` は truncate、`>>` は append。
///
/// パーミッションは 0666（umask 適用）。
fn open_output(cmd: &Command) -> Result<Option<File>, LaunchError> {
    let Some((path, append)) = cmd.output_target() else {
        return Ok(None);
    };
    let mut opts = OpenOptions::new();
    opts.write(true).create(true);
    if append {
        opts.append(true);
    } else {
        opts.truncate(true);
    }
    opts.open(path).map(Some).map_err(|e| LaunchError::Open {
        path: Path::new(path).to_path_buf(),
        source: e,
    })
}

// ── 起動 ─────────────────────────────────────────────────────────────

/// パイプラインの全段を起動し、各段の `pid` を設定する。
///
/// 処理の流れ:
/// 1. 全段の入力リダイレクトを開く（失敗したら何も起動せずに返る）
/// 2. 段数 - 1 個のパイプを作成
/// 3. 各段: 出力リダイレクトを開き、stdin/stdout を決めて fork/exec。
///    子は自分の段に無関係なパイプ端をすべて閉じる
/// 4. 親は段に渡したパイプ端とリダイレクトのファイルを閉じる
///
/// 途中の段でエラーが起きた場合、残りの段は起動しない。起動済みの段の
/// `pid` は設定されたままなので、呼び出し側がそれらを回収する。
pub fn launch(pipeline: &mut Pipeline) -> Result<(), LaunchError> {
    let mut inputs = pipeline
        .stages
        .iter()
        .map(open_input)
        .collect::<Result<Vec<_>, _>>()?;

    let mut pipes = PipeTable::open(pipeline.pipe_count())?;

    // 子が fork 時に親のバッファを複製しないよう先に吐き出す
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();

    for (i, cmd) in pipeline.stages.iter_mut().enumerate() {
        let input = inputs[i].take();
        let output = open_output(cmd)?;

        // リダイレクトがパイプより優先（各方向で有効なのは高々 1 つ）
        let stdin_fd = input
            .as_ref()
            .map(|f| f.as_raw_fd())
            .or_else(|| pipes.read_end_for(i));
        let stdout_fd = output
            .as_ref()
            .map(|f| f.as_raw_fd())
            .or_else(|| pipes.write_end_for(i));

        if cmd.argv.is_empty() {
            // リダイレクトだけの段: ファイルを作るだけで起動はしない
            pipes.release_stage(i);
            continue;
        }

        let close_in_child = pipes.open_fds_except(&[stdin_fd, stdout_fd]);
        let pid = spawn::spawn(&cmd.argv, stdin_fd, stdout_fd, &close_in_child)?;
        debug!(pid, stage = i, program = ?cmd.argv[0], "spawned");
        cmd.pid = Some(pid);

        pipes.release_stage(i);
        // input / output の File はここで drop され、親側の fd が閉じる
    }

    pipes.close_all();
    Ok(())
}

// ── 行の実行 ─────────────────────────────────────────────────────────

/// 1 行分のパイプラインを実行する。
///
/// フォアグラウンドなら全段の終了を確認してから戻る。バックグラウンドなら
/// 起動だけして即座に戻り、回収は SIGCHLD ハンドラに任せる。
/// 起動エラーがあっても、起動済みの段は通常どおり回収してからエラーを返す。
pub fn execute(control: &ProcessControl, mut pipeline: Pipeline) -> Result<i32, LaunchError> {
    if pipeline.program().is_some_and(builtins::is_builtin) {
        return Ok(builtins::cd(&pipeline.stages[0].argv));
    }

    if pipeline.background {
        let launched = launch(&mut pipeline);
        debug!(pids = ?pipeline.pids(), "started in background");
        return launched.map(|()| 0);
    }

    // 起動前にフラグを立て、起動直後に終了した子をハンドラに奪われないようにする
    let fg = control.foreground();
    let launched = launch(&mut pipeline);
    let status = fg.wait_all(&pipeline.pids());
    drop(fg);

    launched?;
    match status {
        Ok(code) => Ok(code),
        Err(e) => {
            warn!(error = %e, "foreground wait failed");
            Err(e.into())
        }
    }
}
