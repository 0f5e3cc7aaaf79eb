// tests/session.rs
//
// ビルド済みバイナリに stdin からスクリプトを流し込み、stdout / stderr / 作成ファイルを検証する。

use std::ffi::OsString;
use std::fs;
use std::os::unix::ffi::OsStringExt;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;

struct Session {
    stdout: String,
    stderr: String,
    code: i32,
}

fn run_in(dir: &Path, args: &[&str], script: impl AsRef<[u8]>) -> Session {
    let mut child = Command::new(env!("CARGO_BIN_EXE_minish"))
        .args(args)
        .current_dir(dir)
        .env_remove("MINISH_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn minish");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(script.as_ref())
        .unwrap();
    let out = child.wait_with_output().unwrap();
    Session {
        stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        code: out.status.code().unwrap_or(-1),
    }
}

fn run(script: &str) -> (TempDir, Session) {
    let dir = tempfile::tempdir().unwrap();
    let s = run_in(dir.path(), &[], script);
    (dir, s)
}

#[test]
fn prompt_and_banner() {
    let (_dir, s) = run("echo hi\n");
    assert_eq!(s.stdout, "> hi\n> ^D\n");
    assert_eq!(s.stderr, "");
    assert_eq!(s.code, 0);
}

#[test]
fn empty_input_prints_banner_once() {
    let (_dir, s) = run("");
    assert_eq!(s.stdout, "> ^D\n");
    assert_eq!(s.code, 0);
}

#[test]
fn empty_lines_only_prompt() {
    let (_dir, s) = run("\n   \n");
    assert_eq!(s.stdout, "> > > ^D\n");
}

#[test]
fn print_tokens_mode() {
    let dir = tempfile::tempdir().unwrap();
    let s = run_in(dir.path(), &["--print-tokens"], "a b \"c d\"\nls>>out|wc\n");
    assert_eq!(
        s.stdout,
        "> [a]\n[b]\n[c d]\n> [ls]\n[output_append_redirection]\n[out]\n[pipe_operator]\n[wc]\n> ^D\n"
    );
    // トークン表示モードではコマンドを実行しない
    assert!(!dir.path().join("out").exists());
}

#[test]
fn empty_quoted_argument_is_passed() {
    let (_dir, s) = run("printf \"[%s]\" \"\" x\n");
    assert_eq!(s.stdout, "> [][x]> ^D\n");
}

#[test]
fn pipe_connects_stages() {
    let (_dir, s) = run("echo hello | tr a-z A-Z\n");
    assert_eq!(s.stdout, "> HELLO\n> ^D\n");
}

#[test]
fn three_stage_pipe() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a", "b", "c"] {
        fs::write(dir.path().join(name), "").unwrap();
    }
    let s = run_in(dir.path(), &[], "ls | sort -r | head -n 1\n");
    assert_eq!(s.stdout, "> c\n> ^D\n");
}

#[test]
fn output_redirect_truncates() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");
    fs::write(&out, "old contents that are long\n").unwrap();
    let s = run_in(dir.path(), &[], "echo hi > out.txt\n");
    assert_eq!(fs::read_to_string(&out).unwrap(), "hi\n");
    assert_eq!(s.stdout, "> > ^D\n");
}

#[test]
fn output_redirect_appends() {
    let dir = tempfile::tempdir().unwrap();
    run_in(dir.path(), &[], "echo a > f\necho b >> f\n");
    assert_eq!(fs::read_to_string(dir.path().join("f")).unwrap(), "a\nb\n");
}

#[test]
fn input_redirect_and_pipe() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("in"), "b\na\nc\n").unwrap();
    let s = run_in(dir.path(), &[], "sort < in | head -n 2 > out\n");
    assert_eq!(s.stderr, "");
    assert_eq!(fs::read_to_string(dir.path().join("out")).unwrap(), "a\nb\n");
}

#[test]
fn missing_input_file_launches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let s = run_in(dir.path(), &[], "echo x > first | cat < nope\n");
    assert!(s.stderr.contains("minish: nope: No such file or directory"));
    assert!(!dir.path().join("first").exists());
}

#[test]
fn pipe_at_start_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let s = run_in(dir.path(), &[], "| touch made\necho next\n");
    assert!(s.stderr.contains("minish: Error: pipe operator misuse"));
    assert!(!dir.path().join("made").exists());
    assert_eq!(s.stdout, "> > next\n> ^D\n");
}

#[test]
fn double_redirection_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let s = run_in(dir.path(), &[], "ls > a > b\nls > a >> b\n");
    assert_eq!(s.stderr.matches("redirection used twice").count(), 2);
    assert!(!dir.path().join("a").exists());
    assert!(!dir.path().join("b").exists());
}

#[test]
fn background_not_final_is_rejected() {
    let (_dir, s) = run("ls &x\n");
    assert!(s.stderr.contains("background operator must be at the end"));
}

#[test]
fn unsupported_operators_are_rejected() {
    let (_dir, s) = run("echo a ; echo b\necho a && echo b\n(echo a)\n");
    assert_eq!(s.stderr.matches("feature not implemented yet").count(), 3);
    assert_eq!(s.stdout, "> > > > ^D\n");
}

#[test]
fn syntax_errors_in_quotes_and_escapes() {
    let (_dir, s) = run("echo \"open\necho \\x rest\necho ok\n");
    assert!(s.stderr.contains("unmatched quotes"));
    assert!(s.stderr.contains("can be escaped"));
    assert_eq!(s.stdout, "> > > ok\n> ^D\n");
}

#[test]
fn escaped_quote_and_backslash() {
    let (_dir, s) = run("echo \\\"a\\\\b\\\"\n");
    assert_eq!(s.stdout, "> \"a\\b\"\n> ^D\n");
}

#[test]
fn unknown_command_reports_and_continues() {
    let (_dir, s) = run("definitely-not-a-command-xyz arg\necho still here\n");
    assert!(s
        .stderr
        .contains("minish: definitely-not-a-command-xyz: command not found"));
    assert_eq!(s.stdout, "> > still here\n> ^D\n");
    assert_eq!(s.code, 0);
}

#[test]
fn cd_changes_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    let s = run_in(dir.path(), &[], "cd sub\npwd\ncd a b\n");
    assert!(s.stdout.contains("/sub\n"));
    assert!(s.stderr.contains("minish: cd: too many arguments"));
}

#[test]
fn cd_without_argument_goes_home() {
    let dir = tempfile::tempdir().unwrap();
    let home = tempfile::tempdir().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_minish"))
        .current_dir(dir.path())
        .env("HOME", home.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"cd\npwd > here.txt\n")
        .unwrap();
    let out = child.wait_with_output().unwrap();
    assert!(out.status.success());
    let recorded = fs::read_to_string(home.path().join("here.txt")).unwrap();
    let expected = fs::canonicalize(home.path()).unwrap();
    assert_eq!(
        fs::canonicalize(recorded.trim()).unwrap(),
        expected,
        "pwd after bare cd"
    );
}

#[test]
fn last_line_without_newline_runs() {
    let (_dir, s) = run("echo tail");
    assert_eq!(s.stdout, "> tail\n> ^D\n");
}

#[test]
fn child_exit_status_does_not_stop_shell() {
    let (_dir, s) = run("sh -c \"exit 7\"\necho after\n");
    assert_eq!(s.stdout, "> > after\n> ^D\n");
    assert_eq!(s.code, 0);
}

#[test]
fn background_job_returns_prompt_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_minish"))
        .current_dir(dir.path())
        .env_remove("MINISH_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let mut stdin = child.stdin.take().unwrap();
    let stdout = child.stdout.take().unwrap();

    let start = Instant::now();
    stdin.write_all(b"sleep 3 &\necho done\n").unwrap();
    stdin.flush().unwrap();

    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert!(line.ends_with("done\n"), "got {line:?}");
    assert!(start.elapsed() < Duration::from_secs(2));

    drop(stdin);
    let status = child.wait().unwrap();
    assert!(status.success());
}

#[test]
fn foreground_waits_for_every_stage() {
    let dir = tempfile::tempdir().unwrap();
    let start = Instant::now();
    let s = run_in(dir.path(), &[], "sleep 1 | echo x\necho y > marker\n");
    assert!(start.elapsed() >= Duration::from_millis(900));
    assert_eq!(s.stdout, "> x\n> > ^D\n");
    assert!(dir.path().join("marker").exists());
}

#[test]
fn non_utf8_names_are_used_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let s = run_in(dir.path(), &[], &b"touch caf\xe9\necho x > out\xff\ncat < caf\xe9\n"[..]);
    assert_eq!(s.stderr, "");
    let name = dir.path().join(OsString::from_vec(b"caf\xe9".to_vec()));
    assert!(name.exists());
    let out = dir.path().join(OsString::from_vec(b"out\xff".to_vec()));
    assert_eq!(fs::read(out).unwrap(), b"x\n");
}
