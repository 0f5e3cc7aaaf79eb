//! シェル本体: 読み取り → トークン化 → 構築 → 起動 → 回収 を 1 行ずつ繰り返す。
//!
//! [`Shell`] は SIGCHLD ハンドラの登録期間（[`ProcessControl`]）とトークナイザを
//! 所有する。Drop でハンドラはデフォルトに戻る。

use std::io::{self, Read, Write};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{OsError, ShellError};
use crate::executor;
use crate::input::SignalSafeReader;
use crate::job::ProcessControl;
use crate::parser;
use crate::tokenizer::{Token, Tokenizer};

/// プロンプト文字列。
pub const PROMPT: &str = "> ";

/// 入力終端で 1 回だけ出力するバナー。
pub const EOF_BANNER: &str = "^D\n";

/// シェルの実行状態。REPL ループ全体で共有される。
pub struct Shell {
    config: Config,
    tokenizer: Tokenizer,
    control: ProcessControl,
    /// 直前のフォアグラウンドパイプラインの終了ステータス。
    last_status: i32,
}

impl Shell {
    /// SIGCHLD ハンドラを登録してシェルを作る。
    pub fn new(config: Config) -> Result<Self, OsError> {
        Ok(Self {
            config,
            tokenizer: Tokenizer::new(),
            control: ProcessControl::install()?,
            last_status: 0,
        })
    }

    pub fn last_status(&self) -> i32 {
        self.last_status
    }

    /// 入力終端まで 1 行ずつ処理する。
    ///
    /// 行単位のエラーは stderr に報告して次の行へ進む。入力の読み取り自体が
    /// 失敗した場合のみ `Err` を返す。
    pub fn run<R: Read, W: Write>(&mut self, input: R, out: &mut W) -> io::Result<()> {
        let mut reader = SignalSafeReader::new(input);
        prompt(out)?;

        loop {
            match self.tokenizer.read_line(&mut reader) {
                Ok(None) => break,
                Ok(Some(tokens)) => self.process_line(&tokens, out)?,
                Err(ShellError::Io(e)) => return Err(e),
                Err(e) => report(&e),
            }
            self.control.reap_pending();
            prompt(out)?;
        }

        out.write_all(EOF_BANNER.as_bytes())?;
        out.flush()?;
        info!("end of input");
        Ok(())
    }

    fn process_line<W: Write>(&mut self, tokens: &[Token], out: &mut W) -> io::Result<()> {
        if self.config.print_tokens {
            for t in tokens {
                out.write_all(&t.listing_bytes())?;
                out.write_all(b"\n")?;
            }
            return Ok(());
        }

        let pipeline = match parser::build(tokens) {
            Ok(Some(p)) => p,
            Ok(None) => return Ok(()),
            Err(e) => {
                report(&ShellError::from(e));
                return Ok(());
            }
        };
        debug!(
            stages = pipeline.stage_count(),
            background = pipeline.background,
            "built pipeline"
        );

        out.flush()?;
        match executor::execute(&self.control, pipeline) {
            Ok(status) => {
                debug!(status, "line finished");
                self.last_status = status;
            }
            Err(e) => report(&ShellError::from(e)),
        }
        Ok(())
    }
}

fn prompt<W: Write>(out: &mut W) -> io::Result<()> {
    out.write_all(PROMPT.as_bytes())?;
    out.flush()
}

/// 行エラーを `minish: ...` 形式で stderr に出す。
fn report(err: &ShellError) {
    eprintln!("minish: {}", err);
}
