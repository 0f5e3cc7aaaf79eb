//! シグナル割り込みに強い 1 バイト読み取り層。
//!
//! SIGCHLD ハンドラは `SA_RESTART` なしで登録されるため、ブロッキング中の `read` は
//! `EINTR` で戻ることがある。[`SignalSafeReader`] はそれを入力終端として扱わず、
//! 透過的に読み直す。

use std::io::{self, BufRead, BufReader, ErrorKind, Read};

/// `EINTR` をリトライするバイト単位のリーダー。
pub struct SignalSafeReader<R> {
    inner: BufReader<R>,
}

impl<R: Read> SignalSafeReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// 次の 1 バイトを返す。入力終端なら `None`。
    pub fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let b = loop {
            match self.inner.fill_buf() {
                Ok([]) => return Ok(None),
                Ok(buf) => break buf[0],
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        self.inner.consume(1);
        Ok(Some(b))
    }

    /// 次の `\n`（または入力終端）までを読み捨てる。
    pub fn discard_line(&mut self) -> io::Result<()> {
        while let Some(b) = self.next_byte()? {
            if b == b'\n' {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 読み取りのたびに 1 回 `Interrupted` を返すソース。
    struct Flaky<'a> {
        data: &'a [u8],
        interrupt_next: bool,
    }

    impl Read for Flaky<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupt_next {
                self.interrupt_next = false;
                return Err(io::Error::from(ErrorKind::Interrupted));
            }
            self.interrupt_next = true;
            if self.data.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.data[0];
            self.data = &self.data[1..];
            Ok(1)
        }
    }

    #[test]
    fn interrupted_read_is_retried() {
        let src = Flaky {
            data: b"ab",
            interrupt_next: true,
        };
        let mut r = SignalSafeReader::new(src);
        assert_eq!(r.next_byte().unwrap(), Some(b'a'));
        assert_eq!(r.next_byte().unwrap(), Some(b'b'));
        assert_eq!(r.next_byte().unwrap(), None);
    }

    #[test]
    fn discard_line_stops_after_newline() {
        let mut r = SignalSafeReader::new(&b"junk here\nnext"[..]);
        r.discard_line().unwrap();
        assert_eq!(r.next_byte().unwrap(), Some(b'n'));
    }

    #[test]
    fn discard_line_at_eof() {
        let mut r = SignalSafeReader::new(&b"no newline"[..]);
        r.discard_line().unwrap();
        assert_eq!(r.next_byte().unwrap(), None);
    }
}
