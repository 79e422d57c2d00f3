//! Byte-stream adapters (C1): a concat-stream that drains a first
//! readable to EOF before reading a second, and a chunked-transfer-
//! encoding writer/reader.

use std::io::{self, Read, Write};

/// Composes two readable streams so that `first` is fully drained
/// before any byte of `second` is read. Used to present the handler
/// with a body stream that starts with the bytes already captured in
/// the receive buffer, followed by whatever remains to be read from
/// the socket.
pub struct ConcatStream<A, B> {
    first: Option<A>,
    second: B,
}

impl<A: Read, B: Read> ConcatStream<A, B> {
    pub fn new(first: A, second: B) -> ConcatStream<A, B> {
        ConcatStream { first: Some(first), second }
    }
}

impl<A: Read, B: Read> Read for ConcatStream<A, B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(first) = &mut self.first {
            let n = first.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            self.first = None;
        }
        self.second.read(buf)
    }
}

/// Wraps a writable stream, framing every `write` call as
/// `<hex-length>\r\n<bytes>\r\n` and emitting the terminating
/// `0\r\n\r\n` chunk when `finish()` is called (or on `Drop`, as a
/// best-effort fallback if the caller forgets).
pub struct ChunkedWriter<W: Write> {
    inner: Option<W>,
    finished: bool,
}

impl<W: Write> ChunkedWriter<W> {
    pub fn new(inner: W) -> ChunkedWriter<W> {
        ChunkedWriter { inner: Some(inner), finished: false }
    }

    /// Emits the terminating `0\r\n\r\n` chunk. Idempotent.
    pub fn finish(&mut self) -> io::Result<()> {
        if !self.finished {
            if let Some(inner) = &mut self.inner {
                inner.write_all(b"0\r\n\r\n")?;
            }
            self.finished = true;
        }
        Ok(())
    }

    /// Finishes the chunked framing (if not already done) and returns
    /// the wrapped writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.finish()?;
        Ok(self.inner.take().expect("inner taken exactly once"))
    }
}

impl<W: Write> Write for ChunkedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let inner = self.inner.as_mut().expect("write after into_inner");
        write!(inner, "{:x}\r\n", buf.len())?;
        inner.write_all(buf)?;
        inner.write_all(b"\r\n")?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            Some(inner) => inner.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> Drop for ChunkedWriter<W> {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

/// A readable stream that yields exactly `limit` bytes from `inner`,
/// then EOF, failing if `inner` runs dry before `limit` bytes have been
/// produced. Used by `read_body` when `Content-Length` is present.
pub struct LimitedReader<R: Read> {
    inner: R,
    remaining: u64,
}

impl<R: Read> LimitedReader<R> {
    pub fn new(inner: R, limit: u64) -> LimitedReader<R> {
        LimitedReader { inner, remaining: limit }
    }
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Ok(0);
        }
        let want = std::cmp::min(buf.len() as u64, self.remaining) as usize;
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 && self.remaining > 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended before Content-Length bytes were read",
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn concat_stream_drains_first_before_second() {
        let first = Cursor::new(b"hello ".to_vec());
        let second = Cursor::new(b"world".to_vec());
        let mut combined = ConcatStream::new(first, second);
        let mut out = String::new();
        combined.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn concat_stream_with_empty_first() {
        let first = Cursor::new(Vec::<u8>::new());
        let second = Cursor::new(b"world".to_vec());
        let mut combined = ConcatStream::new(first, second);
        let mut out = String::new();
        combined.read_to_string(&mut out).unwrap();
        assert_eq!(out, "world");
    }

    #[test]
    fn chunked_writer_frames_each_write_and_terminates() {
        let mut out = Vec::new();
        {
            let mut w = ChunkedWriter::new(&mut out);
            w.write_all(b"hello").unwrap();
            w.write_all(b"world").unwrap();
            w.finish().unwrap();
        }
        assert_eq!(out, b"5\r\nhello\r\n5\r\nworld\r\n0\r\n\r\n");
    }

    #[test]
    fn chunked_writer_finishes_on_drop_if_forgotten() {
        let mut out = Vec::new();
        {
            let mut w = ChunkedWriter::new(&mut out);
            w.write_all(b"hi").unwrap();
        }
        assert_eq!(out, b"2\r\nhi\r\n0\r\n\r\n");
    }

    #[test]
    fn limited_reader_stops_at_limit() {
        let data = Cursor::new(b"hello world".to_vec());
        let mut limited = LimitedReader::new(data, 5);
        let mut out = String::new();
        limited.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn limited_reader_errors_on_early_eof() {
        let data = Cursor::new(b"hi".to_vec());
        let mut limited = LimitedReader::new(data, 10);
        let mut out = Vec::new();
        let err = limited.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
