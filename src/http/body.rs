//! Request body handling: `read_body`'s `Content-Length`/unbounded
//! rules, and transparent chunked-transfer-encoding decoding.

use std::io::{self, Read, Write};

use atoi::atoi;

use crate::io_adapters::LimitedReader;
use crate::multimap::MultiMap;

/// Reads the request body per the specified rules:
///
/// - `Content-Length` present: read exactly that many bytes, failing if
///   the stream ends early.
/// - Absent and `allow_unbounded` is false: read nothing.
/// - Absent and `allow_unbounded` is true: read until EOF.
///
/// Returns the number of bytes copied to `writer`.
pub fn read_body(
    body: &mut dyn Read,
    headers: &MultiMap<String, String>,
    writer: &mut dyn Write,
    allow_unbounded: bool,
) -> io::Result<u64> {
    match content_length(headers) {
        Some(len) => {
            let mut limited = LimitedReader::new(body, len);
            io::copy(&mut limited, writer)
        }
        None if allow_unbounded => io::copy(body, writer),
        None => Ok(0),
    }
}

fn content_length(headers: &MultiMap<String, String>) -> Option<u64> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, v)| atoi::<u64>(v.as_bytes()))
}

/// True if the request declares `Transfer-Encoding: chunked`.
pub fn is_chunked(headers: &MultiMap<String, String>) -> bool {
    headers
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case("Transfer-Encoding") && v.eq_ignore_ascii_case("chunked"))
}

/// Transparently decodes a chunked request body: reads chunk-size
/// lines, yields the decoded payload bytes to callers of `Read`, and
/// stops (returning `Ok(0)`) once the terminating zero-size chunk and
/// its trailing CRLF have been consumed. Any trailer headers after the
/// zero chunk are read and discarded.
pub struct ChunkedBodyReader<R: Read> {
    inner: R,
    remaining_in_chunk: usize,
    finished: bool,
}

impl<R: Read> ChunkedBodyReader<R> {
    pub fn new(inner: R) -> ChunkedBodyReader<R> {
        ChunkedBodyReader { inner, remaining_in_chunk: 0, finished: false }
    }

    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.inner.read(&mut byte)?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated chunked body"));
            }
            if byte[0] == b'\n' {
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(line);
            }
            line.push(byte[0]);
        }
    }

    fn consume_trailers(&mut self) -> io::Result<()> {
        loop {
            let line = self.read_line()?;
            if line.is_empty() {
                return Ok(());
            }
        }
    }
}

impl<R: Read> Read for ChunkedBodyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished {
            return Ok(0);
        }

        if self.remaining_in_chunk == 0 {
            let size_line = self.read_line()?;
            // Ignore chunk extensions after `;`, if any.
            let size_token = size_line.split(|&b| b == b';').next().unwrap_or(&[]);
            let size = usize::from_str_radix(
                std::str::from_utf8(size_token)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad chunk size"))?
                    .trim(),
                16,
            )
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad chunk size"))?;

            if size == 0 {
                self.consume_trailers()?;
                self.finished = true;
                return Ok(0);
            }
            self.remaining_in_chunk = size;
        }

        let want = std::cmp::min(buf.len(), self.remaining_in_chunk);
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated chunk payload"));
        }
        self.remaining_in_chunk -= n;

        if self.remaining_in_chunk == 0 {
            let trailing = self.read_line()?;
            if !trailing.is_empty() {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "missing chunk CRLF"));
            }
        }

        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn headers_with(name: &str, value: &str) -> MultiMap<String, String> {
        let mut map = MultiMap::new();
        map.insert(name.to_string(), value.to_string());
        map
    }

    #[test]
    fn reads_exactly_content_length_bytes() {
        let mut body = Cursor::new(b"hello world, trailing garbage".to_vec());
        let headers = headers_with("Content-Length", "5");
        let mut out = Vec::new();
        let n = read_body(&mut body, &headers, &mut out, false).unwrap();
        assert_eq!(n, 5);
        assert_eq!(out, b"hello");
    }

    #[test]
    fn errors_if_stream_ends_before_content_length() {
        let mut body = Cursor::new(b"hi".to_vec());
        let headers = headers_with("Content-Length", "10");
        let mut out = Vec::new();
        let err = read_body(&mut body, &headers, &mut out, false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn reads_nothing_when_absent_and_not_unbounded() {
        let mut body = Cursor::new(b"unused".to_vec());
        let headers = MultiMap::new();
        let mut out = Vec::new();
        let n = read_body(&mut body, &headers, &mut out, false).unwrap();
        assert_eq!(n, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn reads_until_eof_when_unbounded() {
        let mut body = Cursor::new(b"all of it".to_vec());
        let headers = MultiMap::new();
        let mut out = Vec::new();
        let n = read_body(&mut body, &headers, &mut out, true).unwrap();
        assert_eq!(n, 9);
        assert_eq!(out, b"all of it");
    }

    #[test]
    fn chunked_body_reader_decodes_multiple_chunks() {
        let raw = b"6\r\nhello \r\n5\r\nworld\r\n0\r\n\r\n";
        let mut reader = ChunkedBodyReader::new(Cursor::new(raw.to_vec()));
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn chunked_body_reader_errors_on_truncated_chunk() {
        let raw = b"10\r\nshort";
        let mut reader = ChunkedBodyReader::new(Cursor::new(raw.to_vec()));
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn detects_chunked_transfer_encoding_header() {
        let headers = headers_with("Transfer-Encoding", "chunked");
        assert!(is_chunked(&headers));
        assert!(!is_chunked(&MultiMap::new()));
    }
}
