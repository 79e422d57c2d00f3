//! The `Response` type (C3): status, multi-valued headers, a
//! `flushed` guard and a handle to the writable body stream.

use std::io::{self, Read, Write};

use log::warn;

use crate::io_adapters::ChunkedWriter;
use crate::multimap::MultiMap;
use crate::status::StatusCode;

const COPY_BUFFER_SIZE: usize = 8 * 1024;

enum Sink<W: Write> {
    /// Nothing has been written to the socket yet.
    Unflushed(W),
    /// Headers are written; body bytes go straight through.
    Raw(W),
    /// Headers are written with `Transfer-Encoding: chunked`; body
    /// bytes are framed by `ChunkedWriter`.
    Chunked(ChunkedWriter<W>),
    /// Only reachable transiently while swapping sinks; observing this
    /// variant anywhere else is a bug.
    Empty,
}

/// A response under construction. Mutating the status or headers after
/// the response has been flushed is a no-op (a warning is logged by the
/// caller via `flushed()` checks); the type itself does not panic.
pub struct Response<W: Write> {
    status: StatusCode,
    headers: MultiMap<String, String>,
    sink: Sink<W>,
}

impl<W: Write> std::fmt::Debug for Response<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// An opaque producer of response body bytes with a known length, for
/// `write_body_stream`.
pub type ResponseBody<'a> = &'a mut dyn Read;

impl<W: Write> Response<W> {
    pub fn new(output: W) -> Response<W> {
        Response {
            status: StatusCode::new(200),
            headers: MultiMap::new(),
            sink: Sink::Unflushed(output),
        }
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub fn is_flushed(&self) -> bool {
        !matches!(self.sink, Sink::Unflushed(_))
    }

    pub fn headers(&self) -> &MultiMap<String, String> {
        &self.headers
    }

    /// Sets the status code. Ignored (with a warning logged) once the
    /// response has been flushed.
    pub fn set_status(&mut self, code: StatusCode) {
        if self.is_flushed() {
            warn!("ignoring set_status({}) on a response already flushed", code.code());
            return;
        }
        self.status = code;
    }

    /// Adds a header. Ignored (with a warning logged) once the response
    /// has been flushed.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if self.is_flushed() {
            warn!("ignoring add_header on a response already flushed");
            return;
        }
        self.headers.insert(name.into(), value.into());
    }

    fn header_present(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    fn wants_chunked(&self) -> bool {
        self.headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("Transfer-Encoding") && v.eq_ignore_ascii_case("chunked"))
    }

    /// Writes the status line and headers if not already done, then
    /// transitions the body sink to `Raw` or `Chunked` depending on
    /// whether `Transfer-Encoding: chunked` was requested.
    pub fn flush_headers(&mut self) -> io::Result<()> {
        let output = match std::mem::replace(&mut self.sink, Sink::Empty) {
            Sink::Unflushed(output) => output,
            other => {
                self.sink = other;
                return Ok(());
            }
        };

        let chunked = self.wants_chunked();
        let mut output = output;
        write!(output, "HTTP/1.1 {} {}\r\n", self.status.code(), self.status.reason_phrase())?;
        for (name, value) in self.headers.iter() {
            write!(output, "{}: {}\r\n", name, value)?;
        }
        output.write_all(b"\r\n")?;

        self.sink = if chunked {
            Sink::Chunked(ChunkedWriter::new(output))
        } else {
            Sink::Raw(output)
        };
        Ok(())
    }

    /// Sets `Content-Length` and `Content-Type` (if the response is
    /// still unflushed), flushes, then writes `bytes` as the whole body.
    pub fn write_body_bytes(&mut self, bytes: &[u8], content_type: &str) -> io::Result<()> {
        if !self.is_flushed() {
            if !self.header_present("Content-Length") {
                self.add_header("Content-Length", bytes.len().to_string());
            }
            if !self.header_present("Content-Type") {
                self.add_header("Content-Type", content_type.to_string());
            }
        }
        self.flush_headers()?;
        self.write_all(bytes)
    }

    /// UTF-8 specialization of `write_body_bytes`; defaults the content
    /// type to `text/plain; charset=utf-8` when not given explicitly.
    pub fn write_body_string(&mut self, text: &str, content_type: Option<&str>) -> io::Result<()> {
        self.write_body_bytes(text.as_bytes(), content_type.unwrap_or("text/plain; charset=utf-8"))
    }

    /// Streams `size` bytes read from `body` in 8 KiB chunks, setting
    /// `Content-Length`/`Content-Type` if unflushed.
    pub fn write_body_stream(
        &mut self,
        body: ResponseBody<'_>,
        size: u64,
        content_type: &str,
    ) -> io::Result<()> {
        if !self.is_flushed() {
            if !self.header_present("Content-Length") {
                self.add_header("Content-Length", size.to_string());
            }
            if !self.header_present("Content-Type") {
                self.add_header("Content-Type", content_type.to_string());
            }
        }
        self.flush_headers()?;

        let mut buf = [0u8; COPY_BUFFER_SIZE];
        loop {
            let n = body.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.write_all(&buf[..n])?;
        }
        Ok(())
    }

    /// Finalizes a chunked response, if one was in progress. Harmless
    /// to call on a non-chunked or unflushed response.
    pub fn finish(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Chunked(writer) => writer.finish(),
            _ => Ok(()),
        }
    }

    /// Consumes the response, returning the underlying writer. The
    /// caller is responsible for shutting down/closing it if it is a
    /// socket; used by the worker once a response has been fully
    /// handled and ownership reverts to plain socket cleanup.
    pub fn into_inner(self) -> io::Result<W> {
        match self.sink {
            Sink::Unflushed(output) | Sink::Raw(output) => Ok(output),
            Sink::Chunked(writer) => writer.into_inner(),
            Sink::Empty => unreachable!("Empty sink is only ever observed transiently"),
        }
    }

    /// Extracts the underlying writer out of a `&mut Response`, leaving
    /// the response in a flushed, empty state. Used by the WebSocket
    /// upgrade path, where protocol ownership of the socket transfers
    /// away from the response while the caller still only holds a
    /// `&mut Response` (the handler signature, not an owned one).
    pub fn take_socket(&mut self) -> Option<W> {
        match std::mem::replace(&mut self.sink, Sink::Empty) {
            Sink::Unflushed(output) | Sink::Raw(output) => Some(output),
            Sink::Chunked(writer) => writer.into_inner().ok(),
            Sink::Empty => None,
        }
    }
}

impl<W: Write> Write for Response<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.is_flushed() {
            self.flush_headers()?;
        }
        match &mut self.sink {
            Sink::Raw(output) => output.write(buf),
            Sink::Chunked(writer) => writer.write(buf),
            Sink::Unflushed(_) | Sink::Empty => unreachable!("flush_headers guarantees a flushed sink"),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Raw(output) => output.flush(),
            Sink::Chunked(writer) => writer.flush(),
            Sink::Unflushed(_) | Sink::Empty => Ok(()),
        }
    }
}
