//! HTTP/1.1 request-line + header parser (C2).
//!
//! Tokenization of the raw bytes is delegated to `httparse`, which
//! already distinguishes a truncated message from a malformed one at
//! the wire level. This module layers on the method-bitmask mapping,
//! percent-decoding, query splitting, trailing-slash trimming and HTTP
//! version acceptance rules the specification describes.

use crate::method::Method;
use crate::multimap::MultiMap;
use crate::url::{parse_form_urlencoded, percent_decode_path, split_path_and_query, trim_trailing_slash};

const MAX_HEADERS: usize = 64;

/// Why parsing failed.
#[derive(Debug, Eq, PartialEq)]
pub enum ParseError {
    /// Not enough bytes yet to parse a complete request line + header
    /// block; the caller should read more and retry.
    Incomplete,
    /// The bytes are present but do not form a valid HTTP message.
    Malformed,
    /// The message declares an HTTP version other than 1.x.
    VersionUnsupported,
}

/// The parsed request line and headers, with the number of input bytes
/// they occupied (including the terminating CRLF CRLF).
#[derive(Debug, PartialEq)]
pub struct ParsedHead {
    pub method: Method,
    pub path: String,
    pub query: MultiMap<String, String>,
    pub minor_version: u8,
    pub headers: MultiMap<String, String>,
    pub consumed: usize,
}

/// Parses a request line and header block from the start of `buf`.
///
/// On success, returns the parsed head and the number of bytes consumed
/// from `buf`; any remaining bytes are the start of the request body
/// and must be handled by the caller (see the request assembler, C4).
pub fn parse(buf: &[u8]) -> Result<ParsedHead, ParseError> {
    let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut header_storage);

    let consumed = match req.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Err(ParseError::Incomplete),
        Err(httparse::Error::Version) => return Err(ParseError::VersionUnsupported),
        Err(_) => return Err(ParseError::Malformed),
    };

    let minor_version = req.version.ok_or(ParseError::Malformed)?;
    if minor_version > 9 {
        // httparse only ever reports 0 or 1 for HTTP/1.x; any other
        // value indicates a message we don't understand. (HTTP/0.9
        // has no headers and won't reach us via httparse's `Request`
        // parser in practice, but we guard explicitly per spec wording
        // that only 1.x is supported.)
        return Err(ParseError::VersionUnsupported);
    }

    let method_token = req.method.ok_or(ParseError::Malformed)?;
    let method = Method::parse(method_token).ok_or(ParseError::Malformed)?;

    let raw_target = req.path.ok_or(ParseError::Malformed)?;
    let (raw_path, raw_query) = split_path_and_query(raw_target);
    let decoded_path = percent_decode_path(raw_path);
    let path = trim_trailing_slash(&decoded_path).to_string();
    let query = raw_query
        .map(parse_form_urlencoded)
        .unwrap_or_else(MultiMap::new);

    let mut headers = MultiMap::new();
    for header in req.headers.iter() {
        let value = String::from_utf8_lossy(header.value).into_owned();
        headers.insert(header.name.to_string(), value);
    }

    Ok(ParsedHead {
        method,
        path,
        query,
        minor_version,
        headers,
        consumed,
    })
}
