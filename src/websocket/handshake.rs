//! The WebSocket upgrade handshake: validates the request, computes
//! `Sec-WebSocket-Accept`, and writes the `101 Switching Protocols`
//! response.

use std::io::{self, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha1::{Digest, Sha1};

use crate::http::{Request, Response};
use crate::method::Method;
use crate::status::StatusCode;

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Why a request could not be upgraded.
#[derive(Debug)]
pub enum HandshakeError {
    WrongMethod,
    MissingKey,
    Io(io::Error),
}

impl PartialEq for HandshakeError {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (HandshakeError::WrongMethod, HandshakeError::WrongMethod)
                | (HandshakeError::MissingKey, HandshakeError::MissingKey)
        )
    }
}
impl Eq for HandshakeError {}

impl From<io::Error> for HandshakeError {
    fn from(err: io::Error) -> HandshakeError {
        HandshakeError::Io(err)
    }
}

/// Computes `base64(SHA-1(key || GUID))`, the RFC 6455 accept value.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    let digest = hasher.finalize();
    BASE64.encode(digest)
}

/// Validates the request and, on success, writes the `101` response
/// (status, `Upgrade`/`Connection`/`Sec-WebSocket-Accept` headers) and
/// flushes it. The caller is then responsible for handing the
/// underlying socket to the WebSocket registry.
pub fn upgrade<W: Write>(request: &Request, response: &mut Response<W>) -> Result<(), HandshakeError> {
    if request.method() != Method::GET {
        return Err(HandshakeError::WrongMethod);
    }
    let client_key = request
        .header("Sec-WebSocket-Key")
        .filter(|key| !key.is_empty())
        .ok_or(HandshakeError::MissingKey)?;

    let accept = accept_key(client_key);

    response.set_status(StatusCode::new(101));
    response.add_header("Upgrade", "websocket");
    response.add_header("Connection", "Upgrade");
    response.add_header("Sec-WebSocket-Accept", accept);
    let _ = response.flush_headers();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multimap::MultiMap;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    #[test]
    fn rfc6455_example_key_produces_expected_accept() {
        // The exact example from RFC 6455 §1.3.
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn upgrade_rejects_missing_key() {
        let request = Request::new(
            Method::GET,
            "/ws".to_string(),
            1,
            MultiMap::new(),
            MultiMap::new(),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1),
            Box::new(std::io::Cursor::new(Vec::new())),
        );
        let mut out = Vec::new();
        let mut response = Response::new(&mut out);
        assert_eq!(upgrade(&request, &mut response), Err(HandshakeError::MissingKey));
    }

    #[test]
    fn upgrade_rejects_non_get_method() {
        let request = Request::new(
            Method::POST,
            "/ws".to_string(),
            1,
            MultiMap::new(),
            MultiMap::new(),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1),
            Box::new(std::io::Cursor::new(Vec::new())),
        );
        let mut out = Vec::new();
        let mut response = Response::new(&mut out);
        assert_eq!(upgrade(&request, &mut response), Err(HandshakeError::WrongMethod));
    }

    #[test]
    fn successful_upgrade_writes_101_response() {
        let mut headers = MultiMap::new();
        headers.insert("Sec-WebSocket-Key".to_string(), "dGhlIHNhbXBsZSBub25jZQ==".to_string());
        let request = Request::new(
            Method::GET,
            "/ws".to_string(),
            1,
            headers,
            MultiMap::new(),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1),
            Box::new(std::io::Cursor::new(Vec::new())),
        );
        let mut out = Vec::new();
        {
            let mut response = Response::new(&mut out);
            upgrade(&request, &mut response).unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    }
}
