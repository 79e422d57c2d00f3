//! The `Request` type (C3): an immutable-at-handoff record of method,
//! URL, headers, query/path parameters, remote address and a handle to
//! the body stream.

use std::io::Read;
use std::net::SocketAddr;

use crate::method::Method;
use crate::multimap::MultiMap;

/// A parsed HTTP request, handed to the application handler.
///
/// Everything but the body stream is fixed once the request is built by
/// the assembler (C4); routers may still populate `path_params` after
/// the fact, which is why that field alone is mutable from outside the
/// crate's http module.
pub struct Request {
    method: Method,
    url: String,
    minor_version: u8,
    headers: MultiMap<String, String>,
    query_params: MultiMap<String, String>,
    path_params: MultiMap<String, String>,
    remote_addr: SocketAddr,
    body: Box<dyn Read + Send>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("minor_version", &self.minor_version)
            .field("headers", &self.headers)
            .field("query_params", &self.query_params)
            .field("path_params", &self.path_params)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

impl Request {
    pub fn new(
        method: Method,
        url: String,
        minor_version: u8,
        headers: MultiMap<String, String>,
        query_params: MultiMap<String, String>,
        remote_addr: SocketAddr,
        body: Box<dyn Read + Send>,
    ) -> Request {
        Request {
            method,
            url,
            minor_version,
            headers,
            query_params,
            path_params: MultiMap::new(),
            remote_addr,
            body,
        }
    }

    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    /// The path, with the query string already stripped and a trailing
    /// `/` removed (unless the path is exactly `/`). Never contains `?`.
    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[inline]
    pub fn minor_version(&self) -> u8 {
        self.minor_version
    }

    #[inline]
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// The first value of `name`, case-sensitive, as received.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_first(&name.to_string()).map(|s| s.as_str())
    }

    pub fn headers(&self) -> &MultiMap<String, String> {
        &self.headers
    }

    pub fn query_params(&self) -> &MultiMap<String, String> {
        &self.query_params
    }

    pub fn path_params(&self) -> &MultiMap<String, String> {
        &self.path_params
    }

    /// Populated by a router once it has matched this request against a
    /// path pattern with `{name}` segments.
    pub fn set_path_params(&mut self, params: MultiMap<String, String>) {
        self.path_params = params;
    }

    /// A handle to the request body, positioned at its first byte.
    /// Reading it drains the socket; see `read_body` in `http::body` for
    /// the `Content-Length`/unbounded/chunked decoding rules.
    pub fn body(&mut self) -> &mut (dyn Read + Send) {
        &mut *self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1234)
    }

    #[test]
    fn method_and_url_are_accessible() {
        let mut request = Request::new(
            Method::GET,
            "/hello".to_string(),
            1,
            MultiMap::new(),
            MultiMap::new(),
            addr(),
            Box::new(Cursor::new(Vec::new())),
        );
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.url(), "/hello");
        let mut buf = Vec::new();
        request.body().read_to_end(&mut buf).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn header_lookup_is_case_sensitive_as_received() {
        let mut headers = MultiMap::new();
        headers.insert("Host".to_string(), "example.com".to_string());
        let request = Request::new(
            Method::GET,
            "/".to_string(),
            1,
            headers,
            MultiMap::new(),
            addr(),
            Box::new(Cursor::new(Vec::new())),
        );
        assert_eq!(request.header("Host"), Some("example.com"));
        assert_eq!(request.header("host"), None);
    }
}
