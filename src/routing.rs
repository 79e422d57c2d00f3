//! The minimal routing surface: a `Handler` trait, a `PathPattern` that
//! captures `{name}` segments, a `HandlerMapping` pairing a handler with
//! the methods/patterns it serves, and a `Router` dispatching the first
//! match.

use std::sync::Arc;

use log::{error, warn};

use crate::error::{HandlerError, StatusError};
use crate::http::{Request, Response};
use crate::method::Method;
use crate::multimap::MultiMap;
use crate::status::StatusCode;

/// The application-supplied request handler. Implemented for any
/// `Fn(&mut Request, &mut Response<W>) -> Result<(), HandlerError>`-shaped
/// closure via the blanket impl below is not possible across an arbitrary
/// `W`, so handlers are written against a concrete socket writer; see
/// `server.rs` for the exact `W` used at the top level. Returning `Err`
/// lets a handler signal failure the same way `worker::RequestHandler`
/// does: a `StatusError` sets the named status and writes its message as
/// the body, anything else becomes a `500`.
pub trait Handler<W: std::io::Write>: Send + Sync {
    fn handle(&self, request: &mut Request, response: &mut Response<W>) -> Result<(), HandlerError>;
}

impl<W, F> Handler<W> for F
where
    W: std::io::Write,
    F: Fn(&mut Request, &mut Response<W>) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, request: &mut Request, response: &mut Response<W>) -> Result<(), HandlerError> {
        (self)(request, response)
    }
}

/// Applies a handler's returned error to the response, mirroring
/// `worker::handle_error`: a `StatusError` sets its named status and
/// writes its message (or reason phrase) as the body, anything else
/// becomes a `500`. A no-op once the response is already flushed.
fn apply_handler_error<W: std::io::Write>(response: &mut Response<W>, err: &(dyn std::error::Error + Send + 'static)) {
    if response.is_flushed() {
        error!("handler returned an error after response was flushed: {}", err);
        return;
    }

    match err.downcast_ref::<StatusError>() {
        Some(status_err) => {
            warn!("handler returned a status error: {}", status_err);
            response.set_status(status_err.code);
            let message = status_err.message.as_deref().unwrap_or_else(|| status_err.code.reason_phrase());
            let _ = response.write_body_string(message, None);
        }
        None => {
            error!("handler returned an error before response was flushed: {}", err);
            response.set_status(StatusCode::new(500));
            let _ = response.write_body_string("Internal Server Error", None);
        }
    }
}

/// A literal path, or a path containing `{name}` segments that capture
/// into the request's path-parameter map.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Literal(String),
    Capture(String),
}

impl PathPattern {
    /// Parses a pattern like `/users/{id}/posts/{post_id}`.
    pub fn parse(pattern: &str) -> PathPattern {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|segment| {
                if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Segment::Capture(name.to_string())
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();
        PathPattern { segments }
    }

    /// Matches `path` against this pattern, returning captured
    /// `{name}` → value pairs on success.
    pub fn matches(&self, path: &str) -> Option<MultiMap<String, String>> {
        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if path_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = MultiMap::new();
        for (pattern_segment, actual) in self.segments.iter().zip(path_segments.iter()) {
            match pattern_segment {
                Segment::Literal(expected) => {
                    if expected != actual {
                        return None;
                    }
                }
                Segment::Capture(name) => {
                    params.insert(name.clone(), actual.to_string());
                }
            }
        }
        Some(params)
    }
}

/// Binds a handler to the methods and path patterns it serves.
pub struct HandlerMapping<W: std::io::Write> {
    pub handler: Arc<dyn Handler<W>>,
    pub methods: Method,
    pub patterns: Vec<PathPattern>,
}

impl<W: std::io::Write> HandlerMapping<W> {
    pub fn new(handler: Arc<dyn Handler<W>>, methods: Method, patterns: Vec<PathPattern>) -> HandlerMapping<W> {
        HandlerMapping { handler, methods, patterns }
    }

    fn matches(&self, request: &Request) -> Option<MultiMap<String, String>> {
        if !self.methods.intersects(request.method()) {
            return None;
        }
        self.patterns.iter().find_map(|pattern| pattern.matches(request.url()))
    }
}

/// A list of `HandlerMapping`s, dispatched in order: the first mapping
/// whose method bitmask and path pattern both match wins.
pub struct Router<W: std::io::Write> {
    mappings: Vec<HandlerMapping<W>>,
}

impl<W: std::io::Write> Router<W> {
    pub fn new(mappings: Vec<HandlerMapping<W>>) -> Router<W> {
        Router { mappings }
    }

    /// Finds the first matching mapping, populates the request's
    /// path-parameter map, and dispatches to its handler. Returns
    /// `false` if no mapping matched.
    pub fn dispatch(&self, request: &mut Request, response: &mut Response<W>) -> bool {
        for mapping in &self.mappings {
            if let Some(params) = mapping.matches(request) {
                request.set_path_params(params);
                if let Err(err) = mapping.handler.handle(request, response) {
                    apply_handler_error(response, err.as_ref());
                }
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn request(method: Method, url: &str) -> Request {
        Request::new(
            method,
            url.to_string(),
            1,
            MultiMap::new(),
            MultiMap::new(),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1234),
            Box::new(std::io::Cursor::new(Vec::new())),
        )
    }

    #[test]
    fn literal_pattern_matches_exact_path() {
        let pattern = PathPattern::parse("/hello");
        assert!(pattern.matches("/hello").is_some());
        assert!(pattern.matches("/hello/world").is_none());
    }

    #[test]
    fn capture_segments_populate_params() {
        let pattern = PathPattern::parse("/users/{id}/posts/{post_id}");
        let params = pattern.matches("/users/42/posts/7").unwrap();
        assert_eq!(params.get_first(&"id".to_string()), Some(&"42".to_string()));
        assert_eq!(params.get_first(&"post_id".to_string()), Some(&"7".to_string()));
    }

    #[test]
    fn router_dispatches_first_matching_mapping() {
        let handler: Arc<dyn Handler<Vec<u8>>> = Arc::new(|_req: &mut Request, resp: &mut Response<Vec<u8>>| {
            resp.write_body_string("matched", None).unwrap();
            Ok(())
        });
        let mapping = HandlerMapping::new(handler, Method::GET, vec![PathPattern::parse("/ping")]);
        let router = Router::new(vec![mapping]);

        let mut request = request(Method::GET, "/ping");
        let out = Vec::new();
        let mut response = Response::new(out);
        assert!(router.dispatch(&mut request, &mut response));
        let out = response.into_inner().unwrap();
        assert!(String::from_utf8(out).unwrap().ends_with("matched"));
    }

    #[test]
    fn router_reports_no_match() {
        let handler: Arc<dyn Handler<Vec<u8>>> = Arc::new(|_req: &mut Request, _resp: &mut Response<Vec<u8>>| Ok(()));
        let mapping = HandlerMapping::new(handler, Method::GET, vec![PathPattern::parse("/ping")]);
        let router = Router::new(vec![mapping]);

        let mut request = request(Method::POST, "/ping");
        let out = Vec::new();
        let mut response = Response::new(out);
        assert!(!router.dispatch(&mut request, &mut response));
    }
}
