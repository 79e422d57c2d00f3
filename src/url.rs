//! URL path/query splitting, percent-decoding and
//! `application/x-www-form-urlencoded` parsing.

use crate::multimap::MultiMap;
use url::form_urlencoded;

/// Splits a raw request-target into `(path, query)`. The query is
/// everything after the first `?`; if there is no `?` the query is
/// `None`. Neither half is decoded yet.
pub fn split_path_and_query(target: &str) -> (&str, Option<&str>) {
    match target.find('?') {
        Some(idx) => (&target[..idx], Some(&target[idx + 1..])),
        None => (target, None),
    }
}

/// Percent-decodes a path segment (not a form field: `+` is left alone,
/// as it is a literal character in a path, not a space encoding).
pub fn percent_decode_path(raw: &str) -> String {
    percent_encoding_decode(raw.as_bytes(), false)
}

/// Removes a single trailing `/` from `path`, unless `path` is exactly
/// `/`.
pub fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

/// Parses an `application/x-www-form-urlencoded` byte string (used both
/// for request query strings and for `POST` bodies of that content
/// type): split on `&`, then on the first `=` within each pair, `+`
/// becomes a space, then percent-decode both sides. Empty keys and
/// empty values are allowed. Duplicate keys are preserved in insertion
/// order.
pub fn parse_form_urlencoded(raw: &str) -> MultiMap<String, String> {
    let mut map = MultiMap::new();
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        map.insert(key.into_owned(), value.into_owned());
    }
    map
}

/// Percent-decodes a byte sequence. When `form` is true, `+` is decoded
/// to a space first (form-encoding semantics); when false, `+` is left
/// as a literal character (path semantics).
fn percent_encoding_decode(bytes: &[u8], form: bool) -> String {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' if form => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = &bytes[i + 1..i + 3];
                match (hex_value(hex[0]), hex_value(hex[1])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
