//! Status codes and their canonical reason phrases.
//!
//! Covers every standard IANA code in the 100-511 range named in the
//! specification, so that `reason_phrase` is total over that range.

/// An HTTP status code together with its canonical reason phrase.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct StatusCode(u16);

impl StatusCode {
    /// Builds a `StatusCode` from a raw numeric code. The code is not
    /// validated against the known set: handlers are free to use
    /// non-standard codes, in which case `reason_phrase` falls back to
    /// a generic phrase for the code's class.
    pub const fn new(code: u16) -> StatusCode {
        StatusCode(code)
    }

    #[inline]
    pub fn code(&self) -> u16 {
        self.0
    }

    /// The canonical reason phrase, e.g. `"OK"` for 200.
    pub fn reason_phrase(&self) -> &'static str {
        reason_phrase(self.0)
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> StatusCode {
        StatusCode::new(code)
    }
}

/// Canonical reason phrase for every status code enumerated in the
/// specification (100 through 511). Unknown codes fall back to a
/// generic phrase based on their class.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        102 => "Processing",
        103 => "Early Hints",

        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        207 => "Multi-Status",
        208 => "Already Reported",
        226 => "IM Used",

        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",

        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        421 => "Misdirected Request",
        422 => "Unprocessable Entity",
        423 => "Locked",
        424 => "Failed Dependency",
        425 => "Too Early",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        451 => "Unavailable For Legal Reasons",

        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        506 => "Variant Also Negotiates",
        507 => "Insufficient Storage",
        508 => "Loop Detected",
        510 => "Not Extended",
        511 => "Network Authentication Required",

        100..=199 => "Informational",
        200..=299 => "Success",
        300..=399 => "Redirection",
        400..=499 => "Client Error",
        500..=599 => "Server Error",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_have_canonical_phrases() {
        assert_eq!(reason_phrase(200), "OK");
        assert_eq!(reason_phrase(404), "Not Found");
        assert_eq!(reason_phrase(101), "Switching Protocols");
        assert_eq!(reason_phrase(451), "Unavailable For Legal Reasons");
        assert_eq!(reason_phrase(511), "Network Authentication Required");
    }

    #[test]
    fn unknown_code_falls_back_to_class() {
        assert_eq!(reason_phrase(499), "Client Error");
        assert_eq!(reason_phrase(599), "Server Error");
    }

    #[test]
    fn status_code_roundtrips() {
        let status: StatusCode = 404.into();
        assert_eq!(status.code(), 404);
        assert_eq!(status.reason_phrase(), "Not Found");
    }
}
