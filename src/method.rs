//! HTTP methods represented as a bitflag value so that a set of methods
//! (e.g. a route's allowed verbs) can be matched against a single request
//! method with one bitwise AND.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// An HTTP request method, or a bitmask of several methods.
///
/// Each individual method is a distinct power of two so that a set of
/// methods can be built with `|` and matched against a single request
/// method with `mask.contains(request.method())`.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Method(u16);

impl Method {
    pub const GET: Method = Method(1 << 0);
    pub const HEAD: Method = Method(1 << 1);
    pub const POST: Method = Method(1 << 2);
    pub const PUT: Method = Method(1 << 3);
    pub const DELETE: Method = Method(1 << 4);
    pub const CONNECT: Method = Method(1 << 5);
    pub const OPTIONS: Method = Method(1 << 6);
    pub const TRACE: Method = Method(1 << 7);
    pub const PATCH: Method = Method(1 << 8);

    const ALL: [(Method, &'static str); 9] = [
        (Method::GET, "GET"),
        (Method::HEAD, "HEAD"),
        (Method::POST, "POST"),
        (Method::PUT, "PUT"),
        (Method::DELETE, "DELETE"),
        (Method::CONNECT, "CONNECT"),
        (Method::OPTIONS, "OPTIONS"),
        (Method::TRACE, "TRACE"),
        (Method::PATCH, "PATCH"),
    ];

    /// Empty mask, matches nothing.
    pub const fn empty() -> Method {
        Method(0)
    }

    /// Mask containing every method.
    pub const fn all() -> Method {
        Method(
            Method::GET.0
                | Method::HEAD.0
                | Method::POST.0
                | Method::PUT.0
                | Method::DELETE.0
                | Method::CONNECT.0
                | Method::OPTIONS.0
                | Method::TRACE.0
                | Method::PATCH.0,
        )
    }

    /// Parses a verbatim HTTP method token (as it appears on the wire).
    /// Returns `None` for anything outside the nine enumerated methods.
    pub fn parse(token: &str) -> Option<Method> {
        Method::ALL
            .iter()
            .find(|(_, name)| *name == token)
            .map(|(method, _)| *method)
    }

    /// True if `self` (used as a mask) contains every method set in `other`.
    #[inline]
    pub fn contains(&self, other: Method) -> bool {
        (self.0 & other.0) == other.0
    }

    /// True if `self` and `other` share at least one method bit. This is
    /// the form used by routing: `mask.intersects(request.method())`.
    #[inline]
    pub fn intersects(&self, other: Method) -> bool {
        (self.0 & other.0) != 0
    }

    /// The wire token for a single method. Panics if called on an empty
    /// mask or a mask with more than one bit set.
    pub fn as_str(&self) -> &'static str {
        Method::ALL
            .iter()
            .find(|(m, _)| *m == *self)
            .map(|(_, name)| *name)
            .expect("Method::as_str called on an empty or composite mask")
    }
}

impl BitOr for Method {
    type Output = Method;

    #[inline]
    fn bitor(self, rhs: Method) -> Method {
        Method(self.0 | rhs.0)
    }
}

impl BitOrAssign for Method {
    #[inline]
    fn bitor_assign(&mut self, rhs: Method) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "Method(none)");
        }
        let names: Vec<&str> = Method::ALL
            .iter()
            .filter(|(m, _)| self.intersects(*m))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Method({})", names.join("|"))
    }
}
