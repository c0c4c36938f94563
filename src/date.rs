//! RFC 1123 `Date` header formatting.
//!
//! The async teacher caches a formatted date behind a background tick task
//! shared by every connection. A thread-pooled, blocking server has no
//! event loop to drive that task on, so this just formats on demand; the
//! cost is one `SystemTime::now()` and a `write!` per response, which is
//! negligible next to the socket I/O around it.

use std::time::SystemTime;

/// Length of `"Thu, 01 Jan 1970 00:00:00 GMT"`.
pub(crate) const DATE_VALUE_LENGTH: usize = 29;

/// Renders the current time as an RFC 1123 date string suitable for the
/// `Date` response header.
pub fn now() -> String {
    httpdate::fmt_http_date(SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_to_rfc1123_length() {
        let s = now();
        assert_eq!(s.len(), DATE_VALUE_LENGTH);
        assert!(s.ends_with("GMT"));
    }
}
