//! When a served request gets settled.

use http::StatusCode;

/// A payment is collected only if the protected handler produced a
/// non-error response. Any status below 400 counts, redirects included.
pub fn should_settle(status: StatusCode) -> bool {
    status.as_u16() < 400
}
