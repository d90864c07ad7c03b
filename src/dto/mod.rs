use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Admin REST payloads.
pub mod admin;
/// Health response.
pub mod health;
/// SSE event payloads.
pub mod sse;
/// Validation helpers.
pub mod validation;
/// Client protocol envelopes and payloads.
pub mod ws;

/// Render a unix-milliseconds timestamp as RFC 3339, `None` for 0.
pub(crate) fn format_unix_millis(millis: i64) -> Option<String> {
    if millis <= 0 {
        return None;
    }
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .and_then(|time| time.format(&Rfc3339).ok())
}
