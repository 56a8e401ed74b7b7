use chrono::{DateTime, SecondsFormat, Utc};

/// RFC 3339 timestamp with millisecond precision and a `Z` suffix, the format
/// every client-facing event uses.
pub fn to_wire(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time in wire format.
pub fn now_wire() -> String {
    to_wire(Utc::now())
}
