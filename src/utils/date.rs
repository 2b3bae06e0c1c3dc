use std::time::SystemTime;

use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Formats a timestamp for the request log.
pub fn format_timestamp(date: SystemTime) -> String {
    let date = OffsetDateTime::from(date);
    date.format(&Rfc3339)
        .unwrap_or_else(|_| date.unix_timestamp().to_string())
}
