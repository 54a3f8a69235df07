//! Wire-facing payload types and their validation helpers.

use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod health;
pub mod session;
pub mod snapshot;
pub mod sse;
pub mod validation;

/// Render a [`SystemTime`] as RFC 3339.
pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

/// Render an epoch-milliseconds timestamp as RFC 3339.
pub(crate) fn format_epoch_ms(ms: u64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .map(|moment| {
            moment
                .format(&Rfc3339)
                .unwrap_or_else(|_| "invalid-timestamp".into())
        })
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
