// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Timestamps stored on profile documents.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time as RFC3339 with a `Z` suffix, e.g. `2026-01-01T00:00:00Z`.
pub fn now_rfc3339() -> String {
    format_utc_rfc3339(Utc::now())
}

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a stored timestamp; `None` if it is not RFC3339.
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
