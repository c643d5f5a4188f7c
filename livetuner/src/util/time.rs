use chrono::{DateTime, Duration, Utc};

/// Get the current time as a UTC datetime.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a UTC datetime as an XMLTV timestamp (`YYYYMMDDHHmmSS +0000`).
pub fn format_xmltv_time(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%d%H%M%S %z").to_string()
}

/**
    Guide window for a channel's single programme.

    Starts at the broadcast start, or an hour ago when the channel is not
    live, and ends a day from `now`.
*/
pub fn programme_window(
    started_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = started_at.unwrap_or(now - Duration::hours(1));
    (start, now + Duration::hours(24))
}
