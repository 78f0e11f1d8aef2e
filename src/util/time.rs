use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Current time as an ISO-8601 / RFC 3339 string with millisecond precision,
/// e.g. `2026-08-25T14:03:07.512Z`. This is the canonical form for article
/// dates and sync timestamps.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// UTC date stamp (`YYYY-MM-DD`), used for export filenames.
pub fn date_stamp() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Parses a stored timestamp for ordering purposes.
///
/// Accepts RFC 3339 first, then a couple of lenient forms seen in
/// hand-edited or imported data (`YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS`).
/// Unparseable input maps to the Unix epoch so malformed records sort last
/// under newest-first ordering instead of aborting a save.
pub fn parse_when(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Utc.from_utc_datetime(&dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
            return Utc.from_utc_datetime(&dt);
        }
    }
    DateTime::UNIX_EPOCH
}

/// Formats a stored timestamp relative to now for status output:
/// "just now", "5m ago", "3h ago", "2d ago", then the plain date.
pub fn relative_from_now(s: &str) -> String {
    let then = parse_when(s);
    let delta = Utc::now().signed_duration_since(then);

    let minutes = delta.num_minutes();
    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = delta.num_hours();
    if hours < 24 {
        return format!("{hours}h ago");
    }
    let days = delta.num_days();
    if days < 7 {
        return format!("{days}d ago");
    }
    then.format("%Y-%m-%d").to_string()
}
