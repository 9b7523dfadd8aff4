//! Text rendering for log lines and summaries.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use console::style;

use shiplio_protocol::{BuildComplete, LogEvent, LogLevel, RuntimeLog};

pub const BUILD_SUCCEEDED: &str = "Deployment successful!";
pub const BUILD_FAILED: &str = "Build failed. Check the logs above.";

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `[level] message`, with the tag coloured by severity.
pub fn build_line(event: &LogEvent) -> String {
    let tag = format!("[{}]", event.level.as_str());
    let tag = match event.level {
        LogLevel::Info => style(tag).blue(),
        LogLevel::Success => style(tag).green(),
        LogLevel::Warn => style(tag).yellow(),
        LogLevel::Error => style(tag).red(),
        LogLevel::Unknown => style(tag).white(),
    };
    format!("{tag} {}", event.message.trim())
}

/// Lines announcing a completed build.
pub fn success_summary(done: &BuildComplete) -> Vec<String> {
    vec![
        style(format!("✔ {BUILD_SUCCEEDED}")).green().bold().to_string(),
        format!("  URL:      {}", style(&done.url).cyan().underlined()),
        format!("  Duration: {}", format_duration(done.duration)),
    ]
}

pub fn build_succeeded() -> String {
    style(format!("✔ {BUILD_SUCCEEDED}")).green().to_string()
}

pub fn build_failed() -> String {
    style(format!("✖ {BUILD_FAILED}")).red().to_string()
}

/// Milliseconds as `"{n}s"` above one second, `"{n}ms"` otherwise.
pub fn format_duration(ms: u64) -> String {
    if ms > 1000 {
        format!("{}s", ms / 1000)
    } else {
        format!("{ms}ms")
    }
}

pub fn runtime_connected(project_id: &str) -> String {
    style(format!(
        "✔ Connected to {project_id} runtime logs (Ctrl+C to stop)"
    ))
    .green()
    .to_string()
}

/// `[timestamp] message` in local time.
pub fn runtime_line(log: &RuntimeLog) -> String {
    let stamp = format_timestamp(log.timestamp.as_deref(), &Local);
    format!("{} {}", style(format!("[{stamp}]")).dim(), log.message)
}

/// Renders a broker timestamp in `tz`.
///
/// ISO 8601 input (with a `T`) is read as-is; `YYYY-MM-DD HH:MM:SS` is
/// read as UTC.
pub fn format_timestamp<Tz>(raw: Option<&str>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return "N/A".into();
    };
    match parse_timestamp(raw) {
        Some(at) => at.with_timezone(tz).format(DATE_FORMAT).to_string(),
        None => "Invalid Date".into(),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.contains('T') {
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Some(at.with_timezone(&Utc));
        }
        return parse_naive_utc(raw);
    }
    parse_naive_utc(&raw.replacen(' ', "T", 1))
}

fn parse_naive_utc(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.strip_suffix('Z').unwrap_or(raw);
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
