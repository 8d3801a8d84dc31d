/// Formats a race time in milliseconds as `m:ss.mmm`.
pub fn format_time(ms: i64) -> String {
    let sign = if ms < 0 { "-" } else { "" };
    let ms = ms.abs();
    format!("{}{}:{:02}.{:03}", sign, ms / 60_000, (ms % 60_000) / 1000, ms % 1000)
}

pub fn format_optional_time(ms: Option<i64>) -> String {
    ms.map(format_time).unwrap_or_else(|| "-".to_string())
}
