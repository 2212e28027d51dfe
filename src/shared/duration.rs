use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::sync::OnceLock;
use std::time::Duration;

/// Parse duration string like "200ms", "5s", "2m", "1h" into a `Duration`.
/// A bare number is read as seconds.
pub fn parse_duration(duration_str: &str) -> Result<Duration, String> {
    static DURATION_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = DURATION_REGEX
        .get_or_init(|| Regex::new(r"^(\d+)(ms|s|m|h)?$").expect("Invalid duration regex"));

    let caps = re.captures(duration_str.trim()).ok_or_else(|| {
        format!(
            "Invalid duration format: {}. Expected format: <number><ms|s|m|h>",
            duration_str
        )
    })?;

    let number: u64 = caps[1]
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", &caps[1]))?;

    let duration = match caps.get(2).map(|m| m.as_str()) {
        Some("ms") => Duration::from_millis(number),
        Some("s") | None => Duration::from_secs(number),
        Some("m") => Duration::from_secs(number * 60),
        Some("h") => Duration::from_secs(number * 60 * 60),
        Some(unit) => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(duration)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

/// `deserialize_with` adapter for duration fields.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
