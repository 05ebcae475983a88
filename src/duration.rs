//! Timing knobs in config are written as "250ms", "15s", "7m" or "1h".

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{de, Deserialize, Deserializer, Serializer};

/// Suffixes and their size in milliseconds, largest first.
const UNITS: [(&str, u64); 4] = [
    ("h", 3_600_000),
    ("m", 60_000),
    ("s", 1_000),
    ("ms", 1),
];

/// Parse a pause or timeout such as `"800ms"` or `"2m"`.
///
/// Whole numbers only; case and surrounding whitespace are ignored.
///
/// ```
/// use offerbook::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("800ms").unwrap(), Duration::from_millis(800));
/// assert_eq!(parse_duration(" 2M ").unwrap(), Duration::from_secs(120));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let text = s.trim().to_ascii_lowercase();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .with_context(|| format!("Duration {s:?} has no unit (use ms, s, m or h)"))?;
    let (digits, unit) = text.split_at(split);
    if digits.is_empty() {
        bail!("Duration {s:?} has no number");
    }

    let Some(&(_, scale)) = UNITS.iter().find(|(suffix, _)| *suffix == unit.trim()) else {
        bail!("Unknown duration unit {unit:?} in {s:?}");
    };
    let count: u64 = digits
        .parse()
        .with_context(|| format!("Invalid number in duration {s:?}"))?;
    let millis = count
        .checked_mul(scale)
        .with_context(|| format!("Duration {s:?} is too large"))?;
    Ok(Duration::from_millis(millis))
}

/// Inverse of [`parse_duration`], choosing the coarsest exact unit.
pub fn format_duration(d: Duration) -> String {
    let millis = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        return "0ms".to_string();
    }
    UNITS
        .iter()
        .find(|(_, scale)| millis % scale == 0)
        .map(|(suffix, scale)| format!("{}{suffix}", millis / scale))
        .unwrap_or_else(|| format!("{millis}ms"))
}

pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(de::Error::custom)
}

pub fn serialize_duration<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration("60ms").unwrap(), Duration::from_millis(60));
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("12m").unwrap(), Duration::from_secs(720));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("3 s").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn rejects_malformed_values() {
        for bad in ["", "15", "1.5s", "-3s", "ms", "3d", "5 minutes"] {
            assert!(parse_duration(bad).is_err(), "{bad:?} should not parse");
        }
        let huge = format!("{}h", u64::MAX);
        assert!(parse_duration(&huge).is_err());
    }

    #[test]
    fn formats_with_coarsest_unit() {
        assert_eq!(format_duration(Duration::ZERO), "0ms");
        assert_eq!(format_duration(Duration::from_millis(1400)), "1400ms");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_secs(420)), "7m");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
    }

    #[test]
    fn config_field_survives_toml() {
        #[derive(Serialize, Deserialize)]
        struct Knob {
            #[serde(
                serialize_with = "serialize_duration",
                deserialize_with = "deserialize_duration"
            )]
            pause: Duration,
        }

        let knob: Knob = toml::from_str(r#"pause = "600ms""#).unwrap();
        assert_eq!(knob.pause, Duration::from_millis(600));
        assert_eq!(toml::to_string(&knob).unwrap().trim(), r#"pause = "600ms""#);
    }
}
