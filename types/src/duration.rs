//! Compact duration text: `"10s"`, `"6h"`, `"1d 2h 30m"`.
//!
//! Units are `d`, `h`, `m` and `s`. Groups may be separated by whitespace and
//! may repeat; their values are summed. An empty string is zero.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationParseError {
    #[error("missing number before unit '{unit}' in \"{input}\"")]
    MissingNumber { input: String, unit: char },

    #[error("missing unit after {value} in \"{input}\"")]
    MissingUnit { input: String, value: u64 },

    #[error("unknown unit '{unit}' in \"{input}\" (expected d, h, m or s)")]
    UnknownUnit { input: String, unit: char },

    #[error("duration \"{input}\" is too large")]
    Overflow { input: String },
}

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

pub fn parse(input: &str) -> Result<Duration, DurationParseError> {
    let mut total: u64 = 0;
    let mut value: Option<u64> = None;

    for c in input.chars() {
        if let Some(digit) = c.to_digit(10) {
            let next = value
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(digit)))
                .ok_or_else(|| DurationParseError::Overflow {
                    input: input.to_string(),
                })?;
            value = Some(next);
            continue;
        }
        if c.is_whitespace() {
            if let Some(v) = value {
                return Err(DurationParseError::MissingUnit {
                    input: input.to_string(),
                    value: v,
                });
            }
            continue;
        }

        let Some(v) = value.take() else {
            return Err(DurationParseError::MissingNumber {
                input: input.to_string(),
                unit: c,
            });
        };
        let scale = match c.to_ascii_lowercase() {
            'd' => DAY,
            'h' => HOUR,
            'm' => MINUTE,
            's' => 1,
            other => {
                return Err(DurationParseError::UnknownUnit {
                    input: input.to_string(),
                    unit: other,
                });
            }
        };
        total = v
            .checked_mul(scale)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| DurationParseError::Overflow {
                input: input.to_string(),
            })?;
    }

    if let Some(v) = value {
        return Err(DurationParseError::MissingUnit {
            input: input.to_string(),
            value: v,
        });
    }

    Ok(Duration::from_secs(total))
}

/// Formats whole seconds as `"1d 2h 3m 4s"`, omitting zero groups.
/// Sub-second remainders are dropped; zero formats as `"0s"`.
pub fn format(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }

    let mut parts = Vec::with_capacity(4);
    for (scale, unit) in [(DAY, 'd'), (HOUR, 'h'), (MINUTE, 'm'), (1, 's')] {
        let n = secs / scale;
        if n > 0 {
            parts.push(format!("{n}{unit}"));
            secs %= scale;
        }
    }
    parts.join(" ")
}

/// `#[serde(with = "delve_types::duration::text")]`
pub mod text {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Optional variant of [`text`]; pair with `#[serde(default)]`.
pub mod text_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&super::format(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| super::parse(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_combined_units() {
        assert_eq!(parse("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse("6h").unwrap(), Duration::from_secs(6 * 3600));
        assert_eq!(parse("1d2h").unwrap(), Duration::from_secs(86_400 + 7200));
        assert_eq!(parse("1d 2h 30m").unwrap(), Duration::from_secs(86_400 + 7200 + 1800));
        assert_eq!(parse("").unwrap(), Duration::ZERO);
    }

    #[test]
    fn units_are_case_insensitive() {
        assert_eq!(parse("2M").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(matches!(parse("10"), Err(DurationParseError::MissingUnit { value: 10, .. })));
        assert!(matches!(parse("h"), Err(DurationParseError::MissingNumber { unit: 'h', .. })));
        assert!(matches!(parse("5w"), Err(DurationParseError::UnknownUnit { unit: 'w', .. })));
        assert!(matches!(parse("5 s"), Err(DurationParseError::MissingUnit { .. })));
    }

    #[test]
    fn format_omits_zero_groups() {
        assert_eq!(format(Duration::ZERO), "0s");
        assert_eq!(format(Duration::from_millis(999)), "0s");
        assert_eq!(format(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format(Duration::from_secs(86_400 + 5)), "1d 5s");
    }

    #[test]
    fn formatted_text_parses_back() {
        let d = Duration::from_secs(3 * 86_400 + 4 * 3600 + 59);
        assert_eq!(parse(&format(d)).unwrap(), d);
    }
}
