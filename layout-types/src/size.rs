//! Size normalization
//!
//! Every size read from a customization document (disk, partition and logical
//! volume `minsize`, filesystem customizations) goes through [`parse_size`], so
//! JSON and TOML documents can never disagree about what a size means. A size
//! is either a plain number of bytes or a string such as `"10 GiB"`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::common::{GIB, KIB, MIB, TIB};

/// Error returned when a value cannot be normalized to a byte count.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSize {
    #[error("size string is empty")]
    Empty,

    #[error("size \"{0}\" does not start with a number")]
    MissingNumber(String),

    #[error("unknown unit \"{unit}\" in size \"{input}\"")]
    UnknownUnit { input: String, unit: String },

    #[error("size \"{0}\" does not fit in 64 bits")]
    Overflow(String),

    #[error("size cannot be negative: {0}")]
    Negative(String),

    #[error("size must be a whole number of bytes: {0}")]
    Fractional(String),

    #[error("failed to convert value {0} to a size")]
    NotASize(String),
}

/// Multiplier for a unit suffix, `None` when the unit is not recognized.
fn unit_multiplier(unit: &str) -> Option<u64> {
    let multiplier = match unit {
        "" | "B" => 1,
        "kB" | "KB" => 1000,
        "KiB" => KIB,
        "MB" => 1000 * 1000,
        "MiB" => MIB,
        "GB" => 1000 * 1000 * 1000,
        "GiB" => GIB,
        "TB" => 1000 * 1000 * 1000 * 1000,
        "TiB" => TIB,
        "PB" => 1000 * 1000 * 1000 * 1000 * 1000,
        "PiB" => 1024 * TIB,
        _ => return None,
    };
    Some(multiplier)
}

/// Parse a size string of the form `<digits>[whitespace]<unit>`.
///
/// A bare number is a byte count. Units are case-sensitive; decimal units
/// (`kB`, `MB`, ...) are powers of 1000 and binary units (`KiB`, `MiB`, ...)
/// powers of 1024.
pub fn parse_size_str(input: &str) -> Result<u64, InvalidSize> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(InvalidSize::Empty);
    }
    if trimmed.starts_with('-') {
        return Err(InvalidSize::Negative(trimmed.to_string()));
    }

    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, rest) = trimmed.split_at(digits_end);
    if digits.is_empty() {
        return Err(InvalidSize::MissingNumber(trimmed.to_string()));
    }
    if rest.starts_with('.') {
        return Err(InvalidSize::Fractional(trimmed.to_string()));
    }

    let number: u64 = digits
        .parse()
        .map_err(|_| InvalidSize::Overflow(trimmed.to_string()))?;

    let unit = rest.trim_start();
    let multiplier = unit_multiplier(unit).ok_or_else(|| InvalidSize::UnknownUnit {
        input: trimmed.to_string(),
        unit: unit.to_string(),
    })?;

    number
        .checked_mul(multiplier)
        .ok_or_else(|| InvalidSize::Overflow(trimmed.to_string()))
}

/// Normalize a generic document value (number or string) to bytes.
pub fn parse_size(value: &Value) -> Result<u64, InvalidSize> {
    match value {
        Value::String(s) => parse_size_str(s),
        Value::Number(n) => {
            if let Some(bytes) = n.as_u64() {
                return Ok(bytes);
            }
            if n.as_i64().is_some_and(|v| v < 0) {
                return Err(InvalidSize::Negative(n.to_string()));
            }
            match n.as_f64() {
                Some(f) if f < 0.0 => Err(InvalidSize::Negative(n.to_string())),
                Some(f) if f.fract() != 0.0 => Err(InvalidSize::Fractional(n.to_string())),
                Some(f) if f >= u64::MAX as f64 => Err(InvalidSize::Overflow(n.to_string())),
                Some(f) => Ok(f as u64),
                None => Err(InvalidSize::NotASize(n.to_string())),
            }
        }
        other => Err(InvalidSize::NotASize(other.to_string())),
    }
}

/// `deserialize_with` helper for required size fields.
pub fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_size(&value).map_err(serde::de::Error::custom)
}

/// `deserialize_with` helper for optional size fields; a missing field needs
/// `#[serde(default)]` alongside it.
pub fn deserialize_opt_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(0),
        Some(value) => parse_size(&value).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn parses_units() {
        assert_eq!(parse_size_str("1024").unwrap(), 1024);
        assert_eq!(parse_size_str("10 GiB").unwrap(), 10 * GIB);
        assert_eq!(parse_size_str("10GiB").unwrap(), 10 * GIB);
        assert_eq!(parse_size_str("  3 MB ").unwrap(), 3_000_000);
        assert_eq!(parse_size_str("1 kB").unwrap(), 1000);
        assert_eq!(parse_size_str("1 KB").unwrap(), 1000);
        assert_eq!(parse_size_str("2 TiB").unwrap(), 2 * TIB);
        assert_eq!(parse_size_str("7 B").unwrap(), 7);
    }

    #[test]
    fn rejects_bad_strings() {
        assert_eq!(parse_size_str(""), Err(InvalidSize::Empty));
        assert!(matches!(
            parse_size_str("GiB"),
            Err(InvalidSize::MissingNumber(_))
        ));
        assert!(matches!(
            parse_size_str("10 gib"),
            Err(InvalidSize::UnknownUnit { .. })
        ));
        assert!(matches!(
            parse_size_str("1.5 GiB"),
            Err(InvalidSize::Fractional(_))
        ));
        assert!(matches!(
            parse_size_str("-1 GiB"),
            Err(InvalidSize::Negative(_))
        ));
        assert!(matches!(
            parse_size_str("99999999999 PiB"),
            Err(InvalidSize::Overflow(_))
        ));
        assert!(matches!(
            parse_size_str("99999999999999999999999"),
            Err(InvalidSize::Overflow(_))
        ));
    }

    #[test]
    fn parses_document_values() {
        assert_eq!(parse_size(&json!(4096)).unwrap(), 4096);
        assert_eq!(parse_size(&json!("4 KiB")).unwrap(), 4096);
        assert_eq!(parse_size(&json!(4096.0)).unwrap(), 4096);
        assert!(matches!(
            parse_size(&json!(-1)),
            Err(InvalidSize::Negative(_))
        ));
        assert!(matches!(
            parse_size(&json!(1.5)),
            Err(InvalidSize::Fractional(_))
        ));
        assert!(matches!(
            parse_size(&json!(true)),
            Err(InvalidSize::NotASize(_))
        ));
        assert!(matches!(
            parse_size(&json!(["1 GiB"])),
            Err(InvalidSize::NotASize(_))
        ));
    }

    #[test]
    fn toml_integers_take_the_same_path() {
        let value: toml::Value = toml::from_str("minsize = 2048").unwrap();
        let value = serde_json::to_value(&value["minsize"]).unwrap();
        assert_eq!(parse_size(&value).unwrap(), 2048);

        let value: toml::Value = toml::from_str("minsize = -3").unwrap();
        let value = serde_json::to_value(&value["minsize"]).unwrap();
        assert!(matches!(parse_size(&value), Err(InvalidSize::Negative(_))));
    }

    fn unit_strategy() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec![
            "", "B", "kB", "KB", "KiB", "MB", "MiB", "GB", "GiB", "TB", "TiB",
        ])
    }

    proptest! {
        #[test]
        fn reparsing_the_byte_count_is_idempotent(
            number in 0u64..1_000_000,
            unit in unit_strategy(),
            space in prop::bool::ANY,
        ) {
            let sep = if space { " " } else { "" };
            let input = format!("{number}{sep}{unit}");
            let bytes = parse_size_str(&input).unwrap();
            prop_assert_eq!(parse_size_str(&bytes.to_string()).unwrap(), bytes);
        }

        #[test]
        fn integer_and_string_forms_agree(bytes in 0u64..u64::MAX) {
            let from_int = parse_size(&json!(bytes)).unwrap();
            let from_str = parse_size(&json!(bytes.to_string())).unwrap();
            prop_assert_eq!(from_int, from_str);
            prop_assert_eq!(from_int, bytes);
        }
    }
}
