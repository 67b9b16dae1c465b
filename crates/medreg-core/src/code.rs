//! Correlative codes: `prefix + zero-padded(value)`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CoreError, Result};
use crate::prefix::Prefix;

/// Largest accepted padding width. `i64::MAX` has 19 digits.
pub const MAX_PADDING_WIDTH: usize = 18;

/// A formatted, human-readable sequence identifier such as `CP000001`.
///
/// The padding width is a minimum: a value with more digits than the width
/// is rendered in full rather than truncated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CorrelativeCode {
    prefix: Prefix,
    value: i64,
    code: String,
}

impl CorrelativeCode {
    /// Formats `value` under `prefix` with the given minimum width.
    pub fn format(prefix: &Prefix, value: i64, width: usize) -> Result<Self> {
        if value < 1 {
            return Err(CoreError::invalid_code(
                format!("{prefix}{value}"),
                "sequence values start at 1",
            ));
        }
        if width == 0 || width > MAX_PADDING_WIDTH {
            return Err(CoreError::configuration(format!(
                "padding width must be between 1 and {MAX_PADDING_WIDTH}, got {width}"
            )));
        }
        Ok(Self {
            prefix: prefix.clone(),
            value,
            code: format!("{prefix}{value:0width$}"),
        })
    }

    /// Parses a code previously issued under `prefix` and recovers its value.
    pub fn parse(code: &str, prefix: &Prefix) -> Result<Self> {
        let digits = code
            .strip_prefix(prefix.as_str())
            .ok_or_else(|| CoreError::invalid_code(code, format!("expected prefix {prefix}")))?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::invalid_code(code, "suffix must be decimal digits"));
        }
        let value: i64 = digits
            .parse()
            .map_err(|e| CoreError::invalid_code(code, format!("suffix out of range: {e}")))?;
        if value < 1 {
            return Err(CoreError::invalid_code(code, "sequence values start at 1"));
        }
        Ok(Self {
            prefix: prefix.clone(),
            value,
            code: code.to_string(),
        })
    }

    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    /// The numeric sequence value carried by this code.
    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn as_str(&self) -> &str {
        &self.code
    }

    pub fn into_string(self) -> String {
        self.code
    }
}

impl fmt::Display for CorrelativeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// Deserialized codes go through [`CorrelativeCode::parse`], so `code`
/// always agrees with `prefix` and `value`.
impl<'de> Deserialize<'de> for CorrelativeCode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            prefix: Prefix,
            value: i64,
            code: String,
        }

        let raw = Raw::deserialize(deserializer)?;
        let parsed =
            CorrelativeCode::parse(&raw.code, &raw.prefix).map_err(serde::de::Error::custom)?;
        if parsed.value != raw.value {
            return Err(serde::de::Error::custom(format!(
                "code {} carries value {}, not {}",
                raw.code, parsed.value, raw.value
            )));
        }
        Ok(parsed)
    }
}

impl From<CorrelativeCode> for String {
    fn from(code: CorrelativeCode) -> Self {
        code.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cp() -> Prefix {
        Prefix::new("CP").unwrap()
    }

    #[test]
    fn test_format_pads_to_width() {
        let code = CorrelativeCode::format(&cp(), 1, 6).unwrap();
        assert_eq!(code.as_str(), "CP000001");
        assert_eq!(code.value(), 1);

        let code = CorrelativeCode::format(&cp(), 42, 3).unwrap();
        assert_eq!(code.to_string(), "CP042");
    }

    #[test]
    fn test_format_wider_value_is_not_truncated() {
        let code = CorrelativeCode::format(&cp(), 1_234_567, 6).unwrap();
        assert_eq!(code.as_str(), "CP1234567");
    }

    #[test]
    fn test_format_rejects_bad_input() {
        assert!(CorrelativeCode::format(&cp(), 0, 6).is_err());
        assert!(CorrelativeCode::format(&cp(), 1, 0).is_err());
        assert!(CorrelativeCode::format(&cp(), 1, MAX_PADDING_WIDTH + 1).is_err());
    }

    #[test]
    fn test_deserialize_checks_consistency() {
        let code = CorrelativeCode::format(&cp(), 12, 6).unwrap();
        let json = serde_json::to_string(&code).unwrap();
        let back: CorrelativeCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);

        let mismatched = r#"{"prefix": "CP", "value": 13, "code": "CP000012"}"#;
        assert!(serde_json::from_str::<CorrelativeCode>(mismatched).is_err());

        let wrong_prefix = r#"{"prefix": "CP", "value": 12, "code": "HC000012"}"#;
        assert!(serde_json::from_str::<CorrelativeCode>(wrong_prefix).is_err());
    }

    #[test]
    fn test_parse_recovers_value() {
        let code = CorrelativeCode::parse("CP000017", &cp()).unwrap();
        assert_eq!(code.value(), 17);
        assert_eq!(code.prefix().as_str(), "CP");

        assert!(CorrelativeCode::parse("HC000017", &cp()).is_err());
        assert!(CorrelativeCode::parse("CP", &cp()).is_err());
        assert!(CorrelativeCode::parse("CP00A1", &cp()).is_err());
        assert!(CorrelativeCode::parse("CP000000", &cp()).is_err());
    }
}
