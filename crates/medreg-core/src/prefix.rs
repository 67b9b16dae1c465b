//! Sequence prefixes.
//!
//! A prefix names one correlative sequence (`CP` for patient codes, `HC` for
//! clinical-record codes). It is also the key of the counter row that backs
//! the sequence, so the accepted alphabet is deliberately narrow.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, Result};

/// Maximum number of characters in a prefix.
pub const MAX_PREFIX_LEN: usize = 8;

/// A validated sequence prefix.
///
/// Rules: 1 to [`MAX_PREFIX_LEN`] characters, ASCII uppercase letters or
/// digits, starting with a letter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prefix(String);

impl Prefix {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        validate(&value)?;
        Ok(Self(value))
    }

    /// `CP`, the patient-code sequence.
    pub fn patient_code() -> Self {
        Self("CP".to_string())
    }

    /// `HC`, the clinical-record sequence.
    pub fn clinical_record() -> Self {
        Self("HC".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

fn validate(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CoreError::invalid_prefix(value, "must not be empty"));
    }
    if value.len() > MAX_PREFIX_LEN {
        return Err(CoreError::invalid_prefix(
            value,
            format!("must be at most {MAX_PREFIX_LEN} characters"),
        ));
    }
    let mut chars = value.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_uppercase()) {
        return Err(CoreError::invalid_prefix(
            value,
            "must start with an uppercase ASCII letter",
        ));
    }
    if !chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return Err(CoreError::invalid_prefix(
            value,
            "may only contain uppercase ASCII letters and digits",
        ));
    }
    Ok(())
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Prefix {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for Prefix {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Prefix {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Prefix {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Prefix::new(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_prefixes() {
        for p in ["CP", "HC", "A", "LAB2024", "X1Y2Z3AB"] {
            assert_eq!(Prefix::new(p).unwrap().as_str(), p);
        }
    }

    #[test]
    fn test_well_known_prefixes_are_valid() {
        assert_eq!(Prefix::patient_code(), Prefix::new("CP").unwrap());
        assert_eq!(Prefix::clinical_record(), Prefix::new("HC").unwrap());
    }

    #[test]
    fn test_invalid_prefixes() {
        let cases = [
            ("", "empty"),
            ("cp", "lowercase"),
            ("1CP", "leading digit"),
            ("C-P", "punctuation"),
            ("ABCDEFGHI", "too long"),
            ("HÇ", "non ascii"),
        ];
        for (p, why) in cases {
            assert!(Prefix::new(p).is_err(), "{p:?} should be rejected ({why})");
        }
    }

    #[test]
    fn test_prefix_serde() {
        let prefix: Prefix = serde_json::from_str("\"HC\"").unwrap();
        assert_eq!(prefix.as_str(), "HC");
        assert_eq!(serde_json::to_string(&prefix).unwrap(), "\"HC\"");

        let err = serde_json::from_str::<Prefix>("\"hc\"").unwrap_err();
        assert!(err.to_string().contains("uppercase"));
    }
}
