//! Allocator configuration.

use std::collections::HashSet;

use medreg_core::{CoreError, MAX_PADDING_WIDTH, Prefix};
use serde::{Deserialize, Serialize};

/// Default minimum number of digits in a code.
pub const DEFAULT_PADDING_WIDTH: usize = 6;

/// What to do when asked for a prefix that is not in `prefixes`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPrefixPolicy {
    /// Create the counter row at 0 on first use.
    #[default]
    Register,
    /// Fail with `InvalidPrefix` before touching the store.
    Reject,
}

/// A configured sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixConfig {
    pub prefix: Prefix,
    /// Overrides [`AllocatorConfig::padding_width`] for this prefix.
    #[serde(default)]
    pub padding_width: Option<usize>,
}

impl PrefixConfig {
    pub fn new(prefix: Prefix) -> Self {
        Self {
            prefix,
            padding_width: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Minimum digits after the prefix; longer values are not truncated.
    pub padding_width: usize,
    /// Known sequences. Their order is the global lock order.
    pub prefixes: Vec<PrefixConfig>,
    pub unknown_prefix: UnknownPrefixPolicy,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            padding_width: DEFAULT_PADDING_WIDTH,
            prefixes: vec![
                PrefixConfig::new(Prefix::patient_code()),
                PrefixConfig::new(Prefix::clinical_record()),
            ],
            unknown_prefix: UnknownPrefixPolicy::default(),
        }
    }
}

impl AllocatorConfig {
    /// Checks padding widths and rejects prefixes listed twice.
    pub fn validate(&self) -> Result<(), CoreError> {
        check_width(self.padding_width, "padding_width")?;

        let mut seen = HashSet::new();
        for entry in &self.prefixes {
            if !seen.insert(entry.prefix.as_str()) {
                return Err(CoreError::configuration(format!(
                    "prefix {} is listed more than once",
                    entry.prefix
                )));
            }
            if let Some(width) = entry.padding_width {
                check_width(width, &format!("padding_width of {}", entry.prefix))?;
            }
        }
        Ok(())
    }
}

fn check_width(width: usize, field: &str) -> Result<(), CoreError> {
    if width == 0 || width > MAX_PADDING_WIDTH {
        return Err(CoreError::configuration(format!(
            "{field} must be between 1 and {MAX_PADDING_WIDTH}, got {width}"
        )));
    }
    Ok(())
}
