//! Octal permission bits for files written by the bootstrapper.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Unix permission bits, written and parsed in octal.
///
/// Accepts the forms found in node attribute files: `"0600"`, `"600"`,
/// `"0o600"`.
///
/// ```
/// use hopsflow_models::FileMode;
///
/// let mode: FileMode = "0750".parse().unwrap();
/// assert_eq!(mode.bits(), 0o750);
/// assert_eq!(mode.to_string(), "0750");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct FileMode(u32);

impl FileMode {
    /// Owner read/write only.
    pub const OWNER_RW: Self = Self(0o600);

    /// Wrap raw permission bits.
    pub fn new(bits: u32) -> Result<Self, ModelError> {
        if bits > 0o7777 {
            return Err(ModelError::InvalidFileMode {
                value: format!("{bits:o}"),
                reason: "must not exceed 7777".into(),
            });
        }
        Ok(Self(bits))
    }

    /// The raw permission bits.
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl Default for FileMode {
    fn default() -> Self {
        Self::OWNER_RW
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

impl FromStr for FileMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim();
        let digits = digits.strip_prefix("0o").unwrap_or(digits);
        if digits.is_empty() {
            return Err(ModelError::InvalidFileMode {
                value: s.to_string(),
                reason: "must not be empty".into(),
            });
        }
        let bits = u32::from_str_radix(digits, 8).map_err(|e| ModelError::InvalidFileMode {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        Self::new(bits)
    }
}

impl TryFrom<String> for FileMode {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FileMode> for String {
    fn from(mode: FileMode) -> Self {
        mode.to_string()
    }
}
