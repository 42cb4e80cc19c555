//! Node version identifiers

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::errors::OpsError;

/// Numeric dotted version (`26.0`, `26.0.1`).
///
/// Comparison pads the shorter side with zeros, so `26.0` and `26.0.0` are
/// equal.
#[derive(Debug, Clone)]
pub struct Version {
    components: Vec<u64>,
}

impl Version {
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Extract a version from free text such as `/Satoshi:26.0.0/` or `v27.1`.
    ///
    /// Takes the first run of digits and dots; anything after it (release
    /// candidate suffixes, trailing slashes) is ignored.
    pub fn extract(text: &str) -> Option<Self> {
        let start = text.find(|c: char| c.is_ascii_digit())?;
        let run: String = text[start..]
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        let components = run
            .split('.')
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .ok()?;

        if components.is_empty() {
            None
        } else {
            Some(Self { components })
        }
    }
}

impl FromStr for Version {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::extract(s)
            .ok_or_else(|| OpsError::VersionError(format!("No version number in '{}'", s)))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.components.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
