// ─── Version Range ───
// Interval notation for loader ↔ runtime compatibility.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::core::error::{InstallerError, InstallerResult};

use super::scheme::VersionScheme;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    Unbounded,
    Inclusive(String),
    Exclusive(String),
}

/// A compatibility range over runtime versions.
///
/// Accepted forms:
///   `[1.0,1.5)`  `(1.0,1.5]`  `[1.0,)`  `(,2.0)`  — interval notation
///   `[1.2]`                                     — exactly 1.2
///   `1.2`                                       — 1.2 or newer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub lower: Bound,
    pub upper: Bound,
}

impl VersionRange {
    pub fn parse(raw: &str) -> InstallerResult<Self> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(malformed(raw, "empty range"));
        }

        let open = text.chars().next().unwrap_or_default();
        let close = text.chars().last().unwrap_or_default();

        if !matches!(open, '[' | '(') {
            if matches!(close, ']' | ')') || text.contains(',') {
                return Err(malformed(raw, "unbalanced brackets"));
            }
            return Ok(Self {
                lower: Bound::Inclusive(text.to_string()),
                upper: Bound::Unbounded,
            });
        }
        if !matches!(close, ']' | ')') || text.len() < 2 {
            return Err(malformed(raw, "missing closing bracket"));
        }

        let inner = text[1..text.len() - 1].trim();
        match inner.split_once(',') {
            None => {
                if open != '[' || close != ']' || inner.is_empty() {
                    return Err(malformed(raw, "exact ranges must look like [x]"));
                }
                Ok(Self {
                    lower: Bound::Inclusive(inner.to_string()),
                    upper: Bound::Inclusive(inner.to_string()),
                })
            }
            Some((lo, hi)) => {
                let (lo, hi) = (lo.trim(), hi.trim());
                if hi.contains(',') {
                    return Err(malformed(raw, "too many bounds"));
                }
                let lower = match (lo.is_empty(), open) {
                    (true, _) => Bound::Unbounded,
                    (false, '[') => Bound::Inclusive(lo.to_string()),
                    (false, _) => Bound::Exclusive(lo.to_string()),
                };
                let upper = match (hi.is_empty(), close) {
                    (true, _) => Bound::Unbounded,
                    (false, ']') => Bound::Inclusive(hi.to_string()),
                    (false, _) => Bound::Exclusive(hi.to_string()),
                };
                Ok(Self { lower, upper })
            }
        }
    }

    /// Whether `version` lies inside this range under `scheme`.
    pub fn contains(&self, version: &str, scheme: &dyn VersionScheme) -> bool {
        let above_lower = match &self.lower {
            Bound::Unbounded => true,
            Bound::Inclusive(lo) => scheme.compare(version, lo) != Ordering::Less,
            Bound::Exclusive(lo) => scheme.compare(version, lo) == Ordering::Greater,
        };
        let below_upper = match &self.upper {
            Bound::Unbounded => true,
            Bound::Inclusive(hi) => scheme.compare(version, hi) != Ordering::Greater,
            Bound::Exclusive(hi) => scheme.compare(version, hi) == Ordering::Less,
        };
        above_lower && below_upper
    }
}

impl FromStr for VersionRange {
    type Err = InstallerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (open, lo) = match &self.lower {
            Bound::Unbounded => ('(', ""),
            Bound::Inclusive(v) => ('[', v.as_str()),
            Bound::Exclusive(v) => ('(', v.as_str()),
        };
        let (close, hi) = match &self.upper {
            Bound::Unbounded => (')', ""),
            Bound::Inclusive(v) => (']', v.as_str()),
            Bound::Exclusive(v) => (')', v.as_str()),
        };
        write!(f, "{open}{lo},{hi}{close}")
    }
}

fn malformed(raw: &str, why: &str) -> InstallerError {
    InstallerError::ManifestMalformed(format!("invalid version range '{raw}': {why}"))
}
