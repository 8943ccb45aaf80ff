// ─── Version Scheme ───
// Ordering of loader / runtime version identifiers.

use std::cmp::Ordering;
use std::fmt;

/// Pluggable version ordering used by ranges and the resolver.
pub trait VersionScheme: Send + Sync {
    /// Precedence comparison. `Equal` means the two ids tie on precedence
    /// even if their raw text differs (e.g. differing build metadata).
    fn compare(&self, a: &str, b: &str) -> Ordering;
}

/// Semantic-version precedence with lenient release segments.
///
/// - release segments are compared numerically, missing segments count as 0
///   (`1.2` == `1.2.0`)
/// - a pre-release (`1.2.0-beta.1`) sorts below its release
/// - pre-release identifiers: numeric < alphanumeric, numerics compared as
///   numbers, the shorter list sorts first on a common prefix
/// - `+build` metadata is ignored
#[derive(Debug, Default, Clone, Copy)]
pub struct SemverScheme;

impl VersionScheme for SemverScheme {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        ParsedVersion::parse(a).cmp(&ParsedVersion::parse(b))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Identifier {
    Numeric(u64),
    Alpha(String),
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Identifier::Numeric(a), Identifier::Numeric(b)) => a.cmp(b),
            (Identifier::Numeric(_), Identifier::Alpha(_)) => Ordering::Less,
            (Identifier::Alpha(_), Identifier::Numeric(_)) => Ordering::Greater,
            (Identifier::Alpha(a), Identifier::Alpha(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A version id split into its comparable parts.
#[derive(Debug, Clone)]
pub struct ParsedVersion {
    release: Vec<u64>,
    pre: Vec<Identifier>,
}

impl ParsedVersion {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let raw = raw.strip_prefix(['v', 'V']).unwrap_or(raw);
        let without_build = raw.split('+').next().unwrap_or_default();
        let (release_part, pre_part) = match without_build.split_once('-') {
            Some((r, p)) => (r, Some(p)),
            None => (without_build, None),
        };

        let release = release_part
            .split('.')
            .map(|segment| {
                let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
                digits.parse::<u64>().unwrap_or(0)
            })
            .collect();

        let pre = pre_part
            .map(|p| {
                p.split('.')
                    .filter(|s| !s.is_empty())
                    .map(|s| match s.parse::<u64>() {
                        Ok(n) => Identifier::Numeric(n),
                        Err(_) => Identifier::Alpha(s.to_string()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self { release, pre }
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }
}

impl Ord for ParsedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.release.len().max(other.release.len());
        for idx in 0..len {
            let a = self.release.get(idx).copied().unwrap_or(0);
            let b = other.release.get(idx).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }

        match (self.pre.is_empty(), other.pre.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.pre.cmp(&other.pre),
        }
    }
}

impl PartialEq for ParsedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ParsedVersion {}

impl PartialOrd for ParsedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ParsedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let release: Vec<String> = self.release.iter().map(u64::to_string).collect();
        write!(f, "{}", release.join("."))?;
        if !self.pre.is_empty() {
            let pre: Vec<String> = self
                .pre
                .iter()
                .map(|id| match id {
                    Identifier::Numeric(n) => n.to_string(),
                    Identifier::Alpha(s) => s.clone(),
                })
                .collect();
            write!(f, "-{}", pre.join("."))?;
        }
        Ok(())
    }
}
