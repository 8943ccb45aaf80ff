use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::checksum::Checksum;
use crate::core::error::{InstallerError, InstallerResult};

/// One file an install run must fetch.
///
/// Immutable once built. Two descriptors are equal when their id and
/// checksum match; mirrors, size and destination do not take part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    pub id: String,
    /// Source URLs, tried in order.
    pub urls: Vec<String>,
    pub checksum: Checksum,
    pub size: u64,
    /// Destination relative to the install root.
    pub path: PathBuf,
    /// Ids of artifacts that must precede this one on the classpath.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Whether the file belongs on the launch classpath.
    #[serde(default = "default_true")]
    pub classpath: bool,
}

fn default_true() -> bool {
    true
}

impl ArtifactDescriptor {
    pub fn new(
        id: impl Into<String>,
        urls: Vec<String>,
        checksum: Checksum,
        size: u64,
        path: impl Into<PathBuf>,
    ) -> InstallerResult<Self> {
        let descriptor = Self {
            id: id.into(),
            urls,
            checksum,
            size,
            path: path.into(),
            depends_on: Vec::new(),
            classpath: true,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn with_dependencies(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn validate(&self) -> InstallerResult<()> {
        if self.id.trim().is_empty() {
            return Err(InstallerError::ManifestMalformed(
                "artifact with empty id".into(),
            ));
        }
        if self.urls.is_empty() {
            return Err(InstallerError::ManifestMalformed(format!(
                "artifact '{}' has no source URLs",
                self.id
            )));
        }
        for raw in &self.urls {
            let parsed = url::Url::parse(raw).map_err(|e| {
                InstallerError::ManifestMalformed(format!(
                    "artifact '{}' has invalid URL '{raw}': {e}",
                    self.id
                ))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(InstallerError::ManifestMalformed(format!(
                    "artifact '{}' uses unsupported scheme '{}'",
                    self.id,
                    parsed.scheme()
                )));
            }
        }
        ensure_contained(&self.id, &self.path)
    }

    /// Final location inside `root`.
    pub fn destination(&self, root: &Path) -> PathBuf {
        root.join(&self.path)
    }
}

impl PartialEq for ArtifactDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.checksum == other.checksum
    }
}

impl Eq for ArtifactDescriptor {}

impl Hash for ArtifactDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.checksum.hash(state);
    }
}

/// Destinations must be relative and must not climb out of the root.
/// True when `path` is relative, names at least one component and never
/// leaves the directory it is joined to.
pub fn is_contained(path: &Path) -> bool {
    let mut normal = 0usize;
    for component in path.components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            _ => return false,
        }
    }
    normal > 0
}

fn ensure_contained(id: &str, path: &Path) -> InstallerResult<()> {
    if !is_contained(path) {
        return Err(InstallerError::ManifestMalformed(format!(
            "artifact '{id}' destination {path:?} escapes the install root"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::ChecksumAlgorithm;

    fn sha1(d: char) -> Checksum {
        Checksum::new(ChecksumAlgorithm::Sha1, &d.to_string().repeat(40)).unwrap()
    }

    #[test]
    fn equality_ignores_mirrors_and_destination() {
        let a = ArtifactDescriptor::new("loader", vec!["https://a/x.jar".into()], sha1('a'), 1, "lib/x.jar").unwrap();
        let b = ArtifactDescriptor::new("loader", vec!["https://b/y.jar".into()], sha1('a'), 9, "y.jar").unwrap();
        let c = ArtifactDescriptor::new("loader", vec!["https://a/x.jar".into()], sha1('b'), 1, "lib/x.jar").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn rejects_escaping_destinations() {
        for bad in ["../evil.jar", "/etc/passwd", "lib/../../x.jar", "."] {
            let err = ArtifactDescriptor::new("x", vec!["https://a/x".into()], sha1('a'), 1, bad);
            assert!(matches!(err, Err(InstallerError::ManifestMalformed(_))), "{bad}");
        }
    }

    #[test]
    fn rejects_missing_or_odd_urls() {
        assert!(ArtifactDescriptor::new("x", vec![], sha1('a'), 1, "x.jar").is_err());
        assert!(ArtifactDescriptor::new("x", vec!["ftp://a/x".into()], sha1('a'), 1, "x.jar").is_err());
        assert!(ArtifactDescriptor::new("x", vec!["not a url".into()], sha1('a'), 1, "x.jar").is_err());
    }
}
