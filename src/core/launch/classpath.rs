// ─── Classpath Builder ───
// Orders plan artifacts for the launch classpath and renders it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::core::error::{InstallerError, InstallerResult};
use crate::core::plan::ArtifactDescriptor;

/// Stable topological order over `depends_on` edges.
///
/// Among artifacts whose dependencies are already placed, the one declared
/// first in the manifest goes next, so a plan without edges keeps manifest
/// order. A cycle is a manifest error.
pub fn dependency_order(artifacts: &[ArtifactDescriptor]) -> InstallerResult<Vec<&ArtifactDescriptor>> {
    let known: HashSet<&str> = artifacts.iter().map(|a| a.id.as_str()).collect();
    for artifact in artifacts {
        if let Some(dep) = artifact.depends_on.iter().find(|d| !known.contains(d.as_str())) {
            return Err(InstallerError::ManifestMalformed(format!(
                "artifact '{}' depends on unknown artifact '{dep}'",
                artifact.id
            )));
        }
    }

    let mut placed: HashSet<&str> = HashSet::with_capacity(artifacts.len());
    let mut remaining: Vec<&ArtifactDescriptor> = artifacts.iter().collect();
    let mut ordered = Vec::with_capacity(artifacts.len());

    while !remaining.is_empty() {
        let ready = remaining
            .iter()
            .position(|a| a.depends_on.iter().all(|d| placed.contains(d.as_str())));
        match ready {
            Some(idx) => {
                let next = remaining.remove(idx);
                placed.insert(next.id.as_str());
                ordered.push(next);
            }
            None => {
                let stuck: Vec<&str> = remaining.iter().map(|a| a.id.as_str()).collect();
                return Err(InstallerError::ManifestMalformed(format!(
                    "dependency cycle among artifacts {stuck:?}"
                )));
            }
        }
    }
    Ok(ordered)
}

/// Relative classpath entries in load order.
pub fn classpath_entries(artifacts: &[ArtifactDescriptor]) -> InstallerResult<Vec<PathBuf>> {
    Ok(dependency_order(artifacts)?
        .into_iter()
        .filter(|a| a.classpath)
        .map(|a| a.path.clone())
        .collect())
}

/// Join entries below `root` with the platform separator.
pub fn build_classpath(root: &Path, entries: &[PathBuf]) -> String {
    entries
        .iter()
        .map(|entry| safe_path_str(&root.join(entry)))
        .collect::<Vec<_>>()
        .join(get_classpath_separator())
}

/// Platform-specific Java classpath separator.
pub fn get_classpath_separator() -> &'static str {
    if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    }
}

/// Convert a path to a string Java accepts on every platform.
pub fn safe_path_str(path: &Path) -> String {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let text = resolved.to_string_lossy().to_string();

    #[cfg(target_os = "windows")]
    {
        // Java mis-handles extended-length paths on the classpath.
        if let Some(stripped) = text.strip_prefix(r"\\?\") {
            return stripped.to_string();
        }
    }

    text
}
