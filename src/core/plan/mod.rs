mod checksum;
mod descriptor;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use checksum::{Checksum, ChecksumAlgorithm, ChecksumHasher};
pub use descriptor::{is_contained, ArtifactDescriptor};

use crate::core::error::{InstallerError, InstallerResult};

/// Directory under the install root owned by the installer.
pub const SILK_DIR: &str = ".silk";
pub const LAUNCH_DESCRIPTOR_FILE: &str = "launch.json";

/// The external application's install root plus the profile we install as.
///
/// The root is shared with the application; the engine only owns the
/// subpaths it writes and the `.silk/` directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationTarget {
    pub root: PathBuf,
    pub profile: String,
}

impl InstallationTarget {
    pub fn new(root: impl Into<PathBuf>, profile: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            profile: profile.into(),
        }
    }

    pub fn silk_dir(&self) -> PathBuf {
        self.root.join(SILK_DIR)
    }

    pub fn launch_descriptor_path(&self) -> PathBuf {
        self.silk_dir().join(LAUNCH_DESCRIPTOR_FILE)
    }

    pub fn profile_path(&self) -> PathBuf {
        self.silk_dir()
            .join("profiles")
            .join(format!("{}.json", self.profile))
    }

    /// Parent of the per-run staging directories.
    pub fn staging_root(&self) -> PathBuf {
        self.silk_dir().join("staging")
    }
}

/// A resolved, concrete set of artifacts for one install run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallPlan {
    pub loader_version: String,
    pub runtime_version: String,
    /// Loader entry point; `None` means "read it from the loader jar".
    pub main_class: Option<String>,
    #[serde(default)]
    pub jvm_args: Vec<String>,
    /// Artifacts in manifest-declared order.
    pub artifacts: Vec<ArtifactDescriptor>,
}

impl InstallPlan {
    /// Build a plan, enforcing unique ids, unique destinations and
    /// dependency edges that point at artifacts of this plan.
    pub fn new(
        loader_version: impl Into<String>,
        runtime_version: impl Into<String>,
        main_class: Option<String>,
        jvm_args: Vec<String>,
        artifacts: Vec<ArtifactDescriptor>,
    ) -> InstallerResult<Self> {
        let plan = Self {
            loader_version: loader_version.into(),
            runtime_version: runtime_version.into(),
            main_class,
            jvm_args,
            artifacts,
        };
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> InstallerResult<()> {
        let mut ids = HashSet::new();
        let mut destinations: HashMap<PathBuf, &str> = HashMap::new();

        for artifact in &self.artifacts {
            artifact.validate()?;
            if !ids.insert(artifact.id.as_str()) {
                return Err(InstallerError::ManifestMalformed(format!(
                    "duplicate artifact id '{}'",
                    artifact.id
                )));
            }
            let key = normalize(&artifact.path);
            if let Some(other) = destinations.insert(key, &artifact.id) {
                return Err(InstallerError::ManifestMalformed(format!(
                    "artifacts '{other}' and '{}' both write {:?}",
                    artifact.id, artifact.path
                )));
            }
        }

        for artifact in &self.artifacts {
            for dep in &artifact.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(InstallerError::ManifestMalformed(format!(
                        "artifact '{}' depends on unknown artifact '{dep}'",
                        artifact.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn artifact(&self, id: &str) -> Option<&ArtifactDescriptor> {
        self.artifacts.iter().find(|a| a.id == id)
    }

    pub fn total_bytes(&self) -> u64 {
        self.artifacts.iter().map(|a| a.size).sum()
    }
}

/// Drop `.` components so `lib/./a.jar` and `lib/a.jar` collide.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}
