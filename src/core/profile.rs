// ─── Install Profile ───
// Records what an installation put where, so it can be inspected and
// removed without touching anything the engine did not write.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{InstallerError, InstallerResult};
use crate::core::launch::descriptor::write_atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallProfile {
    pub profile: String,
    pub loader_version: String,
    pub runtime_version: String,
    /// Paths relative to the install root written by any run of this profile.
    pub paths: Vec<PathBuf>,
    pub installed_at: DateTime<Utc>,
}

impl InstallProfile {
    /// Build the profile for a finished run, keeping paths recorded by
    /// earlier runs so uninstall still finds them.
    pub fn for_run(
        profile: impl Into<String>,
        loader_version: impl Into<String>,
        runtime_version: impl Into<String>,
        paths: Vec<PathBuf>,
        previous: Option<&InstallProfile>,
    ) -> Self {
        let mut all: BTreeSet<PathBuf> = paths.into_iter().collect();
        if let Some(previous) = previous {
            all.extend(previous.paths.iter().cloned());
        }
        Self {
            profile: profile.into(),
            loader_version: loader_version.into(),
            runtime_version: runtime_version.into(),
            paths: all.into_iter().collect(),
            installed_at: Utc::now(),
        }
    }

    pub async fn save(&self, path: &Path) -> InstallerResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomic(&target, &json))
            .await
            .map_err(|e| InstallerError::io(path, std::io::Error::other(e)))??;
        debug!("Saved profile '{}'", self.profile);
        Ok(())
    }

    /// `Ok(None)` when no profile was written yet.
    pub async fn load(path: &Path) -> InstallerResult<Option<Self>> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(InstallerError::io(path, e)),
        };
        Ok(Some(serde_json::from_str(&json)?))
    }
}
