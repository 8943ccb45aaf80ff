// ─── Uninstall ───
// Removes only what a profile recorded, descriptor first so a half-removed
// install is never launched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::error::{InstallerError, InstallerResult};
use crate::core::launch::invalidate;
use crate::core::plan::{is_contained, InstallationTarget};
use crate::core::profile::InstallProfile;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallReport {
    pub removed: Vec<PathBuf>,
    /// Recorded but already gone.
    pub missing: Vec<PathBuf>,
    /// Still recorded by another profile.
    pub kept: Vec<PathBuf>,
    /// Recorded paths outside the install root; left alone.
    pub rejected: Vec<PathBuf>,
}

pub async fn uninstall(target: &InstallationTarget) -> InstallerResult<UninstallReport> {
    invalidate(&target.launch_descriptor_path()).await?;

    let profile_path = target.profile_path();
    let Some(profile) = InstallProfile::load(&profile_path).await? else {
        info!("No profile '{}' under {:?}; nothing to remove", target.profile, target.root);
        return Ok(UninstallReport::default());
    };

    let shared = paths_of_other_profiles(&profile_path).await?;
    let mut report = UninstallReport::default();

    for relative in &profile.paths {
        if !is_contained(relative) {
            warn!("Profile '{}' records {:?} outside the install root; skipping", target.profile, relative);
            report.rejected.push(relative.clone());
            continue;
        }
        if shared.contains(relative) {
            report.kept.push(relative.clone());
            continue;
        }
        let absolute = target.root.join(relative);
        match tokio::fs::remove_file(&absolute).await {
            Ok(()) => {
                debug!("Removed {:?}", absolute);
                report.removed.push(relative.clone());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.missing.push(relative.clone()),
            Err(e) => return Err(InstallerError::io(absolute, e)),
        }
        prune_empty_parents(&absolute, &target.root).await;
    }

    tokio::fs::remove_file(&profile_path)
        .await
        .map_err(|e| InstallerError::io(&profile_path, e))?;
    prune_empty_parents(&profile_path, &target.root).await;

    info!(
        "Uninstalled profile '{}': {} removed, {} missing, {} kept, {} rejected",
        target.profile,
        report.removed.len(),
        report.missing.len(),
        report.kept.len(),
        report.rejected.len()
    );
    Ok(report)
}

async fn paths_of_other_profiles(own: &Path) -> InstallerResult<HashSet<PathBuf>> {
    let mut shared = HashSet::new();
    let Some(dir) = own.parent() else {
        return Ok(shared);
    };
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(shared),
        Err(e) => return Err(InstallerError::io(dir, e)),
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| InstallerError::io(dir, e))?
    {
        let path = entry.path();
        if path == own || path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        if let Ok(Some(other)) = InstallProfile::load(&path).await {
            shared.extend(other.paths);
        }
    }
    Ok(shared)
}

/// Remove now-empty directories between `path` and `root` (exclusive).
async fn prune_empty_parents(path: &Path, root: &Path) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        // Fails on non-empty directories, which ends the walk.
        if tokio::fs::remove_dir(dir).await.is_err() {
            break;
        }
        current = dir.parent();
    }
}
