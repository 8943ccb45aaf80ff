// ─── Installation Writer ───
// Moves verified staged files into the target tree, one atomic rename per
// file. A file is only ever visible at its final path with verified content.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::core::downloader::DownloadResult;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::events::{InstallEvent, Phase, ProgressBus};
use crate::core::plan::ArtifactDescriptor;

/// What happens to files renamed earlier in a run when a later one fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RollbackPolicy {
    /// Leave them; a re-run skips them because they verify.
    #[default]
    KeepCommitted,
    /// Undo them in reverse order, restoring previous contents.
    RevertCommitted,
}

/// Paths (relative to the install root) touched by a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub committed: Vec<PathBuf>,
    pub reused: Vec<PathBuf>,
}

impl CommitReport {
    /// Every path the installation now owns.
    pub fn all_paths(&self) -> Vec<PathBuf> {
        self.committed.iter().chain(self.reused.iter()).cloned().collect()
    }
}

/// One entry of the per-run transaction log.
#[derive(Debug)]
enum Undo {
    /// Destination was new; undo removes it.
    Remove(PathBuf),
    /// Destination had previous contents saved at `backup`.
    Restore { destination: PathBuf, backup: PathBuf },
}

pub struct InstallationWriter {
    root: PathBuf,
    backup_dir: PathBuf,
    policy: RollbackPolicy,
    bus: ProgressBus,
}

impl InstallationWriter {
    /// `backup_dir` holds previous file contents for the revert policy; it
    /// belongs to the run's staging area.
    pub fn new(root: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>, bus: ProgressBus) -> Self {
        Self {
            root: root.into(),
            backup_dir: backup_dir.into(),
            policy: RollbackPolicy::default(),
            bus,
        }
    }

    pub fn with_policy(mut self, policy: RollbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Commit `results` in order, stopping at the first failure.
    pub async fn commit(&self, results: &[DownloadResult]) -> InstallerResult<CommitReport> {
        if let Some(unverified) = results.iter().find(|r| !r.verified) {
            return Err(InstallerError::IntegrityViolation {
                artifact: unverified.descriptor.id.clone(),
                url: unverified.mirror.clone().unwrap_or_default(),
                expected: unverified.descriptor.checksum.to_string(),
                actual: "unverified".into(),
            });
        }

        let cancel = self.bus.cancellation_token();
        let mut report = CommitReport::default();
        let mut log: Vec<(PathBuf, Undo)> = Vec::new();

        for (index, result) in results.iter().enumerate() {
            let artifact = &result.descriptor;
            if result.already_installed {
                report.reused.push(artifact.path.clone());
                continue;
            }
            if cancel.is_cancelled() {
                info!("Commit cancelled after {} file(s)", report.committed.len());
                self.rollback(&mut log, &mut report).await;
                return Err(InstallerError::Cancelled);
            }

            let staged = result.staged_path.clone();
            let destination = artifact.destination(&self.root);
            let backup = match self.policy {
                RollbackPolicy::KeepCommitted => None,
                RollbackPolicy::RevertCommitted => Some(self.backup_dir.join(index.to_string())),
            };
            let owned = artifact.clone();

            let outcome = tokio::task::spawn_blocking(move || {
                commit_file(&owned, &staged, &destination, backup.as_deref())
            })
            .await
            .map_err(|e| InstallerError::io(artifact.destination(&self.root), std::io::Error::other(e)))
            .and_then(|r| r);

            match outcome {
                Ok(undo) => {
                    debug!("Committed {} -> {:?}", artifact.id, artifact.path);
                    log.push((artifact.path.clone(), undo));
                    report.committed.push(artifact.path.clone());
                    self.bus.publish(InstallEvent::Progress {
                        phase: Phase::Write,
                        artifact_id: artifact.id.clone(),
                        bytes: artifact.size,
                        total: Some(artifact.size),
                        percent: Some(100.0),
                    });
                }
                Err(err) => {
                    warn!("Commit of {} failed: {}", artifact.id, err);
                    let failed: Vec<PathBuf> = results[index..]
                        .iter()
                        .filter(|r| !r.already_installed)
                        .map(|r| r.descriptor.path.clone())
                        .collect();
                    self.rollback(&mut log, &mut report).await;
                    if let InstallerError::IntegrityViolation { .. } = err {
                        return Err(err);
                    }
                    return Err(InstallerError::InstallationIncomplete {
                        committed: report.committed,
                        failed,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            "Committed {} file(s), {} already in place",
            report.committed.len(),
            report.reused.len()
        );
        Ok(report)
    }

    /// Apply the rollback policy to this run's log. `report.committed` is
    /// left holding exactly the paths whose revert failed.
    async fn rollback(&self, log: &mut Vec<(PathBuf, Undo)>, report: &mut CommitReport) {
        if self.policy == RollbackPolicy::KeepCommitted || log.is_empty() {
            return;
        }
        let entries = std::mem::take(log);
        info!("Reverting {} committed file(s)", entries.len());
        let fallback: Vec<PathBuf> = entries.iter().map(|(path, _)| path.clone()).collect();
        let still_committed = tokio::task::spawn_blocking(move || {
            let mut failed = Vec::new();
            for (path, undo) in entries.into_iter().rev() {
                if let Err(e) = revert(&undo) {
                    warn!("Could not revert {:?}: {}", undo, e);
                    failed.push(path);
                }
            }
            failed.reverse();
            failed
        })
        .await
        .unwrap_or(fallback);

        report.committed = still_committed;
    }
}

// ── IO (blocking) ───────────────────────────────────

/// Copy `staged` into a temp file next to `destination`, re-hashing on the
/// way, fsync it and rename it into place.
fn commit_file(
    artifact: &ArtifactDescriptor,
    staged: &Path,
    destination: &Path,
    backup: Option<&Path>,
) -> InstallerResult<Undo> {
    let parent = destination
        .parent()
        .ok_or_else(|| InstallerError::io(destination, std::io::Error::other("no parent directory")))?;
    std::fs::create_dir_all(parent).map_err(|e| InstallerError::io(parent, e))?;

    let undo = match (destination.is_file(), backup) {
        (true, Some(backup)) => {
            if let Some(dir) = backup.parent() {
                std::fs::create_dir_all(dir).map_err(|e| InstallerError::io(dir, e))?;
            }
            std::fs::copy(destination, backup).map_err(|e| InstallerError::io(backup, e))?;
            Undo::Restore {
                destination: destination.to_path_buf(),
                backup: backup.to_path_buf(),
            }
        }
        _ => Undo::Remove(destination.to_path_buf()),
    };

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| InstallerError::io(parent, e))?;
    let mut source = File::open(staged).map_err(|e| InstallerError::io(staged, e))?;
    let mut hasher = artifact.checksum.hasher();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = source.read(&mut buf).map_err(|e| InstallerError::io(staged, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        tmp.write_all(&buf[..n])
            .map_err(|e| InstallerError::io(tmp.path(), e))?;
    }
    let actual = hasher.finalize_hex();
    if !artifact.checksum.matches(&actual) {
        // Staged bytes changed after verification; the temp file is dropped.
        return Err(InstallerError::IntegrityViolation {
            artifact: artifact.id.clone(),
            url: staged.display().to_string(),
            expected: artifact.checksum.to_string(),
            actual,
        });
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| InstallerError::io(tmp.path(), e))?;

    tmp.persist(destination)
        .map_err(|e| InstallerError::io(destination, e.error))?;
    Ok(undo)
}

fn revert(undo: &Undo) -> std::io::Result<()> {
    match undo {
        Undo::Remove(destination) => match std::fs::remove_file(destination) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        },
        Undo::Restore {
            destination,
            backup,
        } => {
            let parent = destination
                .parent()
                .ok_or_else(|| std::io::Error::other("no parent directory"))?;
            let mut tmp = NamedTempFile::new_in(parent)?;
            let mut source = File::open(backup)?;
            std::io::copy(&mut source, tmp.as_file_mut())?;
            tmp.as_file().sync_all()?;
            tmp.persist(destination).map_err(|e| e.error)?;
            Ok(())
        }
    }
}
