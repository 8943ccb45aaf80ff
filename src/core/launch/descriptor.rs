// ─── Launch Descriptor ───
// The last file an install writes and the only file the bootstrap reads.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::classpath::{build_classpath, classpath_entries, get_classpath_separator};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::plan::{ChecksumAlgorithm, ChecksumHasher, InstallPlan};

pub const DESCRIPTOR_FORMAT_VERSION: u32 = 1;

/// Entry point used by loader jars that predate the `Main-Class` attribute.
pub const FALLBACK_MAIN_CLASS: &str = "de.rhm176.loader.Main";

/// File name of the loader jar in the install root.
pub const LOADER_JAR_NAME: &str = "silk-loader.jar";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchDescriptor {
    pub format_version: u32,
    pub loader_version: String,
    pub runtime_version: String,
    pub entry_point: String,
    /// Entries relative to the install root, in load order.
    pub classpath: Vec<PathBuf>,
    #[serde(default)]
    pub jvm_args: Vec<String>,
    pub written_at: DateTime<Utc>,
    /// sha256 over every other field.
    pub digest: String,
}

/// Fields covered by the digest, in a fixed order.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Digested<'a> {
    format_version: u32,
    loader_version: &'a str,
    runtime_version: &'a str,
    entry_point: &'a str,
    classpath: &'a [PathBuf],
    jvm_args: &'a [String],
    written_at: &'a DateTime<Utc>,
}

impl LaunchDescriptor {
    pub fn new(plan: &InstallPlan, entry_point: impl Into<String>) -> InstallerResult<Self> {
        let mut descriptor = Self {
            format_version: DESCRIPTOR_FORMAT_VERSION,
            loader_version: plan.loader_version.clone(),
            runtime_version: plan.runtime_version.clone(),
            entry_point: entry_point.into(),
            classpath: classpath_entries(&plan.artifacts)?,
            jvm_args: plan.jvm_args.clone(),
            written_at: Utc::now(),
            digest: String::new(),
        };
        descriptor.digest = descriptor.compute_digest()?;
        Ok(descriptor)
    }

    fn compute_digest(&self) -> InstallerResult<String> {
        let bytes = serde_json::to_vec(&Digested {
            format_version: self.format_version,
            loader_version: &self.loader_version,
            runtime_version: &self.runtime_version,
            entry_point: &self.entry_point,
            classpath: &self.classpath,
            jvm_args: &self.jvm_args,
            written_at: &self.written_at,
        })?;
        let mut hasher = ChecksumHasher::new(ChecksumAlgorithm::Sha256);
        hasher.update(&bytes);
        Ok(hasher.finalize_hex())
    }

    // ── IO ──────────────────────────────────────────────

    /// Write atomically: temp file in the same directory, fsync, rename.
    pub async fn write(&self, path: &Path) -> InstallerResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| InstallerError::Launch(format!("descriptor writer panicked: {e}")))?
    }

    /// Read and parse without validating against the disk.
    pub fn load(path: &Path) -> InstallerResult<Self> {
        let inconsistent = |reason: String| InstallerError::BootstrapInconsistent {
            path: path.to_path_buf(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| inconsistent(format!("unreadable: {e}")))?;
        serde_json::from_str(&raw).map_err(|e| inconsistent(format!("unparseable: {e}")))
    }

    /// Load and check format version, digest and that every classpath
    /// entry exists under `root`.
    pub fn load_validated(path: &Path, root: &Path) -> InstallerResult<Self> {
        let descriptor = Self::load(path)?;
        descriptor.validate(path, root)?;
        Ok(descriptor)
    }

    pub fn validate(&self, path: &Path, root: &Path) -> InstallerResult<()> {
        let inconsistent = |reason: String| InstallerError::BootstrapInconsistent {
            path: path.to_path_buf(),
            reason,
        };

        if self.format_version != DESCRIPTOR_FORMAT_VERSION {
            return Err(inconsistent(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if self.compute_digest()? != self.digest {
            return Err(inconsistent("digest mismatch".into()));
        }
        if self.entry_point.trim().is_empty() {
            return Err(inconsistent("empty entry point".into()));
        }
        if self.classpath.is_empty() {
            return Err(inconsistent("empty classpath".into()));
        }
        if let Some(missing) = self.classpath.iter().find(|e| !root.join(e).is_file()) {
            return Err(inconsistent(format!("classpath entry {missing:?} is missing")));
        }
        Ok(())
    }

    /// Absolute classpath below `root`.
    pub fn classpath_string(&self, root: &Path) -> String {
        build_classpath(root, &self.classpath)
    }

    /// One-line launch option for store front-ends, relative to the game dir.
    pub fn steam_launch_option(&self) -> String {
        let cp = self
            .classpath
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join(get_classpath_separator());
        let mut parts = vec!["java".to_string()];
        parts.extend(self.jvm_args.iter().cloned());
        parts.push(format!("-cp \"{cp}\""));
        parts.push(self.entry_point.clone());
        parts.push("%command%".into());
        parts.join(" ")
    }
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> InstallerResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| InstallerError::io(path, std::io::Error::other("no parent directory")))?;
    std::fs::create_dir_all(parent).map_err(|e| InstallerError::io(parent, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| InstallerError::io(parent, e))?;
    tmp.write_all(bytes)
        .map_err(|e| InstallerError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| InstallerError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| InstallerError::io(path, e.error))?;
    debug!("Wrote {:?}", path);
    Ok(())
}

/// Remove a previous descriptor so a half-rewritten target is never trusted.
pub async fn invalidate(path: &Path) -> InstallerResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(InstallerError::io(path, e)),
    }
}

// ── Entry point discovery ───────────────────────────

/// `Main-Class` from the jar's `META-INF/MANIFEST.MF`, if present.
pub fn read_main_class(jar: &Path) -> InstallerResult<Option<String>> {
    let file = File::open(jar).map_err(|e| InstallerError::io(jar, e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut entry = match archive.by_name("META-INF/MANIFEST.MF") {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut manifest = String::new();
    entry
        .read_to_string(&mut manifest)
        .map_err(|e| InstallerError::io(jar, e))?;
    Ok(manifest_attribute(&manifest, "Main-Class"))
}

/// Look up a main-section attribute, honouring 72-byte line continuations.
fn manifest_attribute(manifest: &str, name: &str) -> Option<String> {
    let mut logical: Vec<String> = Vec::new();
    for line in manifest.lines() {
        if line.is_empty() {
            // Main section ends at the first blank line.
            break;
        }
        match (line.strip_prefix(' '), logical.last_mut()) {
            (Some(rest), Some(last)) => last.push_str(rest),
            _ => logical.push(line.to_string()),
        }
    }
    logical.into_iter().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Entry point for `plan`: declared in the manifest, else read from the
/// loader jar under `root`, else the historical default.
pub fn discover_entry_point(plan: &InstallPlan, root: &Path) -> String {
    if let Some(main) = plan.main_class.as_deref().filter(|m| !m.trim().is_empty()) {
        return main.to_string();
    }

    let classpath: Vec<_> = plan.artifacts.iter().filter(|a| a.classpath).collect();
    let jar = classpath
        .iter()
        .find(|a| a.path.file_name().is_some_and(|n| n == LOADER_JAR_NAME))
        .or_else(|| classpath.first());

    let Some(jar) = jar else {
        return FALLBACK_MAIN_CLASS.to_string();
    };
    let path = jar.destination(root);
    match read_main_class(&path) {
        Ok(Some(main)) => main,
        Ok(None) => {
            warn!("{:?} has no Main-Class; using {}", path, FALLBACK_MAIN_CLASS);
            FALLBACK_MAIN_CLASS.to_string()
        }
        Err(e) => {
            warn!("Could not read manifest of {:?}: {}; using {}", path, e, FALLBACK_MAIN_CLASS);
            FALLBACK_MAIN_CLASS.to_string()
        }
    }
}
