// ─── Install Configuration ───

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::downloader::RetryPolicy;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::installer::RollbackPolicy;
use crate::core::plan::InstallationTarget;
use crate::core::target::find_game_dir;
use crate::core::version::{LoaderRequest, ReleaseChannel};

pub const DEFAULT_PROFILE: &str = "silk";
const MAX_CONCURRENCY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallConfig {
    pub target_runtime_version: String,
    /// `None` or `"latest"` picks the newest compatible loader.
    #[serde(default)]
    pub requested_loader_version: Option<String>,
    #[serde(default = "default_concurrency")]
    pub max_concurrent_downloads: usize,
    #[serde(default = "default_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Game directory. Discovered from Steam libraries when absent.
    #[serde(default)]
    pub install_root: Option<PathBuf>,
    pub manifest_url: String,
    #[serde(default = "default_profile")]
    pub profile_name: String,
    #[serde(default)]
    pub preferred_channel: ReleaseChannel,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    /// Budget for the whole download phase; `None` means unbounded.
    #[serde(default)]
    pub plan_timeout_secs: Option<u64>,
    #[serde(default)]
    pub rollback_policy: RollbackPolicy,
}

fn default_concurrency() -> usize {
    4
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_attempt_timeout_secs() -> u64 {
    60
}

impl InstallConfig {
    /// Minimal config; everything else takes its default.
    pub fn new(runtime_version: impl Into<String>, manifest_url: impl Into<String>) -> Self {
        Self {
            target_runtime_version: runtime_version.into(),
            requested_loader_version: None,
            max_concurrent_downloads: default_concurrency(),
            max_retry_attempts: default_retry_attempts(),
            install_root: None,
            manifest_url: manifest_url.into(),
            profile_name: default_profile(),
            preferred_channel: ReleaseChannel::default(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            plan_timeout_secs: None,
            rollback_policy: RollbackPolicy::default(),
        }
    }

    pub fn load_from_file(path: &Path) -> InstallerResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| InstallerError::io(path, e))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| InstallerError::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        info!("Loaded install config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> InstallerResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| InstallerError::io(parent, e))?;
        }
        std::fs::write(path, json).map_err(|e| InstallerError::io(path, e))
    }

    pub fn validate(&self) -> InstallerResult<()> {
        let invalid = |msg: String| Err(InstallerError::InvalidConfig(msg));

        if self.target_runtime_version.trim().is_empty() {
            return invalid("targetRuntimeVersion must not be empty".into());
        }
        if !(1..=MAX_CONCURRENCY).contains(&self.max_concurrent_downloads) {
            return invalid(format!(
                "maxConcurrentDownloads must be between 1 and {MAX_CONCURRENCY}"
            ));
        }
        if self.max_retry_attempts == 0 {
            return invalid("maxRetryAttempts must be at least 1".into());
        }
        match url::Url::parse(&self.manifest_url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            _ => return invalid(format!("manifestUrl '{}' is not an http(s) URL", self.manifest_url)),
        }
        let profile = self.profile_name.trim();
        if profile.is_empty()
            || profile.starts_with('.')
            || profile.contains(['/', '\\', ':'])
        {
            return invalid(format!("profileName '{}' is not a valid file name", self.profile_name));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return invalid("initialBackoffMs must not exceed maxBackoffMs".into());
        }
        if self.attempt_timeout_secs == 0 {
            return invalid("attemptTimeoutSecs must be positive".into());
        }
        if self.plan_timeout_secs == Some(0) {
            return invalid("planTimeoutSecs must be positive when set".into());
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
        }
    }

    pub fn plan_timeout(&self) -> Option<Duration> {
        self.plan_timeout_secs.map(Duration::from_secs)
    }

    pub fn request(&self) -> LoaderRequest {
        let loader_version = self
            .requested_loader_version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("latest"))
            .map(str::to_string);
        LoaderRequest {
            runtime_version: self.target_runtime_version.clone(),
            loader_version,
        }
    }

    /// Target from `installRoot`, else the first discovered game dir.
    pub fn target(&self) -> InstallerResult<InstallationTarget> {
        let root = match &self.install_root {
            Some(root) => root.clone(),
            None => find_game_dir().ok_or_else(|| {
                InstallerError::InvalidConfig(
                    "installRoot not set and no game directory was found".into(),
                )
            })?,
        };
        if !root.is_dir() {
            return Err(InstallerError::InvalidConfig(format!(
                "installRoot {:?} is not a directory",
                root
            )));
        }
        Ok(InstallationTarget::new(root, self.profile_name.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_takes_defaults() {
        let config: InstallConfig = serde_json::from_str(
            r#"{ "targetRuntimeVersion": "1.2", "manifestUrl": "https://example.org/silk.json" }"#,
        )
        .unwrap();
        assert_eq!(config, InstallConfig::new("1.2", "https://example.org/silk.json"));
        assert!(config.validate().is_ok());
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert_eq!(config.request(), LoaderRequest::latest("1.2"));
    }

    #[test]
    fn latest_is_the_same_as_unset() {
        let mut config = InstallConfig::new("1.2", "https://example.org/m.json");
        config.requested_loader_version = Some("latest".into());
        assert_eq!(config.request().loader_version, None);
        config.requested_loader_version = Some("2.3.0".into());
        assert_eq!(config.request().loader_version.as_deref(), Some("2.3.0"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let base = InstallConfig::new("1.2", "https://example.org/m.json");
        let cases: Vec<Box<dyn Fn(&mut InstallConfig)>> = vec![
            Box::new(|c| c.max_concurrent_downloads = 0),
            Box::new(|c| c.max_retry_attempts = 0),
            Box::new(|c| c.manifest_url = "ftp://example.org/m.json".into()),
            Box::new(|c| c.profile_name = "../evil".into()),
            Box::new(|c| c.target_runtime_version = " ".into()),
            Box::new(|c| c.initial_backoff_ms = 10_000),
            Box::new(|c| c.plan_timeout_secs = Some(0)),
        ];
        for mutate in cases {
            let mut config = base.clone();
            mutate(&mut config);
            assert!(matches!(config.validate(), Err(InstallerError::InvalidConfig(_))));
        }
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("installer.json");
        let mut config = InstallConfig::new("1.2", "https://example.org/m.json");
        config.install_root = Some(dir.path().to_path_buf());
        config.rollback_policy = RollbackPolicy::RevertCommitted;
        config.save(&path).unwrap();

        let loaded = InstallConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.target().unwrap().root, dir.path());
    }

    #[test]
    fn unparseable_file_is_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("installer.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(matches!(
            InstallConfig::load_from_file(&path),
            Err(InstallerError::InvalidConfig(_))
        ));
    }
}
