// ─── Version Resolver ───
// Fetches the manifest and picks the loader version for a runtime.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::manifest::{LoaderEntry, ReleaseChannel, VersionManifest};
use super::scheme::{SemverScheme, VersionScheme};
use super::source::{ManifestCache, ManifestSource, NoManifestCache};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::launch::classpath::dependency_order;
use crate::core::plan::InstallPlan;

/// What the caller wants installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderRequest {
    pub runtime_version: String,
    /// `None` selects the newest compatible loader.
    pub loader_version: Option<String>,
}

impl LoaderRequest {
    pub fn latest(runtime_version: impl Into<String>) -> Self {
        Self {
            runtime_version: runtime_version.into(),
            loader_version: None,
        }
    }

    pub fn exact(runtime_version: impl Into<String>, loader_version: impl Into<String>) -> Self {
        Self {
            runtime_version: runtime_version.into(),
            loader_version: Some(loader_version.into()),
        }
    }
}

pub struct VersionResolver {
    source: Arc<dyn ManifestSource>,
    cache: Arc<dyn ManifestCache>,
    scheme: Arc<dyn VersionScheme>,
    preferred_channel: ReleaseChannel,
}

impl VersionResolver {
    pub fn new(source: Arc<dyn ManifestSource>) -> Self {
        Self {
            source,
            cache: Arc::new(NoManifestCache),
            scheme: Arc::new(SemverScheme),
            preferred_channel: ReleaseChannel::Stable,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ManifestCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_scheme(mut self, scheme: Arc<dyn VersionScheme>) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_preferred_channel(mut self, channel: ReleaseChannel) -> Self {
        self.preferred_channel = channel;
        self
    }

    pub fn scheme(&self) -> &dyn VersionScheme {
        self.scheme.as_ref()
    }

    /// Fetch (or take from the per-run cache) and parse the manifest.
    pub async fn fetch_manifest(&self) -> InstallerResult<VersionManifest> {
        let location = self.source.location();
        let body = match self.cache.get(location) {
            Some(body) => {
                debug!("Manifest for {} served from run cache", location);
                body
            }
            None => {
                let body = self.source.fetch().await?;
                self.cache.put(location, &body);
                body
            }
        };
        VersionManifest::parse(&body)
    }

    /// Resolve `request` into a concrete install plan.
    pub async fn resolve(&self, request: &LoaderRequest) -> InstallerResult<InstallPlan> {
        let manifest = self.fetch_manifest().await?;
        let entry = self.select(&manifest, request)?;
        info!(
            "Resolved loader {} ({:?}) for runtime {}",
            entry.version, entry.channel, request.runtime_version
        );
        plan_for(entry, &request.runtime_version)
    }

    /// Pick the entry for `request` from an already parsed manifest.
    pub fn select<'m>(
        &self,
        manifest: &'m VersionManifest,
        request: &LoaderRequest,
    ) -> InstallerResult<&'m LoaderEntry> {
        let runtime = request.runtime_version.as_str();
        let no_match = || InstallerError::NoCompatibleVersion {
            runtime: runtime.to_string(),
            requested: request.loader_version.clone(),
        };

        if let Some(wanted) = &request.loader_version {
            let entry = manifest.get(wanted).or_else(|| {
                manifest
                    .entries
                    .values()
                    .find(|e| self.scheme.compare(&e.version, wanted) == Ordering::Equal)
            });
            return match entry {
                Some(entry) if entry.runtime.contains(runtime, self.scheme()) => Ok(entry),
                _ => Err(no_match()),
            };
        }

        manifest
            .entries
            .values()
            .filter(|e| e.runtime.contains(runtime, self.scheme()))
            .max_by(|a, b| self.rank(a, b))
            .ok_or_else(no_match)
    }

    /// Total order used to pick the best candidate: version precedence,
    /// then the preferred channel, then channel stability, then raw id.
    fn rank(&self, a: &LoaderEntry, b: &LoaderEntry) -> Ordering {
        self.scheme
            .compare(&a.version, &b.version)
            .then_with(|| {
                let pa = a.channel == self.preferred_channel;
                let pb = b.channel == self.preferred_channel;
                pa.cmp(&pb)
            })
            .then_with(|| b.channel.cmp(&a.channel))
            .then_with(|| a.version.cmp(&b.version))
    }
}

/// Turn a manifest entry into a validated plan.
pub fn plan_for(entry: &LoaderEntry, runtime_version: &str) -> InstallerResult<InstallPlan> {
    let plan = InstallPlan::new(
        entry.version.clone(),
        runtime_version,
        entry.main_class.clone(),
        entry.jvm_args.clone(),
        entry.artifacts.clone(),
    )?;
    dependency_order(&plan.artifacts)?;
    Ok(plan)
}
