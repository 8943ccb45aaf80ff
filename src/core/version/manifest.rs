// ─── Version Manifest ───
// Parses the loader manifest. The document carries an explicit integer
// `schemaVersion`; each version has its own wire structs and is lowered
// into the same in-memory model.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::range::VersionRange;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::maven::{MavenCoordinate, FABRIC_MAVENS};
use crate::core::plan::{ArtifactDescriptor, Checksum, ChecksumAlgorithm};

/// Release channel of a loader version, most stable first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    #[default]
    Stable,
    Beta,
    Nightly,
}

/// One installable loader version.
#[derive(Debug, Clone)]
pub struct LoaderEntry {
    pub version: String,
    pub channel: ReleaseChannel,
    pub runtime: VersionRange,
    pub main_class: Option<String>,
    pub jvm_args: Vec<String>,
    pub artifacts: Vec<ArtifactDescriptor>,
}

/// Parsed manifest: loader version id → entry.
#[derive(Debug, Clone, Default)]
pub struct VersionManifest {
    pub entries: BTreeMap<String, LoaderEntry>,
}

pub const SUPPORTED_SCHEMAS: [u64; 2] = [1, 2];

impl VersionManifest {
    pub fn parse(raw: &str) -> InstallerResult<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| malformed(format!("not valid JSON: {e}")))?;

        let schema = value
            .get("schemaVersion")
            .ok_or_else(|| malformed("missing 'schemaVersion'"))?
            .as_u64()
            .ok_or_else(|| malformed("'schemaVersion' must be a positive integer"))?;

        match schema {
            1 => {
                let doc: wire::V1 = decode(value)?;
                doc.lower()
            }
            2 => {
                let doc: wire::V2 = decode(value)?;
                doc.lower()
            }
            other => Err(malformed(format!(
                "unsupported schemaVersion {other} (supported: {SUPPORTED_SCHEMAS:?})"
            ))),
        }
    }

    pub fn get(&self, version: &str) -> Option<&LoaderEntry> {
        self.entries.get(version)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> InstallerResult<T> {
    serde_json::from_value(value).map_err(|e| malformed(e.to_string()))
}

fn malformed(msg: impl Into<String>) -> InstallerError {
    InstallerError::ManifestMalformed(msg.into())
}

mod wire {
    use super::*;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ChecksumJson {
        pub algorithm: ChecksumAlgorithm,
        pub digest: String,
    }

    impl ChecksumJson {
        fn lower(&self) -> InstallerResult<Checksum> {
            Checksum::new(self.algorithm, &self.digest)
        }
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ExplicitArtifact {
        pub id: String,
        pub urls: Vec<String>,
        pub checksum: ChecksumJson,
        pub size: u64,
        pub path: PathBuf,
        #[serde(default)]
        pub depends_on: Vec<String>,
        #[serde(default = "yes")]
        pub classpath: bool,
    }

    fn yes() -> bool {
        true
    }

    impl ExplicitArtifact {
        fn lower(self) -> InstallerResult<ArtifactDescriptor> {
            let mut descriptor = ArtifactDescriptor::new(
                self.id,
                self.urls,
                self.checksum.lower()?,
                self.size,
                self.path,
            )?
            .with_dependencies(self.depends_on);
            descriptor.classpath = self.classpath;
            Ok(descriptor)
        }
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct EntryV1 {
        #[serde(default)]
        pub channel: ReleaseChannel,
        pub runtime: String,
        #[serde(default)]
        pub main_class: Option<String>,
        #[serde(default)]
        pub jvm_args: Vec<String>,
        pub artifacts: Vec<ExplicitArtifact>,
    }

    #[derive(Debug, Deserialize)]
    pub struct V1 {
        pub loaders: BTreeMap<String, EntryV1>,
    }

    impl V1 {
        pub fn lower(self) -> InstallerResult<VersionManifest> {
            let mut entries = BTreeMap::new();
            for (version, entry) in self.loaders {
                let artifacts = entry
                    .artifacts
                    .into_iter()
                    .map(ExplicitArtifact::lower)
                    .collect::<InstallerResult<Vec<_>>>()?;
                entries.insert(
                    version.clone(),
                    LoaderEntry {
                        runtime: VersionRange::parse(&entry.runtime)?,
                        version,
                        channel: entry.channel,
                        main_class: entry.main_class,
                        jvm_args: entry.jvm_args,
                        artifacts,
                    },
                );
            }
            Ok(VersionManifest { entries })
        }
    }

    /// Schema 2 lets artifacts name a Maven coordinate instead of URLs.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MavenArtifactJson {
        pub maven: String,
        #[serde(default)]
        pub id: Option<String>,
        pub checksum: ChecksumJson,
        pub size: u64,
        #[serde(default)]
        pub path: Option<PathBuf>,
        #[serde(default)]
        pub repositories: Option<Vec<String>>,
        #[serde(default)]
        pub depends_on: Vec<String>,
        #[serde(default = "yes")]
        pub classpath: bool,
    }

    #[derive(Debug, Deserialize)]
    #[serde(untagged)]
    pub enum ArtifactV2 {
        Maven(MavenArtifactJson),
        Explicit(ExplicitArtifact),
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct EntryV2 {
        #[serde(default)]
        pub channel: ReleaseChannel,
        pub runtime: String,
        #[serde(default)]
        pub main_class: Option<String>,
        #[serde(default)]
        pub jvm_args: Vec<String>,
        pub artifacts: Vec<ArtifactV2>,
    }

    #[derive(Debug, Deserialize)]
    pub struct V2 {
        #[serde(default)]
        pub repositories: Option<Vec<String>>,
        pub loaders: BTreeMap<String, EntryV2>,
    }

    impl V2 {
        pub fn lower(self) -> InstallerResult<VersionManifest> {
            let repositories: Vec<String> = self
                .repositories
                .unwrap_or_else(|| FABRIC_MAVENS.iter().map(|s| s.to_string()).collect());

            let mut entries = BTreeMap::new();
            for (version, entry) in self.loaders {
                let mut artifacts = Vec::with_capacity(entry.artifacts.len());
                for artifact in entry.artifacts {
                    let descriptor = match artifact {
                        ArtifactV2::Explicit(explicit) => explicit.lower()?,
                        ArtifactV2::Maven(m) => lower_maven(m, &repositories)?,
                    };
                    artifacts.push(descriptor);
                }
                entries.insert(
                    version.clone(),
                    LoaderEntry {
                        runtime: VersionRange::parse(&entry.runtime)?,
                        version,
                        channel: entry.channel,
                        main_class: entry.main_class,
                        jvm_args: entry.jvm_args,
                        artifacts,
                    },
                );
            }
            Ok(VersionManifest { entries })
        }
    }

    fn lower_maven(
        m: MavenArtifactJson,
        default_repos: &[String],
    ) -> InstallerResult<ArtifactDescriptor> {
        let coordinate = MavenCoordinate::parse(&m.maven)?;
        let repos = m.repositories.as_deref().unwrap_or(default_repos);
        let urls = repos.iter().map(|r| coordinate.url_in(r)).collect();
        let mut descriptor = ArtifactDescriptor::new(
            m.id.unwrap_or_else(|| coordinate.to_string()),
            urls,
            m.checksum.lower()?,
            m.size,
            m.path.unwrap_or_else(|| coordinate.library_path()),
        )?
        .with_dependencies(m.depends_on);
        descriptor.classpath = m.classpath;
        Ok(descriptor)
    }
}
