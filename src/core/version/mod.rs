pub mod manifest;
pub mod range;
pub mod resolver;
pub mod scheme;
pub mod source;

pub use manifest::{LoaderEntry, ReleaseChannel, VersionManifest};
pub use range::{Bound, VersionRange};
pub use resolver::{plan_for, LoaderRequest, VersionResolver};
pub use scheme::{ParsedVersion, SemverScheme, VersionScheme};
pub use source::{
    HttpManifestSource, ManifestCache, ManifestSource, MemoryManifestCache, NoManifestCache,
    StaticManifestSource,
};
