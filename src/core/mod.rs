// ─── Silk Installer Core ───
// Resolves, downloads, commits and bootstraps the Silk loader.
//
// Architecture:
//   core/
//     version/    — Manifest schemas, version ordering, ranges, resolver
//     plan/       — Artifact descriptors, checksums, install plan + target
//     maven/      — Maven coordinates and the Fabric mirrors
//     downloader/ — Concurrent downloads, retry state machine, resume
//     installer/  — Orchestration, atomic writer, uninstall
//     launch/     — Classpath order, launch descriptor, runtime bootstrap
//     target/     — Game directory discovery
//     events      — Progress / cancellation bus

pub mod config;
pub mod downloader;
pub mod error;
pub mod events;
pub mod http;
pub mod installer;
pub mod launch;
pub mod maven;
pub mod plan;
pub mod profile;
pub mod target;
pub mod version;
