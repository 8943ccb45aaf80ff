// ─── Installer ───
// Runs resolve → download → write → bootstrap for one target and reports
// progress on the bus. Staging is always cleaned up.

mod context;
pub mod uninstall;
mod writer;

use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

pub use context::InstallContext;
pub use uninstall::{uninstall, UninstallReport};
pub use writer::{CommitReport, InstallationWriter, RollbackPolicy};

use crate::core::config::InstallConfig;
use crate::core::downloader::Downloader;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::events::{InstallEvent, Phase, ProgressBus};
use crate::core::http::build_http_client;
use crate::core::launch::{discover_entry_point, invalidate, LaunchDescriptor};
use crate::core::plan::{InstallPlan, InstallationTarget};
use crate::core::profile::InstallProfile;
use crate::core::version::{HttpManifestSource, LoaderRequest, VersionResolver, VersionScheme};

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOutcome {
    pub loader_version: String,
    pub runtime_version: String,
    pub descriptor_path: PathBuf,
    /// Artifacts fetched and committed in this run.
    pub downloaded: usize,
    /// Artifacts already present and verified.
    pub reused: usize,
    pub launch_option: String,
}

pub struct Installer {
    resolver: VersionResolver,
    downloader: Downloader,
    rollback: RollbackPolicy,
    bus: ProgressBus,
}

impl Installer {
    pub fn new(resolver: VersionResolver, downloader: Downloader, bus: ProgressBus) -> Self {
        Self {
            resolver,
            downloader,
            rollback: RollbackPolicy::default(),
            bus,
        }
    }

    /// Wire the HTTP manifest source and downloader from `config`.
    pub fn from_config(config: &InstallConfig, bus: ProgressBus) -> InstallerResult<Self> {
        config.validate()?;
        let client = build_http_client()?;
        let source = HttpManifestSource::new(
            client.clone(),
            config.manifest_url.clone(),
            config.retry_policy(),
        );
        let resolver = VersionResolver::new(Arc::new(source))
            .with_preferred_channel(config.preferred_channel);
        let downloader = Downloader::new(client, bus.clone())
            .with_concurrency(config.max_concurrent_downloads)
            .with_retry(config.retry_policy())
            .with_plan_timeout(config.plan_timeout());

        Ok(Self::new(resolver, downloader, bus).with_rollback_policy(config.rollback_policy))
    }

    pub fn with_rollback_policy(mut self, policy: RollbackPolicy) -> Self {
        self.rollback = policy;
        self
    }

    pub fn bus(&self) -> &ProgressBus {
        &self.bus
    }

    pub fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    /// Resolve `request` and install it into `target`.
    pub async fn install(
        &self,
        request: &LoaderRequest,
        target: &InstallationTarget,
    ) -> InstallerResult<InstallOutcome> {
        self.bus.phase(Phase::Resolve);
        let plan = match self.resolver.resolve(request).await {
            Ok(plan) => plan,
            Err(err) => return Err(self.report_failure(err)),
        };
        self.install_plan(&plan, target).await
    }

    /// Install an already resolved plan.
    pub async fn install_plan(
        &self,
        plan: &InstallPlan,
        target: &InstallationTarget,
    ) -> InstallerResult<InstallOutcome> {
        let ctx = InstallContext::new(target, &self.bus);
        info!(
            "Install run {} of loader {} into {:?}",
            ctx.run_id, plan.loader_version, target.root
        );

        let result = self.run(&ctx, plan).await;

        if let Err(e) = tokio::fs::remove_dir_all(&ctx.run_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove staging {:?}: {}", ctx.run_dir, e);
            }
        }
        // Both only succeed when empty: no other run, nothing committed.
        let _ = tokio::fs::remove_dir(target.staging_root()).await;
        let _ = tokio::fs::remove_dir(target.silk_dir()).await;

        match result {
            Ok(outcome) => {
                self.bus.publish(InstallEvent::Completed {
                    loader_version: outcome.loader_version.clone(),
                });
                info!(
                    "Installed loader {} ({} downloaded, {} reused)",
                    outcome.loader_version, outcome.downloaded, outcome.reused
                );
                Ok(outcome)
            }
            Err(err) => Err(self.report_failure(err)),
        }
    }

    async fn run(&self, ctx: &InstallContext<'_>, plan: &InstallPlan) -> InstallerResult<InstallOutcome> {
        let staging = ctx.staging_dir();
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| InstallerError::io(&staging, e))?;

        // ── Download ──
        self.bus.phase(Phase::Download);
        let results = self
            .downloader
            .download_plan(plan, ctx.root(), &staging)
            .await?;
        if self.bus.is_cancelled() {
            return Err(InstallerError::Cancelled);
        }

        // ── Write ──
        self.bus.phase(Phase::Write);
        let descriptor_path = ctx.target.launch_descriptor_path();
        if invalidate(&descriptor_path).await? {
            info!("Invalidated previous launch descriptor");
        }
        let report = InstallationWriter::new(ctx.root(), ctx.backup_dir(), self.bus.clone())
            .with_policy(self.rollback)
            .commit(&results)
            .await?;

        // ── Bootstrap ──
        self.bus.phase(Phase::Bootstrap);
        let entry_point = discover_entry_point(plan, ctx.root());

        let profile_path = ctx.target.profile_path();
        let previous = match InstallProfile::load(&profile_path).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!("Ignoring unreadable profile {:?}: {}", profile_path, e);
                None
            }
        };
        InstallProfile::for_run(
            ctx.target.profile.clone(),
            plan.loader_version.clone(),
            plan.runtime_version.clone(),
            report.all_paths(),
            previous.as_ref(),
        )
        .save(&profile_path)
        .await?;

        // Written last: its presence means the install is complete.
        let descriptor = LaunchDescriptor::new(plan, entry_point)?;
        descriptor.write(&descriptor_path).await?;

        Ok(InstallOutcome {
            loader_version: plan.loader_version.clone(),
            runtime_version: plan.runtime_version.clone(),
            descriptor_path,
            downloaded: report.committed.len(),
            reused: report.reused.len(),
            launch_option: descriptor.steam_launch_option(),
        })
    }

    /// Return a launchable descriptor, re-installing when the committed one
    /// is missing, broken, for another runtime or not the requested loader.
    pub async fn ensure_installed(
        &self,
        request: &LoaderRequest,
        target: &InstallationTarget,
    ) -> InstallerResult<LaunchDescriptor> {
        let path = target.launch_descriptor_path();
        match LaunchDescriptor::load_validated(&path, &target.root) {
            Ok(descriptor) if descriptor.runtime_version != request.runtime_version => info!(
                "Installed for runtime {}, need {}; reinstalling",
                descriptor.runtime_version, request.runtime_version
            ),
            Ok(descriptor) if !self.satisfies_requested(&descriptor, request) => info!(
                "Installed loader {}, requested {:?}; reinstalling",
                descriptor.loader_version, request.loader_version
            ),
            Ok(descriptor) => return Ok(descriptor),
            Err(InstallerError::BootstrapInconsistent { reason, .. }) => {
                warn!("Launch descriptor unusable ({}); reinstalling", reason)
            }
            Err(e) => return Err(e),
        }

        self.install(request, target).await?;
        LaunchDescriptor::load_validated(&path, &target.root)
    }

    /// No explicit loader version means any committed one will do.
    fn satisfies_requested(&self, descriptor: &LaunchDescriptor, request: &LoaderRequest) -> bool {
        request.loader_version.as_deref().map_or(true, |wanted| {
            self.resolver
                .scheme()
                .compare(&descriptor.loader_version, wanted)
                == Ordering::Equal
        })
    }

    fn report_failure(&self, err: InstallerError) -> InstallerError {
        warn!("Install failed: {}", err);
        self.bus.publish(InstallEvent::Failed {
            message: err.to_string(),
            retryable: err.is_retryable(),
        });
        err
    }
}
