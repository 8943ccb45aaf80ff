use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use reqwest::header::RANGE;
use reqwest::Client;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::attempt::{AttemptOutcome, FetchMachine, Step, Verdict};
use super::retry::RetryPolicy;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::events::{percent_of, InstallEvent, Phase, ProgressBus, ProgressThrottle, PROGRESS_INTERVAL};
use crate::core::http::is_retryable_status;
use crate::core::plan::{ArtifactDescriptor, InstallPlan};

/// Outcome of fetching one artifact into staging.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub descriptor: ArtifactDescriptor,
    /// Verified copy in staging, or the destination itself when
    /// `already_installed` is set.
    pub staged_path: PathBuf,
    pub verified: bool,
    /// Network attempts across all mirrors. Zero when nothing was fetched.
    pub attempts: u32,
    /// Mirror the verified copy came from.
    pub mirror: Option<String>,
    /// Destination already held a matching file; nothing to commit.
    pub already_installed: bool,
}

/// Concurrent, checksum-verified downloader with mirror fallback.
pub struct Downloader {
    client: Client,
    /// Maximum number of parallel downloads.
    concurrency: usize,
    retry: RetryPolicy,
    plan_timeout: Option<Duration>,
    bus: ProgressBus,
}

impl Downloader {
    pub fn new(client: Client, bus: ProgressBus) -> Self {
        Self {
            client,
            concurrency: 4,
            retry: RetryPolicy::default(),
            plan_timeout: None,
            bus,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_plan_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.plan_timeout = timeout;
        self
    }

    // ── Plan download ───────────────────────────────────

    /// Fetch every artifact of `plan` into `staging`.
    ///
    /// Results come back in plan order. A terminal failure lets in-flight
    /// downloads finish but skips the ones not yet started.
    pub async fn download_plan(
        &self,
        plan: &InstallPlan,
        root: &Path,
        staging: &Path,
    ) -> InstallerResult<Vec<DownloadResult>> {
        info!(
            "Downloading {} artifacts ({} bytes), concurrency={}",
            plan.artifacts.len(),
            plan.total_bytes(),
            self.concurrency
        );

        let cancel = self.bus.cancellation_token();
        let skip_pending = cancel.child_token();

        let work = stream::iter(plan.artifacts.iter().enumerate())
            .map(|(index, artifact)| {
                let cancel = &cancel;
                let skip_pending = &skip_pending;
                async move {
                    if skip_pending.is_cancelled() {
                        debug!("Skipping {} after an earlier failure", artifact.id);
                        return (index, None);
                    }
                    let result = self.fetch_artifact(artifact, root, staging, cancel).await;
                    if result.is_err() {
                        skip_pending.cancel();
                    }
                    (index, Some(result))
                }
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>();

        let mut finished = match self.plan_timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| InstallerError::PlanTimedOut(limit.as_secs()))?,
            None => work.await,
        };
        finished.sort_by_key(|(index, _)| *index);

        let mut results = Vec::with_capacity(finished.len());
        let mut first_error: Option<InstallerError> = None;
        for (_, outcome) in finished {
            match outcome {
                Some(Ok(result)) => results.push(result),
                Some(Err(err)) => {
                    if error_rank(&err) < first_error.as_ref().map_or(u8::MAX, error_rank) {
                        first_error = Some(err);
                    }
                }
                None => {}
            }
        }

        match first_error {
            Some(err) => Err(err),
            None if cancel.is_cancelled() => Err(InstallerError::Cancelled),
            None => Ok(results),
        }
    }

    // ── Single artifact ─────────────────────────────────

    /// Fetch one artifact, or recognise it as already installed.
    pub async fn fetch_artifact(
        &self,
        artifact: &ArtifactDescriptor,
        root: &Path,
        staging: &Path,
        cancel: &CancellationToken,
    ) -> InstallerResult<DownloadResult> {
        if cancel.is_cancelled() {
            return Err(InstallerError::Cancelled);
        }

        let destination = artifact.destination(root);
        if matches_on_disk(artifact, &destination).await? {
            debug!("{} already installed at {:?}", artifact.id, destination);
            self.progress(artifact, artifact.size);
            return Ok(DownloadResult {
                descriptor: artifact.clone(),
                staged_path: destination,
                verified: true,
                attempts: 0,
                mirror: None,
                already_installed: true,
            });
        }

        let staged = staging.join(&artifact.path);
        if let Some(parent) = staged.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| InstallerError::io(parent, e))?;
        }

        if matches_on_disk(artifact, &staged).await? {
            debug!("{} verified from staging without network", artifact.id);
            return Ok(DownloadResult {
                descriptor: artifact.clone(),
                staged_path: staged,
                verified: true,
                attempts: 0,
                mirror: None,
                already_installed: false,
            });
        }

        let mut machine = FetchMachine::new(artifact.urls.len(), self.retry);
        let mut step = machine.start();
        let mut mirror_in_use: Option<usize> = None;

        loop {
            let (mirror, attempt, delay) = match step {
                Step::Attempt {
                    mirror,
                    attempt,
                    delay,
                } => (mirror, attempt, delay),
                Step::Finished(verdict) => {
                    return self.conclude(artifact, staged, verdict, machine.total_attempts())
                }
            };

            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        step = machine.advance(AttemptOutcome::Cancelled);
                        continue;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            // A partial from another mirror is not resumed.
            if mirror_in_use.is_some_and(|m| m != mirror) {
                remove_if_exists(&staged).await?;
            }
            mirror_in_use = Some(mirror);

            let url = &artifact.urls[mirror];
            debug!("{}: attempt {} against {}", artifact.id, attempt, url);
            let outcome = self.attempt(artifact, url, &staged, cancel).await?;

            match &outcome {
                AttemptOutcome::Transient(reason) => {
                    warn!("{}: attempt {} on {} failed: {}", artifact.id, attempt, url, reason)
                }
                AttemptOutcome::Unavailable(reason) => {
                    self.bus
                        .warn(Some(&artifact.id), format!("mirror {url} skipped: {reason}"));
                }
                AttemptOutcome::Mismatch { actual } => {
                    warn!(
                        "{}: checksum mismatch from {} (expected {}, got {})",
                        artifact.id, url, artifact.checksum.digest, actual
                    );
                    self.bus.warn(
                        Some(&artifact.id),
                        format!("checksum mismatch from {url}; trying next mirror"),
                    );
                }
                AttemptOutcome::Verified | AttemptOutcome::Cancelled => {}
            }
            step = machine.advance(outcome);
        }
    }

    fn conclude(
        &self,
        artifact: &ArtifactDescriptor,
        staged: PathBuf,
        verdict: Verdict,
        attempts: u32,
    ) -> InstallerResult<DownloadResult> {
        match verdict {
            Verdict::Verified { mirror } => {
                let url = artifact.urls[mirror].clone();
                info!("{} verified from {} after {} attempt(s)", artifact.id, url, attempts);
                Ok(DownloadResult {
                    descriptor: artifact.clone(),
                    staged_path: staged,
                    verified: true,
                    attempts,
                    mirror: Some(url),
                    already_installed: false,
                })
            }
            Verdict::IntegrityViolation { mirror, actual } => Err(InstallerError::IntegrityViolation {
                artifact: artifact.id.clone(),
                url: artifact.urls[mirror].clone(),
                expected: artifact.checksum.to_string(),
                actual,
            }),
            Verdict::Exhausted { reason } => Err(InstallerError::DownloadFailed {
                artifact: artifact.id.clone(),
                reason: format!("{reason} (after {attempts} attempt(s))"),
            }),
            Verdict::Cancelled => Err(InstallerError::Cancelled),
        }
    }

    /// One bounded attempt. Network trouble becomes an outcome; local IO
    /// errors are returned as errors.
    async fn attempt(
        &self,
        artifact: &ArtifactDescriptor,
        url: &str,
        staged: &Path,
        cancel: &CancellationToken,
    ) -> InstallerResult<AttemptOutcome> {
        match tokio::time::timeout(
            self.retry.attempt_timeout,
            self.transfer(artifact, url, staged, cancel),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Ok(AttemptOutcome::Transient(format!(
                "timed out after {:?}",
                self.retry.attempt_timeout
            ))),
        }
    }

    async fn transfer(
        &self,
        artifact: &ArtifactDescriptor,
        url: &str,
        staged: &Path,
        cancel: &CancellationToken,
    ) -> InstallerResult<AttemptOutcome> {
        let existing = match tokio::fs::metadata(staged).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        let resume_from = if existing < artifact.size { existing } else { 0 };
        if existing > 0 && resume_from == 0 {
            remove_if_exists(staged).await?;
        }

        let mut request = self.client.get(url);
        if resume_from > 0 {
            request = request.header(RANGE, format!("bytes={resume_from}-"));
        }
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(AttemptOutcome::Cancelled),
            sent = request.send() => match sent {
                Ok(response) => response,
                Err(e) => return Ok(AttemptOutcome::Transient(e.to_string())),
            },
        };

        let mut hasher = artifact.checksum.hasher();
        let status = response.status().as_u16();
        let (mut file, mut written) = match status {
            206 if resume_from > 0 => {
                debug!("{}: resuming at byte {}", artifact.id, resume_from);
                hasher.update_from_file(staged, Some(resume_from)).await?;
                let file = tokio::fs::OpenOptions::new()
                    .append(true)
                    .open(staged)
                    .await
                    .map_err(|e| InstallerError::io(staged, e))?;
                (file, resume_from)
            }
            200..=299 => {
                let file = tokio::fs::File::create(staged)
                    .await
                    .map_err(|e| InstallerError::io(staged, e))?;
                (file, 0)
            }
            416 => {
                remove_if_exists(staged).await?;
                return Ok(AttemptOutcome::Transient("range not satisfiable".into()));
            }
            code if is_retryable_status(code) => {
                return Ok(AttemptOutcome::Transient(format!("HTTP {code}")))
            }
            code => return Ok(AttemptOutcome::Unavailable(format!("HTTP {code}"))),
        };

        let mut throttle = ProgressThrottle::new(PROGRESS_INTERVAL);
        let mut body = response.bytes_stream();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    file.flush().await.map_err(|e| InstallerError::io(staged, e))?;
                    return Ok(AttemptOutcome::Cancelled);
                }
                next = body.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    file.flush().await.map_err(|e| InstallerError::io(staged, e))?;
                    return Ok(AttemptOutcome::Transient(format!("transfer interrupted: {e}")));
                }
            };

            if written + chunk.len() as u64 > artifact.size {
                drop(file);
                remove_if_exists(staged).await?;
                return Ok(AttemptOutcome::Mismatch {
                    actual: format!("body larger than {} bytes", artifact.size),
                });
            }
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| InstallerError::io(staged, e))?;
            written += chunk.len() as u64;

            if throttle.ready(Instant::now(), false) {
                self.progress(artifact, written);
            }
        }
        file.flush().await.map_err(|e| InstallerError::io(staged, e))?;
        drop(file);

        if written < artifact.size {
            return Ok(AttemptOutcome::Transient(format!(
                "short body: {written} of {} bytes",
                artifact.size
            )));
        }

        let actual = hasher.finalize_hex();
        if !artifact.checksum.matches(&actual) {
            remove_if_exists(staged).await?;
            return Ok(AttemptOutcome::Mismatch { actual });
        }

        self.progress(artifact, written);
        Ok(AttemptOutcome::Verified)
    }

    fn progress(&self, artifact: &ArtifactDescriptor, bytes: u64) {
        let total = Some(artifact.size);
        self.bus.publish(InstallEvent::Progress {
            phase: Phase::Download,
            artifact_id: artifact.id.clone(),
            bytes,
            total,
            percent: percent_of(bytes, total),
        });
    }
}

/// Lower ranks win when several artifacts fail in one run.
fn error_rank(err: &InstallerError) -> u8 {
    match err {
        InstallerError::IntegrityViolation { .. } => 0,
        InstallerError::Cancelled => 1,
        _ => 2,
    }
}

/// True when `path` holds exactly the expected bytes.
async fn matches_on_disk(artifact: &ArtifactDescriptor, path: &Path) -> InstallerResult<bool> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() == artifact.size => {
            artifact.checksum.verify_file(path).await
        }
        _ => Ok(false),
    }
}

async fn remove_if_exists(path: &Path) -> InstallerResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(InstallerError::io(path, e)),
    }
}
