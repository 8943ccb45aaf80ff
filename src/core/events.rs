// ─── Progress / Cancellation Bus ───
// Process-wide channel between the engine and whatever presents it.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Coarse stage of an install run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Resolve,
    Download,
    Write,
    Bootstrap,
}

/// Events published while an install runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InstallEvent {
    PhaseStarted {
        phase: Phase,
    },
    Progress {
        phase: Phase,
        artifact_id: String,
        bytes: u64,
        total: Option<u64>,
        percent: Option<f32>,
    },
    /// Recoverable condition, e.g. a mirror being skipped.
    Warning {
        artifact_id: Option<String>,
        message: String,
    },
    Completed {
        loader_version: String,
    },
    Failed {
        message: String,
        retryable: bool,
    },
}

/// Broadcast bus plus a cooperative cancellation signal.
///
/// Cloning shares both the channel and the cancellation token. Publishing
/// never blocks; slow subscribers see `RecvError::Lagged`.
#[derive(Clone, Debug)]
pub struct ProgressBus {
    tx: broadcast::Sender<InstallEvent>,
    cancel: CancellationToken,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn publish(&self, event: InstallEvent) {
        let _ = self.tx.send(event);
    }

    pub fn phase(&self, phase: Phase) {
        self.publish(InstallEvent::PhaseStarted { phase });
    }

    pub fn warn(&self, artifact_id: Option<&str>, message: impl Into<String>) {
        self.publish(InstallEvent::Warning {
            artifact_id: artifact_id.map(str::to_string),
            message: message.into(),
        });
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<InstallEvent> {
        self.tx.subscribe()
    }

    /// Request cancellation of the running install.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Coalesces per-chunk byte counts into at most one event per interval.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
}

pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(150);

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Returns true when an event should be emitted now.
    ///
    /// The first call and any `force`d call always emit.
    pub fn ready(&mut self, now: Instant, force: bool) -> bool {
        let due = match self.last_emit {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };
        if due || force {
            self.last_emit = Some(now);
            true
        } else {
            false
        }
    }
}

pub fn percent_of(bytes: u64, total: Option<u64>) -> Option<f32> {
    match total {
        Some(0) | None => None,
        Some(t) => Some(((bytes as f64 / t as f64) * 100.0).min(100.0) as f32),
    }
}
