// ─── Fetch State Machine ───
// Pending → Attempting(mirror, attempt) → Verified | ExhaustedMirrors
//
// Every attempt reports an explicit outcome; the machine decides whether to
// retry the same mirror, move to the next one, or stop.

use std::time::Duration;

use super::retry::RetryPolicy;

/// Result of one transfer attempt against one mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Bytes on disk match the expected checksum and size.
    Verified,
    /// Timeout, connection error, retryable status, truncated body.
    Transient(String),
    /// The mirror answered but will not serve the file (e.g. 404).
    Unavailable(String),
    /// Transfer completed but the content is wrong.
    Mismatch { actual: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    Pending,
    Attempting { mirror: usize, attempt: u32 },
    Verified { mirror: usize },
    ExhaustedMirrors,
}

/// What the driver should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Try `mirror` (again) after waiting `delay`.
    Attempt {
        mirror: usize,
        attempt: u32,
        delay: Duration,
    },
    Finished(Verdict),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Verified { mirror: usize },
    /// A mismatch was seen and no mirror produced a verified copy.
    IntegrityViolation { mirror: usize, actual: String },
    /// Every mirror failed for non-integrity reasons.
    Exhausted { reason: String },
    Cancelled,
}

/// Mismatches tolerated per artifact before the plan is failed.
const MISMATCH_BUDGET: u32 = 2;

#[derive(Debug)]
pub struct FetchMachine {
    mirrors: usize,
    policy: RetryPolicy,
    state: FetchState,
    total_attempts: u32,
    mismatches: u32,
    last_mismatch: Option<(usize, String)>,
    last_error: Option<String>,
}

impl FetchMachine {
    pub fn new(mirrors: usize, policy: RetryPolicy) -> Self {
        Self {
            mirrors,
            policy,
            state: FetchState::Pending,
            total_attempts: 0,
            mismatches: 0,
            last_mismatch: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    pub fn total_attempts(&self) -> u32 {
        self.total_attempts
    }

    /// Leave `Pending`.
    pub fn start(&mut self) -> Step {
        if self.mirrors == 0 {
            self.state = FetchState::ExhaustedMirrors;
            return Step::Finished(Verdict::Exhausted {
                reason: "no mirrors".into(),
            });
        }
        self.enter(0, 1, Duration::ZERO)
    }

    /// Feed the outcome of the attempt announced by the previous step.
    pub fn advance(&mut self, outcome: AttemptOutcome) -> Step {
        let (mirror, attempt) = match self.state {
            FetchState::Attempting { mirror, attempt } => (mirror, attempt),
            _ => {
                return Step::Finished(Verdict::Exhausted {
                    reason: format!("advance called in state {:?}", self.state),
                })
            }
        };

        match outcome {
            AttemptOutcome::Verified => {
                self.state = FetchState::Verified { mirror };
                Step::Finished(Verdict::Verified { mirror })
            }
            AttemptOutcome::Cancelled => {
                self.state = FetchState::ExhaustedMirrors;
                Step::Finished(Verdict::Cancelled)
            }
            AttemptOutcome::Transient(reason) => {
                self.last_error = Some(reason);
                if self.policy.allows_another(attempt) {
                    let delay = self.policy.delay_for_attempt(attempt);
                    self.enter(mirror, attempt + 1, delay)
                } else {
                    self.next_mirror(mirror)
                }
            }
            AttemptOutcome::Unavailable(reason) => {
                self.last_error = Some(reason);
                self.next_mirror(mirror)
            }
            AttemptOutcome::Mismatch { actual } => {
                self.mismatches += 1;
                self.last_mismatch = Some((mirror, actual.clone()));
                if self.mismatches >= MISMATCH_BUDGET {
                    self.state = FetchState::ExhaustedMirrors;
                    return Step::Finished(Verdict::IntegrityViolation { mirror, actual });
                }
                self.next_mirror(mirror)
            }
        }
    }

    fn enter(&mut self, mirror: usize, attempt: u32, delay: Duration) -> Step {
        self.state = FetchState::Attempting { mirror, attempt };
        self.total_attempts += 1;
        Step::Attempt {
            mirror,
            attempt,
            delay,
        }
    }

    fn next_mirror(&mut self, current: usize) -> Step {
        let next = current + 1;
        if next < self.mirrors {
            return self.enter(next, 1, Duration::ZERO);
        }

        self.state = FetchState::ExhaustedMirrors;
        match self.last_mismatch.take() {
            Some((mirror, actual)) => Step::Finished(Verdict::IntegrityViolation { mirror, actual }),
            None => Step::Finished(Verdict::Exhausted {
                reason: self
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "all mirrors failed".into()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
            attempt_timeout: Duration::from_secs(1),
        }
    }

    fn attempt(mirror: usize, attempt: u32) -> FetchState {
        FetchState::Attempting { mirror, attempt }
    }

    #[test]
    fn mismatch_on_first_mirror_falls_back_to_second() {
        let mut m = FetchMachine::new(2, policy(3));
        m.start();
        let step = m.advance(AttemptOutcome::Mismatch { actual: "bad".into() });
        assert_eq!(
            step,
            Step::Attempt {
                mirror: 1,
                attempt: 1,
                delay: Duration::ZERO
            }
        );
        assert_eq!(
            m.advance(AttemptOutcome::Verified),
            Step::Finished(Verdict::Verified { mirror: 1 })
        );
        assert_eq!(m.total_attempts(), 2);
        assert_eq!(m.state(), &FetchState::Verified { mirror: 1 });
    }

    #[test]
    fn mismatch_is_never_retried_on_the_same_mirror() {
        let mut m = FetchMachine::new(1, policy(3));
        m.start();
        let step = m.advance(AttemptOutcome::Mismatch { actual: "bad".into() });
        assert_eq!(
            step,
            Step::Finished(Verdict::IntegrityViolation {
                mirror: 0,
                actual: "bad".into()
            })
        );
        assert_eq!(m.total_attempts(), 1);
    }

    #[test]
    fn second_mismatch_stops_even_with_mirrors_left() {
        let mut m = FetchMachine::new(4, policy(3));
        m.start();
        m.advance(AttemptOutcome::Mismatch { actual: "x".into() });
        let step = m.advance(AttemptOutcome::Mismatch { actual: "y".into() });
        assert!(matches!(step, Step::Finished(Verdict::IntegrityViolation { mirror: 1, .. })));
    }

    #[test]
    fn transient_failures_back_off_then_move_on() {
        let mut m = FetchMachine::new(2, policy(3));
        m.start();
        assert_eq!(
            m.advance(AttemptOutcome::Transient("reset".into())),
            Step::Attempt {
                mirror: 0,
                attempt: 2,
                delay: Duration::from_millis(10)
            }
        );
        assert_eq!(
            m.advance(AttemptOutcome::Transient("reset".into())),
            Step::Attempt {
                mirror: 0,
                attempt: 3,
                delay: Duration::from_millis(20)
            }
        );
        m.advance(AttemptOutcome::Transient("reset".into()));
        assert_eq!(m.state(), &attempt(1, 1));
        m.advance(AttemptOutcome::Unavailable("404".into()));
        assert_eq!(m.state(), &FetchState::ExhaustedMirrors);
    }

    #[test]
    fn exhaustion_after_a_mismatch_is_still_an_integrity_violation() {
        let mut m = FetchMachine::new(2, policy(1));
        m.start();
        m.advance(AttemptOutcome::Mismatch { actual: "bad".into() });
        let step = m.advance(AttemptOutcome::Transient("timeout".into()));
        assert!(matches!(step, Step::Finished(Verdict::IntegrityViolation { mirror: 0, .. })));
    }

    #[test]
    fn plain_exhaustion_reports_last_reason() {
        let mut m = FetchMachine::new(1, policy(1));
        m.start();
        let step = m.advance(AttemptOutcome::Unavailable("HTTP 404".into()));
        assert_eq!(
            step,
            Step::Finished(Verdict::Exhausted {
                reason: "HTTP 404".into()
            })
        );
    }

    #[test]
    fn no_mirrors_finishes_immediately() {
        let mut m = FetchMachine::new(0, policy(3));
        assert!(matches!(m.start(), Step::Finished(Verdict::Exhausted { .. })));
    }

    #[test]
    fn cancellation_stops_the_machine() {
        let mut m = FetchMachine::new(3, policy(3));
        m.start();
        assert_eq!(m.advance(AttemptOutcome::Cancelled), Step::Finished(Verdict::Cancelled));
    }
}
