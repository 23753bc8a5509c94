//! Bounded existence polling.
//!
//! A companion object (the call audio, or stage 1's normalized metadata when stage 2 runs) is
//! written by someone else and may show up late. Waiting for it is split in two:
//!
//! - [`PollPolicy`] is the pure retry policy: how many checks, how far apart, stop on success.
//! - [`Sleeper`] performs the pause between checks. Production uses [`ThreadSleeper`]; tests pass
//!   a recording fake so no wall-clock time passes.
//!
//! [`CompanionWaiter`] combines the two with an [`ObjectStore`] existence check.

use crate::{PipelineError, PipelineResult};
use callmeta_store::ObjectStore;
use callmeta_types::{BucketName, ObjectKey};
use std::time::Duration;

/// Pauses the current invocation between existence checks.
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Retry budget for an existence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    wait_seconds: u64,
    check_interval_seconds: u64,
}

/// Where a wait ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    /// Still checking; `attempt` is the 1-based number of the next check.
    Polling { attempt: u32 },
    /// The object was present on check number `attempts`.
    Found { attempts: u32 },
    /// Every check in the budget failed.
    TimedOut { attempts: u32 },
}

impl PollPolicy {
    /// # Errors
    ///
    /// `PipelineError::InvalidConfig` if `check_interval_seconds` is zero.
    pub fn new(wait_seconds: u64, check_interval_seconds: u64) -> PipelineResult<Self> {
        if check_interval_seconds == 0 {
            return Err(PipelineError::InvalidConfig(
                "check interval must be at least one second".into(),
            ));
        }
        Ok(Self {
            wait_seconds,
            check_interval_seconds,
        })
    }

    pub fn wait_seconds(&self) -> u64 {
        self.wait_seconds
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    /// Number of existence checks in the budget: `wait / interval`, never less than one.
    ///
    /// A wait shorter than one interval still checks once rather than timing out unchecked.
    pub fn attempts(&self) -> u32 {
        let attempts = (self.wait_seconds / self.check_interval_seconds).max(1);
        u32::try_from(attempts).unwrap_or(u32::MAX)
    }

    /// Drive `check` through the policy.
    ///
    /// `check` receives the 1-based attempt number and reports whether the object is present.
    /// A successful check ends the wait immediately. Between failed checks the sleeper pauses
    /// for one check interval; there is no pause after the final failed check.
    pub fn run(&self, sleeper: &dyn Sleeper, mut check: impl FnMut(u32) -> bool) -> WaitState {
        let attempts = self.attempts();
        let mut state = WaitState::Polling { attempt: 1 };

        while let WaitState::Polling { attempt } = state {
            state = if check(attempt) {
                WaitState::Found { attempts: attempt }
            } else if attempt >= attempts {
                WaitState::TimedOut { attempts: attempt }
            } else {
                sleeper.sleep(self.check_interval());
                WaitState::Polling {
                    attempt: attempt + 1,
                }
            };
        }

        state
    }
}

/// Waits for an object that another producer writes asynchronously.
#[derive(Debug)]
pub struct CompanionWaiter<'a> {
    store: &'a dyn ObjectStore,
    sleeper: &'a dyn Sleeper,
    policy: PollPolicy,
}

impl<'a> CompanionWaiter<'a> {
    pub fn new(store: &'a dyn ObjectStore, sleeper: &'a dyn Sleeper, policy: PollPolicy) -> Self {
        Self {
            store,
            sleeper,
            policy,
        }
    }

    /// Poll until `bucket/key` exists or the budget is spent.
    ///
    /// Returns the number of checks it took to find the object.
    ///
    /// # Errors
    ///
    /// `PipelineError::WaitTimedOut` once every check in the budget has failed. Store errors
    /// during a check are logged and count as "not there yet".
    pub fn wait_for(&self, bucket: &BucketName, key: &ObjectKey) -> PipelineResult<u32> {
        let attempts = self.policy.attempts();

        let outcome = self.policy.run(self.sleeper, |attempt| {
            match self.store.exists(bucket, key) {
                Ok(true) => true,
                Ok(false) => {
                    tracing::warn!(
                        %bucket, %key, attempt,
                        remaining = attempts - attempt,
                        "object not found yet"
                    );
                    false
                }
                Err(e) => {
                    tracing::warn!(
                        %bucket, %key, attempt,
                        remaining = attempts - attempt,
                        error = %e,
                        "existence check failed"
                    );
                    false
                }
            }
        });

        match outcome {
            WaitState::Found { attempts } => {
                tracing::info!(%bucket, %key, attempts, "object found");
                Ok(attempts)
            }
            WaitState::TimedOut { attempts } | WaitState::Polling { attempt: attempts } => {
                tracing::error!(%bucket, %key, attempts, "object never appeared");
                Err(PipelineError::WaitTimedOut {
                    bucket: bucket.clone(),
                    key: key.clone(),
                    attempts,
                    wait_seconds: self.policy.wait_seconds(),
                })
            }
        }
    }
}
