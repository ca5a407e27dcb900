//! Bounded retry-until-true polling used to confirm state transitions.

use std::fmt;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

/// How often and how long to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl PollPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Upper bound on the time spent sleeping between attempts.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("maximum number of retries ({attempts}) exceeded{}", describe_last_error(.last_error.as_deref()))]
    Timeout {
        attempts: u32,
        last_error: Option<String>,
    },
}

fn describe_last_error(last_error: Option<&str>) -> String {
    match last_error {
        Some(e) => format!(" (last error: {e})"),
        None => String::new(),
    }
}

/// Poll `predicate` with the default policy.
pub fn wait_for<F, E>(predicate: F) -> Result<(), PollError>
where
    F: FnMut() -> Result<bool, E>,
    E: fmt::Display,
{
    wait_for_specific(PollPolicy::default(), predicate)
}

/// Evaluate `predicate` until it yields `Ok(true)` or `policy.max_attempts`
/// evaluations have been made. A predicate error counts as "not yet"; the
/// most recent one is carried in the timeout.
pub fn wait_for_specific<F, E>(policy: PollPolicy, mut predicate: F) -> Result<(), PollError>
where
    F: FnMut() -> Result<bool, E>,
    E: fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match predicate() {
            Ok(true) => return Ok(()),
            Ok(false) => debug!("poll attempt {attempt}/{attempts}: condition not met"),
            Err(e) => {
                debug!("poll attempt {attempt}/{attempts}: query failed: {e}");
                last_error = Some(e.to_string());
            }
        }
        if attempt < attempts {
            thread::sleep(policy.interval);
        }
    }

    Err(PollError::Timeout {
        attempts,
        last_error,
    })
}
