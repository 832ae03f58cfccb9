//! Drives the trigger and completion handlers in-process: one trigger, then polls on a fixed interval until the
//! execution finishes, the deadline passes or the user interrupts.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use log::{info, warn};

use crate::{
    event::{EventError, LifecycleEvent, PollResponse, ResponseStatus},
    poller::{self, PollError},
    runner::{JobRunner, LogStore},
    trigger,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// How many consecutive polls may find no execution at all before giving up. The runner may list a freshly started
/// execution with a small delay.
pub const MISSING_EXECUTION_RETRIES: usize = 3;

const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct Deadline(Instant);

impl Deadline {
    /// Create a new deadline that times out after the provided duration.
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    /// If there is enough time to sleep before the deadline, sleeps and returns Ok. Otherwise, returns Err. Wakes up
    /// early once `stop` is set.
    pub fn sleep(&self, duration: Duration, stop: &AtomicBool) -> Result<(), ()> {
        let wake = Instant::now() + duration;
        if wake >= self.0 {
            return Err(());
        }
        while !stop.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= wake {
                break;
            }
            thread::sleep((wake - now).min(STOP_CHECK_INTERVAL));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("failed to trigger {resource_id:?}: {reason}")]
    TriggerFailed { resource_id: String, reason: String },

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error("the execution did not complete within {0:?}")]
    Timeout(Duration),

    #[error("interrupted while waiting for the execution to complete")]
    Interrupted,
}

/// Triggers the event once and polls until the poller reports completion. Returns the final poll response.
pub fn run(
    runner: &dyn JobRunner,
    logs: &dyn LogStore,
    event: &LifecycleEvent,
    schedule: PollSchedule,
    stop: &AtomicBool,
) -> Result<PollResponse, AdapterError> {
    let response = trigger::trigger(runner, event)?;
    if response.status == ResponseStatus::Failed {
        return Err(AdapterError::TriggerFailed {
            resource_id: response.physical_resource_id,
            reason: response.reason.unwrap_or_default(),
        });
    }

    let deadline = Deadline::after(schedule.timeout);
    let mut missing = 0;
    loop {
        match poller::poll(runner, logs, event) {
            Ok(response) if response.is_complete => return Ok(response),
            Ok(_) => missing = 0,
            Err(PollError::NoExecutionFound(project)) if missing < MISSING_EXECUTION_RETRIES => {
                missing += 1;
                warn!("no execution of {project} listed yet, retrying");
            }
            Err(error) => return Err(error.into()),
        }

        if deadline.sleep(schedule.interval, stop).is_err() {
            return Err(AdapterError::Timeout(schedule.timeout));
        }
        if stop.load(Ordering::Relaxed) {
            info!("stopped waiting, the execution keeps running remotely");
            return Err(AdapterError::Interrupted);
        }
    }
}
