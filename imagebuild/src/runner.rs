//! The seams through which the handlers talk to the remote job runner and log store.

use std::fmt;

use crate::Result;

/// Status of one execution as reported by the job runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Fault,
    Stopped,
    TimedOut,
    /// Any value we do not know about. Never treated as success or as still running.
    Unrecognized(String),
}

impl ExecutionStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "PENDING" => ExecutionStatus::Pending,
            "IN_PROGRESS" => ExecutionStatus::InProgress,
            "SUCCEEDED" => ExecutionStatus::Succeeded,
            "FAILED" => ExecutionStatus::Failed,
            "FAULT" | "FAULTED" => ExecutionStatus::Fault,
            "STOPPED" => ExecutionStatus::Stopped,
            "TIMED_OUT" => ExecutionStatus::TimedOut,
            other => ExecutionStatus::Unrecognized(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::InProgress => "IN_PROGRESS",
            ExecutionStatus::Succeeded => "SUCCEEDED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Fault => "FAULT",
            ExecutionStatus::Stopped => "STOPPED",
            ExecutionStatus::TimedOut => "TIMED_OUT",
            ExecutionStatus::Unrecognized(value) => value,
        }
    }

    /// Returns true for statuses that indicate the execution ended unsuccessfully.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Failed
                | ExecutionStatus::Fault
                | ExecutionStatus::Stopped
                | ExecutionStatus::TimedOut
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == ExecutionStatus::Succeeded || self.is_failure()
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for ExecutionStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value: String = serde::Deserialize::deserialize(deserializer)?;
        Ok(ExecutionStatus::parse(&value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLocation {
    pub group: String,
    pub stream: String,
}

impl fmt::Display for LogLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.stream)
    }
}

/// One run of a job definition. Owned by the job runner, only ever read here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    pub id: String,
    pub status: ExecutionStatus,
    pub log_location: Option<LogLocation>,
    pub start_time: Option<time::OffsetDateTime>,
    pub end_time: Option<time::OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub timestamp: Option<time::OffsetDateTime>,
    pub message: String,
}

pub trait JobRunner {
    /// Starts a new execution of the job and returns its id without waiting for it.
    fn start_execution(&self, job_id: &str) -> Result<String>;

    /// Returns the id of the most recently started execution, trusting the runner's newest-first ordering.
    fn latest_execution_id(&self, job_id: &str) -> Result<Option<String>>;

    fn execution(&self, execution_id: &str) -> Result<ExecutionRecord>;

    /// Returns up to `limit` executions, newest first.
    fn recent_executions(&self, job_id: &str, limit: usize) -> Result<Vec<ExecutionRecord>>;
}

pub trait LogStore {
    /// Returns the most recent `limit` events of the stream in chronological order.
    fn tail(&self, location: &LogLocation, limit: usize) -> Result<Vec<LogEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        pending = { "PENDING", ExecutionStatus::Pending },
        in_progress = { "IN_PROGRESS", ExecutionStatus::InProgress },
        succeeded = { "SUCCEEDED", ExecutionStatus::Succeeded },
        failed = { "FAILED", ExecutionStatus::Failed },
        fault = { "FAULT", ExecutionStatus::Fault },
        faulted = { "FAULTED", ExecutionStatus::Fault },
        stopped = { "STOPPED", ExecutionStatus::Stopped },
        timed_out = { "TIMED_OUT", ExecutionStatus::TimedOut },
        other = { "EXPLODED", ExecutionStatus::Unrecognized("EXPLODED".to_owned()) },
    )]
    fn parses_status(input: &str, expected: ExecutionStatus) {
        assert_eq!(ExecutionStatus::parse(input), expected);
    }

    #[test]
    fn only_terminal_failures_are_failures() {
        assert!(ExecutionStatus::TimedOut.is_failure());
        assert!(!ExecutionStatus::InProgress.is_failure());
        assert!(!ExecutionStatus::Succeeded.is_failure());
        assert!(!ExecutionStatus::Unrecognized("X".to_owned()).is_failure());
    }

    #[test]
    fn deserializes_from_json_string() {
        let status: ExecutionStatus = serde_json::from_str(r#""TIMED_OUT""#).unwrap();
        assert_eq!(status, ExecutionStatus::TimedOut);
    }
}
