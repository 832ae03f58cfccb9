//! In-memory job runner and log store for exercising the handlers without a remote service.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
};

use crate::{
    runner::{ExecutionRecord, ExecutionStatus, JobRunner, LogEvent, LogLocation, LogStore},
    Result,
};

pub struct FakeRunner {
    started: RefCell<Vec<String>>,
    executions: RefCell<Vec<String>>,
    /// Statuses reported by successive `execution` calls. The last one repeats forever.
    statuses: RefCell<VecDeque<ExecutionStatus>>,
    log_location: Option<LogLocation>,
    start_error: Option<String>,
    calls: Cell<usize>,
}

impl FakeRunner {
    pub fn new(statuses: impl IntoIterator<Item = ExecutionStatus>) -> Self {
        Self {
            started: RefCell::default(),
            executions: RefCell::default(),
            statuses: RefCell::new(statuses.into_iter().collect()),
            log_location: Some(LogLocation {
                group: "/aws/codebuild/my-project".to_owned(),
                stream: "stream-1".to_owned(),
            }),
            start_error: None,
            calls: Cell::new(0),
        }
    }

    pub fn with_execution(self, id: &str) -> Self {
        self.executions.borrow_mut().push(id.to_owned());
        self
    }

    pub fn without_log_location(mut self) -> Self {
        self.log_location = None;
        self
    }

    pub fn failing_start(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_owned());
        self
    }

    /// Job ids passed to `start_execution`, in call order.
    pub fn started(&self) -> Vec<String> {
        self.started.borrow().clone()
    }

    /// Total number of calls made through the [`JobRunner`] trait.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    fn record_call(&self) {
        self.calls.set(self.calls.get() + 1);
    }

    fn next_status(&self) -> Result<ExecutionStatus> {
        let mut statuses = self.statuses.borrow_mut();
        if statuses.len() > 1 {
            Ok(statuses.pop_front().unwrap())
        } else {
            statuses
                .front()
                .cloned()
                .ok_or_else(|| "no status configured".into())
        }
    }
}

impl JobRunner for FakeRunner {
    fn start_execution(&self, job_id: &str) -> Result<String> {
        self.record_call();
        if let Some(message) = &self.start_error {
            return Err(message.clone().into());
        }
        self.started.borrow_mut().push(job_id.to_owned());
        let id = format!("{job_id}:{}", self.executions.borrow().len() + 1);
        self.executions.borrow_mut().push(id.clone());
        Ok(id)
    }

    fn latest_execution_id(&self, _job_id: &str) -> Result<Option<String>> {
        self.record_call();
        Ok(self.executions.borrow().last().cloned())
    }

    fn execution(&self, execution_id: &str) -> Result<ExecutionRecord> {
        self.record_call();
        Ok(ExecutionRecord {
            id: execution_id.to_owned(),
            status: self.next_status()?,
            log_location: self.log_location.clone(),
            start_time: None,
            end_time: None,
        })
    }

    fn recent_executions(&self, _job_id: &str, limit: usize) -> Result<Vec<ExecutionRecord>> {
        self.record_call();
        let ids = self.executions.borrow().clone();
        ids.iter()
            .rev()
            .take(limit)
            .map(|id| self.execution(id))
            .collect()
    }
}

/// Serves a fixed stream of log lines, or fails every read when there are none.
pub struct FakeLogStore {
    lines: Option<Vec<String>>,
}

impl FakeLogStore {
    pub fn with_lines(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            lines: Some(lines.into_iter().map(Into::into).collect()),
        }
    }

    pub fn unreachable() -> Self {
        Self { lines: None }
    }
}

impl LogStore for FakeLogStore {
    fn tail(&self, location: &LogLocation, limit: usize) -> Result<Vec<LogEvent>> {
        let lines = self.lines.as_ref().ok_or_else(|| {
            format!("ResourceNotFoundException: the log stream {location} does not exist")
        })?;
        let skip = lines.len().saturating_sub(limit);
        Ok(lines
            .iter()
            .skip(skip)
            .map(|line| LogEvent {
                timestamp: None,
                message: line.clone(),
            })
            .collect())
    }
}
