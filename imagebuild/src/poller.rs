//! Completion check for the most recent execution of a job.
//!
//! Each call is a pure read against the job runner and, on failure, the log store. Scheduling repeated calls is up
//! to the caller, see [`crate::adapter`].

use log::{debug, info, warn};

use crate::{
    event::{EventError, LifecycleEvent, PollResponse, RequestType},
    runner::{ExecutionRecord, ExecutionStatus, JobRunner, LogLocation, LogStore},
};

/// Number of log lines included in the diagnostics of a failed execution.
pub const LOG_TAIL_LINES: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error("no execution found for job {0:?}")]
    NoExecutionFound(String),

    #[error("execution {execution_id} ended with status {status}{}", format_log_tail(.log_lines))]
    BuildFailed {
        execution_id: String,
        status: ExecutionStatus,
        /// The last lines of the execution's log in chronological order, if they could be read.
        log_lines: Option<Vec<String>>,
    },

    #[error("execution {execution_id} reported unrecognized status {status:?}")]
    UnrecognizedStatus {
        execution_id: String,
        status: String,
    },

    #[error("{0}")]
    Runner(Box<dyn std::error::Error + Send + Sync>),
}

fn format_log_tail(log_lines: &Option<Vec<String>>) -> String {
    let Some(lines) = log_lines else {
        return String::new();
    };
    let mut out = format!("\n\nlast {} log lines:", lines.len());
    for line in lines {
        out.push_str("\n  ");
        out.push_str(line);
    }
    out
}

/// Reports whether the most recent execution of the event's job has finished. On success the data carries the image
/// tag from the event, which is the tag the build phase pushed.
pub fn poll(
    runner: &dyn JobRunner,
    logs: &dyn LogStore,
    event: &LifecycleEvent,
) -> Result<PollResponse, PollError> {
    match event.request_type {
        RequestType::Delete => return Ok(PollResponse::complete()),
        RequestType::Create | RequestType::Update => {}
    }

    let project = event.project_name()?;
    let image_tag = event.image_tag()?;

    // Trust the runner's newest-first ordering.
    let execution_id = runner
        .latest_execution_id(project)
        .map_err(PollError::Runner)?
        .ok_or_else(|| PollError::NoExecutionFound(project.to_owned()))?;

    let ExecutionRecord {
        id,
        status,
        log_location,
        ..
    } = runner.execution(&execution_id).map_err(PollError::Runner)?;
    debug!("execution {id} has status {status}");

    match status {
        ExecutionStatus::Pending | ExecutionStatus::InProgress => Ok(PollResponse::pending()),
        ExecutionStatus::Succeeded => {
            info!("execution {id} succeeded, produced image tag {image_tag}");
            Ok(PollResponse::succeeded(image_tag))
        }
        status @ (ExecutionStatus::Failed
        | ExecutionStatus::Fault
        | ExecutionStatus::Stopped
        | ExecutionStatus::TimedOut) => Err(PollError::BuildFailed {
            log_lines: log_tail(logs, log_location.as_ref()),
            execution_id: id,
            status,
        }),
        ExecutionStatus::Unrecognized(status) => Err(PollError::UnrecognizedStatus {
            execution_id: id,
            status,
        }),
    }
}

/// Reads the last lines of the execution log. Any problem reading them degrades to `None` so that the failure of the
/// execution itself is still reported.
fn log_tail(logs: &dyn LogStore, location: Option<&LogLocation>) -> Option<Vec<String>> {
    let Some(location) = location else {
        warn!("the failed execution did not report a log location");
        return None;
    };
    match logs.tail(location, LOG_TAIL_LINES) {
        Ok(events) if events.is_empty() => None,
        Ok(events) => {
            let skip = events.len().saturating_sub(LOG_TAIL_LINES);
            Some(events.into_iter().skip(skip).map(|event| event.message).collect())
        }
        Err(error) => {
            warn!("failed to read the log tail of {location}: {error}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::ResourceProperties,
        testing::{FakeLogStore, FakeRunner},
    };

    fn event(request_type: RequestType) -> LifecycleEvent {
        LifecycleEvent::new(
            request_type,
            ResourceProperties {
                project_name: Some("my-project".to_owned()),
                image_tag: Some("0f8b7c1e".to_owned()),
                force: false,
            },
        )
    }

    fn seven_lines() -> FakeLogStore {
        FakeLogStore::with_lines((1..=7).map(|n| format!("line {n}")))
    }

    #[test]
    fn in_progress_is_pending_every_time() {
        let runner = FakeRunner::new([ExecutionStatus::InProgress]).with_execution("my-project:1");
        let logs = seven_lines();
        for _ in 0..10 {
            assert_eq!(
                poll(&runner, &logs, &event(RequestType::Create)).unwrap(),
                PollResponse::pending()
            );
        }
        assert!(runner.started().is_empty());
    }

    #[test]
    fn succeeded_reports_the_fixed_tag() {
        let runner = FakeRunner::new([ExecutionStatus::Succeeded]).with_execution("my-project:1");
        let response = poll(&runner, &seven_lines(), &event(RequestType::Update)).unwrap();
        assert!(response.is_complete);
        assert_eq!(response.artifact_tag(), Some("0f8b7c1e"));
    }

    #[test]
    fn failure_includes_last_five_lines_in_order() {
        let runner = FakeRunner::new([ExecutionStatus::Failed]).with_execution("my-project:1");
        let error = poll(&runner, &seven_lines(), &event(RequestType::Create)).unwrap_err();

        let PollError::BuildFailed { log_lines, .. } = &error else {
            panic!("unexpected error: {error}");
        };
        assert_eq!(
            log_lines.as_deref(),
            Some(&["line 3", "line 4", "line 5", "line 6", "line 7"].map(str::to_owned)[..])
        );

        let message = error.to_string();
        assert!(message.contains("FAILED"));
        assert!(!message.contains("line 2"));
        let positions = (3..=7)
            .map(|n| message.find(&format!("line {n}")).unwrap())
            .collect::<Vec<_>>();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn unreachable_logs_degrade_to_status_only() {
        let runner = FakeRunner::new([ExecutionStatus::TimedOut]).with_execution("my-project:1");
        let error = poll(&runner, &FakeLogStore::unreachable(), &event(RequestType::Create))
            .unwrap_err();
        assert!(matches!(
            error,
            PollError::BuildFailed {
                log_lines: None,
                ..
            }
        ));
        let message = error.to_string();
        assert!(message.contains("TIMED_OUT"));
        assert!(!message.contains("log lines"));
        assert!(!message.contains("ResourceNotFoundException"));
    }

    #[test]
    fn missing_log_location_degrades_to_status_only() {
        let runner = FakeRunner::new([ExecutionStatus::Stopped])
            .with_execution("my-project:1")
            .without_log_location();
        let error = poll(&runner, &seven_lines(), &event(RequestType::Create)).unwrap_err();
        assert_eq!(
            error.to_string(),
            "execution my-project:1 ended with status STOPPED"
        );
    }

    #[yare::parameterized(
        failed = { ExecutionStatus::Failed },
        fault = { ExecutionStatus::Fault },
        stopped = { ExecutionStatus::Stopped },
        timed_out = { ExecutionStatus::TimedOut },
    )]
    fn terminal_failures_raise(status: ExecutionStatus) {
        let runner = FakeRunner::new([status.clone()]).with_execution("my-project:1");
        match poll(&runner, &seven_lines(), &event(RequestType::Update)) {
            Err(PollError::BuildFailed { status: reported, .. }) => assert_eq!(reported, status),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unrecognized_status_is_never_success() {
        let runner = FakeRunner::new([ExecutionStatus::parse("EXPLODED")])
            .with_execution("my-project:1");
        let error = poll(&runner, &seven_lines(), &event(RequestType::Create)).unwrap_err();
        assert!(error.to_string().contains("\"EXPLODED\""));
    }

    #[test]
    fn no_execution_yet_is_an_error() {
        let runner = FakeRunner::new([ExecutionStatus::InProgress]);
        assert!(matches!(
            poll(&runner, &seven_lines(), &event(RequestType::Create)),
            Err(PollError::NoExecutionFound(project)) if project == "my-project"
        ));
    }

    #[test]
    fn delete_is_complete_without_calls() {
        let runner = FakeRunner::new([ExecutionStatus::InProgress]);
        let response = poll(
            &runner,
            &FakeLogStore::unreachable(),
            &LifecycleEvent::new(RequestType::Delete, ResourceProperties::default()),
        )
        .unwrap();
        assert_eq!(response, PollResponse::complete());
        assert_eq!(runner.calls(), 0);
    }

    #[test]
    fn missing_image_tag_is_a_configuration_error() {
        let runner = FakeRunner::new([ExecutionStatus::Succeeded]).with_execution("my-project:1");
        let mut event = event(RequestType::Create);
        event.resource_properties.image_tag = None;
        assert!(matches!(
            poll(&runner, &seven_lines(), &event),
            Err(PollError::Event(EventError::MissingImageTag("Create")))
        ));
        assert_eq!(runner.calls(), 0);
    }
}
