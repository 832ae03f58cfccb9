use log::{debug, info, warn};

use crate::{
    event::{EventError, LifecycleEvent, RequestType, TriggerResponse},
    runner::JobRunner,
};

/// Handles one lifecycle event by starting a new execution of the job on create and update. Does not wait for the
/// execution.
///
/// A failure to start the execution is reported as a failed response that still carries the resource id, so the
/// caller can attribute it. Only configuration errors in the event itself are returned as `Err`.
pub fn trigger(
    runner: &dyn JobRunner,
    event: &LifecycleEvent,
) -> Result<TriggerResponse, EventError> {
    let resource_id = event.resource_id()?;

    match event.request_type {
        RequestType::Delete => {
            debug!("nothing to start for delete of {resource_id:?}");
            Ok(TriggerResponse::success(resource_id))
        }
        RequestType::Create | RequestType::Update => {
            let project = event.project_name()?;
            match runner.start_execution(project) {
                Ok(execution_id) => {
                    info!("started execution {execution_id} of {project}");
                    Ok(TriggerResponse::success(resource_id))
                }
                Err(error) => {
                    warn!("failed to start an execution of {project}: {error}");
                    Ok(TriggerResponse::failed(
                        resource_id,
                        format!("failed to start an execution of {project:?}: {error}"),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::{ResourceProperties, ResponseStatus},
        runner::ExecutionStatus,
        testing::FakeRunner,
    };

    fn properties() -> ResourceProperties {
        ResourceProperties {
            project_name: Some("my-project".to_owned()),
            image_tag: Some("abc".to_owned()),
            force: true,
        }
    }

    #[test]
    fn delete_makes_no_calls() {
        let runner = FakeRunner::new([ExecutionStatus::Succeeded]);
        let event = LifecycleEvent::new(RequestType::Delete, properties())
            .with_physical_resource_id("resource-1");

        let response = trigger(&runner, &event).unwrap();

        assert_eq!(runner.calls(), 0);
        assert_eq!(response.physical_resource_id, "resource-1");
        assert_eq!(response.status, ResponseStatus::Success);
        assert!(response.data.is_empty());
    }

    #[test]
    fn create_starts_exactly_one_execution() {
        let runner = FakeRunner::new([ExecutionStatus::InProgress]);
        let event = LifecycleEvent::new(RequestType::Create, properties());

        let response = trigger(&runner, &event).unwrap();

        assert_eq!(runner.started(), ["my-project"]);
        assert_eq!(runner.calls(), 1);
        assert_eq!(response.physical_resource_id, "my-project");
        assert_eq!(response.status, ResponseStatus::Success);
    }

    #[test]
    fn update_keeps_the_resource_id() {
        let runner = FakeRunner::new([ExecutionStatus::InProgress]);
        let event = LifecycleEvent::new(RequestType::Update, properties())
            .with_physical_resource_id("resource-1");

        let response = trigger(&runner, &event).unwrap();

        assert_eq!(runner.started(), ["my-project"]);
        assert_eq!(response.physical_resource_id, "resource-1");
    }

    #[test]
    fn start_failure_is_attributed_to_the_resource() {
        let runner = FakeRunner::new([ExecutionStatus::InProgress])
            .failing_start("ResourceNotFoundException: Project cannot be found");
        let event = LifecycleEvent::new(RequestType::Update, properties())
            .with_physical_resource_id("resource-1");

        let response = trigger(&runner, &event).unwrap();

        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.physical_resource_id, "resource-1");
        assert!(response
            .reason
            .unwrap()
            .contains("Project cannot be found"));
    }

    #[test]
    fn missing_project_name_is_rejected_before_any_call() {
        let runner = FakeRunner::new([ExecutionStatus::InProgress]);
        let event = LifecycleEvent::new(RequestType::Create, ResourceProperties::default());

        assert_eq!(
            trigger(&runner, &event),
            Err(EventError::MissingProjectName("Create"))
        );
        assert_eq!(runner.calls(), 0);
    }
}
