//! Lifecycle events delivered by the orchestration layer and the responses the handlers return.
//!
//! The JSON shapes follow the custom resource protocol: PascalCase envelope fields and a `Data`
//! object whose keys are referenced by downstream consumers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Create => "Create",
            RequestType::Update => "Update",
            RequestType::Delete => "Delete",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceProperties {
    /// The build project (job definition) to start and inspect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    /// The tag baked into the build phase of the project. Reported back once the build succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,

    /// Requests a rebuild even if nothing else changed.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    pub request_type: RequestType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,

    #[serde(default)]
    pub resource_properties: ResourceProperties,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventError {
    #[error("missing `ProjectName` in the resource properties of the {0} event")]
    MissingProjectName(&'static str),

    #[error("missing `ImageTag` in the resource properties of the {0} event")]
    MissingImageTag(&'static str),
}

impl LifecycleEvent {
    pub fn new(request_type: RequestType, properties: ResourceProperties) -> Self {
        Self {
            request_type,
            physical_resource_id: None,
            resource_properties: properties,
        }
    }

    pub fn with_physical_resource_id(mut self, id: impl Into<String>) -> Self {
        self.physical_resource_id = Some(id.into());
        self
    }

    pub fn project_name(&self) -> Result<&str, EventError> {
        self.resource_properties
            .project_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or(EventError::MissingProjectName(self.request_type.as_str()))
    }

    pub fn image_tag(&self) -> Result<&str, EventError> {
        self.resource_properties
            .image_tag
            .as_deref()
            .filter(|tag| !tag.is_empty())
            .ok_or(EventError::MissingImageTag(self.request_type.as_str()))
    }

    /// The identifier to report for this resource. Stable across updates; derived from the project on create.
    pub fn resource_id(&self) -> Result<String, EventError> {
        match &self.physical_resource_id {
            Some(id) => Ok(id.clone()),
            None => self.project_name().map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TriggerResponse {
    pub physical_resource_id: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl TriggerResponse {
    pub fn success(physical_resource_id: String) -> Self {
        Self {
            physical_resource_id,
            status: ResponseStatus::Success,
            reason: None,
            data: BTreeMap::new(),
        }
    }

    pub fn failed(physical_resource_id: String, reason: String) -> Self {
        Self {
            physical_resource_id,
            status: ResponseStatus::Failed,
            reason: Some(reason),
            data: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionData {
    #[serde(rename = "artifactTag")]
    pub artifact_tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PollResponse {
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CompletionData>,
}

impl PollResponse {
    pub fn pending() -> Self {
        Self {
            is_complete: false,
            data: None,
        }
    }

    pub fn complete() -> Self {
        Self {
            is_complete: true,
            data: None,
        }
    }

    pub fn succeeded(artifact_tag: impl Into<String>) -> Self {
        Self {
            is_complete: true,
            data: Some(CompletionData {
                artifact_tag: artifact_tag.into(),
            }),
        }
    }

    pub fn artifact_tag(&self) -> Option<&str> {
        self.data.as_ref().map(|data| data.artifact_tag.as_str())
    }
}

/// The lifecycle event a deployment emits. Deployments never delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Create,
    Update,
}

impl Plan {
    pub fn request_type(self) -> RequestType {
        match self {
            Plan::Create => RequestType::Create,
            Plan::Update => RequestType::Update,
        }
    }
}

/// Decides which lifecycle event, if any, a deployment should emit. `previous` holds the properties recorded by the
/// last deployment of the same resource. Returns `None` when nothing changed and no rebuild was forced.
pub fn plan_request(previous: Option<&ResourceProperties>, next: &ResourceProperties) -> Option<Plan> {
    match previous {
        None => Some(Plan::Create),
        Some(previous) => {
            let changed = previous.project_name != next.project_name
                || previous.image_tag != next.image_tag;
            (changed || next.force).then_some(Plan::Update)
        }
    }
}
