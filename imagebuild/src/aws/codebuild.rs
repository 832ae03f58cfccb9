use std::ffi::OsStr;

use serde::{Deserialize, Serialize};

use super::{timestamp, AwsCli};
use crate::{
    buildspec::BuildJobSpec,
    event::ResourceProperties,
    process,
    runner::{ExecutionRecord, ExecutionStatus, JobRunner, LogLocation},
    Result,
};

pub const DEFAULT_BUILD_IMAGE: &str = "aws/codebuild/standard:7.0";
pub const DEFAULT_COMPUTE_TYPE: &str = "BUILD_GENERAL1_SMALL";

/// Keys of the tags recorded on the build project.
pub mod tag {
    pub const IMAGE_TAG: &str = "imagebuild:image-tag";
    pub const DEPLOYED_BY: &str = "imagebuild:deployed-by";
    pub const VERSION: &str = "imagebuild:version";
}

/// Partially implements [Build](https://docs.aws.amazon.com/codebuild/latest/APIReference/API_Build.html).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub id: String,

    pub build_status: ExecutionStatus,

    #[serde(default, with = "timestamp::option")]
    pub start_time: Option<time::OffsetDateTime>,

    #[serde(default, with = "timestamp::option")]
    pub end_time: Option<time::OffsetDateTime>,

    /// Information about the build's logs in CloudWatch Logs.
    #[serde(default)]
    pub logs: Option<BuildLogs>,
}

/// Partially implements [LogsLocation](https://docs.aws.amazon.com/codebuild/latest/APIReference/API_LogsLocation.html).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildLogs {
    #[serde(default)]
    pub group_name: Option<String>,

    #[serde(default)]
    pub stream_name: Option<String>,
}

impl From<Build> for ExecutionRecord {
    fn from(value: Build) -> Self {
        let Build {
            id,
            build_status,
            start_time,
            end_time,
            logs,
        } = value;
        // Both parts are needed to read the logs, a build that has not been scheduled yet has neither.
        let log_location = logs.and_then(|logs| match (logs.group_name, logs.stream_name) {
            (Some(group), Some(stream)) => Some(LogLocation { group, stream }),
            _ => None,
        });
        Self {
            id,
            status: build_status,
            log_location,
            start_time,
            end_time,
        }
    }
}

#[derive(Deserialize)]
struct StartBuildOutput {
    build: Build,
}

#[derive(Deserialize)]
struct ListBuildsOutput {
    #[serde(default)]
    ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetBuildsOutput {
    #[serde(default)]
    builds: Vec<Build>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// Partially implements [Project](https://docs.aws.amazon.com/codebuild/latest/APIReference/API_Project.html).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,

    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Project {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.key == key)
            .map(|tag| tag.value.as_str())
    }

    /// The properties the project was last deployed with.
    pub fn resource_properties(&self) -> ResourceProperties {
        ResourceProperties {
            project_name: Some(self.name.clone()),
            image_tag: self.tag(tag::IMAGE_TAG).map(str::to_owned),
            force: false,
        }
    }
}

#[derive(Deserialize)]
struct BatchGetProjectsOutput {
    #[serde(default)]
    projects: Vec<Project>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSource {
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub location: String,
    pub buildspec: String,
}

#[derive(Debug, Serialize)]
pub struct ProjectArtifacts {
    #[serde(rename = "type")]
    pub r#type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEnvironment {
    #[serde(rename = "type")]
    pub r#type: &'static str,
    pub image: String,
    pub compute_type: String,
    /// Required to run the docker daemon inside the build container.
    pub privileged_mode: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcConfig {
    pub vpc_id: String,
    pub subnets: Vec<String>,
    pub security_group_ids: Vec<String>,
}

/// Input of `create-project` and `update-project`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDefinition {
    pub name: String,
    pub source: ProjectSource,
    pub artifacts: ProjectArtifacts,
    pub environment: ProjectEnvironment,
    pub service_role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_config: Option<VpcConfig>,
    pub tags: Vec<Tag>,
}

impl ProjectDefinition {
    pub fn new(
        name: &str,
        spec: &BuildJobSpec,
        service_role: &str,
        deployed_by: &str,
    ) -> Result<Self> {
        let buildspec = spec.document().to_yaml()?;

        Ok(Self {
            name: name.to_owned(),
            source: ProjectSource {
                r#type: "S3",
                location: spec.source().to_string(),
                buildspec,
            },
            artifacts: ProjectArtifacts {
                r#type: "NO_ARTIFACTS",
            },
            environment: ProjectEnvironment {
                r#type: "LINUX_CONTAINER",
                image: DEFAULT_BUILD_IMAGE.to_owned(),
                compute_type: DEFAULT_COMPUTE_TYPE.to_owned(),
                privileged_mode: true,
            },
            service_role: service_role.to_owned(),
            vpc_config: spec.network().map(|network| VpcConfig {
                vpc_id: network.vpc_id.clone(),
                subnets: network.subnets.clone(),
                security_group_ids: network.security_groups.clone(),
            }),
            tags: [
                (tag::IMAGE_TAG, spec.image_tag()),
                (tag::DEPLOYED_BY, deployed_by),
                (tag::VERSION, crate::version::VERSION),
            ]
            .into_iter()
            .map(|(key, value)| Tag {
                key: key.to_owned(),
                value: value.to_owned(),
            })
            .collect(),
        })
    }
}

impl AwsCli {
    pub fn start_build(&self, project_name: &str) -> Result<Build> {
        let command = process::args!(
            self.aws(),
            "codebuild",
            "start-build",
            "--project-name",
            project_name
        );
        Ok(Self::json::<StartBuildOutput>(command)?.build)
    }

    /// Returns build ids, newest first.
    pub fn list_builds_for_project(&self, project_name: &str, limit: usize) -> Result<Vec<String>> {
        let command = process::args!(
            self.aws(),
            "codebuild",
            "list-builds-for-project",
            "--project-name",
            project_name,
            "--sort-order",
            "DESCENDING",
            "--max-items",
            limit.to_string(),
        );
        Ok(Self::json::<ListBuildsOutput>(command)?.ids)
    }

    pub fn batch_get_builds(&self, ids: &[String]) -> Result<Vec<Build>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let command = process::args!(self.aws(), "codebuild", "batch-get-builds", "--ids")
            .args(ids.iter().map(OsStr::new));
        Ok(Self::json::<BatchGetBuildsOutput>(command)?.builds)
    }

    /// Returns `None` if the project does not exist.
    pub fn try_get_project(&self, name: &str) -> Result<Option<Project>> {
        let command = process::args!(
            self.aws(),
            "codebuild",
            "batch-get-projects",
            "--names",
            name
        );
        // Unknown names are reported in `projectsNotFound` rather than as an error.
        let output: BatchGetProjectsOutput = Self::json(command)?;
        Ok(output.projects.into_iter().find(|project| project.name == name))
    }

    pub fn create_project(&self, definition: &ProjectDefinition) -> Result<()> {
        process::args!(
            self.aws(),
            "codebuild",
            "create-project",
            "--cli-input-json",
            serde_json::to_string(definition)?,
        )
        .output()?;
        Ok(())
    }

    pub fn update_project(&self, definition: &ProjectDefinition) -> Result<()> {
        process::args!(
            self.aws(),
            "codebuild",
            "update-project",
            "--cli-input-json",
            serde_json::to_string(definition)?,
        )
        .output()?;
        Ok(())
    }
}

impl JobRunner for AwsCli {
    fn start_execution(&self, job_id: &str) -> Result<String> {
        Ok(self.start_build(job_id)?.id)
    }

    fn latest_execution_id(&self, job_id: &str) -> Result<Option<String>> {
        Ok(self.list_builds_for_project(job_id, 1)?.into_iter().next())
    }

    fn execution(&self, execution_id: &str) -> Result<ExecutionRecord> {
        let build = self
            .batch_get_builds(&[execution_id.to_owned()])?
            .into_iter()
            .next()
            .ok_or_else(|| format!("build {execution_id:?} not found"))?;
        Ok(build.into())
    }

    fn recent_executions(&self, job_id: &str, limit: usize) -> Result<Vec<ExecutionRecord>> {
        let ids = self.list_builds_for_project(job_id, limit)?;
        let mut builds = self.batch_get_builds(&ids)?;
        // The batch call does not promise to preserve the order of the ids.
        builds.sort_by_key(|build| ids.iter().position(|id| *id == build.id));
        Ok(builds.into_iter().map(ExecutionRecord::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildspec::{BuildArgValue, NetworkPlacement, SourceLocator};

    #[test]
    fn build_deserializes_into_execution_record() {
        let output: BatchGetBuildsOutput = serde_json::from_str(
            r#"{
                "builds": [
                    {
                        "id": "my-project:0b3c",
                        "arn": "arn:aws:codebuild:eu-west-1:123456789012:build/my-project:0b3c",
                        "buildNumber": 7,
                        "startTime": "2024-05-01T10:20:30.500000+00:00",
                        "endTime": "2024-05-01T10:25:00+00:00",
                        "currentPhase": "COMPLETED",
                        "buildStatus": "FAILED",
                        "logs": {
                            "groupName": "/aws/codebuild/my-project",
                            "streamName": "0b3c",
                            "deepLink": "https://console.aws.amazon.com/cloudwatch/home"
                        }
                    }
                ],
                "buildsNotFound": []
            }"#,
        )
        .unwrap();
        let record: ExecutionRecord = output.builds.into_iter().next().unwrap().into();
        assert_eq!(record.id, "my-project:0b3c");
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(
            record.log_location,
            Some(LogLocation {
                group: "/aws/codebuild/my-project".to_owned(),
                stream: "0b3c".to_owned(),
            })
        );
        assert!(record.start_time < record.end_time);
    }

    #[test]
    fn queued_build_has_no_log_location() {
        let build: Build = serde_json::from_str(
            r#"{ "id": "p:1", "buildStatus": "IN_PROGRESS", "logs": { "deepLink": "x" } }"#,
        )
        .unwrap();
        let record = ExecutionRecord::from(build);
        assert_eq!(record.status, ExecutionStatus::InProgress);
        assert_eq!(record.log_location, None);
        assert_eq!(record.start_time, None);
    }

    #[test]
    fn project_reports_previous_properties() {
        let output: BatchGetProjectsOutput = serde_json::from_str(
            r#"{
                "projects": [
                    {
                        "name": "my-project",
                        "tags": [
                            { "key": "imagebuild:image-tag", "value": "abc" },
                            { "key": "team", "value": "infra" }
                        ]
                    }
                ],
                "projectsNotFound": []
            }"#,
        )
        .unwrap();
        let properties = output.projects[0].resource_properties();
        assert_eq!(properties.project_name.as_deref(), Some("my-project"));
        assert_eq!(properties.image_tag.as_deref(), Some("abc"));
        assert!(!properties.force);
    }

    #[test]
    fn project_definition_carries_buildspec_network_and_tag() {
        let spec = BuildJobSpec::builder(
            SourceLocator {
                bucket: "sources".to_owned(),
                key: "my-project/abc.zip".to_owned(),
            },
            "123456789012.dkr.ecr.eu-west-1.amazonaws.com/my-image"
                .parse()
                .unwrap(),
        )
        .build_arg("ENV", BuildArgValue::Literal("test".to_owned()))
        .network(NetworkPlacement {
            vpc_id: "vpc-1".to_owned(),
            subnets: vec!["subnet-1".to_owned(), "subnet-2".to_owned()],
            security_groups: vec!["sg-1".to_owned()],
        })
        .build_with(|_| None)
        .unwrap();

        let definition =
            ProjectDefinition::new("my-project", &spec, "arn:aws:iam::1:role/build", "me@host")
                .unwrap();
        let json = serde_json::to_value(&definition).unwrap();

        assert_eq!(json["source"]["type"], "S3");
        assert_eq!(json["source"]["location"], "sources/my-project/abc.zip");
        assert!(json["source"]["buildspec"]
            .as_str()
            .unwrap()
            .contains("--build-arg ENV=test"));
        assert_eq!(json["environment"]["privilegedMode"], true);
        assert_eq!(json["vpcConfig"]["securityGroupIds"][0], "sg-1");
        assert!(definition
            .tags
            .contains(&Tag {
                key: tag::IMAGE_TAG.to_owned(),
                value: spec.image_tag().to_owned(),
            }));
    }
}
