//! Assembly of the build job: which source to build, with which arguments, and the phased shell commands the job
//! runner executes to build and push the image.

use std::{collections::BTreeMap, fmt};

use log::debug;
use serde::Serialize;

use crate::{
    artifact::{self, ImageReference, InvalidReference, RepositoryUri},
    shell_quote,
};

pub const BUILDSPEC_VERSION: &str = "0.2";

/// Location of the packaged source in object storage, written as `<bucket>/<key>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocator {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Network placement for the build container. Passed through to the job runner untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPlacement {
    pub vpc_id: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
}

/// Encryption of the target repository. Only affects how the repository is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RegistryEncryption {
    #[default]
    Aes256,
    Kms {
        key: String,
    },
}

/// A build argument value. Values read from the environment are only looked up when the spec is built, so they
/// can be supplied by whatever runs the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildArgValue {
    Literal(String),
    FromEnv(String),
}

impl BuildArgValue {
    /// Parses `KEY=VALUE` into a literal and a bare `KEY` into a value taken from the environment variable `KEY`,
    /// mirroring `docker build --build-arg`.
    pub fn parse_assignment(input: &str) -> Result<(String, Self), BuildSpecError> {
        let (key, value) = match input.split_once('=') {
            Some((key, value)) => (key, BuildArgValue::Literal(value.to_owned())),
            None => (input, BuildArgValue::FromEnv(input.to_owned())),
        };
        validate_build_arg_key(key)?;
        Ok((key.to_owned(), value))
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildSpecError {
    #[error("invalid build argument name {0:?}")]
    InvalidBuildArgKey(String),

    #[error("build argument {key:?} should be read from environment variable {var:?} but it is not set")]
    UnresolvedBuildArg { key: String, var: String },

    #[error(transparent)]
    InvalidReference(#[from] InvalidReference),

    #[error("expected `--build-arg KEY=VALUE` pairs but found {0:?}")]
    MalformedFlags(String),

    #[error(transparent)]
    Quoting(#[from] shell_quote::UnterminatedQuote),
}

fn validate_build_arg_key(key: &str) -> Result<(), BuildSpecError> {
    let valid = !key.is_empty()
        && key
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'_');
    if valid {
        Ok(())
    } else {
        Err(BuildSpecError::InvalidBuildArgKey(key.to_owned()))
    }
}

/// Reads the username and password from a secret and logs in to Docker Hub (or any other registry that the secret
/// is meant for) before pulling base images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSecret {
    pub secret_id: String,
    pub registry: Option<String>,
}

impl LoginSecret {
    fn commands(&self) -> Vec<String> {
        let read = |field: &str| {
            format!(
                "aws secretsmanager get-secret-value --secret-id {secret} --query SecretString --output text | jq -r .{field}",
                secret = shell_quote::quote(&self.secret_id),
            )
        };
        let mut login = format!(
            "{password} | docker login --username \"$({username})\" --password-stdin",
            password = read("password"),
            username = read("username"),
        );
        if let Some(registry) = &self.registry {
            login.push(' ');
            login.push_str(&shell_quote::quote(registry));
        }
        vec![login]
    }
}

/// Everything needed to define one build job. Immutable once built; the image tag is fixed at this point and shared
/// by the build phase and the completion poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildJobSpec {
    source: SourceLocator,
    repository: RepositoryUri,
    build_args: BTreeMap<String, String>,
    install_commands: Vec<String>,
    pre_build_commands: Vec<String>,
    login: Option<LoginSecret>,
    dockerfile: Option<String>,
    image_tag: String,
    network: Option<NetworkPlacement>,
    encryption: RegistryEncryption,
}

pub struct BuildJobSpecBuilder {
    source: SourceLocator,
    repository: RepositoryUri,
    build_args: BTreeMap<String, BuildArgValue>,
    install_commands: Vec<String>,
    pre_build_commands: Vec<String>,
    login: Option<LoginSecret>,
    dockerfile: Option<String>,
    image_tag: Option<String>,
    network: Option<NetworkPlacement>,
    encryption: RegistryEncryption,
}

impl BuildJobSpec {
    pub fn builder(source: SourceLocator, repository: RepositoryUri) -> BuildJobSpecBuilder {
        BuildJobSpecBuilder {
            source,
            repository,
            build_args: BTreeMap::new(),
            install_commands: Vec::new(),
            pre_build_commands: Vec::new(),
            login: None,
            dockerfile: None,
            image_tag: None,
            network: None,
            encryption: RegistryEncryption::default(),
        }
    }

    pub fn source(&self) -> &SourceLocator {
        &self.source
    }

    pub fn repository(&self) -> &RepositoryUri {
        &self.repository
    }

    pub fn build_args(&self) -> &BTreeMap<String, String> {
        &self.build_args
    }

    pub fn image_tag(&self) -> &str {
        &self.image_tag
    }

    pub fn network(&self) -> Option<&NetworkPlacement> {
        self.network.as_ref()
    }

    pub fn encryption(&self) -> &RegistryEncryption {
        &self.encryption
    }

    pub fn image(&self) -> ImageReference {
        ImageReference::from_parts(self.repository.clone(), self.image_tag.clone())
    }

    /// Renders one `--build-arg KEY=VALUE` pair per build argument, quoted for `sh`.
    pub fn build_arg_flags(&self) -> String {
        build_arg_flags(&self.build_args)
    }

    pub fn document(&self) -> BuildSpecDocument {
        let image = self.image().to_string();

        let mut pre_build = self.pre_build_commands.clone();
        if let Some(login) = &self.login {
            pre_build.extend(login.commands());
        }
        pre_build.push(format!(
            "aws ecr get-login-password --region \"$AWS_DEFAULT_REGION\" | docker login --username AWS --password-stdin {registry}",
            registry = shell_quote::quote(self.repository.registry()),
        ));

        let mut build = shell_quote::quote_join(["docker", "build", "--tag", image.as_str()]);
        if let Some(dockerfile) = &self.dockerfile {
            build.push(' ');
            build.push_str(&shell_quote::quote_join(["--file", dockerfile.as_str()]));
        }
        let flags = self.build_arg_flags();
        if !flags.is_empty() {
            build.push(' ');
            build.push_str(&flags);
        }
        build.push_str(" .");

        BuildSpecDocument {
            version: BUILDSPEC_VERSION,
            phases: Phases {
                install: (!self.install_commands.is_empty()).then(|| Phase {
                    commands: self.install_commands.clone(),
                }),
                pre_build: Phase { commands: pre_build },
                build: Phase {
                    commands: vec![build],
                },
                post_build: Phase {
                    commands: vec![shell_quote::quote_join(["docker", "push", image.as_str()])],
                },
            },
        }
    }
}

impl BuildJobSpecBuilder {
    pub fn build_arg(mut self, key: impl Into<String>, value: BuildArgValue) -> Self {
        self.build_args.insert(key.into(), value);
        self
    }

    pub fn install_command(mut self, command: impl Into<String>) -> Self {
        self.install_commands.push(command.into());
        self
    }

    pub fn pre_build_command(mut self, command: impl Into<String>) -> Self {
        self.pre_build_commands.push(command.into());
        self
    }

    pub fn login(mut self, login: LoginSecret) -> Self {
        self.login = Some(login);
        self
    }

    pub fn dockerfile(mut self, dockerfile: impl Into<String>) -> Self {
        self.dockerfile = Some(dockerfile.into());
        self
    }

    /// Uses the provided tag instead of generating a fresh one.
    pub fn image_tag(mut self, tag: impl Into<String>) -> Self {
        self.image_tag = Some(tag.into());
        self
    }

    pub fn network(mut self, network: NetworkPlacement) -> Self {
        self.network = Some(network);
        self
    }

    pub fn encryption(mut self, encryption: RegistryEncryption) -> Self {
        self.encryption = encryption;
        self
    }

    /// Resolves build arguments through `lookup` and fixes the image tag.
    pub fn build_with(
        self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<BuildJobSpec, BuildSpecError> {
        let build_args = self
            .build_args
            .into_iter()
            .map(|(key, value)| {
                validate_build_arg_key(&key)?;
                let value = match value {
                    BuildArgValue::Literal(value) => value,
                    BuildArgValue::FromEnv(var) => match lookup(&var) {
                        Some(value) => value,
                        None => return Err(BuildSpecError::UnresolvedBuildArg { key, var }),
                    },
                };
                Ok((key, value))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let image_tag = match self.image_tag {
            Some(tag) => {
                if !artifact::is_valid_tag(&tag) {
                    return Err(InvalidReference::Tag(tag).into());
                }
                tag
            }
            None => generate_image_tag(),
        };
        debug!("image tag: {image_tag}");

        Ok(BuildJobSpec {
            source: self.source,
            repository: self.repository,
            build_args,
            install_commands: self.install_commands,
            pre_build_commands: self.pre_build_commands,
            login: self.login,
            dockerfile: self.dockerfile,
            image_tag,
            network: self.network,
            encryption: self.encryption,
        })
    }

    /// Resolves build arguments from the environment of the current process.
    pub fn build(self) -> Result<BuildJobSpec, BuildSpecError> {
        self.build_with(|var| std::env::var(var).ok())
    }
}

/// Returns a new random tag. Distinguishes this build's output from every other build pushed to the same repository.
pub fn generate_image_tag() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn build_arg_flags(build_args: &BTreeMap<String, String>) -> String {
    let pairs = build_args
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>();
    shell_quote::quote_join(
        pairs
            .iter()
            .flat_map(|pair| ["--build-arg", pair.as_str()]),
    )
}

/// Inverse of [`build_arg_flags`].
pub fn parse_build_arg_flags(flags: &str) -> Result<BTreeMap<String, String>, BuildSpecError> {
    let args = shell_quote::split(flags)?;
    let mut map = BTreeMap::new();
    for pair in args.chunks(2) {
        let [flag, assignment] = pair else {
            return Err(BuildSpecError::MalformedFlags(flags.to_owned()));
        };
        if flag != "--build-arg" {
            return Err(BuildSpecError::MalformedFlags(flags.to_owned()));
        }
        let Some((key, value)) = assignment.split_once('=') else {
            return Err(BuildSpecError::MalformedFlags(flags.to_owned()));
        };
        map.insert(key.to_owned(), value.to_owned());
    }
    Ok(map)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Phase {
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Phases {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install: Option<Phase>,
    pub pre_build: Phase,
    pub build: Phase,
    pub post_build: Phase,
}

/// The phase document the job runner executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSpecDocument {
    pub version: &'static str,
    pub phases: Phases,
}

impl BuildSpecDocument {
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
