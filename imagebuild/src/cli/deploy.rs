use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use clap::Args;
use constcat::concat;
use log::{info, warn};

use crate::{
    adapter::{self, PollSchedule},
    artifact::{self, RepositoryUri},
    aws::{self, AwsCli, ProjectDefinition},
    buildspec::{
        BuildArgValue, BuildJobSpec, BuildJobSpecBuilder, LoginSecret, NetworkPlacement,
        RegistryEncryption, SourceLocator,
    },
    event::{plan_request, LifecycleEvent, Plan, ResourceProperties},
    source, Result,
};

fn seconds(s: &str) -> Result<Duration> {
    Ok(Duration::from_secs(s.parse()?))
}

fn minutes(s: &str) -> Result<Duration> {
    let minutes: u64 = s.parse()?;
    Ok(Duration::from_secs(
        minutes.checked_mul(60).ok_or("value too large")?,
    ))
}

/// Build project names start with a letter or digit and further consist of letters, digits, dashes and underscores.
fn expect_project_name(value: &str) -> Result<String, &'static str> {
    let mut bytes = value.bytes();
    let valid_start = bytes.next().is_some_and(|byte| byte.is_ascii_alphanumeric());
    let valid_rest = bytes.all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_'));
    if !valid_start || !valid_rest {
        return Err("expected a name matching regex /^[A-Za-z0-9][A-Za-z0-9_-]*$/");
    }
    if !(2..=255).contains(&value.len()) {
        return Err("expected between 2 and 255 characters");
    }
    Ok(value.to_string())
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// The build context: a directory containing the Dockerfile.
    pub dir: PathBuf,

    /// The build project to create or update.
    #[arg(long = "project", value_parser = expect_project_name)]
    pub project: String,

    /// The repository to push to. Either a repository name in the account's registry, which is created when missing,
    /// or a full repository uri.
    #[arg(long = "repository")]
    pub repository: String,

    /// The bucket the packaged build context is uploaded to.
    #[arg(long = "bucket")]
    pub bucket: String,

    /// The role the build project runs as.
    #[arg(long = "service-role", value_name = "ARN")]
    pub service_role: String,

    /// A build argument as `KEY=VALUE`, or as `KEY` to take the value from the environment variable `KEY` at deploy
    /// time. May be repeated.
    #[arg(long = "build-arg", value_name = "KEY[=VALUE]", value_parser = BuildArgValue::parse_assignment)]
    pub build_args: Vec<(String, BuildArgValue)>,

    /// A command to run in the install phase. May be repeated.
    #[arg(long = "install", value_name = "COMMAND")]
    pub install: Vec<String>,

    /// A command to run at the start of the pre_build phase. May be repeated.
    #[arg(long = "pre-build", value_name = "COMMAND")]
    pub pre_build: Vec<String>,

    /// Path of the Dockerfile relative to the build context.
    #[arg(long = "dockerfile")]
    pub dockerfile: Option<String>,

    /// A secret with `username` and `password` fields to log in with before building, e.g. to avoid Docker Hub rate
    /// limits.
    #[arg(long = "login-secret", value_name = "ARN")]
    pub login_secret: Option<String>,

    /// The registry to log in to with `--login-secret`. Defaults to Docker Hub.
    #[arg(long = "login-registry", requires = "login_secret")]
    pub login_registry: Option<String>,

    /// Run the build inside this VPC. Requires `--subnet` and `--security-group`.
    #[arg(long = "vpc", requires_all = ["subnets", "security_groups"])]
    pub vpc: Option<String>,

    #[arg(long = "subnet", requires = "vpc")]
    pub subnets: Vec<String>,

    #[arg(long = "security-group", requires = "vpc")]
    pub security_groups: Vec<String>,

    /// Encrypt a newly created repository with this KMS key instead of AES-256.
    #[arg(long = "kms-key", value_name = "ARN")]
    pub kms_key: Option<String>,

    /// Seconds between completion checks.
    #[arg(long = "poll-interval", value_name = "SECONDS", value_parser = seconds, default_value = "30")]
    pub poll_interval: Duration,

    /// Minutes to wait for the build to complete.
    #[arg(long = "timeout", value_name = "MINUTES", value_parser = minutes, default_value = "60")]
    pub timeout: Duration,

    /// Use this image tag instead of a freshly generated one.
    #[arg(long = "image-tag")]
    pub image_tag: Option<String>,

    #[arg(long = "no-force", default_value_t, help = concat!("Skip the build when the project exists and its `", aws::tag::IMAGE_TAG, "` tag already equals `--image-tag`."))]
    pub no_force: bool,

    /// Print the project definition that would be deployed and exit without contacting any service.
    #[arg(long = "dry-run", default_value_t)]
    pub dry_run: bool,
}

impl DeployArgs {
    fn encryption(&self) -> RegistryEncryption {
        match &self.kms_key {
            Some(key) => RegistryEncryption::Kms { key: key.clone() },
            None => RegistryEncryption::Aes256,
        }
    }

    fn spec_builder(&self, source: SourceLocator, repository: RepositoryUri) -> BuildJobSpecBuilder {
        let mut builder = BuildJobSpec::builder(source, repository).encryption(self.encryption());
        for (key, value) in &self.build_args {
            builder = builder.build_arg(key, value.clone());
        }
        for command in &self.install {
            builder = builder.install_command(command);
        }
        for command in &self.pre_build {
            builder = builder.pre_build_command(command);
        }
        if let Some(dockerfile) = &self.dockerfile {
            builder = builder.dockerfile(dockerfile);
        }
        if let Some(secret_id) = &self.login_secret {
            builder = builder.login(LoginSecret {
                secret_id: secret_id.clone(),
                registry: self.login_registry.clone(),
            });
        }
        if let Some(vpc_id) = &self.vpc {
            builder = builder.network(NetworkPlacement {
                vpc_id: vpc_id.clone(),
                subnets: self.subnets.clone(),
                security_groups: self.security_groups.clone(),
            });
        }
        if let Some(tag) = &self.image_tag {
            builder = builder.image_tag(tag);
        }
        builder
    }
}

/// Identifies who deployed, recorded on the build project.
fn deployed_by() -> String {
    let user = whoami::username();
    match whoami::fallible::hostname() {
        Ok(host) => format!("{user}@{host}"),
        Err(error) => {
            warn!("Unable to determine hostname: {error}");
            user
        }
    }
}

pub fn deploy(aws: &AwsCli, args: DeployArgs) -> Result<()> {
    if !args.dir.is_dir() {
        return Err(format!("build context {} is not a directory", args.dir.display()).into());
    }

    let deployed_by = deployed_by();
    let locator = SourceLocator {
        bucket: args.bucket.clone(),
        key: source::object_key(&args.project),
    };
    let full_repository_uri = args.repository.parse::<RepositoryUri>().ok();

    if args.dry_run {
        let repository = full_repository_uri
            .ok_or("--dry-run requires --repository to be a full repository uri")?;
        let spec = args.spec_builder(locator, repository).build()?;
        let definition =
            ProjectDefinition::new(&args.project, &spec, &args.service_role, &deployed_by)?;
        println!("{}", serde_json::to_string_pretty(&definition)?);
        return Ok(());
    }

    let repository_name = match &full_repository_uri {
        Some(uri) => uri.path().to_owned(),
        None => args.repository.clone(),
    };
    let repository = aws.ensure_repository(&repository_name, &args.encryption())?;
    if let Some(expected) = &full_repository_uri {
        if *expected != repository {
            warn!("repository {repository_name:?} resolved to {repository} instead of {expected}");
        }
    }

    let spec = args.spec_builder(locator, repository).build()?;

    let previous = match aws.try_get_project(&args.project)? {
        Some(project) if !args.no_force => Some(project.resource_properties()),
        Some(project) => Some(verify_published(project.resource_properties(), |tag| {
            aws.image_exists(spec.repository().path(), tag)
        })?),
        None => None,
    };
    let next = ResourceProperties {
        project_name: Some(args.project.clone()),
        image_tag: Some(spec.image_tag().to_owned()),
        force: !args.no_force,
    };

    let Some(plan) = plan_request(previous.as_ref(), &next) else {
        info!(
            "project {} is up to date with image tag {}, skipping the build",
            args.project,
            spec.image_tag()
        );
        return print_handles(spec.repository(), spec.image_tag());
    };

    source::upload(aws, &args.dir, spec.source())?;

    let definition = ProjectDefinition::new(&args.project, &spec, &args.service_role, &deployed_by)?;
    let event = match plan {
        Plan::Create => {
            info!("creating build project {}...", args.project);
            aws.create_project(&definition)?;
            LifecycleEvent::new(plan.request_type(), next)
        }
        Plan::Update => {
            info!("updating build project {}...", args.project);
            aws.update_project(&definition)?;
            LifecycleEvent::new(plan.request_type(), next)
                .with_physical_resource_id(&args.project)
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let stop = Arc::clone(&stop);
        move || stop.store(true, Ordering::Relaxed)
    })?;

    info!(
        "waiting for the build of {} to complete, checking every {:?}...",
        spec.image(),
        args.poll_interval
    );
    let response = adapter::run(
        aws,
        aws,
        &event,
        PollSchedule {
            interval: args.poll_interval,
            timeout: args.timeout,
        },
        &stop,
    )?;

    let artifact_tag = response
        .artifact_tag()
        .ok_or("the build completed without reporting an artifact tag")?;
    print_handles(spec.repository(), artifact_tag)
}

/// Forgets the recorded image tag when the registry does not hold that image. A project records its tag before the
/// build runs, so a failed or interrupted build leaves behind a tag that was never pushed.
fn verify_published(
    mut previous: ResourceProperties,
    image_exists: impl FnOnce(&str) -> Result<bool>,
) -> Result<ResourceProperties> {
    if let Some(tag) = &previous.image_tag {
        if !image_exists(tag)? {
            warn!("image tag {tag} was recorded but never published, rebuilding");
            previous.image_tag = None;
        }
    }
    Ok(previous)
}

fn print_handles(repository: &RepositoryUri, artifact_tag: &str) -> Result<()> {
    let handles = artifact::resolve(repository, artifact_tag)?;
    println!("{}", serde_json::to_string_pretty(&handles)?);
    Ok(())
}
