use serde::de::DeserializeOwned;

use crate::{process, Result};

mod codebuild;
pub use codebuild::*;

mod logs;
pub use logs::*;

mod ecr;
pub use ecr::*;

mod s3;
pub use s3::*;

mod timestamp;

/// Talks to the job runner, log store, registry and object store through the `aws` command line interface.
pub struct AwsCli {
    region: Option<String>,
    profile: Option<String>,
}

impl AwsCli {
    pub fn new(region: Option<String>, profile: Option<String>) -> Self {
        Self { region, profile }
    }

    /// Returns the aws command where the output format, region and profile have already been set.
    fn aws(&self) -> process::Command {
        let mut command = process::command!(
            "aws",
            "--output=json",
            // Never page output, we capture it.
            "--no-cli-pager",
        );
        if let Some(region) = &self.region {
            command = process::args!(command, "--region", region);
        }
        if let Some(profile) = &self.profile {
            command = process::args!(command, "--profile", profile);
        }
        command
    }

    fn json<T: DeserializeOwned>(command: process::Command) -> Result<T> {
        let output = command.output()?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}
