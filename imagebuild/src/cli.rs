mod deploy;
mod executions;
mod handle;

use clap::{Parser, Subcommand};

use crate::{aws::AwsCli, version::VERSION, Result};

#[derive(Debug, Parser)]
#[command(version = VERSION, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// The AWS region of the build project, repository and bucket.
    #[arg(long = "region", global = true, env = "AWS_REGION")]
    region: Option<String>,

    /// The named AWS profile to authenticate with.
    #[arg(long = "profile", global = true, env = "AWS_PROFILE")]
    profile: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Package a directory, build its image remotely and wait for the result
    #[command(arg_required_else_help = true)]
    Deploy(deploy::DeployArgs),

    /// Run a single lifecycle handler on an event read from a file or stdin
    #[command(subcommand)]
    Handle(handle::HandleCommand),

    /// List the most recent executions of a build project
    #[command(arg_required_else_help = true)]
    Executions(executions::ExecutionsArgs),
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let aws = AwsCli::new(self.region, self.profile);

        match self.command {
            Commands::Deploy(args) => {
                deploy::deploy(&aws, args)?;
            }
            Commands::Handle(command) => {
                handle::handle(&aws, command)?;
            }
            Commands::Executions(args) => {
                executions::executions(&aws, args)?;
            }
        }

        Ok(())
    }
}
