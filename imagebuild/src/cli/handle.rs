use std::{
    fs, io,
    path::{Path, PathBuf},
};

use clap::{Args, Subcommand};

use crate::{aws::AwsCli, event::LifecycleEvent, poller, trigger, Result};

#[derive(Debug, Subcommand)]
pub enum HandleCommand {
    /// Start an execution for a create or update event and print the trigger response
    Trigger(EventArgs),

    /// Check the latest execution for an event and print the poll response
    Poll(EventArgs),
}

#[derive(Debug, Args)]
pub struct EventArgs {
    /// Read the lifecycle event from this file instead of stdin.
    #[arg(long = "event", value_name = "FILE")]
    event: Option<PathBuf>,
}

fn read_event(path: Option<&Path>) -> Result<LifecycleEvent> {
    let input = match path {
        Some(path) => fs::read_to_string(path)
            .map_err(|error| format!("failed to read {}: {error}", path.display()))?,
        None => io::read_to_string(io::stdin())?,
    };
    Ok(serde_json::from_str(&input)?)
}

pub fn handle(aws: &AwsCli, command: HandleCommand) -> Result<()> {
    let output = match command {
        HandleCommand::Trigger(args) => {
            let event = read_event(args.event.as_deref())?;
            serde_json::to_string_pretty(&trigger::trigger(aws, &event)?)?
        }
        HandleCommand::Poll(args) => {
            let event = read_event(args.event.as_deref())?;
            serde_json::to_string_pretty(&poller::poll(aws, aws, &event)?)?
        }
    };
    println!("{output}");
    Ok(())
}
