use serde::Deserialize;

use super::{timestamp, AwsCli};
use crate::{
    process,
    runner::{LogEvent, LogLocation, LogStore},
    Result,
};

/// Partially implements [OutputLogEvent](https://docs.aws.amazon.com/AmazonCloudWatchLogs/latest/APIReference/API_OutputLogEvent.html).
#[derive(Debug, Deserialize)]
struct OutputLogEvent {
    /// Milliseconds since the epoch.
    #[serde(default)]
    timestamp: Option<i64>,

    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct GetLogEventsOutput {
    #[serde(default)]
    events: Vec<OutputLogEvent>,
}

impl From<OutputLogEvent> for LogEvent {
    fn from(value: OutputLogEvent) -> Self {
        Self {
            timestamp: value.timestamp.and_then(timestamp::from_millis),
            // Build output lines carry their own newline.
            message: value.message.trim_end_matches(['\r', '\n']).to_owned(),
        }
    }
}

impl AwsCli {
    /// Reads the newest `limit` events of a stream. Events are returned oldest first.
    pub fn get_log_events(&self, location: &LogLocation, limit: usize) -> Result<Vec<LogEvent>> {
        let command = process::args!(
            self.aws(),
            "logs",
            "get-log-events",
            "--log-group-name",
            &location.group,
            "--log-stream-name",
            &location.stream,
            "--limit",
            limit.to_string(),
            // Start from the end of the stream, the events within the page are still in chronological order.
            "--no-start-from-head",
        );
        let output: GetLogEventsOutput = Self::json(command)?;
        Ok(output.events.into_iter().map(LogEvent::from).collect())
    }
}

impl LogStore for AwsCli {
    fn tail(&self, location: &LogLocation, limit: usize) -> Result<Vec<LogEvent>> {
        let mut events = self.get_log_events(location, limit)?;
        if events.len() > limit {
            events.drain(..events.len() - limit);
        }
        Ok(events)
    }
}
