pub mod adapter;
pub mod artifact;
pub mod aws;
pub mod buildspec;
pub mod event;
pub mod poller;
pub(crate) mod process;
pub mod runner;
pub mod shell_quote;
pub(crate) mod source;
pub(crate) mod temp_path;
pub(crate) mod time_ext;
pub mod trigger;
pub(crate) mod version;

#[cfg(test)]
pub(crate) mod testing;

pub mod cli;

pub type Result<T, E = Box<dyn std::error::Error + Send + Sync + 'static>> =
    std::result::Result<T, E>;
