pub mod bridge;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fanout;
pub mod io;
pub mod monitor;
pub mod orchestrator;
pub mod paths;
pub mod queue;
pub mod session;
pub mod specialist;
pub mod storage;
pub mod trigger;
pub mod types;

#[cfg(test)]
pub(crate) mod testkit;

pub use error::{ConsilienceError, Result};
pub use orchestrator::{Collaborators, Orchestrator};
