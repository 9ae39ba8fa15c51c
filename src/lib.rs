//! Host side driver for UI automation running inside an isolated scripting runtime.
//!
//! The host and the runtime only share a directory: commands go out as numbered files, results
//! come back as numbered files. See [`client::channel`] for the wire protocol, and
//! [`client::Client`] for the operations built on top of it.

pub mod client;
pub mod config;
pub mod repl;
pub mod scenario;

pub use client::protocol::{CommandResult, Hook};
pub use client::{Client, ClientError};
pub use config::ClientConfig;
