//! File based request/response channel to the remote automation runtime.
//!
//! Every exchange gets the next index `N`. The command text is written to `<dir>/N-cmd.txt`,
//! then the channel polls for `<dir>/N-resp.txt` until it shows up or the response budget is
//! spent. The index is the only correlation key between both files, so exchanges on one channel
//! are strictly sequential. Files are never deleted and stay around for post-mortem inspection.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, warn};

use super::clock::{poll_until, Clock};
use super::protocol::{parse_response, CommandResult};

pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("cannot issue an empty command")]
    EmptyCommand,

    #[error("could not write command file '{}': {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("did not get response for exchange {index} within {waited:?}")]
    Timeout { index: u64, waited: Duration },

    #[error("could not parse response for exchange {index}: {reason}")]
    Malformed { index: u64, reason: String },
}

/// Outcome of one look at the response file.
enum Probe {
    Missing,
    Broken(String),
    Ready(Vec<CommandResult>),
}

pub struct FileChannel<C: Clock> {
    dir: PathBuf,
    next_index: u64,
    timeout: Duration,
    interval: Duration,
    clock: C,
}

impl<C: Clock> FileChannel<C> {
    pub fn new(dir: impl Into<PathBuf>, clock: C) -> Self {
        Self {
            dir: dir.into(),
            next_index: 0,
            timeout: DEFAULT_RESPONSE_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
            clock,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Index the next exchange will use.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Moves the channel to a new directory and starts its sequence over.
    ///
    /// Used when a fresh remote runtime is started: the files of earlier exchanges stay where
    /// they were and can never be mistaken for answers to the new session.
    pub fn relocate(&mut self, dir: impl Into<PathBuf>) {
        self.dir = dir.into();
        self.next_index = 0;
    }

    pub fn command_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{}-cmd.txt", index))
    }

    pub fn response_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{}-resp.txt", index))
    }

    /// Runs one exchange and reports every transport fault as data.
    ///
    /// Never fails: faults become a single failure result carrying the error text.
    pub fn issue(&mut self, command: &str) -> Vec<CommandResult> {
        self.exchange(command)
            .unwrap_or_else(|e| vec![CommandResult::failure(e.to_string())])
    }

    /// Runs one exchange with the channel's response budget.
    pub fn exchange(&mut self, command: &str) -> Result<Vec<CommandResult>, ChannelError> {
        self.exchange_within(command, self.timeout)
    }

    /// Runs one exchange, waiting at most `budget` for the response file.
    pub fn exchange_within(
        &mut self,
        command: &str,
        budget: Duration,
    ) -> Result<Vec<CommandResult>, ChannelError> {
        if command.is_empty() {
            return Err(ChannelError::EmptyCommand);
        }

        let index = self.next_index;
        self.write_command(index, command).map_err(|e| {
            error!("exchange {}: {}", index, e);
            e
        })?;
        // the index is consumed only once the command is really on disk
        self.next_index += 1;
        debug!("exchange {}: command written ({} bytes)", index, command.len());

        let response = self.response_path(index);
        let mut last_fault: Option<String> = None;
        let outcome = poll_until(&self.clock, budget, self.interval, || {
            match probe_response(&response) {
                Probe::Missing => None,
                Probe::Ready(results) => Some(results),
                Probe::Broken(reason) => {
                    if last_fault.as_deref() != Some(reason.as_str()) {
                        warn!("exchange {}: response not readable yet: {}", index, reason);
                    }
                    last_fault = Some(reason);
                    None
                }
            }
        });

        match (outcome, last_fault) {
            (Some(results), _) => {
                debug!("exchange {}: got {} result(s)", index, results.len());
                Ok(results)
            }
            (None, Some(reason)) => {
                error!("exchange {}: giving up on malformed response", index);
                Err(ChannelError::Malformed { index, reason })
            }
            (None, None) => {
                error!("exchange {}: no response within {:?}", index, budget);
                Err(ChannelError::Timeout {
                    index,
                    waited: budget,
                })
            }
        }
    }

    fn write_command(&self, index: u64, command: &str) -> Result<(), ChannelError> {
        let path = self.command_path(index);
        // the remote loop must never see a partial command, so move it into place in one step
        let staging = self.dir.join(format!(".{}-cmd.txt.tmp", index));
        fs::write(&staging, command)
            .and_then(|_| fs::rename(&staging, &path))
            .map_err(|source| ChannelError::Write { path, source })
    }
}

fn probe_response(path: &Path) -> Probe {
    match fs::read_to_string(path) {
        Ok(content) => match parse_response(&content) {
            Ok(results) => Probe::Ready(results),
            Err(reason) => Probe::Broken(reason),
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Probe::Missing,
        Err(e) => Probe::Broken(e.to_string()),
    }
}
