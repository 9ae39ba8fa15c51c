//! Command batching.
//!
//! While a batch is open, issued commands are queued instead of being sent. Closing the batch
//! joins them into one script where every command is followed by a sentinel statement, and the
//! flat result list of that single exchange is cut back into per-command groups at the sentinels.

use std::collections::BTreeMap;

use super::protocol::CommandResult;

pub const SENTINEL_PREFIX: &str = "end batched automation command ";

/// Results of a batch, keyed by the batch-local command number.
///
/// A missing key means no result is available for that command.
pub type BatchResults = BTreeMap<usize, Vec<CommandResult>>;

/// Text the remote side evaluates the sentinel after command `index` to.
pub fn sentinel(index: usize) -> String {
    format!("{}{}", SENTINEL_PREFIX, index)
}

#[derive(Debug, Default)]
pub struct BatchQueue {
    open: bool,
    commands: Vec<String>,
}

impl BatchQueue {
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) {
        self.open = true;
        self.commands.clear();
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Queues a command and hands back a placeholder result for the caller.
    pub fn push(&mut self, command: &str) -> CommandResult {
        self.commands.push(command.to_owned());
        CommandResult::success("command batched successfully")
    }

    /// Closes the batch, returning the queued commands and resetting the numbering.
    pub fn close(&mut self) -> Vec<String> {
        self.open = false;
        std::mem::take(&mut self.commands)
    }
}

/// Builds the single script sent for a batch.
pub fn join_commands(commands: &[String]) -> String {
    commands
        .iter()
        .enumerate()
        .map(|(i, cmd)| format!("{}\n\"{}\";", cmd, sentinel(i)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cuts the flat result stream of a batch into per-command groups.
///
/// A group is closed when a result's text equals the sentinel of the group currently being
/// collected. Results after the last matching sentinel belong to no group and are dropped.
pub fn demultiplex(results: Vec<CommandResult>) -> BatchResults {
    let mut groups = BatchResults::new();
    let mut current = Vec::new();
    let mut expected = sentinel(0);

    for result in results {
        if result.text == expected {
            groups.insert(groups.len(), std::mem::take(&mut current));
            expected = sentinel(groups.len());
        } else {
            current.push(result);
        }
    }

    groups
}
