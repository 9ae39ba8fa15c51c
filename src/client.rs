use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info, warn};

pub mod batch;
pub mod channel;
pub mod clock;
pub mod protocol;
pub mod supervisor;
#[cfg(test)]
pub(crate) mod test_support;

use batch::{demultiplex, join_commands, BatchQueue, BatchResults};
use channel::{ChannelError, FileChannel};
use clock::{Clock, SystemClock};
use protocol::{CommandResult, Hook};
use supervisor::{fresh_workspace, BuildHooks, LaunchError, NoHooks, RuntimeState, Supervisor};

use crate::config::ClientConfig;

/// Remote-side placeholder for "no such element".
const NIL_ELEMENT: &str = "[object UIAElementNil]";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("remote command failed with code {code}: {text}")]
    Remote { code: i32, text: String },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("automation runtime is not running")]
    NotRunning,

    #[error("a batch is already open")]
    NestedBatch,
}

impl ClientError {
    /// Fatal errors leave no live runtime behind: the rest of the run cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Launch(_))
    }
}

/// Automation client driving a UI inside the remote automation runtime.
///
/// The client owns the [`FileChannel`] bound to the current workspace directory and the
/// [`Supervisor`] of the runtime processes. Every runtime session gets its own workspace. UI operations are plain command builders over a
/// [`Hook`]; each one issues exactly one command, or queues it while a batch is open.
pub struct Client<C: Clock = SystemClock> {
    channel: FileChannel<C>,
    supervisor: Supervisor,
    batch: BatchQueue,
}

impl Client<SystemClock> {
    /// Creates the client and starts the remote runtime.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        Self::with_hooks(config, Box::new(NoHooks), SystemClock)
    }
}

impl<C: Clock> Client<C> {
    pub fn with_hooks(
        config: ClientConfig,
        hooks: Box<dyn BuildHooks>,
        clock: C,
    ) -> Result<Self, ClientError> {
        let mut client = Self::unstarted(config, hooks, clock);
        client.start()?;
        Ok(client)
    }

    /// Creates the client without starting anything.
    pub fn unstarted(config: ClientConfig, hooks: Box<dyn BuildHooks>, clock: C) -> Self {
        let workspace = fresh_workspace(&config);
        let channel = FileChannel::new(workspace, clock)
            .with_timeout(config.timing.response_timeout())
            .with_poll_interval(config.timing.poll_interval());

        Self {
            channel,
            supervisor: Supervisor::new(config, hooks),
            batch: BatchQueue::default(),
        }
    }

    pub fn workspace(&self) -> &Path {
        self.channel.dir()
    }

    pub fn start(&mut self) -> Result<(), ClientError> {
        self.supervisor.start(&mut self.channel).map_err(|e| {
            error!("automation runtime failed to start: {}", e);
            ClientError::from(e)
        })
    }

    /// Stops the runtime; `false` means it had to be killed.
    pub fn shutdown(&mut self) -> bool {
        self.supervisor.stop(&mut self.channel)
    }

    pub fn is_running(&mut self) -> bool {
        self.supervisor.is_running()
    }

    pub fn state(&mut self) -> RuntimeState {
        self.supervisor.state()
    }

    pub fn is_batching(&self) -> bool {
        self.batch.is_open()
    }

    /// Issues a raw command, or queues it if a batch is open.
    pub fn issue(&mut self, command: &str) -> Vec<CommandResult> {
        if self.batch.is_open() {
            return vec![self.batch.push(command)];
        }

        if !self.supervisor.is_running() {
            warn!("dropping command, {}", ClientError::NotRunning);
            return vec![CommandResult::failure(ClientError::NotRunning.to_string())];
        }

        self.channel.issue(command)
    }

    fn issue_one(&mut self, command: &str) -> CommandResult {
        self.issue(command)
            .into_iter()
            .next()
            .unwrap_or_else(|| CommandResult::failure("remote runtime returned no result"))
    }

    /// Runs `producers` in order with batching on, then sends everything they issued as a
    /// single exchange.
    ///
    /// The returned map is keyed by the position of each command in the batch. A command whose
    /// sentinel never came back has no entry at all. A transport failure fails the batch as a
    /// whole.
    pub fn run_batch(
        &mut self,
        producers: &[&dyn Fn(&mut Self)],
    ) -> Result<BatchResults, ClientError> {
        if self.batch.is_open() {
            return Err(ClientError::NestedBatch);
        }

        self.batch.open();
        for produce in producers {
            produce(self);
        }
        let commands = self.batch.close();

        if commands.is_empty() {
            debug!("empty batch, nothing to send");
            return Ok(BatchResults::new());
        }
        if !self.supervisor.is_running() {
            return Err(ClientError::NotRunning);
        }

        info!("sending batch of {} command(s)", commands.len());
        let results = self.channel.exchange(&join_commands(&commands))?;
        let groups = demultiplex(results);
        if groups.len() < commands.len() {
            warn!(
                "batch of {} command(s) came back with {} result group(s)",
                commands.len(),
                groups.len()
            );
        }
        Ok(groups)
    }

    /// Evaluates the hook itself, returning its string form.
    pub fn get(&mut self, hook: &Hook) -> Option<String> {
        text_of(self.issue_one(&format!("{};", hook)))
    }

    pub fn get_value(&mut self, hook: &Hook) -> Option<String> {
        text_of(self.issue_one(&format!("{}.value();", hook)))
    }

    pub fn get_name(&mut self, hook: &Hook) -> Option<String> {
        text_of(self.issue_one(&format!("{}.name();", hook)))
    }

    /// Flattens the names of an element array into `[a, b, c]`.
    pub fn get_element_array_contents(&mut self, hook: &Hook) -> Option<String> {
        let script = format!(
            "var items={};var output = \"[\";\
             for (var i = 0; i < items.length; i++)\
             {{if (i != 0) {{ output = output + \", \"; }}output=output+items[i].name();}}\
             output + \"]\";",
            hook
        );
        text_of(self.issue_one(&script))
    }

    pub fn tap(&mut self, hook: &Hook) -> bool {
        self.issue_one(&format!("{}.tap();", hook)).is_success()
    }

    pub fn scroll_to(&mut self, hook: &Hook) -> bool {
        self.issue_one(&format!("{}.scrollToVisible();", hook))
            .is_success()
    }

    pub fn set_value(&mut self, hook: &Hook, value: &str) -> bool {
        self.issue_one(&format!("{}.setValue(\"{}\");", hook, escape(value)))
            .is_success()
    }

    /// Pauses inside the remote runtime.
    pub fn delay(&mut self, seconds: f64) -> bool {
        self.issue_one(&format!("delay({});", seconds)).is_success()
    }

    /// Waits until the hook resolves to a real element.
    ///
    /// The wait loop runs inside the remote runtime with its own `max_wait`, independent of the
    /// channel's response budget.
    pub fn wait_for_not_null(
        &mut self,
        hook: &Hook,
        max_wait: Duration,
    ) -> Result<bool, ClientError> {
        let script = format!(
            "var result = false; var startTime = new Date().getTime(); \
             while(new Date().getTime() - startTime < {}) {{ try {{ var e = {}; \
             if (e != null && e.toString() != \"{}\") {{ result = true; startTime = 0; }} }} \
             catch(err) {{ }} }} result;",
            max_wait.as_millis(),
            hook,
            NIL_ELEMENT
        );
        truth_of(self.issue_one(&script))
    }

    pub fn check_if_null(&mut self, hook: &Hook) -> Result<bool, ClientError> {
        let script = format!(
            "{} == null || {}.toString() == \"{}\"",
            hook, hook, NIL_ELEMENT
        );
        truth_of(self.issue_one(&script))
    }

    /// Captures the current screen into `path`.
    pub fn capture_screenshot(&mut self, path: &Path) -> bool {
        let workspace = self.channel.dir().to_owned();
        self.supervisor.capture_screen(path, &workspace)
    }

    /// Captures the current screen into a timestamped file of the workspace.
    pub fn capture_screenshot_to_workspace(&mut self) -> Option<PathBuf> {
        let name = format!(
            "screenshot-{}.png",
            chrono::Local::now().format("%Y%m%d-%H%M%S%.3f")
        );
        let path = self.channel.dir().join(name);
        self.capture_screenshot(&path).then_some(path)
    }
}

impl<C: Clock> Drop for Client<C> {
    fn drop(&mut self) {
        if self.supervisor.is_running() {
            self.shutdown();
        }
    }
}

/// Escapes text for a double quoted string literal of a single-line remote command.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

fn text_of(res: CommandResult) -> Option<String> {
    res.is_success().then_some(res.text)
}

fn truth_of(res: CommandResult) -> Result<bool, ClientError> {
    if res.is_success() {
        Ok(res.text.to_lowercase().starts_with("true"))
    } else {
        Err(ClientError::Remote {
            code: res.code,
            text: res.text,
        })
    }
}
