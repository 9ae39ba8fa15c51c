//! Client configuration, read from the `client` object of a scenario file.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// An external program and its argument template.
///
/// Arguments may contain `{name}` placeholders that are filled in right before spawning.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProgramSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ProgramSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_owned(),
            args: args.iter().map(|&a| a.to_owned()).collect(),
        }
    }

    /// Arguments with every `{key}` replaced by its value.
    pub fn expand_args(&self, vars: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{}}}", key), value)
                })
            })
            .collect()
    }
}

/// How the compiled target application is located.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactSpec {
    /// Glob pattern matching the compiled target.
    pub pattern: String,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_attempt_delay")]
    pub delay_ms: u64,
}

impl ArtifactSpec {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Timing {
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_stop_grace")]
    pub stop_grace_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout(),
            poll_interval_ms: default_poll_interval(),
            stop_grace_ms: default_stop_grace(),
        }
    }
}

impl Timing {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// The remote automation runtime. Placeholders: `artifact`, `script`, `workspace`, `template`.
    pub runtime: ProgramSpec,
    pub artifact: ArtifactSpec,
    /// Startup script template; `$PATH_ROOT` is replaced by the workspace path.
    pub bootstrap: PathBuf,
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub support_files: Vec<PathBuf>,
    /// Companion process dismissing system dialogs while the runtime is up.
    #[serde(default)]
    pub watcher: Option<ProgramSpec>,
    #[serde(default)]
    pub build: Option<ProgramSpec>,
    #[serde(default)]
    pub cleanup: Option<ProgramSpec>,
    /// Screen capture program. Placeholder: `path`.
    #[serde(default = "default_screenshot")]
    pub screenshot: ProgramSpec,
    /// Parent directory of the client's workspace, the system temp dir when unset.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub timing: Timing,
}

fn default_attempts() -> u32 {
    15
}

fn default_attempt_delay() -> u64 {
    2000
}

fn default_response_timeout() -> u64 {
    10 * 60 * 1000
}

fn default_poll_interval() -> u64 {
    100
}

fn default_stop_grace() -> u64 {
    15_000
}

fn default_screenshot() -> ProgramSpec {
    ProgramSpec::new("/usr/sbin/screencapture", &["-m", "{path}"])
}
