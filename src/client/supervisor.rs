//! Lifecycle of the external automation runtime and its companion dialog watcher.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, error, info, warn};
use subprocess::{Exec, ExitStatus, Popen, PopenError};

use super::channel::FileChannel;
use super::clock::{poll_until, Clock};
use crate::config::{ClientConfig, ProgramSpec};

/// Statement that makes the remote run loop exit.
pub const SHUTDOWN_COMMAND: &str = "runLoop=false;";

const PATH_ROOT: &str = "$PATH_ROOT";
const DEFAULT_SCRIPT_NAME: &str = "bootstrap.js";

static WORKSPACE_SEQ: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Unstarted,
    Running,
    Stopping,
    Stopped,
    /// The runtime exited without being asked to.
    Crashed,
}

/// Failure to bring the remote runtime up. Always fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("cannot prepare workspace file '{}': {source}", path.display())]
    Workspace { path: PathBuf, source: io::Error },

    #[error("build hook failed: {0}")]
    Hook(String),

    #[error("build command '{command}' failed: {reason}")]
    Build { command: String, reason: String },

    #[error("bad artifact pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("no compiled target matching '{pattern}' after {attempts} attempt(s)")]
    ArtifactNotFound { pattern: String, attempts: u32 },

    #[error("cannot start '{program}': {source}")]
    Spawn { program: String, source: PopenError },
}

/// Extension points around the build of the target application.
pub trait BuildHooks {
    fn pre_build(&mut self, _workspace: &Path) -> Result<(), String> {
        Ok(())
    }

    fn post_build(&mut self, _workspace: &Path) -> Result<(), String> {
        Ok(())
    }

    fn on_shutdown(&mut self, _workspace: &Path) {}
}

pub struct NoHooks;

impl BuildHooks for NoHooks {}

/// Owner of the runtime and watcher process handles.
///
/// Nothing else in the crate touches the processes directly; everybody else only sees
/// [`Supervisor::is_running`] and [`Supervisor::state`].
pub struct Supervisor {
    config: ClientConfig,
    hooks: Box<dyn BuildHooks>,
    state: RuntimeState,
    runtime: Option<Popen>,
    watcher: Option<Popen>,
    artifact: Option<PathBuf>,
    count: u32,
}

fn workspace_error(path: &Path) -> impl FnOnce(io::Error) -> LaunchError + '_ {
    move |source| LaunchError::Workspace {
        path: path.to_owned(),
        source,
    }
}

fn open_log(path: PathBuf) -> Result<File, LaunchError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| LaunchError::Workspace { path, source })
}

/// New, not yet existing workspace directory below the configured working directory.
pub(crate) fn fresh_workspace(config: &ClientConfig) -> PathBuf {
    let parent = config.workdir.clone().unwrap_or_else(std::env::temp_dir);
    let seq = WORKSPACE_SEQ.fetch_add(1, Ordering::Relaxed);
    parent.join(format!(
        "applecart-{}-{}-{}",
        chrono::Local::now().format("%Y%m%d-%H%M%S"),
        std::process::id(),
        seq
    ))
}

/// A `.dSYM` match stands for the bundle it was generated from.
fn resolve_artifact(path: PathBuf) -> PathBuf {
    match path.extension() {
        Some(ext) if ext == "dSYM" => path.with_extension(""),
        _ => path,
    }
}

impl Supervisor {
    pub fn new(config: ClientConfig, hooks: Box<dyn BuildHooks>) -> Self {
        Self {
            config,
            hooks,
            state: RuntimeState::Unstarted,
            runtime: None,
            watcher: None,
            artifact: None,
            count: 0,
        }
    }

    /// Compiled target the runtime was last started with.
    pub fn artifact(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    pub fn runtime_pid(&self) -> Option<u32> {
        self.runtime.as_ref().and_then(|p| p.pid())
    }

    /// True while the runtime process exists and has not exited.
    pub fn is_running(&mut self) -> bool {
        match self.runtime.as_mut() {
            Some(proc) => proc.poll().is_none(),
            None => false,
        }
    }

    pub fn state(&mut self) -> RuntimeState {
        if self.state == RuntimeState::Running && !self.is_running() {
            self.state = RuntimeState::Crashed;
        }
        self.state
    }

    fn get_next_id(&mut self) -> u32 {
        let id = self.count;
        self.count += 1;
        id
    }

    /// Brings the remote runtime up, doing nothing if it is already running.
    ///
    /// The workspace is the channel's directory. A fresh runtime reads commands from index 0
    /// again, so once the directory holds exchanges of an earlier session the channel is moved
    /// to a new one first.
    pub fn start<C: Clock>(&mut self, channel: &mut FileChannel<C>) -> Result<(), LaunchError> {
        if self.is_running() {
            return Ok(());
        }

        if channel.next_index() > 0 {
            let fresh = fresh_workspace(&self.config);
            info!(
                "workspace '{}' holds an earlier session, moving to '{}'",
                channel.dir().display(),
                fresh.display()
            );
            channel.relocate(fresh);
        }
        let workspace = channel.dir().to_owned();
        info!("preparing workspace '{}'", workspace.display());
        let (script, template) = self.prepare_workspace(&workspace)?;

        debug!("running pre-build hook");
        self.hooks.pre_build(&workspace).map_err(LaunchError::Hook)?;
        if let Some(build) = self.config.build.clone() {
            self.run_build(&build, &workspace)?;
        }
        debug!("running post-build hook");
        self.hooks.post_build(&workspace).map_err(LaunchError::Hook)?;

        let artifact = self.find_artifact(channel.clock())?;
        info!("compiled target: '{}'", artifact.display());

        let workspace_arg = path_arg(&workspace);
        let artifact_arg = path_arg(&artifact);
        let script_arg = path_arg(&script);
        let template_arg = template.as_deref().map(path_arg).unwrap_or_default();

        // a watcher left over from a crashed runtime is replaced
        self.kill_watcher();
        if let Some(watcher) = self.config.watcher.clone() {
            let args = watcher.expand_args(&[("workspace", workspace_arg.as_str())]);
            let popen = self.spawn_background("watcher", &watcher, args, &workspace)?;
            self.watcher = Some(popen);
        } else {
            debug!("no dialog watcher configured");
        }

        info!("launching automation runtime");
        let runtime = self.config.runtime.clone();
        let args = runtime.expand_args(&[
            ("artifact", artifact_arg.as_str()),
            ("script", script_arg.as_str()),
            ("workspace", workspace_arg.as_str()),
            ("template", template_arg.as_str()),
        ]);
        match self.spawn_background("runtime", &runtime, args, &workspace) {
            Ok(popen) => self.runtime = Some(popen),
            Err(e) => {
                self.kill_watcher();
                return Err(e);
            }
        }

        self.artifact = Some(artifact);
        self.state = RuntimeState::Running;
        Ok(())
    }

    /// Shuts the runtime down: politely first, forcibly once the grace period is over.
    ///
    /// The shutdown exchange and the wait for the exit share one grace period. Returns `false`
    /// only when the runtime had to be killed. The watcher is always cleaned up, and calling
    /// this on a stopped supervisor is harmless. Cleanup and the shutdown hook only run when a
    /// live runtime was actually stopped.
    pub fn stop<C: Clock>(&mut self, channel: &mut FileChannel<C>) -> bool {
        let mut graceful = true;

        if self.is_running() {
            self.state = RuntimeState::Stopping;
            info!("stopping automation runtime");

            let grace = self.config.timing.stop_grace();
            let begin = channel.clock().now();
            if let Err(e) = channel.exchange_within(SHUTDOWN_COMMAND, grace) {
                warn!("shutdown command was not answered: {}", e);
            }

            let spent = channel.clock().now().saturating_duration_since(begin);
            let left = grace.saturating_sub(spent);
            let interval = self.config.timing.poll_interval();
            let runtime = &mut self.runtime;
            let exited = poll_until(channel.clock(), left, interval, || {
                runtime.as_mut().and_then(|p| p.poll())
            });

            match exited {
                Some(status) => info!("automation runtime exited: {:?}", status),
                None => {
                    warn!("automation runtime still alive after {:?}, killing it", grace);
                    graceful = false;
                    if let Some(proc) = self.runtime.as_mut() {
                        kill_and_reap(proc, "automation runtime");
                    }
                }
            }

            self.runtime = None;
            self.state = RuntimeState::Stopped;

            let workspace = channel.dir().to_owned();
            if let Some(cleanup) = self.config.cleanup.clone() {
                let workspace_arg = path_arg(&workspace);
                let args = cleanup.expand_args(&[("workspace", workspace_arg.as_str())]);
                match self.run_foreground(&cleanup, args, &workspace) {
                    Ok(status) if status.success() => (),
                    Ok(status) => warn!("cleanup command exited with {:?}", status),
                    Err(e) => warn!("cleanup command failed: {}", e),
                }
            }
            self.hooks.on_shutdown(&workspace);
        } else if self.runtime.take().is_some() {
            debug!("automation runtime already exited");
        }

        self.kill_watcher();
        graceful
    }

    /// Captures the current screen into `path` with the configured capture program.
    pub fn capture_screen(&mut self, path: &Path, workspace: &Path) -> bool {
        let screenshot = self.config.screenshot.clone();
        let path_value = path_arg(path);
        let args = screenshot.expand_args(&[("path", path_value.as_str())]);
        match self.run_foreground(&screenshot, args, workspace) {
            Ok(status) if status.success() => {
                debug!("screenshot saved at '{}'", path.display());
                true
            }
            Ok(status) => {
                warn!("screenshot command exited with {:?}", status);
                false
            }
            Err(e) => {
                warn!("screenshot command failed: {}", e);
                false
            }
        }
    }

    /// Installs the startup script and its companions, returning the script and template paths.
    fn prepare_workspace(
        &self,
        workspace: &Path,
    ) -> Result<(PathBuf, Option<PathBuf>), LaunchError> {
        fs::create_dir_all(workspace).map_err(workspace_error(workspace))?;

        let template = match &self.config.template {
            Some(src) => Some(copy_into(src, workspace)?),
            None => None,
        };
        for file in &self.config.support_files {
            copy_into(file, workspace)?;
        }

        let bootstrap = &self.config.bootstrap;
        let source = fs::read_to_string(bootstrap).map_err(workspace_error(bootstrap))?;
        let root = format!("{}/", workspace.display());
        let name = bootstrap
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRIPT_NAME));
        let script = workspace.join(name);
        fs::write(&script, source.replace(PATH_ROOT, &root)).map_err(workspace_error(&script))?;

        Ok((script, template))
    }

    fn run_build(&mut self, build: &ProgramSpec, workspace: &Path) -> Result<(), LaunchError> {
        info!("building the target application");
        let workspace_arg = path_arg(workspace);
        let args = build.expand_args(&[("workspace", workspace_arg.as_str())]);
        let command = build.program.clone();
        match self.run_foreground(build, args, workspace) {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(LaunchError::Build {
                command,
                reason: format!("exited with {:?}", status),
            }),
            Err(e) => Err(LaunchError::Build {
                command,
                reason: e.to_string(),
            }),
        }
    }

    /// Looks the compiled target up, retrying with a fixed delay between attempts.
    fn find_artifact<C: Clock>(&self, clock: &C) -> Result<PathBuf, LaunchError> {
        let spec = &self.config.artifact;
        glob::Pattern::new(&spec.pattern).map_err(|source| LaunchError::Pattern {
            pattern: spec.pattern.clone(),
            source,
        })?;

        let attempts = spec.attempts.max(1);
        for attempt in 1..=attempts {
            let found = glob::glob(&spec.pattern)
                .ok()
                .and_then(|mut paths| paths.find_map(Result::ok));
            if let Some(path) = found {
                return Ok(resolve_artifact(path));
            }

            debug!(
                "compiled target not found yet (attempt {}/{})",
                attempt, attempts
            );
            if attempt < attempts {
                clock.sleep(spec.delay());
            }
        }

        error!("could not find the compiled target '{}'", spec.pattern);
        Err(LaunchError::ArtifactNotFound {
            pattern: spec.pattern.clone(),
            attempts,
        })
    }

    fn spawn_background(
        &mut self,
        name: &str,
        spec: &ProgramSpec,
        args: Vec<String>,
        workspace: &Path,
    ) -> Result<Popen, LaunchError> {
        let file_out = open_log(workspace.join(format!("{}-out.log", name)))?;
        let file_err = open_log(workspace.join(format!("{}-err.log", name)))?;

        let cmd = Exec::cmd(&spec.program)
            .args(&args)
            .stdout(file_out)
            .stderr(file_err);

        let cmdline = cmd.to_cmdline_lossy();
        let popen = cmd.popen().map_err(|source| {
            error!("cannot start {} '{}': {}", name, cmdline, source);
            LaunchError::Spawn {
                program: spec.program.clone(),
                source,
            }
        })?;

        info!("BG spawn: {}='{}', pid={:?}", name, cmdline, popen.pid());
        Ok(popen)
    }

    fn run_foreground(
        &mut self,
        spec: &ProgramSpec,
        args: Vec<String>,
        workspace: &Path,
    ) -> Result<ExitStatus, String> {
        let id = self.get_next_id();
        let file_out = open_log(workspace.join(format!("{:03}-out.log", id)))
            .map_err(|e| e.to_string())?;
        let file_err = open_log(workspace.join(format!("{:03}-err.log", id)))
            .map_err(|e| e.to_string())?;

        let cmd = Exec::cmd(&spec.program)
            .args(&args)
            .stdout(file_out)
            .stderr(file_err);

        // collect the name before spawning the process
        let name = cmd.to_cmdline_lossy();
        let status = cmd.join().map_err(|e| format!("'{}': {}", name, e))?;

        info!("FG spawn: id={}, name='{}', status={:?}", id, name, status);
        Ok(status)
    }

    fn kill_watcher(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            debug!("terminating dialog watcher");
            kill_and_reap(&mut watcher, "dialog watcher");
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(mut runtime) = self.runtime.take() {
            if runtime.poll().is_none() {
                warn!("automation runtime still running on drop, killing it");
                kill_and_reap(&mut runtime, "automation runtime");
            }
        }
        self.kill_watcher();
    }
}

/// Best effort: failures are logged and otherwise ignored.
fn kill_and_reap(proc: &mut Popen, what: &str) {
    if let Err(e) = proc.kill() {
        warn!("cannot kill {}: {}", what, e);
    } else if let Err(e) = proc.wait() {
        warn!("cannot reap {}: {}", what, e);
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn copy_into(src: &Path, workspace: &Path) -> Result<PathBuf, LaunchError> {
    let name = src.file_name().ok_or_else(|| LaunchError::Workspace {
        path: src.to_owned(),
        source: io::Error::new(io::ErrorKind::InvalidInput, "not a file path"),
    })?;
    let dest = workspace.join(name);
    fs::copy(src, &dest).map_err(workspace_error(src))?;
    Ok(dest)
}

#[cfg(all(test, unix))]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::client::clock::fake::FakeClock;
    use crate::client::clock::SystemClock;
    use crate::client::test_support::test_config;

    fn channel_in(root: &Path) -> FileChannel<SystemClock> {
        FileChannel::new(root.join("workspace"), SystemClock)
            .with_poll_interval(Duration::from_millis(10))
    }

    #[test]
    fn start_then_stop_twice() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = channel_in(root.path());
        let mut sv = Supervisor::new(test_config(root.path()), Box::new(NoHooks));
        assert_eq!(sv.state(), RuntimeState::Unstarted);
        assert!(!sv.is_running());

        sv.start(&mut channel).unwrap();
        assert!(sv.is_running());
        assert_eq!(sv.state(), RuntimeState::Running);
        assert_eq!(
            sv.artifact(),
            Some(root.path().join("build/TestApp.app").as_path())
        );

        let script = fs::read_to_string(channel.dir().join("bootstrap.js")).unwrap();
        assert_eq!(
            script,
            format!("var iosAutoPath = \"{}/\";\n", channel.dir().display())
        );
        assert!(channel.dir().join("writeResponse.py").exists());

        // nobody answers the shutdown command and `sleep` ignores it
        assert!(!sv.stop(&mut channel));
        assert!(!sv.is_running());
        assert_eq!(sv.state(), RuntimeState::Stopped);
        assert_eq!(
            fs::read_to_string(channel.command_path(0)).unwrap(),
            SHUTDOWN_COMMAND
        );

        assert!(sv.stop(&mut channel));
        assert!(!sv.is_running());
        assert_eq!(sv.state(), RuntimeState::Stopped);
    }

    #[test]
    fn runtime_leaving_on_shutdown_is_graceful() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = channel_in(root.path());
        let mut cfg = test_config(root.path());
        cfg.runtime = ProgramSpec::new(
            "sh",
            &["-c", "while [ ! -f {workspace}/0-cmd.txt ]; do sleep 0.02; done"],
        );
        // the unanswered shutdown command uses up the whole grace period
        cfg.timing.stop_grace_ms = 1000;
        let mut sv = Supervisor::new(cfg, Box::new(NoHooks));

        sv.start(&mut channel).unwrap();
        assert!(sv.stop(&mut channel));
        assert_eq!(sv.state(), RuntimeState::Stopped);
    }

    #[test]
    fn hung_runtime_is_stopped_within_one_grace_period() {
        let root = tempfile::tempdir().unwrap();
        let clock = FakeClock::new();
        let mut channel = FileChannel::new(root.path().join("workspace"), clock.clone());
        let cfg = test_config(root.path());
        let grace = cfg.timing.stop_grace();
        let mut sv = Supervisor::new(cfg, Box::new(NoHooks));

        sv.start(&mut channel).unwrap();
        let begin = clock.now();
        assert!(!sv.stop(&mut channel));
        assert_eq!(clock.now() - begin, grace);
        assert!(!sv.is_running());
    }

    #[test]
    fn restart_moves_to_a_fresh_workspace() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = channel_in(root.path());
        let mut sv = Supervisor::new(test_config(root.path()), Box::new(NoHooks));

        sv.start(&mut channel).unwrap();
        let first = channel.dir().to_owned();
        sv.stop(&mut channel);
        assert_eq!(channel.next_index(), 1);

        sv.start(&mut channel).unwrap();
        assert_ne!(channel.dir(), first.as_path());
        assert_eq!(channel.next_index(), 0);
        assert!(channel.dir().join("bootstrap.js").exists());
        assert!(!channel.command_path(0).exists());
        assert_eq!(
            fs::read_to_string(first.join("0-cmd.txt")).unwrap(),
            SHUTDOWN_COMMAND
        );

        sv.stop(&mut channel);
    }

    #[test]
    fn start_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = channel_in(root.path());
        let mut sv = Supervisor::new(test_config(root.path()), Box::new(NoHooks));

        sv.start(&mut channel).unwrap();
        let pid = sv.runtime_pid();
        assert!(pid.is_some());
        sv.start(&mut channel).unwrap();
        assert_eq!(sv.runtime_pid(), pid);

        sv.stop(&mut channel);
    }

    #[test]
    fn exited_runtime_is_reported_as_crashed() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = channel_in(root.path());
        let mut cfg = test_config(root.path());
        cfg.runtime = ProgramSpec::new("true", &[]);
        let mut sv = Supervisor::new(cfg, Box::new(NoHooks));

        sv.start(&mut channel).unwrap();
        let gone = poll_until(
            &SystemClock,
            Duration::from_secs(5),
            Duration::from_millis(10),
            || (!sv.is_running()).then_some(()),
        );
        assert!(gone.is_some());
        assert_eq!(sv.state(), RuntimeState::Crashed);

        // nothing to shut down, no shutdown command is sent
        assert!(sv.stop(&mut channel));
        assert!(!channel.command_path(0).exists());
    }

    #[test]
    fn missing_artifact_is_fatal_after_bounded_retries() {
        let root = tempfile::tempdir().unwrap();
        let clock = FakeClock::new();
        let mut channel = FileChannel::new(root.path().join("workspace"), clock.clone());
        let mut cfg = test_config(root.path());
        cfg.artifact.pattern = format!("{}/build/*.ipa", root.path().display());
        let mut sv = Supervisor::new(cfg, Box::new(NoHooks));

        match sv.start(&mut channel) {
            Err(LaunchError::ArtifactNotFound { attempts: 3, .. }) => (),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(clock.sleeps(), 2);
        assert!(!sv.is_running());
        assert_eq!(sv.state(), RuntimeState::Unstarted);
    }

    #[test]
    fn dsym_match_resolves_to_bundle() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("dist/TestApp.app.dSYM")).unwrap();
        let mut cfg = test_config(root.path());
        cfg.artifact.pattern = format!("{}/dist/TestApp*", root.path().display());
        let sv = Supervisor::new(cfg, Box::new(NoHooks));

        let found = sv.find_artifact(&FakeClock::new()).unwrap();
        assert_eq!(found, root.path().join("dist/TestApp.app"));
    }

    #[test]
    fn unknown_runtime_program_fails_to_launch() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = channel_in(root.path());
        let mut cfg = test_config(root.path());
        cfg.runtime = ProgramSpec::new("/nonexistent/automation-runtime", &[]);
        let mut sv = Supervisor::new(cfg, Box::new(NoHooks));

        assert!(matches!(
            sv.start(&mut channel),
            Err(LaunchError::Spawn { .. })
        ));
        assert!(!sv.is_running());
        // the watcher started before the runtime does not outlive the failure
        assert!(sv.watcher.is_none());
    }

    struct Recorder(Rc<RefCell<Vec<&'static str>>>, bool);

    impl BuildHooks for Recorder {
        fn pre_build(&mut self, _workspace: &Path) -> Result<(), String> {
            self.0.borrow_mut().push("pre");
            if self.1 {
                Err("project not found".into())
            } else {
                Ok(())
            }
        }

        fn post_build(&mut self, workspace: &Path) -> Result<(), String> {
            self.0.borrow_mut().push("post");
            assert!(workspace.join("built").exists());
            Ok(())
        }

        fn on_shutdown(&mut self, _workspace: &Path) {
            self.0.borrow_mut().push("shutdown");
        }
    }

    #[test]
    fn hooks_bracket_the_build() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = channel_in(root.path());
        let mut cfg = test_config(root.path());
        cfg.build = Some(ProgramSpec::new("touch", &["{workspace}/built"]));
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut sv = Supervisor::new(cfg, Box::new(Recorder(calls.clone(), false)));

        sv.start(&mut channel).unwrap();
        sv.stop(&mut channel);
        assert_eq!(*calls.borrow(), vec!["pre", "post", "shutdown"]);
        assert!(channel.dir().join("000-out.log").exists());
    }

    #[test]
    fn shutdown_hook_runs_once_per_stopped_session() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = channel_in(root.path());
        let mut cfg = test_config(root.path());
        cfg.build = Some(ProgramSpec::new("touch", &["{workspace}/built"]));
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut sv = Supervisor::new(cfg, Box::new(Recorder(calls.clone(), false)));

        // never started: nothing to shut down
        sv.stop(&mut channel);
        assert!(calls.borrow().is_empty());

        sv.start(&mut channel).unwrap();
        sv.stop(&mut channel);
        sv.stop(&mut channel);
        assert_eq!(*calls.borrow(), vec!["pre", "post", "shutdown"]);
    }

    #[test]
    fn failing_hook_aborts_start() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = channel_in(root.path());
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut sv = Supervisor::new(
            test_config(root.path()),
            Box::new(Recorder(calls.clone(), true)),
        );

        assert!(matches!(
            sv.start(&mut channel),
            Err(LaunchError::Hook(msg)) if msg == "project not found"
        ));
        assert_eq!(*calls.borrow(), vec!["pre"]);
        assert!(!sv.is_running());
    }

    #[test]
    fn failing_build_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let mut channel = channel_in(root.path());
        let mut cfg = test_config(root.path());
        cfg.build = Some(ProgramSpec::new("false", &[]));
        let mut sv = Supervisor::new(cfg, Box::new(NoHooks));

        assert!(matches!(
            sv.start(&mut channel),
            Err(LaunchError::Build { .. })
        ));
    }

    #[test]
    fn screen_capture() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = test_config(root.path());
        let mut sv = Supervisor::new(cfg.clone(), Box::new(NoHooks));
        let shot = root.path().join("shot.png");
        assert!(sv.capture_screen(&shot, root.path()));
        assert_eq!(fs::read_to_string(&shot).unwrap(), "png\n");

        cfg.screenshot = ProgramSpec::new("false", &[]);
        let mut sv = Supervisor::new(cfg, Box::new(NoHooks));
        assert!(!sv.capture_screen(&shot, root.path()));
    }
}
