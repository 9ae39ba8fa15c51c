//! Stand-in for the remote runtime's read/evaluate/respond loop.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use super::batch::SENTINEL_PREFIX;
use super::protocol::{render_response, CommandResult};
use crate::config::{ArtifactSpec, ClientConfig, ProgramSpec, Timing};

const SLEEP_TIME: Duration = Duration::from_millis(2);

/// Answers `N-cmd.txt` files with `N-resp.txt` files from a background thread, evaluating every
/// line of a command separately the way the real runtime does.
pub(crate) struct FakeRuntime {
    stop: Arc<AtomicBool>,
    thrd: JoinHandle<()>,
    seen: Arc<Mutex<Vec<String>>>,
}

/// Evaluates every line to itself.
pub(crate) fn echo(line: &str) -> CommandResult {
    CommandResult::success(line)
}

/// Evaluates batch sentinel statements to their string literal and anything else to "ok".
pub(crate) fn evaluate(line: &str) -> CommandResult {
    let literal = line.trim_end_matches(';').trim_matches('"');
    if literal.starts_with(SENTINEL_PREFIX) {
        CommandResult::success(literal)
    } else {
        CommandResult::success("ok")
    }
}

impl FakeRuntime {
    pub(crate) fn echo(dir: &Path) -> Self {
        Self::spawn(dir, Duration::ZERO, echo)
    }

    pub(crate) fn spawn<F>(dir: &Path, delay: Duration, handler: F) -> Self
    where
        F: Fn(&str) -> CommandResult + Send + 'static,
    {
        let dir = dir.to_owned();
        let stop_flag_runtime: Arc<AtomicBool> = Arc::default();
        let stop_flag_thread = stop_flag_runtime.clone();
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let seen_thread = seen.clone();

        let thrd = std::thread::spawn(move || {
            serve(dir, delay, handler, stop_flag_thread, seen_thread)
        });

        Self {
            stop: stop_flag_runtime,
            thrd,
            seen,
        }
    }

    /// Stops the loop and returns every command it answered, in order.
    pub(crate) fn stop(self) -> Vec<String> {
        self.stop.store(true, Ordering::Release);
        self.thrd.join().expect("cannot join fake runtime thread");
        let seen = self.seen.lock().expect("poisoned");
        seen.clone()
    }
}

fn serve<F>(
    dir: PathBuf,
    delay: Duration,
    handler: F,
    stop: Arc<AtomicBool>,
    seen: Arc<Mutex<Vec<String>>>,
) where
    F: Fn(&str) -> CommandResult,
{
    let mut index = 0;
    while !stop.load(Ordering::Acquire) {
        let Ok(command) = fs::read_to_string(dir.join(format!("{}-cmd.txt", index))) else {
            std::thread::sleep(SLEEP_TIME);
            continue;
        };

        std::thread::sleep(delay);
        let results: Vec<CommandResult> = command.split('\n').map(&handler).collect();
        let staging = dir.join(format!("{}-resp.tmp", index));
        fs::write(&staging, render_response(&results)).expect("cannot write response");
        fs::rename(&staging, dir.join(format!("{}-resp.txt", index)))
            .expect("cannot publish response");

        let shutdown = command == "runLoop=false;";
        seen.lock().expect("poisoned").push(command);
        index += 1;
        if shutdown {
            break;
        }
    }
}

/// Configuration with `sleep` as runtime and watcher, rooted in a scratch directory.
pub(crate) fn test_config(root: &Path) -> ClientConfig {
    fs::create_dir_all(root.join("build/TestApp.app")).unwrap();
    fs::write(
        root.join("bootstrap.js"),
        "var iosAutoPath = \"$PATH_ROOT\";\n",
    )
    .unwrap();
    fs::write(root.join("writeResponse.py"), "# helper\n").unwrap();

    ClientConfig {
        runtime: ProgramSpec::new("sleep", &["30"]),
        artifact: ArtifactSpec {
            pattern: format!("{}/build/*.app", root.display()),
            attempts: 3,
            delay_ms: 10,
        },
        bootstrap: root.join("bootstrap.js"),
        template: None,
        support_files: vec![root.join("writeResponse.py")],
        watcher: Some(ProgramSpec::new("sleep", &["30"])),
        build: None,
        cleanup: None,
        screenshot: ProgramSpec::new("sh", &["-c", "echo png > {path}"]),
        workdir: Some(root.to_owned()),
        timing: Timing {
            response_timeout_ms: 5000,
            poll_interval_ms: 5,
            stop_grace_ms: 200,
        },
    }
}
