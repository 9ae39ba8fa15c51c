//! JSON scenarios driving the automation client from the command line.

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use log::{error, info, warn};
use serde::Deserialize;

use crate::client::clock::Clock;
use crate::client::protocol::Hook;
use crate::client::Client;
use crate::config::ClientConfig;

const DEFAULT_WAIT_SECS: f64 = 30.0;

/// Actions that may be deferred into a batch.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data")]
enum BatchStep {
    SetValue { hook: String, value: String },
    Tap { hook: String },
    ScrollTo { hook: String },
    Raw { command: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data")]
enum Step {
    // remote UI actions
    SetValue {
        hook: String,
        value: String,
    },
    Tap {
        hook: String,
    },
    ScrollTo {
        hook: String,
    },
    Raw {
        command: String,
    },
    Batch {
        steps: Vec<BatchStep>,
    },
    // remote checks
    GetValue {
        hook: String,
        expect: Option<String>,
    },
    WaitFor {
        hook: String,
        timeout: Option<f64>,
    },
    CheckNull {
        hook: String,
        expect: Option<bool>,
    },
    Delay {
        time: f64,
    },
    Screenshot {
        path: Option<PathBuf>,
    },
    // host side steps
    Sleep {
        time: f64,
    },
    Pause {
        prompt: Option<String>,
    },
}

#[derive(Deserialize)]
struct ScenarioFile {
    client: ClientConfig,
    steps: Vec<Step>,
}

pub struct Scenario {
    pub config: ClientConfig,
    steps: Vec<Step>,
}

/// Outcome of a scenario run.
#[derive(Debug, Default)]
pub struct Report {
    pub steps: usize,
    pub failures: Vec<String>,
}

impl Report {
    /// A run passes only without a single failure.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

const GENERIC_PROMPT: &str = r#"
==================================================
=======   Further execution is paused.     =======
======= Press Enter to continue execution. =======
==================================================
"#;

type StepResult = Result<(), String>;

fn expect_true(ok: bool, what: &str) -> StepResult {
    if ok {
        Ok(())
    } else {
        Err(format!("{} failed", what))
    }
}

/// Converts a duration given in seconds, refusing negative and non-finite values.
fn seconds(value: f64, what: &str) -> Result<Duration, String> {
    Duration::try_from_secs_f64(value).map_err(|e| format!("bad {} '{}': {}", what, value, e))
}

impl BatchStep {
    fn issue<C: Clock>(&self, client: &mut Client<C>) {
        match self {
            BatchStep::SetValue { hook, value } => {
                client.set_value(&Hook::new(hook.as_str()), value);
            }
            BatchStep::Tap { hook } => {
                client.tap(&Hook::new(hook.as_str()));
            }
            BatchStep::ScrollTo { hook } => {
                client.scroll_to(&Hook::new(hook.as_str()));
            }
            BatchStep::Raw { command } => {
                client.issue(command);
            }
        }
    }
}

impl Scenario {
    pub fn from_json(json_path: &str) -> Result<Self, String> {
        // first read the JSON file completely
        let content = fs::read_to_string(json_path)
            .map_err(|e| format!("cannot read '{}' - {}", json_path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let file: ScenarioFile =
            serde_json::from_str(content).map_err(|e| format!("bad scenario format - {}", e))?;

        Ok(Scenario {
            config: file.client,
            steps: file.steps,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order.
    ///
    /// A failing step does not stop the run: it is logged, a screenshot is attached and the
    /// next step goes on.
    pub fn run<C: Clock>(self, client: &mut Client<C>) -> Report {
        let mut report = Report::default();

        for (i, step) in self.steps.into_iter().enumerate() {
            report.steps += 1;
            if let Err(msg) = run_step(client, step) {
                error!("step {}: {}", i, msg);
                match client.capture_screenshot_to_workspace() {
                    Some(path) => info!("step {}: screenshot at '{}'", i, path.display()),
                    None => warn!("step {}: no screenshot could be taken", i),
                }
                report.failures.push(format!("step {}: {}", i, msg));
            }
        }

        info!(
            "scenario finished: {} step(s), {} failure(s)",
            report.steps,
            report.failures.len()
        );
        report
    }
}

fn run_step<C: Clock>(client: &mut Client<C>, step: Step) -> StepResult {
    match step {
        Step::SetValue { hook, value } => {
            expect_true(client.set_value(&Hook::new(hook), &value), "setValue")
        }
        Step::Tap { hook } => expect_true(client.tap(&Hook::new(hook)), "tap"),
        Step::ScrollTo { hook } => expect_true(client.scroll_to(&Hook::new(hook)), "scrollTo"),
        Step::Raw { command } => {
            let results = client.issue(&command);
            match results.iter().find(|r| !r.is_success()) {
                Some(bad) => Err(format!("'{}' failed: {}", command, bad)),
                None => Ok(()),
            }
        }
        Step::Batch { steps } => run_batch(client, &steps),
        Step::GetValue { hook, expect } => {
            let value = client
                .get_value(&Hook::new(hook.as_str()))
                .ok_or_else(|| format!("cannot get value of {}", hook))?;
            match expect {
                Some(expected) if expected != value => Err(format!(
                    "value of {}: expected '{}', got '{}'",
                    hook, expected, value
                )),
                _ => {
                    info!("value of {} is '{}'", hook, value);
                    Ok(())
                }
            }
        }
        Step::WaitFor { hook, timeout } => {
            let max_wait = seconds(timeout.unwrap_or(DEFAULT_WAIT_SECS), "timeout")?;
            match client.wait_for_not_null(&Hook::new(hook.as_str()), max_wait) {
                Ok(true) => Ok(()),
                Ok(false) => Err(format!("{} did not appear within {:?}", hook, max_wait)),
                Err(e) => Err(format!("waiting for {}: {}", hook, e)),
            }
        }
        Step::CheckNull { hook, expect } => {
            let is_null = client
                .check_if_null(&Hook::new(hook.as_str()))
                .map_err(|e| format!("checking {}: {}", hook, e))?;
            match expect {
                Some(expected) if expected != is_null => Err(format!(
                    "{}: expected null={}, got null={}",
                    hook, expected, is_null
                )),
                _ => Ok(()),
            }
        }
        Step::Delay { time } => expect_true(client.delay(time), "delay"),
        Step::Screenshot { path } => {
            let taken = match path {
                Some(path) => client.capture_screenshot(&path),
                None => client.capture_screenshot_to_workspace().is_some(),
            };
            expect_true(taken, "screenshot")
        }
        Step::Sleep { time } => {
            std::thread::sleep(seconds(time, "sleep time")?);
            Ok(())
        }
        Step::Pause { prompt } => {
            println!("{}", GENERIC_PROMPT.trim());
            if let Some(prompt) = prompt {
                println!("Description: {}", prompt);
            }
            std::io::stdin()
                .read_exact(&mut [0u8])
                .map_err(|e| format!("stdin is broken: {}", e))
        }
    }
}

fn run_batch<C: Clock>(client: &mut Client<C>, steps: &[BatchStep]) -> StepResult {
    let producers: Vec<_> = steps
        .iter()
        .map(|step| move |c: &mut Client<C>| step.issue(c))
        .collect();
    let refs: Vec<&dyn Fn(&mut Client<C>)> = producers
        .iter()
        .map(|p| p as &dyn Fn(&mut Client<C>))
        .collect();

    let groups = client
        .run_batch(&refs)
        .map_err(|e| format!("batch failed: {}", e))?;

    let mut problems = Vec::new();
    for (i, step) in steps.iter().enumerate() {
        match groups.get(&i) {
            None => problems.push(format!("no result for batched {:?}", step)),
            Some(results) => {
                if let Some(bad) = results.iter().find(|r| !r.is_success()) {
                    problems.push(format!("batched {:?} failed: {}", step, bad));
                }
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("; "))
    }
}
