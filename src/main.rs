use env_logger::Env;
use log::{error, info};

use applecart::scenario::Scenario;
use applecart::{repl, Client, ClientConfig};

/// Exit code for failures that aborted the run before any step could execute.
const CRITICAL_EXIT: i32 = 2;

/// Little helper function to convert str literals to error message.
fn emsg(s: &str) -> Result<(), String> {
    Err(s.into())
}

fn main_check(args: &[String]) -> Result<(), String> {
    if args.len() != 1 {
        return emsg("usage: PROG check PATH_TO_SCENARIO");
    }

    let scenario = Scenario::from_json(&args[0])?;
    info!("scenario '{}' is valid: {} step(s)", args[0], scenario.len());
    Ok(())
}

/// Starts the client, leaving the process on a fatal launch failure.
fn start_client(config: ClientConfig) -> Result<Client, String> {
    let client = match Client::new(config) {
        Ok(client) => client,
        Err(e) if e.is_fatal() => {
            error!("critical error, aborting the run: {}", e);
            std::process::exit(CRITICAL_EXIT);
        }
        Err(e) => return Err(e.to_string()),
    };
    info!("workspace: {}", client.workspace().display());
    Ok(client)
}

fn main_repl(args: &[String]) -> Result<(), String> {
    if args.len() != 1 {
        return emsg("usage: PROG repl PATH_TO_SCENARIO");
    }

    // only the client section is used, the steps are ignored
    let scenario = Scenario::from_json(&args[0])?;
    let mut client = start_client(scenario.config)?;

    let stdin = std::io::stdin();
    let result = repl::interact(&mut client, stdin.lock(), std::io::stdout())
        .map_err(|e| format!("interactive session failed - {}", e));
    if !client.shutdown() {
        info!("automation runtime had to be killed");
    }
    result.map(|_| ())
}

fn main_run(args: &[String]) -> Result<(), String> {
    if args.len() != 1 {
        return emsg("usage: PROG run PATH_TO_SCENARIO");
    }

    let json_path = &args[0];
    info!("running scenario: {}", json_path);
    let scenario = Scenario::from_json(json_path)?;
    let mut client = start_client(scenario.config.clone())?;

    let report = scenario.run(&mut client);
    if !client.shutdown() {
        info!("automation runtime had to be killed");
    }

    if report.passed() {
        info!("PASSED: {} step(s)", report.steps);
        Ok(())
    } else {
        for failure in &report.failures {
            error!("{}", failure);
        }
        Err(format!(
            "FAILED: {} of {} step(s)",
            report.failures.len(),
            report.steps
        ))
    }
}

fn main_wrapper(args: &[String]) -> Result<(), String> {
    // init log with Info level by default
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("applecart");

    if args.len() < 2 {
        return emsg("usage: PROG (run|check|repl) ARGS...");
    }

    match args[1].as_str() {
        "run" => main_run(&args[2..]),
        "check" => main_check(&args[2..]),
        "repl" => main_repl(&args[2..]),
        _ => emsg("Only 'run', 'check' or 'repl' commands supported"),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if let Err(msg) = main_wrapper(&args) {
        error!("Error: {}", msg);
        std::process::exit(1);
    }
}
