//! Interactive mode: one remote command per input line, results printed back.

use std::io::{self, BufRead, Write};

use log::{debug, info};

use crate::client::clock::Clock;
use crate::client::Client;

/// Line that ends the interactive session.
pub const QUIT: &str = "quit";

const PROMPT: &str = "> ";

/// Reads commands from `input` until `quit` or end of input, issuing each one through the client
/// and writing its results to `output`.
///
/// Successful results print their text only, failures print `code,text`. Blank lines are
/// skipped. Returns the number of commands issued.
pub fn interact<C, R, W>(client: &mut Client<C>, input: R, mut output: W) -> io::Result<usize>
where
    C: Clock,
    R: BufRead,
    W: Write,
{
    writeln!(output, "Enter automation command (type '{}' to quit):", QUIT)?;
    let mut issued = 0;
    let mut lines = input.lines();

    loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;

        let Some(line) = lines.next() else {
            debug!("end of input");
            break;
        };
        let line = line?;
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if command == QUIT {
            break;
        }

        issued += 1;
        for result in client.issue(command) {
            if result.is_success() {
                writeln!(output, "{}", result.text)?;
            } else {
                writeln!(output, "{}", result)?;
            }
        }
    }

    writeln!(output)?;
    info!("interactive session over, {} command(s) issued", issued);
    Ok(issued)
}
