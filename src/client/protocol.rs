//! Module defining the command/response model shared by host and remote runtime.

use std::fmt;

/// Return code used for every failure produced on the host side.
pub const FAILURE_CODE: i32 = -1;

const COLLECTION_OPEN: &str = "<collection>";
const COLLECTION_CLOSE: &str = "</collection>";
const RESPONSE_OPEN: &str = "<response>";
const RESPONSE_CLOSE: &str = "</response>";

/// Result of one evaluated command, as reported by the remote runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub code: i32,
    pub text: String,
}

impl CommandResult {
    pub fn new(code: i32, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(0, text)
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self::new(FAILURE_CODE, text)
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Decodes a single `code,text` response line.
    ///
    /// Only the first comma separates the fields, everything after it is kept verbatim. A line
    /// that cannot be decoded never fails: it becomes a failure result describing the problem.
    pub fn parse(line: &str) -> Self {
        let Some((code, text)) = line.split_once(',') else {
            return Self::failure(format!(
                "could not parse response '{}': missing ',' delimiter",
                line
            ));
        };

        match code.trim().parse::<i32>() {
            Ok(code) => Self::new(code, text),
            Err(e) => Self::failure(format!("could not parse response '{}': {}", line, e)),
        }
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.code, self.text)
    }
}

/// Splits a response document into its ordered list of results.
///
/// The document must be complete: a missing `</collection>` means the remote side is still
/// writing it, and the caller is expected to try again later.
pub fn parse_response(document: &str) -> Result<Vec<CommandResult>, String> {
    let start = document
        .find(COLLECTION_OPEN)
        .ok_or_else(|| format!("no {} element", COLLECTION_OPEN))?;
    let end = document
        .rfind(COLLECTION_CLOSE)
        .filter(|&end| end >= start)
        .ok_or_else(|| format!("no {} element", COLLECTION_CLOSE))?;

    let body = &document[start + COLLECTION_OPEN.len()..end];
    let mut results = Vec::new();
    for item in body.split(RESPONSE_OPEN).skip(1) {
        let inner = item
            .split_once(RESPONSE_CLOSE)
            .map(|(inner, _)| inner)
            .ok_or_else(|| format!("unterminated {} element", RESPONSE_OPEN))?;
        results.push(CommandResult::parse(inner));
    }

    Ok(results)
}

/// Renders results in the same document format the remote loop writes.
pub fn render_response(results: &[CommandResult]) -> String {
    let mut doc = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    doc.push_str(COLLECTION_OPEN);
    doc.push('\n');
    for result in results {
        doc.push_str(RESPONSE_OPEN);
        doc.push_str(&result.to_string());
        doc.push_str(RESPONSE_CLOSE);
        doc.push('\n');
    }
    doc.push_str(COLLECTION_CLOSE);
    doc.push('\n');
    doc
}

/// Locator expression of a UI element inside the remote runtime.
///
/// A hook is never resolved on the host, it is only spliced into command text and evaluated
/// again by the remote side on every use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hook(String);

impl Hook {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
