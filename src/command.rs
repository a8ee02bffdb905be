//! Outgoing message requests and the line-oriented command source format.
//!
//! A [`Command`] is what the application hands to a sender: deliver these
//! bytes from endpoint `src` to endpoint `dst`.  Commands arrive either typed
//! interactively or from a script file, one per line:
//!
//! ```text
//! msg <src> <dst> <text...>
//! exit
//! ```
//!
//! Everything after the single space that follows `<dst>` is the message,
//! verbatim (inner and trailing spaces included).

use thiserror::Error;

/// A request to deliver `message` from sender `src` to receiver `dst`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub src: u16,
    pub dst: u16,
    pub message: Vec<u8>,
}

impl Command {
    pub fn new(src: u16, dst: u16, message: impl Into<Vec<u8>>) -> Self {
        Self {
            src,
            dst,
            message: message.into(),
        }
    }
}

/// One parsed line of command input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Send(Command),
    Exit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    UnknownVerb(String),
    #[error("missing {0} id")]
    MissingId(&'static str),
    #[error("invalid {field} id: {value}")]
    InvalidId { field: &'static str, value: String },
    #[error("no sender with id {0}")]
    UnknownSender(u16),
    #[error("no receiver with id {0}")]
    UnknownReceiver(u16),
}

/// Parse one line of command input.
///
/// Returns `Ok(None)` for blank lines and `#` comments.
pub fn parse_line(line: &str) -> Result<Option<Input>, CommandError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim_start();
    if trimmed.trim().is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let (verb, rest) = split_word(trimmed);
    match verb {
        "exit" => Ok(Some(Input::Exit)),
        "msg" => {
            let (src, rest) = split_word(rest);
            let (dst, message) = split_word(rest);
            let src = parse_id("source", src)?;
            let dst = parse_id("destination", dst)?;
            Ok(Some(Input::Send(Command::new(src, dst, message.as_bytes()))))
        }
        other => Err(CommandError::UnknownVerb(other.to_string())),
    }
}

/// Split off the first space-delimited word; the remainder loses exactly one
/// separating space.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start_matches(' ');
    match s.find(' ') {
        Some(idx) => (&s[..idx], &s[idx + 1..]),
        None => (s, ""),
    }
}

fn parse_id(field: &'static str, value: &str) -> Result<u16, CommandError> {
    if value.is_empty() {
        return Err(CommandError::MissingId(field));
    }
    value.parse().map_err(|_| CommandError::InvalidId {
        field,
        value: value.to_string(),
    })
}
