//! CLI utilities for tandem.
//!
//! The utilities present in this module back the `tandem_cli` binary: reading commands from a
//! user and rendering query results.
use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::{
    error,
    session::{RowResult, Session},
};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("failed to access terminal: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Session(#[from] error::Error),
}

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Exit command `.exit`, also sent at end of input.
    Exit,
    /// Round trip check `.ping`
    Ping,
    /// SQL statements
    Statement(String),
}

/// Prompt user for a tandem command.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, CliError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ")?;
    writer.flush()?;

    if reader.read_line(&mut s)? == 0 {
        return Ok(Command::Exit);
    }

    match s.trim() {
        ".exit" => Ok(Command::Exit),
        ".ping" => Ok(Command::Ping),
        s if !s.starts_with('.') => Ok(Command::Statement(s.to_string())),
        s => Err(CliError::UnrecognizedCommand(s.to_string())),
    }
}

/// Runs one command against a session and writes its outcome.
///
/// Returns `false` once the user asked to exit.
pub fn run<W: Write>(
    session: &Session,
    command: Command,
    mut writer: W,
) -> Result<bool, CliError> {
    match command {
        Command::Exit => return Ok(false),
        Command::Ping => {
            session.ping()?;
            writeln!(writer, "pong")?;
        }
        Command::Statement(text) if text.is_empty() => {}
        Command::Statement(text) => {
            let mut result = session.sql(&text)?;
            render(&mut result, &mut writer)?;
        }
    }
    Ok(true)
}

/// Writes every remaining row of `result`, followed by a summary line and its warnings.
pub fn render<W: Write>(result: &mut RowResult, mut writer: W) -> Result<(), CliError> {
    if !result.has_data() {
        writeln!(writer, "OK, {} rows affected", result.affected_items_count())?;
    } else {
        let header: Vec<&str> = result.columns().iter().map(|c| c.name.as_str()).collect();
        writeln!(writer, "{}", header.join(" | "))?;

        let mut count = 0;
        while let Some(row) = result.fetch_one()? {
            writeln!(writer, "{row}")?;
            count += 1;
        }
        writeln!(writer, "{count} rows in set")?;
    }

    for warning in result.warnings() {
        writeln!(writer, "warning {}: {}", warning.code, warning.message)?;
    }
    Ok(())
}
