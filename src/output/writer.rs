//! Routing of user-facing output between stdout and stderr

use super::config::OutputMode;
use serde::Serialize;
use std::io::{self, Write};

/// Stream that receives human-readable output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// In JSON mode stdout is reserved for the machine-readable result
pub fn display_stream(mode: OutputMode) -> Stream {
    match mode {
        OutputMode::Cli => Stream::Stdout,
        OutputMode::Json => Stream::Stderr,
    }
}

/// Write display output followed by a newline
pub fn writeln_output(mode: OutputMode, args: std::fmt::Arguments) -> io::Result<()> {
    match display_stream(mode) {
        Stream::Stdout => {
            println!("{args}");
            io::stdout().flush()
        }
        Stream::Stderr => {
            eprintln!("{args}");
            io::stderr().flush()
        }
    }
}

/// Print a command result as pretty JSON on stdout
pub fn write_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}")?;
    stdout.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_mode_keeps_stdout_clean() {
        assert_eq!(display_stream(OutputMode::Cli), Stream::Stdout);
        assert_eq!(display_stream(OutputMode::Json), Stream::Stderr);
    }
}
