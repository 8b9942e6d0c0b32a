//! Line-oriented operator console on top of the serial transport.
//!
//! The console only talks to the controller through [`OperatorInterface`];
//! it never touches ports or the state machine directly. It is polled once
//! per control cycle and executes at most one complete line per poll.

pub mod commands;
pub mod line;

pub use commands::{execute, CommandDescriptor, Invocation, COMMANDS};
pub use line::{split_words, Feed, LineEditor, LINE_CAPACITY, MAX_WORDS};

use core::fmt::{self, Write};

use thiserror::Error;
use tracing::debug;

use crate::context::{ControlError, Mode, OperatorInterface};
use crate::transport::SerialTransport;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("Usage: {command} {usage}")]
    Usage {
        command: &'static str,
        usage: &'static str,
    },
    #[error("Command not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("console output failed")]
    Output(#[from] fmt::Error),
}

pub fn write_banner(out: &mut dyn Write) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "Winch controller AFK-3")?;
    writeln!(out, "  Version:       {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "  Package:       {}", env!("CARGO_PKG_NAME"))?;
    writeln!(out)
}

#[derive(Debug)]
pub struct Console {
    editor: LineEditor,
    show_prompt: bool,
}

impl Console {
    pub fn new() -> Self {
        Self {
            editor: LineEditor::new(),
            show_prompt: true,
        }
    }

    /// Prints the state-change notice; the prompt follows on the next poll.
    pub fn announce_state(&mut self, name: &str, out: &mut dyn Write) -> fmt::Result {
        writeln!(out)?;
        writeln!(out, "State {name}")?;
        self.show_prompt = true;
        Ok(())
    }

    /// Whether the prompt is due on the next poll.
    pub fn prompt_pending(&self) -> bool {
        self.show_prompt
    }

    /// Services the console for one cycle: prompt if due, then consume
    /// received bytes until the receive buffer is empty or one line has been
    /// executed. Rejected commands are reported on `out`, never returned.
    pub fn poll<const RX: usize, const TX: usize>(
        &mut self,
        transport: &SerialTransport<RX, TX>,
        out: &mut dyn Write,
        operator: &mut dyn OperatorInterface,
    ) -> fmt::Result {
        if self.show_prompt {
            write_prompt(out, operator)?;
            self.show_prompt = false;
        }

        while let Some(byte) = transport.read_byte() {
            match self.editor.feed(byte) {
                Feed::Ignored => {}
                Feed::Echo(c) => out.write_char(c)?,
                Feed::Erase => out.write_str("\x08 \x08")?,
                Feed::Complete => {
                    out.write_char('\n')?;
                    let line = self.editor.take();
                    run_line(&line, out, operator)?;
                    self.show_prompt = true;
                    break;
                }
            }
        }
        Ok(())
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

fn run_line(
    line: &str,
    out: &mut dyn Write,
    operator: &mut dyn OperatorInterface,
) -> fmt::Result {
    match execute(line, operator, out) {
        Ok(()) => Ok(()),
        Err(ConsoleError::Output(e)) => Err(e),
        Err(e) => {
            debug!(line, error = %e, "command rejected");
            writeln!(out, "{e}")
        }
    }
}

fn write_prompt(out: &mut dyn Write, operator: &dyn OperatorInterface) -> fmt::Result {
    match operator.mode() {
        Mode::Manual => out.write_str("manual> "),
        Mode::Automatic => write!(out, "{}> ", operator.state_name()),
    }
}
