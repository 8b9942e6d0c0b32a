use core::fmt::{self, Write};

use heapless::Vec;

use super::line::{split_words, MAX_WORDS};
use super::{write_banner, ConsoleError};
use crate::context::{Mode, OperatorInterface};
use crate::ports::{InputId, OutputId, PortSpec};

pub type Handler =
    fn(&Invocation<'_>, &mut dyn OperatorInterface, &mut dyn Write) -> Result<(), ConsoleError>;

#[derive(Debug)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: Handler,
}

pub static COMMANDS: &[CommandDescriptor] = &[
    CommandDescriptor {
        name: "in",
        usage: "",
        help: "Print list of input ports",
        handler: cmd_in,
    },
    CommandDescriptor {
        name: "out",
        usage: "",
        help: "Print list of output ports",
        handler: cmd_out,
    },
    CommandDescriptor {
        name: "on",
        usage: "<port>",
        help: "Set port on",
        handler: cmd_on_off,
    },
    CommandDescriptor {
        name: "off",
        usage: "<port>",
        help: "Set port off",
        handler: cmd_on_off,
    },
    CommandDescriptor {
        name: "mode",
        usage: "[a|m]",
        help: "Set automatic/manual mode",
        handler: cmd_mode,
    },
    CommandDescriptor {
        name: "reset",
        usage: "",
        help: "Reset system",
        handler: cmd_reset,
    },
    CommandDescriptor {
        name: "help",
        usage: "[cmd]",
        help: "Print this help",
        handler: cmd_help,
    },
    CommandDescriptor {
        name: "version",
        usage: "",
        help: "Print version",
        handler: cmd_version,
    },
    CommandDescriptor {
        name: "counters",
        usage: "",
        help: "Print persisted counters",
        handler: cmd_counters,
    },
];

pub fn find(name: &str) -> Result<&'static CommandDescriptor, ConsoleError> {
    COMMANDS
        .iter()
        .find(|command| command.name == name)
        .ok_or_else(|| ConsoleError::NotFound(name.to_string()))
}

/// A parsed line bound to its command.
#[derive(Debug)]
pub struct Invocation<'a> {
    command: &'static CommandDescriptor,
    words: Vec<&'a str, MAX_WORDS>,
}

impl<'a> Invocation<'a> {
    /// `None` for a blank line.
    pub fn parse(line: &'a str) -> Option<Result<Self, ConsoleError>> {
        let words = split_words(line);
        let name = *words.first()?;
        Some(find(name).map(|command| Self { command, words }))
    }

    pub fn command(&self) -> &'static CommandDescriptor {
        self.command
    }

    /// Word count including the command name.
    pub fn argc(&self) -> usize {
        self.words.len()
    }

    pub fn arg(&self, index: usize) -> Option<&'a str> {
        self.words.get(index).copied()
    }

    pub fn usage(&self) -> ConsoleError {
        ConsoleError::Usage {
            command: self.command.name,
            usage: self.command.usage,
        }
    }

    pub fn run(
        &self,
        operator: &mut dyn OperatorInterface,
        out: &mut dyn Write,
    ) -> Result<(), ConsoleError> {
        (self.command.handler)(self, operator, out)
    }
}

/// Parses and runs one line. A blank line is a no-op.
pub fn execute(
    line: &str,
    operator: &mut dyn OperatorInterface,
    out: &mut dyn Write,
) -> Result<(), ConsoleError> {
    match Invocation::parse(line) {
        Some(invocation) => invocation?.run(operator, out),
        None => Ok(()),
    }
}

fn write_port_row(
    out: &mut dyn Write,
    spec: &PortSpec,
    active: bool,
) -> fmt::Result {
    writeln!(
        out,
        "{:<20} | {:<24} | {:<4} | {}",
        spec.name,
        spec.alias.unwrap_or(""),
        spec.pin,
        if active { "X" } else { "" }
    )
}

fn write_port_header(out: &mut dyn Write, title: &str) -> fmt::Result {
    writeln!(out, "{title}:")?;
    writeln!(
        out,
        "{:<20} | {:<24} | {:<4} | {}",
        "Name", "Alias", "Port", "Active"
    )
}

fn cmd_in(
    inv: &Invocation<'_>,
    operator: &mut dyn OperatorInterface,
    out: &mut dyn Write,
) -> Result<(), ConsoleError> {
    if inv.argc() != 1 {
        return Err(inv.usage());
    }
    write_port_header(out, "Inputs")?;
    let inputs = operator.inputs();
    for (index, spec) in operator.port_map().inputs().iter().enumerate() {
        write_port_row(out, spec, inputs.get(InputId::new(index as u8)))?;
    }
    writeln!(out)?;
    Ok(())
}

fn cmd_out(
    inv: &Invocation<'_>,
    operator: &mut dyn OperatorInterface,
    out: &mut dyn Write,
) -> Result<(), ConsoleError> {
    if inv.argc() != 1 {
        return Err(inv.usage());
    }
    write_port_header(out, "Outputs")?;
    let outputs = operator.outputs();
    for (index, spec) in operator.port_map().outputs().iter().enumerate() {
        write_port_row(out, spec, outputs.get(OutputId::new(index as u8)))?;
    }
    writeln!(out)?;
    Ok(())
}

fn cmd_on_off(
    inv: &Invocation<'_>,
    operator: &mut dyn OperatorInterface,
    _out: &mut dyn Write,
) -> Result<(), ConsoleError> {
    let port = match (inv.argc(), inv.arg(1)) {
        (2, Some(port)) => port,
        _ => return Err(inv.usage()),
    };
    let on = inv.command().name == "on";
    operator.set_output(port, on)?;
    Ok(())
}

fn cmd_mode(
    inv: &Invocation<'_>,
    operator: &mut dyn OperatorInterface,
    out: &mut dyn Write,
) -> Result<(), ConsoleError> {
    match (inv.argc(), inv.arg(1)) {
        (1, _) => writeln!(out, "Mode: {}", operator.mode())?,
        (2, Some("a")) => operator.set_mode(Mode::Automatic),
        (2, Some("m")) => operator.set_mode(Mode::Manual),
        _ => return Err(inv.usage()),
    }
    Ok(())
}

fn cmd_reset(
    inv: &Invocation<'_>,
    operator: &mut dyn OperatorInterface,
    _out: &mut dyn Write,
) -> Result<(), ConsoleError> {
    if inv.argc() != 1 {
        return Err(inv.usage());
    }
    operator.reset_outputs()?;
    Ok(())
}

fn cmd_help(
    inv: &Invocation<'_>,
    _operator: &mut dyn OperatorInterface,
    out: &mut dyn Write,
) -> Result<(), ConsoleError> {
    match (inv.argc(), inv.arg(1)) {
        (1, _) => {
            writeln!(out, "List of commands:")?;
            for command in COMMANDS {
                writeln!(out, "  {:>20} {}", command.name, command.help)?;
            }
            writeln!(out)?;
        }
        (2, Some(name)) => {
            let command = find(name)?;
            writeln!(out, "Usage: {} {}", command.name, command.usage)?;
            writeln!(out, "{}", command.help)?;
        }
        _ => return Err(inv.usage()),
    }
    Ok(())
}

fn cmd_version(
    inv: &Invocation<'_>,
    _operator: &mut dyn OperatorInterface,
    out: &mut dyn Write,
) -> Result<(), ConsoleError> {
    if inv.argc() != 1 {
        return Err(inv.usage());
    }
    write_banner(out)?;
    Ok(())
}

fn cmd_counters(
    inv: &Invocation<'_>,
    operator: &mut dyn OperatorInterface,
    out: &mut dyn Write,
) -> Result<(), ConsoleError> {
    if inv.argc() != 1 {
        return Err(inv.usage());
    }
    writeln!(out, "Counters:")?;
    let counters = operator.counters();
    if counters.is_empty() {
        writeln!(out, "  (none)")?;
    }
    for counter in counters {
        writeln!(out, "  {:<20} {}", counter.name, counter.value)?;
    }
    writeln!(out)?;
    Ok(())
}
