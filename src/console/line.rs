use arrayvec::ArrayString;
use heapless::Vec;

/// Longest line the editor accepts; further bytes are dropped unechoed.
pub const LINE_CAPACITY: usize = 64;
/// Words kept per line, command name included. Anything after is ignored.
pub const MAX_WORDS: usize = 4;

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;

pub type LineBuffer = ArrayString<LINE_CAPACITY>;

/// Outcome of feeding one received byte to the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// Nothing to show.
    Ignored,
    /// Byte accepted; echo it.
    Echo(char),
    /// Last character removed; erase it on the terminal.
    Erase,
    /// Line terminator received; the line is ready.
    Complete,
}

#[derive(Debug, Default)]
pub struct LineEditor {
    line: LineBuffer,
    after_cr: bool,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts CR, LF or CR LF as the terminator, and both BS and DEL as
    /// backspace.
    pub fn feed(&mut self, byte: u8) -> Feed {
        let after_cr = core::mem::replace(&mut self.after_cr, false);

        match byte {
            b'\r' => {
                self.after_cr = true;
                Feed::Complete
            }
            b'\n' if after_cr => Feed::Ignored,
            b'\n' => Feed::Complete,
            BACKSPACE | DELETE => match self.line.pop() {
                Some(_) => Feed::Erase,
                None => Feed::Ignored,
            },
            b'\t' | b' '..=b'~' => {
                let c = char::from(byte);
                match self.line.try_push(c) {
                    Ok(()) => Feed::Echo(c),
                    Err(_) => Feed::Ignored,
                }
            }
            _ => Feed::Ignored,
        }
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    /// Hands out the finished line and starts a fresh one.
    pub fn take(&mut self) -> LineBuffer {
        core::mem::take(&mut self.line)
    }
}

/// Splits on spaces and tabs, keeping at most [`MAX_WORDS`] words.
pub fn split_words(line: &str) -> Vec<&str, MAX_WORDS> {
    line.split([' ', '\t'])
        .filter(|word| !word.is_empty())
        .take(MAX_WORDS)
        .collect()
}
