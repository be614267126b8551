//! Plain-text answer rendering.

use std::io::{self, Write};

use entry_merge::{SourceLink, StreamUpdate};

/// Writes streamed answer text as it arrives.
///
/// Deltas are appended. When an update replaces the answer, the new text is
/// written again on a fresh line since plain output cannot rewind.
#[derive(Debug)]
pub struct AnswerRenderer<W: Write> {
    out: W,
    at_line_start: bool,
}

impl<W: Write> AnswerRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            at_line_start: true,
        }
    }

    pub fn on_update(&mut self, update: &StreamUpdate) -> io::Result<()> {
        if update.replaced && !self.at_line_start {
            self.out.write_all(b"\n")?;
            self.at_line_start = true;
        }
        if update.delta.is_empty() {
            return Ok(());
        }
        self.out.write_all(update.delta.as_bytes())?;
        self.at_line_start = update.delta.ends_with('\n');
        self.out.flush()
    }

    /// Terminate the answer and list its sources.
    pub fn finish(&mut self, sources: &[SourceLink]) -> io::Result<()> {
        if !self.at_line_start {
            self.out.write_all(b"\n")?;
            self.at_line_start = true;
        }
        if !sources.is_empty() {
            writeln!(self.out, "\nSources:")?;
            for (index, source) in sources.iter().enumerate() {
                writeln!(self.out, "[{}] {} <{}>", index + 1, source.title, source.url)?;
            }
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
