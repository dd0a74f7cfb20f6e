use std::io::{self, Write};

use crossterm::cursor::{MoveToColumn, MoveUp};
use crossterm::queue;
use crossterm::terminal::{self, Clear, ClearType};

use crate::upload::ImageUpload;

pub const RESULT_HEADING: &str = "📖 Artifact Description";
pub const ERROR_HEADING: &str = "🚫 Generation Failed";
pub const PREVIEW_CAPTION: &str = "Uploaded Artifact";
pub const PENDING_STATUS: &str = "Gemini is crafting the description...";

/// Output surface for a session.
pub trait Renderer {
    fn preview(&mut self, upload: &ImageUpload) -> io::Result<()>;
    fn caption(&mut self, text: &str) -> io::Result<()>;
    fn warning(&mut self, message: &str) -> io::Result<()>;
    /// Shown while a request is outstanding; replaced by the next call to
    /// [`Renderer::clear_transient`].
    fn transient_fact(&mut self, fact: &str) -> io::Result<()>;
    fn clear_transient(&mut self) -> io::Result<()>;
    fn result(&mut self, text: &str) -> io::Result<()>;
    fn error(&mut self, message: &str) -> io::Result<()>;
}

pub struct TerminalRenderer<W: Write> {
    out: W,
    ansi: bool,
    width: Option<u16>,
    transient_rows: usize,
}

impl<W: Write> TerminalRenderer<W> {
    /// With `ansi` off the transient block stays on screen instead of being erased.
    pub fn new(out: W, ansi: bool) -> Self {
        let width = if ansi {
            terminal::size().ok().map(|(cols, _)| cols)
        } else {
            None
        };
        Self::with_width(out, ansi, width)
    }

    /// `width` is the terminal column count used to work out how many rows a
    /// wrapped line occupies.
    pub fn with_width(out: W, ansi: bool, width: Option<u16>) -> Self {
        Self {
            out,
            ansi,
            width,
            transient_rows: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn heading(&mut self, title: &str) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{title}")?;
        writeln!(self.out, "{}", "─".repeat(title.chars().count()))
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn preview(&mut self, upload: &ImageUpload) -> io::Result<()> {
        let (width, height) = upload.dimensions();
        writeln!(
            self.out,
            "🖼  {PREVIEW_CAPTION}: {} ({}, {width}x{height}, {} bytes)",
            upload.path().display(),
            upload.mime_type(),
            upload.byte_len()
        )?;
        self.out.flush()
    }

    fn caption(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    fn warning(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.out, "⚠️  {message}")?;
        self.out.flush()
    }

    fn transient_fact(&mut self, fact: &str) -> io::Result<()> {
        let lines = [
            format!("📜 Did you know? {fact}"),
            format!("⏳ {PENDING_STATUS}"),
        ];
        for line in &lines {
            writeln!(self.out, "{line}")?;
            self.transient_rows += wrapped_rows(line, self.width);
        }
        self.out.flush()
    }

    fn clear_transient(&mut self) -> io::Result<()> {
        if self.transient_rows == 0 {
            return Ok(());
        }
        if self.ansi {
            let rows = u16::try_from(self.transient_rows).unwrap_or(u16::MAX);
            queue!(
                self.out,
                MoveUp(rows),
                MoveToColumn(0),
                Clear(ClearType::FromCursorDown)
            )?;
        }
        self.transient_rows = 0;
        self.out.flush()
    }

    fn result(&mut self, text: &str) -> io::Result<()> {
        self.heading(RESULT_HEADING)?;
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    fn error(&mut self, message: &str) -> io::Result<()> {
        self.heading(ERROR_HEADING)?;
        writeln!(self.out, "An error occurred during generation: {message}")?;
        self.out.flush()
    }
}

/// Terminal rows taken by `line` once it wraps at `width` columns.
fn wrapped_rows(line: &str, width: Option<u16>) -> usize {
    let Some(width) = width.filter(|cols| *cols > 0) else {
        return 1;
    };
    let columns: usize = line.chars().map(char_columns).sum();
    columns.div_ceil(usize::from(width)).max(1)
}

fn char_columns(ch: char) -> usize {
    match u32::from(ch) {
        0x231A..=0x23FF | 0x1F300..=0x1FAFF => 2,
        _ => 1,
    }
}
