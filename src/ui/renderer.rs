//! Terminal renderer using crossterm
//!
//! Draws the session's three framed windows, "Bytes received" and "Bytes
//! sent" on top and "Info" below, on the controlling terminal. Output goes
//! through a separate `/dev/tty` handle so the non-blocking flag on stdin
//! never affects drawing.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Attribute, ResetColor, SetAttribute},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use tracing::{debug, warn};

use super::window::TextWindow;
use crate::core::display::{Direction, DisplaySink};

/// Info lines repeated on the normal screen after leaving
const FAREWELL_LINES: usize = 3;

/// Smallest terminal that is drawn at all
const MIN_COLS: u16 = 8;
const MIN_ROWS: u16 = 9;

/// Top row and height of each window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    received: (u16, u16),
    sent: (u16, u16),
    info: (u16, u16),
}

impl Layout {
    /// 40% received, 40% sent, the rest info
    fn for_rows(rows: u16) -> Self {
        let traffic = rows * 2 / 5;
        let info = rows - 2 * traffic;
        Self {
            received: (0, traffic),
            sent: (traffic, traffic),
            info: (2 * traffic, info),
        }
    }
}

/// Session renderer
pub struct Renderer {
    out: BufWriter<File>,
    received: TextWindow,
    sent: TextWindow,
    info: TextWindow,
    /// Terminal (cols, rows)
    size: (u16, u16),
    layout: Layout,
    /// Whether the alternate screen is active
    initialized: bool,
    /// Frames need redrawing
    frames_dirty: bool,
    /// A draw error was already logged
    error_logged: bool,
}

impl Renderer {
    /// Open the controlling terminal for drawing
    pub fn new() -> io::Result<Self> {
        let tty = OpenOptions::new().write(true).open("/dev/tty")?;
        let size = terminal::size()?;
        let layout = Layout::for_rows(size.1);

        let (cols, _) = size;
        let mut renderer = Self {
            out: BufWriter::with_capacity(65536, tty),
            received: TextWindow::new(Direction::Received.window_name(), 0, 0),
            sent: TextWindow::new(Direction::Sent.window_name(), 0, 0),
            info: TextWindow::new("Info", 0, 0),
            size,
            layout,
            initialized: false,
            frames_dirty: true,
            error_logged: false,
        };
        renderer.apply_layout(cols);
        Ok(renderer)
    }

    /// Switch to the alternate screen and draw the empty windows
    pub fn init(&mut self) -> io::Result<()> {
        execute!(
            self.out,
            EnterAlternateScreen,
            DisableLineWrap,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        self.initialized = true;
        debug!("Renderer initialized at {}x{}", self.size.0, self.size.1);
        self.draw()
    }

    /// Leave the alternate screen, repeating the last info lines
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let _ = execute!(self.out, ResetColor, SetAttribute(Attribute::Reset));
        let _ = execute!(self.out, Show);
        let _ = execute!(self.out, EnableLineWrap);
        execute!(self.out, LeaveAlternateScreen)?;

        for line in self.info.tail(FAREWELL_LINES) {
            writeln!(self.out, "{}", line)?;
        }
        self.out.flush()
    }

    fn apply_layout(&mut self, cols: u16) {
        let inner = cols.saturating_sub(2) as usize;
        let interior = |height: u16| height.saturating_sub(2) as usize;
        self.received.resize(inner, interior(self.layout.received.1));
        self.sent.resize(inner, interior(self.layout.sent.1));
        self.info.resize(inner, interior(self.layout.info.1));
        self.frames_dirty = true;
    }

    /// Draw whatever changed
    fn draw(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        let (cols, rows) = self.size;
        if cols < MIN_COLS || rows < MIN_ROWS {
            queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
            write!(self.out, "terminal too small")?;
            return self.out.flush();
        }

        queue!(self.out, Hide)?;
        if self.frames_dirty {
            queue!(self.out, Clear(ClearType::All))?;
            let layout = self.layout;
            for (window, (top, height)) in [
                (&self.received, layout.received),
                (&self.sent, layout.sent),
                (&self.info, layout.info),
            ] {
                draw_frame(&mut self.out, window.title(), top, height, cols)?;
            }
            self.received.mark_dirty();
            self.sent.mark_dirty();
            self.info.mark_dirty();
            self.frames_dirty = false;
        }

        let layout = self.layout;
        for (window, (top, _)) in [
            (&mut self.received, layout.received),
            (&mut self.sent, layout.sent),
            (&mut self.info, layout.info),
        ] {
            if window.is_dirty() {
                draw_contents(&mut self.out, window, top, cols)?;
                window.mark_clean();
            }
        }

        let (col, row) = self.info.cursor();
        queue!(
            self.out,
            MoveTo(1 + col as u16, layout.info.0 + 1 + row as u16),
            Show
        )?;
        self.out.flush()
    }

    fn draw_logged(&mut self) {
        if let Err(e) = self.draw() {
            if !self.error_logged {
                self.error_logged = true;
                warn!("Failed to draw: {}", e);
            }
        }
    }
}

fn draw_frame<W: Write>(out: &mut W, title: &str, top: u16, height: u16, cols: u16) -> io::Result<()> {
    let inner = cols.saturating_sub(2) as usize;

    queue!(out, MoveTo(0, top))?;
    write!(out, "┌─ ")?;
    queue!(out, SetAttribute(Attribute::Bold))?;
    write!(out, "{}", title)?;
    queue!(out, SetAttribute(Attribute::Reset))?;
    write!(out, " {}┐", "─".repeat(inner.saturating_sub(title.len() + 3)))?;

    for row in 1..height.saturating_sub(1) {
        queue!(out, MoveTo(0, top + row))?;
        write!(out, "│")?;
        queue!(out, MoveTo(cols - 1, top + row))?;
        write!(out, "│")?;
    }

    queue!(out, MoveTo(0, top + height - 1))?;
    write!(out, "└{}┘", "─".repeat(inner))
}

fn draw_contents<W: Write>(out: &mut W, window: &TextWindow, top: u16, cols: u16) -> io::Result<()> {
    let inner = cols.saturating_sub(2) as usize;
    let mut lines = window.visible_lines();
    for row in 0..window.height() {
        let line = lines.next().unwrap_or_default();
        queue!(out, MoveTo(1, top + 1 + row as u16))?;
        write!(out, "{:<width$}", line, width = inner)?;
    }
    Ok(())
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

impl DisplaySink for Renderer {
    fn write_info(&mut self, text: &str) {
        self.info.write_text(text);
    }

    fn write_received(&mut self, token: &str) {
        self.received.write_token(token);
    }

    fn write_sent(&mut self, token: &str) {
        self.sent.write_token(token);
    }

    fn clear_received(&mut self) {
        self.received.clear();
    }

    fn clear_sent(&mut self) {
        self.sent.clear();
    }

    fn echo_input(&mut self, byte: u8) {
        self.info.echo(byte);
    }

    fn erase_input(&mut self) {
        self.info.erase_echo();
    }

    fn relayout(&mut self) {
        match terminal::size() {
            Ok(size) => {
                debug!("Terminal resized to {}x{}", size.0, size.1);
                self.size = size;
                self.layout = Layout::for_rows(size.1);
                self.apply_layout(size.0);
            }
            Err(e) => warn!("Failed to read terminal size: {}", e),
        }
    }

    fn present(&mut self) {
        self.draw_logged();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_splits_rows() {
        let layout = Layout::for_rows(24);
        assert_eq!(layout.received, (0, 9));
        assert_eq!(layout.sent, (9, 9));
        assert_eq!(layout.info, (18, 6));

        let layout = Layout::for_rows(50);
        assert_eq!(layout.info.0 + layout.info.1, 50);
    }

    #[test]
    fn test_frame_drawing() {
        let mut out = Vec::new();
        draw_frame(&mut out, "Info", 0, 3, 12).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("┌─ "));
        assert!(text.contains("Info"));
        assert!(text.contains(&format!("└{}┘", "─".repeat(10))));
    }

    #[test]
    fn test_contents_are_padded() {
        let mut window = TextWindow::new("Info", 6, 2);
        window.write_text("ab");
        let mut out = Vec::new();
        draw_contents(&mut out, &window, 0, 8).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("ab    "));
    }
}
