//! Scrolling text window
//!
//! Content model for one framed window: a list of fixed-width lines with a
//! write position. Everything written ends up as single-column cells;
//! control characters are shown in caret notation (`^[`, `^?`) and
//! characters that have no single-column glyph are shown as `.`.

use std::collections::VecDeque;

use unicode_width::UnicodeWidthChar;

/// Lines kept per window
pub const SCROLLBACK: usize = 1000;

const TAB_STOP: usize = 8;

/// What one echoed keystroke put on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Echo {
    Cells(usize),
    /// A line feed started a new line
    Break,
}

/// One window's content
pub struct TextWindow {
    title: &'static str,
    /// Interior columns
    width: usize,
    /// Interior rows
    height: usize,
    /// Oldest first; the last line is being written
    lines: VecDeque<Vec<char>>,
    /// Write column in the last line
    col: usize,
    /// Echoed keystrokes since the last Enter, for erasing
    echoes: Vec<Echo>,
    /// Cells written so far
    cells_put: usize,
    /// Content changed since the last draw
    dirty: bool,
}

impl TextWindow {
    pub fn new(title: &'static str, width: usize, height: usize) -> Self {
        let mut lines = VecDeque::new();
        lines.push_back(Vec::new());
        Self {
            title,
            width: width.max(1),
            height,
            lines,
            col: 0,
            echoes: Vec::new(),
            cells_put: 0,
            dirty: true,
        }
    }

    pub fn title(&self) -> &'static str {
        self.title
    }

    /// Interior rows
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width.max(1);
        self.height = height;
        self.col = self.col.min(self.width);
        self.dirty = true;
    }

    /// Append free text, wrapping at the window edge
    pub fn write_text(&mut self, text: &str) {
        self.echoes.clear();
        for c in text.chars() {
            self.put(c);
        }
        self.dirty = true;
    }

    /// Append a traffic token. A token that does not fit on the current
    /// line starts a new one, so tokens are not split across lines.
    pub fn write_token(&mut self, token: &str) {
        let width: usize = token.chars().map(cell_width).sum();
        if self.col > 0 && self.width - self.col.min(self.width) < width {
            self.new_line();
        }
        for c in token.chars() {
            self.put(c);
        }
        self.dirty = true;
    }

    /// Echo a keystroke. Enter ends the line.
    pub fn echo(&mut self, byte: u8) {
        match byte {
            b'\r' => self.new_line(),
            b'\n' => {
                self.push_line();
                self.echoes.push(Echo::Break);
            }
            _ => {
                let before = self.cells_put;
                self.put(char::from(byte));
                self.echoes.push(Echo::Cells(self.cells_put - before));
            }
        }
        self.dirty = true;
    }

    /// Remove the most recent echoed keystroke
    pub fn erase_echo(&mut self) {
        let cells = match self.echoes.pop() {
            None => return,
            Some(Echo::Break) => {
                if self.lines.len() > 1 {
                    self.lines.pop_back();
                    self.col = self.current().len();
                }
                self.dirty = true;
                return;
            }
            Some(Echo::Cells(cells)) => cells,
        };
        for _ in 0..cells {
            if self.col == 0 {
                // the echo wrapped onto this line
                if self.lines.len() < 2 {
                    break;
                }
                self.lines.pop_back();
                self.col = self.current().len();
            }
            self.col -= 1;
            let col = self.col;
            self.current_mut().truncate(col);
        }
        self.dirty = true;
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.lines.push_back(Vec::new());
        self.col = 0;
        self.echoes.clear();
        self.dirty = true;
    }

    /// Lines currently on screen, top first, each at most `width` cells
    pub fn visible_lines(&self) -> impl Iterator<Item = String> + '_ {
        let skip = self.lines.len().saturating_sub(self.height);
        self.lines
            .iter()
            .skip(skip)
            .map(|line| line.iter().take(self.width).collect())
    }

    /// Write position relative to the window interior
    pub fn cursor(&self) -> (usize, usize) {
        let row = self.lines.len().min(self.height).saturating_sub(1);
        (self.col.min(self.width.saturating_sub(1)), row)
    }

    /// Last `n` non-empty lines, oldest first
    pub fn tail(&self, n: usize) -> Vec<String> {
        let mut tail: Vec<String> = self
            .lines
            .iter()
            .rev()
            .filter(|l| !l.is_empty())
            .take(n)
            .map(|l| l.iter().collect())
            .collect();
        tail.reverse();
        tail
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn put(&mut self, c: char) {
        match c {
            '\n' => self.new_line(),
            '\r' => self.col = 0,
            '\t' => {
                let stop = ((self.col / TAB_STOP) + 1) * TAB_STOP;
                while self.col < stop.min(self.width) {
                    self.put_cell(' ');
                }
            }
            c if c.is_ascii_control() => {
                self.put_cell('^');
                self.put_cell(char::from((c as u8) ^ 0x40));
            }
            c if c.width() == Some(1) => self.put_cell(c),
            _ => self.put_cell('.'),
        }
    }

    fn put_cell(&mut self, c: char) {
        if self.col >= self.width {
            self.push_line();
        }
        let col = self.col;
        let line = self.current_mut();
        if col < line.len() {
            line[col] = c;
        } else {
            line.push(c);
        }
        self.col += 1;
        self.cells_put += 1;
    }

    fn new_line(&mut self) {
        self.push_line();
        self.echoes.clear();
    }

    /// Start a line without ending the echo run
    fn push_line(&mut self) {
        self.lines.push_back(Vec::new());
        while self.lines.len() > SCROLLBACK {
            self.lines.pop_front();
        }
        self.col = 0;
    }

    fn current(&self) -> &Vec<char> {
        &self.lines[self.lines.len() - 1]
    }

    fn current_mut(&mut self) -> &mut Vec<char> {
        let last = self.lines.len() - 1;
        &mut self.lines[last]
    }
}

/// Cells `c` occupies once written
fn cell_width(c: char) -> usize {
    match c {
        '\n' | '\r' => 0,
        '\t' => 1,
        c if c.is_ascii_control() => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(w: &TextWindow) -> Vec<String> {
        w.visible_lines().collect()
    }

    #[test]
    fn test_text_wraps_at_width() {
        let mut w = TextWindow::new("Info", 4, 5);
        w.write_text("abcdefg\nhi");
        assert_eq!(lines(&w), vec!["abcd", "efg", "hi"]);
        assert_eq!(w.cursor(), (2, 2));
    }

    #[test]
    fn test_tokens_are_not_split() {
        let mut w = TextWindow::new("Bytes sent", 10, 5);
        for token in ["A(41) ", "B(42) "] {
            w.write_token(token);
        }
        assert_eq!(lines(&w), vec!["A(41) ", "B(42) "]);

        let mut w = TextWindow::new("Bytes sent", 9, 5);
        for token in ["41 ", "42 ", "43 ", "44 "] {
            w.write_token(token);
        }
        assert_eq!(lines(&w), vec!["41 42 43 ", "44 "]);
    }

    #[test]
    fn test_control_characters() {
        let mut w = TextWindow::new("Bytes received", 20, 3);
        w.write_token("\x1b");
        w.write_token("\x7f");
        w.write_token("\u{85}");
        w.write_token("\u{e9}");
        assert_eq!(lines(&w), vec!["^[^?.é"]);
    }

    #[test]
    fn test_carriage_return_and_tab() {
        let mut w = TextWindow::new("Bytes received", 20, 3);
        w.write_text("hello\rJ");
        assert_eq!(lines(&w), vec!["Jello"]);

        let mut w = TextWindow::new("Bytes received", 20, 3);
        w.write_text("a\tb");
        assert_eq!(lines(&w), vec!["a       b"]);
    }

    #[test]
    fn test_only_last_lines_visible() {
        let mut w = TextWindow::new("Info", 10, 2);
        w.write_text("one\ntwo\nthree");
        assert_eq!(lines(&w), vec!["two", "three"]);
        assert_eq!(w.tail(5), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_scrollback_is_bounded() {
        let mut w = TextWindow::new("Info", 10, 2);
        for _ in 0..SCROLLBACK + 50 {
            w.write_text("x\n");
        }
        assert_eq!(w.lines.len(), SCROLLBACK);
    }

    #[test]
    fn test_echo_and_erase() {
        let mut w = TextWindow::new("Info", 10, 3);
        w.echo(b'a');
        w.echo(0x01);
        assert_eq!(lines(&w), vec!["a^A"]);
        w.erase_echo();
        assert_eq!(lines(&w), vec!["a"]);
        w.erase_echo();
        w.erase_echo();
        assert_eq!(lines(&w), vec![""]);
    }

    #[test]
    fn test_erase_across_wrap() {
        let mut w = TextWindow::new("Info", 3, 3);
        for &b in b"abcd" {
            w.echo(b);
        }
        assert_eq!(lines(&w), vec!["abc", "d"]);
        w.erase_echo();
        w.erase_echo();
        assert_eq!(lines(&w), vec!["ab"]);
    }

    #[test]
    fn test_erase_line_feed_echo() {
        let mut w = TextWindow::new("Info", 10, 3);
        w.echo(b'a');
        w.echo(b'\n');
        w.echo(b'b');
        assert_eq!(lines(&w), vec!["a", "b"]);

        w.erase_echo();
        w.erase_echo();
        assert_eq!(lines(&w), vec!["a"]);
        assert_eq!(w.cursor(), (1, 0));
        w.erase_echo();
        assert_eq!(lines(&w), vec![""]);
    }

    #[test]
    fn test_enter_ends_echo() {
        let mut w = TextWindow::new("Info", 10, 3);
        w.echo(b'x');
        w.echo(b'\r');
        w.erase_echo();
        assert_eq!(lines(&w), vec!["x", ""]);
    }

    #[test]
    fn test_clear() {
        let mut w = TextWindow::new("Bytes sent", 10, 3);
        w.write_token("41 ");
        w.mark_clean();
        w.clear();
        assert!(w.is_dirty());
        assert_eq!(lines(&w), vec![""]);
        assert_eq!(w.cursor(), (0, 0));
    }
}
