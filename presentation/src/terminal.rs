use colored::Colorize;
use crossterm::cursor::{MoveToColumn, MoveUp};
use crossterm::execute;
use crossterm::terminal::{self, Clear, ClearType};
use std::io::{self, IsTerminal, Write};
use tracing::debug;

/// A transient status line ("AI is thinking...") that is wiped from the
/// terminal once real output arrives. Only drawn when stdout is a terminal.
pub struct PendingLine {
    active: bool,
}

impl PendingLine {
    pub fn show(message: &str) -> Self {
        let mut stdout = io::stdout();
        if !stdout.is_terminal() {
            return Self::hidden();
        }
        print!("{}", message.dimmed());
        if let Err(e) = stdout.flush() {
            debug!("Could not draw pending indicator: {e}");
        }
        Self { active: true }
    }

    pub fn hidden() -> Self {
        Self { active: false }
    }

    pub fn clear(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Err(e) = execute!(io::stdout(), MoveToColumn(0), Clear(ClearType::CurrentLine)) {
            debug!("Could not clear pending indicator: {e}");
        }
    }
}

impl Drop for PendingLine {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Wipes `text` from the terminal, assuming it was the last thing printed
/// and started at column 0. Returns `false`, leaving the screen alone, when
/// stdout is not a terminal or the text has scrolled partly off screen.
pub fn erase_output(text: &str) -> bool {
    let mut stdout = io::stdout();
    if !stdout.is_terminal() {
        return false;
    }
    let (columns, rows) = match terminal::size() {
        Ok(size) => size,
        Err(e) => {
            debug!("Terminal size unavailable: {e}");
            return false;
        }
    };
    let used = rows_used(text, columns);
    if used >= usize::from(rows) {
        return false;
    }

    let result = if used > 1 {
        // used < rows, so it fits a u16
        execute!(
            stdout,
            MoveUp((used - 1) as u16),
            MoveToColumn(0),
            Clear(ClearType::FromCursorDown)
        )
    } else {
        execute!(stdout, MoveToColumn(0), Clear(ClearType::FromCursorDown))
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!("Could not erase streamed output: {e}");
            false
        }
    }
}

/// Terminal rows `text` occupies when printed from column 0, counting soft
/// wraps at `columns`.
fn rows_used(text: &str, columns: u16) -> usize {
    let columns = usize::from(columns.max(1));
    text.split('\n')
        .map(|line| line.chars().count().div_ceil(columns).max(1))
        .sum()
}
