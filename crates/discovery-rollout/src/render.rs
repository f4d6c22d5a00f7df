//! Table rendering of the session store.
//!
//! Each render is a frame; the console renderer erases the previous
//! frame before printing the next one so the table refreshes in place.

use std::io;

use console::{pad_str, style, Alignment, Term};

use crate::session::{SessionStore, SimulatedUser};

const HEADERS: [&str; 6] = [
    "User",
    "USER_TOKEN",
    "Requests",
    "Last Version",
    "Last URL",
    "Last Request",
];

/// Lines in a frame besides the user rows: top border, header row,
/// header separator, bottom border and the status footer.
pub const FRAME_OVERHEAD: usize = 5;

/// Columns of the failure reason shown in the footer.
const FAILURE_REASON_WIDTH: usize = 60;

/// Something that can show the session store after a round.
pub trait Renderer {
    /// Show the store as it stands after `round`.
    fn render(&mut self, store: &SessionStore, round: u64) -> io::Result<()>;
}

/// Builds the text of a frame. Pure, so frames can be compared.
#[derive(Debug, Clone)]
pub struct TableLayout {
    baseline_version: String,
}

impl TableLayout {
    /// Create a layout that highlights `baseline_version` as the old version.
    pub fn new(baseline_version: impl Into<String>) -> Self {
        Self {
            baseline_version: baseline_version.into(),
        }
    }

    /// Lines of the frame for `store`, stamped with `timestamp`.
    pub fn frame(&self, store: &SessionStore, round: u64, timestamp: &str) -> Vec<String> {
        let rows: Vec<[String; 6]> = store
            .iter()
            .map(|user| self.row(user, timestamp))
            .collect();

        let mut widths: [usize; 6] = HEADERS.map(console::measure_text_width);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row.iter()) {
                *width = (*width).max(console::measure_text_width(cell));
            }
        }

        let border = border_line(&widths);
        let mut lines = Vec::with_capacity(rows.len() + FRAME_OVERHEAD);
        lines.push(border.clone());
        lines.push(table_line(&HEADERS.map(String::from), &widths));
        lines.push(border.clone());
        for row in &rows {
            lines.push(table_line(row, &widths));
        }
        lines.push(border);
        lines.push(self.footer(store, round));
        lines
    }

    fn row(&self, user: &SimulatedUser, timestamp: &str) -> [String; 6] {
        let token = user
            .session_token
            .as_ref()
            .map_or_else(|| "-".to_string(), |t| t.to_string());

        [
            user.index.to_string(),
            token,
            user.request_count.to_string(),
            self.version_cell(user),
            user.last_url.clone(),
            timestamp.to_string(),
        ]
    }

    fn version_cell(&self, user: &SimulatedUser) -> String {
        if user.is_failing() {
            let shown = if user.has_observed() { user.last_version.as_str() } else { "error" };
            return style(shown).red().to_string();
        }
        if !user.has_observed() {
            return String::new();
        }
        if user.last_version == self.baseline_version {
            style(&user.last_version).blue().to_string()
        } else {
            style(&user.last_version).green().to_string()
        }
    }

    fn footer(&self, store: &SessionStore, round: u64) -> String {
        let mut footer = format!(
            "round {} | {}/{} users on {}",
            round,
            store.count_on(&self.baseline_version),
            store.len(),
            self.baseline_version
        );
        let failing = store.count_failing();
        if failing > 0 {
            footer.push_str(&format!(" | {}", style(format!("{} failed", failing)).red()));
        }
        if let Some((index, reason)) = store.first_failure() {
            let reason = reason.lines().next().unwrap_or_default();
            let reason = console::truncate_str(reason, FAILURE_REASON_WIDTH, "…");
            footer.push_str(&format!(" (user {}: {})", index, reason));
        }
        footer
    }
}

fn border_line(widths: &[usize]) -> String {
    let segments: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
    format!("+{}+", segments.join("+"))
}

/// Cut every line to `width` columns so each one takes a single terminal row.
///
/// A width of zero means the terminal size is unknown; lines are kept as is.
pub fn fit_to_width(lines: Vec<String>, width: usize) -> Vec<String> {
    if width == 0 {
        return lines;
    }
    lines
        .into_iter()
        .map(|line| console::truncate_str(&line, width, "…").into_owned())
        .collect()
}

fn table_line(cells: &[String], widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths.iter())
        .map(|(cell, width)| format!(" {} ", pad_str(cell, *width, Alignment::Left, None)))
        .collect();
    format!("|{}|", padded.join("|"))
}

/// Renders frames to the terminal, replacing the previous frame.
pub struct ConsoleRenderer {
    layout: TableLayout,
    term: Term,
    printed: usize,
}

impl ConsoleRenderer {
    /// Render to stdout.
    pub fn stdout(layout: TableLayout) -> Self {
        Self::with_term(layout, Term::stdout())
    }

    /// Render to a specific terminal.
    pub fn with_term(layout: TableLayout, term: Term) -> Self {
        Self {
            layout,
            term,
            printed: 0,
        }
    }

    /// Terminal rows the last frame occupied.
    pub fn printed_lines(&self) -> usize {
        self.printed
    }
}

impl Renderer for ConsoleRenderer {
    fn render(&mut self, store: &SessionStore, round: u64) -> io::Result<()> {
        let timestamp = chrono::Local::now().format("%d-%m-%Y %H:%M:%S").to_string();
        let (_, columns) = self.term.size();
        let lines = fit_to_width(self.layout.frame(store, round, &timestamp), columns as usize);

        if self.printed > 0 {
            self.term.clear_last_lines(self.printed)?;
        }
        for line in &lines {
            self.term.write_line(line)?;
        }
        self.printed = lines.len();
        Ok(())
    }
}
