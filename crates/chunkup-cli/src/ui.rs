//! UI utilities for the chunkup CLI.

use std::io::{self, Write};

use chunkup_core::file::{format_size, ManifestEntry};
use chunkup_core::progress::{percent_complete, ProgressReporter};

/// Number of cells representing 100%.
const BAR_WIDTH: usize = 50;

/// Renders per-file progress bars on stdout.
#[derive(Debug)]
pub struct ConsoleProgress {
    total: usize,
}

impl ConsoleProgress {
    /// Create a reporter for a batch of `total` files.
    #[must_use]
    pub const fn new(total: usize) -> Self {
        Self { total }
    }

    fn draw(&self, index: usize, entry: &ManifestEntry, uploaded: u64) {
        print!(
            "\r  {} {} {}",
            file_label(index, self.total, entry),
            render_bar(uploaded, entry.size),
            format_size(uploaded.min(entry.size))
        );
        let _ = io::stdout().flush();
    }
}

impl ProgressReporter for ConsoleProgress {
    fn file_started(&mut self, index: usize, entry: &ManifestEntry) {
        self.draw(index, entry, 0);
    }

    fn progress(&mut self, index: usize, entry: &ManifestEntry, uploaded: u64) {
        self.draw(index, entry, uploaded);
    }

    fn file_finished(&mut self, index: usize, entry: &ManifestEntry) {
        self.draw(index, entry, entry.size);
        println!();
    }
}

fn file_label(index: usize, total: usize, entry: &ManifestEntry) -> String {
    if total > 1 {
        format!("[{}] {}", index + 1, entry.name)
    } else {
        entry.name.clone()
    }
}

/// Render `[#####.....] 50%` with [`BAR_WIDTH`] cells.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn render_bar(uploaded: u64, declared: u64) -> String {
    let percent = percent_complete(uploaded, declared);
    let filled = ((percent / 100.0) * BAR_WIDTH as f64) as usize;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        ".".repeat(BAR_WIDTH - filled),
        percent as u32
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_bar() {
        let empty = render_bar(0, 100);
        assert_eq!(empty, format!("[{}]   0%", ".".repeat(50)));

        let half = render_bar(50, 100);
        assert_eq!(half, format!("[{}{}]  50%", "#".repeat(25), ".".repeat(25)));

        let full = render_bar(100, 100);
        assert_eq!(full, format!("[{}] 100%", "#".repeat(50)));
    }

    #[test]
    fn test_render_bar_caps_and_empty_files() {
        assert_eq!(render_bar(500, 100), render_bar(100, 100));
        assert_eq!(render_bar(0, 0), render_bar(1, 1));
    }

    #[test]
    fn test_file_label() {
        let entry = ManifestEntry::new("a.txt", 1);
        assert_eq!(file_label(0, 1, &entry), "a.txt");
        assert_eq!(file_label(1, 3, &entry), "[2] a.txt");
    }
}
