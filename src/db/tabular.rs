//! Aligned plain-text tables for captured statement output.
//!
//! Cells are right-aligned in fixed-width columns, left-padded with `-`, and
//! each cell is followed by a `|` separator:
//!
//! ```text
//! ---ID|----NAME|
//! ----1|---alice|
//! ```

use std::io::{self, Write};

/// Padding added to the widest cell of each column.
pub const PADDING: usize = 3;

const PAD_CHAR: char = '-';
const SEPARATOR: char = '|';

/// Buffers table lines and renders them once every width is known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabularOutput {
    lines: Vec<Vec<String>>,
}

impl TabularOutput {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one line of cells.
    pub fn push_line(&mut self, cells: Vec<String>) {
        self.lines.push(cells);
    }

    /// Renders the table.
    pub fn render(&self) -> String {
        let widths = self.column_widths();
        let mut out = String::new();

        for line in &self.lines {
            for (cell, width) in line.iter().zip(&widths) {
                let pad = width - cell.chars().count();
                out.extend(std::iter::repeat(PAD_CHAR).take(pad));
                out.push_str(cell);
                out.push(SEPARATOR);
            }
            out.push('\n');
        }

        out
    }

    /// Renders the table and writes it in one call.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.render().as_bytes())?;
        writer.flush()
    }

    fn column_widths(&self) -> Vec<usize> {
        let columns = self.lines.iter().map(Vec::len).max().unwrap_or(0);
        (0..columns)
            .map(|col| {
                self.lines
                    .iter()
                    .filter_map(|line| line.get(col))
                    .map(|cell| cell.chars().count())
                    .max()
                    .unwrap_or(0)
                    + PADDING
            })
            .collect()
    }
}
