//! CSV normalizer
//!
//! Turns decoded text into a rectangular `SheetGrid`.
//!
//! Policy:
//! - one grid row per record, blank lines included, so sheet row numbers
//!   follow the file's line numbers
//! - a quoted field may hold delimiters, quotes (doubled) and newlines
//! - short rows are right-padded with empty cells, long rows are kept; the
//!   grid width is the widest record
//! - a trailing line terminator does not open an extra record
//!
//! The `csv` crate is not used for reading because it drops blank lines.

use thiserror::Error;

/// Structurally unrecoverable input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input ended inside a quoted field
    #[error("Unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },
}

/// Rectangular grid of string cells
///
/// Every row holds exactly `width()` cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetGrid {
    rows: Vec<Vec<String>>,
    width: usize,
}

impl SheetGrid {
    /// Build a grid, right-padding short rows to the widest row
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, String::new());
        }
        Self { rows, width }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Consecutive row slices of at most `batch_rows` rows
    ///
    /// Each item carries the 0-based index of its first row.
    pub fn batches(&self, batch_rows: usize) -> impl Iterator<Item = (usize, &[Vec<String>])> + '_ {
        let size = batch_rows.max(1);
        self.rows
            .chunks(size)
            .enumerate()
            .map(move |(i, chunk)| (i * size, chunk))
    }

    /// Render back to comma-delimited text, quoting only where needed
    pub fn to_delimited(&self) -> Result<String, csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        for row in &self.rows {
            writer.write_record(row)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(String::from_utf8(bytes)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    Unquoted,
    Quoted,
    /// Just saw a quote inside a quoted field: either an escaped quote or the close
    QuoteInQuoted,
}

/// Quote-aware record splitter
#[derive(Debug, Clone, Copy)]
pub struct CsvNormalizer {
    delimiter: char,
}

impl Default for CsvNormalizer {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

impl CsvNormalizer {
    pub fn with_delimiter(delimiter: char) -> Self {
        Self { delimiter }
    }

    pub fn normalize(&self, text: &str) -> Result<SheetGrid, ParseError> {
        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut row: Vec<String> = Vec::new();
        let mut field = String::new();
        let mut state = State::FieldStart;
        let mut in_record = false;
        let mut line = 1usize;
        let mut quote_line = 1usize;

        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            let is_newline = c == '\n' || c == '\r';

            if state == State::Quoted {
                match c {
                    '"' => state = State::QuoteInQuoted,
                    '\r' => {
                        // Embedded CRLF stays CRLF inside the cell
                        field.push(c);
                        if chars.peek() == Some(&'\n') {
                            chars.next();
                            field.push('\n');
                        }
                        line += 1;
                    }
                    '\n' => {
                        field.push(c);
                        line += 1;
                    }
                    _ => field.push(c),
                }
                continue;
            }

            if is_newline {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                state = State::FieldStart;
                in_record = false;
                line += 1;
                continue;
            }

            in_record = true;

            if c == self.delimiter {
                row.push(std::mem::take(&mut field));
                state = State::FieldStart;
                continue;
            }

            state = match (state, c) {
                (State::FieldStart, '"') => {
                    quote_line = line;
                    State::Quoted
                }
                (State::QuoteInQuoted, '"') => {
                    field.push('"');
                    State::Quoted
                }
                // Stray quotes and text after a closing quote are kept literally
                _ => {
                    field.push(c);
                    State::Unquoted
                }
            };
        }

        if state == State::Quoted {
            return Err(ParseError::UnterminatedQuote { line: quote_line });
        }

        if in_record {
            row.push(field);
            rows.push(row);
        }

        Ok(SheetGrid::from_rows(rows))
    }
}

/// Normalize comma-delimited text
pub fn normalize(text: &str) -> Result<SheetGrid, ParseError> {
    CsvNormalizer::default().normalize(text)
}
