//! Turns a whole translation file into ordered tokenized rows.
//!
//! Physical lines are joined into logical rows while a quoted field is open,
//! then each logical row is tokenized on the rayon pool. Row order is
//! preserved in the output.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{LookupError, Result};
use crate::tokenizer::tokenize;
use crate::types::TokenizedRow;

const BYTE_ORDER_MARK: char = '\u{feff}';

/// A logical row and the 1-based physical line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalRow {
    pub line: usize,
    pub text: String,
}

/// Reads and tokenizes `path`.
///
/// Fails with [`LookupError::FileAccess`] when the file cannot be opened or
/// read; no partial result is returned.
pub fn process_file(path: &Path, delimiter: char, quote: char) -> Result<Vec<TokenizedRow>> {
    let text = read_file_text(path)?;
    let file: Arc<Path> = Arc::from(path);
    Ok(process_text(&file, &text, delimiter, quote))
}

/// Tokenizes already loaded file contents.
pub fn process_text(
    file: &Arc<Path>,
    text: &str,
    delimiter: char,
    quote: char,
) -> Vec<TokenizedRow> {
    split_logical_rows(text, delimiter, quote)
        .into_par_iter()
        .enumerate()
        .map(|(row_index, row)| TokenizedRow {
            file_name: file.clone(),
            row_index,
            tokens: tokenize(&row.text, file, row.line, delimiter, quote),
        })
        .collect()
}

/// Reads a file as text.
///
/// `File::open` requests shared access on every platform, so a writer that
/// keeps the file open does not block the read. Invalid UTF-8 is replaced
/// rather than rejected and a leading byte order mark is dropped.
pub fn read_file_text(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|error| LookupError::file_access(path, error))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|error| LookupError::file_access(path, error))?;

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(error) => String::from_utf8_lossy(error.as_bytes()).into_owned(),
    };
    Ok(match text.strip_prefix(BYTE_ORDER_MARK) {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

/// Where the scanner is inside the current field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldState {
    /// Row start or just after a delimiter, blanks skipped.
    Start,
    Unquoted,
    Quoted,
}

/// Splits file contents into logical rows.
///
/// A line break outside quotes ends the current row; inside a quoted field it
/// is kept as `\n`. A quote only opens a quoted field when it is the first
/// non-blank character of a field, matching the tokenizer, so a stray quote
/// inside a value cannot swallow the following lines. `\r\n`, `\n` and a
/// lone `\r` all count as one line break. Blank rows are dropped and every
/// row is trimmed.
pub fn split_logical_rows(text: &str, delimiter: char, quote: char) -> Vec<LogicalRow> {
    let mut rows = Vec::new();
    let mut buffer = String::new();
    let mut state = FieldState::Start;
    let mut line = 1usize;
    let mut row_start = 1usize;

    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\r' || ch == '\n' {
            if ch == '\r' && chars.peek() == Some(&'\n') {
                chars.next();
            }
            line += 1;
            if state == FieldState::Quoted {
                buffer.push('\n');
            } else {
                flush_row(&mut rows, &mut buffer, row_start);
                row_start = line;
                state = FieldState::Start;
            }
            continue;
        }

        buffer.push(ch);
        state = match state {
            FieldState::Quoted if ch == quote => {
                if chars.peek() == Some(&quote) {
                    buffer.push(quote);
                    chars.next();
                    FieldState::Quoted
                } else {
                    FieldState::Unquoted
                }
            }
            FieldState::Quoted => FieldState::Quoted,
            _ if ch == delimiter => FieldState::Start,
            FieldState::Start if ch == quote => FieldState::Quoted,
            FieldState::Start if matches!(ch, ' ' | '\t') => FieldState::Start,
            _ => FieldState::Unquoted,
        };
    }
    flush_row(&mut rows, &mut buffer, row_start);

    rows
}

fn flush_row(rows: &mut Vec<LogicalRow>, buffer: &mut String, line: usize) {
    let trimmed = buffer.trim();
    if !trimmed.is_empty() {
        rows.push(LogicalRow {
            line,
            text: trimmed.to_string(),
        });
    }
    buffer.clear();
}
