//! Row tokenizer for delimiter-separated translation files.
//!
//! Grammar:
//! - Fields are separated by the configured delimiter.
//! - A field that starts with the quote character runs until the next
//!   un-doubled quote; `""` inside it is a literal quote and delimiters or
//!   line breaks are plain content.
//! - Unquoted fields are trimmed. Spaces and tabs before a field are skipped
//!   unless they are the delimiter.
//! - The last token of a row is always `EndOfRecord`; a trailing delimiter
//!   yields an extra empty `EndOfRecord` token.

use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;
use std::sync::Arc;

use crate::types::{Token, TokenKind};

/// Splits one logical row into tokens.
///
/// Every token carries `file` and `line` as its source location.
pub fn tokenize(
    row: &str,
    file: &Arc<Path>,
    line: usize,
    delimiter: char,
    quote: char,
) -> Vec<Token> {
    let token = |kind: TokenKind, content: String| Token {
        kind,
        content,
        source_file: file.clone(),
        source_line: line,
    };

    if row.is_empty() {
        return vec![token(TokenKind::EndOfRecord, String::new())];
    }

    let mut scanner = RowScanner {
        chars: row.chars().peekable(),
        delimiter,
        quote,
    };
    let mut tokens = Vec::new();

    loop {
        scanner.skip_blanks();
        let content = if scanner.peek() == Some(quote) {
            scanner.read_quoted()
        } else {
            scanner.read_unquoted()
        };

        // Both readers stop at a delimiter or the end of the row.
        if scanner.chars.next().is_none() {
            tokens.push(token(TokenKind::EndOfRecord, content));
            break;
        }

        tokens.push(token(TokenKind::Field, content));
        if scanner.peek().is_none() {
            tokens.push(token(TokenKind::EndOfRecord, String::new()));
            break;
        }
    }

    tokens
}

struct RowScanner<'a> {
    chars: Peekable<Chars<'a>>,
    delimiter: char,
    quote: char,
}

impl RowScanner<'_> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn is_blank(&self, ch: char) -> bool {
        ch != self.delimiter && matches!(ch, ' ' | '\t')
    }

    fn skip_blanks(&mut self) {
        while let Some(ch) = self.peek() {
            if !self.is_blank(ch) {
                break;
            }
            self.chars.next();
        }
    }

    fn read_unquoted(&mut self) -> String {
        let mut field = String::new();
        while let Some(ch) = self.peek() {
            if ch == self.delimiter {
                break;
            }
            field.push(ch);
            self.chars.next();
        }
        field.trim().to_string()
    }

    /// Reads a quoted field. The cursor must be on the opening quote.
    ///
    /// An unterminated quote runs to the end of the row. Characters between
    /// the closing quote and the next delimiter are appended, trimmed.
    fn read_quoted(&mut self) -> String {
        self.chars.next();
        let mut field = String::new();

        while let Some(ch) = self.chars.next() {
            if ch != self.quote {
                field.push(ch);
                continue;
            }
            if self.peek() == Some(self.quote) {
                self.chars.next();
                field.push(self.quote);
                continue;
            }
            break;
        }

        let tail = self.read_unquoted();
        field.push_str(&tail);
        field
    }
}
