//! Token and row types shared by the tokenizer, file processor and engine.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

/// Literal column-0 value used by header rows.
pub const HEADER_KEY: &str = "key";

/// Whether a token closes its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Field,
    EndOfRecord,
}

/// One field of a row, annotated with where it was read from.
///
/// Equality only considers `kind` and `content`; the source location is
/// presentation metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub content: String,
    pub source_file: Arc<Path>,
    /// 1-based line the row starts on.
    pub source_line: usize,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        content: impl Into<String>,
        source_file: Arc<Path>,
        source_line: usize,
    ) -> Self {
        Self {
            kind,
            content: content.into(),
            source_file,
            source_line,
        }
    }

    pub fn is_end_of_record(&self) -> bool {
        self.kind == TokenKind::EndOfRecord
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.content == other.content
    }
}

impl Eq for Token {}

impl std::hash::Hash for Token {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.content.hash(state);
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// The tokens of one logical row of a file.
#[derive(Debug, Clone)]
pub struct TokenizedRow {
    pub file_name: Arc<Path>,
    /// Zero-based position among the file's non-blank logical rows.
    pub row_index: usize,
    pub tokens: Vec<Token>,
}

impl TokenizedRow {
    /// Returns the `(key, value)` pair this row contributes to the lookup
    /// table, if any.
    ///
    /// Rows with fewer than two columns, an empty key or value, or a header
    /// key are skipped.
    pub fn entry(&self) -> Option<(&str, &Token)> {
        let [key, value, ..] = self.tokens.as_slice() else {
            return None;
        };
        if key.content.is_empty() || value.content.is_empty() {
            return None;
        }
        if key.content.eq_ignore_ascii_case(HEADER_KEY) {
            return None;
        }
        Some((key.content.as_str(), value))
    }

    /// Content of the token at `column`, if present.
    pub fn column(&self, column: usize) -> Option<&str> {
        self.tokens.get(column).map(Token::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(contents: &[&str]) -> TokenizedRow {
        let file: Arc<Path> = Arc::from(Path::new("strings.csv"));
        let last = contents.len().saturating_sub(1);
        let tokens = contents
            .iter()
            .enumerate()
            .map(|(index, content)| {
                let kind = if index == last {
                    TokenKind::EndOfRecord
                } else {
                    TokenKind::Field
                };
                Token::new(kind, *content, file.clone(), 3)
            })
            .collect();
        TokenizedRow {
            file_name: file,
            row_index: 0,
            tokens,
        }
    }

    #[test]
    fn equality_ignores_source_location() {
        let a = Token::new(TokenKind::Field, "x", Arc::from(Path::new("a.csv")), 1);
        let b = Token::new(TokenKind::Field, "x", Arc::from(Path::new("b.csv")), 9);
        let c = Token::new(TokenKind::EndOfRecord, "x", Arc::from(Path::new("a.csv")), 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn entry_uses_first_two_columns() {
        let row = row(&["GREETING", "Hello", "comment"]);
        let (key, value) = row.entry().unwrap();
        assert_eq!(key, "GREETING");
        assert_eq!(value.content, "Hello");
        assert_eq!(value.source_line, 3);
    }

    #[test]
    fn entry_skips_header_and_incomplete_rows() {
        assert!(row(&["Key", "Value"]).entry().is_none());
        assert!(row(&["KEY", "Value"]).entry().is_none());
        assert!(row(&["ONLY_KEY"]).entry().is_none());
        assert!(row(&["", "value"]).entry().is_none());
        assert!(row(&["NAME", ""]).entry().is_none());
    }

    #[test]
    fn keys_containing_the_header_word_are_kept() {
        assert!(row(&["KEY_NAME", "Value"]).entry().is_some());
    }
}
