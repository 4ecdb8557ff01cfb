//! Lexical scanning: byte decoding, encoding detection, and tokenization of
//! CIF source text.

use crate::error::{CifError, Position};
use tracing::instrument;

/// The text encoding a [`Scanner`] detected (or was told to assume) for a
/// CIF source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf8WithBom,
}

/// Decodes raw bytes into a `String`, given a chance to sniff a byte-order
/// mark or other encoding signature before falling back to a caller-supplied
/// default.
///
/// A real deployment might plug in a decoder that also handles legacy
/// Latin-1 CIF1.1 files; the default here only needs UTF-8, which covers
/// both CIF1.1 (7-bit ASCII is valid UTF-8) and CIF2.0.
pub trait ByteDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<(String, Encoding), CifError>;
}

/// The standard decoder: detects a UTF-8 BOM, otherwise decodes as plain UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Decoder;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
const CIF2_MAGIC: &str = "#\\#CIF_2.0";

impl ByteDecoder for Utf8Decoder {
    #[instrument(skip(self, bytes))]
    fn decode(&self, bytes: &[u8]) -> Result<(String, Encoding), CifError> {
        let (body, encoding) = if bytes.starts_with(&UTF8_BOM) {
            (&bytes[UTF8_BOM.len()..], Encoding::Utf8WithBom)
        } else {
            (bytes, Encoding::Utf8)
        };
        let text = std::str::from_utf8(body)
            .map_err(|e| CifError::EncodingError { detail: e.to_string() })?
            .to_string();
        Ok((text, encoding))
    }
}

/// Which CIF version's magic heading, if any, the source declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CifVersion {
    V1_1,
    V2_0,
}

/// Inspects the start of decoded text for the CIF2.0 magic code
/// (`#\#CIF_2.0`); anything else is treated as CIF1.1.
pub fn detect_version(text: &str) -> CifVersion {
    if text.starts_with(CIF2_MAGIC) {
        CifVersion::V2_0
    } else {
        CifVersion::V1_1
    }
}

/// A lexical token produced by the [`Scanner`], tagged with the source
/// position of its first character.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    DataBlockHeading(String),
    SaveFrameHeading(String),
    SaveFrameEnd,
    Loop,
    StopKeyword,
    GlobalKeyword,
    DataName(String),
    Unquoted(String),
    SingleQuoted(String),
    DoubleQuoted(String),
    TextField(String),
    ListOpen,
    ListClose,
    TableOpen,
    TableClose,
    Colon,
    Eof,
}

const RESERVED_WORDS: &[&str] = &["loop_", "stop_", "global_"];

/// Scans decoded CIF text into a flat token stream.
///
/// The scanner is line-oriented: most token classes are recognized within a
/// single logical line, with the text-field (`;`-delimited) and line-folded
/// forms being the exceptions that span multiple physical lines.
pub struct Scanner<'a> {
    text: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: u32,
    column: u32,
    max_line_length: usize,
    current_line_len: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(text: &'a str, max_line_length: usize) -> Self {
        Scanner {
            text,
            chars: text.char_indices().peekable(),
            line: 1,
            column: 1,
            max_line_length,
            current_line_len: 0,
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    /// The unconsumed remainder of the source, for lookahead past a single
    /// character (triple-quote delimiter detection).
    fn remaining(&mut self) -> &'a str {
        let offset = self.chars.peek().map(|&(i, _)| i).unwrap_or(self.text.len());
        &self.text[offset..]
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
            self.current_line_len = 0;
        } else {
            self.column += 1;
            self.current_line_len += 1;
        }
        Some(c)
    }

    fn pos(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c == ' ' || c == '\t' || c == '\r' || c == '\n' => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn check_line_length(&self, start: Position) -> Result<(), CifError> {
        if self.current_line_len > self.max_line_length {
            return Err(CifError::Syntax {
                message: format!("line exceeds maximum length of {}", self.max_line_length),
                position: start,
            });
        }
        Ok(())
    }

    /// Scans a `;`-delimited text field starting right after the opening
    /// `;` at column 1. Consumes through the closing `;` at column 1.
    fn scan_text_field(&mut self) -> Result<String, CifError> {
        let mut out = String::new();
        loop {
            let line_start = self.pos();
            if line_start.column == 1 {
                if self.peek_char() == Some(';') {
                    self.bump();
                    return Ok(out);
                }
            }
            match self.bump() {
                None => {
                    return Err(CifError::Syntax {
                        message: "unterminated text field".to_string(),
                        position: line_start,
                    });
                }
                Some('\n') => out.push('\n'),
                Some(c) => out.push(c),
            }
        }
    }

    fn scan_quoted(&mut self, quote: char) -> Result<String, CifError> {
        let start = self.pos();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(CifError::Syntax { message: "unterminated quoted string".to_string(), position: start });
                }
                Some(c) if c == quote => {
                    // A closing quote must be followed by whitespace or EOF;
                    // otherwise it's a literal quote character inside the value.
                    match self.peek_char() {
                        None => return Ok(out),
                        Some(n) if n.is_whitespace() => return Ok(out),
                        Some(_) => out.push(c),
                    }
                }
                Some('\n') => {
                    return Err(CifError::Syntax { message: "quoted string cannot span lines".to_string(), position: start });
                }
                Some(c) => out.push(c),
            }
        }
    }

    /// Scans a triple-apostrophe or triple-quote delimited string, which
    /// (unlike [`Scanner::scan_quoted`]) may span multiple physical lines.
    /// Called with the opening three delimiter characters already consumed.
    fn scan_triple(&mut self, quote: char) -> Result<String, CifError> {
        let start = self.pos();
        let mut out = String::new();
        loop {
            let mut rest = self.remaining().chars();
            if rest.next() == Some(quote) && rest.next() == Some(quote) && rest.next() == Some(quote) {
                self.bump();
                self.bump();
                self.bump();
                return Ok(out);
            }
            match self.bump() {
                None => {
                    return Err(CifError::Syntax {
                        message: "unterminated triple-quoted string".to_string(),
                        position: start,
                    });
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn scan_bare(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    /// Returns the next token, or a `TokenKind::Eof` token once the input is exhausted.
    #[instrument(skip(self))]
    pub fn next_token(&mut self) -> Result<Token, CifError> {
        self.skip_whitespace_and_comments();
        let start = self.pos();

        if self.column == 1 && self.peek_char() == Some(';') {
            self.bump();
            let text = self.scan_text_field()?;
            return Ok(Token { kind: TokenKind::TextField(text), position: start });
        }

        let Some(c) = self.peek_char() else {
            return Ok(Token { kind: TokenKind::Eof, position: start });
        };

        let kind = match c {
            '\'' if self.remaining().starts_with("'''") => {
                self.bump();
                self.bump();
                self.bump();
                TokenKind::SingleQuoted(self.scan_triple('\'')?)
            }
            '\'' => {
                self.bump();
                TokenKind::SingleQuoted(self.scan_quoted('\'')?)
            }
            '"' if self.remaining().starts_with("\"\"\"") => {
                self.bump();
                self.bump();
                self.bump();
                TokenKind::DoubleQuoted(self.scan_triple('"')?)
            }
            '"' => {
                self.bump();
                TokenKind::DoubleQuoted(self.scan_quoted('"')?)
            }
            '[' => {
                self.bump();
                TokenKind::ListOpen
            }
            ']' => {
                self.bump();
                TokenKind::ListClose
            }
            '{' => {
                self.bump();
                TokenKind::TableOpen
            }
            '}' => {
                self.bump();
                TokenKind::TableClose
            }
            ':' => {
                self.bump();
                TokenKind::Colon
            }
            _ => {
                let word = self.scan_bare();
                classify_bare(word, start)?
            }
        };

        self.check_line_length(start)?;
        Ok(Token { kind, position: start })
    }
}

fn classify_bare(word: String, position: Position) -> Result<TokenKind, CifError> {
    let lower = word.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix("data_") {
        if rest.is_empty() {
            return Err(CifError::Syntax { message: "empty data block name".to_string(), position });
        }
        return Ok(TokenKind::DataBlockHeading(word[5..].to_string()));
    }
    if let Some(rest) = lower.strip_prefix("save_") {
        if rest.is_empty() {
            return Ok(TokenKind::SaveFrameEnd);
        }
        return Ok(TokenKind::SaveFrameHeading(word[5..].to_string()));
    }
    if lower == "loop_" {
        return Ok(TokenKind::Loop);
    }
    if lower == "stop_" {
        return Ok(TokenKind::StopKeyword);
    }
    if lower == "global_" {
        return Ok(TokenKind::GlobalKeyword);
    }
    if word.starts_with('_') {
        return Ok(TokenKind::DataName(word));
    }
    Ok(TokenKind::Unquoted(word))
}

/// Returns `true` if `word` (case-insensitively) is one of CIF's reserved
/// structural keywords and therefore cannot be used unquoted as a value.
pub fn is_reserved_word(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    RESERVED_WORDS.contains(&lower.as_str())
        || lower.starts_with("data_")
        || lower.starts_with("save_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<TokenKind> {
        let mut s = Scanner::new(text, 2048);
        let mut out = Vec::new();
        loop {
            let t = s.next_token().unwrap();
            let done = t.kind == TokenKind::Eof;
            out.push(t.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn scans_block_heading_and_item() {
        let toks = tokens("data_example\n_cell.length_a 10.0\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::DataBlockHeading("example".to_string()),
                TokenKind::DataName("_cell.length_a".to_string()),
                TokenKind::Unquoted("10.0".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scans_quoted_value_allowing_embedded_quote() {
        let toks = tokens("_name 'it''s here'\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::DataName("_name".to_string()),
                TokenKind::SingleQuoted("it''s here".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scans_text_field() {
        let toks = tokens("_desc\n;line one\nline two\n;\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::DataName("_desc".to_string()),
                TokenKind::TextField("line one\nline two\n".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn detects_cif2_magic() {
        assert_eq!(detect_version("#\\#CIF_2.0\ndata_x"), CifVersion::V2_0);
        assert_eq!(detect_version("data_x"), CifVersion::V1_1);
    }

    #[test]
    fn reserved_words_are_rejected_as_values() {
        assert!(is_reserved_word("loop_"));
        assert!(is_reserved_word("data_foo"));
        assert!(!is_reserved_word("ordinary"));
    }

    #[test]
    fn scans_table_key_colon() {
        let toks = tokens("{'k': 1}");
        assert_eq!(
            toks,
            vec![
                TokenKind::TableOpen,
                TokenKind::SingleQuoted("k".to_string()),
                TokenKind::Colon,
                TokenKind::Unquoted("1".to_string()),
                TokenKind::TableClose,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scans_triple_quoted_strings_with_embedded_newlines_and_single_quotes() {
        let toks = tokens("'''it's a\nmultiline value'''");
        assert_eq!(
            toks,
            vec![TokenKind::SingleQuoted("it's a\nmultiline value".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn scans_triple_double_quoted_strings() {
        let toks = tokens("\"\"\"has \"\" inside\"\"\"");
        assert_eq!(toks, vec![TokenKind::DoubleQuoted("has \"\" inside".to_string()), TokenKind::Eof]);
    }
}
