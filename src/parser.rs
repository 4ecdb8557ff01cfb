//! Turns a token stream from [`crate::scanner`] into a [`Cif`] document.

use crate::document::{Cif, Container, Loop, Packet};
use crate::error::CifError;
use crate::scanner::{self, Scanner, Token, TokenKind};
use crate::value::{List, Numb, Table, Value};
use tracing::instrument;

/// What happens when a recoverable parse error occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Record the error and keep parsing.
    Continue,
    /// Stop parsing immediately.
    Abort,
}

/// Tuning knobs for [`parse`].
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Maximum save-frame nesting depth. `1` (the default) means a save
    /// frame may appear inside a data block but save frames cannot nest
    /// inside each other.
    pub max_frame_depth: u32,
    pub max_line_length: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions { max_frame_depth: 1, max_line_length: 2048 }
    }
}

/// Parses `text` under `options`, invoking `on_error` for every recoverable
/// error encountered. Returns the best-effort document together with every
/// error recorded (including ones `on_error` asked to continue past).
#[instrument(skip(text, options, on_error))]
pub fn parse(
    text: &str,
    options: &ParseOptions,
    on_error: &mut dyn FnMut(&CifError) -> ErrorAction,
) -> (Cif, Vec<CifError>) {
    let mut errors = Vec::new();
    let mut tokens = Vec::new();
    let mut scanner = Scanner::new(text, options.max_line_length);
    loop {
        match scanner.next_token() {
            Ok(tok) => {
                let is_eof = tok.kind == TokenKind::Eof;
                tokens.push(tok);
                if is_eof {
                    break;
                }
            }
            Err(e) => {
                let action = on_error(&e);
                errors.push(e);
                if action == ErrorAction::Abort {
                    tokens.push(Token { kind: TokenKind::Eof, position: scanner_pos_fallback() });
                    break;
                }
                // Scan errors are not locally recoverable without a resync
                // strategy; stop tokenizing but still return what we have.
                tokens.push(Token { kind: TokenKind::Eof, position: scanner_pos_fallback() });
                break;
            }
        }
    }

    let mut p = Parser { tokens, i: 0, options, errors: &mut errors, on_error };
    let cif = p.parse_document();
    (cif, errors)
}

fn scanner_pos_fallback() -> crate::error::Position {
    crate::error::Position::new(0, 0)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    i: usize,
    options: &'a ParseOptions,
    errors: &'a mut Vec<CifError>,
    on_error: &'a mut dyn FnMut(&CifError) -> ErrorAction,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.i].kind
    }

    fn peek_pos(&self) -> crate::error::Position {
        self.tokens[self.i].position
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.i].clone();
        if self.i + 1 < self.tokens.len() {
            self.i += 1;
        }
        tok
    }

    fn report(&mut self, err: CifError) -> ErrorAction {
        let action = (self.on_error)(&err);
        self.errors.push(err);
        action
    }

    fn parse_document(&mut self) -> Cif {
        let mut cif = Cif::new();
        loop {
            match self.peek().clone() {
                TokenKind::Eof => break,
                TokenKind::DataBlockHeading(name) => {
                    self.advance();
                    let block = self.parse_container_body(Container::new_block(name), true, 0);
                    if let Err(e) = cif.push_block(block) {
                        if self.report(e) == ErrorAction::Abort {
                            break;
                        }
                    }
                }
                _ => {
                    // Garbage before the first data block heading: skip it.
                    self.advance();
                }
            }
        }
        cif
    }

    fn parse_container_body(&mut self, mut container: Container, is_block: bool, depth: u32) -> Container {
        loop {
            match self.peek().clone() {
                TokenKind::Eof => break,
                TokenKind::DataBlockHeading(_) => break,
                TokenKind::SaveFrameEnd => {
                    if is_block {
                        if self.report(CifError::Syntax {
                            message: "unmatched save_ terminator".to_string(),
                            position: self.peek_pos(),
                        }) == ErrorAction::Abort
                        {
                            break;
                        }
                        self.advance();
                    } else {
                        self.advance();
                        break;
                    }
                }
                TokenKind::SaveFrameHeading(name) => {
                    self.advance();
                    if !is_block {
                        if self.report(CifError::Syntax {
                            message: "save frames cannot nest".to_string(),
                            position: self.peek_pos(),
                        }) == ErrorAction::Abort
                        {
                            break;
                        }
                        self.skip_to_frame_end();
                        continue;
                    }
                    if depth >= self.options.max_frame_depth {
                        if self.report(CifError::FrameNotAllowed { position: self.peek_pos() }) == ErrorAction::Abort {
                            break;
                        }
                        self.skip_to_frame_end();
                        continue;
                    }
                    let frame = self.parse_container_body(Container::new_frame(name), false, depth + 1);
                    if let Err(e) = container.push_frame(frame, self.options.max_frame_depth.saturating_sub(depth)) {
                        if self.report(e) == ErrorAction::Abort {
                            break;
                        }
                    }
                }
                TokenKind::Loop => {
                    self.advance();
                    if let Some(lp) = self.parse_loop() {
                        container.push_loop(lp);
                    }
                }
                TokenKind::DataName(name) => {
                    self.advance();
                    let value_pos = self.peek_pos();
                    match self.parse_value() {
                        Ok(value) => {
                            if is_reserved_unquoted(&value) {
                                if self.report(CifError::ReservedWord {
                                    word: value_text(&value).unwrap_or_default(),
                                    position: value_pos,
                                }) == ErrorAction::Abort
                                {
                                    break;
                                }
                            }
                            if container.get(&name).is_some() {
                                if self.report(CifError::DuplicateName { name: name.clone(), position: value_pos })
                                    == ErrorAction::Abort
                                {
                                    break;
                                }
                            }
                            if let Err(e) = container.set(&name, value) {
                                if self.report(e) == ErrorAction::Abort {
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            if self.report(e) == ErrorAction::Abort {
                                break;
                            }
                        }
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }
        container
    }

    fn skip_to_frame_end(&mut self) {
        let mut depth = 1u32;
        loop {
            match self.peek().clone() {
                TokenKind::Eof | TokenKind::DataBlockHeading(_) => break,
                TokenKind::SaveFrameHeading(_) => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::SaveFrameEnd => {
                    self.advance();
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn parse_loop(&mut self) -> Option<Loop> {
        let mut columns = Vec::new();
        while let TokenKind::DataName(name) = self.peek().clone() {
            columns.push(name);
            self.advance();
        }
        if columns.is_empty() {
            self.report(CifError::Syntax { message: "loop_ with no columns".to_string(), position: self.peek_pos() });
            return None;
        }
        let mut lp = match Loop::new(columns.clone()) {
            Ok(lp) => lp,
            Err(e) => {
                self.report(e);
                return None;
            }
        };

        loop {
            if !self.is_value_start() {
                break;
            }
            let mut packet = Packet::new();
            for name in &columns {
                if !self.is_value_start() {
                    self.report(CifError::PartialPacket { position: self.peek_pos() });
                    return Some(lp);
                }
                match self.parse_value() {
                    Ok(value) => {
                        if let Err(e) = packet.set(name, value) {
                            self.report(e);
                        }
                    }
                    Err(e) => {
                        self.report(e);
                        return Some(lp);
                    }
                }
            }
            if let Err(e) = lp.push_packet(packet) {
                self.report(e);
            }
        }
        Some(lp)
    }

    fn is_value_start(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Unquoted(_)
                | TokenKind::SingleQuoted(_)
                | TokenKind::DoubleQuoted(_)
                | TokenKind::TextField(_)
                | TokenKind::ListOpen
                | TokenKind::TableOpen
        )
    }

    fn parse_value(&mut self) -> Result<Value, CifError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Unquoted(w) => Ok(unquoted_to_value(w)),
            TokenKind::SingleQuoted(text) | TokenKind::DoubleQuoted(text) | TokenKind::TextField(text) => {
                Ok(Value::Char { text, quoted: true })
            }
            TokenKind::ListOpen => {
                let mut list = List::new();
                loop {
                    match self.peek().clone() {
                        TokenKind::ListClose => {
                            self.advance();
                            break;
                        }
                        TokenKind::Eof => {
                            return Err(CifError::Syntax {
                                message: "unterminated list".to_string(),
                                position: tok.position,
                            });
                        }
                        _ => list.push(self.parse_value()?),
                    }
                }
                Ok(Value::List(list))
            }
            TokenKind::TableOpen => {
                let mut table = Table::new();
                loop {
                    match self.peek().clone() {
                        TokenKind::TableClose => {
                            self.advance();
                            break;
                        }
                        TokenKind::Eof => {
                            return Err(CifError::Syntax {
                                message: "unterminated table".to_string(),
                                position: tok.position,
                            });
                        }
                        // CIF2 table key: a delimited string immediately followed by `:`.
                        TokenKind::SingleQuoted(key) | TokenKind::DoubleQuoted(key) => {
                            let key_pos = self.peek_pos();
                            self.advance();
                            if !matches!(self.peek(), TokenKind::Colon) {
                                return Err(CifError::MisquotedKey { position: key_pos });
                            }
                            self.advance();
                            let value = self.parse_value()?;
                            table.insert(&key, value)?;
                        }
                        TokenKind::TextField(_) => {
                            return Err(CifError::MisquotedKey { position: self.peek_pos() });
                        }
                        TokenKind::Colon => {
                            return Err(CifError::MissingKey { position: self.peek_pos() });
                        }
                        // A bare or tag-shaped word in key position is unquoted, not a
                        // legal CIF2 table key, regardless of what follows it.
                        TokenKind::Unquoted(word) | TokenKind::DataName(word) => {
                            let key_pos = self.peek_pos();
                            self.advance();
                            if !matches!(self.peek(), TokenKind::Colon) {
                                return Err(CifError::Syntax {
                                    message: "expected table key".to_string(),
                                    position: key_pos,
                                });
                            }
                            if word == "?" || word == "." {
                                return Err(CifError::NullKey { position: key_pos });
                            }
                            return Err(CifError::UnquotedKey { position: key_pos });
                        }
                        _ => {
                            return Err(CifError::Syntax {
                                message: "expected table key".to_string(),
                                position: self.peek_pos(),
                            });
                        }
                    }
                }
                Ok(Value::Table(table))
            }
            other => Err(CifError::Syntax {
                message: format!("expected a value, found {other:?}"),
                position: tok.position,
            }),
        }
    }
}

fn unquoted_to_value(word: String) -> Value {
    if word == "?" {
        return Value::Unknown;
    }
    if word == "." {
        return Value::NotApplicable;
    }
    if let Ok(n) = Numb::parse(&word) {
        return Value::Numb(n);
    }
    Value::Char { text: word, quoted: false }
}

fn is_reserved_unquoted(value: &Value) -> bool {
    match value {
        Value::Char { text, quoted: false } => scanner::is_reserved_word(text),
        _ => false,
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Char { text, .. } => Some(text.clone()),
        _ => None,
    }
}

/// Parses a complete CIF document from a UTF-8 string, collecting every
/// error rather than stopping at the first one.
pub fn parse_str(text: &str) -> (Cif, Vec<CifError>) {
    parse(text, &ParseOptions::default(), &mut |_| ErrorAction::Continue)
}

/// Parses a complete CIF document from raw bytes, decoding with
/// [`scanner::Utf8Decoder`] first.
pub fn parse_bytes(bytes: &[u8]) -> Result<(Cif, Vec<CifError>), CifError> {
    use crate::scanner::ByteDecoder;
    let (text, _encoding) = scanner::Utf8Decoder.decode(bytes)?;
    Ok(parse_str(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_block() {
        let (cif, errors) = parse_str("data_example\n_cell.length_a 10.0\n_name 'hi there'\n");
        assert!(errors.is_empty(), "{errors:?}");
        let block = cif.get_block("example").unwrap();
        assert_eq!(block.get_f64("_cell.length_a"), Some(10.0));
        assert_eq!(block.get_str("_name"), Some("hi there"));
    }

    #[test]
    fn parses_loop_with_packets() {
        let (cif, errors) = parse_str("data_x\nloop_\n_atom.id\n_atom.x\nC1 0.1\nC2 0.2\n");
        assert!(errors.is_empty(), "{errors:?}");
        let block = cif.get_block("x").unwrap();
        assert_eq!(block.loops().len(), 1);
        assert_eq!(block.loops()[0].packets().len(), 2);
    }

    #[test]
    fn partial_packet_is_reported() {
        let (_cif, errors) = parse_str("data_x\nloop_\n_a\n_b\n1\n");
        assert!(errors.iter().any(|e| matches!(e, CifError::PartialPacket { .. })));
    }

    #[test]
    fn save_frame_is_parsed_under_a_block() {
        let (cif, errors) = parse_str("data_x\nsave_frame1\n_a 1\nsave_\n");
        assert!(errors.is_empty(), "{errors:?}");
        let block = cif.get_block("x").unwrap();
        assert_eq!(block.frames().len(), 1);
        assert_eq!(block.frames()[0].get_f64("_a"), Some(1.0));
    }

    #[test]
    fn nested_save_frames_are_rejected_by_default() {
        let (_cif, errors) = parse_str("data_x\nsave_a\nsave_b\n_z 1\nsave_\nsave_\n");
        assert!(errors.iter().any(|e| matches!(e, CifError::Syntax { .. })));
    }

    #[test]
    fn quoted_values_never_become_numb() {
        let (cif, _errors) = parse_str("data_x\n_n '42'\n");
        let block = cif.get_block("x").unwrap();
        assert!(matches!(block.get("_n"), Some(Value::Char { quoted: true, .. })));
    }

    #[test]
    fn parses_inline_table_with_quoted_key() {
        let (cif, errors) = parse_str("data_x\n_t {'a': 1 'b': 2}\n");
        assert!(errors.is_empty(), "{errors:?}");
        let block = cif.get_block("x").unwrap();
        let Some(Value::Table(t)) = block.get("_t") else { panic!("expected a table") };
        assert_eq!(t.get("a").and_then(Value::as_f64), Some(1.0));
        assert_eq!(t.get("b").and_then(Value::as_f64), Some(2.0));
    }

    #[test]
    fn unquoted_table_key_is_rejected() {
        let (_cif, errors) = parse_str("data_x\n_t { _bare_key : 1 }\n");
        assert!(errors.iter().any(|e| matches!(e, CifError::UnquotedKey { .. })));
    }
}
