//! Error types shared across the scanner, parser, document model, and writer.
//!
//! Mirrors the manual `enum` + hand-written `Display`/`Error` impls used
//! throughout this crate rather than pulling in a derive-macro error crate.

use std::fmt;

/// A 1-based line/column position in the original CIF source text.
///
/// Columns count Unicode scalar values, not bytes, so the position lines up
/// with what a text editor would show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The error type for every fallible operation in this crate.
///
/// New variants may be added in a minor release, so callers should not
/// exhaustively match on this enum without a wildcard arm.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum CifError {
    /// A value's digit string or su digit string contains a malformed `NUMB` token.
    InvalidNumber { text: String, position: Option<Position> },
    /// A data name failed normalization: invalid codepoint, whitespace, or control char.
    InvalidName { name: String, position: Option<Position> },
    /// A save frame nests deeper than `ParseOptions::max_frame_depth` allows.
    FrameNotAllowed { position: Position },
    /// The same data name was set twice in the same packet.
    DuplicateName { name: String, position: Position },
    /// A loop packet does not have a value for every column.
    PartialPacket { position: Position },
    /// A reserved word was used where a data value was expected.
    ReservedWord { word: String, position: Position },
    /// The input byte stream could not be decoded under any recognized CIF encoding.
    EncodingError { detail: String },
    /// A scanner- or parser-level syntax error that does not fit a more specific variant.
    Syntax { message: String, position: Position },
    /// An index passed to a `List`/`Table`/`Loop` accessor was out of bounds.
    IndexOutOfBounds { index: usize, len: usize },
    /// A `Value::serialize` buffer was truncated, malformed, or carried an
    /// unrecognized kind tag.
    InvalidSerialization(String),
    /// A CIF2 inline table key was missing, unquoted, null, or malformed.
    UnquotedKey { position: Position },
    MissingKey { position: Position },
    NullKey { position: Position },
    MisquotedKey { position: Position },
    /// An I/O failure while reading or writing CIF text.
    Io(String),
}

impl fmt::Display for CifError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CifError::InvalidNumber { text, position } => {
                write!(f, "invalid number '{text}'")?;
                write_position(f, position.as_ref())
            }
            CifError::InvalidName { name, position } => {
                write!(f, "invalid data name '{name}'")?;
                write_position(f, position.as_ref())
            }
            CifError::FrameNotAllowed { position } => {
                write!(f, "save frame nesting exceeds the configured maximum at {position}")
            }
            CifError::DuplicateName { name, position } => {
                write!(f, "duplicate name '{name}' in packet at {position}")
            }
            CifError::PartialPacket { position } => {
                write!(f, "loop packet is missing a value for a declared column at {position}")
            }
            CifError::ReservedWord { word, position } => {
                write!(f, "reserved word '{word}' used as a value at {position}")
            }
            CifError::EncodingError { detail } => write!(f, "encoding error: {detail}"),
            CifError::Syntax { message, position } => write!(f, "{message} at {position}"),
            CifError::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds (len {len})")
            }
            CifError::InvalidSerialization(detail) => write!(f, "invalid serialized value: {detail}"),
            CifError::UnquotedKey { position } => write!(f, "table key must be quoted at {position}"),
            CifError::MissingKey { position } => write!(f, "missing table key at {position}"),
            CifError::NullKey { position } => write!(f, "table key cannot be '?' or '.' at {position}"),
            CifError::MisquotedKey { position } => write!(f, "malformed table key at {position}"),
            CifError::Io(detail) => write!(f, "I/O error: {detail}"),
        }
    }
}

impl std::error::Error for CifError {}

impl From<std::io::Error> for CifError {
    fn from(e: std::io::Error) -> Self {
        CifError::Io(e.to_string())
    }
}

fn write_position(f: &mut fmt::Formatter<'_>, position: Option<&Position>) -> fmt::Result {
    match position {
        Some(p) => write!(f, " at {p}"),
        None => Ok(()),
    }
}

pub type Result<T, E = CifError> = std::result::Result<T, E>;
