//! Crystallographic Information File (CIF) parser, document model, and writer.
//!
//! A [`document::Cif`] is an ordered sequence of data blocks
//! ([`document::Container`]), each holding plain items, [`document::Loop`]
//! tables, and nested save frames. Values ([`value::Value`]) preserve the
//! exact digit string and quoting they were parsed with rather than
//! normalizing through a lossy intermediate type.
//!
//! ```
//! let (cif, errors) = cif::parser::parse_str("data_example\n_cell.length_a 10.0\n");
//! assert!(errors.is_empty());
//! let block = cif.get_block("example").unwrap();
//! assert_eq!(block.get_f64("_cell.length_a"), Some(10.0));
//! ```

pub mod document;
pub mod error;
pub mod parser;
pub mod scanner;
pub mod value;
pub mod writer;

pub use document::{Cif, Container, Loop, Packet};
pub use error::{CifError, Result};
pub use parser::{parse, parse_bytes, parse_str, ErrorAction, ParseOptions};
pub use value::{List, Numb, Table, Value};
pub use writer::{write, WriteOptions};
