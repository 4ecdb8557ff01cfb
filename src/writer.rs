//! Renders a [`Cif`] document back to CIF text, choosing delimiters and
//! folding long lines the way a CIF2.0 writer is expected to.

use crate::document::{Cif, Container, ContainerKind, Loop};
use crate::error::CifError;
use crate::scanner;
use crate::value::Value;
use std::fmt::Write as _;
use tracing::instrument;

/// Tuning knobs for [`write`].
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub max_line_length: usize,
    /// Prefix written at the start of every continuation line of a
    /// prefix-escaped multi-line value.
    pub fold_prefix: String,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions { max_line_length: 2048, fold_prefix: "> ".to_string() }
    }
}

/// Serializes `cif` to CIF text under `options`.
#[instrument(skip(cif, options))]
pub fn write(cif: &Cif, options: &WriteOptions) -> Result<String, CifError> {
    let mut out = String::new();
    for (i, block) in cif.blocks().iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        write_container(&mut out, block, options)?;
    }
    Ok(out)
}

fn write_container(out: &mut String, container: &Container, options: &WriteOptions) -> Result<(), CifError> {
    let prefix = match container.kind() {
        ContainerKind::Block => "data_",
        ContainerKind::Frame => "save_",
    };
    writeln!(out, "{prefix}{}", container.name()).map_err(fmt_err)?;

    for item in container.items() {
        write!(out, "{} ", item.name()).map_err(fmt_err)?;
        write_value(out, item.value(), options)?;
        out.push('\n');
    }

    for lp in container.loops() {
        write_loop(out, lp, options)?;
    }

    for frame in container.frames() {
        write_container(out, frame, options)?;
    }

    if container.kind() == ContainerKind::Frame {
        out.push_str("save_\n");
    }

    Ok(())
}

fn write_loop(out: &mut String, lp: &Loop, options: &WriteOptions) -> Result<(), CifError> {
    out.push_str("loop_\n");
    for col in lp.columns() {
        writeln!(out, "{col}").map_err(fmt_err)?;
    }
    for packet in lp.packets() {
        for (i, col) in lp.columns().iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let value = packet.get(col).expect("packet matches loop columns");
            write_value(out, value, options)?;
        }
        out.push('\n');
    }
    Ok(())
}

fn write_value(out: &mut String, value: &Value, options: &WriteOptions) -> Result<(), CifError> {
    match value {
        Value::Unknown => out.push('?'),
        Value::NotApplicable => out.push('.'),
        Value::Numb(n) => out.push_str(n.display_text()),
        Value::Char { text, quoted } => write_char(out, text, *quoted, options)?,
        Value::List(list) => {
            out.push('[');
            for (i, v) in list.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(out, v, options)?;
            }
            out.push(']');
        }
        Value::Table(table) => {
            out.push('{');
            for (i, (k, v)) in table.entries().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_table_key(out, k)?;
                out.push(':');
                write_value(out, v, options)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

/// Picks the narrowest delimiter that can represent `text` without ambiguity
/// and without exceeding `options.max_line_length`, then writes it.
fn write_char(out: &mut String, text: &str, quoted: bool, options: &WriteOptions) -> Result<(), CifError> {
    if !quoted && can_write_unquoted(text) && text.chars().count() <= options.max_line_length {
        out.push_str(text);
        return Ok(());
    }

    if !text.contains('\n') && text.chars().count() + 2 <= options.max_line_length {
        if !text.contains('\'') {
            write!(out, "'{text}'").map_err(fmt_err)?;
            return Ok(());
        }
        if !text.contains('"') {
            write!(out, "\"{text}\"").map_err(fmt_err)?;
            return Ok(());
        }
    }

    if !text.contains("'''") {
        write!(out, "'''{text}'''").map_err(fmt_err)?;
        return Ok(());
    }
    if !text.contains("\"\"\"") {
        write!(out, "\"\"\"{text}\"\"\"").map_err(fmt_err)?;
        return Ok(());
    }

    write_text_field(out, text, options)
}

/// Writes a table key as a delimited string followed by a colon, per the
/// CIF2 table-key grammar — unlike a `Char` value, a key is never written
/// bare, since the colon alone would not distinguish it from a plain value.
fn write_table_key(out: &mut String, key: &str) -> Result<(), CifError> {
    if !key.contains('\'') {
        write!(out, "'{key}'").map_err(fmt_err)?;
    } else if !key.contains('"') {
        write!(out, "\"{key}\"").map_err(fmt_err)?;
    } else if !key.contains("'''") {
        write!(out, "'''{key}'''").map_err(fmt_err)?;
    } else {
        write!(out, "\"\"\"{key}\"\"\"").map_err(fmt_err)?;
    }
    Ok(())
}

fn can_write_unquoted(text: &str) -> bool {
    if text.is_empty() || text == "?" || text == "." {
        return false;
    }
    if scanner::is_reserved_word(text) {
        return false;
    }
    if text.starts_with(['_', '\'', '"', '#', '$', '[', ']', '{', '}', ';']) {
        return false;
    }
    !text.chars().any(|c| c.is_whitespace() || c.is_control())
}

/// Writes `text` as a `;`-delimited text field, folding any physical line
/// that would exceed `options.max_line_length` using the `;\`-continuation
/// protocol and prefix-escaping any embedded line that starts with `;`.
fn write_text_field(out: &mut String, text: &str, options: &WriteOptions) -> Result<(), CifError> {
    // The opening `;` must be the first character on its line, regardless of
    // whatever (e.g. a trailing "name " separator) precedes this call.
    out.push_str("\n;\n");
    for line in text.split('\n') {
        write_folded_line(out, line, options)?;
        out.push('\n');
    }
    out.push(';');
    Ok(())
}

fn write_folded_line(out: &mut String, line: &str, options: &WriteOptions) -> Result<(), CifError> {
    let needs_prefix = line.starts_with(';') || line.starts_with(&options.fold_prefix);
    let effective_prefix = if needs_prefix { options.fold_prefix.as_str() } else { "" };

    let chars: Vec<char> = line.chars().collect();
    let budget = options.max_line_length.saturating_sub(effective_prefix.chars().count());
    if chars.len() <= budget.max(1) {
        out.push_str(effective_prefix);
        out.push_str(line);
        return Ok(());
    }

    let mut start = 0;
    while start < chars.len() {
        let remaining = chars.len() - start;
        // Reserve one column for the trailing fold backslash on all but the last segment.
        let take = remaining.min(budget.saturating_sub(1).max(1));
        let mut end = start + take;
        // Never split a surrogate pair (UTF-16 concept; in Rust `char`s are
        // already whole scalar values, but keep the boundary away from a
        // combining mark to avoid visually corrupting the fold point).
        while end < chars.len() && is_combining(chars[end]) && end > start {
            end -= 1;
        }
        let is_last = end >= chars.len();
        out.push_str(effective_prefix);
        out.extend(&chars[start..end]);
        if !is_last {
            out.push('\\');
            out.push('\n');
        }
        start = end;
    }
    Ok(())
}

fn is_combining(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF)
}

fn fmt_err(e: std::fmt::Error) -> CifError {
    CifError::Syntax { message: e.to_string(), position: crate::error::Position::new(0, 0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Container;

    #[test]
    fn writes_plain_item() {
        let mut block = Container::new_block("x");
        block.set("_a", Value::text("hello")).unwrap();
        let mut cif = Cif::new();
        cif.push_block(block).unwrap();
        let text = write(&cif, &WriteOptions::default()).unwrap();
        assert_eq!(text, "data_x\n_a hello\n");
    }

    #[test]
    fn quotes_values_containing_whitespace() {
        let mut block = Container::new_block("x");
        block.set("_a", Value::text("hello world")).unwrap();
        let mut cif = Cif::new();
        cif.push_block(block).unwrap();
        let text = write(&cif, &WriteOptions::default()).unwrap();
        assert_eq!(text, "data_x\n_a 'hello world'\n");
    }

    #[test]
    fn uses_text_field_for_multiline_values() {
        let mut block = Container::new_block("x");
        block.set("_a", Value::text("line one\nline two")).unwrap();
        let mut cif = Cif::new();
        cif.push_block(block).unwrap();
        let text = write(&cif, &WriteOptions::default()).unwrap();
        assert_eq!(text, "data_x\n_a \n;\nline one\nline two\n;\n");
    }

    #[test]
    fn writes_table_values_with_colon_delimited_keys() {
        let mut block = Container::new_block("x");
        let mut table = crate::value::Table::new();
        table.insert("a", Value::number("1").unwrap()).unwrap();
        block.set("_t", Value::Table(table)).unwrap();
        let mut cif = Cif::new();
        cif.push_block(block).unwrap();
        let text = write(&cif, &WriteOptions::default()).unwrap();
        assert_eq!(text, "data_x\n_t {'a':1}\n");

        let (reparsed, errors) = crate::parser::parse_str(&text);
        assert!(errors.is_empty(), "{errors:?}");
        let block = reparsed.get_block("x").unwrap();
        assert!(matches!(block.get("_t"), Some(Value::Table(_))));
    }

    #[test]
    fn falls_back_to_triple_quotes_when_both_simple_delimiters_collide() {
        let mut block = Container::new_block("x");
        block.set("_a", Value::text("has 'single' and \"double\" quotes")).unwrap();
        let mut cif = Cif::new();
        cif.push_block(block).unwrap();
        let text = write(&cif, &WriteOptions::default()).unwrap();
        assert!(text.contains("'''has 'single' and \"double\" quotes'''"));

        let (reparsed, errors) = crate::parser::parse_str(&text);
        assert!(errors.is_empty(), "{errors:?}");
        let block = reparsed.get_block("x").unwrap();
        assert_eq!(block.get_str("_a"), Some("has 'single' and \"double\" quotes"));
    }

    #[test]
    fn round_trips_through_parser() {
        let mut block = Container::new_block("x");
        block.set("_a", Value::text("hello world")).unwrap();
        let mut cif = Cif::new();
        cif.push_block(block).unwrap();
        let text = write(&cif, &WriteOptions::default()).unwrap();
        let (parsed, errors) = crate::parser::parse_str(&text);
        assert!(errors.is_empty());
        assert_eq!(parsed.get_block("x").unwrap().get_str("_a"), Some("hello world"));
    }
}
