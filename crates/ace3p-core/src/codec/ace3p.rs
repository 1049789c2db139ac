//! Codec for the nested `key : value { ... }` ACE3P input format.
//!
//! Parsing is a single left-to-right scan with a three-way state flag
//! (`key` / `value` / `comment`); nested blocks are handled by locating the
//! matching close brace and recursing over the enclosed span. Serialization
//! is a dedicated recursive writer, so scalar values (commas included) are
//! emitted verbatim rather than passing through any intermediate generic
//! rendering.

use super::document::{DocValue, Document};
use crate::domain::{Ace3pError, Ace3pResult};

enum ScanState {
    Key,
    Value(String),
    Comment,
}

/// Parses the full text of an ACE3P-format input file.
pub fn parse(text: &str) -> Ace3pResult<Document> {
    parse_span(text)
}

fn parse_span(text: &str) -> Ace3pResult<Document> {
    let bytes = text.as_bytes();
    let mut document = Document::new();
    let mut state = ScanState::Key;
    let mut span_start = 0_usize;
    let mut index = 0_usize;

    while index < bytes.len() {
        state = match state {
            ScanState::Key => match bytes[index] {
                b':' => {
                    let key = text[span_start..index].trim();
                    if key.is_empty() {
                        return Err(Ace3pError::malformed_document(
                            "PARSE.ACE3P_EMPTY_KEY",
                            "':' with no key text before it",
                        ));
                    }
                    span_start = index + 1;
                    index += 1;
                    ScanState::Value(key.to_string())
                }
                b'/' if bytes.get(index + 1) == Some(&b'/')
                    && text[span_start..index].trim().is_empty() =>
                {
                    // Full-line comment between entries.
                    index += 2;
                    ScanState::Comment
                }
                b'}' => {
                    return Err(Ace3pError::malformed_document(
                        "PARSE.ACE3P_BRACE",
                        "'}' without a matching '{'",
                    ));
                }
                _ => {
                    index += 1;
                    ScanState::Key
                }
            },
            ScanState::Value(key) => match bytes[index] {
                b'\n' => {
                    let value = text[span_start..index].trim().to_string();
                    document.push_parsed(key, DocValue::Scalar(value))?;
                    span_start = index + 1;
                    index += 1;
                    ScanState::Key
                }
                b'/' if bytes.get(index + 1) == Some(&b'/') => {
                    let value = text[span_start..index].trim().to_string();
                    document.push_parsed(key, DocValue::Scalar(value))?;
                    index += 2;
                    ScanState::Comment
                }
                b'{' => {
                    let close = matching_brace(bytes, index)?;
                    let block = parse_span(&text[index + 1..close])?;
                    document.push_parsed(key, DocValue::Block(block))?;
                    span_start = close + 1;
                    index = close + 1;
                    ScanState::Key
                }
                _ => {
                    index += 1;
                    ScanState::Value(key)
                }
            },
            ScanState::Comment => {
                if bytes[index] == b'\n' {
                    span_start = index + 1;
                    index += 1;
                    ScanState::Key
                } else {
                    index += 1;
                    ScanState::Comment
                }
            }
        };
    }

    // A final entry is allowed to end at EOF instead of a newline.
    if let ScanState::Value(key) = state {
        let value = text[span_start..].trim().to_string();
        document.push_parsed(key, DocValue::Scalar(value))?;
    }

    Ok(document)
}

fn matching_brace(bytes: &[u8], open_index: usize) -> Ace3pResult<usize> {
    let mut depth = 1_usize;
    for (offset, byte) in bytes.iter().enumerate().skip(open_index + 1) {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(offset);
                }
            }
            _ => {}
        }
    }
    Err(Ace3pError::malformed_document(
        "PARSE.ACE3P_BRACE",
        "'{' without a matching '}'",
    ))
}

/// Serializes a document back to ACE3P text, two-space indent per nesting
/// level. Duplicate-sibling disambiguation tags are re-emitted as the first
/// field of their block.
pub fn serialize(document: &Document) -> String {
    let mut out = String::new();
    write_block(document, 0, &mut out);
    out
}

fn write_block(document: &Document, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    for entry in document.entries() {
        match &entry.value {
            DocValue::Scalar(value) => {
                out.push_str(&indent);
                out.push_str(&entry.key);
                out.push_str(" : ");
                out.push_str(value);
                out.push('\n');
            }
            DocValue::Block(block) => {
                out.push_str(&indent);
                out.push_str(&entry.key);
                out.push_str(" : {\n");
                if let Some(tag) = &entry.tag {
                    out.push_str(&indent);
                    out.push_str("  ");
                    out.push_str(tag.kind.as_str());
                    out.push_str(" : ");
                    out.push_str(&tag.value);
                    out.push('\n');
                }
                write_block(block, depth + 1, out);
                out.push_str(&indent);
                out.push_str("}\n");
            }
        }
    }
}
