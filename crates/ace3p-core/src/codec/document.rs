//! Owned tree model for ACE3P-format documents.
//!
//! The original tooling threaded mutable nested dictionaries through
//! recursive functions; here the parsed document is an explicit tree of
//! owned nodes with indexed child access, and duplicate-sibling
//! disambiguation tags are held out-of-band instead of being rewritten into
//! synthetic keys.

use crate::domain::{Ace3pError, Ace3pResult};

/// Embedded field names that disambiguate duplicate sibling keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Attribute,
    ReferenceNumber,
}

impl TagKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Attribute => "Attribute",
            Self::ReferenceNumber => "ReferenceNumber",
        }
    }
}

/// Disambiguation tag extracted from a duplicate sibling's own block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisambiguationTag {
    pub kind: TagKind,
    pub value: String,
}

/// A scalar or nested-block value.
#[derive(Debug, Clone, PartialEq)]
pub enum DocValue {
    Scalar(String),
    Block(Document),
}

impl DocValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Block(_) => None,
        }
    }

    pub fn as_block(&self) -> Option<&Document> {
        match self {
            Self::Scalar(_) => None,
            Self::Block(document) => Some(document),
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut Document> {
        match self {
            Self::Scalar(_) => None,
            Self::Block(document) => Some(document),
        }
    }
}

/// One `key : value` entry. `tag` is set only for duplicate siblings whose
/// identity came from an embedded `Attribute`/`ReferenceNumber` field.
#[derive(Debug, Clone, PartialEq)]
pub struct DocEntry {
    pub key: String,
    pub tag: Option<DisambiguationTag>,
    pub value: DocValue,
}

/// Recursively nested ordered mapping parsed from an ACE3P-format file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    entries: Vec<DocEntry>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DocEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [DocEntry] {
        &mut self.entries
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|entry| entry.key == key)
    }

    /// First entry under `key`, regardless of tag.
    pub fn get(&self, key: &str) -> Option<&DocValue> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut DocValue> {
        self.entries
            .iter_mut()
            .find(|entry| entry.key == key)
            .map(|entry| &mut entry.value)
    }

    /// Consumes the document, yielding its entries in order.
    pub fn into_entries(self) -> Vec<DocEntry> {
        self.entries
    }

    /// Duplicate-aware lookup by key and disambiguation-tag value.
    pub fn get_tagged(&self, key: &str, tag_value: &str) -> Option<&DocValue> {
        self.entries
            .iter()
            .find(|entry| {
                entry.key == key
                    && entry
                        .tag
                        .as_ref()
                        .is_some_and(|tag| tag.value == tag_value)
            })
            .map(|entry| &entry.value)
    }

    pub fn get_tagged_mut(&mut self, key: &str, tag_value: &str) -> Option<&mut DocValue> {
        self.entries
            .iter_mut()
            .find(|entry| {
                entry.key == key
                    && entry
                        .tag
                        .as_ref()
                        .is_some_and(|tag| tag.value == tag_value)
            })
            .map(|entry| &mut entry.value)
    }

    pub fn scalar(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(DocValue::as_scalar)
    }

    pub fn block(&self, key: &str) -> Option<&Document> {
        self.get(key).and_then(DocValue::as_block)
    }

    pub fn block_mut(&mut self, key: &str) -> Option<&mut Document> {
        self.get_mut(key).and_then(DocValue::as_block_mut)
    }

    /// Overwrites the first entry under `key` if present, otherwise appends.
    pub fn set_scalar(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = DocValue::Scalar(value.into());
        match self.get_mut(&key) {
            Some(existing) => *existing = value,
            None => self.entries.push(DocEntry {
                key,
                tag: None,
                value,
            }),
        }
    }

    pub fn insert_block(&mut self, key: impl Into<String>, block: Document) {
        self.entries.push(DocEntry {
            key: key.into(),
            tag: None,
            value: DocValue::Block(block),
        });
    }

    /// Inserts an entry produced by the parser, applying duplicate-sibling
    /// resolution: a repeated key must be a block carrying an `Attribute` or
    /// `ReferenceNumber` field, which is stripped from the block and kept as
    /// the entry's tag so it cannot reappear as an ordinary field.
    pub fn push_parsed(&mut self, key: String, mut value: DocValue) -> Ace3pResult<()> {
        let tag = if self.contains_key(&key) {
            match &mut value {
                DocValue::Block(block) => Some(block.take_disambiguation_tag().ok_or_else(
                    || {
                        Ace3pError::malformed_document(
                            "PARSE.ACE3P_DUPLICATE_KEY",
                            format!(
                                "duplicate sibling key '{}' has no Attribute or \
                                 ReferenceNumber field to disambiguate it",
                                key
                            ),
                        )
                    },
                )?),
                DocValue::Scalar(_) => {
                    return Err(Ace3pError::malformed_document(
                        "PARSE.ACE3P_DUPLICATE_KEY",
                        format!("duplicate sibling key '{}' is a scalar, not a block", key),
                    ));
                }
            }
        } else {
            None
        };

        self.entries.push(DocEntry { key, tag, value });
        Ok(())
    }

    fn take_disambiguation_tag(&mut self) -> Option<DisambiguationTag> {
        for kind in [TagKind::Attribute, TagKind::ReferenceNumber] {
            let position = self.entries.iter().position(|entry| {
                entry.key == kind.as_str() && matches!(entry.value, DocValue::Scalar(_))
            });
            if let Some(position) = position {
                let entry = self.entries.remove(position);
                let DocValue::Scalar(value) = entry.value else {
                    unreachable!("position matched a scalar entry");
                };
                return Some(DisambiguationTag { kind, value });
            }
        }
        None
    }
}
