//! Key-path parameter override engine for ACE3P-format documents.
//!
//! Override names are flat, underscore-delimited paths: every segment
//! before the last names a nesting level, the final segment is the leaf
//! key (`Cubit_Epsilon` targets `Cubit { Epsilon }`). A segment may carry
//! an `@tag` suffix to address one of several duplicate siblings by its
//! `Attribute`/`ReferenceNumber` value (`Boundary@2_Type`).

use crate::codec::document::{DocValue, Document};
use crate::domain::ParamPoint;

/// What to do with an override whose path is absent from the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverridePolicy {
    /// Scattering-solver inputs: unknown paths are silently dropped.
    DropUnknown,
    /// Eigenmode-solver inputs: missing paths are created by merging the
    /// override's skeleton into the document.
    CreateMissing,
}

/// One path segment, with the optional duplicate-sibling tag split off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PathSegment<'a> {
    key: &'a str,
    tag: Option<&'a str>,
}

fn split_path(name: &str) -> Vec<PathSegment<'_>> {
    name.split('_')
        .map(|segment| match segment.split_once('@') {
            Some((key, tag)) => PathSegment {
                key,
                tag: Some(tag),
            },
            None => PathSegment { key: segment, tag: None },
        })
        .collect()
}

/// Builds the singly-nested skeleton for one override, innermost leaf
/// first.
fn skeleton(segments: &[PathSegment<'_>], value: &str) -> Document {
    let mut document = Document::new();
    let Some((leaf, prefix)) = segments.split_last() else {
        return document;
    };
    document.set_scalar(leaf.key, value);
    for segment in prefix.iter().rev() {
        let mut outer = Document::new();
        outer.insert_block(segment.key, document);
        document = outer;
    }
    document
}

/// Merges `src` into `dst`: when a key exists on both sides and both
/// values are blocks, merge recursively; otherwise the new value wins.
fn deep_merge(dst: &mut Document, src: Document) {
    for entry in src.into_entries() {
        match (dst.get_mut(&entry.key), entry.value) {
            (Some(DocValue::Block(existing)), DocValue::Block(incoming)) => {
                deep_merge(existing, incoming);
            }
            (Some(existing), incoming) => *existing = incoming,
            (None, DocValue::Scalar(value)) => dst.set_scalar(entry.key, value),
            (None, DocValue::Block(block)) => dst.insert_block(entry.key, block),
        }
    }
}

/// Applies each override to the parsed document under the given policy.
pub fn apply_to_document(document: &mut Document, overrides: &ParamPoint, policy: OverridePolicy) {
    for (name, value) in overrides {
        let segments = split_path(name);
        let rendered = value.to_string();
        if !try_set_existing(document, &segments, &rendered) {
            match policy {
                OverridePolicy::DropUnknown => {
                    tracing::debug!("override path '{}' not in document, dropped", name);
                }
                OverridePolicy::CreateMissing => {
                    deep_merge(document, skeleton(&segments, &rendered));
                }
            }
        }
    }
}

/// Walks the path and rewrites the leaf scalar when every level already
/// exists. Returns false when any segment (or a scalar leaf) is missing.
fn try_set_existing(document: &mut Document, segments: &[PathSegment<'_>], value: &str) -> bool {
    let Some((leaf, prefix)) = segments.split_last() else {
        return false;
    };
    let mut current = document;
    for segment in prefix {
        let next = match segment.tag {
            Some(tag) => current.get_tagged_mut(segment.key, tag),
            None => current.get_mut(segment.key),
        };
        match next.and_then(DocValue::as_block_mut) {
            Some(block) => current = block,
            None => return false,
        }
    }
    let target = match leaf.tag {
        Some(tag) => current.get_tagged_mut(leaf.key, tag),
        None => current.get_mut(leaf.key),
    };
    match target {
        Some(DocValue::Scalar(existing)) => {
            *existing = value.to_string();
            true
        }
        _ => false,
    }
}

/// Default eigenmode-solver input skeleton, used when no input deck is
/// supplied: a minimal mesh reference, second-order curved elements, one
/// eigenvalue near 1 GHz, and post-processing enabled.
pub fn default_eigen_input() -> Document {
    let mut model_info = Document::new();
    model_info.set_scalar("File", "./mesh_file.ncdf");

    let mut finite_element = Document::new();
    finite_element.set_scalar("Order", "2");
    finite_element.set_scalar("CurvedSurfaces", "on");

    let mut eigen_solver = Document::new();
    eigen_solver.set_scalar("NumEigenvalues", "1");
    eigen_solver.set_scalar("FreqShift", "1.0E9");

    let mut post_process = Document::new();
    post_process.set_scalar("Toggle", "on");
    post_process.set_scalar("ModeFile", "mode");

    let mut document = Document::new();
    document.insert_block("ModelInfo", model_info);
    document.insert_block("FiniteElement", finite_element);
    document.insert_block("EigenSolver", eigen_solver);
    document.insert_block("PostProcess", post_process);
    document
}

#[cfg(test)]
mod tests {
    use super::{OverridePolicy, apply_to_document, default_eigen_input};
    use crate::codec::ace3p;
    use crate::domain::{ParamPoint, ParamValue};

    fn overrides(pairs: &[(&str, f64)]) -> ParamPoint {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), ParamValue::Number(*value)))
            .collect()
    }

    const DECK: &str = "\
Cubit : {
  Epsilon : 1.0
}
EigenSolver : {
  NumEigenvalues : 1
}
";

    #[test]
    fn override_updates_nested_leaf_when_path_exists() {
        let mut document = ace3p::parse(DECK).expect("deck parses");
        apply_to_document(
            &mut document,
            &overrides(&[("Cubit_Epsilon", 5.0)]),
            OverridePolicy::DropUnknown,
        );
        assert_eq!(
            document.block("Cubit").and_then(|block| block.scalar("Epsilon")),
            Some("5")
        );
    }

    #[test]
    fn drop_unknown_leaves_document_unchanged_for_missing_paths() {
        let mut document = ace3p::parse("Solver : {\n  Epsilon : 1.0\n}\n").expect("deck parses");
        let before = document.clone();
        // Epsilon exists, but not nested under Cubit.
        apply_to_document(
            &mut document,
            &overrides(&[("Cubit_Epsilon", 5.0)]),
            OverridePolicy::DropUnknown,
        );
        assert_eq!(document, before);
    }

    #[test]
    fn create_missing_builds_the_skeleton_for_unknown_paths() {
        let mut document = ace3p::parse(DECK).expect("deck parses");
        apply_to_document(
            &mut document,
            &overrides(&[("EigenSolver_FreqShift", 1.5e9)]),
            OverridePolicy::CreateMissing,
        );
        assert_eq!(
            document
                .block("EigenSolver")
                .and_then(|block| block.scalar("FreqShift")),
            Some("1500000000")
        );
        // Existing sibling fields are untouched.
        assert_eq!(
            document
                .block("EigenSolver")
                .and_then(|block| block.scalar("NumEigenvalues")),
            Some("1")
        );
    }

    #[test]
    fn create_missing_and_drop_unknown_are_asymmetric() {
        let base = ace3p::parse(DECK).expect("deck parses");
        let unknown = overrides(&[("PostProcess_Toggle", 1.0)]);

        let mut dropped = base.clone();
        apply_to_document(&mut dropped, &unknown, OverridePolicy::DropUnknown);
        assert_eq!(dropped, base);

        let mut created = base;
        apply_to_document(&mut created, &unknown, OverridePolicy::CreateMissing);
        assert_eq!(
            created
                .block("PostProcess")
                .and_then(|block| block.scalar("Toggle")),
            Some("1")
        );
    }

    #[test]
    fn tagged_segment_addresses_one_duplicate_sibling() {
        let deck = "\
Boundary : {
  ReferenceNumber : 1
  Sigma : 1.0
}
Boundary : {
  ReferenceNumber : 2
  Sigma : 2.0
}
";
        let mut document = ace3p::parse(deck).expect("deck parses");
        apply_to_document(
            &mut document,
            &overrides(&[("Boundary@2_Sigma", 9.9)]),
            OverridePolicy::DropUnknown,
        );
        assert_eq!(
            document
                .get_tagged("Boundary", "2")
                .and_then(|value| value.as_block())
                .and_then(|block| block.scalar("Sigma")),
            Some("9.9")
        );
        assert_eq!(
            document.block("Boundary").and_then(|block| block.scalar("Sigma")),
            Some("1.0")
        );
    }

    #[test]
    fn default_eigen_input_has_the_expected_sections() {
        let document = default_eigen_input();
        assert_eq!(document.len(), 4);
        assert_eq!(
            document
                .block("FiniteElement")
                .and_then(|block| block.scalar("Order")),
            Some("2")
        );
    }
}
