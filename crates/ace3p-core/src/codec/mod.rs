//! Structured-text codecs for the proprietary simulation file formats.

pub mod ace3p;
pub mod document;
pub mod journal;
pub mod rfpost;
pub mod solver;

pub use document::{DisambiguationTag, DocEntry, DocValue, Document, TagKind};
pub use journal::Journal;
pub use rfpost::{RfPostInput, RfPostOutput, RfPostSection, RoverQMode, SurfaceMaxFields};
pub use solver::S3pOutput;
