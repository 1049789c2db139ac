//! Core library for driving multi-stage electromagnetic simulation
//! pipelines: structured-text codecs for the solver input and output
//! formats, a key-path parameter override engine, a Cubit journal
//! editor, sweep tensor construction, the staged pipeline driver, and
//! an optimization loop on top of it.

pub mod codec;
pub mod domain;
pub mod exec;
pub mod optimize;
pub mod overrides;
pub mod report;
pub mod sweep;
pub mod workflow;

pub use domain::{Ace3pError, Ace3pErrorCategory, Ace3pResult};
