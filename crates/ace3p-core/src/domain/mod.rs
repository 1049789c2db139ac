pub mod errors;

pub use errors::{Ace3pError, Ace3pErrorCategory, Ace3pResult};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// External simulation tools the pipeline drives as subprocesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimTool {
    Cubit,
    Omega3p,
    S3p,
    Acdtool,
}

impl SimTool {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cubit => "cubit",
            Self::Omega3p => "omega3p",
            Self::S3p => "s3p",
            Self::Acdtool => "acdtool",
        }
    }
}

impl Display for SimTool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// One concrete swept-parameter value.
///
/// Values keep their numeric identity for tensor bookkeeping but render to
/// the exact text substituted into journal and input files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse::<f64>().ok(),
        }
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{}", value),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// A fully specified parameter tuple for one pipeline evaluation, in axis
/// order.
pub type ParamPoint = Vec<(String, ParamValue)>;

/// Working-directory resolution for pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkdirMode {
    /// Fixed shared directory; the caller must not overlap sweep runs.
    #[default]
    Manual,
    /// Directory name derived from the run's scalar parameter values.
    Auto,
}

/// One sweep/optimization evaluation: the concrete input tuple, its working
/// directory, and the extracted output scalars. Fields left `None` mark
/// outputs a failed external stage never produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub inputs: ParamPoint,
    pub workdir: PathBuf,
    pub outputs: BTreeMap<String, Option<f64>>,
}

impl RunRecord {
    pub fn new(inputs: ParamPoint, workdir: impl Into<PathBuf>) -> Self {
        Self {
            inputs,
            workdir: workdir.into(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn input_value(&self, name: &str) -> Option<&ParamValue> {
        self.inputs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}
