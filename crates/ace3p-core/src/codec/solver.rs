//! Parsers for solver-produced text outputs: the eigensolver's captured
//! stdout and the scattering solver's frequency-scan result table.

use crate::domain::{Ace3pError, Ace3pResult};

/// Extracts `COMMIT MODE:` lines from the eigensolver's stdout into
/// ordered (mode, frequency) pairs.
pub fn parse_eigen_frequencies(stdout: &str) -> Vec<(usize, f64)> {
    let mut modes = Vec::new();
    for line in stdout.lines() {
        let Some(rest) = line.strip_prefix("COMMIT MODE:") else {
            continue;
        };
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let mode = tokens.first().and_then(|token| token.parse::<usize>().ok());
        let frequency = tokens.get(3).and_then(|token| token.parse::<f64>().ok());
        if let (Some(mode), Some(frequency)) = (mode, frequency) {
            modes.push((mode, frequency));
        }
    }
    modes
}

/// Scattering-solver frequency scan: one row per scanned frequency, one
/// column per S-parameter named in the `#Frequency` header line of
/// `Reflection.out`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct S3pOutput {
    pub s_parameter_names: Vec<String>,
    pub frequencies: Vec<f64>,
    /// `rows[i][j]` is S-parameter `j` at frequency `i`.
    pub rows: Vec<Vec<f64>>,
}

impl S3pOutput {
    pub fn parse(text: &str) -> Ace3pResult<Self> {
        let mut output = Self::default();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with("#Frequency") {
                output.s_parameter_names = trimmed
                    .split_whitespace()
                    .skip(1)
                    .map(str::to_string)
                    .collect();
                continue;
            }
            if trimmed.starts_with('#') {
                continue;
            }
            let values: Vec<f64> = trimmed
                .split_whitespace()
                .filter_map(|token| token.parse::<f64>().ok())
                .collect();
            if values.is_empty() {
                continue;
            }
            if output.s_parameter_names.is_empty() {
                return Err(Ace3pError::malformed_document(
                    "PARSE.S3P_HEADER",
                    "data row before the #Frequency header",
                ));
            }
            if values.len() != output.s_parameter_names.len() + 1 {
                return Err(Ace3pError::malformed_document(
                    "PARSE.S3P_ROW",
                    format!(
                        "row has {} values for {} S-parameter columns: '{}'",
                        values.len(),
                        output.s_parameter_names.len(),
                        trimmed
                    ),
                ));
            }
            output.frequencies.push(values[0]);
            output.rows.push(values[1..].to_vec());
        }
        Ok(output)
    }

    pub fn column_index(&self, s_parameter: &str) -> Option<usize> {
        self.s_parameter_names
            .iter()
            .position(|name| name == s_parameter)
    }

    /// Index of `frequency` on the solved grid: exact float match first,
    /// then (when a tolerance is given) the nearest frequency within it.
    pub fn frequency_index(&self, frequency: f64, tolerance: Option<f64>) -> Option<usize> {
        if let Some(index) = self.frequencies.iter().position(|&f| f == frequency) {
            return Some(index);
        }
        let tolerance = tolerance?;
        self.frequencies
            .iter()
            .enumerate()
            .map(|(index, &f)| (index, (f - frequency).abs()))
            .filter(|(_, distance)| *distance <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _)| index)
    }

    pub fn value_at(&self, s_parameter: &str, frequency_index: usize) -> Option<f64> {
        let column = self.column_index(s_parameter)?;
        self.rows.get(frequency_index)?.get(column).copied()
    }
}
