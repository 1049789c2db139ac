//! Cartesian sweep-tensor construction.
//!
//! Axes keep their declaration order; the tensor enumerates every
//! combination row-major with the first axis varying slowest and the last
//! axis fastest. Each row is one fully specified parameter tuple and seeds
//! one pipeline run.

use crate::domain::{Ace3pError, Ace3pResult, ParamPoint, ParamValue};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SweepSpec {
    axes: Vec<(String, Vec<ParamValue>)>,
}

impl SweepSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_axis(
        &mut self,
        name: impl Into<String>,
        values: Vec<ParamValue>,
    ) -> Ace3pResult<()> {
        let name = name.into();
        if values.is_empty() {
            return Err(Ace3pError::input_validation(
                "INPUT.SWEEP_AXIS_EMPTY",
                format!("sweep axis '{}' has no values", name),
            ));
        }
        if self.axes.iter().any(|(existing, _)| *existing == name) {
            return Err(Ace3pError::input_validation(
                "INPUT.SWEEP_AXIS_DUPLICATE",
                format!("sweep axis '{}' declared twice", name),
            ));
        }
        self.axes.push((name, values));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Column ordering of the tensor rows: axis declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.axes.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|(_, values)| values.len()).product()
    }

    /// Full outer product of all axes. The first axis's values seed the
    /// tensor; each further axis widens every existing row by one column,
    /// tiling the old rows across the new axis so the newest axis varies
    /// fastest. The single-axis sweep falls out of the same fold as a
    /// one-column tensor.
    pub fn build_tensor(&self) -> Vec<Vec<ParamValue>> {
        let mut tensor: Vec<Vec<ParamValue>> = vec![Vec::new()];
        for (_, values) in &self.axes {
            let mut widened = Vec::with_capacity(tensor.len() * values.len());
            for row in &tensor {
                for value in values {
                    let mut wide_row = row.clone();
                    wide_row.push(value.clone());
                    widened.push(wide_row);
                }
            }
            tensor = widened;
        }
        if self.axes.is_empty() { Vec::new() } else { tensor }
    }

    /// Tensor rows paired with their axis names, ready for run records.
    pub fn points(&self) -> Vec<ParamPoint> {
        let names = self.names();
        self.build_tensor()
            .into_iter()
            .map(|row| {
                names
                    .iter()
                    .map(|name| name.to_string())
                    .zip(row)
                    .collect()
            })
            .collect()
    }
}
