//! Optimization-loop driver.
//!
//! The simulation pipeline is a black box behind an `FnMut` objective
//! returning the solved scattering table. Suggestion strategies plug in
//! through the narrow `Generator` trait; termination is one of three
//! mutually exclusive policies. Unknown generator or cost-model names
//! fail before any simulation work starts.

use crate::codec::solver::S3pOutput;
use crate::domain::{Ace3pError, Ace3pResult, ParamPoint, ParamValue};
use crate::report;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Minimize,
    Maximize,
}

/// One bounded optimization variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

/// One tracked objective: an S-parameter at one frequency of the solved
/// grid, with an optional convergence tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveSpec {
    pub s_parameter: String,
    pub frequency: f64,
    pub direction: Direction,
    pub tolerance: Option<f64>,
}

impl ObjectiveSpec {
    pub fn label(&self) -> String {
        format!("{}@{}", self.s_parameter, self.frequency)
    }

    /// Direction-aware tolerance check. No tolerance means the objective
    /// never gates termination.
    pub fn crossed(&self, value: f64) -> bool {
        match (self.direction, self.tolerance) {
            (_, None) => false,
            (Direction::Minimize, Some(tolerance)) => value <= tolerance,
            (Direction::Maximize, Some(tolerance)) => value >= tolerance,
        }
    }
}

/// Pluggable suggestion strategy.
pub trait Generator: std::fmt::Debug {
    fn suggest(&mut self, variables: &[VariableSpec]) -> ParamPoint;
    fn observe(&mut self, point: &ParamPoint, objectives: &[Option<f64>]);
    fn snapshot(&self) -> serde_json::Value;
}

/// Uniform random search within the variable bounds.
#[derive(Debug)]
pub struct RandomSearchGenerator {
    rng: StdRng,
    observations: usize,
}

impl RandomSearchGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            observations: 0,
        }
    }
}

impl Generator for RandomSearchGenerator {
    fn suggest(&mut self, variables: &[VariableSpec]) -> ParamPoint {
        variables
            .iter()
            .map(|variable| {
                let value = self.rng.gen_range(variable.lower..=variable.upper);
                (variable.name.clone(), ParamValue::Number(value))
            })
            .collect()
    }

    fn observe(&mut self, _point: &ParamPoint, _objectives: &[Option<f64>]) {
        self.observations += 1;
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "generator": "random_search",
            "observations": self.observations,
        })
    }
}

/// Looks up a generator by its configured name.
pub fn generator_by_name(name: &str, seed: Option<u64>) -> Ace3pResult<Box<dyn Generator>> {
    match name {
        "random_search" => Ok(Box::new(RandomSearchGenerator::new(seed))),
        other => Err(Ace3pError::configuration(
            "CONFIG.GENERATOR",
            format!("unknown generator '{}'", other),
        )),
    }
}

/// Online least-squares fit of log-cost against fidelity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    count: usize,
    sum_x: f64,
    sum_y: f64,
    sum_xx: f64,
    sum_xy: f64,
}

impl Regression {
    pub fn observe(&mut self, fidelity: f64, log_cost: f64) {
        self.count += 1;
        self.sum_x += fidelity;
        self.sum_y += log_cost;
        self.sum_xx += fidelity * fidelity;
        self.sum_xy += fidelity * log_cost;
    }

    /// `(intercept, slope)` once at least two distinct fidelities have
    /// been seen.
    pub fn coefficients(&self) -> Option<(f64, f64)> {
        if self.count < 2 {
            return None;
        }
        let n = self.count as f64;
        let denominator = n * self.sum_xx - self.sum_x * self.sum_x;
        if denominator.abs() < f64::EPSILON {
            return None;
        }
        let slope = (n * self.sum_xy - self.sum_x * self.sum_y) / denominator;
        let intercept = (self.sum_y - slope * self.sum_x) / n;
        Some((intercept, slope))
    }

    pub fn predict(&self, fidelity: f64) -> Option<f64> {
        self.coefficients()
            .map(|(intercept, slope)| (intercept + slope * fidelity).exp())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CostModel {
    /// Cost = base ^ fidelity, in model units.
    Exponential { base: f64 },
    /// Cost in wall-clock seconds, fitted from measured durations.
    FittedRegression(Regression),
}

impl CostModel {
    pub fn by_name(name: &str, base: f64) -> Ace3pResult<Self> {
        match name {
            "exponential" => Ok(Self::Exponential { base }),
            "fitted_regression" => Ok(Self::FittedRegression(Regression::default())),
            other => Err(Ace3pError::configuration(
                "CONFIG.COST_MODEL",
                format!("unknown cost model '{}'", other),
            )),
        }
    }

    pub fn observe(&mut self, fidelity: f64, measured_seconds: f64) {
        if let Self::FittedRegression(regression) = self {
            if measured_seconds > 0.0 {
                regression.observe(fidelity, measured_seconds.ln());
            }
        }
    }

    pub fn predict(&self, fidelity: f64) -> Option<f64> {
        match self {
            Self::Exponential { base } => Some(base.powf(fidelity)),
            Self::FittedRegression(regression) => regression.predict(fidelity),
        }
    }

    /// Cost charged against the budget for one finished evaluation.
    pub fn charge(&self, fidelity: f64, measured_seconds: f64) -> f64 {
        match self {
            Self::Exponential { base } => base.powf(fidelity),
            Self::FittedRegression(_) => measured_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TerminationPolicy {
    FixedIterations {
        num_random: usize,
        num_step: usize,
    },
    /// Step until every tracked objective crosses its tolerance, or the
    /// iteration ceiling is hit.
    ToleranceGated {
        num_random: usize,
        max_iterations: usize,
    },
    CostBudget {
        num_random: usize,
        budget: f64,
        cost_model: CostModel,
        fidelity_variable: String,
    },
}

/// One finished optimization iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub point: ParamPoint,
    pub objectives: Vec<Option<f64>>,
    pub cost: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub variables: Vec<VariableSpec>,
    pub objectives: Vec<ObjectiveSpec>,
    pub termination: TerminationPolicy,
    /// Near-match fallback for locating objective frequencies on the
    /// solved grid. `None` keeps exact matching only.
    pub frequency_match_tolerance: Option<f64>,
    pub all_values_file: Option<PathBuf>,
    pub history_file: Option<PathBuf>,
    pub snapshot_file: Option<PathBuf>,
}

#[derive(Debug)]
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Ace3pResult<Self> {
        if config.variables.is_empty() {
            return Err(Ace3pError::configuration(
                "CONFIG.VARIABLES",
                "at least one optimization variable is required",
            ));
        }
        for variable in &config.variables {
            if !(variable.lower < variable.upper) {
                return Err(Ace3pError::configuration(
                    "CONFIG.VARIABLE_BOUNDS",
                    format!(
                        "variable '{}' has empty bounds [{}, {}]",
                        variable.name, variable.lower, variable.upper
                    ),
                ));
            }
        }
        match &config.termination {
            TerminationPolicy::ToleranceGated { .. } => {
                if let Some(spec) = config
                    .objectives
                    .iter()
                    .find(|spec| spec.tolerance.is_none())
                {
                    return Err(Ace3pError::configuration(
                        "CONFIG.TOLERANCE",
                        format!(
                            "tolerance-gated termination requires a tolerance on '{}'",
                            spec.label()
                        ),
                    ));
                }
            }
            TerminationPolicy::CostBudget {
                budget,
                fidelity_variable,
                ..
            } => {
                if *budget <= 0.0 {
                    return Err(Ace3pError::configuration(
                        "CONFIG.BUDGET",
                        "cost budget must be positive",
                    ));
                }
                if !config
                    .variables
                    .iter()
                    .any(|variable| variable.name == *fidelity_variable)
                {
                    return Err(Ace3pError::configuration(
                        "CONFIG.FIDELITY",
                        format!(
                            "fidelity variable '{}' is not an optimization variable",
                            fidelity_variable
                        ),
                    ));
                }
            }
            TerminationPolicy::FixedIterations { .. } => {}
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Evenly spaced fidelity levels for the cost-budget seed batch, so
    /// the cost model trains on non-degenerate data.
    pub fn seed_fidelities(bounds: &VariableSpec, num_random: usize) -> Vec<f64> {
        match num_random {
            0 => Vec::new(),
            1 => vec![bounds.lower],
            n => (0..n)
                .map(|index| {
                    bounds.lower
                        + (bounds.upper - bounds.lower) * index as f64 / (n - 1) as f64
                })
                .collect(),
        }
    }

    /// Drives the loop to termination. Evaluation failures follow the
    /// sweep failure policy: the iteration is recorded with absent
    /// objective values and the loop continues.
    pub fn run(
        &self,
        generator: &mut dyn Generator,
        evaluate: &mut dyn FnMut(&ParamPoint) -> Ace3pResult<S3pOutput>,
    ) -> Ace3pResult<Vec<IterationRecord>> {
        let mut records: Vec<IterationRecord> = Vec::new();
        let mut cost_model = match &self.config.termination {
            TerminationPolicy::CostBudget { cost_model, .. } => Some(cost_model.clone()),
            _ => None,
        };
        let mut spent = 0.0;
        let mut iteration = 0;

        while self.should_continue(iteration, &records, spent, cost_model.as_ref()) {
            let mut point = generator.suggest(&self.config.variables);
            self.pin_seed_fidelity(iteration, &mut point);

            let started = Instant::now();
            let evaluated = evaluate(&point);
            let elapsed = started.elapsed().as_secs_f64();

            let objectives = match &evaluated {
                Ok(output) => {
                    if let Some(path) = &self.config.all_values_file {
                        report::write_frequency_table(path, Some(iteration), &point, output)?;
                    }
                    self.objective_values(output)
                }
                Err(error) => {
                    tracing::warn!(
                        "evaluation failed at iteration {}, recording absent objectives: {}",
                        iteration,
                        error
                    );
                    vec![None; self.config.objectives.len()]
                }
            };
            generator.observe(&point, &objectives);

            let cost = self.charge(&point, elapsed, cost_model.as_mut());
            if let Some(cost) = cost {
                spent += cost;
            }
            records.push(IterationRecord {
                iteration,
                point,
                objectives,
                cost,
            });
            if let Some(path) = &self.config.history_file {
                report::write_history_table(path, &self.history_columns(), &history_rows(&records))?;
            }
            iteration += 1;
        }

        if let Some(path) = &self.config.snapshot_file {
            let text = serde_json::to_string_pretty(&generator.snapshot()).map_err(|source| {
                Ace3pError::io_system(
                    "IO.SNAPSHOT",
                    format!("failed to encode generator snapshot: {}", source),
                )
            })?;
            std::fs::write(path, text).map_err(|source| {
                Ace3pError::io_system(
                    "IO.SNAPSHOT",
                    format!("failed to write '{}': {}", path.display(), source),
                )
            })?;
        }
        Ok(records)
    }

    fn should_continue(
        &self,
        iteration: usize,
        records: &[IterationRecord],
        spent: f64,
        cost_model: Option<&CostModel>,
    ) -> bool {
        match &self.config.termination {
            TerminationPolicy::FixedIterations {
                num_random,
                num_step,
            } => iteration < num_random + num_step,
            TerminationPolicy::ToleranceGated {
                num_random,
                max_iterations,
            } => {
                if iteration >= *max_iterations {
                    return false;
                }
                if iteration < *num_random {
                    return true;
                }
                !records.iter().any(|record| self.all_crossed(record))
            }
            TerminationPolicy::CostBudget {
                num_random,
                budget,
                fidelity_variable,
                ..
            } => {
                if iteration < *num_random {
                    return true;
                }
                if spent >= *budget {
                    return false;
                }
                // Stop early when even the cheapest next evaluation
                // would overrun the budget.
                let cheapest = self
                    .config
                    .variables
                    .iter()
                    .find(|variable| variable.name == *fidelity_variable)
                    .and_then(|variable| {
                        cost_model.and_then(|model| model.predict(variable.lower))
                    });
                match cheapest {
                    Some(cost) => spent + cost <= *budget,
                    None => true,
                }
            }
        }
    }

    fn all_crossed(&self, record: &IterationRecord) -> bool {
        self.config
            .objectives
            .iter()
            .zip(&record.objectives)
            .all(|(spec, value)| value.map(|value| spec.crossed(value)).unwrap_or(false))
    }

    /// During the cost-budget seed batch, the fidelity variable is pinned
    /// to its evenly spaced level regardless of the generator's choice.
    fn pin_seed_fidelity(&self, iteration: usize, point: &mut ParamPoint) {
        let TerminationPolicy::CostBudget {
            num_random,
            fidelity_variable,
            ..
        } = &self.config.termination
        else {
            return;
        };
        if iteration >= *num_random {
            return;
        }
        let Some(bounds) = self
            .config
            .variables
            .iter()
            .find(|variable| variable.name == *fidelity_variable)
        else {
            return;
        };
        let levels = Self::seed_fidelities(bounds, *num_random);
        if let Some((_, value)) = point
            .iter_mut()
            .find(|(name, _)| name == fidelity_variable)
        {
            *value = ParamValue::Number(levels[iteration]);
        }
    }

    fn charge(
        &self,
        point: &ParamPoint,
        elapsed: f64,
        cost_model: Option<&mut CostModel>,
    ) -> Option<f64> {
        let TerminationPolicy::CostBudget {
            fidelity_variable, ..
        } = &self.config.termination
        else {
            return None;
        };
        let model = cost_model?;
        let fidelity = point
            .iter()
            .find(|(name, _)| name == fidelity_variable)
            .and_then(|(_, value)| value.as_number())?;
        model.observe(fidelity, elapsed);
        Some(model.charge(fidelity, elapsed))
    }

    fn objective_values(&self, output: &S3pOutput) -> Vec<Option<f64>> {
        self.config
            .objectives
            .iter()
            .map(|spec| {
                let Some(index) =
                    output.frequency_index(spec.frequency, self.config.frequency_match_tolerance)
                else {
                    tracing::warn!(
                        "frequency {} not on the solved grid for '{}'",
                        spec.frequency,
                        spec.label()
                    );
                    return None;
                };
                let value = output.value_at(&spec.s_parameter, index);
                if value.is_none() {
                    tracing::warn!(
                        "S-parameter '{}' not present in solver output",
                        spec.s_parameter
                    );
                }
                value
            })
            .collect()
    }

    fn history_columns(&self) -> Vec<String> {
        let mut columns = vec!["Iteration".to_string()];
        columns.extend(
            self.config
                .variables
                .iter()
                .map(|variable| variable.name.clone()),
        );
        columns.extend(self.config.objectives.iter().map(|spec| spec.label()));
        columns
    }
}

fn history_rows(records: &[IterationRecord]) -> Vec<Vec<String>> {
    records
        .iter()
        .map(|record| {
            let mut row = vec![record.iteration.to_string()];
            row.extend(record.point.iter().map(|(_, value)| value.to_string()));
            row.extend(record.objectives.iter().map(|value| match value {
                Some(value) => value.to_string(),
                None => "nan".to_string(),
            }));
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        generator_by_name, CostModel, Direction, Generator, ObjectiveSpec, Optimizer,
        OptimizerConfig, RandomSearchGenerator, Regression, TerminationPolicy, VariableSpec,
    };
    use crate::codec::solver::S3pOutput;
    use crate::domain::Ace3pErrorCategory;

    fn radius_variable() -> VariableSpec {
        VariableSpec {
            name: "radius".to_string(),
            lower: 80.0,
            upper: 120.0,
        }
    }

    fn reflection_objective(tolerance: Option<f64>) -> ObjectiveSpec {
        ObjectiveSpec {
            s_parameter: "S(0,0)".to_string(),
            frequency: 1.3e9,
            direction: Direction::Minimize,
            tolerance,
        }
    }

    fn optimizer(termination: TerminationPolicy, tolerance: Option<f64>) -> Optimizer {
        Optimizer::new(OptimizerConfig {
            variables: vec![radius_variable()],
            objectives: vec![reflection_objective(tolerance)],
            termination,
            frequency_match_tolerance: None,
            all_values_file: None,
            history_file: None,
            snapshot_file: None,
        })
        .expect("valid config")
    }

    fn flat_output(value: f64) -> S3pOutput {
        S3pOutput {
            s_parameter_names: vec!["S(0,0)".to_string()],
            frequencies: vec![1.3e9],
            rows: vec![vec![value]],
        }
    }

    #[test]
    fn unknown_generator_name_is_a_configuration_error() {
        let error = generator_by_name("gradient_descent", None).expect_err("unknown name");
        assert_eq!(error.category(), Ace3pErrorCategory::Configuration);
    }

    #[test]
    fn unknown_cost_model_name_is_a_configuration_error() {
        let error = CostModel::by_name("quadratic", 2.0).expect_err("unknown name");
        assert_eq!(error.category(), Ace3pErrorCategory::Configuration);
    }

    #[test]
    fn random_search_stays_within_bounds() {
        let mut generator = RandomSearchGenerator::new(Some(7));
        let variables = vec![radius_variable()];
        for _ in 0..50 {
            let point = generator.suggest(&variables);
            let value = point[0].1.as_number().expect("numeric suggestion");
            assert!((80.0..=120.0).contains(&value));
        }
    }

    #[test]
    fn fixed_iteration_policy_runs_exactly_the_requested_count() {
        let optimizer = optimizer(
            TerminationPolicy::FixedIterations {
                num_random: 2,
                num_step: 3,
            },
            None,
        );
        let mut generator = RandomSearchGenerator::new(Some(1));
        let mut evaluations = 0;
        let records = optimizer
            .run(&mut generator, &mut |_point| {
                evaluations += 1;
                Ok(flat_output(-1.0))
            })
            .expect("loop finishes");
        assert_eq!(records.len(), 5);
        assert_eq!(evaluations, 5);
    }

    #[test]
    fn tolerance_gate_stops_once_every_objective_crosses() {
        let optimizer = optimizer(
            TerminationPolicy::ToleranceGated {
                num_random: 1,
                max_iterations: 50,
            },
            Some(-10.0),
        );
        let mut generator = RandomSearchGenerator::new(Some(1));
        let mut calls = 0;
        let records = optimizer
            .run(&mut generator, &mut |_point| {
                calls += 1;
                // Crosses the -10 tolerance on the fourth evaluation.
                Ok(flat_output(if calls >= 4 { -12.0 } else { -3.0 }))
            })
            .expect("loop finishes");
        assert_eq!(records.len(), 4);
    }

    #[test]
    fn tolerance_gate_respects_the_iteration_ceiling() {
        let optimizer = optimizer(
            TerminationPolicy::ToleranceGated {
                num_random: 1,
                max_iterations: 6,
            },
            Some(-10.0),
        );
        let mut generator = RandomSearchGenerator::new(Some(1));
        let records = optimizer
            .run(&mut generator, &mut |_point| Ok(flat_output(-3.0)))
            .expect("loop finishes");
        assert_eq!(records.len(), 6);
    }

    #[test]
    fn tolerance_gated_config_requires_tolerances() {
        let result = Optimizer::new(OptimizerConfig {
            variables: vec![radius_variable()],
            objectives: vec![reflection_objective(None)],
            termination: TerminationPolicy::ToleranceGated {
                num_random: 1,
                max_iterations: 10,
            },
            frequency_match_tolerance: None,
            all_values_file: None,
            history_file: None,
            snapshot_file: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn cost_budget_seeds_evenly_spaced_fidelities_then_stops_on_exhaustion() {
        let fidelity = VariableSpec {
            name: "fidelity".to_string(),
            lower: 1.0,
            upper: 3.0,
        };
        let optimizer = Optimizer::new(OptimizerConfig {
            variables: vec![fidelity],
            objectives: vec![reflection_objective(None)],
            termination: TerminationPolicy::CostBudget {
                num_random: 3,
                // Seed costs are 2^1 + 2^2 + 2^3 = 14, which exhausts
                // the budget at once.
                budget: 10.0,
                cost_model: CostModel::Exponential { base: 2.0 },
                fidelity_variable: "fidelity".to_string(),
            },
            frequency_match_tolerance: None,
            all_values_file: None,
            history_file: None,
            snapshot_file: None,
        })
        .expect("valid config");
        let mut generator = RandomSearchGenerator::new(Some(5));
        let records = optimizer
            .run(&mut generator, &mut |_point| Ok(flat_output(-1.0)))
            .expect("loop finishes");

        assert_eq!(records.len(), 3);
        let fidelities: Vec<f64> = records
            .iter()
            .map(|record| record.point[0].1.as_number().expect("numeric fidelity"))
            .collect();
        assert_eq!(fidelities, vec![1.0, 2.0, 3.0]);
        assert_eq!(records[0].cost, Some(2.0));
        assert_eq!(records[2].cost, Some(8.0));
    }

    #[test]
    fn fitted_regression_recovers_a_power_law() {
        let mut regression = Regression::default();
        // cost = e^(0.5 + 2s)
        for fidelity in [1.0, 2.0, 3.0, 4.0] {
            regression.observe(fidelity, 0.5 + 2.0 * fidelity);
        }
        let (intercept, slope) = regression.coefficients().expect("fit exists");
        assert!((intercept - 0.5).abs() < 1e-9);
        assert!((slope - 2.0).abs() < 1e-9);
        let predicted = regression.predict(5.0).expect("prediction exists");
        assert!((predicted - (0.5_f64 + 10.0).exp()).abs() / predicted < 1e-9);
    }

    #[test]
    fn objective_lookup_falls_back_to_tolerance_matching_when_enabled() {
        let optimizer = Optimizer::new(OptimizerConfig {
            variables: vec![radius_variable()],
            objectives: vec![ObjectiveSpec {
                s_parameter: "S(0,0)".to_string(),
                frequency: 1.3001e9,
                direction: Direction::Minimize,
                tolerance: None,
            }],
            termination: TerminationPolicy::FixedIterations {
                num_random: 1,
                num_step: 0,
            },
            frequency_match_tolerance: Some(1.0e6),
            all_values_file: None,
            history_file: None,
            snapshot_file: None,
        })
        .expect("valid config");
        let mut generator = RandomSearchGenerator::new(Some(1));
        let records = optimizer
            .run(&mut generator, &mut |_point| Ok(flat_output(-4.5)))
            .expect("loop finishes");
        assert_eq!(records[0].objectives, vec![Some(-4.5)]);
    }

    #[test]
    fn failed_evaluation_records_absent_objectives_and_continues() {
        let optimizer = optimizer(
            TerminationPolicy::FixedIterations {
                num_random: 1,
                num_step: 1,
            },
            None,
        );
        let mut generator = RandomSearchGenerator::new(Some(1));
        let mut calls = 0;
        let records = optimizer
            .run(&mut generator, &mut |_point| {
                calls += 1;
                if calls == 1 {
                    Err(crate::domain::Ace3pError::external_process(
                        "RUN.STAGE_EXIT",
                        "solver crashed",
                    ))
                } else {
                    Ok(flat_output(-2.0))
                }
            })
            .expect("loop finishes");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].objectives, vec![None]);
        assert_eq!(records[1].objectives, vec![Some(-2.0)]);
    }
}
