//! JSON run-configuration loading and conversion to core types.

use ace3p_core::domain::{Ace3pError, Ace3pResult, ParamPoint, ParamValue, WorkdirMode};
use ace3p_core::exec::LauncherConfig;
use ace3p_core::optimize::{
    CostModel, Direction, ObjectiveSpec, OptimizerConfig, TerminationPolicy, VariableSpec,
};
use ace3p_core::sweep::SweepSpec;
use ace3p_core::workflow::{ExtractionSpec, WorkflowConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub(super) struct RunConfig {
    pub(super) workflow_parameters: WorkflowParameters,
    #[serde(default)]
    pub(super) input_parameters: Vec<InputParameter>,
    #[serde(default)]
    pub(super) output_parameters: Vec<OutputParameter>,
    #[serde(default)]
    pub(super) optimization_parameters: Option<OptimizationParameters>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct WorkflowParameters {
    #[serde(default)]
    pub(super) cubit_input: Option<PathBuf>,
    #[serde(default)]
    pub(super) ace3p_input: Option<PathBuf>,
    #[serde(default)]
    pub(super) rfpost_input: Option<PathBuf>,
    #[serde(default = "default_resource")]
    pub(super) ace3p_tasks: usize,
    #[serde(default = "default_resource")]
    pub(super) ace3p_cores: usize,
    #[serde(default)]
    pub(super) ace3p_opts: Vec<String>,
    pub(super) workdir: PathBuf,
    #[serde(default)]
    pub(super) workdir_mode: WorkdirModeConfig,
    pub(super) mpi_caller: String,
    pub(super) ace3p_bin: PathBuf,
    #[serde(default)]
    pub(super) cubit_bin: Option<PathBuf>,
    #[serde(default)]
    pub(super) sweep_output_file: Option<PathBuf>,
    #[serde(default)]
    pub(super) frequency_output_file: Option<PathBuf>,
}

fn default_resource() -> usize {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(super) enum WorkdirModeConfig {
    #[default]
    Manual,
    Auto,
}

impl From<WorkdirModeConfig> for WorkdirMode {
    fn from(mode: WorkdirModeConfig) -> Self {
        match mode {
            WorkdirModeConfig::Manual => WorkdirMode::Manual,
            WorkdirModeConfig::Auto => WorkdirMode::Auto,
        }
    }
}

/// A scalar JSON value; numbers stay numeric, everything else is text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(super) enum ConfigScalar {
    Number(f64),
    Text(String),
}

impl ConfigScalar {
    pub(super) fn to_param_value(&self) -> ParamValue {
        match self {
            Self::Number(number) => ParamValue::Number(*number),
            Self::Text(text) => ParamValue::Text(text.clone()),
        }
    }

    pub(super) fn render(&self) -> String {
        self.to_param_value().to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(super) enum InputValue {
    Scalar(ConfigScalar),
    Vector(Vec<ConfigScalar>),
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct InputParameter {
    pub(super) name: String,
    pub(super) value: InputValue,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct OutputParameter {
    pub(super) name: String,
    pub(super) section: String,
    pub(super) identifier: ConfigScalar,
    pub(super) field: String,
    #[serde(default)]
    pub(super) component: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct OptimizationParameters {
    pub(super) variables: Vec<VariableConfig>,
    pub(super) objectives: Vec<ObjectiveConfig>,
    #[serde(default = "default_generator")]
    pub(super) generator: String,
    #[serde(default)]
    pub(super) seed: Option<u64>,
    pub(super) termination: TerminationConfig,
    #[serde(default)]
    pub(super) frequency_match_tolerance: Option<f64>,
    #[serde(default)]
    pub(super) all_values_file: Option<PathBuf>,
    #[serde(default)]
    pub(super) history_file: Option<PathBuf>,
    #[serde(default)]
    pub(super) snapshot_file: Option<PathBuf>,
}

fn default_generator() -> String {
    "random_search".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct VariableConfig {
    pub(super) name: String,
    pub(super) bounds: [f64; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ObjectiveConfig {
    pub(super) s_parameter: String,
    pub(super) frequency: f64,
    pub(super) direction: DirectionConfig,
    #[serde(default)]
    pub(super) tolerance: Option<f64>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(super) enum DirectionConfig {
    Minimize,
    Maximize,
}

impl From<DirectionConfig> for Direction {
    fn from(direction: DirectionConfig) -> Self {
        match direction {
            DirectionConfig::Minimize => Direction::Minimize,
            DirectionConfig::Maximize => Direction::Maximize,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub(super) enum TerminationConfig {
    FixedIterations {
        num_random: usize,
        num_step: usize,
    },
    ToleranceGated {
        num_random: usize,
        max_iterations: usize,
    },
    CostBudget {
        num_random: usize,
        budget: f64,
        cost_function: String,
        #[serde(default = "default_cost_base")]
        base: f64,
        fidelity_variable: String,
    },
}

fn default_cost_base() -> f64 {
    std::f64::consts::E
}

impl RunConfig {
    pub(super) fn load(path: &Path) -> Ace3pResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            Ace3pError::io_system(
                "IO.CONFIG_READ",
                format!("failed to read config '{}': {}", path.display(), source),
            )
        })?;
        serde_json::from_str(&text).map_err(|source| {
            Ace3pError::configuration(
                "CONFIG.PARSE",
                format!("invalid run configuration '{}': {}", path.display(), source),
            )
        })
    }

    pub(super) fn workflow_config(&self) -> Ace3pResult<WorkflowConfig> {
        let parameters = &self.workflow_parameters;
        Ok(WorkflowConfig {
            journal_file: parameters.cubit_input.clone(),
            solver_file: parameters.ace3p_input.clone(),
            rfpost_file: parameters.rfpost_input.clone(),
            tasks: parameters.ace3p_tasks,
            cores: parameters.ace3p_cores,
            opts: parameters.ace3p_opts.clone(),
            base_workdir: parameters.workdir.clone(),
            workdir_mode: parameters.workdir_mode.into(),
            launcher: LauncherConfig {
                mpi_caller: parameters.mpi_caller.clone(),
                ace3p_bin_dir: parameters.ace3p_bin.clone(),
                cubit_bin_dir: parameters
                    .cubit_bin
                    .clone()
                    .unwrap_or_else(|| parameters.ace3p_bin.clone()),
            },
            sweep_output: parameters.sweep_output_file.clone(),
            frequency_output: parameters.frequency_output_file.clone(),
            extraction: self.extraction_spec()?,
        })
    }

    pub(super) fn extraction_spec(&self) -> Ace3pResult<ExtractionSpec> {
        let mut spec = ExtractionSpec::new();
        for output in &self.output_parameters {
            spec.push(
                output.name.clone(),
                &output.section,
                &output.identifier.render(),
                &output.field,
                output.component.as_deref(),
            )?;
        }
        Ok(spec)
    }

    /// Every input parameter as a sweep axis; scalars become single-value
    /// axes so they still appear in the results table.
    pub(super) fn sweep_spec(&self) -> Ace3pResult<SweepSpec> {
        let mut spec = SweepSpec::new();
        for parameter in &self.input_parameters {
            let values = match &parameter.value {
                InputValue::Scalar(scalar) => vec![scalar.to_param_value()],
                InputValue::Vector(scalars) => {
                    scalars.iter().map(ConfigScalar::to_param_value).collect()
                }
            };
            spec.push_axis(parameter.name.clone(), values)?;
        }
        Ok(spec)
    }

    /// Input parameters for a single run. Vector values are a
    /// configuration error here.
    pub(super) fn single_point(&self) -> Ace3pResult<ParamPoint> {
        let mut point = ParamPoint::new();
        for parameter in &self.input_parameters {
            match &parameter.value {
                InputValue::Scalar(scalar) => {
                    point.push((parameter.name.clone(), scalar.to_param_value()));
                }
                InputValue::Vector(_) => {
                    return Err(Ace3pError::configuration(
                        "CONFIG.VECTOR_INPUT",
                        format!(
                            "input parameter '{}' is vector-valued; use the sweep command",
                            parameter.name
                        ),
                    ));
                }
            }
        }
        Ok(point)
    }

    pub(super) fn optimizer_config(&self) -> Ace3pResult<OptimizerConfig> {
        let parameters = self.optimization_parameters.as_ref().ok_or_else(|| {
            Ace3pError::configuration(
                "CONFIG.OPTIMIZATION",
                "run configuration has no optimization_parameters block",
            )
        })?;
        let termination = match &parameters.termination {
            TerminationConfig::FixedIterations {
                num_random,
                num_step,
            } => TerminationPolicy::FixedIterations {
                num_random: *num_random,
                num_step: *num_step,
            },
            TerminationConfig::ToleranceGated {
                num_random,
                max_iterations,
            } => TerminationPolicy::ToleranceGated {
                num_random: *num_random,
                max_iterations: *max_iterations,
            },
            TerminationConfig::CostBudget {
                num_random,
                budget,
                cost_function,
                base,
                fidelity_variable,
            } => TerminationPolicy::CostBudget {
                num_random: *num_random,
                budget: *budget,
                cost_model: CostModel::by_name(cost_function, *base)?,
                fidelity_variable: fidelity_variable.clone(),
            },
        };
        Ok(OptimizerConfig {
            variables: parameters
                .variables
                .iter()
                .map(|variable| VariableSpec {
                    name: variable.name.clone(),
                    lower: variable.bounds[0],
                    upper: variable.bounds[1],
                })
                .collect(),
            objectives: parameters
                .objectives
                .iter()
                .map(|objective| ObjectiveSpec {
                    s_parameter: objective.s_parameter.clone(),
                    frequency: objective.frequency,
                    direction: objective.direction.into(),
                    tolerance: objective.tolerance,
                })
                .collect(),
            termination,
            frequency_match_tolerance: parameters.frequency_match_tolerance,
            all_values_file: parameters.all_values_file.clone(),
            history_file: parameters.history_file.clone(),
            snapshot_file: parameters.snapshot_file.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::RunConfig;
    use ace3p_core::domain::Ace3pErrorCategory;

    const SWEEP_CONFIG: &str = r#"{
        "workflow_parameters": {
            "cubit_input": "pillbox.jou",
            "ace3p_input": "pillbox.omega3p",
            "rfpost_input": "pillbox.rfpost",
            "ace3p_tasks": 16,
            "ace3p_cores": 8,
            "workdir": "/scratch/pillbox",
            "workdir_mode": "auto",
            "mpi_caller": "srun",
            "ace3p_bin": "/opt/ace3p/bin",
            "cubit_bin": "/opt/cubit",
            "sweep_output_file": "sweep_output.txt"
        },
        "input_parameters": [
            { "name": "radius", "value": [90, 100] },
            { "name": "ellipticity", "value": 0.5 }
        ],
        "output_parameters": [
            { "name": "RoQ", "section": "RoverQ", "identifier": 0, "field": "RoQ" }
        ]
    }"#;

    #[test]
    fn sweep_config_builds_axes_including_scalar_inputs() {
        let config: RunConfig = serde_json::from_str(SWEEP_CONFIG).expect("config parses");
        let spec = config.sweep_spec().expect("axes build");
        assert_eq!(spec.names(), vec!["radius", "ellipticity"]);
        assert_eq!(spec.row_count(), 2);
        let workflow = config.workflow_config().expect("workflow config builds");
        assert_eq!(workflow.tasks, 16);
        assert_eq!(workflow.extraction.column_names(), vec!["RoQ"]);
    }

    #[test]
    fn single_run_rejects_vector_inputs() {
        let config: RunConfig = serde_json::from_str(SWEEP_CONFIG).expect("config parses");
        let error = config.single_point().expect_err("vector input must fail");
        assert_eq!(error.category(), Ace3pErrorCategory::Configuration);
        assert!(error.to_string().contains("sweep"));
    }

    #[test]
    fn unknown_cost_function_fails_before_any_work() {
        let text = r#"{
            "workflow_parameters": {
                "ace3p_input": "coupler.s3p",
                "workdir": "/scratch/coupler",
                "mpi_caller": "srun",
                "ace3p_bin": "/opt/ace3p/bin"
            },
            "optimization_parameters": {
                "variables": [ { "name": "fidelity", "bounds": [1.0, 3.0] } ],
                "objectives": [
                    { "s_parameter": "S(0,0)", "frequency": 1.3e9, "direction": "minimize" }
                ],
                "termination": {
                    "policy": "cost_budget",
                    "num_random": 3,
                    "budget": 100.0,
                    "cost_function": "polynomial",
                    "fidelity_variable": "fidelity"
                }
            }
        }"#;
        let config: RunConfig = serde_json::from_str(text).expect("config parses");
        let error = config.optimizer_config().expect_err("unknown cost model");
        assert_eq!(error.category(), Ace3pErrorCategory::Configuration);
    }
}
