//! Pipeline driver.
//!
//! A workflow walks one parameter point through the staged pipeline,
//! `Idle` to `Evaluated`, skipping stages that were not configured. A
//! failed stage does not abort a sweep: the point's outputs are recorded
//! as absent and the sweep moves on, rewriting the results table after
//! every point.

pub mod extract;
mod stages;

pub use extract::{ExtractionPath, ExtractionSpec, RoverQField, SurfaceField};
pub use stages::{ExternalStage, MeshStage, RfPostStage, SolveStage, StageArtifacts, StageContext};

use crate::domain::{Ace3pError, Ace3pResult, ParamPoint, RunRecord, SimTool, WorkdirMode};
use crate::exec::{CommandRunner, LauncherConfig};
use crate::report;
use crate::sweep::SweepSpec;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    MeshStage,
    SolveStage,
    PostprocessStage,
    Evaluated,
}

/// Static description of one pipeline, shared by every run.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Cubit journal; `None` skips meshing.
    pub journal_file: Option<PathBuf>,
    /// Solver deck (`.omega3p` or `.s3p`); `None` skips solving.
    pub solver_file: Option<PathBuf>,
    /// RF post-processor input; `None` skips post-processing.
    pub rfpost_file: Option<PathBuf>,
    pub tasks: usize,
    pub cores: usize,
    pub opts: Vec<String>,
    pub base_workdir: PathBuf,
    pub workdir_mode: WorkdirMode,
    pub launcher: LauncherConfig,
    /// Sweep results table, rewritten after every point.
    pub sweep_output: Option<PathBuf>,
    /// Frequency-scan table for scattering-solver sweeps, appended one
    /// row per point and solved frequency.
    pub frequency_output: Option<PathBuf>,
    pub extraction: ExtractionSpec,
}

#[derive(Debug)]
pub struct PointOutcome {
    pub record: RunRecord,
    pub artifacts: StageArtifacts,
}

#[derive(Debug)]
pub struct Workflow {
    config: WorkflowConfig,
    solver_tool: Option<SimTool>,
}

impl Workflow {
    /// Validates the static configuration. Misconfiguration is fatal
    /// here, before any external work starts.
    pub fn new(config: WorkflowConfig) -> Ace3pResult<Self> {
        let solver_tool = match &config.solver_file {
            Some(path) => Some(solver_tool_for(path)?),
            None => None,
        };
        if config.tasks == 0 || config.cores == 0 {
            return Err(Ace3pError::configuration(
                "CONFIG.RESOURCES",
                "tasks and cores must both be at least 1",
            ));
        }
        Ok(Self {
            config,
            solver_tool,
        })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Run directory for one parameter point. `Auto` appends the
    /// `_`-joined parameter values to the base directory name.
    pub fn workdir_for(&self, point: &ParamPoint) -> PathBuf {
        match self.config.workdir_mode {
            WorkdirMode::Manual => self.config.base_workdir.clone(),
            WorkdirMode::Auto => {
                if point.is_empty() {
                    return self.config.base_workdir.clone();
                }
                let suffix: Vec<String> =
                    point.iter().map(|(_, value)| value.to_string()).collect();
                let name = match self.config.base_workdir.file_name() {
                    Some(base) => format!("{}_{}", base.to_string_lossy(), suffix.join("_")),
                    None => suffix.join("_"),
                };
                match self.config.base_workdir.parent() {
                    Some(parent) => parent.join(name),
                    None => PathBuf::from(name),
                }
            }
        }
    }

    /// Runs one parameter point through every configured stage.
    ///
    /// Stage failures are not errors: the point comes back with absent
    /// output fields. `Err` is reserved for problems outside the failure
    /// policy, such as an uncreatable run directory.
    pub fn run_point(
        &self,
        point: &ParamPoint,
        runner: &mut dyn CommandRunner,
    ) -> Ace3pResult<PointOutcome> {
        let workdir = self.workdir_for(point);
        std::fs::create_dir_all(&workdir).map_err(|source| {
            Ace3pError::io_system(
                "IO.WORKDIR",
                format!(
                    "failed to create run directory '{}': {}",
                    workdir.display(),
                    source
                ),
            )
        })?;

        let mut artifacts = StageArtifacts::default();
        let mut state = WorkflowState::Idle;
        let mut failed = false;

        tracing::debug!("pipeline starting in {:?}", state);
        for (next_state, stage) in self.stages() {
            state = next_state;
            tracing::debug!("entering {:?}", state);
            match stage {
                Some(stage) => {
                    tracing::info!(
                        "running {} stage in '{}'",
                        stage.tool(),
                        workdir.display()
                    );
                    if let Err(error) =
                        self.run_stage(stage.as_ref(), &workdir, point, &mut artifacts, runner)
                    {
                        tracing::warn!(
                            "{} stage failed, recording absent outputs: {}",
                            stage.tool(),
                            error
                        );
                        failed = true;
                        break;
                    }
                }
                None => tracing::info!("no input configured, skipping {:?}", state),
            }
        }
        state = WorkflowState::Evaluated;
        tracing::debug!("pipeline reached {:?}", state);

        let mut record = RunRecord::new(point.clone(), workdir);
        record.outputs = if failed {
            self.config.extraction.absent()
        } else {
            match &artifacts.rfpost_output {
                Some(output) => self.config.extraction.extract(output),
                None => self.config.extraction.absent(),
            }
        };
        Ok(PointOutcome { record, artifacts })
    }

    /// Runs every point of the sweep tensor strictly in order, rewriting
    /// the results table after each point.
    pub fn run_sweep(
        &self,
        spec: &SweepSpec,
        runner: &mut dyn CommandRunner,
    ) -> Ace3pResult<Vec<RunRecord>> {
        let points = spec.points();
        tracing::info!("sweeping {} points over {:?}", points.len(), spec.names());
        let mut records = Vec::with_capacity(points.len());
        for point in &points {
            let outcome = self.run_point(point, runner)?;
            if let (Some(path), Some(s3p_output)) = (
                &self.config.frequency_output,
                &outcome.artifacts.s3p_output,
            ) {
                report::write_frequency_table(path, None, point, s3p_output)?;
            }
            records.push(outcome.record);
            if let Some(path) = &self.config.sweep_output {
                let input_names = spec.names();
                let output_names = self.config.extraction.column_names();
                report::write_sweep_table(path, &input_names, &output_names, &records)?;
            }
        }
        Ok(records)
    }

    fn stages(&self) -> Vec<(WorkflowState, Option<Box<dyn ExternalStage>>)> {
        let mesh: Option<Box<dyn ExternalStage>> =
            self.config.journal_file.clone().map(|journal_file| {
                Box::new(MeshStage { journal_file }) as Box<dyn ExternalStage>
            });
        let solve: Option<Box<dyn ExternalStage>> = match (&self.config.solver_file, self.solver_tool)
        {
            (Some(deck_file), Some(tool)) => Some(Box::new(SolveStage {
                deck_file: deck_file.clone(),
                tool,
                tasks: self.config.tasks,
                cores: self.config.cores,
                opts: self.config.opts.clone(),
            })),
            _ => None,
        };
        let rfpost: Option<Box<dyn ExternalStage>> =
            self.config.rfpost_file.clone().map(|input_file| {
                Box::new(RfPostStage {
                    input_file,
                    required_sections: self
                        .config
                        .extraction
                        .required_sections()
                        .iter()
                        .map(|section| section.to_string())
                        .collect(),
                }) as Box<dyn ExternalStage>
            });
        vec![
            (WorkflowState::MeshStage, mesh),
            (WorkflowState::SolveStage, solve),
            (WorkflowState::PostprocessStage, rfpost),
        ]
    }

    fn run_stage(
        &self,
        stage: &dyn ExternalStage,
        workdir: &Path,
        point: &ParamPoint,
        artifacts: &mut StageArtifacts,
        runner: &mut dyn CommandRunner,
    ) -> Ace3pResult<()> {
        let mut ctx = StageContext {
            workdir,
            point,
            artifacts,
        };
        stage.prepare_input(&mut ctx)?;
        let output = stage.invoke(&self.config.launcher, &ctx, runner)?;
        if !output.success {
            return Err(Ace3pError::external_process(
                "RUN.STAGE_EXIT",
                format!(
                    "{} exited with code {:?}: {}",
                    stage.tool(),
                    output.exit_code,
                    output.stderr.trim()
                ),
            ));
        }
        stage.parse_output(&mut ctx, &output)
    }
}

fn solver_tool_for(path: &Path) -> Ace3pResult<SimTool> {
    match path.extension().and_then(|extension| extension.to_str()) {
        Some("omega3p") => Ok(SimTool::Omega3p),
        Some("s3p") => Ok(SimTool::S3p),
        other => Err(Ace3pError::configuration(
            "CONFIG.SOLVER_KIND",
            format!(
                "cannot infer solver from '{}' (extension {:?}), expected .omega3p or .s3p",
                path.display(),
                other
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::{Workflow, WorkflowConfig};
    use crate::domain::{ParamValue, WorkdirMode};
    use crate::exec::LauncherConfig;
    use crate::workflow::ExtractionSpec;

    fn config(base_workdir: &str, mode: WorkdirMode) -> WorkflowConfig {
        WorkflowConfig {
            journal_file: None,
            solver_file: None,
            rfpost_file: None,
            tasks: 1,
            cores: 1,
            opts: Vec::new(),
            base_workdir: base_workdir.into(),
            workdir_mode: mode,
            launcher: LauncherConfig {
                mpi_caller: "srun".to_string(),
                ace3p_bin_dir: "/opt/ace3p/bin".into(),
                cubit_bin_dir: "/opt/cubit".into(),
            },
            sweep_output: None,
            frequency_output: None,
            extraction: ExtractionSpec::new(),
        }
    }

    #[test]
    fn auto_workdir_joins_scalar_values_with_underscores() {
        let workflow =
            Workflow::new(config("/scratch/pillbox", WorkdirMode::Auto)).expect("valid config");
        let point = vec![
            ("radius".to_string(), ParamValue::Number(90.0)),
            ("ellipticity".to_string(), ParamValue::Number(0.5)),
        ];
        assert_eq!(
            workflow.workdir_for(&point),
            std::path::PathBuf::from("/scratch/pillbox_90_0.5")
        );
    }

    #[test]
    fn manual_workdir_is_shared_across_points() {
        let workflow =
            Workflow::new(config("/scratch/pillbox", WorkdirMode::Manual)).expect("valid config");
        let point = vec![("radius".to_string(), ParamValue::Number(90.0))];
        assert_eq!(
            workflow.workdir_for(&point),
            std::path::PathBuf::from("/scratch/pillbox")
        );
    }

    #[test]
    fn unknown_solver_extension_is_a_configuration_error() {
        let mut bad = config("/scratch/pillbox", WorkdirMode::Manual);
        bad.solver_file = Some("/decks/pillbox.t3p".into());
        assert!(Workflow::new(bad).is_err());
    }

    #[test]
    fn zero_resources_are_rejected() {
        let mut bad = config("/scratch/pillbox", WorkdirMode::Manual);
        bad.tasks = 0;
        assert!(Workflow::new(bad).is_err());
    }
}
