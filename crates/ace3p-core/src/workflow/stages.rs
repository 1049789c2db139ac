//! External pipeline stages.
//!
//! Each stage is a capability with the same three-step shape: render its
//! input file into the run directory, invoke the external binary through
//! the `CommandRunner` seam, and parse whatever the binary left behind
//! into the shared `StageArtifacts`. The driver owns sequencing and the
//! failure policy; stages only report errors.

use crate::codec::ace3p;
use crate::codec::journal::Journal;
use crate::codec::rfpost::RfPostOutput;
use crate::codec::solver::{parse_eigen_frequencies, S3pOutput};
use crate::codec::{Document, RfPostInput};
use crate::domain::{Ace3pError, Ace3pResult, ParamPoint, SimTool};
use crate::exec::{CommandRunner, LauncherConfig, ProcessOutput};
use crate::overrides::{apply_to_document, OverridePolicy};
use std::path::{Path, PathBuf};

/// Directory the scattering solver writes its tables into.
const S3P_RESULTS_DIR: &str = "s3p_results";
const S3P_REFLECTION_FILE: &str = "Reflection.out";

/// File `acdtool postprocess rf` leaves its tables in; its stdout
/// carries nothing worth parsing.
const RFPOST_OUTPUT_FILE: &str = "rfpost.out";

/// Artifacts handed from one stage to the next.
#[derive(Debug, Clone, Default)]
pub struct StageArtifacts {
    /// Mesh filename exported by the journal, before conversion.
    pub export_file: Option<String>,
    /// Converted `.ncdf` mesh filename, relative to the run directory.
    pub mesh_file: Option<String>,
    pub eigen_frequencies: Vec<(usize, f64)>,
    pub s3p_output: Option<S3pOutput>,
    pub rfpost_output: Option<RfPostOutput>,
}

/// Mutable per-run state shared across stages.
#[derive(Debug)]
pub struct StageContext<'a> {
    pub workdir: &'a Path,
    pub point: &'a ParamPoint,
    pub artifacts: &'a mut StageArtifacts,
}

fn read_source(path: &Path) -> Ace3pResult<String> {
    std::fs::read_to_string(path).map_err(|source| {
        Ace3pError::io_system(
            "IO.STAGE_READ",
            format!("failed to read '{}': {}", path.display(), source),
        )
    })
}

fn write_rendered(workdir: &Path, file_name: &str, text: &str) -> Ace3pResult<()> {
    let path = workdir.join(file_name);
    std::fs::write(&path, text).map_err(|source| {
        Ace3pError::io_system(
            "IO.STAGE_WRITE",
            format!("failed to write '{}': {}", path.display(), source),
        )
    })
}

fn source_file_name(path: &Path) -> Ace3pResult<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Ace3pError::input_validation(
                "INPUT.STAGE_FILE",
                format!("'{}' has no file name component", path.display()),
            )
        })
}

/// One external pipeline step.
pub trait ExternalStage {
    fn tool(&self) -> SimTool;

    /// Renders the stage input into the run directory, applying the
    /// current parameter point.
    fn prepare_input(&self, ctx: &mut StageContext<'_>) -> Ace3pResult<()>;

    /// Runs the external binary (or binaries) for this stage.
    fn invoke(
        &self,
        launcher: &LauncherConfig,
        ctx: &StageContext<'_>,
        runner: &mut dyn CommandRunner,
    ) -> Ace3pResult<ProcessOutput>;

    /// Harvests the stage's artifacts from the process output and the
    /// run directory.
    fn parse_output(
        &self,
        ctx: &mut StageContext<'_>,
        output: &ProcessOutput,
    ) -> Ace3pResult<()>;
}

/// Cubit meshing stage: edits the journal, runs cubit, then converts the
/// exported mesh to `.ncdf` with `acdtool meshconvert`.
#[derive(Debug, Clone)]
pub struct MeshStage {
    pub journal_file: PathBuf,
}

impl ExternalStage for MeshStage {
    fn tool(&self) -> SimTool {
        SimTool::Cubit
    }

    fn prepare_input(&self, ctx: &mut StageContext<'_>) -> Ace3pResult<()> {
        let mut journal = Journal::parse(&read_source(&self.journal_file)?);
        journal.set_values(ctx.point);
        match journal.get_export() {
            Some(export) => ctx.artifacts.export_file = Some(export),
            None => {
                return Err(Ace3pError::input_validation(
                    "INPUT.JOURNAL_EXPORT",
                    format!(
                        "journal '{}' has no export statement",
                        self.journal_file.display()
                    ),
                ));
            }
        }
        write_rendered(
            ctx.workdir,
            &source_file_name(&self.journal_file)?,
            &journal.serialize(),
        )
    }

    fn invoke(
        &self,
        launcher: &LauncherConfig,
        ctx: &StageContext<'_>,
        runner: &mut dyn CommandRunner,
    ) -> Ace3pResult<ProcessOutput> {
        let journal_name = source_file_name(&self.journal_file)?;
        let cubit = runner.run(&launcher.cubit_invocation(&journal_name, ctx.workdir))?;
        if !cubit.success {
            return Ok(cubit);
        }
        let export = ctx.artifacts.export_file.as_deref().unwrap_or_default();
        runner.run(&launcher.meshconvert_invocation(export, ctx.workdir))
    }

    fn parse_output(
        &self,
        ctx: &mut StageContext<'_>,
        _output: &ProcessOutput,
    ) -> Ace3pResult<()> {
        let export = ctx.artifacts.export_file.as_deref().unwrap_or_default();
        let converted = match export.rsplit_once('.') {
            Some((stem, _)) => format!("{}.ncdf", stem),
            None => format!("{}.ncdf", export),
        };
        if !ctx.workdir.join(&converted).exists() {
            return Err(Ace3pError::io_system(
                "IO.MESH_MISSING",
                format!(
                    "converted mesh '{}' not found in '{}'",
                    converted,
                    ctx.workdir.display()
                ),
            ));
        }
        ctx.artifacts.mesh_file = Some(converted);
        Ok(())
    }
}

/// Eigenmode or scattering solve stage.
#[derive(Debug, Clone)]
pub struct SolveStage {
    pub deck_file: PathBuf,
    pub tool: SimTool,
    pub tasks: usize,
    pub cores: usize,
    pub opts: Vec<String>,
}

impl SolveStage {
    fn override_policy(&self) -> OverridePolicy {
        match self.tool {
            SimTool::Omega3p => OverridePolicy::CreateMissing,
            _ => OverridePolicy::DropUnknown,
        }
    }

    fn point_mesh_into(document: &mut Document, mesh_file: &str) {
        let file = format!("./{}", mesh_file);
        match document.block_mut("ModelInfo") {
            Some(block) => block.set_scalar("File", file),
            None => {
                let mut block = Document::new();
                block.set_scalar("File", file);
                document.insert_block("ModelInfo", block);
            }
        }
    }
}

impl ExternalStage for SolveStage {
    fn tool(&self) -> SimTool {
        self.tool
    }

    fn prepare_input(&self, ctx: &mut StageContext<'_>) -> Ace3pResult<()> {
        let mut document = ace3p::parse(&read_source(&self.deck_file)?)?;
        apply_to_document(&mut document, ctx.point, self.override_policy());
        if let Some(mesh_file) = &ctx.artifacts.mesh_file {
            Self::point_mesh_into(&mut document, mesh_file);
        }
        write_rendered(
            ctx.workdir,
            &source_file_name(&self.deck_file)?,
            &ace3p::serialize(&document),
        )
    }

    fn invoke(
        &self,
        launcher: &LauncherConfig,
        ctx: &StageContext<'_>,
        runner: &mut dyn CommandRunner,
    ) -> Ace3pResult<ProcessOutput> {
        let deck_name = source_file_name(&self.deck_file)?;
        runner.run(&launcher.solver_invocation(
            self.tool,
            &deck_name,
            self.tasks,
            self.cores,
            &self.opts,
            ctx.workdir,
        ))
    }

    fn parse_output(
        &self,
        ctx: &mut StageContext<'_>,
        output: &ProcessOutput,
    ) -> Ace3pResult<()> {
        match self.tool {
            SimTool::S3p => {
                let path = ctx.workdir.join(S3P_RESULTS_DIR).join(S3P_REFLECTION_FILE);
                let text = read_source(&path)?;
                ctx.artifacts.s3p_output = Some(S3pOutput::parse(&text)?);
            }
            _ => {
                let frequencies = parse_eigen_frequencies(&output.stdout);
                if frequencies.is_empty() {
                    tracing::warn!("no eigenmode frequencies found in solver output");
                }
                ctx.artifacts.eigen_frequencies = frequencies;
            }
        }
        Ok(())
    }
}

/// RF post-processing stage (`acdtool postprocess rf`).
#[derive(Debug, Clone)]
pub struct RfPostStage {
    pub input_file: PathBuf,
    pub required_sections: Vec<String>,
}

impl ExternalStage for RfPostStage {
    fn tool(&self) -> SimTool {
        SimTool::Acdtool
    }

    fn prepare_input(&self, ctx: &mut StageContext<'_>) -> Ace3pResult<()> {
        let input = RfPostInput::parse(&read_source(&self.input_file)?)?;
        write_rendered(
            ctx.workdir,
            &source_file_name(&self.input_file)?,
            &input.serialize(),
        )
    }

    fn invoke(
        &self,
        launcher: &LauncherConfig,
        ctx: &StageContext<'_>,
        runner: &mut dyn CommandRunner,
    ) -> Ace3pResult<ProcessOutput> {
        let input_name = source_file_name(&self.input_file)?;
        runner.run(&launcher.rfpost_invocation(&input_name, ctx.workdir))
    }

    fn parse_output(
        &self,
        ctx: &mut StageContext<'_>,
        _output: &ProcessOutput,
    ) -> Ace3pResult<()> {
        let sections: Vec<&str> = self
            .required_sections
            .iter()
            .map(|section| section.as_str())
            .collect();
        let results_file = ctx.workdir.join(RFPOST_OUTPUT_FILE);
        let text = read_source(&results_file)?;
        ctx.artifacts.rfpost_output = Some(RfPostOutput::parse(&text, &sections)?);
        Ok(())
    }
}
