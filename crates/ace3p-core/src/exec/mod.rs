//! External-process seam for the simulation binaries.
//!
//! `LauncherConfig` is resolved once by the caller (bootstrap/CLI) and
//! passed in explicitly; the core never reads the process environment.
//! Workflow stages build `Invocation`s and hand them to a `CommandRunner`,
//! so tests substitute stub runners for the HPC binaries. Every call is
//! blocking; a non-zero exit is reported as data, and the workflow layer
//! decides the failure policy.

use crate::domain::{Ace3pError, Ace3pResult, SimTool};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Paths and MPI launcher for the external binaries.
#[derive(Debug, Clone, PartialEq)]
pub struct LauncherConfig {
    pub mpi_caller: String,
    pub ace3p_bin_dir: PathBuf,
    pub cubit_bin_dir: PathBuf,
}

impl LauncherConfig {
    /// `mpi_caller -n <tasks> -c <cores> [opts...] <bin_dir>/<tool> <input>`
    pub fn solver_invocation(
        &self,
        tool: SimTool,
        input_file: &str,
        tasks: usize,
        cores: usize,
        opts: &[String],
        workdir: &Path,
    ) -> Invocation {
        let mut args = vec![
            "-n".to_string(),
            tasks.to_string(),
            "-c".to_string(),
            cores.to_string(),
        ];
        args.extend(opts.iter().cloned());
        args.push(self.ace3p_bin_dir.join(tool.as_str()).display().to_string());
        args.push(input_file.to_string());
        Invocation {
            tool,
            program: self.mpi_caller.clone(),
            args,
            workdir: workdir.to_path_buf(),
        }
    }

    /// `cubit -nographics -nojournal -noecho <journal>`
    pub fn cubit_invocation(&self, journal_file: &str, workdir: &Path) -> Invocation {
        Invocation {
            tool: SimTool::Cubit,
            program: self.cubit_bin_dir.join("cubit").display().to_string(),
            args: vec![
                "-nographics".to_string(),
                "-nojournal".to_string(),
                "-noecho".to_string(),
                journal_file.to_string(),
            ],
            workdir: workdir.to_path_buf(),
        }
    }

    /// `mpi_caller -n 1 -c 1 acdtool meshconvert <mesh>`
    pub fn meshconvert_invocation(&self, mesh_file: &str, workdir: &Path) -> Invocation {
        self.acdtool_invocation(&["meshconvert".to_string(), mesh_file.to_string()], workdir)
    }

    /// `mpi_caller -n 1 -c 1 acdtool postprocess rf <input>`
    pub fn rfpost_invocation(&self, input_file: &str, workdir: &Path) -> Invocation {
        self.acdtool_invocation(
            &[
                "postprocess".to_string(),
                "rf".to_string(),
                input_file.to_string(),
            ],
            workdir,
        )
    }

    fn acdtool_invocation(&self, command_args: &[String], workdir: &Path) -> Invocation {
        let mut args = vec![
            "-n".to_string(),
            "1".to_string(),
            "-c".to_string(),
            "1".to_string(),
            self.ace3p_bin_dir
                .join(SimTool::Acdtool.as_str())
                .display()
                .to_string(),
        ];
        args.extend(command_args.iter().cloned());
        Invocation {
            tool: SimTool::Acdtool,
            program: self.mpi_caller.clone(),
            args,
            workdir: workdir.to_path_buf(),
        }
    }
}

/// One fully resolved external command, run blocking in `workdir`.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub tool: SimTool,
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
}

impl Invocation {
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of an external invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Blocking launcher seam. `Err` means the process could not be started at
/// all; a started-but-failed process comes back as `ProcessOutput` with
/// `success == false`.
pub trait CommandRunner {
    fn run(&mut self, invocation: &Invocation) -> Ace3pResult<ProcessOutput>;
}

/// Real subprocess runner.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&mut self, invocation: &Invocation) -> Ace3pResult<ProcessOutput> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.workdir)
            .output()
            .map_err(|source| {
                Ace3pError::external_process(
                    "RUN.SPAWN",
                    format!(
                        "failed to start '{}' in '{}': {}",
                        invocation.command_line(),
                        invocation.workdir.display(),
                        source
                    ),
                )
            })?;
        Ok(ProcessOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::LauncherConfig;
    use crate::domain::SimTool;
    use std::path::Path;

    fn launcher() -> LauncherConfig {
        LauncherConfig {
            mpi_caller: "srun".to_string(),
            ace3p_bin_dir: "/opt/ace3p/bin".into(),
            cubit_bin_dir: "/opt/cubit".into(),
        }
    }

    #[test]
    fn solver_invocation_carries_mpi_layout_and_opts() {
        let invocation = launcher().solver_invocation(
            SimTool::Omega3p,
            "pillbox.omega3p",
            16,
            8,
            &["--cpu-bind=cores".to_string()],
            Path::new("/scratch/run_90_0.5"),
        );
        assert_eq!(
            invocation.command_line(),
            "srun -n 16 -c 8 --cpu-bind=cores /opt/ace3p/bin/omega3p pillbox.omega3p"
        );
        assert_eq!(invocation.workdir, Path::new("/scratch/run_90_0.5"));
    }

    #[test]
    fn cubit_invocation_is_headless() {
        let invocation = launcher().cubit_invocation("pillbox.jou", Path::new("/scratch"));
        assert_eq!(
            invocation.command_line(),
            "/opt/cubit/cubit -nographics -nojournal -noecho pillbox.jou"
        );
    }

    #[test]
    fn acdtool_invocations_run_on_one_task() {
        let launcher = launcher();
        assert_eq!(
            launcher
                .meshconvert_invocation("mesh.gen", Path::new("/scratch"))
                .command_line(),
            "srun -n 1 -c 1 /opt/ace3p/bin/acdtool meshconvert mesh.gen"
        );
        assert_eq!(
            launcher
                .rfpost_invocation("pillbox.rfpost", Path::new("/scratch"))
                .command_line(),
            "srun -n 1 -c 1 /opt/ace3p/bin/acdtool postprocess rf pillbox.rfpost"
        );
    }
}
