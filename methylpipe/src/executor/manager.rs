use parking_lot::Mutex;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::consts::*;
use crate::error::{PipelineError, Result};
use crate::executor::job::Job;

/// Runs the external command behind one stage invocation.
///
/// Implementations must be callable from many worker threads at once; the
/// graph caps how many calls are in flight.
pub trait Executor: Send + Sync {
    fn execute(&self, stage: &str, job: &Job) -> Result<()>;

    /// Whether declared outputs are checked on disk after a successful call
    fn verifies_outputs(&self) -> bool {
        true
    }
}

/// Spawns each job as a local process and waits for it
#[derive(Debug, Default, Clone)]
pub struct LocalExecutor;

impl Executor for LocalExecutor {
    fn execute(&self, stage: &str, job: &Job) -> Result<()> {
        log::debug!("DEBUG [{}]: {}", stage, job.cmd());

        job.prepare()
            .map_err(|e| PipelineError::ExternalToolFailure {
                stage: stage.to_string(),
                program: job.program().to_string(),
                status: "not started".into(),
                diagnostics: format!("could not prepare the working directory: {}", e),
            })?;

        let output = Command::new(job.program())
            .args(job.arguments())
            .output()
            .map_err(|e| PipelineError::ExternalToolFailure {
                stage: stage.to_string(),
                program: job.program().to_string(),
                status: "not started".into(),
                diagnostics: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(());
        }

        Err(PipelineError::ExternalToolFailure {
            stage: stage.to_string(),
            program: job.program().to_string(),
            status: output.status.to_string(),
            diagnostics: tail(&String::from_utf8_lossy(&output.stderr), DIAGNOSTIC_LINES),
        })
    }
}

/// Dry-run executor: renders every job into a shell script.
///
/// Nothing is written under the output root; directory creation and
/// staged input files are rendered into the script with the command.
#[derive(Debug)]
pub struct ScriptExecutor {
    path: PathBuf,
    lines: Mutex<Vec<String>>,
}

impl ScriptExecutor {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of commands recorded so far
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the recorded commands, in submission order
    pub fn write(&self) -> Result<()> {
        let mut file = std::fs::File::create(&self.path)?;

        writeln!(file, "#!/usr/bin/env bash")?;
        writeln!(file, "set -euo pipefail")?;
        for line in self.lines.lock().iter() {
            writeln!(file, "{}", line)?;
        }

        log::info!(
            "INFO: wrote {} commands to {}",
            self.len(),
            self.path.display()
        );

        Ok(())
    }
}

impl Executor for ScriptExecutor {
    fn execute(&self, stage: &str, job: &Job) -> Result<()> {
        self.lines
            .lock()
            .push(format!("# {}\n{}", stage, job.script()));
        Ok(())
    }

    fn verifies_outputs(&self) -> bool {
        false
    }
}

/// Keep the last `n` non-empty lines of a diagnostic stream
fn tail(stream: &str, n: usize) -> String {
    let lines: Vec<&str> = stream.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
