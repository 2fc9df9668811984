pub mod bismark;
pub mod conversion;
pub mod demux;
pub mod fastqc;
pub mod multiqc;
pub mod trim;

use std::path::PathBuf;

use crate::error::{PipelineError, Result};
use crate::executor::job::Job;
use crate::unit::Unit;

/// A unit a stage promises to produce
#[derive(Debug, Clone)]
pub struct Declared {
    pub unit: Unit,
    /// Optional outputs that were not written are dropped, not failed
    pub required: bool,
}

/// The command for one stage invocation and the outputs it declares
#[derive(Debug, Clone)]
pub struct Invocation {
    pub job: Job,
    pub outputs: Vec<Declared>,
}

impl Invocation {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            outputs: Vec::new(),
        }
    }

    pub fn output(mut self, unit: Unit) -> Self {
        self.outputs.push(Declared {
            unit,
            required: true,
        });
        self
    }

    pub fn optional(mut self, unit: Unit) -> Self {
        self.outputs.push(Declared {
            unit,
            required: false,
        });
        self
    }

    /// Turn declared outputs into produced units after the tool exited 0.
    ///
    /// Fails when a required output is missing, or when outputs were
    /// declared and none of them was produced.
    ///
    /// # Arguments
    ///
    /// * `stage` - Stage name used in diagnostics.
    /// * `verify` - Check declared files on disk; dry runs skip this.
    pub fn resolve(self, stage: &str, verify: bool) -> Result<Vec<Unit>> {
        let declared = self.outputs.len();
        let mut units = Vec::with_capacity(declared);

        for declared in self.outputs {
            let missing: Vec<&PathBuf> = if verify {
                declared
                    .unit
                    .files()
                    .iter()
                    .filter(|path| !path.exists())
                    .collect()
            } else {
                Vec::new()
            };

            if missing.is_empty() {
                units.push(declared.unit);
            } else if declared.required {
                return Err(PipelineError::ExternalToolFailure {
                    stage: stage.to_string(),
                    program: self.job.program().to_string(),
                    status: "exit 0".into(),
                    diagnostics: format!(
                        "declared output not produced: {}",
                        missing
                            .iter()
                            .map(|p| p.display().to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                });
            } else {
                log::debug!(
                    "DEBUG [{}]: optional output {} not produced, skipping",
                    stage,
                    missing[0].display()
                );
            }
        }

        if declared > 0 && units.is_empty() {
            return Err(PipelineError::ExternalToolFailure {
                stage: stage.to_string(),
                program: self.job.program().to_string(),
                status: "exit 0".into(),
                diagnostics: format!("none of the {} declared outputs was produced", declared),
            });
        }

        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::NO_INDEX;
    use crate::key::Key;
    use crate::unit::ArtifactKind;

    fn unit(path: PathBuf) -> Unit {
        Unit::new(ArtifactKind::QcReport, Key::new("ABC", NO_INDEX), vec![path])
    }

    #[test]
    fn missing_required_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.html");
        std::fs::write(&present, "ok").unwrap();

        let invocation = Invocation::new(Job::new("fastqc"))
            .output(unit(present.clone()))
            .output(unit(dir.path().join("absent.html")));

        match invocation.resolve("fastqc", true) {
            Err(PipelineError::ExternalToolFailure { diagnostics, .. }) => {
                assert!(diagnostics.contains("absent.html"))
            }
            other => panic!("expected ExternalToolFailure, got {:?}", other),
        }
    }

    #[test]
    fn missing_optional_output_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.fastq");
        std::fs::write(&present, "@r\nA\n+\nI\n").unwrap();

        let units = Invocation::new(Job::new("fastq_demux"))
            .optional(unit(present.clone()))
            .optional(unit(dir.path().join("absent.fastq")))
            .resolve("demultiplex", true)
            .unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].files(), &[present]);
    }

    #[test]
    fn nothing_produced_fails_the_branch() {
        let dir = tempfile::tempdir().unwrap();

        let resolved = Invocation::new(Job::new("fastq_demux"))
            .optional(unit(dir.path().join("ABC_R1.fastq.GATCCA.fastq")))
            .optional(unit(dir.path().join("ABC_R2.fastq.GATCCA.fastq")))
            .resolve("demultiplex", true);

        match resolved {
            Err(PipelineError::ExternalToolFailure { stage, diagnostics, .. }) => {
                assert_eq!(stage, "demultiplex");
                assert!(diagnostics.contains("none of the 2 declared outputs"));
            }
            other => panic!("expected ExternalToolFailure, got {:?}", other),
        }
    }

    #[test]
    fn dry_runs_trust_declarations() {
        let units = Invocation::new(Job::new("bismark"))
            .output(unit(PathBuf::from("/nowhere/x.bam")))
            .resolve("align_primary", false)
            .unwrap();

        assert_eq!(units.len(), 1);
    }
}
