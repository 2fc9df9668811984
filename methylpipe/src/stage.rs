use crate::config::Config;
use crate::consts::*;
use crate::core::{self, Invocation};
use crate::error::{PipelineError, Result};
use crate::executor::manager::Executor;
use crate::unit::{OriginTag, Unit};

/// An enum representing the kinds of processing stages.
///
/// # Example
///
/// ```rust, ignore
/// let kind = StageKind::from_str("trim")?;
/// assert_eq!(kind, StageKind::Trim);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub enum StageKind {
    Fastqc,
    Demultiplex,
    Trim,
    Align,
    Extract,
    Coverage,
    Conversion,
    Report,
}

impl StageKind {
    pub fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "fastqc" => Ok(Self::Fastqc),
            "demultiplex" => Ok(Self::Demultiplex),
            "trim" => Ok(Self::Trim),
            "align" => Ok(Self::Align),
            "extract" => Ok(Self::Extract),
            "coverage" => Ok(Self::Coverage),
            "conversion" => Ok(Self::Conversion),
            "report" => Ok(Self::Report),
            _ => Err(format!("ERROR: Invalid pipeline stage: {}", s)),
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Fastqc => "fastqc",
            Self::Demultiplex => "demultiplex",
            Self::Trim => "trim",
            Self::Align => "align",
            Self::Extract => "extract",
            Self::Coverage => "coverage",
            Self::Conversion => "conversion",
            Self::Report => "report",
        }
    }

    /// Executable used when `[packages]` does not override it
    pub fn default_program(&self) -> &'static str {
        match self {
            Self::Fastqc => FASTQC,
            Self::Demultiplex => DEMULTIPLEX,
            Self::Trim => TRIM_GALORE,
            Self::Align => BISMARK,
            Self::Extract => METHYLATION_EXTRACTOR,
            Self::Coverage => BEDGRAPH,
            Self::Conversion => CONVERSION,
            Self::Report => MULTIQC,
        }
    }

    /// Shape of the input one invocation consumes
    pub fn arity(&self) -> Arity {
        match self {
            Self::Fastqc | Self::Extract | Self::Coverage | Self::Conversion => Arity::Single,
            Self::Demultiplex | Self::Trim | Self::Align => Arity::Pair,
            Self::Report => Arity::Collected,
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

/// What one invocation consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// One unit holding one file set
    Single,
    /// One read-pair unit (R1, R2)
    Pair,
    /// Every unit of an upstream collection at once
    Collected,
}

/// Lifecycle of a stage instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Closed,
}

impl StageState {
    /// Allowed moves: Pending -> Running -> {Succeeded | Failed} -> Closed,
    /// plus Pending -> Closed for inactive (pass-through) stages
    pub fn can_advance(self, next: StageState) -> bool {
        use StageState::*;

        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Closed)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Succeeded, Closed)
                | (Failed, Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageState::Pending => "pending",
            StageState::Running => "running",
            StageState::Succeeded => "succeeded",
            StageState::Failed => "failed",
            StageState::Closed => "closed",
        }
    }
}

/// Static descriptor of one processing stage.
///
/// The three alignment branches are three instances of the same kind,
/// differing only in their origin tag (which picks the reference set and
/// the output namespace).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    kind: StageKind,
    origin: OriginTag,
    name: String,
}

impl Stage {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            origin: OriginTag::None,
            name: kind.to_str().to_string(),
        }
    }

    /// Alignment stage bound to one reference set
    pub fn align(origin: OriginTag) -> Self {
        Self {
            kind: StageKind::Align,
            origin,
            name: format!("{}_{}", StageKind::Align, origin),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn origin(&self) -> OriginTag {
        self.origin
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        self.kind.arity()
    }

    /// Whether the stage participates in this run
    pub fn activate(&self, config: &Config) -> bool {
        let global = &config.global;

        match self.kind {
            StageKind::Fastqc => !global.skip_fastqc,
            StageKind::Demultiplex => global.demultiplex,
            StageKind::Trim => global.trim,
            StageKind::Report => !global.skip_report,
            StageKind::Align
            | StageKind::Extract
            | StageKind::Coverage
            | StageKind::Conversion => true,
        }
    }

    /// Build the command and declared outputs for one input
    pub fn prepare(&self, inputs: &[Unit], config: &Config) -> Result<Invocation> {
        self.check_arity(inputs)?;

        match self.kind {
            StageKind::Fastqc => core::fastqc::fastqc(self, config, &inputs[0]),
            StageKind::Demultiplex => core::demux::demultiplex(self, config, &inputs[0]),
            StageKind::Trim => core::trim::trim_galore(self, config, &inputs[0]),
            StageKind::Align => core::bismark::align(self, config, &inputs[0]),
            StageKind::Extract => core::bismark::extract(self, config, &inputs[0]),
            StageKind::Coverage => core::bismark::coverage(self, config, &inputs[0]),
            StageKind::Conversion => core::conversion::conversion(self, config, &inputs[0]),
            StageKind::Report => core::multiqc::multiqc(self, config, inputs),
        }
    }

    /// Run the external tool for one input and return the produced units.
    ///
    /// A non-zero exit, or a required declared output missing afterwards,
    /// is an `ExternalToolFailure`; there is no partial success.
    pub fn invoke(
        &self,
        inputs: &[Unit],
        config: &Config,
        executor: &dyn Executor,
    ) -> Result<Vec<Unit>> {
        let invocation = self.prepare(inputs, config)?;

        executor.execute(&self.name, &invocation.job)?;

        invocation.resolve(&self.name, executor.verifies_outputs())
    }

    fn check_arity(&self, inputs: &[Unit]) -> Result<()> {
        let ok = match self.arity() {
            Arity::Single => inputs.len() == 1,
            Arity::Pair => inputs.len() == 1 && inputs[0].files().len() == MATES_PER_PAIR,
            Arity::Collected => !inputs.is_empty(),
        };

        if ok {
            Ok(())
        } else {
            Err(PipelineError::ExternalToolFailure {
                stage: self.name.clone(),
                program: self.kind.default_program().to_string(),
                status: "not started".into(),
                diagnostics: format!(
                    "expected {:?} input, got {} unit(s) with {} file(s)",
                    self.arity(),
                    inputs.len(),
                    inputs.iter().map(|u| u.files().len()).sum::<usize>()
                ),
            })
        }
    }
}
