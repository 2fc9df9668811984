//! Error types for the methylpipe orchestrator

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("ERROR: '{name}' does not match the {rule} filename pattern")]
    PatternMismatch { name: String, rule: &'static str },

    #[error("ERROR: {stage} failed running {program} ({status})\n{diagnostics}")]
    ExternalToolFailure {
        stage: String,
        program: String,
        status: String,
        diagnostics: String,
    },

    #[error("WARN: group {key} ended with {present} of {expected} members")]
    IncompleteGroup {
        key: String,
        present: usize,
        expected: usize,
    },

    #[error("ERROR: '{name}' resolves to {key} {mate}, already taken by '{taken_by}'")]
    KeyCollision {
        name: String,
        key: String,
        mate: &'static str,
        taken_by: String,
    },

    #[error("ERROR: configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("Input pattern error: {0}")]
    Pattern(#[from] glob::PatternError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
