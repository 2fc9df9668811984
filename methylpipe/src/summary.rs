use chrono::{DateTime, Local};
use dashmap::DashMap;
use log::{debug, error, warn};
use parking_lot::Mutex;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::stage::StageState;
use crate::unit::OriginTag;

/// One branch that stopped before reaching its terminal stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchFailure {
    pub stage: String,
    /// Key (plus barcode and origin) of the branch, or the offending filename
    pub branch: String,
    pub origin: OriginTag,
    pub mandatory: bool,
    pub diagnostics: String,
}

/// Lifecycle record of one stage instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageRecord {
    pub state: StageState,
    /// Last state before `Closed`; `Pending` means the stage passed through
    pub outcome: StageState,
    pub invocations: usize,
    pub failures: usize,
}

impl StageRecord {
    fn new() -> Self {
        Self {
            state: StageState::Pending,
            outcome: StageState::Pending,
            invocations: 0,
            failures: 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self.outcome {
            StageState::Pending => "pass-through",
            other => other.as_str(),
        }
    }
}

/// Shared, thread-safe bookkeeping filled while the graph runs
#[derive(Debug, Default)]
pub struct Ledger {
    stages: DashMap<String, StageRecord>,
    failures: Mutex<Vec<BranchFailure>>,
    warnings: Mutex<Vec<String>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, stage: &str) {
        self.stages.insert(stage.to_string(), StageRecord::new());
    }

    /// Move a stage along its lifecycle; illegal moves are ignored
    pub fn advance(&self, stage: &str, next: StageState) {
        let mut record = self
            .stages
            .entry(stage.to_string())
            .or_insert_with(StageRecord::new);

        if !record.state.can_advance(next) {
            warn!(
                "WARN [{}]: ignoring transition {} -> {}",
                stage,
                record.state.as_str(),
                next.as_str()
            );
            return;
        }

        debug!(
            "DEBUG [{}]: {} -> {}",
            stage,
            record.state.as_str(),
            next.as_str()
        );

        record.state = next;
        if next != StageState::Closed {
            record.outcome = next;
        }
    }

    /// Close a running stage as Succeeded or Failed from its invocation count
    pub fn settle(&self, stage: &str) {
        let failed = self
            .stages
            .get(stage)
            .map(|record| record.failures > 0)
            .unwrap_or(false);

        let outcome = if failed {
            StageState::Failed
        } else {
            StageState::Succeeded
        };

        self.advance(stage, outcome);
        self.advance(stage, StageState::Closed);
    }

    pub fn invoked(&self, stage: &str) {
        if let Some(mut record) = self.stages.get_mut(stage) {
            record.invocations += 1;
        }
    }

    pub fn fail(&self, failure: BranchFailure) {
        if let Some(mut record) = self.stages.get_mut(&failure.stage) {
            record.failures += 1;
        }

        if failure.mandatory {
            error!(
                "ERROR [{}]: branch {} failed\n{}",
                failure.stage, failure.branch, failure.diagnostics
            );
        } else {
            warn!(
                "WARN [{}]: control branch {} failed\n{}",
                failure.stage, failure.branch, failure.diagnostics
            );
        }

        self.failures.lock().push(failure);
    }

    pub fn warn(&self, message: String) {
        warn!("{}", message);
        self.warnings.lock().push(message);
    }

    pub fn state(&self, stage: &str) -> Option<StageRecord> {
        self.stages.get(stage).map(|record| *record)
    }

    /// Freeze the ledger into the run outcome
    ///
    /// # Arguments
    ///
    /// * `strict_controls` - Count control branch failures against the run.
    pub fn finish(
        self,
        run_id: String,
        started: DateTime<Local>,
        metadata: &HashMap<String, String>,
        artifacts: Vec<PathBuf>,
        strict_controls: bool,
    ) -> RunSummary {
        let mut failures = self.failures.into_inner();
        failures.sort_by(|a, b| (&a.stage, &a.branch).cmp(&(&b.stage, &b.branch)));

        let success = !failures
            .iter()
            .any(|failure| failure.mandatory || strict_controls);

        RunSummary {
            run_id,
            started,
            finished: Local::now(),
            success,
            stages: self.stages.into_iter().collect(),
            failures,
            warnings: self.warnings.into_inner(),
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            artifacts,
        }
    }
}

/// The outcome of one run, handed to the notification collaborator.
///
/// # Example
///
/// ```rust, ignore
/// let summary = pipeline.run();
/// summary.write(&config.output_dir().join(RUN_SUMMARY))?;
/// std::process::exit(summary.exit_code());
/// ```
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,
    pub success: bool,
    pub stages: BTreeMap<String, StageRecord>,
    pub failures: Vec<BranchFailure>,
    pub warnings: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    /// Deduplicated collection handed to the report stage
    pub artifacts: Vec<PathBuf>,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }

    /// Flat key/value view of the run
    pub fn to_key_values(&self) -> BTreeMap<String, String> {
        let mut kv = BTreeMap::new();

        kv.insert("run_id".to_string(), self.run_id.clone());
        kv.insert("success".to_string(), self.success.to_string());
        kv.insert("started".to_string(), self.started.to_rfc3339());
        kv.insert("finished".to_string(), self.finished.to_rfc3339());
        kv.insert(
            "duration_s".to_string(),
            (self.finished - self.started).num_seconds().to_string(),
        );
        kv.insert("artifacts".to_string(), self.artifacts.len().to_string());
        kv.insert("failures".to_string(), self.failures.len().to_string());

        for (key, value) in &self.metadata {
            kv.insert(format!("metadata.{}", key), value.clone());
        }

        for (name, record) in &self.stages {
            kv.insert(format!("stage.{}", name), record.label().to_string());
        }

        for (n, failure) in self.failures.iter().enumerate() {
            kv.insert(format!("failure.{}.stage", n), failure.stage.clone());
            kv.insert(format!("failure.{}.branch", n), failure.branch.clone());
            kv.insert(format!("failure.{}.origin", n), failure.origin.to_string());
            kv.insert(
                format!("failure.{}.mandatory", n),
                failure.mandatory.to_string(),
            );
            kv.insert(
                format!("failure.{}.diagnostics", n),
                failure.diagnostics.clone(),
            );
        }

        for (n, warning) in self.warnings.iter().enumerate() {
            kv.insert(format!("warning.{}", n), warning.clone());
        }

        kv
    }

    /// Human-readable summary listing every failed branch
    pub fn render(&self) -> String {
        let mut out = format!(
            "run {} {} in {}s: {} artifact(s), {} failed branch(es), {} warning(s)",
            self.run_id,
            if self.success { "succeeded" } else { "failed" },
            (self.finished - self.started).num_seconds(),
            self.artifacts.len(),
            self.failures.len(),
            self.warnings.len()
        );

        for failure in &self.failures {
            out.push_str(&format!(
                "\n  [{}] {}{}: {}",
                failure.stage,
                failure.branch,
                if failure.mandatory { "" } else { " (control)" },
                failure.diagnostics.lines().last().unwrap_or("")
            ));
        }

        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string(&self.to_key_values())?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;

        log::info!("INFO: run summary written to {}", path.display());
        Ok(())
    }
}
