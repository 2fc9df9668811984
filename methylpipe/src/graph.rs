//! The orchestrator.
//!
//! Every edge of the bisulfite DAG is created once in [`Pipeline::run`] and
//! handed to the stage that consumes it; nothing is looked up by name.
//!
//! ```text
//! seed -+-> fastqc ------------------------------------------------+
//!       +-> pair -> demultiplex -> pair -> trim -+-> align_primary  |
//!                                                +-> align_methyl.. +-> report
//!                                                +-> align_unmeth.. |
//!                     merge | join(3) -> extract -> coverage (primary)
//!                                                 -> conversion (controls)
//! ```

use chrono::Local;
use hashbrown::hash_map::{Entry, HashMap};
use log::{debug, info};
use rayon::{ThreadPool, ThreadPoolBuilder};

use std::path::PathBuf;
use std::thread::Scope;

use crate::channel::*;
use crate::config::{Config, Topology};
use crate::consts::*;
use crate::core::multiqc::dedup;
use crate::error::{PipelineError, Result};
use crate::executor::manager::Executor;
use crate::key::{Key, KeyExtractor, Mate};
use crate::stage::{Stage, StageKind, StageState};
use crate::summary::{BranchFailure, Ledger, RunSummary};
use crate::unit::{file_name, GroupKey, OriginTag, Unit};

/// A wired, validated pipeline ready to run once
pub struct Pipeline<'a> {
    config: &'a Config,
    executor: &'a dyn Executor,
    pool: ThreadPool,
    extractor: KeyExtractor,
    ledger: Ledger,
    inputs: Vec<PathBuf>,
}

impl<'a> Pipeline<'a> {
    /// Validate the configuration and prepare the worker pool.
    ///
    /// Fails with a `Configuration` error before any stage runs.
    ///
    /// # Example
    ///
    /// ```rust, ignore
    /// let summary = Pipeline::build(&config, &LocalExecutor)?.run();
    /// ```
    pub fn build(config: &'a Config, executor: &'a dyn Executor) -> Result<Self> {
        config.validate()?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.global.max_forks)
            .thread_name(|i| format!("{}-{}", METHYLPIPE, i))
            .build()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        let inputs = config.input_files()?;
        info!(
            "INFO: {} input file(s), up to {} concurrent invocations",
            inputs.len(),
            config.global.max_forks
        );

        Ok(Self {
            config,
            executor,
            pool,
            extractor: KeyExtractor::new(config.global.indexed),
            ledger: Ledger::new(),
            inputs,
        })
    }

    /// Drive the graph until every branch is terminal
    pub fn run(self) -> RunSummary {
        let started = Local::now();
        info!(
            "INFO: starting run {} ({} topology)",
            self.config.get_run_id(),
            self.config.global.topology
        );

        let artifacts = std::thread::scope(|scope| self.wire(scope));

        let Pipeline { config, ledger, .. } = self;
        ledger.finish(
            config.get_run_id(),
            started,
            &config.metadata,
            artifacts,
            config.global.strict_controls,
        )
    }

    fn wire<'scope>(&'scope self, scope: &'scope Scope<'scope, '_>) -> Vec<PathBuf> {
        let [raw_qc, raw]: [Receiver<Unit>; 2] = fan_out(scope, self.seed());
        let mut reports = vec![self.drive(scope, Stage::new(StageKind::Fastqc), raw_qc)];

        let pairs = self.pair(scope, raw);

        let demux = Stage::new(StageKind::Demultiplex);
        let split = demux.activate(self.config);
        let pairs = self.drive(scope, demux, pairs);
        let pairs = if split { self.pair(scope, pairs) } else { pairs };

        let trimmed = self.drive(scope, Stage::new(StageKind::Trim), pairs);
        let (trim_reports, trimmed) = partition(scope, trimmed, |u| u.kind().is_reportable());
        reports.push(trim_reports);

        let lanes: [Receiver<Unit>; ALIGNMENT_BRANCHES] = fan_out(scope, trimmed);
        let mut aligned = Vec::with_capacity(ALIGNMENT_BRANCHES);

        for (origin, lane) in OriginTag::BRANCHES.into_iter().zip(lanes) {
            let out = self.drive(scope, Stage::align(origin), lane);
            let (align_reports, bams) = partition(scope, out, |u| u.kind().is_reportable());
            reports.push(align_reports);
            aligned.push(bams);
        }

        let aligned = match self.config.global.topology {
            Topology::Independent => merge(scope, aligned),
            Topology::Joined => {
                let joined = group_by(
                    scope,
                    aligned,
                    ALIGNMENT_BRANCHES,
                    Unit::group_key,
                    move |leftovers| self.incomplete(BRANCH_JOIN, ALIGNMENT_BRANCHES, leftovers),
                );
                flatten(scope, joined)
            }
        };

        let extracted = self.drive(scope, Stage::new(StageKind::Extract), aligned);
        let (extract_reports, calls) = partition(scope, extracted, |u| u.kind().is_reportable());
        reports.push(extract_reports);

        let (primary, controls) = partition(scope, calls, |u| u.origin() == OriginTag::Primary);
        reports.push(self.drive(scope, Stage::new(StageKind::Coverage), primary));
        reports.push(self.drive(scope, Stage::new(StageKind::Conversion), controls));

        // INFO: pass-through stages forward non-reportable units; drop them here
        let collected = filter_map(scope, merge(scope, reports), |unit: Unit| {
            Some(unit).filter(|u| u.kind().is_reportable())
        });

        self.report(collected)
    }

    /// Key every input file.
    ///
    /// Names matching no rule fail their own branch. So does a file whose
    /// (key, mate) was already claimed by an earlier input, since both would
    /// publish to the same paths.
    fn seed(&self) -> Receiver<Unit> {
        let (tx, rx) = channel();
        let mut claimed: HashMap<(Key, Mate), String> = HashMap::new();

        for path in &self.inputs {
            let name = file_name(path);
            let unit = self.extractor.extract(&name).and_then(|key| {
                let mate = self.extractor.mate(&name)?;

                match claimed.entry((key.clone(), mate)) {
                    Entry::Occupied(first) => Err(PipelineError::KeyCollision {
                        name: name.clone(),
                        key: key.to_string(),
                        mate: mate.as_str(),
                        taken_by: first.get().clone(),
                    }),
                    Entry::Vacant(slot) => {
                        slot.insert(name.clone());
                        Ok(Unit::raw(path.clone(), key, mate))
                    }
                }
            });

            match unit {
                Ok(unit) => {
                    debug!("DEBUG [{}]: {} -> {}", SEED, name, unit.branch());
                    let _ = tx.send(unit);
                }
                Err(e) => self.ledger.fail(BranchFailure {
                    stage: SEED.to_string(),
                    branch: name,
                    origin: OriginTag::None,
                    mandatory: true,
                    diagnostics: e.to_string(),
                }),
            }
        }

        rx
    }

    /// Bind one stage to its input channel and return its output channel.
    ///
    /// An inactive stage is closed right away and its input channel is
    /// returned as is. An active one gets a driver thread that hands every
    /// input unit to the worker pool and closes the output once all of
    /// them have been invoked.
    fn drive<'scope>(
        &'scope self,
        scope: &'scope Scope<'scope, '_>,
        stage: Stage,
        input: Receiver<Unit>,
    ) -> Receiver<Unit> {
        self.ledger.register(stage.name());

        if !stage.activate(self.config) {
            info!("INFO [{}]: inactive, passing units through", stage.name());
            self.ledger.advance(stage.name(), StageState::Closed);
            return input;
        }

        let (tx, rx) = channel();

        scope.spawn(move || {
            self.ledger.advance(stage.name(), StageState::Running);

            self.pool.in_place_scope(|pool| {
                for unit in input.iter() {
                    let (stage, tx) = (&stage, tx.clone());
                    pool.spawn(move |_| {
                        for produced in self.invoke(stage, &[unit]).unwrap_or_default() {
                            let _ = tx.send(produced);
                        }
                    });
                }
            });

            drop(tx);
            self.ledger.settle(stage.name());
            info!("INFO [{}]: closed", stage.name());
        });

        rx
    }

    /// Run one invocation, recording a branch failure instead of propagating
    fn invoke(&self, stage: &Stage, inputs: &[Unit]) -> Option<Vec<Unit>> {
        self.ledger.invoked(stage.name());

        match stage.invoke(inputs, self.config, self.executor) {
            Ok(units) => Some(units),
            Err(e) => {
                let origin = match (stage.origin(), inputs) {
                    (OriginTag::None, [unit]) => unit.origin(),
                    (origin, _) => origin,
                };
                let branch = match inputs {
                    [unit] => unit.clone().tagged(origin).branch(),
                    _ => stage.name().to_string(),
                };

                self.ledger.fail(BranchFailure {
                    stage: stage.name().to_string(),
                    branch,
                    origin,
                    mandatory: origin.is_mandatory(),
                    diagnostics: e.to_string(),
                });
                None
            }
        }
    }

    /// Regroup single mates into read pairs by (key, barcode)
    fn pair<'scope>(
        &'scope self,
        scope: &'scope Scope<'scope, '_>,
        mates: Receiver<Unit>,
    ) -> Receiver<Unit> {
        let groups = group_by(
            scope,
            vec![mates],
            MATES_PER_PAIR,
            Unit::group_key,
            move |leftovers| self.incomplete(PAIRING, MATES_PER_PAIR, leftovers),
        );

        filter_map(scope, groups, move |mates: Vec<Unit>| {
            let branch = mates.first().map(Unit::branch).unwrap_or_default();

            Unit::pair(mates).or_else(|| {
                self.ledger.fail(BranchFailure {
                    stage: PAIRING.to_string(),
                    branch,
                    origin: OriginTag::None,
                    mandatory: true,
                    diagnostics: "group does not hold exactly one R1 and one R2".into(),
                });
                None
            })
        })
    }

    fn incomplete(&self, stage: &str, expected: usize, leftovers: Vec<(GroupKey, Vec<Unit>)>) {
        for ((key, barcode), members) in leftovers {
            let key = match barcode {
                Some(barcode) => format!("{}/{}", key, barcode),
                None => key.to_string(),
            };

            let warning = PipelineError::IncompleteGroup {
                key,
                present: members.len(),
                expected,
            };
            let message = format!("{} at {}", warning, stage);

            // a dropped mandatory member never reaches its terminal stage
            if let Some(unit) = members.iter().find(|u| u.origin().is_mandatory()) {
                self.ledger.fail(BranchFailure {
                    stage: stage.to_string(),
                    branch: unit.branch(),
                    origin: unit.origin(),
                    mandatory: true,
                    diagnostics: message.clone(),
                });
            }

            self.ledger.warn(message);
        }
    }

    /// Wait for every reportable artifact, then hand them to the report stage.
    ///
    /// An empty collection is a no-op. The deduplicated collection is
    /// returned even when the report stage itself is inactive or fails.
    fn report(&self, collected: Receiver<Unit>) -> Vec<PathBuf> {
        let stage = Stage::new(StageKind::Report);
        self.ledger.register(stage.name());

        let mut units = match collect_all(collected) {
            Collected::Empty => {
                info!("INFO [{}]: nothing to report", stage.name());
                self.ledger.advance(stage.name(), StageState::Closed);
                return Vec::new();
            }
            Collected::All(units) => units,
        };

        units.sort_by(|a, b| a.files().cmp(b.files()));
        let artifacts = dedup(&units);

        if !stage.activate(self.config) {
            info!(
                "INFO [{}]: inactive, {} artifact(s) left unreported",
                stage.name(),
                artifacts.len()
            );
            self.ledger.advance(stage.name(), StageState::Closed);
            return artifacts;
        }

        self.ledger.advance(stage.name(), StageState::Running);
        if let Some(report) = self.pool.install(|| self.invoke(&stage, &units)) {
            for path in report.iter().flat_map(|unit| unit.files()) {
                info!("INFO [{}]: report at {}", stage.name(), path.display());
            }
        }
        self.ledger.settle(stage.name());

        artifacts
    }
}
