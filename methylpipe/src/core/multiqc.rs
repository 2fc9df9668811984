use hashbrown::HashSet;

use std::path::PathBuf;

use crate::{
    config::Config,
    consts::*,
    core::Invocation,
    error::Result,
    executor::job::Job,
    key::Key,
    stage::Stage,
    unit::{ArtifactKind, OriginTag, Unit},
};

/// Aggregate every collected QC artifact into one MultiQC report.
///
/// Paths are deduplicated, first occurrence wins, and staged as a file
/// list that MultiQC reads instead of scanning the output tree. The list
/// is written by the executor, right before MultiQC starts.
///
/// # Arguments
/// * `stage` - The report stage
/// * `config` - The run configuration
/// * `units` - The complete terminal collection
///
/// # Example
/// ```rust, ignore
/// let invocation = multiqc(&stage, &config, &collected)?;
/// ```
pub fn multiqc(stage: &Stage, config: &Config, units: &[Unit]) -> Result<Invocation> {
    let outdir = config.publish_path(ArtifactKind::Report, OriginTag::None);
    let list = outdir.join(MULTIQC_FILE_LIST);

    let files = dedup(units);
    let contents: String = files
        .iter()
        .map(|file| format!("{}\n", file.display()))
        .collect();

    log::info!(
        "INFO [{}]: {} unique artifacts from {} units",
        stage.name(),
        files.len(),
        units.len()
    );

    let job = Job::task(stage.kind(), config)
        .workdir(&outdir)
        .stage_file(list.clone(), contents)
        .arg("--force")
        .opt("--outdir", &outdir)
        .opt("--file-list", &list);

    let report = Unit::new(
        ArtifactKind::Report,
        Key::new(METHYLPIPE, NO_INDEX),
        vec![outdir.join(MULTIQC_REPORT)],
    );

    Ok(Invocation::new(job).output(report))
}

/// Unique file paths across units, in collection order
pub fn dedup(units: &[Unit]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();

    units
        .iter()
        .flat_map(|unit| unit.files().iter())
        .filter(|path| seen.insert(path.as_path()))
        .cloned()
        .collect()
}
