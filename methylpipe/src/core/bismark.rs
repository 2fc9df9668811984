use crate::{
    config::Config,
    core::Invocation,
    error::Result,
    executor::job::Job,
    stage::Stage,
    unit::{file_name, ArtifactKind, Unit},
};

/// Align one read pair with Bismark against the reference set of the stage.
///
/// The three alignment branches only differ in `stage.origin()`, which picks
/// the reference and the output namespace. Outputs are tagged with it.
///
/// # Arguments
/// * `stage` - An alignment stage built with `Stage::align`
/// * `config` - The run configuration
/// * `unit` - A read pair unit (R1, R2)
///
/// # Example
/// ```rust, ignore
/// let stage = Stage::align(OriginTag::MethylatedControl);
/// let invocation = align(&stage, &config, &pair)?;
/// ```
pub fn align(stage: &Stage, config: &Config, unit: &Unit) -> Result<Invocation> {
    let origin = stage.origin();
    let genome = config.reference(origin)?;
    let outdir = config.publish_path(ArtifactKind::AlignedReads, origin);
    let basename = unit.basename();

    let job = Job::task(stage.kind(), config)
        .workdir(&outdir)
        .opt("--genome", genome)
        .opt("-1", &unit.files()[0])
        .opt("-2", &unit.files()[1])
        .opt("-o", &outdir)
        .arg("--basename")
        .arg(basename.as_str());

    let bam = unit
        .derive(
            ArtifactKind::AlignedReads,
            vec![outdir.join(format!("{}_pe.bam", basename))],
        )
        .tagged(origin);
    let report = unit
        .derive(
            ArtifactKind::AlignmentReport,
            vec![outdir.join(format!("{}_PE_report.txt", basename))],
        )
        .tagged(origin);

    Ok(Invocation::new(job).output(bam).output(report))
}

/// Extract methylation calls from one paired-end alignment
///
/// # Arguments
/// * `stage` - The extract stage
/// * `config` - The run configuration
/// * `unit` - An aligned reads unit
pub fn extract(stage: &Stage, config: &Config, unit: &Unit) -> Result<Invocation> {
    let outdir = config.publish_path(ArtifactKind::MethylationCalls, unit.origin());
    let bam = &unit.files()[0];

    let name = file_name(bam);
    let stem = name.strip_suffix(".bam").unwrap_or(&name);

    let job = Job::task(stage.kind(), config)
        .workdir(&outdir)
        .arg("--paired-end")
        .arg("--gzip")
        .opt("-o", &outdir)
        .path(bam);

    let calls = unit.derive(
        ArtifactKind::MethylationCalls,
        vec![outdir.join(format!("CpG_context_{}.txt.gz", stem))],
    );
    let reports = unit.derive(
        ArtifactKind::ExtractionReport,
        vec![
            outdir.join(format!("{}_splitting_report.txt", stem)),
            outdir.join(format!("{}.M-bias.txt", stem)),
        ],
    );

    Ok(Invocation::new(job).output(calls).output(reports))
}

/// Build bedGraph and coverage files from CpG methylation calls
pub fn coverage(stage: &Stage, config: &Config, unit: &Unit) -> Result<Invocation> {
    let outdir = config.publish_path(ArtifactKind::Coverage, unit.origin());
    let bedgraph = format!("{}.bedGraph", unit.basename());

    let job = Job::task(stage.kind(), config)
        .workdir(&outdir)
        .opt("--dir", &outdir)
        .arg("-o")
        .arg(bedgraph.as_str())
        .path(&unit.files()[0]);

    let coverage = unit.derive(
        ArtifactKind::Coverage,
        vec![
            outdir.join(format!("{}.gz", bedgraph)),
            outdir.join(format!("{}.bismark.cov.gz", unit.basename())),
        ],
    );

    Ok(Invocation::new(job).output(coverage))
}
