use crate::{
    config::Config,
    core::Invocation,
    error::{PipelineError, Result},
    executor::job::Job,
    key::{DemuxExtractor, Mate},
    stage::Stage,
    unit::{ArtifactKind, OriginTag, Unit},
};

/// Split one read pair by inline barcode.
///
/// The demultiplexer is handed one output prefix per mate and writes
/// `<prefix>.<BARCODE>.fastq` for every barcode of the sheet that received
/// reads. Each declared mate file is re-keyed through [`DemuxExtractor`],
/// so the emitted units carry the barcode recovered from their own name.
/// Barcodes without reads leave no file and are dropped; a pair that
/// yields no file at all fails its branch.
///
/// # Arguments
/// * `stage` - The demultiplex stage
/// * `config` - The run configuration (barcode sheet)
/// * `unit` - A read pair unit (R1, R2)
///
/// # Example
/// ```rust, ignore
/// let invocation = demultiplex(&stage, &config, &pair)?;
/// assert_eq!(invocation.outputs.len(), 2 * barcodes.len());
/// ```
pub fn demultiplex(stage: &Stage, config: &Config, unit: &Unit) -> Result<Invocation> {
    let outdir = config.publish_path(ArtifactKind::RawReads, OriginTag::None);
    let sheet = config.global.barcodes.as_ref().ok_or_else(|| {
        PipelineError::Configuration("demultiplexing requires global.barcodes".into())
    })?;

    let (r1, r2) = (&unit.files()[0], &unit.files()[1]);
    let key = unit.key();

    let job = Job::task(stage.kind(), config)
        .workdir(&outdir)
        .opt("--barcodes", sheet)
        .opt("--r1", r1)
        .opt("--r2", r2)
        .opt("--outdir", &outdir)
        .arg("--prefix1")
        .arg(DemuxExtractor::prefix(key, Mate::R1))
        .arg("--prefix2")
        .arg(DemuxExtractor::prefix(key, Mate::R2));

    let mut invocation = Invocation::new(job);
    for (_, barcode) in config.barcodes()? {
        for mate in [Mate::R1, Mate::R2] {
            let name = DemuxExtractor::output_name(key, mate, &barcode);
            let split = DemuxExtractor::extract(&name)?;

            invocation = invocation.optional(
                Unit::raw(outdir.join(&name), split.key, split.mate).with_barcode(split.barcode),
            );
        }
    }

    Ok(invocation)
}
