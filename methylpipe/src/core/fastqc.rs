use crate::{
    config::Config,
    core::Invocation,
    error::Result,
    executor::job::Job,
    stage::Stage,
    unit::{fastq_stem, file_name, ArtifactKind, OriginTag, Unit},
};

/// Run FastQC on one raw mate file
///
/// # Arguments
/// * `stage` - The fastqc stage
/// * `config` - The run configuration
/// * `unit` - A raw reads unit holding a single fastq file
///
/// # Returns
/// The invocation, declaring the html and zip reports as one QC unit
///
/// # Example
/// ```rust, ignore
/// let invocation = fastqc(&stage, &config, &unit)?;
/// ```
pub fn fastqc(stage: &Stage, config: &Config, unit: &Unit) -> Result<Invocation> {
    let outdir = config.publish_path(ArtifactKind::QcReport, OriginTag::None);
    let reads = &unit.files()[0];

    let name = file_name(reads);
    let stem = fastq_stem(&name);

    let job = Job::task(stage.kind(), config)
        .workdir(&outdir)
        .opt("--outdir", &outdir)
        .path(reads);

    let report = unit.derive(
        ArtifactKind::QcReport,
        vec![
            outdir.join(format!("{}_fastqc.html", stem)),
            outdir.join(format!("{}_fastqc.zip", stem)),
        ],
    );

    Ok(Invocation::new(job).output(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::NO_INDEX;
    use crate::key::{Key, Mate};
    use crate::stage::StageKind;
    use std::path::PathBuf;

    #[test]
    fn declares_html_and_zip_reports() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::parse(&format!(
            "[global]\ninput = \"*.fastq.gz\"\noutput_dir = \"{}\"\n[params.fastqc]\nquiet = true",
            dir.path().display()
        ))
        .unwrap();

        let unit = Unit::raw(
            PathBuf::from("data/ABC-xyz123S1_R1.fastq.gz"),
            Key::new("ABC", NO_INDEX),
            Mate::R1,
        );

        let invocation = fastqc(&Stage::new(StageKind::Fastqc), &config, &unit).unwrap();
        let outdir = dir.path().join("fastqc");

        assert_eq!(
            invocation.job.cmd(),
            format!(
                "fastqc --quiet --outdir {} data/ABC-xyz123S1_R1.fastq.gz",
                outdir.display()
            )
        );
        assert_eq!(
            invocation.outputs[0].unit.files(),
            &[
                outdir.join("ABC-xyz123S1_R1_fastqc.html"),
                outdir.join("ABC-xyz123S1_R1_fastqc.zip")
            ]
        );
        assert_eq!(invocation.outputs[0].unit.kind(), ArtifactKind::QcReport);
    }
}
