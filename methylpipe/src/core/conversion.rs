use crate::{
    config::Config,
    core::Invocation,
    error::Result,
    executor::job::Job,
    stage::Stage,
    unit::{ArtifactKind, Unit},
};

/// Summarize the bisulfite conversion rate of a control branch
///
/// # Arguments
/// * `stage` - The conversion stage
/// * `config` - The run configuration
/// * `unit` - Methylation calls from a methylated or unmethylated control
///
/// # Example
/// ```rust, ignore
/// let invocation = conversion(&stage, &config, &calls)?;
/// ```
pub fn conversion(stage: &Stage, config: &Config, unit: &Unit) -> Result<Invocation> {
    let outdir = config.publish_path(ArtifactKind::ConversionSummary, unit.origin());
    let summary = outdir.join(format!("{}.conversion.txt", unit.basename()));

    let job = Job::task(stage.kind(), config)
        .workdir(&outdir)
        .arg("--origin")
        .arg(unit.origin().as_str())
        .opt("--calls", &unit.files()[0])
        .opt("--output", &summary);

    Ok(Invocation::new(job).output(unit.derive(ArtifactKind::ConversionSummary, vec![summary])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::NO_INDEX;
    use crate::key::Key;
    use crate::stage::StageKind;
    use crate::unit::OriginTag;
    use std::path::PathBuf;

    #[test]
    fn labels_the_control_origin() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::parse(&format!(
            "[global]\ninput = \"*.fastq.gz\"\noutput_dir = \"{}\"",
            dir.path().display()
        ))
        .unwrap();

        let calls = Unit::new(
            ArtifactKind::MethylationCalls,
            Key::new("ABC", NO_INDEX),
            vec![PathBuf::from("CpG_context_ABC_index_pe.txt.gz")],
        )
        .tagged(OriginTag::MethylatedControl);

        let invocation = conversion(&Stage::new(StageKind::Conversion), &config, &calls).unwrap();
        let summary = dir
            .path()
            .join("bismark/conversion/methylated_control/ABC_index.conversion.txt");

        assert!(invocation
            .job
            .cmd()
            .starts_with("bisulfite_conversion --origin methylated_control --calls "));
        assert_eq!(invocation.outputs[0].unit.files(), &[summary]);
        assert_eq!(
            invocation.outputs[0].unit.origin(),
            OriginTag::MethylatedControl
        );
    }
}
