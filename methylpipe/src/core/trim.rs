use crate::{
    config::{Config, ParamValue},
    consts::GZ,
    core::Invocation,
    error::Result,
    executor::job::Job,
    stage::{Stage, StageKind},
    unit::{fastq_stem, file_name, ArtifactKind, OriginTag, Unit},
};

/// Run Trim Galore in paired mode
///
/// # Arguments
/// * `stage` - The trim stage
/// * `config` - The run configuration
/// * `unit` - A read pair unit (R1, R2)
///
/// # Returns
/// The invocation, declaring the validated pair and both trimming reports
///
/// # Example
/// ```rust, ignore
/// let invocation = trim_galore(&stage, &config, &pair)?;
/// ```
pub fn trim_galore(stage: &Stage, config: &Config, unit: &Unit) -> Result<Invocation> {
    let outdir = config.publish_path(ArtifactKind::ReadPair, OriginTag::None);

    let job = Job::task(stage.kind(), config)
        .workdir(&outdir)
        .arg("--paired")
        .opt("-o", &outdir)
        .args(unit.files().iter().map(|f| f.to_string_lossy().into_owned()));

    let dont_gzip = matches!(
        config
            .params
            .get(&StageKind::Trim)
            .and_then(|params| params.get("dont_gzip")),
        Some(ParamValue::Bool(true))
    );

    let mut validated = Vec::with_capacity(unit.files().len());
    let mut reports = Vec::with_capacity(unit.files().len());

    for (n, reads) in unit.files().iter().enumerate() {
        let name = file_name(reads);
        let ext = if name.ends_with(GZ) && !dont_gzip {
            "fq.gz"
        } else {
            "fq"
        };

        validated.push(outdir.join(format!("{}_val_{}.{}", fastq_stem(&name), n + 1, ext)));
        reports.push(outdir.join(format!("{}_trimming_report.txt", name)));
    }

    Ok(Invocation::new(job)
        .output(unit.derive(ArtifactKind::ReadPair, validated))
        .output(unit.derive(ArtifactKind::TrimReport, reports)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::NO_INDEX;
    use crate::key::Key;
    use std::path::PathBuf;

    fn pair(r1: &str, r2: &str) -> Unit {
        Unit::new(
            ArtifactKind::ReadPair,
            Key::new("ABC", NO_INDEX),
            vec![PathBuf::from(r1), PathBuf::from(r2)],
        )
    }

    fn config(dir: &std::path::Path, params: &str) -> Config {
        Config::parse(&format!(
            "[global]\ninput = \"*.fastq.gz\"\noutput_dir = \"{}\"\n{}",
            dir.display(),
            params
        ))
        .unwrap()
    }

    #[test]
    fn declares_validated_pair_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "[params.trim]\nquality = 20");
        let unit = pair("in/ABC_R1.fastq.gz", "in/ABC_R2.fastq.gz");

        let invocation = trim_galore(&Stage::new(StageKind::Trim), &config, &unit).unwrap();
        let outdir = dir.path().join("trim_galore");

        assert_eq!(
            invocation.job.cmd(),
            format!(
                "trim_galore --quality 20 --paired -o {} in/ABC_R1.fastq.gz in/ABC_R2.fastq.gz",
                outdir.display()
            )
        );

        let trimmed = &invocation.outputs[0].unit;
        assert_eq!(trimmed.kind(), ArtifactKind::ReadPair);
        assert_eq!(
            trimmed.files(),
            &[outdir.join("ABC_R1_val_1.fq.gz"), outdir.join("ABC_R2_val_2.fq.gz")]
        );
        assert_eq!(
            invocation.outputs[1].unit.files()[1],
            outdir.join("ABC_R2.fastq.gz_trimming_report.txt")
        );
    }

    #[test]
    fn uncompressed_outputs_follow_dont_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "[params.trim]\ndont_gzip = true");
        let unit = pair("ABC_R1.fastq.gz", "ABC_R2.fastq.gz");

        let invocation = trim_galore(&Stage::new(StageKind::Trim), &config, &unit).unwrap();

        assert!(invocation.outputs[0].unit.files()[0]
            .to_string_lossy()
            .ends_with("ABC_R1_val_1.fq"));
        assert!(invocation.job.cmd().contains("--dont_gzip"));
    }
}
