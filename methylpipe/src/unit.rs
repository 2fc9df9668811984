use serde::Serialize;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::consts::*;
use crate::key::{Barcode, Key, Mate};

/// Which alignment reference a unit descends from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum OriginTag {
    Primary,
    MethylatedControl,
    UnmethylatedControl,
    None,
}

impl OriginTag {
    /// The three alignment branches, in fan-out order
    pub const BRANCHES: [OriginTag; ALIGNMENT_BRANCHES] = [
        OriginTag::Primary,
        OriginTag::MethylatedControl,
        OriginTag::UnmethylatedControl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OriginTag::Primary => "primary",
            OriginTag::MethylatedControl => "methylated_control",
            OriginTag::UnmethylatedControl => "unmethylated_control",
            OriginTag::None => "none",
        }
    }

    /// Whether failures on this origin count against the run
    pub fn is_mandatory(&self) -> bool {
        match self {
            OriginTag::Primary | OriginTag::None => true,
            OriginTag::MethylatedControl | OriginTag::UnmethylatedControl => false,
        }
    }
}

impl fmt::Display for OriginTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a unit's files are, set once by the stage that produces it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ArtifactKind {
    RawReads,
    ReadPair,
    QcReport,
    TrimReport,
    AlignedReads,
    AlignmentReport,
    MethylationCalls,
    ExtractionReport,
    Coverage,
    ConversionSummary,
    Report,
}

impl ArtifactKind {
    /// Whether units of this kind end up in the aggregated report
    pub fn is_reportable(&self) -> bool {
        match self {
            ArtifactKind::QcReport
            | ArtifactKind::TrimReport
            | ArtifactKind::AlignmentReport
            | ArtifactKind::ExtractionReport
            | ArtifactKind::Coverage
            | ArtifactKind::ConversionSummary => true,
            ArtifactKind::RawReads
            | ArtifactKind::ReadPair
            | ArtifactKind::AlignedReads
            | ArtifactKind::MethylationCalls
            | ArtifactKind::Report => false,
        }
    }
}

/// Publish directory (relative to the output root) for an artifact.
///
/// Side reports share the directory of the artifact they describe, since
/// the tools write them next to their main output.
///
/// # Example
///
/// ```rust, ignore
/// let dir = publish_dir(ArtifactKind::AlignedReads, OriginTag::MethylatedControl);
/// assert_eq!(dir, PathBuf::from("bismark/alignments/methylated_control"));
/// ```
pub fn publish_dir(kind: ArtifactKind, origin: OriginTag) -> PathBuf {
    let base = match kind {
        ArtifactKind::RawReads => PathBuf::from(DEMUX_DIR),
        ArtifactKind::ReadPair | ArtifactKind::TrimReport => PathBuf::from(TRIM_DIR),
        ArtifactKind::QcReport => PathBuf::from(FASTQC_DIR),
        ArtifactKind::AlignedReads | ArtifactKind::AlignmentReport => {
            Path::new(BISMARK_DIR).join(ALIGNMENTS_DIR)
        }
        ArtifactKind::MethylationCalls | ArtifactKind::ExtractionReport => {
            Path::new(BISMARK_DIR).join(CALLS_DIR)
        }
        ArtifactKind::Coverage => Path::new(BISMARK_DIR).join(COVERAGE_DIR),
        ArtifactKind::ConversionSummary => Path::new(BISMARK_DIR).join(CONVERSION_DIR),
        ArtifactKind::Report => PathBuf::from(MULTIQC_DIR),
    };

    match origin {
        OriginTag::None => base,
        tagged => base.join(tagged.as_str()),
    }
}

/// Grouping key: the sample key plus the barcode once demultiplexed
pub type GroupKey = (Key, Option<Barcode>);

/// The atomic item flowing through the graph.
///
/// Units are never mutated after construction; stages build successors
/// with [`Unit::derive`] and the consuming builder methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    files: Vec<PathBuf>,
    key: Key,
    barcode: Option<Barcode>,
    mate: Option<Mate>,
    origin: OriginTag,
    kind: ArtifactKind,
}

impl Unit {
    pub fn new(kind: ArtifactKind, key: Key, files: Vec<PathBuf>) -> Self {
        Self {
            files,
            key,
            barcode: None,
            mate: None,
            origin: OriginTag::None,
            kind,
        }
    }

    /// A single raw mate file as found by the input glob
    pub fn raw(path: PathBuf, key: Key, mate: Mate) -> Self {
        Self::new(ArtifactKind::RawReads, key, vec![path]).with_mate(mate)
    }

    pub fn with_barcode(mut self, barcode: Barcode) -> Self {
        self.barcode = Some(barcode);
        self
    }

    pub fn with_mate(mut self, mate: Mate) -> Self {
        self.mate = Some(mate);
        self
    }

    pub fn tagged(mut self, origin: OriginTag) -> Self {
        self.origin = origin;
        self
    }

    /// Successor unit carrying the same key, barcode and origin
    pub fn derive(&self, kind: ArtifactKind, files: Vec<PathBuf>) -> Self {
        Self {
            files,
            key: self.key.clone(),
            barcode: self.barcode,
            mate: None,
            origin: self.origin,
            kind,
        }
    }

    /// Join two mates of one group into a read pair, R1 first
    ///
    /// Returns `None` unless the group holds exactly one R1 and one R2.
    pub fn pair(mut mates: Vec<Unit>) -> Option<Self> {
        if mates.len() != MATES_PER_PAIR {
            return None;
        }

        mates.sort_by_key(|unit| unit.mate);
        if mates[0].mate != Some(Mate::R1) || mates[1].mate != Some(Mate::R2) {
            return None;
        }

        let files = mates
            .iter()
            .flat_map(|unit| unit.files.iter().cloned())
            .collect();

        Some(mates[0].derive(ArtifactKind::ReadPair, files))
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn barcode(&self) -> Option<&Barcode> {
        self.barcode.as_ref()
    }

    pub fn mate(&self) -> Option<Mate> {
        self.mate
    }

    pub fn origin(&self) -> OriginTag {
        self.origin
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn group_key(&self) -> GroupKey {
        (self.key.clone(), self.barcode)
    }

    /// Filesystem-safe name of the branch, e.g. `ABC_index_GATCCA`
    pub fn basename(&self) -> String {
        match &self.barcode {
            Some(barcode) => format!("{}_{}_{}", self.key.sample_id, self.key.index_id, barcode),
            None => format!("{}_{}", self.key.sample_id, self.key.index_id),
        }
    }

    /// Human-readable branch label used in the run summary
    pub fn branch(&self) -> String {
        let mut label = self.key.to_string();
        if let Some(barcode) = &self.barcode {
            label.push('/');
            label.push_str(barcode.as_str());
        }
        if self.origin != OriginTag::None {
            label.push_str(&format!(" [{}]", self.origin));
        }
        label
    }
}

/// Strip the fastq extension from a filename
///
/// # Example
///
/// ```rust, ignore
/// assert_eq!(fastq_stem("ABC_R1.fastq.gz"), "ABC_R1");
/// ```
pub fn fastq_stem(name: &str) -> &str {
    FASTQ_EXTENSIONS
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(name)
}

/// File name of a path as an owned string
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mate(name: &str, mate: Mate) -> Unit {
        Unit::raw(PathBuf::from(name), Key::new("ABC", NO_INDEX), mate)
    }

    #[test]
    fn pairs_mates_in_r1_r2_order() {
        let pair = Unit::pair(vec![
            mate("ABC_R2.fastq.gz", Mate::R2),
            mate("ABC_R1.fastq.gz", Mate::R1),
        ])
        .unwrap();

        assert_eq!(pair.kind(), ArtifactKind::ReadPair);
        assert_eq!(
            pair.files(),
            &[PathBuf::from("ABC_R1.fastq.gz"), PathBuf::from("ABC_R2.fastq.gz")]
        );
        assert_eq!(pair.mate(), None);
    }

    #[test]
    fn refuses_two_copies_of_one_mate() {
        assert!(Unit::pair(vec![
            mate("ABC_R1.fastq.gz", Mate::R1),
            mate("ABC_R1.fastq.gz", Mate::R1),
        ])
        .is_none());
        assert!(Unit::pair(vec![mate("ABC_R1.fastq.gz", Mate::R1)]).is_none());
    }

    #[test]
    fn derived_units_keep_their_metadata() {
        let barcode = Barcode::parse("GATCCA").unwrap();
        let unit = mate("x.fastq", Mate::R1)
            .with_barcode(barcode)
            .tagged(OriginTag::UnmethylatedControl);

        let next = unit.derive(ArtifactKind::AlignedReads, vec![PathBuf::from("x.bam")]);

        assert_eq!(next.key(), unit.key());
        assert_eq!(next.barcode(), Some(&barcode));
        assert_eq!(next.origin(), OriginTag::UnmethylatedControl);
        assert_eq!(unit.kind(), ArtifactKind::RawReads);
        assert_eq!(next.basename(), "ABC_index_GATCCA");
        assert_eq!(next.branch(), "ABC/index/GATCCA [unmethylated_control]");
    }

    #[test]
    fn publish_dirs_are_namespaced_by_origin() {
        assert_eq!(
            publish_dir(ArtifactKind::AlignedReads, OriginTag::Primary),
            PathBuf::from("bismark/alignments/primary")
        );
        assert_eq!(
            publish_dir(ArtifactKind::QcReport, OriginTag::None),
            PathBuf::from("fastqc")
        );
        assert_eq!(
            publish_dir(ArtifactKind::AlignmentReport, OriginTag::Primary),
            publish_dir(ArtifactKind::AlignedReads, OriginTag::Primary)
        );
        assert_ne!(
            publish_dir(ArtifactKind::Coverage, OriginTag::MethylatedControl),
            publish_dir(ArtifactKind::Coverage, OriginTag::UnmethylatedControl)
        );
    }

    #[test]
    fn strips_fastq_extensions() {
        assert_eq!(fastq_stem("ABC-xyz123S1_R1.fastq.gz"), "ABC-xyz123S1_R1");
        assert_eq!(fastq_stem("ABC_R1.fastq.GATCCA.fastq"), "ABC_R1.fastq.GATCCA");
        assert_eq!(fastq_stem("reads.fq"), "reads");
        assert_eq!(fastq_stem("reads.bam"), "reads.bam");
    }
}
