use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use std::fmt;

use crate::consts::*;
use crate::error::{PipelineError, Result};

lazy_static! {
    // INFO: {SAMPLE}-{anything}.fastq.gz -> SAMPLE
    static ref UPPERCASE_SAMPLE: Regex =
        Regex::new(r"^(?P<sample>[A-Z]+)[-_.]").expect("ERROR: invalid sample pattern");
    // INFO: {sample}_S{n}_[L00{n}_]R{1,2}[_001].fastq.gz -> sample
    static ref ILLUMINA_SAMPLE: Regex = Regex::new(
        r"^(?P<sample>[A-Za-z0-9][A-Za-z0-9-]*?)_S\d+_(?:L\d{3}_)?R[12](?:_\d{3})?\.f(?:ast)?q(?:\.gz)?$"
    )
    .expect("ERROR: invalid illumina pattern");
    static ref INDEX: Regex =
        Regex::new(r"(?P<index>S\d+)(?:_L\d{3})?_R[12]").expect("ERROR: invalid index pattern");
    static ref MATE: Regex =
        Regex::new(r"_R(?P<mate>[12])(?:[_.]|$)").expect("ERROR: invalid mate pattern");
    // INFO: {sample}[_S{n}]_R{1,2}.fastq.{BARCODE}.fastq
    static ref DEMULTIPLEXED: Regex = Regex::new(
        r"^(?P<sample>.+?)(?:_(?P<index>S\d+))?_R(?P<mate>[12])\.fastq\.(?P<barcode>[ATGC]{6})\.fastq$"
    )
    .expect("ERROR: invalid demultiplexed pattern");
}

/// The (sampleID, indexID) pair correlating units across branches
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Key {
    pub sample_id: String,
    pub index_id: String,
}

impl Key {
    pub fn new(sample_id: impl Into<String>, index_id: impl Into<String>) -> Self {
        Self {
            sample_id: sample_id.into(),
            index_id: index_id.into(),
        }
    }

    /// Whether the index segment is the non-indexed sentinel
    pub fn is_unindexed(&self) -> bool {
        self.index_id == NO_INDEX
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sample_id, self.index_id)
    }
}

/// A 6-symbol nucleotide barcode assigned by the demultiplexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Barcode([u8; BARCODE_LEN]);

impl Barcode {
    /// Parse a barcode, accepting exactly 6 symbols from {A,T,G,C}
    ///
    /// # Example
    ///
    /// ```rust, ignore
    /// let barcode = Barcode::parse("GATCCA").unwrap();
    /// assert_eq!(barcode.as_str(), "GATCCA");
    /// assert!(Barcode::parse("GATCCN").is_none());
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != BARCODE_LEN || !bytes.iter().all(|b| b"ATGC".contains(b)) {
            return None;
        }

        let mut code = [0u8; BARCODE_LEN];
        code.copy_from_slice(bytes);
        Some(Self(code))
    }

    pub fn as_str(&self) -> &str {
        // INFO: only ASCII nucleotides ever get in
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl fmt::Display for Barcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Barcode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Mate {
    R1,
    R2,
}

impl Mate {
    fn from_capture(s: &str) -> Option<Self> {
        match s {
            "1" => Some(Mate::R1),
            "2" => Some(Mate::R2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mate::R1 => "R1",
            Mate::R2 => "R2",
        }
    }
}

/// One prioritized sample rule: the first rule whose pattern captures
/// `sample` wins.
struct SampleRule {
    name: &'static str,
    pattern: &'static Regex,
}

/// Derives keys from raw input filenames.
///
/// Rules are tried in order; the index pattern is only consulted when the
/// run is indexed, otherwise the index defaults to the `index` sentinel.
pub struct KeyExtractor {
    rules: Vec<SampleRule>,
    indexed: bool,
}

impl KeyExtractor {
    pub fn new(indexed: bool) -> Self {
        Self {
            rules: vec![
                SampleRule {
                    name: "uppercase-sample",
                    pattern: &UPPERCASE_SAMPLE,
                },
                SampleRule {
                    name: "illumina-sample",
                    pattern: &ILLUMINA_SAMPLE,
                },
            ],
            indexed,
        }
    }

    /// Extract the (sampleID, indexID) key from a filename
    ///
    /// # Example
    ///
    /// ```rust, ignore
    /// let key = KeyExtractor::new(false).extract("ABC-xyz123S1_R1.fastq.gz").unwrap();
    /// assert_eq!(key, Key::new("ABC", "index"));
    /// ```
    pub fn extract(&self, name: &str) -> Result<Key> {
        let sample = self
            .rules
            .iter()
            .find_map(|rule| {
                let sample = rule
                    .pattern
                    .captures(name)
                    .and_then(|caps| caps.name("sample"))
                    .map(|m| m.as_str().to_string())?;

                log::debug!("DEBUG: {} matched rule {}", name, rule.name);
                Some(sample)
            })
            .ok_or(PipelineError::PatternMismatch {
                name: name.to_string(),
                rule: "sample",
            })?;

        let index = if self.indexed {
            INDEX
                .captures(name)
                .and_then(|caps| caps.name("index"))
                .map(|m| m.as_str().to_string())
                .ok_or(PipelineError::PatternMismatch {
                    name: name.to_string(),
                    rule: "index",
                })?
        } else {
            NO_INDEX.to_string()
        };

        Ok(Key::new(sample, index))
    }

    /// Extract the R1/R2 marker from a raw mate filename
    pub fn mate(&self, name: &str) -> Result<Mate> {
        MATE.captures(name)
            .and_then(|caps| caps.name("mate"))
            .and_then(|m| Mate::from_capture(m.as_str()))
            .ok_or(PipelineError::PatternMismatch {
                name: name.to_string(),
                rule: "mate",
            })
    }
}

/// Everything a demultiplexed filename carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxKey {
    pub key: Key,
    pub barcode: Barcode,
    pub mate: Mate,
}

/// Recovers (sampleID, indexID, barcode) from demultiplexer output names
pub struct DemuxExtractor;

impl DemuxExtractor {
    /// # Example
    ///
    /// ```rust, ignore
    /// let demux = DemuxExtractor::extract("sampleA_R1.fastq.GATCCA.fastq").unwrap();
    /// assert_eq!(demux.key.sample_id, "sampleA");
    /// assert_eq!(demux.barcode.as_str(), "GATCCA");
    /// ```
    pub fn extract(name: &str) -> Result<DemuxKey> {
        let mismatch = || PipelineError::PatternMismatch {
            name: name.to_string(),
            rule: "demultiplexed",
        };

        let caps = DEMULTIPLEXED.captures(name).ok_or_else(mismatch)?;

        let sample = caps.name("sample").ok_or_else(mismatch)?.as_str();
        let index = caps.name("index").map_or(NO_INDEX, |m| m.as_str());
        let barcode = caps
            .name("barcode")
            .and_then(|m| Barcode::parse(m.as_str()))
            .ok_or_else(mismatch)?;
        let mate = caps
            .name("mate")
            .and_then(|m| Mate::from_capture(m.as_str()))
            .ok_or_else(mismatch)?;

        Ok(DemuxKey {
            key: Key::new(sample, index),
            barcode,
            mate,
        })
    }

    /// Filename prefix handed to the demultiplexer so that its outputs
    /// round-trip through [`DemuxExtractor::extract`]
    pub fn prefix(key: &Key, mate: Mate) -> String {
        if key.is_unindexed() {
            format!("{}_{}.fastq", key.sample_id, mate.as_str())
        } else {
            format!("{}_{}_{}.fastq", key.sample_id, key.index_id, mate.as_str())
        }
    }

    pub fn output_name(key: &Key, mate: Mate, barcode: &Barcode) -> String {
        format!("{}.{}.fastq", Self::prefix(key, mate), barcode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_uppercase_sample_without_index() {
        let extractor = KeyExtractor::new(false);
        let r1 = extractor.extract("ABC-xyz123S1_R1.fastq.gz").unwrap();
        let r2 = extractor.extract("ABC-xyz123S1_R2.fastq.gz").unwrap();

        assert_eq!(r1, Key::new("ABC", NO_INDEX));
        assert_eq!(r1, r2);
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = KeyExtractor::new(true);
        let name = "ABC-xyz123S1_R1.fastq.gz";

        let first = extractor.extract(name).unwrap();
        let second = extractor.extract(name).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, Key::new("ABC", "S1"));
    }

    #[test]
    fn falls_back_to_illumina_rule() {
        let extractor = KeyExtractor::new(true);
        let key = extractor
            .extract("liver-2_S12_L001_R2_001.fastq.gz")
            .unwrap();

        assert_eq!(key, Key::new("liver-2", "S12"));
    }

    #[test]
    fn unmatched_name_is_a_pattern_mismatch() {
        let extractor = KeyExtractor::new(false);

        match extractor.extract("weird.fastq") {
            Err(PipelineError::PatternMismatch { name, .. }) => assert_eq!(name, "weird.fastq"),
            other => panic!("expected PatternMismatch, got {:?}", other),
        }
    }

    #[test]
    fn indexed_run_requires_an_index_segment() {
        let extractor = KeyExtractor::new(true);

        assert!(matches!(
            extractor.extract("ABC-nothing_R1.fastq.gz"),
            Err(PipelineError::PatternMismatch { rule: "index", .. })
        ));
        assert_eq!(
            KeyExtractor::new(false)
                .extract("ABC-nothing_R1.fastq.gz")
                .unwrap(),
            Key::new("ABC", NO_INDEX)
        );
    }

    #[test]
    fn reads_mate_markers() {
        let extractor = KeyExtractor::new(false);

        assert_eq!(extractor.mate("ABC-xyz123S1_R1.fastq.gz").unwrap(), Mate::R1);
        assert_eq!(extractor.mate("x_S1_L001_R2_001.fastq.gz").unwrap(), Mate::R2);
        assert!(extractor.mate("ABC-xyz.fastq.gz").is_err());
    }

    #[test]
    fn demultiplexed_siblings_share_a_key() {
        let r1 = DemuxExtractor::extract("sampleA_R1.fastq.GATCCA.fastq").unwrap();
        let r2 = DemuxExtractor::extract("sampleA_R2.fastq.GATCCA.fastq").unwrap();

        assert_eq!(r1.key, Key::new("sampleA", NO_INDEX));
        assert_eq!(r1.barcode.as_str(), "GATCCA");
        assert_eq!(r1.mate, Mate::R1);
        assert_eq!(r2.mate, Mate::R2);
        assert_eq!(r1.key, r2.key);
        assert_eq!(r1.barcode, r2.barcode);
    }

    #[test]
    fn demultiplexed_names_keep_their_index() {
        let demux = DemuxExtractor::extract("ABC_S1_R2.fastq.TTAGGC.fastq").unwrap();

        assert_eq!(demux.key, Key::new("ABC", "S1"));
        assert_eq!(demux.barcode.to_string(), "TTAGGC");
    }

    #[test]
    fn rejects_malformed_barcodes() {
        for name in [
            "sampleA_R1.fastq.GATCCN.fastq",
            "sampleA_R1.fastq.GATCC.fastq",
            "sampleA_R1.fastq.GATCCAA.fastq",
            "sampleA.fastq.GATCCA.fastq",
        ] {
            assert!(
                matches!(
                    DemuxExtractor::extract(name),
                    Err(PipelineError::PatternMismatch { .. })
                ),
                "{} should not match",
                name
            );
        }
    }

    #[test]
    fn output_names_round_trip() {
        let barcode = Barcode::parse("ACGTAC").unwrap();

        for key in [Key::new("ABC", NO_INDEX), Key::new("ABC", "S7")] {
            let name = DemuxExtractor::output_name(&key, Mate::R2, &barcode);
            let demux = DemuxExtractor::extract(&name).unwrap();

            assert_eq!(demux.key, key);
            assert_eq!(demux.barcode, barcode);
            assert_eq!(demux.mate, Mate::R2);
        }
    }
}
