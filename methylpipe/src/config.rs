use log::{info, warn};
use serde::Deserialize;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::cli::Overrides;
use crate::consts::*;
use crate::error::{PipelineError, Result};
use crate::key::Barcode;
use crate::stage::StageKind;
use crate::unit::{publish_dir, ArtifactKind, OriginTag};

/// A struct representing a run configuration file.
///
/// # Fields
///
/// * `metadata` - Free key-value pairs copied into the run summary.
/// * `packages` - Executable overrides, tool name -> program path.
/// * `global` - Activation flags, references and run-wide settings.
/// * `params` - Extra command-line parameters per stage.
///
/// # Example
///
/// ``` toml
/// [metadata]
/// project = "liver-wgbs"
///
/// [packages]
/// bismark = "/opt/bismark/bismark"
///
/// [global]
/// input = "data/*.fastq.gz"
/// output_dir = "results"
/// demultiplex = true
/// barcodes = "barcodes.tsv"
/// genome = "refs/GRCh38"
/// methylated_control = "refs/lambda"
/// unmethylated_control = "refs/pUC19"
///
/// [params.trim]
/// quality = 20
/// ```
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub packages: HashMap<String, String>,
    pub global: GlobalParams,
    #[serde(default, deserialize_with = "deserialize_to_hash")]
    pub params: HashMap<StageKind, StepParams>,
}

/// Run-wide settings from the `[global]` table
#[derive(Deserialize, Debug, Clone)]
pub struct GlobalParams {
    pub input: String,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub demultiplex: bool,
    #[serde(default = "default_true")]
    pub trim: bool,
    #[serde(default)]
    pub skip_fastqc: bool,
    #[serde(default)]
    pub skip_report: bool,
    #[serde(default)]
    pub barcodes: Option<PathBuf>,
    #[serde(default)]
    pub genome: Option<PathBuf>,
    #[serde(default)]
    pub methylated_control: Option<PathBuf>,
    #[serde(default)]
    pub unmethylated_control: Option<PathBuf>,
    #[serde(default = "num_cpus::get")]
    pub max_forks: usize,
    #[serde(default)]
    pub topology: Topology,
    #[serde(default)]
    pub strict_controls: bool,
}

fn default_true() -> bool {
    true
}

/// How the three alignment branches meet before extraction
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Branch outputs are merged and flow on independently
    #[default]
    Independent,
    /// Branch outputs wait for their two siblings before extraction
    Joined,
}

impl std::str::FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "independent" => Ok(Topology::Independent),
            "joined" => Ok(Topology::Joined),
            _ => Err(format!("ERROR: Unknown topology: {}", s)),
        }
    }
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topology::Independent => write!(f, "independent"),
            Topology::Joined => write!(f, "joined"),
        }
    }
}

impl Config {
    /// Read a configuration file and return a Config struct.
    ///
    /// # Example
    ///
    /// ```rust, ignore
    /// let config = Config::read(PathBuf::from("config.toml"))?;
    /// ```
    pub fn read(config: PathBuf) -> Result<Self> {
        let mut file = File::open(&config)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        info!("INFO: reading configuration from {}", config.display());

        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    /// In-place application of command-line overrides
    ///
    /// # Example
    ///
    /// ```rust, ignore
    /// let mut config = Config::read(PathBuf::from("config.toml"))?;
    /// config.aware(&args.overrides).validate()?;
    /// ```
    pub fn aware(&mut self, overrides: &Overrides) -> &mut Self {
        let global = &mut self.global;

        if overrides.demultiplex {
            global.demultiplex = true;
        }
        if overrides.no_trim {
            global.trim = false;
        }
        if overrides.indexed {
            global.indexed = true;
        }
        if let Some(forks) = overrides.max_forks {
            global.max_forks = forks;
        }
        if let Some(output) = &overrides.output {
            global.output_dir = output.clone();
        }
        if let Some(topology) = overrides.topology {
            global.topology = topology;
        }

        self
    }

    /// Check everything the graph needs before any stage runs.
    ///
    /// Any failure here is a `Configuration` error and aborts the run.
    pub fn validate(&self) -> Result<()> {
        if self.global.max_forks == 0 {
            return Err(PipelineError::Configuration(
                "max_forks must be at least 1".into(),
            ));
        }

        for origin in OriginTag::BRANCHES {
            let reference = self.reference(origin)?;
            if !reference.exists() {
                return Err(PipelineError::Configuration(format!(
                    "{} reference {} is unreachable",
                    origin,
                    reference.display()
                )));
            }
        }

        if self.global.demultiplex {
            let barcodes = self.barcodes()?;
            if barcodes.is_empty() {
                return Err(PipelineError::Configuration(
                    "barcode sheet lists no barcodes".into(),
                ));
            }
        }

        if self.input_files()?.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "input pattern '{}' matches no files",
                self.global.input
            )));
        }

        if self.global.max_forks > num_cpus::get() {
            warn!(
                "WARN: max_forks ({}) exceeds available CPUs ({})",
                self.global.max_forks,
                num_cpus::get()
            );
        }

        Ok(())
    }

    /// Reference location for one alignment branch
    pub fn reference(&self, origin: OriginTag) -> Result<&Path> {
        let (reference, field) = match origin {
            OriginTag::Primary => (&self.global.genome, "genome"),
            OriginTag::MethylatedControl => {
                (&self.global.methylated_control, "methylated_control")
            }
            OriginTag::UnmethylatedControl => {
                (&self.global.unmethylated_control, "unmethylated_control")
            }
            OriginTag::None => {
                return Err(PipelineError::Configuration(
                    "untagged units have no reference".into(),
                ))
            }
        };

        reference
            .as_deref()
            .ok_or_else(|| PipelineError::Configuration(format!("global.{} is not set", field)))
    }

    /// Raw input files matched by the input glob, sorted by path
    pub fn input_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = glob::glob(&self.global.input)?
            .filter_map(|entry| match entry {
                Ok(path) if path.is_file() => Some(path),
                Ok(_) => None,
                Err(e) => {
                    warn!("WARN: skipping unreadable input: {}", e);
                    None
                }
            })
            .collect::<Vec<_>>();

        files.sort();
        Ok(files)
    }

    /// Parse the barcode sheet: `<name> <BARCODE>` per line, `#` comments
    ///
    /// # Example
    ///
    /// ``` text
    /// # name  barcode
    /// bc01    GATCCA
    /// bc02    TTAGGC
    /// ```
    pub fn barcodes(&self) -> Result<Vec<(String, Barcode)>> {
        let path = self.global.barcodes.as_ref().ok_or_else(|| {
            PipelineError::Configuration("demultiplexing requires global.barcodes".into())
        })?;

        let file = File::open(path).map_err(|e| {
            PipelineError::Configuration(format!("barcode sheet {}: {}", path.display(), e))
        })?;

        let mut seen = HashSet::new();
        let mut barcodes = Vec::new();

        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (name, code) = match (fields.next(), fields.next()) {
                (Some(name), Some(code)) => (name, code),
                _ => {
                    return Err(PipelineError::Configuration(format!(
                        "barcode sheet line {}: expected '<name> <barcode>'",
                        n + 1
                    )))
                }
            };

            let barcode = Barcode::parse(code).ok_or_else(|| {
                PipelineError::Configuration(format!(
                    "barcode sheet line {}: '{}' is not a 6-symbol ATGC barcode",
                    n + 1,
                    code
                ))
            })?;

            if !seen.insert(barcode) {
                return Err(PipelineError::Configuration(format!(
                    "barcode {} listed twice",
                    barcode
                )));
            }

            barcodes.push((name.to_string(), barcode));
        }

        Ok(barcodes)
    }

    /// Executable for a stage, honoring `[packages]` overrides
    pub fn program(&self, kind: StageKind) -> String {
        self.packages
            .get(kind.to_str())
            .or_else(|| self.packages.get(kind.default_program()))
            .cloned()
            .unwrap_or_else(|| kind.default_program().to_string())
    }

    /// Flattened extra arguments for a stage
    pub fn stage_args(&self, kind: StageKind) -> Vec<String> {
        self.params
            .get(&kind)
            .map(|params| params.flat())
            .unwrap_or_default()
    }

    pub fn output_dir(&self) -> &Path {
        &self.global.output_dir
    }

    /// Publish directory for an artifact; executors create it before running
    pub fn publish_path(&self, kind: ArtifactKind, origin: OriginTag) -> PathBuf {
        self.global.output_dir.join(publish_dir(kind, origin))
    }

    /// Generates a random run ID of 4 characters.
    ///
    /// # Example
    ///
    /// ```rust, ignore
    /// let mut config = Config::read(PathBuf::from("config.toml"))?;
    /// config.set_run_id();
    /// let run_id = config.get_run_id();
    /// ```
    pub fn set_run_id(&mut self) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        let mut id = String::with_capacity(RUN_ID_LEN);

        let mut hash = now;
        for _ in 0..RUN_ID_LEN {
            let idx = (hash % (CHARSET.len() as u128)) as usize;
            id.push(CHARSET[idx] as char);
            hash /= 7;
        }

        self.metadata.insert(RUN_ID.into(), id);
    }

    pub fn get_run_id(&self) -> String {
        self.metadata
            .get(RUN_ID)
            .cloned()
            .unwrap_or_else(|| METHYLPIPE.to_string())
    }
}

/// A struct representing step parameters.
///
/// Kept ordered so that rendered command lines are deterministic.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct StepParams {
    #[serde(flatten)]
    values: BTreeMap<String, ParamValue>,
}

impl StepParams {
    /// Flatten the parameters into command-line arguments.
    ///
    /// # Note
    ///
    /// Keys with 2 or less characters are short flags (`-k`), longer keys
    /// are long flags (`--key`). Keys in SPECIAL_PARAMETER are joined to
    /// their value with an equal sign. `true` is rendered as a bare flag and
    /// `false` drops the flag.
    ///
    /// # Example
    ///
    /// ```rust, ignore
    /// // quality = 20, paired = true, cl-config = "x: 1"
    /// assert_eq!(params.flat(), vec!["--cl-config=x: 1", "--paired", "--quality", "20"]);
    /// ```
    pub fn flat(&self) -> Vec<String> {
        let mut args = Vec::new();

        for (key, value) in &self.values {
            let flag = if key.len() > 2 {
                format!("--{}", key)
            } else {
                format!("-{}", key)
            };

            match value {
                ParamValue::Bool(true) => args.push(flag),
                ParamValue::Bool(false) => {}
                value if SPECIAL_PARAMETER.contains(&key.as_str()) => {
                    args.push(format!("{}={}", flag, value))
                }
                value => {
                    args.push(flag);
                    args.push(value.to_string());
                }
            }
        }

        args
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }
}

/// Represents a parameter value for any stage
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(flt) => write!(f, "{}", flt),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Deserialize a HashMap of StageKind enums and StepParams.
fn deserialize_to_hash<'de, D>(deserializer: D) -> std::result::Result<HashMap<StageKind, StepParams>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: HashMap<String, StepParams> = HashMap::deserialize(deserializer)?;

    raw.into_iter()
        .map(|(key, value)| StageKind::from_str(&key).map(|step| (step, value)))
        .collect::<std::result::Result<HashMap<_, _>, _>>()
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal(extra: &str) -> String {
        format!(
            r#"
            [global]
            input = "data/*.fastq.gz"
            output_dir = "results"
            {}
            "#,
            extra
        )
    }

    #[test]
    fn applies_defaults() {
        let config = Config::parse(&minimal("")).unwrap();

        assert!(config.global.trim);
        assert!(!config.global.demultiplex);
        assert!(!config.global.indexed);
        assert_eq!(config.global.topology, Topology::Independent);
        assert_eq!(config.global.max_forks, num_cpus::get());
        assert!(config.params.is_empty());
    }

    #[test]
    fn reads_stage_params_in_order() {
        let config = Config::parse(&minimal(
            r#"
            [params.trim]
            quality = 20
            paired = true
            clip_R1 = 5
            dont_gzip = false
            e = 0.1

            [params.report]
            cl-config = "max_table_rows: 500"
            "#,
        ))
        .unwrap();

        assert_eq!(
            config.stage_args(StageKind::Trim),
            vec!["--clip_R1", "5", "-e", "0.1", "--paired", "--quality", "20"]
        );
        assert_eq!(
            config.stage_args(StageKind::Report),
            vec!["--cl-config=max_table_rows: 500"]
        );
        assert!(config.stage_args(StageKind::Align).is_empty());
    }

    #[test]
    fn rejects_unknown_stage_params() {
        assert!(Config::parse(&minimal("[params.blast]\nevalue = 1")).is_err());
    }

    #[test]
    fn unset_reference_is_a_configuration_error() {
        let config = Config::parse(&minimal("")).unwrap();

        assert!(matches!(
            config.reference(OriginTag::Primary),
            Err(PipelineError::Configuration(_))
        ));
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn unreachable_reference_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::parse(&minimal(&format!(
            r#"
            genome = "{0}/missing"
            methylated_control = "{0}"
            unmethylated_control = "{0}"
            "#,
            dir.path().display()
        )))
        .unwrap();

        match config.validate() {
            Err(PipelineError::Configuration(msg)) => assert!(msg.contains("unreachable")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn parses_barcode_sheets() {
        let mut sheet = tempfile::NamedTempFile::new().unwrap();
        writeln!(sheet, "# name barcode\nbc01\tGATCCA\n\nbc02 TTAGGC").unwrap();

        let config = Config::parse(&minimal(&format!(
            "barcodes = \"{}\"",
            sheet.path().display()
        )))
        .unwrap();

        let barcodes = config.barcodes().unwrap();
        assert_eq!(barcodes.len(), 2);
        assert_eq!(barcodes[0].0, "bc01");
        assert_eq!(barcodes[1].1.as_str(), "TTAGGC");
    }

    #[test]
    fn rejects_bad_barcodes() {
        let mut sheet = tempfile::NamedTempFile::new().unwrap();
        writeln!(sheet, "bc01 GATCCN").unwrap();

        let config = Config::parse(&minimal(&format!(
            "barcodes = \"{}\"",
            sheet.path().display()
        )))
        .unwrap();

        assert!(matches!(
            config.barcodes(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn overrides_take_precedence() {
        let mut config = Config::parse(&minimal("trim = true")).unwrap();
        let overrides = Overrides {
            demultiplex: true,
            no_trim: true,
            indexed: true,
            max_forks: Some(3),
            output: Some(PathBuf::from("elsewhere")),
            topology: Some(Topology::Joined),
        };

        config.aware(&overrides);

        assert!(config.global.demultiplex);
        assert!(!config.global.trim);
        assert!(config.global.indexed);
        assert_eq!(config.global.max_forks, 3);
        assert_eq!(config.output_dir(), Path::new("elsewhere"));
        assert_eq!(config.global.topology, Topology::Joined);
    }

    #[test]
    fn package_overrides_replace_programs() {
        let config = Config::parse(&format!(
            "[packages]\nbismark = \"/opt/bismark/bismark\"\n{}",
            minimal("")
        ))
        .unwrap();

        assert_eq!(config.program(StageKind::Align), "/opt/bismark/bismark");
        assert_eq!(config.program(StageKind::Trim), TRIM_GALORE);
    }
}
