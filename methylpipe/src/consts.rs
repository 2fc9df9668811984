// formats
pub const FASTQ_EXTENSIONS: &[&str] = &[".fastq.gz", ".fq.gz", ".fastq", ".fq"];
pub const GZ: &str = ".gz";

// key extraction
pub const NO_INDEX: &str = "index";
pub const BARCODE_LEN: usize = 6;
pub const MATES_PER_PAIR: usize = 2;
pub const ALIGNMENT_BRANCHES: usize = 3;

// project-wide names
pub const METHYLPIPE: &str = "methylpipe";
pub const SEED: &str = "seed";
pub const PAIRING: &str = "pairing";
pub const BRANCH_JOIN: &str = "branch_join";

// default executables
pub const FASTQC: &str = "fastqc";
pub const DEMULTIPLEX: &str = "fastq_demux";
pub const TRIM_GALORE: &str = "trim_galore";
pub const BISMARK: &str = "bismark";
pub const METHYLATION_EXTRACTOR: &str = "bismark_methylation_extractor";
pub const BEDGRAPH: &str = "bismark2bedGraph";
pub const CONVERSION: &str = "bisulfite_conversion";
pub const MULTIQC: &str = "multiqc";

// publish directories
pub const FASTQC_DIR: &str = "fastqc";
pub const DEMUX_DIR: &str = "demultiplexed";
pub const TRIM_DIR: &str = "trim_galore";
pub const BISMARK_DIR: &str = "bismark";
pub const ALIGNMENTS_DIR: &str = "alignments";
pub const CALLS_DIR: &str = "methylation_calls";
pub const COVERAGE_DIR: &str = "coverage";
pub const CONVERSION_DIR: &str = "conversion";
pub const MULTIQC_DIR: &str = "multiqc";

// filenames
pub const MULTIQC_FILE_LIST: &str = "file_list.txt";
pub const MULTIQC_REPORT: &str = "multiqc_report.html";
pub const RUN_SUMMARY: &str = "run_summary.toml";
pub const DEFAULT_SCRIPT: &str = "methylpipe_commands.sh";

// config keys
pub const RUN_ID: &str = "run_id";

// miscellaneous constants
pub const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const RUN_ID_LEN: usize = 4;
pub const DIAGNOSTIC_LINES: usize = 20;

// collections
pub const SPECIAL_PARAMETER: &[&str] = &["cl-config", "score_min"];
