use clap::{Args as ClapArgs, Parser, Subcommand};
use log::Level;
use std::path::PathBuf;

use crate::config::Topology;
use crate::consts::DEFAULT_SCRIPT;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: SubArgs,

    #[arg(
        short = 'v',
        long = "verbose",
        help = "Increase verbosity",
        global = true,
        conflicts_with = "quiet"
    )]
    pub verbose: bool,

    #[arg(short = 'q', long = "quiet", help = "Decrease verbosity", global = true)]
    pub quiet: bool,
}

impl Args {
    /// Log level picked from the verbosity flags
    pub fn level(&self) -> Level {
        if self.verbose {
            Level::Debug
        } else if self.quiet {
            Level::Warn
        } else {
            Level::Info
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum SubArgs {
    #[command(name = "run")]
    Run {
        #[command(flatten)]
        args: RunArgs,
    },
    #[command(name = "write")]
    Write {
        #[command(flatten)]
        args: WriteArgs,
    },
}

/// Run the pipeline from start to finish
///
/// # Example
///
/// ```bash,no_run
/// methylpipe run -c config.toml
/// methylpipe run -c config.toml --demultiplex --no-trim --max-forks 8
/// ```
///
/// # Arguments
///
/// * `config` - Path to the configuration file
/// * `overrides` - Flags taking precedence over the `[global]` table
#[derive(Debug, Parser)]
pub struct RunArgs {
    #[arg(
        short = 'c',
        long = "config",
        help = "Path to the configuration file",
        value_name = "CONFIG",
        default_value = "config.toml"
    )]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: Overrides,
}

/// Write every command the run would execute to a .sh file
/// without executing anything
///
/// # Example
///
/// ```bash,no_run
/// methylpipe write -c config.toml --script commands.sh
/// ```
///
/// # Note
///
/// * Declared outputs are not checked, so the whole graph is rendered
#[derive(Debug, Parser)]
pub struct WriteArgs {
    #[arg(
        short = 'c',
        long = "config",
        help = "Path to the configuration file",
        value_name = "CONFIG",
        default_value = "config.toml"
    )]
    pub config: PathBuf,

    #[arg(
        short = 's',
        long = "script",
        help = "Path of the shell script to write",
        value_name = "SCRIPT",
        default_value = DEFAULT_SCRIPT
    )]
    pub script: PathBuf,

    #[command(flatten)]
    pub overrides: Overrides,
}

/// Command-line overrides of the run configuration
#[derive(Debug, Clone, Default, ClapArgs)]
pub struct Overrides {
    #[arg(long = "demultiplex", help = "Split read pairs by the barcode sheet")]
    pub demultiplex: bool,

    #[arg(long = "no-trim", help = "Skip adapter and quality trimming")]
    pub no_trim: bool,

    #[arg(long = "indexed", help = "Recover the S<n> index from input names")]
    pub indexed: bool,

    #[arg(
        short = 'j',
        long = "max-forks",
        help = "Maximum number of concurrent tool invocations",
        value_name = "N"
    )]
    pub max_forks: Option<usize>,

    #[arg(
        short = 'o',
        long = "output",
        help = "Output root directory",
        value_name = "DIR"
    )]
    pub output: Option<PathBuf>,

    #[arg(
        long = "topology",
        help = "How alignment branches meet before extraction: independent | joined",
        value_name = "TOPOLOGY"
    )]
    pub topology: Option<Topology>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_overrides() {
        let args = Args::parse_from([
            "methylpipe",
            "run",
            "-c",
            "wgbs.toml",
            "--no-trim",
            "-j",
            "4",
            "--topology",
            "joined",
            "-v",
        ]);

        assert_eq!(args.level(), Level::Debug);
        match args.command {
            SubArgs::Run { args } => {
                assert_eq!(args.config, PathBuf::from("wgbs.toml"));
                assert!(args.overrides.no_trim);
                assert!(!args.overrides.demultiplex);
                assert_eq!(args.overrides.max_forks, Some(4));
                assert_eq!(args.overrides.topology, Some(Topology::Joined));
            }
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn write_defaults_its_script_path() {
        let args = Args::parse_from(["methylpipe", "-q", "write"]);

        assert_eq!(args.level(), Level::Warn);
        match args.command {
            SubArgs::Write { args } => {
                assert_eq!(args.config, PathBuf::from("config.toml"));
                assert_eq!(args.script, PathBuf::from(DEFAULT_SCRIPT));
            }
            other => panic!("expected write, got {:?}", other),
        }
    }
}
