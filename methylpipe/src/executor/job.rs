use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::stage::StageKind;

/// Struct to represent one external command to be executed
/// by a stage
///
/// # Example
///
/// ```rust, ignore
/// use methylpipe::executor::job::Job;
///
/// let job = Job::new("trim_galore")
///     .arg("--paired")
///     .args(["a_R1.fastq.gz", "a_R2.fastq.gz"]);
///
/// assert_eq!(job.cmd(), "trim_galore --paired a_R1.fastq.gz a_R2.fastq.gz");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    program: String,
    args: Vec<String>,
    /// Directories the command writes into
    dirs: Vec<PathBuf>,
    /// Files the command reads that are written right before it starts
    staged: Vec<(PathBuf, String)>,
}

impl Job {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dirs: Vec::new(),
            staged: Vec::new(),
        }
    }

    /// Start a job for a stage: its program followed by the stage's
    /// `[params.<stage>]` arguments
    ///
    /// # Example
    ///
    /// ```rust, ignore
    /// let job = Job::task(StageKind::Trim, &config);
    ///
    /// assert_eq!(job.program(), "trim_galore");
    /// ```
    pub fn task(kind: StageKind, config: &Config) -> Self {
        Self::new(config.program(kind)).args(config.stage_args(kind))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// A flag followed by a path value
    pub fn opt(self, flag: &str, path: &Path) -> Self {
        self.arg(flag).path(path)
    }

    /// Declare a directory that has to exist before the command runs
    pub fn workdir(mut self, dir: &Path) -> Self {
        self.dirs.push(dir.to_path_buf());
        self
    }

    /// Declare a file the command reads, written just before it starts
    pub fn stage_file(mut self, path: PathBuf, contents: String) -> Self {
        self.staged.push((path, contents));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Create the working directories and write the staged files
    pub fn prepare(&self) -> std::io::Result<()> {
        for dir in &self.dirs {
            std::fs::create_dir_all(dir)?;
        }

        for (path, contents) in &self.staged {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
        }

        Ok(())
    }

    /// Shell rendering of everything `prepare` and the command do
    pub fn script(&self) -> String {
        let mut lines: Vec<String> = self
            .dirs
            .iter()
            .map(|dir| format!("mkdir -p {}", quote(&dir.to_string_lossy())))
            .collect();

        for (path, contents) in &self.staged {
            let newline = if contents.ends_with('\n') { "" } else { "\n" };
            lines.push(format!(
                "cat > {} <<'EOF'\n{}{}EOF",
                quote(&path.to_string_lossy()),
                contents,
                newline
            ));
        }

        lines.push(self.cmd());
        lines.join("\n")
    }

    /// Shell rendering of the job, quoting arguments where needed
    pub fn cmd(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|token| quote(token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(token: &str) -> String {
    let safe = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));

    if safe {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}
