use crate::models::config::configured_command;
use crate::models::{ConverterSettings, OutputFormat};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use regex::Regex;
use std::fs;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

/// A source document after loading and asset fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDocument {
    pub source: Utf8PathBuf,
    pub stem: String,
    pub total_assets: usize,
    pub fetched_assets: usize,
}

impl PreparedDocument {
    /// A document with no assets to fetch
    pub fn bare(source: &Utf8Path) -> Result<Self, ConversionError> {
        let stem = source
            .file_stem()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConversionError::InvalidSource(source.to_string()))?;

        Ok(Self {
            source: source.to_path_buf(),
            stem: stem.to_string(),
            total_assets: 0,
            fetched_assets: 0,
        })
    }
}

/// Errors that can occur while converting one document
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("No {0} converter command configured")]
    NotConfigured(&'static str),

    #[error("Source has no usable file name: {0}")]
    InvalidSource(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Converter exited with code {0}")]
    ExitCode(i32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The document work the backend delegates.
///
/// Implementations own the format knowledge; the job runner only sequences
/// calls, reports progress and honours pause/stop between them.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Load `source` and fetch its assets, reporting `(done, total)` as they arrive.
    async fn prepare(
        &self,
        source: &Utf8Path,
        progress: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> Result<PreparedDocument, ConversionError>;

    /// Produce one output format under `output_dir` and return the written path.
    async fn render(
        &self,
        document: &PreparedDocument,
        format: OutputFormat,
        output_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, ConversionError>;
}

const INPUT_VAR: &str = "ARTICLE_INPUT";
const OUTPUT_VAR: &str = "ARTICLE_OUTPUT";
const OUTPUT_DIR_VAR: &str = "ARTICLE_OUTPUT_DIR";
const STEM_VAR: &str = "ARTICLE_STEM";

/// A shell command line plus the variables its placeholders refer to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub line: String,
    pub env: Vec<(&'static str, String)>,
}

impl ToolCommand {
    fn bind(&mut self, placeholder: &str, var: &'static str, value: &str) {
        if !self.line.contains(placeholder) {
            return;
        }
        self.line = self.line.replace(placeholder, &var_reference(var));
        self.env.push((var, value.to_string()));
    }
}

#[cfg(target_os = "windows")]
fn var_reference(var: &str) -> String {
    format!("\"%{}%\"", var)
}

#[cfg(not(target_os = "windows"))]
fn var_reference(var: &str) -> String {
    format!("\"${}\"", var)
}

/// Converter that shells out to user-configured tools
///
/// Command templates may use these placeholders:
///
/// - `{input}`: source path
/// - `{output}`: output path (render only)
/// - `{output_dir}`: per-format output directory (render only)
/// - `{stem}`: source file name without extension
///
/// Values never become part of the command line. Each placeholder expands to a
/// quoted reference to an environment variable set on the child process, so
/// file names with quotes or `$(...)` reach the tool unchanged.
///
/// A tool reports asset progress by printing `PROGRESS <done>/<total>` lines on
/// stdout; every other line is logged at trace level.
pub struct ExternalToolConverter {
    prepare_command: Option<String>,
    render_commands: IndexMap<String, String>,
    timeout: Duration,

    /// Regex for `PROGRESS 3/10` lines in tool output
    progress_pattern: Regex,
}

impl ExternalToolConverter {
    pub fn new(
        prepare_command: Option<String>,
        render_commands: IndexMap<String, String>,
        timeout: Duration,
    ) -> Self {
        Self {
            prepare_command: prepare_command.filter(|cmd| !cmd.trim().is_empty()),
            render_commands,
            timeout,
            progress_pattern: Regex::new(r"^\s*PROGRESS\s+(\d+)\s*/\s*(\d+)\s*$")
                .expect("Invalid progress regex"),
        }
    }

    pub fn from_settings(settings: &ConverterSettings) -> Self {
        Self::new(
            Some(settings.prepare_command.clone()),
            settings.render_commands.clone(),
            Duration::from_secs(settings.conversion_timeout as u64),
        )
    }

    /// Parse a `PROGRESS done/total` line
    pub fn parse_progress(&self, line: &str) -> Option<(usize, usize)> {
        let captures = self.progress_pattern.captures(line)?;
        let done = captures.get(1)?.as_str().parse().ok()?;
        let total = captures.get(2)?.as_str().parse().ok()?;
        Some((done, total))
    }

    /// Where a format lands: `<output_dir>/<format key>/<stem>.<ext>`
    pub fn output_path(
        document: &PreparedDocument,
        format: OutputFormat,
        output_dir: &Utf8Path,
    ) -> Utf8PathBuf {
        output_dir
            .join(format.key())
            .join(format!("{}.{}", document.stem, format.extension()))
    }

    /// Expand placeholders in a command template into variable references
    pub fn build_command(
        template: &str,
        input: &Utf8Path,
        stem: &str,
        output: Option<&Utf8Path>,
    ) -> ToolCommand {
        let mut command = ToolCommand {
            line: template.to_string(),
            env: Vec::new(),
        };
        command.bind("{input}", INPUT_VAR, input.as_str());
        command.bind("{stem}", STEM_VAR, stem);

        if let Some(output) = output {
            let output_dir = output.parent().unwrap_or(output);
            command.bind("{output_dir}", OUTPUT_DIR_VAR, output_dir.as_str());
            command.bind("{output}", OUTPUT_VAR, output.as_str());
        }

        command
    }

    /// Run a shell command, streaming progress lines until it exits
    ///
    /// # Returns
    /// The last progress pair the tool printed, if any
    async fn run_command(
        &self,
        command: &ToolCommand,
        progress: Option<&(dyn Fn(usize, usize) + Send + Sync)>,
    ) -> Result<Option<(usize, usize)>, ConversionError> {
        tracing::info!("Executing: {}", command.line);
        for (name, value) in &command.env {
            tracing::debug!("  {}={}", name, value);
        }

        let start = Instant::now();

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command.line.as_str()]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command.line.as_str()]);
            c
        };
        cmd.envs(command.env.iter().map(|(name, value)| (*name, value.as_str())));
        cmd.stdout(Stdio::piped()).kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let stdout = child.stdout.take();

        let work = async {
            let mut last = None;
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Some(line) = lines.next_line().await? {
                    match self.parse_progress(&line) {
                        Some((done, total)) => {
                            last = Some((done, total));
                            if let Some(report) = progress {
                                report(done, total);
                            }
                        }
                        None => tracing::trace!("converter: {}", line),
                    }
                }
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, last))
        };

        let (status, last) = timeout(self.timeout, work).await.map_err(|_| {
            tracing::warn!("Converter timed out after {:?}", self.timeout);
            ConversionError::Timeout(self.timeout)
        })??;

        let exit_code = status.code().unwrap_or(-1);
        tracing::info!(
            "Converter finished in {:.2}s with exit code {}",
            start.elapsed().as_secs_f32(),
            exit_code
        );

        if exit_code != 0 {
            return Err(ConversionError::ExitCode(exit_code));
        }

        Ok(last)
    }
}

#[async_trait]
impl DocumentConverter for ExternalToolConverter {
    async fn prepare(
        &self,
        source: &Utf8Path,
        progress: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> Result<PreparedDocument, ConversionError> {
        let mut document = PreparedDocument::bare(source)?;

        let Some(template) = self.prepare_command.as_deref() else {
            return Ok(document);
        };

        let command = Self::build_command(template, source, &document.stem, None);
        if let Some((done, total)) = self.run_command(&command, Some(progress)).await? {
            document.fetched_assets = done;
            document.total_assets = total;
        }

        Ok(document)
    }

    async fn render(
        &self,
        document: &PreparedDocument,
        format: OutputFormat,
        output_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, ConversionError> {
        let template = configured_command(&self.render_commands, format.key())
            .ok_or(ConversionError::NotConfigured(format.label()))?;

        let output = Self::output_path(document, format, output_dir);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        let command = Self::build_command(template, &document.source, &document.stem, Some(&output));
        self.run_command(&command, None).await?;

        Ok(output)
    }
}
