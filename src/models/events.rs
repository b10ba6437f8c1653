//! Wire types shared by the control surface and the backend.
//!
//! The serde layout matches the JSON payloads a host bridge delivers, so a
//! bridge that only has text can decode straight into [`ProgressEvent`].

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A file chosen by the user.
///
/// Uniqueness is not enforced; selecting the same file twice queues it twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub path: String,
}

impl FileRef {
    /// Build a file reference, falling back to `name` when no path is exposed.
    pub fn new(name: impl Into<String>, path: Option<String>) -> Self {
        let name = name.into();
        let path = path.filter(|p| !p.is_empty()).unwrap_or_else(|| name.clone());
        Self { name, path }
    }

    /// Build a file reference from a full path, using the file name as the display name.
    pub fn from_path(path: &Utf8Path) -> Self {
        let name = path.file_name().unwrap_or(path.as_str()).to_string();
        Self {
            name,
            path: path.to_string(),
        }
    }
}

/// Presentation level of a status line. Never drives behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    #[default]
    Info,
    Warning,
    Error,
    Success,
}

impl StatusLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLevel::Info => "info",
            StatusLevel::Warning => "warning",
            StatusLevel::Error => "error",
            StatusLevel::Success => "success",
        }
    }
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of asynchronous progress pushed from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    /// Files finished out of the whole job.
    Overall { current: usize, total: usize },

    /// Sub-progress inside the file being processed (images fetched, pages rendered).
    Current {
        current: usize,
        total: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },

    /// A line for the status log.
    Status {
        message: String,
        #[serde(default)]
        level: StatusLevel,
    },

    /// Terminal event; the job is over.
    Complete { report_path: String },
}

impl ProgressEvent {
    pub fn status(message: impl Into<String>, level: StatusLevel) -> Self {
        ProgressEvent::Status {
            message: message.into(),
            level,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. })
    }
}

/// Output format a job can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Pdf,
    Markdown,
}

impl OutputFormat {
    /// Key used in configuration (`Render Commands`) and report fields.
    pub fn key(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Markdown => "md",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.key()
    }

    pub fn label(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "PDF",
            OutputFormat::Markdown => "Markdown",
        }
    }
}

/// The two format checkboxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputFormats {
    pub convert_pdf: bool,
    pub convert_md: bool,
}

impl OutputFormats {
    pub fn new(convert_pdf: bool, convert_md: bool) -> Self {
        Self {
            convert_pdf,
            convert_md,
        }
    }

    pub fn any(&self) -> bool {
        self.convert_pdf || self.convert_md
    }

    /// Requested formats in the order they are rendered.
    pub fn requested(&self) -> Vec<OutputFormat> {
        let mut formats = Vec::with_capacity(2);
        if self.convert_pdf {
            formats.push(OutputFormat::Pdf);
        }
        if self.convert_md {
            formats.push(OutputFormat::Markdown);
        }
        formats
    }
}

/// Payload of `start_conversion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub files: Vec<FileRef>,
    pub convert_pdf: bool,
    pub convert_md: bool,
}

impl StartRequest {
    pub fn new(files: Vec<FileRef>, formats: OutputFormats) -> Self {
        Self {
            files,
            convert_pdf: formats.convert_pdf,
            convert_md: formats.convert_md,
        }
    }

    pub fn formats(&self) -> OutputFormats {
        OutputFormats::new(self.convert_pdf, self.convert_md)
    }
}

/// Immediate reply to `start_conversion`. Says nothing about the job outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StartAck {
    pub fn accepted() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}
