use crate::models::OutputFormat;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

const REPORT_STAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]");

/// Outcome of one requested format for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatStatus {
    #[default]
    Skipped,
    Success,
    Failed,
}

/// Per-file record in the conversion report
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileResult {
    pub filename: String,
    pub total_images: usize,
    pub downloaded_images: usize,
    pub pdf_status: FormatStatus,
    pub md_status: FormatStatus,
    pub errors: Vec<String>,
}

impl FileResult {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    /// A record for a file that never got as far as conversion.
    pub fn failed(filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            pdf_status: FormatStatus::Failed,
            md_status: FormatStatus::Failed,
            errors: vec![error.into()],
            ..Self::default()
        }
    }

    pub fn set_status(&mut self, format: OutputFormat, status: FormatStatus) {
        match format {
            OutputFormat::Pdf => self.pdf_status = status,
            OutputFormat::Markdown => self.md_status = status,
        }
    }

    pub fn status(&self, format: OutputFormat) -> FormatStatus {
        match format {
            OutputFormat::Pdf => self.pdf_status,
            OutputFormat::Markdown => self.md_status,
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Summary written after every job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub conversion_time: String,
    pub total_files: usize,
    pub successful_conversions: usize,
    pub failed_conversions: usize,
    pub results: Vec<FileResult>,
}

impl ConversionReport {
    pub fn from_results(results: Vec<FileResult>) -> Self {
        let now = now_local_or_utc();
        let successful = results.iter().filter(|r| r.is_success()).count();

        Self {
            conversion_time: now.format(&Rfc3339).unwrap_or_default(),
            total_files: results.len(),
            successful_conversions: successful,
            failed_conversions: results.len() - successful,
            results,
        }
    }

    /// Write the report as JSON and YAML into `report_dir`.
    ///
    /// # Returns
    /// The path of the YAML copy, which is what the completion event announces
    pub fn write(&self, report_dir: &Utf8Path) -> Result<Utf8PathBuf> {
        fs::create_dir_all(report_dir)
            .with_context(|| format!("Failed to create report directory: {}", report_dir))?;

        let stamp = now_local_or_utc()
            .format(REPORT_STAMP_FORMAT)
            .context("Failed to format report timestamp")?;
        let base = format!("Conversion Report_{}", stamp);

        let json_path = report_dir.join(format!("{}.json", base));
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report to JSON")?;
        fs::write(&json_path, json)
            .with_context(|| format!("Failed to write report: {}", json_path))?;

        let yaml_path = report_dir.join(format!("{}.yaml", base));
        let yaml = serde_yaml_ng::to_string(self).context("Failed to serialize report to YAML")?;
        fs::write(&yaml_path, yaml)
            .with_context(|| format!("Failed to write report: {}", yaml_path))?;

        tracing::info!(
            "Wrote conversion report ({} files, {} failed) to {}",
            self.total_files,
            self.failed_conversions,
            yaml_path
        );

        Ok(yaml_path)
    }
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_report_counts() {
        let mut ok = FileResult::new("a.html");
        ok.set_status(OutputFormat::Pdf, FormatStatus::Success);
        let failed = FileResult::failed("b.html", "File not found");

        let report = ConversionReport::from_results(vec![ok, failed]);
        assert_eq!(report.total_files, 2);
        assert_eq!(report.successful_conversions, 1);
        assert_eq!(report.failed_conversions, 1);
        assert!(!report.conversion_time.is_empty());
    }

    #[test]
    fn test_write_creates_json_and_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().join("report")).unwrap();

        let report = ConversionReport::from_results(vec![FileResult::new("a.html")]);
        let yaml_path = report.write(&dir).unwrap();

        assert_eq!(yaml_path.extension(), Some("yaml"));
        let stamp = yaml_path
            .file_stem()
            .unwrap()
            .strip_prefix("Conversion Report_")
            .unwrap();
        assert_eq!(stamp.len(), "YYYYMMDDHHMMSS".len());
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
        assert!(yaml_path.with_extension("json").exists());

        let loaded: ConversionReport =
            serde_yaml_ng::from_str(&fs::read_to_string(&yaml_path).unwrap()).unwrap();
        assert_eq!(loaded.results[0].filename, "a.html");
        assert_eq!(loaded.results[0].pdf_status, FormatStatus::Skipped);
    }

    #[test]
    fn test_format_status_wire_names() {
        let mut result = FileResult::new("a.html");
        result.set_status(OutputFormat::Markdown, FormatStatus::Failed);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["pdf_status"], "skipped");
        assert_eq!(json["md_status"], "failed");
    }
}
