use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// User configuration structure for `Converter Settings.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "Converter_Settings", default)]
    pub converter_settings: ConverterSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterSettings {
    #[serde(rename = "Output Directory", default = "default_output_dir")]
    pub output_dir: String,

    #[serde(rename = "Report Directory", default = "default_report_dir")]
    pub report_dir: String,

    /// Relative file paths from the picker resolve against this directory.
    #[serde(rename = "Input Directory", default = "default_input_dir")]
    pub input_dir: String,

    #[serde(rename = "Convert PDF", default = "default_true")]
    pub convert_pdf: bool,

    #[serde(rename = "Convert Markdown", default = "default_true")]
    pub convert_md: bool,

    /// Command that loads a document and fetches its assets. Empty skips the step.
    #[serde(rename = "Prepare Command", default)]
    pub prepare_command: String,

    /// Format key (`pdf`, `md`) to command template.
    #[serde(rename = "Render Commands", default = "default_render_commands")]
    pub render_commands: IndexMap<String, String>,

    #[serde(rename = "Conversion Timeout", default = "default_conversion_timeout")]
    pub conversion_timeout: u32,

    #[serde(rename = "Stop Timeout", default = "default_stop_timeout")]
    pub stop_timeout: u32,

    /// Maximum retained status lines; 0 keeps the whole session.
    #[serde(rename = "Status Log Limit", default)]
    pub status_log_limit: usize,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,

    #[serde(rename = "JSON Logs", default)]
    pub json_logs: bool,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            report_dir: default_report_dir(),
            input_dir: default_input_dir(),
            convert_pdf: true,
            convert_md: true,
            prepare_command: String::new(),
            render_commands: default_render_commands(),
            conversion_timeout: default_conversion_timeout(),
            stop_timeout: default_stop_timeout(),
            status_log_limit: 0,
            debug_mode: false,
            json_logs: false,
        }
    }
}

impl ConverterSettings {
    /// Command template for a format key, if one is configured.
    pub fn render_command(&self, key: &str) -> Option<&str> {
        configured_command(&self.render_commands, key)
    }
}

/// Look up a command template, treating a blank entry as not configured
pub fn configured_command<'a>(commands: &'a IndexMap<String, String>, key: &str) -> Option<&'a str> {
    commands
        .get(key)
        .map(String::as_str)
        .filter(|cmd| !cmd.trim().is_empty())
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_report_dir() -> String {
    "output/report".to_string()
}

fn default_input_dir() -> String {
    "article_html".to_string()
}

fn default_true() -> bool {
    true
}

fn default_render_commands() -> IndexMap<String, String> {
    let mut commands = IndexMap::new();
    commands.insert("pdf".to_string(), String::new());
    commands.insert("md".to_string(), String::new());
    commands
}

fn default_conversion_timeout() -> u32 {
    300
}

fn default_stop_timeout() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converter_settings_defaults() {
        let settings = ConverterSettings::default();
        assert_eq!(settings.output_dir, "output");
        assert_eq!(settings.report_dir, "output/report");
        assert_eq!(settings.conversion_timeout, 300);
        assert_eq!(settings.stop_timeout, 5);
        assert!(settings.convert_pdf);
        assert!(settings.convert_md);
        assert_eq!(settings.status_log_limit, 0);
    }

    #[test]
    fn test_render_command_ignores_blank_templates() {
        let mut settings = ConverterSettings::default();
        assert_eq!(settings.render_command("pdf"), None);

        settings
            .render_commands
            .insert("pdf".to_string(), "html2pdf {input} {output}".to_string());
        assert_eq!(settings.render_command("pdf"), Some("html2pdf {input} {output}"));
        assert_eq!(settings.render_command("docx"), None);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "Converter_Settings:\n  Output Directory: converted\n  Convert PDF: false\n";
        let config: UserConfig = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(config.converter_settings.output_dir, "converted");
        assert!(!config.converter_settings.convert_pdf);
        assert!(config.converter_settings.convert_md);
        assert_eq!(config.converter_settings.stop_timeout, 5);
        assert_eq!(
            config.converter_settings.render_commands.keys().collect::<Vec<_>>(),
            vec!["pdf", "md"]
        );
    }
}
