//! Effective configuration display.

use colored::Colorize;
use serde_json::json;

use crate::cli::args::OutputFormat;
use crate::config::{Config, Paths};
use crate::error::TickvaultError;
use crate::output::to_json;

/// Show the effective configuration, or only its path.
///
/// With `init`, writes the effective configuration to the config path first
/// unless a file is already there.
///
/// # Errors
///
/// Returns an error if the configuration cannot be serialized or written.
pub fn config(
    config: &Config,
    paths: &Paths,
    path_only: bool,
    init: bool,
    format: OutputFormat,
) -> Result<String, TickvaultError> {
    if init && !paths.config_file.exists() {
        paths.ensure_dirs()?;
        config.save_to_path(&paths.config_file)?;
        tracing::info!(path = %paths.config_file.display(), "wrote default config");
    }
    let exists = paths.config_file.exists();

    if path_only {
        return match format {
            OutputFormat::Pretty => Ok(paths.config_file.display().to_string()),
            OutputFormat::Json => to_json(&json!({
                "path": paths.config_file,
                "exists": exists,
            })),
        };
    }

    match format {
        OutputFormat::Pretty => {
            let yaml = serde_yaml::to_string(config)
                .map_err(|e| TickvaultError::Config(format!("Failed to serialize config: {e}")))?;
            let source = if exists {
                paths.config_file.display().to_string()
            } else {
                format!("{} (not found, using defaults)", paths.config_file.display())
            };
            Ok(format!(
                "{} {}\n{}\n{}",
                "Config:".bold(),
                source.dimmed(),
                "─".repeat(40),
                yaml.trim_end()
            ))
        },
        OutputFormat::Json => to_json(&json!({
            "path": paths.config_file,
            "exists": exists,
            "config": config,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_path_only() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_root(dir.path().to_path_buf());
        let output = config(&Config::default(), &paths, true, false, OutputFormat::Pretty).unwrap();
        assert!(output.ends_with("config.yaml"));
    }

    #[test]
    fn test_config_json_defaults() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_root(dir.path().to_path_buf());
        let output = config(&Config::default(), &paths, false, false, OutputFormat::Json).unwrap();
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json["exists"], false);
        assert_eq!(json["config"]["sync"]["interval_seconds"], 30);
        assert_eq!(json["config"]["retry"]["max_retries"], 3);
    }

    #[test]
    fn test_config_pretty_yaml() {
        colored::control::set_override(false);
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_root(dir.path().to_path_buf());
        let output = config(&Config::default(), &paths, false, false, OutputFormat::Pretty).unwrap();
        assert!(output.contains("using defaults"));
        assert!(output.contains("teardown_endpoint: snapshots"));
    }

    #[test]
    fn test_config_init_writes_once() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_root(dir.path().join("nested"));
        let mut custom = Config::default();
        custom.sync.interval_seconds = 10;

        config(&custom, &paths, false, true, OutputFormat::Json).unwrap();
        let written = Config::load_from_path(&paths.config_file).unwrap();
        assert_eq!(written.sync.interval_seconds, 10);

        // An existing file is left alone
        config(&Config::default(), &paths, false, true, OutputFormat::Json).unwrap();
        let kept = Config::load_from_path(&paths.config_file).unwrap();
        assert_eq!(kept.sync.interval_seconds, 10);
    }
}
