//! Configuration management for cmdstream.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::Args;
use crate::execution::Runner;
use crate::output::{Trace, DEFAULT_PREFIX};
use crate::process::{local, sub};
use crate::stream::PWD;

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Trace output.
    pub trace: TraceSection,
    /// Environment layered over every command.
    pub env: BTreeMap<String, String>,
    /// Command names redirected to a prefixed invocation, e.g.
    /// `"dos2unix": ["busybox", "dos2unix"]`.
    pub commands: BTreeMap<String, Vec<String>>,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Trace configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSection {
    /// Echo each command to stderr before running it.
    pub enabled: bool,
    /// Prefix for every trace line.
    pub prefix: String,
}

impl Default for TraceSection {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter
    /// directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(trace) = std::env::var("CMDSTREAM_TRACE") {
            self.trace.enabled = !matches!(
                trace.to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            );
        }

        if let Ok(prefix) = std::env::var("CMDSTREAM_TRACE_PREFIX") {
            self.trace.prefix = prefix;
        }

        if let Ok(level) = std::env::var("CMDSTREAM_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if args.quiet {
            self.trace.enabled = false;
        }

        for (k, v) in &args.env {
            self.env.insert(k.clone(), v.clone());
        }

        if let Some(ref dir) = args.dir {
            self.env
                .insert(PWD.to_string(), dir.to_string_lossy().into_owned());
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// The configured trace sink.
    pub fn trace(&self) -> Trace {
        if self.trace.enabled {
            Trace::new(&self.trace.prefix, io::stderr())
        } else {
            Trace::discard()
        }
    }

    /// Build a local Runner carrying the configured environment, trace
    /// sink and command redirections.
    pub fn build_runner(&self) -> Result<Runner, ConfigError> {
        let base = local::runner().with_trace(self.trace());

        let mut runner = base.with_env(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        for (name, prefix) in &self.commands {
            if prefix.is_empty() {
                return Err(ConfigError::EmptyCommand(name.clone()));
            }
            let target = sub::with_runner(base.clone(), prefix.iter().map(String::as_str));
            runner = runner.with_command(name.as_str(), target);
        }
        Ok(runner)
    }

    /// Get the log filter string.
    ///
    /// A bare level applies to this crate only; anything else is passed
    /// through as a filter directive.
    pub fn log_filter(&self) -> String {
        let level = self.logging.level.trim();
        match level.to_ascii_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" | "off" => {
                format!("cmdstream={level}")
            }
            _ => level.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("failed to read config file: {0}")]
    Io(#[source] io::Error),
    /// JSON parsing error.
    #[error("failed to parse config file: {0}")]
    Json(#[source] serde_json::Error),
    /// A command redirection with nothing to run.
    #[error("command '{0}' is redirected to an empty command")]
    EmptyCommand(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.trace.enabled);
        assert_eq!(config.trace.prefix, "+ ");
        assert!(config.env.is_empty());
        assert!(config.commands.is_empty());
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "trace": {
                "enabled": false,
                "prefix": "$ "
            },
            "env": {
                "LANG": "C"
            },
            "commands": {
                "dos2unix": ["busybox", "dos2unix"]
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(!config.trace.enabled);
        assert_eq!(config.trace.prefix, "$ ");
        assert_eq!(config.env.get("LANG").map(String::as_str), Some("C"));
        assert_eq!(config.commands["dos2unix"], vec!["busybox", "dos2unix"]);
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{
            "trace": {
                "prefix": "> "
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.trace.enabled); // Default
        assert_eq!(config.trace.prefix, "> ");
    }

    #[test]
    fn test_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        let args = Args {
            env: vec![("FOO".to_string(), "bar".to_string())],
            dir: Some("/tmp".into()),
            quiet: true,
            log_level: Some("debug".to_string()),
            ..Args::default()
        };

        config.apply_args(&args);

        assert!(!config.trace.enabled);
        assert_eq!(config.env.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(config.env.get(PWD).map(String::as_str), Some("/tmp"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_log_filter() {
        let mut config = Config::default();
        assert_eq!(config.log_filter(), "cmdstream=warn");

        config.logging.level = "tokio=trace,cmdstream=debug".to_string();
        assert_eq!(config.log_filter(), "tokio=trace,cmdstream=debug");
    }

    #[test]
    fn test_build_runner() {
        let mut config = Config::default();
        config.env.insert("LANG".to_string(), "C".to_string());

        let runner = config.build_runner().unwrap();
        assert_eq!(runner.env_vars().get("LANG"), Some("C"));
        assert!(runner.trace().is_enabled());
    }

    #[test]
    fn test_empty_redirection_rejected() {
        let mut config = Config::default();
        config.commands.insert("nothing".to_string(), vec![]);

        let err = config.build_runner().unwrap_err();
        assert!(matches!(err, ConfigError::EmptyCommand(ref name) if name == "nothing"));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"trace\""));
        assert!(json.contains("\"prefix\""));
    }
}
