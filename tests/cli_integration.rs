//! CLI integration tests.
//!
//! These tests verify the CLI argument parsing and configuration loading.

use std::ffi::OsString;
use std::io::Write;
use tempfile::NamedTempFile;

use cmdstream::cli::{parse_args_from, Args, Mode};
use cmdstream::config::Config;

fn args(args: &[&str]) -> Vec<OsString> {
    std::iter::once("cmdstream")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect()
}

// ============================================================================
// CLI Argument Tests
// ============================================================================

#[test]
fn test_cli_defaults() {
    let result = parse_args_from(args(&[])).unwrap();

    assert_eq!(result.mode, Mode::Run);
    assert!(!result.quiet);
    assert!(result.env.is_empty());
    assert!(result.dir.is_none());
    assert!(result.config.is_none());
    assert!(result.stages.is_empty());
}

#[test]
fn test_cli_full_options() {
    let result = parse_args_from(args(&[
        "-e",
        "LANG=C",
        "-C",
        "/tmp",
        "-m",
        "check",
        "-q",
        "-l",
        "debug",
        "grep",
        "-q",
        "x",
        "::",
        "wc",
        "-l",
    ]))
    .unwrap();

    assert_eq!(result.env, vec![("LANG".to_string(), "C".to_string())]);
    assert_eq!(result.dir.as_deref(), Some(std::path::Path::new("/tmp")));
    assert_eq!(result.mode, Mode::Check);
    assert!(result.quiet);
    assert_eq!(result.log_level, Some("debug".to_string()));
    assert_eq!(result.stages, vec![vec!["grep", "-q", "x"], vec!["wc", "-l"]]);
}

#[test]
fn test_cli_config_file() {
    let result = parse_args_from(args(&["-c", "/etc/cmdstream.json", "true"])).unwrap();
    assert_eq!(
        result.config,
        Some(std::path::PathBuf::from("/etc/cmdstream.json"))
    );
}

#[test]
fn test_cli_invalid_mode() {
    let result = parse_args_from(args(&["-m", "sometimes", "true"]));
    assert!(result.is_err());
}

#[test]
fn test_cli_separator_needs_commands() {
    assert!(parse_args_from(args(&["echo", "a", "::", "::", "cat"])).is_err());
    assert!(parse_args_from(args(&["echo", "a", "::"])).is_err());
}

// ============================================================================
// Configuration Loading Tests
// ============================================================================

#[test]
fn test_config_from_json_file() {
    let json = r#"{
        "trace": {
            "enabled": true,
            "prefix": ">> "
        },
        "env": {
            "LANG": "C",
            "TZ": "UTC"
        },
        "commands": {
            "dos2unix": ["busybox", "dos2unix"]
        },
        "logging": {
            "level": "debug"
        }
    }"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let config = Config::from_file(file.path()).unwrap();

    assert!(config.trace.enabled);
    assert_eq!(config.trace.prefix, ">> ");
    assert_eq!(config.env.len(), 2);
    assert_eq!(config.commands["dos2unix"], vec!["busybox", "dos2unix"]);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_config_priority_cli_over_file() {
    let json = r#"{
        "trace": { "enabled": true },
        "env": { "LANG": "C", "KEEP": "yes" }
    }"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let args = Args {
        config: Some(file.path().to_path_buf()),
        env: vec![("LANG".to_string(), "en_US.UTF-8".to_string())],
        quiet: true,
        ..Args::default()
    };

    let config = Config::load(&args).unwrap();

    // CLI values should win
    assert!(!config.trace.enabled);
    assert_eq!(config.env["LANG"], "en_US.UTF-8");
    assert_eq!(config.env["KEEP"], "yes");
}

#[test]
fn test_config_missing_file() {
    let args = Args {
        config: Some("/nonexistent/cmdstream.json".into()),
        ..Args::default()
    };
    assert!(Config::load(&args).is_err());
}

#[test]
fn test_config_dir_sets_pwd() {
    let args = Args {
        dir: Some("/var/tmp".into()),
        ..Args::default()
    };

    let config = Config::load(&args).unwrap();
    let runner = config.build_runner().unwrap();
    assert_eq!(runner.env_vars().working_dir(), Some("/var/tmp"));
}

// ============================================================================
// Configuration Serialization Tests
// ============================================================================

#[test]
fn test_config_roundtrip() {
    let mut original = Config::default();
    original
        .commands
        .insert("fmt".to_string(), vec!["cargo".to_string(), "fmt".to_string()]);
    let json = serde_json::to_string(&original).unwrap();
    let loaded: Config = serde_json::from_str(&json).unwrap();

    assert_eq!(original, loaded);
}

#[test]
fn test_config_partial_deserialization() {
    // Only specify some fields, others should use defaults
    let json = r#"{"env": {"A": "1"}}"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.env["A"], "1");
    assert!(config.trace.enabled); // Default
    assert_eq!(config.trace.prefix, "+ "); // Default
}
