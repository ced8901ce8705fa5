//! Command-line interface for cmdstream.
//!
//! Uses lexopt for minimal binary size overhead (~34KB). Options end at the
//! first positional argument; everything after it is the command line,
//! split into pipeline stages on a literal `::`.

use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Separates pipeline stages on the command line.
pub const STAGE_SEPARATOR: &str = "::";

/// How the command line is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Pass output through to the terminal.
    #[default]
    Run,
    /// Capture output; a non-zero exit fails.
    Get,
    /// Capture output; a non-zero exit is reported as the exit code.
    Check,
}

impl FromStr for Mode {
    type Err = ArgsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "run" => Ok(Mode::Run),
            "get" => Ok(Mode::Get),
            "check" => Ok(Mode::Check),
            _ => Err(ArgsError::InvalidValue("mode", s.to_string())),
        }
    }
}

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Environment assignments layered over every stage.
    pub env: Vec<(String, String)>,
    /// Working directory for every stage.
    pub dir: Option<PathBuf>,
    /// Execution mode.
    pub mode: Mode,
    /// Disable trace output.
    pub quiet: bool,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
    /// Pipeline stages, each an argument vector.
    pub stages: Vec<Vec<String>>,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('e') | Long("env") => {
                let value: String = parser.value()?.parse()?;
                let (k, v) = value
                    .split_once('=')
                    .filter(|(k, _)| !k.is_empty())
                    .ok_or_else(|| ArgsError::InvalidValue("env", value.clone()))?;
                result.env.push((k.to_string(), v.to_string()));
            }
            Short('C') | Long("dir") => {
                result.dir = Some(parser.value()?.into());
            }
            Short('m') | Long("mode") => {
                let value: String = parser.value()?.parse()?;
                result.mode = value.parse()?;
            }
            Short('q') | Long("quiet") => {
                result.quiet = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.into());
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(first) => {
                let mut words = vec![into_string(first)?];
                for arg in parser.raw_args()? {
                    words.push(into_string(arg)?);
                }
                result.stages = split_stages(words)?;
                break;
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn into_string(arg: OsString) -> Result<String, ArgsError> {
    arg.into_string()
        .map_err(|arg| ArgsError::InvalidUnicode(arg.to_string_lossy().into_owned()))
}

fn split_stages(words: Vec<String>) -> Result<Vec<Vec<String>>, ArgsError> {
    let mut stages = vec![Vec::new()];
    for word in words {
        if word == STAGE_SEPARATOR {
            stages.push(Vec::new());
        } else if let Some(stage) = stages.last_mut() {
            stage.push(word);
        }
    }
    if stages.iter().any(Vec::is_empty) {
        return Err(ArgsError::EmptyStage);
    }
    Ok(stages)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"cmdstream {version}
Run commands and pipelines of commands as byte streams

USAGE:
    cmdstream [OPTIONS] [--] <CMD> [ARGS...] [:: <CMD> [ARGS...]]...

OPTIONS:
    -e, --env <KEY=VALUE>   Set an environment variable (repeatable)
    -C, --dir <DIR>         Working directory for every command
    -m, --mode <MODE>       run, get or check [default: run]
    -q, --quiet             Do not trace commands to stderr
    -c, --config <FILE>     Path to configuration file (JSON)
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    CMDSTREAM_TRACE         Set to 0 to disable tracing (overrides config)
    CMDSTREAM_TRACE_PREFIX  Trace line prefix (overrides config)
    CMDSTREAM_LOG_LEVEL     Log level (overrides config)
    RUST_LOG                Alternative log level setting

EXAMPLES:
    # Run a command with its output on the terminal
    cmdstream ls -l

    # Capture output; fail on a non-zero exit
    cmdstream -m get git rev-parse HEAD

    # Pipeline: the first stage is the source
    cmdstream -m get echo hello :: tr a-z A-Z

    # Report a non-zero exit as the exit code instead of an error
    cmdstream -m check -C /tmp -- grep -q needle haystack.txt
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("cmdstream {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug, Error)]
pub enum ArgsError {
    /// Lexopt parsing error.
    #[error("{0}")]
    Lexopt(#[from] lexopt::Error),
    /// Invalid argument value.
    #[error("invalid value for --{0}: '{1}'")]
    InvalidValue(&'static str, String),
    /// A command-line word that is not valid Unicode.
    #[error("argument is not valid unicode: '{0}'")]
    InvalidUnicode(String),
    /// Nothing between two stage separators.
    #[error("empty pipeline stage")]
    EmptyStage,
}
