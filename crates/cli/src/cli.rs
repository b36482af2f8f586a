use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

use crate::tracing::{LogLevel, TracingFormat};

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// Configuration error exit code
pub const EXIT_CONFIG: i32 = 1;
/// Usage error exit code (unknown tool, bad arguments)
pub const EXIT_USAGE: i32 = 2;
/// Some tools failed and `--strict` was given
pub const EXIT_FAILURES: i32 = 3;
/// Exit code for SIGINT (128 + signal number 2)
pub const EXIT_SIGINT: i32 = 130;

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// Configuration or environment problem (exit code 1)
    #[error("configuration error: {message}")]
    #[diagnostic(code(backplane::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Bad invocation (exit code 2)
    #[error("{message}")]
    #[diagnostic(code(backplane::cli::usage))]
    Usage {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// A command could not complete (exit code 3)
    #[error("{message}")]
    #[diagnostic(code(backplane::cli::failed))]
    Failed {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new usage error with help text
    #[must_use]
    pub fn usage_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new failure
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            help: None,
        }
    }

    /// Add help text to an existing error, returning a new error with the help text set.
    #[must_use]
    pub fn with_help(self, help_text: impl Into<String>) -> Self {
        let help = Some(help_text.into());
        match self {
            Self::Config { message, .. } => Self::Config { message, help },
            Self::Usage { message, .. } => Self::Usage { message, help },
            Self::Failed { message, .. } => Self::Failed { message, help },
        }
    }
}

impl From<backplane_core::Error> for CliError {
    fn from(err: backplane_core::Error) -> Self {
        match err {
            backplane_core::Error::Configuration { message } => Self::config(message),
            backplane_core::Error::ChecksumMismatch {
                ref manual_download, ..
            } => {
                let help = manual_download.clone();
                Self::Failed {
                    message: err.to_string(),
                    help,
                }
            }
            backplane_core::Error::Cancelled => Self::failed("interrupted"),
            other => Self::failed(other.to_string()),
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CONFIG,
        CliError::Usage { .. } => EXIT_USAGE,
        CliError::Failed { .. } => EXIT_FAILURES,
    }
}

/// Render an error on stderr with miette
pub fn render_error(err: &CliError) {
    let report = Report::new(err.clone());
    eprintln!("{report:?}");
    let _ = io::stderr().flush();
}

/// Manage the CLI tools used to operate OpenShift clusters.
#[derive(Parser, Debug)]
#[command(name = "backplane-tools")]
#[command(about = "An OpenShift tool management solution")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level.
    #[arg(short = 'L', long, global = true, default_value = "warn", value_enum)]
    pub level: LogLevel,

    /// Log output format.
    #[arg(long = "log-format", global = true, default_value = "compact", value_enum)]
    pub log_format: TracingFormat,

    /// Path to the configuration file.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Exit non-zero when any tool in a batch fails.
    #[arg(long, global = true)]
    pub strict: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Install tools. With no arguments or `all`, installs every tool.
    Install {
        /// Tools to install.
        #[arg(value_name = "TOOL")]
        tools: Vec<String>,
    },
    /// Upgrade installed tools. With no arguments or `all`, upgrades backplane-tools first.
    Upgrade {
        /// Tools to upgrade.
        #[arg(value_name = "TOOL")]
        tools: Vec<String>,
    },
    /// Remove tools. `all` removes the whole installation.
    Remove {
        /// Tools to remove.
        #[arg(value_name = "TOOL")]
        tools: Vec<String>,
    },
    /// List tools.
    List {
        /// Which tools to list.
        #[command(subcommand)]
        which: ListCommands,
    },
}

/// What `list` shows.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListCommands {
    /// Every tool that can be installed.
    Available,
    /// Tools present under the install root.
    Installed,
}

/// Parse the process arguments.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_install_with_tools() {
        let cli = Cli::try_parse_from(["backplane-tools", "install", "oc", "ocm", "--strict"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Install {
                tools: vec!["oc".into(), "ocm".into()]
            }
        );
        assert!(cli.strict);
    }

    #[test]
    fn test_parse_list_installed() {
        let cli = Cli::try_parse_from(["backplane-tools", "--level", "debug", "list", "installed"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::List {
                which: ListCommands::Installed
            }
        );
        assert!(matches!(cli.level, LogLevel::Debug));
    }

    #[test]
    fn test_list_requires_a_kind() {
        assert!(Cli::try_parse_from(["backplane-tools", "list"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&CliError::config("x")), EXIT_CONFIG);
        assert_eq!(exit_code_for(&CliError::usage_with_help("x", "y")), EXIT_USAGE);
        assert_eq!(exit_code_for(&CliError::failed("x")), EXIT_FAILURES);
    }

    #[test]
    fn test_core_errors_map_to_cli_errors() {
        let err: CliError = backplane_core::Error::configuration("bad").into();
        assert!(matches!(err, CliError::Config { ref message, .. } if message == "bad"));

        let err: CliError = backplane_core::Error::ChecksumMismatch {
            tool: "oc".into(),
            asset: "oc.tar.gz".into(),
            expected: "aa".into(),
            actual: "bb".into(),
            manual_download: Some("download manually".into()),
        }
        .into();
        assert!(matches!(err, CliError::Failed { help: Some(ref h), .. } if h == "download manually"));
    }
}
