//! Command-line interface for the Zenith host.
//!
//! Flags given here override the values read from the bootstrap TOML file.

use clap::{Arg, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the bootstrap configuration file
    pub config_path: PathBuf,
    /// Optional override for the YAML config directory
    pub config_dir: Option<PathBuf>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    /// Parses the process arguments.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    fn from_matches(matches: &clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("zenith.toml")),
            config_dir: matches.get_one::<String>("config-dir").map(PathBuf::from),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

fn command() -> Command {
    Command::new("Zenith")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Player data and module configuration host")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Bootstrap configuration file path")
                .default_value("zenith.toml"),
        )
        .arg(
            Arg::new("config-dir")
                .short('d')
                .long("config-dir")
                .value_name("DIR")
                .help("Directory holding core.yaml and modules/*.yaml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue),
        )
}
