//! CLI arguments and subcommands for herakles-smem.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ConfigFormat {
    #[default]
    Yaml,
    Json,
    Toml,
}

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Raw,
    Json,
}

/// Main CLI arguments structure
#[derive(Parser, Debug, Default)]
#[command(
    name = "herakles-smem",
    about = "Report per-process and system-wide memory usage based on PSS",
    long_about = "Report per-process and system-wide memory usage based on PSS.\n\n\
                  Unlike RSS based tools, herakles-smem reports the proportional set size \
                  (PSS), which divides every shared page among the processes mapping it, \
                  so shared libraries are not counted more than once.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version = "0.1.0",
    propagate_version = true,
    group(ArgGroup::new("view").multiple(false).args(["mappings", "users", "system", "sysdetail", "groupcmd"])),
    after_help = "Project: https://github.com/cansp-dev/herakles-smem"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // ----- views -----
    /// Show mappings
    #[arg(short = 'm', long)]
    pub mappings: bool,

    /// Show users
    #[arg(short = 'u', long)]
    pub users: bool,

    /// Show whole system
    #[arg(short = 'w', long)]
    pub system: bool,

    /// Show whole system in detail
    #[arg(short = 'W', long)]
    pub sysdetail: bool,

    /// Show processes grouped by command
    #[arg(short = 'g', long)]
    pub groupcmd: bool,

    // ----- filters -----
    /// Process filter regex
    #[arg(short = 'P', long)]
    pub processfilter: Option<String>,

    /// Mapping filter regex
    #[arg(short = 'M', long)]
    pub mapfilter: Option<String>,

    /// User filter regex
    #[arg(short = 'U', long)]
    pub userfilter: Option<String>,

    /// Show only this process id
    #[arg(long)]
    pub pid: Option<u32>,

    /// Case insensitive filtering
    #[arg(short = 'i', long)]
    pub ignorecase: bool,

    // ----- columns and display -----
    /// Columns to show ("all", "+extra cols" or an explicit list)
    #[arg(short = 'c', long)]
    pub columns: Option<String>,

    /// Disable header line
    #[arg(short = 'H', long)]
    pub no_header: bool,

    /// Size columns to fit the content and the terminal
    #[arg(short = 'a', long)]
    pub autosize: bool,

    /// Show percentages
    #[arg(short = 'p', long)]
    pub percent: bool,

    /// Show unit suffixes
    #[arg(short = 'k', long)]
    pub abbreviate: bool,

    /// Show totals
    #[arg(short = 't', long)]
    pub totals: bool,

    /// Show only totals
    #[arg(short = 'T', long)]
    pub totalsonly: bool,

    /// Output format
    #[arg(short = 'F', long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Numeric output and comparison
    #[arg(short = 'n', long)]
    pub numeric: bool,

    /// Field to sort on
    #[arg(short = 's', long)]
    pub sort: Option<String>,

    /// Reverse sort
    #[arg(short = 'r', long)]
    pub reverse: bool,

    /// Show command and mapping basenames only
    #[arg(short = 'b', long)]
    pub basename: bool,

    /// Command column width (negative = default, 0 = as needed)
    #[arg(long, allow_negative_numbers = true)]
    pub cmd_width: Option<i64>,

    /// Name column width (negative = default, 0 = as needed)
    #[arg(long, allow_negative_numbers = true)]
    pub name_width: Option<i64>,

    /// User column width (negative = default, 0 = as needed)
    #[arg(long, allow_negative_numbers = true)]
    pub user_width: Option<i64>,

    /// Mapping column width (negative = default, 0 = as needed)
    #[arg(long, allow_negative_numbers = true)]
    pub mapping_width: Option<i64>,

    // ----- system view -----
    /// Amount of physical RAM, e.g. 16G
    #[arg(short = 'R', long)]
    pub realmem: Option<String>,

    /// Path to the uncompressed kernel image
    #[arg(short = 'K', long)]
    pub kernel: Option<PathBuf>,

    // ----- runtime -----
    /// Suppress capability warnings
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Process filesystem root
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// Override buffer size (KB) for /proc/<pid>/smaps
    #[arg(long)]
    pub smaps_buffer_kb: Option<usize>,

    /// Override buffer size (KB) for /proc/<pid>/smaps_rollup
    #[arg(long)]
    pub smaps_rollup_buffer_kb: Option<usize>,

    /// Log level (default: warn)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    // ----- configuration -----
    /// Config file (YAML/JSON/TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check kernel support for the memory metrics
    Check {
        /// Check memory accounting of this process
        #[arg(long)]
        memory: bool,

        /// Check /proc filesystem
        #[arg(long)]
        proc: bool,

        /// Check everything
        #[arg(long)]
        all: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },
}
