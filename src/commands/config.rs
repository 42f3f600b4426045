//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{format_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = match output {
        Some(path) => path,
        None => PathBuf::from(default_file_name(format)),
    };

    let content = render_default_config(format, commented)?;

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

fn default_file_name(format: ConfigFormat) -> &'static str {
    match format {
        ConfigFormat::Yaml => "herakles-smem.yaml",
        ConfigFormat::Json => "herakles-smem.json",
        ConfigFormat::Toml => "herakles-smem.toml",
    }
}

/// The default configuration, with a comment header for YAML and TOML when
/// requested. JSON has no comment syntax and is always written plain.
pub fn render_default_config(
    format: ConfigFormat,
    commented: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    let content = format_config(&Config::default(), format)?;
    Ok(match format {
        ConfigFormat::Yaml | ConfigFormat::Toml if commented => add_config_comments(content),
        _ => content,
    })
}

/// Prepends the option reference as comments.
fn add_config_comments(body: String) -> String {
    let comments = r#"# Herakles Smem Configuration
# ===========================
#
# Data Source
# -----------
# proc_root: /proc             # Process filesystem root
#
# Columns and Sorting
# -------------------
# columns: null                # null = view defaults, "all", "+extra" or a list
# sort: null                   # null = pss (order for the system views)
# reverse: false               # Reverse sort
# numeric: false               # Numeric comparison, users shown as uid
#
# Display
# -------
# percent: false               # Show percentages of RAM / swap
# abbreviate: false            # K/M/G suffixes
# autosize: false              # Size columns to content and terminal
# basename: false              # Basenames for commands and mappings
# ignore_case: false           # Case insensitive filters
# quiet: false                 # Suppress capability warnings
# no_header: false             # Omit the header line
# totals: false                # Append a totals line
# totals_only: false           # Print only the totals line
# format: raw                  # raw or json
#
# System View
# -----------
# realmem: null                # Physical RAM such as "16G" (null = probe)
# kernel_image: null           # Uncompressed kernel image for its size
#
# Column Widths (negative = default, 0 = as needed)
# -------------------------------------------------
# cmd_width: null
# name_width: null
# user_width: null
# mapping_width: null
#
# Logging
# -------
# log_level: warn              # off, error, warn, info, debug, trace
#
# Performance Tuning
# ------------------
# smaps_buffer_kb: 512         # Buffer size for smaps parsing
# smaps_rollup_buffer_kb: 256  # Buffer size for smaps_rollup parsing
"#;

    format!("{comments}\n{body}")
}
