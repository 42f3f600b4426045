//! Configuration management for herakles-smem.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, LogLevel, OutputFormat};
use herakles_smem::layout::{LayoutOptions, Width, WidthOverrides};
use herakles_smem::process::memory::BufferConfig;
use herakles_smem::system::probe::parse_memory_size;
use herakles_smem::{
    resolve_columns, ConfigError, FilterOptions, RamSource, ReportOptions, ScanContext,
    SystemOptions, View, DEFAULT_PROC_ROOT,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

// Default configuration constants
pub const DEFAULT_SMAPS_BUFFER_KB: usize = 512;
pub const DEFAULT_SMAPS_ROLLUP_BUFFER_KB: usize = 256;
/// Largest accepted read buffer (1 GiB).
pub const MAX_BUFFER_KB: usize = 1024 * 1024;

/// Effective configuration. Every field is optional so a config file only
/// needs to name what it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    // Data source
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,

    // Columns and sorting
    pub columns: Option<String>,
    pub sort: Option<String>,
    pub reverse: Option<bool>,
    pub numeric: Option<bool>,

    // Display
    pub percent: Option<bool>,
    pub abbreviate: Option<bool>,
    pub autosize: Option<bool>,
    pub basename: Option<bool>,
    #[serde(alias = "ignore-case")]
    pub ignore_case: Option<bool>,
    pub quiet: Option<bool>,
    #[serde(alias = "no-header")]
    pub no_header: Option<bool>,
    pub totals: Option<bool>,
    #[serde(alias = "totals-only")]
    pub totals_only: Option<bool>,
    pub format: Option<OutputFormat>,

    // System view
    /// Physical RAM size such as "16G"; probed when unset.
    pub realmem: Option<String>,
    #[serde(alias = "kernel-image")]
    pub kernel_image: Option<PathBuf>,

    // Column widths (negative = default, 0 = as needed)
    #[serde(alias = "cmd-width")]
    pub cmd_width: Option<i64>,
    #[serde(alias = "name-width")]
    pub name_width: Option<i64>,
    #[serde(alias = "user-width")]
    pub user_width: Option<i64>,
    #[serde(alias = "mapping-width")]
    pub mapping_width: Option<i64>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<LogLevel>,

    // Performance tuning
    #[serde(alias = "smaps-buffer-kb")]
    pub smaps_buffer_kb: Option<usize>,
    #[serde(alias = "smaps-rollup-buffer-kb")]
    pub smaps_rollup_buffer_kb: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            columns: None,
            sort: None,
            reverse: Some(false),
            numeric: Some(false),
            percent: Some(false),
            abbreviate: Some(false),
            autosize: Some(false),
            basename: Some(false),
            ignore_case: Some(false),
            quiet: Some(false),
            no_header: Some(false),
            totals: Some(false),
            totals_only: Some(false),
            format: Some(OutputFormat::Raw),
            realmem: None,
            kernel_image: None,
            cmd_width: None,
            name_width: None,
            user_width: None,
            mapping_width: None,
            log_level: Some(LogLevel::Warn),
            smaps_buffer_kb: Some(DEFAULT_SMAPS_BUFFER_KB),
            smaps_rollup_buffer_kb: Some(DEFAULT_SMAPS_ROLLUP_BUFFER_KB),
        }
    }
}

impl Config {
    fn flag(v: Option<bool>) -> bool {
        v.unwrap_or(false)
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format.unwrap_or(OutputFormat::Raw)
    }

    pub fn show_totals(&self) -> bool {
        Self::flag(self.totals) || Self::flag(self.totals_only)
    }

    pub fn totals_only(&self) -> bool {
        Self::flag(self.totals_only)
    }

    pub fn no_header(&self) -> bool {
        Self::flag(self.no_header)
    }

    pub fn buffers(&self) -> BufferConfig {
        BufferConfig {
            smaps_kb: self.smaps_buffer_kb.unwrap_or(DEFAULT_SMAPS_BUFFER_KB),
            smaps_rollup_kb: self
                .smaps_rollup_buffer_kb
                .unwrap_or(DEFAULT_SMAPS_ROLLUP_BUFFER_KB),
        }
    }

    /// Physical RAM source: the configured size, or a hardware probe.
    pub fn ram_source(&self) -> Result<RamSource, ConfigError> {
        match self.realmem.as_deref() {
            Some(s) => Ok(RamSource::Explicit(parse_memory_size(s)?)),
            None => Ok(RamSource::Probe),
        }
    }

    pub fn widths(&self) -> WidthOverrides {
        let w = |v: Option<i64>| v.map(Width::from_setting).unwrap_or_default();
        WidthOverrides {
            command: w(self.cmd_width),
            name: w(self.name_width),
            user: w(self.user_width),
            mapping: w(self.mapping_width),
        }
    }

    /// Invocation context rooted at the configured process filesystem.
    pub fn scan_context(&self) -> ScanContext {
        let root = self
            .proc_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT));
        ScanContext::new(root).with_quiet(Self::flag(self.quiet))
    }
}

/// The view selected on the command line.
pub fn selected_view(args: &Args) -> View {
    if args.mappings {
        View::Mappings
    } else if args.users {
        View::Users
    } else if args.system {
        View::System
    } else if args.sysdetail {
        View::SystemDetail
    } else if args.groupcmd {
        View::Commands
    } else {
        View::Processes
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config, view: View) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.smaps_buffer_kb == Some(0) {
        return Err("smaps_buffer_kb must be greater than zero".into());
    }
    if cfg.smaps_rollup_buffer_kb == Some(0) {
        return Err("smaps_rollup_buffer_kb must be greater than zero".into());
    }
    for (name, value) in [
        ("smaps_buffer_kb", cfg.smaps_buffer_kb),
        ("smaps_rollup_buffer_kb", cfg.smaps_rollup_buffer_kb),
    ] {
        if value.map_or(false, |kb| kb > MAX_BUFFER_KB) {
            return Err(format!("{} must not exceed {} kB", name, MAX_BUFFER_KB).into());
        }
    }

    cfg.ram_source()?;

    resolve_columns(view, cfg.columns.as_deref().unwrap_or(""))?;
    herakles_smem::columns::resolve_sort(view, cfg.sort.as_deref())?;

    if let Some(path) = &cfg.kernel_image {
        if !view.is_system() {
            info!(
                "Kernel image {} is only used by the system views",
                path.display()
            );
        } else if !path.exists() {
            return Err(format!("Kernel image not found: {}", path.display()).into());
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    // Boolean switches can only turn a setting on from the CLI.
    let switches = [
        (args.reverse, &mut config.reverse),
        (args.numeric, &mut config.numeric),
        (args.percent, &mut config.percent),
        (args.abbreviate, &mut config.abbreviate),
        (args.autosize, &mut config.autosize),
        (args.basename, &mut config.basename),
        (args.ignorecase, &mut config.ignore_case),
        (args.quiet, &mut config.quiet),
        (args.no_header, &mut config.no_header),
        (args.totals, &mut config.totals),
        (args.totalsonly, &mut config.totals_only),
    ];
    for (set, field) in switches {
        if set {
            *field = Some(true);
        }
    }

    if let Some(root) = &args.proc_root {
        config.proc_root = Some(root.clone());
    }
    if let Some(columns) = &args.columns {
        config.columns = Some(columns.clone());
    }
    if let Some(sort) = &args.sort {
        config.sort = Some(sort.clone());
    }
    if let Some(format) = args.format {
        config.format = Some(format);
    }
    if let Some(realmem) = &args.realmem {
        config.realmem = Some(realmem.clone());
    }
    if let Some(kernel) = &args.kernel {
        config.kernel_image = Some(kernel.clone());
    }

    // Widths
    if args.cmd_width.is_some() {
        config.cmd_width = args.cmd_width;
    }
    if args.name_width.is_some() {
        config.name_width = args.name_width;
    }
    if args.user_width.is_some() {
        config.user_width = args.user_width;
    }
    if args.mapping_width.is_some() {
        config.mapping_width = args.mapping_width;
    }

    if let Some(level) = args.log_level {
        config.log_level = Some(level);
    }

    // Performance settings
    if let Some(smaps_buffer_kb) = args.smaps_buffer_kb {
        config.smaps_buffer_kb = Some(smaps_buffer_kb);
    }
    if let Some(smaps_rollup_buffer_kb) = args.smaps_rollup_buffer_kb {
        config.smaps_rollup_buffer_kb = Some(smaps_rollup_buffer_kb);
    }

    Ok(config)
}

/// Builds the report request from the effective config and the CLI-only
/// selections (view and filters).
pub fn report_options(cfg: &Config, args: &Args) -> Result<ReportOptions, ConfigError> {
    let view = selected_view(args);
    Ok(ReportOptions {
        view,
        columns: cfg.columns.clone().unwrap_or_default(),
        sort: cfg.sort.clone(),
        filters: FilterOptions {
            process: args.processfilter.clone(),
            mapping: args.mapfilter.clone(),
            user: args.userfilter.clone(),
            pid: args.pid,
            ignore_case: Config::flag(cfg.ignore_case),
        },
        basename: Config::flag(cfg.basename),
        buffers: cfg.buffers(),
        layout: LayoutOptions {
            reverse: Config::flag(cfg.reverse),
            numeric: Config::flag(cfg.numeric),
            abbreviate: Config::flag(cfg.abbreviate),
            percent: Config::flag(cfg.percent),
            autosize: Config::flag(cfg.autosize),
            no_header: cfg.no_header(),
            widths: cfg.widths(),
            terminal_width: None,
        },
        system: SystemOptions {
            ram: cfg.ram_source()?,
            kernel_image: cfg.kernel_image.clone(),
            ..Default::default()
        },
    })
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(format!("Config file not found: {}", p.display()).into());
            }
            p.to_path_buf()
        }
        None => {
            // Try default locations
            let defaults = [
                "/etc/herakles/smem.yaml",
                "/etc/herakles/smem.yml",
                "/etc/herakles/smem.json",
                "./herakles-smem.yaml",
                "./herakles-smem.yml",
                "./herakles-smem.json",
            ];

            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(p) => PathBuf::from(p),
                None => return Ok(Config::default()),
            }
        }
    };

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Serializes a configuration in the requested format.
pub fn format_config(config: &Config, format: ConfigFormat) -> Result<String, Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    Ok(output)
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", format_config(config, format)?);
    Ok(())
}
