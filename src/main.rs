//! herakles-smem - version 0.1.0
//!
//! PSS based memory reporting with tracing logging.
//! This is the main entry point that resolves configuration, handles
//! subcommands and prints the selected report.

mod cli;
mod commands;
mod config;
mod output;

use clap::Parser;
use std::io::{self, Write};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_config};
use config::{
    report_options, resolve_config, selected_view, show_config, validate_effective_config, Config,
};
use herakles_smem::build_report;
use output::{render, OutputOptions};

/// Initializes tracing logging subsystem with configured log level.
/// Log lines go to stderr so the report on stdout stays machine readable.
fn setup_logging(config: &Config) {
    let level = config.log_level.unwrap_or(LogLevel::Warn);
    let filter = match level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {:?}", level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config, selected_view(args)) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Writes to stdout, treating a closed pipe (`| head`) as success.
fn write_stdout(text: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    match out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config, selected_view(&args)) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        if let Commands::Config {
            output,
            format,
            commented,
        } = command
        {
            return command_config(output.clone(), *format, *commented);
        }

        let config = load_validated_config(&args)?;
        setup_logging(&config);

        return match command {
            Commands::Check { memory, proc, all } => {
                command_check(*memory, *proc, *all, &config, selected_view(&args))
            }
            Commands::Config { .. } => Ok(()),
        };
    }

    let config = load_validated_config(&args)?;
    setup_logging(&config);

    let opts = match report_options(&config, &args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
    };
    debug!("Report options: {:?}", opts);

    let mut ctx = config.scan_context();
    let report = match build_report(&mut ctx, &opts) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };
    debug!(
        "Built {} view with {} rows, {} capability gaps",
        report.view.name(),
        report.table.rows.len(),
        report.gaps.len()
    );

    let out_opts = OutputOptions {
        format: config.output_format(),
        totals: config.show_totals(),
        totals_only: config.totals_only(),
        no_header: config.no_header(),
    };
    write_stdout(&render(&report, &out_opts)?)?;

    Ok(())
}
