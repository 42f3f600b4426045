//! Physical RAM size: explicit user value or external hardware inventory.

use anyhow::{bail, Context, Result};
use std::process::Command;
use tracing::debug;

use crate::error::ConfigError;

/// Parses a memory size with a unit suffix (`1024M`, `16G`, `1.5TB`) into
/// kilobytes.
pub fn parse_memory_size(s: &str) -> Result<u64, ConfigError> {
    const UNITS: [(&str, u64); 10] = [
        ("kB", 1 << 10),
        ("KB", 1 << 10),
        ("MB", 1 << 20),
        ("GB", 1 << 30),
        ("TB", 1 << 40),
        ("k", 1 << 10),
        ("K", 1 << 10),
        ("M", 1 << 20),
        ("G", 1 << 30),
        ("T", 1 << 40),
    ];
    let trimmed = s.trim();
    for (suffix, factor) in UNITS {
        if let Some(number) = trimmed.strip_suffix(suffix) {
            let value: f64 = number
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidMemorySize(s.to_string()))?;
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidMemorySize(s.to_string()));
            }
            let bytes = (value * factor as f64) as u64;
            return Ok(bytes / 1024);
        }
    }
    Err(ConfigError::InvalidMemorySize(s.to_string()))
}

/// Sums installed module sizes from `dmidecode --type memory` output, in kB.
pub fn parse_dmidecode_memory(output: &str) -> Option<u64> {
    let mut total_kb = 0u64;
    let mut found = false;
    for line in output.lines() {
        let Some(rest) = line.trim().strip_prefix("Size:") else {
            continue;
        };
        let mut parts = rest.split_whitespace();
        let (Some(num), Some(unit)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(n) = num.parse::<u64>() else {
            continue;
        };
        let kb = match unit {
            "kB" | "KB" => n,
            "MB" => n.saturating_mul(1 << 10),
            "GB" => n.saturating_mul(1 << 20),
            "TB" => n.saturating_mul(1 << 30),
            _ => continue,
        };
        total_kb = total_kb.saturating_add(kb);
        found = true;
    }
    found.then_some(total_kb)
}

/// Asks the hardware inventory for the installed RAM size in kB.
///
/// Only meaningful on bare metal with sufficient privileges; any failure is
/// returned as an error for the caller to degrade on.
pub fn probe_ram_kb() -> Result<u64> {
    let output = Command::new("dmidecode")
        .args(["--type", "memory"])
        .output()
        .context("failed to run dmidecode")?;
    if !output.status.success() {
        bail!(
            "dmidecode exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let kb = parse_dmidecode_memory(&stdout).context("dmidecode reported no memory devices")?;
    debug!("dmidecode reports {} kB of installed RAM", kb);
    Ok(kb)
}
