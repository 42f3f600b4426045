//! Process scanning utilities for discovering and reading process entries from /proc.
//!
//! This module enumerates numeric pid directories, resolves process identity
//! (command line, owner, short name) and drives the memory reader for every
//! process that passes the active filters.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::context::{Capability, ScanContext};
use crate::error::ReadError;
use crate::process::filter::FilterSet;
use crate::process::memory::{
    read_process_memory, Accounting, AccountingSource, BufferConfig, MappingRecord, MemoryMetrics,
};

/// Process entry representing a directory in /proc filesystem.
#[derive(Debug, Clone)]
pub struct ProcEntry {
    pub pid: u32,
    pub proc_path: PathBuf,
}

/// Lazy iterator over the numeric entries of a process filesystem root.
///
/// Yields each pid visible at the time its directory entry is read; no
/// ordering is guaranteed. An unreadable root yields nothing.
pub struct ProcEntries {
    inner: Option<fs::ReadDir>,
}

impl Iterator for ProcEntries {
    type Item = ProcEntry;

    fn next(&mut self) -> Option<ProcEntry> {
        let entries = self.inner.as_mut()?;
        for entry in entries.by_ref().flatten() {
            let p = entry.path();
            let name = match p.file_name().and_then(|s| s.to_str()) {
                Some(v) => v,
                None => continue,
            };
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            let pid: u32 = match name.parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            return Some(ProcEntry { pid, proc_path: p });
        }
        None
    }
}

/// Lists candidate processes under `root`.
pub fn collect_proc_entries(root: &Path) -> ProcEntries {
    let inner = match fs::read_dir(root) {
        Ok(rd) => Some(rd),
        Err(e) => {
            debug!("Cannot list {}: {}", root.display(), e);
            None
        }
    };
    ProcEntries { inner }
}

/// Identity fields of a process, readable without touching memory accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub pid: u32,
    pub uid: u32,
    pub user: String,
    /// Full argument vector joined by spaces, or `[name]` for kernel threads.
    pub command: String,
    /// Short executable name from comm.
    pub name: String,
}

/// One process and its memory accounting.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub pid: u32,
    pub uid: u32,
    pub user: String,
    pub command: String,
    pub name: String,
    pub metrics: MemoryMetrics,
    /// Number of mappings, known only when per-mapping accounting was read.
    pub maps: Option<usize>,
    pub mappings: Vec<MappingRecord>,
}

impl ProcessRecord {
    fn from_parts(identity: ProcessIdentity, metrics: MemoryMetrics) -> Self {
        Self {
            pid: identity.pid,
            uid: identity.uid,
            user: identity.user,
            command: identity.command,
            name: identity.name,
            metrics,
            maps: None,
            mappings: Vec::new(),
        }
    }

    /// First whitespace token of the command line, used as the grouping key.
    pub fn command_key(&self) -> &str {
        self.command.split_whitespace().next().unwrap_or(&self.command)
    }
}

/// Options that shape a process scan.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub accounting: Accounting,
    /// Shorten commands and mapping paths to their basenames.
    pub basename: bool,
    pub buffers: BufferConfig,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            accounting: Accounting::Rollup,
            basename: false,
            buffers: BufferConfig::default(),
        }
    }
}

fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
}

/// Reads the short process name from comm.
pub fn read_process_name(proc_path: &Path) -> std::io::Result<String> {
    let s = fs::read_to_string(proc_path.join("comm"))?;
    Ok(s.trim_end_matches('\n').to_string())
}

/// Reads the argument vector, NUL separators replaced by spaces.
pub fn read_cmdline(proc_path: &Path) -> std::io::Result<String> {
    let content = fs::read(proc_path.join("cmdline"))?;
    let joined: Vec<String> = content
        .split(|&b| b == 0u8)
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect();
    Ok(joined.join(" ").trim_end().to_string())
}

/// Resolves identity fields of one process.
pub fn read_identity(
    ctx: &mut ScanContext,
    entry: &ProcEntry,
    use_basename: bool,
) -> Result<ProcessIdentity, ReadError> {
    let pid = entry.pid;
    let uid = fs::metadata(&entry.proc_path)
        .map_err(|e| ReadError::from_io(pid, e))?
        .uid();
    let name = read_process_name(&entry.proc_path).map_err(|e| ReadError::from_io(pid, e))?;
    let cmdline = read_cmdline(&entry.proc_path).map_err(|e| ReadError::from_io(pid, e))?;

    let command = if cmdline.is_empty() {
        format!("[{}]", name)
    } else if use_basename {
        let first = cmdline.split_whitespace().next().unwrap_or(&cmdline);
        basename(first).to_string()
    } else {
        cmdline
    };

    Ok(ProcessIdentity {
        pid,
        uid,
        user: ctx.username(uid),
        command,
        name,
    })
}

fn read_accounting(
    ctx: &mut ScanContext,
    entry: &ProcEntry,
    identity: ProcessIdentity,
    opts: &ScanOptions,
) -> Result<(ProcessRecord, AccountingSource), ReadError> {
    let read = read_process_memory(&entry.proc_path, entry.pid, opts.accounting, &opts.buffers)?;
    if read.rollup_unsupported {
        ctx.report_gap(Capability::SmapsRollup);
    }
    let memory = read.memory;
    let mut record = ProcessRecord::from_parts(identity, memory.metrics);
    record.maps = memory.maps;
    record.mappings = memory.mappings;
    if opts.basename {
        for m in &mut record.mappings {
            if m.name.starts_with('/') {
                m.name = basename(&m.name).to_string();
            }
        }
    }
    Ok((record, memory.source))
}

/// Reads one process: identity plus memory accounting.
///
/// Returns `ReadError::Vanished` when the process exited or became
/// unreadable, `ReadError::NoAccounting` for kernel threads.
pub fn read_process(
    ctx: &mut ScanContext,
    pid: u32,
    opts: &ScanOptions,
) -> Result<ProcessRecord, ReadError> {
    let entry = ProcEntry {
        pid,
        proc_path: ctx.proc_path(pid),
    };
    let identity = read_identity(ctx, &entry, opts.basename)?;
    read_accounting(ctx, &entry, identity, opts).map(|(record, _)| record)
}

/// Tracks which optional fields were seen during one scan.
#[derive(Debug, Default)]
struct Observed {
    records: usize,
    rollup_records: usize,
    pss: bool,
    swap_pss: bool,
    pss_breakdown: bool,
    rss_breakdown: bool,
}

impl Observed {
    fn note(&mut self, record: &ProcessRecord, source: AccountingSource) {
        let m = &record.metrics;
        self.records += 1;
        self.pss |= m.pss.is_some();
        self.swap_pss |= m.swap_pss.is_some();
        self.rss_breakdown |= m.has_rss_breakdown();
        if source == AccountingSource::Rollup {
            self.rollup_records += 1;
            self.pss_breakdown |= m.has_pss_breakdown();
        }
    }

    fn report(&self, ctx: &mut ScanContext) {
        if self.records == 0 {
            return;
        }
        if !self.pss {
            ctx.report_gap(Capability::Pss);
        }
        if !self.swap_pss {
            ctx.report_gap(Capability::SwapPss);
        }
        if !self.rss_breakdown {
            ctx.report_gap(Capability::RssBreakdown);
        }
        if self.rollup_records > 0 && !self.pss_breakdown {
            ctx.report_gap(Capability::PssBreakdown);
        }
    }
}

/// Scans all processes and returns the records that pass `filters`.
///
/// Filters on identity are applied before any accounting file is read.
/// Processes that vanish mid-scan or have no accounting are skipped. Missing
/// optional kernel fields are reported once through `ctx` after the scan.
pub fn scan_processes(
    ctx: &mut ScanContext,
    filters: &FilterSet,
    opts: &ScanOptions,
) -> Vec<ProcessRecord> {
    let mut out = Vec::new();
    let mut observed = Observed::default();
    let root = ctx.proc_root().to_path_buf();

    for entry in collect_proc_entries(&root) {
        if !filters.selects_pid(entry.pid) {
            continue;
        }
        let identity = match read_identity(ctx, &entry, opts.basename) {
            Ok(i) => i,
            Err(e) => {
                debug!("Skipping pid {}: {}", entry.pid, e);
                continue;
            }
        };
        if !filters.accepts(&identity) {
            continue;
        }
        match read_accounting(ctx, &entry, identity, opts) {
            Ok((record, source)) => {
                observed.note(&record, source);
                out.push(record);
            }
            Err(e) => debug!("Skipping pid {}: {}", entry.pid, e),
        }
        if filters.pid_selector().is_some() && !out.is_empty() {
            break;
        }
    }

    observed.report(ctx);
    out
}
