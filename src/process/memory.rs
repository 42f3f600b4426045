//! Memory parsing utilities for reading process memory metrics from /proc.
//!
//! This module provides functions to parse memory information from
//! `/proc/<pid>/smaps`, `/proc/<pid>/smaps_rollup` and `/proc/<pid>/status`.
//! Every metric is optional: a field the running kernel does not expose stays
//! `None` instead of silently becoming zero.

use std::fmt;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::debug;

use crate::error::ReadError;

/// Name given to mappings without a backing path.
pub const ANONYMOUS_MAPPING: &str = "<anonymous>";

/// Buffer configuration for parsing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    pub smaps_kb: usize,
    pub smaps_rollup_kb: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            smaps_kb: 512,
            smaps_rollup_kb: 256,
        }
    }
}

/// Canonical memory metric names. All values are kilobytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKey {
    Vss,
    Rss,
    Pss,
    Uss,
    Swap,
    SwapPss,
    RssAnon,
    RssFile,
    RssShmem,
    PssAnon,
    PssFile,
    PssShmem,
    /// Pss + SwapPss.
    TPss,
    AvgVss,
    AvgUss,
    AvgPss,
    AvgRss,
}

impl MetricKey {
    /// Metrics that are summed when records are folded together.
    pub const ADDITIVE: [MetricKey; 12] = [
        MetricKey::Vss,
        MetricKey::Rss,
        MetricKey::Pss,
        MetricKey::Uss,
        MetricKey::Swap,
        MetricKey::SwapPss,
        MetricKey::RssAnon,
        MetricKey::RssFile,
        MetricKey::RssShmem,
        MetricKey::PssAnon,
        MetricKey::PssFile,
        MetricKey::PssShmem,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetricKey::Vss => "Vss",
            MetricKey::Rss => "Rss",
            MetricKey::Pss => "Pss",
            MetricKey::Uss => "Uss",
            MetricKey::Swap => "Swap",
            MetricKey::SwapPss => "SwapPss",
            MetricKey::RssAnon => "RssAnon",
            MetricKey::RssFile => "RssFile",
            MetricKey::RssShmem => "RssShmem",
            MetricKey::PssAnon => "PssAnon",
            MetricKey::PssFile => "PssFile",
            MetricKey::PssShmem => "PssShmem",
            MetricKey::TPss => "TPss",
            MetricKey::AvgVss => "AvgVss",
            MetricKey::AvgUss => "AvgUss",
            MetricKey::AvgPss => "AvgPss",
            MetricKey::AvgRss => "AvgRss",
        }
    }

    /// For per-group averages, the additive metric being averaged.
    pub fn average_of(self) -> Option<MetricKey> {
        match self {
            MetricKey::AvgVss => Some(MetricKey::Vss),
            MetricKey::AvgUss => Some(MetricKey::Uss),
            MetricKey::AvgPss => Some(MetricKey::Pss),
            MetricKey::AvgRss => Some(MetricKey::Rss),
            _ => None,
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Memory metrics of a process, mapping or group, in kilobytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryMetrics {
    pub vss: Option<u64>,
    pub rss: Option<u64>,
    pub pss: Option<u64>,
    pub uss: Option<u64>,
    pub swap: Option<u64>,
    pub swap_pss: Option<u64>,
    pub rss_anon: Option<u64>,
    pub rss_file: Option<u64>,
    pub rss_shmem: Option<u64>,
    pub pss_anon: Option<u64>,
    pub pss_file: Option<u64>,
    pub pss_shmem: Option<u64>,
}

impl MemoryMetrics {
    /// Returns the value of a metric. Averages are never defined for a single
    /// record and always return `None` here.
    pub fn get(&self, key: MetricKey) -> Option<u64> {
        match key {
            MetricKey::Vss => self.vss,
            MetricKey::Rss => self.rss,
            MetricKey::Pss => self.pss,
            MetricKey::Uss => self.uss,
            MetricKey::Swap => self.swap,
            MetricKey::SwapPss => self.swap_pss,
            MetricKey::RssAnon => self.rss_anon,
            MetricKey::RssFile => self.rss_file,
            MetricKey::RssShmem => self.rss_shmem,
            MetricKey::PssAnon => self.pss_anon,
            MetricKey::PssFile => self.pss_file,
            MetricKey::PssShmem => self.pss_shmem,
            MetricKey::TPss => self.tpss(),
            MetricKey::AvgVss | MetricKey::AvgUss | MetricKey::AvgPss | MetricKey::AvgRss => None,
        }
    }

    fn slot(&mut self, key: MetricKey) -> Option<&mut Option<u64>> {
        match key {
            MetricKey::Vss => Some(&mut self.vss),
            MetricKey::Rss => Some(&mut self.rss),
            MetricKey::Pss => Some(&mut self.pss),
            MetricKey::Uss => Some(&mut self.uss),
            MetricKey::Swap => Some(&mut self.swap),
            MetricKey::SwapPss => Some(&mut self.swap_pss),
            MetricKey::RssAnon => Some(&mut self.rss_anon),
            MetricKey::RssFile => Some(&mut self.rss_file),
            MetricKey::RssShmem => Some(&mut self.rss_shmem),
            MetricKey::PssAnon => Some(&mut self.pss_anon),
            MetricKey::PssFile => Some(&mut self.pss_file),
            MetricKey::PssShmem => Some(&mut self.pss_shmem),
            _ => None,
        }
    }

    /// Sets an additive metric. Derived metrics are ignored.
    pub fn set(&mut self, key: MetricKey, value: u64) {
        if let Some(slot) = self.slot(key) {
            *slot = Some(value);
        }
    }

    /// Adds to an additive metric, turning an absent value into a present one.
    pub fn add(&mut self, key: MetricKey, value: u64) {
        if let Some(slot) = self.slot(key) {
            *slot = Some(slot.unwrap_or(0).saturating_add(value));
        }
    }

    /// Folds another record into this one. Absent + absent stays absent.
    pub fn accumulate(&mut self, other: &MemoryMetrics) {
        for key in MetricKey::ADDITIVE {
            if let Some(v) = other.get(key) {
                self.add(key, v);
            }
        }
    }

    /// Pss plus SwapPss; a missing SwapPss counts as zero.
    pub fn tpss(&self) -> Option<u64> {
        match (self.pss, self.swap_pss) {
            (None, None) => None,
            (pss, swap_pss) => Some(pss.unwrap_or(0) + swap_pss.unwrap_or(0)),
        }
    }

    pub fn is_empty(&self) -> bool {
        MetricKey::ADDITIVE.iter().all(|k| self.get(*k).is_none())
    }

    pub fn has_pss_breakdown(&self) -> bool {
        self.pss_anon.is_some() || self.pss_file.is_some() || self.pss_shmem.is_some()
    }

    pub fn has_rss_breakdown(&self) -> bool {
        self.rss_anon.is_some() || self.rss_file.is_some() || self.rss_shmem.is_some()
    }
}

/// What backs a mapping, used to split Pss when the kernel does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    Anonymous,
    File,
    Shmem,
}

impl Backing {
    pub fn classify(name: &str, inode: u64) -> Self {
        if inode == 0 {
            Backing::Anonymous
        } else if name.starts_with("/SYSV")
            || name.starts_with("/dev/shm/")
            || name.starts_with("/memfd:")
        {
            Backing::Shmem
        } else {
            Backing::File
        }
    }
}

/// One memory region of a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRecord {
    /// Backing path or pseudo-name such as `[heap]` or `/dev/zero`.
    pub name: String,
    pub start: u64,
    pub end: u64,
    pub perms: String,
    pub inode: u64,
    pub metrics: MemoryMetrics,
}

/// Header line of a mapping block:
/// `start-end perms offset dev inode [path]`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MappingHeader {
    start: u64,
    end: u64,
    perms: String,
    inode: u64,
    name: String,
}

fn parse_mapping_header(line: &str) -> Option<MappingHeader> {
    let mut fields = line.split_whitespace();
    let range = fields.next()?;
    if !range.contains('-') || range.contains(':') {
        return None;
    }
    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    let perms = fields.next()?.to_string();
    let _offset = fields.next()?;
    let _dev = fields.next()?;
    let inode = fields.next()?.parse().ok()?;
    let rest: Vec<&str> = fields.collect();
    let name = if rest.is_empty() {
        ANONYMOUS_MAPPING.to_string()
    } else {
        rest.join(" ")
    };
    Some(MappingHeader {
        start,
        end,
        perms,
        inode,
        name,
    })
}

/// Parses kilobyte values from smaps file lines.
pub fn parse_kb_value(v: &str) -> Option<u64> {
    v.split_whitespace().next()?.parse().ok()
}

/// Splits an accounting line `Name:   1234 kB` into name and value.
///
/// Returns `None` for lines that are not kilobyte accounting lines
/// (e.g. `VmFlags:`) and for malformed values, so a bad line only costs
/// that one metric.
pub fn parse_accounting_line(line: &str) -> Option<(&str, u64)> {
    let (name, rest) = line.split_once(':')?;
    if rest.split_whitespace().last() != Some("kB") {
        return None;
    }
    match parse_kb_value(rest) {
        Some(kb) => Some((name.trim(), kb)),
        None => {
            debug!("Skipping malformed accounting line: {:?}", line);
            None
        }
    }
}

/// Per-mapping accumulator for the fields of one smaps block.
#[derive(Debug, Default)]
struct BlockAccumulator {
    metrics: MemoryMetrics,
    private_clean: Option<u64>,
    private_dirty: Option<u64>,
}

impl BlockAccumulator {
    fn apply(&mut self, name: &str, kb: u64) {
        let key = match name {
            "Size" => MetricKey::Vss,
            "Rss" => MetricKey::Rss,
            "Pss" => MetricKey::Pss,
            "Swap" => MetricKey::Swap,
            "SwapPss" => MetricKey::SwapPss,
            "Pss_Anon" => MetricKey::PssAnon,
            "Pss_File" => MetricKey::PssFile,
            "Pss_Shmem" => MetricKey::PssShmem,
            "Private_Clean" => {
                self.private_clean = Some(kb);
                return;
            }
            "Private_Dirty" => {
                self.private_dirty = Some(kb);
                return;
            }
            _ => return,
        };
        self.metrics.set(key, kb);
    }

    fn finish(mut self) -> MemoryMetrics {
        if self.private_clean.is_some() || self.private_dirty.is_some() {
            self.metrics.uss =
                Some(self.private_clean.unwrap_or(0) + self.private_dirty.unwrap_or(0));
        }
        self.metrics
    }
}

/// Result of parsing one smaps or smaps_rollup stream.
#[derive(Debug, Clone, Default)]
pub struct SmapsSummary {
    /// Sum over all mapping blocks.
    pub totals: MemoryMetrics,
    /// Number of mapping blocks seen.
    pub mapping_count: usize,
    /// Per-mapping records, only filled when requested.
    pub mappings: Vec<MappingRecord>,
}

/// Parses smaps-formatted accounting.
///
/// Works for both `smaps` (many blocks) and `smaps_rollup` (a single
/// `[rollup]` block). When `derive_breakdown` is set, mappings that lack
/// `Pss_Anon/Pss_File/Pss_Shmem` get them derived from their backing.
pub fn parse_smaps<R: BufRead>(
    mut reader: R,
    keep_mappings: bool,
    derive_breakdown: bool,
) -> io::Result<SmapsSummary> {
    let mut summary = SmapsSummary::default();
    let mut current: Option<(MappingHeader, BlockAccumulator)> = None;
    let mut buf = Vec::new();

    let mut flush = |summary: &mut SmapsSummary, block: Option<(MappingHeader, BlockAccumulator)>| {
        if let Some((header, acc)) = block {
            let mut metrics = acc.finish();
            if derive_breakdown && !metrics.has_pss_breakdown() {
                if let Some(pss) = metrics.pss {
                    let key = match Backing::classify(&header.name, header.inode) {
                        Backing::Anonymous => MetricKey::PssAnon,
                        Backing::File => MetricKey::PssFile,
                        Backing::Shmem => MetricKey::PssShmem,
                    };
                    metrics.set(key, pss);
                }
            }
            summary.totals.accumulate(&metrics);
            summary.mapping_count += 1;
            if keep_mappings {
                summary.mappings.push(MappingRecord {
                    name: header.name,
                    start: header.start,
                    end: header.end,
                    perms: header.perms,
                    inode: header.inode,
                    metrics,
                });
            }
        }
    };

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches('\n');

        // headers first: a mapped path may itself end in "kB"
        if let Some(header) = parse_mapping_header(line) {
            flush(&mut summary, current.take());
            current = Some((header, BlockAccumulator::default()));
        } else if let Some((name, kb)) = parse_accounting_line(line) {
            match current.as_mut() {
                Some((_, acc)) => acc.apply(name, kb),
                None => debug!("Accounting line before any mapping header: {:?}", line),
            }
        }
    }
    flush(&mut summary, current.take());

    Ok(summary)
}

/// Fields of interest from /proc/<pid>/status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusInfo {
    pub vm_size: Option<u64>,
    pub vm_swap: Option<u64>,
    pub rss_anon: Option<u64>,
    pub rss_file: Option<u64>,
    pub rss_shmem: Option<u64>,
}

/// Parses /proc/<pid>/status content.
pub fn parse_status(content: &str) -> StatusInfo {
    let mut info = StatusInfo::default();
    for line in content.lines() {
        if let Some(v) = line.strip_prefix("VmSize:") {
            info.vm_size = parse_kb_value(v);
        } else if let Some(v) = line.strip_prefix("VmSwap:") {
            info.vm_swap = parse_kb_value(v);
        } else if let Some(v) = line.strip_prefix("RssAnon:") {
            info.rss_anon = parse_kb_value(v);
        } else if let Some(v) = line.strip_prefix("RssFile:") {
            info.rss_file = parse_kb_value(v);
        } else if let Some(v) = line.strip_prefix("RssShmem:") {
            info.rss_shmem = parse_kb_value(v);
        }
    }
    info
}

/// How the per-process accounting should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accounting {
    /// Prefer smaps_rollup, fall back to smaps.
    Rollup,
    /// Always read smaps (needed for the mapping count).
    Smaps,
    /// Read smaps and keep every mapping record.
    SmapsWithMappings,
}

/// Which file the accounting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountingSource {
    Rollup,
    Smaps,
}

/// Memory view of one process as read from /proc.
#[derive(Debug, Clone)]
pub struct ProcessMemory {
    pub metrics: MemoryMetrics,
    pub source: AccountingSource,
    /// Mapping count, only known when smaps was read.
    pub maps: Option<usize>,
    pub mappings: Vec<MappingRecord>,
}

/// Fast parser for /proc/<pid>/smaps_rollup (Linux >= 4.14).
/// Much faster than reading the full smaps file.
pub fn parse_smaps_rollup(path: &Path, buf_kb: usize) -> io::Result<SmapsSummary> {
    let file = fs::File::open(path)?;
    let reader = BufReader::with_capacity(buf_kb.saturating_mul(1024), file);
    parse_smaps(reader, false, false)
}

/// Parses memory metrics from /proc/<pid>/smaps file.
pub fn parse_smaps_file(path: &Path, buf_kb: usize, keep_mappings: bool) -> io::Result<SmapsSummary> {
    let file = fs::File::open(path)?;
    let reader = BufReader::with_capacity(buf_kb.saturating_mul(1024), file);
    parse_smaps(reader, keep_mappings, true)
}

/// Outcome of reading accounting: the summary plus whether the fast path was
/// missing on this kernel (as opposed to the process having vanished).
#[derive(Debug)]
pub struct AccountingRead {
    pub memory: ProcessMemory,
    pub rollup_unsupported: bool,
}

/// Reads the memory accounting of one process.
///
/// Uses smaps_rollup when available and allowed, otherwise falls back to full
/// smaps. `status` supplies VmSize and the Rss breakdown.
pub fn read_process_memory(
    proc_path: &Path,
    pid: u32,
    accounting: Accounting,
    buffers: &BufferConfig,
) -> Result<AccountingRead, ReadError> {
    let status = fs::read_to_string(proc_path.join("status"))
        .map(|s| parse_status(&s))
        .map_err(|e| ReadError::from_io(pid, e))?;

    let mut rollup_unsupported = false;
    let mut parsed: Option<(SmapsSummary, AccountingSource)> = None;

    if accounting == Accounting::Rollup {
        match parse_smaps_rollup(&proc_path.join("smaps_rollup"), buffers.smaps_rollup_kb) {
            Ok(summary) => parsed = Some((summary, AccountingSource::Rollup)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // The pid directory still exists, so the kernel simply lacks the file.
                rollup_unsupported = proc_path.join("smaps").exists();
            }
            Err(e) => return Err(ReadError::from_io(pid, e)),
        }
    }

    let (summary, source) = match parsed {
        Some(p) => p,
        None => {
            let keep = accounting == Accounting::SmapsWithMappings;
            let summary = parse_smaps_file(&proc_path.join("smaps"), buffers.smaps_kb, keep)
                .map_err(|e| ReadError::from_io(pid, e))?;
            (summary, AccountingSource::Smaps)
        }
    };

    if summary.mapping_count == 0 {
        return Err(ReadError::NoAccounting { pid });
    }

    let mut metrics = summary.totals;
    if status.vm_size.is_some() {
        metrics.vss = status.vm_size;
    }
    metrics.rss_anon = status.rss_anon;
    metrics.rss_file = status.rss_file;
    metrics.rss_shmem = status.rss_shmem;

    let maps = match source {
        AccountingSource::Smaps => Some(summary.mapping_count),
        AccountingSource::Rollup => None,
    };

    Ok(AccountingRead {
        memory: ProcessMemory {
            metrics,
            source,
            maps,
            mappings: summary.mappings,
        },
        rollup_unsupported,
    })
}
