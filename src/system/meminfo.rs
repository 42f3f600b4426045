//! Global kernel memory counters from /proc/meminfo and /proc/vmstat.

use ahash::AHashMap as HashMap;
use once_cell::sync::Lazy;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

use crate::context::{Capability, ScanContext};
use crate::process::memory::parse_kb_value;

/// System page size in bytes.
pub static PAGE_SIZE: Lazy<u64> = Lazy::new(|| {
    // SAFETY: sysconf is thread-safe and has no side effects
    let v = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if v > 0 {
        v as u64
    } else {
        4096
    }
});

/// Parsed global memory counters, in kilobytes.
#[derive(Debug, Clone, Default)]
pub struct MemInfo {
    counters: HashMap<String, u64>,
}

impl MemInfo {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, u64)>) -> Self {
        Self {
            counters: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    /// Raw lookup without gap reporting.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    /// Looks up a counter; a missing counter is reported once and yields 0.
    pub fn counter(&self, ctx: &mut ScanContext, name: &'static str) -> u64 {
        match self.get(name) {
            Some(v) => v,
            None => {
                ctx.report_gap(Capability::MeminfoCounter(name));
                0
            }
        }
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

/// Parses /proc/meminfo content. Unparsable lines are skipped.
pub fn parse_meminfo(content: &str) -> MemInfo {
    let mut counters = HashMap::new();
    for line in content.lines() {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        match parse_kb_value(rest) {
            Some(kb) => {
                counters.insert(name.trim().to_string(), kb);
            }
            None => debug!("Skipping malformed meminfo line: {:?}", line),
        }
    }
    MemInfo { counters }
}

/// Reads `<proc_root>/meminfo`.
pub fn read_meminfo(proc_root: &Path) -> io::Result<MemInfo> {
    let content = fs::read_to_string(proc_root.join("meminfo"))?;
    Ok(parse_meminfo(&content))
}

/// Extracts `nr_mapped` (pages) from /proc/vmstat content.
pub fn parse_vmstat_nr_mapped(content: &str) -> Option<u64> {
    content.lines().find_map(|line| {
        let rest = line.strip_prefix("nr_mapped ")?;
        rest.trim().parse().ok()
    })
}

/// Total mapped file pages in kilobytes.
///
/// Uses the `Mapped` counter when present, otherwise `nr_mapped` from vmstat
/// times the page size. When neither exists the gap is reported and 0 returned.
pub fn mapped_kb(ctx: &mut ScanContext, meminfo: &MemInfo) -> u64 {
    if let Some(v) = meminfo.get("Mapped") {
        return v;
    }
    let pages = fs::read_to_string(ctx.proc_root().join("vmstat"))
        .ok()
        .and_then(|s| parse_vmstat_nr_mapped(&s));
    match pages {
        Some(p) => p * *PAGE_SIZE / 1024,
        None => {
            ctx.report_gap(Capability::MeminfoCounter("Mapped"));
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "\
MemTotal:       16318480 kB
MemFree:         8123456 kB
MemAvailable:   12000000 kB
Buffers:          300000 kB
Cached:          3000000 kB
SwapCached:            0 kB
AnonPages:       2000000 kB
Mapped:           500000 kB
Shmem:            200000 kB
Slab:             600000 kB
SReclaimable:     400000 kB
KernelStack:       20000 kB
PageTables:        40000 kB
SwapTotal:       2097148 kB
SwapFree:        2097148 kB
HugePages_Total:       0
";

    #[test]
    fn test_parse_meminfo() {
        let m = parse_meminfo(MEMINFO);
        assert_eq!(m.get("MemTotal"), Some(16318480));
        assert_eq!(m.get("Mapped"), Some(500000));
        assert_eq!(m.get("HugePages_Total"), Some(0));
        assert_eq!(m.get("Nope"), None);
    }

    #[test]
    fn test_counter_reports_gap_once() {
        let m = parse_meminfo("MemTotal: 100 kB\n");
        let mut ctx = ScanContext::default().with_quiet(true);
        assert_eq!(m.counter(&mut ctx, "Shmem"), 0);
        assert_eq!(m.counter(&mut ctx, "Shmem"), 0);
        assert_eq!(ctx.gaps(), &[Capability::MeminfoCounter("Shmem")]);
    }

    #[test]
    fn test_parse_vmstat_nr_mapped() {
        let vmstat = "nr_free_pages 2000\nnr_mapped 1234\nnr_mapped_file 9\n";
        assert_eq!(parse_vmstat_nr_mapped(vmstat), Some(1234));
        assert_eq!(parse_vmstat_nr_mapped("nr_free_pages 1\n"), None);
    }

    #[test]
    fn test_mapped_kb_falls_back_to_vmstat() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("vmstat"), "nr_mapped 10\n").unwrap();
        let mut ctx = ScanContext::new(tmp.path()).with_quiet(true);
        let m = parse_meminfo("MemTotal: 100 kB\n");
        assert_eq!(mapped_kb(&mut ctx, &m), 10 * *PAGE_SIZE / 1024);
        assert!(ctx.gaps().is_empty());
    }

    #[test]
    fn test_mapped_kb_missing_everywhere() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = ScanContext::new(tmp.path()).with_quiet(true);
        let m = parse_meminfo("MemTotal: 100 kB\n");
        assert_eq!(mapped_kb(&mut ctx, &m), 0);
        assert!(ctx.has_gap(Capability::MeminfoCounter("Mapped")));
    }
}
