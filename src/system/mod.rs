//! System-wide memory model.
//!
//! Builds an area-by-area breakdown of physical memory from the global kernel
//! counters, the physical RAM size and (in detail mode) the per-mapping
//! accounting of all processes.
//!
//! Every row satisfies `cache + noncache == used`, and the `used` column sums
//! to [`SystemReport::physical_total`].

pub mod kernel;
pub mod meminfo;
pub mod probe;

use std::path::PathBuf;
use tracing::{debug, warn};

use crate::context::{Capability, ScanContext};
use crate::process::scanner::ProcessRecord;
use kernel::KernelImage;
pub use meminfo::{mapped_kb, parse_meminfo, read_meminfo, MemInfo};

/// One row of the system overview. All values are kilobytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemAreaRecord {
    /// Position in the fixed area vocabulary.
    pub order: usize,
    pub area: &'static str,
    pub used: u64,
    /// Part of `used` that is reclaimable cache.
    pub cache: u64,
    /// Informational value, only set on the extra detail rows.
    pub details: u64,
}

impl SystemAreaRecord {
    fn new(area: &'static str, used: u64, cache: u64) -> Self {
        Self {
            order: 0,
            area,
            used,
            cache: cache.min(used),
            details: 0,
        }
    }

    fn info(area: &'static str, details: u64) -> Self {
        Self {
            order: 0,
            area,
            used: 0,
            cache: 0,
            details,
        }
    }

    pub fn noncache(&self) -> u64 {
        self.used - self.cache
    }
}

/// Where the physical RAM size comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RamSource {
    /// User-supplied size in kilobytes.
    Explicit(u64),
    /// Ask the hardware inventory, falling back to MemTotal.
    Probe,
    /// Use MemTotal.
    MemTotal,
}

/// Options for the system overview.
#[derive(Debug, Clone)]
pub struct SystemOptions {
    pub ram: RamSource,
    /// Uncompressed kernel image whose size is reported as its own area.
    pub kernel_image: Option<PathBuf>,
    /// Row-per-subsystem breakdown instead of the 5-row summary.
    pub detail: bool,
    /// Append informational rows (only in detail mode).
    pub extra_details: bool,
}

impl Default for SystemOptions {
    fn default() -> Self {
        Self {
            ram: RamSource::Probe,
            kernel_image: None,
            detail: false,
            extra_details: false,
        }
    }
}

/// Process-side inputs of the detailed breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessShare {
    /// Sum of file-backed Pss over all processes, if known.
    pub pss_file: Option<u64>,
    /// Pss of mappings backed by /dev/zero.
    pub dev_zero: u64,
    /// Pss of SYSV shared memory segments.
    pub sysv: u64,
}

impl ProcessShare {
    /// Sums the shares over per-mapping process records.
    pub fn from_records(records: &[ProcessRecord]) -> Self {
        let mut share = ProcessShare::default();
        for r in records {
            if let Some(p) = r.metrics.pss_file {
                share.pss_file = Some(share.pss_file.unwrap_or(0) + p);
            }
            for m in &r.mappings {
                let pss = m.metrics.pss.unwrap_or(0);
                if m.name.starts_with("/dev/zero") {
                    share.dev_zero += pss;
                } else if m.name.starts_with("/SYSV") {
                    share.sysv += pss;
                }
            }
        }
        share
    }
}

/// Kernel consumers not itemized by the global counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelShare {
    pub image: u64,
    pub modules: u64,
    pub ramfs: u64,
}

/// The computed overview.
#[derive(Debug, Clone, Default)]
pub struct SystemReport {
    pub rows: Vec<SystemAreaRecord>,
    /// Reference total for percentages; equals the sum of `used`.
    pub physical_total: u64,
    pub memtotal: u64,
    pub swaptotal: u64,
}

/// Determines the physical RAM size in kilobytes.
pub fn resolve_ram(ctx: &mut ScanContext, source: &RamSource, memtotal: u64) -> u64 {
    match source {
        RamSource::Explicit(kb) => *kb,
        RamSource::MemTotal => memtotal,
        RamSource::Probe => match probe::probe_ram_kb() {
            Ok(kb) => kb,
            Err(e) => {
                debug!("RAM probe failed: {:#}", e);
                ctx.report_gap(Capability::RamProbe);
                memtotal
            }
        },
    }
}

/// Determines the kernel image size in kilobytes, 0 when unknown.
pub fn resolve_kernel_image(ctx: &mut ScanContext, path: Option<&PathBuf>) -> u64 {
    let Some(path) = path else {
        return 0;
    };
    match kernel::kernel_image_size(path) {
        Ok(KernelImage::Size(kb)) => kb,
        Ok(KernelImage::Packed { gzip_offset }) => {
            if !ctx.is_quiet() {
                warn!(
                    "'{}' should be an original uncompressed compiled kernel file. \
                     Maybe it can be extracted with: dd if={} bs=1 skip={} | gzip -d >{}.unpacked",
                    path.display(),
                    path.display(),
                    gzip_offset,
                    path.display()
                );
            }
            0
        }
        Err(e) => {
            debug!("Kernel image size failed: {:#}", e);
            ctx.report_gap(Capability::KernelImage);
            0
        }
    }
}

fn number_rows(mut rows: Vec<SystemAreaRecord>) -> Vec<SystemAreaRecord> {
    for (i, row) in rows.iter_mut().enumerate() {
        row.order = i;
    }
    rows
}

/// The coarse 5-row overview.
pub fn summary_areas(
    ctx: &mut ScanContext,
    m: &MemInfo,
    ram: u64,
    kernel_image: u64,
) -> Vec<SystemAreaRecord> {
    let mt = m.counter(ctx, "MemTotal");
    let f = m.counter(ctx, "MemFree").min(mt);
    let anon = m.counter(ctx, "AnonPages");
    let mapped = mapped_kb(ctx, m);
    let buffers = m.counter(ctx, "Buffers");
    let sreclaimable = m.counter(ctx, "SReclaimable");
    let cached = m.counter(ctx, "Cached");

    let fh = ram.saturating_sub(mt + kernel_image);
    let u = (anon + mapped).min(mt - f);
    let kd = mt - f - u;
    let kdc = (buffers + sreclaimable + cached).saturating_sub(mapped);

    number_rows(vec![
        SystemAreaRecord::new("firmware/hardware", fh, 0),
        SystemAreaRecord::new("kernel image", kernel_image, 0),
        SystemAreaRecord::new("kernel dynamic memory", kd, kdc),
        SystemAreaRecord::new("userspace memory", u, mapped),
        SystemAreaRecord::new("free memory", f, f),
    ])
}

/// Rows whose size is estimated, trimmed first when the itemized kernel
/// areas exceed what the counters leave for them.
const TRIM_ORDER: [&str; 8] = [
    "cached (w/o mapped,tmpfs,ramfs)",
    "shared (non process tmpfs)",
    "ramfs",
    "buffers",
    "slab (all/SReclaimable)",
    "kernel stack",
    "page tables",
    "kernel modules",
];

fn trim_overshoot(rows: &mut [SystemAreaRecord], mut overshoot: u64) {
    for name in TRIM_ORDER {
        if overshoot == 0 {
            break;
        }
        if let Some(row) = rows.iter_mut().find(|r| r.area == name) {
            let cut = row.used.min(overshoot);
            row.used -= cut;
            row.cache = row.cache.min(row.used);
            overshoot -= cut;
        }
    }
}

/// The row-per-subsystem overview.
pub fn detail_areas(
    ctx: &mut ScanContext,
    m: &MemInfo,
    ram: u64,
    kernel: KernelShare,
    procs: ProcessShare,
    extra_details: bool,
) -> Vec<SystemAreaRecord> {
    let mt = m.counter(ctx, "MemTotal");
    let f = m.counter(ctx, "MemFree").min(mt);
    let anon = m.counter(ctx, "AnonPages");
    let mapped = mapped_kb(ctx, m);
    let buffers = m.counter(ctx, "Buffers");
    let cached = m.counter(ctx, "Cached");
    let slab = m.counter(ctx, "Slab");
    let sreclaimable = m.counter(ctx, "SReclaimable");
    let pagetables = m.counter(ctx, "PageTables");
    let kernelstack = m.counter(ctx, "KernelStack");
    let shmem = m.counter(ctx, "Shmem");

    let fh = ram.saturating_sub(mt + kernel.image);
    let u = (anon + mapped).min(mt - f);
    let kernel_budget = mt - f - u;

    // /dev/zero pages show up in Mapped but are anonymous memory
    let mapped_files = mapped.saturating_sub(procs.dev_zero);
    let shm = shmem.saturating_sub(procs.sysv);
    let filecache = cached
        .saturating_sub(mapped_files)
        .saturating_sub(shm)
        .saturating_sub(kernel.ramfs);
    let process_cache = match procs.pss_file {
        Some(pss_file) => pss_file.saturating_sub(procs.dev_zero),
        None => mapped_files,
    };

    let mut kernel_rows = vec![
        SystemAreaRecord::new("kernel modules", kernel.modules, 0),
        SystemAreaRecord::new("page tables", pagetables, 0),
        SystemAreaRecord::new("kernel stack", kernelstack, 0),
        SystemAreaRecord::new("slab (all/SReclaimable)", slab, sreclaimable),
        SystemAreaRecord::new("buffers", buffers, buffers),
        SystemAreaRecord::new("cached (w/o mapped,tmpfs,ramfs)", filecache, filecache),
        SystemAreaRecord::new("shared (non process tmpfs)", shm, 0),
        SystemAreaRecord::new("ramfs", kernel.ramfs, 0),
    ];
    let itemized: u64 = kernel_rows.iter().map(|r| r.used).sum();
    let unknown = kernel_budget.saturating_sub(itemized);
    if itemized > kernel_budget {
        debug!(
            "Itemized kernel areas exceed counters by {} kB, trimming estimates",
            itemized - kernel_budget
        );
        trim_overshoot(&mut kernel_rows, itemized - kernel_budget);
    }

    let mut rows = vec![
        SystemAreaRecord::new("firmware/hardware", fh, 0),
        SystemAreaRecord::new("kernel image", kernel.image, 0),
    ];
    rows.extend(kernel_rows);
    rows.push(SystemAreaRecord::new("unknown", unknown, 0));
    rows.push(SystemAreaRecord::new("processes (all/mapped files)", u, process_cache));
    rows.push(SystemAreaRecord::new("free memory", f, f));

    if extra_details {
        let swaptotal = m.get("SwapTotal").unwrap_or(0);
        let swapfree = m.get("SwapFree").unwrap_or(0);
        rows.push(SystemAreaRecord::info("/dev/zero mapped", procs.dev_zero));
        rows.push(SystemAreaRecord::info("shared by processes", procs.sysv));
        rows.push(SystemAreaRecord::info("unevictable", m.counter(ctx, "Unevictable")));
        rows.push(SystemAreaRecord::info("dirty (unwritten to file)", m.counter(ctx, "Dirty")));
        rows.push(SystemAreaRecord::info("swapped", swaptotal.saturating_sub(swapfree)));
        rows.push(SystemAreaRecord::info(
            "available (estimated)",
            m.counter(ctx, "MemAvailable"),
        ));
    }

    number_rows(rows)
}

/// Reads all inputs and builds the system overview.
///
/// `processes` must come from a per-mapping scan of all processes when
/// `opts.detail` is set; it is ignored otherwise.
pub fn build_system_report(
    ctx: &mut ScanContext,
    opts: &SystemOptions,
    processes: &[ProcessRecord],
) -> SystemReport {
    let m = match read_meminfo(ctx.proc_root()) {
        Ok(m) => m,
        Err(e) => {
            debug!("Cannot read meminfo: {}", e);
            MemInfo::default()
        }
    };
    let memtotal = m.counter(ctx, "MemTotal");
    let swaptotal = m.get("SwapTotal").unwrap_or(0);
    let ram = resolve_ram(ctx, &opts.ram, memtotal);
    let image = resolve_kernel_image(ctx, opts.kernel_image.as_ref());

    let rows = if opts.detail {
        let modules = match kernel::read_module_sizes(ctx.proc_root()) {
            Ok(kb) => kb,
            Err(e) => {
                debug!("Cannot read modules: {}", e);
                ctx.report_gap(Capability::KernelModules);
                0
            }
        };
        let kernel = KernelShare {
            image,
            modules,
            ramfs: kernel::ramfs_usage_kb(ctx.proc_root()),
        };
        let procs = ProcessShare::from_records(processes);
        detail_areas(ctx, &m, ram, kernel, procs, opts.extra_details)
    } else {
        summary_areas(ctx, &m, ram, image)
    };

    let physical_total = rows.iter().map(|r| r.used).sum();
    SystemReport {
        rows,
        physical_total,
        memtotal,
        swaptotal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meminfo() -> MemInfo {
        MemInfo::from_pairs([
            ("MemTotal", 16_000_000),
            ("MemFree", 8_000_000),
            ("MemAvailable", 12_000_000),
            ("Buffers", 300_000),
            ("Cached", 3_000_000),
            ("AnonPages", 2_000_000),
            ("Mapped", 500_000),
            ("Shmem", 200_000),
            ("Slab", 600_000),
            ("SReclaimable", 400_000),
            ("KernelStack", 20_000),
            ("PageTables", 40_000),
            ("SwapTotal", 2_000_000),
            ("SwapFree", 1_500_000),
            ("Unevictable", 0),
            ("Dirty", 100),
        ])
    }

    fn assert_invariants(rows: &[SystemAreaRecord], total: u64) {
        for r in rows {
            assert_eq!(r.cache + r.noncache(), r.used, "row {}", r.area);
        }
        assert_eq!(rows.iter().map(|r| r.used).sum::<u64>(), total);
    }

    // -------------------------------------------------------------------------
    // Summary view
    // -------------------------------------------------------------------------

    #[test]
    fn test_summary_rows() {
        let mut ctx = ScanContext::default().with_quiet(true);
        let rows = summary_areas(&mut ctx, &meminfo(), 16_777_216, 10_000);
        let names: Vec<_> = rows.iter().map(|r| r.area).collect();
        assert_eq!(
            names,
            vec![
                "firmware/hardware",
                "kernel image",
                "kernel dynamic memory",
                "userspace memory",
                "free memory"
            ]
        );
        assert_eq!(rows[0].used, 16_777_216 - 16_000_000 - 10_000);
        assert_eq!(rows[3].used, 2_500_000);
        assert_eq!(rows[3].cache, 500_000);
        assert_eq!(rows[2].used, 16_000_000 - 8_000_000 - 2_500_000);
        assert_eq!(rows[2].cache, 300_000 + 400_000 + 3_000_000 - 500_000);
        assert_invariants(&rows, 16_777_216);
        assert!(ctx.gaps().is_empty());
    }

    #[test]
    fn test_summary_ram_smaller_than_memtotal() {
        let mut ctx = ScanContext::default().with_quiet(true);
        let rows = summary_areas(&mut ctx, &meminfo(), 1_000, 0);
        assert_eq!(rows[0].used, 0);
        assert_invariants(&rows, 16_000_000);
    }

    #[test]
    fn test_summary_missing_counters() {
        let mut ctx = ScanContext::new("/nonexistent").with_quiet(true);
        let m = MemInfo::from_pairs([("MemTotal", 1000), ("MemFree", 400)]);
        let rows = summary_areas(&mut ctx, &m, 1000, 0);
        assert_invariants(&rows, 1000);
        assert!(ctx.has_gap(Capability::MeminfoCounter("AnonPages")));
        assert!(ctx.has_gap(Capability::MeminfoCounter("Mapped")));
    }

    // -------------------------------------------------------------------------
    // Detail view
    // -------------------------------------------------------------------------

    #[test]
    fn test_detail_invariants() {
        let mut ctx = ScanContext::default().with_quiet(true);
        let kernel = KernelShare {
            image: 10_000,
            modules: 5_000,
            ramfs: 0,
        };
        let procs = ProcessShare {
            pss_file: Some(450_000),
            dev_zero: 1_000,
            sysv: 50_000,
        };
        let rows = detail_areas(&mut ctx, &meminfo(), 16_777_216, kernel, procs, false);
        assert_eq!(rows.len(), 13);
        assert_invariants(&rows, 16_777_216);

        let procs_row = rows.iter().find(|r| r.area.starts_with("processes")).unwrap();
        assert_eq!(procs_row.used, 2_500_000);
        assert_eq!(procs_row.cache, 449_000);

        let shared = rows.iter().find(|r| r.area.starts_with("shared")).unwrap();
        assert_eq!(shared.used, 150_000);

        let cached = rows.iter().find(|r| r.area.starts_with("cached")).unwrap();
        assert_eq!(cached.used, 3_000_000 - 499_000 - 150_000);
    }

    #[test]
    fn test_detail_dev_zero_not_reported_as_cache() {
        let mut ctx = ScanContext::default().with_quiet(true);
        let procs = ProcessShare {
            pss_file: None,
            dev_zero: 100_000,
            sysv: 0,
        };
        let rows = detail_areas(&mut ctx, &meminfo(), 16_000_000, KernelShare::default(), procs, false);
        let procs_row = rows.iter().find(|r| r.area.starts_with("processes")).unwrap();
        assert_eq!(procs_row.cache, 400_000);
    }

    #[test]
    fn test_detail_overshoot_trims_estimates() {
        let mut ctx = ScanContext::default().with_quiet(true);
        let m = MemInfo::from_pairs([
            ("MemTotal", 1_000),
            ("MemFree", 100),
            ("AnonPages", 300),
            ("Mapped", 100),
            ("Buffers", 200),
            ("Cached", 600),
            ("Slab", 200),
            ("SReclaimable", 150),
            ("KernelStack", 10),
            ("PageTables", 10),
            ("Shmem", 0),
        ]);
        let kernel = KernelShare {
            image: 0,
            modules: 50,
            ramfs: 0,
        };
        let rows = detail_areas(&mut ctx, &m, 1_000, kernel, ProcessShare::default(), false);
        assert_invariants(&rows, 1_000);
        let unknown = rows.iter().find(|r| r.area == "unknown").unwrap();
        assert_eq!(unknown.used, 0);
    }

    #[test]
    fn test_detail_extra_rows() {
        let mut ctx = ScanContext::default().with_quiet(true);
        let procs = ProcessShare {
            pss_file: Some(0),
            dev_zero: 7,
            sysv: 9,
        };
        let rows = detail_areas(&mut ctx, &meminfo(), 16_000_000, KernelShare::default(), procs, true);
        assert_eq!(rows.len(), 19);
        assert_invariants(&rows, 16_000_000);
        let swapped = rows.iter().find(|r| r.area == "swapped").unwrap();
        assert_eq!(swapped.details, 500_000);
        assert_eq!(swapped.used, 0);
        assert_eq!(rows.last().unwrap().order, 18);
    }

    #[test]
    fn test_resolve_ram_explicit() {
        let mut ctx = ScanContext::default().with_quiet(true);
        assert_eq!(resolve_ram(&mut ctx, &RamSource::Explicit(42), 10), 42);
        assert_eq!(resolve_ram(&mut ctx, &RamSource::MemTotal, 10), 10);
        assert!(ctx.gaps().is_empty());
    }

    #[test]
    fn test_resolve_kernel_image_missing_file() {
        let mut ctx = ScanContext::default().with_quiet(true);
        let path = PathBuf::from("/nonexistent/vmlinux");
        assert_eq!(resolve_kernel_image(&mut ctx, Some(&path)), 0);
        assert!(ctx.has_gap(Capability::KernelImage));
        assert_eq!(resolve_kernel_image(&mut ctx, None), 0);
    }
}
