//! Integration tests for the system memory overview.

mod common;

use common::{FakeProc, Mapping, MEMINFO};
use herakles_smem::process::memory::Accounting;
use herakles_smem::process::scanner::{scan_processes, ScanOptions};
use herakles_smem::process::FilterSet;
use herakles_smem::system::{build_system_report, SystemReport};
use herakles_smem::{build_report, Capability, RamSource, ReportOptions, ScanContext, SystemOptions, View};

fn ctx(fake: &FakeProc) -> ScanContext {
    ScanContext::new(fake.root()).with_quiet(true).with_own_pid(1)
}

fn assert_partition(report: &SystemReport, ram: u64) {
    let sum: u64 = report.rows.iter().map(|r| r.used).sum();
    assert_eq!(sum, ram);
    assert_eq!(report.physical_total, ram);
    for r in &report.rows {
        assert!(r.cache <= r.used, "{}: cache {} > used {}", r.area, r.cache, r.used);
        assert_eq!(r.cache + r.noncache(), r.used);
    }
}

fn fixture() -> FakeProc {
    let fake = FakeProc::new();
    fake.global("meminfo", MEMINFO)
        .global("modules", "ext4 1048576 1 - Live 0x0000000000000000\nnfs 524288 0 - Live 0x0\n")
        .global("mounts", "proc /proc proc rw 0 0\n");
    fake.process(10, "/usr/bin/db").with_smaps(
        10,
        &[
            Mapping::new(0x400000, "/usr/lib/libc.so.6", 1000),
            Mapping::new(0x800000, "/dev/zero", 500),
            Mapping::new(0x900000, "/SYSV00000000", 300),
        ],
    );
    fake
}

#[test]
fn test_summary_partitions_memtotal() {
    let fake = fixture();
    let mut ctx = ctx(&fake);
    let opts = SystemOptions {
        ram: RamSource::MemTotal,
        ..Default::default()
    };
    let report = build_system_report(&mut ctx, &opts, &[]);
    assert_eq!(report.rows.len(), 5);
    assert_partition(&report, 8_000_000);
}

#[test]
fn test_summary_with_explicit_ram_adds_firmware() {
    let fake = fixture();
    let mut ctx = ctx(&fake);
    let opts = SystemOptions {
        ram: RamSource::Explicit(8_388_608),
        ..Default::default()
    };
    let report = build_system_report(&mut ctx, &opts, &[]);
    assert_partition(&report, 8_388_608);
    assert_eq!(report.rows[0].area, "firmware/hardware");
    assert_eq!(report.rows[0].used, 388_608);
}

#[test]
fn test_detail_partitions_and_corrects_dev_zero() {
    let fake = fixture();
    let mut ctx = ctx(&fake);
    let scan = ScanOptions {
        accounting: Accounting::SmapsWithMappings,
        ..Default::default()
    };
    let records = scan_processes(&mut ctx, &FilterSet::accept_all(), &scan);
    let opts = SystemOptions {
        ram: RamSource::MemTotal,
        detail: true,
        extra_details: true,
        ..Default::default()
    };
    let report = build_system_report(&mut ctx, &opts, &records);

    // informational rows carry no used memory
    assert_eq!(report.rows.len(), 13 + 6);
    assert_partition(&report, 8_000_000);

    let find = |name: &str| report.rows.iter().find(|r| r.area == name).unwrap();
    assert_eq!(find("kernel modules").used, 1536);
    assert_eq!(find("shared (non process tmpfs)").used, 150_000 - 300);
    assert_eq!(find("/dev/zero mapped").details, 500);
    // file-backed Pss (libc and /dev/zero) minus the /dev/zero share
    let procs = find("processes (all/mapped files)");
    assert_eq!(procs.cache, 1000);
}

#[test]
fn test_missing_meminfo_degrades_to_gaps() {
    let fake = FakeProc::new();
    let mut ctx = ctx(&fake);
    let opts = SystemOptions {
        ram: RamSource::MemTotal,
        ..Default::default()
    };
    let report = build_system_report(&mut ctx, &opts, &[]);
    assert!(report.rows.iter().all(|r| r.used == 0));
    assert!(ctx.has_gap(Capability::MeminfoCounter("MemTotal")));
}

#[test]
fn test_system_view_report() {
    let fake = fixture();
    let mut opts = ReportOptions {
        view: View::System,
        system: SystemOptions {
            ram: RamSource::MemTotal,
            ..Default::default()
        },
        ..Default::default()
    };
    opts.layout.percent = true;
    let report = build_report(&mut ctx(&fake), &opts).unwrap();
    assert_eq!(report.table.rows.len(), 5);
    // free memory: 2000000 of 8000000
    let free = report.table.rows.last().unwrap();
    assert_eq!(free.cells[1].display, "25.00%");
}
