//! End-to-end tests of report building against synthetic trees.

mod common;

use common::FakeProc;
use herakles_smem::columns::RawValue;
use herakles_smem::{build_report, FilterOptions, ReportOptions, ScanContext, View};

fn ctx(fake: &FakeProc) -> ScanContext {
    ScanContext::new(fake.root()).with_quiet(true).with_own_pid(1)
}

fn pid_column(report: &herakles_smem::Report) -> Vec<u64> {
    report
        .table
        .rows
        .iter()
        .filter_map(|r| r.cells[0].raw.as_number())
        .collect()
}

fn fixture() -> FakeProc {
    let fake = FakeProc::new();
    fake.simple(10, "/usr/bin/python3 a.py", 100)
        .simple(11, "/usr/bin/python3 b.py", 100)
        .simple(12, "/usr/bin/python3 c.py", 100)
        .simple(13, "/usr/sbin/sshd -D", 300)
        .simple(14, "/usr/bin/vim notes", 50);
    fake.global("meminfo", common::MEMINFO);
    fake
}

// -----------------------------------------------------------------------------
// Filtering
// -----------------------------------------------------------------------------

#[test]
fn test_filter_without_match_gives_empty_rows_and_zero_totals() {
    let fake = fixture();
    let opts = ReportOptions {
        filters: FilterOptions {
            process: Some("no-such-process".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    let report = build_report(&mut ctx(&fake), &opts).unwrap();
    assert!(report.table.rows.is_empty());

    let names: Vec<&str> = report.table.column_names().collect();
    let pss = names.iter().position(|n| *n == "pss").unwrap();
    assert_eq!(report.table.totals.cells[pss].raw, RawValue::Number(Some(0)));
    assert_eq!(report.table.totals.cells[0].raw, RawValue::Number(Some(0)));
}

#[test]
fn test_filter_is_idempotent() {
    let fake = fixture();
    let opts = ReportOptions {
        filters: FilterOptions {
            process: Some("python".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    let first = build_report(&mut ctx(&fake), &opts).unwrap();
    let second = build_report(&mut ctx(&fake), &opts).unwrap();
    assert_eq!(first.table, second.table);

    let mut pids = pid_column(&first);
    pids.sort_unstable();
    assert_eq!(pids, vec![10, 11, 12]);
}

// -----------------------------------------------------------------------------
// Sorting and display
// -----------------------------------------------------------------------------

#[test]
fn test_ties_keep_relative_order_when_reversed() {
    let fake = fixture();
    let forward = build_report(&mut ctx(&fake), &ReportOptions::default()).unwrap();
    let mut opts = ReportOptions::default();
    opts.layout.reverse = true;
    let reversed = build_report(&mut ctx(&fake), &opts).unwrap();

    let ties = |pids: Vec<u64>| -> Vec<u64> {
        pids.into_iter().filter(|p| (10..=12).contains(p)).collect()
    };
    assert_eq!(ties(pid_column(&forward)), ties(pid_column(&reversed)));

    let f = pid_column(&forward);
    assert_eq!(f.first(), Some(&14));
    assert_eq!(f.last(), Some(&13));
    assert_eq!(pid_column(&reversed).first(), Some(&13));
}

#[test]
fn test_abbreviation_does_not_change_order() {
    let fake = fixture();
    let plain = build_report(&mut ctx(&fake), &ReportOptions::default()).unwrap();
    let mut opts = ReportOptions::default();
    opts.layout.abbreviate = true;
    let abbreviated = build_report(&mut ctx(&fake), &opts).unwrap();
    assert_eq!(pid_column(&plain), pid_column(&abbreviated));
}

#[test]
fn test_percent_uses_memtotal() {
    let fake = fixture();
    let mut opts = ReportOptions {
        columns: "pid pss".to_string(),
        sort: Some("pid".to_string()),
        ..Default::default()
    };
    opts.layout.percent = true;
    let report = build_report(&mut ctx(&fake), &opts).unwrap();
    let sshd = report
        .table
        .rows
        .iter()
        .find(|r| r.cells[0].raw.as_number() == Some(13))
        .unwrap();
    // 300 of 8000000 kB
    assert_eq!(sshd.cells[1].display, "0.00%");
    assert_eq!(sshd.cells[1].raw, RawValue::Number(Some(300)));
}

// -----------------------------------------------------------------------------
// Grouped views
// -----------------------------------------------------------------------------

#[test]
fn test_command_view() {
    let fake = fixture();
    let opts = ReportOptions {
        view: View::Commands,
        ..Default::default()
    };
    let report = build_report(&mut ctx(&fake), &opts).unwrap();
    assert_eq!(report.table.rows.len(), 3);
    let first = &report.table.rows[0];
    assert_eq!(first.cells[0].raw, RawValue::Text("/usr/bin/vim".to_string()));
    let python = report
        .table
        .rows
        .iter()
        .find(|r| r.cells[0].raw == RawValue::Text("/usr/bin/python3".to_string()))
        .unwrap();
    assert_eq!(python.cells[1].raw, RawValue::Number(Some(3)));
}

#[test]
fn test_mapping_view_reads_per_mapping_accounting() {
    let fake = fixture();
    let opts = ReportOptions {
        view: View::Mappings,
        ..Default::default()
    };
    let report = build_report(&mut ctx(&fake), &opts).unwrap();
    assert_eq!(report.table.rows.len(), 1);
    let row = &report.table.rows[0];
    assert_eq!(row.cells[0].raw, RawValue::Text("/usr/lib/libc.so.6".to_string()));
    assert_eq!(row.cells[1].raw, RawValue::Number(Some(5)));
    assert_eq!(row.cells[3].raw, RawValue::Number(Some(650)));
}

#[test]
fn test_maps_column_forces_smaps() {
    let fake = fixture();
    let opts = ReportOptions {
        columns: "pid maps".to_string(),
        ..Default::default()
    };
    let report = build_report(&mut ctx(&fake), &opts).unwrap();
    assert!(report
        .table
        .rows
        .iter()
        .all(|r| r.cells[1].raw == RawValue::Number(Some(1))));
}
