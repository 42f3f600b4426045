//! Report orchestration: validate options, scan, group and lay out one view.

use tracing::debug;

use crate::aggregate::{group_by_command, group_by_mapping, group_by_user};
use crate::columns::{resolve_columns, resolve_sort, ColumnSpec, Field, View};
use crate::context::{Capability, ScanContext};
use crate::error::ConfigError;
use crate::layout::{build_table, LayoutOptions, PercentRefs, Table};
use crate::process::filter::{FilterOptions, FilterSet};
use crate::process::memory::{Accounting, BufferConfig};
use crate::process::scanner::{scan_processes, ScanOptions};
use crate::system::{build_system_report, read_meminfo, RamSource, SystemOptions};

/// Everything needed to produce one report.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub view: View,
    /// Column-set string (empty, `all`, `+extra` or an explicit list).
    pub columns: String,
    pub sort: Option<String>,
    pub filters: FilterOptions,
    pub basename: bool,
    pub buffers: BufferConfig,
    pub layout: LayoutOptions,
    /// RAM source and kernel image; `detail`/`extra_details` are derived
    /// from the view and columns.
    pub system: SystemOptions,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            view: View::Processes,
            columns: String::new(),
            sort: None,
            filters: FilterOptions::default(),
            basename: false,
            buffers: BufferConfig::default(),
            layout: LayoutOptions::default(),
            system: SystemOptions::default(),
        }
    }
}

/// A finished report.
#[derive(Debug, Clone)]
pub struct Report {
    pub view: View,
    pub table: Table,
    /// Capability gaps seen while building the report.
    pub gaps: Vec<Capability>,
}

/// Validated, compiled form of [`ReportOptions`].
struct Plan {
    columns: Vec<&'static ColumnSpec>,
    sort: &'static ColumnSpec,
    filters: FilterSet,
}

fn plan(ctx: &ScanContext, opts: &ReportOptions) -> Result<Plan, ConfigError> {
    let columns = resolve_columns(opts.view, &opts.columns)?;
    let sort = resolve_sort(opts.view, opts.sort.as_deref())?;
    let filters = FilterSet::new(&opts.filters, ctx.own_pid())?;
    Ok(Plan {
        columns,
        sort,
        filters,
    })
}

fn uses_field(columns: &[&ColumnSpec], sort: &ColumnSpec, field: Field) -> bool {
    sort.field == field || columns.iter().any(|c| c.field == field)
}

/// Percentage references outside the system views: the explicit RAM size
/// when given, otherwise MemTotal, and SwapTotal for swap columns.
fn process_percent_refs(ctx: &ScanContext, ram: &RamSource) -> PercentRefs {
    let meminfo = match read_meminfo(ctx.proc_root()) {
        Ok(m) => m,
        Err(e) => {
            debug!("Cannot read meminfo for percentages: {}", e);
            Default::default()
        }
    };
    let memory = match ram {
        RamSource::Explicit(kb) => *kb,
        _ => meminfo.get("MemTotal").unwrap_or(0),
    };
    PercentRefs {
        memory,
        swap: meminfo.get("SwapTotal").unwrap_or(0),
    }
}

/// Builds the report for one view.
///
/// Columns, sort column and filter expressions are validated before any
/// process is read; those are the only errors this function returns.
pub fn build_report(ctx: &mut ScanContext, opts: &ReportOptions) -> Result<Report, ConfigError> {
    let plan = plan(ctx, opts)?;
    let layout: &LayoutOptions = &opts.layout;

    let mut scan = ScanOptions {
        accounting: Accounting::Rollup,
        basename: opts.basename,
        buffers: opts.buffers,
    };

    let table = match opts.view {
        View::Processes => {
            if uses_field(&plan.columns, plan.sort, Field::Maps) {
                scan.accounting = Accounting::Smaps;
            }
            let records = scan_processes(ctx, &plan.filters, &scan);
            let refs = process_percent_refs(ctx, &opts.system.ram);
            build_table(&records, &plan.columns, plan.sort, layout, &refs)
        }
        View::Users => {
            let records = scan_processes(ctx, &plan.filters, &scan);
            let groups = group_by_user(&records);
            let refs = process_percent_refs(ctx, &opts.system.ram);
            build_table(&groups, &plan.columns, plan.sort, layout, &refs)
        }
        View::Commands => {
            let records = scan_processes(ctx, &plan.filters, &scan);
            let groups = group_by_command(&records);
            let refs = process_percent_refs(ctx, &opts.system.ram);
            build_table(&groups, &plan.columns, plan.sort, layout, &refs)
        }
        View::Mappings => {
            scan.accounting = Accounting::SmapsWithMappings;
            let records = scan_processes(ctx, &plan.filters, &scan);
            let groups = group_by_mapping(&records, &plan.filters);
            let refs = process_percent_refs(ctx, &opts.system.ram);
            build_table(&groups, &plan.columns, plan.sort, layout, &refs)
        }
        View::System | View::SystemDetail => {
            let detail = opts.view == View::SystemDetail;
            let sys_opts = SystemOptions {
                detail,
                extra_details: detail && uses_field(&plan.columns, plan.sort, Field::Details),
                ..opts.system.clone()
            };
            let records = if detail {
                // the /dev/zero and SYSV corrections need every mapping of every process
                scan.accounting = Accounting::SmapsWithMappings;
                scan.basename = false;
                scan_processes(ctx, &FilterSet::accept_all(), &scan)
            } else {
                Vec::new()
            };
            let system = build_system_report(ctx, &sys_opts, &records);
            let refs = PercentRefs {
                memory: system.physical_total,
                swap: system.swaptotal,
            };
            build_table(&system.rows, &plan.columns, plan.sort, layout, &refs)
        }
    };

    Ok(Report {
        view: opts.view,
        table,
        gaps: ctx.gaps().to_vec(),
    })
}
