//! Sorting, rendering and width computation for report tables.
//!
//! Rows are sorted on raw values; unit abbreviation and percentages are
//! applied afterwards and never influence the order.

use ahash::AHashSet as HashSet;
use std::cmp::Ordering;

use crate::columns::{ColumnKind, ColumnSpec, PercentBase, RawValue, RowSource, TotalKind, WidthGroup};

/// Fallback terminal width when stdout is not a terminal.
pub const DEFAULT_TERMINAL_WIDTH: usize = 80;
/// Overflow columns are never shrunk below this.
const MIN_OVERFLOW_WIDTH: usize = 10;
/// Width reserved for abbreviated or percentage values when autosizing.
const RENDERED_AMOUNT_WIDTH: usize = 7;

/// Width policy for a text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Width {
    /// Catalog default, subject to autosizing.
    #[default]
    Default,
    /// Exactly this many characters, excluded from autosizing.
    Fixed(usize),
    /// No padding or truncation.
    AsNeeded,
}

impl Width {
    /// Negative selects the default, zero means as needed.
    pub fn from_setting(v: i64) -> Self {
        match v {
            v if v < 0 => Width::Default,
            0 => Width::AsNeeded,
            v => Width::Fixed(v as usize),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WidthOverrides {
    pub command: Width,
    pub name: Width,
    pub user: Width,
    pub mapping: Width,
}

impl WidthOverrides {
    fn get(&self, group: WidthGroup) -> Width {
        match group {
            WidthGroup::None => Width::Default,
            WidthGroup::Command => self.command,
            WidthGroup::Name => self.name,
            WidthGroup::User => self.user,
            WidthGroup::Mapping => self.mapping,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LayoutOptions {
    pub reverse: bool,
    /// Compare text columns numerically (and render users as uids).
    pub numeric: bool,
    pub abbreviate: bool,
    pub percent: bool,
    pub autosize: bool,
    pub no_header: bool,
    pub widths: WidthOverrides,
    /// Terminal width for the overflow column; detected when `None`.
    pub terminal_width: Option<usize>,
}

/// Reference totals for percentages, in kilobytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PercentRefs {
    pub memory: u64,
    pub swap: u64,
}

/// One rendered cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub display: String,
    pub raw: RawValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub cells: Vec<Cell>,
}

/// A laid-out column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub spec: &'static ColumnSpec,
    /// Printed width; `None` prints values as they are.
    pub width: Option<usize>,
}

impl TableColumn {
    /// Pads (and for text columns truncates) a value to the column width.
    pub fn pad(&self, value: &str) -> String {
        match (self.width, self.spec.kind) {
            (None, _) => value.to_string(),
            (Some(w), ColumnKind::Text) => format!("{:<w$.w$}", value, w = w),
            (Some(w), ColumnKind::Numeric) => format!("{:>w$}", value, w = w),
        }
    }

    pub fn header(&self) -> String {
        self.pad(self.spec.header)
    }
}

/// Ordered, rendered rows plus totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<TableColumn>,
    pub rows: Vec<Row>,
    pub totals: Row,
}

impl Table {
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.spec.name)
    }
}

/// Terminal width of stdout, or the fallback when it is not a terminal.
pub fn terminal_width() -> usize {
    // SAFETY: TIOCGWINSZ only writes into the provided winsize struct
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
    if rc == 0 && ws.ws_col > 0 {
        ws.ws_col as usize
    } else {
        DEFAULT_TERMINAL_WIDTH
    }
}

/// Human readable size with one decimal and a K/M/G suffix.
pub fn abbreviate_bytes(bytes: u64) -> String {
    const K: f64 = 1024.0;
    let b = bytes as f64;
    if b > K * K * K {
        format!("{:.1}G", b / (K * K * K))
    } else if b > K * K {
        format!("{:.1}M", b / (K * K))
    } else if b > K {
        format!("{:.1}K", b / K)
    } else {
        bytes.to_string()
    }
}

/// Percentage of `total` with two decimals; a zero total renders "0".
pub fn percent_of(value: u64, total: u64) -> String {
    if total == 0 {
        return "0".to_string();
    }
    format!("{:.2}%", 100.0 * value as f64 / total as f64)
}

fn render(spec: &ColumnSpec, raw: &RawValue, opts: &LayoutOptions, refs: &PercentRefs) -> String {
    match raw {
        RawValue::Text(s) => s.clone(),
        RawValue::Number(None) => "-".to_string(),
        RawValue::Number(Some(v)) => {
            if spec.abbreviable && opts.percent {
                let total = match spec.percent {
                    PercentBase::Swap => refs.swap,
                    PercentBase::Memory | PercentBase::None => refs.memory,
                };
                percent_of(*v, total)
            } else if spec.abbreviable && opts.abbreviate {
                abbreviate_bytes(v * 1024)
            } else {
                v.to_string()
            }
        }
    }
}

fn compare_raw(a: &RawValue, b: &RawValue, spec: &ColumnSpec, numeric: bool) -> Ordering {
    match (a, b) {
        (RawValue::Number(x), RawValue::Number(y)) => x.cmp(y),
        (RawValue::Text(x), RawValue::Text(y)) if numeric => {
            let px: Option<u64> = x.trim().parse().ok();
            let py: Option<u64> = y.trim().parse().ok();
            px.cmp(&py)
        }
        (RawValue::Text(x), RawValue::Text(y)) => {
            if spec.overflow {
                x.to_lowercase().cmp(&y.to_lowercase())
            } else {
                x.cmp(y)
            }
        }
        (RawValue::Number(_), RawValue::Text(_)) => Ordering::Less,
        (RawValue::Text(_), RawValue::Number(_)) => Ordering::Greater,
    }
}

/// Stable sort of `(key, payload)` pairs; ties keep input order in both
/// directions.
pub fn stable_sort_by_key<T>(
    items: &mut [(RawValue, T)],
    spec: &ColumnSpec,
    reverse: bool,
    numeric: bool,
) {
    items.sort_by(|(a, _), (b, _)| {
        let ord = compare_raw(a, b, spec, numeric);
        if reverse {
            ord.reverse()
        } else {
            ord
        }
    });
}

fn total_for(spec: &ColumnSpec, values: &[&RawValue]) -> RawValue {
    match spec.total {
        TotalKind::None => RawValue::Text(String::new()),
        TotalKind::Count => RawValue::Number(Some(values.len() as u64)),
        TotalKind::Distinct => {
            let distinct: HashSet<String> = values
                .iter()
                .map(|v| match v {
                    RawValue::Text(s) => s.clone(),
                    RawValue::Number(n) => format!("{n:?}"),
                })
                .collect();
            RawValue::Number(Some(distinct.len() as u64))
        }
        TotalKind::Sum => {
            let present: Vec<u64> = values.iter().filter_map(|v| v.as_number()).collect();
            if present.is_empty() && !values.is_empty() {
                RawValue::Number(None)
            } else {
                RawValue::Number(Some(present.iter().sum()))
            }
        }
    }
}

fn column_widths(
    columns: &[&'static ColumnSpec],
    rows: &[Row],
    opts: &LayoutOptions,
) -> Vec<TableColumn> {
    let mut autosized = vec![false; columns.len()];
    let mut out: Vec<TableColumn> = columns
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let width = match opts.widths.get(spec.width_group) {
                Width::Fixed(w) => Some(w),
                Width::AsNeeded => None,
                Width::Default if opts.autosize => {
                    autosized[i] = true;
                    let mut w = 1;
                    if !opts.no_header {
                        w = w.max(spec.header.chars().count());
                    }
                    if spec.abbreviable && (opts.abbreviate || opts.percent) {
                        w = w.max(RENDERED_AMOUNT_WIDTH);
                    } else {
                        for r in rows {
                            w = w.max(r.cells[i].display.chars().count());
                        }
                    }
                    Some(w)
                }
                Width::Default => Some(spec.width),
            };
            TableColumn { spec, width }
        })
        .collect();

    if opts.autosize {
        let overflow = out
            .iter()
            .enumerate()
            .find(|(i, c)| autosized[*i] && c.spec.overflow)
            .map(|(i, _)| i);
        if let Some(idx) = overflow {
            let others: usize = out
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != idx)
                .filter_map(|(_, c)| c.width)
                .sum();
            let term = opts.terminal_width.unwrap_or_else(terminal_width);
            let max = term
                .saturating_sub(others + out.len())
                .max(MIN_OVERFLOW_WIDTH);
            if let Some(w) = out[idx].width.as_mut() {
                *w = (*w).min(max);
            }
        }
    }
    out
}

/// Sorts, renders and lays out one table.
///
/// Totals are computed over all records regardless of sort order.
pub fn build_table<R: RowSource>(
    records: &[R],
    columns: &[&'static ColumnSpec],
    sort: &'static ColumnSpec,
    opts: &LayoutOptions,
    refs: &PercentRefs,
) -> Table {
    let mut keyed: Vec<(RawValue, Vec<RawValue>)> = records
        .iter()
        .map(|r| {
            let raws = columns
                .iter()
                .map(|c| r.raw(c.field, opts.numeric))
                .collect();
            (r.raw(sort.field, opts.numeric), raws)
        })
        .collect();

    let totals_raw: Vec<RawValue> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let values: Vec<&RawValue> = keyed.iter().map(|(_, raws)| &raws[i]).collect();
            total_for(c, &values)
        })
        .collect();

    stable_sort_by_key(&mut keyed, sort, opts.reverse, opts.numeric);

    let rows: Vec<Row> = keyed
        .into_iter()
        .map(|(_, raws)| Row {
            cells: columns
                .iter()
                .zip(raws)
                .map(|(c, raw)| Cell {
                    display: render(c, &raw, opts, refs),
                    raw,
                })
                .collect(),
        })
        .collect();

    let totals = Row {
        cells: columns
            .iter()
            .zip(totals_raw)
            .map(|(c, raw)| {
                let display = match &raw {
                    RawValue::Text(s) if s.is_empty() => String::new(),
                    _ => render(c, &raw, opts, refs),
                };
                Cell { display, raw }
            })
            .collect(),
    };

    let columns = column_widths(columns, &rows, opts);
    Table {
        columns,
        rows,
        totals,
    }
}
