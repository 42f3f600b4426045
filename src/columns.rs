//! Static column catalog for every report view.
//!
//! Column-set strings are resolved against this catalog once, before the scan,
//! so an unknown column is a configuration error rather than a print-time
//! failure.

use serde::Serialize;
use std::fmt;

use crate::aggregate::AggregateRecord;
use crate::error::ConfigError;
use crate::process::memory::MetricKey;
use crate::process::scanner::ProcessRecord;
use crate::system::SystemAreaRecord;

/// Report views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Processes,
    Mappings,
    Users,
    Commands,
    System,
    SystemDetail,
}

impl View {
    pub fn name(self) -> &'static str {
        match self {
            View::Processes => "process",
            View::Mappings => "mapping",
            View::Users => "user",
            View::Commands => "command",
            View::System => "system",
            View::SystemDetail => "system detail",
        }
    }

    pub fn default_columns(self) -> &'static str {
        match self {
            View::Processes => "pid user command swap uss pss rss",
            View::Mappings => "map pids avgpss pss",
            View::Users => "user count swap uss pss rss",
            View::Commands => "command pids swap uss pss rss",
            View::System | View::SystemDetail => "area used cache noncache",
        }
    }

    pub fn default_sort(self) -> &'static str {
        match self {
            View::System | View::SystemDetail => "order",
            _ => "pss",
        }
    }

    pub fn is_system(self) -> bool {
        matches!(self, View::System | View::SystemDetail)
    }

    pub fn catalog(self) -> &'static [ColumnSpec] {
        match self {
            View::Processes => PROCESS_COLUMNS,
            View::Mappings => MAPPING_COLUMNS,
            View::Users => USER_COLUMNS,
            View::Commands => COMMAND_COLUMNS,
            View::System => &SYSTEM_DETAIL_COLUMNS[..SYSTEM_DETAIL_COLUMNS.len() - 1],
            View::SystemDetail => SYSTEM_DETAIL_COLUMNS,
        }
    }

    pub fn column(self, name: &str) -> Option<&'static ColumnSpec> {
        self.catalog().iter().find(|c| c.name == name)
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a column displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Pid,
    User,
    Command,
    Name,
    Maps,
    Members,
    Mappings,
    Map,
    Order,
    Area,
    Used,
    Cache,
    Noncache,
    Details,
    Metric(MetricKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Left aligned, truncated to the column width.
    Text,
    /// Right aligned.
    Numeric,
}

/// How the totals line summarizes a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalKind {
    None,
    Sum,
    /// Number of rows.
    Count,
    /// Number of distinct values.
    Distinct,
}

/// Reference total for percentage rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PercentBase {
    None,
    Memory,
    Swap,
}

/// Which width override applies to a text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthGroup {
    None,
    Command,
    Name,
    User,
    Mapping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub header: &'static str,
    pub field: Field,
    pub kind: ColumnKind,
    pub width: usize,
    /// Eligible for K/M/G abbreviation and percentages.
    pub abbreviable: bool,
    pub total: TotalKind,
    pub percent: PercentBase,
    pub width_group: WidthGroup,
    /// May be shrunk to fit the terminal when autosizing.
    pub overflow: bool,
    pub description: &'static str,
}

const fn text(
    name: &'static str,
    header: &'static str,
    field: Field,
    width: usize,
    total: TotalKind,
    width_group: WidthGroup,
    overflow: bool,
    description: &'static str,
) -> ColumnSpec {
    ColumnSpec {
        name,
        header,
        field,
        kind: ColumnKind::Text,
        width,
        abbreviable: false,
        total,
        percent: PercentBase::None,
        width_group,
        overflow,
        description,
    }
}

const fn count(
    name: &'static str,
    header: &'static str,
    field: Field,
    total: TotalKind,
    description: &'static str,
) -> ColumnSpec {
    ColumnSpec {
        name,
        header,
        field,
        kind: ColumnKind::Numeric,
        width: 5,
        abbreviable: false,
        total,
        percent: PercentBase::None,
        width_group: WidthGroup::None,
        overflow: false,
        description,
    }
}

const fn amount(
    name: &'static str,
    header: &'static str,
    field: Field,
    width: usize,
    total: TotalKind,
    percent: PercentBase,
    description: &'static str,
) -> ColumnSpec {
    ColumnSpec {
        name,
        header,
        field,
        kind: ColumnKind::Numeric,
        width,
        abbreviable: true,
        total,
        percent,
        width_group: WidthGroup::None,
        overflow: false,
        description,
    }
}

const fn metric(
    name: &'static str,
    header: &'static str,
    key: MetricKey,
    description: &'static str,
) -> ColumnSpec {
    let percent = match key {
        MetricKey::Swap | MetricKey::SwapPss => PercentBase::Swap,
        _ => PercentBase::Memory,
    };
    let total = match key {
        MetricKey::AvgVss | MetricKey::AvgUss | MetricKey::AvgPss | MetricKey::AvgRss => {
            TotalKind::None
        }
        _ => TotalKind::Sum,
    };
    amount(name, header, Field::Metric(key), 8, total, percent, description)
}

const PID: ColumnSpec = count("pid", "PID", Field::Pid, TotalKind::Count, "process ID");
const SWAP: ColumnSpec = metric("swap", "Swap", MetricKey::Swap, "swapped-out memory");
const USS: ColumnSpec = metric("uss", "USS", MetricKey::Uss, "unique set size");
const PSS: ColumnSpec = metric("pss", "PSS", MetricKey::Pss, "proportional set size");
const RSS: ColumnSpec = metric("rss", "RSS", MetricKey::Rss, "resident set size");
const VSS: ColumnSpec = metric("vss", "VSS", MetricKey::Vss, "virtual set size");
const SWAPPSS: ColumnSpec = metric(
    "swappss",
    "SwapPSS",
    MetricKey::SwapPss,
    "proportional swapped-out memory",
);
const TPSS: ColumnSpec = metric("tpss", "TPSS", MetricKey::TPss, "PSS plus SwapPSS");
const AVGVSS: ColumnSpec = metric("avgvss", "AVGVSS", MetricKey::AvgVss, "average VSS per PID");
const AVGUSS: ColumnSpec = metric("avguss", "AVGUSS", MetricKey::AvgUss, "average USS per PID");
const AVGPSS: ColumnSpec = metric("avgpss", "AVGPSS", MetricKey::AvgPss, "average PSS per PID");
const AVGRSS: ColumnSpec = metric("avgrss", "AVGRSS", MetricKey::AvgRss, "average RSS per PID");
const COMMAND: ColumnSpec = text(
    "command",
    "Command",
    Field::Command,
    27,
    TotalKind::None,
    WidthGroup::Command,
    true,
    "process command line",
);

static PROCESS_COLUMNS: &[ColumnSpec] = &[
    PID,
    text(
        "user",
        "User",
        Field::User,
        8,
        TotalKind::Distinct,
        WidthGroup::User,
        false,
        "owner of process",
    ),
    COMMAND,
    text(
        "name",
        "Name",
        Field::Name,
        15,
        TotalKind::None,
        WidthGroup::Name,
        true,
        "process name",
    ),
    count("maps", "Maps", Field::Maps, TotalKind::Sum, "total number of mappings"),
    SWAP,
    USS,
    PSS,
    RSS,
    VSS,
    SWAPPSS,
    TPSS,
    metric("pssanon", "PssAnon", MetricKey::PssAnon, "proportional anonymous memory"),
    metric("pssfile", "PssFile", MetricKey::PssFile, "proportional file-backed memory"),
    metric("pssshmem", "PssShmem", MetricKey::PssShmem, "proportional shmem-backed memory"),
    metric("rssanon", "RssAnon", MetricKey::RssAnon, "anonymous memory"),
    metric("rssfile", "RssFile", MetricKey::RssFile, "file-backed memory"),
    metric("rssshmem", "RssShmem", MetricKey::RssShmem, "shmem-backed memory"),
];

static USER_COLUMNS: &[ColumnSpec] = &[
    text(
        "user",
        "User",
        Field::User,
        8,
        TotalKind::Count,
        WidthGroup::User,
        false,
        "owner of process",
    ),
    count("count", "Count", Field::Members, TotalKind::Sum, "number of processes"),
    SWAP,
    USS,
    PSS,
    RSS,
    VSS,
    SWAPPSS,
    TPSS,
    AVGVSS,
    AVGUSS,
];

static COMMAND_COLUMNS: &[ColumnSpec] = &[
    text(
        "command",
        "Command",
        Field::Command,
        27,
        TotalKind::Count,
        WidthGroup::Command,
        true,
        "process command",
    ),
    count("pids", "PIDs", Field::Members, TotalKind::Sum, "number of processes"),
    text(
        "user",
        "User",
        Field::User,
        8,
        TotalKind::Distinct,
        WidthGroup::User,
        false,
        "owner of the first process",
    ),
    SWAP,
    USS,
    PSS,
    RSS,
    VSS,
    SWAPPSS,
    TPSS,
    AVGVSS,
    AVGUSS,
];

static MAPPING_COLUMNS: &[ColumnSpec] = &[
    text(
        "map",
        "Map",
        Field::Map,
        40,
        TotalKind::Count,
        WidthGroup::Mapping,
        true,
        "mapping name",
    ),
    count("count", "Count", Field::Mappings, TotalKind::Sum, "number of mappings found"),
    count("pids", "PIDs", Field::Members, TotalKind::Sum, "number of PIDs using mapping"),
    AVGPSS,
    PSS,
    RSS,
    USS,
    SWAP,
    VSS,
    SWAPPSS,
    AVGUSS,
    AVGRSS,
    AVGVSS,
];

static SYSTEM_DETAIL_COLUMNS: &[ColumnSpec] = &[
    count("order", "Order", Field::Order, TotalKind::None, "hierarchical order"),
    text(
        "area",
        "Area",
        Field::Area,
        24,
        TotalKind::Count,
        WidthGroup::None,
        false,
        "memory area",
    ),
    amount(
        "used",
        "Used",
        Field::Used,
        10,
        TotalKind::Sum,
        PercentBase::Memory,
        "area in use",
    ),
    amount(
        "cache",
        "Cache",
        Field::Cache,
        10,
        TotalKind::Sum,
        PercentBase::Memory,
        "area used as cache",
    ),
    amount(
        "noncache",
        "Noncache",
        Field::Noncache,
        10,
        TotalKind::Sum,
        PercentBase::Memory,
        "area not reclaimable",
    ),
    // must stay last, the summary view drops it
    amount(
        "details",
        "Details",
        Field::Details,
        10,
        TotalKind::Sum,
        PercentBase::Memory,
        "additional metrics",
    ),
];

fn known_names(view: View) -> String {
    view.catalog()
        .iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
}

/// Resolves a column-set string.
///
/// Empty selects the view defaults, `all` selects every column, `+a b`
/// appends to the defaults and anything else is an explicit list.
pub fn resolve_columns(view: View, spec: &str) -> Result<Vec<&'static ColumnSpec>, ConfigError> {
    let spec = spec.trim();
    if tokens(spec).any(|t| t == "all") {
        return Ok(view.catalog().iter().collect());
    }

    let names: Vec<&str> = if let Some(extra) = spec.strip_prefix('+') {
        let mut names: Vec<&str> = tokens(view.default_columns()).collect();
        for t in tokens(extra) {
            if !names.contains(&t) {
                names.push(t);
            }
        }
        names
    } else if spec.is_empty() {
        tokens(view.default_columns()).collect()
    } else {
        tokens(spec).collect()
    };

    let unknown: Vec<&str> = names
        .iter()
        .copied()
        .filter(|n| view.column(n).is_none())
        .collect();
    if !unknown.is_empty() {
        return Err(ConfigError::UnknownColumn {
            view: view.name(),
            names: unknown.join(" "),
            known: known_names(view),
        });
    }

    Ok(names.iter().filter_map(|n| view.column(n)).collect())
}

/// Resolves the sort column; `None` selects the view default.
pub fn resolve_sort(view: View, name: Option<&str>) -> Result<&'static ColumnSpec, ConfigError> {
    let name = name.unwrap_or_else(|| view.default_sort());
    view.column(name).ok_or_else(|| ConfigError::UnknownSortColumn {
        view: view.name(),
        name: name.to_string(),
        known: known_names(view),
    })
}

/// Raw cell value: a number (possibly absent) or text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(Option<u64>),
    Text(String),
}

impl RawValue {
    pub fn as_number(&self) -> Option<u64> {
        match self {
            RawValue::Number(n) => *n,
            RawValue::Text(_) => None,
        }
    }
}

/// Anything that can fill a report row.
pub trait RowSource {
    /// Value of `field`; `numeric` renders users as uids.
    fn raw(&self, field: Field, numeric: bool) -> RawValue;
}

impl RowSource for ProcessRecord {
    fn raw(&self, field: Field, numeric: bool) -> RawValue {
        match field {
            Field::Pid => RawValue::Number(Some(self.pid as u64)),
            Field::User if numeric => RawValue::Number(Some(self.uid as u64)),
            Field::User => RawValue::Text(self.user.clone()),
            Field::Command => RawValue::Text(self.command.clone()),
            Field::Name => RawValue::Text(self.name.clone()),
            Field::Maps => RawValue::Number(self.maps.map(|m| m as u64)),
            Field::Metric(key) => RawValue::Number(self.metrics.get(key)),
            _ => RawValue::Number(None),
        }
    }
}

impl RowSource for AggregateRecord {
    fn raw(&self, field: Field, numeric: bool) -> RawValue {
        match field {
            Field::User if numeric => RawValue::Number(self.uid.map(u64::from)),
            Field::User => RawValue::Text(self.user.clone().unwrap_or_else(|| self.key.clone())),
            Field::Command | Field::Map => RawValue::Text(self.key.clone()),
            Field::Members => RawValue::Number(Some(self.members as u64)),
            Field::Mappings => RawValue::Number(self.mappings.map(|m| m as u64)),
            Field::Metric(key) => RawValue::Number(self.get(key)),
            _ => RawValue::Number(None),
        }
    }
}

impl RowSource for SystemAreaRecord {
    fn raw(&self, field: Field, _numeric: bool) -> RawValue {
        match field {
            Field::Order => RawValue::Number(Some(self.order as u64)),
            Field::Area => RawValue::Text(self.area.to_string()),
            Field::Used => RawValue::Number(Some(self.used)),
            Field::Cache => RawValue::Number(Some(self.cache)),
            Field::Noncache => RawValue::Number(Some(self.noncache())),
            Field::Details => RawValue::Number(Some(self.details)),
            _ => RawValue::Number(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(cols: &[&ColumnSpec]) -> Vec<&'static str> {
        cols.iter().map(|c| c.name).collect()
    }

    #[test]
    fn test_defaults() {
        let cols = resolve_columns(View::Processes, "").unwrap();
        assert_eq!(names(&cols), vec!["pid", "user", "command", "swap", "uss", "pss", "rss"]);
        let cols = resolve_columns(View::Mappings, "  ").unwrap();
        assert_eq!(names(&cols), vec!["map", "pids", "avgpss", "pss"]);
    }

    #[test]
    fn test_plus_appends_to_defaults() {
        let cols = resolve_columns(View::Users, "+vss avguss").unwrap();
        assert_eq!(
            names(&cols),
            vec!["user", "count", "swap", "uss", "pss", "rss", "vss", "avguss"]
        );
    }

    #[test]
    fn test_all_selects_catalog() {
        let cols = resolve_columns(View::Processes, "all").unwrap();
        assert_eq!(cols.len(), View::Processes.catalog().len());
        assert!(names(&cols).contains(&"maps"));

        let sys = resolve_columns(View::System, "all").unwrap();
        assert!(!names(&sys).contains(&"details"));
        let detail = resolve_columns(View::SystemDetail, "all").unwrap();
        assert!(names(&detail).contains(&"details"));
    }

    #[test]
    fn test_explicit_list_with_commas() {
        let cols = resolve_columns(View::Processes, "pid,pss tpss").unwrap();
        assert_eq!(names(&cols), vec!["pid", "pss", "tpss"]);
    }

    #[test]
    fn test_unknown_column() {
        let err = resolve_columns(View::Users, "user bogus pid").unwrap_err();
        match err {
            ConfigError::UnknownColumn { view, names, known } => {
                assert_eq!(view, "user");
                assert_eq!(names, "bogus pid");
                assert!(known.contains("avguss"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_sort() {
        assert_eq!(resolve_sort(View::Processes, None).unwrap().name, "pss");
        assert_eq!(resolve_sort(View::System, None).unwrap().name, "order");
        assert_eq!(resolve_sort(View::Users, Some("count")).unwrap().name, "count");
        assert!(matches!(
            resolve_sort(View::Users, Some("pid")),
            Err(ConfigError::UnknownSortColumn { .. })
        ));
    }

    #[test]
    fn test_swap_percent_base() {
        assert_eq!(View::Processes.column("swap").unwrap().percent, PercentBase::Swap);
        assert_eq!(View::Processes.column("pss").unwrap().percent, PercentBase::Memory);
        assert_eq!(View::Processes.column("pid").unwrap().percent, PercentBase::None);
    }

    #[test]
    fn test_raw_value_serializes_absent_as_null() {
        assert_eq!(serde_json::to_string(&RawValue::Number(None)).unwrap(), "null");
        assert_eq!(serde_json::to_string(&RawValue::Number(Some(5))).unwrap(), "5");
        assert_eq!(serde_json::to_string(&RawValue::Text("x".into())).unwrap(), "\"x\"");
    }
}
