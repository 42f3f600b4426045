//! Text and JSON rendering of a finished report.

use herakles_smem::columns::RawValue;
use herakles_smem::layout::{Row, Table};
use herakles_smem::Report;
use serde_json::{Map, Value};

use crate::cli::OutputFormat;

/// Output framing switches.
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub totals: bool,
    pub totals_only: bool,
    pub no_header: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Raw,
            totals: false,
            totals_only: false,
            no_header: false,
        }
    }
}

fn render_line(table: &Table, row: &Row) -> String {
    let mut line = String::new();
    for (col, cell) in table.columns.iter().zip(&row.cells) {
        line.push_str(&col.pad(&cell.display));
        line.push(' ');
    }
    line
}

/// Plain text: header and separator, rows, then an optional totals line.
pub fn render_text(table: &Table, opts: &OutputOptions) -> String {
    let header: String = table
        .columns
        .iter()
        .map(|c| c.header() + " ")
        .collect();
    let separator = "-".repeat(header.chars().count());

    let mut out = Vec::new();
    if !opts.no_header {
        out.push(header);
        out.push(separator.clone());
    }
    if !opts.totals_only {
        out.extend(table.rows.iter().map(|r| render_line(table, r)));
    }
    if opts.totals || opts.totals_only {
        if !opts.totals_only {
            out.push(separator);
        }
        out.push(render_line(table, &table.totals));
    }

    let mut text = out.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

fn raw_to_json(raw: &RawValue) -> Value {
    match raw {
        RawValue::Number(Some(n)) => Value::from(*n),
        RawValue::Number(None) => Value::Null,
        RawValue::Text(s) => Value::from(s.as_str()),
    }
}

fn row_object(table: &Table, row: &Row) -> Value {
    let mut obj = Map::new();
    for (name, cell) in table.column_names().zip(&row.cells) {
        obj.insert(name.to_string(), raw_to_json(&cell.raw));
    }
    Value::Object(obj)
}

/// JSON: every row keyed by column name, or only the totals object when
/// totals are requested. Values are raw kilobytes; absent metrics are null.
pub fn render_json(table: &Table, opts: &OutputOptions) -> Result<String, serde_json::Error> {
    let mut root = Map::new();
    if opts.totals || opts.totals_only {
        root.insert("totals".to_string(), row_object(table, &table.totals));
    } else {
        let rows = table.rows.iter().map(|r| row_object(table, r)).collect();
        root.insert("processes".to_string(), Value::Array(rows));
    }
    let mut text = serde_json::to_string(&Value::Object(root))?;
    text.push('\n');
    Ok(text)
}

/// Renders the report in the selected format.
pub fn render(report: &Report, opts: &OutputOptions) -> Result<String, serde_json::Error> {
    match opts.format {
        OutputFormat::Raw => Ok(render_text(&report.table, opts)),
        OutputFormat::Json => render_json(&report.table, opts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herakles_smem::layout::{build_table, LayoutOptions, PercentRefs};
    use herakles_smem::process::memory::MemoryMetrics;
    use herakles_smem::{resolve_columns, ProcessRecord, View};

    fn record(pid: u32, command: &str, pss: Option<u64>) -> ProcessRecord {
        ProcessRecord {
            pid,
            uid: 1000,
            user: "alice".to_string(),
            command: command.to_string(),
            name: command.to_string(),
            metrics: MemoryMetrics {
                pss,
                ..Default::default()
            },
            maps: None,
            mappings: Vec::new(),
        }
    }

    fn table(records: &[ProcessRecord]) -> Table {
        let columns = resolve_columns(View::Processes, "pid command pss").unwrap();
        let sort = View::Processes.column("pss").unwrap();
        build_table(
            records,
            &columns,
            sort,
            &LayoutOptions::default(),
            &PercentRefs::default(),
        )
    }

    // -------------------------------------------------------------------------
    // Tests for text output
    // -------------------------------------------------------------------------

    #[test]
    fn test_text_header_and_separator() {
        let t = table(&[record(1, "init", Some(100))]);
        let text = render_text(&t, &OutputOptions::default());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("PID"));
        assert!(lines[0].ends_with(' '));
        assert_eq!(lines[1], "-".repeat(lines[0].chars().count()));
        assert!(lines[2].contains("init"));
    }

    #[test]
    fn test_text_totals_only() {
        let t = table(&[record(1, "a", Some(100)), record(2, "b", Some(50))]);
        let opts = OutputOptions {
            totals_only: true,
            no_header: true,
            ..Default::default()
        };
        let text = render_text(&t, &opts);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("150"));
    }

    #[test]
    fn test_text_totals_on_empty_table() {
        let t = table(&[]);
        let opts = OutputOptions {
            totals: true,
            ..Default::default()
        };
        let text = render_text(&t, &opts);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3].split_whitespace().collect::<Vec<_>>(), ["0", "0"]);
    }

    // -------------------------------------------------------------------------
    // Tests for JSON output
    // -------------------------------------------------------------------------

    #[test]
    fn test_json_rows_use_raw_values() {
        let t = table(&[record(7, "sshd", None)]);
        let text = render_json(&t, &OutputOptions::default()).unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        let row = &v["processes"][0];
        assert_eq!(row["pid"], 7);
        assert_eq!(row["command"], "sshd");
        assert!(row["pss"].is_null());
    }

    #[test]
    fn test_json_totals() {
        let t = table(&[record(1, "a", Some(10)), record(2, "b", Some(20))]);
        let opts = OutputOptions {
            format: OutputFormat::Json,
            totals: true,
            ..Default::default()
        };
        let text = render_json(&t, &opts).unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert!(v.get("processes").is_none());
        assert_eq!(v["totals"]["pss"], 30);
        assert_eq!(v["totals"]["pid"], 2);
    }
}
