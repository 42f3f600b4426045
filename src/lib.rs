//! Herakles Smem Library
//!
//! Per-process and system-wide memory reporting for Linux based on
//! proportional set size (PSS) accounting, so pages shared between processes
//! are not counted twice.
//!
//! # Features
//!
//! - **Fast path**: reads `smaps_rollup` when the kernel provides it and falls
//!   back to per-mapping `smaps` otherwise
//! - **Optional metrics**: fields missing on older kernels stay absent instead
//!   of turning into zeros, and each gap is reported once per invocation
//! - **Views**: processes, users, commands, mappings and a system-wide
//!   breakdown of physical memory
//!
//! # Usage
//!
//! ```rust,no_run
//! use herakles_smem::{build_report, ReportOptions, ScanContext, View};
//!
//! let mut ctx = ScanContext::default();
//! let opts = ReportOptions {
//!     view: View::Users,
//!     ..Default::default()
//! };
//! let report = build_report(&mut ctx, &opts).expect("valid options");
//! for row in &report.table.rows {
//!     let cells: Vec<_> = row.cells.iter().map(|c| c.display.as_str()).collect();
//!     println!("{}", cells.join(" "));
//! }
//! ```

pub mod aggregate;
pub mod columns;
pub mod context;
pub mod error;
pub mod layout;
pub mod process;
pub mod report;
pub mod system;

// Re-export main types for convenience
pub use aggregate::AggregateRecord;
pub use columns::{resolve_columns, ColumnSpec, RawValue, View};
pub use context::{Capability, ScanContext, DEFAULT_PROC_ROOT};
pub use error::{ConfigError, ReadError};
pub use layout::{LayoutOptions, Table, Width, WidthOverrides};
pub use process::{FilterOptions, MemoryMetrics, MetricKey, ProcessRecord};
pub use report::{build_report, Report, ReportOptions};
pub use system::{RamSource, SystemAreaRecord, SystemOptions};
