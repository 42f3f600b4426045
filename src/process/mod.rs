//! Process-related modules for enumeration, memory accounting and filtering.
//!
//! This module provides:
//! - `scanner`: Process discovery, identity and the scan loop
//! - `memory`: Memory parsing from /proc/<pid>/smaps and smaps_rollup
//! - `filter`: Process, mapping and user filters

pub mod filter;
pub mod memory;
pub mod scanner;

// Re-export commonly used types
pub use filter::{FilterOptions, FilterSet};
pub use memory::{
    parse_smaps, parse_status, read_process_memory, Accounting, BufferConfig, MappingRecord,
    MemoryMetrics, MetricKey, ANONYMOUS_MAPPING,
};
pub use scanner::{
    collect_proc_entries, read_identity, read_process, scan_processes, ProcEntry,
    ProcessIdentity, ProcessRecord, ScanOptions,
};
