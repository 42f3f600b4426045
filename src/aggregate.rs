//! Grouping of filtered process records by user, command or mapping name.
//!
//! Groups appear in the order their first member was seen, so a stable sort
//! on a constant column reproduces enumeration order.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};

use crate::process::filter::FilterSet;
use crate::process::memory::{MemoryMetrics, MetricKey};
use crate::process::scanner::ProcessRecord;

/// A user, command or mapping group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRecord {
    /// User name, command or mapping name.
    pub key: String,
    /// Number of processes folded in (distinct pids for mappings).
    pub members: usize,
    /// Number of mapping regions, mapping groups only.
    pub mappings: Option<usize>,
    pub metrics: MemoryMetrics,
    /// Owner of the first member, command groups only.
    pub user: Option<String>,
    /// Uid of the group (user groups) or of the first member (command groups).
    pub uid: Option<u32>,
}

impl AggregateRecord {
    fn new(key: String) -> Self {
        Self {
            key,
            members: 0,
            mappings: None,
            metrics: MemoryMetrics::default(),
            user: None,
            uid: None,
        }
    }

    /// Metric value for the group. Averages divide by the member count and
    /// are absent for empty groups or absent metrics.
    pub fn get(&self, key: MetricKey) -> Option<u64> {
        match key.average_of() {
            Some(base) => {
                if self.members == 0 {
                    return None;
                }
                self.metrics.get(base).map(|v| v / self.members as u64)
            }
            None => self.metrics.get(key),
        }
    }
}

/// Insertion-ordered map from group key to record.
#[derive(Default)]
struct Groups {
    index: HashMap<String, usize>,
    out: Vec<AggregateRecord>,
}

impl Groups {
    fn entry(&mut self, key: &str) -> &mut AggregateRecord {
        let idx = match self.index.get(key) {
            Some(&i) => i,
            None => {
                self.out.push(AggregateRecord::new(key.to_string()));
                self.index.insert(key.to_string(), self.out.len() - 1);
                self.out.len() - 1
            }
        };
        &mut self.out[idx]
    }

    fn into_vec(self) -> Vec<AggregateRecord> {
        self.out
    }
}

/// One group per owning user.
pub fn group_by_user(records: &[ProcessRecord]) -> Vec<AggregateRecord> {
    let mut groups = Groups::default();
    for r in records {
        let g = groups.entry(&r.user);
        g.members += 1;
        g.uid = Some(r.uid);
        g.metrics.accumulate(&r.metrics);
    }
    groups.into_vec()
}

/// One group per command, keyed by the first token of the command line.
pub fn group_by_command(records: &[ProcessRecord]) -> Vec<AggregateRecord> {
    let mut groups = Groups::default();
    for r in records {
        let g = groups.entry(r.command_key());
        if g.members == 0 {
            g.user = Some(r.user.clone());
            g.uid = Some(r.uid);
        }
        g.members += 1;
        g.metrics.accumulate(&r.metrics);
    }
    groups.into_vec()
}

/// One group per mapping name over all mappings that pass the mapping filter.
pub fn group_by_mapping(records: &[ProcessRecord], filters: &FilterSet) -> Vec<AggregateRecord> {
    let mut groups = Groups::default();
    let mut pids: HashMap<String, HashSet<u32>> = HashMap::new();
    for r in records {
        for m in r.mappings.iter().filter(|m| filters.accepts_mapping(&m.name)) {
            let g = groups.entry(&m.name);
            g.mappings = Some(g.mappings.unwrap_or(0) + 1);
            g.metrics.accumulate(&m.metrics);
            let seen = pids.entry(m.name.clone()).or_default();
            if seen.insert(r.pid) {
                g.members += 1;
            }
        }
    }
    groups.into_vec()
}
