//! Per-invocation scan context.
//!
//! Holds everything that lives for exactly one report: the process filesystem
//! root, the caller's own pid, the uid-to-name cache and the set of kernel
//! capability gaps that have already been reported. Nothing here is global, so
//! repeated library invocations in one process never share warning state.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use nix::unistd::{Uid, User};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// An optional kernel feature or data source that may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Pre-summed `smaps_rollup` (Linux >= 4.14).
    SmapsRollup,
    /// `Pss:` lines in memory accounting.
    Pss,
    /// `SwapPss:` lines (Linux >= 4.3).
    SwapPss,
    /// `Pss_Anon/Pss_File/Pss_Shmem` in `smaps_rollup` (Linux >= 5.7).
    PssBreakdown,
    /// `RssAnon/RssFile/RssShmem` in per-process status (Linux >= 4.5).
    RssBreakdown,
    /// A counter missing from the global memory counters file.
    MeminfoCounter(&'static str),
    /// The kernel module list.
    KernelModules,
    /// The external physical RAM inventory probe.
    RamProbe,
    /// The external kernel image size probe.
    KernelImage,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::SmapsRollup => {
                write!(f, "Kernel does not provide smaps_rollup, using slower smaps")
            }
            Capability::Pss => write!(f, "Kernel does not appear to support PSS measurement"),
            Capability::SwapPss => {
                write!(f, "Kernel does not appear to support SwapPSS measurement")
            }
            Capability::PssBreakdown => write!(
                f,
                "Kernel does not appear to support Pss Anon/File/Shmem measurement"
            ),
            Capability::RssBreakdown => write!(
                f,
                "Kernel does not appear to support Rss Anon/File/Shmem measurement"
            ),
            Capability::MeminfoCounter(name) => {
                write!(f, "Kernel does not report '{}' in meminfo, assuming 0", name)
            }
            Capability::KernelModules => write!(f, "Detection of kernel modules size failed"),
            Capability::RamProbe => write!(
                f,
                "Physical RAM size unknown, falling back to MemTotal (use --realmem)"
            ),
            Capability::KernelImage => write!(f, "Kernel image size could not be determined"),
        }
    }
}

/// Context passed through one scan/report invocation.
#[derive(Debug)]
pub struct ScanContext {
    proc_root: PathBuf,
    own_pid: u32,
    quiet: bool,
    reported: HashSet<Capability>,
    gaps: Vec<Capability>,
    users: HashMap<u32, String>,
}

impl ScanContext {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            own_pid: std::process::id(),
            quiet: false,
            reported: HashSet::new(),
            gaps: Vec::new(),
            users: HashMap::new(),
        }
    }

    /// Overrides the pid treated as "self" (excluded from filtered results).
    pub fn with_own_pid(mut self, pid: u32) -> Self {
        self.own_pid = pid;
        self
    }

    /// Suppresses capability warnings in the log; gaps are still recorded.
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    pub fn own_pid(&self) -> u32 {
        self.own_pid
    }

    pub fn proc_path(&self, pid: u32) -> PathBuf {
        self.proc_root.join(pid.to_string())
    }

    /// Records a capability gap, warning only the first time it is seen.
    /// Returns true if this call was the first report.
    pub fn report_gap(&mut self, cap: Capability) -> bool {
        if !self.reported.insert(cap) {
            return false;
        }
        self.gaps.push(cap);
        if !self.quiet {
            warn!("Warning: {}", cap);
        }
        true
    }

    /// Capability gaps reported so far, in first-seen order.
    pub fn gaps(&self) -> &[Capability] {
        &self.gaps
    }

    pub fn has_gap(&self, cap: Capability) -> bool {
        self.reported.contains(&cap)
    }

    /// Resolves a uid to a user name, caching the result.
    /// Unknown uids resolve to the numeric uid as a string.
    pub fn username(&mut self, uid: u32) -> String {
        self.users
            .entry(uid)
            .or_insert_with(|| match User::from_uid(Uid::from_raw(uid)) {
                Ok(Some(user)) => user.name,
                _ => uid.to_string(),
            })
            .clone()
    }
}

impl Default for ScanContext {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT)
    }
}
