//! Process, mapping and user filters.
//!
//! Filters are compiled once before the scan starts; an invalid expression is
//! a configuration error and aborts the invocation before any /proc read.

use regex::{Regex, RegexBuilder};

use crate::error::ConfigError;
use crate::process::scanner::ProcessIdentity;

/// Raw filter settings as given by the caller.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Regex matched against pid, command line and short name.
    pub process: Option<String>,
    /// Regex matched against mapping paths (mapping view only).
    pub mapping: Option<String>,
    /// Regex matched against the owning user name.
    pub user: Option<String>,
    /// Select exactly this pid, bypassing the process filter.
    pub pid: Option<u32>,
    pub ignore_case: bool,
}

/// Compiled filters for one invocation.
#[derive(Debug, Clone)]
pub struct FilterSet {
    process: Option<Regex>,
    mapping: Option<Regex>,
    user: Option<Regex>,
    pid: Option<u32>,
    own_pid: u32,
}

fn compile(
    filter: &'static str,
    pattern: Option<&str>,
    ignore_case: bool,
) -> Result<Option<Regex>, ConfigError> {
    let Some(pattern) = pattern else {
        return Ok(None);
    };
    RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .build()
        .map(Some)
        .map_err(|source| ConfigError::InvalidFilter {
            filter,
            pattern: pattern.to_string(),
            source,
        })
}

impl FilterSet {
    pub fn new(opts: &FilterOptions, own_pid: u32) -> Result<Self, ConfigError> {
        Ok(Self {
            process: compile("process", opts.process.as_deref(), opts.ignore_case)?,
            mapping: compile("mapping", opts.mapping.as_deref(), opts.ignore_case)?,
            user: compile("user", opts.user.as_deref(), opts.ignore_case)?,
            pid: opts.pid,
            own_pid,
        })
    }

    /// A filter set that accepts everything.
    pub fn accept_all() -> Self {
        Self {
            process: None,
            mapping: None,
            user: None,
            pid: None,
            own_pid: 0,
        }
    }

    pub fn has_process_filter(&self) -> bool {
        self.process.is_some()
    }

    pub fn pid_selector(&self) -> Option<u32> {
        self.pid
    }

    /// Cheap pre-check on the pid alone, before any per-process file is read.
    pub fn selects_pid(&self, pid: u32) -> bool {
        match self.pid {
            Some(selected) => pid == selected,
            None => !(self.process.is_some() && pid == self.own_pid),
        }
    }

    /// Applies the process filter. A pid selector bypasses it entirely.
    pub fn accepts_process(&self, identity: &ProcessIdentity) -> bool {
        if self.pid.is_some() {
            return true;
        }
        match &self.process {
            None => true,
            Some(re) => {
                re.is_match(&identity.pid.to_string())
                    || re.is_match(&identity.command)
                    || re.is_match(&identity.name)
            }
        }
    }

    pub fn accepts_user(&self, user: &str) -> bool {
        self.user.as_ref().map_or(true, |re| re.is_match(user))
    }

    pub fn accepts_mapping(&self, name: &str) -> bool {
        self.mapping.as_ref().map_or(true, |re| re.is_match(name))
    }

    /// Process and user filters combined.
    pub fn accepts(&self, identity: &ProcessIdentity) -> bool {
        self.selects_pid(identity.pid)
            && self.accepts_process(identity)
            && self.accepts_user(&identity.user)
    }
}
