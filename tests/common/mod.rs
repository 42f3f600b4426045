//! Synthetic process filesystem trees for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A fake `/proc` rooted in a temporary directory.
pub struct FakeProc {
    dir: TempDir,
}

/// One smaps block.
pub struct Mapping<'a> {
    pub start: u64,
    pub name: &'a str,
    pub inode: u64,
    pub size: u64,
    pub rss: u64,
    pub pss: u64,
    pub private: u64,
    pub swap: u64,
    pub swap_pss: Option<u64>,
}

impl<'a> Mapping<'a> {
    pub fn new(start: u64, name: &'a str, pss: u64) -> Self {
        Self {
            start,
            name,
            inode: if name.is_empty() { 0 } else { 4242 },
            size: pss * 4,
            rss: pss * 2,
            pss,
            private: pss / 2,
            swap: 0,
            swap_pss: Some(0),
        }
    }

    fn render(&self) -> String {
        let mut s = format!(
            "{:08x}-{:08x} r-xp 00000000 08:01 {:<10} {}\n",
            self.start,
            self.start + self.size * 1024,
            self.inode,
            self.name
        );
        s.push_str(&format!("Size:           {:>8} kB\n", self.size));
        s.push_str(&format!("Rss:            {:>8} kB\n", self.rss));
        s.push_str(&format!("Pss:            {:>8} kB\n", self.pss));
        s.push_str(&format!("Shared_Clean:   {:>8} kB\n", self.rss - self.private));
        s.push_str("Shared_Dirty:          0 kB\n");
        s.push_str(&format!("Private_Clean:  {:>8} kB\n", self.private));
        s.push_str("Private_Dirty:         0 kB\n");
        s.push_str(&format!("Swap:           {:>8} kB\n", self.swap));
        if let Some(sp) = self.swap_pss {
            s.push_str(&format!("SwapPss:        {:>8} kB\n", sp));
        }
        s
    }
}

/// Renders a smaps_rollup file.
pub fn rollup(rss: u64, pss: u64, private_clean: u64, private_dirty: u64, swap_pss: Option<u64>) -> String {
    let mut s = String::from(
        "55d0c2a4c000-7ffc8a3f5000 ---p 00000000 00:00 0                          [rollup]\n",
    );
    s.push_str(&format!("Rss:            {:>8} kB\n", rss));
    s.push_str(&format!("Pss:            {:>8} kB\n", pss));
    s.push_str(&format!("Pss_Anon:       {:>8} kB\n", pss / 2));
    s.push_str(&format!("Pss_File:       {:>8} kB\n", pss - pss / 2));
    s.push_str("Pss_Shmem:             0 kB\n");
    s.push_str(&format!("Private_Clean:  {:>8} kB\n", private_clean));
    s.push_str(&format!("Private_Dirty:  {:>8} kB\n", private_dirty));
    s.push_str("Swap:                  0 kB\n");
    if let Some(sp) = swap_pss {
        s.push_str(&format!("SwapPss:        {:>8} kB\n", sp));
    }
    s
}

/// Renders a status file with the Rss breakdown.
pub fn status(name: &str, vm_size: u64) -> String {
    format!(
        "Name:\t{name}\nVmSize:\t{vm_size:>8} kB\nVmSwap:\t       0 kB\n\
         RssAnon:\t     100 kB\nRssFile:\t     200 kB\nRssShmem:\t       0 kB\n"
    )
}

impl FakeProc {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    fn pid_dir(&self, pid: u32) -> PathBuf {
        let dir = self.root().join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Adds a process with identity files and a status file.
    pub fn process(&self, pid: u32, cmdline: &str) -> &Self {
        let dir = self.pid_dir(pid);
        let argv0 = cmdline.split(' ').next().unwrap_or("");
        let comm = Path::new(argv0)
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        fs::write(dir.join("comm"), format!("{comm}\n")).unwrap();
        let raw: Vec<u8> = cmdline
            .split(' ')
            .flat_map(|a| a.bytes().chain(std::iter::once(0)))
            .collect();
        fs::write(dir.join("cmdline"), raw).unwrap();
        fs::write(dir.join("status"), status(&comm, 10_000)).unwrap();
        self
    }

    /// Writes any file below the pid directory.
    pub fn file(&self, pid: u32, name: &str, content: &str) -> &Self {
        fs::write(self.pid_dir(pid).join(name), content).unwrap();
        self
    }

    pub fn with_rollup(&self, pid: u32, content: &str) -> &Self {
        self.file(pid, "smaps_rollup", content)
    }

    pub fn with_smaps(&self, pid: u32, mappings: &[Mapping]) -> &Self {
        let content: String = mappings.iter().map(|m| m.render()).collect();
        self.file(pid, "smaps", &content)
    }

    /// A process with both accounting files consistent with `pss`.
    pub fn simple(&self, pid: u32, cmdline: &str, pss: u64) -> &Self {
        let maps = [Mapping::new(0x400000, "/usr/lib/libc.so.6", pss)];
        self.process(pid, cmdline)
            .with_rollup(pid, &rollup(pss * 2, pss, pss / 2, 0, Some(0)))
            .with_smaps(pid, &maps)
    }

    /// Writes a file at the root (meminfo, vmstat, modules, mounts).
    pub fn global(&self, name: &str, content: &str) -> &Self {
        fs::write(self.root().join(name), content).unwrap();
        self
    }
}

pub const MEMINFO: &str = "\
MemTotal:        8000000 kB
MemFree:         2000000 kB
MemAvailable:    5000000 kB
Buffers:          100000 kB
Cached:          2500000 kB
SwapCached:            0 kB
Unevictable:        1000 kB
SwapTotal:       1000000 kB
SwapFree:         900000 kB
Dirty:               500 kB
AnonPages:       2000000 kB
Mapped:           400000 kB
Shmem:            150000 kB
Slab:             300000 kB
SReclaimable:     200000 kB
KernelStack:       20000 kB
PageTables:        40000 kB
";
