//! Kernel-side memory consumers that the global counters do not itemize:
//! loaded modules, the kernel image and ramfs mounts.

use anyhow::{bail, Context, Result};
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Packed images carry their gzip payload within this many leading bytes.
const GZIP_SEARCH_WINDOW: usize = 25_000;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Sums the sizes in a /proc/modules listing, in kilobytes.
pub fn parse_modules(content: &str) -> u64 {
    let bytes: u64 = content
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1)?.parse::<u64>().ok())
        .sum();
    bytes / 1024
}

/// Reads `<proc_root>/modules` and returns the total module size in kB.
pub fn read_module_sizes(proc_root: &Path) -> io::Result<u64> {
    let content = fs::read_to_string(proc_root.join("modules"))?;
    Ok(parse_modules(&content))
}

/// Kernel image size as determined from a vmlinux-style file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelImage {
    /// Size in kilobytes.
    Size(u64),
    /// Compressed image; the payload starts at this offset.
    Packed { gzip_offset: usize },
}

/// Extracts `(data, dec)` from the second line of `size` output.
pub fn parse_size_output(output: &str) -> Option<(u64, u64)> {
    let fields: Vec<&str> = output.lines().nth(1)?.split_whitespace().collect();
    let data = fields.get(1)?.parse().ok()?;
    let dec = fields.get(3)?.parse().ok()?;
    Some((data, dec))
}

/// Looks for a gzip header near the start of a packed image.
pub fn find_gzip_payload(image: &[u8]) -> Option<usize> {
    let window = &image[..image.len().min(GZIP_SEARCH_WINDOW)];
    window.windows(2).position(|w| w == GZIP_MAGIC)
}

/// Determines the in-memory size of a kernel image with the `size` tool.
pub fn kernel_image_size(path: &Path) -> Result<KernelImage> {
    let output = Command::new("size")
        .arg(path)
        .output()
        .context("failed to run size")?;
    if !output.status.success() {
        bail!(
            "size failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let (data, dec) = parse_size_output(&stdout)
        .with_context(|| format!("unexpected size output for {}", path.display()))?;

    if data > 0 {
        return Ok(KernelImage::Size((dec + 512) / 1024));
    }

    let image = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    match find_gzip_payload(&image) {
        Some(gzip_offset) => Ok(KernelImage::Packed { gzip_offset }),
        None => bail!("{} has no data section", path.display()),
    }
}

/// Mount points of every `ramfs` listed in a mounts table.
pub fn parse_ramfs_mounts(mounts: &str) -> Vec<PathBuf> {
    mounts
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _device = fields.next()?;
            let mount_point = fields.next()?;
            let fstype = fields.next()?;
            (fstype == "ramfs").then(|| PathBuf::from(mount_point))
        })
        .collect()
}

/// Allocated size of a directory tree in kilobytes, without following links.
pub fn disk_usage_kb(root: &Path) -> u64 {
    let mut total_blocks = 0u64;
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let meta = match fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        total_blocks += meta.blocks();
        if meta.is_dir() {
            if let Ok(entries) = fs::read_dir(&path) {
                stack.extend(entries.flatten().map(|e| e.path()));
            }
        }
    }
    // st_blocks is always in 512-byte units
    total_blocks / 2
}

/// Total usage of all ramfs mounts listed in `<proc_root>/mounts`, in kB.
pub fn ramfs_usage_kb(proc_root: &Path) -> u64 {
    let mounts = match fs::read_to_string(proc_root.join("mounts")) {
        Ok(s) => s,
        Err(e) => {
            debug!("Cannot read mounts: {}", e);
            return 0;
        }
    };
    parse_ramfs_mounts(&mounts)
        .iter()
        .map(|m| disk_usage_kb(m))
        .sum()
}
