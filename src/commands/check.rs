//! Check command implementation.
//!
//! Reports which memory accounting features the running kernel provides.

use std::path::Path;

use herakles_smem::process::memory::{read_process_memory, Accounting, AccountingSource};
use herakles_smem::process::scanner::collect_proc_entries;
use herakles_smem::system::read_meminfo;
use herakles_smem::View;

use crate::config::{validate_effective_config, Config};

/// Per-process accounting features found for one pid.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MemorySupport {
    pub rollup: bool,
    pub swap_pss: bool,
    pub pss_breakdown: bool,
    pub rss_breakdown: bool,
    pub pss: Option<u64>,
}

/// Probes the accounting files of `pid` below `proc_root`.
pub fn probe_memory_support(
    proc_root: &Path,
    pid: u32,
    config: &Config,
) -> Result<MemorySupport, Box<dyn std::error::Error>> {
    let read = read_process_memory(
        &proc_root.join(pid.to_string()),
        pid,
        Accounting::Rollup,
        &config.buffers(),
    )?;
    let m = &read.memory.metrics;
    Ok(MemorySupport {
        rollup: read.memory.source == AccountingSource::Rollup,
        swap_pss: m.swap_pss.is_some(),
        pss_breakdown: m.has_pss_breakdown(),
        rss_breakdown: m.has_rss_breakdown(),
        pss: m.pss,
    })
}

fn mark(ok: bool) -> &'static str {
    if ok {
        "✅"
    } else {
        "⚠️ "
    }
}

/// Validates `config` against the view the invocation selects.
pub fn check_config_for_view(config: &Config, view: View) -> Result<(), String> {
    validate_effective_config(config, view).map_err(|e| e.to_string())
}

/// Validates kernel support and configuration.
pub fn command_check(
    memory: bool,
    proc: bool,
    all: bool,
    config: &Config,
    view: View,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Herakles Smem - System Check");
    println!("===============================");

    let ctx = config.scan_context();
    let proc_root = ctx.proc_root().to_path_buf();
    let mut all_ok = true;

    // Nothing selected means everything
    let (memory, proc) = if all || !(memory || proc) {
        (true, true)
    } else {
        (memory, proc)
    };

    if proc {
        println!("\n📁 Checking {} filesystem...", proc_root.display());
        if proc_root.exists() {
            println!("   ✅ {} accessible", proc_root.display());

            let count = collect_proc_entries(&proc_root).take(5).count();
            if count == 0 {
                println!("   ❌ Cannot read any process entries");
                all_ok = false;
            } else {
                println!("   ✅ Can read process entries");
            }
        } else {
            println!("   ❌ {} not found", proc_root.display());
            all_ok = false;
        }

        match read_meminfo(&proc_root) {
            Ok(m) if m.get("Mapped").is_some() => println!("   ✅ meminfo exposes Mapped"),
            Ok(_) => println!("   ⚠️  meminfo lacks Mapped (vmstat fallback is used)"),
            Err(e) => {
                println!("   ❌ Cannot read meminfo: {}", e);
                all_ok = false;
            }
        }
    }

    if memory {
        println!("\n💾 Checking memory accounting...");
        match probe_memory_support(&proc_root, ctx.own_pid(), config) {
            Ok(s) => {
                println!(
                    "   {} smaps_rollup {}",
                    mark(s.rollup),
                    if s.rollup { "available (fast path)" } else { "missing (smaps fallback)" }
                );
                println!("   {} SwapPss", mark(s.swap_pss));
                println!("   {} Pss_Anon/Pss_File/Pss_Shmem", mark(s.pss_breakdown));
                println!("   {} RssAnon/RssFile/RssShmem", mark(s.rss_breakdown));
                match s.pss {
                    Some(pss) => println!("   ✅ Memory parsing successful: PSS={} kB", pss),
                    None => {
                        println!("   ❌ Kernel does not report PSS");
                        all_ok = false;
                    }
                }
            }
            Err(e) => {
                println!("   ❌ Memory parsing failed: {}", e);
                all_ok = false;
            }
        }
    }

    println!("\n⚙️  Checking configuration ({} view)...", view.name());
    match check_config_for_view(config, view) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
