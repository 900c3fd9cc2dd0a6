//! `cellcfg check`: parse, validate and dry-run registration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use cellcfg_core::parse;
use cellcfg_platform::{resolve_platform, Platform};
use cellcfg_registry::Registry;
use cellcfg_validate::{diagnose, validate};
use log::info;

/// Check `files` in order against the platform `platform_name`.
pub fn run(files: &[PathBuf], platform_name: &str, all: bool) -> Result<()> {
    let platform = resolve_platform(platform_name)
        .with_context(|| format!("resolving platform '{platform_name}'"))?;
    info!("checking {} file(s) against '{}'", files.len(), platform.name);

    let registry = check_files(files, &platform, all)?;
    for cell in registry.cells() {
        println!(
            "  {:<32} cpus {:?}  {} regions  {} pins  {} links  {}{}",
            cell.name,
            cell.cpus,
            cell.memory_regions,
            cell.irq_pins,
            cell.shmem_links,
            cell.fingerprint.short(),
            if cell.is_root { "  (root)" } else { "" },
        );
    }
    println!("ok: {} cell(s) admitted", registry.len());
    Ok(())
}

/// Admit every file into a fresh in-memory registry, stopping at the first
/// file that fails.
pub fn check_files(files: &[PathBuf], platform: &Platform, all: bool) -> Result<Registry> {
    let registry = Registry::new();
    for path in files {
        check_one(path, platform, &registry, all)?;
    }
    Ok(registry)
}

fn check_one(path: &Path, platform: &Platform, registry: &Registry, all: bool) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let descriptor = parse(&bytes).with_context(|| format!("parsing {}", path.display()))?;

    if all {
        let issues = diagnose(&descriptor, platform);
        if !issues.is_empty() {
            eprintln!("{}:", path.display());
            for issue in &issues {
                eprintln!("  {issue}");
            }
            bail!("{}: {} problem(s)", path.display(), issues.len());
        }
    }

    let validated = validate(descriptor, platform, registry)
        .with_context(|| format!("validating {}", path.display()))?;
    registry
        .register(validated)
        .with_context(|| format!("admitting {}", path.display()))?;
    Ok(())
}
