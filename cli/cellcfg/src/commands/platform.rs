//! `cellcfg platform`: listing, showing, creating and validating platforms.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use cellcfg_platform::{
    discover_platforms, generate_template, load_platform_toml, platform_to_toml,
    validate_platform, Platform,
};

/// A preset, or failing that a platform file, without consistency checks.
fn load(name_or_path: &str) -> Result<Platform> {
    if let Some(platform) = Platform::preset(name_or_path) {
        return Ok(platform);
    }
    let path = Path::new(name_or_path);
    if !path.exists() {
        bail!(
            "unknown platform: '{name_or_path}'. Use 'cellcfg platform list' to see available platforms."
        );
    }
    load_platform_toml(path).with_context(|| format!("loading {}", path.display()))
}

/// List built-in presets and the platform files in `dir`.
pub fn list(dir: Option<&Path>) -> Result<()> {
    println!("Built-in platforms:");
    for name in Platform::PRESETS {
        println!("  {name}");
    }

    if let Some(dir) = dir {
        let found = discover_platforms(dir)?;
        println!();
        println!("Platform files in {}:", dir.display());
        if found.is_empty() {
            println!("  (none)");
        }
        for (name, path) in found {
            println!("  {name:<25} {}", path.display());
        }
    }
    Ok(())
}

/// Show a platform in detail.
pub fn show(name: &str, format: Option<&str>) -> Result<()> {
    let platform = load(name)?;
    if format == Some("toml") {
        print!("{}", platform_to_toml(&platform)?);
        return Ok(());
    }

    println!("=== Platform: {} ===", platform.name);
    println!("Version:         {}", platform.version);
    println!("Page size:       {:#x}", platform.page_size);
    println!("Max CPUs:        {}", platform.max_cpus);
    println!("Max IRQ pins:    {}", platform.max_irq_pins);
    println!("IO+DMA regions:  {}", if platform.io_dma_allowed { "allowed" } else { "rejected" });
    println!("vPCI pin offset: {}", platform.vpci_irq_pin_offset);
    println!(
        "Phys window:     {:#x}..{:#x}",
        platform.phys_window.start, platform.phys_window.end
    );
    if platform.irqchip_addresses.is_empty() {
        println!("Irqchips:        any");
    } else {
        let chips: Vec<String> = platform
            .irqchip_addresses
            .iter()
            .map(|a| format!("{a:#x}"))
            .collect();
        println!("Irqchips:        {}", chips.join(", "));
    }
    let rpp = platform.shmem.regions_per_peer;
    println!(
        "Regions per peer: undefined {}, veth {}, custom {}, virtio-front {}, virtio-back {}",
        rpp.undefined, rpp.veth, rpp.custom, rpp.virtio_front, rpp.virtio_back
    );
    Ok(())
}

/// Write a `<name>.platform.toml` template into `dir`.
pub fn write_template(name: &str, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(format!("{name}.platform.toml"));
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    let content = generate_template(name)?;
    fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

pub fn new(name: &str, dir: &Path) -> Result<()> {
    let path = write_template(name, dir)?;
    println!("Created {}", path.display());
    Ok(())
}

/// Report consistency issues; fails if any is an error.
pub fn validate(name: &str) -> Result<()> {
    let platform = load(name)?;
    match validate_platform(&platform) {
        Ok(()) => {
            println!("{}: ok", platform.name);
            Ok(())
        }
        Err(issues) => {
            for issue in &issues {
                println!("  {}: {}", issue.severity, issue.message);
            }
            let errors = issues.iter().filter(|i| i.is_error()).count();
            if errors > 0 {
                bail!("{}: {errors} error(s)", platform.name);
            }
            Ok(())
        }
    }
}
