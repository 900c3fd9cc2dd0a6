//! `cellcfg inspect`: descriptor dump.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use cellcfg_core::{parse, CellDescriptor};

/// Print the descriptor in `file` as text or JSON.
pub fn run(file: &Path, format: Option<&str>) -> Result<()> {
    let output = render(file, format.unwrap_or("text"))?;
    print!("{output}");
    Ok(())
}

/// Render the descriptor in `file` in `format`.
pub fn render(file: &Path, format: &str) -> Result<String> {
    let bytes = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let descriptor = parse(&bytes).with_context(|| format!("parsing {}", file.display()))?;
    match format {
        "text" => Ok(render_text(&descriptor)),
        "json" => {
            let mut json = serde_json::to_string_pretty(&descriptor)?;
            json.push('\n');
            Ok(json)
        }
        other => bail!("unknown format '{other}' (expected text or json)"),
    }
}

fn render_text(cell: &CellDescriptor) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_text(&mut out, cell);
    out
}

fn write_text(out: &mut String, cell: &CellDescriptor) -> std::fmt::Result {
    writeln!(out, "=== Cell: {} ===", cell.name)?;
    writeln!(out, "Revision:      {}", cell.revision)?;
    writeln!(out, "Flags:         {}", cell.flags)?;
    writeln!(out, "CPUs:          {}", cell.cpu_set)?;
    writeln!(out, "vPCI IRQ base: {}", cell.vpci_irq_base)?;
    writeln!(out, "Reset address: {:#x}", cell.cpu_reset_address)?;
    let console = &cell.console;
    writeln!(
        out,
        "Console:       {:?} at {:#x} [{}]",
        console.kind, console.address, console.flags
    )?;
    writeln!(out)?;

    writeln!(out, "--- Memory regions ({}) ---", cell.memory_regions.len())?;
    for (i, region) in cell.memory_regions.iter().enumerate() {
        writeln!(out, "  [{i:>2}] {region}")?;
    }
    writeln!(out)?;

    writeln!(out, "--- Irqchips ({}) ---", cell.irqchips.len())?;
    for (i, chip) in cell.irqchips.iter().enumerate() {
        let pins: Vec<String> = chip
            .pin_bitmap
            .decode(chip.pin_base)
            .iter()
            .map(u32::to_string)
            .collect();
        writeln!(
            out,
            "  [{i}] {:#x} id {} base {}: {}",
            chip.address,
            chip.id,
            chip.pin_base,
            if pins.is_empty() { "-".to_string() } else { pins.join(",") }
        )?;
    }
    writeln!(out)?;

    writeln!(out, "--- PCI devices ({}) ---", cell.pci_devices.len())?;
    for (i, device) in cell.pci_devices.iter().enumerate() {
        write!(
            out,
            "  [{i}] {:?} {:04x}:{}",
            device.kind, device.domain, device.bdf
        )?;
        if device.is_ivshmem() {
            write!(
                out,
                " shmem regions from {}, peer {}/{}, {}",
                device.shmem_regions_start,
                device.shmem_dev_id,
                device.shmem_peers,
                device.shmem_protocol
            )?;
        }
        writeln!(out)?;
    }
    writeln!(out)?;

    let ids: Vec<String> = cell.stream_ids.iter().map(ToString::to_string).collect();
    writeln!(out, "Stream ids: {}", if ids.is_empty() { "-".to_string() } else { ids.join(", ") })
}
