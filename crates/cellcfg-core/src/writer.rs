//! Descriptor writer, the inverse of [`crate::parse`].

use log::trace;

use crate::cell::{CellDescriptor, Console, IrqChip, MemoryRegion};
use crate::error::LoadError;
use crate::layout::{Table, HEADER_SIZE, NAME_FIELD_SIZE, NAME_MAXLEN, SIGNATURE};
use crate::pci::PciDevice;

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.bytes(&value.to_ne_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.bytes(&value.to_ne_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.bytes(&value.to_ne_bytes());
    }
}

/// Encode a descriptor into its binary form.
///
/// Fails only when the descriptor cannot be represented: a name that does
/// not fit the NUL-terminated field, or a table too large for its count.
pub fn to_bytes(descriptor: &CellDescriptor) -> Result<Vec<u8>, LoadError> {
    let name = encode_name(&descriptor.name)?;
    let counts = descriptor.table_counts().ok_or(LoadError::CountOverflow {
        table: Table::MemoryRegions,
        count: u32::MAX,
    })?;
    let layout = counts.layout()?;

    let mut w = Writer::with_capacity(layout.total_size());
    w.bytes(&SIGNATURE);
    w.u16(descriptor.revision);
    w.bytes(&name);
    w.u32(descriptor.flags.bits());
    w.u32(counts.cpu_set_size);
    w.u32(counts.memory_regions);
    w.u32(counts.irqchips);
    w.u32(counts.pci_devices);
    w.u32(counts.stream_ids);
    w.u32(descriptor.vpci_irq_base);
    w.u32(0);
    w.u64(descriptor.cpu_reset_address);
    write_console(&mut w, &descriptor.console);
    debug_assert_eq!(w.buf.len(), HEADER_SIZE);

    for word in descriptor.cpu_set.words() {
        w.u64(*word);
    }
    for region in &descriptor.memory_regions {
        write_region(&mut w, region);
    }
    for chip in &descriptor.irqchips {
        write_irqchip(&mut w, chip);
    }
    for device in &descriptor.pci_devices {
        write_pci_device(&mut w, device);
    }
    for stream_id in &descriptor.stream_ids {
        w.u32(stream_id.0);
    }

    debug_assert_eq!(w.buf.len(), layout.total_size());
    trace!("encoded cell '{}' into {} bytes", descriptor.name, w.buf.len());
    Ok(w.buf)
}

fn encode_name(name: &str) -> Result<[u8; NAME_FIELD_SIZE], LoadError> {
    if name.is_empty() {
        return Err(LoadError::InvalidName {
            detail: "name is empty".into(),
        });
    }
    if name.len() > NAME_MAXLEN {
        return Err(LoadError::InvalidName {
            detail: format!("'{name}' is longer than {NAME_MAXLEN} bytes"),
        });
    }
    if name.bytes().any(|b| b == 0) {
        return Err(LoadError::InvalidName {
            detail: "name contains a NUL byte".into(),
        });
    }
    let mut field = [0u8; NAME_FIELD_SIZE];
    field[..name.len()].copy_from_slice(name.as_bytes());
    Ok(field)
}

fn write_console(w: &mut Writer, console: &Console) {
    w.u64(console.address);
    w.u32(console.size);
    w.u16(console.kind.to_raw());
    w.u16(console.flags.bits());
    w.u32(console.divider);
    w.u32(console.gate_nr);
    w.u64(console.clock_reg);
}

fn write_region(w: &mut Writer, region: &MemoryRegion) {
    w.u64(region.phys_start);
    w.u64(region.virt_start);
    w.u64(region.size);
    w.u64(region.flags.bits());
}

fn write_irqchip(w: &mut Writer, chip: &IrqChip) {
    w.u64(chip.address);
    w.u32(chip.id);
    w.u32(chip.pin_base);
    for word in chip.pin_bitmap.words() {
        w.u32(word);
    }
}

fn write_pci_device(w: &mut Writer, device: &PciDevice) {
    w.u8(device.kind.to_raw());
    w.u8(device.iommu);
    w.u16(device.domain);
    w.u16(device.bdf.0);
    w.u16(0);
    for bar in device.bar_mask {
        w.u32(bar);
    }
    w.u32(device.shmem_regions_start);
    w.u8(device.shmem_dev_id);
    w.u8(device.shmem_peers);
    w.u16(device.shmem_protocol.to_raw());
}
