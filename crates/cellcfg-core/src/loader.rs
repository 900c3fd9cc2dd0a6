//! Bounds-checked descriptor loader.

use log::debug;

use crate::cell::{CellDescriptor, Console, ConsoleKind, CpuSet, IrqChip, MemoryRegion, StreamId};
use crate::error::LoadError;
use crate::flags::{CellFlags, ConsoleFlags, MemFlags};
use crate::irq::PinBitmap;
use crate::layout::{
    Layout, Table, TableCounts, CONFIG_REVISION, HEADER_SIZE, NAME_FIELD_SIZE, SIGNATURE,
};
use crate::pci::{Bdf, PciDevice, PciDeviceKind, ShmemProtocol};

/// Cursor over one section of the descriptor. Every read is bounds-checked.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    section: &'static str,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], section: &'static str) -> Self {
        Self {
            buf,
            pos: 0,
            section,
        }
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], LoadError> {
        let chunk = self
            .pos
            .checked_add(N)
            .and_then(|end| self.buf.get(self.pos..end))
            .ok_or(LoadError::TruncatedBuffer {
                section: self.section,
                needed: self.pos.saturating_add(N),
                available: self.buf.len(),
            })?;
        let mut out = [0u8; N];
        out.copy_from_slice(chunk);
        self.pos += N;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, LoadError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, LoadError> {
        Ok(u16::from_ne_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, LoadError> {
        Ok(u32::from_ne_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, LoadError> {
        Ok(u64::from_ne_bytes(self.array()?))
    }
}

/// Parse a raw cell descriptor.
///
/// Checks run in a fixed order: signature, revision, header size, then the
/// span of every table against the buffer length. No table entry is decoded
/// before all spans are known to lie inside `bytes`.
pub fn parse(bytes: &[u8]) -> Result<CellDescriptor, LoadError> {
    let mut header = Reader::new(bytes, Table::Header.name());

    if header.array::<6>()? != SIGNATURE {
        return Err(LoadError::BadSignature);
    }
    let revision = header.u16()?;
    if revision == 0 || revision > CONFIG_REVISION {
        return Err(LoadError::UnsupportedRevision {
            found: revision,
            max: CONFIG_REVISION,
        });
    }
    if bytes.len() < HEADER_SIZE {
        return Err(LoadError::TruncatedBuffer {
            section: Table::Header.name(),
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let name = decode_name(&header.array::<NAME_FIELD_SIZE>()?)?;
    let flags_raw = header.u32()?;
    let counts = TableCounts {
        cpu_set_size: header.u32()?,
        memory_regions: header.u32()?,
        irqchips: header.u32()?,
        pci_devices: header.u32()?,
        stream_ids: header.u32()?,
    };
    let vpci_irq_base = header.u32()?;
    let reserved = header.u32()?;
    let cpu_reset_address = header.u64()?;
    let console_address = header.u64()?;
    let console_size = header.u32()?;
    let console_type = header.u16()?;
    let console_flags = header.u16()?;
    let console_divider = header.u32()?;
    let console_gate_nr = header.u32()?;
    let console_clock_reg = header.u64()?;

    if counts.cpu_set_size % 8 != 0 {
        return Err(LoadError::CpuSetSize {
            size: counts.cpu_set_size,
        });
    }

    let layout = counts.layout()?;
    for table in Table::ORDER {
        let span = layout.span(table);
        if span.end > bytes.len() {
            return Err(LoadError::TruncatedBuffer {
                section: table.name(),
                needed: span.end,
                available: bytes.len(),
            });
        }
    }
    if bytes.len() > layout.total_size() {
        return Err(LoadError::TrailingBytes {
            trailing: bytes.len() - layout.total_size(),
        });
    }

    if reserved != 0 {
        return Err(LoadError::ReservedNonZero { value: reserved });
    }
    let flags = CellFlags::from_bits(flags_raw).ok_or(LoadError::UnknownFlags {
        table: Table::Header,
        index: 0,
        field: "flags",
        bits: u64::from(flags_raw),
    })?;
    let console = Console {
        address: console_address,
        size: console_size,
        kind: ConsoleKind::from_raw(console_type).ok_or(LoadError::UnknownDiscriminant {
            table: Table::Header,
            index: 0,
            field: "console type",
            value: u64::from(console_type),
        })?,
        flags: ConsoleFlags::from_bits(console_flags).ok_or(LoadError::UnknownFlags {
            table: Table::Header,
            index: 0,
            field: "console flags",
            bits: u64::from(console_flags),
        })?,
        divider: console_divider,
        gate_nr: console_gate_nr,
        clock_reg: console_clock_reg,
    };

    let descriptor = CellDescriptor {
        revision,
        name,
        flags,
        cpu_set: read_cpu_set(bytes, &layout, &counts)?,
        vpci_irq_base,
        cpu_reset_address,
        console,
        memory_regions: read_table(bytes, &layout, &counts, Table::MemoryRegions, read_region)?,
        irqchips: read_table(bytes, &layout, &counts, Table::IrqChips, read_irqchip)?,
        pci_devices: read_table(bytes, &layout, &counts, Table::PciDevices, read_pci_device)?,
        stream_ids: read_table(bytes, &layout, &counts, Table::StreamIds, |r, _| {
            Ok(StreamId(r.u32()?))
        })?,
    };

    debug!(
        "parsed cell '{}': {} bytes, {} memory regions, {} irqchips, {} pci devices, {} stream ids",
        descriptor.name,
        bytes.len(),
        descriptor.memory_regions.len(),
        descriptor.irqchips.len(),
        descriptor.pci_devices.len(),
        descriptor.stream_ids.len()
    );
    Ok(descriptor)
}

fn decode_name(field: &[u8; NAME_FIELD_SIZE]) -> Result<String, LoadError> {
    let len = field
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| LoadError::InvalidName {
            detail: "name is not NUL-terminated".into(),
        })?;
    if len == 0 {
        return Err(LoadError::InvalidName {
            detail: "name is empty".into(),
        });
    }
    std::str::from_utf8(&field[..len])
        .map(str::to_owned)
        .map_err(|e| LoadError::InvalidName {
            detail: format!("name is not UTF-8: {e}"),
        })
}

/// Reader over a table whose span has already been checked.
fn section<'a>(bytes: &'a [u8], layout: &Layout, table: Table) -> Result<Reader<'a>, LoadError> {
    let span = layout.span(table);
    let buf = bytes
        .get(span.clone())
        .ok_or(LoadError::TruncatedBuffer {
            section: table.name(),
            needed: span.end,
            available: bytes.len(),
        })?;
    Ok(Reader::new(buf, table.name()))
}

fn read_cpu_set(
    bytes: &[u8],
    layout: &Layout,
    counts: &TableCounts,
) -> Result<CpuSet, LoadError> {
    let mut reader = section(bytes, layout, Table::CpuSet)?;
    let words = (0..counts.cpu_set_size / 8)
        .map(|_| reader.u64())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CpuSet::from_words(words))
}

fn read_table<T, F>(
    bytes: &[u8],
    layout: &Layout,
    counts: &TableCounts,
    table: Table,
    mut read_entry: F,
) -> Result<Vec<T>, LoadError>
where
    F: FnMut(&mut Reader<'_>, usize) -> Result<T, LoadError>,
{
    let mut reader = section(bytes, layout, table)?;
    let count = counts.count(table) as usize;
    let mut entries = Vec::with_capacity(count);
    for index in 0..count {
        entries.push(read_entry(&mut reader, index)?);
    }
    Ok(entries)
}

fn read_region(r: &mut Reader<'_>, index: usize) -> Result<MemoryRegion, LoadError> {
    let phys_start = r.u64()?;
    let virt_start = r.u64()?;
    let size = r.u64()?;
    let bits = r.u64()?;
    let flags = MemFlags::from_bits(bits).ok_or(LoadError::UnknownFlags {
        table: Table::MemoryRegions,
        index,
        field: "flags",
        bits,
    })?;
    Ok(MemoryRegion::new(phys_start, virt_start, size, flags))
}

fn read_irqchip(r: &mut Reader<'_>, _index: usize) -> Result<IrqChip, LoadError> {
    Ok(IrqChip {
        address: r.u64()?,
        id: r.u32()?,
        pin_base: r.u32()?,
        pin_bitmap: PinBitmap::from_words([r.u32()?, r.u32()?, r.u32()?, r.u32()?]),
    })
}

fn read_pci_device(r: &mut Reader<'_>, index: usize) -> Result<PciDevice, LoadError> {
    let raw_kind = r.u8()?;
    let kind = PciDeviceKind::from_raw(raw_kind).ok_or(LoadError::UnknownDiscriminant {
        table: Table::PciDevices,
        index,
        field: "type",
        value: u64::from(raw_kind),
    })?;
    let iommu = r.u8()?;
    let domain = r.u16()?;
    let bdf = Bdf(r.u16()?);
    let _padding = r.u16()?;
    let mut bar_mask = [0u32; 6];
    for bar in &mut bar_mask {
        *bar = r.u32()?;
    }
    let shmem_regions_start = r.u32()?;
    let shmem_dev_id = r.u8()?;
    let shmem_peers = r.u8()?;
    let raw_protocol = r.u16()?;
    let shmem_protocol =
        ShmemProtocol::from_raw(raw_protocol).ok_or(LoadError::UnknownDiscriminant {
            table: Table::PciDevices,
            index,
            field: "shmem_protocol",
            value: u64::from(raw_protocol),
        })?;
    Ok(PciDevice {
        kind,
        iommu,
        domain,
        bdf,
        bar_mask,
        shmem_regions_start,
        shmem_dev_id,
        shmem_peers,
        shmem_protocol,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::fixture;
    use crate::layout::{offset, MEMORY_REGION_SIZE, PCI_DEVICE_SIZE};
    use crate::writer::to_bytes;

    fn sample_bytes() -> Vec<u8> {
        to_bytes(&fixture::j7200_linux_demo()).unwrap()
    }

    fn put_u32(bytes: &mut [u8], at: usize, value: u32) {
        bytes[at..at + 4].copy_from_slice(&value.to_ne_bytes());
    }

    #[test]
    fn parses_sample_cell() {
        let cell = parse(&sample_bytes()).unwrap();
        assert_eq!(cell.name, "k3-j7200-evm-linux-demo");
        assert_eq!(cell.memory_regions.len(), 19);
        assert_eq!(cell.irqchips.len(), 3);
        assert_eq!(cell.pci_devices.len(), 2);
        assert_eq!(cell.stream_ids, vec![StreamId(0x0003)]);
        assert!(cell.cpu_set.contains(1));
        assert!(cell.flags.contains(CellFlags::PASSIVE_COMMREG));
    }

    #[test]
    fn bad_signature_rejected() {
        let mut bytes = sample_bytes();
        bytes[0] = b'X';
        assert_eq!(parse(&bytes), Err(LoadError::BadSignature));
    }

    #[test]
    fn short_buffer_rejected_before_signature() {
        let err = parse(b"JHC").unwrap_err();
        assert!(matches!(err, LoadError::TruncatedBuffer { .. }));
        assert_eq!(err.class(), ErrorClass::Bounds);
    }

    #[test]
    fn newer_revision_rejected() {
        let mut bytes = sample_bytes();
        bytes[offset::REVISION..offset::REVISION + 2].copy_from_slice(&2u16.to_ne_bytes());
        let err = parse(&bytes).unwrap_err();
        assert_eq!(err, LoadError::UnsupportedRevision { found: 2, max: 1 });
        assert_eq!(err.class(), ErrorClass::Format);
    }

    #[test]
    fn truncated_header_rejected() {
        let bytes = sample_bytes();
        let err = parse(&bytes[..HEADER_SIZE - 1]).unwrap_err();
        assert_eq!(
            err,
            LoadError::TruncatedBuffer {
                section: "header",
                needed: HEADER_SIZE,
                available: HEADER_SIZE - 1,
            }
        );
    }

    #[test]
    fn inflated_count_rejected() {
        let mut bytes = sample_bytes();
        put_u32(&mut bytes, offset::NUM_MEMORY_REGIONS, 20);
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(err, LoadError::TruncatedBuffer { .. }));
    }

    #[test]
    fn huge_count_rejected_without_reading() {
        let mut bytes = sample_bytes();
        put_u32(&mut bytes, offset::NUM_PCI_DEVICES, u32::MAX);
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(
            err,
            LoadError::TruncatedBuffer {
                section: "pci_devices",
                ..
            } | LoadError::CountOverflow { .. }
        ));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = sample_bytes();
        bytes.extend_from_slice(&[0; 4]);
        assert_eq!(parse(&bytes), Err(LoadError::TrailingBytes { trailing: 4 }));
    }

    #[test]
    fn unknown_region_flags_rejected() {
        let mut bytes = sample_bytes();
        let flags_at = HEADER_SIZE + 8 + 3 * 8;
        bytes[flags_at..flags_at + 8].copy_from_slice(&0x0200u64.to_ne_bytes());
        assert_eq!(
            parse(&bytes),
            Err(LoadError::UnknownFlags {
                table: Table::MemoryRegions,
                index: 0,
                field: "flags",
                bits: 0x0200,
            })
        );
    }

    #[test]
    fn unknown_protocol_rejected() {
        let mut bytes = sample_bytes();
        let pci_start = HEADER_SIZE + 8 + 19 * MEMORY_REGION_SIZE + 3 * 32;
        let proto_at = pci_start + PCI_DEVICE_SIZE + 38;
        bytes[proto_at..proto_at + 2].copy_from_slice(&0x0002u16.to_ne_bytes());
        assert_eq!(
            parse(&bytes),
            Err(LoadError::UnknownDiscriminant {
                table: Table::PciDevices,
                index: 1,
                field: "shmem_protocol",
                value: 2,
            })
        );
    }

    #[test]
    fn misaligned_cpu_set_size_rejected() {
        let mut bytes = sample_bytes();
        put_u32(&mut bytes, offset::CPU_SET_SIZE, 4);
        assert_eq!(parse(&bytes), Err(LoadError::CpuSetSize { size: 4 }));
    }

    #[test]
    fn unterminated_name_rejected() {
        let mut bytes = sample_bytes();
        bytes[offset::NAME..offset::NAME + NAME_FIELD_SIZE].fill(b'a');
        assert!(matches!(parse(&bytes), Err(LoadError::InvalidName { .. })));
    }
}
