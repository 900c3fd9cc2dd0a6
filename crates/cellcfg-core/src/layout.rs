//! Byte layout of a cell descriptor.
//!
//! Every offset is derived from the fixed header: the five tables follow the
//! header back to back in [`Table::ORDER`], each `count × entry_size` bytes.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Signature at offset 0 of every cell descriptor.
pub const SIGNATURE: [u8; 6] = *b"JHCELL";

/// Highest descriptor revision this crate understands.
pub const CONFIG_REVISION: u16 = 1;

/// Size of the name field, including the terminating NUL.
pub const NAME_FIELD_SIZE: usize = 32;

/// Longest usable cell name in bytes.
pub const NAME_MAXLEN: usize = NAME_FIELD_SIZE - 1;

/// Size of the fixed header.
/// 6 (signature) + 2 (revision) + 32 (name) + 4*8 (u32 fields) + 8 (reset address) + 32 (console)
pub const HEADER_SIZE: usize = 112;

/// Size of an encoded console descriptor.
pub const CONSOLE_SIZE: usize = 32;

/// Size of one memory region entry.
pub const MEMORY_REGION_SIZE: usize = 32;

/// Size of one irqchip entry.
pub const IRQCHIP_SIZE: usize = 32;

/// Size of one PCI device entry.
pub const PCI_DEVICE_SIZE: usize = 40;

/// Size of one stream id entry.
pub const STREAM_ID_SIZE: usize = 4;

/// Header field offsets.
pub mod offset {
    pub const SIGNATURE: usize = 0;
    pub const REVISION: usize = 6;
    pub const NAME: usize = 8;
    pub const FLAGS: usize = 40;
    pub const CPU_SET_SIZE: usize = 44;
    pub const NUM_MEMORY_REGIONS: usize = 48;
    pub const NUM_IRQCHIPS: usize = 52;
    pub const NUM_PCI_DEVICES: usize = 56;
    pub const NUM_STREAM_IDS: usize = 60;
    pub const VPCI_IRQ_BASE: usize = 64;
    pub const RESERVED: usize = 68;
    pub const CPU_RESET_ADDRESS: usize = 72;
    pub const CONSOLE: usize = 80;
}

/// The variable-length sections of a descriptor, plus the header itself
/// for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    Header,
    CpuSet,
    MemoryRegions,
    IrqChips,
    PciDevices,
    StreamIds,
}

impl Table {
    /// Tables in the order they appear after the header.
    pub const ORDER: [Table; 5] = [
        Table::CpuSet,
        Table::MemoryRegions,
        Table::IrqChips,
        Table::PciDevices,
        Table::StreamIds,
    ];

    /// Size in bytes of one entry. The cpu set counts bytes directly.
    pub fn entry_size(&self) -> usize {
        match self {
            Table::Header => HEADER_SIZE,
            Table::CpuSet => 1,
            Table::MemoryRegions => MEMORY_REGION_SIZE,
            Table::IrqChips => IRQCHIP_SIZE,
            Table::PciDevices => PCI_DEVICE_SIZE,
            Table::StreamIds => STREAM_ID_SIZE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Table::Header => "header",
            Table::CpuSet => "cpu_set",
            Table::MemoryRegions => "memory_regions",
            Table::IrqChips => "irqchips",
            Table::PciDevices => "pci_devices",
            Table::StreamIds => "stream_ids",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Table sizes as declared by a header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    /// Bytes in the cpu bitmap.
    pub cpu_set_size: u32,
    pub memory_regions: u32,
    pub irqchips: u32,
    pub pci_devices: u32,
    pub stream_ids: u32,
}

impl TableCounts {
    /// Declared entry count for a table.
    pub fn count(&self, table: Table) -> u32 {
        match table {
            Table::Header => 1,
            Table::CpuSet => self.cpu_set_size,
            Table::MemoryRegions => self.memory_regions,
            Table::IrqChips => self.irqchips,
            Table::PciDevices => self.pci_devices,
            Table::StreamIds => self.stream_ids,
        }
    }

    /// Compute the byte span of every table with checked arithmetic.
    ///
    /// No offset is trusted until this succeeds and the resulting
    /// [`Layout::total_size`] has been compared with the buffer length.
    pub fn layout(&self) -> Result<Layout, LoadError> {
        let mut spans: [Range<usize>; 5] = Default::default();
        let mut cursor = HEADER_SIZE;
        for (slot, table) in spans.iter_mut().zip(Table::ORDER) {
            let count = self.count(table);
            let len = usize::try_from(count)
                .ok()
                .and_then(|c| c.checked_mul(table.entry_size()))
                .ok_or(LoadError::CountOverflow { table, count })?;
            let end = cursor
                .checked_add(len)
                .ok_or(LoadError::CountOverflow { table, count })?;
            *slot = cursor..end;
            cursor = end;
        }
        Ok(Layout { spans })
    }
}

/// Resolved byte spans of the tables of one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    spans: [Range<usize>; 5],
}

impl Layout {
    /// Byte range occupied by a table. The header spans `0..HEADER_SIZE`.
    pub fn span(&self, table: Table) -> Range<usize> {
        match table {
            Table::Header => 0..HEADER_SIZE,
            Table::CpuSet => self.spans[0].clone(),
            Table::MemoryRegions => self.spans[1].clone(),
            Table::IrqChips => self.spans[2].clone(),
            Table::PciDevices => self.spans[3].clone(),
            Table::StreamIds => self.spans[4].clone(),
        }
    }

    /// Total encoded size of the descriptor.
    pub fn total_size(&self) -> usize {
        self.spans[4].end
    }
}
