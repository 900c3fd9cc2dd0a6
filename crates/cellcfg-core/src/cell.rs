//! Typed in-memory form of a cell descriptor.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::flags::{CellFlags, ConsoleFlags, MemFlags};
use crate::irq::PinBitmap;
use crate::layout::{TableCounts, CONFIG_REVISION};
use crate::pci::PciDevice;

/// One physical-to-virtual mapping granted to a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    pub phys_start: u64,
    pub virt_start: u64,
    pub size: u64,
    pub flags: MemFlags,
}

impl MemoryRegion {
    pub fn new(phys_start: u64, virt_start: u64, size: u64, flags: MemFlags) -> Self {
        Self {
            phys_start,
            virt_start,
            size,
            flags,
        }
    }

    /// A region mapped at its physical address.
    pub fn identity(start: u64, size: u64, flags: MemFlags) -> Self {
        Self::new(start, start, size, flags)
    }

    /// The communication page, mapped at `virt_start` with no physical backing.
    pub fn comm_region(virt_start: u64, size: u64) -> Self {
        Self::new(
            0,
            virt_start,
            size,
            MemFlags::READ | MemFlags::WRITE | MemFlags::COMM_REGION,
        )
    }

    /// Exclusive end of the physical range, `None` on wrap-around.
    pub fn phys_end(&self) -> Option<u64> {
        self.phys_start.checked_add(self.size)
    }

    /// Exclusive end of the virtual range, `None` on wrap-around.
    pub fn virt_end(&self) -> Option<u64> {
        self.virt_start.checked_add(self.size)
    }

    pub fn is_comm_region(&self) -> bool {
        self.flags.contains(MemFlags::COMM_REGION)
    }

    pub fn is_rootshared(&self) -> bool {
        self.flags.contains(MemFlags::ROOTSHARED)
    }

    /// Zero-sized entries only hold a slot in a shared memory layout.
    pub fn is_placeholder(&self) -> bool {
        self.size == 0
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "phys {:#x} -> virt {:#x} size {:#x} [{}]",
            self.phys_start, self.virt_start, self.size, self.flags
        )
    }
}

/// Interrupt controller pins routed to a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrqChip {
    /// Controller MMIO address.
    pub address: u64,
    pub id: u32,
    pub pin_base: u32,
    pub pin_bitmap: PinBitmap,
}

/// An IOMMU stream identifier owned by a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub u32);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Bitmap over CPU ids, stored as 64-bit words.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSet {
    words: Vec<u64>,
}

impl CpuSet {
    pub fn from_words(words: Vec<u64>) -> Self {
        Self { words }
    }

    /// Smallest set holding every listed CPU.
    pub fn from_cpus<I>(cpus: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        let mut set = Self::default();
        for cpu in cpus {
            set.insert(cpu);
        }
        set
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Size of the encoded bitmap in bytes.
    pub fn size_bytes(&self) -> usize {
        self.words.len() * 8
    }

    pub fn insert(&mut self, cpu: u32) {
        let word = (cpu / 64) as usize;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (cpu % 64);
    }

    pub fn contains(&self, cpu: u32) -> bool {
        self.words
            .get((cpu / 64) as usize)
            .is_some_and(|&w| w & (1u64 << (cpu % 64)) != 0)
    }

    /// CPU ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &w)| {
            (0..64u32)
                .filter(move |bit| w & (1u64 << bit) != 0)
                .map(move |bit| i as u32 * 64 + bit)
        })
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }
}

impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cpus: Vec<String> = self.iter().map(|c| c.to_string()).collect();
        write!(f, "{{{}}}", cpus.join(", "))
    }
}

/// Console device type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsoleKind {
    #[default]
    None,
    Efifb,
    Uart8250,
    Pl011,
    Xuartps,
    Mvebu,
    Hscif,
    Scifa,
    Imx,
    ImxLpuart,
}

impl ConsoleKind {
    pub fn from_raw(raw: u16) -> Option<Self> {
        let kind = match raw {
            0 => ConsoleKind::None,
            1 => ConsoleKind::Efifb,
            2 => ConsoleKind::Uart8250,
            3 => ConsoleKind::Pl011,
            4 => ConsoleKind::Xuartps,
            5 => ConsoleKind::Mvebu,
            6 => ConsoleKind::Hscif,
            7 => ConsoleKind::Scifa,
            8 => ConsoleKind::Imx,
            9 => ConsoleKind::ImxLpuart,
            _ => return None,
        };
        Some(kind)
    }

    pub fn to_raw(self) -> u16 {
        match self {
            ConsoleKind::None => 0,
            ConsoleKind::Efifb => 1,
            ConsoleKind::Uart8250 => 2,
            ConsoleKind::Pl011 => 3,
            ConsoleKind::Xuartps => 4,
            ConsoleKind::Mvebu => 5,
            ConsoleKind::Hscif => 6,
            ConsoleKind::Scifa => 7,
            ConsoleKind::Imx => 8,
            ConsoleKind::ImxLpuart => 9,
        }
    }
}

/// Debug console of a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Console {
    pub address: u64,
    pub size: u32,
    pub kind: ConsoleKind,
    pub flags: ConsoleFlags,
    pub divider: u32,
    pub gate_nr: u32,
    pub clock_reg: u64,
}

/// A complete, typed cell descriptor.
///
/// Produced by [`crate::parse`]; nothing here is trusted until validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDescriptor {
    pub revision: u16,
    pub name: String,
    pub flags: CellFlags,
    pub cpu_set: CpuSet,
    /// First interrupt line of the cell's virtual PCI host controller.
    pub vpci_irq_base: u32,
    pub cpu_reset_address: u64,
    pub console: Console,
    pub memory_regions: Vec<MemoryRegion>,
    pub irqchips: Vec<IrqChip>,
    pub pci_devices: Vec<PciDevice>,
    pub stream_ids: Vec<StreamId>,
}

impl CellDescriptor {
    /// An empty descriptor at the current revision.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            revision: CONFIG_REVISION,
            name: name.into(),
            flags: CellFlags::NONE,
            cpu_set: CpuSet::default(),
            vpci_irq_base: 0,
            cpu_reset_address: 0,
            console: Console::default(),
            memory_regions: Vec::new(),
            irqchips: Vec::new(),
            pci_devices: Vec::new(),
            stream_ids: Vec::new(),
        }
    }

    /// Table sizes this descriptor encodes to, `None` if a table is too
    /// large for its u32 header count.
    pub fn table_counts(&self) -> Option<TableCounts> {
        Some(TableCounts {
            cpu_set_size: u32::try_from(self.cpu_set.size_bytes()).ok()?,
            memory_regions: u32::try_from(self.memory_regions.len()).ok()?,
            irqchips: u32::try_from(self.irqchips.len()).ok()?,
            pci_devices: u32::try_from(self.pci_devices.len()).ok()?,
            stream_ids: u32::try_from(self.stream_ids.len()).ok()?,
        })
    }

    /// Index of every region flagged as comm region.
    pub fn comm_regions(&self) -> impl Iterator<Item = usize> + '_ {
        self.memory_regions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_comm_region())
            .map(|(i, _)| i)
    }
}
