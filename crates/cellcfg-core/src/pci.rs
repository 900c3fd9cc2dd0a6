//! PCI device entries and the inter-cell shared memory protocol.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a PCI device entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PciDeviceKind {
    /// A physical endpoint handed to the cell.
    Device,
    Bridge,
    /// Virtual shared-memory device linking cooperating cells.
    Ivshmem,
}

impl PciDeviceKind {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(PciDeviceKind::Device),
            2 => Some(PciDeviceKind::Bridge),
            3 => Some(PciDeviceKind::Ivshmem),
            _ => None,
        }
    }

    pub fn to_raw(self) -> u8 {
        match self {
            PciDeviceKind::Device => 1,
            PciDeviceKind::Bridge => 2,
            PciDeviceKind::Ivshmem => 3,
        }
    }
}

/// Protocol spoken over an IVSHMEM link.
///
/// The raw encoding reserves ranges for custom and virtio protocols; the
/// payload of those variants is the offset within the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShmemProtocol {
    Undefined,
    /// Virtual ethernet.
    Veth,
    Custom(u16),
    VirtioFront(u16),
    VirtioBack(u16),
}

impl ShmemProtocol {
    const CUSTOM_BASE: u16 = 0x4000;
    const VIRTIO_FRONT_BASE: u16 = 0x8000;
    const VIRTIO_BACK_BASE: u16 = 0xc000;
    const RANGE_MASK: u16 = 0x3fff;

    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0x0000 => Some(ShmemProtocol::Undefined),
            0x0001 => Some(ShmemProtocol::Veth),
            0x4000..=0x7fff => Some(ShmemProtocol::Custom(raw - Self::CUSTOM_BASE)),
            0x8000..=0xbfff => Some(ShmemProtocol::VirtioFront(raw - Self::VIRTIO_FRONT_BASE)),
            0xc000..=0xffff => Some(ShmemProtocol::VirtioBack(raw - Self::VIRTIO_BACK_BASE)),
            _ => None,
        }
    }

    /// Raw encoding. Offsets wider than the reserved range are truncated to it.
    pub fn to_raw(self) -> u16 {
        match self {
            ShmemProtocol::Undefined => 0x0000,
            ShmemProtocol::Veth => 0x0001,
            ShmemProtocol::Custom(n) => Self::CUSTOM_BASE | (n & Self::RANGE_MASK),
            ShmemProtocol::VirtioFront(n) => Self::VIRTIO_FRONT_BASE | (n & Self::RANGE_MASK),
            ShmemProtocol::VirtioBack(n) => Self::VIRTIO_BACK_BASE | (n & Self::RANGE_MASK),
        }
    }
}

impl fmt::Display for ShmemProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShmemProtocol::Undefined => write!(f, "undefined"),
            ShmemProtocol::Veth => write!(f, "veth"),
            ShmemProtocol::Custom(n) => write!(f, "custom+{n:#x}"),
            ShmemProtocol::VirtioFront(n) => write!(f, "virtio-front+{n:#x}"),
            ShmemProtocol::VirtioBack(n) => write!(f, "virtio-back+{n:#x}"),
        }
    }
}

/// Bus/device/function address, packed as `bus << 8 | device << 3 | function`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bdf(pub u16);

impl Bdf {
    pub fn new(bus: u8, device: u8, function: u8) -> Self {
        Bdf((u16::from(bus) << 8) | (u16::from(device & 0x1f) << 3) | u16::from(function & 0x7))
    }

    pub fn bus(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn device(&self) -> u8 {
        ((self.0 >> 3) & 0x1f) as u8
    }

    pub fn function(&self) -> u8 {
        (self.0 & 0x7) as u8
    }
}

impl fmt::Display for Bdf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus(), self.device(), self.function())
    }
}

/// One PCI device granted to a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PciDevice {
    pub kind: PciDeviceKind,
    /// IOMMU unit index.
    pub iommu: u8,
    pub domain: u16,
    pub bdf: Bdf,
    pub bar_mask: [u32; 6],
    /// Index of the first memory region backing an IVSHMEM device.
    pub shmem_regions_start: u32,
    /// This cell's peer id on the link.
    pub shmem_dev_id: u8,
    /// Number of cells cooperating on the link.
    pub shmem_peers: u8,
    pub shmem_protocol: ShmemProtocol,
}

impl PciDevice {
    /// BAR mask of an IVSHMEM device exposing INTx and a 64 KiB MSI-X BAR.
    pub const IVSHMEM_BAR_MASK_INTX_64K: [u32; 6] = [
        0xffff_f000,
        0xffff_fe00,
        0x0000_0000,
        0x0000_0000,
        0xffff_0000,
        0xffff_ffff,
    ];

    /// An IVSHMEM device with the INTx bar layout.
    pub fn ivshmem(
        domain: u16,
        bdf: Bdf,
        shmem_regions_start: u32,
        shmem_dev_id: u8,
        shmem_peers: u8,
        shmem_protocol: ShmemProtocol,
    ) -> Self {
        Self {
            kind: PciDeviceKind::Ivshmem,
            iommu: 0,
            domain,
            bdf,
            bar_mask: Self::IVSHMEM_BAR_MASK_INTX_64K,
            shmem_regions_start,
            shmem_dev_id,
            shmem_peers,
            shmem_protocol,
        }
    }

    pub fn is_ivshmem(&self) -> bool {
        self.kind == PciDeviceKind::Ivshmem
    }
}
