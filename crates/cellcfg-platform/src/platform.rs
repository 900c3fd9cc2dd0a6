//! Platform limits model.

use std::ops::Range;

use cellcfg_core::ShmemProtocol;
use serde::{Deserialize, Serialize};

/// Number of virtual INTx pins (INTA..INTD) of a cell's virtual PCI host.
pub const VPCI_INTX_PINS: u32 = 4;

fn default_vpci_irq_pin_offset() -> u32 {
    32
}

/// Physical address window cells may map, `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PhysWindow {
    pub start: u64,
    /// Exclusive end.
    pub end: u64,
}

impl PhysWindow {
    /// Whether `start..end` lies inside the window.
    pub fn contains(&self, start: u64, end: u64) -> bool {
        start >= self.start && end <= self.end && start <= end
    }
}

/// Regions each peer contributes to an IVSHMEM link, per protocol kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegionsPerPeer {
    pub undefined: u32,
    pub veth: u32,
    pub custom: u32,
    pub virtio_front: u32,
    pub virtio_back: u32,
}

impl RegionsPerPeer {
    /// The same count for every protocol.
    pub fn uniform(count: u32) -> Self {
        Self {
            undefined: count,
            veth: count,
            custom: count,
            virtio_front: count,
            virtio_back: count,
        }
    }

    pub fn get(&self, protocol: ShmemProtocol) -> u32 {
        match protocol {
            ShmemProtocol::Undefined => self.undefined,
            ShmemProtocol::Veth => self.veth,
            ShmemProtocol::Custom(_) => self.custom,
            ShmemProtocol::VirtioFront(_) => self.virtio_front,
            ShmemProtocol::VirtioBack(_) => self.virtio_back,
        }
    }

    pub(crate) fn entries(&self) -> [(&'static str, u32); 5] {
        [
            ("undefined", self.undefined),
            ("veth", self.veth),
            ("custom", self.custom),
            ("virtio-front", self.virtio_front),
            ("virtio-back", self.virtio_back),
        ]
    }
}

/// Shared memory layout rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ShmemModel {
    pub regions_per_peer: RegionsPerPeer,
}

/// Hardware limits a cell descriptor is validated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Platform {
    /// Platform name (e.g., "k3-j7200").
    pub name: String,
    pub version: String,
    /// Granule every region must be aligned to.
    pub page_size: u64,
    /// CPU ids must be below this.
    pub max_cpus: u32,
    /// Interrupt pins must be below this.
    pub max_irq_pins: u32,
    /// Whether a region may combine IO and DMA.
    #[serde(default)]
    pub io_dma_allowed: bool,
    /// Distance from `vpci_irq_base` to the first virtual INTx pin.
    #[serde(default = "default_vpci_irq_pin_offset")]
    pub vpci_irq_pin_offset: u32,
    /// Known interrupt controller addresses. Empty accepts any address.
    #[serde(default)]
    pub irqchip_addresses: Vec<u64>,
    pub phys_window: PhysWindow,
    pub shmem: ShmemModel,
}

impl Platform {
    /// Names of the built-in presets.
    pub const PRESETS: [&'static str; 2] = ["generic-arm64", "k3-j7200"];

    /// Look up a built-in preset by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "generic-arm64" => Some(Self::generic_arm64()),
            "k3-j7200" => Some(Self::k3_j7200()),
            _ => None,
        }
    }

    /// A permissive AArch64 board with a GICv3-sized interrupt space.
    pub fn generic_arm64() -> Self {
        Self {
            name: "generic-arm64".into(),
            version: "generic".into(),
            page_size: 0x1000,
            max_cpus: 8,
            max_irq_pins: 1020,
            io_dma_allowed: false,
            vpci_irq_pin_offset: default_vpci_irq_pin_offset(),
            irqchip_addresses: Vec::new(),
            phys_window: PhysWindow {
                start: 0,
                end: 1 << 48,
            },
            shmem: ShmemModel {
                regions_per_peer: RegionsPerPeer::uniform(2),
            },
        }
    }

    /// TI J7200 EVM: two A72 cores behind one GICv3 distributor.
    pub fn k3_j7200() -> Self {
        Self {
            name: "k3-j7200".into(),
            version: "1.0".into(),
            page_size: 0x1000,
            max_cpus: 2,
            max_irq_pins: 960,
            io_dma_allowed: false,
            vpci_irq_pin_offset: default_vpci_irq_pin_offset(),
            irqchip_addresses: vec![0x0180_0000],
            phys_window: PhysWindow {
                start: 0,
                end: 0x10_0000_0000,
            },
            shmem: ShmemModel {
                regions_per_peer: RegionsPerPeer::uniform(2),
            },
        }
    }

    /// Regions one peer contributes to a link speaking `protocol`.
    pub fn regions_per_peer(&self, protocol: ShmemProtocol) -> u32 {
        self.shmem.regions_per_peer.get(protocol)
    }

    /// Whether `value` is a multiple of the page size.
    pub fn is_page_aligned(&self, value: u64) -> bool {
        self.page_size != 0 && value % self.page_size == 0
    }

    /// The virtual INTx pins of a cell with the given `vpci_irq_base`.
    /// These pins are shared between cells.
    pub fn vpci_intx_pins(&self, vpci_irq_base: u32) -> Range<u32> {
        let first = vpci_irq_base.saturating_add(self.vpci_irq_pin_offset);
        first..first.saturating_add(VPCI_INTX_PINS)
    }

    /// Whether the platform lists `address` as an interrupt controller.
    pub fn knows_irqchip(&self, address: u64) -> bool {
        self.irqchip_addresses.is_empty() || self.irqchip_addresses.contains(&address)
    }
}
