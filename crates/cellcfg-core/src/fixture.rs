//! Reference descriptors for the TI J7200 EVM.
//!
//! [`j7200_linux_demo`] is the non-root Linux demo cell; [`j7200_root_cell`]
//! is a root cell it can be admitted next to. Both share the demo and
//! networking IVSHMEM links.

use crate::cell::{CellDescriptor, Console, ConsoleKind, CpuSet, IrqChip, MemoryRegion, StreamId};
use crate::flags::{CellFlags, ConsoleFlags, MemFlags};
use crate::irq::PinBitmap;
use crate::pci::{Bdf, PciDevice, ShmemProtocol};

/// GIC distributor of the J7200 main domain.
pub const GIC_DISTRIBUTOR: u64 = 0x0180_0000;

/// Index of the comm region in [`j7200_linux_demo`].
pub const DEMO_COMM_REGION_INDEX: usize = 18;

const SHMEM_DEMO_BASE: u64 = 0x8_9fe0_0000;
const SHMEM_NET_BASE: u64 = 0x8_9fe4_0000;

fn rw() -> MemFlags {
    MemFlags::READ | MemFlags::WRITE
}

fn rw_io() -> MemFlags {
    rw() | MemFlags::IO
}

fn rwx() -> MemFlags {
    rw() | MemFlags::EXECUTE
}

/// The four regions of the demo IVSHMEM link: state table, shared
/// read/write section, then one output section per peer.
fn shmem_demo_regions(writable: [bool; 4], extra: MemFlags) -> Vec<MemoryRegion> {
    writable
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            let mut flags = MemFlags::READ | extra;
            if w {
                flags |= MemFlags::WRITE;
            }
            MemoryRegion::identity(SHMEM_DEMO_BASE + i as u64 * 0x10000, 0x10000, flags)
        })
        .collect()
}

/// The four regions of the networking link for a two-peer setup: state
/// table, an empty read/write placeholder, then the two output sections.
/// Only the output section of `dev_id` is writable.
fn shmem_net_regions(dev_id: u8, extra: MemFlags) -> Vec<MemoryRegion> {
    let output = |peer: u8| {
        let mut flags = MemFlags::READ | extra;
        if peer == dev_id {
            flags |= MemFlags::WRITE;
        }
        MemoryRegion::identity(
            SHMEM_NET_BASE + 0x1000 + u64::from(peer) * 0x80000,
            0x7f000,
            flags,
        )
    };
    let mut state_flags = MemFlags::READ | extra;
    if dev_id == 0 {
        state_flags |= MemFlags::WRITE;
    }
    vec![
        MemoryRegion::identity(SHMEM_NET_BASE, 0x1000, state_flags),
        MemoryRegion::new(0, 0, 0, MemFlags::NONE),
        output(0),
        output(1),
    ]
}

fn shmem_devices(dev_id: u8) -> Vec<PciDevice> {
    vec![
        PciDevice::ivshmem(4, Bdf(0), 0, dev_id, 2, ShmemProtocol::Undefined),
        PciDevice::ivshmem(4, Bdf(1 << 3), 4, dev_id, 2, ShmemProtocol::Veth),
    ]
}

/// The J7200 EVM Linux demo cell: CPU 1, 19 memory regions with a single
/// comm region, three irqchips and two IVSHMEM devices.
pub fn j7200_linux_demo() -> CellDescriptor {
    let mut cell = CellDescriptor::new("k3-j7200-evm-linux-demo");
    cell.flags = CellFlags::PASSIVE_COMMREG;
    cell.cpu_set = CpuSet::from_cpus([1]);
    cell.vpci_irq_base = 195 - 32;
    cell.console = Console {
        address: 0x0281_0000,
        divider: 0x1b,
        kind: ConsoleKind::Uart8250,
        flags: ConsoleFlags::ACCESS_MMIO | ConsoleFlags::REGDIST_4,
        ..Console::default()
    };

    let demo_writable = [false, true, false, true];
    cell.memory_regions = shmem_demo_regions(demo_writable, MemFlags::ROOTSHARED);
    cell.memory_regions
        .extend(shmem_net_regions(1, MemFlags::ROOTSHARED));
    cell.memory_regions.extend([
        // ctrl mmr
        MemoryRegion::identity(0x0010_0000, 0x20000, rw_io() | MemFlags::ROOTSHARED),
        // uart1
        MemoryRegion::identity(0x0281_0000, 0x1000, rw_io()),
        // sdhci0
        MemoryRegion::identity(0x04f8_0000, 0x1000, rw_io()),
        MemoryRegion::identity(0x04f8_8000, 0x1000, rw_io()),
        // main gpio2
        MemoryRegion::identity(0x0061_0000, 0x1000, rw_io()),
        // secure proxy
        MemoryRegion::identity(0x3240_f000, 0x5000, rw_io()),
        MemoryRegion::identity(0x3280_f000, 0x5000, rw_io()),
        MemoryRegion::identity(0x32c0_f000, 0x5000, rw_io()),
        // loader
        MemoryRegion::new(0x8_9ff4_0000, 0, 0x10000, rwx() | MemFlags::LOADABLE),
        // RAM
        MemoryRegion::identity(
            0x8_a000_0000,
            0x6000_0000,
            rwx() | MemFlags::DMA | MemFlags::LOADABLE,
        ),
        MemoryRegion::comm_region(0x8000_0000, 0x1000),
    ]);

    cell.irqchips = vec![
        IrqChip {
            address: GIC_DISTRIBUTOR,
            id: 0,
            pin_base: 32,
            // sdhci0, sproxy
            pin_bitmap: PinBitmap::from_words([1 << (35 - 32), 1 << (71 - 64), 0, 0]),
        },
        IrqChip {
            address: GIC_DISTRIBUTOR,
            id: 0,
            pin_base: 160,
            // vpci, uart1
            pin_bitmap: PinBitmap::from_words([0, 1 << (195 - 192), 1 << (225 - 224), 0]),
        },
        IrqChip {
            address: GIC_DISTRIBUTOR,
            id: 0,
            pin_base: 416,
            // gpio2
            pin_bitmap: PinBitmap::from_words([0xffff_ff00, 0, 0, 0]),
        },
    ];
    cell.pci_devices = shmem_devices(1);
    cell.stream_ids = vec![StreamId(0x0003)];
    cell
}

/// A root cell owning CPUs 0 and 1 and the other end of both IVSHMEM links.
pub fn j7200_root_cell() -> CellDescriptor {
    let mut cell = CellDescriptor::new("k3-j7200-evm");
    cell.cpu_set = CpuSet::from_cpus([0, 1]);
    cell.vpci_irq_base = 189 - 32;
    cell.console = Console {
        address: 0x0280_0000,
        divider: 0x1b,
        kind: ConsoleKind::Uart8250,
        flags: ConsoleFlags::ACCESS_MMIO | ConsoleFlags::REGDIST_4,
        ..Console::default()
    };

    cell.memory_regions = shmem_demo_regions([false, true, true, false], MemFlags::NONE);
    cell.memory_regions
        .extend(shmem_net_regions(0, MemFlags::NONE));
    cell.memory_regions.extend([
        // main domain peripherals
        MemoryRegion::identity(0x0010_0000, 0x0002_0000, rw_io()),
        MemoryRegion::identity(0x0060_0000, 0x0010_0000, rw_io()),
        MemoryRegion::identity(0x0280_0000, 0x0010_0000, rw_io()),
        MemoryRegion::identity(0x04f8_0000, 0x0001_0000, rw_io()),
        MemoryRegion::identity(0x3200_0000, 0x0100_0000, rw_io()),
        // RAM
        MemoryRegion::identity(0x8000_0000, 0x8000_0000, rwx() | MemFlags::DMA),
        MemoryRegion::identity(0x8_8000_0000, 0x1fe0_0000, rwx() | MemFlags::DMA),
        MemoryRegion::identity(0x8_a000_0000, 0x6000_0000, rwx() | MemFlags::DMA),
        MemoryRegion::comm_region(0x1_0000_0000, 0x1000),
    ]);

    cell.irqchips = vec![
        IrqChip {
            address: GIC_DISTRIBUTOR,
            id: 0,
            pin_base: 32,
            pin_bitmap: PinBitmap::from_words([0xffff_ffff; 4]),
        },
        IrqChip {
            address: GIC_DISTRIBUTOR,
            id: 0,
            pin_base: 160,
            // vpci INTA..INTD
            pin_bitmap: PinBitmap::from_words([0xe000_0000, 0x1, 0, 0]),
        },
    ];
    cell.pci_devices = shmem_devices(0);
    cell.stream_ids = vec![StreamId(0x0001), StreamId(0x0002)];
    cell
}
