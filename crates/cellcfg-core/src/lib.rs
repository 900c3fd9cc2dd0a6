//! Binary cell descriptor format for a static partitioning hypervisor.
//!
//! A cell descriptor is a flat, pointer-free record describing one partition:
//! its CPUs, memory regions, interrupt pins, PCI devices and IOMMU stream ids.
//! This crate defines the typed descriptor, the byte layout, a bounds-checked
//! loader and the matching writer.
//!
//! ## Blob Layout
//!
//! ```text
//! Cell descriptor (native byte order):
//! ┌──────────────────────────────────┐
//! │ Signature: "JHCELL"              │  6 bytes
//! │ Revision: u16                    │  2 bytes
//! │ Name (NUL padded)                │ 32 bytes
//! │ flags, cpu_set_size              │  2 × u32
//! │ table counts                     │  4 × u32
//! │ vpci_irq_base, reserved          │  2 × u32
//! │ cpu_reset_address                │  u64
//! │ Console                          │ 32 bytes
//! ├──────────────────────────────────┤
//! │ cpu set bitmap                   │  cpu_set_size bytes
//! │ memory regions                   │  32 bytes each
//! │ irqchips                         │  32 bytes each
//! │ pci devices                      │  40 bytes each
//! │ stream ids                       │   4 bytes each
//! └──────────────────────────────────┘
//! ```

pub mod cell;
pub mod error;
pub mod fixture;
pub mod flags;
pub mod irq;
pub mod layout;
pub mod pci;

mod loader;
mod writer;

pub use cell::{CellDescriptor, Console, ConsoleKind, CpuSet, IrqChip, MemoryRegion, StreamId};
pub use error::{ErrorClass, LoadError};
pub use flags::{CellFlags, ConsoleFlags, MemFlags};
pub use irq::{PinBitmap, PinError};
pub use layout::{Table, TableCounts, CONFIG_REVISION, HEADER_SIZE, SIGNATURE};
pub use loader::parse;
pub use pci::{Bdf, PciDevice, PciDeviceKind, ShmemProtocol};
pub use writer::to_bytes;
