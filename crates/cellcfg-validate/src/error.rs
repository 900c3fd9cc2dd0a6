//! Validation error types.

use std::fmt;

use cellcfg_core::{Bdf, LoadError, MemFlags, StreamId};
use thiserror::Error;

/// Address space an overlap was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpace {
    Physical,
    Virtual,
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressSpace::Physical => write!(f, "physical"),
            AddressSpace::Virtual => write!(f, "virtual"),
        }
    }
}

/// A configuration authoring mistake. Indices refer to the descriptor's
/// tables: `region` to memory_regions, `chip` to irqchips, `device` to
/// pci_devices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemanticError {
    #[error("invalid cell name: {detail}")]
    InvalidName { detail: String },

    #[error("memory_regions[{region}]: {field} {value:#x} is not aligned to page size {page_size:#x}")]
    Misaligned {
        region: usize,
        field: &'static str,
        value: u64,
        page_size: u64,
    },

    #[error("memory_regions[{region}]: illegal flags {flags}: {reason}")]
    IllegalFlags {
        region: usize,
        flags: MemFlags,
        reason: &'static str,
    },

    #[error("memory_regions[{region}]: {space} range wraps around the address space")]
    AddressWrap { region: usize, space: AddressSpace },

    #[error("memory_regions[{region}]: {start:#x}..{end:#x} is outside the platform physical window")]
    OutsidePhysWindow { region: usize, start: u64, end: u64 },

    #[error("memory_regions[{first}] and [{second}] overlap in {space} space")]
    RegionOverlap {
        space: AddressSpace,
        first: usize,
        second: usize,
    },

    #[error("no memory region is flagged COMM_REGION")]
    MissingCommRegion,

    #[error("memory_regions[{region}]: the comm region has size 0")]
    EmptyCommRegion { region: usize },

    #[error("memory_regions[{second}] is a second COMM_REGION (first is [{first}])")]
    DuplicateCommRegion { first: usize, second: usize },

    #[error("irqchips[{chip}]: pin_base {pin_base} is not a multiple of 32")]
    PinBaseMisaligned { chip: usize, pin_base: u32 },

    #[error("irqchips[{chip}]: pin {pin} is not below the platform limit {max}")]
    PinOutOfRange { chip: usize, pin: u32, max: u32 },

    #[error("irqchips[{chip}]: pin_base {pin_base} plus bitmap bit {bit} is not a valid pin number")]
    PinOverflow { chip: usize, pin_base: u32, bit: u32 },

    #[error("irqchips[{chip}]: pin {pin} is already routed by another chip entry")]
    PinRoutedTwice { chip: usize, pin: u32 },

    #[error("irqchips[{chip}]: no interrupt controller at {address:#x}")]
    UnknownIrqChip { chip: usize, address: u64 },

    #[error("pci_devices[{device}]: IVSHMEM device needs at least one peer")]
    NoShmemPeers { device: usize },

    #[error("pci_devices[{device}]: shmem_dev_id {dev_id} is not below shmem_peers {peers}")]
    ShmemDevId { device: usize, dev_id: u8, peers: u8 },

    #[error("pci_devices[{device}]: shared memory slice has no backed region")]
    EmptyShmemSlice { device: usize },

    #[error("pci_devices[{device}]: shared memory slice includes the comm region")]
    ShmemSliceCommRegion { device: usize },

    #[error("pci_devices[{device}]: bdf {bdf} already used in domain {domain}")]
    DuplicateBdf { device: usize, domain: u16, bdf: Bdf },

    #[error("pci_devices[{first}] and [{second}] resolve overlapping shared memory slices")]
    ShmemSliceOverlap { first: usize, second: usize },

    #[error("cpu set is empty")]
    EmptyCpuSet,

    #[error("cpu {cpu} is not below the platform limit {max}")]
    CpuOutOfRange { cpu: u32, max: u32 },

    #[error("stream_ids[{index}]: stream id {id} is listed twice")]
    DuplicateStreamId { index: usize, id: StreamId },

    #[error("a cell named '{name}' is already loaded")]
    NameInUse { name: String },
}

/// A table reference that points past the end of its table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundsError {
    #[error(
        "pci_devices[{device}]: shared memory slice {start}..{end} exceeds {table_len} memory regions"
    )]
    ShmemSlice {
        device: usize,
        start: u64,
        end: u64,
        table_len: usize,
    },
}

/// Any reason a descriptor is rejected by validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    Bounds(#[from] BoundsError),

    /// The descriptor could not be encoded for fingerprinting.
    #[error("cannot encode descriptor: {0}")]
    Encoding(#[from] LoadError),
}

impl ValidationError {
    pub fn is_semantic(&self) -> bool {
        matches!(self, ValidationError::Semantic(_))
    }

    pub fn is_bounds(&self) -> bool {
        matches!(self, ValidationError::Bounds(_))
    }
}

/// Result type for validation.
pub type Result<T> = std::result::Result<T, ValidationError>;
