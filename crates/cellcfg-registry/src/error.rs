//! Registry error types.

use cellcfg_core::{LoadError, StreamId};
use cellcfg_validate::{IrqPin, ValidationError};
use thiserror::Error;

use crate::handle::CellHandle;

/// A candidate cell clashes with an admitted cell. `cell` names the
/// admitted cell.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceConflictError {
    #[error("a cell named '{cell}' is already loaded")]
    NameTaken { cell: String },

    #[error("cpu {cpu} is already owned by cell '{cell}'")]
    Cpu { cpu: u32, cell: String },

    #[error("root cell '{cell}' would be left without a CPU")]
    RootWithoutCpu { cell: String },

    #[error("memory_regions[{region}] ({start:#x}..{end:#x}) overlaps memory of cell '{cell}'")]
    Memory {
        region: usize,
        start: u64,
        end: u64,
        cell: String,
    },

    #[error("interrupt pin {pin} is already routed to cell '{cell}'")]
    IrqPin { pin: IrqPin, cell: String },

    #[error("stream id {id} is already owned by cell '{cell}'")]
    StreamId { id: StreamId, cell: String },

    #[error("pci_devices[{device}]: link at {key:#x} disagrees with cell '{cell}': {detail}")]
    ShmemMismatch {
        device: usize,
        key: u64,
        cell: String,
        detail: String,
    },

    #[error("pci_devices[{device}]: shmem_dev_id {dev_id} on link {key:#x} is taken by cell '{cell}'")]
    ShmemDevId {
        device: usize,
        key: u64,
        dev_id: u8,
        cell: String,
    },

    #[error("pci_devices[{device}]: link at {key:#x} already has all {peers} peers (first: '{cell}')")]
    ShmemFull {
        device: usize,
        key: u64,
        peers: u8,
        cell: String,
    },
}

impl ResourceConflictError {
    /// Name of the admitted cell the candidate clashes with.
    pub fn cell(&self) -> &str {
        match self {
            ResourceConflictError::NameTaken { cell }
            | ResourceConflictError::Cpu { cell, .. }
            | ResourceConflictError::RootWithoutCpu { cell }
            | ResourceConflictError::Memory { cell, .. }
            | ResourceConflictError::IrqPin { cell, .. }
            | ResourceConflictError::StreamId { cell, .. }
            | ResourceConflictError::ShmemMismatch { cell, .. }
            | ResourceConflictError::ShmemDevId { cell, .. }
            | ResourceConflictError::ShmemFull { cell, .. } => cell,
        }
    }
}

/// Errors from releasing a cell.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no admitted cell has handle {handle}")]
    UnknownHandle { handle: CellHandle },

    #[error("root cell '{root}' cannot be released while {remaining} other cell(s) are loaded")]
    RootCellBusy { root: String, remaining: usize },
}

/// Any reason a load from raw bytes failed. Nothing is reserved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadFailure {
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("resource conflict: {0}")]
    Conflict(#[from] ResourceConflictError),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
