//! Loader error types.

use thiserror::Error;

use crate::layout::Table;

/// Broad class of a load failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Incompatible or corrupt encoding.
    Format,
    /// A declared count or offset exceeds the buffer.
    Bounds,
}

/// Errors that can occur while parsing or writing a cell descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("invalid signature: expected \"JHCELL\"")]
    BadSignature,

    #[error("unsupported descriptor revision {found} (supported: 1..={max})")]
    UnsupportedRevision { found: u16, max: u16 },

    #[error("buffer truncated in {section}: need {needed} bytes, have {available}")]
    TruncatedBuffer {
        section: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{table} count {count} overflows the address space")]
    CountOverflow { table: Table, count: u32 },

    #[error("{trailing} unexpected bytes after the last table")]
    TrailingBytes { trailing: usize },

    #[error("unknown {field} value {value:#x} in {table}[{index}]")]
    UnknownDiscriminant {
        table: Table,
        index: usize,
        field: &'static str,
        value: u64,
    },

    #[error("unknown {field} bits {bits:#x} in {table}[{index}]")]
    UnknownFlags {
        table: Table,
        index: usize,
        field: &'static str,
        bits: u64,
    },

    #[error("invalid cell name: {detail}")]
    InvalidName { detail: String },

    #[error("cpu_set_size {size} is not a multiple of 8")]
    CpuSetSize { size: u32 },

    #[error("reserved header field is not zero ({value:#x})")]
    ReservedNonZero { value: u32 },
}

impl LoadError {
    /// Classify the failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            LoadError::TruncatedBuffer { .. }
            | LoadError::CountOverflow { .. }
            | LoadError::TrailingBytes { .. } => ErrorClass::Bounds,
            _ => ErrorClass::Format,
        }
    }
}
