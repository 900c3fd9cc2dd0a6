//! Registry of admitted cells.
//!
//! The registry owns the resources of every admitted cell and is the single
//! serialization point for admission and release. The first admitted cell
//! is the root cell; every later cell is carved out of it.

pub mod conflict;
pub mod error;
pub mod handle;
pub mod registry;

pub use error::{LoadFailure, RegistryError, ResourceConflictError, Result};
pub use handle::{CellHandle, CellState};
pub use registry::{CellSummary, Registry};
