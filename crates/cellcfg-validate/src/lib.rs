//! Semantic validation of cell descriptors.
//!
//! [`validate`] runs every per-cell check against a [`Platform`] and, only
//! when all of them pass, wraps the descriptor into an immutable
//! [`ValidatedDescriptor`]. Checks are pure; cross-cell conflicts are left
//! to the registry.

pub mod error;
pub mod irq;
pub mod regions;
pub mod resources;
pub mod shmem;
pub mod validated;

use cellcfg_core::CellDescriptor;
use cellcfg_platform::Platform;
use log::debug;

pub use error::{AddressSpace, BoundsError, Result, SemanticError, ValidationError};
pub use irq::{validate_irqchips, IrqPin, PinClaims};
pub use regions::{ranges_overlap, validate_regions};
pub use resources::{NoCells, RegistryView};
pub use shmem::{resolve_links, resolve_slice, ShmemLink};
pub use validated::{Fingerprint, ValidatedDescriptor};

/// Every problem with `descriptor`, in check order: regions, interrupts,
/// shared memory links, then CPUs, stream ids and the name.
pub fn diagnose(descriptor: &CellDescriptor, platform: &Platform) -> Vec<ValidationError> {
    let mut issues: Vec<ValidationError> = Vec::new();
    issues.extend(
        regions::region_issues(descriptor, platform)
            .into_iter()
            .map(ValidationError::from),
    );
    issues.extend(
        irq::irq_issues(descriptor, platform)
            .into_iter()
            .map(ValidationError::from),
    );
    issues.extend(shmem::link_issues(descriptor, platform).1);
    issues.extend(
        resources::resource_issues(descriptor, platform)
            .into_iter()
            .map(ValidationError::from),
    );
    issues
}

/// Validate a descriptor for admission next to the cells in `view`.
///
/// Returns the first problem [`diagnose`] finds, or a name clash with a
/// loaded cell.
pub fn validate(
    descriptor: CellDescriptor,
    platform: &Platform,
    view: &dyn RegistryView,
) -> Result<ValidatedDescriptor> {
    let issues = diagnose(&descriptor, platform);
    if let Some(first) = issues.into_iter().next() {
        debug!("cell '{}' rejected: {first}", descriptor.name);
        return Err(first);
    }
    resources::check_name(&descriptor, view)?;

    let links = shmem::resolve_links(&descriptor, platform)?;
    let pins = PinClaims::collect(&descriptor, platform);
    let fingerprint = Fingerprint::compute(&cellcfg_core::to_bytes(&descriptor)?);
    debug!(
        "validated cell '{}': {} regions, {} pins, {} shmem links, fingerprint {}",
        descriptor.name,
        descriptor.memory_regions.len(),
        pins.len(),
        links.len(),
        fingerprint.short()
    );
    Ok(ValidatedDescriptor::new(descriptor, links, pins, fingerprint))
}
