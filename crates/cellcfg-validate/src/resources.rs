//! CPU, stream id and name checks.

use std::collections::HashSet;

use cellcfg_core::layout::NAME_MAXLEN;
use cellcfg_core::CellDescriptor;
use cellcfg_platform::Platform;

use crate::error::SemanticError;

/// Read-only view of the loaded cells, consulted for name uniqueness.
pub trait RegistryView {
    /// Whether a loaded cell already uses `name`.
    fn contains_name(&self, name: &str) -> bool;
}

/// A view with no loaded cells, for offline validation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCells;

impl RegistryView for NoCells {
    fn contains_name(&self, _name: &str) -> bool {
        false
    }
}

/// Name, CPU set and stream id problems of one cell.
pub fn resource_issues(descriptor: &CellDescriptor, platform: &Platform) -> Vec<SemanticError> {
    let mut issues = Vec::new();

    let name = &descriptor.name;
    let bad_name = if name.is_empty() {
        Some("name is empty".to_string())
    } else if name.len() > NAME_MAXLEN {
        Some(format!("'{name}' is longer than {NAME_MAXLEN} bytes"))
    } else if name.contains('\0') {
        Some("name contains a NUL byte".to_string())
    } else {
        None
    };
    if let Some(detail) = bad_name {
        issues.push(SemanticError::InvalidName { detail });
    }

    if descriptor.cpu_set.is_empty() {
        issues.push(SemanticError::EmptyCpuSet);
    }
    for cpu in descriptor.cpu_set.iter() {
        if cpu >= platform.max_cpus {
            issues.push(SemanticError::CpuOutOfRange {
                cpu,
                max: platform.max_cpus,
            });
        }
    }

    let mut seen = HashSet::new();
    for (index, id) in descriptor.stream_ids.iter().enumerate() {
        if !seen.insert(*id) {
            issues.push(SemanticError::DuplicateStreamId { index, id: *id });
        }
    }

    issues
}

/// Reject a name already used by a loaded cell.
pub fn check_name(descriptor: &CellDescriptor, view: &dyn RegistryView) -> Result<(), SemanticError> {
    if view.contains_name(&descriptor.name) {
        return Err(SemanticError::NameInUse {
            name: descriptor.name.clone(),
        });
    }
    Ok(())
}
