//! Cell handles and the cell lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque token for an admitted cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellHandle(Uuid);

impl CellHandle {
    pub(crate) fn new() -> Self {
        CellHandle(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CellHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a named cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellState {
    #[default]
    Unloaded,
    /// Parse, validation and registration in progress.
    Loading,
    Loaded,
    Unloading,
}

impl CellState {
    /// Valid transitions from this state.
    pub fn valid_transitions(&self) -> &'static [CellState] {
        use CellState::*;
        match self {
            Unloaded => &[Loading],
            Loading => &[Loaded, Unloaded],
            Loaded => &[Unloading],
            Unloading => &[Unloaded],
        }
    }

    /// Check if a transition to the target state is valid.
    pub fn can_transition_to(&self, target: CellState) -> bool {
        self.valid_transitions().contains(&target)
    }
}

impl fmt::Display for CellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellState::Unloaded => write!(f, "UNLOADED"),
            CellState::Loading => write!(f, "LOADING"),
            CellState::Loaded => write!(f, "LOADED"),
            CellState::Unloading => write!(f, "UNLOADING"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        assert!(CellState::Unloaded.can_transition_to(CellState::Loading));
        assert!(CellState::Loading.can_transition_to(CellState::Loaded));
        assert!(CellState::Loading.can_transition_to(CellState::Unloaded));
        assert!(CellState::Loaded.can_transition_to(CellState::Unloading));
        assert!(CellState::Unloading.can_transition_to(CellState::Unloaded));

        assert!(!CellState::Unloaded.can_transition_to(CellState::Loaded));
        assert!(!CellState::Loaded.can_transition_to(CellState::Unloaded));
        assert!(!CellState::Loaded.can_transition_to(CellState::Loading));
    }

    #[test]
    fn handles_are_unique() {
        assert_ne!(CellHandle::new(), CellHandle::new());
    }

    #[test]
    fn state_display() {
        assert_eq!(CellState::Loading.to_string(), "LOADING");
    }
}
