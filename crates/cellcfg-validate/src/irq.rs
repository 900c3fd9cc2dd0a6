//! Interrupt routing checks and pin claims.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use cellcfg_core::irq::PINS_PER_WORD;
use cellcfg_core::CellDescriptor;
use cellcfg_platform::Platform;
use serde::Serialize;

use crate::error::SemanticError;

/// One pin of one interrupt controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IrqPin {
    /// Controller address.
    pub chip: u64,
    pub pin: u32,
}

impl fmt::Display for IrqPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.pin, self.chip)
    }
}

/// Pins a cell routes, split into exclusive and shared (virtual INTx) pins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PinClaims {
    pub exclusive: BTreeSet<IrqPin>,
    pub shared: BTreeSet<IrqPin>,
}

impl PinClaims {
    /// Collect the pins routed by `descriptor`.
    pub fn collect(descriptor: &CellDescriptor, platform: &Platform) -> Self {
        let shared_window = platform.vpci_intx_pins(descriptor.vpci_irq_base);
        let mut claims = PinClaims::default();
        for chip in &descriptor.irqchips {
            for pin in chip.pin_bitmap.decode(chip.pin_base) {
                let claim = IrqPin {
                    chip: chip.address,
                    pin,
                };
                if shared_window.contains(&pin) {
                    claims.shared.insert(claim);
                } else {
                    claims.exclusive.insert(claim);
                }
            }
        }
        claims
    }

    pub fn len(&self) -> usize {
        self.exclusive.len() + self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exclusive.is_empty() && self.shared.is_empty()
    }

    /// First pin both cells claim where at least one side claims it
    /// exclusively.
    pub fn first_conflict(&self, other: &PinClaims) -> Option<IrqPin> {
        self.exclusive
            .iter()
            .find(|p| other.exclusive.contains(p) || other.shared.contains(p))
            .or_else(|| self.shared.iter().find(|p| other.exclusive.contains(p)))
            .copied()
    }
}

/// Check the irqchip table of one cell, stopping at the first problem.
pub fn validate_irqchips(
    descriptor: &CellDescriptor,
    platform: &Platform,
) -> Result<(), SemanticError> {
    match irq_issues(descriptor, platform).into_iter().next() {
        Some(issue) => Err(issue),
        None => Ok(()),
    }
}

/// Every interrupt routing problem of one cell, in table order.
pub fn irq_issues(descriptor: &CellDescriptor, platform: &Platform) -> Vec<SemanticError> {
    let mut issues = Vec::new();
    let mut routed: BTreeMap<u64, BTreeSet<u32>> = BTreeMap::new();

    for (index, chip) in descriptor.irqchips.iter().enumerate() {
        if chip.pin_base % PINS_PER_WORD != 0 {
            issues.push(SemanticError::PinBaseMisaligned {
                chip: index,
                pin_base: chip.pin_base,
            });
        }
        if !platform.knows_irqchip(chip.address) {
            issues.push(SemanticError::UnknownIrqChip {
                chip: index,
                address: chip.address,
            });
        }
        let seen = routed.entry(chip.address).or_default();
        for bit in chip.pin_bitmap.indices() {
            match chip.pin_base.checked_add(bit) {
                None => issues.push(SemanticError::PinOverflow {
                    chip: index,
                    pin_base: chip.pin_base,
                    bit,
                }),
                Some(pin) if pin >= platform.max_irq_pins => {
                    issues.push(SemanticError::PinOutOfRange {
                        chip: index,
                        pin,
                        max: platform.max_irq_pins,
                    })
                }
                Some(pin) => {
                    if !seen.insert(pin) {
                        issues.push(SemanticError::PinRoutedTwice { chip: index, pin });
                    }
                }
            }
        }
    }

    issues
}
