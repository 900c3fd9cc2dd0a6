//! The immutable result of a successful validation.

use std::fmt;

use cellcfg_core::CellDescriptor;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::irq::PinClaims;
use crate::shmem::ShmemLink;

/// SHA-256 of an encoded descriptor, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of the given bytes.
    pub fn compute(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Fingerprint(digest.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines and tables.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }

    /// Whether `data` hashes to this fingerprint.
    pub fn verify(&self, data: &[u8]) -> bool {
        Fingerprint::compute(data) == *self
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A descriptor that passed every per-cell check.
///
/// Only [`crate::validate`] constructs one, and nothing can change it
/// afterwards.
#[derive(Debug, Clone)]
pub struct ValidatedDescriptor {
    descriptor: CellDescriptor,
    links: Vec<ShmemLink>,
    pins: PinClaims,
    fingerprint: Fingerprint,
}

impl ValidatedDescriptor {
    pub(crate) fn new(
        descriptor: CellDescriptor,
        links: Vec<ShmemLink>,
        pins: PinClaims,
        fingerprint: Fingerprint,
    ) -> Self {
        Self {
            descriptor,
            links,
            pins,
            fingerprint,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &CellDescriptor {
        &self.descriptor
    }

    /// Resolved IVSHMEM links, in pci_devices order.
    pub fn links(&self) -> &[ShmemLink] {
        &self.links
    }

    pub fn pins(&self) -> &PinClaims {
        &self.pins
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}
