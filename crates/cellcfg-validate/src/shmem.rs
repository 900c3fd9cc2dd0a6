//! IVSHMEM link resolution.
//!
//! Each IVSHMEM device owns a consecutive slice of the memory region table:
//! `regions_per_peer(protocol)` regions for every peer on the link. The
//! physical start of the first backed region in the slice identifies the
//! link across cells.

use std::collections::HashMap;
use std::ops::Range;

use cellcfg_core::{Bdf, CellDescriptor, PciDevice, ShmemProtocol};
use cellcfg_platform::Platform;
use serde::Serialize;

use crate::error::{BoundsError, SemanticError, ValidationError};

/// A resolved IVSHMEM device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShmemLink {
    /// Index into the pci_devices table.
    pub device: usize,
    pub domain: u16,
    pub bdf: Bdf,
    pub protocol: ShmemProtocol,
    pub peers: u8,
    pub dev_id: u8,
    /// Slice of the memory_regions table backing the link.
    pub regions: Range<usize>,
    /// Physical start of the first backed region, used to name the link.
    pub key: u64,
}

/// Resolve the region slice of `device` (at `index`) in a table of
/// `table_len` regions.
///
/// A start index past the table fails regardless of peers and protocol.
pub fn resolve_slice(
    index: usize,
    device: &PciDevice,
    table_len: usize,
    platform: &Platform,
) -> Result<Range<usize>, BoundsError> {
    let start = u64::from(device.shmem_regions_start);
    let per_peer = u64::from(platform.regions_per_peer(device.shmem_protocol));
    let end = start + u64::from(device.shmem_peers) * per_peer;
    let out_of_bounds = BoundsError::ShmemSlice {
        device: index,
        start,
        end,
        table_len,
    };
    if start > table_len as u64 || end > table_len as u64 {
        return Err(out_of_bounds);
    }
    let start = usize::try_from(start).map_err(|_| out_of_bounds.clone())?;
    let end = usize::try_from(end).map_err(|_| out_of_bounds)?;
    Ok(start..end)
}

/// Resolve every IVSHMEM device, stopping at the first problem.
pub fn resolve_links(
    descriptor: &CellDescriptor,
    platform: &Platform,
) -> Result<Vec<ShmemLink>, ValidationError> {
    let (links, issues) = link_issues(descriptor, platform);
    match issues.into_iter().next() {
        Some(issue) => Err(issue),
        None => Ok(links),
    }
}

/// Resolve what can be resolved and report every problem.
pub fn link_issues(
    descriptor: &CellDescriptor,
    platform: &Platform,
) -> (Vec<ShmemLink>, Vec<ValidationError>) {
    let regions = &descriptor.memory_regions;
    let mut links: Vec<ShmemLink> = Vec::new();
    let mut issues: Vec<ValidationError> = Vec::new();
    let mut bdfs: HashMap<(u16, Bdf), usize> = HashMap::new();

    for (index, device) in descriptor.pci_devices.iter().enumerate() {
        if bdfs.insert((device.domain, device.bdf), index).is_some() {
            issues.push(
                SemanticError::DuplicateBdf {
                    device: index,
                    domain: device.domain,
                    bdf: device.bdf,
                }
                .into(),
            );
        }
        if !device.is_ivshmem() {
            continue;
        }

        let slice = match resolve_slice(index, device, regions.len(), platform) {
            Ok(slice) => slice,
            Err(e) => {
                issues.push(e.into());
                continue;
            }
        };
        if device.shmem_peers == 0 {
            issues.push(SemanticError::NoShmemPeers { device: index }.into());
            continue;
        }
        if device.shmem_dev_id >= device.shmem_peers {
            issues.push(
                SemanticError::ShmemDevId {
                    device: index,
                    dev_id: device.shmem_dev_id,
                    peers: device.shmem_peers,
                }
                .into(),
            );
        }

        let backing = &regions[slice.clone()];
        if backing.iter().any(|r| r.is_comm_region()) {
            issues.push(SemanticError::ShmemSliceCommRegion { device: index }.into());
        }
        let Some(key) = backing
            .iter()
            .find(|r| !r.is_placeholder())
            .map(|r| r.phys_start)
        else {
            issues.push(SemanticError::EmptyShmemSlice { device: index }.into());
            continue;
        };

        if let Some(other) = links
            .iter()
            .find(|l| l.regions.start < slice.end && slice.start < l.regions.end)
        {
            issues.push(
                SemanticError::ShmemSliceOverlap {
                    first: other.device,
                    second: index,
                }
                .into(),
            );
        }

        links.push(ShmemLink {
            device: index,
            domain: device.domain,
            bdf: device.bdf,
            protocol: device.shmem_protocol,
            peers: device.shmem_peers,
            dev_id: device.shmem_dev_id,
            regions: slice,
            key,
        });
    }

    (links, issues)
}
