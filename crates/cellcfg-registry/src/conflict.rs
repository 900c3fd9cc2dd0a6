//! Cross-cell admission checks.
//!
//! A candidate may take CPUs, memory, pins and stream ids from the root
//! cell, but never from another non-root cell. Shared memory links are
//! checked against every cell, the root included.

use std::collections::BTreeSet;

use cellcfg_core::MemoryRegion;
use cellcfg_validate::{ranges_overlap, ShmemLink, ValidatedDescriptor};

use crate::error::ResourceConflictError;
use crate::handle::CellHandle;

/// An admitted cell and its reservations.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub handle: CellHandle,
    pub cell: ValidatedDescriptor,
    pub is_root: bool,
}

impl Admitted {
    pub fn name(&self) -> &str {
        self.cell.name()
    }

    fn cpus(&self) -> BTreeSet<u32> {
        self.cell.descriptor().cpu_set.iter().collect()
    }
}

/// Regions that reserve physical memory.
fn backed_regions(cell: &ValidatedDescriptor) -> impl Iterator<Item = (usize, &MemoryRegion)> {
    cell.descriptor()
        .memory_regions
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.is_placeholder() && !r.is_comm_region())
}

/// Check `candidate` against every admitted cell, returning the first clash.
pub fn check_admission(
    admitted: &[Admitted],
    candidate: &ValidatedDescriptor,
) -> Result<(), ResourceConflictError> {
    if let Some(other) = admitted.iter().find(|a| a.name() == candidate.name()) {
        return Err(ResourceConflictError::NameTaken {
            cell: other.name().to_string(),
        });
    }
    check_cpus(admitted, candidate)?;
    for other in admitted.iter().filter(|a| !a.is_root) {
        check_memory(other, candidate)?;
        check_pins(other, candidate)?;
        check_stream_ids(other, candidate)?;
    }
    check_links(admitted, candidate)
}

fn check_cpus(
    admitted: &[Admitted],
    candidate: &ValidatedDescriptor,
) -> Result<(), ResourceConflictError> {
    let wanted: BTreeSet<u32> = candidate.descriptor().cpu_set.iter().collect();
    let mut taken = wanted.clone();

    for other in admitted.iter().filter(|a| !a.is_root) {
        let owned = other.cpus();
        if let Some(&cpu) = wanted.intersection(&owned).next() {
            return Err(ResourceConflictError::Cpu {
                cpu,
                cell: other.name().to_string(),
            });
        }
        taken.extend(owned);
    }

    if let Some(root) = admitted.iter().find(|a| a.is_root) {
        if root.cpus().is_subset(&taken) {
            return Err(ResourceConflictError::RootWithoutCpu {
                cell: root.name().to_string(),
            });
        }
    }
    Ok(())
}

fn check_memory(
    other: &Admitted,
    candidate: &ValidatedDescriptor,
) -> Result<(), ResourceConflictError> {
    for (region, mine) in backed_regions(candidate) {
        let clash = backed_regions(&other.cell).any(|(_, theirs)| {
            !(mine.is_rootshared() && theirs.is_rootshared())
                && ranges_overlap(mine.phys_start, mine.size, theirs.phys_start, theirs.size)
        });
        if clash {
            return Err(ResourceConflictError::Memory {
                region,
                start: mine.phys_start,
                end: mine.phys_start.saturating_add(mine.size),
                cell: other.name().to_string(),
            });
        }
    }
    Ok(())
}

fn check_pins(
    other: &Admitted,
    candidate: &ValidatedDescriptor,
) -> Result<(), ResourceConflictError> {
    match candidate.pins().first_conflict(other.cell.pins()) {
        Some(pin) => Err(ResourceConflictError::IrqPin {
            pin,
            cell: other.name().to_string(),
        }),
        None => Ok(()),
    }
}

fn check_stream_ids(
    other: &Admitted,
    candidate: &ValidatedDescriptor,
) -> Result<(), ResourceConflictError> {
    let theirs = &other.cell.descriptor().stream_ids;
    match candidate
        .descriptor()
        .stream_ids
        .iter()
        .find(|id| theirs.contains(id))
    {
        Some(&id) => Err(ResourceConflictError::StreamId {
            id,
            cell: other.name().to_string(),
        }),
        None => Ok(()),
    }
}

/// Backed regions of one link's shared memory slice.
fn link_regions<'a>(
    cell: &'a ValidatedDescriptor,
    link: &ShmemLink,
) -> impl Iterator<Item = &'a MemoryRegion> {
    cell.descriptor()
        .memory_regions
        .get(link.regions.clone())
        .into_iter()
        .flatten()
        .filter(|r| !r.is_placeholder())
}

/// Two links share memory when any of their backed regions overlap.
fn links_overlap(
    a: &ValidatedDescriptor,
    la: &ShmemLink,
    b: &ValidatedDescriptor,
    lb: &ShmemLink,
) -> bool {
    link_regions(a, la).any(|ra| {
        link_regions(b, lb)
            .any(|rb| ranges_overlap(ra.phys_start, ra.size, rb.phys_start, rb.size))
    })
}

fn check_links(
    admitted: &[Admitted],
    candidate: &ValidatedDescriptor,
) -> Result<(), ResourceConflictError> {
    for link in candidate.links() {
        let peers_on_link: Vec<(&Admitted, &ShmemLink)> = admitted
            .iter()
            .filter_map(|a| {
                a.cell
                    .links()
                    .iter()
                    .find(|l| links_overlap(candidate, link, &a.cell, l))
                    .map(|l| (a, l))
            })
            .collect();

        for (other, theirs) in &peers_on_link {
            if theirs.peers != link.peers || theirs.protocol != link.protocol {
                return Err(ResourceConflictError::ShmemMismatch {
                    device: link.device,
                    key: link.key,
                    cell: other.name().to_string(),
                    detail: format!(
                        "{} peers over {} here, {} peers over {} there",
                        link.peers, link.protocol, theirs.peers, theirs.protocol
                    ),
                });
            }
        }

        if let Some((first, _)) = peers_on_link.first() {
            if peers_on_link.len() >= usize::from(link.peers) {
                return Err(ResourceConflictError::ShmemFull {
                    device: link.device,
                    key: link.key,
                    peers: link.peers,
                    cell: first.name().to_string(),
                });
            }
        }

        for (other, theirs) in peers_on_link {
            if theirs.dev_id == link.dev_id {
                return Err(ResourceConflictError::ShmemDevId {
                    device: link.device,
                    key: link.key,
                    dev_id: link.dev_id,
                    cell: other.name().to_string(),
                });
            }
        }
    }
    Ok(())
}
