//! Per-cell memory region checks.

use cellcfg_core::{CellDescriptor, MemFlags, MemoryRegion};
use cellcfg_platform::Platform;

use crate::error::{AddressSpace, SemanticError};

/// Half-open range overlap: `[a, a+sa)` and `[b, b+sb)`.
pub fn ranges_overlap(a: u64, sa: u64, b: u64, sb: u64) -> bool {
    a < b.saturating_add(sb) && b < a.saturating_add(sa)
}

/// Check the memory regions of one cell, stopping at the first problem.
pub fn validate_regions(
    descriptor: &CellDescriptor,
    platform: &Platform,
) -> Result<(), SemanticError> {
    match region_issues(descriptor, platform).into_iter().next() {
        Some(issue) => Err(issue),
        None => Ok(()),
    }
}

/// Every memory region problem of one cell, in table order.
pub fn region_issues(descriptor: &CellDescriptor, platform: &Platform) -> Vec<SemanticError> {
    let regions = &descriptor.memory_regions;
    let mut issues = Vec::new();

    for (index, region) in regions.iter().enumerate() {
        check_flags(index, region, platform, &mut issues);
        if region.is_comm_region() {
            if region.size == 0 {
                issues.push(SemanticError::EmptyCommRegion { region: index });
            }
        } else if region.is_placeholder() {
            continue;
        }
        check_alignment(index, region, platform, &mut issues);
        check_extent(index, region, platform, &mut issues);
    }

    check_overlaps(regions, &mut issues);

    let mut comm = descriptor.comm_regions();
    match (comm.next(), comm.next()) {
        (None, _) => issues.push(SemanticError::MissingCommRegion),
        (Some(first), Some(second)) => {
            issues.push(SemanticError::DuplicateCommRegion { first, second })
        }
        (Some(_), None) => {}
    }

    issues
}

fn check_alignment(
    index: usize,
    region: &MemoryRegion,
    platform: &Platform,
    issues: &mut Vec<SemanticError>,
) {
    let fields = [
        ("phys_start", region.phys_start),
        ("virt_start", region.virt_start),
        ("size", region.size),
    ];
    for (field, value) in fields {
        if !platform.is_page_aligned(value) {
            issues.push(SemanticError::Misaligned {
                region: index,
                field,
                value,
                page_size: platform.page_size,
            });
        }
    }
}

fn check_flags(
    index: usize,
    region: &MemoryRegion,
    platform: &Platform,
    issues: &mut Vec<SemanticError>,
) {
    let flags = region.flags;
    let mut illegal = |reason| {
        issues.push(SemanticError::IllegalFlags {
            region: index,
            flags,
            reason,
        })
    };

    if flags.contains(MemFlags::COMM_REGION) {
        if flags.contains(MemFlags::EXECUTE) {
            illegal("the comm region must not be executable");
        }
        if flags.intersects(
            MemFlags::IO | MemFlags::DMA | MemFlags::LOADABLE | MemFlags::ROOTSHARED,
        ) {
            illegal("the comm region cannot be IO, DMA, loadable or root-shared");
        }
    }
    if flags.contains(MemFlags::IO | MemFlags::DMA) && !platform.io_dma_allowed {
        illegal("IO regions cannot be DMA targets on this platform");
    }
    if flags.has_io_width() && !flags.contains(MemFlags::IO) {
        illegal("IO access width set on a non-IO region");
    }
}

fn check_extent(
    index: usize,
    region: &MemoryRegion,
    platform: &Platform,
    issues: &mut Vec<SemanticError>,
) {
    if region.virt_end().is_none() {
        issues.push(SemanticError::AddressWrap {
            region: index,
            space: AddressSpace::Virtual,
        });
    }
    // The comm region has no physical backing.
    if region.is_comm_region() {
        return;
    }
    match region.phys_end() {
        None => issues.push(SemanticError::AddressWrap {
            region: index,
            space: AddressSpace::Physical,
        }),
        Some(end) if !platform.phys_window.contains(region.phys_start, end) => {
            issues.push(SemanticError::OutsidePhysWindow {
                region: index,
                start: region.phys_start,
                end,
            })
        }
        Some(_) => {}
    }
}

fn check_overlaps(regions: &[MemoryRegion], issues: &mut Vec<SemanticError>) {
    for (i, a) in regions.iter().enumerate() {
        for (j, b) in regions.iter().enumerate().skip(i + 1) {
            if a.is_placeholder() || b.is_placeholder() || (a.is_rootshared() && b.is_rootshared())
            {
                continue;
            }
            let phys = !a.is_comm_region()
                && !b.is_comm_region()
                && ranges_overlap(a.phys_start, a.size, b.phys_start, b.size);
            if phys {
                issues.push(SemanticError::RegionOverlap {
                    space: AddressSpace::Physical,
                    first: i,
                    second: j,
                });
            }
            if ranges_overlap(a.virt_start, a.size, b.virt_start, b.size) {
                issues.push(SemanticError::RegionOverlap {
                    space: AddressSpace::Virtual,
                    first: i,
                    second: j,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellcfg_core::fixture::{self, DEMO_COMM_REGION_INDEX};

    fn demo() -> CellDescriptor {
        fixture::j7200_linux_demo()
    }

    #[test]
    fn overlap_predicate() {
        assert!(ranges_overlap(0x1000, 0x1000, 0x1800, 0x1000));
        assert!(!ranges_overlap(0x1000, 0x1000, 0x2000, 0x1000));
        assert!(!ranges_overlap(0x1000, 0, 0x1000, 0x1000));
        assert!(ranges_overlap(u64::MAX - 0xfff, 0x1000, u64::MAX - 0x7ff, 0x10));
    }

    #[test]
    fn demo_regions_valid() {
        assert_eq!(validate_regions(&demo(), &Platform::k3_j7200()), Ok(()));
        assert_eq!(
            validate_regions(&fixture::j7200_root_cell(), &Platform::k3_j7200()),
            Ok(())
        );
    }

    #[test]
    fn second_comm_region_rejected() {
        let mut cell = demo();
        cell.memory_regions[9].flags.insert(MemFlags::COMM_REGION);
        let issues = region_issues(&cell, &Platform::k3_j7200());
        assert!(issues.contains(&SemanticError::DuplicateCommRegion {
            first: 9,
            second: DEMO_COMM_REGION_INDEX,
        }));
    }

    #[test]
    fn missing_comm_region_rejected() {
        let mut cell = demo();
        cell.memory_regions[DEMO_COMM_REGION_INDEX]
            .flags
            .remove(MemFlags::COMM_REGION);
        let issues = region_issues(&cell, &Platform::k3_j7200());
        assert!(issues.contains(&SemanticError::MissingCommRegion));
    }

    #[test]
    fn executable_comm_region_rejected() {
        let mut cell = demo();
        cell.memory_regions[DEMO_COMM_REGION_INDEX]
            .flags
            .insert(MemFlags::EXECUTE);
        assert!(matches!(
            validate_regions(&cell, &Platform::k3_j7200()),
            Err(SemanticError::IllegalFlags { region: DEMO_COMM_REGION_INDEX, .. })
        ));
    }

    #[test]
    fn misaligned_comm_region_rejected() {
        let mut cell = demo();
        cell.memory_regions[DEMO_COMM_REGION_INDEX].virt_start += 0x10;
        assert_eq!(
            validate_regions(&cell, &Platform::k3_j7200()),
            Err(SemanticError::Misaligned {
                region: DEMO_COMM_REGION_INDEX,
                field: "virt_start",
                value: 0x8000_0010,
                page_size: 0x1000,
            })
        );
    }

    #[test]
    fn empty_comm_region_still_checked() {
        let mut cell = demo();
        let comm = &mut cell.memory_regions[DEMO_COMM_REGION_INDEX];
        comm.size = 0;
        comm.virt_start = 0x123;
        comm.flags
            .insert(MemFlags::EXECUTE | MemFlags::DMA | MemFlags::LOADABLE);

        let issues = region_issues(&cell, &Platform::k3_j7200());
        assert!(issues.contains(&SemanticError::EmptyCommRegion {
            region: DEMO_COMM_REGION_INDEX,
        }));
        assert!(issues.contains(&SemanticError::Misaligned {
            region: DEMO_COMM_REGION_INDEX,
            field: "virt_start",
            value: 0x123,
            page_size: 0x1000,
        }));
        let illegal = issues
            .iter()
            .filter(|i| {
                matches!(
                    i,
                    SemanticError::IllegalFlags { region: DEMO_COMM_REGION_INDEX, .. }
                )
            })
            .count();
        assert_eq!(illegal, 2);
        assert!(validate_regions(&cell, &Platform::k3_j7200()).is_err());
    }

    #[test]
    fn placeholder_flags_checked() {
        let mut cell = demo();
        cell.memory_regions[5].flags.insert(MemFlags::IO_32);
        assert!(matches!(
            validate_regions(&cell, &Platform::k3_j7200()),
            Err(SemanticError::IllegalFlags { region: 5, .. })
        ));
    }

    #[test]
    fn io_dma_depends_on_platform() {
        let mut cell = demo();
        cell.memory_regions[9].flags.insert(MemFlags::DMA);
        let mut platform = Platform::k3_j7200();
        assert!(matches!(
            validate_regions(&cell, &platform),
            Err(SemanticError::IllegalFlags { region: 9, .. })
        ));
        platform.io_dma_allowed = true;
        assert_eq!(validate_regions(&cell, &platform), Ok(()));
    }

    #[test]
    fn io_width_requires_io() {
        let mut cell = demo();
        cell.memory_regions[17].flags.insert(MemFlags::IO_32);
        assert!(matches!(
            validate_regions(&cell, &Platform::k3_j7200()),
            Err(SemanticError::IllegalFlags { region: 17, .. })
        ));
    }

    #[test]
    fn physical_overlap_rejected() {
        let mut cell = demo();
        // sdhci0 second bank onto the first
        cell.memory_regions[11].phys_start = 0x04f8_0000;
        let issues = region_issues(&cell, &Platform::k3_j7200());
        assert_eq!(
            issues,
            vec![SemanticError::RegionOverlap {
                space: AddressSpace::Physical,
                first: 10,
                second: 11,
            }]
        );
    }

    #[test]
    fn rootshared_pair_may_overlap() {
        let mut cell = demo();
        cell.memory_regions[1].phys_start = cell.memory_regions[0].phys_start;
        cell.memory_regions[1].virt_start = cell.memory_regions[0].virt_start;
        assert_eq!(validate_regions(&cell, &Platform::k3_j7200()), Ok(()));
    }

    #[test]
    fn virtual_overlap_rejected() {
        let mut cell = demo();
        cell.memory_regions[16].virt_start = 0x8000_0000;
        let issues = region_issues(&cell, &Platform::k3_j7200());
        assert!(issues.contains(&SemanticError::RegionOverlap {
            space: AddressSpace::Virtual,
            first: 16,
            second: DEMO_COMM_REGION_INDEX,
        }));
    }

    #[test]
    fn outside_window_and_wrap() {
        let mut cell = demo();
        cell.memory_regions[17].phys_start = 0x10_0000_0000;
        cell.memory_regions[9].phys_start = u64::MAX - 0xfff;
        let issues = region_issues(&cell, &Platform::k3_j7200());
        assert!(issues.contains(&SemanticError::OutsidePhysWindow {
            region: 17,
            start: 0x10_0000_0000,
            end: 0x10_6000_0000,
        }));
        assert!(issues.contains(&SemanticError::AddressWrap {
            region: 9,
            space: AddressSpace::Physical,
        }));
    }
}
