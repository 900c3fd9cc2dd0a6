//! The registry of admitted cells.

use std::collections::HashMap;

use cellcfg_core::parse;
use cellcfg_platform::Platform;
use cellcfg_validate::{validate, Fingerprint, RegistryView, ValidatedDescriptor};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;

use crate::conflict::{check_admission, Admitted};
use crate::error::{LoadFailure, RegistryError, ResourceConflictError, Result};
use crate::handle::{CellHandle, CellState};

/// One admitted cell, as reported by [`Registry::cells`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellSummary {
    pub handle: CellHandle,
    pub name: String,
    pub is_root: bool,
    pub cpus: Vec<u32>,
    pub memory_regions: usize,
    pub irq_pins: usize,
    pub shmem_links: usize,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Default)]
struct Inner {
    /// Admitted cells in admission order; the root, if any, is first.
    cells: Vec<Admitted>,
    /// Cells that are not `Unloaded`, by name.
    states: HashMap<String, CellState>,
}

impl Inner {
    fn state(&self, name: &str) -> CellState {
        self.states.get(name).copied().unwrap_or_default()
    }

    fn advance(&mut self, name: &str, target: CellState) {
        let current = self.state(name);
        debug_assert!(
            current.can_transition_to(target),
            "invalid transition {current} -> {target} for '{name}'"
        );
        debug!("cell '{name}': {current} -> {target}");
        if target == CellState::Unloaded {
            self.states.remove(name);
        } else {
            self.states.insert(name.to_string(), target);
        }
    }
}

/// Admitted cells and their reserved resources.
///
/// All mutation goes through one mutex, so concurrent `register` and
/// `unregister` calls are applied one at a time against a consistent view.
#[derive(Debug, Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a validated cell and reserve its resources.
    ///
    /// The first admitted cell becomes the root cell. On error nothing is
    /// reserved and admitted cells are unaffected.
    pub fn register(
        &self,
        validated: ValidatedDescriptor,
    ) -> std::result::Result<CellHandle, ResourceConflictError> {
        self.admit(validated, CellState::Unloaded)
    }

    /// Admit `validated` if its name is currently in state `expected`.
    fn admit(
        &self,
        validated: ValidatedDescriptor,
        expected: CellState,
    ) -> std::result::Result<CellHandle, ResourceConflictError> {
        let mut inner = self.inner.lock();
        let name = validated.name().to_string();
        let conflict = if inner.state(&name) != expected {
            Err(ResourceConflictError::NameTaken { cell: name.clone() })
        } else {
            check_admission(&inner.cells, &validated)
        };
        if let Err(conflict) = conflict {
            warn!("cell '{name}' not admitted: {conflict}");
            return Err(conflict);
        }

        if expected == CellState::Unloaded {
            inner.advance(&name, CellState::Loading);
        }
        inner.advance(&name, CellState::Loaded);

        let handle = CellHandle::new();
        let is_root = inner.cells.is_empty();
        info!(
            "admitted {}cell '{name}' as {handle} (fingerprint {})",
            if is_root { "root " } else { "" },
            validated.fingerprint().short()
        );
        inner.cells.push(Admitted {
            handle,
            cell: validated,
            is_root,
        });
        Ok(handle)
    }

    /// Release an admitted cell and everything it reserved.
    ///
    /// The root cell can only be released once it is the last cell.
    pub fn unregister(&self, handle: CellHandle) -> Result<()> {
        let mut inner = self.inner.lock();
        let index = inner
            .cells
            .iter()
            .position(|a| a.handle == handle)
            .ok_or(RegistryError::UnknownHandle { handle })?;

        let remaining = inner.cells.len() - 1;
        if inner.cells[index].is_root && remaining > 0 {
            return Err(RegistryError::RootCellBusy {
                root: inner.cells[index].name().to_string(),
                remaining,
            });
        }

        let released = inner.cells.remove(index);
        let name = released.name().to_string();
        inner.advance(&name, CellState::Unloading);
        inner.advance(&name, CellState::Unloaded);
        info!("released cell '{name}' ({handle})");
        Ok(())
    }

    /// Parse, validate and admit a raw descriptor.
    ///
    /// Parsing and validation run without holding the registry lock; the
    /// cell is `Loading` meanwhile and returns to `Unloaded` on failure.
    pub fn load(
        &self,
        bytes: &[u8],
        platform: &Platform,
    ) -> std::result::Result<CellHandle, LoadFailure> {
        let descriptor = parse(bytes)?;
        let name = descriptor.name.clone();
        {
            let mut inner = self.inner.lock();
            if inner.state(&name) != CellState::Unloaded {
                return Err(ResourceConflictError::NameTaken { cell: name }.into());
            }
            inner.advance(&name, CellState::Loading);
        }

        let result = validate(descriptor, platform, self)
            .map_err(LoadFailure::from)
            .and_then(|validated| {
                self.admit(validated, CellState::Loading)
                    .map_err(LoadFailure::from)
            });

        if let Err(e) = &result {
            warn!("loading '{name}' failed: {e}");
            self.inner.lock().advance(&name, CellState::Unloaded);
        }
        result
    }

    /// Lifecycle state of the cell called `name`.
    pub fn state(&self, name: &str) -> CellState {
        self.inner.lock().state(name)
    }

    pub fn is_root(&self, handle: CellHandle) -> bool {
        self.inner
            .lock()
            .cells
            .iter()
            .any(|a| a.handle == handle && a.is_root)
    }

    pub fn root(&self) -> Option<CellHandle> {
        self.inner
            .lock()
            .cells
            .iter()
            .find(|a| a.is_root)
            .map(|a| a.handle)
    }

    /// The validated descriptor behind `handle`.
    pub fn get(&self, handle: CellHandle) -> Option<ValidatedDescriptor> {
        self.inner
            .lock()
            .cells
            .iter()
            .find(|a| a.handle == handle)
            .map(|a| a.cell.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().cells.is_empty()
    }

    /// Summaries of every admitted cell in admission order.
    pub fn cells(&self) -> Vec<CellSummary> {
        self.inner
            .lock()
            .cells
            .iter()
            .map(|a| {
                let descriptor = a.cell.descriptor();
                CellSummary {
                    handle: a.handle,
                    name: a.name().to_string(),
                    is_root: a.is_root,
                    cpus: descriptor.cpu_set.iter().collect(),
                    memory_regions: descriptor.memory_regions.len(),
                    irq_pins: a.cell.pins().len(),
                    shmem_links: a.cell.links().len(),
                    fingerprint: a.cell.fingerprint().clone(),
                }
            })
            .collect()
    }
}

impl RegistryView for Registry {
    fn contains_name(&self, name: &str) -> bool {
        self.inner.lock().cells.iter().any(|a| a.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use cellcfg_core::fixture;
    use cellcfg_core::{
        to_bytes, Bdf, CellDescriptor, CpuSet, MemFlags, MemoryRegion, PciDevice, ShmemProtocol,
        StreamId,
    };
    use cellcfg_platform::RegionsPerPeer;
    use cellcfg_validate::{NoCells, ValidationError};

    fn platform() -> Platform {
        Platform::generic_arm64()
    }

    fn validated(cell: CellDescriptor) -> ValidatedDescriptor {
        validate(cell, &platform(), &NoCells).unwrap()
    }

    fn root() -> ValidatedDescriptor {
        let mut cell = fixture::j7200_root_cell();
        cell.cpu_set = CpuSet::from_cpus(0..4);
        validated(cell)
    }

    fn demo() -> ValidatedDescriptor {
        validated(fixture::j7200_linux_demo())
    }

    /// A cell with private RAM at `ram` and nothing else.
    fn bare(name: &str, cpu: u32, ram: u64) -> CellDescriptor {
        let mut cell = CellDescriptor::new(name);
        cell.cpu_set = CpuSet::from_cpus([cpu]);
        cell.memory_regions = vec![
            MemoryRegion::identity(
                ram,
                0x10_0000,
                MemFlags::READ | MemFlags::WRITE | MemFlags::EXECUTE,
            ),
            MemoryRegion::comm_region(0x8000_0000, 0x1000),
        ];
        cell
    }

    fn with_root_and_demo() -> (Registry, CellHandle, CellHandle) {
        let registry = Registry::new();
        let root = registry.register(root()).unwrap();
        let demo = registry.register(demo()).unwrap();
        (registry, root, demo)
    }

    #[test]
    fn first_cell_is_root() {
        let (registry, root, demo) = with_root_and_demo();
        assert!(registry.is_root(root));
        assert!(!registry.is_root(demo));
        assert_eq!(registry.root(), Some(root));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.state("k3-j7200-evm-linux-demo"), CellState::Loaded);
    }

    #[test]
    fn cross_cell_memory_conflict_leaves_first_cell_intact() {
        let (registry, _, demo) = with_root_and_demo();
        // uart1 of the demo cell
        let intruder = bare("intruder", 2, 0x0281_0000);

        let err = registry.register(validated(intruder)).unwrap_err();
        assert!(matches!(err, ResourceConflictError::Memory { region: 0, .. }));
        assert_eq!(err.cell(), "k3-j7200-evm-linux-demo");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.state("intruder"), CellState::Unloaded);
        assert_eq!(registry.state("k3-j7200-evm-linux-demo"), CellState::Loaded);
        assert_eq!(
            registry.get(demo).map(|c| c.descriptor().clone()),
            Some(fixture::j7200_linux_demo())
        );
    }

    #[test]
    fn root_memory_may_be_taken() {
        let (registry, _, _) = with_root_and_demo();
        // inside the root cell's first RAM bank
        let cell = bare("guest", 2, 0x9000_0000);
        assert!(registry.register(validated(cell)).is_ok());
    }

    #[test]
    fn cpu_conflicts() {
        let (registry, _, _) = with_root_and_demo();
        let err = registry
            .register(validated(bare("guest", 1, 0x9000_0000)))
            .unwrap_err();
        assert_eq!(
            err,
            ResourceConflictError::Cpu {
                cpu: 1,
                cell: "k3-j7200-evm-linux-demo".into()
            }
        );
    }

    #[test]
    fn root_keeps_a_cpu() {
        let registry = Registry::new();
        let mut small_root = fixture::j7200_root_cell();
        small_root.cpu_set = CpuSet::from_cpus([0, 1]);
        registry.register(validated(small_root)).unwrap();
        registry.register(demo()).unwrap();

        let err = registry
            .register(validated(bare("guest", 0, 0x9000_0000)))
            .unwrap_err();
        assert_eq!(
            err,
            ResourceConflictError::RootWithoutCpu {
                cell: "k3-j7200-evm".into()
            }
        );
    }

    #[test]
    fn pin_and_stream_id_conflicts() {
        let (registry, _, _) = with_root_and_demo();

        let mut pins = bare("pins", 2, 0x9000_0000);
        pins.irqchips = vec![fixture::j7200_linux_demo().irqchips[0]];
        let err = registry.register(validated(pins)).unwrap_err();
        assert!(matches!(err, ResourceConflictError::IrqPin { .. }));

        let mut streams = bare("streams", 2, 0x9000_0000);
        streams.stream_ids = vec![StreamId(0x0003)];
        let err = registry.register(validated(streams)).unwrap_err();
        assert_eq!(
            err,
            ResourceConflictError::StreamId {
                id: StreamId(0x0003),
                cell: "k3-j7200-evm-linux-demo".into()
            }
        );

        // the root cell's stream ids are free to take
        let mut from_root = bare("from-root", 2, 0x9000_0000);
        from_root.stream_ids = vec![StreamId(0x0001)];
        assert!(registry.register(validated(from_root)).is_ok());
    }

    /// A third cell on the demo cell's IVSHMEM links.
    fn third_peer(peers: u8, dev_id: u8) -> ValidatedDescriptor {
        let demo = fixture::j7200_linux_demo();
        let mut cell = bare("third", 2, 0x9000_0000);
        let mut regions = demo.memory_regions[..8].to_vec();
        regions.extend(cell.memory_regions);
        cell.memory_regions = regions;
        cell.pci_devices = demo.pci_devices;
        for device in &mut cell.pci_devices {
            device.shmem_peers = peers;
            device.shmem_dev_id = dev_id;
        }
        // keep both slices four regions long
        let mut platform = platform();
        platform.shmem.regions_per_peer = RegionsPerPeer::uniform(if peers == 2 { 2 } else { 1 });
        validate(cell, &platform, &NoCells).unwrap()
    }

    #[test]
    fn shmem_link_rules() {
        let registry = Registry::new();
        registry.register(root()).unwrap();

        let err = registry.register(third_peer(2, 0)).unwrap_err();
        assert!(matches!(err, ResourceConflictError::ShmemDevId { dev_id: 0, .. }));
        assert_eq!(err.cell(), "k3-j7200-evm");

        let err = registry.register(third_peer(4, 1)).unwrap_err();
        assert!(matches!(err, ResourceConflictError::ShmemMismatch { .. }));

        registry.register(demo()).unwrap();
        let err = registry.register(third_peer(2, 1)).unwrap_err();
        assert!(matches!(err, ResourceConflictError::ShmemFull { peers: 2, .. }));
    }

    #[test]
    fn link_matched_by_overlapping_range() {
        let (registry, _, _) = with_root_and_demo();
        let demo = fixture::j7200_linux_demo();

        // Starts one region into the demo's first link.
        let mut rogue = bare("rogue", 2, 0x9000_0000);
        let mut regions = demo.memory_regions[1..3].to_vec();
        regions.extend(rogue.memory_regions);
        rogue.memory_regions = regions;
        rogue.pci_devices = vec![PciDevice::ivshmem(
            4,
            Bdf(2 << 3),
            0,
            0,
            1,
            ShmemProtocol::Custom(5),
        )];
        let mut platform = platform();
        platform.shmem.regions_per_peer = RegionsPerPeer::uniform(2);
        let rogue = validate(rogue, &platform, &NoCells).unwrap();
        assert_eq!(rogue.links()[0].key, 0x8_9fe1_0000);

        let err = registry.register(rogue).unwrap_err();
        assert!(matches!(err, ResourceConflictError::ShmemMismatch { .. }), "{err}");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn register_unregister_register() {
        let (registry, _, demo_handle) = with_root_and_demo();
        let before = registry.cells();

        registry.unregister(demo_handle).unwrap();
        assert_eq!(registry.state("k3-j7200-evm-linux-demo"), CellState::Unloaded);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(demo_handle).is_none());

        let again = registry.register(demo()).unwrap();
        let after = registry.cells();
        assert_eq!(after.len(), before.len());
        assert_eq!(after[1].name, before[1].name);
        assert_eq!(after[1].cpus, before[1].cpus);
        assert_eq!(after[1].fingerprint, before[1].fingerprint);
        assert_eq!(after[1].handle, again);
    }

    #[test]
    fn unregister_errors() {
        let (registry, root, demo) = with_root_and_demo();
        assert!(matches!(
            registry.unregister(root),
            Err(RegistryError::RootCellBusy { remaining: 1, .. })
        ));
        registry.unregister(demo).unwrap();
        assert_eq!(
            registry.unregister(demo),
            Err(RegistryError::UnknownHandle { handle: demo })
        );
        registry.unregister(root).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn name_taken() {
        let (registry, _, _) = with_root_and_demo();
        let err = registry.register(demo()).unwrap_err();
        assert_eq!(
            err,
            ResourceConflictError::NameTaken {
                cell: "k3-j7200-evm-linux-demo".into()
            }
        );
        assert!(registry.contains_name("k3-j7200-evm"));
    }

    #[test]
    fn load_from_bytes() {
        let registry = Registry::new();
        registry.register(root()).unwrap();
        let bytes = to_bytes(&fixture::j7200_linux_demo()).unwrap();

        let handle = registry.load(&bytes, &platform()).unwrap();
        assert_eq!(registry.state("k3-j7200-evm-linux-demo"), CellState::Loaded);
        assert!(!registry.is_root(handle));

        let err = registry.load(&bytes, &platform()).unwrap_err();
        assert!(matches!(
            err,
            LoadFailure::Conflict(ResourceConflictError::NameTaken { .. })
        ));
        assert_eq!(registry.state("k3-j7200-evm-linux-demo"), CellState::Loaded);
    }

    #[test]
    fn failed_load_leaves_nothing_behind() {
        let registry = Registry::new();
        registry.register(root()).unwrap();

        let mut broken = fixture::j7200_linux_demo();
        broken.pci_devices[1].shmem_regions_start = 100;
        let err = registry
            .load(&to_bytes(&broken).unwrap(), &platform())
            .unwrap_err();
        assert!(matches!(
            err,
            LoadFailure::Validation(ValidationError::Bounds(_))
        ));
        assert_eq!(registry.state("k3-j7200-evm-linux-demo"), CellState::Unloaded);
        assert_eq!(registry.len(), 1);

        let err = registry.load(b"not a cell", &platform()).unwrap_err();
        assert!(matches!(err, LoadFailure::Load(_)));
    }

    #[test]
    fn concurrent_registrations_are_serialized() {
        let registry = Registry::new();
        registry.register(root()).unwrap();
        let admitted = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for i in 0..8 {
                let registry = &registry;
                let admitted = &admitted;
                s.spawn(move || {
                    // every candidate wants cpu 2
                    let cell = bare(&format!("guest-{i}"), 2, 0x9000_0000 + i * 0x10_0000);
                    if registry.register(validated(cell)).is_ok() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn summaries_serialize() {
        let (registry, _, _) = with_root_and_demo();
        let json = serde_json::to_value(registry.cells()).unwrap();
        assert_eq!(json[0]["is_root"], true);
        assert_eq!(json[1]["cpus"], serde_json::json!([1]));
        assert_eq!(json[1]["shmem_links"], 2);
    }
}
