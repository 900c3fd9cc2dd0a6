//! TOML parsing, serialization, validation and discovery for platform definitions.
//!
//! Platform definitions are stored as `.platform.toml` files. A platform
//! can also be named by one of the built-in presets.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{PlatformError, Result};
use crate::platform::Platform;

/// File suffix of platform definitions.
pub const PLATFORM_SUFFIX: &str = ".platform.toml";

/// A validation issue found in a platform definition.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity: "error" or "warning".
    pub severity: &'static str,
    /// Human-readable description.
    pub message: String,
}

impl ValidationIssue {
    fn error(message: String) -> Self {
        Self {
            severity: "error",
            message,
        }
    }

    fn warning(message: String) -> Self {
        Self {
            severity: "warning",
            message,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == "error"
    }
}

/// Load a platform from a `.platform.toml` file.
pub fn load_platform_toml(path: &Path) -> Result<Platform> {
    if !path.exists() {
        return Err(PlatformError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    let platform = parse_platform_toml(&content)?;
    debug!("loaded platform '{}' from {}", platform.name, path.display());
    Ok(platform)
}

/// Parse a platform from a TOML string.
pub fn parse_platform_toml(toml_str: &str) -> Result<Platform> {
    let platform: Platform = toml::from_str(toml_str)?;
    Ok(platform)
}

/// Serialize a platform to pretty TOML.
pub fn platform_to_toml(platform: &Platform) -> Result<String> {
    let toml_str = toml::to_string_pretty(platform)?;
    Ok(toml_str)
}

/// Resolve a preset name or a path to a platform file, then reject it if
/// validation reports any error.
pub fn resolve_platform(name_or_path: &str) -> Result<Platform> {
    let platform = match Platform::preset(name_or_path) {
        Some(platform) => platform,
        None => {
            let path = Path::new(name_or_path);
            if !path.exists() {
                return Err(PlatformError::UnknownPreset {
                    name: name_or_path.into(),
                });
            }
            load_platform_toml(path)?
        }
    };
    if let Err(issues) = validate_platform(&platform) {
        let errors: Vec<String> = issues
            .iter()
            .filter(|i| i.is_error())
            .map(|i| i.message.clone())
            .collect();
        if !errors.is_empty() {
            return Err(PlatformError::Validation {
                detail: errors.join("; "),
            });
        }
    }
    Ok(platform)
}

/// Validate a platform definition for internal consistency.
///
/// Returns `Ok(())` if valid, or `Err(issues)` with a list of problems.
pub fn validate_platform(platform: &Platform) -> std::result::Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    // 1. Page size is a power of two
    if !platform.page_size.is_power_of_two() {
        issues.push(ValidationIssue::error(format!(
            "page-size {:#x} is not a power of two",
            platform.page_size
        )));
    }

    // 2. At least one CPU
    if platform.max_cpus == 0 {
        issues.push(ValidationIssue::error("max-cpus is 0".into()));
    }

    // 3. Interrupt space covers whole bitmap words
    if platform.max_irq_pins == 0 {
        issues.push(ValidationIssue::error("max-irq-pins is 0".into()));
    } else if platform.max_irq_pins % 32 != 0 {
        issues.push(ValidationIssue::warning(format!(
            "max-irq-pins {} is not a multiple of 32",
            platform.max_irq_pins
        )));
    }

    // 4. Physical window is non-empty and page aligned
    let window = platform.phys_window;
    if window.start >= window.end {
        issues.push(ValidationIssue::error(format!(
            "phys-window {:#x}..{:#x} is empty",
            window.start, window.end
        )));
    }
    if platform.page_size.is_power_of_two()
        && !(platform.is_page_aligned(window.start) && platform.is_page_aligned(window.end))
    {
        issues.push(ValidationIssue::warning(format!(
            "phys-window {:#x}..{:#x} is not page aligned",
            window.start, window.end
        )));
    }

    // 5. Every protocol contributes at least one region per peer
    for (protocol, count) in platform.shmem.regions_per_peer.entries() {
        if count == 0 {
            issues.push(ValidationIssue::error(format!(
                "regions-per-peer for '{protocol}' is 0"
            )));
        }
    }

    // 6. Interrupt controllers are listed once
    let mut seen = BTreeSet::new();
    for address in &platform.irqchip_addresses {
        if !seen.insert(*address) {
            issues.push(ValidationIssue::error(format!(
                "irqchip address {address:#x} listed twice"
            )));
        }
    }

    // 7. The vPCI window fits the interrupt space for some base
    if platform.vpci_irq_pin_offset >= platform.max_irq_pins {
        issues.push(ValidationIssue::warning(format!(
            "vpci-irq-pin-offset {} is beyond max-irq-pins {}",
            platform.vpci_irq_pin_offset, platform.max_irq_pins
        )));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

/// Generate a template `.platform.toml` for a new board.
///
/// Seeds from the generic-arm64 preset with the given name.
pub fn generate_template(name: &str) -> Result<String> {
    let mut platform = Platform::generic_arm64();
    platform.name = name.into();
    platform.version = "0.1.0".into();
    platform_to_toml(&platform)
}

/// Discover all `.platform.toml` files in a directory.
///
/// Returns a list of (platform_name, file_path) pairs sorted by name.
pub fn discover_platforms(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut platforms = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(PLATFORM_SUFFIX))
            .map(str::to_string);
        if let Some(name) = name {
            platforms.push((name, path));
        }
    }
    platforms.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(platforms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_presets() {
        for name in Platform::PRESETS {
            let original = Platform::preset(name).unwrap();
            let toml_str = platform_to_toml(&original).unwrap();
            let parsed = parse_platform_toml(&toml_str).unwrap();
            assert_eq!(original, parsed);
        }
    }

    #[test]
    fn parse_minimal_toml() {
        let toml_str = r#"
name = "minimal-board"
version = "1.0"
page-size = 4096
max-cpus = 4
max-irq-pins = 256

[phys-window]
start = 0
end = 0x100000000

[shmem.regions-per-peer]
undefined = 4
veth = 3
custom = 1
virtio-front = 1
virtio-back = 1
"#;
        let platform = parse_platform_toml(toml_str).unwrap();
        assert_eq!(platform.name, "minimal-board");
        assert_eq!(platform.vpci_irq_pin_offset, 32);
        assert!(!platform.io_dma_allowed);
        assert!(platform.irqchip_addresses.is_empty());
        assert_eq!(
            platform.regions_per_peer(cellcfg_core::ShmemProtocol::Veth),
            3
        );
        assert!(validate_platform(&platform).is_ok());
    }

    #[test]
    fn parse_invalid_returns_error() {
        assert!(parse_platform_toml("this is not valid toml [[[").is_err());
    }

    #[test]
    fn parse_missing_field_returns_error() {
        assert!(parse_platform_toml("name = \"incomplete\"\n").is_err());
    }

    #[test]
    fn validate_presets() {
        assert!(validate_platform(&Platform::generic_arm64()).is_ok());
        assert!(validate_platform(&Platform::k3_j7200()).is_ok());
    }

    #[test]
    fn validate_bad_page_size() {
        let mut platform = Platform::k3_j7200();
        platform.page_size = 0x1800;
        let issues = validate_platform(&platform).unwrap_err();
        assert!(issues.iter().any(|i| i.message.contains("power of two")));
    }

    #[test]
    fn validate_empty_window() {
        let mut platform = Platform::k3_j7200();
        platform.phys_window.end = platform.phys_window.start;
        let issues = validate_platform(&platform).unwrap_err();
        assert!(issues.iter().any(|i| i.message.contains("is empty")));
    }

    #[test]
    fn validate_zero_regions_per_peer() {
        let mut platform = Platform::k3_j7200();
        platform.shmem.regions_per_peer.veth = 0;
        let issues = validate_platform(&platform).unwrap_err();
        assert!(issues.iter().any(|i| i.message.contains("'veth'")));
    }

    #[test]
    fn validate_duplicate_irqchip() {
        let mut platform = Platform::k3_j7200();
        platform.irqchip_addresses.push(0x0180_0000);
        let issues = validate_platform(&platform).unwrap_err();
        assert!(issues.iter().any(|i| i.message.contains("listed twice")));
    }

    #[test]
    fn odd_pin_count_is_only_a_warning() {
        let mut platform = Platform::k3_j7200();
        platform.max_irq_pins = 970;
        let issues = validate_platform(&platform).unwrap_err();
        assert!(issues.iter().all(|i| !i.is_error()));
    }

    #[test]
    fn generate_template_is_valid() {
        let toml_str = generate_template("my-board").unwrap();
        let platform = parse_platform_toml(&toml_str).unwrap();
        assert_eq!(platform.name, "my-board");
        assert_eq!(platform.version, "0.1.0");
        assert!(validate_platform(&platform).is_ok());
    }

    #[test]
    fn discover_platforms_finds_files() {
        let dir = tempfile::tempdir().unwrap();
        let template = generate_template("board-a").unwrap();
        std::fs::write(dir.path().join("board-b.platform.toml"), &template).unwrap();
        std::fs::write(dir.path().join("board-a.platform.toml"), &template).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let platforms = discover_platforms(dir.path()).unwrap();
        assert_eq!(platforms.len(), 2);
        assert_eq!(platforms[0].0, "board-a");
        assert_eq!(platforms[1].0, "board-b");
    }

    #[test]
    fn discover_missing_dir() {
        let platforms = discover_platforms(Path::new("/nonexistent/platforms")).unwrap();
        assert!(platforms.is_empty());
    }

    #[test]
    fn load_not_found() {
        let result = load_platform_toml(Path::new("/nonexistent/board.platform.toml"));
        assert!(matches!(result.unwrap_err(), PlatformError::NotFound { .. }));
    }

    #[test]
    fn resolve_preset_and_file() {
        assert_eq!(resolve_platform("k3-j7200").unwrap(), Platform::k3_j7200());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.platform.toml");
        std::fs::write(&path, generate_template("custom").unwrap()).unwrap();
        let platform = resolve_platform(path.to_str().unwrap()).unwrap();
        assert_eq!(platform.name, "custom");
    }

    #[test]
    fn resolve_unknown() {
        assert!(matches!(
            resolve_platform("no-such-board"),
            Err(PlatformError::UnknownPreset { .. })
        ));
    }

    #[test]
    fn resolve_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.platform.toml");
        let mut platform = Platform::generic_arm64();
        platform.max_cpus = 0;
        std::fs::write(&path, platform_to_toml(&platform).unwrap()).unwrap();
        assert!(matches!(
            resolve_platform(path.to_str().unwrap()),
            Err(PlatformError::Validation { .. })
        ));
    }
}
