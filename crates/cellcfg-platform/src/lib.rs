//! Platform limits for cell descriptor validation.
//!
//! A platform supplies the hardware constants a descriptor is checked
//! against: page size, CPU count, interrupt controller size, the valid
//! physical address window and the per-protocol shared memory layout.
//! Platforms come from built-in presets or `.platform.toml` files.

pub mod error;
pub mod parse;
pub mod platform;

pub use error::{PlatformError, Result};
pub use parse::{
    discover_platforms, generate_template, load_platform_toml, parse_platform_toml,
    platform_to_toml, resolve_platform, validate_platform, ValidationIssue,
};
pub use platform::{PhysWindow, Platform, RegionsPerPeer, ShmemModel};
