//! Why a platform description could not be resolved.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// A `.platform.toml` file is not valid TOML or does not match the
    /// platform schema.
    #[error("malformed platform file: {0}")]
    Toml(#[from] toml::de::Error),

    /// `platform show --format toml` and templates go through this.
    #[error("cannot render platform as TOML: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("platform file I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("platform file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Neither a preset nor an existing file.
    #[error("unknown platform '{name}' (presets: {})", crate::Platform::PRESETS.join(", "))]
    UnknownPreset { name: String },

    /// `validate_platform` reported at least one error; `detail` joins
    /// their messages.
    #[error("inconsistent platform: {detail}")]
    Validation { detail: String },
}

pub type Result<T> = std::result::Result<T, PlatformError>;
