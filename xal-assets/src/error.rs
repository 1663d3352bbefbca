use thiserror::Error;

/// Sanity cap on SFX frame counts so a corrupt header can't make us try to
/// allocate an absurd `Vec`.
pub const MAX_SFX_FRAMES: u64 = 100_000_000;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("link resolution failed: {0}")]
    LinkResolution(String),
    #[error("resource limits exceeded: {0}")]
    ResourceLimit(String),
}
