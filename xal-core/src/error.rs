//! Error policy per spec.md §7: a missing category is the one fatal,
//! propagated failure. Asset load failures are reported through
//! [`Error::AssetLoad`] but `AudioManager::create_sound` still degrades to
//! `Ok(None)` rather than aborting the caller's batch load. Voice exhaustion
//! and stream underruns are not represented as error variants at all — they
//! are silent degradations logged via `tracing` (see `manager.rs` and
//! `sound_buffer.rs`).

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("category {0:?} does not exist")]
    CategoryMissing(String),
    #[error("failed to load asset: {0}")]
    AssetLoad(#[from] xal_assets::AssetError),
    #[error(transparent)]
    Backend(#[from] xal_backend::BackendError),
}

pub type Result<T> = std::result::Result<T, Error>;
