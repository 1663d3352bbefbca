//! Newtype identifiers used in place of the raw pointers the original
//! implementation passes between `Source` and `SoundBuffer`. Both `sounds`
//! and `sources` are owned exclusively by `AudioManager`; everything else
//! refers to them by id and resolves through the manager.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub(crate) u64);
