//! Asset-side collaborators for xal: the `Decoder` trait and its two
//! implementations, filesystem enumeration for `createSoundsFromPath`, and
//! link-file resolution. `xal-core` depends on this crate only through
//! [`Decoder`]/[`open`]/[`fs_walk::discover`]/[`link`] — it never names
//! `symphonia` directly.

pub mod decoder;
pub mod error;
pub mod fs_walk;
pub mod link;
pub mod sfx;
pub mod sfx_decoder;
pub mod symphonia_decoder;

pub use decoder::{open, Decoder, DecoderMetadata};
pub use error::AssetError;
pub use fs_walk::{discover, DiscoveredSound};
