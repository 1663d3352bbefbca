//! The `Decoder` trait named in spec.md §6: a single seam `xal-core` calls
//! through regardless of which codec actually produced the PCM.
//!
//! `SoundBuffer::load()` picks an implementation by file extension via
//! [`open`]. Static sounds call [`Decoder::read_all`] once; streamed sounds
//! call [`Decoder::read_chunk`] repeatedly from `StreamSound::update_stream`,
//! synchronously, on the pump thread — there is no decoder thread of its
//! own (spec.md §9: streaming is coroutine-free).

use std::path::Path;

use crate::error::AssetError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecoderMetadata {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub duration_secs: f32,
}

pub trait Decoder: Send {
    fn metadata(&self) -> DecoderMetadata;

    /// Decode the entire asset. Used for static (non-streamed) sounds.
    fn read_all(&mut self) -> Result<Vec<f32>, AssetError>;

    /// Decode up to `max_frames` interleaved frames, returning fewer (or
    /// zero) at end of stream. Used for streamed sounds, called once per
    /// pump tick.
    fn read_chunk(&mut self, max_frames: usize) -> Result<Vec<f32>, AssetError>;

    /// Seek back to the start of the decoded stream.
    fn rewind(&mut self) -> Result<(), AssetError>;
}

/// Pick a decoder for `path` by extension. `.sfx`/`.pcm` use the crate's own
/// headered PCM format; everything symphonia recognizes (Ogg Vorbis, WAV,
/// FLAC, MP3 with the right feature set, ...) goes through
/// [`crate::symphonia_decoder::SymphoniaDecoder`]. Speex (`.spx`) and M4A
/// are not implemented — symphonia has no codec for either, and a
/// dedicated one is out of scope here (see DESIGN.md).
pub fn open(path: &Path) -> Result<Box<dyn Decoder>, AssetError> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "sfx" | "pcm" => Ok(Box::new(crate::sfx_decoder::SfxDecoder::open(path)?)),
        "spx" => Err(AssetError::UnsupportedFormat(
            "Speex decoding is not implemented".into(),
        )),
        "m4a" => Err(AssetError::UnsupportedFormat(
            "M4A decoding is not implemented".into(),
        )),
        _ => Ok(Box::new(crate::symphonia_decoder::SymphoniaDecoder::open(
            path,
        )?)),
    }
}
