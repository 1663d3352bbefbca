//! Decoder for the crate's own headered PCM format (`.sfx`/`.pcm`), parsed
//! by [`crate::sfx::SfxBlob`].

use std::path::Path;

use crate::decoder::{Decoder, DecoderMetadata};
use crate::error::AssetError;
use crate::sfx::SfxBlob;

pub struct SfxDecoder {
    blob: SfxBlob,
    cursor_frames: usize,
}

impl SfxDecoder {
    pub fn open(path: &Path) -> Result<Self, AssetError> {
        let bytes = std::fs::read(path)?;
        let blob = SfxBlob::from_sfx_bytes(&bytes)?;
        Ok(SfxDecoder {
            blob,
            cursor_frames: 0,
        })
    }
}

impl Decoder for SfxDecoder {
    fn metadata(&self) -> DecoderMetadata {
        let frames = self.blob.frames.max(1);
        DecoderMetadata {
            sample_rate: self.blob.sample_rate,
            channels: self.blob.channels,
            bits_per_sample: 32,
            duration_secs: frames as f32 / self.blob.sample_rate.max(1) as f32,
        }
    }

    fn read_all(&mut self) -> Result<Vec<f32>, AssetError> {
        self.cursor_frames = self.blob.frames as usize;
        Ok(self.blob.samples.clone())
    }

    fn read_chunk(&mut self, max_frames: usize) -> Result<Vec<f32>, AssetError> {
        let channels = self.blob.channels as usize;
        let total_frames = self.blob.frames as usize;
        if self.cursor_frames >= total_frames {
            return Ok(Vec::new());
        }
        let n = max_frames.min(total_frames - self.cursor_frames);
        let start = self.cursor_frames * channels;
        let end = start + n * channels;
        let chunk = self.blob.samples[start..end].to_vec();
        self.cursor_frames += n;
        Ok(chunk)
    }

    fn rewind(&mut self) -> Result<(), AssetError> {
        self.cursor_frames = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_sfx(path: &Path, channels: u16, sample_rate: u32, samples: &[f32]) {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"SFX1");
        buf.push(0); // F32
        buf.push(channels as u8);
        buf.extend_from_slice(&[0, 0]); // padding to reach offset 8
        buf.extend_from_slice(&sample_rate.to_le_bytes());
        let frames = (samples.len() / channels as usize) as u64;
        buf.extend_from_slice(&frames.to_le_bytes());
        for s in samples {
            buf.extend_from_slice(&s.to_le_bytes());
        }
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(&buf).unwrap();
    }

    #[test]
    fn reads_all_samples_at_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beep.sfx");
        write_sfx(&path, 1, 44100, &[0.1, 0.2, 0.3, 0.4]);

        let mut dec = SfxDecoder::open(&path).unwrap();
        let meta = dec.metadata();
        assert_eq!(meta.sample_rate, 44100);
        assert_eq!(meta.channels, 1);

        let all = dec.read_all().unwrap();
        assert_eq!(all, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn reads_in_chunks_then_rewinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beep.pcm");
        write_sfx(&path, 1, 44100, &[1.0, 2.0, 3.0, 4.0]);

        let mut dec = SfxDecoder::open(&path).unwrap();
        let first = dec.read_chunk(2).unwrap();
        assert_eq!(first, vec![1.0, 2.0]);
        let second = dec.read_chunk(2).unwrap();
        assert_eq!(second, vec![3.0, 4.0]);
        let third = dec.read_chunk(2).unwrap();
        assert!(third.is_empty());

        dec.rewind().unwrap();
        let again = dec.read_chunk(4).unwrap();
        assert_eq!(again, vec![1.0, 2.0, 3.0, 4.0]);
    }
}
