//! `symphonia`-backed [`Decoder`], covering Ogg Vorbis, WAV, and anything
//! else symphonia's `all` feature set probes. Decodes one packet at a time
//! so [`Decoder::read_chunk`] never blocks longer than a single packet's
//! worth of work — there is no background decode thread.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder as SymphoniaCodec, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::decoder::{Decoder, DecoderMetadata};
use crate::error::AssetError;

pub struct SymphoniaDecoder {
    path: PathBuf,
    format: Box<dyn FormatReader>,
    codec: Box<dyn SymphoniaCodec>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    duration_secs: f32,
    pending: Vec<f32>,
    eof: bool,
}

impl SymphoniaDecoder {
    pub fn open(path: &Path) -> Result<Self, AssetError> {
        let (format, codec, track_id, sample_rate, channels, duration_secs) = open_track(path)?;
        Ok(SymphoniaDecoder {
            path: path.to_path_buf(),
            format,
            codec,
            track_id,
            sample_rate,
            channels,
            duration_secs,
            pending: Vec::new(),
            eof: false,
        })
    }

    fn fill_pending(&mut self) -> Result<(), AssetError> {
        if !self.pending.is_empty() || self.eof {
            return Ok(());
        }
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(_) => {
                    self.eof = true;
                    return Ok(());
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            match self.codec.decode(&packet) {
                Ok(audio_buf) => {
                    let spec = *audio_buf.spec();
                    let mut sample_buf =
                        SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
                    sample_buf.copy_interleaved_ref(audio_buf);
                    self.pending.extend_from_slice(sample_buf.samples());
                    if !self.pending.is_empty() {
                        return Ok(());
                    }
                }
                Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
                Err(e) => return Err(AssetError::Decode(e.to_string())),
            }
        }
    }
}

impl Decoder for SymphoniaDecoder {
    fn metadata(&self) -> DecoderMetadata {
        DecoderMetadata {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: 32,
            duration_secs: self.duration_secs,
        }
    }

    fn read_all(&mut self) -> Result<Vec<f32>, AssetError> {
        let mut all = Vec::new();
        loop {
            let chunk = self.read_chunk(self.sample_rate as usize)?;
            if chunk.is_empty() {
                break;
            }
            all.extend_from_slice(&chunk);
        }
        Ok(all)
    }

    fn read_chunk(&mut self, max_frames: usize) -> Result<Vec<f32>, AssetError> {
        self.fill_pending()?;
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        let channels = self.channels.max(1) as usize;
        let want = max_frames.saturating_mul(channels).max(channels);
        if self.pending.len() <= want {
            Ok(std::mem::take(&mut self.pending))
        } else {
            let rest = self.pending.split_off(want);
            let chunk = std::mem::replace(&mut self.pending, rest);
            Ok(chunk)
        }
    }

    fn rewind(&mut self) -> Result<(), AssetError> {
        let (format, codec, track_id, sample_rate, channels, duration_secs) =
            open_track(&self.path)?;
        self.format = format;
        self.codec = codec;
        self.track_id = track_id;
        self.sample_rate = sample_rate;
        self.channels = channels;
        self.duration_secs = duration_secs;
        self.pending.clear();
        self.eof = false;
        Ok(())
    }
}

#[allow(clippy::type_complexity)]
fn open_track(
    path: &Path,
) -> Result<(Box<dyn FormatReader>, Box<dyn SymphoniaCodec>, u32, u32, u16, f32), AssetError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AssetError::Decode(format!("probe failed: {e}")))?;

    let format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| AssetError::Decode("no default track".into()))?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(2);
    let duration_secs = track
        .codec_params
        .n_frames
        .map(|n| n as f32 / sample_rate as f32)
        .unwrap_or(0.0);

    let codec = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AssetError::Decode(format!("codec init failed: {e}")))?;

    Ok((format, codec, track_id, sample_rate, channels, duration_secs))
}
