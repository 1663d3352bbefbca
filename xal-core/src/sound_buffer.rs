//! [`SoundBuffer`] mirrors the original `SoundBuffer`/`StreamSound` split
//! (spec.md §4.3): a static sound decodes once and uploads a single buffer
//! that the backend loops in hardware; a streamed sound decodes
//! incrementally, a buffer queue's worth at a time, pumped from
//! `AudioManager::update`.
//!
//! `_findLinkedFile`, `_loadOgg`/`_loadSpx`/`_decodeSpx` from
//! `examples/original_source/branches/1.2/include/xal/SoundBuffer.h` collapse
//! here into [`load`], which resolves `.link` files via `xal_assets::link`
//! and dispatches to a decoder via `xal_assets::open` — the format-specific
//! branching the header spells out as separate virtuals is just extension
//! matching once decoding goes through a single `Decoder` trait object.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use xal_assets::Decoder;
use xal_backend::{BufferHandle, MixerBackend, VoiceId};

use crate::ids::SourceId;

/// Static sounds upload one buffer, looped in hardware by the backend
/// itself (`MixerBackend::set_looping` + `attach`). Streamed sounds keep a
/// live decoder and feed the backend's queue a chunk at a time.
pub enum SoundKind {
    Static {
        buffer: BufferHandle,
        sample_rate: u32,
        channels: u16,
    },
    Streaming(StreamState),
}

impl SoundKind {
    pub fn as_static_buffer(&self) -> Option<BufferHandle> {
        match self {
            SoundKind::Static { buffer, .. } => Some(*buffer),
            SoundKind::Streaming(_) => None,
        }
    }
}

pub struct StreamState {
    decoder: Box<dyn Decoder>,
    pub sample_rate: u32,
    pub channels: u16,
    buffer_frames: usize,
    buffer_count: usize,
    queued: VecDeque<BufferHandle>,
    pub looping: bool,
    finished: bool,
}

impl StreamState {
    fn new(decoder: Box<dyn Decoder>, buffer_frames: usize, buffer_count: usize) -> Self {
        let meta = decoder.metadata();
        Self {
            decoder,
            sample_rate: meta.sample_rate,
            channels: meta.channels,
            buffer_frames,
            buffer_count,
            queued: VecDeque::new(),
            looping: false,
            finished: false,
        }
    }

    fn decode_next_chunk(&mut self) -> Option<Vec<f32>> {
        match self.decoder.read_chunk(self.buffer_frames) {
            Ok(samples) if !samples.is_empty() => Some(samples),
            Ok(_) => {
                if self.looping {
                    if self.decoder.rewind().is_err() {
                        self.finished = true;
                        return None;
                    }
                    match self.decoder.read_chunk(self.buffer_frames) {
                        Ok(samples) if !samples.is_empty() => Some(samples),
                        _ => {
                            self.finished = true;
                            None
                        }
                    }
                } else {
                    self.finished = true;
                    None
                }
            }
            Err(err) => {
                tracing::warn!(%err, "stream decode error, stopping stream");
                self.finished = true;
                None
            }
        }
    }

    /// Top up a voice's queue to `buffer_count` entries, uploading and
    /// queuing freshly decoded chunks as needed. Called once on bind and
    /// once per `update` tick thereafter.
    pub fn pump(&mut self, backend: &dyn MixerBackend, voice: VoiceId) {
        let processed = backend.unqueue_processed(voice);
        if processed > 0 {
            for _ in 0..processed {
                if let Some(handle) = self.queued.pop_front() {
                    backend.release_buffer(handle);
                }
            }
        }

        while self.queued.len() < self.buffer_count && !self.finished {
            let Some(samples) = self.decode_next_chunk() else {
                break;
            };
            let handle = backend.upload_buffer(samples, self.sample_rate, self.channels);
            backend.queue_buffer(voice, handle);
            self.queued.push_back(handle);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished && self.queued.is_empty()
    }

    /// Detach all queued buffers without touching the decode cursor.
    /// Called on pause (spec.md §4.3's `unqueueBuffers`): playback resumes
    /// from the same point by re-queuing on the next `pump`.
    pub fn unqueue_buffers(&mut self, backend: &dyn MixerBackend, voice: VoiceId) {
        backend.clear_queue(voice);
        for handle in self.queued.drain(..) {
            backend.release_buffer(handle);
        }
    }

    /// Reset the decode cursor to the start (spec.md §4.3's `rewindStream`).
    /// Called on stop, so a subsequent `play()` starts the asset over.
    pub fn rewind(&mut self, backend: &dyn MixerBackend, voice: VoiceId) {
        self.unqueue_buffers(backend, voice);
        self.finished = false;
        let _ = self.decoder.rewind();
    }
}

pub struct SoundBuffer {
    pub id: crate::ids::SoundId,
    pub name: String,
    pub file_name: PathBuf,
    pub virtual_file_name: String,
    pub category: String,
    pub duration: f32,
    pub loaded: bool,
    pub decoded: bool,
    pub locked: bool,
    pub sources: Vec<SourceId>,
    pub kind: SoundKind,
}

impl SoundBuffer {
    pub fn is_streaming(&self) -> bool {
        matches!(self.kind, SoundKind::Streaming(_))
    }

    pub fn is_ogg(&self) -> bool {
        is_ogg(&self.file_name)
    }
    pub fn is_spx(&self) -> bool {
        is_spx(&self.file_name)
    }
    pub fn is_m4a(&self) -> bool {
        is_m4a(&self.file_name)
    }
    pub fn is_link(&self) -> bool {
        self.virtual_file_name != self.file_name.to_string_lossy()
    }
}

fn classify_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_ogg(path: &Path) -> bool {
    classify_extension(path) == "ogg"
}
pub fn is_spx(path: &Path) -> bool {
    classify_extension(path) == "spx"
}
pub fn is_m4a(path: &Path) -> bool {
    classify_extension(path) == "m4a"
}

/// Static buffers need the decoded samples to reach `AudioManager`, which
/// owns the backend and does the actual `upload_buffer` call; `load` has no
/// backend handle to do that itself. `LoadOutcome::Static::pending_samples`
/// carries the decoded PCM out so `AudioManager::create_sound` can finish
/// the upload and patch the real handle into `SoundKind::Static::buffer`
/// before the `SoundBuffer` is registered.
pub enum LoadOutcome {
    Static {
        sound: SoundBuffer,
        pending_samples: Vec<f32>,
    },
    Streaming(SoundBuffer),
}

/// Resolve, decode (or set up streaming for), and construct a `SoundBuffer`.
///
/// `force_streamed` lets a caller override the category's default; `None`
/// falls back to `category_streamed`, matching the original's "category
/// decides unless told otherwise" rule for `createSound`.
#[allow(clippy::too_many_arguments)]
pub fn load(
    id: crate::ids::SoundId,
    name: String,
    path: &Path,
    virtual_file_name: String,
    category: String,
    category_streamed: bool,
    force_streamed: Option<bool>,
    stream_buffer_frames: usize,
    stream_buffer_count: usize,
) -> Result<LoadOutcome, xal_assets::AssetError> {
    let resolved = if xal_assets::link::is_link(path) {
        xal_assets::link::resolve(path)?
    } else {
        path.to_path_buf()
    };

    let streamed = force_streamed.unwrap_or(category_streamed);
    let mut decoder = xal_assets::open(&resolved)?;
    let meta = decoder.metadata();

    if streamed {
        let kind = SoundKind::Streaming(StreamState::new(
            decoder,
            stream_buffer_frames,
            stream_buffer_count,
        ));
        Ok(LoadOutcome::Streaming(SoundBuffer {
            id,
            name,
            file_name: resolved,
            virtual_file_name,
            category,
            duration: meta.duration_secs,
            loaded: true,
            decoded: false,
            locked: false,
            sources: Vec::new(),
            kind,
        }))
    } else {
        let samples = decoder.read_all()?;
        drop(decoder);
        let kind = SoundKind::Static {
            buffer: 0,
            sample_rate: meta.sample_rate,
            channels: meta.channels,
        };
        Ok(LoadOutcome::Static {
            sound: SoundBuffer {
                id,
                name,
                file_name: resolved,
                virtual_file_name,
                category,
                duration: meta.duration_secs,
                loaded: true,
                decoded: true,
                locked: false,
                sources: Vec::new(),
                kind,
            },
            pending_samples: samples,
        })
    }
}
