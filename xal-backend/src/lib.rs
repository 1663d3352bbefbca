//! Mixer backend abstraction for xal.
//!
//! This crate defines [`MixerBackend`], the trait `xal-core` drives its
//! voices through, plus two implementations: [`cpal_backend::CpalMixerBackend`]
//! (a real output device) and [`mock_backend::MockMixerBackend`] (an
//! in-process double driven by an explicit tick, used by `xal-core`'s test
//! suite and anything else that wants deterministic playback without
//! opening a device).
//!
//! Both implementations share the same voice-table mixing logic in `mixer`
//! so the two backends stay behaviorally identical.

mod mixer;

pub mod cpal_backend;
pub mod mock_backend;

pub use cpal_backend::CpalMixerBackend;
pub use mock_backend::MockMixerBackend;

use std::fmt;

/// Opaque voice identifier. `0` is never issued by [`MixerBackend::voice_ids`];
/// callers use it as the "unbound" sentinel, matching `Source::sourceId == 0`
/// in the original C++.
pub type VoiceId = u32;

/// Opaque handle to PCM uploaded via [`MixerBackend::upload_buffer`].
pub type BufferHandle = u32;

/// Backend-level failures. Device init failures leave the owning
/// `AudioManager` disabled rather than propagating further.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("no output device available")]
    DeviceNotFound,
    #[error("unsupported stream format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to create output stream")]
    StreamCreationFailed,
    #[error("playback error: {0}")]
    PlaybackError(String),
    #[error("{0}")]
    Other(String),
}

/// Transport state of a single voice, as last set by `start`/`stop`/`pause`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Playing,
    Paused,
    Stopped,
}

/// Non-RT diagnostics emitted by a backend.
#[derive(Debug, Clone)]
pub enum DiagnosticEvent {
    XRun { count: u32 },
    DeviceRemoved,
    Other(String),
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticEvent::XRun { count } => write!(f, "XRun(count={count})"),
            DiagnosticEvent::DeviceRemoved => write!(f, "DeviceRemoved"),
            DiagnosticEvent::Other(s) => write!(f, "Other({s})"),
        }
    }
}

pub type DiagnosticsCb = std::sync::Arc<dyn Fn(DiagnosticEvent) + Send + Sync + 'static>;

/// Interleaved PCM plus the metadata needed to play it.
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmBuffer {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// The mixer/hardware backend contract described in spec.md §6.
///
/// A backend owns a fixed pool of voices (allocated once, at construction)
/// and a table of uploaded PCM buffers. `xal-core` never reasons about
/// samples directly; it only ever attaches/queues buffer handles onto voice
/// ids and reads back transport state.
pub trait MixerBackend: Send + Sync {
    /// The fixed voice pool this backend was constructed with. Never
    /// contains `0`.
    fn voice_ids(&self) -> &[VoiceId];

    fn device_sample_rate(&self) -> u32;

    /// Upload PCM once; returns a handle reusable across any number of
    /// voices (including multiple concurrent attachments of the same
    /// static asset).
    fn upload_buffer(&self, pcm: Vec<f32>, sample_rate: u32, channels: u16) -> BufferHandle;

    /// Drop a previously uploaded buffer. No-op if any voice still
    /// references it; those voices keep playing until they move past it.
    fn release_buffer(&self, buffer: BufferHandle);

    /// Attach a single buffer for static, hardware-looped playback.
    /// Replaces any previous attachment or queue on this voice.
    fn attach(&self, voice: VoiceId, buffer: BufferHandle);

    /// Append a buffer to a voice's streaming queue. Used for streamed
    /// assets, where looping is emulated by the caller re-queuing rather
    /// than by backend-level looping.
    fn queue_buffer(&self, voice: VoiceId, buffer: BufferHandle);

    /// Remove buffers the voice has finished playing from its queue,
    /// returning how many were removed.
    fn unqueue_processed(&self, voice: VoiceId) -> usize;

    /// Detach everything queued/attached on a voice without changing its
    /// transport state.
    fn clear_queue(&self, voice: VoiceId);

    fn set_gain(&self, voice: VoiceId, gain: f32);
    fn set_looping(&self, voice: VoiceId, looping: bool);
    fn set_offset(&self, voice: VoiceId, seconds: f32);
    fn get_offset(&self, voice: VoiceId) -> f32;

    fn start(&self, voice: VoiceId);
    fn stop(&self, voice: VoiceId);
    fn pause(&self, voice: VoiceId);
    fn state(&self, voice: VoiceId) -> VoiceState;

    /// Buffers still in the queue, including the one currently playing.
    fn queued_count(&self, voice: VoiceId) -> usize;
    /// Buffers that finished playing but have not been removed via
    /// `unqueue_processed` yet.
    fn processed_count(&self, voice: VoiceId) -> usize;

    fn set_diagnostics_callback(&self, cb: Option<DiagnosticsCb>);
}

/// Construct the default real backend (`cpal`-backed) with the given voice
/// pool size.
pub fn create_backend(max_voices: usize) -> Result<Box<dyn MixerBackend>, BackendError> {
    let backend = cpal_backend::CpalMixerBackend::new(max_voices)?;
    tracing::info!(
        sample_rate = backend.device_sample_rate(),
        max_voices,
        "xal-backend: opened cpal output device"
    );
    Ok(Box::new(backend))
}
