use std::time::Duration;

/// Sentinel device name requesting a no-op backend (no device opened, every
/// operation degrades silently). Matches the `"nosound"` device name the
/// original accepts alongside real device names.
pub const NOSOUND_DEVICE: &str = "nosound";

/// The original's `XAL_MAX_SOURCES` is not visible in the filtered source
/// tree available here; 32 is chosen as a conservative, documented default
/// or the same order of magnitude as other OpenAL-era mixers of this
/// vintage (see DESIGN.md).
pub const DEFAULT_MAX_VOICES: usize = 32;

pub const DEFAULT_STREAM_BUFFER_COUNT: usize = 4;
pub const DEFAULT_STREAM_BUFFER_SECONDS: f32 = 0.25;
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(50);

/// Construction-time configuration for [`crate::AudioManager::init`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Output device name, or [`NOSOUND_DEVICE`] to disable audio entirely.
    pub device_name: String,
    /// When true, `AudioManager` spawns its own pump thread calling
    /// `update` on `update_interval`. When false, the embedder is
    /// responsible for calling `update` itself.
    pub threaded: bool,
    pub update_interval: Duration,
    /// Size of the fixed voice pool allocated from the backend.
    pub max_voices: usize,
    /// Number of buffers kept queued ahead of playback for streamed sounds.
    pub stream_buffer_count: usize,
    /// Length, in seconds, of each streaming buffer.
    pub stream_buffer_seconds: f32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            device_name: String::new(),
            threaded: true,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            max_voices: DEFAULT_MAX_VOICES,
            stream_buffer_count: DEFAULT_STREAM_BUFFER_COUNT,
            stream_buffer_seconds: DEFAULT_STREAM_BUFFER_SECONDS,
        }
    }
}

impl ManagerConfig {
    pub fn is_nosound(&self) -> bool {
        self.device_name.eq_ignore_ascii_case(NOSOUND_DEVICE)
    }

    pub fn stream_buffer_frames(&self, sample_rate: u32) -> usize {
        (sample_rate as f32 * self.stream_buffer_seconds) as usize
    }
}
