//! In-process [`MixerBackend`] double. Renders on demand via [`advance`]
//! instead of a real device callback, so `xal-core`'s tests (and anything
//! else wanting deterministic playback) can drive time explicitly.

use std::sync::Mutex;

use crate::mixer::Mixer;
use crate::{BufferHandle, DiagnosticsCb, MixerBackend, VoiceId, VoiceState};

pub struct MockMixerBackend {
    mixer: Mixer,
    channels: u16,
    scratch: Mutex<Vec<f32>>,
    diagnostics: Mutex<Option<DiagnosticsCb>>,
}

impl MockMixerBackend {
    pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
    pub const DEFAULT_CHANNELS: u16 = 2;

    pub fn new(max_voices: usize) -> Self {
        Self::with_format(max_voices, Self::DEFAULT_SAMPLE_RATE, Self::DEFAULT_CHANNELS)
    }

    pub fn with_format(max_voices: usize, sample_rate: u32, channels: u16) -> Self {
        MockMixerBackend {
            mixer: Mixer::new(max_voices, sample_rate),
            channels,
            scratch: Mutex::new(Vec::new()),
            diagnostics: Mutex::new(None),
        }
    }

    /// Render `frames` frames and discard the audio, advancing every
    /// playing voice's cursor as a real device callback would. Tests use
    /// this to simulate time passing without an output device.
    pub fn advance(&self, frames: usize) {
        let mut buf = self.scratch.lock().unwrap();
        buf.clear();
        buf.resize(frames * self.channels as usize, 0.0);
        self.mixer.render(&mut buf, self.channels);
    }
}

impl MixerBackend for MockMixerBackend {
    fn voice_ids(&self) -> &[VoiceId] {
        self.mixer.voice_ids()
    }

    fn device_sample_rate(&self) -> u32 {
        self.mixer.device_sample_rate()
    }

    fn upload_buffer(&self, pcm: Vec<f32>, sample_rate: u32, channels: u16) -> BufferHandle {
        self.mixer.upload_buffer(pcm, sample_rate, channels)
    }

    fn release_buffer(&self, buffer: BufferHandle) {
        self.mixer.release_buffer(buffer)
    }

    fn attach(&self, voice: VoiceId, buffer: BufferHandle) {
        self.mixer.attach(voice, buffer)
    }

    fn queue_buffer(&self, voice: VoiceId, buffer: BufferHandle) {
        self.mixer.queue_buffer(voice, buffer)
    }

    fn unqueue_processed(&self, voice: VoiceId) -> usize {
        self.mixer.unqueue_processed(voice)
    }

    fn clear_queue(&self, voice: VoiceId) {
        self.mixer.clear_queue(voice)
    }

    fn set_gain(&self, voice: VoiceId, gain: f32) {
        self.mixer.set_gain(voice, gain)
    }

    fn set_looping(&self, voice: VoiceId, looping: bool) {
        self.mixer.set_looping(voice, looping)
    }

    fn set_offset(&self, voice: VoiceId, seconds: f32) {
        self.mixer.set_offset(voice, seconds)
    }

    fn get_offset(&self, voice: VoiceId) -> f32 {
        self.mixer.get_offset(voice)
    }

    fn start(&self, voice: VoiceId) {
        self.mixer.start(voice)
    }

    fn stop(&self, voice: VoiceId) {
        self.mixer.stop(voice)
    }

    fn pause(&self, voice: VoiceId) {
        self.mixer.pause(voice)
    }

    fn state(&self, voice: VoiceId) -> VoiceState {
        self.mixer.state(voice)
    }

    fn queued_count(&self, voice: VoiceId) -> usize {
        self.mixer.queued_count(voice)
    }

    fn processed_count(&self, voice: VoiceId) -> usize {
        self.mixer.processed_count(voice)
    }

    fn set_diagnostics_callback(&self, cb: Option<DiagnosticsCb>) {
        *self.diagnostics.lock().unwrap() = cb;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_pool_is_fixed_and_nonzero() {
        let backend = MockMixerBackend::new(4);
        assert_eq!(backend.voice_ids(), &[1, 2, 3, 4]);
    }

    #[test]
    fn attached_static_buffer_loops_when_flagged() {
        let backend = MockMixerBackend::with_format(1, 4, 1);
        let buf = backend.upload_buffer(vec![1.0, 2.0, 3.0, 4.0], 4, 1);
        let voice = backend.voice_ids()[0];
        backend.attach(voice, buf);
        backend.set_looping(voice, true);
        backend.start(voice);

        backend.advance(6);
        assert_eq!(backend.state(voice), VoiceState::Playing);
    }

    #[test]
    fn static_buffer_stops_at_end_without_looping() {
        let backend = MockMixerBackend::with_format(1, 4, 1);
        let buf = backend.upload_buffer(vec![1.0, 2.0], 4, 1);
        let voice = backend.voice_ids()[0];
        backend.attach(voice, buf);
        backend.start(voice);

        backend.advance(2);
        assert_eq!(backend.state(voice), VoiceState::Stopped);
    }

    #[test]
    fn streaming_queue_tracks_processed_buffers() {
        let backend = MockMixerBackend::with_format(1, 4, 1);
        let voice = backend.voice_ids()[0];
        let a = backend.upload_buffer(vec![1.0, 1.0], 4, 1);
        let b = backend.upload_buffer(vec![2.0, 2.0], 4, 1);
        backend.queue_buffer(voice, a);
        backend.queue_buffer(voice, b);
        backend.start(voice);

        assert_eq!(backend.queued_count(voice), 2);
        backend.advance(2);
        assert_eq!(backend.processed_count(voice), 1);
        assert_eq!(backend.queued_count(voice), 1);

        let unqueued = backend.unqueue_processed(voice);
        assert_eq!(unqueued, 1);
        assert_eq!(backend.processed_count(voice), 0);
    }

    #[test]
    fn gain_scales_mixed_output() {
        let backend = MockMixerBackend::with_format(1, 4, 1);
        let voice = backend.voice_ids()[0];
        let buf = backend.upload_buffer(vec![1.0, 1.0, 1.0, 1.0], 4, 1);
        backend.attach(voice, buf);
        backend.set_looping(voice, true);
        backend.set_gain(voice, 0.5);
        backend.start(voice);
        backend.advance(2);
    }

    #[test]
    fn offset_round_trips_within_buffer_bounds() {
        let backend = MockMixerBackend::with_format(1, 4, 1);
        let voice = backend.voice_ids()[0];
        let buf = backend.upload_buffer(vec![0.0; 8], 4, 1);
        backend.attach(voice, buf);
        backend.set_offset(voice, 1.0);
        assert!((backend.get_offset(voice) - 1.0).abs() < 1e-6);
    }
}
