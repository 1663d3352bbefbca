//! Voice-table mixing shared by [`crate::cpal_backend::CpalMixerBackend`]
//! and [`crate::mock_backend::MockMixerBackend`].
//!
//! A `Mixer` owns a fixed table of voice slots and a table of uploaded PCM
//! buffers, and knows how to render some of those voices into an
//! interleaved output buffer. Neither implementation of `MixerBackend` does
//! its own sample-level bookkeeping; they just lock this table and, for the
//! real backend, call `render` from the `cpal` callback.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::{BufferHandle, PcmBuffer, VoiceId, VoiceState};

struct Voice {
    state: VoiceState,
    gain: f32,
    looping: bool,
    attached: Option<BufferHandle>,
    queue: VecDeque<BufferHandle>,
    played: VecDeque<BufferHandle>,
    cursor: usize,
}

impl Voice {
    fn new() -> Self {
        Voice {
            state: VoiceState::Stopped,
            gain: 1.0,
            looping: false,
            attached: None,
            queue: VecDeque::new(),
            played: VecDeque::new(),
            cursor: 0,
        }
    }

    fn current_buffer(&self) -> Option<BufferHandle> {
        self.attached.or_else(|| self.queue.front().copied())
    }
}

pub(crate) struct Mixer {
    voice_ids: Vec<VoiceId>,
    voices: Mutex<HashMap<VoiceId, Voice>>,
    buffers: Mutex<HashMap<BufferHandle, PcmBuffer>>,
    next_buffer: AtomicU32,
    device_sample_rate: u32,
}

impl Mixer {
    pub(crate) fn new(max_voices: usize, device_sample_rate: u32) -> Self {
        let voice_ids: Vec<VoiceId> = (1..=max_voices as u32).collect();
        let voices = voice_ids.iter().map(|&id| (id, Voice::new())).collect();
        Mixer {
            voice_ids,
            voices: Mutex::new(voices),
            buffers: Mutex::new(HashMap::new()),
            next_buffer: AtomicU32::new(1),
            device_sample_rate,
        }
    }

    pub(crate) fn voice_ids(&self) -> &[VoiceId] {
        &self.voice_ids
    }

    pub(crate) fn device_sample_rate(&self) -> u32 {
        self.device_sample_rate
    }

    pub(crate) fn upload_buffer(&self, samples: Vec<f32>, sample_rate: u32, channels: u16) -> BufferHandle {
        let handle = self.next_buffer.fetch_add(1, Ordering::Relaxed);
        self.buffers.lock().insert(
            handle,
            PcmBuffer {
                samples,
                sample_rate,
                channels,
            },
        );
        handle
    }

    pub(crate) fn release_buffer(&self, buffer: BufferHandle) {
        self.buffers.lock().remove(&buffer);
    }

    pub(crate) fn attach(&self, voice: VoiceId, buffer: BufferHandle) {
        if let Some(v) = self.voices.lock().get_mut(&voice) {
            v.attached = Some(buffer);
            v.queue.clear();
            v.played.clear();
            v.cursor = 0;
        }
    }

    pub(crate) fn queue_buffer(&self, voice: VoiceId, buffer: BufferHandle) {
        if let Some(v) = self.voices.lock().get_mut(&voice) {
            v.attached = None;
            v.queue.push_back(buffer);
        }
    }

    pub(crate) fn unqueue_processed(&self, voice: VoiceId) -> usize {
        if let Some(v) = self.voices.lock().get_mut(&voice) {
            let n = v.played.len();
            v.played.clear();
            n
        } else {
            0
        }
    }

    pub(crate) fn clear_queue(&self, voice: VoiceId) {
        if let Some(v) = self.voices.lock().get_mut(&voice) {
            v.attached = None;
            v.queue.clear();
            v.played.clear();
            v.cursor = 0;
        }
    }

    pub(crate) fn set_gain(&self, voice: VoiceId, gain: f32) {
        if let Some(v) = self.voices.lock().get_mut(&voice) {
            v.gain = gain;
        }
    }

    pub(crate) fn set_looping(&self, voice: VoiceId, looping: bool) {
        if let Some(v) = self.voices.lock().get_mut(&voice) {
            v.looping = looping;
        }
    }

    pub(crate) fn set_offset(&self, voice: VoiceId, seconds: f32) {
        let mut voices = self.voices.lock();
        let buffers = self.buffers.lock();
        if let Some(v) = voices.get_mut(&voice) {
            if let Some(buf) = v.current_buffer().and_then(|h| buffers.get(&h)) {
                let frame = (seconds.max(0.0) * buf.sample_rate as f32).round() as usize;
                v.cursor = frame.min(buf.frames());
            }
        }
    }

    pub(crate) fn get_offset(&self, voice: VoiceId) -> f32 {
        let voices = self.voices.lock();
        let buffers = self.buffers.lock();
        voices
            .get(&voice)
            .and_then(|v| {
                v.current_buffer()
                    .and_then(|h| buffers.get(&h))
                    .map(|buf| v.cursor as f32 / buf.sample_rate as f32)
            })
            .unwrap_or(0.0)
    }

    pub(crate) fn start(&self, voice: VoiceId) {
        if let Some(v) = self.voices.lock().get_mut(&voice) {
            v.state = VoiceState::Playing;
        }
    }

    pub(crate) fn stop(&self, voice: VoiceId) {
        if let Some(v) = self.voices.lock().get_mut(&voice) {
            v.state = VoiceState::Stopped;
            v.cursor = 0;
        }
    }

    pub(crate) fn pause(&self, voice: VoiceId) {
        if let Some(v) = self.voices.lock().get_mut(&voice) {
            v.state = VoiceState::Paused;
        }
    }

    pub(crate) fn state(&self, voice: VoiceId) -> VoiceState {
        self.voices
            .lock()
            .get(&voice)
            .map(|v| v.state)
            .unwrap_or(VoiceState::Stopped)
    }

    pub(crate) fn queued_count(&self, voice: VoiceId) -> usize {
        self.voices.lock().get(&voice).map(|v| v.queue.len()).unwrap_or(0)
    }

    pub(crate) fn processed_count(&self, voice: VoiceId) -> usize {
        self.voices.lock().get(&voice).map(|v| v.played.len()).unwrap_or(0)
    }

    /// Mix every currently-playing voice into `out`, an interleaved buffer
    /// of `out.len() / out_channels` frames. Called from the `cpal` render
    /// callback, or directly by the mock backend's `advance`.
    pub(crate) fn render(&self, out: &mut [f32], out_channels: u16) {
        for s in out.iter_mut() {
            *s = 0.0;
        }
        if out_channels == 0 {
            return;
        }
        let frames = out.len() / out_channels as usize;
        let buffers = self.buffers.lock();
        let mut voices = self.voices.lock();
        for voice in voices.values_mut() {
            if voice.state != VoiceState::Playing {
                continue;
            }
            mix_voice(voice, &buffers, out, out_channels, frames);
        }
    }
}

fn mix_voice(
    voice: &mut Voice,
    buffers: &HashMap<BufferHandle, PcmBuffer>,
    out: &mut [f32],
    out_channels: u16,
    frames: usize,
) {
    let mut frame_idx = 0;
    while frame_idx < frames {
        let handle = match voice.current_buffer() {
            Some(h) => h,
            None => return,
        };
        let buf = match buffers.get(&handle) {
            Some(b) => b,
            None => return,
        };
        let buf_frames = buf.frames();
        if buf_frames == 0 {
            return;
        }
        if voice.cursor >= buf_frames {
            if voice.attached.is_some() {
                if voice.looping {
                    voice.cursor = 0;
                    continue;
                }
                voice.state = VoiceState::Stopped;
                voice.cursor = 0;
                return;
            }
            if let Some(done) = voice.queue.pop_front() {
                voice.played.push_back(done);
            }
            voice.cursor = 0;
            continue;
        }

        let n = (buf_frames - voice.cursor).min(frames - frame_idx);
        for f in 0..n {
            let src_frame = voice.cursor + f;
            let dst_frame = frame_idx + f;
            for ch in 0..out_channels as usize {
                let src_ch = if buf.channels as usize == out_channels as usize {
                    ch
                } else {
                    ch.min(buf.channels as usize - 1)
                };
                let sample = buf.samples[src_frame * buf.channels as usize + src_ch];
                out[dst_frame * out_channels as usize + ch] += sample * voice.gain;
            }
        }
        voice.cursor += n;
        frame_idx += n;
    }
}
