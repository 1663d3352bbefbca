//! `cpal`-backed [`MixerBackend`]: a dedicated worker thread owns the
//! device and stream (neither is `Send` on every platform), the rest of
//! this crate talks to it only through `Arc<Mixer>` and a small control
//! channel for lifecycle/diagnostics.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::mixer::Mixer;
use crate::{
    BackendError, BufferHandle, DiagnosticEvent, DiagnosticsCb, MixerBackend, VoiceId, VoiceState,
};

pub struct CpalMixerBackend {
    mixer: Arc<Mixer>,
    channels: u16,
    ctrl_tx: Sender<CtrlMsg>,
}

enum CtrlMsg {
    SetDiagnostics(Option<DiagnosticsCb>),
    Shutdown,
}

impl CpalMixerBackend {
    pub fn new(max_voices: usize) -> Result<Self, BackendError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(BackendError::DeviceNotFound)?;

        let mut supported_configs = device
            .supported_output_configs()
            .map_err(|e| BackendError::Other(e.to_string()))?
            .collect::<Vec<_>>();

        if supported_configs.is_empty() {
            return Err(BackendError::UnsupportedFormat("no supported configs".into()));
        }

        let chosen = supported_configs
            .iter()
            .rev()
            .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2)
            .cloned()
            .or_else(|| supported_configs.pop())
            .ok_or(BackendError::UnsupportedFormat("no usable config".into()))?;

        let config = chosen.with_max_sample_rate().config();
        let channels = config.channels as u16;
        let mixer = Arc::new(Mixer::new(max_voices, config.sample_rate.0));

        let (tx, rx) = unbounded::<CtrlMsg>();

        let worker_mixer = mixer.clone();
        thread::spawn(move || worker_loop(device, config, rx, worker_mixer));

        Ok(CpalMixerBackend {
            mixer,
            channels,
            ctrl_tx: tx,
        })
    }
}

impl Drop for CpalMixerBackend {
    fn drop(&mut self) {
        let _ = self.ctrl_tx.send(CtrlMsg::Shutdown);
    }
}

fn worker_loop(device: Device, config: StreamConfig, rx: Receiver<CtrlMsg>, mixer: Arc<Mixer>) {
    let channels = config.channels as u16;
    let mut diagnostics: Option<DiagnosticsCb> = None;

    let mixer_for_cb = mixer.clone();
    let diagnostics_for_err = diagnostics.clone();
    let err_cb = move |err| {
        tracing::warn!(error = %err, "xal-backend: cpal stream error");
        if let Some(cb) = &diagnostics_for_err {
            let cb = cb.clone();
            thread::spawn(move || cb(DiagnosticEvent::XRun { count: 1 }));
        }
    };

    let data_cb = move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            mixer_for_cb.render(data, channels);
        }));
        if res.is_err() {
            data.iter_mut().for_each(|s| *s = 0.0);
        }
    };

    let stream = match device.build_output_stream(&config, data_cb, err_cb, None) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "xal-backend: failed to build output stream");
            return;
        }
    };
    if let Err(e) = stream.play() {
        tracing::error!(error = %e, "xal-backend: failed to start output stream");
        return;
    }

    loop {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(CtrlMsg::SetDiagnostics(cb)) => diagnostics = cb,
            Ok(CtrlMsg::Shutdown) => return,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
        }
    }
}

impl MixerBackend for CpalMixerBackend {
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
        let _ = self.ctrl_tx.send(CtrlMsg::SetDiagnostics(cb));
    }
}

impl CpalMixerBackend {
    /// Channel count of the device config this backend opened.
    pub fn channels(&self) -> u16 {
        self.channels
    }
}
