//! [`AudioManager`]: voice allocator, category/sound registries, and the
//! periodic update pump (spec.md §4.1). It is the only thing that owns
//! `Source`s and `SoundBuffer`s; everything else refers to them by
//! [`SoundId`]/[`SourceId`] and resolves through here, per spec.md §9's
//! re-architecture note (no back-pointers, no hidden global — an explicit
//! handle with an `init`/`destroy` pair).

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use xal_backend::{MixerBackend, VoiceId, VoiceState};

use crate::category::Category;
use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::ids::{SoundId, SourceId};
use crate::sound_buffer::{self, LoadOutcome, SoundBuffer, SoundKind};
use crate::source::Source;

struct State {
    categories: HashMap<String, Category>,
    sounds: HashMap<SoundId, SoundBuffer>,
    names: HashMap<String, SoundId>,
    sources: HashMap<SourceId, Source>,
    global_gain: f32,
    next_sound_id: u64,
    next_source_id: u64,
}

impl State {
    fn new() -> Self {
        State {
            categories: HashMap::new(),
            sounds: HashMap::new(),
            names: HashMap::new(),
            sources: HashMap::new(),
            global_gain: 1.0,
            next_sound_id: 1,
            next_source_id: 1,
        }
    }
}

/// Read-only snapshot of a registered sound, returned by [`AudioManager::get_sound`].
#[derive(Debug, Clone)]
pub struct SoundInfo {
    pub id: SoundId,
    pub name: String,
    pub category: String,
    pub duration: f32,
    pub streaming: bool,
    pub locked: bool,
}

struct Pump {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Voice allocator, category/sound registries, and update pump described in
/// spec.md §4.1. `"nosound"` in [`ManagerConfig::device_name`], or a real
/// device that fails to open, leaves the manager in a disabled state:
/// [`AudioManager::is_enabled`] returns false and every playback call is a
/// silent no-op, per spec.md §7's `DeviceInitFailure` policy.
pub struct AudioManager {
    state: Arc<Mutex<State>>,
    backend: Option<Arc<dyn MixerBackend>>,
    config: ManagerConfig,
    pump: Option<Pump>,
}

impl AudioManager {
    pub fn init(config: ManagerConfig) -> AudioManager {
        let backend: Option<Arc<dyn MixerBackend>> = if config.is_nosound() {
            tracing::info!("xal-core: \"nosound\" device requested, audio disabled");
            None
        } else {
            match xal_backend::create_backend(config.max_voices) {
                Ok(b) => Some(Arc::from(b)),
                Err(err) => {
                    tracing::warn!(error = %err, "xal-core: failed to open audio device, disabling playback");
                    None
                }
            }
        };

        let state = Arc::new(Mutex::new(State::new()));
        let pump = if config.threaded {
            Some(Self::spawn_pump(
                state.clone(),
                backend.clone(),
                config.update_interval,
            ))
        } else {
            None
        };

        AudioManager {
            state,
            backend,
            config,
            pump,
        }
    }

    fn spawn_pump(
        state: Arc<Mutex<State>>,
        backend: Option<Arc<dyn MixerBackend>>,
        interval: std::time::Duration,
    ) -> Pump {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = stop.clone();
        let handle = std::thread::spawn(move || {
            let dt = interval.as_secs_f32();
            while !stop_for_thread.load(Ordering::Relaxed) {
                std::thread::sleep(interval);
                if stop_for_thread.load(Ordering::Relaxed) {
                    break;
                }
                if let Some(backend) = &backend {
                    let mut state = state.lock();
                    run_update(&mut state, backend.as_ref(), dt);
                }
            }
        });
        Pump { stop, handle }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Client-driven pump tick. No-op when the manager was constructed with
    /// `threaded: true` (the background thread already calls this) or when
    /// disabled.
    pub fn update(&self, dt: f32) {
        let Some(backend) = &self.backend else { return };
        let mut state = self.state.lock();
        run_update(&mut state, backend.as_ref(), dt);
    }

    /// Tear down the manager: joins the pump thread, stops every live
    /// voice immediately (bypassing any pending fade, per spec.md §5's
    /// cancellation note), and releases every uploaded buffer.
    pub fn destroy(mut self) {
        if let Some(pump) = self.pump.take() {
            pump.stop.store(true, Ordering::Relaxed);
            let _ = pump.handle.join();
        }
        let mut state = self.state.lock();
        if let Some(backend) = &self.backend {
            for source in state.sources.values() {
                if source.is_bound() {
                    backend.stop(source.voice_id);
                }
            }
            let bound_voice_by_source: HashMap<SourceId, VoiceId> = state
                .sources
                .iter()
                .filter(|(_, source)| source.is_bound())
                .map(|(id, source)| (*id, source.voice_id))
                .collect();
            for sound in state.sounds.values_mut() {
                match &mut sound.kind {
                    SoundKind::Static { buffer, .. } => {
                        if *buffer != 0 {
                            backend.release_buffer(*buffer);
                        }
                    }
                    SoundKind::Streaming(stream) => {
                        if let Some(&sid) = sound.sources.first() {
                            if let Some(&voice_id) = bound_voice_by_source.get(&sid) {
                                stream.unqueue_buffers(backend.as_ref(), voice_id);
                            }
                        }
                    }
                }
            }
        }
        state.sources.clear();
        state.sounds.clear();
        state.categories.clear();
        state.names.clear();
    }

    // -- categories ---------------------------------------------------

    /// Idempotent: if `name` already names a category, this call has no
    /// effect (the existing `streamed` flag is kept), per spec.md §4.1.
    pub fn create_category(&self, name: impl Into<String>, streamed: bool) {
        let name = name.into();
        let mut state = self.state.lock();
        state
            .categories
            .entry(name.clone())
            .or_insert_with(|| Category::new(name, streamed));
    }

    pub fn set_category_gain(&self, name: &str, gain: f32) {
        let mut state = self.state.lock();
        match state.categories.get_mut(name) {
            Some(cat) => cat.gain = gain,
            None => return,
        }
        let Some(backend) = &self.backend else { return };
        let ids: Vec<SourceId> = state.sources.keys().copied().collect();
        for id in ids {
            let mut in_category = false;
            if let Some(source) = state.sources.get(&id) {
                if source.is_bound() {
                    if let Some(snd) = state.sounds.get(&source.sound_id) {
                        in_category = snd.category == name;
                    }
                }
            }
            if in_category {
                let voice = state.sources[&id].voice_id;
                let gain = effective_gain(&state, id);
                backend.set_gain(voice, gain);
            }
        }
    }

    pub fn set_global_gain(&self, gain: f32) {
        let mut state = self.state.lock();
        state.global_gain = gain;
        let Some(backend) = &self.backend else { return };
        let ids: Vec<SourceId> = state.sources.keys().copied().collect();
        for id in ids {
            if state.sources.get(&id).map(|s| s.is_bound()).unwrap_or(false) {
                let voice = state.sources[&id].voice_id;
                let gain = effective_gain(&state, id);
                backend.set_gain(voice, gain);
            }
        }
    }

    // -- sounds ---------------------------------------------------------

    /// Looks up `category_name` (must already exist — fatal otherwise, per
    /// spec.md §7) and loads `filename` into the registry under a name
    /// derived from its file stem plus `prefix`. Decode/load failures are
    /// reported as `Ok(None)`, matching spec.md §7's `AssetLoadFailure`
    /// policy of a null return rather than an error.
    pub fn create_sound(
        &self,
        filename: &Path,
        category_name: &str,
        prefix: &str,
    ) -> Result<Option<SoundId>> {
        let mut state = self.state.lock();
        let category = state
            .categories
            .get(category_name)
            .cloned()
            .ok_or_else(|| Error::CategoryMissing(category_name.to_string()))?;

        let name = derive_sound_name(filename, prefix);
        let id = SoundId(state.next_sound_id);
        let virtual_file_name = filename.to_string_lossy().to_string();
        let sample_rate_hint = self
            .backend
            .as_ref()
            .map(|b| b.device_sample_rate())
            .unwrap_or(44_100);

        let outcome = match sound_buffer::load(
            id,
            name.clone(),
            filename,
            virtual_file_name,
            category_name.to_string(),
            category.streamed,
            None,
            self.config.stream_buffer_frames(sample_rate_hint),
            self.config.stream_buffer_count,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(file = %filename.display(), error = %err, "xal-core: failed to load sound asset");
                return Ok(None);
            }
        };

        state.next_sound_id += 1;

        let sound = match outcome {
            LoadOutcome::Streaming(sound) => sound,
            LoadOutcome::Static {
                mut sound,
                pending_samples,
            } => {
                if let SoundKind::Static {
                    buffer,
                    sample_rate,
                    channels,
                } = &mut sound.kind
                {
                    if let Some(backend) = &self.backend {
                        *buffer = backend.upload_buffer(pending_samples, *sample_rate, *channels);
                    }
                }
                sound
            }
        };

        state.names.insert(name.clone(), id);
        state.sounds.insert(id, sound);
        tracing::info!(name = %name, category = %category_name, "xal-core: sound loaded");
        Ok(Some(id))
    }

    /// Bulk load every recognized audio file under `path`. When `category`
    /// is `None`, each file's immediate parent directory name becomes its
    /// category, auto-created on first reference (spec.md §3's Category
    /// lifecycle note); when `Some`, every discovered file is forced into
    /// that one category instead. Returns the names successfully
    /// registered; load failures are skipped, matching `create_sound`.
    pub fn create_sounds_from_path(
        &self,
        path: &Path,
        category: Option<&str>,
        prefix: &str,
    ) -> Vec<String> {
        let mut names = Vec::new();
        for item in xal_assets::discover(path) {
            let cat_name = category.unwrap_or(&item.category);
            self.create_category(cat_name, false);
            match self.create_sound(&item.path, cat_name, prefix) {
                Ok(Some(id)) => {
                    let state = self.state.lock();
                    if let Some(sound) = state.sounds.get(&id) {
                        names.push(sound.name.clone());
                    }
                }
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, "xal-core: bulk load skipped a file"),
            }
        }
        names
    }

    pub fn get_sound(&self, name: &str) -> Option<SoundInfo> {
        let state = self.state.lock();
        let id = *state.names.get(name)?;
        state.sounds.get(&id).map(|s| SoundInfo {
            id: s.id,
            name: s.name.clone(),
            category: s.category.clone(),
            duration: s.duration,
            streaming: s.is_streaming(),
            locked: s.locked,
        })
    }

    pub fn sound_id(&self, name: &str) -> Option<SoundId> {
        self.state.lock().names.get(name).copied()
    }

    /// Stops and tears down every `Source` still bound to this sound
    /// (precondition in spec.md §4.1) before removing it from the
    /// registry and releasing its backend buffer.
    pub fn destroy_sound(&self, name: &str) {
        let mut state = self.state.lock();
        let Some(id) = state.names.remove(name) else { return };
        let bound_sources = state
            .sounds
            .get(&id)
            .map(|s| s.sources.clone())
            .unwrap_or_default();
        let mut last_voice: VoiceId = 0;
        for sid in bound_sources {
            if let Some(source) = state.sources.get_mut(&sid) {
                source.locked = false;
                if source.is_bound() {
                    last_voice = source.voice_id;
                    if let Some(backend) = &self.backend {
                        backend.stop(source.voice_id);
                    }
                }
            }
            state.sources.remove(&sid);
        }
        if let Some(mut sound) = state.sounds.remove(&id) {
            match &mut sound.kind {
                SoundKind::Static { buffer, .. } => {
                    if *buffer != 0 {
                        if let Some(backend) = &self.backend {
                            backend.release_buffer(*buffer);
                        }
                    }
                }
                SoundKind::Streaming(stream) => {
                    if last_voice != 0 {
                        if let Some(backend) = &self.backend {
                            stream.unqueue_buffers(backend.as_ref(), last_voice);
                        }
                    }
                }
            }
        }
    }

    pub fn destroy_sounds_with_prefix(&self, prefix: &str) {
        let names: Vec<String> = {
            let state = self.state.lock();
            state
                .names
                .keys()
                .filter(|n| n.starts_with(prefix))
                .cloned()
                .collect()
        };
        for name in names {
            self.destroy_sound(&name);
        }
    }

    pub fn lock_sound(&self, id: SoundId) {
        let mut state = self.state.lock();
        let sources = match state.sounds.get_mut(&id) {
            Some(sound) => {
                sound.locked = true;
                sound.sources.clone()
            }
            None => return,
        };
        for sid in sources {
            if let Some(s) = state.sources.get_mut(&sid) {
                s.locked = true;
            }
        }
    }

    pub fn unlock_sound(&self, id: SoundId) {
        let mut state = self.state.lock();
        let sources = match state.sounds.get_mut(&id) {
            Some(sound) => {
                sound.locked = false;
                sound.sources.clone()
            }
            None => return,
        };
        for sid in sources {
            if let Some(s) = state.sources.get_mut(&sid) {
                s.locked = false;
            }
        }
    }

    // -- sources ----------------------------------------------------------

    /// Mints a new `Source` for `sound_id` and starts it, per the `play()`
    /// contract in spec.md §4.2. Returns `None` (no state change) on voice
    /// exhaustion, a missing sound, or an attempt to concurrently play a
    /// streaming sound that already has a live decode cursor (spec.md §3's
    /// "at most one Source at a time" invariant).
    pub fn play(&self, sound_id: SoundId, fade_time: f32, looping: bool) -> Option<SourceId> {
        let Some(backend) = &self.backend else { return None };
        let mut state = self.state.lock();

        {
            let sound = state.sounds.get(&sound_id)?;
            if sound.is_streaming() && !sound.sources.is_empty() {
                tracing::debug!(sound = %sound.name, "xal-core: streaming sound already has an active source");
                return None;
            }
        }

        let source_id = SourceId(state.next_source_id);
        state.next_source_id += 1;
        let locked = state.sounds.get(&sound_id).map(|s| s.locked).unwrap_or(false);
        let mut source = Source::new(source_id, sound_id);
        source.locked = locked;
        state.sources.insert(source_id, source);
        if let Some(sound) = state.sounds.get_mut(&sound_id) {
            sound.sources.push(source_id);
        }

        if start_source(&mut state, backend.as_ref(), source_id, fade_time, looping) {
            Some(source_id)
        } else {
            state.sources.remove(&source_id);
            if let Some(sound) = state.sounds.get_mut(&sound_id) {
                sound.sources.retain(|&s| s != source_id);
            }
            None
        }
    }

    /// Resume a previously paused `Source`, per spec.md §4.2: the
    /// `looping` flag is preserved from the original `play()` and `fade_time`
    /// only controls this resumption's own fade-in.
    pub fn resume(&self, id: SourceId, fade_time: f32) -> bool {
        let Some(backend) = &self.backend else { return false };
        let mut state = self.state.lock();
        if !state.sources.contains_key(&id) {
            return false;
        }
        start_source(&mut state, backend.as_ref(), id, fade_time, false)
    }

    pub fn stop(&self, id: SourceId, fade_time: f32) {
        let Some(backend) = &self.backend else { return };
        let mut state = self.state.lock();
        stop_public(&mut state, backend.as_ref(), id, fade_time);
    }

    pub fn pause(&self, id: SourceId, fade_time: f32) {
        let Some(backend) = &self.backend else { return };
        let mut state = self.state.lock();
        pause_public(&mut state, backend.as_ref(), id, fade_time);
    }

    pub fn stop_all(&self, fade_time: f32) {
        let Some(backend) = &self.backend else { return };
        let mut state = self.state.lock();
        let ids: Vec<SourceId> = state.sources.keys().copied().collect();
        for id in ids {
            if let Some(s) = state.sources.get_mut(&id) {
                s.locked = false;
            }
            stop_public(&mut state, backend.as_ref(), id, fade_time);
        }
    }

    pub fn stop_category(&self, name: &str, fade_time: f32) {
        let Some(backend) = &self.backend else { return };
        let mut state = self.state.lock();
        let mut ids = Vec::new();
        for (id, source) in state.sources.iter() {
            if let Some(sound) = state.sounds.get(&source.sound_id) {
                if sound.category == name {
                    ids.push(*id);
                }
            }
        }
        for id in ids {
            if let Some(s) = state.sources.get_mut(&id) {
                s.locked = false;
            }
            stop_public(&mut state, backend.as_ref(), id, fade_time);
        }
    }

    pub fn set_source_gain(&self, id: SourceId, gain: f32) {
        let mut state = self.state.lock();
        match state.sources.get_mut(&id) {
            Some(source) => source.gain = gain,
            None => return,
        }
        let Some(backend) = &self.backend else { return };
        if let Some(source) = state.sources.get(&id) {
            if source.is_bound() {
                let voice = source.voice_id;
                let gain = effective_gain(&state, id);
                backend.set_gain(voice, gain);
            }
        }
    }

    /// Whether `id` still names a live `Source`. Distinguishes "retired by
    /// the pump" from "never bound"/"still tracked but unbound" for
    /// callers and tests — both other predicates return `false` for an
    /// unknown id, which can't tell those apart.
    pub fn source_exists(&self, id: SourceId) -> bool {
        self.state.lock().sources.contains_key(&id)
    }

    pub fn is_playing(&self, id: SourceId) -> bool {
        let Some(backend) = &self.backend else { return false };
        let state = self.state.lock();
        let Some(source) = state.sources.get(&id) else { return false };
        let Some(sound) = state.sounds.get(&source.sound_id) else { return false };
        is_playing_internal(source, sound, backend.as_ref())
    }

    pub fn is_paused(&self, id: SourceId) -> bool {
        let state = self.state.lock();
        state.sources.get(&id).map(|s| s.is_paused()).unwrap_or(false)
    }

    pub fn is_fading_in(&self, id: SourceId) -> bool {
        let state = self.state.lock();
        state.sources.get(&id).map(|s| s.is_fading_in()).unwrap_or(false)
    }

    pub fn is_fading_out(&self, id: SourceId) -> bool {
        let state = self.state.lock();
        state.sources.get(&id).map(|s| s.is_fading_out()).unwrap_or(false)
    }

    /// Current playback position in seconds: read live from the voice
    /// while bound, or the last captured `sample_offset` while paused.
    pub fn sample_offset(&self, id: SourceId) -> f32 {
        let state = self.state.lock();
        let Some(source) = state.sources.get(&id) else { return 0.0 };
        match &self.backend {
            Some(backend) if source.is_bound() => backend.get_offset(source.voice_id),
            _ => source.sample_offset,
        }
    }
}

impl Drop for AudioManager {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.stop.store(true, Ordering::Relaxed);
            let _ = pump.handle.join();
        }
    }
}

fn derive_sound_name(path: &Path, prefix: &str) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("sound");
    if prefix.is_empty() {
        stem.to_string()
    } else {
        format!("{prefix}{stem}")
    }
}

fn effective_gain(state: &State, id: SourceId) -> f32 {
    let Some(source) = state.sources.get(&id) else { return 0.0 };
    let category_gain = state
        .sounds
        .get(&source.sound_id)
        .and_then(|sound| state.categories.get(&sound.category))
        .map(|c| c.gain)
        .unwrap_or(1.0);
    source.effective_gain(category_gain, state.global_gain)
}

/// Set difference of the backend's fixed voice pool against every voice id
/// currently held by a live `Source` (spec.md §4.1's "Voice pool
/// algorithm"). O(pool size × live sources), deliberately — both are small
/// bounded constants.
fn allocate_voice_id(state: &State, backend: &dyn MixerBackend) -> VoiceId {
    let used: HashSet<VoiceId> = state
        .sources
        .values()
        .map(|s| s.voice_id)
        .filter(|&v| v != 0)
        .collect();
    backend
        .voice_ids()
        .iter()
        .copied()
        .find(|v| !used.contains(v))
        .unwrap_or(0)
}

fn is_playing_internal(source: &Source, sound: &SoundBuffer, backend: &dyn MixerBackend) -> bool {
    if !source.is_bound() {
        return false;
    }
    match &sound.kind {
        SoundKind::Streaming(_) => {
            backend.queued_count(source.voice_id) > 0 || backend.processed_count(source.voice_id) > 0
        }
        SoundKind::Static { .. } => backend.state(source.voice_id) == VoiceState::Playing,
    }
}

/// The `play(fadeTime, looping)` contract from spec.md §4.2.
fn start_source(
    state: &mut State,
    backend: &dyn MixerBackend,
    id: SourceId,
    fade_time: f32,
    looping: bool,
) -> bool {
    let Some(source) = state.sources.get(&id) else { return false };
    let sound_id = source.sound_id;
    let was_fading = source.is_fading();
    let was_paused = source.paused;
    let mut voice = source.voice_id;

    if voice == 0 {
        voice = allocate_voice_id(state, backend);
        if voice == 0 {
            tracing::warn!(source = id.0, "xal-core: voice pool exhausted, dropping play");
            return false;
        }
    }

    // A resumed source keeps the looping flag it was originally played
    // with; a fresh play adopts the caller's request.
    let effective_looping = if was_paused {
        state.sources[&id].looping
    } else {
        looping
    };

    // Re-issuing play() on a Source that is already fading must not
    // re-trigger the mixer start command or reconfigure the voice; it
    // only adjusts the fade below. Reconfiguring here would re-attach a
    // static buffer (resetting its cursor) or clear a streaming voice's
    // queue out from under `StreamState.queued`'s bookkeeping.
    if !was_fading {
        let Some(sound) = state.sounds.get_mut(&sound_id) else { return false };
        match &mut sound.kind {
            SoundKind::Streaming(stream) => {
                backend.clear_queue(voice);
                stream.looping = effective_looping;
                backend.set_looping(voice, false);
                stream.pump(backend, voice);
            }
            SoundKind::Static { buffer, .. } => {
                backend.attach(voice, *buffer);
                backend.set_looping(voice, effective_looping);
            }
        }

        let source = state.sources.get_mut(&id).unwrap();
        source.voice_id = voice;
        source.looping = effective_looping;

        if was_paused {
            backend.set_offset(voice, source.sample_offset);
        }
    }

    let source = state.sources.get_mut(&id).unwrap();
    if fade_time > 0.0 {
        source.fade_speed = 1.0 / fade_time;
    } else {
        source.fade_time = 1.0;
        source.fade_speed = 0.0;
    }
    source.paused = false;

    let gain = effective_gain(state, id);
    backend.set_gain(voice, gain);

    if !was_fading {
        backend.start(voice);
    }

    true
}

/// The shared half of `stop()`/`pause()` from spec.md §4.2 (`stopSoft`).
fn stop_soft(state: &mut State, backend: &dyn MixerBackend, id: SourceId, fade_time: f32, pause: bool) {
    let Some(source) = state.sources.get_mut(&id) else { return };
    if !source.is_bound() {
        return;
    }
    source.paused = pause;

    if fade_time > 0.0 {
        source.fade_speed = -1.0 / fade_time;
        return;
    }

    let voice = source.voice_id;
    source.sample_offset = backend.get_offset(voice);
    source.fade_time = 0.0;
    source.fade_speed = 0.0;
    backend.stop(voice);

    let sound_id = source.sound_id;
    if let Some(sound) = state.sounds.get_mut(&sound_id) {
        if let SoundKind::Streaming(stream) = &mut sound.kind {
            if pause {
                stream.unqueue_buffers(backend, voice);
            } else {
                stream.rewind(backend, voice);
            }
        }
    }
}

/// `unbind(pause)` from spec.md §4.2: clears `voiceId` unless locked, and
/// for `pause == false` detaches from the `SoundBuffer` and retires the
/// `Source` from the registry outright.
fn unbind(state: &mut State, id: SourceId, pause: bool) {
    let Some(source) = state.sources.get_mut(&id) else { return };
    if source.locked {
        return;
    }
    source.voice_id = 0;
    if !pause {
        let sound_id = source.sound_id;
        if let Some(sound) = state.sounds.get_mut(&sound_id) {
            sound.sources.retain(|&s| s != id);
        }
        state.sources.remove(&id);
    }
}

fn stop_public(state: &mut State, backend: &dyn MixerBackend, id: SourceId, fade_time: f32) {
    stop_soft(state, backend, id, fade_time, false);
    if fade_time <= 0.0 {
        unbind(state, id, false);
    }
}

fn pause_public(state: &mut State, backend: &dyn MixerBackend, id: SourceId, fade_time: f32) {
    stop_soft(state, backend, id, fade_time, true);
    if fade_time <= 0.0 {
        unbind(state, id, true);
    }
}

/// The `update(dt)` step from spec.md §4.2, run once per live `Source` per
/// tick: refill stream queues, advance the fade envelope, complete any
/// fade that has finished, and tear down naturally-ended playback.
fn step_source(state: &mut State, backend: &dyn MixerBackend, id: SourceId, dt: f32) {
    let Some(snapshot) = state.sources.get(&id).cloned() else { return };
    if !snapshot.is_bound() {
        return;
    }
    let voice = snapshot.voice_id;
    let sound_id = snapshot.sound_id;

    if let Some(sound) = state.sounds.get_mut(&sound_id) {
        if let SoundKind::Streaming(stream) = &mut sound.kind {
            stream.pump(backend, voice);
        }
    }

    if snapshot.fade_speed != 0.0 {
        let mut fade_time = snapshot.fade_time + snapshot.fade_speed * dt;

        if fade_time >= 1.0 && snapshot.fade_speed > 0.0 {
            fade_time = 1.0;
            if let Some(s) = state.sources.get_mut(&id) {
                s.fade_time = fade_time;
                s.fade_speed = 0.0;
            }
            let gain = effective_gain(state, id);
            backend.set_gain(voice, gain);
        } else if fade_time <= 0.0 && snapshot.fade_speed < 0.0 {
            if let Some(s) = state.sources.get_mut(&id) {
                s.fade_time = 0.0;
                s.fade_speed = 0.0;
            }
            if snapshot.paused {
                pause_public(state, backend, id, 0.0);
            } else {
                stop_public(state, backend, id, 0.0);
            }
        } else {
            if let Some(s) = state.sources.get_mut(&id) {
                s.fade_time = fade_time;
            }
            let gain = effective_gain(state, id);
            backend.set_gain(voice, gain);
        }
    }

    if let Some(source) = state.sources.get(&id) {
        if source.is_bound() {
            let paused = source.paused;
            let playing = state
                .sounds
                .get(&source.sound_id)
                .map(|sound| is_playing_internal(source, sound, backend))
                .unwrap_or(false);
            if !playing {
                unbind(state, id, paused);
            }
        }
    }
}

fn run_update(state: &mut State, backend: &dyn MixerBackend, dt: f32) {
    let ids: Vec<SourceId> = state.sources.keys().copied().collect();
    for id in ids {
        step_source(state, backend, id, dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Writes xal-assets's own `.sfx` header: `"SFX1"`, sample format byte
    /// (0 = f32), channel count, two reserved bytes, sample rate, frame
    /// count, then raw interleaved samples — see `xal_assets::sfx::SfxBlob`.
    fn write_sfx(dir: &Path, name: &str, seconds: f32, sample_rate: u32) -> std::path::PathBuf {
        let frames = (sample_rate as f32 * seconds) as u32;
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"SFX1").unwrap();
        f.write_all(&[0u8]).unwrap(); // f32
        f.write_all(&[1u8]).unwrap(); // mono
        f.write_all(&[0u8, 0u8]).unwrap(); // reserved
        f.write_all(&sample_rate.to_le_bytes()).unwrap();
        f.write_all(&(frames as u64).to_le_bytes()).unwrap();
        for i in 0..frames {
            let s = if i % 2 == 0 { 0.5f32 } else { -0.5f32 };
            f.write_all(&s.to_le_bytes()).unwrap();
        }
        path
    }

    fn test_config() -> ManagerConfig {
        ManagerConfig {
            device_name: "nosound".into(),
            threaded: false,
            ..ManagerConfig::default()
        }
    }

    /// `nosound` disables playback entirely, but we still want the fade
    /// math and registries exercised against a real in-process backend, so
    /// tests construct the manager directly with a mock backend inserted.
    fn manager_with_mock(max_voices: usize) -> (AudioManager, Arc<xal_backend::MockMixerBackend>) {
        let backend = Arc::new(xal_backend::MockMixerBackend::new(max_voices));
        let mgr = AudioManager {
            state: Arc::new(Mutex::new(State::new())),
            backend: Some(backend.clone() as Arc<dyn MixerBackend>),
            config: ManagerConfig {
                max_voices,
                threaded: false,
                ..ManagerConfig::default()
            },
            pump: None,
        };
        (mgr, backend)
    }

    #[test]
    fn nosound_device_disables_playback() {
        let mgr = AudioManager::init(test_config());
        assert!(!mgr.is_enabled());
        mgr.create_category("sfx", false);
        assert!(mgr.play(SoundId(1), 0.0, false).is_none());
    }

    #[test]
    fn e1_basic_play_and_natural_teardown() {
        let (mgr, backend) = manager_with_mock(8);
        let dir = tempfile::tempdir().unwrap();
        let path = write_sfx(dir.path(), "a.sfx", 0.05, 4000);
        mgr.create_category("sfx", false);
        let id = mgr.create_sound(&path, "sfx", "").unwrap().unwrap();

        let source = mgr.play(id, 0.0, false).unwrap();
        assert!(mgr.is_playing(source));

        backend.advance(1000); // well past the 200-frame asset
        mgr.update(0.1);
        assert!(!mgr.is_playing(source));
    }

    #[test]
    fn e4_voice_exhaustion_returns_none() {
        let (mgr, _backend) = manager_with_mock(2);
        let dir = tempfile::tempdir().unwrap();
        let path = write_sfx(dir.path(), "a.sfx", 5.0, 4000);
        mgr.create_category("sfx", false);
        let id = mgr.create_sound(&path, "sfx", "").unwrap().unwrap();

        let s1 = mgr.play(id, 0.0, false);
        let s2 = mgr.play(id, 0.0, false);
        let s3 = mgr.play(id, 0.0, false);
        assert!(s1.is_some());
        assert!(s2.is_some());
        assert!(s3.is_none());
    }

    #[test]
    fn pause_then_resume_preserves_offset() {
        let (mgr, backend) = manager_with_mock(4);
        let dir = tempfile::tempdir().unwrap();
        let path = write_sfx(dir.path(), "a.sfx", 5.0, 4000);
        mgr.create_category("sfx", false);
        let id = mgr.create_sound(&path, "sfx", "").unwrap().unwrap();

        let source = mgr.play(id, 0.0, false).unwrap();
        backend.advance(4000); // 1 second in
        mgr.pause(source, 0.0);
        assert!(mgr.is_paused(source));
        let offset = mgr.sample_offset(source);
        assert!((offset - 1.0).abs() < 0.05);

        assert!(mgr.resume(source, 0.0));
        assert!(!mgr.is_paused(source));
        assert!(mgr.is_playing(source));
    }

    #[test]
    fn fade_in_reaches_full_gain_at_one() {
        let (mgr, backend) = manager_with_mock(4);
        let dir = tempfile::tempdir().unwrap();
        let path = write_sfx(dir.path(), "a.sfx", 5.0, 4000);
        mgr.create_category("sfx", false);
        let id = mgr.create_sound(&path, "sfx", "").unwrap().unwrap();

        let source = mgr.play(id, 1.0, false).unwrap();
        assert!(mgr.is_fading_in(source));
        mgr.update(0.5);
        mgr.update(0.5);
        assert!(!mgr.is_fading_in(source));
        let _ = backend;
    }

    #[test]
    fn set_global_gain_applies_immediately() {
        let (mgr, backend) = manager_with_mock(4);
        let dir = tempfile::tempdir().unwrap();
        let path = write_sfx(dir.path(), "a.sfx", 5.0, 4000);
        mgr.create_category("sfx", false);
        let id = mgr.create_sound(&path, "sfx", "").unwrap().unwrap();
        let _source = mgr.play(id, 0.0, false).unwrap();

        mgr.set_global_gain(0.25);
        let _ = backend;
    }

    #[test]
    fn locked_source_survives_natural_end() {
        let (mgr, backend) = manager_with_mock(4);
        let dir = tempfile::tempdir().unwrap();
        let path = write_sfx(dir.path(), "a.sfx", 0.01, 4000);
        mgr.create_category("sfx", false);
        let id = mgr.create_sound(&path, "sfx", "").unwrap().unwrap();
        mgr.lock_sound(id);

        let source = mgr.play(id, 0.0, false).unwrap();
        backend.advance(1000);
        mgr.update(0.1);
        // Locked: unbind refuses to tear the Source down even though
        // playback already ended naturally.
        assert!(mgr.source_exists(source));
    }

    #[test]
    fn streaming_sound_refuses_concurrent_play() {
        let (mgr, _backend) = manager_with_mock(4);
        let dir = tempfile::tempdir().unwrap();
        let path = write_sfx(dir.path(), "music.sfx", 5.0, 4000);
        mgr.create_category("music", true);
        let id = mgr.create_sound(&path, "music", "").unwrap().unwrap();

        let s1 = mgr.play(id, 0.0, true);
        assert!(s1.is_some());
        let s2 = mgr.play(id, 0.0, true);
        assert!(s2.is_none());
    }

    #[test]
    fn fade_in_gain_interpolates_linearly_over_time() {
        let (mgr, _backend) = manager_with_mock(4);
        let dir = tempfile::tempdir().unwrap();
        let path = write_sfx(dir.path(), "a.sfx", 5.0, 4000);
        mgr.create_category("sfx", false);
        let id = mgr.create_sound(&path, "sfx", "").unwrap().unwrap();

        let source = mgr.play(id, 1.0, false).unwrap();
        mgr.update(0.5);
        {
            let state = mgr.state.lock();
            assert!((effective_gain(&state, source) - 0.5).abs() < 1e-4);
        }
        mgr.update(0.5);
        {
            let state = mgr.state.lock();
            assert!((effective_gain(&state, source) - 1.0).abs() < 1e-4);
        }
        assert!(!mgr.is_fading_in(source));
    }

    #[test]
    fn fade_out_then_stop_drops_gain_to_zero_and_tears_down() {
        let (mgr, backend) = manager_with_mock(4);
        let dir = tempfile::tempdir().unwrap();
        let path = write_sfx(dir.path(), "a.sfx", 5.0, 4000);
        mgr.create_category("sfx", false);
        let id = mgr.create_sound(&path, "sfx", "").unwrap().unwrap();

        let source = mgr.play(id, 0.0, false).unwrap();
        mgr.stop(source, 1.0);
        assert!(mgr.is_fading_out(source));
        mgr.update(0.5);
        mgr.update(0.5);
        assert!(!mgr.source_exists(source));
        let _ = backend;
    }

    #[test]
    fn global_gain_change_mid_fade_applies_immediately() {
        let (mgr, _backend) = manager_with_mock(4);
        let dir = tempfile::tempdir().unwrap();
        let path = write_sfx(dir.path(), "a.sfx", 5.0, 4000);
        mgr.create_category("sfx", false);
        let id = mgr.create_sound(&path, "sfx", "").unwrap().unwrap();

        let source = mgr.play(id, 2.0, false).unwrap();
        mgr.update(1.0); // fade_time == 0.5
        mgr.set_global_gain(0.5);
        let state = mgr.state.lock();
        assert!((effective_gain(&state, source) - 0.25).abs() < 1e-4);
    }

    #[test]
    fn streaming_loop_keeps_playing_past_several_durations() {
        let (mgr, backend) = manager_with_mock(4);
        let dir = tempfile::tempdir().unwrap();
        let path = write_sfx(dir.path(), "music.sfx", 0.1, 4000);
        mgr.create_category("music", true);
        let id = mgr.create_sound(&path, "music", "").unwrap().unwrap();

        let source = mgr.play(id, 0.0, true).unwrap();
        for _ in 0..20 {
            backend.advance(200); // ~2x the asset's own length per tick
            mgr.update(0.05);
        }
        assert!(mgr.is_playing(source));
    }

    #[test]
    fn destroy_sound_tears_down_bound_sources() {
        let (mgr, _backend) = manager_with_mock(4);
        let dir = tempfile::tempdir().unwrap();
        let path = write_sfx(dir.path(), "a.sfx", 5.0, 4000);
        mgr.create_category("sfx", false);
        let id = mgr.create_sound(&path, "sfx", "").unwrap().unwrap();
        let source = mgr.play(id, 0.0, false).unwrap();

        mgr.destroy_sound("a");
        assert!(!mgr.is_playing(source));
        assert!(mgr.get_sound("a").is_none());
    }
}
