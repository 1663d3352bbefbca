//! [`Source`] is the fade/transport state machine from spec.md §4.2,
//! grounded in `examples/original_source/tags/1.0/src/Source.cpp` — the
//! branch spec.md §9's Open Questions resolve in favor of (`fadeTime=1.0`
//! at steady state, `isFadingIn() == fadeSpeed > 0`). The `trunk` branch's
//! competing definitions are not implemented.
//!
//! Per spec.md §9's re-architecture note, a `Source` holds no pointer back
//! to its `SoundBuffer` or to the manager; it is plain data plus the pure
//! parts of the state machine (fade math, status predicates). Everything
//! that needs the backend, the owning sound, or other sources lives in
//! `AudioManager`, which is the only thing that can resolve a `SourceId`.

use xal_backend::VoiceId;

use crate::ids::{SoundId, SourceId};

/// One playback instance bound to (at most) one voice. `voice_id == 0`
/// means unbound, matching the `VoiceId` sentinel in `xal-backend`.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: SourceId,
    pub sound_id: SoundId,
    pub voice_id: VoiceId,
    pub gain: f32,
    pub looping: bool,
    /// `true` for "paused by user, retain for resume"; `false` for
    /// "stopped, disposable" per spec.md §3.
    pub paused: bool,
    /// Envelope position in `[0, 1]`; `1.0` is full gain.
    pub fade_time: f32,
    /// Signed rate of change of `fade_time` per second; sign encodes
    /// direction, `0.0` means steady.
    pub fade_speed: f32,
    /// Sample position in seconds, captured on pause for later resume.
    pub sample_offset: f32,
    /// Mirrors the owning `SoundBuffer`'s lock flag; pins this instance so
    /// natural end-of-playback does not tear it down.
    pub locked: bool,
}

impl Source {
    pub fn new(id: SourceId, sound_id: SoundId) -> Self {
        Source {
            id,
            sound_id,
            voice_id: 0,
            gain: 1.0,
            looping: false,
            paused: false,
            fade_time: 0.0,
            fade_speed: 0.0,
            sample_offset: 0.0,
            locked: false,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.voice_id != 0
    }

    pub fn is_fading_in(&self) -> bool {
        self.fade_speed > 0.0
    }

    pub fn is_fading_out(&self) -> bool {
        self.fade_speed < 0.0
    }

    pub fn is_fading(&self) -> bool {
        self.fade_speed != 0.0
    }

    /// A source fading toward pause reports not-yet-paused, per spec.md
    /// §4.2's tie-break list.
    pub fn is_paused(&self) -> bool {
        self.paused && !self.is_fading()
    }

    /// `fadeTime × gain × categoryGain × globalGain`, the gain formula
    /// spec.md §9's Open Questions section confirms as the correct
    /// invariant (steady state has `fadeTime == 1.0`).
    pub fn effective_gain(&self, category_gain: f32, global_gain: f32) -> f32 {
        self.fade_time * self.gain * category_gain * global_gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> SourceId {
        SourceId(n)
    }
    fn sid(n: u64) -> SoundId {
        SoundId(n)
    }

    #[test]
    fn fresh_source_is_unbound_and_silent() {
        let s = Source::new(id(1), sid(1));
        assert!(!s.is_bound());
        assert_eq!(s.fade_time, 0.0);
        assert!(!s.is_fading());
    }

    #[test]
    fn fading_in_iff_positive_fade_speed() {
        let mut s = Source::new(id(1), sid(1));
        s.fade_speed = 1.0;
        assert!(s.is_fading_in());
        assert!(!s.is_fading_out());
        s.fade_speed = -1.0;
        assert!(s.is_fading_out());
        assert!(!s.is_fading_in());
    }

    #[test]
    fn paused_while_fading_out_does_not_report_paused_yet() {
        let mut s = Source::new(id(1), sid(1));
        s.paused = true;
        s.fade_speed = -2.0;
        assert!(!s.is_paused());
        s.fade_speed = 0.0;
        assert!(s.is_paused());
    }

    #[test]
    fn effective_gain_multiplies_all_four_terms() {
        let mut s = Source::new(id(1), sid(1));
        s.gain = 0.5;
        s.fade_time = 0.5;
        assert!((s.effective_gain(0.5, 0.5) - 0.0625).abs() < 1e-6);
    }
}
