//! Sound-producing resources driven by the playback scheduler.

mod export;
#[cfg(feature = "live")]
mod live;

pub use export::write_wav;
#[cfg(feature = "live")]
pub use live::LiveOutput;

use std::{
    f64::consts::TAU,
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use crate::{pitch, CantusError, Result};

/// Mix level per sounding note before clipping.
const VOICE_GAIN: f32 = 0.25;
const BLOCK_SIZE: usize = 1024;

/// Anything that can sound a pitch at a point on its own clock.
///
/// Calls are fire-and-forget. Implementations log their own failures.
pub trait Synthesizer {
    /// Current reading of the monotonic clock events are scheduled against,
    /// in seconds.
    fn now(&self) -> f64;

    /// Sounds `midi` for `duration` seconds starting at clock time `at`.
    fn trigger_attack_release(&self, midi: i32, duration: f64, at: f64);

    /// Silences every note sounding right now. Notes scheduled for later
    /// still play.
    fn release_all(&self);

    fn set_volume(&self, _db: f32) {}
}

/// Amplitude envelope in seconds, sustain as a level in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            attack: 0.02,
            decay: 0.1,
            sustain: 0.3,
            release: 1.0,
        }
    }
}

impl Envelope {
    /// Level while the key is held, `elapsed` seconds after the attack began.
    pub fn held_level(&self, elapsed: f64) -> f64 {
        if elapsed < self.attack {
            elapsed / self.attack
        } else if elapsed < self.attack + self.decay {
            let t = (elapsed - self.attack) / self.decay;
            1.0 + (self.sustain - 1.0) * t
        } else {
            self.sustain
        }
    }

    /// Level `elapsed` seconds into a note whose key is held for `gate`
    /// seconds. Zero once the release has finished.
    pub fn amplitude(&self, elapsed: f64, gate: f64) -> f64 {
        if elapsed < 0.0 {
            return 0.0;
        }
        if elapsed < gate {
            return self.held_level(elapsed);
        }

        let released_for = elapsed - gate;
        if released_for >= self.release {
            0.0
        } else {
            self.held_level(gate) * (1.0 - released_for / self.release)
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScheduledNote {
    midi: i32,
    start: u64,
    gate: u64,
}

#[derive(Debug, Clone, Copy)]
struct SoundingNote {
    note: ScheduledNote,
    increment: f64,
    phase: f64,
}

#[derive(Debug)]
struct SynthState {
    position: u64,
    /// Sorted by start sample.
    pending: Vec<ScheduledNote>,
    sounding: Vec<SoundingNote>,
    gain: f32,
}

/// Polyphonic sine synthesizer clocked by the samples it has rendered.
///
/// Cloning yields another handle onto the same voices and clock.
#[derive(Debug, Clone)]
pub struct ToneSynth {
    sample_rate: u32,
    envelope: Envelope,
    state: Arc<Mutex<SynthState>>,
}

impl ToneSynth {
    pub fn new(sample_rate: u32, envelope: Envelope) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            envelope,
            state: Arc::new(Mutex::new(SynthState {
                position: 0,
                pending: Vec::new(),
                sounding: Vec::new(),
                gain: 1.0,
            })),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of notes sounding right now.
    pub fn sounding(&self) -> Result<usize> {
        Ok(self.lock_state()?.sounding.len())
    }

    /// Number of notes scheduled but not yet started.
    pub fn pending(&self) -> Result<usize> {
        Ok(self.lock_state()?.pending.len())
    }

    /// Clock time at which the last known note finishes its release.
    pub fn end_time(&self) -> Result<f64> {
        let state = self.lock_state()?;
        let release = self.seconds_to_samples(self.envelope.release);
        let last = state
            .pending
            .iter()
            .chain(state.sounding.iter().map(|sounding| &sounding.note))
            .map(|note| note.start + note.gate + release)
            .max()
            .unwrap_or(state.position);
        Ok(self.samples_to_seconds(last.max(state.position)))
    }

    /// Renders the next `out.len()` mono samples and advances the clock.
    pub fn render(&self, out: &mut [f32]) -> Result<()> {
        let mut state = self.lock_state()?;
        let rate = f64::from(self.sample_rate);
        let release = self.seconds_to_samples(self.envelope.release);

        for sample in out.iter_mut() {
            let position = state.position;
            let due = state.pending.partition_point(|note| note.start <= position);
            let started: Vec<ScheduledNote> = state.pending.drain(..due).collect();
            state.sounding.extend(started.into_iter().map(|note| {
                let increment = TAU * pitch::frequency(note.midi) / rate;
                SoundingNote {
                    note,
                    // Pitches too high for an f64 frequency stay silent.
                    increment: if increment.is_finite() { increment } else { 0.0 },
                    phase: 0.0,
                }
            }));

            let mut mix = 0.0f64;
            for sounding in state.sounding.iter_mut() {
                let elapsed = (position - sounding.note.start) as f64 / rate;
                let gate = sounding.note.gate as f64 / rate;
                mix += sounding.phase.sin() * self.envelope.amplitude(elapsed, gate);
                sounding.phase = (sounding.phase + sounding.increment) % TAU;
            }
            state
                .sounding
                .retain(|sounding| position < sounding.note.start + sounding.note.gate + release);

            *sample = soft_clip(mix as f32 * VOICE_GAIN * state.gain);
            state.position += 1;
        }
        Ok(())
    }

    /// Renders `seconds` of audio from the current clock position.
    pub fn bounce(&self, seconds: f64) -> Result<Vec<f32>> {
        let total = self.seconds_to_samples(seconds.max(0.0)) as usize;
        let mut samples = vec![0.0f32; total];
        for block in samples.chunks_mut(BLOCK_SIZE) {
            self.render(block)?;
        }
        Ok(samples)
    }

    fn seconds_to_samples(&self, seconds: f64) -> u64 {
        (seconds * f64::from(self.sample_rate)).round() as u64
    }

    fn samples_to_seconds(&self, samples: u64) -> f64 {
        samples as f64 / f64::from(self.sample_rate)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, SynthState>> {
        self.state
            .lock()
            .map_err(|_| CantusError::Audio("synth state has been poisoned".to_string()))
    }
}

impl Synthesizer for ToneSynth {
    fn now(&self) -> f64 {
        match self.lock_state() {
            Ok(state) => self.samples_to_seconds(state.position),
            Err(err) => {
                tracing::warn!(%err, "reading synth clock");
                0.0
            }
        }
    }

    fn trigger_attack_release(&self, midi: i32, duration: f64, at: f64) {
        let note = ScheduledNote {
            midi,
            start: self.seconds_to_samples(at.max(0.0)),
            gate: self.seconds_to_samples(duration.max(0.0)),
        };
        match self.lock_state() {
            Ok(mut state) => {
                let index = state.pending.partition_point(|queued| queued.start <= note.start);
                state.pending.insert(index, note);
            }
            Err(err) => tracing::warn!(%err, midi, "dropping note"),
        }
    }

    fn release_all(&self) {
        match self.lock_state() {
            Ok(mut state) => {
                let released = state.sounding.len();
                state.sounding.clear();
                if released > 0 {
                    tracing::debug!(released, "released sounding notes");
                }
            }
            Err(err) => tracing::warn!(%err, "release_all failed"),
        }
    }

    fn set_volume(&self, db: f32) {
        match self.lock_state() {
            Ok(mut state) => state.gain = 10f32.powf(db / 20.0),
            Err(err) => tracing::warn!(%err, "set_volume failed"),
        }
    }
}

/// Soft clipping for mixes that exceed full scale.
fn soft_clip(sample: f32) -> f32 {
    if sample.abs() <= 1.0 {
        sample
    } else {
        sample.signum() * (1.0 + (sample.abs() - 1.0).tanh() * 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth() -> ToneSynth {
        ToneSynth::new(1_000, Envelope::default())
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |max, sample| max.max(sample.abs()))
    }

    #[test]
    fn envelope_phases() {
        let env = Envelope::default();
        assert_eq!(env.amplitude(0.0, 1.0), 0.0);
        assert!((env.amplitude(0.02, 1.0) - 1.0).abs() < 1e-9);
        assert!((env.amplitude(0.5, 1.0) - 0.3).abs() < 1e-9);
        assert!((env.amplitude(1.5, 1.0) - 0.15).abs() < 1e-9);
        assert_eq!(env.amplitude(2.0, 1.0), 0.0);
        assert_eq!(env.amplitude(-0.1, 1.0), 0.0);
    }

    #[test]
    fn clock_advances_with_rendered_samples() {
        let synth = synth();
        assert_eq!(synth.now(), 0.0);
        synth.bounce(0.5).unwrap();
        assert!((synth.now() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn scheduled_note_starts_on_time() {
        let synth = synth();
        synth.trigger_attack_release(69, 0.5, 0.25);
        assert_eq!(synth.pending().unwrap(), 1);

        let before = synth.bounce(0.25).unwrap();
        assert_eq!(peak(&before), 0.0);

        let during = synth.bounce(0.25).unwrap();
        assert!(peak(&during) > 0.0);
        assert_eq!(synth.sounding().unwrap(), 1);
        assert!((synth.end_time().unwrap() - 1.75).abs() < 1e-9);
    }

    #[test]
    fn notes_finish_after_release() {
        let synth = synth();
        synth.trigger_attack_release(60, 0.1, 0.0);
        synth.bounce(1.2).unwrap();
        assert_eq!(synth.sounding().unwrap(), 0);
        assert_eq!(synth.pending().unwrap(), 0);
    }

    #[test]
    fn release_all_keeps_future_notes() {
        let synth = synth();
        synth.trigger_attack_release(60, 1.0, 0.0);
        synth.trigger_attack_release(64, 1.0, 2.0);
        synth.bounce(0.1).unwrap();

        synth.release_all();
        assert_eq!(synth.sounding().unwrap(), 0);
        assert_eq!(synth.pending().unwrap(), 1);
        assert_eq!(peak(&synth.bounce(0.5).unwrap()), 0.0);

        synth.release_all();
        assert_eq!(synth.pending().unwrap(), 1);
    }

    #[test]
    fn extreme_pitches_render_without_panicking() {
        let synth = synth();
        synth.trigger_attack_release(i32::MIN, 0.1, 0.0);
        synth.trigger_attack_release(i32::MAX, 0.1, 0.0);

        let samples = synth.bounce(0.01).unwrap();
        assert!(samples.iter().all(|sample| sample.is_finite()));
    }

    #[test]
    fn volume_scales_output() {
        let loud = synth();
        let quiet = synth();
        quiet.set_volume(-20.0);
        for synth in [&loud, &quiet] {
            synth.trigger_attack_release(69, 1.0, 0.0);
        }

        let loud_peak = peak(&loud.bounce(0.2).unwrap());
        let quiet_peak = peak(&quiet.bounce(0.2).unwrap());
        assert!((quiet_peak - loud_peak * 0.1).abs() < 1e-4);
    }

    #[test]
    fn clones_share_the_clock() {
        let synth = synth();
        let handle = synth.clone();
        handle.bounce(0.1).unwrap();
        assert!((synth.now() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn soft_clip_bounds_loud_mixes() {
        assert_eq!(soft_clip(0.5), 0.5);
        assert!(soft_clip(4.0) < 1.5);
        assert!(soft_clip(-4.0) > -1.5);
    }
}
