//! Turns voices and a tempo into timed note events on a lazily created
//! [`Synthesizer`].

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::{pitch, synth::Synthesizer, CantusError, Result};

/// Creates the sound-producing resource on first use.
pub type SynthFactory<S> = Box<dyn Fn() -> Result<S> + Send + Sync>;

/// One note of one voice placed on the synthesizer clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackEvent {
    pub voice: usize,
    pub midi: i32,
    /// Seconds on the synthesizer clock.
    pub onset: f64,
    pub duration: f64,
}

/// Length in seconds of one whole note at `tempo` quarter notes per minute.
pub fn note_period(tempo: u32) -> f64 {
    240.0 / f64::from(tempo)
}

/// Lays every voice out against one shared `reference` instant.
///
/// Note `i` of every voice starts at `reference + i * period`. Shorter voices
/// simply stop contributing events. Events come out ordered by onset, then by
/// voice.
pub fn schedule<V: AsRef<[i32]>>(voices: &[V], tempo: u32, reference: f64) -> Vec<PlaybackEvent> {
    let period = note_period(tempo);
    let longest = voices.iter().map(|voice| voice.as_ref().len()).max().unwrap_or(0);

    let mut events = Vec::new();
    for index in 0..longest {
        let onset = reference + index as f64 * period;
        for (voice, notes) in voices.iter().enumerate() {
            if let Some(&midi) = notes.as_ref().get(index) {
                events.push(PlaybackEvent {
                    voice,
                    midi,
                    onset,
                    duration: period,
                });
            }
        }
    }
    events
}

/// Owns one synthesizer, created on the first call that needs it.
///
/// Overlapping [`play`](Self::play) calls are not coordinated: both event sets
/// land on the same clock and sound together.
pub struct PlaybackScheduler<S> {
    factory: SynthFactory<S>,
    synth: Mutex<Option<Arc<S>>>,
}

impl<S: Synthesizer> PlaybackScheduler<S> {
    /// Stores `factory` without calling it.
    pub fn new(factory: impl Fn() -> Result<S> + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            synth: Mutex::new(None),
        }
    }

    /// Schedules every note of every voice and returns how many events were
    /// enqueued. Does not wait for the audio to finish.
    ///
    /// If the synthesizer cannot be created the call logs and schedules
    /// nothing.
    pub fn play<V: AsRef<[i32]>>(&self, voices: &[V], tempo: u32) -> usize {
        match self.try_play(voices, tempo) {
            Ok(count) => count,
            Err(err) => {
                tracing::error!(%err, tempo, "playback skipped");
                0
            }
        }
    }

    /// Sounds a single pitch right away, e.g. for previewing a note.
    pub fn play_note(&self, midi: i32, duration: f64) {
        match self.acquire() {
            Ok(synth) => {
                let now = synth.now();
                synth.trigger_attack_release(midi, duration, now);
            }
            Err(err) => tracing::error!(%err, midi, "note preview skipped"),
        }
    }

    /// Silences whatever is sounding now. Onsets already handed to the
    /// synthesizer still fire. Does nothing before the first `play`.
    pub fn stop(&self) {
        match self.lock_synth() {
            Ok(slot) => {
                if let Some(synth) = slot.as_ref() {
                    synth.release_all();
                }
            }
            Err(err) => tracing::warn!(%err, "stop ignored"),
        }
    }

    /// Forwards to the synthesizer if it exists; never creates it.
    pub fn set_volume(&self, db: f32) {
        if let Some(synth) = self.synthesizer() {
            synth.set_volume(db);
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.synthesizer().is_some()
    }

    /// The synthesizer, if a previous call already created it.
    pub fn synthesizer(&self) -> Option<Arc<S>> {
        self.lock_synth()
            .ok()
            .and_then(|slot| slot.as_ref().map(Arc::clone))
    }

    fn try_play<V: AsRef<[i32]>>(&self, voices: &[V], tempo: u32) -> Result<usize> {
        if tempo == 0 {
            return Err(CantusError::msg("tempo must be at least 1 BPM"));
        }

        let synth = self.acquire()?;
        let reference = synth.now();
        let events = schedule(voices, tempo, reference);

        for event in &events {
            tracing::trace!(
                voice = event.voice,
                note = %pitch::note_name(event.midi),
                onset = event.onset,
                "enqueue"
            );
            synth.trigger_attack_release(event.midi, event.duration, event.onset);
        }

        tracing::debug!(
            voices = voices.len(),
            events = events.len(),
            tempo,
            reference,
            "playback scheduled"
        );
        Ok(events.len())
    }

    /// Check-then-create under the lock, so concurrent first calls build at
    /// most one synthesizer. A failed creation leaves the slot empty.
    fn acquire(&self) -> Result<Arc<S>> {
        let mut slot = self.lock_synth()?;
        if let Some(synth) = slot.as_ref() {
            return Ok(Arc::clone(synth));
        }

        tracing::info!("initialising synthesizer");
        let synth = Arc::new((self.factory)()?);
        *slot = Some(Arc::clone(&synth));
        Ok(synth)
    }

    fn lock_synth(&self) -> Result<MutexGuard<'_, Option<Arc<S>>>> {
        self.synth
            .lock()
            .map_err(|_| CantusError::msg("synthesizer slot has been poisoned"))
    }
}

impl<S> std::fmt::Debug for PlaybackScheduler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let initialized = self
            .synth
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        f.debug_struct("PlaybackScheduler")
            .field("initialized", &initialized)
            .finish()
    }
}
