//! Pure conversions between MIDI note numbers and notated pitches.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{CantusError, Result};

/// Enharmonic table used by [`SharpSpelling`]. Index is the pitch class.
pub const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Middle C. Voices whose mean sits below it are written in the bass clef.
pub const MIDDLE_C: i32 = 60;

/// Pitch substituted for values that cannot be notated.
pub const FALLBACK_MIDI: i32 = MIDDLE_C;

const NOTATED_RANGE: std::ops::RangeInclusive<i32> = 0..=127;

/// Staff symbol fixing the pitch range of a staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Clef {
    Treble,
    Bass,
}

impl Clef {
    /// Diatonic step (see [`PitchParts::diatonic_step`]) of the bottom staff
    /// line: E4 for treble, G2 for bass.
    pub fn bottom_line_step(self) -> i32 {
        match self {
            Clef::Treble => 2 + 7 * 4,
            Clef::Bass => 4 + 7 * 2,
        }
    }
}

impl fmt::Display for Clef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clef::Treble => f.write_str("treble"),
            Clef::Bass => f.write_str("bass"),
        }
    }
}

/// Church modes accepted alongside a tonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Ionian,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Aeolian,
    Locrian,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Ionian => "ionian",
            Mode::Dorian => "dorian",
            Mode::Phrygian => "phrygian",
            Mode::Lydian => "lydian",
            Mode::Mixolydian => "mixolydian",
            Mode::Aeolian => "aeolian",
            Mode::Locrian => "locrian",
        };
        f.write_str(name)
    }
}

/// Sign written in front of a note head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accidental {
    Sharp,
    Flat,
}

/// Chooses the letter name used for a pitch class.
pub trait Spelling {
    fn spell(&self, pitch_class: u8) -> &'static str;
}

/// Always spells black keys with a sharp, regardless of key.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharpSpelling;

impl Spelling for SharpSpelling {
    fn spell(&self, pitch_class: u8) -> &'static str {
        SHARP_NAMES[usize::from(pitch_class % 12)]
    }
}

/// A MIDI number split into pitch class, octave and spelled name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchParts {
    pub pitch_class: u8,
    pub octave: i32,
    pub name: &'static str,
}

impl PitchParts {
    /// Inverse of [`decompose`]. Saturates for octaves no `i32` can reach.
    pub fn midi(&self) -> i32 {
        let wide = i64::from(self.pitch_class) + 12 * (i64::from(self.octave) + 1);
        wide.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    /// Accidental carried by the spelled name, read after the letter.
    pub fn accidental(&self) -> Option<Accidental> {
        match self.name.get(1..)?.chars().next()? {
            '#' => Some(Accidental::Sharp),
            'b' => Some(Accidental::Flat),
            _ => None,
        }
    }

    pub fn has_accidental(&self) -> bool {
        self.accidental().is_some()
    }

    /// Position on the staff counted in letter steps from C-1.
    pub fn diatonic_step(&self) -> i32 {
        let letter = match self.name.as_bytes().first() {
            Some(b'C') => 0,
            Some(b'D') => 1,
            Some(b'E') => 2,
            Some(b'F') => 3,
            Some(b'G') => 4,
            Some(b'A') => 5,
            Some(b'B') => 6,
            _ => 0,
        };
        letter + 7 * self.octave
    }

    /// Key in the `name/octave` form used by staff surfaces, e.g. `C#/4`.
    pub fn staff_key(&self) -> String {
        format!("{}/{}", self.name, self.octave)
    }
}

impl fmt::Display for PitchParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.octave)
    }
}

/// Splits `midi` using the always-sharp table.
///
/// `pitch_class + 12 * (octave + 1) == midi` holds for every input, including
/// negative ones, because the split uses Euclidean division.
pub fn decompose(midi: i32) -> PitchParts {
    decompose_with(&SharpSpelling, midi)
}

pub fn decompose_with(spelling: &dyn Spelling, midi: i32) -> PitchParts {
    let pitch_class = midi.rem_euclid(12) as u8;
    PitchParts {
        pitch_class,
        octave: midi.div_euclid(12) - 1,
        name: spelling.spell(pitch_class),
    }
}

/// Like [`decompose_with`] but rejects values outside the MIDI table.
pub fn notate(spelling: &dyn Spelling, midi: i32) -> Result<PitchParts> {
    if NOTATED_RANGE.contains(&midi) {
        Ok(decompose_with(spelling, midi))
    } else {
        Err(CantusError::InvalidPitch(midi))
    }
}

/// Notates `midi`, substituting middle C when it cannot be notated.
pub fn notate_or_default(spelling: &dyn Spelling, midi: i32) -> PitchParts {
    notate(spelling, midi).unwrap_or_else(|err| {
        tracing::warn!(midi, %err, "substituting default pitch");
        decompose_with(spelling, FALLBACK_MIDI)
    })
}

/// Scientific pitch name such as `C#4`.
pub fn note_name(midi: i32) -> String {
    decompose(midi).to_string()
}

/// Equal-tempered frequency in Hz with A4 = 440.
pub fn frequency(midi: i32) -> f64 {
    440.0 * 2f64.powf((f64::from(midi) - 69.0) / 12.0)
}

/// Treble unless the mean pitch of the voice lies strictly below middle C.
pub fn determine_clef(voice: &[i32]) -> Clef {
    if voice.is_empty() {
        return Clef::Treble;
    }

    let sum: i64 = voice.iter().map(|&midi| i64::from(midi)).sum();
    let mean = sum as f64 / voice.len() as f64;
    if mean < f64::from(MIDDLE_C) {
        Clef::Bass
    } else {
        Clef::Treble
    }
}

/// Key-signature symbol for a tonic (pitch class, 0 = C) and mode.
///
/// The table only knows a handful of keys. Anything else resolves to C major.
pub fn key_signature(tonic: i32, mode: Mode) -> &'static str {
    let symbol = match (tonic, mode) {
        (0, Mode::Ionian) => Some("C"),
        (2, Mode::Ionian) => Some("D"),
        (4, Mode::Ionian) => Some("E"),
        (5, Mode::Ionian) => Some("F"),
        (7, Mode::Ionian) => Some("G"),
        (9, Mode::Ionian) => Some("A"),
        (11, Mode::Ionian) => Some("B"),
        (9, Mode::Aeolian) => Some("Am"),
        _ => None,
    };

    symbol.unwrap_or_else(|| {
        tracing::debug!(tonic, %mode, "no key signature mapped, using C");
        "C"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decomposition_round_trips_across_midi_range() {
        for midi in 0..=127 {
            let parts = decompose(midi);
            assert_eq!(
                i32::from(parts.pitch_class) + 12 * (parts.octave + 1),
                midi
            );
            assert_eq!(parts.name, SHARP_NAMES[usize::from(parts.pitch_class)]);
        }
    }

    #[test]
    fn negative_values_still_satisfy_the_split() {
        let parts = decompose(-1);
        assert_eq!(parts.pitch_class, 11);
        assert_eq!(parts.octave, -2);
        assert_eq!(parts.midi(), -1);
    }

    #[test]
    fn names_middle_c_and_its_neighbours() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(61), "C#4");
        assert_eq!(note_name(69), "A4");
        assert_eq!(decompose(70).staff_key(), "A#/4");
        assert!(decompose(66).has_accidental());
        assert!(!decompose(67).has_accidental());
    }

    #[test]
    fn clef_follows_mean_pitch() {
        assert_eq!(determine_clef(&[]), Clef::Treble);
        assert_eq!(determine_clef(&[48, 50]), Clef::Bass);
        assert_eq!(determine_clef(&[60, 64]), Clef::Treble);
        assert_eq!(determine_clef(&[59, 60]), Clef::Bass);
        assert_eq!(determine_clef(&[60]), Clef::Treble);
    }

    #[test]
    fn key_signature_falls_back_to_c() {
        assert_eq!(key_signature(0, Mode::Ionian), "C");
        assert_eq!(key_signature(7, Mode::Ionian), "G");
        assert_eq!(key_signature(9, Mode::Aeolian), "Am");
        assert_eq!(key_signature(99, Mode::Ionian), "C");
        assert_eq!(key_signature(2, Mode::Dorian), "C");
    }

    #[test]
    fn out_of_table_values_fall_back_to_middle_c() {
        assert!(matches!(
            notate(&SharpSpelling, 128),
            Err(CantusError::InvalidPitch(128))
        ));
        let parts = notate_or_default(&SharpSpelling, -5);
        assert_eq!(parts.midi(), FALLBACK_MIDI);
        assert_eq!(parts.staff_key(), "C/4");
    }

    #[test]
    fn diatonic_steps_place_clef_reference_lines() {
        assert_eq!(decompose(64).diatonic_step(), Clef::Treble.bottom_line_step());
        assert_eq!(decompose(43).diatonic_step(), Clef::Bass.bottom_line_step());
    }

    struct FlatSpelling;

    impl Spelling for FlatSpelling {
        fn spell(&self, pitch_class: u8) -> &'static str {
            ["C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B"]
                [usize::from(pitch_class % 12)]
        }
    }

    #[test]
    fn accidental_follows_the_spelled_name() {
        assert_eq!(decompose(70).accidental(), Some(Accidental::Sharp));
        assert_eq!(decompose_with(&FlatSpelling, 70).accidental(), Some(Accidental::Flat));
        assert_eq!(decompose_with(&FlatSpelling, 71).accidental(), None);
        assert_eq!(decompose(71).accidental(), None);
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        assert_eq!(decompose(i32::MIN).midi(), i32::MIN);
        assert_eq!(decompose(i32::MAX).midi(), i32::MAX);
        assert!(frequency(i32::MIN).is_finite());
        assert!(frequency(i32::MIN) >= 0.0);
    }

    #[test]
    fn a4_is_concert_pitch() {
        assert!((frequency(69) - 440.0).abs() < 1e-9);
        assert!((frequency(81) - 880.0).abs() < 1e-9);
    }
}
