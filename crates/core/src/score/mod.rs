use std::{collections::BTreeSet, fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::{pitch::Mode, Result};

/// Display role of a voice. Only used for labels, never for layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceRole {
    CantusFirmus,
    Counterpoint,
    /// Generic voice, zero-based.
    Voice(usize),
}

impl fmt::Display for VoiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceRole::CantusFirmus => f.write_str("Cantus Firmus"),
            VoiceRole::Counterpoint => f.write_str("Counterpoint"),
            VoiceRole::Voice(index) => write!(f, "Voice {}", index + 1),
        }
    }
}

/// One melodic line: MIDI pitches in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub role: VoiceRole,
    pub notes: Vec<i32>,
}

impl Voice {
    pub fn new(role: VoiceRole, notes: Vec<i32>) -> Self {
        Self { role, notes }
    }

    /// Wraps bare pitch sequences as generically numbered voices.
    pub fn from_sequences<V: AsRef<[i32]>>(sequences: &[V]) -> Vec<Voice> {
        sequences
            .iter()
            .enumerate()
            .map(|(index, notes)| Voice::new(VoiceRole::Voice(index), notes.as_ref().to_vec()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

impl AsRef<[i32]> for Voice {
    fn as_ref(&self) -> &[i32] {
        &self.notes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A rule violation reported by the external evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_code: String,
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    /// Voices the violation belongs to. Only consulted when grouping a flat
    /// list with [`violations_by_voice`].
    #[serde(default)]
    pub voice_indices: Vec<usize>,
    /// Positions inside the voice. Out-of-range indices are simply never
    /// matched.
    #[serde(default)]
    pub note_indices: Vec<usize>,
}

impl Violation {
    pub fn new(rule_code: impl Into<String>, severity: Severity, note_indices: Vec<usize>) -> Self {
        Self {
            rule_code: rule_code.into(),
            severity,
            description: String::new(),
            voice_indices: Vec::new(),
            note_indices,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn for_voices(mut self, voices: Vec<usize>) -> Self {
        self.voice_indices = voices;
        self
    }
}

/// Union of the note indices of every violation, regardless of severity.
pub fn highlighted_indices(violations: &[Violation]) -> BTreeSet<usize> {
    violations
        .iter()
        .flat_map(|violation| violation.note_indices.iter().copied())
        .collect()
}

/// Groups a flat violation list into one bucket per voice.
pub fn violations_by_voice(violations: &[Violation], voice_count: usize) -> Vec<Vec<Violation>> {
    let mut buckets = vec![Vec::new(); voice_count];
    for violation in violations {
        if violation.voice_indices.is_empty() {
            tracing::debug!(rule = %violation.rule_code, "violation has no voice, skipping");
        }
        for &voice in &violation.voice_indices {
            match buckets.get_mut(voice) {
                Some(bucket) => bucket.push(violation.clone()),
                None => tracing::debug!(
                    rule = %violation.rule_code,
                    voice,
                    "violation refers to a missing voice"
                ),
            }
        }
    }
    buckets
}

/// Per-severity tally of a violation list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ViolationSummary {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

impl ViolationSummary {
    pub fn from_violations(violations: &[Violation]) -> Self {
        violations
            .iter()
            .fold(Self::default(), |mut summary, violation| {
                match violation.severity {
                    Severity::Error => summary.errors += 1,
                    Severity::Warning => summary.warnings += 1,
                    Severity::Info => summary.infos += 1,
                }
                summary
            })
    }

    pub fn total(&self) -> usize {
        self.errors + self.warnings + self.infos
    }
}

impl fmt::Display for ViolationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total() == 0 {
            return f.write_str("no violations");
        }

        let parts: Vec<String> = [
            (self.errors, "error"),
            (self.warnings, "warning"),
            (self.infos, "info"),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| {
            let plural = if count == 1 { "" } else { "s" };
            format!("{count} {label}{plural}")
        })
        .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Everything the controller hands over for one render or playback request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDocument {
    /// Pitch class of the tonic, 0 = C.
    pub tonic: i32,
    pub mode: Mode,
    pub voices: Vec<Voice>,
    #[serde(default)]
    pub violations: Vec<Violation>,
}

impl ScoreDocument {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn violations_by_voice(&self) -> Vec<Vec<Violation>> {
        violations_by_voice(&self.violations, self.voices.len())
    }

    pub fn summary(&self) -> ViolationSummary {
        ViolationSummary::from_violations(&self.violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "tonic": 2,
        "mode": "dorian",
        "voices": [
            { "role": "counterpoint", "notes": [62, 65, 64] },
            { "role": "cantus_firmus", "notes": [50, 53, 52] }
        ],
        "violations": [
            {
                "rule_code": "P5_PARALLEL",
                "severity": "error",
                "description": "parallel fifths",
                "voice_indices": [0],
                "note_indices": [1, 2]
            },
            {
                "rule_code": "LEAP",
                "severity": "warning",
                "voice_indices": [0, 1],
                "note_indices": [0]
            },
            { "rule_code": "GLOBAL", "severity": "info" }
        ]
    }"#;

    #[test]
    fn parses_document_and_groups_violations() {
        let document = ScoreDocument::from_json_str(DOCUMENT).unwrap();
        assert_eq!(document.mode, Mode::Dorian);
        assert_eq!(document.voices[1].role, VoiceRole::CantusFirmus);

        let grouped = document.violations_by_voice();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].len(), 2);
        assert_eq!(grouped[1].len(), 1);
        assert_eq!(
            highlighted_indices(&grouped[0]).into_iter().collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn grouping_ignores_unknown_voices() {
        let violations = vec![Violation::new("X", Severity::Error, vec![0]).for_voices(vec![5])];
        let grouped = violations_by_voice(&violations, 2);
        assert!(grouped.iter().all(Vec::is_empty));
    }

    #[test]
    fn summary_counts_and_describes() {
        let document = ScoreDocument::from_json_str(DOCUMENT).unwrap();
        let summary = document.summary();
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.to_string(), "1 error, 1 warning, 1 info");
        assert_eq!(ViolationSummary::default().to_string(), "no violations");

        let value = serde_json::to_value(summary).unwrap();
        assert_eq!(value["errors"], 1);
        assert_eq!(value["infos"], 1);
    }

    #[test]
    fn labels_follow_roles() {
        assert_eq!(VoiceRole::CantusFirmus.to_string(), "Cantus Firmus");
        assert_eq!(VoiceRole::Voice(2).to_string(), "Voice 3");

        let voices = Voice::from_sequences(&[vec![60], vec![48, 50]]);
        assert_eq!(voices[1].role, VoiceRole::Voice(1));
        assert_eq!(voices[1].len(), 2);
    }

    #[test]
    fn rejects_unknown_modes() {
        let raw = r#"{ "tonic": 0, "mode": "bebop", "voices": [] }"#;
        assert!(ScoreDocument::from_json_str(raw).is_err());
    }
}
