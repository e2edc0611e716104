use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{synth::Envelope, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub layout: LayoutConfig,
    pub playback: PlaybackConfig,
}

impl AppConfig {
    /// Loads a JSON configuration file. Fields missing from the file keep
    /// their defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        tracing::debug!(?path, "loaded configuration");
        Ok(config)
    }
}

/// Geometry used by the notation layout engine, in surface units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Canvas width floor; long voices grow past it.
    pub minimum_width: f64,
    pub per_note_width: f64,
    /// Vertical distance between consecutive staves.
    pub staff_spacing: f64,
    pub margin: f64,
    pub top_offset: f64,
    pub left_offset: f64,
    pub meter: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            minimum_width: 800.0,
            per_note_width: 80.0,
            staff_spacing: 150.0,
            margin: 50.0,
            top_offset: 40.0,
            left_offset: 10.0,
            meter: "4/4".to_string(),
        }
    }
}

/// Configuration specific to the playback subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub sample_rate: u32,
    pub default_tempo: u32,
    pub volume_db: f32,
    pub envelope: Envelope,
    /// Silence appended after the last release when bouncing to a file.
    pub tail_seconds: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            default_tempo: 120,
            volume_db: 0.0,
            envelope: Envelope::default(),
            tail_seconds: 1.0,
        }
    }
}
