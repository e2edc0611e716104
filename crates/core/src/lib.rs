//! Core library for the Cantus score engine.
//!
//! Voices arrive as plain MIDI sequences together with rule violations found
//! elsewhere. This crate decides how to engrave them (one staff per voice,
//! aligned note columns, highlighted violations) and how to sound them (one
//! lazily created synthesizer, every voice scheduled against one shared
//! reference instant).

pub mod config;
pub mod error;
pub mod pitch;
pub mod playback;
pub mod render;
pub mod score;
pub mod synth;

pub use config::{AppConfig, LayoutConfig, PlaybackConfig};
pub use error::{CantusError, Result};
pub use pitch::{decompose, determine_clef, key_signature, Accidental, Clef, Mode, PitchParts};
pub use playback::{schedule, PlaybackEvent, PlaybackScheduler};
pub use render::{
    DrawingSurface, EngravedNote, NotationLayoutEngine, RecordingSurface, RenderState, Staff,
    SvgSurface,
};
pub use score::{ScoreDocument, Severity, Violation, ViolationSummary, Voice, VoiceRole};
pub use synth::{Envelope, Synthesizer, ToneSynth};
