//! Notation layout: turns voices and their violations into engraved staves
//! and draws them onto a caller-owned [`DrawingSurface`].

mod surface;

pub use surface::{DrawingSurface, RecordingSurface, SvgSurface};

use serde::Serialize;

use crate::{
    config::LayoutConfig,
    pitch::{self, Accidental, Clef, Mode, SharpSpelling, Spelling},
    score::{self, Violation, Voice},
    CantusError, Result,
};

/// Horizontal room reserved at the start of each staff for clef, key
/// signature and meter.
pub const MODIFIER_WIDTH: f64 = 90.0;
/// Gap between the last note column and the right end of the staff.
pub const END_PADDING: f64 = 10.0;

/// Canvas dimensions in surface units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Canvas {
    pub width: f64,
    pub height: f64,
}

/// Written duration of an engraved note. Every input pitch currently fills a
/// whole bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteValue {
    Whole,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngravedNote {
    pub midi: i32,
    pub name: &'static str,
    pub octave: i32,
    pub accidental: Option<Accidental>,
    pub highlighted: bool,
    pub duration: NoteValue,
    /// Horizontal position assigned by the shared formatter pass.
    pub x: f64,
}

impl EngravedNote {
    /// Position on the staff counted in letter steps from C-1.
    pub fn diatonic_step(&self) -> i32 {
        pitch::PitchParts {
            pitch_class: self.midi.rem_euclid(12) as u8,
            octave: self.octave,
            name: self.name,
        }
        .diatonic_step()
    }
}

/// One voice's line of notation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Staff {
    pub index: usize,
    pub label: String,
    pub clef: Clef,
    pub key_signature: &'static str,
    pub meter: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub notes: Vec<EngravedNote>,
}

impl Staff {
    pub fn highlighted_count(&self) -> usize {
        self.notes.iter().filter(|note| note.highlighted).count()
    }
}

/// Lifecycle of the engine across render calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderState {
    #[default]
    Idle,
    Rendering,
    Rendered,
    /// The last render aborted part way. The next call starts over.
    Failed,
}

/// Lays out one staff per voice with a shared horizontal grid.
pub struct NotationLayoutEngine {
    config: LayoutConfig,
    spelling: Box<dyn Spelling + Send + Sync>,
    state: RenderState,
}

impl NotationLayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            config,
            spelling: Box::new(SharpSpelling),
            state: RenderState::Idle,
        }
    }

    /// Replaces the default always-sharp spelling.
    pub fn with_spelling(mut self, spelling: impl Spelling + Send + Sync + 'static) -> Self {
        self.spelling = Box::new(spelling);
        self
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    /// Canvas size for `voice_count` staves whose longest voice has
    /// `longest` notes.
    pub fn canvas_for(&self, longest: usize, voice_count: usize) -> Canvas {
        Canvas {
            width: self
                .config
                .minimum_width
                .max(longest as f64 * self.config.per_note_width),
            height: voice_count as f64 * self.config.staff_spacing + self.config.margin,
        }
    }

    /// Replaces whatever `surface` shows with the engraved `voices`.
    ///
    /// `violations_by_voice[i]` annotates `voices[i]`; missing buckets mean no
    /// highlights. Failures are logged and stop the remaining draw calls, but
    /// never reach the caller. Staves drawn before the failure stay on the
    /// surface.
    pub fn render(
        &mut self,
        surface: &mut dyn DrawingSurface,
        voices: &[Voice],
        tonic: i32,
        mode: Mode,
        violations_by_voice: &[Vec<Violation>],
    ) {
        self.state = RenderState::Rendering;

        surface.clear();
        let longest = voices.iter().map(Voice::len).max().unwrap_or(0);
        let canvas = self.canvas_for(longest, voices.len());
        surface.resize(canvas);

        match self.draw_staves(surface, voices, tonic, mode, violations_by_voice, canvas) {
            Ok(drawn) => {
                tracing::debug!(staves = drawn, width = canvas.width, "score rendered");
                self.state = RenderState::Rendered;
            }
            Err(err) => {
                tracing::error!(%err, "rendering aborted");
                self.state = RenderState::Failed;
            }
        }
    }

    fn draw_staves(
        &self,
        surface: &mut dyn DrawingSurface,
        voices: &[Voice],
        tonic: i32,
        mode: Mode,
        violations_by_voice: &[Vec<Violation>],
        canvas: Canvas,
    ) -> Result<usize> {
        let key_signature = pitch::key_signature(tonic, mode);
        let mut staves: Vec<Staff> = voices
            .iter()
            .enumerate()
            .map(|(index, voice)| {
                let violations = violations_by_voice
                    .get(index)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                self.build_staff(index, voice, key_signature, violations, canvas)
            })
            .collect();

        Formatter::for_canvas(&self.config, canvas).format(&mut staves)?;

        for staff in &staves {
            surface.draw_staff(staff)?;
        }
        Ok(staves.len())
    }

    fn build_staff(
        &self,
        index: usize,
        voice: &Voice,
        key_signature: &'static str,
        violations: &[Violation],
        canvas: Canvas,
    ) -> Staff {
        let highlighted = score::highlighted_indices(violations);
        let notes = voice
            .notes
            .iter()
            .enumerate()
            .map(|(position, &midi)| {
                let parts = pitch::notate_or_default(self.spelling.as_ref(), midi);
                EngravedNote {
                    midi: parts.midi(),
                    name: parts.name,
                    octave: parts.octave,
                    accidental: parts.accidental(),
                    highlighted: highlighted.contains(&position),
                    duration: NoteValue::Whole,
                    x: 0.0,
                }
            })
            .collect();

        Staff {
            index,
            label: voice.role.to_string(),
            clef: pitch::determine_clef(&voice.notes),
            key_signature,
            meter: self.config.meter.clone(),
            x: self.config.left_offset,
            y: self.config.top_offset + index as f64 * self.config.staff_spacing,
            width: canvas.width - 2.0 * self.config.left_offset,
            notes,
        }
    }
}

impl Default for NotationLayoutEngine {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

impl std::fmt::Debug for NotationLayoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotationLayoutEngine")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

/// Single horizontal pass shared by every staff: note `n` of every voice gets
/// the same x.
#[derive(Debug, Clone, Copy)]
struct Formatter {
    start_x: f64,
    end_x: f64,
}

impl Formatter {
    fn for_canvas(config: &LayoutConfig, canvas: Canvas) -> Self {
        Self {
            start_x: config.left_offset + MODIFIER_WIDTH,
            end_x: canvas.width - config.left_offset - END_PADDING,
        }
    }

    fn format(&self, staves: &mut [Staff]) -> Result<()> {
        let columns = staves.iter().map(|staff| staff.notes.len()).max().unwrap_or(0);
        if columns == 0 {
            return Ok(());
        }

        let available = self.end_x - self.start_x;
        if available <= 0.0 {
            return Err(CantusError::Surface(format!(
                "no horizontal room for {columns} note columns"
            )));
        }

        let column_width = available / columns as f64;
        for staff in staves.iter_mut() {
            for (column, note) in staff.notes.iter_mut().enumerate() {
                note.x = self.start_x + column_width * (column as f64 + 0.5);
            }
        }
        Ok(())
    }
}
