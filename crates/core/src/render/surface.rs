use std::fmt::Write as _;

use crate::{
    pitch::{Accidental, Clef},
    Result,
};

use super::{Canvas, Staff};

/// Distance between two staff lines.
const LINE_SPACING: f64 = 10.0;
const NOTEHEAD_RX: f64 = 6.5;
const NOTEHEAD_RY: f64 = 4.5;
const LEDGER_EXTEND: f64 = 5.0;

const INK: &str = "#1a1a1a";
const STAFF_COLOR: &str = "#555555";
const HIGHLIGHT: &str = "#d32f2f";

/// Destination the layout engine draws onto. Owned by the caller.
pub trait DrawingSurface {
    /// Drops everything drawn so far.
    fn clear(&mut self);

    fn resize(&mut self, canvas: Canvas);

    fn draw_staff(&mut self, staff: &Staff) -> Result<()>;
}

/// Keeps the staves it was asked to draw so they can be inspected.
#[derive(Debug, Default, Clone)]
pub struct RecordingSurface {
    canvas: Option<Canvas>,
    staves: Vec<Staff>,
    clears: usize,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn canvas(&self) -> Option<Canvas> {
        self.canvas
    }

    pub fn staves(&self) -> &[Staff] {
        &self.staves
    }

    pub fn clear_count(&self) -> usize {
        self.clears
    }
}

impl DrawingSurface for RecordingSurface {
    fn clear(&mut self) {
        self.canvas = None;
        self.staves.clear();
        self.clears += 1;
    }

    fn resize(&mut self, canvas: Canvas) {
        self.canvas = Some(canvas);
    }

    fn draw_staff(&mut self, staff: &Staff) -> Result<()> {
        self.staves.push(staff.clone());
        Ok(())
    }
}

/// Writes staves as SVG markup.
#[derive(Debug, Clone)]
pub struct SvgSurface {
    canvas: Canvas,
    body: String,
}

impl SvgSurface {
    pub fn new() -> Self {
        Self {
            canvas: Canvas {
                width: 0.0,
                height: 0.0,
            },
            body: String::new(),
        }
    }

    /// Complete standalone SVG document for everything drawn so far.
    pub fn to_svg(&self) -> String {
        let Canvas { width, height } = self.canvas;
        format!(
            concat!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" "#,
                r#"viewBox="0 0 {w} {h}">"#,
                "\n",
                r#"<rect width="100%" height="100%" fill="white"/>"#,
                "\n{body}</svg>\n"
            ),
            w = width,
            h = height,
            body = self.body
        )
    }

    fn staff_lines(&mut self, staff: &Staff) -> Result<()> {
        for line in 0..5u8 {
            let y = staff.y + f64::from(line) * LINE_SPACING;
            writeln!(
                self.body,
                r#"<line x1="{x1}" y1="{y}" x2="{x2}" y2="{y}" stroke="{STAFF_COLOR}" stroke-width="0.8"/>"#,
                x1 = staff.x,
                x2 = staff.x + staff.width,
            )?;
        }
        Ok(())
    }

    fn modifiers(&mut self, staff: &Staff) -> Result<()> {
        let clef = match staff.clef {
            Clef::Treble => "\u{1D11E}",
            Clef::Bass => "\u{1D122}",
        };
        let middle = staff.y + 2.0 * LINE_SPACING;
        writeln!(
            self.body,
            r#"<text x="{x}" y="{y}" font-size="11" fill="{INK}">{label}</text>"#,
            x = staff.x,
            y = staff.y - 12.0,
            label = escape(&staff.label),
        )?;
        writeln!(
            self.body,
            r#"<text x="{x}" y="{y}" font-size="40" fill="{INK}" class="clef-{clef_name}">{clef}</text>"#,
            x = staff.x + 4.0,
            y = staff.y + 4.0 * LINE_SPACING,
            clef_name = staff.clef,
        )?;
        writeln!(
            self.body,
            r#"<text x="{x}" y="{y}" font-size="12" fill="{INK}" class="key">{key}</text>"#,
            x = staff.x + 36.0,
            y = middle + 4.0,
            key = escape(staff.key_signature),
        )?;
        let (upper, lower) = staff.meter.split_once('/').unwrap_or((staff.meter.as_str(), ""));
        writeln!(
            self.body,
            r#"<text x="{x}" y="{y1}" font-size="16" font-weight="bold" fill="{INK}">{upper}</text><text x="{x}" y="{y2}" font-size="16" font-weight="bold" fill="{INK}">{lower}</text>"#,
            x = staff.x + 62.0,
            y1 = middle - 2.0,
            y2 = middle + 18.0,
            upper = escape(upper),
            lower = escape(lower),
        )?;
        Ok(())
    }

    fn notes(&mut self, staff: &Staff) -> Result<()> {
        let bottom_line = staff.y + 4.0 * LINE_SPACING;
        let reference = staff.clef.bottom_line_step();

        for note in &staff.notes {
            let offset = note.diatonic_step() - reference;
            let y = bottom_line - f64::from(offset) * LINE_SPACING / 2.0;
            let color = if note.highlighted { HIGHLIGHT } else { INK };

            for ledger in ledger_offsets(offset) {
                let ly = bottom_line - f64::from(ledger) * LINE_SPACING / 2.0;
                writeln!(
                    self.body,
                    r#"<line x1="{x1}" y1="{ly}" x2="{x2}" y2="{ly}" stroke="{STAFF_COLOR}" stroke-width="0.8"/>"#,
                    x1 = note.x - NOTEHEAD_RX - LEDGER_EXTEND,
                    x2 = note.x + NOTEHEAD_RX + LEDGER_EXTEND,
                )?;
            }

            if let Some(accidental) = note.accidental {
                let glyph = match accidental {
                    Accidental::Sharp => "&#9839;",
                    Accidental::Flat => "&#9837;",
                };
                writeln!(
                    self.body,
                    r#"<text x="{x}" y="{ty}" font-size="16" fill="{color}">{glyph}</text>"#,
                    x = note.x - NOTEHEAD_RX - 12.0,
                    ty = y + 5.0,
                )?;
            }

            writeln!(
                self.body,
                r#"<ellipse cx="{cx}" cy="{y}" rx="{NOTEHEAD_RX}" ry="{NOTEHEAD_RY}" fill="none" stroke="{color}" stroke-width="2" data-note="{name}{octave}"/>"#,
                cx = note.x,
                name = note.name,
                octave = note.octave,
            )?;
        }
        Ok(())
    }
}

impl Default for SvgSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawingSurface for SvgSurface {
    fn clear(&mut self) {
        self.body.clear();
    }

    fn resize(&mut self, canvas: Canvas) {
        self.canvas = canvas;
    }

    fn draw_staff(&mut self, staff: &Staff) -> Result<()> {
        writeln!(self.body, r#"<g class="staff" data-index="{}">"#, staff.index)?;
        self.staff_lines(staff)?;
        self.modifiers(staff)?;
        self.notes(staff)?;
        writeln!(self.body, "</g>")?;
        Ok(())
    }
}

/// Half-step offsets (relative to the bottom line) that need a ledger line
/// for a note sitting at `offset`.
fn ledger_offsets(offset: i32) -> Vec<i32> {
    if offset <= -2 {
        (offset..=-2).rev().filter(|step| step % 2 == 0).collect()
    } else if offset >= 10 {
        (10..=offset).filter(|step| step % 2 == 0).collect()
    } else {
        Vec::new()
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pitch::{Mode, Spelling},
        render::NotationLayoutEngine,
        score::{Severity, Violation, Voice},
    };

    #[test]
    fn ledger_lines_only_outside_the_staff() {
        assert!(ledger_offsets(0).is_empty());
        assert!(ledger_offsets(8).is_empty());
        // Middle C in treble sits two half-steps under the bottom line.
        assert_eq!(ledger_offsets(-2), vec![-2]);
        assert_eq!(ledger_offsets(-5), vec![-2, -4]);
        assert_eq!(ledger_offsets(12), vec![10, 12]);
    }

    #[test]
    fn svg_contains_highlighted_and_sharp_notes() {
        let mut engine = NotationLayoutEngine::default();
        let mut surface = SvgSurface::new();
        let voices = Voice::from_sequences(&[vec![60, 66], vec![48, 50]]);
        let violations = vec![vec![Violation::new("TRITONE", Severity::Error, vec![1])]];

        engine.render(&mut surface, &voices, 0, Mode::Ionian, &violations);
        let svg = surface.to_svg();

        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert_eq!(svg.matches(r#"class="staff""#).count(), 2);
        assert_eq!(svg.matches("<ellipse").count(), 4);
        assert_eq!(svg.matches(HIGHLIGHT).count(), 2);
        assert!(svg.contains(r#"data-note="F#4""#));
        assert!(svg.contains("clef-bass"));
        assert!(svg.contains(r#"width="800""#));
    }

    struct FlatSpelling;

    impl Spelling for FlatSpelling {
        fn spell(&self, pitch_class: u8) -> &'static str {
            ["C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B"]
                [usize::from(pitch_class % 12)]
        }
    }

    #[test]
    fn flat_spelling_draws_flat_glyphs() {
        let mut engine = NotationLayoutEngine::default().with_spelling(FlatSpelling);
        let mut surface = SvgSurface::new();

        engine.render(&mut surface, &Voice::from_sequences(&[vec![70]]), 5, Mode::Ionian, &[]);
        let svg = surface.to_svg();

        assert!(svg.contains(r#"data-note="Bb4""#));
        assert!(svg.contains("&#9837;"));
        assert!(!svg.contains("&#9839;"));
    }

    #[test]
    fn clearing_drops_previous_markup() {
        let mut engine = NotationLayoutEngine::default();
        let mut surface = SvgSurface::new();

        engine.render(&mut surface, &Voice::from_sequences(&[vec![60, 62, 64]]), 0, Mode::Ionian, &[]);
        engine.render(&mut surface, &Voice::from_sequences(&[vec![72]]), 0, Mode::Ionian, &[]);

        assert_eq!(surface.to_svg().matches("<ellipse").count(), 1);
    }
}
