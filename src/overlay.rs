//! Invisible text-layer placement.
//!
//! Word boxes arrive in page-image pixel space: origin at the top-left, `y`
//! growing downward. PDF text space has its origin at the bottom-left with
//! `y` growing upward. [`place_words`] maps every valid box to a
//! [`DrawInstruction`] whose baseline sits on the bottom edge of the box:
//!
//! ```text
//! x         = x0
//! y         = H - y1
//! font_size = 0.8 × (y1 - y0)
//! ```
//!
//! Instructions stay in pixel units; the assembler scales the whole page to
//! points with a single `cm` operator. The text is drawn with render mode 3
//! (invisible), so it can be searched and selected without covering the
//! scanned image.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Font size as a fraction of the box height.
pub const FONT_SIZE_RATIO: f32 = 0.8;

/// Average Helvetica glyph advance, in em.
const AVG_GLYPH_WIDTH_EM: f32 = 0.5;

/// Bounds for the `Tz` horizontal scaling operand (percent).
const MIN_HORIZONTAL_SCALE: f32 = 10.0;
const MAX_HORIZONTAL_SCALE: f32 = 1000.0;

/// Pixel dimensions of a rasterised page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
}

impl PageGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as f32,
            height: height as f32,
        }
    }
}

/// A recognised word and its bounding box in pixel space (top-left origin).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordBox {
    pub text: String,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl WordBox {
    pub fn new(text: impl Into<String>, x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            text: text.into(),
            x0,
            y0,
            x1,
            y1,
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Check the box against the page: ordered, non-negative, finite, inside
    /// the page, and carrying non-blank text.
    pub fn is_valid(&self, page: &PageGeometry) -> bool {
        let coords = [self.x0, self.y0, self.x1, self.y1];
        !self.text.trim().is_empty()
            && coords.iter().all(|c| c.is_finite() && *c >= 0.0)
            && self.x0 <= self.x1
            && self.y0 <= self.y1
            && self.x1 <= page.width
            && self.y1 <= page.height
    }

    /// Rescale from one pixel space to another (native DjVu size → rendered size).
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            text: self.text.clone(),
            x0: self.x0 * sx,
            y0: self.y0 * sy,
            x1: self.x1 * sx,
            y1: self.y1 * sy,
        }
    }

    /// Clamp every coordinate into `[0, width] x [0, height]`.
    pub fn clamped(&self, width: f32, height: f32) -> Self {
        Self {
            text: self.text.clone(),
            x0: self.x0.clamp(0.0, width),
            y0: self.y0.clamp(0.0, height),
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
        }
    }
}

/// Where and how to draw one invisible word, in pixel units with a
/// bottom-left origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawInstruction {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    /// Horizontal scaling in percent (`Tz`), so the run spans the box width.
    pub horizontal_scale: f32,
}

/// The invisible text layer of one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextLayer {
    pub instructions: Vec<DrawInstruction>,
    /// Word boxes dropped because they violated the box invariants.
    pub skipped: usize,
}

impl TextLayer {
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }
}

/// Map word boxes onto PDF-space draw instructions for a page of the given
/// geometry. Invalid boxes are skipped and counted; they never abort the page.
pub fn place_words(page: PageGeometry, words: &[WordBox]) -> TextLayer {
    let mut layer = TextLayer::default();

    for word in words {
        if !word.is_valid(&page) {
            debug!(text = %word.text, "skipping invalid word box");
            layer.skipped += 1;
            continue;
        }

        let text = word.text.trim();
        let font_size = FONT_SIZE_RATIO * word.height();
        layer.instructions.push(DrawInstruction {
            text: text.to_string(),
            x: word.x0,
            y: page.height - word.y1,
            font_size,
            horizontal_scale: horizontal_scale(text, font_size, word.width()),
        });
    }

    layer
}

/// `Tz` percentage that stretches `text` at `font_size` to `box_width`.
fn horizontal_scale(text: &str, font_size: f32, box_width: f32) -> f32 {
    let natural = AVG_GLYPH_WIDTH_EM * font_size * text.chars().count() as f32;
    if natural <= 0.0 || box_width <= 0.0 {
        return 100.0;
    }
    (100.0 * box_width / natural).clamp(MIN_HORIZONTAL_SCALE, MAX_HORIZONTAL_SCALE)
}
