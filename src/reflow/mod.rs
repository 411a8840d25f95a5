mod wrap;

use serde::Serialize;

use crate::font::{FontMetrics, measure_text_width_px};
use crate::region::FontChoice;

pub use wrap::{GLYPH_WIDTH_RATIO, wrap_columns, wrap_words};

/// Left indent of the first line of a multi-line block.
pub const PARAGRAPH_INDENT_PX: f32 = 40.0;
/// Gaps wider than this fall back to the default word spacing.
pub const MAX_WORD_GAP_PX: f32 = 40.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedWord {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawLine<'a> {
    pub font: &'a FontChoice,
    pub words: Vec<PlacedWord>,
}

/// Lazily justifies wrapped lines into draw commands, top to bottom.
pub struct JustifiedLines<'a> {
    lines: std::vec::IntoIter<Vec<String>>,
    index: usize,
    multi_line: bool,
    width: f32,
    font: &'a FontChoice,
    metrics: Option<&'a FontMetrics>,
}

impl<'a> JustifiedLines<'a> {
    pub fn new(
        lines: Vec<Vec<String>>,
        width: u32,
        font: &'a FontChoice,
        metrics: Option<&'a FontMetrics>,
    ) -> Self {
        let multi_line = lines.len() > 1;
        Self {
            lines: lines.into_iter(),
            index: 0,
            multi_line,
            width: width as f32,
            font,
            metrics,
        }
    }

    fn measure(&self, word: &str) -> f32 {
        measure_text_width_px(word, self.font.point_size, self.metrics)
    }

    fn place(&self, words: Vec<String>, index: usize) -> Vec<PlacedWord> {
        let indent = index == 0 && self.multi_line;
        let mut words_width: f32 = words.iter().map(|word| self.measure(word)).sum();
        if indent {
            words_width += PARAGRAPH_INDENT_PX;
        }
        let mut gap = (self.width - words_width) / words.len().max(1) as f32;
        if gap > MAX_WORD_GAP_PX {
            gap = self.font.point_size / GLYPH_WIDTH_RATIO;
        }
        let gap = gap.max(0.0);

        let y = (index as u32 * self.font.line_pitch) as f32;
        let mut x = if indent { PARAGRAPH_INDENT_PX } else { 0.0 };
        let mut placed = Vec::with_capacity(words.len());
        for word in words {
            let advance = self.measure(&word);
            placed.push(PlacedWord { text: word, x, y });
            x += advance + gap;
        }
        placed
    }
}

impl<'a> Iterator for JustifiedLines<'a> {
    type Item = DrawLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let words = self.lines.next()?;
        let index = self.index;
        self.index += 1;
        Some(DrawLine {
            font: self.font,
            words: self.place(words, index),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.lines.size_hint()
    }
}

/// Wraps `text` for a block `width` pixels wide and returns its draw plan.
pub fn layout_text<'a>(
    text: &str,
    width: u32,
    font: &'a FontChoice,
    metrics: Option<&'a FontMetrics>,
) -> JustifiedLines<'a> {
    let lines = wrap_words(text, wrap_columns(width, font.point_size));
    JustifiedLines::new(lines, width, font, metrics)
}

/// Number of lines `text` wraps into at `width` with `font`.
pub fn wrapped_line_count(text: &str, width: u32, font: &FontChoice) -> usize {
    wrap_words(text, wrap_columns(width, font.point_size)).len()
}

pub fn fits_height(line_count: usize, font: &FontChoice, height: u32) -> bool {
    line_count as u64 * font.line_pitch as u64 <= height as u64
}
