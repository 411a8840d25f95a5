mod metrics;

use anyhow::{Result, anyhow};

use crate::region::FontChoice;

pub use metrics::{
    FontMetrics, ResolvedFont, load_font_metrics, measure_text_width_px, resolve_font,
};
pub(crate) use metrics::is_wide_char;

pub const DEFAULT_BASE_SIZE: f32 = 29.0;
pub const DEFAULT_FAMILY: &str = "Times New Roman";

/// Maps region geometry and its source line count to a font choice.
pub trait FontSelector: Send + Sync {
    fn select(&self, width: u32, height: u32, line_count: u32) -> FontChoice;

    /// Next smaller choice, `None` once the smallest is reached.
    fn smaller(&self, current: &FontChoice) -> Option<FontChoice>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontSelectorKind {
    Simple,
}

impl FontSelectorKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "simple" => Ok(FontSelectorKind::Simple),
            other => Err(anyhow!("unknown font engine '{}' (known: simple)", other)),
        }
    }
}

/// Four fixed bands keyed on `height / line_count`. This is a calibrated
/// approximation from the source layout: it never looks at the glyphs of
/// the translated string.
#[derive(Debug, Clone)]
pub struct SimpleFontSelector {
    base_size: f32,
    family: String,
}

impl Default for SimpleFontSelector {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_SIZE, DEFAULT_FAMILY)
    }
}

impl SimpleFontSelector {
    pub fn new(base_size: f32, family: impl Into<String>) -> Self {
        Self {
            base_size,
            family: family.into(),
        }
    }

    fn bands(&self) -> [(f32, u32); 4] {
        let base = self.base_size;
        [
            (base + 6.0, 40),
            (base, 33),
            (base - 3.0, 30),
            (base - 6.0, 22),
        ]
    }

    fn choice(&self, (point_size, line_pitch): (f32, u32)) -> FontChoice {
        FontChoice {
            family: self.family.clone(),
            point_size,
            line_pitch,
        }
    }
}

impl FontSelector for SimpleFontSelector {
    fn select(&self, _width: u32, height: u32, line_count: u32) -> FontChoice {
        let approx = height as f32 / line_count.max(1) as f32;
        let bands = self.bands();
        let band = if approx > 46.0 {
            bands[0]
        } else if approx > 31.0 {
            bands[1]
        } else if approx > 28.5 {
            bands[2]
        } else {
            bands[3]
        };
        self.choice(band)
    }

    fn smaller(&self, current: &FontChoice) -> Option<FontChoice> {
        let bands = self.bands();
        let idx = bands
            .iter()
            .position(|(size, _)| (*size - current.point_size).abs() < f32::EPSILON)?;
        bands.get(idx + 1).map(|band| self.choice(*band))
    }
}

#[derive(Debug, Clone)]
pub enum FontSelectorImpl {
    Simple(SimpleFontSelector),
}

impl FontSelector for FontSelectorImpl {
    fn select(&self, width: u32, height: u32, line_count: u32) -> FontChoice {
        match self {
            FontSelectorImpl::Simple(selector) => selector.select(width, height, line_count),
        }
    }

    fn smaller(&self, current: &FontChoice) -> Option<FontChoice> {
        match self {
            FontSelectorImpl::Simple(selector) => selector.smaller(current),
        }
    }
}

pub fn build_font_selector(kind: FontSelectorKind, base_size: f32, family: &str) -> FontSelectorImpl {
    match kind {
        FontSelectorKind::Simple => {
            FontSelectorImpl::Simple(SimpleFontSelector::new(base_size, family))
        }
    }
}
