use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    family: Option<String>,
    face_index: u32,
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("units_per_em", &self.units_per_em)
            .field("face_index", &self.face_index)
            .finish()
    }
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Distance from the top of the em box to the baseline.
    pub fn ascent_px(&self, font_size: f32) -> f32 {
        let units = self.units_per_em.max(1) as f32;
        (self.ascender.max(0) as f32) * (font_size / units)
    }
}

pub struct ResolvedFont {
    pub metrics: FontMetrics,
    pub family: String,
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

/// Finds the typesetting font: an explicit file wins, then the configured
/// family, then the first fallback family installed on the system.
pub fn resolve_font(
    font_path: Option<&Path>,
    font_family: Option<&str>,
    fallback: &[String],
) -> Result<ResolvedFont> {
    if let Some(path) = font_path {
        let metrics = load_font_metrics(path)?;
        let family = metrics
            .family()
            .map(|name| name.to_string())
            .or_else(|| font_family.map(|name| name.to_string()))
            .unwrap_or_else(|| "serif".to_string());
        return Ok(ResolvedFont { metrics, family });
    }

    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    if let Some(family) = font_family
        && let Ok(resolved) = load_font_metrics_from_family(&db, family)
    {
        return Ok(resolved);
    }

    for candidate in fallback {
        if let Ok(resolved) = load_font_metrics_from_family(&db, candidate) {
            return Ok(resolved);
        }
    }

    Err(anyhow!(
        "no usable font found (family: {}, fallbacks: {})",
        font_family.unwrap_or("-"),
        fallback.join(", ")
    ))
}

pub fn measure_text_width_px(text: &str, font_size: f32, font: Option<&FontMetrics>) -> f32 {
    if let Some(font) = font
        && let Ok(face) = Face::parse(&font.data, font.face_index)
    {
        let mut advance = 0u32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            if ch == ' ' {
                advance = advance.saturating_add(font.space_advance as u32);
                continue;
            }
            if let Some(glyph) = face.glyph_index(ch) {
                let glyph_advance = face.glyph_hor_advance(glyph).unwrap_or(font.space_advance);
                advance = advance.saturating_add(glyph_advance as u32);
            } else {
                advance = advance.saturating_add(font.space_advance as u32);
            }
        }
        let units = font.units_per_em.max(1) as f32;
        return advance as f32 * (font_size / units);
    }
    estimate_text_width_units(text) * font_size
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.5
    } else if ch.is_ascii() {
        0.35
    } else if is_wide_char(ch) {
        1.0
    } else {
        0.6
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars()
        .filter(|ch| *ch != '\n')
        .map(estimate_char_units_for_width)
        .sum()
}

/// CJK ideographs, kana, hangul and full-width forms occupy two columns.
pub(crate) fn is_wide_char(ch: char) -> bool {
    matches!(
        ch as u32,
        0x1100..=0x115F
            | 0x2E80..=0x303E
            | 0x3041..=0x33FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xA000..=0xA4CF
            | 0xAC00..=0xD7A3
            | 0xF900..=0xFAFF
            | 0xFE30..=0xFE4F
            | 0xFF00..=0xFF60
            | 0xFFE0..=0xFFE6
    )
}

fn load_font_metrics_from_data(data: &[u8], preferred_family: Option<&str>) -> Result<FontMetrics> {
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    let shared = Arc::new(data.to_vec());
    for index in 0..count {
        if let Ok(face) = Face::parse(data, index) {
            let family = extract_family_name(&face);
            let units_per_em = face.units_per_em().max(1);
            let space_advance = face
                .glyph_index(' ')
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(units_per_em / 2);
            let metrics = FontMetrics {
                data: Arc::clone(&shared),
                units_per_em,
                space_advance,
                ascender: face.ascender(),
                family: family.clone(),
                face_index: index,
            };
            if let (Some(preferred), Some(found)) = (preferred_family, &family)
                && found.eq_ignore_ascii_case(preferred)
            {
                return Ok(metrics);
            }
            if fallback.is_none() {
                fallback = Some(metrics);
            }
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_font_metrics_from_family(db: &fontdb::Database, family: &str) -> Result<ResolvedFont> {
    let families = match family.to_ascii_lowercase().as_str() {
        "serif" => vec![fontdb::Family::Serif],
        "sans-serif" => vec![fontdb::Family::SansSerif],
        _ => vec![fontdb::Family::Name(family)],
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let data = db
        .with_face_data(id, |data, _index| data.to_vec())
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    let metrics = load_font_metrics_from_data(&data, Some(family))?;
    let resolved_family = metrics
        .family()
        .map(|name| name.to_string())
        .unwrap_or_else(|| family.to_string());
    Ok(ResolvedFont {
        metrics,
        family: resolved_family,
    })
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimated_width_scales_with_font_size() {
        let small = measure_text_width_px("translated", 10.0, None);
        let large = measure_text_width_px("translated", 20.0, None);
        assert!(small > 0.0);
        assert!((large - small * 2.0).abs() < 1e-3);
    }

    #[test]
    fn wide_characters_measure_wider() {
        let latin = measure_text_width_px("ab", 12.0, None);
        let cjk = measure_text_width_px("漢字", 12.0, None);
        assert!(cjk > latin);
        assert!(is_wide_char('字'));
        assert!(!is_wide_char('z'));
    }

    #[test]
    fn missing_font_file_is_an_error() {
        let err = load_font_metrics(Path::new("/nonexistent/font.ttf")).unwrap_err();
        assert!(err.to_string().contains("failed to read font"));
    }
}
