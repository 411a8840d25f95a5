use anyhow::{Context, Result, anyhow};
use image::{Rgb, RgbImage};
use resvg::render;
use std::sync::Arc;
use tiny_skia::Pixmap;
use usvg::{Options, Tree, fontdb};

use crate::font::{FontMetrics, ResolvedFont};
use crate::reflow::DrawLine;
use crate::region::BBox;

const FALLBACK_ASCENT_RATIO: f32 = 0.8;

/// Rasterises draw plans into white blocks the size of their region.
#[derive(Clone)]
pub struct BlockRenderer {
    fontdb: Arc<fontdb::Database>,
    family: Option<String>,
    metrics: Option<FontMetrics>,
}

impl BlockRenderer {
    pub fn new(font: Option<ResolvedFont>) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        let (family, metrics) = match font {
            Some(resolved) => {
                db.load_font_data(resolved.metrics.data().to_vec());
                (Some(resolved.family), Some(resolved.metrics))
            }
            None => (None, None),
        };
        Self {
            fontdb: Arc::new(db),
            family,
            metrics,
        }
    }

    pub fn with_database(db: fontdb::Database) -> Self {
        Self {
            fontdb: Arc::new(db),
            family: None,
            metrics: None,
        }
    }

    pub fn metrics(&self) -> Option<&FontMetrics> {
        self.metrics.as_ref()
    }

    pub fn build_svg<'a>(
        &self,
        width: u32,
        height: u32,
        lines: impl IntoIterator<Item = DrawLine<'a>>,
    ) -> String {
        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = width,
            h = height
        ));
        svg.push_str(&format!(
            r##"<rect x="0" y="0" width="{w}" height="{h}" fill="#ffffff"/>"##,
            w = width,
            h = height
        ));
        for line in lines {
            let size = line.font.point_size;
            let ascent = self
                .metrics
                .as_ref()
                .map(|metrics| metrics.ascent_px(size))
                .filter(|ascent| *ascent > 0.0)
                .unwrap_or(size * FALLBACK_ASCENT_RATIO);
            let family = self.family.as_deref().unwrap_or(line.font.family.as_str());
            for word in line.words {
                svg.push_str(&format!(
                    r##"<text x="{x}" y="{y}" font-size="{size}" font-family="{family}" fill="#000000">{text}</text>"##,
                    x = word.x,
                    y = word.y + ascent,
                    size = size,
                    family = escape_xml(family),
                    text = escape_xml(&word.text)
                ));
            }
        }
        svg.push_str("</svg>");
        svg
    }

    /// Renders a plan into an opaque `width` x `height` block. Lines below
    /// the block are cut off.
    pub fn render_block<'a>(
        &self,
        width: u32,
        height: u32,
        lines: impl IntoIterator<Item = DrawLine<'a>>,
    ) -> Result<RgbImage> {
        let svg = self.build_svg(width, height, lines);
        let options = Options {
            fontdb: Arc::clone(&self.fontdb),
            ..Options::default()
        };
        let tree = Tree::from_str(&svg, &options).with_context(|| "failed to parse block SVG")?;
        let mut pixmap =
            Pixmap::new(width, height).ok_or_else(|| anyhow!("empty block {}x{}", width, height))?;
        render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());
        Ok(pixmap_to_rgb(&pixmap))
    }
}

fn pixmap_to_rgb(pixmap: &Pixmap) -> RgbImage {
    let mut image = RgbImage::new(pixmap.width(), pixmap.height());
    for (pixel, out) in pixmap.data().chunks_exact(4).zip(image.pixels_mut()) {
        // premultiplied RGBA over white
        let background = 255 - pixel[3];
        *out = Rgb([
            pixel[0].saturating_add(background),
            pixel[1].saturating_add(background),
            pixel[2].saturating_add(background),
        ]);
    }
    image
}

/// Replaces the `bbox` area of `page` with `block`.
pub fn splice_block(page: &mut RgbImage, bbox: &BBox, block: &RgbImage) -> Result<()> {
    if block.dimensions() != (bbox.width(), bbox.height()) {
        return Err(anyhow!(
            "block is {}x{} but region is {}x{}",
            block.width(),
            block.height(),
            bbox.width(),
            bbox.height()
        ));
    }
    if bbox.x2 > page.width() || bbox.y2 > page.height() {
        return Err(anyhow!("region {:?} lies outside the page", bbox));
    }
    image::imageops::replace(page, block, bbox.x1 as i64, bbox.y1 as i64);
    Ok(())
}

/// Places `original` and `translated` next to each other on a white canvas.
pub fn side_by_side(original: &RgbImage, translated: &RgbImage) -> RgbImage {
    let width = original.width() + translated.width();
    let height = original.height().max(translated.height());
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    image::imageops::replace(&mut canvas, original, 0, 0);
    image::imageops::replace(&mut canvas, translated, original.width() as i64, 0);
    canvas
}

/// Scales a page to `height` pixels tall, keeping its aspect ratio.
pub fn resize_to_height(page: &RgbImage, height: u32) -> RgbImage {
    if page.height() == 0 || height == 0 || page.height() == height {
        return page.clone();
    }
    let width = ((height as f64 / page.height() as f64) * page.width() as f64) as u32;
    image::imageops::resize(
        page,
        width.max(1),
        height,
        image::imageops::FilterType::Lanczos3,
    )
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
