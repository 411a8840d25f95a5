mod document;

use anyhow::{Context, Result, anyhow};
use futures_util::stream::{self, StreamExt};
use image::RgbImage;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::compose::{BlockRenderer, resize_to_height, splice_block};
use crate::font::{
    FontSelector, FontSelectorImpl, FontSelectorKind, build_font_selector, resolve_font,
};
use crate::providers::{
    LayoutImpl, LayoutProvider, OcrImpl, OcrProvider, RawDetection, TranslationProvider,
    TranslatorImpl, build_layout, build_ocr, build_translator,
};
use crate::reflow::{fits_height, layout_text, wrapped_line_count};
use crate::region::{BBox, Detection, FontChoice, Region, RegionKind, deduplicate};
use crate::settings::{OverflowPolicy, Settings};
use crate::state::DocumentState;

pub use document::{DocumentOutput, DocumentRequest, PageReport, off_runtime};

/// Knobs the pipeline reads on every page.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub score_threshold: f32,
    pub deduplicate: bool,
    pub iou_threshold: f32,
    pub overflow: OverflowPolicy,
    pub passthrough_height: u32,
    pub concurrency: usize,
    pub dpi: u32,
    pub report: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            score_threshold: settings.layout.score_threshold,
            deduplicate: settings.pipeline.deduplicate,
            iou_threshold: settings.pipeline.iou_threshold,
            overflow: settings.pipeline.overflow,
            passthrough_height: settings.pipeline.passthrough_height,
            concurrency: settings.translator.concurrency.max(1),
            dpi: settings.layout.dpi,
            report: settings.pipeline.report,
        }
    }
}

/// One processed page.
#[derive(Debug, Clone, Serialize)]
pub struct PageOutput {
    #[serde(skip)]
    pub image: RgbImage,
    pub regions: Vec<Region>,
    pub passed_through: bool,
}

/// Runs detect, OCR, translate, font fitting and compositing for pages of
/// one document. The pipeline owns its providers; document state is passed
/// in by the caller so that concurrent documents never share it.
pub struct PagePipeline<L, O, T, F> {
    layout: L,
    ocr: O,
    translator: T,
    fonts: F,
    renderer: BlockRenderer,
    options: PipelineOptions,
}

pub type DefaultPipeline = PagePipeline<LayoutImpl, OcrImpl, TranslatorImpl, FontSelectorImpl>;

pub fn build_pipeline(settings: &Settings) -> Result<DefaultPipeline> {
    let layout = build_layout(&settings.layout)?;
    let ocr = build_ocr(&settings.ocr)?;
    let translator = build_translator(&settings.translator)?;
    let fonts = build_font_selector(
        FontSelectorKind::parse(&settings.font.kind)?,
        settings.font.base_size,
        &settings.font.family,
    );
    let font = match resolve_font(
        settings.font.path.as_deref().map(Path::new),
        Some(settings.font.family.as_str()),
        &settings.font.fallback,
    ) {
        Ok(font) => {
            info!("typesetting with font family {}", font.family);
            Some(font)
        }
        Err(err) => {
            warn!("{}; word widths will be estimated", err);
            None
        }
    };
    Ok(PagePipeline::new(
        layout,
        ocr,
        translator,
        fonts,
        BlockRenderer::new(font),
        PipelineOptions::from_settings(settings),
    ))
}

impl<L, O, T, F> PagePipeline<L, O, T, F>
where
    L: LayoutProvider,
    O: OcrProvider,
    T: TranslationProvider,
    F: FontSelector,
{
    pub fn new(
        layout: L,
        ocr: O,
        translator: T,
        fonts: F,
        renderer: BlockRenderer,
        options: PipelineOptions,
    ) -> Self {
        Self {
            layout,
            ocr,
            translator,
            fonts,
            renderer,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    pub fn ocr(&self) -> &O {
        &self.ocr
    }

    pub fn languages(&self) -> Vec<String> {
        self.translator.languages()
    }

    /// Processes one page. A page reached in pass-through is only resized.
    pub async fn translate_page(
        &self,
        page: &RgbImage,
        state: &mut DocumentState,
        from_lang: &str,
        to_lang: &str,
    ) -> Result<PageOutput> {
        if !state.is_translating() {
            return Ok(PageOutput {
                image: resize_to_height(page, self.options.passthrough_height),
                regions: Vec::new(),
                passed_through: true,
            });
        }

        let raw = self
            .layout
            .detect(page)
            .await
            .with_context(|| "layout detection failed")?;
        let detections = self.accept_detections(raw, page.width(), page.height());
        let mut regions: Vec<Region> = detections
            .into_iter()
            .map(|detection| Region::from_detection(detection, page))
            .collect();

        for region in regions.iter_mut().filter(|region| region.kind.is_textual()) {
            match self.ocr.recognize(region.source_image()) {
                Ok(output) => region.attach_ocr(&output),
                Err(err) => warn!(
                    "ocr failed for {} region {:?}: {}",
                    region.kind.as_str(),
                    region.bbox,
                    err
                ),
            }
        }

        let cutoff = find_cutoff(&regions, state);
        self.translate_regions(&mut regions[..cutoff], from_lang, to_lang)
            .await;

        let mut canvas = page.clone();
        for region in regions[..cutoff].iter_mut() {
            if !region.kind.is_textual() {
                warn!(
                    "{} region {:?} is not supported; left untouched",
                    region.kind.as_str(),
                    region.bbox
                );
                continue;
            }
            if let Err(err) = self.typeset_region(region, &mut canvas) {
                warn!("skipping region {:?}: {}", region.bbox, err);
            }
        }

        Ok(PageOutput {
            image: canvas,
            regions,
            passed_through: false,
        })
    }

    /// Applies the score cut, bbox validation and optional suppression.
    fn accept_detections(&self, raw: Vec<RawDetection>, width: u32, height: u32) -> Vec<Detection> {
        let mut detections = Vec::with_capacity(raw.len());
        for item in raw {
            if item.score <= self.options.score_threshold {
                continue;
            }
            let kind = RegionKind::from(&item.label);
            match BBox::from_detection(item.bbox, width, height) {
                Ok(bbox) => detections.push(Detection {
                    kind,
                    bbox,
                    score: item.score,
                }),
                Err(err) => warn!("rejecting {} region: {}", kind.as_str(), err),
            }
        }
        if self.options.deduplicate {
            let before = detections.len();
            detections = deduplicate(detections, self.options.iou_threshold);
            debug!("deduplication kept {} of {} regions", detections.len(), before);
        }
        detections
    }

    async fn translate_regions(&self, regions: &mut [Region], from_lang: &str, to_lang: &str) {
        let jobs: Vec<(usize, String)> = regions
            .iter()
            .enumerate()
            .filter(|(_, region)| region.kind.is_textual())
            .filter_map(|(idx, region)| {
                region
                    .recognized_text()
                    .filter(|text| !text.trim().is_empty())
                    .map(|text| (idx, text.to_string()))
            })
            .collect();

        let results: Vec<(usize, Result<String>)> = stream::iter(jobs)
            .map(|(idx, text)| async move {
                let result = self.translator.translate(&text, from_lang, to_lang).await;
                (idx, result)
            })
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await;

        for (idx, result) in results {
            let region = &mut regions[idx];
            let outcome = result.and_then(|text| region.attach_translation(text));
            if let Err(err) = outcome {
                warn!(
                    "translation failed for region {:?}; left untranslated: {}",
                    region.bbox, err
                );
            }
        }
    }

    /// Picks the font, reflows the translation and splices the rendered
    /// block over the region.
    fn typeset_region(&self, region: &mut Region, canvas: &mut RgbImage) -> Result<()> {
        let Some(text) = region.translated_text().map(str::to_string) else {
            return Ok(());
        };
        let line_count = region
            .line_count()
            .ok_or_else(|| anyhow!("translated region has no line count"))?;
        let (width, height) = (region.bbox.width(), region.bbox.height());
        let font = self.fit_font(&text, width, height, line_count);
        debug!(
            "region {:?}: {} source lines -> {}pt / {}px pitch",
            region.bbox, line_count, font.point_size, font.line_pitch
        );
        region.attach_font(font)?;

        let font = region
            .font()
            .ok_or_else(|| anyhow!("font was not recorded"))?;
        let plan = layout_text(&text, width, font, self.renderer.metrics());
        let block = self.renderer.render_block(width, height, plan)?;
        splice_block(canvas, &region.bbox, &block)
    }

    fn fit_font(&self, text: &str, width: u32, height: u32, line_count: u32) -> FontChoice {
        let mut font = self.fonts.select(width, height, line_count);
        if self.options.overflow == OverflowPolicy::Shrink {
            while !fits_height(wrapped_line_count(text, width, &font), &font, height) {
                match self.fonts.smaller(&font) {
                    Some(smaller) => font = smaller,
                    None => break,
                }
            }
        }
        font
    }
}

/// Index of the first region that must stay untouched. Feeds title text to
/// the tracker in detection order; the references title and everything
/// after it on the page are excluded.
fn find_cutoff(regions: &[Region], state: &mut DocumentState) -> usize {
    for (idx, region) in regions.iter().enumerate() {
        if region.kind == RegionKind::Title && state.observe_title(region.recognized_text()) {
            return idx;
        }
    }
    regions.len()
}
