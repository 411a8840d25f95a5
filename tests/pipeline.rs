use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use image::{Rgb, RgbImage};
use pdf_reflow_translator::compose::BlockRenderer;
use pdf_reflow_translator::font::SimpleFontSelector;
use pdf_reflow_translator::providers::{
    DetectionLabel, LayoutProvider, OcrProvider, ProviderFuture, RawDetection,
    TranslationProvider,
};
use pdf_reflow_translator::reflow::{layout_text, wrap_columns};
use pdf_reflow_translator::region::{OcrOutput, OcrToken};
use pdf_reflow_translator::{
    DocumentRequest, DocumentState, PagePipeline, PipelineOptions, RegionKind, off_runtime,
};
use usvg::fontdb;

/// Serves one queued detection list per `detect` call.
struct ScriptedLayout {
    pages: Mutex<VecDeque<Vec<RawDetection>>>,
}

impl ScriptedLayout {
    fn new(pages: Vec<Vec<RawDetection>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
        }
    }
}

impl LayoutProvider for ScriptedLayout {
    fn detect<'a>(&'a self, _page: &'a RgbImage) -> ProviderFuture<'a, Vec<RawDetection>> {
        let next = self.pages.lock().unwrap().pop_front().unwrap_or_default();
        Box::pin(async move { Ok(next) })
    }
}

/// Recognises a region by the colour of its top-left pixel.
struct ColourOcr {
    texts: HashMap<[u8; 3], Vec<&'static str>>,
}

impl OcrProvider for ColourOcr {
    fn recognize(&self, image: &RgbImage) -> Result<OcrOutput> {
        let Rgb(colour) = *image.get_pixel(0, 0);
        let lines = self.texts.get(&colour).cloned().unwrap_or_default();
        let mut tokens = Vec::new();
        for (idx, line) in lines.iter().enumerate() {
            let top = idx as u32 * 40 + 5;
            for word in line.split_whitespace() {
                tokens.push(OcrToken {
                    text: word.to_string(),
                    top,
                    bottom: top + 30,
                });
            }
        }
        Ok(OcrOutput { tokens })
    }
}

/// Echoes the text with the target language appended. Inputs containing
/// one of `failing` are rejected.
#[derive(Default)]
struct RecordingTranslator {
    calls: Mutex<Vec<String>>,
    failing: Vec<&'static str>,
}

impl TranslationProvider for RecordingTranslator {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        _from_lang: &'a str,
        to_lang: &'a str,
    ) -> ProviderFuture<'a, String> {
        self.calls.lock().unwrap().push(text.to_string());
        let rejected = self.failing.iter().any(|marker| text.contains(marker));
        Box::pin(async move {
            if rejected {
                return Err(anyhow!("upstream rejected the request"));
            }
            Ok(format!("{} ({})", text, to_lang))
        })
    }

    fn languages(&self) -> Vec<String> {
        vec!["Slovenian".to_string()]
    }
}

const TEXT_A: [u8; 3] = [200, 10, 10];
const TEXT_B: [u8; 3] = [10, 200, 10];
const TITLE_REFS: [u8; 3] = [10, 10, 200];
const TEXT_D: [u8; 3] = [200, 200, 10];
const TEXT_E: [u8; 3] = [10, 200, 200];

fn detection(label: &str, bbox: [f32; 4]) -> RawDetection {
    RawDetection {
        label: DetectionLabel::Name(label.to_string()),
        bbox,
        score: 0.95,
    }
}

fn scored(label: &str, bbox: [f32; 4], score: f32) -> RawDetection {
    RawDetection {
        score,
        ..detection(label, bbox)
    }
}

fn paint(page: &mut RgbImage, bbox: [u32; 4], colour: [u8; 3]) {
    for y in bbox[1]..bbox[3] {
        for x in bbox[0]..bbox[2] {
            page.put_pixel(x, y, Rgb(colour));
        }
    }
}

fn pipeline(
    layout: ScriptedLayout,
    ocr: ColourOcr,
    options: PipelineOptions,
) -> PagePipeline<ScriptedLayout, ColourOcr, RecordingTranslator, SimpleFontSelector> {
    pipeline_with(layout, ocr, RecordingTranslator::default(), options)
}

fn pipeline_with(
    layout: ScriptedLayout,
    ocr: ColourOcr,
    translator: RecordingTranslator,
    options: PipelineOptions,
) -> PagePipeline<ScriptedLayout, ColourOcr, RecordingTranslator, SimpleFontSelector> {
    PagePipeline::new(
        layout,
        ocr,
        translator,
        SimpleFontSelector::default(),
        BlockRenderer::with_database(fontdb::Database::new()),
        options,
    )
}

fn ocr(entries: &[([u8; 3], Vec<&'static str>)]) -> ColourOcr {
    ColourOcr {
        texts: entries.iter().cloned().collect(),
    }
}

#[tokio::test]
async fn nothing_after_the_references_title_is_translated() {
    let mut page1 = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
    paint(&mut page1, [0, 0, 400, 100], TEXT_A);
    let mut page2 = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
    paint(&mut page2, [0, 0, 400, 100], TEXT_B);
    paint(&mut page2, [0, 100, 400, 150], TITLE_REFS);
    paint(&mut page2, [0, 150, 400, 300], TEXT_D);
    let mut page3 = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
    paint(&mut page3, [0, 0, 400, 100], TEXT_E);

    let layout = ScriptedLayout::new(vec![
        vec![detection("text", [0.0, 0.0, 400.0, 100.0])],
        vec![
            detection("text", [0.0, 0.0, 400.0, 100.0]),
            detection("title", [0.0, 100.0, 400.0, 150.0]),
            detection("text", [0.0, 150.0, 400.0, 300.0]),
        ],
        vec![detection("text", [0.0, 0.0, 400.0, 100.0])],
    ]);
    let ocr = ocr(&[
        (TEXT_A, vec!["Introduction to the method"]),
        (TEXT_B, vec!["Conclusion of the paper"]),
        (TITLE_REFS, vec!["REFERENCES"]),
        (TEXT_D, vec!["[1] Some cited work"]),
        (TEXT_E, vec!["[2] Another cited work"]),
    ]);
    let pipeline = pipeline(
        layout,
        ocr,
        PipelineOptions {
            passthrough_height: 150,
            ..PipelineOptions::default()
        },
    );

    let dir = tempfile::tempdir().unwrap();
    let request = DocumentRequest {
        from_lang: "English".to_string(),
        to_lang: "Slovenian".to_string(),
        ..DocumentRequest::default()
    };
    let output = pipeline
        .translate_pages(vec![page1, page2.clone(), page3], &request, dir.path())
        .await
        .unwrap();

    let calls = pipeline_calls(&pipeline);
    assert_eq!(
        calls,
        ["Introduction to the method", "Conclusion of the paper"]
    );

    assert_eq!(output.page_paths.len(), 3);
    assert!(output.pdf_path.exists());
    assert!(!output.reports[0].passed_through);
    assert!(!output.reports[1].passed_through);
    assert!(output.reports[2].passed_through);

    let page2_regions = &output.reports[1].regions;
    assert!(page2_regions[0].translated_text().is_some());
    assert_eq!(page2_regions[1].kind, RegionKind::Title);
    assert!(page2_regions[1].translated_text().is_none());
    assert!(page2_regions[2].translated_text().is_none());

    let written = image::open(&output.page_paths[1]).unwrap().to_rgb8();
    for (x, y, pixel) in written.enumerate_pixels() {
        if y >= 100 {
            assert_eq!(pixel, page2.get_pixel(x, y), "pixel ({}, {})", x, y);
        }
    }

    let last = image::open(&output.page_paths[2]).unwrap().to_rgb8();
    assert_eq!(last.dimensions(), (200, 150));
}

fn pipeline_calls(
    pipeline: &PagePipeline<ScriptedLayout, ColourOcr, RecordingTranslator, SimpleFontSelector>,
) -> Vec<String> {
    pipeline.translator().calls.lock().unwrap().clone()
}

#[tokio::test]
async fn table_regions_are_never_translated_or_repainted() {
    let mut page = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
    for (x, y, pixel) in page.enumerate_pixels_mut() {
        if y < 120 {
            *pixel = Rgb([(x % 251) as u8, (y * 3 % 253) as u8, ((x + y) % 7) as u8]);
        }
    }
    paint(&mut page, [0, 150, 400, 250], TEXT_A);

    let layout = ScriptedLayout::new(vec![vec![
        detection("table", [0.0, 0.0, 400.0, 120.0]),
        detection("text", [0.0, 150.0, 400.0, 250.0]),
    ]]);
    let ocr = ocr(&[(TEXT_A, vec!["Results are shown above"])]);
    let pipeline = pipeline(layout, ocr, PipelineOptions::default());

    let mut state = DocumentState::default();
    let output = pipeline
        .translate_page(&page, &mut state, "English", "Slovenian")
        .await
        .unwrap();

    assert_eq!(pipeline_calls(&pipeline), ["Results are shown above"]);
    assert_eq!(output.regions[0].kind, RegionKind::Table);
    assert!(output.regions[0].recognized_text().is_none());
    for y in 0..120 {
        for x in 0..400 {
            assert_eq!(output.image.get_pixel(x, y), page.get_pixel(x, y));
        }
    }
    assert_ne!(output.image.get_pixel(5, 160), page.get_pixel(5, 160));
}

#[tokio::test]
async fn single_region_is_typeset_into_its_own_box() {
    let mut page = RgbImage::from_pixel(400, 100, Rgb([255, 255, 255]));
    paint(&mut page, [0, 0, 400, 100], TEXT_A);
    let layout = ScriptedLayout::new(vec![vec![detection("text", [0.0, 0.0, 400.0, 100.0])]]);
    let ocr = ocr(&[(TEXT_A, vec!["Hello world", "foo bar"])]);
    let pipeline = pipeline(layout, ocr, PipelineOptions::default());

    let mut state = DocumentState::default();
    let output = pipeline
        .translate_page(&page, &mut state, "English", "Slovenian")
        .await
        .unwrap();

    assert_eq!(output.image.dimensions(), (400, 100));
    let region = &output.regions[0];
    assert_eq!(region.recognized_text(), Some("Hello world foo bar"));
    assert_eq!(region.line_count(), Some(2));
    let font = region.font().unwrap();
    assert_eq!((font.point_size, font.line_pitch), (35.0, 40));
    assert_eq!(wrap_columns(400, font.point_size), 26);

    let translated = region.translated_text().unwrap();
    let plan: Vec<_> = layout_text(translated, 400, font, None).collect();
    let words = translated.split_whitespace().count();
    assert!(plan.len() <= words);
    let drawn: Vec<_> = plan
        .iter()
        .flat_map(|line| line.words.iter().map(|word| word.text.as_str()))
        .collect();
    assert_eq!(drawn, translated.split_whitespace().collect::<Vec<_>>());

    assert!(output.image.pixels().all(|pixel| *pixel != Rgb(TEXT_A)));
}

fn assert_rows_untouched(output: &RgbImage, page: &RgbImage, rows: std::ops::Range<u32>) {
    for y in rows {
        for x in 0..page.width() {
            assert_eq!(output.get_pixel(x, y), page.get_pixel(x, y), "pixel ({}, {})", x, y);
        }
    }
}

#[tokio::test]
async fn deduplication_keeps_reading_order_for_the_references_cutoff() {
    let mut page = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
    paint(&mut page, [0, 0, 400, 50], TITLE_REFS);
    paint(&mut page, [0, 100, 400, 200], TEXT_D);

    let layout = ScriptedLayout::new(vec![vec![
        scored("title", [0.0, 0.0, 400.0, 50.0], 0.85),
        scored("text", [0.0, 100.0, 400.0, 200.0], 0.99),
    ]]);
    let ocr = ocr(&[
        (TITLE_REFS, vec!["References"]),
        (TEXT_D, vec!["[1] Some cited work"]),
    ]);
    let pipeline = pipeline(
        layout,
        ocr,
        PipelineOptions {
            deduplicate: true,
            ..PipelineOptions::default()
        },
    );

    let mut state = DocumentState::default();
    let output = pipeline
        .translate_page(&page, &mut state, "English", "Slovenian")
        .await
        .unwrap();

    assert!(pipeline_calls(&pipeline).is_empty());
    assert!(!state.is_translating());
    let kinds: Vec<_> = output.regions.iter().map(|region| region.kind.clone()).collect();
    assert_eq!(kinds, [RegionKind::Title, RegionKind::Text]);
    assert_rows_untouched(&output.image, &page, 0..300);
}

#[tokio::test]
async fn failed_translation_leaves_only_that_region_untouched() {
    let mut page = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
    for (x, y, pixel) in page.enumerate_pixels_mut() {
        if y < 100 {
            *pixel = Rgb([200, (x % 97) as u8, (y * 5 % 89) as u8]);
        }
    }
    paint(&mut page, [0, 0, 1, 1], TEXT_A);
    paint(&mut page, [0, 150, 400, 250], TEXT_B);

    let layout = ScriptedLayout::new(vec![vec![
        detection("text", [0.0, 0.0, 400.0, 100.0]),
        detection("text", [0.0, 150.0, 400.0, 250.0]),
    ]]);
    let ocr = ocr(&[
        (TEXT_A, vec!["Garbled paragraph the service refuses"]),
        (TEXT_B, vec!["Results are shown above"]),
    ]);
    let translator = RecordingTranslator {
        failing: vec!["Garbled"],
        ..RecordingTranslator::default()
    };
    let pipeline = pipeline_with(layout, ocr, translator, PipelineOptions::default());

    let mut state = DocumentState::default();
    let output = pipeline
        .translate_page(&page, &mut state, "English", "Slovenian")
        .await
        .unwrap();

    assert_eq!(pipeline_calls(&pipeline).len(), 2);
    assert!(output.regions[0].translated_text().is_none());
    assert!(output.regions[0].font().is_none());
    assert_eq!(
        output.regions[1].translated_text(),
        Some("Results are shown above (Slovenian)")
    );
    assert_rows_untouched(&output.image, &page, 0..100);
    assert_ne!(output.image.get_pixel(5, 160), page.get_pixel(5, 160));
}

#[tokio::test]
async fn unknown_labels_are_left_as_they_are() {
    let mut page = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
    paint(&mut page, [0, 0, 400, 100], TEXT_E);
    for x in 0..400 {
        page.put_pixel(x, 50, Rgb([(x % 13) as u8, 0, 0]));
    }
    paint(&mut page, [0, 150, 400, 250], TEXT_A);

    let layout = ScriptedLayout::new(vec![vec![
        detection("equation", [0.0, 0.0, 400.0, 100.0]),
        detection("text", [0.0, 150.0, 400.0, 250.0]),
    ]]);
    let ocr = ocr(&[
        (TEXT_E, vec!["E = mc^2"]),
        (TEXT_A, vec!["Results are shown above"]),
    ]);
    let pipeline = pipeline(layout, ocr, PipelineOptions::default());

    let mut state = DocumentState::default();
    let output = pipeline
        .translate_page(&page, &mut state, "English", "Slovenian")
        .await
        .unwrap();

    assert_eq!(pipeline_calls(&pipeline), ["Results are shown above"]);
    assert_eq!(
        output.regions[0].kind,
        RegionKind::Unknown("equation".to_string())
    );
    assert!(output.regions[0].recognized_text().is_none());
    assert_rows_untouched(&output.image, &page, 0..100);
    assert_ne!(output.image.get_pixel(5, 160), page.get_pixel(5, 160));
}

/// Blocks like a shelled-out OCR run and records whether the async
/// runtime kept making progress meanwhile.
struct StallingOcr {
    ticked: Arc<AtomicBool>,
    observed: Mutex<Vec<bool>>,
}

impl OcrProvider for StallingOcr {
    fn recognize(&self, _image: &RgbImage) -> Result<OcrOutput> {
        std::thread::sleep(Duration::from_millis(300));
        self.observed
            .lock()
            .unwrap()
            .push(self.ticked.load(Ordering::SeqCst));
        Ok(OcrOutput {
            tokens: vec![OcrToken {
                text: "Hello".to_string(),
                top: 5,
                bottom: 35,
            }],
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn document_translation_does_not_hold_the_async_worker() {
    let ticked = Arc::new(AtomicBool::new(false));
    let pipeline = Arc::new(PagePipeline::new(
        ScriptedLayout::new(vec![vec![detection("text", [0.0, 0.0, 200.0, 100.0])]]),
        StallingOcr {
            ticked: ticked.clone(),
            observed: Mutex::new(Vec::new()),
        },
        RecordingTranslator::default(),
        SimpleFontSelector::default(),
        BlockRenderer::with_database(fontdb::Database::new()),
        PipelineOptions::default(),
    ));

    let flag = ticked.clone();
    let ticker = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        flag.store(true, Ordering::SeqCst);
    });

    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().to_path_buf();
    let page = RgbImage::from_pixel(200, 100, Rgb(TEXT_A));
    let request = DocumentRequest {
        from_lang: "English".to_string(),
        to_lang: "Slovenian".to_string(),
        ..DocumentRequest::default()
    };
    let job = pipeline.clone();
    let output = off_runtime(move || async move {
        job.translate_pages(vec![page], &request, &out_dir).await
    })
    .await
    .unwrap();
    ticker.await.unwrap();

    assert_eq!(output.page_paths.len(), 1);
    assert_eq!(*pipeline.ocr().observed.lock().unwrap(), [true]);
    assert_eq!(pipeline.translator().calls.lock().unwrap().len(), 1);
}
