use anyhow::{Context, Result, anyhow};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::info;

use super::PagePipeline;
use crate::compose::side_by_side;
use crate::font::FontSelector;
use crate::pdf;
use crate::providers::{LayoutProvider, OcrProvider, TranslationProvider};
use crate::region::Region;
use crate::state::DocumentState;

pub const REPORT_FILE_NAME: &str = "regions.json";

/// What to translate. Page indices are zero-based; `p_to == 0` means the
/// last page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DocumentRequest {
    pub from_lang: String,
    pub to_lang: String,
    pub p_from: usize,
    pub p_to: usize,
    pub side_by_side: bool,
}

impl DocumentRequest {
    pub fn includes(&self, index: usize) -> bool {
        index >= self.p_from && (self.p_to == 0 || index <= self.p_to)
    }
}

/// Drives `job` to completion on a blocking thread. OCR shells out
/// synchronously, so document translation must not hold an async worker.
pub async fn off_runtime<R, Fut, J>(job: J) -> Result<R>
where
    J: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<R>>,
    R: Send + 'static,
{
    let handle = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || handle.block_on(job()))
        .await
        .map_err(|err| anyhow!("translation task failed: {}", err))?
}

#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    pub page: usize,
    pub passed_through: bool,
    pub regions: Vec<Region>,
}

#[derive(Debug)]
pub struct DocumentOutput {
    pub pdf_path: PathBuf,
    pub page_paths: Vec<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub reports: Vec<PageReport>,
}

impl<L, O, T, F> PagePipeline<L, O, T, F>
where
    L: LayoutProvider,
    O: OcrProvider,
    T: TranslationProvider,
    F: FontSelector,
{
    /// Rasterises `pdf_bytes` and translates it into `out_dir`.
    pub async fn translate_pdf(
        &self,
        pdf_bytes: &[u8],
        request: &DocumentRequest,
        out_dir: &Path,
    ) -> Result<DocumentOutput> {
        let pages = pdf::render_pages(pdf_bytes, self.options.dpi)?;
        info!("rendered {} pages at {} dpi", pages.len(), self.options.dpi);
        self.translate_pages(pages, request, out_dir).await
    }

    /// Processes the requested pages in order with one fresh document
    /// state, writes `NNN.png` per page and merges them into a PDF.
    pub async fn translate_pages(
        &self,
        pages: Vec<RgbImage>,
        request: &DocumentRequest,
        out_dir: &Path,
    ) -> Result<DocumentOutput> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create output dir: {}", out_dir.display()))?;

        let total = pages.len();
        let mut state = DocumentState::default();
        let mut page_paths = Vec::new();
        let mut reports = Vec::new();
        for (index, page) in pages.into_iter().enumerate() {
            if index < request.p_from {
                continue;
            }
            if !request.includes(index) {
                break;
            }
            info!("page {}/{}", index + 1, total);
            let was_translating = state.is_translating();
            let output = self
                .translate_page(&page, &mut state, &request.from_lang, &request.to_lang)
                .await
                .with_context(|| format!("page {} failed", index))?;

            let image = if request.side_by_side && was_translating {
                side_by_side(&page, &output.image)
            } else {
                output.image
            };
            page_paths.push(pdf::write_page(out_dir, index, &image)?);
            reports.push(PageReport {
                page: index,
                passed_through: output.passed_through,
                regions: output.regions,
            });
        }

        if page_paths.is_empty() {
            return Err(anyhow!(
                "page range {}..{} selects none of the {} pages",
                request.p_from,
                request.p_to,
                total
            ));
        }

        let report_path = if self.options.report {
            Some(write_report(out_dir, &reports)?)
        } else {
            None
        };
        let pdf_path = pdf::merge_pages(out_dir)?;
        info!("wrote {}", pdf_path.display());
        Ok(DocumentOutput {
            pdf_path,
            page_paths,
            report_path,
            reports,
        })
    }
}

fn write_report(dir: &Path, reports: &[PageReport]) -> Result<PathBuf> {
    let path = dir.join(REPORT_FILE_NAME);
    let json =
        serde_json::to_string_pretty(reports).with_context(|| "failed to serialize region report")?;
    fs::write(&path, json).with_context(|| format!("failed to write report: {}", path.display()))?;
    Ok(path)
}
