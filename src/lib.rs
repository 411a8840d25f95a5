use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use providers::TranslationProvider;

pub mod compose;
pub mod font;
pub mod logging;
pub mod pdf;
pub mod pipeline;
pub mod providers;
pub mod reflow;
pub mod region;
pub mod server;
pub mod settings;
pub mod state;

pub use pipeline::{
    DefaultPipeline, DocumentOutput, DocumentRequest, PageOutput, PagePipeline, PipelineOptions,
    build_pipeline, off_runtime,
};
pub use region::{BBox, FontChoice, Region, RegionKind};
pub use state::DocumentState;

#[derive(Debug, Clone)]
pub struct Config {
    pub input: Option<String>,
    pub output: Option<String>,
    pub from_lang: String,
    pub to_lang: String,
    pub from_page: usize,
    pub to_page: usize,
    pub side_by_side: bool,
    pub report: bool,
    pub settings_path: Option<String>,
    pub show_languages: bool,
}

/// Translates `config.input` into `config.output` and returns the written
/// path, or the language list when `show_languages` is set.
pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if config.report {
        settings.pipeline.report = true;
    }
    if config.show_languages {
        let translator = providers::build_translator(&settings.translator)?;
        return Ok(translator.languages().join("\n"));
    }
    let pipeline = Arc::new(build_pipeline(&settings)?);

    let input = config
        .input
        .as_deref()
        .ok_or_else(|| anyhow!("an input PDF is required"))?;
    let input = PathBuf::from(input);
    let output = config
        .output
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(&input));
    let pdf = std::fs::read(&input)
        .with_context(|| format!("failed to read input: {}", input.display()))?;

    let request = DocumentRequest {
        from_lang: config.from_lang,
        to_lang: config.to_lang,
        p_from: config.from_page,
        p_to: config.to_page,
        side_by_side: config.side_by_side,
    };
    let work_dir = tempfile::tempdir().with_context(|| "failed to create work dir")?;
    let out_dir = work_dir.path().to_path_buf();
    let result = off_runtime(move || async move {
        pipeline.translate_pdf(&pdf, &request, &out_dir).await
    })
    .await?;

    std::fs::copy(&result.pdf_path, &output)
        .with_context(|| format!("failed to write output: {}", output.display()))?;
    if let Some(report) = result.report_path {
        let report_out = output.with_extension("regions.json");
        std::fs::copy(&report, &report_out)
            .with_context(|| format!("failed to write report: {}", report_out.display()))?;
    }
    Ok(output.display().to_string())
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{}.translated.pdf", stem))
}
