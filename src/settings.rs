use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub translator: TranslatorSettings,
    pub layout: LayoutSettings,
    pub ocr: OcrSettings,
    pub font: FontSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone)]
pub struct TranslatorSettings {
    pub kind: String,
    pub model: Option<String>,
    pub key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    /// Upper bound on translation calls in flight for one page.
    pub concurrency: usize,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            kind: "openai".to_string(),
            model: None,
            key: None,
            base_url: None,
            temperature: 0.2,
            concurrency: num_cpus::get().max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LayoutSettings {
    pub kind: String,
    pub endpoint: Option<String>,
    pub score_threshold: f32,
    pub dpi: u32,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            kind: "http".to_string(),
            endpoint: None,
            score_threshold: 0.8,
            dpi: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub kind: String,
    pub languages: String,
    pub psm: u32,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            kind: "tesseract".to_string(),
            languages: "eng".to_string(),
            psm: 6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FontSettings {
    pub kind: String,
    pub base_size: f32,
    pub family: String,
    pub path: Option<String>,
    pub fallback: Vec<String>,
}

impl Default for FontSettings {
    fn default() -> Self {
        Self {
            kind: "simple".to_string(),
            base_size: crate::font::DEFAULT_BASE_SIZE,
            family: crate::font::DEFAULT_FAMILY.to_string(),
            path: None,
            fallback: vec!["serif".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Render at the selected band; text below the region is cut off.
    #[default]
    Clip,
    /// Step down through smaller bands until the wrapped text fits.
    Shrink,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub deduplicate: bool,
    pub iou_threshold: f32,
    pub overflow: OverflowPolicy,
    pub passthrough_height: u32,
    pub report: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            deduplicate: false,
            iou_threshold: crate::region::DEFAULT_IOU_THRESHOLD,
            overflow: OverflowPolicy::Clip,
            passthrough_height: 1400,
            report: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    translator: Option<TranslatorFile>,
    layout: Option<LayoutFile>,
    ocr: Option<OcrFile>,
    font: Option<FontFile>,
    pipeline: Option<PipelineFile>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslatorFile {
    #[serde(rename = "type")]
    kind: Option<String>,
    model: Option<String>,
    key: Option<String>,
    base_url: Option<String>,
    temperature: Option<f32>,
    concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutFile {
    #[serde(rename = "type")]
    kind: Option<String>,
    endpoint: Option<String>,
    score_threshold: Option<f32>,
    dpi: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrFile {
    #[serde(rename = "type")]
    kind: Option<String>,
    languages: Option<String>,
    psm: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct FontFile {
    #[serde(rename = "type")]
    kind: Option<String>,
    base_size: Option<f32>,
    family: Option<String>,
    path: Option<String>,
    fallback: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineFile {
    deduplicate: Option<bool>,
    iou_threshold: Option<f32>,
    overflow: Option<OverflowPolicy>,
    passthrough_height: Option<u32>,
    report: Option<bool>,
}

/// Loads the built-in defaults, then `./settings.toml`,
/// `./settings.local.toml` and finally `extra_path`.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    settings.merge_str(DEFAULT_SETTINGS_TOML, "built-in settings")?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge_str(&content, &path.display().to_string())?;
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn merge_str(&mut self, content: &str, origin: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)
            .with_context(|| format!("failed to parse settings: {}", origin))?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(translator) = incoming.translator {
            let target = &mut self.translator;
            if let Some(kind) = non_empty(translator.kind) {
                target.kind = kind;
            }
            if let Some(model) = non_empty(translator.model) {
                target.model = Some(model);
            }
            if let Some(key) = non_empty(translator.key) {
                target.key = Some(key);
            }
            if let Some(url) = non_empty(translator.base_url) {
                target.base_url = Some(url);
            }
            if let Some(temperature) = translator.temperature
                && temperature >= 0.0
            {
                target.temperature = temperature;
            }
            if let Some(concurrency) = translator.concurrency
                && concurrency > 0
            {
                target.concurrency = concurrency;
            }
        }
        if let Some(layout) = incoming.layout {
            let target = &mut self.layout;
            if let Some(kind) = non_empty(layout.kind) {
                target.kind = kind;
            }
            if let Some(endpoint) = non_empty(layout.endpoint) {
                target.endpoint = Some(endpoint);
            }
            if let Some(threshold) = layout.score_threshold {
                target.score_threshold = threshold;
            }
            if let Some(dpi) = layout.dpi
                && dpi > 0
            {
                target.dpi = dpi;
            }
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(kind) = non_empty(ocr.kind) {
                self.ocr.kind = kind;
            }
            if let Some(languages) = non_empty(ocr.languages) {
                self.ocr.languages = languages;
            }
            if let Some(psm) = ocr.psm {
                self.ocr.psm = psm;
            }
        }
        if let Some(font) = incoming.font {
            let target = &mut self.font;
            if let Some(kind) = non_empty(font.kind) {
                target.kind = kind;
            }
            if let Some(size) = font.base_size
                && size > 0.0
            {
                target.base_size = size;
            }
            if let Some(family) = non_empty(font.family) {
                target.family = family;
            }
            if let Some(path) = non_empty(font.path) {
                target.path = Some(path);
            }
            if let Some(fallback) = font.fallback {
                target.fallback = fallback;
            }
        }
        if let Some(pipeline) = incoming.pipeline {
            let target = &mut self.pipeline;
            if let Some(deduplicate) = pipeline.deduplicate {
                target.deduplicate = deduplicate;
            }
            if let Some(threshold) = pipeline.iou_threshold {
                target.iou_threshold = threshold;
            }
            if let Some(overflow) = pipeline.overflow {
                target.overflow = overflow;
            }
            if let Some(height) = pipeline.passthrough_height
                && height > 0
            {
                target.passthrough_height = height;
            }
            if let Some(report) = pipeline.report {
                target.report = report;
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
