use anyhow::{Result, anyhow};
use image::RgbImage;
use std::future::Future;
use std::pin::Pin;

use crate::region::OcrOutput;
use crate::settings::{LayoutSettings, OcrSettings, TranslatorSettings};

mod google;
mod layout;
mod openai;
mod retry;
mod tesseract;

pub use google::Google;
pub use layout::{DetectionLabel, HttpLayout, RawDetection};
pub use openai::{OpenAI, system_prompt};
pub use tesseract::{Tesseract, list_tesseract_languages};

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Finds layout blocks on a rendered page, in reading order.
pub trait LayoutProvider: Send + Sync {
    fn detect<'a>(&'a self, page: &'a RgbImage) -> ProviderFuture<'a, Vec<RawDetection>>;
}

/// Recognises word tokens inside one region crop.
pub trait OcrProvider: Send + Sync {
    fn recognize(&self, image: &RgbImage) -> Result<OcrOutput>;
}

pub trait TranslationProvider: Send + Sync {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        from_lang: &'a str,
        to_lang: &'a str,
    ) -> ProviderFuture<'a, String>;

    fn languages(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslatorKind {
    OpenAI,
    Google,
}

impl TranslatorKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "openai" => Ok(TranslatorKind::OpenAI),
            "google" => Ok(TranslatorKind::Google),
            other => Err(anyhow!(
                "unknown translator '{}' (known: openai, google)",
                other
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TranslatorKind::OpenAI => "openai",
            TranslatorKind::Google => "google",
        }
    }
}

#[derive(Debug, Clone)]
pub enum TranslatorImpl {
    OpenAI(OpenAI),
    Google(Google),
}

impl TranslationProvider for TranslatorImpl {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        from_lang: &'a str,
        to_lang: &'a str,
    ) -> ProviderFuture<'a, String> {
        match self {
            TranslatorImpl::OpenAI(provider) => provider.translate(text, from_lang, to_lang),
            TranslatorImpl::Google(provider) => provider.translate(text, from_lang, to_lang),
        }
    }

    fn languages(&self) -> Vec<String> {
        match self {
            TranslatorImpl::OpenAI(provider) => provider.languages(),
            TranslatorImpl::Google(provider) => provider.languages(),
        }
    }
}

pub fn build_translator(settings: &TranslatorSettings) -> Result<TranslatorImpl> {
    let kind = TranslatorKind::parse(&settings.kind)?;
    let key = resolve_key(kind, settings.key.as_deref())?;
    let provider = match kind {
        TranslatorKind::OpenAI => {
            let mut provider = OpenAI::new(key).with_temperature(settings.temperature);
            if let Some(model) = settings.model.as_deref() {
                provider = provider.with_model(model);
            }
            if let Some(url) = settings.base_url.as_deref() {
                provider = provider.with_base_url(url);
            }
            TranslatorImpl::OpenAI(provider)
        }
        TranslatorKind::Google => {
            let mut provider = Google::new(key);
            if let Some(url) = settings.base_url.as_deref() {
                provider = provider.with_base_url(url);
            }
            TranslatorImpl::Google(provider)
        }
    };
    Ok(provider)
}

pub fn resolve_key(kind: TranslatorKind, override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.filter(|key| !key.trim().is_empty()) {
        return Ok(key.to_string());
    }
    match kind {
        TranslatorKind::OpenAI => get_env("OPENAI_API_KEY"),
        TranslatorKind::Google => get_env("GOOGLE_API_KEY"),
    }
    .ok_or_else(|| anyhow!("API key not found for translator {}", kind.as_str()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    Http,
}

impl LayoutKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "http" => Ok(LayoutKind::Http),
            other => Err(anyhow!("unknown layout engine '{}' (known: http)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LayoutImpl {
    Http(HttpLayout),
}

impl LayoutProvider for LayoutImpl {
    fn detect<'a>(&'a self, page: &'a RgbImage) -> ProviderFuture<'a, Vec<RawDetection>> {
        match self {
            LayoutImpl::Http(provider) => provider.detect(page),
        }
    }
}

pub fn build_layout(settings: &LayoutSettings) -> Result<LayoutImpl> {
    match LayoutKind::parse(&settings.kind)? {
        LayoutKind::Http => {
            let endpoint = settings
                .endpoint
                .as_deref()
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow!("layout.endpoint is required for the http layout engine"))?;
            Ok(LayoutImpl::Http(HttpLayout::new(endpoint)))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrKind {
    Tesseract,
}

impl OcrKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "tesseract" => Ok(OcrKind::Tesseract),
            other => Err(anyhow!("unknown ocr engine '{}' (known: tesseract)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum OcrImpl {
    Tesseract(Tesseract),
}

impl OcrProvider for OcrImpl {
    fn recognize(&self, image: &RgbImage) -> Result<OcrOutput> {
        match self {
            OcrImpl::Tesseract(provider) => provider.recognize(image),
        }
    }
}

pub fn build_ocr(settings: &OcrSettings) -> Result<OcrImpl> {
    match OcrKind::parse(&settings.kind)? {
        OcrKind::Tesseract => Ok(OcrImpl::Tesseract(Tesseract::new(
            &settings.languages,
            settings.psm,
        )?)),
    }
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
