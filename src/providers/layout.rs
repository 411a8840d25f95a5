use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::RgbImage;
use serde::Deserialize;
use serde_json::json;
use std::io::Cursor;

use super::retry::send_with_retry;
use super::{LayoutProvider, ProviderFuture};
use crate::region::RegionKind;

/// Class of a detection as reported by the layout service: either a label
/// such as `"text"` or a numeric class id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DetectionLabel {
    Name(String),
    ClassId(u32),
}

impl From<&DetectionLabel> for RegionKind {
    fn from(label: &DetectionLabel) -> Self {
        match label {
            DetectionLabel::Name(name) => RegionKind::from_label(name),
            DetectionLabel::ClassId(id) => RegionKind::from_class_id(*id),
        }
    }
}

/// An unvalidated detection, `bbox` is `[x1, y1, x2, y2]` in page pixels.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawDetection {
    #[serde(alias = "type", alias = "class")]
    pub label: DetectionLabel,
    pub bbox: [f32; 4],
    pub score: f32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetectResponse {
    Wrapped { regions: Vec<RawDetection> },
    Bare(Vec<RawDetection>),
}

/// Talks to a layout detector served over HTTP. The page is posted as a
/// base64 PNG and the service answers with its detections.
#[derive(Debug, Clone)]
pub struct HttpLayout {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLayout {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    async fn request(&self, page: &RgbImage) -> Result<Vec<RawDetection>> {
        let body = json!({
            "image_base64": encode_png(page)?,
            "width": page.width(),
            "height": page.height(),
        });
        let response = send_with_retry("layout", || self.client.post(&self.endpoint).json(&body))
            .await
            .with_context(|| format!("failed to reach layout service at {}", self.endpoint))?;
        if !response.status.is_success() {
            return Err(anyhow!(
                "layout service error ({}): {}",
                response.status,
                response.body.trim()
            ));
        }
        parse_detections(&response.body)
    }
}

impl LayoutProvider for HttpLayout {
    fn detect<'a>(&'a self, page: &'a RgbImage) -> ProviderFuture<'a, Vec<RawDetection>> {
        Box::pin(self.request(page))
    }
}

fn encode_png(page: &RgbImage) -> Result<String> {
    let mut bytes = Vec::new();
    page.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .with_context(|| "failed to encode page as PNG")?;
    Ok(BASE64.encode(bytes))
}

pub(crate) fn parse_detections(body: &str) -> Result<Vec<RawDetection>> {
    let response: DetectResponse =
        serde_json::from_str(body).with_context(|| "failed to parse layout response JSON")?;
    Ok(match response {
        DetectResponse::Wrapped { regions } => regions,
        DetectResponse::Bare(regions) => regions,
    })
}
