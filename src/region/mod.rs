mod dedup;

use anyhow::{Result, anyhow};
use image::RgbImage;
use serde::{Deserialize, Serialize};

pub use dedup::{DEFAULT_IOU_THRESHOLD, deduplicate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Text,
    Title,
    List,
    Table,
    Figure,
    #[serde(untagged)]
    Unknown(String),
}

impl RegionKind {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "text" => RegionKind::Text,
            "title" => RegionKind::Title,
            "list" => RegionKind::List,
            "table" => RegionKind::Table,
            "figure" => RegionKind::Figure,
            other => RegionKind::Unknown(other.to_string()),
        }
    }

    /// Numeric classes emitted by PubLayNet-style detectors.
    pub fn from_class_id(id: u32) -> Self {
        match id {
            0 => RegionKind::Text,
            1 => RegionKind::Title,
            2 => RegionKind::List,
            3 => RegionKind::Table,
            4 => RegionKind::Figure,
            other => RegionKind::Unknown(format!("class-{}", other)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RegionKind::Text => "text",
            RegionKind::Title => "title",
            RegionKind::List => "list",
            RegionKind::Table => "table",
            RegionKind::Figure => "figure",
            RegionKind::Unknown(label) => label.as_str(),
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, RegionKind::Text | RegionKind::Title | RegionKind::List)
    }
}

/// Axis-aligned box in page pixels, `x1 < x2` and `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Result<Self> {
        if x2 <= x1 || y2 <= y1 {
            return Err(anyhow!(
                "malformed bbox ({}, {}, {}, {}): dimensions must be positive",
                x1,
                y1,
                x2,
                y2
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Builds a box from detector coordinates, clamped to the page.
    pub fn from_detection(coords: [f32; 4], page_width: u32, page_height: u32) -> Result<Self> {
        let clamp = |value: f32, max: u32| -> u32 {
            if value.is_nan() {
                0
            } else {
                (value.max(0.0) as u32).min(max)
            }
        };
        let [x1, y1, x2, y2] = coords;
        Self::new(
            clamp(x1, page_width),
            clamp(y1, page_height),
            clamp(x2, page_width),
            clamp(y2, page_height),
        )
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn intersection_area(&self, other: &BBox) -> u64 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        if ix2 <= ix1 || iy2 <= iy1 {
            return 0;
        }
        (ix2 - ix1) as u64 * (iy2 - iy1) as u64
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union == 0 {
            return 0.0;
        }
        (inter as f64 / union as f64) as f32
    }
}

/// One layout hit after validation, before any pixels are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub kind: RegionKind,
    pub bbox: BBox,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FontChoice {
    pub family: String,
    pub point_size: f32,
    pub line_pitch: u32,
}

/// A word box reported by OCR, in region-local pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    pub top: u32,
    pub bottom: u32,
}

#[derive(Debug, Clone, Default)]
pub struct OcrOutput {
    pub tokens: Vec<OcrToken>,
}

impl OcrOutput {
    pub fn words(&self) -> Vec<String> {
        self.tokens
            .iter()
            .map(|token| token.text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect()
    }

    /// Counts visual lines: a token opens a new line when its top lies
    /// below the bottom of the token that opened the previous line.
    pub fn line_count(&self) -> u32 {
        let mut last_y = 0u32;
        let mut count = 0u32;
        for token in &self.tokens {
            if token.top > last_y {
                count += 1;
                last_y = token.bottom;
            }
        }
        count
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Region {
    pub kind: RegionKind,
    pub bbox: BBox,
    pub score: f32,
    #[serde(skip)]
    source_image: RgbImage,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    words: Vec<String>,
    recognized_text: Option<String>,
    line_count: Option<u32>,
    translated_text: Option<String>,
    font: Option<FontChoice>,
}

impl Region {
    pub fn from_detection(detection: Detection, page: &RgbImage) -> Self {
        Self::new(detection.kind, detection.bbox, detection.score, page)
    }

    pub fn new(kind: RegionKind, bbox: BBox, score: f32, page: &RgbImage) -> Self {
        let source_image =
            image::imageops::crop_imm(page, bbox.x1, bbox.y1, bbox.width(), bbox.height())
                .to_image();
        Self {
            kind,
            bbox,
            score,
            source_image,
            words: Vec::new(),
            recognized_text: None,
            line_count: None,
            translated_text: None,
            font: None,
        }
    }

    pub fn source_image(&self) -> &RgbImage {
        &self.source_image
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn recognized_text(&self) -> Option<&str> {
        self.recognized_text.as_deref()
    }

    pub fn line_count(&self) -> Option<u32> {
        self.line_count
    }

    pub fn translated_text(&self) -> Option<&str> {
        self.translated_text.as_deref()
    }

    pub fn font(&self) -> Option<&FontChoice> {
        self.font.as_ref()
    }

    /// Stores recognised text; a region with no words keeps no text.
    pub fn attach_ocr(&mut self, output: &OcrOutput) {
        let words = output.words();
        if words.is_empty() {
            self.words.clear();
            self.recognized_text = None;
            self.line_count = None;
            return;
        }
        let text = words.join(" ").replace(['\n', '\t'], " ");
        self.recognized_text = Some(text);
        self.line_count = Some(output.line_count().max(1));
        self.words = words;
    }

    pub fn attach_translation(&mut self, text: String) -> Result<()> {
        if self
            .recognized_text
            .as_deref()
            .is_none_or(|value| value.trim().is_empty())
        {
            return Err(anyhow!(
                "cannot attach a translation to a region without recognized text"
            ));
        }
        self.translated_text = Some(text);
        Ok(())
    }

    pub fn attach_font(&mut self, font: FontChoice) -> Result<()> {
        if self.line_count.is_none() {
            return Err(anyhow!("cannot choose a font before the line count is known"));
        }
        self.font = Some(font);
        Ok(())
    }
}
