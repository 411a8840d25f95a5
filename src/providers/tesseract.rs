use anyhow::{Context, Result, anyhow};
use image::RgbImage;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

use super::OcrProvider;
use crate::region::{OcrOutput, OcrToken};

/// Runs the `tesseract` binary on each region crop.
#[derive(Debug, Clone)]
pub struct Tesseract {
    languages: String,
    psm: u32,
}

impl Tesseract {
    pub fn new(languages: &str, psm: u32) -> Result<Self> {
        Ok(Self {
            languages: normalize_languages(languages)?,
            psm,
        })
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }
}

impl OcrProvider for Tesseract {
    fn recognize(&self, image: &RgbImage) -> Result<OcrOutput> {
        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        image
            .write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush().ok();

        let tsv = run_tesseract_tsv(tmp.path(), &self.languages, self.psm)?;
        let output = parse_tsv_words(&tsv);
        debug!("tesseract found {} words", output.tokens.len());
        Ok(output)
    }
}

pub fn list_tesseract_languages() -> Result<Vec<String>> {
    let output = Command::new("tesseract")
        .arg("--list-langs")
        .output()
        .with_context(|| "failed to run tesseract --list-langs")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect())
}

fn run_tesseract_tsv(path: &Path, languages: &str, psm: u32) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--psm")
        .arg(psm.to_string())
        .arg("tsv")
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Keeps level-5 (word) rows in emission order.
fn parse_tsv_words(tsv: &str) -> OcrOutput {
    let mut tokens = Vec::new();
    for row in tsv.lines().skip(1) {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        if cols[0].parse::<i32>().unwrap_or(0) != 5 {
            continue;
        }
        let top: u32 = cols[7].parse().unwrap_or(0);
        let height: u32 = cols[9].parse().unwrap_or(0);
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }
        tokens.push(OcrToken {
            text: text.to_string(),
            top,
            bottom: top + height,
        });
    }
    OcrOutput { tokens }
}

fn normalize_languages(requested: &str) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }

    let available = match list_tesseract_languages() {
        Ok(list) => list,
        Err(err) => {
            warn!("could not list tesseract languages: {}", err);
            return Ok(trimmed.to_string());
        }
    };
    select_languages(trimmed, &available)
}

fn select_languages(requested: &str, available: &[String]) -> Result<String> {
    let mut chosen = Vec::new();
    let mut missing = Vec::new();
    for lang in requested.split(['+', ',', ' ']).map(str::trim) {
        if lang.is_empty() {
            continue;
        }
        if available.iter().any(|value| value == lang) {
            chosen.push(lang.to_string());
        } else {
            missing.push(lang.to_string());
        }
    }

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!("skipping unavailable ocr language(s): {}", missing.join(", "));
    }
    Ok(chosen.join("+"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t400\t100\t-1\t
4\t1\t1\t1\t1\t0\t3\t4\t380\t30\t-1\t
5\t1\t1\t1\t1\t1\t3\t4\t80\t30\t96.1\tHello
5\t1\t1\t1\t1\t2\t90\t5\t90\t29\t95.3\tworld
5\t1\t1\t1\t1\t3\t190\t5\t10\t29\t-1\t
5\t1\t1\t1\t2\t1\t3\t50\t70\t30\t91.0\tagain
";

    #[test]
    fn parses_word_rows_in_order() {
        let output = parse_tsv_words(TSV);
        let words: Vec<_> = output.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, ["Hello", "world", "again"]);
        assert_eq!(output.tokens[0].top, 4);
        assert_eq!(output.tokens[0].bottom, 34);
        assert_eq!(output.line_count(), 2);
    }

    #[test]
    fn short_rows_are_ignored() {
        assert!(parse_tsv_words("header\n5\t1\t1\n").tokens.is_empty());
    }

    #[test]
    fn selects_available_languages() {
        let available = vec!["eng".to_string(), "deu".to_string()];
        assert_eq!(select_languages("eng+fra, deu", &available).unwrap(), "eng+deu");
        assert!(select_languages("jpn", &available).is_err());
    }
}
