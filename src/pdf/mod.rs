use anyhow::{Context, Result, anyhow};
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;
use tracing::debug;

pub const MERGED_FILE_NAME: &str = "translated.pdf";

/// Rasterises every page of `pdf_bytes` at `dpi`, in page order.
pub fn render_pages(pdf_bytes: &[u8], dpi: u32) -> Result<Vec<RgbImage>> {
    let dir = tempdir().with_context(|| "failed to create temp dir for pdf")?;
    let input_path = dir.path().join("input.pdf");
    fs::write(&input_path, pdf_bytes).with_context(|| "failed to write temp pdf")?;
    let dpi = dpi.to_string();

    if command_exists("mutool") {
        let output = Command::new("mutool")
            .arg("draw")
            .arg("-r")
            .arg(&dpi)
            .arg("-o")
            .arg(dir.path().join("page-%03d.png"))
            .arg(&input_path)
            .output()
            .with_context(|| "failed to run mutool draw")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("mutool draw failed: {}", stderr.trim()));
        }
        return decode_pages(&sorted_pngs(dir.path())?);
    }

    if command_exists("pdftoppm") {
        let output = Command::new("pdftoppm")
            .arg("-r")
            .arg(&dpi)
            .arg("-png")
            .arg(&input_path)
            .arg(dir.path().join("page"))
            .output()
            .with_context(|| "failed to run pdftoppm")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("pdftoppm failed: {}", stderr.trim()));
        }
        return decode_pages(&sorted_pngs(dir.path())?);
    }

    Err(anyhow!(
        "pdf rendering requires mutool or pdftoppm (install mupdf or poppler)"
    ))
}

fn decode_pages(paths: &[PathBuf]) -> Result<Vec<RgbImage>> {
    paths
        .iter()
        .map(|path| {
            image::open(path)
                .map(|image| image.to_rgb8())
                .with_context(|| format!("failed to decode rendered page: {}", path.display()))
        })
        .collect()
}

/// Writes one page output as `NNN.png` (zero-padded page index).
pub fn write_page(dir: &Path, index: usize, page: &RgbImage) -> Result<PathBuf> {
    let path = dir.join(format!("{:03}.png", index));
    page.save_with_format(&path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write page: {}", path.display()))?;
    Ok(path)
}

/// Concatenates the page images in `dir` into `dir/translated.pdf`.
pub fn merge_pages(dir: &Path) -> Result<PathBuf> {
    let pages = sorted_pngs(dir)?
        .iter()
        .map(|path| {
            fs::read(path).with_context(|| format!("failed to read page: {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    debug!("merging {} pages", pages.len());
    let pdf = images_to_pdf(&pages)?;
    let path = dir.join(MERGED_FILE_NAME);
    fs::write(&path, pdf).with_context(|| format!("failed to write pdf: {}", path.display()))?;
    Ok(path)
}

/// PNG files in `dir`, ordered by file name.
fn sorted_pngs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
        })
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

fn command_exists(cmd: &str) -> bool {
    match Command::new(cmd).arg("-h").output() {
        Ok(_) => true,
        Err(err) => err.kind() != std::io::ErrorKind::NotFound,
    }
}

fn images_to_pdf(pages: &[Vec<u8>]) -> Result<Vec<u8>> {
    use printpdf::{Image, ImageTransform, Mm, PdfDocument};

    let mut doc = None;
    let mut layers = Vec::new();

    for (idx, bytes) in pages.iter().enumerate() {
        let image = printpdf::image_crate::load_from_memory(bytes)
            .with_context(|| "failed to decode page image")?;
        let width_mm = px_to_mm(image.width());
        let height_mm = px_to_mm(image.height());

        if idx == 0 {
            let (doc_handle, page, layer) =
                PdfDocument::new("translated", Mm(width_mm), Mm(height_mm), "Layer 1");
            doc = Some(doc_handle);
            layers.push((page, layer, image));
        } else if let Some(doc_handle) = doc.as_mut() {
            let (page, layer) =
                doc_handle.add_page(Mm(width_mm), Mm(height_mm), format!("Layer {}", idx + 1));
            layers.push((page, layer, image));
        }
    }

    let doc = doc.ok_or_else(|| anyhow!("no pages to merge"))?;
    for (page, layer, image) in layers {
        let current_layer = doc.get_page(page).get_layer(layer);
        let transform = ImageTransform {
            translate_x: Some(Mm(0.0)),
            translate_y: Some(Mm(0.0)),
            rotate: None,
            scale_x: Some(1.0),
            scale_y: Some(1.0),
            dpi: Some(72.0),
        };
        Image::from_dynamic_image(&image).add_to_layer(current_layer, transform);
    }

    let mut buffer = Vec::new();
    {
        let mut writer = std::io::BufWriter::new(&mut buffer);
        doc.save(&mut writer).with_context(|| "failed to write pdf")?;
    }
    Ok(buffer)
}

fn px_to_mm(px: u32) -> f32 {
    px as f32 / 72.0 * 25.4
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn pages_are_named_by_zero_padded_index() {
        let dir = tempdir().unwrap();
        let path = write_page(dir.path(), 7, &RgbImage::new(4, 4)).unwrap();
        assert_eq!(path.file_name().unwrap(), "007.png");
    }

    #[test]
    fn merge_follows_page_index_not_write_order() {
        let dir = tempdir().unwrap();
        write_page(dir.path(), 10, &RgbImage::new(4, 4)).unwrap();
        write_page(dir.path(), 2, &RgbImage::new(4, 4)).unwrap();
        write_page(dir.path(), 0, &RgbImage::new(4, 4)).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let names: Vec<_> = sorted_pngs(dir.path())
            .unwrap()
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["000.png", "002.png", "010.png"]);
    }

    #[test]
    fn merged_pdf_is_written_next_to_pages() {
        let dir = tempdir().unwrap();
        write_page(dir.path(), 0, &RgbImage::from_pixel(20, 30, Rgb([255, 0, 0]))).unwrap();
        write_page(dir.path(), 1, &RgbImage::from_pixel(30, 20, Rgb([0, 0, 255]))).unwrap();
        let path = merge_pages(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), MERGED_FILE_NAME);
        let bytes = fs::read(path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn merging_nothing_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(merge_pages(dir.path()).is_err());
    }
}
