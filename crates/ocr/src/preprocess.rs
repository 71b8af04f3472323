use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
}

/// Normalized page plus a quality estimate that seeds per-row confidence.
pub struct PreparedImage {
    pub png: Vec<u8>,
    /// 0.0 (unreadable) to 1.0 (clean scan), from contrast and resolution.
    pub quality: f32,
}

/// Process raw image bytes (JPEG / PNG / WEBP / …) into normalized PNG
/// bytes ready for recognition.
pub fn prepare_page(data: &[u8]) -> Result<PreparedImage, PreprocessError> {
    let img = image::load_from_memory(data)?;
    let quality = estimate_quality(&img);
    let png = encode_as_png(normalize(img))?;
    Ok(PreparedImage { png, quality })
}

/// Grayscale + contrast stretch, downscaled for the recognizer's sweet spot
/// (~300 DPI, under ~2800 px on the long edge).
fn normalize(img: DynamicImage) -> DynamicImage {
    let img = if img.width() > 2800 || img.height() > 2800 {
        img.resize(2800, 2800, image::imageops::FilterType::Lanczos3)
    } else {
        img
    };

    let gray: GrayImage = img.to_luma8();

    let (min_px, max_px) = gray
        .pixels()
        .fold((255u8, 0u8), |(mn, mx), p| (mn.min(p[0]), mx.max(p[0])));

    if max_px == min_px {
        // Uniform image — nothing to stretch.
        return DynamicImage::ImageLuma8(gray);
    }

    let range = (max_px - min_px) as u32;
    let stretched: GrayImage = ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let p = gray.get_pixel(x, y)[0];
        let v = ((p - min_px) as u32 * 255 / range) as u8;
        Luma([v])
    });

    DynamicImage::ImageLuma8(stretched)
}

/// Contrast span and pixel count, each capped, averaged. A washed-out
/// thumbnail scores low; a crisp full-page scan scores near 1.0.
fn estimate_quality(img: &DynamicImage) -> f32 {
    let gray = img.to_luma8();
    let (min_px, max_px) = gray
        .pixels()
        .fold((255u8, 0u8), |(mn, mx), p| (mn.min(p[0]), mx.max(p[0])));
    let contrast = (max_px.saturating_sub(min_px)) as f32 / 255.0;

    let pixels = (gray.width() * gray.height()) as f32;
    // ~1 megapixel is plenty for a statement page.
    let resolution = (pixels / 1_000_000.0).min(1.0);

    (contrast + resolution) / 2.0
}

fn encode_as_png(img: DynamicImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};

    fn solid_gray(width: u32, height: u32, value: u8) -> DynamicImage {
        let img: GrayImage = ImageBuffer::from_fn(width, height, |_, _| Luma([value]));
        DynamicImage::ImageLuma8(img)
    }

    fn gradient_gray(width: u32, height: u32) -> DynamicImage {
        let img: GrayImage =
            ImageBuffer::from_fn(width, height, |x, _| Luma([(x * 255 / width) as u8]));
        DynamicImage::ImageLuma8(img)
    }

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn normalize_uniform_image_is_stable() {
        let result = normalize(solid_gray(10, 10, 128));
        assert_eq!(result.width(), 10);
        assert_eq!(result.height(), 10);
    }

    #[test]
    fn normalize_gradient_stretches_to_full_range() {
        let gray = normalize(gradient_gray(256, 1)).to_luma8();
        let min = gray.pixels().map(|p| p[0]).min().unwrap();
        let max = gray.pixels().map(|p| p[0]).max().unwrap();
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn large_image_is_resized() {
        let img: GrayImage = ImageBuffer::from_fn(3000, 3000, |_, _| Luma([200u8]));
        let result = normalize(DynamicImage::ImageLuma8(img));
        assert!(result.width() <= 2800 && result.height() <= 2800);
    }

    #[test]
    fn prepare_page_produces_png() {
        let prepared = prepare_page(&png_bytes(&gradient_gray(64, 64))).unwrap();
        assert_eq!(&prepared.png[..4], b"\x89PNG");
    }

    #[test]
    fn quality_rewards_contrast_and_size() {
        let flat = prepare_page(&png_bytes(&solid_gray(40, 40, 128))).unwrap();
        let crisp = prepare_page(&png_bytes(&gradient_gray(1200, 900))).unwrap();
        assert!(crisp.quality > flat.quality);
        assert!(flat.quality < 0.3, "flat quality was {}", flat.quality);
    }

    #[test]
    fn prepare_page_rejects_garbage() {
        assert!(prepare_page(b"not an image").is_err());
    }
}
