//! Image encoding: `DynamicImage` → base64 [`RasterImage`] within a byte budget.
//!
//! Pages are encoded as PNG first: lossless output keeps small print legible
//! for the vision model. Groq rejects request bodies over 4 MiB, so when a
//! byte budget is given and the PNG would exceed it, the bitmap is resampled
//! once by `sqrt(budget / size)` per axis and re-encoded as JPEG. There is no
//! second pass; an image that is still too large is sent as-is and the
//! provider decides.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// An encoded page image ready to embed in a provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    /// Base64 (standard alphabet, padded) of the encoded image.
    pub data: String,
    /// `image/png` or `image/jpeg`.
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

impl RasterImage {
    /// Approximate number of bytes this image costs on the wire.
    ///
    /// Base64 length × 0.75, i.e. the size of the encoded file itself.
    pub fn estimated_transmitted_size(&self) -> usize {
        estimate_transmitted(self.data.len())
    }

    /// `data:` URI for OpenAI-style `image_url` parts.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

fn estimate_transmitted(base64_len: usize) -> usize {
    (base64_len as f64 * 0.75) as usize
}

/// Encode a rendered page, downscaling once to JPEG if it exceeds `byte_budget`.
///
/// `byte_budget = None` disables the size check (only the fallback provider,
/// which has no payload limit, will see the image).
pub fn encode_page(
    img: &DynamicImage,
    byte_budget: Option<usize>,
    jpeg_quality: u8,
) -> Result<RasterImage, image::ImageError> {
    let png = encode_png(img)?;
    let estimated = png.estimated_transmitted_size();
    debug!(
        "Encoded {}x{} PNG → ~{} bytes",
        png.width, png.height, estimated
    );

    let Some(budget) = byte_budget else {
        return Ok(png);
    };
    if estimated <= budget {
        return Ok(png);
    }

    let factor = (budget as f64 / estimated as f64).sqrt();
    let width = scaled_dimension(img.width(), factor);
    let height = scaled_dimension(img.height(), factor);
    let resized = img.resize_exact(width, height, FilterType::Triangle);
    let jpeg = encode_jpeg(&resized, jpeg_quality)?;

    debug!(
        "Downscaled {}x{} → {}x{} (factor {:.3}): ~{} → ~{} bytes (budget {})",
        png.width,
        png.height,
        width,
        height,
        factor,
        estimated,
        jpeg.estimated_transmitted_size(),
        budget
    );
    Ok(jpeg)
}

/// `max(1, floor(dim × factor))`.
fn scaled_dimension(dim: u32, factor: f64) -> u32 {
    ((dim as f64 * factor).floor() as u32).max(1)
}

fn encode_png(img: &DynamicImage) -> Result<RasterImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(RasterImage {
        data: STANDARD.encode(&buf),
        mime_type: "image/png",
        width: img.width(),
        height: img.height(),
    })
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<RasterImage, image::ImageError> {
    // JPEG has no alpha channel; flatten before encoding.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
    Ok(RasterImage {
        data: STANDARD.encode(&buf),
        mime_type: "image/jpeg",
        width: rgb.width(),
        height: rgb.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    /// Smooth gradient with low-amplitude noise, like a scanned slide:
    /// expensive as PNG, cheap as JPEG.
    fn noise_image(width: u32, height: u32) -> DynamicImage {
        let mut state: u32 = 0x9E37_79B9;
        let img = RgbaImage::from_fn(width, height, |x, y| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            let base = ((x + y) * 200 / (width + height)) as u8;
            Rgba([base + (r & 7), base + (g & 7), base + (b & 7), 255])
        });
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn small_image_stays_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let out = encode_page(&img, Some(1024 * 1024), 85).expect("encode should succeed");
        assert_eq!(out.mime_type, "image/png");
        assert_eq!((out.width, out.height), (10, 10));
        let decoded = STANDARD.decode(&out.data).expect("valid base64");
        assert!(!decoded.is_empty());
    }

    #[test]
    fn no_budget_never_downscales() {
        let img = noise_image(300, 200);
        let out = encode_page(&img, None, 85).unwrap();
        assert_eq!(out.mime_type, "image/png");
        assert_eq!((out.width, out.height), (300, 200));
    }

    #[test]
    fn over_budget_image_is_downscaled_to_jpeg_within_budget() {
        let img = noise_image(400, 300);
        let full = encode_png(&img).unwrap().estimated_transmitted_size();
        let budget = full / 4;

        let out = encode_page(&img, Some(budget), 85).unwrap();
        assert_eq!(out.mime_type, "image/jpeg");
        assert!(out.width < 400 && out.height < 300);
        assert!(
            out.estimated_transmitted_size() as f64 <= budget as f64 * 1.05,
            "{} > {} (+5%)",
            out.estimated_transmitted_size(),
            budget
        );
    }

    #[test]
    fn downscale_factor_follows_square_root_rule() {
        let img = noise_image(400, 300);
        let full = encode_png(&img).unwrap().estimated_transmitted_size();
        let budget = full / 4;
        let factor = (budget as f64 / full as f64).sqrt();

        let out = encode_page(&img, Some(budget), 85).unwrap();
        assert_eq!(out.width, scaled_dimension(400, factor));
        assert_eq!(out.height, scaled_dimension(300, factor));
    }

    #[test]
    fn scaled_dimension_never_reaches_zero() {
        assert_eq!(scaled_dimension(1000, 0.0001), 1);
        assert_eq!(scaled_dimension(1000, 0.5), 500);
        assert_eq!(scaled_dimension(999, 0.5), 499);
    }

    #[test]
    fn estimate_is_three_quarters_of_base64() {
        let img = RasterImage {
            data: "A".repeat(400),
            mime_type: "image/png",
            width: 1,
            height: 1,
        };
        assert_eq!(img.estimated_transmitted_size(), 300);
        assert!(img.data_uri().starts_with("data:image/png;base64,AAAA"));
    }
}
