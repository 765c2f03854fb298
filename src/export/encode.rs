//! Image encoding: rasterizer output → normalized PNG → `data:` URL.
//!
//! The rasterizer hands back whatever bytes it produced. They are decoded
//! with the `image` crate so a truncated or non-image capture fails here
//! rather than in the user's download, then cropped to the expected
//! supersampled size (headless browsers occasionally add a scrollbar gutter
//! or round the viewport up) and re-encoded as PNG.

use crate::error::ExportError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, GenericImageView};
use std::io::Cursor;
use tracing::debug;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// A decoded, size-checked capture.
#[derive(Debug, Clone)]
pub struct Capture {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Encode an image as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ExportError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| ExportError::Encoding(e.to_string()))?;
    Ok(buf)
}

/// Decode raw rasterizer output and crop it to at most `width`×`height`.
///
/// A capture smaller than expected is kept as-is (the rasterizer chose its
/// own scale); an empty one is an error.
pub fn normalize_capture(bytes: &[u8], width: u32, height: u32) -> Result<Capture, ExportError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ExportError::RasterFailed(format!("unreadable capture: {e}")))?;

    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(ExportError::RasterFailed("empty capture".into()));
    }

    let img = if w > width || h > height {
        debug!("Cropping capture {}x{} to {}x{}", w, h, width.min(w), height.min(h));
        img.crop_imm(0, 0, width.min(w), height.min(h))
    } else {
        img
    };

    let (width, height) = img.dimensions();
    Ok(Capture {
        png: encode_png(&img)?,
        width,
        height,
    })
}

/// Wrap PNG bytes in a `data:image/png;base64,` URL.
pub fn png_data_url(png: &[u8]) -> String {
    let b64 = STANDARD.encode(png);
    debug!("Encoded PNG → {} bytes base64", b64.len());
    format!("{DATA_URL_PREFIX}{b64}")
}

/// Inverse of [`png_data_url`].
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, ExportError> {
    let payload = url
        .strip_prefix(DATA_URL_PREFIX)
        .ok_or_else(|| ExportError::Encoding("not a PNG data URL".into()))?;
    STANDARD
        .decode(payload)
        .map_err(|e| ExportError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])));
        encode_png(&img).expect("encode should succeed")
    }

    #[test]
    fn oversized_capture_is_cropped() {
        let capture = normalize_capture(&png(20, 30), 16, 24).unwrap();
        assert_eq!((capture.width, capture.height), (16, 24));
        let decoded = image::load_from_memory(&capture.png).unwrap();
        assert_eq!(decoded.dimensions(), (16, 24));
    }

    #[test]
    fn smaller_capture_is_kept() {
        let capture = normalize_capture(&png(8, 10), 16, 24).unwrap();
        assert_eq!((capture.width, capture.height), (8, 10));
    }

    #[test]
    fn garbage_is_a_raster_failure() {
        let err = normalize_capture(b"not a png", 16, 24).unwrap_err();
        assert!(matches!(err, ExportError::RasterFailed(_)));
    }

    #[test]
    fn data_url_prefix_and_payload() {
        let bytes = png(2, 2);
        let url = png_data_url(&bytes);
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(decode_data_url(&url).unwrap(), bytes);
        assert!(decode_data_url("data:text/plain,hi").is_err());
    }
}
