// PNG data URL encoding/decoding for the browser canvas

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, ImageFormat};

use crate::error::CanvasError;

pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Decode a `data:<mime>;base64,<payload>` string (or a bare base64 payload)
/// into an image. The format is sniffed from the bytes, not the mime type.
pub fn decode_data_url(data_url: &str) -> Result<DynamicImage, CanvasError> {
    let payload = match data_url.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| CanvasError::Decode("data URL has no payload".to_string()))?;
            if !header.ends_with(";base64") {
                return Err(CanvasError::Decode(format!(
                    "unsupported data URL encoding: {header}"
                )));
            }
            payload
        }
        None => data_url,
    };

    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| CanvasError::Decode(format!("invalid base64: {e}")))?;

    image::load_from_memory(&bytes).map_err(|e| CanvasError::Decode(e.to_string()))
}

/// Encode as PNG: `L` stays single-channel, anything carrying alpha becomes
/// RGBA, everything else RGB.
pub fn encode_png_data_url(image: &DynamicImage) -> Result<String, CanvasError> {
    let normalized = match image {
        DynamicImage::ImageLuma8(_) => image.clone(),
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };

    let mut buffer = Cursor::new(Vec::new());
    normalized
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| CanvasError::Encode(e.to_string()))?;

    Ok(format!(
        "{PNG_DATA_URL_PREFIX}{}",
        general_purpose::STANDARD.encode(buffer.into_inner())
    ))
}
