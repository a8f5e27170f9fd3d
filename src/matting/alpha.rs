//! Alpha handling on the HTTP matting path.
//!
//! An input that already carries transparency keeps it: the channel is set
//! aside before inference and later combined with the model's alpha by
//! per-pixel minimum.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use serde::Serialize;

use super::pipeline::MattingResult;
use crate::error::MattingError;
use crate::imaging::data_url::encode_png_data_url;
use crate::imaging::tensor::{byte_to_unit, nchw_to_gray, nchw_to_rgb};

/// White, the background transparent parts are flattened onto before inference.
const FLATTEN_BACKGROUND: f32 = 255.0;

/// Split off the source alpha (if any) and return the opaque RGB raster the
/// model sees.
pub fn split_alpha(image: &DynamicImage) -> (RgbImage, Option<GrayImage>) {
    if !image.color().has_alpha() {
        return (image.to_rgb8(), None);
    }

    let rgba = image.to_rgba8();
    let alpha = GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        Luma([rgba.get_pixel(x, y)[3]])
    });
    let rgb = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let p = rgba.get_pixel(x, y);
        let a = byte_to_unit(p[3]);
        let flatten = |c: u8| {
            (c as f32 * a + FLATTEN_BACKGROUND * (1.0 - a)).round().clamp(0.0, 255.0) as u8
        };
        Rgb([flatten(p[0]), flatten(p[1]), flatten(p[2])])
    });
    (rgb, Some(alpha))
}

/// Per-pixel `min(a, b)`: a pixel is only as opaque as the more transparent
/// of the two sources.
pub fn combine_alpha(a: &GrayImage, b: &GrayImage) -> Result<GrayImage, MattingError> {
    if a.dimensions() != b.dimensions() {
        let (aw, ah) = a.dimensions();
        let (bw, bh) = b.dimensions();
        return Err(MattingError::shape(
            &[bh as usize, bw as usize],
            format!("alpha extent differs from source alpha ({ah}, {aw})"),
        ));
    }
    Ok(GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y)[0].min(b.get_pixel(x, y)[0])])
    }))
}

pub fn attach_alpha(rgb: &RgbImage, alpha: &GrayImage) -> Result<RgbaImage, MattingError> {
    if rgb.dimensions() != alpha.dimensions() {
        let (w, h) = alpha.dimensions();
        return Err(MattingError::shape(
            &[h as usize, w as usize],
            "alpha extent differs from image extent",
        ));
    }
    Ok(RgbaImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let p = rgb.get_pixel(x, y);
        Rgba([p[0], p[1], p[2], alpha.get_pixel(x, y)[0]])
    }))
}

#[derive(Debug, Clone, Serialize)]
pub struct MattingResponse {
    pub matted_image: String,
    pub alpha_mask: String,
}

/// `matted_image` carries the combined alpha (or the model alpha when the
/// request had none); `alpha_mask` is the model alpha alone.
pub fn encode_matting_response(
    result: &MattingResult,
    source_alpha: Option<&GrayImage>,
) -> Result<MattingResponse, MattingError> {
    let rgb = nchw_to_rgb(result.masked_image.view())?;
    let model_alpha = nchw_to_gray(result.alpha_mask.view())?;

    let embedded = match source_alpha {
        Some(source) => combine_alpha(source, &model_alpha)?,
        None => model_alpha.clone(),
    };
    let matted = attach_alpha(&rgb, &embedded)?;

    Ok(MattingResponse {
        matted_image: encode_png_data_url(&DynamicImage::ImageRgba8(matted))?,
        alpha_mask: encode_png_data_url(&DynamicImage::ImageLuma8(model_alpha))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(values: &[u8]) -> GrayImage {
        GrayImage::from_fn(values.len() as u32, 1, |x, _| Luma([values[x as usize]]))
    }

    #[test]
    fn test_combine_takes_the_minimum() {
        let out = combine_alpha(&gray(&[200, 0]), &gray(&[50, 255])).unwrap();
        assert_eq!(out.as_raw(), &vec![50, 0]);
    }

    #[test]
    fn test_combine_is_commutative_and_bounded() {
        let a = gray(&[0, 17, 128, 200, 255]);
        let b = gray(&[255, 16, 129, 200, 3]);
        let ab = combine_alpha(&a, &b).unwrap();
        let ba = combine_alpha(&b, &a).unwrap();
        assert_eq!(ab, ba);
        for ((c, x), y) in ab.as_raw().iter().zip(a.as_raw()).zip(b.as_raw()) {
            assert!(c <= x && c <= y);
        }
    }

    #[test]
    fn test_combine_rejects_mismatched_extents() {
        assert!(combine_alpha(&gray(&[1, 2]), &gray(&[1])).is_err());
    }

    #[test]
    fn test_split_alpha_flattens_onto_white() {
        let mut rgba = RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        rgba.put_pixel(1, 0, Rgba([10, 20, 30, 255]));
        let (rgb, alpha) = split_alpha(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([10, 20, 30]));
        assert_eq!(alpha.unwrap().as_raw(), &vec![0, 255]);
    }

    #[test]
    fn test_split_alpha_opaque_input_has_none() {
        let (rgb, alpha) = split_alpha(&DynamicImage::ImageRgb8(RgbImage::new(3, 2)));
        assert_eq!(rgb.dimensions(), (3, 2));
        assert!(alpha.is_none());
    }

    #[test]
    fn test_attach_alpha() {
        let rgb = RgbImage::from_pixel(1, 1, Rgb([1, 2, 3]));
        let rgba = attach_alpha(&rgb, &gray(&[9])).unwrap();
        assert_eq!(rgba.get_pixel(0, 0), &Rgba([1, 2, 3, 9]));
    }
}
