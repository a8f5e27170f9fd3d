// Conversions between rasters and float tensors

use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::{Array3, Array4, ArrayD, ArrayView2, ArrayView4, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::CanvasError;

/// JSON form of a dense float tensor, row-major.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TensorPayload {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorPayload {
    pub fn into_array(self) -> Result<ArrayD<f32>, CanvasError> {
        let expected: usize = self.shape.iter().product();
        if expected != self.data.len() {
            return Err(CanvasError::shape(
                &self.shape,
                format!("shape holds {expected} values but {} were sent", self.data.len()),
            ));
        }
        ArrayD::from_shape_vec(IxDyn(&self.shape), self.data)
            .map_err(|e| CanvasError::shape(&[], e.to_string()))
    }

    pub fn from_array<D: ndarray::Dimension>(array: &ndarray::Array<f32, D>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
    }
}

/// Float in [0,1] to byte. Out-of-range input is clamped first, then scaled
/// and truncated.
#[inline]
pub fn unit_to_byte(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 255.0) as u8
}

#[inline]
pub fn byte_to_unit(value: u8) -> f32 {
    value as f32 / 255.0
}

/// `[1, 3, H, W]` in [0,1].
pub fn rgb_to_nchw(image: &RgbImage) -> Array4<f32> {
    let (w, h) = image.dimensions();
    Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
        byte_to_unit(image.get_pixel(x as u32, y as u32)[c])
    })
}

/// `[1, H, W, 3]` in [0,1], the node's IMAGE output layout.
pub fn rgb_to_nhwc(image: &RgbImage) -> Array4<f32> {
    let (w, h) = image.dimensions();
    Array4::from_shape_fn((1, h as usize, w as usize, 3), |(_, y, x, c)| {
        byte_to_unit(image.get_pixel(x as u32, y as u32)[c])
    })
}

/// `[1, H, W]` in [0,1], the node's MASK output layout.
pub fn gray_to_batch(mask: &GrayImage) -> Array3<f32> {
    let (w, h) = mask.dimensions();
    Array3::from_shape_fn((1, h as usize, w as usize), |(_, y, x)| {
        byte_to_unit(mask.get_pixel(x as u32, y as u32)[0])
    })
}

pub fn plane_to_gray(plane: ArrayView2<'_, f32>) -> GrayImage {
    let (h, w) = plane.dim();
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([unit_to_byte(plane[[y as usize, x as usize]])])
    })
}

/// First batch element of a `[N, 3, H, W]` tensor as an RGB raster.
pub fn nchw_to_rgb(tensor: ArrayView4<'_, f32>) -> Result<RgbImage, CanvasError> {
    let (n, c, h, w) = tensor.dim();
    if n == 0 || c != 3 {
        return Err(CanvasError::shape(tensor.shape(), "expected [N, 3, H, W]"));
    }
    Ok(RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            unit_to_byte(tensor[[0, 0, y, x]]),
            unit_to_byte(tensor[[0, 1, y, x]]),
            unit_to_byte(tensor[[0, 2, y, x]]),
        ])
    }))
}

/// First channel of a `[N, C, H, W]` tensor as an 8-bit mask.
pub fn nchw_to_gray(tensor: ArrayView4<'_, f32>) -> Result<GrayImage, CanvasError> {
    let (n, c, _, _) = tensor.dim();
    if n == 0 || c == 0 {
        return Err(CanvasError::shape(tensor.shape(), "expected [N, C, H, W]"));
    }
    Ok(plane_to_gray(tensor.slice(ndarray::s![0, 0, .., ..])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_to_byte_clamps() {
        assert_eq!(unit_to_byte(-0.5), 0);
        assert_eq!(unit_to_byte(0.0), 0);
        assert_eq!(unit_to_byte(0.5), 127);
        assert_eq!(unit_to_byte(1.0), 255);
        assert_eq!(unit_to_byte(3.0), 255);
        assert_eq!(unit_to_byte(f32::NAN), 0);
    }

    #[test]
    fn test_payload_rejects_mismatched_length() {
        let payload = TensorPayload {
            shape: vec![2, 2],
            data: vec![0.0; 3],
        };
        assert!(matches!(payload.into_array(), Err(CanvasError::Shape { .. })));
    }

    #[test]
    fn test_nchw_layout_and_back() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(1, 0, Rgb([255, 0, 51]));
        let tensor = rgb_to_nchw(&img);
        assert_eq!(tensor.shape(), &[1, 3, 1, 2]);
        assert_eq!(tensor[[0, 0, 0, 1]], 1.0);
        assert!((tensor[[0, 2, 0, 1]] - 0.2).abs() < 1e-6);
        let back = nchw_to_rgb(tensor.view()).unwrap();
        assert_eq!(back.get_pixel(1, 0), &Rgb([255, 0, 51]));
    }

    #[test]
    fn test_node_output_layouts() {
        let img = RgbImage::from_pixel(4, 3, Rgb([255, 255, 255]));
        assert_eq!(rgb_to_nhwc(&img).shape(), &[1, 3, 4, 3]);
        let mask = GrayImage::new(4, 3);
        assert_eq!(gray_to_batch(&mask).shape(), &[1, 3, 4]);
    }
}
