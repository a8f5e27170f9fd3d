//! Normalization of externally supplied image/mask tensors into the cache's
//! canonical form: `RgbImage` (H×W×3) and `GrayImage` (H×W), 8-bit.
//!
//! Accepted layouts:
//!
//! | kind  | shapes |
//! |-------|--------|
//! | image | `[H,W,3]`, `[N,H,W,3]`, `[3,H,W]`, `[N,3,H,W]` |
//! | mask  | `[H,W]`, `[N,H,W]`, `[1,H,W]`, `[H,W,1]`, `[N,1,H,W]`, `[N,H,W,1]` |
//!
//! An image whose leading and trailing axes are both 3 is read as
//! channel-first.
//!
//! A batch axis with more than one element contributes only its first
//! element. Values are clamped to [0,1] before the byte conversion.

use image::{GrayImage, RgbImage, Rgb};
use ndarray::{Array2, ArrayView2, ArrayView3, ArrayViewD, Axis, Ix2, Ix3};

use crate::error::CanvasError;
use crate::imaging::resample::{resize_bilinear, CornerAlignment};
use crate::imaging::tensor::{plane_to_gray, unit_to_byte};

fn first_of_batch<'a>(view: ArrayViewD<'a, f32>) -> Result<ArrayViewD<'a, f32>, CanvasError> {
    let batch = view.shape()[0];
    if batch == 0 {
        return Err(CanvasError::shape(view.shape(), "empty batch"));
    }
    if batch > 1 {
        log::debug!("[INGEST] Batch of {} received, using the first element", batch);
    }
    Ok(view.index_axis_move(Axis(0), 0))
}

pub fn normalize_image(tensor: ArrayViewD<'_, f32>) -> Result<RgbImage, CanvasError> {
    let original_shape = tensor.shape().to_vec();
    let view = match tensor.ndim() {
        4 => first_of_batch(tensor)?,
        3 => tensor,
        _ => {
            return Err(CanvasError::shape(
                &original_shape,
                "image must have 3 or 4 axes",
            ))
        }
    };

    let view: ArrayView3<'_, f32> = view
        .into_dimensionality::<Ix3>()
        .map_err(|e| CanvasError::shape(&original_shape, e.to_string()))?;

    // a leading 3 wins, so `[3,H,3]` is channel-first
    let hwc = match view.dim() {
        (3, _, _) => view.permuted_axes([1, 2, 0]),
        (_, _, 3) => view,
        _ => {
            return Err(CanvasError::shape(
                &original_shape,
                "expected 3 channels, trailing (HWC) or leading (CHW)",
            ))
        }
    };

    let (h, w, _) = hwc.dim();
    if h == 0 || w == 0 {
        return Err(CanvasError::shape(&original_shape, "image has no pixels"));
    }

    Ok(RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            unit_to_byte(hwc[[y, x, 0]]),
            unit_to_byte(hwc[[y, x, 1]]),
            unit_to_byte(hwc[[y, x, 2]]),
        ])
    }))
}

fn strip_to_plane<'a>(
    tensor: ArrayViewD<'a, f32>,
    original_shape: &[usize],
) -> Result<ArrayView2<'a, f32>, CanvasError> {
    let mut view = tensor;
    if view.ndim() == 4 {
        view = first_of_batch(view)?;
    }
    if view.ndim() == 3 {
        let shape = view.shape().to_vec();
        view = if shape[0] == 1 {
            view.index_axis_move(Axis(0), 0)
        } else if shape[2] == 1 {
            view.index_axis_move(Axis(2), 0)
        } else {
            first_of_batch(view)?
        };
    }
    view.into_dimensionality::<Ix2>().map_err(|_| {
        CanvasError::shape(original_shape, "mask must reduce to a single [H,W] plane")
    })
}

/// Normalize a mask. When `target` (height, width) is given and differs from
/// the mask's extent, the mask is resampled bilinearly (half-pixel centres)
/// to exactly that extent.
pub fn normalize_mask(
    tensor: ArrayViewD<'_, f32>,
    target: Option<(usize, usize)>,
) -> Result<GrayImage, CanvasError> {
    let original_shape = tensor.shape().to_vec();
    if !(2..=4).contains(&tensor.ndim()) {
        return Err(CanvasError::shape(&original_shape, "mask must have 2 to 4 axes"));
    }

    let plane = strip_to_plane(tensor, &original_shape)?;
    if plane.is_empty() {
        return Err(CanvasError::shape(&original_shape, "mask has no pixels"));
    }
    let clamped: Array2<f32> = plane.mapv(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) });

    let resized = match target {
        Some((h, w)) if (h, w) != clamped.dim() && h > 0 && w > 0 => {
            log::debug!(
                "[INGEST] Resampling mask {:?} -> ({}, {})",
                clamped.dim(),
                h,
                w
            );
            resize_bilinear(clamped.view(), h, w, CornerAlignment::HalfPixel)
        }
        _ => clamped,
    };

    Ok(plane_to_gray(resized.view()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, ArrayD, IxDyn};

    fn tensor(shape: &[usize], fill: f32) -> ArrayD<f32> {
        ArrayD::from_elem(IxDyn(shape), fill)
    }

    #[test]
    fn test_image_layouts_agree() {
        let hwc = Array::from_shape_fn((2, 3, 3), |(y, x, c)| (y * 9 + x * 3 + c) as f32 / 20.0);
        let chw = hwc.clone().permuted_axes([2, 0, 1]).to_owned();

        let from_hwc = normalize_image(hwc.view().into_dyn()).unwrap();
        let from_chw = normalize_image(chw.view().into_dyn()).unwrap();
        let batched = hwc.clone().insert_axis(Axis(0));
        let from_batched = normalize_image(batched.view().into_dyn()).unwrap();
        let batched_chw = chw.insert_axis(Axis(0));
        let from_batched_chw = normalize_image(batched_chw.view().into_dyn()).unwrap();

        assert_eq!(from_hwc.dimensions(), (3, 2));
        assert_eq!(from_hwc, from_chw);
        assert_eq!(from_hwc, from_batched);
        assert_eq!(from_hwc, from_batched_chw);
    }

    #[test]
    fn test_leading_three_is_channel_first() {
        // [3, H=2, W=3]: channel 0 set, the rest zero
        let mut chw = tensor(&[3, 2, 3], 0.0);
        chw.index_axis_mut(Axis(0), 0).fill(1.0);
        let img = normalize_image(chw.view()).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert!(img.pixels().all(|p| *p == Rgb([255, 0, 0])));

        let batched = chw.insert_axis(Axis(0));
        let img = normalize_image(batched.view()).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_image_out_of_range_is_clamped() {
        let mut t = tensor(&[1, 1, 2, 3], 0.0);
        t[[0, 0, 0, 0]] = -2.0;
        t[[0, 0, 1, 0]] = 7.5;
        t[[0, 0, 1, 1]] = 1.0;
        let img = normalize_image(t.view()).unwrap();
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(1, 0), &Rgb([255, 255, 0]));
    }

    #[test]
    fn test_image_batch_uses_first_element() {
        let mut t = tensor(&[2, 1, 1, 3], 0.0);
        t[[1, 0, 0, 0]] = 1.0;
        let img = normalize_image(t.view()).unwrap();
        assert_eq!(img.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_image_bad_shapes_are_shape_errors() {
        for shape in [vec![4, 4], vec![2, 2, 2], vec![1, 2, 2, 5], vec![0, 2, 2, 3]] {
            let t = tensor(&shape, 0.5);
            assert!(
                matches!(normalize_image(t.view()), Err(CanvasError::Shape { .. })),
                "shape {shape:?}"
            );
        }
    }

    #[test]
    fn test_mask_strips_batch_and_channel() {
        for shape in [
            vec![3, 5],
            vec![1, 3, 5],
            vec![3, 5, 1],
            vec![1, 1, 3, 5],
            vec![1, 3, 5, 1],
        ] {
            let t = tensor(&shape, 1.0);
            let mask = normalize_mask(t.view(), None).unwrap();
            assert_eq!(mask.dimensions(), (5, 3), "shape {shape:?}");
            assert_eq!(mask.get_pixel(0, 0)[0], 255);
        }
    }

    #[test]
    fn test_mask_resample_hits_target_extent_exactly() {
        let t = tensor(&[1, 7, 13], 0.5);
        for target in [(1, 1), (7, 13), (20, 3), (512, 512), (9, 40)] {
            let mask = normalize_mask(t.view(), Some(target)).unwrap();
            assert_eq!(
                (mask.height() as usize, mask.width() as usize),
                target
            );
        }
    }

    #[test]
    fn test_mask_resample_keeps_uniform_value() {
        let t = tensor(&[4, 4], 1.0);
        let mask = normalize_mask(t.view(), Some((8, 2))).unwrap();
        assert!(mask.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_mask_clamps() {
        let t = tensor(&[2, 2], 4.0);
        let mask = normalize_mask(t.view(), None).unwrap();
        assert!(mask.pixels().all(|p| p[0] == 255));
        let t = tensor(&[2, 2], -1.0);
        let mask = normalize_mask(t.view(), None).unwrap();
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_mask_rejects_bad_rank() {
        let t = tensor(&[5], 1.0);
        assert!(normalize_mask(t.view(), None).is_err());
        let t = tensor(&[1, 1, 1, 1, 1], 1.0);
        assert!(normalize_mask(t.view(), None).is_err());
    }
}
