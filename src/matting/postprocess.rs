//! Prediction post-processing: logits to a [0,1] alpha map at the source
//! image extent.

use ndarray::{Array2, Array4, ArrayD, ArrayView2, ArrayView4, Axis, Ix2, Ix3, Ix4};

use crate::error::MattingError;
use crate::imaging::resample::{resize_bilinear, CornerAlignment};

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Lift a prediction of rank 2 (`[H,W]`), 3 (`[C,H,W]`) or 4 to `[N,C,H,W]`.
pub fn to_nchw(pred: ArrayD<f32>) -> Result<Array4<f32>, MattingError> {
    let shape = pred.shape().to_vec();
    let reshape_err = |e: ndarray::ShapeError| MattingError::shape(&shape, e.to_string());
    match pred.ndim() {
        2 => Ok(pred
            .into_dimensionality::<Ix2>()
            .map_err(reshape_err)?
            .insert_axis(Axis(0))
            .insert_axis(Axis(0))),
        3 => Ok(pred
            .into_dimensionality::<Ix3>()
            .map_err(reshape_err)?
            .insert_axis(Axis(0))),
        4 => pred.into_dimensionality::<Ix4>().map_err(reshape_err),
        n => Err(MattingError::shape(
            &shape,
            format!("prediction must have 2, 3 or 4 axes, got {n}"),
        )),
    }
}

/// First channel of the first batch element, resized to `(height, width)`
/// with corner-aligned bilinear sampling.
pub fn resize_prediction(
    pred: ArrayView4<'_, f32>,
    height: usize,
    width: usize,
) -> Result<Array2<f32>, MattingError> {
    let (n, c, h, w) = pred.dim();
    if n == 0 || c == 0 || h == 0 || w == 0 {
        return Err(MattingError::shape(pred.shape(), "prediction is empty"));
    }
    let plane = pred.index_axis(Axis(0), 0).index_axis_move(Axis(0), 0);
    Ok(resize_bilinear(plane, height, width, CornerAlignment::Aligned))
}

/// Rescale so the minimum maps to 0 and the maximum to 1. A flat map has no
/// range to stretch and is reported as `DegenerateRange`.
pub fn min_max_normalize(plane: ArrayView2<'_, f32>) -> Result<Array2<f32>, MattingError> {
    let (min, max) = plane
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !min.is_finite() {
        return Err(MattingError::shape(plane.shape(), "prediction has no finite values"));
    }
    let range = max - min;
    if range <= 0.0 {
        return Err(MattingError::DegenerateRange { value: min });
    }
    Ok(plane.mapv(|v| if v.is_finite() { ((v - min) / range).clamp(0.0, 1.0) } else { 0.0 }))
}

/// `threshold > 0`: values strictly above become 1, the rest 0.
/// `threshold == 0`: unchanged.
pub fn binarize(plane: &mut Array2<f32>, threshold: f32) {
    if threshold <= 0.0 {
        return;
    }
    plane.mapv_inplace(|v| if v > threshold { 1.0 } else { 0.0 });
}

/// `image * alpha` per channel. `image` is `[1,C,H,W]`, `alpha` is `[H,W]`.
pub fn composite(image: ArrayView4<'_, f32>, alpha: ArrayView2<'_, f32>) -> Result<Array4<f32>, MattingError> {
    let (_, _, h, w) = image.dim();
    if alpha.dim() != (h, w) {
        return Err(MattingError::shape(
            alpha.shape(),
            format!("alpha does not match image extent ({h}, {w})"),
        ));
    }
    Ok(&image * &alpha)
}
