//! Bilinear resampling of single-channel float planes.
//!
//! The two corner conventions follow the usual tensor-library definitions:
//!
//! - [`CornerAlignment::HalfPixel`] (`align_corners = false`): pixel centres are
//!   mapped with `src = (dst + 0.5) * in / out - 0.5`, clamped at zero. Used for
//!   general mask resampling during ingest.
//! - [`CornerAlignment::Aligned`] (`align_corners = true`): the first and last
//!   samples of both grids coincide, `src = dst * (in - 1) / (out - 1)`. Used
//!   when the matting output is mapped back onto the source image.

use ndarray::{Array2, ArrayView2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CornerAlignment {
    Aligned,
    HalfPixel,
}

/// One output coordinate's source taps: (lower index, upper index, weight of upper).
#[derive(Debug, Clone, Copy)]
struct Tap {
    lo: usize,
    hi: usize,
    frac: f32,
}

fn axis_taps(in_len: usize, out_len: usize, align: CornerAlignment) -> Vec<Tap> {
    (0..out_len)
        .map(|dst| {
            if in_len <= 1 {
                return Tap { lo: 0, hi: 0, frac: 0.0 };
            }
            let src = match align {
                CornerAlignment::Aligned => {
                    if out_len > 1 {
                        dst as f64 * (in_len - 1) as f64 / (out_len - 1) as f64
                    } else {
                        0.0
                    }
                }
                CornerAlignment::HalfPixel => {
                    ((dst as f64 + 0.5) * in_len as f64 / out_len as f64 - 0.5).max(0.0)
                }
            };
            let lo = (src.floor() as usize).min(in_len - 1);
            let hi = (lo + 1).min(in_len - 1);
            let frac = if hi == lo { 0.0 } else { (src - lo as f64) as f32 };
            Tap { lo, hi, frac }
        })
        .collect()
}

// exact when a == b, so flat regions stay flat
#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Resample `plane` (rows × cols) to exactly `out_h × out_w`.
pub fn resize_bilinear(
    plane: ArrayView2<'_, f32>,
    out_h: usize,
    out_w: usize,
    align: CornerAlignment,
) -> Array2<f32> {
    let (in_h, in_w) = plane.dim();
    if in_h == 0 || in_w == 0 {
        return Array2::zeros((out_h, out_w));
    }
    if (in_h, in_w) == (out_h, out_w) {
        return plane.to_owned();
    }

    let rows = axis_taps(in_h, out_h, align);
    let cols = axis_taps(in_w, out_w, align);

    Array2::from_shape_fn((out_h, out_w), |(y, x)| {
        let r = rows[y];
        let c = cols[x];
        let top = lerp(plane[[r.lo, c.lo]], plane[[r.lo, c.hi]], c.frac);
        let bottom = lerp(plane[[r.hi, c.lo]], plane[[r.hi, c.hi]], c.frac);
        lerp(top, bottom, r.frac)
    })
}
