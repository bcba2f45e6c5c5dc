//! Alpha-plane resampling.
//!
//! The network is trained on RGB only, so the alpha channel bypasses
//! inference entirely and is upscaled with plain bicubic interpolation at
//! the model's scale factor. Transparency edges survive well enough at
//! negligible cost.

use ndarray::Array2;

use crate::image::PixelImage;

/// OpenCV-compatible cubic convolution coefficient.
const CUBIC_A: f32 = -0.75;

fn cubic_weight(d: f32) -> f32 {
    let d = d.abs();
    if d <= 1.0 {
        ((CUBIC_A + 2.0) * d - (CUBIC_A + 3.0)) * d * d + 1.0
    } else if d < 2.0 {
        (((d - 5.0) * d + 8.0) * d - 4.0) * CUBIC_A
    } else {
        0.0
    }
}

/// Pull the alpha channel out of an RGBA image as a normalized plane.
/// Returns `None` for RGB images.
pub fn alpha_plane(image: &PixelImage) -> Option<Array2<f32>> {
    if image.channels() != 4 {
        return None;
    }
    let w = image.width() as usize;
    let h = image.height() as usize;
    let data = image.data();
    let mut plane = Array2::<f32>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            plane[(y, x)] = data[(y * w + x) * 4 + 3] as f32 / 255.0;
        }
    }
    Some(plane)
}

/// Bicubic upscale by an integer factor. `scale == 1` returns the plane
/// unchanged.
pub fn upscale_plane(plane: &Array2<f32>, scale: u32) -> Array2<f32> {
    if scale == 1 {
        return plane.clone();
    }

    let (src_h, src_w) = plane.dim();
    let dst_h = src_h * scale as usize;
    let dst_w = src_w * scale as usize;
    let inv = 1.0 / scale as f32;

    let mut dst = Array2::<f32>::zeros((dst_h, dst_w));

    // Per-axis taps and weights repeat with period `scale`; precomputing
    // per destination column keeps the inner loop cheap enough.
    let mut col_taps = Vec::with_capacity(dst_w);
    for dx in 0..dst_w {
        let sx = (dx as f32 + 0.5) * inv - 0.5;
        let x0 = sx.floor() as i64;
        let fx = sx - x0 as f32;
        let weights = [
            cubic_weight(1.0 + fx),
            cubic_weight(fx),
            cubic_weight(1.0 - fx),
            cubic_weight(2.0 - fx),
        ];
        let taps = [
            (x0 - 1).clamp(0, src_w as i64 - 1) as usize,
            x0.clamp(0, src_w as i64 - 1) as usize,
            (x0 + 1).clamp(0, src_w as i64 - 1) as usize,
            (x0 + 2).clamp(0, src_w as i64 - 1) as usize,
        ];
        col_taps.push((taps, weights));
    }

    for dy in 0..dst_h {
        let sy = (dy as f32 + 0.5) * inv - 0.5;
        let y0 = sy.floor() as i64;
        let fy = sy - y0 as f32;
        let row_weights = [
            cubic_weight(1.0 + fy),
            cubic_weight(fy),
            cubic_weight(1.0 - fy),
            cubic_weight(2.0 - fy),
        ];
        let row_taps = [
            (y0 - 1).clamp(0, src_h as i64 - 1) as usize,
            y0.clamp(0, src_h as i64 - 1) as usize,
            (y0 + 1).clamp(0, src_h as i64 - 1) as usize,
            (y0 + 2).clamp(0, src_h as i64 - 1) as usize,
        ];

        for (dx, (taps, weights)) in col_taps.iter().enumerate() {
            let mut acc = 0.0f32;
            for (ty, wy) in row_taps.iter().zip(row_weights) {
                let mut row_acc = 0.0f32;
                for (tx, wx) in taps.iter().zip(weights) {
                    row_acc += plane[(*ty, *tx)] * wx;
                }
                acc += row_acc * wy;
            }
            dst[(dy, dx)] = acc;
        }
    }

    dst
}
