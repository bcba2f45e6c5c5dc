//! Compositing inferred tiles into the destination image.
//!
//! Strips the scaled prepadding off each output tile and writes the valid
//! region into its disjoint destination rect, converting planar float back
//! to interleaved bytes (and channel order where requested).

use ndarray::{Array2, Array3};

use crate::error::{Error, Result};
use crate::geometry::{TileDescriptor, TileGrid};
use crate::image::{ChannelOrder, PixelImage};

/// Verify an inference output against the declared scale factor. This is
/// the guard that catches a model/scale mismatch; it must run before any
/// byte reaches a destination buffer.
pub fn expect_output_dims(
    in_h: usize,
    in_w: usize,
    scale: u32,
    observed: (usize, usize, usize),
) -> Result<()> {
    let (channels, out_h, out_w) = observed;
    let expected_h = in_h * scale as usize;
    let expected_w = in_w * scale as usize;
    if channels != 3 || out_h != expected_h || out_w != expected_w {
        return Err(Error::TileSizeMismatch {
            expected: in_w.max(in_h) * scale as usize,
            observed_w: out_w,
            observed_h: out_h,
            input_w: in_w,
            input_h: in_h,
            scale,
        });
    }
    Ok(())
}

fn scaled_sample_to_byte(v: f32) -> u8 {
    (v * 255.0 + 0.5).clamp(0.0, 255.0) as u8
}

/// Write one canonical output tile into its destination rect.
///
/// `tile` is the full `tile_size * scale` square straight from inference
/// (or the TTA merge); the valid region starts `prepadding * scale` in from
/// the top-left and has exactly the descriptor's output dimensions.
pub fn write_tile(
    out: &mut PixelImage,
    tile: &Array3<f32>,
    desc: &TileDescriptor,
    grid: &TileGrid,
    order: ChannelOrder,
) -> Result<()> {
    let t = grid.tile_size as usize;
    expect_output_dims(t, t, grid.scale, tile.dim())?;

    let s = grid.scale as i64;
    let crop_x0 = (grid.x.prepadding * s) as usize;
    let crop_y0 = (grid.y.prepadding * s) as usize;

    let out_w = out.width() as usize;
    let channels = out.channels() as usize;
    let data = out.data_mut();

    for y in 0..desc.out_h as usize {
        let dst_row = (desc.out_y0 as usize + y) * out_w;
        for x in 0..desc.out_w as usize {
            let dst = (dst_row + desc.out_x0 as usize + x) * channels;
            for c in 0..3 {
                data[dst + order.byte_index(c)] =
                    scaled_sample_to_byte(tile[(c, crop_y0 + y, crop_x0 + x)]);
            }
        }
    }

    Ok(())
}

/// Interleave the resampled alpha plane into channel 3 of the destination.
/// The plane must already match the output dimensions exactly.
pub fn write_alpha(out: &mut PixelImage, alpha: &Array2<f32>) -> Result<()> {
    if out.channels() != 4 {
        return Err(Error::InvalidConfiguration(
            "alpha plane supplied for a 3-channel destination".to_string(),
        ));
    }
    let (h, w) = alpha.dim();
    if w != out.width() as usize || h != out.height() as usize {
        return Err(Error::TileSizeMismatch {
            expected: out.width() as usize,
            observed_w: w,
            observed_h: h,
            input_w: out.width() as usize,
            input_h: out.height() as usize,
            scale: 1,
        });
    }

    let data = out.data_mut();
    for y in 0..h {
        for x in 0..w {
            data[(y * w + x) * 4 + 3] = scaled_sample_to_byte(alpha[(y, x)]);
        }
    }
    Ok(())
}
