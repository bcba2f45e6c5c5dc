//! Tile extraction: crop a source region and fill the synthetic border so
//! the buffer matches the network input shape exactly.

use ndarray::Array3;

use crate::geometry::TileDescriptor;
use crate::image::PixelImage;

/// How the synthetic border outside the image is filled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PadMode {
    /// Fill with a constant sample value (normalized, usually 0.0).
    Constant(f32),
    /// Replicate the nearest edge sample.
    Replicate,
}

impl Default for PadMode {
    fn default() -> Self {
        Self::Constant(0.0)
    }
}

/// Synthetic border added to one extracted tile, in source-scale pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PadAmounts {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

/// Crop the descriptor's input rect out of `image` and return an exactly
/// `tile_size` x `tile_size` planar RGB tile, samples normalized to [0,1].
/// The alpha channel, when present, is not part of the tile.
pub fn extract_tile(
    image: &PixelImage,
    desc: &TileDescriptor,
    tile_size: u32,
    mode: PadMode,
) -> (Array3<f32>, PadAmounts) {
    let t = tile_size as usize;
    let channels = image.channels() as usize;
    let width = image.width() as usize;

    let crop_w = desc.crop_width() as usize;
    let crop_h = desc.crop_height() as usize;
    let pads = PadAmounts {
        top: desc.pad_top as usize,
        bottom: desc.pad_bottom as usize,
        left: desc.pad_left as usize,
        right: desc.pad_right as usize,
    };

    let fill = match mode {
        PadMode::Constant(v) => v,
        PadMode::Replicate => 0.0,
    };
    let mut tile = Array3::<f32>::from_elem((3, t, t), fill);

    let data = image.data();
    for y in 0..crop_h {
        let src_row = (desc.in_y0 as usize + y) * width;
        for x in 0..crop_w {
            let src = (src_row + desc.in_x0 as usize + x) * channels;
            for c in 0..3 {
                tile[(c, pads.top + y, pads.left + x)] = data[src + c] as f32 / 255.0;
            }
        }
    }

    if matches!(mode, PadMode::Replicate) && pads != PadAmounts::default() {
        replicate_border(&mut tile, t, crop_h, crop_w, &pads);
    }

    (tile, pads)
}

/// Extend the interior region to the tile borders by clamping coordinates.
fn replicate_border(tile: &mut Array3<f32>, t: usize, crop_h: usize, crop_w: usize, pads: &PadAmounts) {
    let y_lo = pads.top;
    let y_hi = pads.top + crop_h - 1;
    let x_lo = pads.left;
    let x_hi = pads.left + crop_w - 1;

    for y in 0..t {
        let sy = y.clamp(y_lo, y_hi);
        for x in 0..t {
            let sx = x.clamp(x_lo, x_hi);
            if sy == y && sx == x {
                continue;
            }
            for c in 0..3 {
                tile[(c, y, x)] = tile[(c, sy, sx)];
            }
        }
    }
}
