//! Eight-way test-time augmentation.
//!
//! The eight transforms are the dihedral group of the square: identity,
//! two mirrors, a 180° rotation, and the same four applied after a
//! transpose. Running every variant through the network and averaging the
//! inverse-transformed outputs cancels most of the model's orientation
//! bias, at 8x inference cost.

use ndarray::Array3;

use crate::backend::InferenceSession;
use crate::compose::expect_output_dims;
use crate::error::Result;

/// One element of the dihedral group, expressed as a pure coordinate map.
///
/// The same map serves generation (source tile → variant tile) and merge
/// (canonical output coordinates → variant output coordinates); there is no
/// separate inverse table to keep in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtaTransform {
    Identity,
    FlipV,
    FlipH,
    Rot180,
    Transpose,
    TransposeFlipV,
    TransposeFlipH,
    TransposeRot180,
}

pub const TRANSFORMS: [TtaTransform; 8] = [
    TtaTransform::Identity,
    TtaTransform::FlipV,
    TtaTransform::FlipH,
    TtaTransform::Rot180,
    TtaTransform::Transpose,
    TtaTransform::TransposeFlipV,
    TtaTransform::TransposeFlipH,
    TtaTransform::TransposeRot180,
];

impl TtaTransform {
    /// Whether the transformed tile has its width and height swapped.
    pub fn transposes(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::TransposeFlipV | Self::TransposeFlipH | Self::TransposeRot180
        )
    }

    /// Dimensions of the transformed tile for an `h` x `w` source.
    pub fn dims(self, h: usize, w: usize) -> (usize, usize) {
        if self.transposes() {
            (w, h)
        } else {
            (h, w)
        }
    }

    /// Map `(y, x)` in an `h` x `w` tile to the corresponding position in
    /// the transformed tile.
    pub fn map(self, y: usize, x: usize, h: usize, w: usize) -> (usize, usize) {
        match self {
            Self::Identity => (y, x),
            Self::FlipV => (h - 1 - y, x),
            Self::FlipH => (y, w - 1 - x),
            Self::Rot180 => (h - 1 - y, w - 1 - x),
            Self::Transpose => (x, y),
            Self::TransposeFlipV => (w - 1 - x, y),
            Self::TransposeFlipH => (x, h - 1 - y),
            Self::TransposeRot180 => (w - 1 - x, h - 1 - y),
        }
    }

    /// Produce the transformed copy of a planar CHW tile.
    pub fn apply(self, tile: &Array3<f32>) -> Array3<f32> {
        let (c, h, w) = tile.dim();
        let (th, tw) = self.dims(h, w);
        let mut out = Array3::<f32>::zeros((c, th, tw));
        for ch in 0..c {
            for y in 0..h {
                for x in 0..w {
                    let (ty, tx) = self.map(y, x, h, w);
                    out[(ch, ty, tx)] = tile[(ch, y, x)];
                }
            }
        }
        out
    }
}

/// Run all eight variants of `tile` through the session and average the
/// aligned outputs. Returns the canonical-orientation output tile, the same
/// shape single-pass inference would produce.
///
/// Any variant failing fails the whole tile — no partial merge.
pub fn infer_averaged<S: InferenceSession + ?Sized>(
    session: &mut S,
    tile: &Array3<f32>,
    scale: u32,
) -> Result<Array3<f32>> {
    let (c, h, w) = tile.dim();
    let s = scale as usize;
    let (out_h, out_w) = (h * s, w * s);

    let mut sum = Array3::<f32>::zeros((c, out_h, out_w));

    for transform in TRANSFORMS {
        let variant = transform.apply(tile);
        let (vh, vw) = transform.dims(h, w);
        let output = session.infer(&variant)?;
        expect_output_dims(vh, vw, scale, output.dim())?;

        // Accumulate through the forward map on scaled coordinates: the
        // canonical pixel (y, x) lives at map(y, x) in this variant.
        for ch in 0..c {
            for y in 0..out_h {
                for x in 0..out_w {
                    let (ty, tx) = transform.map(y, x, out_h, out_w);
                    sum[(ch, y, x)] += output[(ch, ty, tx)];
                }
            }
        }
    }

    sum.mapv_inplace(|v| v / 8.0);
    Ok(sum)
}
