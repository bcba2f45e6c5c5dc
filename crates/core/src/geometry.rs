//! Tile grid planning: how an image splits into overlapping tiles.
//!
//! Input crops overlap by the prepadding amount; output placement rects are
//! pairwise disjoint and cover the upscaled image exactly. The re-planning
//! thresholds near image boundaries are tuned heuristics — downstream pixel
//! output depends on matching them exactly, so resist "cleaning them up".

use tracing::debug;

use crate::config::UpscaleConfig;
use crate::error::Result;

/// Per-axis grid parameters after re-planning.
///
/// `edge` is the valid (non-padding) span each tile contributes, at source
/// scale. For a single-tile axis on a small image `edge` can be negative;
/// the descriptor arithmetic clamps crops to the image, so every derived
/// rect stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisPlan {
    pub tiles: i64,
    pub edge: i64,
    pub prepadding: i64,
}

/// Plan one axis. `dim` is the source extent, `tile_size` the network edge,
/// `prepadding` the requested context border.
pub fn plan_axis(dim: u32, tile_size: u32, prepadding: u32) -> AxisPlan {
    let dim = dim as i64;
    let t = tile_size as i64;
    let requested = prepadding as i64;

    let mut edge = t - 2 * requested;
    let mut tiles = (dim + edge - 1) / edge;
    let mut pad = requested;

    let remainder = dim % edge;
    if remainder > 0 {
        if remainder < requested {
            // The second-to-last tile's own padding already contains the
            // inference result for the remainder.
            if tiles > 1 {
                tiles -= 1;
            }
        } else {
            if remainder / 2 <= requested && tiles > 1 {
                tiles -= 1;
            }
            // tiles * (tile_size - 2 * pad) + pad == dim
            pad = (tiles * t - dim) / (2 * tiles - 1);
            edge = t - 2 * pad;
        }
    }

    AxisPlan {
        tiles,
        edge,
        prepadding: pad,
    }
}

/// Complete grid plan for one image. Owns the geometry for the duration of
/// one `process` call; tile descriptors are derived on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub scale: u32,
    pub x: AxisPlan,
    pub y: AxisPlan,
}

impl TileGrid {
    /// Validates the configuration, then computes both axis plans.
    pub fn plan(width: u32, height: u32, config: &UpscaleConfig) -> Result<Self> {
        config.validate()?;

        let x = plan_axis(width, config.tile_size, config.prepadding);
        let y = plan_axis(height, config.tile_size, config.prepadding);

        debug!(
            xtiles = x.tiles,
            ytiles = y.tiles,
            tile_size = config.tile_size,
            edge_x = x.edge,
            edge_y = y.edge,
            requested_prepadding = config.prepadding,
            prepadding_x = x.prepadding,
            prepadding_y = y.prepadding,
            "planned tile grid"
        );

        Ok(Self {
            width,
            height,
            tile_size: config.tile_size,
            scale: config.scale,
            x,
            y,
        })
    }

    pub fn tile_count(&self) -> u64 {
        (self.x.tiles * self.y.tiles) as u64
    }

    /// Descriptor for the tile at grid position (`xi`, `yi`).
    pub fn descriptor(&self, xi: i64, yi: i64) -> TileDescriptor {
        debug_assert!(xi < self.x.tiles && yi < self.y.tiles);

        let t = self.tile_size as i64;
        let s = self.scale as i64;
        let w = self.width as i64;
        let h = self.height as i64;

        let in_x0 = (xi * self.x.edge - self.x.prepadding).max(0);
        let in_x1 = ((xi + 1) * self.x.edge + self.x.prepadding).min(w);
        let in_y0 = (yi * self.y.edge - self.y.prepadding).max(0);
        let in_y1 = ((yi + 1) * self.y.edge + self.y.prepadding).min(h);

        // Synthetic fill reaches the full tile size: top/left only on the
        // first tile of an axis, the rest goes bottom/right.
        let pad_top = if yi == 0 { self.y.prepadding } else { 0 };
        let pad_bottom = t - (in_y1 - in_y0) - pad_top;
        let pad_left = if xi == 0 { self.x.prepadding } else { 0 };
        let pad_right = t - (in_x1 - in_x0) - pad_left;

        let out_x0 = xi * self.x.edge * s;
        let out_y0 = yi * self.y.edge * s;
        let out_w = if xi + 1 == self.x.tiles {
            w * s - out_x0
        } else {
            self.x.edge * s
        };
        let out_h = if yi + 1 == self.y.tiles {
            h * s - out_y0
        } else {
            self.y.edge * s
        };

        TileDescriptor {
            xi,
            yi,
            in_x0,
            in_y0,
            in_x1,
            in_y1,
            pad_top,
            pad_bottom,
            pad_left,
            pad_right,
            out_x0,
            out_y0,
            out_w,
            out_h,
        }
    }

    /// Row-major iteration (y outer, x inner), the order progress is
    /// reported in.
    pub fn tiles(&self) -> impl Iterator<Item = TileDescriptor> + '_ {
        let xtiles = self.x.tiles;
        let ytiles = self.y.tiles;
        (0..ytiles).flat_map(move |yi| (0..xtiles).map(move |xi| self.descriptor(xi, yi)))
    }
}

/// Everything needed to extract, infer, and composite one tile. Created
/// fresh per tile, no identity beyond the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileDescriptor {
    pub xi: i64,
    pub yi: i64,
    /// Clamped input crop, source coordinates.
    pub in_x0: i64,
    pub in_y0: i64,
    pub in_x1: i64,
    pub in_y1: i64,
    /// Synthetic border fill per side, source scale.
    pub pad_top: i64,
    pub pad_bottom: i64,
    pub pad_left: i64,
    pub pad_right: i64,
    /// Destination placement rect, output (scaled) coordinates.
    pub out_x0: i64,
    pub out_y0: i64,
    pub out_w: i64,
    pub out_h: i64,
}

impl TileDescriptor {
    pub fn crop_width(&self) -> i64 {
        self.in_x1 - self.in_x0
    }

    pub fn crop_height(&self) -> i64 {
        self.in_y1 - self.in_y0
    }
}
