//! Per-image orchestration: plan the grid, run the tiles, reassemble.

use tracing::debug;

use crate::alpha;
use crate::backend::InferenceSession;
use crate::compose;
use crate::config::UpscaleConfig;
use crate::error::Result;
use crate::extract::{extract_tile, PadMode};
use crate::geometry::TileGrid;
use crate::image::{ChannelOrder, PixelImage};
use crate::progress::ProgressReporter;
use crate::tta;

/// One processing context: an owned inference session plus the validated
/// run parameters. Grid geometry is recomputed per image; tile buffers
/// never outlive a single iteration.
#[derive(Debug)]
pub struct Upscaler<S: InferenceSession> {
    session: S,
    config: UpscaleConfig,
    pad_mode: PadMode,
    channel_order: ChannelOrder,
}

impl<S: InferenceSession> Upscaler<S> {
    pub fn new(session: S, config: UpscaleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            session,
            config,
            pad_mode: PadMode::default(),
            channel_order: ChannelOrder::default(),
        })
    }

    pub fn config(&self) -> &UpscaleConfig {
        &self.config
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    pub fn set_pad_mode(&mut self, mode: PadMode) {
        self.pad_mode = mode;
    }

    pub fn set_channel_order(&mut self, order: ChannelOrder) {
        self.channel_order = order;
    }

    /// Upscale one image. The session's per-image resource scope is entered
    /// before the first tile and left on every exit path, including errors.
    pub fn process(&mut self, image: &PixelImage) -> Result<PixelImage> {
        let grid = TileGrid::plan(image.width(), image.height(), &self.config)?;

        self.session.begin_image()?;
        let result = self.process_tiles(image, &grid);
        self.session.end_image(result.is_ok());
        result
    }

    fn process_tiles(&mut self, image: &PixelImage, grid: &TileGrid) -> Result<PixelImage> {
        let scale = self.config.scale;
        let mut out = PixelImage::zeroed(
            image.width() * scale,
            image.height() * scale,
            image.channels(),
        )?;

        // The network never sees the alpha plane; it is resampled on its
        // own and interleaved after the tile loop.
        let alpha = alpha::alpha_plane(image).map(|plane| alpha::upscale_plane(&plane, scale));

        let mut progress = ProgressReporter::new(grid.tile_count());
        for desc in grid.tiles() {
            let (tile, _pads) = extract_tile(image, &desc, grid.tile_size, self.pad_mode);

            let out_tile = if self.config.tta {
                tta::infer_averaged(&mut self.session, &tile, scale)?
            } else {
                self.session.infer(&tile)?
            };

            compose::write_tile(&mut out, &out_tile, &desc, grid, self.channel_order)?;
            progress.tile_done();
        }

        if let Some(alpha) = alpha {
            compose::write_alpha(&mut out, &alpha)?;
        }

        debug!(
            width = out.width(),
            height = out.height(),
            channels = out.channels(),
            tiles = grid.tile_count(),
            tta = self.config.tta,
            "image upscaled"
        );
        Ok(out)
    }
}
