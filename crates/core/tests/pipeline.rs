//! End-to-end engine tests with scripted inference sessions.
//!
//! A pixel-replication session stands in for the network: it upscales by
//! integer replication, is exactly orientation-equivariant, and has no
//! receptive field, which makes whole-pipeline results predictable to the
//! bit.

use ndarray::Array3;
use tilesr_core::engine::Upscaler;
use tilesr_core::error::{Error, Result};
use tilesr_core::geometry::TileGrid;
use tilesr_core::image::PixelImage;
use tilesr_core::{InferenceSession, UpscaleConfig};

struct ReplicateSession {
    scale: u32,
    calls: u32,
    images_begun: u32,
    last_end_success: Option<bool>,
}

impl ReplicateSession {
    fn new(scale: u32) -> Self {
        Self {
            scale,
            calls: 0,
            images_begun: 0,
            last_end_success: None,
        }
    }
}

impl InferenceSession for ReplicateSession {
    fn infer(&mut self, tile: &Array3<f32>) -> Result<Array3<f32>> {
        self.calls += 1;
        let (c, h, w) = tile.dim();
        let s = self.scale as usize;
        Ok(Array3::from_shape_fn((c, h * s, w * s), |(ch, y, x)| {
            tile[(ch, y / s, x / s)]
        }))
    }

    fn begin_image(&mut self) -> Result<()> {
        self.images_begun += 1;
        Ok(())
    }

    fn end_image(&mut self, success: bool) {
        self.last_end_success = Some(success);
    }
}

/// Fails every call after the first `succeed_for` tiles.
struct FlakySession {
    inner: ReplicateSession,
    succeed_for: u32,
}

impl InferenceSession for FlakySession {
    fn infer(&mut self, tile: &Array3<f32>) -> Result<Array3<f32>> {
        if self.inner.calls >= self.succeed_for {
            self.inner.calls += 1;
            return Err(Error::Backend("session expired".to_string()));
        }
        self.inner.infer(tile)
    }

    fn end_image(&mut self, success: bool) {
        self.inner.end_image(success);
    }
}

fn config(tile_size: u32, prepadding: u32, scale: u32) -> UpscaleConfig {
    UpscaleConfig {
        tile_size,
        prepadding,
        scale,
        ..Default::default()
    }
}

fn gradient_image(w: u32, h: u32, channels: u8) -> PixelImage {
    let mut data = Vec::with_capacity((w * h * channels as u32) as usize);
    for y in 0..h {
        for x in 0..w {
            for c in 0..channels {
                data.push((x.wrapping_mul(7) ^ y.wrapping_mul(13) ^ (c as u32 * 29)) as u8);
            }
        }
    }
    PixelImage::new(data, w, h, channels).unwrap()
}

#[test]
fn exact_division_keeps_requested_prepadding() {
    // 96 and 72 both divide by tile_size - 2*prepadding = 24.
    let grid = TileGrid::plan(96, 72, &config(32, 4, 2)).unwrap();
    assert_eq!(grid.x.prepadding, 4);
    assert_eq!(grid.y.prepadding, 4);
    assert_eq!(grid.x.tiles, 4);
    assert_eq!(grid.y.tiles, 3);
}

#[test]
fn full_pipeline_matches_replication_upscale() {
    // With a replication backend the whole pipeline degenerates to
    // nearest-neighbor upscaling; every output pixel is predictable.
    for (w, h) in [(96u32, 96u32), (100, 100), (97, 53), (10, 10)] {
        let image = gradient_image(w, h, 3);
        let mut upscaler = Upscaler::new(ReplicateSession::new(2), config(32, 4, 2)).unwrap();
        let out = upscaler.process(&image).unwrap();

        assert_eq!(out.width(), w * 2);
        assert_eq!(out.height(), h * 2);
        for y in 0..h * 2 {
            for x in 0..w * 2 {
                for c in 0..3u8 {
                    assert_eq!(
                        out.sample(x, y, c),
                        image.sample(x / 2, y / 2, c),
                        "{w}x{h} at ({x},{y},{c})"
                    );
                }
            }
        }
    }
}

#[test]
fn tta_equals_single_pass_for_orientation_free_backend() {
    let image = gradient_image(100, 100, 3);

    let mut plain = Upscaler::new(ReplicateSession::new(2), config(32, 4, 2)).unwrap();
    let expected = plain.process(&image).unwrap();

    let mut tta_config = config(32, 4, 2);
    tta_config.tta = true;
    let mut augmented = Upscaler::new(ReplicateSession::new(2), tta_config).unwrap();
    let got = augmented.process(&image).unwrap();

    assert_eq!(got.data(), expected.data());
}

#[test]
fn tta_runs_eight_inferences_per_tile() {
    let image = gradient_image(48, 48, 3);
    let mut tta_config = config(32, 4, 2);
    tta_config.tta = true;
    let mut upscaler = Upscaler::new(ReplicateSession::new(2), tta_config).unwrap();
    upscaler.process(&image).unwrap();

    // 48/24 = 2 tiles per axis, 4 tiles, 8 variants each.
    assert_eq!(upscaler.session().calls, 32);
}

#[test]
fn identity_backend_round_trips_interior() {
    let image = gradient_image(64, 64, 3);
    let mut upscaler = Upscaler::new(ReplicateSession::new(1), config(32, 4, 1)).unwrap();
    let out = upscaler.process(&image).unwrap();

    assert_eq!(out.width(), 64);
    assert_eq!(out.height(), 64);
    // Interior beyond the prepadding band reconstructs exactly; the border
    // may legitimately depend on the padding policy with a real network.
    for y in 4..60u32 {
        for x in 4..60u32 {
            for c in 0..3u8 {
                assert_eq!(out.sample(x, y, c), image.sample(x, y, c));
            }
        }
    }
}

#[test]
fn alpha_plane_tracks_rgb_dimensions() {
    let image = gradient_image(40, 30, 4);
    let mut upscaler = Upscaler::new(ReplicateSession::new(3), config(32, 4, 3)).unwrap();
    let out = upscaler.process(&image).unwrap();

    assert_eq!(out.width(), 120);
    assert_eq!(out.height(), 90);
    assert_eq!(out.channels(), 4);
}

#[test]
fn constant_alpha_survives_resampling() {
    let mut data = Vec::new();
    for _ in 0..(40 * 30) {
        data.extend_from_slice(&[10, 20, 30, 200]);
    }
    let image = PixelImage::new(data, 40, 30, 4).unwrap();

    let mut upscaler = Upscaler::new(ReplicateSession::new(2), config(32, 4, 2)).unwrap();
    let out = upscaler.process(&image).unwrap();

    for y in 0..out.height() {
        for x in 0..out.width() {
            assert_eq!(out.sample(x, y, 3), 200, "alpha at ({x},{y})");
        }
    }
}

#[test]
fn scale_mismatch_aborts_before_second_tile() {
    // Session really upscales 2x; configuration declares 4x.
    let image = gradient_image(100, 100, 3);
    let mut upscaler = Upscaler::new(ReplicateSession::new(2), config(32, 4, 4)).unwrap();

    let err = upscaler.process(&image).unwrap_err();
    assert!(matches!(err, Error::TileSizeMismatch { .. }));
    let msg = err.to_string();
    assert!(msg.contains("64x64"), "{msg}");
    assert!(msg.contains("128x128"), "{msg}");
    // The mismatch is caught before compositing, on the very first tile.
    assert_eq!(upscaler.session().calls, 1);
}

#[test]
fn backend_failure_aborts_remaining_tiles() {
    let image = gradient_image(100, 100, 3);
    let session = FlakySession {
        inner: ReplicateSession::new(2),
        succeed_for: 3,
    };
    let mut upscaler = Upscaler::new(session, config(32, 4, 2)).unwrap();

    let err = upscaler.process(&image).unwrap_err();
    assert!(matches!(err, Error::Backend(_)));
    assert!(err.to_string().contains("session expired"));
}

#[test]
fn image_scope_released_on_success_and_failure() {
    let image = gradient_image(48, 48, 3);

    let mut ok = Upscaler::new(ReplicateSession::new(2), config(32, 4, 2)).unwrap();
    ok.process(&image).unwrap();
    assert_eq!(ok.session().images_begun, 1);
    assert_eq!(ok.session().last_end_success, Some(true));

    let failing = FlakySession {
        inner: ReplicateSession::new(2),
        succeed_for: 0,
    };
    let mut broken = Upscaler::new(failing, config(32, 4, 2)).unwrap();
    assert!(broken.process(&image).is_err());
    // The error path still left the per-image scope.
    assert_eq!(broken.session().inner.last_end_success, Some(false));
}
