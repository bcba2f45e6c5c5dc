use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tilesr_core::backend::{InferenceBackend, OrtSession, SessionConfig};
use tilesr_core::{PixelImage, UpscaleConfig, Upscaler};

#[derive(Parser)]
#[command(name = "tilesr", about = "Tiled super-resolution image upscaler")]
struct Cli {
    #[arg(
        short = 'i',
        long = "input",
        required = true,
        help = "Input image path (repeatable)"
    )]
    inputs: Vec<PathBuf>,

    #[arg(
        short = 'o',
        long = "output",
        required = true,
        help = "Output image path, one per input"
    )]
    outputs: Vec<PathBuf>,

    #[arg(short = 'm', long, help = "ONNX model path")]
    model: PathBuf,

    #[arg(short = 's', long, default_value_t = 4, help = "Model scale factor (1-4)")]
    scale: u32,

    #[arg(
        short = 't',
        long = "tile-size",
        default_value_t = 200,
        help = "Network input tile edge length"
    )]
    tile_size: u32,

    #[arg(
        long,
        default_value_t = 10,
        help = "Context border consumed per tile side"
    )]
    prepadding: u32,

    #[arg(short = 'x', long, help = "8-way test-time augmentation (8x slower)")]
    tta: bool,

    #[arg(
        short = 'g',
        long,
        default_value = "cuda",
        help = "Inference backend: cuda, tensorrt or cpu"
    )]
    backend: String,

    #[arg(long, help = "Persist the backend kernel cache next to the model")]
    cache_model: bool,

    #[arg(long = "input-name", help = "Model input tensor name override")]
    input_name: Option<String>,

    #[arg(long = "output-name", help = "Model output tensor name override")]
    output_name: Option<String>,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help = "Increase log verbosity (-v: debug, -vv: trace)"
    )]
    verbose: u8,
}

impl Cli {
    fn upscale_config(&self) -> UpscaleConfig {
        UpscaleConfig {
            tile_size: self.tile_size,
            prepadding: self.prepadding,
            scale: self.scale,
            tta: self.tta,
            backend: InferenceBackend::from_str_lossy(&self.backend),
            cache_model: self.cache_model,
            input_name: self.input_name.clone(),
            output_name: self.output_name.clone(),
        }
    }
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.inputs.len() != cli.outputs.len() {
        bail!(
            "got {} inputs but {} outputs; pass one -o per -i",
            cli.inputs.len(),
            cli.outputs.len()
        );
    }

    let config = cli.upscale_config();
    config.validate()?;

    let session = OrtSession::load(&SessionConfig {
        model_path: &cli.model,
        backend: config.backend,
        cache_model: config.cache_model,
        input_name: config.input_name.as_deref(),
        output_name: config.output_name.as_deref(),
    })?;
    let mut upscaler = Upscaler::new(session, config)?;

    for (input, output) in cli.inputs.iter().zip(&cli.outputs) {
        let started = Instant::now();
        let image = load_image(input)?;
        info!(
            input = %input.display(),
            width = image.width(),
            height = image.height(),
            channels = image.channels(),
            "upscaling image"
        );

        let upscaled = upscaler
            .process(&image)
            .with_context(|| format!("failed to upscale {}", input.display()))?;
        save_image(&upscaled, output)?;

        info!(
            output = %output.display(),
            width = upscaled.width(),
            height = upscaled.height(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "image written"
        );
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_image(path: &Path) -> Result<PixelImage> {
    let decoded =
        image::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let pixel_image = if decoded.color().has_alpha() {
        let rgba = decoded.to_rgba8();
        let (w, h) = rgba.dimensions();
        PixelImage::new(rgba.into_raw(), w, h, 4)?
    } else {
        let rgb = decoded.to_rgb8();
        let (w, h) = rgb.dimensions();
        PixelImage::new(rgb.into_raw(), w, h, 3)?
    };
    Ok(pixel_image)
}

fn save_image(img: &PixelImage, path: &Path) -> Result<()> {
    let (w, h) = (img.width(), img.height());
    match img.channels() {
        3 => image::RgbImage::from_raw(w, h, img.data().to_vec())
            .context("output buffer size mismatch")?
            .save(path)
            .with_context(|| format!("failed to write {}", path.display())),
        4 => image::RgbaImage::from_raw(w, h, img.data().to_vec())
            .context("output buffer size mismatch")?
            .save(path)
            .with_context(|| format!("failed to write {}", path.display())),
        other => bail!("unsupported channel count {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_minimal_invocation() {
        let cli = Cli::try_parse_from([
            "tilesr", "-i", "in.png", "-o", "out.png", "-m", "model.onnx",
        ])
        .unwrap();
        assert_eq!(cli.inputs, vec![PathBuf::from("in.png")]);
        assert_eq!(cli.outputs, vec![PathBuf::from("out.png")]);
        assert_eq!(cli.scale, 4);
        assert_eq!(cli.tile_size, 200);
        assert_eq!(cli.prepadding, 10);
        assert!(!cli.tta);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_requires_model() {
        assert!(Cli::try_parse_from(["tilesr", "-i", "in.png", "-o", "out.png"]).is_err());
    }

    #[test]
    fn test_cli_repeatable_inputs_and_flags() {
        let cli = Cli::try_parse_from([
            "tilesr", "-i", "a.png", "-i", "b.png", "-o", "a2.png", "-o", "b2.png", "-m",
            "m.onnx", "-s", "2", "-x", "-g", "cpu", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.inputs.len(), 2);
        assert_eq!(cli.outputs.len(), 2);
        assert!(cli.tta);
        assert_eq!(cli.verbose, 2);

        let config = cli.upscale_config();
        assert_eq!(config.scale, 2);
        assert_eq!(config.backend, InferenceBackend::Cpu);
        config.validate().unwrap();
    }

    #[test]
    fn test_cli_rejects_unknown_backend_gracefully() {
        let cli = Cli::try_parse_from([
            "tilesr", "-i", "in.png", "-o", "out.png", "-m", "m.onnx", "-g", "metal",
        ])
        .unwrap();
        // Unknown backends fall back to CUDA rather than failing parse.
        assert_eq!(cli.upscale_config().backend, InferenceBackend::Cuda);
    }
}
