//! Core crate for the tilesr tiling engine.

pub mod alpha;
pub mod backend;
pub mod compose;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod geometry;
pub mod image;
pub mod progress;
pub mod tta;

pub use backend::{InferenceBackend, InferenceSession, OrtSession, SessionConfig};
pub use config::UpscaleConfig;
pub use engine::Upscaler;
pub use error::Error;
pub use image::{ChannelOrder, PixelImage};
