//! Inference backend selection and the `ort` session adapter.
//!
//! The tiling engine only ever sees the [`InferenceSession`] contract:
//! given one prepared square tile, produce the upscaled tile. Everything
//! ort-specific — execution providers, tensor names, the compiled-kernel
//! cache — stays behind [`OrtSession`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::{Array3, Array4, Axis};
use ort::{
    execution_providers::{CUDAExecutionProvider, ExecutionProvider, TensorRTExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Inference backend selection.
///
/// `Tensorrt` requires the TensorRT runtime libraries; if unavailable, the
/// session falls back to the CUDA EP automatically. `Cpu` registers no
/// execution provider at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceBackend {
    #[default]
    Cuda,
    Tensorrt,
    Cpu,
}

impl InferenceBackend {
    /// Parse from string (case-insensitive). Returns `Cuda` for unknown
    /// values.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "tensorrt" | "trt" => Self::Tensorrt,
            "cpu" => Self::Cpu,
            _ => Self::Cuda,
        }
    }
}

impl std::fmt::Display for InferenceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cuda => write!(f, "cuda"),
            Self::Tensorrt => write!(f, "tensorrt"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

pub struct SessionConfig<'a> {
    pub model_path: &'a Path,
    pub backend: InferenceBackend,
    pub cache_model: bool,
    pub input_name: Option<&'a str>,
    pub output_name: Option<&'a str>,
}

/// The per-tile inference contract, plus the per-image resource scope.
///
/// `begin_image`/`end_image` bracket one `process` call: device-side
/// resources acquired in `begin_image` must be released by `end_image`,
/// which the engine invokes on every exit path, success or not.
pub trait InferenceSession {
    fn infer(&mut self, tile: &Array3<f32>) -> Result<Array3<f32>>;

    fn begin_image(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_image(&mut self, success: bool) {
        let _ = success;
    }
}

/// Compiled-kernel cache location: the model file path with a `.cache`
/// suffix appended.
pub fn model_cache_dir(model_path: &Path) -> PathBuf {
    let mut os = model_path.as_os_str().to_owned();
    os.push(".cache");
    PathBuf::from(os)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct CacheStats {
    file_count: u64,
    total_bytes: u64,
}

fn cache_stats(root: &Path) -> CacheStats {
    if !root.exists() {
        return CacheStats::default();
    }

    let mut stats = CacheStats::default();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }

            if let Ok(meta) = entry.metadata() {
                if meta.is_file() {
                    stats.file_count += 1;
                    stats.total_bytes += meta.len();
                }
            }
        }
    }

    stats
}

/// Build an `ort::Session` with the requested backend.
///
/// For `Tensorrt`: registers the TRT EP (with engine caching when
/// `cache_model` is set) and the CUDA EP as fallback. For `Cuda`: CUDA EP
/// only, with a warning when the device is unavailable. For `Cpu`: no
/// providers — ort's builtin CPU path.
pub fn build_session(config: &SessionConfig<'_>) -> Result<Session> {
    let builder = Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    let commit_err = |e: ort::Error| {
        Error::Backend(format!(
            "failed to load model {}: {e}",
            config.model_path.display()
        ))
    };

    let session = match config.backend {
        InferenceBackend::Tensorrt => {
            let mut trt = TensorRTExecutionProvider::default()
                .with_fp16(true)
                .with_device_id(0);
            if config.cache_model {
                let cache_dir = model_cache_dir(config.model_path);
                if let Err(e) = std::fs::create_dir_all(&cache_dir) {
                    warn!(
                        dir = %cache_dir.display(),
                        error = %e,
                        "failed to create model cache directory"
                    );
                }
                trt = trt
                    .with_engine_cache(true)
                    .with_engine_cache_path(cache_dir.to_string_lossy());
            }

            debug!(backend = "tensorrt", "building session with TensorRT EP (CUDA EP fallback)");
            builder
                .with_execution_providers([trt.build(), CUDAExecutionProvider::default().build()])?
                .commit_from_file(config.model_path)
                .map_err(commit_err)?
        }
        InferenceBackend::Cuda => {
            let cuda = CUDAExecutionProvider::default();
            if !cuda.is_available().unwrap_or(false) {
                warn!("CUDA EP is not available — inference will fall back to CPU");
            }

            debug!(backend = "cuda", "building session with CUDA EP");
            builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .build()
                    .error_on_failure()])?
                .commit_from_file(config.model_path)
                .map_err(commit_err)?
        }
        InferenceBackend::Cpu => {
            debug!(backend = "cpu", "building session without execution providers");
            builder
                .commit_from_file(config.model_path)
                .map_err(commit_err)?
        }
    };

    Ok(session)
}

/// Resolve a configured tensor name against the model's declared names.
/// Falls back to the first declared name with a logged substitution.
fn resolve_tensor_name(configured: Option<&str>, declared: &[String], kind: &str) -> Result<String> {
    let first = declared
        .first()
        .ok_or_else(|| Error::Backend(format!("model declares no {kind} tensors")))?;

    match configured {
        Some(name) if declared.iter().any(|d| d == name) => Ok(name.to_string()),
        Some(name) => {
            warn!(
                configured = name,
                substituted = %first,
                "configured {kind} tensor name not found in model; using first declared"
            );
            Ok(first.clone())
        }
        None => Ok(first.clone()),
    }
}

/// Owned `ort` session satisfying the tile inference contract. Created once
/// per processing context and torn down with it.
#[derive(Debug)]
pub struct OrtSession {
    session: Session,
    input_name: String,
    output_name: String,
    cache_dir: Option<PathBuf>,
    cache_before: Option<CacheStats>,
}

impl OrtSession {
    pub fn load(config: &SessionConfig<'_>) -> Result<Self> {
        if !config.model_path.exists() {
            return Err(Error::ModelIo {
                path: config.model_path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "model file not found"),
            });
        }

        let started = Instant::now();
        let session = build_session(config)?;

        let declared_inputs: Vec<String> =
            session.inputs().iter().map(|i| i.name().to_string()).collect();
        let declared_outputs: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        let input_name = resolve_tensor_name(config.input_name, &declared_inputs, "input")?;
        let output_name = resolve_tensor_name(config.output_name, &declared_outputs, "output")?;

        debug!(
            model = %config.model_path.display(),
            backend = %config.backend,
            %input_name,
            %output_name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model loaded"
        );

        let cache_dir = (config.cache_model && config.backend == InferenceBackend::Tensorrt)
            .then(|| model_cache_dir(config.model_path));
        if config.cache_model && cache_dir.is_none() {
            debug!(
                backend = %config.backend,
                "model caching requested but this backend has no persistent kernel cache"
            );
        }

        Ok(Self {
            session,
            input_name,
            output_name,
            cache_dir,
            cache_before: None,
        })
    }
}

impl InferenceSession for OrtSession {
    fn infer(&mut self, tile: &Array3<f32>) -> Result<Array3<f32>> {
        let input: Array4<f32> = tile.clone().insert_axis(Axis(0));
        let input_tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => &input_tensor])?;
        let output_view = outputs[self.output_name.as_str()].try_extract_array::<f32>()?;

        let shape = output_view.shape().to_vec();
        if shape.len() != 4 || shape[0] != 1 {
            return Err(Error::Backend(format!(
                "unexpected output tensor shape {shape:?} (expected [1, C, H, W])"
            )));
        }

        output_view
            .to_owned()
            .remove_axis(Axis(0))
            .into_dimensionality::<ndarray::Ix3>()
            .map_err(|e| Error::Backend(format!("output tensor reshape failed: {e}")))
    }

    fn begin_image(&mut self) -> Result<()> {
        if let Some(dir) = &self.cache_dir {
            self.cache_before = Some(cache_stats(dir));
        }
        debug!("device scope acquired for image");
        Ok(())
    }

    fn end_image(&mut self, success: bool) {
        if success {
            if let (Some(dir), Some(before)) = (&self.cache_dir, self.cache_before.take()) {
                let after = cache_stats(dir);
                if after != before {
                    info!(
                        cache_dir = %dir.display(),
                        cache_files = after.file_count,
                        cache_bytes = after.total_bytes,
                        "model cache updated"
                    );
                }
            }
        }
        debug!(success, "device scope released");
    }
}
