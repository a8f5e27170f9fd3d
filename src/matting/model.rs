//! Segmentation model seam.
//!
//! `SegmentationModel` is what the pipeline runs; `ModelLoader` is what the
//! registry calls on a cache miss. The ONNX Runtime implementation lives
//! here, tests plug in stubs.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ndarray::{Array4, ArrayD, IxDyn};
use ort::session::Session;
use ort::value::Tensor;

use crate::error::MattingError;

/// (width, height) the BiRefNet family is exported with.
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (1024, 1024);

pub trait SegmentationModel: Send + Sync {
    fn key(&self) -> &str;

    /// (width, height) the model expects its input resized to.
    fn input_size(&self) -> (u32, u32) {
        DEFAULT_INPUT_SIZE
    }

    /// Run on a normalized `[1, 3, H, W]` batch and return the raw last
    /// output (logits, any rank).
    fn infer(&self, input: Array4<f32>) -> Result<ArrayD<f32>, MattingError>;
}

pub type SharedModel = Arc<dyn SegmentationModel>;

pub trait ModelLoader: Send + Sync {
    /// Blocking: may download weights and build a runtime session.
    fn load(&self, key: &str) -> Result<SharedModel, MattingError>;
}

pub struct OnnxSegmentationModel {
    key: String,
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxSegmentationModel {
    fn from_session(key: &str, session: Session) -> Result<Self, MattingError> {
        let load_err = |reason: &str| MattingError::ModelLoad {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .ok_or_else(|| load_err("model declares no inputs"))?;
        // BiRefNet emits several side outputs; the final prediction is last
        let output_name = session
            .outputs()
            .last()
            .map(|o| o.name().to_string())
            .ok_or_else(|| load_err("model declares no outputs"))?;

        Ok(Self {
            key: key.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl SegmentationModel for OnnxSegmentationModel {
    fn key(&self) -> &str {
        &self.key
    }

    fn infer(&self, input: Array4<f32>) -> Result<ArrayD<f32>, MattingError> {
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_array((shape, data))
            .map_err(|e| MattingError::Inference(format!("input tensor: {e}")))?;

        let mut session = self.session.lock().unwrap_or_else(|poisoned| {
            log::warn!("[MODEL] Session mutex for '{}' was poisoned, recovering...", self.key);
            poisoned.into_inner()
        });
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| MattingError::Inference(e.to_string()))?;
        let (out_shape, values) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| MattingError::Inference(format!("output '{}': {e}", self.output_name)))?;

        let dims: Vec<usize> = out_shape.iter().map(|&d| d.max(0) as usize).collect();
        ArrayD::from_shape_vec(IxDyn(&dims), values.to_vec())
            .map_err(|e| MattingError::shape(&dims, e.to_string()))
    }
}

/// Loads `<model_dir>/<key>.onnx`, fetching it from `model_urls[key]` first
/// when it is not on disk.
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    model_dir: PathBuf,
    model_urls: HashMap<String, String>,
    use_gpu: bool,
}

impl OnnxModelLoader {
    pub fn new(model_dir: impl Into<PathBuf>, model_urls: HashMap<String, String>, use_gpu: bool) -> Self {
        Self {
            model_dir: model_dir.into(),
            model_urls,
            use_gpu,
        }
    }

    pub fn weights_path(&self, key: &str) -> Result<PathBuf, MattingError> {
        let valid = !key.is_empty()
            && !key.contains("..")
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(MattingError::ModelLoad {
                key: key.to_string(),
                reason: "model key may only contain letters, digits, '-', '_' and '.'".to_string(),
            });
        }
        Ok(self.model_dir.join(format!("{key}.onnx")))
    }

    fn ensure_weights(&self, key: &str) -> Result<PathBuf, MattingError> {
        let path = self.weights_path(key)?;
        if path.is_file() {
            return Ok(path);
        }

        let url = self.model_urls.get(key).ok_or_else(|| MattingError::ModelLoad {
            key: key.to_string(),
            reason: format!(
                "weights not found at {} and no download URL is configured",
                path.display()
            ),
        })?;

        log::info!("[MODEL] Downloading weights for '{}' from {}", key, url);
        download_weights(url, &path).map_err(|reason| MattingError::ModelLoad {
            key: key.to_string(),
            reason,
        })?;
        Ok(path)
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self, key: &str) -> Result<SharedModel, MattingError> {
        let path = self.ensure_weights(key)?;
        log::info!("[MODEL] Loading '{}' from {}", key, path.display());

        let session = build_session(&path, self.use_gpu).map_err(|reason| MattingError::ModelLoad {
            key: key.to_string(),
            reason,
        })?;
        let model = OnnxSegmentationModel::from_session(key, session)?;
        log::info!(
            "[MODEL] '{}' ready (input '{}', output '{}')",
            key,
            model.input_name,
            model.output_name
        );
        Ok(Arc::new(model))
    }
}

fn build_session(path: &Path, use_gpu: bool) -> Result<Session, String> {
    #[cfg_attr(feature = "cuda", allow(unused_mut))]
    let mut builder = Session::builder().map_err(|e| format!("session builder: {e}"))?;

    #[cfg(feature = "cuda")]
    let mut builder = if use_gpu {
        builder
            .with_execution_providers([ort::execution_providers::CUDAExecutionProvider::default().build()])
            .map_err(|e| format!("CUDA execution provider: {e}"))?
    } else {
        builder
    };
    #[cfg(not(feature = "cuda"))]
    if use_gpu {
        log::warn!("[MODEL] GPU requested but this build has no `cuda` feature, running on CPU");
    }

    builder
        .commit_from_file(path)
        .map_err(|e| format!("ONNX session load error: {e}"))
}

/// Stream to a `.part` file next to the destination, then rename, so a
/// failed transfer never leaves a truncated model behind.
fn download_weights(url: &str, dest: &Path) -> Result<(), String> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Cannot create {}: {e}", parent.display()))?;
    }
    let part_file = dest.with_extension("onnx.part");

    let resp = ureq::get(url)
        .set("User-Agent", "Mozilla/5.0 (compatible; YcnodeCanvas/0.1)")
        .call()
        .map_err(|e| format!("Download failed: {e}"))?;

    let bytes = persist_weights(&mut resp.into_reader(), &part_file, dest)?;
    log::info!("[MODEL] Downloaded {} bytes to {}", bytes, dest.display());
    Ok(())
}

/// Streams `reader` into `part_file` and moves it to `dest`. Any failure
/// removes the partial file so the next load starts clean.
fn persist_weights(reader: &mut impl Read, part_file: &Path, dest: &Path) -> Result<u64, String> {
    let result = write_and_rename(reader, part_file, dest);
    if result.is_err() {
        let _ = fs::remove_file(part_file);
    }
    result
}

fn write_and_rename(reader: &mut impl Read, part_file: &Path, dest: &Path) -> Result<u64, String> {
    let mut file = fs::File::create(part_file).map_err(|e| format!("Cannot create file: {e}"))?;
    let bytes = std::io::copy(reader, &mut file).map_err(|e| format!("Download interrupted: {e}"))?;
    file.sync_all()
        .map_err(|e| format!("Cannot flush {}: {e}", part_file.display()))?;
    drop(file);
    fs::rename(part_file, dest).map_err(|e| format!("Cannot move weights into place: {e}"))?;
    Ok(bytes)
}
