// Canvas node: one pipeline-run invocation against the shared cache

use std::sync::Arc;

use ndarray::{Array3, Array4, ArrayD};

use super::cache::SharedCanvasCache;
use super::execution::{ExecutionId, RunVerdict};
use super::flow::FlowStatus;
use super::ingest::{normalize_image, normalize_mask};
use super::storage::CanvasStorage;
use crate::imaging::tensor::{gray_to_batch, rgb_to_nhwc};

#[derive(Debug, Default)]
pub struct CanvasNodeInput {
    /// Annotated canvas file name, e.g. `canvas_image.png`.
    pub canvas_image: String,
    /// Explicit run id from the orchestrator. Falls back to the clock.
    pub execution_id: Option<ExecutionId>,
    pub cache_enabled: bool,
    pub input_image: Option<ArrayD<f32>>,
    pub input_mask: Option<ArrayD<f32>>,
}

#[derive(Debug)]
pub struct CanvasNodeOutput {
    /// `[1, H, W, 3]`
    pub image: Array4<f32>,
    /// `[1, H, W]`
    pub mask: Array3<f32>,
    pub execution_id: ExecutionId,
    pub verdict: RunVerdict,
    pub fallback: Option<String>,
}

/// One node instance. Instances differ only in their flow id; they all
/// share the process-wide cache.
#[derive(Debug)]
pub struct CanvasNode {
    node_id: String,
    flow_id: String,
    cache: SharedCanvasCache,
    storage: Arc<CanvasStorage>,
}

impl CanvasNode {
    pub fn new(node_id: impl Into<String>, cache: SharedCanvasCache, storage: Arc<CanvasStorage>) -> Self {
        let node_id = node_id.into();
        let flow_id = format!("{node_id}-{}", uuid::Uuid::new_v4().simple());
        Self {
            node_id,
            flow_id,
            cache,
            storage,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    fn record(&self, stage: &str, status: FlowStatus, info: Option<String>) {
        self.cache.flows().record(&self.flow_id, stage, status, info);
    }

    pub fn process(&self, input: CanvasNodeInput) -> CanvasNodeOutput {
        let execution_id = self.cache.tracker().resolve(input.execution_id);
        self.record("process", FlowStatus::Started, Some(format!("execution {execution_id}")));

        let verdict = self.cache.begin_run(execution_id);
        self.record("cache_check", FlowStatus::Processing, Some(format!("{verdict:?}")));
        self.cache.set_cache_enabled(input.cache_enabled);

        self.ingest(input.input_image, input.input_mask);

        let load = self.storage.load(&input.canvas_image);
        let fallback = load.fallback();
        if let Some(reason) = &fallback {
            self.record("load_canvas", FlowStatus::Error, Some(reason.clone()));
        }
        let (image, mask) = load.into_parts();
        self.record(
            "emit",
            FlowStatus::Processing,
            Some(format!("image {}x{}, mask {}x{}", image.width(), image.height(), mask.width(), mask.height())),
        );

        let output = CanvasNodeOutput {
            image: rgb_to_nhwc(&image),
            mask: gray_to_batch(&mask),
            execution_id,
            verdict,
            fallback,
        };

        self.cache.snapshot();
        self.record("process", FlowStatus::Completed, None);
        output
    }

    /// Write newly supplied tensors into the cache. A tensor that cannot be
    /// normalized is logged and skipped; the run continues.
    fn ingest(&self, image: Option<ArrayD<f32>>, mask: Option<ArrayD<f32>>) {
        if let Some(tensor) = image {
            match normalize_image(tensor.view()) {
                Ok(image) => {
                    self.record(
                        "ingest_image",
                        FlowStatus::Processing,
                        Some(format!("{}x{}", image.width(), image.height())),
                    );
                    self.cache.put_image(image);
                }
                Err(e) => {
                    log::warn!("[CANVAS] Node {}: input image rejected: {}", self.node_id, e);
                    self.record("ingest_image", FlowStatus::Error, Some(e.to_string()));
                }
            }
        }

        if let Some(tensor) = mask {
            let target = self.cache.image_extent();
            match normalize_mask(tensor.view(), target) {
                Ok(mask) => {
                    self.record(
                        "ingest_mask",
                        FlowStatus::Processing,
                        Some(format!("{}x{}", mask.width(), mask.height())),
                    );
                    self.cache.put_mask(mask);
                }
                Err(e) => {
                    log::warn!("[CANVAS] Node {}: input mask rejected: {}", self.node_id, e);
                    self.record("ingest_mask", FlowStatus::Error, Some(e.to_string()));
                }
            }
        }
    }
}
