//! Matting pipeline: model dispatch, preprocessing, inference and the
//! post-processing chain that yields an alpha map at the caller's resolution.
//!
//! Every request walks `received -> preprocessing -> inference ->
//! postprocessing -> completed | error`; each transition is logged and the
//! start/end are published on the status channel.

use std::fmt;

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array2, Array4, Axis};

use super::model::SegmentationModel;
use super::postprocess::{binarize, composite, min_max_normalize, resize_prediction, sigmoid, to_nchw};
use super::registry::SharedModelRegistry;
use super::status::{MattingStatus, StatusBroadcaster};
use crate::error::MattingError;
use crate::imaging::tensor::{byte_to_unit, rgb_to_nchw};

/// ImageNet statistics the BiRefNet weights were trained with.
pub const NORMALIZE_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const NORMALIZE_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_REFINEMENT: f32 = 1.0;

#[derive(Debug, Clone)]
pub struct MattingRequest {
    pub image: RgbImage,
    pub model_key: String,
    /// In [0, 1]. Zero disables binarization.
    pub threshold: f32,
    /// Accepted and logged; no refinement pass exists yet.
    pub refinement: f32,
}

#[derive(Debug, Clone)]
pub struct MattingResult {
    /// `[1, 3, H, W]`, the source image multiplied by the alpha map.
    pub masked_image: Array4<f32>,
    /// `[1, 1, H, W]`
    pub alpha_mask: Array4<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    Preprocessing,
    Inference,
    Postprocessing,
    Completed,
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Preprocessing => "preprocessing",
            Stage::Inference => "inference",
            Stage::Postprocessing => "postprocessing",
            Stage::Completed => "completed",
            Stage::Error => "error",
        };
        f.write_str(name)
    }
}

fn enter(stage: Stage, key: &str) {
    log::info!("[MATTING] {} -> {}", key, stage);
}

pub struct MattingPipeline {
    registry: SharedModelRegistry,
    status: StatusBroadcaster,
}

impl MattingPipeline {
    pub fn new(registry: SharedModelRegistry, status: StatusBroadcaster) -> Self {
        Self { registry, status }
    }

    pub fn registry(&self) -> &SharedModelRegistry {
        &self.registry
    }

    pub fn status(&self) -> &StatusBroadcaster {
        &self.status
    }

    pub async fn execute(&self, request: MattingRequest) -> Result<MattingResult, MattingError> {
        let key = request.model_key.clone();
        self.status.publish(MattingStatus::Processing, &key, None);

        match self.run(request).await {
            Ok(result) => {
                enter(Stage::Completed, &key);
                self.status.publish(MattingStatus::Completed, &key, None);
                Ok(result)
            }
            Err(e) => {
                enter(Stage::Error, &key);
                log::error!("[MATTING] {} failed ({}): {}", key, e.kind(), e);
                self.status
                    .publish(MattingStatus::Error, &key, Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run(&self, request: MattingRequest) -> Result<MattingResult, MattingError> {
        let MattingRequest {
            image,
            model_key,
            threshold,
            refinement,
        } = request;

        enter(Stage::Received, &model_key);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(MattingError::InvalidRequest(format!(
                "threshold must be within [0, 1], got {threshold}"
            )));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(MattingError::InvalidRequest("image has no pixels".to_string()));
        }
        log::debug!(
            "[MATTING] {}x{} image, threshold {}, refinement {}",
            image.width(),
            image.height(),
            threshold,
            refinement
        );

        let model = self
            .registry
            .get(&model_key)
            .await
            .map_err(|e| MattingError::ModelUnavailable {
                key: model_key.clone(),
                source: Box::new(e),
            })?;

        tokio::task::spawn_blocking(move || process(model.as_ref(), &image, threshold))
            .await
            .map_err(|e| MattingError::Inference(format!("inference task failed: {e}")))?
    }
}

/// Resize to the model's input size and normalize into `[1, 3, H, W]`.
pub fn preprocess(image: &RgbImage, (width, height): (u32, u32)) -> Array4<f32> {
    let resized = imageops::resize(image, width, height, FilterType::Triangle);
    Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
        let value = byte_to_unit(resized.get_pixel(x as u32, y as u32)[c]);
        (value - NORMALIZE_MEAN[c]) / NORMALIZE_STD[c]
    })
}

fn process(
    model: &dyn SegmentationModel,
    image: &RgbImage,
    threshold: f32,
) -> Result<MattingResult, MattingError> {
    let key = model.key();
    // the alpha map goes back at this extent, not the model's
    let (width, height) = image.dimensions();

    enter(Stage::Preprocessing, key);
    let input = preprocess(image, model.input_size());

    enter(Stage::Inference, key);
    let logits = model.infer(input)?;

    enter(Stage::Postprocessing, key);
    let prediction = to_nchw(logits.mapv(sigmoid))?;
    let resized = resize_prediction(prediction.view(), height as usize, width as usize)?;
    let mut alpha = match min_max_normalize(resized.view()) {
        Ok(alpha) => alpha,
        Err(MattingError::DegenerateRange { value }) => {
            log::warn!(
                "[MATTING] {} produced a flat prediction ({}), returning an empty mask",
                key,
                value
            );
            Array2::zeros(resized.dim())
        }
        Err(e) => return Err(e),
    };
    binarize(&mut alpha, threshold);

    let source = rgb_to_nchw(image);
    let masked_image = composite(source.view(), alpha.view())?;
    let alpha_mask = alpha.insert_axis(Axis(0)).insert_axis(Axis(0));

    Ok(MattingResult {
        masked_image,
        alpha_mask,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matting::registry::ModelRegistry;
    use crate::matting::stub::StubLoader;
    use image::Rgb;
    use ndarray::{ArrayD, IxDyn};
    use std::sync::Arc;

    fn pipeline(loader: StubLoader) -> MattingPipeline {
        let registry = Arc::new(ModelRegistry::new(Arc::new(loader)));
        MattingPipeline::new(registry, StatusBroadcaster::default())
    }

    fn request(image: RgbImage, threshold: f32) -> MattingRequest {
        MattingRequest {
            image,
            model_key: "BiRefNet".to_string(),
            threshold,
            refinement: DEFAULT_REFINEMENT,
        }
    }

    #[test]
    fn test_preprocess_layout_and_normalization() {
        let image = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        let input = preprocess(&image, (4, 3));
        assert_eq!(input.dim(), (1, 3, 3, 4));
        assert!((input[[0, 0, 0, 0]] - (1.0 - 0.485) / 0.229).abs() < 1e-4);
        assert!((input[[0, 1, 2, 3]] - (0.0 - 0.456) / 0.224).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_uniform_image_degenerates_to_empty_mask() {
        let flat = ArrayD::from_elem(IxDyn(&[1, 1, 4, 4]), 0.3);
        let pipeline = pipeline(StubLoader::new(flat));
        let image = RgbImage::from_pixel(4, 4, Rgb([128, 128, 128]));

        let result = pipeline.execute(request(image, 0.5)).await.unwrap();
        assert_eq!(result.alpha_mask.dim(), (1, 1, 4, 4));
        assert!(result.alpha_mask.iter().all(|&v| v == 0.0));
        assert!(result.masked_image.iter().all(|&v| v == 0.0));
    }

    #[tokio::test]
    async fn test_rank_two_output_is_returned_at_source_extent() {
        let logits = ArrayD::from_shape_vec(IxDyn(&[1, 3]), vec![10.0, 10.0, -10.0]).unwrap();
        let pipeline = pipeline(StubLoader::new(logits));
        let image = RgbImage::from_pixel(3, 1, Rgb([200, 100, 50]));

        let result = pipeline.execute(request(image, 0.5)).await.unwrap();
        assert_eq!(result.alpha_mask.dim(), (1, 1, 1, 3));
        let alpha: Vec<f32> = result.alpha_mask.iter().copied().collect();
        assert_eq!(alpha, vec![1.0, 1.0, 0.0]);
        assert_eq!(result.masked_image.dim(), (1, 3, 1, 3));
        assert_eq!(result.masked_image[[0, 0, 0, 2]], 0.0);
        assert!((result.masked_image[[0, 0, 0, 0]] - 200.0 / 255.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_output_is_resized_to_the_caller_resolution() {
        let logits = ArrayD::from_shape_fn(IxDyn(&[1, 1, 4, 4]), |ix| ix[3] as f32 - 1.5);
        let pipeline = pipeline(StubLoader::new(logits));
        let image = RgbImage::new(9, 5);

        let result = pipeline.execute(request(image, 0.0)).await.unwrap();
        assert_eq!(result.alpha_mask.dim(), (1, 1, 5, 9));
        assert_eq!(result.masked_image.dim(), (1, 3, 5, 9));
        // unthresholded min-max output spans [0, 1]
        assert_eq!(result.alpha_mask[[0, 0, 0, 0]], 0.0);
        assert_eq!(result.alpha_mask[[0, 0, 4, 8]], 1.0);
    }

    #[tokio::test]
    async fn test_bad_rank_is_a_shape_error() {
        let logits = ArrayD::zeros(IxDyn(&[1, 1, 1, 4, 4]));
        let pipeline = pipeline(StubLoader::new(logits));
        let result = pipeline.execute(request(RgbImage::new(4, 4), 0.5)).await;
        assert!(matches!(result, Err(MattingError::Shape { .. })));
    }

    #[tokio::test]
    async fn test_threshold_out_of_range_is_rejected() {
        let pipeline = pipeline(StubLoader::new(ArrayD::zeros(IxDyn(&[4, 4]))));
        for threshold in [-0.1, 1.5, f32::NAN] {
            let result = pipeline.execute(request(RgbImage::new(2, 2), threshold)).await;
            assert!(matches!(result, Err(MattingError::InvalidRequest(_))));
        }
    }

    #[tokio::test]
    async fn test_model_failure_is_unavailable_and_broadcast() {
        let pipeline = pipeline(StubLoader::new(ArrayD::zeros(IxDyn(&[4, 4]))).failing_first(1));
        let mut events = pipeline.status().subscribe();

        let result = pipeline.execute(request(RgbImage::new(2, 2), 0.5)).await;
        match result {
            Err(MattingError::ModelUnavailable { key, source }) => {
                assert_eq!(key, "BiRefNet");
                assert!(matches!(*source, MattingError::ModelLoad { .. }));
            }
            other => panic!("expected ModelUnavailable, got {other:?}"),
        }

        assert_eq!(events.recv().await.unwrap().status, MattingStatus::Processing);
        let last = events.recv().await.unwrap();
        assert_eq!(last.status, MattingStatus::Error);
        assert!(last.detail.is_some());

        // not cached: the next request loads again and succeeds
        assert!(pipeline.execute(request(RgbImage::new(4, 4), 0.5)).await.is_ok());
    }

    #[tokio::test]
    async fn test_success_publishes_processing_then_completed() {
        let pipeline = pipeline(StubLoader::new(ArrayD::zeros(IxDyn(&[4, 4]))));
        let mut events = pipeline.status().subscribe();
        pipeline.execute(request(RgbImage::new(4, 4), 0.5)).await.unwrap();
        assert_eq!(events.recv().await.unwrap().status, MattingStatus::Processing);
        assert_eq!(events.recv().await.unwrap().status, MattingStatus::Completed);
    }
}
