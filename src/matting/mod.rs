//! Background removal: a registry of segmentation models and the pipeline
//! that turns a prediction into an alpha mask.

pub mod alpha;
pub mod model;
pub mod pipeline;
pub mod postprocess;
pub mod registry;
pub mod status;

#[cfg(test)]
pub(crate) mod stub;

pub use alpha::{combine_alpha, encode_matting_response, split_alpha, MattingResponse};
pub use model::{ModelLoader, OnnxModelLoader, SegmentationModel, SharedModel};
pub use pipeline::{MattingPipeline, MattingRequest, MattingResult};
pub use registry::{ModelRegistry, SharedModelRegistry};
pub use status::{MattingStatus, StatusBroadcaster, StatusEvent};
