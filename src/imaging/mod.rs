// Raster helpers shared by the canvas node and the matting pipeline

pub mod data_url;
pub mod resample;
pub mod tensor;

pub use data_url::{decode_data_url, encode_png_data_url, PNG_DATA_URL_PREFIX};
pub use resample::{resize_bilinear, CornerAlignment};
pub use tensor::TensorPayload;
