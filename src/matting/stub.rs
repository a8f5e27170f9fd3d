// Test doubles for the model seam

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ndarray::{Array4, ArrayD};

use super::model::{ModelLoader, SegmentationModel, SharedModel};
use crate::error::MattingError;

/// Ignores its input and returns a fixed logit tensor.
pub struct StubModel {
    pub key: String,
    pub output: ArrayD<f32>,
    pub input_size: (u32, u32),
}

impl SegmentationModel for StubModel {
    fn key(&self) -> &str {
        &self.key
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn infer(&self, input: Array4<f32>) -> Result<ArrayD<f32>, MattingError> {
        let (w, h) = self.input_size;
        if input.dim() != (1, 3, h as usize, w as usize) {
            return Err(MattingError::shape(input.shape(), "stub received an unexpected input"));
        }
        Ok(self.output.clone())
    }
}

pub struct StubLoader {
    output: ArrayD<f32>,
    input_size: (u32, u32),
    delay: Duration,
    fail_first: usize,
    calls: AtomicUsize,
}

impl StubLoader {
    pub fn new(output: ArrayD<f32>) -> Self {
        Self {
            output,
            input_size: (4, 4),
            delay: Duration::ZERO,
            fail_first: 0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelLoader for StubLoader {
    fn load(&self, key: &str) -> Result<SharedModel, MattingError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if call < self.fail_first {
            return Err(MattingError::ModelLoad {
                key: key.to_string(),
                reason: "stub failure".to_string(),
            });
        }
        Ok(Arc::new(StubModel {
            key: key.to_string(),
            output: self.output.clone(),
            input_size: self.input_size,
        }))
    }
}
