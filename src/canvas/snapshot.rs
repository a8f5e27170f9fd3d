// Last-known-good image/mask pair that survives node reconstruction

use image::{GrayImage, RgbImage};

use super::execution::ExecutionId;

/// The pair written after a successful run, tagged with that run's id.
#[derive(Debug, Clone, Default)]
pub struct PersistentSnapshot {
    pub image: Option<RgbImage>,
    pub mask: Option<GrayImage>,
    pub execution_id: Option<ExecutionId>,
}

/// Holds the snapshot and enforces that it is only read back for the run
/// that wrote it.
#[derive(Debug, Default)]
pub struct PersistentCacheBridge {
    snapshot: PersistentSnapshot,
}

impl PersistentCacheBridge {
    pub fn write(&mut self, image: Option<RgbImage>, mask: Option<GrayImage>, id: ExecutionId) {
        self.snapshot = PersistentSnapshot {
            image,
            mask,
            execution_id: Some(id),
        };
    }

    /// Snapshot fields for `id`, or `None` when the snapshot belongs to
    /// another run (or was never written).
    pub fn read_for(&self, id: ExecutionId) -> Option<(Option<&RgbImage>, Option<&GrayImage>)> {
        if self.snapshot.execution_id == Some(id) {
            Some((self.snapshot.image.as_ref(), self.snapshot.mask.as_ref()))
        } else {
            None
        }
    }

    pub fn written_for(&self) -> Option<ExecutionId> {
        self.snapshot.execution_id
    }
}
