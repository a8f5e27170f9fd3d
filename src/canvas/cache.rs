//! Process-wide canvas cache.
//!
//! One `CanvasCache` is created at startup and shared (`Arc`) by every canvas
//! node instance and every HTTP handler; there is no per-node isolation. All
//! image/mask mutation goes through a single mutex, so an invalidation and a
//! concurrent write can never interleave half-way. The persistent snapshot
//! has its own lock, always taken after the state lock.

use std::sync::{Arc, Mutex, MutexGuard};

use image::{GrayImage, RgbImage};
use serde::Serialize;

use super::execution::{ExecutionId, ExecutionTracker, RunVerdict};
use super::flow::FlowTracker;
use super::snapshot::PersistentCacheBridge;

#[derive(Debug, Default)]
struct CacheState {
    image: Option<RgbImage>,
    mask: Option<GrayImage>,
    cache_enabled: bool,
    last_execution_id: Option<ExecutionId>,
    resets: u64,
    restores: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub has_image: bool,
    pub has_mask: bool,
    pub image_size: Option<(u32, u32)>,
    pub mask_size: Option<(u32, u32)>,
    pub cache_enabled: bool,
    pub last_execution_id: Option<ExecutionId>,
    pub snapshot_execution_id: Option<ExecutionId>,
    pub resets: u64,
    pub restores: u64,
}

#[derive(Debug)]
pub struct CanvasCache {
    tracker: ExecutionTracker,
    state: Mutex<CacheState>,
    bridge: Mutex<PersistentCacheBridge>,
    flows: FlowTracker,
}

pub type SharedCanvasCache = Arc<CanvasCache>;

impl CanvasCache {
    pub fn new(flows: FlowTracker) -> Self {
        Self {
            tracker: ExecutionTracker,
            state: Mutex::new(CacheState::default()),
            bridge: Mutex::new(PersistentCacheBridge::default()),
            flows,
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            log::warn!("Canvas cache mutex was poisoned, recovering...");
            poisoned.into_inner()
        })
    }

    fn bridge(&self) -> MutexGuard<'_, PersistentCacheBridge> {
        self.bridge.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }

    pub fn flows(&self) -> &FlowTracker {
        &self.flows
    }

    /// Apply the tracker's verdict for `id` in one critical section: a new
    /// run clears the cache, a continuation restores from the snapshot.
    pub fn begin_run(&self, id: ExecutionId) -> RunVerdict {
        let mut state = self.state();
        let verdict = self.tracker.verdict(id, state.last_execution_id);
        match verdict {
            RunVerdict::NewRun => {
                log::info!(
                    "[CACHE] New execution {} (previous: {}), clearing canvas cache",
                    id,
                    state
                        .last_execution_id
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "none".to_string())
                );
                Self::reset_locked(&mut state, id);
            }
            RunVerdict::Continuation => {
                log::debug!("[CACHE] Execution {} continues, restoring snapshot", id);
                self.restore_locked(&mut state);
            }
        }
        verdict
    }

    pub fn reset(&self, id: ExecutionId) {
        let mut state = self.state();
        Self::reset_locked(&mut state, id);
    }

    fn reset_locked(state: &mut CacheState, id: ExecutionId) {
        state.image = None;
        state.mask = None;
        state.last_execution_id = Some(id);
        state.resets += 1;
    }

    /// Copy present snapshot fields back into the cache. Only a snapshot
    /// written under the current execution id is used; absent fields leave
    /// the cached value alone. Returns whether anything was copied.
    pub fn restore_from_snapshot(&self) -> bool {
        let mut state = self.state();
        self.restore_locked(&mut state)
    }

    fn restore_locked(&self, state: &mut CacheState) -> bool {
        let Some(current) = state.last_execution_id else {
            return false;
        };
        let bridge = self.bridge();
        let Some((image, mask)) = bridge.read_for(current) else {
            return false;
        };

        let mut restored = false;
        if let Some(image) = image {
            state.image = Some(image.clone());
            restored = true;
        }
        if let Some(mask) = mask {
            state.mask = Some(mask.clone());
            restored = true;
        }
        if restored {
            state.restores += 1;
        }
        restored
    }

    pub fn put_image(&self, image: RgbImage) {
        self.state().image = Some(image);
    }

    pub fn put_mask(&self, mask: GrayImage) {
        self.state().mask = Some(mask);
    }

    pub fn image(&self) -> Option<RgbImage> {
        self.state().image.clone()
    }

    pub fn mask(&self) -> Option<GrayImage> {
        self.state().mask.clone()
    }

    /// Extent (height, width) of the cached image, if any.
    pub fn image_extent(&self) -> Option<(usize, usize)> {
        self.state()
            .image
            .as_ref()
            .map(|img| (img.height() as usize, img.width() as usize))
    }

    /// Record the current image/mask as last-known-good for this run.
    pub fn snapshot(&self) {
        let state = self.state();
        let Some(id) = state.last_execution_id else {
            log::warn!("[CACHE] Snapshot requested before any execution was observed");
            return;
        };
        let mut bridge = self.bridge();
        bridge.write(state.image.clone(), state.mask.clone(), id);
    }

    /// Advisory only: stored for callers, never consulted here.
    pub fn set_cache_enabled(&self, enabled: bool) {
        self.state().cache_enabled = enabled;
    }

    pub fn cache_enabled(&self) -> bool {
        self.state().cache_enabled
    }

    pub fn last_execution_id(&self) -> Option<ExecutionId> {
        self.state().last_execution_id
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        let snapshot_execution_id = self.bridge().written_for();
        CacheStats {
            has_image: state.image.is_some(),
            has_mask: state.mask.is_some(),
            image_size: state.image.as_ref().map(|i| i.dimensions()),
            mask_size: state.mask.as_ref().map(|m| m.dimensions()),
            cache_enabled: state.cache_enabled,
            last_execution_id: state.last_execution_id,
            snapshot_execution_id,
            resets: state.resets,
            restores: state.restores,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn cache() -> CanvasCache {
        CanvasCache::new(FlowTracker::new(8, 8))
    }

    #[test]
    fn test_reset_once_per_distinct_transition() {
        let cache = cache();
        let ids = [1u64, 1, 2, 2, 2, 3, 1, 1];
        for id in ids {
            cache.begin_run(ExecutionId(id));
        }
        // None->1, 1->2, 2->3, 3->1
        assert_eq!(cache.stats().resets, 4);
    }

    #[test]
    fn test_reset_clears_payloads_and_records_id() {
        let cache = cache();
        cache.set_cache_enabled(true);
        cache.put_image(RgbImage::from_pixel(3, 2, Rgb([4, 5, 6])));
        cache.put_mask(GrayImage::from_pixel(3, 2, Luma([90])));

        cache.reset(ExecutionId(9));
        assert!(cache.image().is_none());
        assert!(cache.mask().is_none());
        assert_eq!(cache.last_execution_id(), Some(ExecutionId(9)));

        let stats = cache.stats();
        assert_eq!(stats.resets, 1);
        assert!(!stats.has_image);
        assert!(stats.image_size.is_none());
        // metadata survives a reset
        assert!(stats.cache_enabled);

        // the reset id now counts as the current run
        assert_eq!(cache.begin_run(ExecutionId(9)), RunVerdict::Continuation);
        assert_eq!(cache.stats().resets, 1);
    }

    #[test]
    fn test_new_run_clears_before_writes() {
        let cache = cache();
        cache.begin_run(ExecutionId(1));
        cache.put_image(RgbImage::new(4, 4));
        cache.put_mask(GrayImage::new(4, 4));
        cache.snapshot();

        assert_eq!(cache.begin_run(ExecutionId(2)), RunVerdict::NewRun);
        assert!(cache.image().is_none());
        assert!(cache.mask().is_none());

        // the run-1 snapshot must not leak into run 2
        assert!(!cache.restore_from_snapshot());
        assert!(cache.image().is_none());
    }

    #[test]
    fn test_same_id_twice_keeps_cache() {
        let cache = cache();
        cache.begin_run(ExecutionId(1000));
        cache.put_image(RgbImage::from_pixel(2, 2, Rgb([9, 9, 9])));
        cache.snapshot();

        assert_eq!(cache.begin_run(ExecutionId(1000)), RunVerdict::Continuation);
        assert_eq!(cache.image().unwrap().get_pixel(0, 0), &Rgb([9, 9, 9]));
        assert_eq!(cache.stats().resets, 1);
    }

    #[test]
    fn test_restore_is_idempotent() {
        let cache = cache();
        cache.begin_run(ExecutionId(5));
        cache.put_image(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));
        cache.put_mask(GrayImage::from_pixel(2, 2, Luma([200])));
        cache.snapshot();
        cache.put_image(RgbImage::from_pixel(2, 2, Rgb([7, 7, 7])));

        cache.restore_from_snapshot();
        let once = (cache.image(), cache.mask());
        cache.restore_from_snapshot();
        let twice = (cache.image(), cache.mask());
        assert_eq!(once, twice);
        assert_eq!(once.0.unwrap().get_pixel(1, 1), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_restore_leaves_absent_fields_untouched() {
        let cache = cache();
        cache.begin_run(ExecutionId(5));
        cache.put_image(RgbImage::new(2, 2));
        cache.snapshot(); // no mask in snapshot

        cache.put_mask(GrayImage::from_pixel(3, 3, Luma([77])));
        assert!(cache.restore_from_snapshot());
        assert_eq!(cache.mask().unwrap().get_pixel(0, 0), &Luma([77]));
    }

    #[test]
    fn test_put_is_last_writer_wins() {
        let cache = cache();
        cache.put_mask(GrayImage::from_pixel(1, 1, Luma([1])));
        cache.put_mask(GrayImage::from_pixel(5, 5, Luma([2])));
        assert_eq!(cache.mask().unwrap().dimensions(), (5, 5));
    }

    #[test]
    fn test_cache_enabled_is_global_metadata() {
        let cache = cache();
        assert!(!cache.cache_enabled());
        cache.set_cache_enabled(true);
        assert!(cache.cache_enabled());
        cache.begin_run(ExecutionId(1));
        assert!(cache.cache_enabled());
    }

    #[test]
    fn test_concurrent_same_id_resets_once() {
        let cache = Arc::new(cache());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    cache.begin_run(ExecutionId(42));
                    cache.put_image(RgbImage::new(1, 1));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let stats = cache.stats();
        assert_eq!(stats.resets, 1);
        assert_eq!(stats.last_execution_id, Some(ExecutionId(42)));
    }
}
