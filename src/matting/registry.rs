//! Process-wide model registry.
//!
//! Each key owns a `tokio::sync::OnceCell`: the first caller runs the
//! loader on the blocking pool, concurrent callers for the same key await
//! that one load. A failed load drops its empty cell, so the next request
//! tries again and unknown keys do not accumulate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use super::model::{ModelLoader, SharedModel};
use crate::error::MattingError;

type Slot = Arc<OnceCell<SharedModel>>;

pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    slots: Mutex<HashMap<String, Slot>>,
}

pub type SharedModelRegistry = Arc<ModelRegistry>;

impl ModelRegistry {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    pub async fn get(&self, key: &str) -> Result<SharedModel, MattingError> {
        let slot = self.slot(key);
        if let Some(model) = slot.get() {
            return Ok(model.clone());
        }

        let outcome = slot
            .get_or_try_init(|| async {
                let loader = self.loader.clone();
                let owned_key = key.to_string();
                let loaded = tokio::task::spawn_blocking(move || loader.load(&owned_key))
                    .await
                    .map_err(|e| MattingError::ModelLoad {
                        key: key.to_string(),
                        reason: format!("loader task failed: {e}"),
                    })?;
                match &loaded {
                    Ok(_) => log::info!("[REGISTRY] Model '{}' cached", key),
                    Err(e) => log::error!("[REGISTRY] Model '{}' failed to load: {}", key, e),
                }
                loaded
            })
            .await;
        match outcome {
            Ok(model) => Ok(model.clone()),
            Err(e) => {
                self.discard_empty(key, &slot);
                Err(e)
            }
        }
    }

    /// Removes `slot` unless a concurrent caller replaced or filled it.
    fn discard_empty(&self, key: &str, slot: &Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized())
        {
            slots.remove(key);
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_loaded(&self, key: &str) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.get(key).is_some_and(|slot| slot.initialized())
    }

    /// Keys with a ready model, sorted.
    pub fn loaded_keys(&self) -> Vec<String> {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut keys: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}
