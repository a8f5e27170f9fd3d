// Shared application state handed to every request handler

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::canvas::{CanvasCache, CanvasNode, CanvasStorage, FlowTracker, SharedCanvasCache};
use crate::matting::{
    MattingPipeline, ModelLoader, ModelRegistry, OnnxModelLoader, StatusBroadcaster,
};

use super::config::ServerConfig;

pub type SharedNodeTable = Arc<Mutex<HashMap<String, Arc<CanvasNode>>>>;

/// Cheap to clone: every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub cache: SharedCanvasCache,
    pub storage: Arc<CanvasStorage>,
    pub pipeline: Arc<MattingPipeline>,
    nodes: SharedNodeTable,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let loader = OnnxModelLoader::new(
            config.model_dir.clone(),
            config.model_urls.clone(),
            config.use_gpu,
        );
        Self::with_loader(config, Arc::new(loader))
    }

    pub fn with_loader(config: ServerConfig, loader: Arc<dyn ModelLoader>) -> Self {
        let flows = FlowTracker::new(config.flow_history_per_node, config.max_tracked_flows);
        let storage = CanvasStorage::new(
            config.input_dir.clone(),
            config.output_dir.clone(),
            config.temp_dir.clone(),
        );
        let registry = Arc::new(ModelRegistry::new(loader));

        Self {
            config: Arc::new(config),
            cache: Arc::new(CanvasCache::new(flows)),
            storage: Arc::new(storage),
            pipeline: Arc::new(MattingPipeline::new(registry, StatusBroadcaster::default())),
            nodes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn status(&self) -> &StatusBroadcaster {
        self.pipeline.status()
    }

    /// The node instance for `node_id`, created on first use.
    pub fn node(&self, node_id: &str) -> Arc<CanvasNode> {
        let mut nodes = self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        nodes
            .entry(node_id.to_string())
            .or_insert_with(|| {
                log::info!("[STATE] Creating canvas node {}", node_id);
                Arc::new(CanvasNode::new(node_id, self.cache.clone(), self.storage.clone()))
            })
            .clone()
    }

    pub fn find_node(&self, node_id: &str) -> Option<Arc<CanvasNode>> {
        let nodes = self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        nodes.get(node_id).cloned()
    }
}
