//! Application state shared by all handlers.

use demix_core::Config;
use demix_processing::SeparationPipeline;
use demix_storage::Storage;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn Storage>,
    pub pipeline: Arc<SeparationPipeline>,
}

impl AppState {
    pub fn new(config: Config, storage: Arc<dyn Storage>, pipeline: SeparationPipeline) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            pipeline: Arc::new(pipeline),
        }
    }
}
