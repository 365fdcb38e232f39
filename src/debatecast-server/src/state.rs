use std::path::PathBuf;

use debatecast_core::{Config, Pipeline, PipelineError};

/// Shared state for every request handler.
pub struct AppState {
    pub pipeline: Pipeline,
    pub audio_dir: PathBuf,
    pub cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, config: &Config) -> Self {
        Self {
            pipeline,
            audio_dir: config.storage.audio_dir.clone(),
            cors_origins: config.server.cors_origins.clone(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        Ok(Self::new(Pipeline::from_config(config)?, config))
    }
}
