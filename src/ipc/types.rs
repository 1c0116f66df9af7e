use std::path::Path;

use serde::Deserialize;

use crate::config::{Config, Settings};
use crate::store::Backend;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    /// Active tunables: start-up config overlaid with the workspace's
    /// persisted settings.
    pub settings: Settings,
    pub store: Box<dyn Backend>,
}

impl AppState {
    pub fn new(config: Config, store: Box<dyn Backend>) -> Self {
        Self {
            settings: config.settings,
            config,
            store,
        }
    }

    pub fn workspace(&self) -> Option<&Path> {
        self.store.workspace()
    }
}
