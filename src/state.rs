use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::Store;

/// Shared by every handler: the store and the settings it runs under.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: AppConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }
}
