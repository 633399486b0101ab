use std::sync::Arc;

use crate::application::catalog::CatalogService;
use crate::cache::Cache;

#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    pub cache: Arc<Cache>,
}

impl AppState {
    pub fn new(catalog: CatalogService, cache: Arc<Cache>) -> Self {
        Self { catalog, cache }
    }
}
