use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::{
    application::catalog::{CatalogError, CatalogService},
    cache::{Cache, WarmReport},
};

#[derive(Debug, Error)]
pub enum CacheWarmError {
    #[error("failed to load catalog content: {0}")]
    Catalog(#[from] CatalogError),
}

pub struct CacheWarmer {
    catalog: CatalogService,
    cache: Arc<Cache>,
}

impl CacheWarmer {
    pub fn new(catalog: CatalogService, cache: Arc<Cache>) -> Self {
        Self { catalog, cache }
    }

    /// Populate the hot catalog lists. Loading failures abort; storage
    /// failures only show up as skipped items in the report.
    pub async fn warm_initial(&self) -> Result<WarmReport, CacheWarmError> {
        if !self.cache.is_enabled() {
            return Ok(WarmReport::default());
        }

        info!(target = "roamly::cache_warmer", "warming catalog cache");
        let items = self.catalog.warm_items().await?;
        let report = self.cache.warm_up(items).await;
        info!(
            target = "roamly::cache_warmer",
            stored = report.stored,
            skipped = report.skipped,
            "catalog cache warmed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::infra::memory::MemoryCatalogRepo;

    fn warmer(config: CacheConfig) -> (CacheWarmer, Arc<Cache>) {
        let cache = Arc::new(Cache::in_memory(config));
        let catalog = CatalogService::new(
            Arc::new(MemoryCatalogRepo::seeded()),
            Arc::clone(&cache),
        );
        (CacheWarmer::new(catalog, Arc::clone(&cache)), cache)
    }

    #[tokio::test]
    async fn warm_initial_stores_the_hot_lists() {
        let (warmer, cache) = warmer(CacheConfig::default());

        let report = warmer.warm_initial().await.expect("warm");
        assert_eq!(report.stored, 4);
        assert_eq!(report.skipped, 0);
        assert_eq!(cache.entry_count().await, 4);
    }

    #[tokio::test]
    async fn disabled_cache_is_not_warmed() {
        let (warmer, _) = warmer(CacheConfig {
            enabled: false,
            ..Default::default()
        });

        let report = warmer.warm_initial().await.expect("warm");
        assert_eq!(report, WarmReport::default());
    }
}
