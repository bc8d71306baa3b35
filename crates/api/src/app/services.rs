use std::sync::Arc;

use storefront_catalog::{AggregatorConfig, CatalogAggregator, KeyValueStore};
use storefront_infra::{connect_store, InfraError};

use crate::config::AppConfig;

/// Store handle shared by every request.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Services available to route handlers.
pub struct AppServices {
    catalog: CatalogAggregator<SharedStore>,
}

impl AppServices {
    pub fn new(store: SharedStore, config: AggregatorConfig) -> Self {
        Self {
            catalog: CatalogAggregator::new(store, config),
        }
    }

    pub fn catalog(&self) -> &CatalogAggregator<SharedStore> {
        &self.catalog
    }
}

/// Connect the configured store and wire the aggregator around it.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, InfraError> {
    let store = connect_store(&config.store).await?;
    Ok(AppServices::new(store, config.aggregator.clone()))
}
