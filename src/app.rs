use std::sync::Arc;

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::payments::{CardManager, ChargeManager, CustomerManager};
use crate::square::PaymentProcessor;
use crate::store::CardStore;

/// Shared state handed to every handler.
///
/// Holds the processor client, the metadata store and the resolved
/// configuration. Cloning is cheap; everything sits behind `Arc`.
#[derive(Clone)]
pub struct AppContext {
    pub processor: Arc<dyn PaymentProcessor>,
    pub store: Arc<dyn CardStore>,
    pub config: Arc<Config>,
}

impl AppContext {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        store: Arc<dyn CardStore>,
        config: Config,
    ) -> Self {
        Self {
            processor,
            store,
            config: Arc::new(config),
        }
    }

    pub fn builder() -> AppContextBuilder {
        AppContextBuilder::new()
    }

    pub fn customers(&self) -> CustomerManager {
        CustomerManager::new(self.processor.clone(), self.store.clone())
    }

    pub fn cards(&self) -> CardManager {
        CardManager::new(self.processor.clone(), self.store.clone())
            .disable_on_delete(self.config.square.disable_cards_on_delete)
    }

    pub fn charges(&self) -> ChargeManager {
        ChargeManager::new(self.processor.clone(), self.store.clone())
    }

    /// The configured internal API key, if write endpoints are guarded.
    pub fn api_key(&self) -> Option<&secrecy::SecretString> {
        self.config.security.internal_api_key.as_ref()
    }
}

/// Builder for AppContext with fluent API
#[must_use = "builder does nothing until you call build()"]
#[derive(Default)]
pub struct AppContextBuilder {
    processor: Option<Arc<dyn PaymentProcessor>>,
    store: Option<Arc<dyn CardStore>>,
    config: Option<Config>,
}

impl AppContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_processor(mut self, processor: Arc<dyn PaymentProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn CardStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the context. A processor and a store are required; the
    /// configuration falls back to defaults.
    pub fn build(self) -> Result<AppContext> {
        let processor = self
            .processor
            .ok_or_else(|| RelayError::internal("AppContext requires a payment processor"))?;
        let store = self
            .store
            .ok_or_else(|| RelayError::internal("AppContext requires a card store"))?;
        Ok(AppContext::new(
            processor,
            store,
            self.config.unwrap_or_default(),
        ))
    }
}
