use axum::Router;
use std::sync::Arc;

use super::FakeProcessor;
use crate::app::AppContext;
use crate::config::Config;
use crate::core::App;
use crate::store::{CardStore, InMemoryCardStore};

/// The full relay router wired to a [`FakeProcessor`] and an in-memory store.
///
/// The fake and the store stay reachable so tests can seed state and inspect
/// the calls a request made.
#[derive(Clone)]
pub struct TestApp {
    processor: Arc<FakeProcessor>,
    store: Arc<InMemoryCardStore>,
    config: Config,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_processor(FakeProcessor::new())
    }

    pub fn with_processor(processor: FakeProcessor) -> Self {
        Self {
            processor: Arc::new(processor),
            store: Arc::new(InMemoryCardStore::new()),
            config: Config::default(),
        }
    }

    /// Require `X-Api-Key` on write endpoints.
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.config.security.internal_api_key = Some(secrecy::SecretString::from(key.to_string()));
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn processor(&self) -> &FakeProcessor {
        &self.processor
    }

    pub fn store(&self) -> &InMemoryCardStore {
        &self.store
    }

    pub fn context(&self) -> AppContext {
        let store: Arc<dyn CardStore> = self.store.clone();
        AppContext::new(self.processor.clone(), store, self.config.clone())
    }

    pub fn router(&self) -> Router {
        App::relay(self.context()).into_test_router()
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
