use std::sync::Arc;

use cardrelay::{App, AppContext, CardStore, ConfigBuilder, InMemoryCardStore, SquareClient};

#[tokio::main]
async fn main() -> cardrelay::Result<()> {
    let config = ConfigBuilder::new().from_env().build()?;
    cardrelay::init_tracing_with_config(&config);

    let processor = Arc::new(SquareClient::new(&config.square)?);
    let store = open_store(&config).await?;

    App::relay(AppContext::new(processor, store, config))
        .serve()
        .await
}

#[cfg(feature = "database")]
async fn open_store(config: &cardrelay::Config) -> cardrelay::Result<Arc<dyn CardStore>> {
    if config.store.database_url.is_some() {
        let db = cardrelay::store::connect(&config.store).await?;
        return Ok(Arc::new(cardrelay::SeaOrmCardStore::new(db)));
    }

    tracing::warn!("DATABASE_URL not set; card metadata is kept in memory and lost on restart");
    Ok(Arc::new(InMemoryCardStore::new()))
}

#[cfg(not(feature = "database"))]
async fn open_store(config: &cardrelay::Config) -> cardrelay::Result<Arc<dyn CardStore>> {
    if config.store.database_url.is_some() {
        tracing::warn!("DATABASE_URL is set but the database feature is disabled");
    }
    tracing::warn!("Card metadata is kept in memory and lost on restart");
    Ok(Arc::new(InMemoryCardStore::new()))
}
