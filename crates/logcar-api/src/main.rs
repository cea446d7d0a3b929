#![warn(missing_docs)]

//! LogCar server: a key-value store riding the deployment log stream

use std::sync::Arc;

use logcar_api::http::{self, ApiState};
use logcar_api::{RecordStore, StoreConfig};
use logcar_rail::{BackboardClient, BackboardConfig, StdoutSink};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is the storage medium; diagnostics go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let config = StoreConfig::from_env()?;
    let store = RecordStore::new(config.clone(), Arc::new(StdoutSink::new()))?;
    let store = match config.scope() {
        Some(scope) => {
            let mut backboard = BackboardConfig::new(scope);
            backboard.url = config.backboard_url.clone();
            backboard.request_timeout = config.request_timeout();
            store.with_search(Arc::new(BackboardClient::new(backboard)?))
        }
        None => {
            tracing::warn!("no deployment or environment id configured, reads will be rejected");
            store
        }
    };

    http::serve(Arc::new(ApiState { store }), &config.http_bind).await
}
