//! Node assembly and lifecycle
//!
//! Opens the local store, builds the configured getter cascade and serves
//! the REST API until Ctrl+C.

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api::create_router;
use crate::config::{Config, ConfigError, GetterKind};
use crate::getter::Getter;
use crate::getters::{
    CascadeGetter, ExchangeGetter, ExchangeRequest, MeteredGetter, StoreGetter, TeeGetter,
};
use crate::metrics::Metrics;
use crate::pending::PendingRequests;
use crate::store::{EdsStore, StorageError};

/// Capacity of the queue of outgoing peer requests
const EXCHANGE_QUEUE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything a running node needs to serve retrievals
pub struct Node {
    pub getter: Arc<CascadeGetter>,
    pub store: Arc<EdsStore>,
    pub metrics: Metrics,
    pub pending: PendingRequests,
}

/// Build the node's cascade in configured order.
///
/// Returns the node and the receiving end of the peer request queue, which
/// the network layer drains and answers through `pending`.
pub fn build_node(
    config: &Config,
    store: Arc<EdsStore>,
) -> (Node, mpsc::Receiver<ExchangeRequest>) {
    let metrics = Metrics::new();
    let pending = PendingRequests::new();
    let (requests_tx, requests_rx) = mpsc::channel(EXCHANGE_QUEUE);

    let getters: Vec<Arc<dyn Getter>> = config
        .getters
        .iter()
        .map(|kind| {
            let getter: Arc<dyn Getter> = match kind {
                GetterKind::Store => Arc::new(StoreGetter::new(store.clone())),
                GetterKind::Exchange => {
                    let exchange = ExchangeGetter::new(
                        requests_tx.clone(),
                        pending.clone(),
                        config.exchange_timeout(),
                    );
                    // Keep what we fetch from peers
                    Arc::new(TeeGetter::new(Arc::new(exchange), store.clone()))
                }
            };
            Arc::new(MeteredGetter::new(kind.as_str(), getter, metrics.clone())) as Arc<dyn Getter>
        })
        .collect();

    info!(
        getters = ?config.getters.iter().map(GetterKind::as_str).collect::<Vec<_>>(),
        "Built getter cascade"
    );

    let node = Node {
        getter: Arc::new(CascadeGetter::new(getters)),
        store,
        metrics,
        pending,
    };
    (node, requests_rx)
}

/// Run the node with the given configuration
pub async fn run_node(config: Config) -> Result<(), NodeError> {
    config.validate()?;
    std::fs::create_dir_all(&config.data_dir)?;

    let store = Arc::new(EdsStore::new_with_path(config.data_dir.join("eds"))?);
    let (node, mut requests) = build_node(&config, store);

    // Peer protocols answer these through `node.pending`
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            debug!(key = ?request.key, "Queued peer request");
        }
    });

    let app = create_router(
        node.getter.clone(),
        node.store.clone(),
        node.metrics.clone(),
        config.request_timeout(),
    );

    let addr = config.api.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Node store at {:?}", config.data_dir);
    info!("REST API listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        })
        .await?;

    info!("Node stopped");
    Ok(())
}
