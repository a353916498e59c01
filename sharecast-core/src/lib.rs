//! Sharecast Core
//!
//! Share and square retrieval for a data availability node: a cascade of
//! getters over the local store and peer exchange, served over REST.

pub mod api;
pub mod config;
pub mod context;
pub mod getter;
pub mod getters;
pub mod metrics;
pub mod pending;
pub mod runtime;
pub mod share;
pub mod store;

pub use config::{Config, ConfigError, GetterKind};
pub use context::{Context, ContextError};
pub use getter::{ErrorList, Getter, GetterError};
pub use getters::{
    cascade, CascadeGetter, ExchangeGetter, ExchangeRequest, MeteredGetter, StoreGetter,
    TeeGetter,
};
pub use metrics::Metrics;
pub use pending::{Payload, PendingRequests, RequestKey};
pub use runtime::{build_node, run_node, Node, NodeError};
pub use share::{DataHash, ExtendedDataSquare, Root, Share, ShareError};
pub use store::{EdsStore, EdsStoreStats, StorageError};
