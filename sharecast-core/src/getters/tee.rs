//! Getter that keeps a local copy of every square it fetches

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::context::Context;
use crate::getter::{Getter, GetterError};
use crate::share::{ExtendedDataSquare, Root, Share};
use crate::store::EdsStore;

pub struct TeeGetter {
    getter: Arc<dyn Getter>,
    store: Arc<EdsStore>,
}

impl TeeGetter {
    pub fn new(getter: Arc<dyn Getter>, store: Arc<EdsStore>) -> Self {
        Self { getter, store }
    }
}

#[async_trait]
impl Getter for TeeGetter {
    async fn get_share(
        &self,
        ctx: &Context,
        root: &Root,
        row: usize,
        col: usize,
    ) -> Result<Share, GetterError> {
        self.getter.get_share(ctx, root, row, col).await
    }

    async fn get_eds(
        &self,
        ctx: &Context,
        root: &Root,
    ) -> Result<ExtendedDataSquare, GetterError> {
        let eds = self.getter.get_eds(ctx, root).await?;

        // A failed write only costs us the cache entry
        if let Err(err) = self.store.put(&eds).await {
            warn!(root = %root.hash(), error = %err, "Failed to store fetched square");
        }
        Ok(eds)
    }
}
