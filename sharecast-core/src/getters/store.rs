//! Getter serving squares held in the local [`EdsStore`]

use async_trait::async_trait;
use std::sync::Arc;

use crate::context::Context;
use crate::getter::{check_bounds, Getter, GetterError};
use crate::share::{ExtendedDataSquare, Root, Share};
use crate::store::{EdsStore, StorageError};

pub struct StoreGetter {
    store: Arc<EdsStore>,
}

impl StoreGetter {
    pub fn new(store: Arc<EdsStore>) -> Self {
        Self { store }
    }
}

impl From<StorageError> for GetterError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(hash) => GetterError::NotFound(hash),
            StorageError::Invalid(err) => GetterError::Invalid(err),
            other => GetterError::Storage(other.to_string()),
        }
    }
}

#[async_trait]
impl Getter for StoreGetter {
    async fn get_share(
        &self,
        ctx: &Context,
        root: &Root,
        row: usize,
        col: usize,
    ) -> Result<Share, GetterError> {
        check_bounds(root, row, col)?;

        let eds = self.get_eds(ctx, root).await?;
        eds.cell(row, col).cloned().ok_or(GetterError::OutOfBounds {
            row,
            col,
            width: eds.width(),
        })
    }

    async fn get_eds(
        &self,
        ctx: &Context,
        root: &Root,
    ) -> Result<ExtendedDataSquare, GetterError> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        Ok(self.store.get(&root.hash()).await?)
    }
}
