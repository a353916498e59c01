//! Ordered fallback over a list of getters
//!
//! [`cascade`] tries each getter in turn and returns the first success. A
//! failing getter is skipped unless the caller's own context is done, in
//! which case the context error is returned as is. When every getter fails,
//! all of their errors come back together in attempt order.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::debug;

use crate::context::Context;
use crate::getter::{ErrorList, Getter, GetterError};
use crate::share::{ExtendedDataSquare, Root, Share};

/// Run `get` against each getter in order until one succeeds.
///
/// Caller cancellation is detected through `ctx.err()` only, before each
/// attempt and after each failure. A getter may return a deadline error from
/// its own internal timeout while `ctx` is still live; that counts as an
/// ordinary failure and the cascade moves on.
pub async fn cascade<'a, T, F>(
    ctx: &'a Context,
    getters: &'a [Arc<dyn Getter>],
    get: F,
) -> Result<T, GetterError>
where
    F: Fn(&'a Context, &'a dyn Getter) -> BoxFuture<'a, Result<T, GetterError>>,
{
    if getters.is_empty() {
        return Err(GetterError::NoGetters);
    }

    let mut errs = ErrorList::default();
    for (index, getter) in getters.iter().enumerate() {
        if let Some(ctx_err) = ctx.err() {
            debug!(getter = index, error = %ctx_err, "cascade: caller context done");
            return Err(ctx_err.into());
        }

        match get(ctx, getter.as_ref()).await {
            Ok(value) => {
                debug!(getter = index, failed = errs.len(), "cascade: getter succeeded");
                return Ok(value);
            }
            Err(err) => {
                if let Some(ctx_err) = ctx.err() {
                    debug!(getter = index, error = %ctx_err, "cascade: caller context done");
                    return Err(ctx_err.into());
                }

                debug!(
                    getter = index,
                    error = %err,
                    retryable = err.is_retryable(),
                    "cascade: getter failed, trying next"
                );
                errs.push(err);
            }
        }
    }

    Err(GetterError::Exhausted(errs))
}

/// A [`Getter`] that falls through an ordered list of getters.
///
/// Order is priority: put cheap local sources before network ones. Since a
/// cascade is itself a getter, cascades nest.
#[derive(Clone)]
pub struct CascadeGetter {
    getters: Arc<[Arc<dyn Getter>]>,
}

impl CascadeGetter {
    pub fn new(getters: Vec<Arc<dyn Getter>>) -> Self {
        Self {
            getters: getters.into(),
        }
    }

    pub fn getters(&self) -> &[Arc<dyn Getter>] {
        &self.getters
    }

    pub fn len(&self) -> usize {
        self.getters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.getters.is_empty()
    }
}

#[async_trait]
impl Getter for CascadeGetter {
    async fn get_share(
        &self,
        ctx: &Context,
        root: &Root,
        row: usize,
        col: usize,
    ) -> Result<Share, GetterError> {
        cascade(ctx, &self.getters, |ctx, getter| getter.get_share(ctx, root, row, col)).await
    }

    async fn get_eds(
        &self,
        ctx: &Context,
        root: &Root,
    ) -> Result<ExtendedDataSquare, GetterError> {
        cascade(ctx, &self.getters, |ctx, getter| getter.get_eds(ctx, root)).await
    }
}
