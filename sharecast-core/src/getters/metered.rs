//! Getter wrapper that records outcome and latency of every call

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use crate::context::Context;
use crate::getter::{Getter, GetterError};
use crate::metrics::{Metrics, Operation, Outcome};
use crate::share::{ExtendedDataSquare, Root, Share};

pub struct MeteredGetter {
    name: String,
    getter: Arc<dyn Getter>,
    metrics: Metrics,
}

impl MeteredGetter {
    pub fn new(name: impl Into<String>, getter: Arc<dyn Getter>, metrics: Metrics) -> Self {
        Self {
            name: name.into(),
            getter,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn observe<T>(
        &self,
        operation: Operation,
        started: Instant,
        result: &Result<T, GetterError>,
        size: impl FnOnce(&T) -> usize,
    ) {
        let elapsed = started.elapsed();
        let outcome = Outcome::of(result);
        self.metrics.record(operation, outcome, elapsed);
        if let Ok(value) = result {
            self.metrics.bytes_served(size(value));
        }

        match result {
            Ok(_) => debug!(
                getter = %self.name,
                ?operation,
                elapsed_ms = elapsed.as_millis(),
                "Getter returned data"
            ),
            Err(err) => debug!(
                getter = %self.name,
                ?operation,
                ?outcome,
                elapsed_ms = elapsed.as_millis(),
                error = %err,
                "Getter failed"
            ),
        }
    }
}

#[async_trait]
impl Getter for MeteredGetter {
    async fn get_share(
        &self,
        ctx: &Context,
        root: &Root,
        row: usize,
        col: usize,
    ) -> Result<Share, GetterError> {
        let started = Instant::now();
        let result = self.getter.get_share(ctx, root, row, col).await;
        self.observe(Operation::GetShare, started, &result, Share::len);
        result
    }

    async fn get_eds(
        &self,
        ctx: &Context,
        root: &Root,
    ) -> Result<ExtendedDataSquare, GetterError> {
        let started = Instant::now();
        let result = self.getter.get_eds(ctx, root).await;
        self.observe(Operation::GetEds, started, &result, ExtendedDataSquare::size);
        result
    }
}
