//! Getter backed by peer exchange
//!
//! Requests go out over a channel to whatever network layer serves peers;
//! responses come back through [`PendingRequests::complete`]. Each request
//! is bounded by the getter's own timeout, independent of the caller's
//! context, so a slow peer fails this source without failing the caller.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::context::{Context, ContextError};
use crate::getter::{check_bounds, Getter, GetterError};
use crate::pending::{Payload, PendingRequests, RequestKey};
use crate::share::{ExtendedDataSquare, Root, Share};

/// Default bound on a single peer request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A request for the network layer to fetch from peers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeRequest {
    pub key: RequestKey,
}

pub struct ExchangeGetter {
    requests: mpsc::Sender<ExchangeRequest>,
    pending: PendingRequests,
    request_timeout: Duration,
}

impl ExchangeGetter {
    pub fn new(
        requests: mpsc::Sender<ExchangeRequest>,
        pending: PendingRequests,
        request_timeout: Duration,
    ) -> Self {
        Self {
            requests,
            pending,
            request_timeout,
        }
    }

    /// Handle for the network layer to deliver responses
    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    async fn request(&self, ctx: &Context, key: RequestKey) -> Result<Payload, GetterError> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }

        let (receiver, created) = self.pending.add_pending(key);
        let sent = AtomicBool::new(!created);

        // Queueing counts against the same deadline as waiting for the answer
        let exchange = async {
            if created {
                debug!(?key, "Requesting from peers");
                if self.requests.send(ExchangeRequest { key }).await.is_err() {
                    return Err(GetterError::Exchange("request channel closed".into()));
                }
                sent.store(true, Ordering::Relaxed);
            }
            receiver
                .await
                .map_err(|_| GetterError::Exchange("request dropped".into()))
        };

        let result = tokio::select! {
            err = ctx.done() => Err(err.into()),
            response = tokio::time::timeout(self.request_timeout, exchange) => match response {
                Ok(Ok(payload)) => return Ok(payload),
                Ok(Err(err)) => Err(err),
                Err(_) => {
                    debug!(?key, timeout_ms = self.request_timeout.as_millis(), "Peer request timed out");
                    Err(ContextError::DeadlineExceeded.into())
                }
            },
        };

        if sent.load(Ordering::Relaxed) {
            // The receiver is gone by now; let other waiters keep the entry alive
            self.pending.abandon(&key);
        } else {
            // Never reached the network layer, so nobody will answer it
            self.pending.cancel(&key);
        }
        result
    }
}

#[async_trait]
impl Getter for ExchangeGetter {
    async fn get_share(
        &self,
        ctx: &Context,
        root: &Root,
        row: usize,
        col: usize,
    ) -> Result<Share, GetterError> {
        check_bounds(root, row, col)?;

        let key = RequestKey::Share {
            root: root.hash(),
            row,
            col,
        };
        match self.request(ctx, key).await? {
            Payload::Share(share) => Ok(share),
            Payload::Square(_) => Err(GetterError::Exchange(
                "peer answered share request with a square".into(),
            )),
        }
    }

    async fn get_eds(
        &self,
        ctx: &Context,
        root: &Root,
    ) -> Result<ExtendedDataSquare, GetterError> {
        let key = RequestKey::Square(root.hash());
        let eds = match self.request(ctx, key).await? {
            Payload::Square(eds) => eds,
            Payload::Share(_) => {
                return Err(GetterError::Exchange(
                    "peer answered square request with a share".into(),
                ))
            }
        };

        if eds.root() != *root {
            warn!(root = %root.hash(), "Peer returned a square for a different root");
            return Err(GetterError::Exchange("root mismatch".into()));
        }
        Ok(eds)
    }
}
