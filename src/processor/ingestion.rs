//! Ingestion cycle: replace the stored event set with the current feed and
//! hand the result to the dispatcher.

use crate::db::store::{EventStore, EventWriter, UserStore};
use crate::error::IngestError;
use crate::feed::DisasterFeed;
use crate::processor::dispatcher::NotificationDispatcher;
use crate::push::PushGateway;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// A notification pass over whatever the store currently holds. Runs after
/// a successful ingestion, and from the scheduler when a cycle fails.
pub trait DispatchTrigger {
    fn trigger(&self) -> impl Future<Output = ()>;
}

impl<T: DispatchTrigger> DispatchTrigger for Arc<T> {
    async fn trigger(&self) {
        DispatchTrigger::trigger(&**self).await
    }
}

impl<E, U, P> DispatchTrigger for NotificationDispatcher<E, U, P>
where
    E: EventStore,
    U: UserStore,
    P: PushGateway,
{
    async fn trigger(&self) {
        self.run().await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub fetched: usize,
    pub deleted: Option<u64>,
    pub inserted: u64,
}

pub struct Ingestor<F, W, D> {
    feed: F,
    writer: W,
    trigger: D,
}

impl<F, W, D> Ingestor<F, W, D>
where
    F: DisasterFeed,
    W: EventWriter,
    D: DispatchTrigger,
{
    pub fn new(feed: F, writer: W, trigger: D) -> Self {
        Self {
            feed,
            writer,
            trigger,
        }
    }

    /// Fetch, delete everything stored, insert the fresh set, then dispatch.
    /// A feed failure leaves the store untouched. A delete failure is logged
    /// and insertion goes ahead. An insert failure skips the dispatch.
    pub async fn ingest_cycle(&self) -> Result<IngestSummary, IngestError> {
        let fresh = self.feed.fetch_events().await?;

        let deleted = match self.writer.delete_all().await {
            Ok(n) => {
                info!("Deleted {} stale events", n);
                Some(n)
            }
            Err(e) => {
                warn!("Failed to delete stale events, inserting anyway: {}", e);
                None
            }
        };

        let inserted = self
            .writer
            .insert_all(&fresh)
            .await
            .map_err(IngestError::Insert)?;
        info!("Inserted {} events", inserted);

        self.trigger.trigger().await;

        Ok(IngestSummary {
            fetched: fresh.len(),
            deleted,
            inserted,
        })
    }
}
