use crate::error::FeedError;
use crate::models::event::NewEvent;
use crate::models::feed::FeedCollection;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Source of the current upstream disaster events.
pub trait DisasterFeed: Sync {
    fn fetch_events(&self) -> impl Future<Output = Result<Vec<NewEvent>, FeedError>> + Send;
}

impl<T: DisasterFeed + Send> DisasterFeed for Arc<T> {
    async fn fetch_events(&self) -> Result<Vec<NewEvent>, FeedError> {
        DisasterFeed::fetch_events(&**self).await
    }
}

#[derive(Debug, Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    url: String,
}

impl FeedClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl DisasterFeed for FeedClient {
    async fn fetch_events(&self) -> Result<Vec<NewEvent>, FeedError> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        let collection: FeedCollection = serde_json::from_slice(&bytes)?;
        let total = collection.features.len();
        let events = collection.into_new_events(Utc::now());

        info!(
            "Fetched {} events from feed ({} features, {} dropped)",
            events.len(),
            total,
            total - events.len()
        );
        Ok(events)
    }
}
