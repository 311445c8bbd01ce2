//! Turns published failures into replacement searches.
//!
//! [`RedownloadListener`] sits on the receiving end of a
//! [`ChannelPublisher`](crate::tracking::ChannelPublisher) and forwards a
//! [`SearchRequest`] to a [`SearchTrigger`] for every failure that should be
//! retried.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::tracking::DownloadFailedEvent;

/// A search for replacement releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub artist_id: i64,
    pub album_ids: Vec<i64>,
    /// Release title that failed, for display.
    pub failed_release: String,
}

/// The search could not be started.
#[derive(Debug, Clone, Error)]
#[error("failed to start search: {0}")]
pub struct SearchTriggerError(pub String);

/// Starts searches on behalf of the listener.
#[async_trait]
pub trait SearchTrigger: Send + Sync {
    /// # Errors
    ///
    /// Returns [`SearchTriggerError`] when the search cannot be queued.
    async fn trigger(&self, request: SearchRequest) -> Result<(), SearchTriggerError>;
}

/// Decides whether a failure warrants a replacement search.
///
/// Manually declared failures that opted out, and every failure when
/// automatic redownload is off, yield `None`.
#[must_use]
pub fn plan_redownload(event: &DownloadFailedEvent, auto_redownload: bool) -> Option<SearchRequest> {
    if event.skip_redownload {
        debug!(source_title = %event.source_title, "redownload skipped by request");
        return None;
    }
    if !auto_redownload {
        debug!(source_title = %event.source_title, "automatic redownload disabled");
        return None;
    }
    if event.album_ids.is_empty() {
        return None;
    }

    Some(SearchRequest {
        artist_id: event.artist_id,
        album_ids: event.album_ids.clone(),
        failed_release: event.source_title.clone(),
    })
}

/// Drains failure events and triggers replacement searches.
pub struct RedownloadListener {
    events: mpsc::UnboundedReceiver<DownloadFailedEvent>,
    trigger: Arc<dyn SearchTrigger>,
    auto_redownload: bool,
}

impl RedownloadListener {
    #[must_use]
    pub fn new(
        events: mpsc::UnboundedReceiver<DownloadFailedEvent>,
        trigger: Arc<dyn SearchTrigger>,
        auto_redownload: bool,
    ) -> Self {
        Self {
            events,
            trigger,
            auto_redownload,
        }
    }

    /// Runs until every publisher is dropped; returns the number of searches
    /// started. Trigger failures are logged and do not stop the loop.
    #[instrument(skip(self), fields(auto_redownload = self.auto_redownload))]
    pub async fn run(mut self) -> usize {
        let mut started = 0;
        while let Some(event) = self.events.recv().await {
            let Some(request) = plan_redownload(&event, self.auto_redownload) else {
                continue;
            };
            let albums = request.album_ids.len();
            match self.trigger.trigger(request).await {
                Ok(()) => {
                    started += 1;
                    info!(artist_id = event.artist_id, albums, "replacement search started");
                }
                Err(error) => warn!(
                    artist_id = event.artist_id,
                    error = %error,
                    "replacement search failed to start"
                ),
            }
        }
        started
    }
}
