//! Watch session for one named resource, hiding cursor expiry and stream end.

use std::time::Duration;

use futures::StreamExt;
use metrics::counter;
use settle_core::{ControlPlane, EventStream, ObjectMeta, WatchEvent, WatchTarget};
use tracing::{debug, info, warn};

use crate::error::WaitError;

/// Ordered event source for a single resource.
///
/// The underlying stream is owned by the session and released when the session is
/// dropped, so every exit path of a wait closes it.
pub struct WatchSession<'a> {
    api: &'a dyn ControlPlane,
    target: &'a WatchTarget,
    stream: Option<EventStream>,
    resource_version: String,
    restarts: u32,
    backoff: Backoff,
}

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Doubling delay between reopens of streams that end without delivering anything.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    fn new(max: Duration) -> Self {
        Self { next: INITIAL_BACKOFF.min(max), max }
    }

    fn step(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.next = INITIAL_BACKOFF.min(self.max);
    }
}

impl<'a> WatchSession<'a> {
    /// Open a watch starting after `resource_version`. Streams that end are reopened
    /// after a delay that doubles up to `backoff_max` and resets once an event arrives.
    pub async fn open(
        api: &'a dyn ControlPlane,
        target: &'a WatchTarget,
        resource_version: &str,
        backoff_max: Duration,
    ) -> Result<Self, WaitError> {
        let mut session = Self {
            api,
            target,
            stream: None,
            resource_version: resource_version.to_string(),
            restarts: 0,
            backoff: Backoff::new(backoff_max),
        };
        session.reopen().await?;
        info!(kind = %target.kind(), ns = ?target.namespace(), name = %target.name(), rv = %resource_version, "watch session opened");
        Ok(session)
    }

    pub fn resource_version(&self) -> &str {
        &self.resource_version
    }

    /// Number of transparent restarts (cursor expiry or stream end).
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Next event in delivery order.
    ///
    /// An `ERROR` event for an expired cursor closes the stream, re-fetches the object
    /// and opens a fresh watch from its resource version; the re-fetched object is
    /// returned as a `Modified` event so nothing that happened in the gap is missed.
    /// Any other `ERROR` event or transport failure is returned as an error.
    pub async fn next(&mut self) -> Result<WatchEvent, WaitError> {
        loop {
            if self.stream.is_none() {
                self.reopen().await?;
            }
            let Some(stream) = self.stream.as_mut() else { continue };
            let item = stream.next().await;
            match item {
                Some(Ok(WatchEvent::Error(status))) if status.is_expired() => {
                    warn!(name = %self.target.name(), rv = %self.resource_version, message = %status.message, "watch cursor expired; re-fetching");
                    return self.rebaseline().await;
                }
                Some(Ok(WatchEvent::Error(status))) => return Err(WaitError::watch_status(self.target, status)),
                Some(Ok(event)) => {
                    self.backoff.reset();
                    self.track(&event);
                    return Ok(event);
                }
                Some(Err(e)) => return Err(WaitError::api(self.target, e)),
                None => {
                    self.stream = None;
                    self.restarts += 1;
                    counter!("watch_restarts", 1u64, "cause" => "ended");
                    let delay = self.backoff.step();
                    debug!(name = %self.target.name(), rv = %self.resource_version, delay_ms = delay.as_millis() as u64, "watch stream ended; reopening");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn rebaseline(&mut self) -> Result<WatchEvent, WaitError> {
        self.stream = None;
        let object = self.api.get(self.target.key()).await.map_err(|e| WaitError::api(self.target, e))?;
        let meta = ObjectMeta::of(&object).map_err(|e| WaitError::decode(self.target, e))?;
        self.resource_version = meta.resource_version_or_latest().to_string();
        self.restarts += 1;
        counter!("watch_restarts", 1u64, "cause" => "expired");
        self.reopen().await?;
        Ok(WatchEvent::Modified(object))
    }

    async fn reopen(&mut self) -> Result<(), WaitError> {
        let stream = self
            .api
            .watch(self.target.key(), &self.resource_version)
            .await
            .map_err(|e| WaitError::api(self.target, e))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn track(&mut self, event: &WatchEvent) {
        let rv = event.object().and_then(|o| ObjectMeta::of(o).ok()).and_then(|m| m.resource_version);
        if let Some(rv) = rv {
            self.resource_version = rv;
        }
    }
}

impl Drop for WatchSession<'_> {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            debug!(name = %self.target.name(), restarts = self.restarts, "watch session closed");
        }
    }
}
