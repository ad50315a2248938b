//! Continuous position subscriptions.
//!
//! A [`PositionSource`] hands out [`PositionSubscription`]s: bounded
//! channels of fixes or errors that can be cancelled at any time. Cancelling
//! stops delivery immediately; fixes already handed to the recorder are not
//! affected.
//!
//! [`ChannelSource`] is the adapter for platforms that push fixes from a
//! callback: the platform side holds a [`PositionFeed`] and sends into
//! whatever subscription is currently open.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use walklog_types::Fix;

use crate::error::{Error, Result};

/// Why the position provider could not deliver a fix.
///
/// Each variant maps to its own user-facing message. None of them are
/// retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum PositionError {
    #[error("Location access was denied. Allow location access and start again")]
    PermissionDenied,
    #[error("Location information is unavailable")]
    Unavailable,
    #[error("Location request timed out")]
    Timeout,
    #[error("Unknown location error: {0}")]
    Unknown(String),
}

/// One item delivered by a subscription.
pub type PositionEvent = std::result::Result<Fix, PositionError>;

/// Options passed to [`PositionSource::subscribe`].
///
/// `high_accuracy`, `timeout` and `maximum_age` are hints for platform
/// providers; in-process sources may ignore them.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeOptions {
    pub high_accuracy: bool,
    /// How long the provider may take to produce a fix before reporting [`PositionError::Timeout`].
    pub timeout: Duration,
    /// Oldest cached fix the provider may return.
    pub maximum_age: Duration,
    /// Buffer size for the event channel.
    pub buffer_size: usize,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::ZERO,
            buffer_size: 16,
        }
    }
}

impl SubscribeOptions {
    #[must_use]
    pub fn high_accuracy(mut self, enabled: bool) -> Self {
        self.high_accuracy = enabled;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::InvalidConfig("buffer_size must be > 0".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be > 0".to_string()));
        }
        Ok(())
    }
}

/// A provider of continuous position updates.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Open a new subscription.
    ///
    /// Fails with [`Error::Position`] when the provider refuses outright,
    /// for example because permission was denied.
    async fn subscribe(&self, options: &SubscribeOptions) -> Result<PositionSubscription>;
}

/// An open stream of position events.
///
/// Dropping the subscription cancels it.
pub struct PositionSubscription {
    receiver: mpsc::Receiver<PositionEvent>,
    cancel_token: CancellationToken,
}

impl PositionSubscription {
    pub fn new(receiver: mpsc::Receiver<PositionEvent>) -> Self {
        Self {
            receiver,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Wait for the next event. Returns `None` once cancelled or when the source hangs up.
    pub async fn next_event(&mut self) -> Option<PositionEvent> {
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => None,
            event = self.receiver.recv() => event,
        }
    }

    /// Stop delivery. Events still buffered are discarded.
    pub fn cancel(&mut self) {
        if !self.cancel_token.is_cancelled() {
            debug!("Position subscription cancelled");
        }
        self.cancel_token.cancel();
        self.receiver.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// A token that cancels this subscription from elsewhere.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

impl Drop for PositionSubscription {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl Stream for PositionSubscription {
    type Item = PositionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel_token.is_cancelled() {
            return Poll::Ready(None);
        }
        self.receiver.poll_recv(cx)
    }
}

type SharedSender = Arc<Mutex<Option<mpsc::Sender<PositionEvent>>>>;

/// A position source fed from outside through a [`PositionFeed`].
///
/// Each call to `subscribe` replaces the previous channel. Events sent
/// while nothing is subscribed are dropped.
#[derive(Debug, Clone, Default)]
pub struct ChannelSource {
    sender: SharedSender,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle for pushing events into the current subscription.
    pub fn feed(&self) -> PositionFeed {
        PositionFeed {
            sender: Arc::clone(&self.sender),
        }
    }
}

#[async_trait]
impl PositionSource for ChannelSource {
    async fn subscribe(&self, options: &SubscribeOptions) -> Result<PositionSubscription> {
        options.validate()?;
        let (tx, rx) = mpsc::channel(options.buffer_size);
        let mut slot = self.sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(tx);
        Ok(PositionSubscription::new(rx))
    }
}

/// Sending half of a [`ChannelSource`].
#[derive(Debug, Clone)]
pub struct PositionFeed {
    sender: SharedSender,
}

impl PositionFeed {
    fn current(&self) -> Option<mpsc::Sender<PositionEvent>> {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Deliver an event. Returns `false` when no subscription is listening.
    pub async fn send(&self, event: PositionEvent) -> bool {
        match self.current() {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    pub async fn send_fix(&self, fix: Fix) -> bool {
        self.send(Ok(fix)).await
    }

    pub async fn send_error(&self, error: PositionError) -> bool {
        self.send(Err(error)).await
    }

    /// Whether a subscription is currently open.
    pub fn is_subscribed(&self) -> bool {
        self.current().is_some_and(|tx| !tx.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use time::OffsetDateTime;

    fn fix(lat: f64) -> Fix {
        Fix::new(lat, 0.0, 5.0, OffsetDateTime::UNIX_EPOCH)
    }

    #[test]
    fn test_subscribe_options_default() {
        let opts = SubscribeOptions::default();
        assert!(opts.high_accuracy);
        assert_eq!(opts.timeout, Duration::from_secs(10));
        assert_eq!(opts.buffer_size, 16);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_subscribe_options_validation() {
        assert!(SubscribeOptions::default().buffer_size(0).validate().is_err());
        assert!(
            SubscribeOptions::default()
                .timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_position_error_serialization() {
        let json = serde_json::to_value(PositionError::Unknown("x".into())).unwrap();
        assert_eq!(json["kind"], "unknown");
        assert_eq!(json["message"], "x");
        let json = serde_json::to_value(PositionError::Timeout).unwrap();
        assert_eq!(json["kind"], "timeout");
    }

    #[tokio::test]
    async fn test_feed_without_subscription_drops() {
        let source = ChannelSource::new();
        let feed = source.feed();
        assert!(!feed.is_subscribed());
        assert!(!feed.send_fix(fix(1.0)).await);
    }

    #[tokio::test]
    async fn test_feed_delivers_in_order() {
        let source = ChannelSource::new();
        let feed = source.feed();
        let mut sub = source.subscribe(&SubscribeOptions::default()).await.unwrap();

        assert!(feed.is_subscribed());
        assert!(feed.send_fix(fix(1.0)).await);
        assert!(feed.send_error(PositionError::Timeout).await);

        assert_eq!(sub.next_event().await, Some(Ok(fix(1.0))));
        assert_eq!(sub.next_event().await, Some(Err(PositionError::Timeout)));
    }

    #[tokio::test]
    async fn test_cancel_stops_delivery() {
        let source = ChannelSource::new();
        let feed = source.feed();
        let mut sub = source.subscribe(&SubscribeOptions::default()).await.unwrap();

        feed.send_fix(fix(1.0)).await;
        sub.cancel();

        assert!(sub.is_cancelled());
        assert!(sub.next_event().await.is_none());
        assert!(!feed.send_fix(fix(2.0)).await);
        assert!(!feed.is_subscribed());
    }

    #[tokio::test]
    async fn test_subscription_as_stream() {
        let source = ChannelSource::new();
        let feed = source.feed();
        let sub = source.subscribe(&SubscribeOptions::default()).await.unwrap();

        feed.send_fix(fix(1.0)).await;
        feed.send_fix(fix(2.0)).await;
        drop(feed);
        drop(source);

        let events: Vec<_> = sub.take(2).collect().await;
        assert_eq!(events.len(), 2);
    }
}
