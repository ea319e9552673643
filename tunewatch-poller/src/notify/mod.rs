//! Notification delivery
//!
//! The poll loop treats delivery as an external collaborator behind the
//! [`Notifier`] trait: it hands over a decided item and learns only whether
//! the send was confirmed. The ledger/watermark commit happens strictly
//! after a confirmed send, so a failed delivery is retried next cycle.

pub mod webhook;

use async_trait::async_trait;
use thiserror::Error;
use tunewatch_common::db::{ContentKind, TrackedArtist};

use crate::fetch::ContentRecord;

pub use webhook::WebhookNotifier;

/// Delivery failure taxonomy
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No notification channel configured for (guild, platform)
    #[error("no notification channel configured for guild {guild_id} ({platform})")]
    NoChannel { guild_id: String, platform: String },

    /// The channel endpoint rejected the payload
    #[error("delivery rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Network-level send failure
    #[error("delivery network error: {0}")]
    Network(String),
}

/// Renders and delivers a notification for a decided item.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        artist: &TrackedArtist,
        kind: ContentKind,
        record: &ContentRecord,
    ) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for std::sync::Arc<T> {
    async fn notify(
        &self,
        artist: &TrackedArtist,
        kind: ContentKind,
        record: &ContentRecord,
    ) -> Result<(), DeliveryError> {
        (**self).notify(artist, kind, record).await
    }
}
