use std::future::Future;

use tracing::{info, warn};

use crate::error::PublishError;
use crate::types::Announcement;

/// Sink for composed announcements.
pub trait Publisher: Send + Sync {
    fn publish(
        &self,
        announcement: &Announcement,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// Publish and swallow the error: the announcement is dropped on failure.
///
/// API-shaped errors are logged with their structured body, anything else raw.
pub async fn publish_logged<P: Publisher>(publisher: &P, announcement: &Announcement) -> bool {
    match publisher.publish(announcement).await {
        Ok(()) => {
            info!("Cast published successfully");
            true
        }
        Err(PublishError::Api { status, body }) => {
            let body = serde_json::to_string(&body).unwrap_or_default();
            warn!("Cast rejected by posting API ({status}): {body}");
            false
        }
        Err(e) => {
            warn!("Failed to publish cast: {e:?}");
            false
        }
    }
}

/// Logs announcements instead of posting them (`--dry-run`).
pub struct DryRunPublisher;

impl Publisher for DryRunPublisher {
    async fn publish(&self, announcement: &Announcement) -> Result<(), PublishError> {
        info!(
            "[dry-run] would cast (channel={:?}, embed={}):\n{}",
            announcement.channel, announcement.embed_url, announcement.text
        );
        Ok(())
    }
}
