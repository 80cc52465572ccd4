use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::format::{dynamic_frame_url, headline, listing_text, sale_text, to_major_units};
use crate::identity::{IdentityLookup, resolve};
use crate::publish::{Publisher, publish_logged};
use crate::stream::StreamEvent;
use crate::types::{Announcement, AnnouncementRecord, EventKind, ResolvedIdentity, TrackedEntity};

/// Turns streamed sale/listing events into casts.
///
/// Every push is treated as new; there is no watermark on this path.
pub struct StreamAnnouncer<L, P> {
    lookup: L,
    publisher: P,
    entity: TrackedEntity,
    contract_address: String,
    frame_base_url: String,
}

impl<L: IdentityLookup, P: Publisher> StreamAnnouncer<L, P> {
    pub fn new(
        lookup: L,
        publisher: P,
        entity: TrackedEntity,
        contract_address: String,
        frame_base_url: String,
    ) -> Self {
        Self {
            lookup,
            publisher,
            entity,
            contract_address,
            frame_base_url,
        }
    }

    async fn identity(&self, address: Option<&str>) -> Option<ResolvedIdentity> {
        match address {
            Some(addr) => Some(resolve(&self.lookup, addr).await),
            None => None,
        }
    }

    /// Build the announcement for one event, resolving the parties involved.
    pub async fn compose(&self, event: &StreamEvent) -> Result<(EventKind, String, Announcement)> {
        let token_id = event
            .token_id()
            .with_context(|| format!("unusable nft_id {:?}", event.item().nft_id))?
            .to_string();

        let (kind, raw_price, token) = match event {
            StreamEvent::ItemSold(e) => (EventKind::ItemSold, &e.sale_price, &e.payment_token),
            StreamEvent::ItemListed(e) => (EventKind::ItemListed, &e.base_price, &e.payment_token),
        };
        let price = to_major_units(raw_price, token.decimals)
            .with_context(|| format!("unusable price {raw_price:?}"))?;
        let head = headline(&self.entity.name, &token_id, kind, price, &token.symbol);

        let text = match event {
            StreamEvent::ItemSold(e) => {
                let from = self.identity(e.maker.as_ref().map(|a| a.address.as_str())).await;
                let to = self.identity(e.taker.as_ref().map(|a| a.address.as_str())).await;
                match (from, to) {
                    (Some(from), Some(to)) => sale_text(&head, &from, &to),
                    _ => head,
                }
            }
            StreamEvent::ItemListed(e) => {
                let by = self.identity(e.maker.as_ref().map(|a| a.address.as_str())).await;
                listing_text(&head, by.as_ref())
            }
        };

        let embed_url = dynamic_frame_url(&self.frame_base_url, &self.contract_address, &token_id)
            .context("invalid frame base url")?;

        Ok((
            kind,
            token_id,
            Announcement {
                text,
                embed_url,
                channel: self.entity.channel.clone(),
            },
        ))
    }

    /// Compose and publish one event. Returns the record when a cast went out.
    pub async fn handle(&self, event: StreamEvent) -> Option<AnnouncementRecord> {
        let (kind, token_id, announcement) = match self.compose(&event).await {
            Ok(composed) => composed,
            Err(e) => {
                warn!("Skipping {} event: {e:#}", self.entity.id);
                return None;
            }
        };
        info!("{} #{token_id}: {}", self.entity.name, kind.label());

        if !publish_logged(&self.publisher, &announcement).await {
            return None;
        }
        Some(AnnouncementRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            pipeline: "streamer",
            entity: self.entity.name.clone(),
            kind,
            token_id,
            text: announcement.text,
            embed_url: announcement.embed_url,
            channel: announcement.channel,
        })
    }
}
