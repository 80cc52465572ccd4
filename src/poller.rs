use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::api::TransactionSource;
use crate::engine::{Detection, detect_latest_sale};
use crate::format::{headline, sale_frame_url, sale_text};
use crate::identity::{IdentityLookup, resolve};
use crate::publish::{Publisher, publish_logged};
use crate::reporter;
use crate::state::{self, WatermarkStore};
use crate::types::{Announcement, AnnouncementRecord, EventKind, TrackedEntity};

/// Text and link settings for explorer-detected sales.
#[derive(Debug, Clone)]
pub struct SaleFormat {
    pub label: String,
    pub currency: String,
    pub frame_base_url: String,
}

/// Result of one poll for one contract.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    NothingNew,
    /// A new accept was seen but its price could not be recovered.
    Unpriced,
    PublishFailed,
    Announced(AnnouncementRecord),
}

/// Explorer polling pipeline: fetch, dedup against the watermark, enrich,
/// format, publish.
pub struct Poller<T, S, L, P> {
    source: T,
    store: S,
    lookup: L,
    publisher: P,
    format: SaleFormat,
}

impl<T, S, L, P> Poller<T, S, L, P>
where
    T: TransactionSource,
    S: WatermarkStore,
    L: IdentityLookup,
    P: Publisher,
{
    pub fn new(source: T, store: S, lookup: L, publisher: P, format: SaleFormat) -> Self {
        Self {
            source,
            store,
            lookup,
            publisher,
            format,
        }
    }

    /// One poll: announce at most the newest unseen priced sale.
    ///
    /// The watermark moves before enrichment and publishing, so a failed
    /// publish is dropped rather than retried every cycle.
    pub async fn run_cycle(&self, entity: &TrackedEntity) -> Result<CycleOutcome> {
        info!("Fetching data for {}...", entity.name);
        let txs = self
            .source
            .transactions(&entity.id)
            .await
            .with_context(|| format!("failed to fetch transactions for {}", entity.name))?;

        let watermark = self.store.read(&entity.name);
        let detection = detect_latest_sale(&txs, watermark.as_ref());
        if let Some(next) = detection.watermark() {
            state::advance(&self.store, &entity.name, &next);
        }

        let sale = match detection {
            Detection::NothingNew => return Ok(CycleOutcome::NothingNew),
            Detection::Unpriced {
                token_id,
                timestamp,
            } => {
                info!(
                    "acceptBid for {} #{token_id} at {timestamp} has no adjacent placeBid, skipping",
                    entity.name
                );
                return Ok(CycleOutcome::Unpriced);
            }
            Detection::Sale(sale) => sale,
        };

        info!(
            "New accepted bid for {}: #{} at {} (block {}) for {}",
            entity.name, sale.token_id, sale.timestamp, sale.block, sale.price
        );

        let seller = resolve(&self.lookup, &sale.seller).await;
        let buyer = resolve(&self.lookup, &sale.buyer).await;

        let head = headline(
            &self.format.label,
            &sale.token_id,
            EventKind::BidAccepted,
            sale.price,
            &self.format.currency,
        );
        let announcement = Announcement {
            text: sale_text(&head, &seller, &buyer),
            embed_url: sale_frame_url(
                &self.format.frame_base_url,
                &sale.token_id,
                &entity.name,
                sale.block,
            ),
            channel: entity.channel.clone(),
        };

        if !publish_logged(&self.publisher, &announcement).await {
            return Ok(CycleOutcome::PublishFailed);
        }

        Ok(CycleOutcome::Announced(AnnouncementRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            pipeline: "poller",
            entity: entity.name.clone(),
            kind: EventKind::BidAccepted,
            token_id: sale.token_id,
            text: announcement.text,
            embed_url: announcement.embed_url,
            channel: announcement.channel,
        }))
    }

    /// Run one cycle, reporting a publish and logging a failure.
    pub async fn poll_once(&self, entity: &TrackedEntity) {
        match self.run_cycle(entity).await {
            Ok(CycleOutcome::Announced(record)) => reporter::report_announcement(&record),
            Ok(_) => {}
            Err(e) => warn!("Poll cycle for {} failed: {e:#}", entity.name),
        }
    }

    /// Poll `entity` forever: once now, then every `period`.
    ///
    /// Cycles for one entity never overlap; a slow cycle delays the next tick.
    pub async fn watch(&self, entity: &TrackedEntity, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll_once(entity).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ExplorerTransaction;
    use crate::engine::tests::{SELLER, accept, other, place_bid};
    use crate::error::LookupError;
    use crate::publish::tests::RecordingPublisher;
    use crate::state::MemoryWatermarkStore;
    use crate::types::Watermark;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves whatever page is currently loaded, or fails when `None`.
    struct FakeSource {
        page: Mutex<Option<Vec<ExplorerTransaction>>>,
    }

    impl FakeSource {
        fn serving(txs: Vec<ExplorerTransaction>) -> Self {
            Self {
                page: Mutex::new(Some(txs)),
            }
        }

        fn load(&self, txs: Vec<ExplorerTransaction>) {
            *self.page.lock().unwrap() = Some(txs);
        }
    }

    impl TransactionSource for FakeSource {
        async fn transactions(&self, _address: &str) -> Result<Vec<ExplorerTransaction>> {
            self.page
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| anyhow::anyhow!("explorer unavailable"))
        }
    }

    struct FixedLookup(HashMap<String, String>);

    impl IdentityLookup for FixedLookup {
        async fn lookup(&self, address: &str) -> Result<Option<String>, LookupError> {
            Ok(self.0.get(address).cloned())
        }
    }

    fn entity() -> TrackedEntity {
        TrackedEntity {
            id: "0xe2b2BD6f6600c39E596fEFE2d6315F3897956b0d".into(),
            name: "hoodie".into(),
            channel: Some("ham-punks".into()),
        }
    }

    fn sale_format() -> SaleFormat {
        SaleFormat {
            label: "hpunk".into(),
            currency: "eth".into(),
            frame_base_url: "https://frame.example/api/sale".into(),
        }
    }

    fn poller(
        txs: Vec<ExplorerTransaction>,
        publisher: RecordingPublisher,
    ) -> Poller<FakeSource, MemoryWatermarkStore, FixedLookup, RecordingPublisher> {
        let lookup = FixedLookup(HashMap::from([(SELLER.to_string(), "seller".to_string())]));
        Poller::new(
            FakeSource::serving(txs),
            MemoryWatermarkStore::new(),
            lookup,
            publisher,
            sale_format(),
        )
    }

    fn sale_page() -> Vec<ExplorerTransaction> {
        vec![
            accept("42", "2024-03-05T18:22:11Z", 500),
            place_bid("1500000000000000000", "2024-03-05T18:20:00Z"),
            other("transfer", "2024-03-04T00:00:00Z"),
        ]
    }

    fn wm(s: &str) -> Watermark {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn announces_new_sale_and_advances_watermark() {
        let p = poller(sale_page(), RecordingPublisher::default());
        let outcome = p.run_cycle(&entity()).await.unwrap();
        let CycleOutcome::Announced(record) = outcome else {
            panic!("expected announcement");
        };
        assert_eq!(record.entity, "hoodie");

        let sent = p.publisher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].text,
            "hpunk #42 sold for 1.5 eth\n\nfrom: @seller\nto: 0x2222...2222"
        );
        assert_eq!(sent[0].embed_url, "https://frame.example/api/sale/42/hoodie/500");
        assert_eq!(sent[0].channel.as_deref(), Some("ham-punks"));
        assert_eq!(p.store.read("hoodie"), Some(wm("2024-03-05T18:22:11Z")));
    }

    #[tokio::test]
    async fn repeated_cycles_without_new_data_publish_nothing() {
        let p = poller(sale_page(), RecordingPublisher::default());
        p.run_cycle(&entity()).await.unwrap();
        for _ in 0..2 {
            let outcome = p.run_cycle(&entity()).await.unwrap();
            assert!(matches!(outcome, CycleOutcome::NothingNew));
        }
        assert_eq!(p.publisher.sent().len(), 1);
    }

    #[tokio::test]
    async fn only_events_newer_than_watermark_are_published() {
        let p = poller(sale_page(), RecordingPublisher::default());
        p.store.write("hoodie", &wm("2024-03-05T18:22:11Z")).unwrap();
        p.run_cycle(&entity()).await.unwrap();
        assert!(p.publisher.sent().is_empty());

        // a newer sale shows up on top of the page
        let mut page = vec![
            accept("43", "2024-03-06T09:00:00Z", 600),
            place_bid("250000000000000000", "2024-03-06T08:00:00Z"),
        ];
        page.extend(sale_page());
        p.source.load(page);
        p.run_cycle(&entity()).await.unwrap();

        let sent = p.publisher.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.starts_with("hpunk #43 sold for 0.25 eth"));
        assert_eq!(p.store.read("hoodie"), Some(wm("2024-03-06T09:00:00Z")));
    }

    #[tokio::test]
    async fn unpriced_accept_is_skipped_but_marked_seen() {
        let page = vec![
            accept("42", "2024-03-05T18:22:11Z", 500),
            other("transfer", "2024-03-05T18:21:00Z"),
            place_bid("1500000000000000000", "2024-03-05T18:20:00Z"),
        ];
        let p = poller(page, RecordingPublisher::default());
        let outcome = p.run_cycle(&entity()).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Unpriced));
        assert!(p.publisher.sent().is_empty());
        assert_eq!(p.store.read("hoodie"), Some(wm("2024-03-05T18:22:11Z")));
    }

    #[tokio::test]
    async fn failed_publish_is_not_retried() {
        let p = poller(sale_page(), RecordingPublisher::rejecting());
        let outcome = p.run_cycle(&entity()).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::PublishFailed));
        assert_eq!(p.store.read("hoodie"), Some(wm("2024-03-05T18:22:11Z")));

        p.run_cycle(&entity()).await.unwrap();
        assert_eq!(p.publisher.sent().len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_watermark_untouched() {
        let p = poller(Vec::new(), RecordingPublisher::default());
        *p.source.page.lock().unwrap() = None;
        assert!(p.run_cycle(&entity()).await.is_err());
        assert_eq!(p.store.read("hoodie"), None);
        assert!(p.publisher.sent().is_empty());
    }

    /// Reads nothing and refuses every write.
    struct ReadOnlyStore;

    impl WatermarkStore for ReadOnlyStore {
        fn read(&self, _key: &str) -> Option<Watermark> {
            None
        }

        fn write(&self, _key: &str, _watermark: &Watermark) -> Result<()> {
            anyhow::bail!("read-only filesystem")
        }
    }

    #[tokio::test]
    async fn watermark_write_failure_still_announces() {
        let lookup = FixedLookup(HashMap::new());
        let p = Poller::new(
            FakeSource::serving(sale_page()),
            ReadOnlyStore,
            lookup,
            RecordingPublisher::default(),
            sale_format(),
        );
        let CycleOutcome::Announced(record) = p.run_cycle(&entity()).await.unwrap() else {
            panic!("expected announcement");
        };
        assert_eq!(record.token_id, "42");

        let sent = p.publisher.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.starts_with("hpunk #42 sold for 1.5 eth"));
    }

    #[tokio::test]
    async fn entities_keep_separate_watermarks() {
        let p = poller(sale_page(), RecordingPublisher::default());
        let floor = TrackedEntity {
            id: "0x3f6A1B1A0518C74f6E4AC1dF405d53bCa847c336".into(),
            name: "floor".into(),
            channel: None,
        };
        p.run_cycle(&entity()).await.unwrap();
        p.run_cycle(&floor).await.unwrap();

        let sent = p.publisher.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].channel, None);
        assert_eq!(sent[1].embed_url, "https://frame.example/api/sale/42/floor/500");
    }
}
