//! Probe: explorer transaction feed
//!
//! Fetches the latest transaction page for one contract and documents:
//! - Response size and ordering (timestamps of first/last entries)
//! - Method names present on the page
//! - Where acceptBid / placeBid pairs sit relative to each other
//! - What the sale detector would announce with no watermark
//!
//! Nothing is published.

use std::collections::BTreeMap;

use anyhow::Result;
use nft_cast_bot::EXPLORER_API_BASE;
use nft_cast_bot::api::{ACCEPT_BID_METHOD, ExplorerClient, PLACE_BID_METHOD, TransactionSource};
use nft_cast_bot::engine::{Detection, detect_latest_sale, resolve_price};

/// HPUNKS floor contract
const DEFAULT_CONTRACT: &str = "0x3f6A1B1A0518C74f6E4AC1dF405d53bCa847c336";

#[tokio::main]
async fn main() -> Result<()> {
    let contract = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONTRACT.to_string());
    let client = ExplorerClient::new(reqwest::Client::new(), EXPLORER_API_BASE);

    println!("=== Probe: explorer transactions ===");
    println!("Contract: {contract}");
    println!("URL: {}", client.transactions_url(&contract));
    println!();

    let txs = client.transactions(&contract).await?;
    println!("--- 1. Page shape ---");
    println!("Transactions: {}", txs.len());
    if let (Some(first), Some(last)) = (txs.first(), txs.last()) {
        println!("  first timestamp: {:?}", first.timestamp);
        println!("  last timestamp:  {:?}", last.timestamp);
    }
    println!();

    println!("--- 2. Methods ---");
    let mut methods: BTreeMap<String, usize> = BTreeMap::new();
    for tx in &txs {
        let name = tx.method.clone().unwrap_or_else(|| "<none>".to_string());
        *methods.entry(name).or_default() += 1;
    }
    for (name, count) in &methods {
        println!("  {name}: {count}");
    }
    println!();

    println!("--- 3. acceptBid pairing ---");
    for (idx, tx) in txs.iter().enumerate() {
        if !tx.is_method(ACCEPT_BID_METHOD) {
            continue;
        }
        let next = txs
            .get(idx + 1)
            .and_then(|t| t.method.as_deref())
            .unwrap_or("<end of page>");
        let price = resolve_price(&txs, idx).map(|(p, _)| p);
        println!(
            "  [{idx}] token={} ts={:?} next={next} price={price:?}",
            tx.parameter("tokenId").unwrap_or_default(),
            tx.timestamp,
        );
        if next != PLACE_BID_METHOD {
            println!("       (no adjacent {PLACE_BID_METHOD}, would be skipped)");
        }
    }
    println!();

    println!("--- 4. Detector result (no watermark) ---");
    match detect_latest_sale(&txs, None) {
        Detection::NothingNew => println!("  nothing to announce"),
        Detection::Unpriced {
            token_id,
            timestamp,
        } => println!("  newest accept #{token_id} at {timestamp} is unpriced"),
        Detection::Sale(sale) => println!("  {sale:#?}"),
    }
    println!();

    println!("=== Probe complete ===");
    Ok(())
}
