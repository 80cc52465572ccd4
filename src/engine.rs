use tracing::warn;

use crate::api::{ACCEPT_BID_METHOD, ExplorerTransaction, PLACE_BID_METHOD};
use crate::format::to_major_units;
use crate::types::Watermark;

/// How many entries after an accept are searched for the bid that priced it.
const PRICE_LOOKAHEAD: usize = 1;

/// Decimals of the chain's native currency.
const NATIVE_DECIMALS: u32 = 18;

/// An accepted bid whose sale price could be recovered.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedSale {
    pub token_id: String,
    pub timestamp: Watermark,
    pub block: u64,
    pub tx_hash: Option<String>,
    /// Address that accepted the bid.
    pub seller: String,
    /// Address that placed the bid.
    pub buyer: String,
    pub price: f64,
}

/// Outcome of scanning one transaction page against a watermark.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    NothingNew,
    /// A new accept whose counterpart bid was not where expected. The
    /// watermark still moves past it; nothing is announced.
    Unpriced { token_id: String, timestamp: Watermark },
    Sale(AcceptedSale),
}

impl Detection {
    /// The watermark this detection should be persisted as, if any.
    pub fn watermark(&self) -> Option<Watermark> {
        match self {
            Detection::NothingNew => None,
            Detection::Unpriced { timestamp, .. } => Some(*timestamp),
            Detection::Sale(sale) => Some(sale.timestamp),
        }
    }
}

/// Find the most recent confirmed `acceptBid` newer than `watermark`.
///
/// `txs` must be newest first, as the explorer returns them. Only one event is
/// reported per page; older unseen accepts are dropped, not backfilled.
pub fn detect_latest_sale(txs: &[ExplorerTransaction], watermark: Option<&Watermark>) -> Detection {
    for (idx, tx) in txs.iter().enumerate() {
        if !tx.is_method(ACCEPT_BID_METHOD) {
            continue;
        }
        let (Some(at), Some(block)) = (tx.timestamp, tx.block()) else {
            continue;
        };
        let timestamp = Watermark::from(at);
        if watermark.is_some_and(|w| timestamp <= *w) {
            continue;
        }
        let Some(token_id) = tx.parameter("tokenId") else {
            warn!(
                "acceptBid {} has no tokenId parameter, skipping",
                tx.hash.as_deref().unwrap_or("?")
            );
            continue;
        };

        return match resolve_price(txs, idx) {
            Some((price, bid)) => Detection::Sale(AcceptedSale {
                token_id,
                timestamp,
                block,
                tx_hash: tx.hash.clone(),
                seller: tx.from.hash.clone(),
                buyer: bid.from.hash.clone(),
                price,
            }),
            None => Detection::Unpriced { token_id, timestamp },
        };
    }
    Detection::NothingNew
}

/// Recover the sale price of the accept at `accept_idx` from the `placeBid`
/// that follows it in the page (the bid placed just before it).
///
/// The bid is matched by method only; its token id is not compared.
pub fn resolve_price(
    txs: &[ExplorerTransaction],
    accept_idx: usize,
) -> Option<(f64, &ExplorerTransaction)> {
    let bid = txs
        .iter()
        .skip(accept_idx + 1)
        .take(PRICE_LOOKAHEAD)
        .find(|t| t.is_method(PLACE_BID_METHOD))?;
    let price = to_major_units(bid.value.as_deref()?, NATIVE_DECIMALS)?;
    Some((price, bid))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) const SELLER: &str = "0x1111111111111111111111111111111111111111";
    pub(crate) const BUYER: &str = "0x2222222222222222222222222222222222222222";

    pub(crate) fn accept(token: &str, ts: &str, block: u64) -> ExplorerTransaction {
        serde_json::from_value(json!({
            "hash": format!("0xaccept{token}"),
            "method": "acceptBid",
            "timestamp": ts,
            "block": block,
            "value": "0",
            "from": { "hash": SELLER },
            "decoded_input": { "parameters": [ { "name": "tokenId", "value": token } ] }
        }))
        .unwrap()
    }

    pub(crate) fn place_bid(wei: &str, ts: &str) -> ExplorerTransaction {
        serde_json::from_value(json!({
            "method": "placeBid",
            "timestamp": ts,
            "block": 1,
            "value": wei,
            "from": { "hash": BUYER }
        }))
        .unwrap()
    }

    pub(crate) fn other(method: &str, ts: &str) -> ExplorerTransaction {
        serde_json::from_value(json!({
            "method": method,
            "timestamp": ts,
            "block": 1,
            "value": "0",
            "from": { "hash": SELLER }
        }))
        .unwrap()
    }

    fn wm(s: &str) -> Watermark {
        s.parse().unwrap()
    }

    #[test]
    fn priced_sale_from_following_bid() {
        let txs = vec![
            accept("42", "2024-03-05T18:22:11Z", 500),
            place_bid("1500000000000000000", "2024-03-05T18:20:00Z"),
        ];
        match detect_latest_sale(&txs, None) {
            Detection::Sale(sale) => {
                assert_eq!(sale.token_id, "42");
                assert_eq!(sale.block, 500);
                assert_eq!(sale.price, 1.5);
                assert_eq!(sale.seller, SELLER);
                assert_eq!(sale.buyer, BUYER);
                assert_eq!(sale.timestamp, wm("2024-03-05T18:22:11Z"));
            }
            other => panic!("expected sale, got {other:?}"),
        }
    }

    #[test]
    fn price_is_plain_float_division() {
        let txs = vec![
            accept("1", "2024-03-05T18:22:11Z", 1),
            place_bid("123456789012345678", "2024-03-05T18:20:00Z"),
        ];
        let Detection::Sale(sale) = detect_latest_sale(&txs, None) else {
            panic!("expected sale");
        };
        assert_eq!(sale.price, 123456789012345678f64 / 1e18);
    }

    #[test]
    fn events_at_or_before_watermark_are_ignored() {
        let txs = vec![
            accept("42", "2024-03-05T18:22:11Z", 500),
            place_bid("1000000000000000000", "2024-03-05T18:20:00Z"),
        ];
        let same = wm("2024-03-05T18:22:11Z");
        let later = wm("2024-03-06T00:00:00Z");
        assert_eq!(detect_latest_sale(&txs, Some(&same)), Detection::NothingNew);
        assert_eq!(detect_latest_sale(&txs, Some(&later)), Detection::NothingNew);
    }

    #[test]
    fn newest_unseen_accept_wins() {
        let txs = vec![
            accept("9", "2024-03-07T00:00:00Z", 700),
            place_bid("2000000000000000000", "2024-03-06T23:00:00Z"),
            accept("8", "2024-03-06T00:00:00Z", 600),
            place_bid("1000000000000000000", "2024-03-05T23:00:00Z"),
        ];
        let Detection::Sale(sale) = detect_latest_sale(&txs, Some(&wm("2024-03-01T00:00:00Z")))
        else {
            panic!("expected sale");
        };
        assert_eq!(sale.token_id, "9");
        assert_eq!(sale.price, 2.0);
    }

    #[test]
    fn accept_without_adjacent_bid_is_unpriced() {
        // counterpart sits two entries away, outside the lookahead window
        let txs = vec![
            accept("42", "2024-03-05T18:22:11Z", 500),
            other("transfer", "2024-03-05T18:21:00Z"),
            place_bid("1000000000000000000", "2024-03-05T18:20:00Z"),
        ];
        let detection = detect_latest_sale(&txs, None);
        assert_eq!(
            detection,
            Detection::Unpriced {
                token_id: "42".into(),
                timestamp: wm("2024-03-05T18:22:11Z"),
            }
        );
        assert_eq!(detection.watermark(), Some(wm("2024-03-05T18:22:11Z")));

        // accept at the end of the page has no counterpart at all
        let txs = vec![accept("43", "2024-03-05T18:22:11Z", 500)];
        assert!(matches!(
            detect_latest_sale(&txs, None),
            Detection::Unpriced { .. }
        ));
    }

    #[test]
    fn bid_with_unparsable_value_is_unpriced() {
        let txs = vec![
            accept("42", "2024-03-05T18:22:11Z", 500),
            place_bid("lots", "2024-03-05T18:20:00Z"),
        ];
        assert!(matches!(
            detect_latest_sale(&txs, None),
            Detection::Unpriced { .. }
        ));
    }

    #[test]
    fn pending_and_unrelated_transactions_are_skipped() {
        let pending: ExplorerTransaction = serde_json::from_value(json!({
            "method": "acceptBid",
            "timestamp": null,
            "block": null,
            "from": { "hash": SELLER },
            "decoded_input": { "parameters": [ { "name": "tokenId", "value": "1" } ] }
        }))
        .unwrap();
        let txs = vec![
            pending,
            other("setApprovalForAll", "2024-03-05T18:23:00Z"),
            place_bid("1000000000000000000", "2024-03-05T18:20:00Z"),
        ];
        assert_eq!(detect_latest_sale(&txs, None), Detection::NothingNew);
    }

    #[test]
    fn accept_without_token_id_is_skipped() {
        let bare: ExplorerTransaction = serde_json::from_value(json!({
            "method": "acceptBid",
            "timestamp": "2024-03-08T00:00:00Z",
            "block": 800,
            "from": { "hash": SELLER }
        }))
        .unwrap();
        let txs = vec![
            bare,
            accept("5", "2024-03-07T00:00:00Z", 700),
            place_bid("1000000000000000000", "2024-03-06T00:00:00Z"),
        ];
        let Detection::Sale(sale) = detect_latest_sale(&txs, None) else {
            panic!("expected sale");
        };
        assert_eq!(sale.token_id, "5");
    }

    #[test]
    fn empty_page_has_nothing_new() {
        assert_eq!(detect_latest_sale(&[], None), Detection::NothingNew);
        assert_eq!(Detection::NothingNew.watermark(), None);
    }
}
