use rust_decimal::prelude::*;
use url::Url;

use crate::types::{EventKind, ResolvedIdentity};

/// Most fractional digits shown for a price.
const MAX_FRACTION_DIGITS: u32 = 6;

/// Convert an integer minor-unit amount (e.g. wei) to the major unit.
///
/// Plain f64 division; returns `None` for anything that doesn't parse as a number.
pub fn to_major_units(raw: &str, decimals: u32) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value / 10f64.powi(i32::try_from(decimals).ok()?))
}

/// Decimal from the shortest round-trip form of `value`, so midpoints are
/// judged on the digits a reader sees rather than the binary expansion.
fn shortest_decimal(value: f64) -> Option<Decimal> {
    value
        .to_string()
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&format!("{value:e}")))
        .ok()
        .or_else(|| Decimal::from_f64_retain(value))
}

/// Format a price with at most six fractional digits, no trailing zeros and
/// comma-grouped thousands: `1.5`, `0`, `1,234.000001`.
pub fn format_price(value: f64) -> String {
    let Some(d) = shortest_decimal(value) else {
        return value.to_string();
    };
    let rounded = d
        .round_dp_with_strategy(MAX_FRACTION_DIGITS, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let plain = rounded.abs().to_string();
    let (int_part, frac_part) = match plain.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (plain.as_str(), None),
    };

    let mut out = String::with_capacity(plain.len() + plain.len() / 3 + 1);
    if negative {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// First line of every announcement: `hpunk #12 sold for 1.5 eth`.
pub fn headline(label: &str, token_id: &str, kind: EventKind, price: f64, currency: &str) -> String {
    format!(
        "{label} #{token_id} {} {} {currency}",
        kind.verb(),
        format_price(price)
    )
}

pub fn sale_text(headline: &str, from: &ResolvedIdentity, to: &ResolvedIdentity) -> String {
    format!(
        "{headline}\n\nfrom: {}\nto: {}",
        from.display(),
        to.display()
    )
}

pub fn listing_text(headline: &str, by: Option<&ResolvedIdentity>) -> String {
    match by {
        Some(maker) => format!("{headline}\n\nby: {}", maker.display()),
        None => headline.to_string(),
    }
}

/// Sale frame for an explorer-detected sale: `<base>/<token>/<entity>/<block>`.
pub fn sale_frame_url(base: &str, token_id: &str, entity_name: &str, block: u64) -> String {
    format!(
        "{}/{token_id}/{entity_name}/{block}",
        base.trim_end_matches('/')
    )
}

/// Dynamic frame for a streamed event: `<base>?contractAddress=..&tokenId=..`.
pub fn dynamic_frame_url(
    base: &str,
    contract_address: &str,
    token_id: &str,
) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut()
        .append_pair("contractAddress", contract_address)
        .append_pair("tokenId", token_id);
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_zeros() {
        assert_eq!(format_price(1.5), "1.5");
        assert_eq!(format_price(0.0), "0");
        assert_eq!(format_price(2.0), "2");
        assert_eq!(format_price(0.1), "0.1");
    }

    #[test]
    fn caps_fraction_at_six_digits() {
        assert_eq!(format_price(0.123456789), "0.123457");
        assert_eq!(format_price(0.0000001), "0");
    }

    #[test]
    fn midpoints_round_away_from_zero_on_visible_digits() {
        assert_eq!(format_price(1.2345675), "1.234568");
        assert_eq!(format_price(5e-7), "0.000001");
        assert_eq!(format_price(2.0000005), "2.000001");
        assert_eq!(format_price(0.1234565), "0.123457");
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(format_price(1234.5), "1,234.5");
        assert_eq!(format_price(1234567.0), "1,234,567");
        assert_eq!(format_price(999.0), "999");
        assert_eq!(format_price(-1000.25), "-1,000.25");
    }

    #[test]
    fn wei_conversion_is_float_division() {
        assert_eq!(to_major_units("1500000000000000000", 18), Some(1.5));
        assert_eq!(to_major_units("0", 18), Some(0.0));
        assert_eq!(to_major_units("2500000", 6), Some(2.5));
        assert_eq!(to_major_units("0x10", 18), None);
        assert_eq!(to_major_units("", 18), None);
        // exponent out of range for the float power
        assert_eq!(to_major_units("1", u32::MAX), None);
    }

    #[test]
    fn headline_and_parties() {
        let h = headline("hpunk", "42", EventKind::BidAccepted, 1.5, "eth");
        assert_eq!(h, "hpunk #42 sold for 1.5 eth");

        let from = ResolvedIdentity {
            address: "0x1234567890abcdef1234567890abcdef12345678".into(),
            handle: Some("alice".into()),
        };
        let to = ResolvedIdentity::unresolved("0xabcdef1234567890abcdef1234567890abcd9999");
        assert_eq!(
            sale_text(&h, &from, &to),
            "hpunk #42 sold for 1.5 eth\n\nfrom: @alice\nto: 0xabcd...9999"
        );
    }

    #[test]
    fn listing_without_maker_is_headline_only() {
        let h = headline("Swatches", "7", EventKind::ItemListed, 0.05, "ETH");
        assert_eq!(listing_text(&h, None), "Swatches #7 listed for 0.05 ETH");
    }

    #[test]
    fn frame_urls() {
        assert_eq!(
            sale_frame_url("https://frame.example/api/sale/", "42", "hoodie", 1234),
            "https://frame.example/api/sale/42/hoodie/1234"
        );
        assert_eq!(
            dynamic_frame_url("https://frame.example/api/dynamic-frame", "0xabc", "7").unwrap(),
            "https://frame.example/api/dynamic-frame?contractAddress=0xabc&tokenId=7"
        );
    }
}
