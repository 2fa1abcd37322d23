//! Kraken book checksum.
//!
//! The exchange digest is a CRC-32 over the top ten asks (ascending) followed
//! by the top ten bids (descending). Each level contributes its price string
//! then its quantity rendered with eight decimals, both with the decimal
//! point removed and leading zeros trimmed.

use rust_decimal::Decimal;

/// Number of levels per side that enter the digest.
pub const CHECKSUM_LEVELS: usize = 10;

/// Computes the CRC-32 digest over levels given in book order.
///
/// `asks` must iterate best (lowest) first and `bids` best (highest) first.
/// Only the first [`CHECKSUM_LEVELS`] of each are consumed.
pub fn book_checksum<'a, A, B>(asks: A, bids: B) -> u32
where
    A: IntoIterator<Item = (&'a Decimal, &'a Decimal)>,
    B: IntoIterator<Item = (&'a Decimal, &'a Decimal)>,
{
    let mut payload = String::with_capacity(CHECKSUM_LEVELS * 2 * 24);
    for (price, qty) in asks.into_iter().take(CHECKSUM_LEVELS) {
        push_level(&mut payload, price, qty);
    }
    for (price, qty) in bids.into_iter().take(CHECKSUM_LEVELS) {
        push_level(&mut payload, price, qty);
    }
    crc32fast::hash(payload.as_bytes())
}

fn push_level(payload: &mut String, price: &Decimal, qty: &Decimal) {
    push_digits(payload, &price.to_string());
    push_digits(payload, &format!("{qty:.8}"));
}

fn push_digits(payload: &mut String, rendered: &str) {
    let digits: String = rendered.chars().filter(|c| *c != '.').collect();
    payload.push_str(digits.trim_start_matches('0'));
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn level_rendering_strips_points_and_leading_zeros() {
        let mut out = String::new();
        push_level(&mut out, &dec!(0.05005), &dec!(0.5));
        assert_eq!(out, "500550000000");
    }

    #[test]
    fn quantity_is_padded_to_eight_decimals() {
        let mut out = String::new();
        push_level(&mut out, &dec!(101.0), &dec!(7));
        assert_eq!(out, "1010700000000");
    }

    #[test]
    fn only_top_ten_levels_count() {
        let asks: Vec<(Decimal, Decimal)> = (1..=12)
            .map(|i| (Decimal::from(100 + i), dec!(1)))
            .collect();
        let bids: Vec<(Decimal, Decimal)> =
            (1..=12).map(|i| (Decimal::from(100 - i), dec!(1))).collect();

        let full = book_checksum(
            asks.iter().map(|(p, q)| (p, q)),
            bids.iter().map(|(p, q)| (p, q)),
        );
        let top = book_checksum(
            asks[..10].iter().map(|(p, q)| (p, q)),
            bids[..10].iter().map(|(p, q)| (p, q)),
        );
        assert_eq!(full, top);
    }
}
