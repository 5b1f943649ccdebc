// src/pricing/offer_analyzer.rs
//! Turns a raw competing-offer list into an [`OfferSnapshot`].

use chrono::{DateTime, Utc};

use super::types::{OfferSnapshot, PricingStatus, RawOffer, RawOfferList};
use crate::scan::job::ScanTarget;

/// Offer with its landed price and 1-based rank.
#[derive(Debug, Clone)]
pub struct RankedOffer<'a> {
    pub rank: u32,
    pub landed_price: f64,
    pub offer: &'a RawOffer,
}

/// Ranks offers by ascending landed price. The sort is stable, so equal
/// landed prices keep the order the pricing source returned them in.
pub fn rank_offers(offers: &[RawOffer]) -> Vec<RankedOffer<'_>> {
    let mut ranked: Vec<(f64, &RawOffer)> = offers.iter().map(|o| (o.landed_price(), o)).collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
    ranked
        .into_iter()
        .enumerate()
        .map(|(idx, (landed_price, offer))| RankedOffer {
            rank: idx as u32 + 1,
            landed_price,
            offer,
        })
        .collect()
}

pub fn analyze_offers(
    target: &ScanTarget,
    offers: &RawOfferList,
    your_seller_id: &str,
    captured_at: DateTime<Utc>,
) -> OfferSnapshot {
    let ranked = rank_offers(&offers.offers);
    let total_offers = ranked.len() as u32;

    let lowest_price = ranked.first().map(|r| r.landed_price);

    // Flagged winner wins; otherwise the cheapest landed offer holds the box.
    let buy_box = offers
        .offers
        .iter()
        .find(|o| o.is_buy_box_winner)
        .map(|o| (o.landed_price(), o.seller_id.clone()))
        .or_else(|| ranked.first().map(|r| (r.landed_price, r.offer.seller_id.clone())));
    let (buy_box_price, buy_box_seller_id) = match buy_box {
        Some((price, seller)) => (Some(price), Some(seller)),
        None => (None, None),
    };

    let yours = ranked.iter().find(|r| r.offer.seller_id == your_seller_id);
    let your_position = yours.map(|r| r.rank);
    let your_price = yours.map(|r| r.landed_price);

    let pricing_status = if total_offers == 0 {
        PricingStatus::NoCompetition
    } else {
        match (yours, buy_box_price) {
            (None, _) => PricingStatus::YourOfferNotFound,
            (Some(r), _)
                if r.rank == 1 && buy_box_seller_id.as_deref() == Some(your_seller_id) =>
            {
                PricingStatus::WinningBuybox
            }
            (Some(r), Some(bb)) if r.landed_price > bb => PricingStatus::PricedAboveBuybox,
            (Some(_), _) => PricingStatus::PricedBelowBuybox,
        }
    };

    OfferSnapshot {
        asin: target.asin.clone(),
        sku: target.sku.clone(),
        captured_at,
        total_offers,
        buy_box_price,
        buy_box_seller_id,
        lowest_price,
        your_price,
        your_position,
        pricing_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use pretty_assertions::assert_eq;

    const ME: &str = "AMYSELLER";

    fn offer(seller: &str, price: f64, shipping: f64, winner: bool) -> RawOffer {
        RawOffer {
            seller_id: seller.to_string(),
            listing_price: price,
            shipping,
            is_buy_box_winner: winner,
        }
    }

    fn analyze(offers: Vec<RawOffer>) -> OfferSnapshot {
        let target = ScanTarget::new("SKU-1", "B000TEST01");
        let list = RawOfferList {
            asin: target.asin.clone(),
            offers,
        };
        analyze_offers(&target, &list, ME, Utc::now())
    }

    #[test]
    fn test_zero_offers_is_no_competition() {
        let snapshot = analyze(vec![]);
        assert_eq!(snapshot.pricing_status, PricingStatus::NoCompetition);
        assert_eq!(snapshot.total_offers, 0);
        assert_eq!(snapshot.buy_box_price, None);
        assert_eq!(snapshot.lowest_price, None);
        assert_eq!(snapshot.your_position, None);
    }

    #[test]
    fn test_winning_buy_box() {
        let snapshot = analyze(vec![
            offer("COMP1", 15.00, 1.99, false),
            offer(ME, 14.50, 0.0, true),
        ]);
        assert_eq!(snapshot.pricing_status, PricingStatus::WinningBuybox);
        assert_eq!(snapshot.your_position, Some(1));
        assert_eq!(snapshot.buy_box_seller_id.as_deref(), Some(ME));
        assert_approx_eq!(snapshot.your_price.unwrap(), 14.50, 1e-9);
    }

    #[test]
    fn test_priced_above_flagged_buy_box() {
        let snapshot = analyze(vec![
            offer(ME, 14.90, 1.95, false),
            offer("COMP1", 13.25, 1.95, true),
            offer("COMP2", 17.00, 0.0, false),
        ]);
        assert_eq!(snapshot.pricing_status, PricingStatus::PricedAboveBuybox);
        assert_eq!(snapshot.your_position, Some(2));
        assert_approx_eq!(snapshot.buy_box_price.unwrap(), 15.20, 1e-9);
        assert_approx_eq!(snapshot.your_price.unwrap(), 16.85, 1e-9);
        assert_approx_eq!(snapshot.lowest_price.unwrap(), 15.20, 1e-9);
        assert_eq!(snapshot.total_offers, 3);
    }

    #[test]
    fn test_lowest_price_holds_box_without_flag() {
        let snapshot = analyze(vec![offer("COMP1", 20.0, 0.0, false), offer("COMP2", 18.0, 0.0, false)]);
        assert_eq!(snapshot.buy_box_seller_id.as_deref(), Some("COMP2"));
        assert_eq!(snapshot.pricing_status, PricingStatus::YourOfferNotFound);
    }

    #[test]
    fn test_below_buy_box_when_cheapest_but_not_winner() {
        // Cheapest landed offer, but the box was awarded elsewhere.
        let snapshot = analyze(vec![offer("COMP1", 19.0, 0.0, true), offer(ME, 18.0, 0.0, false)]);
        assert_eq!(snapshot.your_position, Some(1));
        assert_eq!(snapshot.pricing_status, PricingStatus::PricedBelowBuybox);
    }

    #[test]
    fn test_equal_to_buy_box_counts_as_below() {
        let snapshot = analyze(vec![offer("COMP1", 18.0, 0.0, true), offer(ME, 18.0, 0.0, false)]);
        assert_eq!(snapshot.your_position, Some(2));
        assert_eq!(snapshot.pricing_status, PricingStatus::PricedBelowBuybox);
    }

    #[test]
    fn test_landed_price_equal_to_buy_box_in_cents() {
        // 5.07 + 0.99 is not exactly 6.06 in binary floating point.
        let snapshot = analyze(vec![offer(ME, 5.07, 0.99, false), offer("COMP1", 6.06, 0.0, true)]);
        assert_eq!(snapshot.your_price, Some(6.06));
        assert_eq!(snapshot.buy_box_price, Some(6.06));
        assert_eq!(snapshot.pricing_status, PricingStatus::PricedBelowBuybox);
    }

    #[test]
    fn test_cent_ties_keep_source_order_for_buy_box() {
        let snapshot = analyze(vec![offer(ME, 5.07, 0.99, false), offer("COMP1", 6.06, 0.0, false)]);
        assert_eq!(snapshot.your_position, Some(1));
        assert_eq!(snapshot.buy_box_seller_id.as_deref(), Some(ME));
        assert_eq!(snapshot.lowest_price, Some(6.06));
        assert_eq!(snapshot.pricing_status, PricingStatus::WinningBuybox);
    }

    #[test]
    fn test_ties_keep_source_order() {
        let offers = vec![
            offer("FIRST", 10.0, 2.0, false),
            offer("SECOND", 11.0, 1.0, false),
            offer("CHEAP", 5.0, 0.0, false),
        ];
        let ranked = rank_offers(&offers);
        let sellers: Vec<&str> = ranked.iter().map(|r| r.offer.seller_id.as_str()).collect();
        assert_eq!(sellers, vec!["CHEAP", "FIRST", "SECOND"]);
        assert_eq!(ranked[2].rank, 3);
    }
}
