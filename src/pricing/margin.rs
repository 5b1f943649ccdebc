// src/pricing/margin.rs
//! Cost/margin calculator and the pricing recommendation decision tree.
//!
//! Everything here is a pure function of its inputs: the same prices and cost
//! breakdown always produce the same [`MarginAnalysis`].

use serde::{Deserialize, Serialize};

use super::types::{CostBreakdown, MarginAnalysis, OfferSnapshot, PricingStatus, RecommendedAction};

pub const PROFIT_FLOOR_PCT: f64 = 5.0;
pub const INVESTIGATE_FLOOR_PCT: f64 = 10.0;
pub const MIN_OPPORTUNITY: f64 = 1.00;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginThresholds {
    /// Margin % at the buy box below which the product is not profitable.
    pub profit_floor_pct: f64,
    /// Margin % at the buy box below which the product needs a manual look.
    pub investigate_floor_pct: f64,
    /// Currency units the opportunity must exceed before matching the box.
    pub min_opportunity: f64,
}

impl Default for MarginThresholds {
    fn default() -> Self {
        Self {
            profit_floor_pct: PROFIT_FLOOR_PCT,
            investigate_floor_pct: INVESTIGATE_FLOOR_PCT,
            min_opportunity: MIN_OPPORTUNITY,
        }
    }
}

/// Rounds to 2 decimal places, halves away from zero.
pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percent_of(margin: f64, price: f64) -> f64 {
    if price == 0.0 {
        0.0
    } else {
        round_money(margin / price * 100.0)
    }
}

pub fn calculate_margin(
    your_landed_price: f64,
    buy_box_price: Option<f64>,
    pricing_status: PricingStatus,
    cost: &CostBreakdown,
    thresholds: &MarginThresholds,
) -> MarginAnalysis {
    let total_cost = round_money(cost.total_operating_cost());

    let margin_at_current = round_money(your_landed_price - total_cost);
    let margin_percent_at_current = percent_of(margin_at_current, your_landed_price);

    let (margin_at_buy_box, margin_percent_at_buy_box) = match buy_box_price {
        Some(bb) => {
            let margin = round_money(bb - total_cost);
            (margin, percent_of(margin, bb))
        }
        None => (0.0, 0.0),
    };

    let profit_opportunity = round_money(margin_at_buy_box - margin_at_current);

    let recommended_action = if pricing_status == PricingStatus::NoCompetition || buy_box_price.is_none() {
        RecommendedAction::HoldPrice
    } else if margin_percent_at_buy_box < thresholds.profit_floor_pct {
        RecommendedAction::NotProfitable
    } else if margin_percent_at_buy_box < thresholds.investigate_floor_pct {
        RecommendedAction::Investigate
    } else if pricing_status != PricingStatus::WinningBuybox && profit_opportunity > thresholds.min_opportunity {
        RecommendedAction::MatchBuybox
    } else {
        RecommendedAction::HoldPrice
    };

    MarginAnalysis {
        margin_at_current,
        margin_percent_at_current,
        margin_at_buy_box,
        margin_percent_at_buy_box,
        profit_opportunity,
        recommended_action,
    }
}

/// Margin analysis for a captured snapshot. A missing own offer prices at 0.
pub fn analyze_snapshot(
    snapshot: &OfferSnapshot,
    cost: &CostBreakdown,
    thresholds: &MarginThresholds,
) -> MarginAnalysis {
    calculate_margin(
        snapshot.your_price.unwrap_or(0.0),
        snapshot.buy_box_price,
        snapshot.pricing_status,
        cost,
        thresholds,
    )
}
