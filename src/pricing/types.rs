// src/pricing/types.rs
//! Offer, snapshot, cost and margin types shared by the analyzer and calculator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::margin::round_money;

/// One competing offer as returned by the pricing source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOffer {
    pub seller_id: String,
    pub listing_price: f64,
    pub shipping: f64,
    #[serde(default)]
    pub is_buy_box_winner: bool,
}

impl RawOffer {
    /// Price plus shipping, rounded to whole cents so that offers at the same
    /// landed price compare equal.
    pub fn landed_price(&self) -> f64 {
        round_money(self.listing_price + self.shipping)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOfferList {
    pub asin: String,
    pub offers: Vec<RawOffer>,
}

impl RawOfferList {
    /// Structural checks applied before analysis. A failing list is a
    /// permanent error for the target, not a retry candidate.
    pub fn validate(&self) -> Result<(), String> {
        for (idx, offer) in self.offers.iter().enumerate() {
            if offer.seller_id.trim().is_empty() {
                return Err(format!("offer #{} has an empty seller id", idx));
            }
            if !offer.listing_price.is_finite() || offer.listing_price < 0.0 {
                return Err(format!(
                    "offer #{} has an invalid listing price {}",
                    idx, offer.listing_price
                ));
            }
            if !offer.shipping.is_finite() || offer.shipping < 0.0 {
                return Err(format!("offer #{} has an invalid shipping amount {}", idx, offer.shipping));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingStatus {
    WinningBuybox,
    PricedAboveBuybox,
    PricedBelowBuybox,
    NoCompetition,
    YourOfferNotFound,
}

impl PricingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingStatus::WinningBuybox => "winning_buybox",
            PricingStatus::PricedAboveBuybox => "priced_above_buybox",
            PricingStatus::PricedBelowBuybox => "priced_below_buybox",
            PricingStatus::NoCompetition => "no_competition",
            PricingStatus::YourOfferNotFound => "your_offer_not_found",
        }
    }
}

impl fmt::Display for PricingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market position of one ASIN at capture time. All prices are landed prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferSnapshot {
    pub asin: String,
    pub sku: String,
    pub captured_at: DateTime<Utc>,
    pub total_offers: u32,
    pub buy_box_price: Option<f64>,
    pub buy_box_seller_id: Option<String>,
    pub lowest_price: Option<f64>,
    pub your_price: Option<f64>,
    pub your_position: Option<u32>,
    pub pricing_status: PricingStatus,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub material_cost: f64,
    pub shipping_cost: f64,
    pub box_cost: f64,
    pub fragile_charge: f64,
    pub vat_amount: f64,
}

impl CostBreakdown {
    pub fn total_operating_cost(&self) -> f64 {
        self.material_cost + self.shipping_cost + self.box_cost + self.fragile_charge + self.vat_amount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    MatchBuybox,
    HoldPrice,
    NotProfitable,
    Investigate,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::MatchBuybox => "match_buybox",
            RecommendedAction::HoldPrice => "hold_price",
            RecommendedAction::NotProfitable => "not_profitable",
            RecommendedAction::Investigate => "investigate",
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginAnalysis {
    pub margin_at_current: f64,
    pub margin_percent_at_current: f64,
    pub margin_at_buy_box: f64,
    pub margin_percent_at_buy_box: f64,
    pub profit_opportunity: f64,
    pub recommended_action: RecommendedAction,
}

/// A snapshot together with the margin analysis derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub snapshot: OfferSnapshot,
    pub margin: MarginAnalysis,
}
