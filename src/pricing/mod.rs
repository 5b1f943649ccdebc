// src/pricing/mod.rs
//! Offer analysis and the cost/margin decision engine. Pure functions only.

pub mod margin;
pub mod offer_analyzer;
pub mod types;

pub use margin::{analyze_snapshot, calculate_margin, round_money, MarginThresholds};
pub use offer_analyzer::{analyze_offers, rank_offers};
pub use types::{
    CostBreakdown, MarginAnalysis, OfferSnapshot, PricingStatus, RawOffer, RawOfferList, RecommendedAction,
    ScanResult,
};
