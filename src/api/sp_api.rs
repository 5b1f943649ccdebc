// src/api/sp_api.rs
//! Competitive-pricing client for the Selling Partner API offers endpoint.
//!
//! `GET {endpoint}/products/pricing/v0/items/{asin}/offers?MarketplaceId=..&ItemCondition=New`
//! with the access token in `x-amz-access-token`. Only the fields the scanner
//! needs are read from `payload.Offers[]`.

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::auth::TokenCache;
use crate::error::{Result, ScanError};
use crate::pricing::types::{RawOffer, RawOfferList};
use crate::scan::sources::{PricingError, PricingSource};

const OFFERS_PATH: [&str; 4] = ["products", "pricing", "v0", "items"];
const ACCESS_TOKEN_HEADER: &str = "x-amz-access-token";

#[derive(Debug, Deserialize)]
struct OffersEnvelope {
    payload: Option<OffersPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OffersPayload {
    #[serde(default)]
    offers: Vec<OfferEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OfferEntry {
    seller_id: Option<String>,
    listing_price: Option<MoneyType>,
    shipping: Option<MoneyType>,
    #[serde(default)]
    is_buy_box_winner: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MoneyType {
    amount: f64,
}

/// Parses an offers response body into the scanner's offer list.
/// Missing shipping counts as free; a missing seller or listing price makes
/// the whole document invalid.
pub fn parse_offers_document(asin: &str, body: &str) -> std::result::Result<RawOfferList, PricingError> {
    let envelope: OffersEnvelope =
        serde_json::from_str(body).map_err(|e| PricingError::InvalidResponse(format!("malformed JSON: {}", e)))?;

    let payload = envelope
        .payload
        .ok_or_else(|| PricingError::InvalidResponse("response has no payload".to_string()))?;

    let mut offers = Vec::with_capacity(payload.offers.len());
    for (idx, entry) in payload.offers.into_iter().enumerate() {
        let seller_id = entry
            .seller_id
            .ok_or_else(|| PricingError::InvalidResponse(format!("offer {} has no SellerId", idx)))?;
        let listing_price = entry
            .listing_price
            .ok_or_else(|| PricingError::InvalidResponse(format!("offer {} has no ListingPrice", idx)))?;

        offers.push(RawOffer {
            seller_id,
            listing_price: listing_price.amount,
            shipping: entry.shipping.map(|m| m.amount).unwrap_or(0.0),
            is_buy_box_winner: entry.is_buy_box_winner,
        });
    }

    Ok(RawOfferList {
        asin: asin.to_string(),
        offers,
    })
}

pub struct SpApiPricingClient {
    client: reqwest::Client,
    endpoint: Url,
    tokens: TokenCache,
}

impl SpApiPricingClient {
    pub fn new(endpoint: &str, request_timeout: Duration, tokens: TokenCache) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ScanError::ConfigurationError(format!("invalid SP-API endpoint '{}': {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(ScanError::ConfigurationError(format!(
                "SP-API endpoint '{}' cannot carry a path",
                endpoint
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ScanError::ConfigurationError(format!("failed to build HTTP client: {}", e)))?;

        info!("🌐 SP-API pricing client for {} (timeout {:?})", endpoint, request_timeout);

        Ok(Self {
            client,
            endpoint,
            tokens,
        })
    }

    pub fn offers_url(&self, asin: &str, marketplace_id: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(OFFERS_PATH).push(asin).push("offers");
        }
        url.query_pairs_mut()
            .append_pair("MarketplaceId", marketplace_id)
            .append_pair("ItemCondition", "New");
        url
    }
}

#[async_trait]
impl PricingSource for SpApiPricingClient {
    async fn get_offers(&self, asin: &str, marketplace_id: &str) -> std::result::Result<RawOfferList, PricingError> {
        let token = self
            .tokens
            .token()
            .await
            .map_err(|e| PricingError::Auth(e.to_string()))?;

        let url = self.offers_url(asin, marketplace_id);
        debug!("📤 GET {}", url);

        let response = self
            .client
            .get(url)
            .header(ACCESS_TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PricingError::Timeout(e.to_string())
                } else {
                    PricingError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PricingError::Network(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                self.tokens.invalidate().await;
            }
            return Err(PricingError::Http {
                status: status.as_u16(),
                body,
            });
        }

        parse_offers_document(asin, &body)
    }

    async fn warm_up(&self) -> Result<()> {
        match self.tokens.token().await {
            Ok(_) => Ok(()),
            Err(ScanError::AuthFailure(msg)) => Err(ScanError::AuthFailure(msg)),
            Err(other) => Err(ScanError::AuthFailure(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::StaticTokenProvider;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn client(endpoint: &str) -> SpApiPricingClient {
        let tokens = TokenCache::new(Arc::new(StaticTokenProvider::new("abc", 3600)), 60);
        SpApiPricingClient::new(endpoint, Duration::from_secs(5), tokens).unwrap()
    }

    #[test]
    fn test_parse_offers_document() {
        let body = r#"{
            "payload": {
                "ASIN": "B000TEST01",
                "Offers": [
                    {
                        "SellerId": "A2OTHER",
                        "ListingPrice": {"CurrencyCode": "GBP", "Amount": 29.99},
                        "Shipping": {"CurrencyCode": "GBP", "Amount": 1.05},
                        "IsBuyBoxWinner": true
                    },
                    {
                        "SellerId": "A1ME",
                        "ListingPrice": {"CurrencyCode": "GBP", "Amount": 31.04}
                    }
                ]
            }
        }"#;

        let list = parse_offers_document("B000TEST01", body).unwrap();
        assert_eq!(list.asin, "B000TEST01");
        assert_eq!(list.offers.len(), 2);
        assert_eq!(list.offers[0].seller_id, "A2OTHER");
        assert!(list.offers[0].is_buy_box_winner);
        assert_eq!(list.offers[1].shipping, 0.0);
        assert!(!list.offers[1].is_buy_box_winner);
    }

    #[test]
    fn test_parse_empty_offer_list() {
        let list = parse_offers_document("B000TEST01", r#"{"payload": {"Offers": []}}"#).unwrap();
        assert!(list.offers.is_empty());
    }

    #[test]
    fn test_parse_rejects_structural_problems() {
        for body in [
            "not json",
            r#"{"errors": [{"code": "InvalidInput"}]}"#,
            r#"{"payload": {"Offers": [{"ListingPrice": {"Amount": 1.0}}]}}"#,
            r#"{"payload": {"Offers": [{"SellerId": "A1"}]}}"#,
        ] {
            assert!(matches!(
                parse_offers_document("B000TEST01", body),
                Err(PricingError::InvalidResponse(_))
            ));
        }
    }

    #[test]
    fn test_offers_url() {
        let url = client("https://sellingpartnerapi-eu.amazon.com").offers_url("B000TEST01", "A1F83G8C2ARO7P");
        assert_eq!(
            url.as_str(),
            "https://sellingpartnerapi-eu.amazon.com/products/pricing/v0/items/B000TEST01/offers?MarketplaceId=A1F83G8C2ARO7P&ItemCondition=New"
        );
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let tokens = TokenCache::new(Arc::new(StaticTokenProvider::new("abc", 3600)), 60);
        assert!(SpApiPricingClient::new("not a url", Duration::from_secs(5), tokens).is_err());
    }

    #[tokio::test]
    async fn test_warm_up_fails_without_token() {
        let tokens = TokenCache::new(Arc::new(StaticTokenProvider::new("", 3600)), 60);
        let client = SpApiPricingClient::new("https://example.invalid", Duration::from_secs(5), tokens).unwrap();
        assert!(matches!(client.warm_up().await, Err(ScanError::AuthFailure(_))));
    }
}
