//! Mock collaborators with configurable behavior per ASIN/SKU.

use async_trait::async_trait;
use log::debug;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::error::{Result, ScanError};
use crate::pricing::types::{CostBreakdown, RawOffer, RawOfferList};
use crate::scan::job::ScanTarget;
use crate::scan::sources::{CatalogSource, CostLookupError, CostModelSource, PricingError, PricingSource};

pub struct StaticCatalog {
    targets: Vec<ScanTarget>,
    unavailable: bool,
}

impl StaticCatalog {
    pub fn new(targets: Vec<ScanTarget>) -> Self {
        Self {
            targets,
            unavailable: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            targets: Vec::new(),
            unavailable: true,
        }
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn list_enabled_targets(&self) -> Result<Vec<ScanTarget>> {
        if self.unavailable {
            return Err(ScanError::CatalogUnavailable("mock catalog offline".to_string()));
        }
        Ok(self.targets.clone())
    }
}

/// Pricing source answering from per-ASIN scripts.
///
/// Scripted responses are consumed in order; once a script runs dry the
/// ASIN's standing offers are returned, or a 404 if it has none.
pub struct ScriptedPricingSource {
    scripts: Mutex<HashMap<String, VecDeque<std::result::Result<RawOfferList, PricingError>>>>,
    standing: Mutex<HashMap<String, Vec<RawOffer>>>,
    calls: Mutex<HashMap<String, usize>>,
    total_calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    warm_up_error: Option<ScanError>,
}

impl Default for ScriptedPricingSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPricingSource {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            standing: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            total_calls: AtomicUsize::new(0),
            gate: None,
            warm_up_error: None,
        }
    }

    pub fn with_offers(self, asin: &str, offers: Vec<RawOffer>) -> Self {
        if let Ok(mut standing) = self.standing.lock() {
            standing.insert(asin.to_string(), offers);
        }
        self
    }

    pub fn with_script(self, asin: &str, script: Vec<std::result::Result<RawOfferList, PricingError>>) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(asin.to_string(), script.into());
        }
        self
    }

    /// Every call waits for a permit on `gate` before answering.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn failing_warm_up(mut self, error: ScanError) -> Self {
        self.warm_up_error = Some(error);
        self
    }

    pub fn calls(&self, asin: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(asin).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    fn next_response(&self, asin: &str) -> std::result::Result<RawOfferList, PricingError> {
        let scripted = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.get_mut(asin).and_then(|script| script.pop_front()));
        if let Some(response) = scripted {
            return response;
        }

        let standing = self.standing.lock().ok().and_then(|standing| standing.get(asin).cloned());
        match standing {
            Some(offers) => Ok(RawOfferList {
                asin: asin.to_string(),
                offers,
            }),
            None => Err(PricingError::Http {
                status: 404,
                body: format!("unknown ASIN {}", asin),
            }),
        }
    }
}

#[async_trait]
impl PricingSource for ScriptedPricingSource {
    async fn get_offers(&self, asin: &str, _marketplace_id: &str) -> std::result::Result<RawOfferList, PricingError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(asin.to_string()).or_insert(0) += 1;
        }
        self.total_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| PricingError::Network("gate closed".to_string()))?;
        }

        let response = self.next_response(asin);
        debug!("🧪 scripted response for {}: {:?}", asin, response.as_ref().map(|l| l.offers.len()));
        response
    }

    async fn warm_up(&self) -> Result<()> {
        match &self.warm_up_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct StaticCostModel {
    costs: HashMap<String, CostBreakdown>,
    unavailable: HashSet<String>,
}

impl StaticCostModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cost(mut self, sku: &str, cost: CostBreakdown) -> Self {
        self.costs.insert(sku.to_string(), cost);
        self
    }

    pub fn unavailable_for(mut self, sku: &str) -> Self {
        self.unavailable.insert(sku.to_string());
        self
    }
}

#[async_trait]
impl CostModelSource for StaticCostModel {
    async fn get_cost_breakdown(&self, sku: &str) -> std::result::Result<CostBreakdown, CostLookupError> {
        if self.unavailable.contains(sku) {
            return Err(CostLookupError::Unavailable("mock cost model offline".to_string()));
        }
        self.costs
            .get(sku)
            .cloned()
            .ok_or_else(|| CostLookupError::NotFound(sku.to_string()))
    }
}
