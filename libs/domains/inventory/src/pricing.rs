//! Hourly price lookups against the provider catalog.

use observability::CollectionMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cloud_api::{CloudApi, PriceFilter};

pub const COMPUTE_SERVICE_CODE: &str = "AmazonEC2";
pub const STORAGE_SERVICE_CODE: &str = "AmazonS3";

type PriceKey = (String, Vec<PriceFilter>);

/// One resolver per collection pass, shared by every collector in it.
///
/// Lookups are memoized for the pass; a missing price is `None`, never zero.
pub struct PricingResolver {
    api: Arc<dyn CloudApi>,
    memo: Mutex<HashMap<PriceKey, Option<f64>>>,
}

impl PricingResolver {
    pub fn new(api: Arc<dyn CloudApi>) -> Self {
        Self {
            api,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// First on-demand USD price matching every filter
    pub async fn price(&self, service_code: &str, filters: &[PriceFilter]) -> Option<f64> {
        let mut sorted = filters.to_vec();
        sorted.sort();
        let key = (service_code.to_string(), sorted);

        if let Some(cached) = self.memo.lock().await.get(&key) {
            return *cached;
        }

        let price = match self.api.get_products(service_code, filters).await {
            Ok(entries) => entries.first().and_then(on_demand_usd),
            Err(e) => {
                // Not memoized so a later resource can retry the lookup
                tracing::warn!(service_code, error = %e, "Price lookup failed");
                CollectionMetrics::record_price_lookup(service_code, false);
                return None;
            }
        };

        CollectionMetrics::record_price_lookup(service_code, price.is_some());
        if price.is_none() {
            tracing::debug!(service_code, ?filters, "No catalog price matched");
        }

        self.memo.lock().await.insert(key, price);
        price
    }

    /// Hourly on-demand Linux price of an instance class
    pub async fn instance_hourly(&self, instance_type: &str) -> Option<f64> {
        self.price(
            COMPUTE_SERVICE_CODE,
            &[
                PriceFilter::term_match("instanceType", instance_type),
                PriceFilter::term_match("operatingSystem", "Linux"),
                PriceFilter::term_match("capacitystatus", "Used"),
            ],
        )
        .await
    }

    /// Storage unit price scaled by the bucket size in GB
    pub async fn bucket_hourly(&self, size_gb: f64) -> Option<f64> {
        self.price(
            STORAGE_SERVICE_CODE,
            &[PriceFilter::term_match("productFamily", "Storage")],
        )
        .await
        .map(|per_gb| per_gb * size_gb)
    }
}

/// `terms.OnDemand.<first>.priceDimensions.<first>.pricePerUnit.USD`
pub fn on_demand_usd(entry: &serde_json::Value) -> Option<f64> {
    let term = entry.get("terms")?.get("OnDemand")?.as_object()?.values().next()?;
    let dimension = term.get("priceDimensions")?.as_object()?.values().next()?;
    let usd = dimension.get("pricePerUnit")?.get("USD")?;

    match usd {
        serde_json::Value::String(raw) => raw.parse().ok(),
        other => other.as_f64(),
    }
}
