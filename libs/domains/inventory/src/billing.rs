//! Billing history plus a projection from the live fleet.
//!
//! Historical months come from the provider's cost records. Live rates are
//! the hourly prices of running instances and stored buckets right now.
//! Calendar math uses the injected clock only.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use domain_jobs::{BillingSummary, Clock, MonthTotal};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::instrument;

use crate::cloud_api::CostMonthDescriptor;
use crate::collectors::{CollectContext, ComputeCollector, StorageCollector};
use crate::error::{InventoryError, InventoryResult};

/// Months of history requested from the provider
pub const HISTORY_MONTHS: u32 = 12;

/// Live hourly rate per cost category; `None` when any resource in it is unpriced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveRates {
    pub compute_hourly: Option<f64>,
    pub object_storage_hourly: Option<f64>,
}

impl LiveRates {
    /// Sum over categories, unknown if any category is unknown
    pub fn total_hourly(&self) -> Option<f64> {
        Some(self.compute_hourly? + self.object_storage_hourly?)
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn days_in_month(at: DateTime<Utc>) -> u32 {
    let (year, month) = (at.year(), at.month());
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };

    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 31,
    }
}

impl From<CostMonthDescriptor> for MonthTotal {
    fn from(descriptor: CostMonthDescriptor) -> Self {
        let compute = descriptor.compute.unwrap_or(0.0);
        let block_storage = descriptor.block_storage.unwrap_or(0.0);
        let object_storage = descriptor.object_storage.unwrap_or(0.0);

        MonthTotal {
            month: descriptor.month.unwrap_or_default(),
            compute,
            block_storage,
            object_storage,
            total: compute + block_storage + object_storage,
        }
    }
}

pub struct BillingCalculator {
    clock: Arc<dyn Clock>,
}

impl BillingCalculator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Aggregate history and project the current and next month.
    ///
    /// The current month is the last closed total plus the live rate over the
    /// elapsed share of the month; the next month is the live rate over a
    /// whole month.
    pub fn summarize(&self, months: Vec<MonthTotal>, live: &LiveRates) -> BillingSummary {
        let now = self.clock.now();
        let days = f64::from(days_in_month(now));
        let elapsed = f64::from(now.day());

        let annual = round2(months.iter().map(|m| m.total).sum());
        let last = round2(months.last().map(|m| m.total).unwrap_or(0.0));
        let hourly = live.total_hourly();

        BillingSummary {
            annual,
            month: last,
            this_month_prediction: hourly
                .map(|h| round2(last + round2(h * 24.0 * elapsed / days))),
            next_month_prediction: hourly.map(|h| round2(h * 24.0 * days)),
            months,
        }
    }

    /// Hourly rates of running instances across `regions` and of every bucket
    #[instrument(skip(self, ctx), fields(account_id = %ctx.account_id))]
    pub async fn live_rates(
        &self,
        ctx: &CollectContext,
        regions: &[String],
    ) -> InventoryResult<LiveRates> {
        let per_region = try_join_all(
            regions
                .iter()
                .map(|region| async move { ComputeCollector::new(region).list_instances(ctx).await }),
        )
        .await?;

        let compute_hourly = per_region
            .iter()
            .flatten()
            .filter(|instance| instance.is_running())
            .map(|instance| instance.hourly_price)
            .sum::<Option<f64>>();

        let object_storage_hourly = StorageCollector::list_buckets(ctx)
            .await?
            .iter()
            .map(|bucket| bucket.hourly_price)
            .sum::<Option<f64>>();

        Ok(LiveRates {
            compute_hourly,
            object_storage_hourly,
        })
    }

    pub async fn build(
        &self,
        ctx: &CollectContext,
        regions: &[String],
    ) -> InventoryResult<BillingSummary> {
        let history = ctx
            .api
            .monthly_costs(HISTORY_MONTHS)
            .await
            .map_err(|e| InventoryError::collector("billing", "global", e))?;
        let months = history.into_iter().map(MonthTotal::from).collect();

        let live = self.live_rates(ctx, regions).await?;
        tracing::debug!(?live, "Gathered live rates");

        Ok(self.summarize(months, &live))
    }
}
