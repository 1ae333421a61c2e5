//! Monthly cost estimation from usage counters
//!
//! Pure arithmetic over caller-supplied counters. Request counts are taken
//! as given; nothing here derives them from file counts or any other proxy.

use serde::{Deserialize, Serialize};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const REQUESTS_PER_UNIT: f64 = 1000.0;

/// Per-unit prices in USD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostRates {
    /// Storage per GB-month
    pub storage_per_gb: f64,
    /// PUT/COPY/POST per 1,000 requests
    pub put_per_1k: f64,
    /// GET per 1,000 requests
    pub get_per_1k: f64,
    /// DELETE per 1,000 requests
    pub delete_per_1k: f64,
    /// LIST per 1,000 requests
    pub list_per_1k: f64,
    /// Origin to edge transfer per GB
    pub origin_transfer_per_gb: f64,
    /// Edge to internet transfer per GB
    pub cdn_transfer_per_gb: f64,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            storage_per_gb: 0.023,
            put_per_1k: 0.005,
            get_per_1k: 0.0004,
            delete_per_1k: 0.0,
            list_per_1k: 0.005,
            origin_transfer_per_gb: 0.02,
            cdn_transfer_per_gb: 0.085,
        }
    }
}

impl CostRates {
    /// Negative prices would break monotonicity; clamp them to zero.
    fn sanitized(&self) -> Self {
        let clamp = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
        Self {
            storage_per_gb: clamp(self.storage_per_gb),
            put_per_1k: clamp(self.put_per_1k),
            get_per_1k: clamp(self.get_per_1k),
            delete_per_1k: clamp(self.delete_per_1k),
            list_per_1k: clamp(self.list_per_1k),
            origin_transfer_per_gb: clamp(self.origin_transfer_per_gb),
            cdn_transfer_per_gb: clamp(self.cdn_transfer_per_gb),
        }
    }
}

/// Usage counters for one billing period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub storage_bytes: u64,
    pub write_count: u64,
    pub read_count: u64,
    pub delete_count: u64,
    pub list_count: u64,
    pub transfer_bytes: u64,
}

/// Itemized cost, every field rounded to 4 decimals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub s3_storage: f64,
    pub put_requests: f64,
    pub get_requests: f64,
    pub delete_requests: f64,
    pub list_requests: f64,
    pub origin_transfer: f64,
    pub cdn_transfer: f64,
    pub total: f64,
}

impl CostBreakdown {
    pub fn requests(&self) -> f64 {
        round_to(
            self.put_requests + self.get_requests + self.delete_requests + self.list_requests,
            4,
        )
    }

    pub fn transfer(&self) -> f64 {
        round_to(self.origin_transfer + self.cdn_transfer, 4)
    }
}

/// Cost model bound to a rate card
#[derive(Debug, Clone, Default)]
pub struct CostModel {
    rates: CostRates,
}

impl CostModel {
    pub fn new(rates: CostRates) -> Self {
        Self {
            rates: rates.sanitized(),
        }
    }

    pub fn rates(&self) -> &CostRates {
        &self.rates
    }

    /// Storage plus write/read requests, rounded to cents
    pub fn estimate_cost(&self, storage_bytes: u64, write_count: u64, read_count: u64) -> f64 {
        let r = &self.rates;
        let raw = gigabytes(storage_bytes) * r.storage_per_gb
            + per_thousand(write_count) * r.put_per_1k
            + per_thousand(read_count) * r.get_per_1k;
        round_to(raw, 2)
    }

    pub fn breakdown(&self, usage: &Usage) -> CostBreakdown {
        let r = &self.rates;
        let s3_storage = round_to(gigabytes(usage.storage_bytes) * r.storage_per_gb, 4);
        let put_requests = round_to(per_thousand(usage.write_count) * r.put_per_1k, 4);
        let get_requests = round_to(per_thousand(usage.read_count) * r.get_per_1k, 4);
        let delete_requests = round_to(per_thousand(usage.delete_count) * r.delete_per_1k, 4);
        let list_requests = round_to(per_thousand(usage.list_count) * r.list_per_1k, 4);
        let transfer_gb = gigabytes(usage.transfer_bytes);
        let origin_transfer = round_to(transfer_gb * r.origin_transfer_per_gb, 4);
        let cdn_transfer = round_to(transfer_gb * r.cdn_transfer_per_gb, 4);

        let total = round_to(
            s3_storage
                + put_requests
                + get_requests
                + delete_requests
                + list_requests
                + origin_transfer
                + cdn_transfer,
            4,
        );

        CostBreakdown {
            s3_storage,
            put_requests,
            get_requests,
            delete_requests,
            list_requests,
            origin_transfer,
            cdn_transfer,
            total,
        }
    }
}

/// Estimate with the default rate card
pub fn estimate_cost(storage_bytes: u64, write_count: u64, read_count: u64) -> f64 {
    CostModel::default().estimate_cost(storage_bytes, write_count, read_count)
}

/// Breakdown with the default rate card
pub fn breakdown(
    storage_bytes: u64,
    write_count: u64,
    read_count: u64,
    delete_count: u64,
    list_count: u64,
    transfer_bytes: u64,
) -> CostBreakdown {
    CostModel::default().breakdown(&Usage {
        storage_bytes,
        write_count,
        read_count,
        delete_count,
        list_count,
        transfer_bytes,
    })
}

fn gigabytes(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GB
}

fn per_thousand(count: u64) -> f64 {
    count as f64 / REQUESTS_PER_UNIT
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    let rounded = (value * factor).round() / factor;
    // -0.0 would render as "-0.00"
    if rounded <= 0.0 { 0.0 } else { rounded }
}
