//! Chronological price history for a single asset.

use crate::models::{PricePoint, TradeRecord};
use chrono::{DateTime, Days, Utc};

/// Start of a lookback window of `days` ending at `now`.
pub fn lookback_start(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now.checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Records at or after `since`, oldest first.
///
/// Equal timestamps keep their input order. Nothing is deduplicated or
/// interpolated; absent prices stay `None`.
pub fn price_history(records: &[TradeRecord], since: DateTime<Utc>) -> Vec<PricePoint> {
    let mut points: Vec<PricePoint> = records
        .iter()
        .filter(|r| r.timestamp >= since)
        .map(PricePoint::from)
        .collect();
    points.sort_by_key(|p| p.timestamp);
    points
}
