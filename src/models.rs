//! Shared data structures used throughout the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder for currency identifiers the provider did not return.
pub const UNKNOWN_CURRENCY: &str = "Unknown";

/// A single DEX trade as delivered by a `TradeSource`.
///
/// Records are validated once at ingestion: exchange and timestamp are always
/// present, price fields are explicitly optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// DEX / protocol name (e.g. "Raydium", "Orca").
    pub exchange: String,
    /// Transaction signature of the trade.
    pub signature: String,
    pub timestamp: DateTime<Utc>,
    /// Buy-side price in native units of the sell currency.
    pub price: Option<f64>,
    pub price_usd: Option<f64>,
    pub buy_currency: String,
    pub sell_currency: String,
    pub amount: Option<f64>,
}

impl TradeRecord {
    /// Returns the price if it is usable as a division basis.
    pub fn usable_price(&self) -> Option<f64> {
        self.price.filter(|p| p.is_finite() && *p > 0.0)
    }
}

/// Calculated cross-exchange price discrepancy between two trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub buy_price: f64,
    pub sell_price: f64,
    /// `(sell_price - buy_price) / buy_price * 100`, may be negative.
    pub profit_pct: f64,
    pub buy_timestamp: DateTime<Utc>,
    pub sell_timestamp: DateTime<Utc>,
    pub buy_signature: String,
    pub sell_signature: String,
    pub asset: String,
}

/// One point of an asset's price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: Option<f64>,
    pub price_usd: Option<f64>,
    pub exchange: String,
}

/// A successful Jupiter aggregator instruction, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JupiterSwap {
    pub signature: String,
    pub timestamp: DateTime<Utc>,
    pub program: String,
    /// Mint of the first instruction account, `Unknown` when absent.
    pub buy_mint: String,
    /// Mint of the second instruction account, `Unknown` when absent.
    pub sell_mint: String,
    pub logs: Vec<String>,
}

impl From<&TradeRecord> for PricePoint {
    fn from(record: &TradeRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            price: record.price,
            price_usd: record.price_usd,
            exchange: record.exchange.clone(),
        }
    }
}
