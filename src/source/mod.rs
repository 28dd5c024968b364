//! Trade data providers.
//!
//! Responsibilities:
//! • Fetch a finite page of DEX trades for an asset.
//! • Translate provider responses into validated `TradeRecord`s.
//! • Absorb transport failures: callers always get a (possibly empty) batch.

use crate::models::{JupiterSwap, TradeRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod bitquery;

pub use bitquery::BitqueryClient;

/// Parameters for a trade fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeQuery {
    /// Mint address of the bought asset.
    pub asset: String,
    /// Maximum number of trades to request.
    pub limit: u32,
    /// Only trades at or after this instant, when set.
    pub since: Option<DateTime<Utc>>,
}

/// Records returned by one fetch plus the count rejected at ingestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeBatch {
    pub records: Vec<TradeRecord>,
    pub malformed: usize,
}

impl TradeBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Recent Jupiter swaps, newest first, plus rows rejected at ingestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JupiterFeed {
    pub swaps: Vec<JupiterSwap>,
    pub malformed: usize,
}

/// A supplier of trade records.
///
/// Implementations must not surface transport errors; a failed fetch is an
/// empty batch.
#[async_trait]
pub trait TradeSource: Send + Sync {
    /// Most recent trades of `query.asset` across all DEXes.
    async fn fetch_trades(&self, query: &TradeQuery) -> TradeBatch;

    /// Trades of `asset` since `since`, used for price history.
    async fn fetch_price_history(
        &self,
        asset: &str,
        since: DateTime<Utc>,
        limit: u32,
    ) -> TradeBatch;
}
