//! Fetch → detect → rank orchestration.

use crate::{
    arbitrage::{Detection, DetectorConfig, detect_with_stats, rank},
    history::{lookback_start, price_history},
    models::{Opportunity, PricePoint},
    report::{render_history, render_top},
    source::{TradeQuery, TradeSource},
};
use chrono::Utc;
use futures::future::join_all;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Result of scanning one asset for one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    pub asset: String,
    /// Ranked, strongest first.
    pub opportunities: Vec<Opportunity>,
    /// Records delivered by the source.
    pub trades: usize,
    /// Rows the source rejected at ingestion.
    pub malformed: usize,
    /// Records the detector skipped for lacking a usable price.
    pub skipped: usize,
    pub exchanges: usize,
}

/// Runs detection cycles for a fixed set of assets against a `TradeSource`.
pub struct Scanner<S> {
    source: S,
    detector: DetectorConfig,
    assets: Vec<String>,
    fetch_limit: u32,
    top_k: usize,
}

impl<S: TradeSource> Scanner<S> {
    pub fn new(
        source: S,
        detector: DetectorConfig,
        assets: Vec<String>,
        fetch_limit: u32,
        top_k: usize,
    ) -> Self {
        Self {
            source,
            detector,
            assets,
            fetch_limit,
            top_k,
        }
    }

    #[cfg(test)]
    pub(crate) fn source(&self) -> &S {
        &self.source
    }

    /// Fetch one page of trades for `asset` and rank the detected opportunities.
    pub async fn scan_asset(&self, asset: &str) -> ScanReport {
        let query = TradeQuery {
            asset: asset.to_string(),
            limit: self.fetch_limit,
            since: None,
        };
        let batch = self.source.fetch_trades(&query).await;
        let Detection {
            opportunities,
            skipped,
            exchanges,
        } = detect_with_stats(&batch.records, &self.detector);

        ScanReport {
            asset: asset.to_string(),
            opportunities: rank(opportunities),
            trades: batch.records.len(),
            malformed: batch.malformed,
            skipped,
            exchanges,
        }
    }

    /// Scan every configured asset concurrently; reports keep asset order.
    pub async fn scan_all(&self) -> Vec<ScanReport> {
        join_all(self.assets.iter().map(|asset| self.scan_asset(asset))).await
    }

    /// Price history of `asset` over the last `days` days, oldest first.
    pub async fn history(&self, asset: &str, days: u32) -> Vec<PricePoint> {
        let since = lookback_start(Utc::now(), days);
        let batch = self
            .source
            .fetch_price_history(asset, since, self.fetch_limit)
            .await;
        price_history(&batch.records, since)
    }

    /// Log a cycle's reports the same way for single and repeated runs.
    pub fn log_reports(&self, reports: &[ScanReport], log_json: bool) {
        for report in reports {
            if report.opportunities.is_empty() {
                info!(
                    asset = %report.asset,
                    trades = report.trades,
                    exchanges = report.exchanges,
                    malformed = report.malformed,
                    skipped = report.skipped,
                    "[HEARTBEAT] no opps above threshold"
                );
                continue;
            }
            info!(
                asset = %report.asset,
                found = report.opportunities.len(),
                trades = report.trades,
                exchanges = report.exchanges,
                skipped = report.skipped,
                "[OPP] opportunities found"
            );
            for line in render_top(&report.opportunities, self.top_k) {
                info!("[OPP] {line}");
            }
            if log_json {
                let top = crate::arbitrage::top(&report.opportunities, self.top_k);
                match serde_json::to_string(top) {
                    Ok(json) => debug!(asset = %report.asset, json = %json, "[OPP] ranked"),
                    Err(e) => debug!(error = %e, "[OPP] json encoding failed"),
                }
            }
        }
    }

    /// Log the price history of every asset.
    pub async fn log_history(&self, days: u32) {
        for asset in &self.assets {
            let points = self.history(asset, days).await;
            info!(asset = %asset, points = points.len(), days, "[HISTORY] price points");
            for line in render_history(&points) {
                debug!("[HISTORY] {line}");
            }
        }
    }

    /// Repeat `scan_all` every `interval` until Ctrl-C.
    pub async fn run(&self, interval: Duration, log_json: bool) {
        self.run_until(interval, log_json, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "[SCAN] ctrl-c listener failed");
                std::future::pending::<()>().await;
            }
        })
        .await;
    }

    /// Repeat `scan_all` every `interval` until `shutdown` resolves.
    ///
    /// Shutdown is observed while waiting for a tick and while a cycle is in
    /// flight; an interrupted cycle is abandoned. Ticks that fall behind are
    /// skipped, so cycles never overlap.
    pub async fn run_until<F>(&self, interval: Duration, log_json: bool, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles: u64 = 0;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut shutdown => break,
            }
            cycles += 1;
            debug!(cycle = cycles, "[SCAN] cycle start");
            tokio::select! {
                reports = self.scan_all() => self.log_reports(&reports, log_json),
                _ = &mut shutdown => break,
            }
        }
        info!(cycles, "[SCAN] shutdown requested");
        cycles
    }
}
