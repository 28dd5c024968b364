use anyhow::{Context, Result};
use dex_arbitrage_scanner::{
    config::AppConfig, report::render_jupiter, scanner::Scanner, source::BitqueryClient, utils,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(
        endpoint = %config.endpoint,
        api_key = %utils::redact(&config.api_key),
        assets = ?config.assets,
        time_window_secs = config.detector.time_window_secs(),
        min_profit_pct = config.detector.min_profit_pct(),
        "[INIT] dex-arbitrage-scanner starting"
    );

    let client = BitqueryClient::new(config.endpoint.clone(), config.api_key.clone())?;
    client
        .ping()
        .await
        .context("authentication probe failed; check BITQUERY_API_KEY")?;
    tracing::info!("[INIT] authentication ok");

    if let Some(limit) = config.jupiter_limit {
        let feed = client.fetch_jupiter_arbitrage(limit).await;
        tracing::info!(
            swaps = feed.swaps.len(),
            malformed = feed.malformed,
            "[JUPITER] recent aggregator swaps"
        );
        for line in render_jupiter(&feed.swaps) {
            tracing::info!("[JUPITER] {line}");
        }
    }

    let scanner = Scanner::new(
        client,
        config.detector,
        config.assets.clone(),
        config.fetch_limit,
        config.top_k,
    );

    if let Some(days) = config.history_days {
        scanner.log_history(days).await;
    }

    match config.poll_interval {
        Some(interval) => {
            tracing::info!(interval_secs = interval.as_secs(), "[INIT] polling started");
            scanner.run(interval, config.log_json).await;
        }
        None => {
            let reports = scanner.scan_all().await;
            scanner.log_reports(&reports, config.log_json);
        }
    }
    Ok(())
}
