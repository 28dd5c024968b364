//! Cross-DEX arbitrage scanner.
//!
//! Trades for an asset are fetched from a [`source::TradeSource`], grouped by
//! exchange, compared pairwise inside a time window and ranked by the size of
//! the price differential.

pub mod arbitrage;
pub mod config;
pub mod errors;
pub mod history;
pub mod models;
pub mod report;
pub mod scanner;
pub mod source;
pub mod utils;
