use super::types::{Detection, DetectorConfig};
use crate::errors::Result;
use crate::models::{Opportunity, TradeRecord};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Find every cross-exchange pair of trades within `time_window` whose price
/// differential is at least `min_profit_pct` in absolute value.
pub fn detect(
    trades: &[TradeRecord],
    time_window: TimeDelta,
    min_profit_pct: f64,
) -> Result<Vec<Opportunity>> {
    let config = DetectorConfig::new(time_window, min_profit_pct)?;
    Ok(detect_with_stats(trades, &config).opportunities)
}

/// Same as [`detect`] with a pre-validated config, also reporting how many
/// records were skipped.
pub fn detect_with_stats(trades: &[TradeRecord], config: &DetectorConfig) -> Detection {
    let (groups, skipped) = group_by_exchange(trades);
    let mut opportunities = Vec::new();

    if groups.len() < 2 {
        return Detection {
            opportunities,
            skipped,
            exchanges: groups.len(),
        };
    }

    let window = config.time_window();
    let min_profit_pct = config.min_profit_pct();

    for (i, buy_group) in groups.iter().enumerate() {
        for (j, sell_group) in groups.iter().enumerate() {
            if i == j {
                continue;
            }
            for buy in &buy_group.trades {
                for sell in sell_group.within(buy.record.timestamp, window) {
                    let profit_pct = (sell.price - buy.price) / buy.price * 100.0;
                    if profit_pct.abs() < min_profit_pct {
                        continue;
                    }
                    opportunities.push(Opportunity {
                        buy_exchange: buy_group.exchange.to_string(),
                        sell_exchange: sell_group.exchange.to_string(),
                        buy_price: buy.price,
                        sell_price: sell.price,
                        profit_pct,
                        buy_timestamp: buy.record.timestamp,
                        sell_timestamp: sell.record.timestamp,
                        buy_signature: buy.record.signature.clone(),
                        sell_signature: sell.record.signature.clone(),
                        asset: buy.record.buy_currency.clone(),
                    });
                }
            }
        }
    }

    Detection {
        opportunities,
        skipped,
        exchanges: groups.len(),
    }
}

/// A record that passed price validation.
struct PricedTrade<'a> {
    record: &'a TradeRecord,
    price: f64,
}

/// All usable trades of one exchange, in input order, plus an index sorted by
/// timestamp for window lookups.
struct ExchangeGroup<'a> {
    exchange: &'a str,
    trades: Vec<PricedTrade<'a>>,
    by_time: Vec<usize>,
}

impl<'a> ExchangeGroup<'a> {
    fn new(exchange: &'a str) -> Self {
        Self {
            exchange,
            trades: Vec::new(),
            by_time: Vec::new(),
        }
    }

    fn index(&mut self) {
        let trades = &self.trades;
        let mut order: Vec<usize> = (0..trades.len()).collect();
        order.sort_by_key(|&idx| trades[idx].record.timestamp);
        self.by_time = order;
    }

    /// Trades with `|timestamp - at| <= window`, yielded in input order.
    fn within(
        &self,
        at: DateTime<Utc>,
        window: TimeDelta,
    ) -> impl Iterator<Item = &PricedTrade<'a>> {
        let ts = |idx: &usize| self.trades[*idx].record.timestamp;
        let lo = match at.checked_sub_signed(window) {
            Some(start) => self.by_time.partition_point(|idx| ts(idx) < start),
            None => 0,
        };
        let hi = match at.checked_add_signed(window) {
            Some(end) => self.by_time.partition_point(|idx| ts(idx) <= end),
            None => self.by_time.len(),
        };

        let mut hits: Vec<usize> = self.by_time[lo..hi.max(lo)].to_vec();
        hits.sort_unstable();
        hits.into_iter().map(move |idx| &self.trades[idx])
    }
}

fn group_by_exchange(trades: &[TradeRecord]) -> (Vec<ExchangeGroup<'_>>, usize) {
    let mut groups: Vec<ExchangeGroup<'_>> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut skipped = 0usize;

    for record in trades {
        let Some(price) = record.usable_price() else {
            skipped += 1;
            debug!(
                exchange = %record.exchange,
                signature = %record.signature,
                price = ?record.price,
                "[SCAN] skipping record without usable price"
            );
            continue;
        };
        let slot = *slots.entry(record.exchange.as_str()).or_insert_with(|| {
            groups.push(ExchangeGroup::new(record.exchange.as_str()));
            groups.len() - 1
        });
        groups[slot].trades.push(PricedTrade { record, price });
    }

    for group in &mut groups {
        group.index();
    }
    (groups, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn trade(exchange: &str, sig: &str, price: Option<f64>, offset_secs: i64) -> TradeRecord {
        TradeRecord {
            exchange: exchange.into(),
            signature: sig.into(),
            timestamp: t0() + TimeDelta::seconds(offset_secs),
            price,
            price_usd: price,
            buy_currency: "Wrapped Solana".into(),
            sell_currency: "USD Coin".into(),
            amount: Some(1.0),
        }
    }

    fn two_exchange_scenario() -> Vec<TradeRecord> {
        vec![
            trade("Raydium", "r1", Some(100.0), 0),
            trade("Orca", "o1", Some(102.0), 60),
        ]
    }

    /// Cross-product reference used to check the indexed scan.
    fn naive(trades: &[TradeRecord], window: TimeDelta, min: f64) -> Vec<Opportunity> {
        let mut order: Vec<&str> = Vec::new();
        for t in trades {
            if t.usable_price().is_some() && !order.contains(&t.exchange.as_str()) {
                order.push(t.exchange.as_str());
            }
        }
        let mut out = Vec::new();
        for e1 in &order {
            for e2 in &order {
                if e1 == e2 {
                    continue;
                }
                for t1 in trades.iter().filter(|t| t.exchange == *e1) {
                    let Some(p1) = t1.usable_price() else { continue };
                    for t2 in trades.iter().filter(|t| t.exchange == *e2) {
                        let Some(p2) = t2.usable_price() else { continue };
                        let gap = if t1.timestamp >= t2.timestamp {
                            t1.timestamp - t2.timestamp
                        } else {
                            t2.timestamp - t1.timestamp
                        };
                        if gap > window {
                            continue;
                        }
                        let pct = (p2 - p1) / p1 * 100.0;
                        if pct.abs() >= min {
                            out.push(Opportunity {
                                buy_exchange: e1.to_string(),
                                sell_exchange: e2.to_string(),
                                buy_price: p1,
                                sell_price: p2,
                                profit_pct: pct,
                                buy_timestamp: t1.timestamp,
                                sell_timestamp: t2.timestamp,
                                buy_signature: t1.signature.clone(),
                                sell_signature: t2.signature.clone(),
                                asset: t1.buy_currency.clone(),
                            });
                        }
                    }
                }
            }
        }
        out
    }

    #[test]
    fn two_exchanges_yield_trade_and_mirror() {
        let opps = detect(&two_exchange_scenario(), TimeDelta::seconds(300), 1.0).unwrap();
        assert_eq!(opps.len(), 2);

        assert_eq!(opps[0].buy_exchange, "Raydium");
        assert_eq!(opps[0].sell_exchange, "Orca");
        assert_eq!(opps[0].buy_price, 100.0);
        assert_eq!(opps[0].sell_price, 102.0);
        assert!((opps[0].profit_pct - 2.0).abs() < 1e-12);
        assert_eq!(opps[0].buy_signature, "r1");
        assert_eq!(opps[0].sell_signature, "o1");
        assert_eq!(opps[0].buy_timestamp, t0());
        assert_eq!(opps[0].sell_timestamp, t0() + TimeDelta::seconds(60));
        assert_eq!(opps[0].asset, "Wrapped Solana");

        assert_eq!(opps[1].buy_exchange, "Orca");
        assert_eq!(opps[1].sell_exchange, "Raydium");
        assert!((opps[1].profit_pct - (-1.960_784_313_725_490_2)).abs() < 1e-9);
    }

    #[test]
    fn gap_beyond_window_yields_nothing() {
        let opps = detect(&two_exchange_scenario(), TimeDelta::seconds(30), 1.0).unwrap();
        assert!(opps.is_empty());
    }

    #[test]
    fn differential_below_threshold_yields_nothing() {
        let opps = detect(&two_exchange_scenario(), TimeDelta::seconds(300), 5.0).unwrap();
        assert!(opps.is_empty());
    }

    #[test]
    fn window_and_threshold_bounds_are_inclusive() {
        let trades = vec![
            trade("Raydium", "r1", Some(100.0), 0),
            trade("Orca", "o1", Some(102.0), 60),
        ];
        let opps = detect(&trades, TimeDelta::seconds(60), 2.0).unwrap();
        assert_eq!(opps.len(), 1);
        assert_eq!(opps[0].buy_exchange, "Raydium");
    }

    #[test]
    fn mirror_profit_uses_the_other_price_as_basis() {
        let trades = vec![
            trade("Raydium", "r1", Some(87.3), 0),
            trade("Orca", "o1", Some(93.1), -45),
        ];
        let opps = detect(&trades, TimeDelta::seconds(300), 0.0).unwrap();
        assert_eq!(opps.len(), 2);
        let p = opps[0].profit_pct;
        let mirror = opps[1].profit_pct;
        assert!((mirror - (-p / (1.0 + p / 100.0))).abs() < 1e-9);
        assert!((mirror + p).abs() > 1e-3, "mirror is not a plain negation");
    }

    #[test]
    fn single_exchange_never_compares_with_itself() {
        let trades = vec![
            trade("Raydium", "r1", Some(100.0), 0),
            trade("Raydium", "r2", Some(150.0), 1),
            trade("Raydium", "r3", Some(50.0), 2),
        ];
        let detection = detect_with_stats(&trades, &DetectorConfig::default());
        assert!(detection.opportunities.is_empty());
        assert_eq!(detection.exchanges, 1);
    }

    #[test]
    fn empty_input_is_not_an_error() {
        let opps = detect(&[], TimeDelta::seconds(300), 1.0).unwrap();
        assert!(opps.is_empty());
    }

    #[test]
    fn malformed_prices_are_skipped_and_counted() {
        let trades = vec![
            trade("Raydium", "r1", Some(100.0), 0),
            trade("Raydium", "bad1", None, 0),
            trade("Orca", "bad2", Some(0.0), 0),
            trade("Orca", "bad3", Some(-5.0), 0),
            trade("Meteora", "bad4", Some(f64::NAN), 0),
            trade("Orca", "o1", Some(110.0), 10),
        ];
        let detection = detect_with_stats(&trades, &DetectorConfig::default());
        assert_eq!(detection.skipped, 4);
        assert_eq!(detection.exchanges, 2);
        assert_eq!(detection.opportunities.len(), 2);
        assert!(
            detection
                .opportunities
                .iter()
                .all(|o| !o.buy_signature.starts_with("bad") && !o.sell_signature.starts_with("bad"))
        );
    }

    #[test]
    fn only_malformed_second_exchange_yields_nothing() {
        let trades = vec![
            trade("Raydium", "r1", Some(100.0), 0),
            trade("Orca", "o1", None, 0),
        ];
        let detection = detect_with_stats(&trades, &DetectorConfig::default());
        assert!(detection.opportunities.is_empty());
        assert_eq!(detection.skipped, 1);
    }

    #[test]
    fn negative_configuration_fails_fast() {
        let err = detect(&two_exchange_scenario(), TimeDelta::seconds(-1), 1.0).unwrap_err();
        assert!(matches!(err, AppError::InvalidConfiguration(_)));

        let err = detect(&two_exchange_scenario(), TimeDelta::seconds(300), -0.5).unwrap_err();
        assert!(matches!(err, AppError::InvalidConfiguration(_)));

        assert!(DetectorConfig::from_secs(f64::NAN, 1.0).is_err());
        assert!(DetectorConfig::from_secs(300.0, f64::INFINITY).is_err());
    }

    #[test]
    fn from_secs_keeps_fractional_windows() {
        let config = DetectorConfig::from_secs(1.5, 0.0).unwrap();
        assert_eq!(config.time_window(), TimeDelta::milliseconds(1_500));
    }

    #[test]
    fn emission_follows_exchange_then_trade_order() {
        let trades = vec![
            trade("Orca", "o1", Some(100.0), 0),
            trade("Raydium", "r1", Some(105.0), 5),
            trade("Orca", "o2", Some(101.0), 10),
            trade("Meteora", "m1", Some(98.0), 3),
        ];
        let opps = detect(&trades, TimeDelta::seconds(300), 1.0).unwrap();
        let pairs: Vec<(&str, &str)> = opps
            .iter()
            .map(|o| (o.buy_signature.as_str(), o.sell_signature.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("o1", "r1"),
                ("o2", "r1"),
                ("o1", "m1"),
                ("o2", "m1"),
                ("r1", "o1"),
                ("r1", "o2"),
                ("r1", "m1"),
                ("m1", "o1"),
                ("m1", "o2"),
                ("m1", "r1"),
            ]
        );
    }

    #[test]
    fn indexed_scan_matches_cross_product() {
        // Deterministic pseudo-random batch with unsorted timestamps.
        let exchanges = ["Raydium", "Orca", "Meteora", "Phoenix"];
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };
        let trades: Vec<TradeRecord> = (0..120)
            .map(|i| {
                let exchange = exchanges[(next() % 4) as usize];
                let offset = (next() % 1_800) as i64 - 900;
                let price = if i % 17 == 0 {
                    None
                } else {
                    Some(95.0 + (next() % 1_000) as f64 / 100.0)
                };
                trade(exchange, &format!("s{i}"), price, offset)
            })
            .collect();

        for (window, min) in [(0, 0.0), (30, 1.0), (120, 0.5), (600, 3.0)] {
            let window = TimeDelta::seconds(window);
            let fast = detect(&trades, window, min).unwrap();
            assert_eq!(fast, naive(&trades, window, min));
        }
    }

    #[test]
    fn huge_window_does_not_overflow() {
        let trades = two_exchange_scenario();
        let opps = detect(&trades, TimeDelta::MAX, 1.0).unwrap();
        assert_eq!(opps.len(), 2);
    }

    #[test]
    fn detection_is_pure_across_threads() {
        let batches: Vec<Vec<TradeRecord>> = (0..8)
            .map(|k| {
                (0..20)
                    .map(|i| {
                        let exchange = ["Raydium", "Orca", "Meteora"][i % 3];
                        trade(
                            exchange,
                            &format!("b{k}-{i}"),
                            Some(100.0 + ((i * 7 + k) % 11) as f64),
                            (i * 13) as i64,
                        )
                    })
                    .collect()
            })
            .collect();
        let config = DetectorConfig::default();

        let sequential: Vec<Detection> =
            batches.iter().map(|b| detect_with_stats(b, &config)).collect();

        let parallel: Vec<Detection> = std::thread::scope(|scope| {
            let handles: Vec<_> = batches
                .iter()
                .map(|b| scope.spawn(move || detect_with_stats(b, &config)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(sequential, parallel);
        // Re-running on the same input gives the same answer.
        assert_eq!(detect_with_stats(&batches[0], &config), sequential[0]);
    }
}
