//! Human readable rendering of ranked opportunities.

use crate::models::{JupiterSwap, Opportunity, PricePoint};

/// One display line per opportunity, numbered from 1.
pub fn render_top(ranked: &[Opportunity], k: usize) -> Vec<String> {
    crate::arbitrage::top(ranked, k)
        .iter()
        .enumerate()
        .map(|(i, opp)| {
            format!(
                "#{} Buy on {} @ {} → Sell on {} @ {} | Profit {:.2}% | {}",
                i + 1,
                opp.buy_exchange,
                opp.buy_price,
                opp.sell_exchange,
                opp.sell_price,
                opp.profit_pct,
                opp.buy_timestamp.to_rfc3339()
            )
        })
        .collect()
}

fn or_dash(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub fn render_history(points: &[PricePoint]) -> Vec<String> {
    points
        .iter()
        .map(|p| {
            format!(
                "{} {} price={} usd={}",
                p.timestamp.to_rfc3339(),
                p.exchange,
                or_dash(p.price),
                or_dash(p.price_usd)
            )
        })
        .collect()
}

pub fn render_jupiter(swaps: &[JupiterSwap]) -> Vec<String> {
    swaps
        .iter()
        .map(|s| {
            format!(
                "{} {} {} → {} ({}, {} log lines)",
                s.timestamp.to_rfc3339(),
                s.signature,
                s.buy_mint,
                s.sell_mint,
                s.program,
                s.logs.len()
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn renders_two_decimal_profit() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let opp = Opportunity {
            buy_exchange: "Orca".into(),
            sell_exchange: "Raydium".into(),
            buy_price: 102.0,
            sell_price: 100.0,
            profit_pct: -1.960_784_313_725_490_2,
            buy_timestamp: ts,
            sell_timestamp: ts,
            buy_signature: "a".into(),
            sell_signature: "b".into(),
            asset: "Wrapped Solana".into(),
        };
        let lines = render_top(&[opp.clone(), opp], 1);
        assert_eq!(
            lines,
            vec![
                "#1 Buy on Orca @ 102 → Sell on Raydium @ 100 | Profit -1.96% | 2024-05-01T12:00:00+00:00"
                    .to_string()
            ]
        );
    }

    #[test]
    fn history_marks_missing_prices() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let lines = render_history(&[PricePoint {
            timestamp: ts,
            price: None,
            price_usd: Some(150.5),
            exchange: "phoenix".into(),
        }]);
        assert_eq!(lines, vec!["2024-05-01T00:00:00+00:00 phoenix price=- usd=150.5"]);
    }

    #[test]
    fn jupiter_lines_show_route_and_log_count() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 3, 0).unwrap();
        let lines = render_jupiter(&[JupiterSwap {
            signature: "4kSig".into(),
            timestamp: ts,
            program: "Jupiter Aggregator v6".into(),
            buy_mint: "So111".into(),
            sell_mint: "Unknown".into(),
            logs: vec!["Program log: Route".into()],
        }]);
        assert_eq!(
            lines,
            vec!["2024-05-01T12:03:00+00:00 4kSig So111 → Unknown (Jupiter Aggregator v6, 1 log lines)"]
        );
    }
}
