use crate::models::Opportunity;

/// Order opportunities by descending absolute profit percentage.
///
/// The sort is stable, so equal magnitudes keep their detection order.
pub fn rank(mut opportunities: Vec<Opportunity>) -> Vec<Opportunity> {
    opportunities.sort_by(|a, b| b.profit_pct.abs().total_cmp(&a.profit_pct.abs()));
    opportunities
}

/// First `k` entries of an already ranked slice.
pub fn top(ranked: &[Opportunity], k: usize) -> &[Opportunity] {
    &ranked[..k.min(ranked.len())]
}
