//! Visual weight normalization for the interaction graph.
//!
//! Edge opacity is recency-biased with a cubic falloff and a floor; edge
//! width is linear in the message count relative to the busiest edge.
//! Node weight is a pure function of the node's outgoing edge counts.

use std::cmp::Ordering;

use crate::model::InteractionEdge;

/// Lowest opacity an edge can have.
pub const OPACITY_FLOOR: f64 = 0.2;
/// Width of an edge carrying a single message.
pub const MIN_WIDTH: f64 = 1.0;
/// Weight of a participant with no repeated replies.
pub const BASE_NODE_WEIGHT: f64 = 0.5;
/// Weight added to the replier for every repeat reply on the same edge.
pub const REPEAT_REPLY_WEIGHT: f64 = 0.05;

/// Opacity of the edge at `index` (0-based) out of `total`, oldest first.
pub fn opacity(index: usize, total: usize) -> f64 {
    if total <= 1 {
        return OPACITY_FLOOR;
    }
    let ratio = (index as f64).powi(3) / ((total - 1) as f64).powi(3);
    ratio.clamp(OPACITY_FLOOR, 1.0)
}

/// Width of an edge with `count` messages when the busiest edge has `max`.
pub fn width(count: u32, max: u32) -> f64 {
    if max == 0 {
        return MIN_WIDTH;
    }
    2.0 * f64::from(count.saturating_sub(1)) / f64::from(max) + MIN_WIDTH
}

/// Node weight given the message counts of its outgoing edges.
pub fn node_weight<I: IntoIterator<Item = u32>>(outgoing_counts: I) -> f64 {
    let repeats: u32 = outgoing_counts
        .into_iter()
        .map(|c| c.saturating_sub(1))
        .sum();
    BASE_NODE_WEIGHT + REPEAT_REPLY_WEIGHT * f64::from(repeats)
}

/// Oldest first; ties broken by `(source, target)` so the order does not
/// depend on which mutation path built the edge set.
pub fn recency_order(a: &InteractionEdge, b: &InteractionEdge) -> Ordering {
    a.last_timestamp
        .total_cmp(&b.last_timestamp)
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.target.cmp(&b.target))
}

/// Sort by recency and recompute every edge's opacity and width in place.
pub fn normalize(edges: &mut [InteractionEdge]) {
    edges.sort_by(recency_order);
    let total = edges.len();
    let max = edges.iter().map(|e| e.message_count).max().unwrap_or(0);
    for (index, edge) in edges.iter_mut().enumerate() {
        edge.opacity = opacity(index, total);
        edge.width = width(edge.message_count, max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn edge(source: &str, target: &str, count: u32, ts: f64) -> InteractionEdge {
        InteractionEdge {
            source: source.into(),
            target: target.into(),
            message_count: count,
            width: 0.0,
            opacity: 0.0,
            last_timestamp: ts,
        }
    }

    #[test]
    fn test_opacity_single_edge_is_floor() {
        assert_eq!(opacity(0, 1), OPACITY_FLOOR);
    }

    #[test]
    fn test_opacity_newest_edge_is_opaque() {
        assert_eq!(opacity(4, 5), 1.0);
    }

    #[rstest]
    #[case(0, 3, 0.2)]
    #[case(1, 3, 0.2)] // 1/8 = 0.125 floors to 0.2
    #[case(2, 3, 1.0)]
    #[case(3, 5, 27.0 / 64.0)]
    fn test_opacity_cubic(#[case] index: usize, #[case] total: usize, #[case] expected: f64) {
        assert!((opacity(index, total) - expected).abs() < 1e-12);
    }

    #[rstest]
    #[case(1, 1, 1.0)]
    #[case(1, 2, 1.0)]
    #[case(2, 2, 2.0)]
    #[case(3, 3, 1.0 + 4.0 / 3.0)]
    #[case(2, 4, 1.5)]
    fn test_width_linear(#[case] count: u32, #[case] max: u32, #[case] expected: f64) {
        assert!((width(count, max) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_node_weight_counts_repeats_only() {
        assert_eq!(node_weight(Vec::<u32>::new()), 0.5);
        assert_eq!(node_weight([1, 1]), 0.5);
        assert!((node_weight([3, 2]) - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_sorts_oldest_first() {
        let mut edges = vec![edge("b", "a", 1, 5.0), edge("c", "a", 2, 1.0)];
        normalize(&mut edges);
        assert_eq!(edges[0].source, "c");
        assert_eq!(edges[0].opacity, OPACITY_FLOOR);
        assert_eq!(edges[1].opacity, 1.0);
        assert_eq!(edges[0].width, 2.0);
        assert_eq!(edges[1].width, 1.0);
    }

    #[test]
    fn test_normalize_ties_break_on_pair() {
        let mut edges = vec![edge("z", "a", 1, 1.0), edge("b", "a", 1, 1.0)];
        normalize(&mut edges);
        assert_eq!(edges[0].source, "b");
    }

    #[test]
    fn test_normalize_empty_is_noop() {
        let mut edges: Vec<InteractionEdge> = Vec::new();
        normalize(&mut edges);
        assert!(edges.is_empty());
    }
}
