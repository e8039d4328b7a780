//! Incremental node/edge aggregation.
//!
//! ## Design
//! - The aggregator is the only owner of participant and edge state; the
//!   projection builder and the replay engine each hold their own instance.
//! - Mutations go through [`Aggregator::apply_comment`] with a [`Delta`] so
//!   the replay engine can undo exactly what it applied.
//! - Visual weight, opacity and width are recomputed by
//!   [`Aggregator::refresh`] from counts alone; they are never mutated
//!   directly.

use indexmap::IndexMap;
use tracing::debug;

use crate::model::{author_color, EdgeKey, InteractionEdge, ParticipantNode};
use crate::normalize;

/// Direction of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    Add,
    Remove,
}

/// What one comment contributes to the graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution<'a> {
    pub author: &'a str,
    /// Author of the replied-to comment, when it could be resolved.
    pub parent_author: Option<&'a str>,
    pub timestamp: f64,
}

impl Contribution<'_> {
    pub fn is_self_reply(&self) -> bool {
        self.parent_author == Some(self.author)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct EdgeRecord {
    /// Timestamps of the comments counted on this edge, in application order.
    contributions: Vec<f64>,
}

impl EdgeRecord {
    fn last_timestamp(&self) -> f64 {
        self.contributions
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Participant and edge state for one materialized view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregator {
    nodes: IndexMap<String, ParticipantNode>,
    edges: IndexMap<EdgeKey, EdgeRecord>,
    links: Vec<InteractionEdge>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply or undo one comment. Self-replies are invisible to the graph.
    ///
    /// Returns `true` when node or edge state changed. Call
    /// [`refresh`](Self::refresh) afterwards.
    pub fn apply_comment(&mut self, c: &Contribution<'_>, delta: Delta) -> bool {
        if c.is_self_reply() {
            debug!(target: "discussion::aggregate", author = %c.author, "self reply skipped");
            return false;
        }
        match delta {
            Delta::Add => {
                self.apply_sent(c.author, Delta::Add);
                if let Some(parent) = c.parent_author {
                    self.apply_received(parent, Delta::Add);
                    self.apply_edge(&EdgeKey::new(c.author, parent), Delta::Add, c.timestamp);
                }
            }
            Delta::Remove => {
                if let Some(parent) = c.parent_author {
                    self.apply_edge(&EdgeKey::new(c.author, parent), Delta::Remove, c.timestamp);
                    self.apply_received(parent, Delta::Remove);
                }
                self.apply_sent(c.author, Delta::Remove);
                self.prune_node(c.author);
                if let Some(parent) = c.parent_author {
                    self.prune_node(parent);
                }
            }
        }
        true
    }

    /// Add or remove one message on the `key` edge. An edge is created on its
    /// first message and removed when its count reaches zero.
    pub fn apply_edge(&mut self, key: &EdgeKey, delta: Delta, timestamp: f64) {
        if key.source == key.target {
            return;
        }
        match delta {
            Delta::Add => {
                self.edges
                    .entry(key.clone())
                    .or_insert_with(|| EdgeRecord {
                        contributions: Vec::new(),
                    })
                    .contributions
                    .push(timestamp);
            }
            Delta::Remove => {
                let Some(record) = self.edges.get_mut(key) else {
                    return;
                };
                let pos = record
                    .contributions
                    .iter()
                    .rposition(|t| t.total_cmp(&timestamp).is_eq())
                    .unwrap_or(record.contributions.len().saturating_sub(1));
                if !record.contributions.is_empty() {
                    record.contributions.remove(pos);
                }
                if record.contributions.is_empty() {
                    self.edges.shift_remove(key);
                    debug!(target: "discussion::aggregate", edge = %key, "edge removed");
                }
            }
        }
    }

    /// Count one sent message for `author`, creating its node on first sight.
    pub fn apply_sent(&mut self, author: &str, delta: Delta) {
        match delta {
            Delta::Add => {
                self.nodes
                    .entry(author.to_string())
                    .or_insert_with(|| new_participant(author))
                    .sent_count += 1;
            }
            Delta::Remove => {
                if let Some(node) = self.nodes.get_mut(author) {
                    node.sent_count = node.sent_count.saturating_sub(1);
                }
            }
        }
    }

    /// Count one received reply for `author`. A reply can be revealed before
    /// anything its target wrote (chronological replay), so the node is
    /// created here too.
    pub fn apply_received(&mut self, author: &str, delta: Delta) {
        match delta {
            Delta::Add => {
                self.nodes
                    .entry(author.to_string())
                    .or_insert_with(|| new_participant(author))
                    .received_count += 1;
            }
            Delta::Remove => {
                if let Some(node) = self.nodes.get_mut(author) {
                    node.received_count = node.received_count.saturating_sub(1);
                }
            }
        }
    }

    /// Drop `author` once it has no messages and no edges, unless it is the
    /// last node left.
    fn prune_node(&mut self, author: &str) {
        let Some(node) = self.nodes.get(author) else {
            return;
        };
        if node.sent_count > 0 || self.nodes.len() <= 1 || self.has_edges(author) {
            return;
        }
        self.nodes.shift_remove(author);
        debug!(target: "discussion::aggregate", author = %author, "node removed");
    }

    fn has_edges(&self, author: &str) -> bool {
        self.edges
            .keys()
            .any(|k| k.source == author || k.target == author)
    }

    /// Recompute node weights and the normalized, recency-sorted edge list.
    pub fn refresh(&mut self) {
        for (id, node) in self.nodes.iter_mut() {
            node.visual_weight = normalize::node_weight(
                self.edges
                    .iter()
                    .filter(|(k, _)| &k.source == id)
                    .map(|(_, r)| r.contributions.len() as u32),
            );
        }
        let mut links: Vec<InteractionEdge> = self
            .edges
            .iter()
            .map(|(key, record)| InteractionEdge {
                source: key.source.clone(),
                target: key.target.clone(),
                message_count: record.contributions.len() as u32,
                width: normalize::MIN_WIDTH,
                opacity: normalize::OPACITY_FLOOR,
                last_timestamp: record.last_timestamp(),
            })
            .collect();
        normalize::normalize(&mut links);
        self.links = links;
    }

    /// Participants in first-appearance order.
    pub fn nodes(&self) -> Vec<ParticipantNode> {
        self.nodes.values().cloned().collect()
    }

    pub fn node(&self, author: &str) -> Option<&ParticipantNode> {
        self.nodes.get(author)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Edges, oldest first, as of the last [`refresh`](Self::refresh).
    pub fn links(&self) -> &[InteractionEdge] {
        &self.links
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn message_count(&self, key: &EdgeKey) -> u32 {
        self.edges
            .get(key)
            .map(|r| r.contributions.len() as u32)
            .unwrap_or(0)
    }
}

fn new_participant(author: &str) -> ParticipantNode {
    ParticipantNode {
        id: author.to_string(),
        color: author_color(author),
        display_name: author.to_string(),
        visual_weight: normalize::BASE_NODE_WEIGHT,
        sent_count: 0,
        received_count: 0,
    }
}
