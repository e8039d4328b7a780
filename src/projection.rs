//! Full projection of the discussion tree into flat views.
//!
//! One pre-order pass produces the ordered message list, participant
//! nodes, interaction edges and the viewer's alert list. The pass owns its
//! accumulator explicitly; nothing outside [`project`] is mutated.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregate::{Aggregator, Contribution, Delta};
use crate::error::{LookupFailure, LookupStage};
use crate::model::{author_color, AlertEntry, InteractionEdge, Message, ParticipantNode, Viewer};
use crate::tree::{TreeStore, Visit};

/// One entry of the recorded display sequence, pointing into
/// [`Projection::messages`] or [`Projection::alerts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum TimelineEntry {
    Message(usize),
    Alert(usize),
}

/// Everything derived from the tree for one viewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Projection {
    pub messages: Vec<Message>,
    pub nodes: Vec<ParticipantNode>,
    /// Sorted oldest first, opacity/width normalized.
    pub edges: Vec<InteractionEdge>,
    pub alerts: Vec<AlertEntry>,
    /// Messages and visible alerts in tree (insertion) order.
    pub timeline: Vec<TimelineEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<LookupFailure>,
}

impl Projection {
    /// Newest message by timestamp (first one wins on ties).
    pub fn latest_message(&self) -> Option<&Message> {
        self.messages.iter().reduce(|best, m| {
            if m.timestamp > best.timestamp {
                m
            } else {
                best
            }
        })
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }
}

#[derive(Default)]
struct Accumulator {
    messages: Vec<Message>,
    alerts: Vec<AlertEntry>,
    timeline: Vec<TimelineEntry>,
    /// Author of every message emitted so far, by message id.
    authors: HashMap<String, String>,
    aggregate: Aggregator,
    diagnostics: Vec<LookupFailure>,
}

impl Accumulator {
    fn visit(&mut self, visit: Visit<'_>, viewer: &Viewer) {
        let node = &visit.tree.node;
        if !node.is_comment() {
            if viewer.may_see(node) {
                self.timeline.push(TimelineEntry::Alert(self.alerts.len()));
                self.alerts.push(AlertEntry::from_node(node, self.messages.len()));
            } else {
                debug!(target: "discussion::projection", alert_id = %node.id, "alert filtered for viewer");
            }
            return;
        }

        let parent_author = match node.parent_id.as_deref() {
            None => None,
            Some(parent_id) => match self.authors.get(parent_id) {
                Some(author) => Some(author.clone()),
                None => {
                    warn!(
                        target: "discussion::projection",
                        comment_id = %node.id,
                        parent_id = %parent_id,
                        "parent message not emitted, parent username left blank"
                    );
                    self.diagnostics
                        .push(LookupFailure::new(LookupStage::Projection, &node.id, parent_id));
                    None
                }
            },
        };

        self.aggregate.apply_comment(
            &Contribution {
                author: &node.author,
                parent_author: parent_author.as_deref(),
                timestamp: node.timestamp,
            },
            Delta::Add,
        );

        self.authors.insert(node.id.clone(), node.author.clone());
        self.timeline.push(TimelineEntry::Message(self.messages.len()));
        self.messages.push(Message {
            id: node.id.clone(),
            author: node.author.clone(),
            text: node.text.clone(),
            parent_id: node.parent_id.clone(),
            depth: visit.depth,
            timestamp: node.timestamp,
            extra_data: node.extra_data.clone(),
            color: author_color(&node.author),
            num_of_children: visit.tree.children.len(),
            child_idx: visit.child_idx,
            branch_id: visit.branch_id,
            parent_username: parent_author.unwrap_or_default(),
        });
    }

    fn finish(mut self) -> Projection {
        self.aggregate.refresh();
        self.sort_alerts();
        Projection {
            messages: self.messages,
            nodes: self.aggregate.nodes(),
            edges: self.aggregate.links().to_vec(),
            alerts: self.alerts,
            timeline: self.timeline,
            diagnostics: self.diagnostics,
        }
    }

    /// Stable-sort alerts by timestamp and repoint the timeline at their
    /// new slots.
    fn sort_alerts(&mut self) {
        let mut order: Vec<usize> = (0..self.alerts.len()).collect();
        order.sort_by(|&a, &b| self.alerts[a].timestamp.total_cmp(&self.alerts[b].timestamp));
        let mut slot = vec![0; order.len()];
        for (new, &old) in order.iter().enumerate() {
            slot[old] = new;
        }
        for entry in &mut self.timeline {
            if let TimelineEntry::Alert(i) = entry {
                *i = slot[*i];
            }
        }
        let mut tagged: Vec<(usize, AlertEntry)> =
            slot.into_iter().zip(std::mem::take(&mut self.alerts)).collect();
        tagged.sort_by_key(|(new, _)| *new);
        self.alerts = tagged.into_iter().map(|(_, alert)| alert).collect();
    }
}

/// Project `tree` for `viewer` in one pre-order pass.
pub fn project(tree: &TreeStore, viewer: &Viewer) -> Projection {
    let mut acc = Accumulator::default();
    for visit in tree.iter() {
        acc.visit(visit, viewer);
    }
    let projection = acc.finish();
    debug!(
        target: "discussion::projection",
        messages = projection.messages.len(),
        nodes = projection.nodes.len(),
        edges = projection.edges.len(),
        alerts = projection.alerts.len(),
        "projection rebuilt"
    );
    projection
}
