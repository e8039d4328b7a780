//! Step-wise, reversible replay over a recorded message sequence.
//!
//! ## Design
//! - The engine keeps its own [`Aggregator`]; it never re-runs the
//!   projection. Every step applies one item with [`Delta::Add`] and every
//!   back-step undoes the same item with [`Delta::Remove`].
//! - `current_index` counts applied items and never drops below 1 once
//!   the sequence is non-empty: the first message is always shown.
//! - In chronological mode messages arrive by timestamp but are placed
//!   into a valid pre-order display via the per-parent children index.
//! - Stepping past either end is a silent no-op reported as `false`.

use std::collections::HashMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregate::{Aggregator, Contribution, Delta};
use crate::error::{LookupFailure, LookupStage};
use crate::model::{AlertEntry, InteractionEdge, Message, ParticipantNode};
use crate::projection::{Projection, TimelineEntry};

/// Order in which recorded items are replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderMode {
    /// By timestamp, reconciled into tree positions.
    #[default]
    Chronological,
    /// Tree arrival order.
    Regular,
}

impl std::fmt::Display for OrderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderMode::Chronological => write!(f, "chronological"),
            OrderMode::Regular => write!(f, "regular"),
        }
    }
}

/// What the presentation layer receives after every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShownState {
    pub messages: Vec<Message>,
    pub nodes: Vec<ParticipantNode>,
    pub links: Vec<InteractionEdge>,
    pub alerts: Vec<AlertEntry>,
    pub last_message: Option<Message>,
}

impl ShownState {
    /// The complete view of a projection.
    pub fn from_projection(p: &Projection, last_message: Option<Message>) -> Self {
        Self {
            messages: p.messages.clone(),
            nodes: p.nodes.clone(),
            links: p.edges.clone(),
            alerts: p.alerts.clone(),
            last_message,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ReplayItem {
    Comment(Message),
    Alert(AlertEntry),
}

impl ReplayItem {
    fn timestamp(&self) -> f64 {
        match self {
            ReplayItem::Comment(m) => m.timestamp,
            ReplayItem::Alert(a) => a.timestamp,
        }
    }
}

fn parent_author(m: &Message) -> Option<&str> {
    match m.parent_id {
        Some(_) if !m.parent_username.is_empty() => Some(m.parent_username.as_str()),
        _ => None,
    }
}

/// Replay state for one discussion view.
#[derive(Debug, Clone)]
pub struct ReplayEngine {
    regular: Vec<ReplayItem>,
    chronological: Vec<ReplayItem>,
    order: OrderMode,
    current_index: usize,
    shown_messages: Vec<Message>,
    shown_alerts: Vec<AlertEntry>,
    aggregate: Aggregator,
    /// Ids of the children shown so far, per parent id (chronological mode).
    children_so_far: HashMap<String, Vec<String>>,
    diagnostics: Vec<LookupFailure>,
}

impl ReplayEngine {
    /// Build the engine from a full projection and show the first item.
    pub fn new(projection: &Projection, order: OrderMode) -> Self {
        let regular: Vec<ReplayItem> = projection
            .timeline
            .iter()
            .filter_map(|entry| match *entry {
                TimelineEntry::Message(i) => projection.messages.get(i).cloned().map(ReplayItem::Comment),
                TimelineEntry::Alert(i) => projection.alerts.get(i).cloned().map(ReplayItem::Alert),
            })
            .collect();

        let mut chronological = regular.clone();
        if chronological.len() > 1 {
            chronological[1..].sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
        }

        let mut engine = Self {
            regular,
            chronological,
            order,
            current_index: 0,
            shown_messages: Vec::new(),
            shown_alerts: Vec::new(),
            aggregate: Aggregator::new(),
            children_so_far: HashMap::new(),
            diagnostics: Vec::new(),
        };
        engine.initialize();
        engine
    }

    fn sequence(&self) -> &[ReplayItem] {
        match self.order {
            OrderMode::Chronological => &self.chronological,
            OrderMode::Regular => &self.regular,
        }
    }

    fn initialize(&mut self) {
        self.current_index = 0;
        self.shown_messages.clear();
        self.shown_alerts.clear();
        self.children_so_far.clear();
        self.aggregate = Aggregator::new();
        self.step_forward_unchecked();
    }

    /// Number of items applied so far (1-based position in the sequence).
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn len(&self) -> usize {
        self.sequence().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence().is_empty()
    }

    pub fn order_mode(&self) -> OrderMode {
        self.order
    }

    pub fn at_start(&self) -> bool {
        self.current_index <= 1
    }

    pub fn at_end(&self) -> bool {
        self.current_index >= self.len()
    }

    pub fn shown_messages(&self) -> &[Message] {
        &self.shown_messages
    }

    pub fn shown_alerts(&self) -> &[AlertEntry] {
        &self.shown_alerts
    }

    pub fn shown_nodes(&self) -> Vec<ParticipantNode> {
        self.aggregate.nodes()
    }

    pub fn shown_links(&self) -> &[InteractionEdge] {
        self.aggregate.links()
    }

    /// Parent lookups that failed while placing messages.
    pub fn diagnostics(&self) -> &[LookupFailure] {
        &self.diagnostics
    }

    /// Comment most recently revealed in sequence order.
    pub fn last_message(&self) -> Option<&Message> {
        self.sequence()[..self.current_index]
            .iter()
            .rev()
            .find_map(|item| match item {
                ReplayItem::Comment(m) => Some(m),
                ReplayItem::Alert(_) => None,
            })
    }

    pub fn snapshot(&self) -> ShownState {
        ShownState {
            messages: self.shown_messages.clone(),
            nodes: self.aggregate.nodes(),
            links: self.aggregate.links().to_vec(),
            alerts: self.shown_alerts.clone(),
            last_message: self.last_message().cloned(),
        }
    }

    /// Reveal the next item. Returns `false` at the end of the sequence.
    pub fn step_forward(&mut self) -> bool {
        if self.at_end() {
            debug!(target: "discussion::replay", index = self.current_index, "already at end");
            return false;
        }
        self.step_forward_unchecked()
    }

    fn step_forward_unchecked(&mut self) -> bool {
        let Some(item) = self.sequence().get(self.current_index).cloned() else {
            return false;
        };
        match item {
            ReplayItem::Alert(mut alert) => {
                alert.position = self.shown_messages.len();
                let at = self
                    .shown_alerts
                    .partition_point(|a| a.timestamp <= alert.timestamp);
                self.shown_alerts.insert(at, alert);
            }
            ReplayItem::Comment(message) => {
                let changed = self.aggregate.apply_comment(
                    &Contribution {
                        author: &message.author,
                        parent_author: parent_author(&message),
                        timestamp: message.timestamp,
                    },
                    Delta::Add,
                );
                if changed {
                    self.aggregate.refresh();
                }
                match self.order {
                    OrderMode::Regular => self.shown_messages.push(message),
                    OrderMode::Chronological => self.place_chronologically(message),
                }
            }
        }
        self.current_index += 1;
        true
    }

    /// Hide the most recently revealed item. Returns `false` at index 1.
    pub fn step_backward(&mut self) -> bool {
        if self.at_start() {
            debug!(target: "discussion::replay", index = self.current_index, "already at start");
            return false;
        }
        let Some(item) = self.sequence().get(self.current_index - 1).cloned() else {
            return false;
        };
        match item {
            ReplayItem::Alert(alert) => {
                if let Some(at) = self.shown_alerts.iter().rposition(|a| a.id == alert.id) {
                    self.shown_alerts.remove(at);
                }
            }
            ReplayItem::Comment(message) => {
                self.unplace(&message);
                let changed = self.aggregate.apply_comment(
                    &Contribution {
                        author: &message.author,
                        parent_author: parent_author(&message),
                        timestamp: message.timestamp,
                    },
                    Delta::Remove,
                );
                if changed {
                    self.aggregate.refresh();
                }
            }
        }
        self.current_index -= 1;
        true
    }

    /// Step back to index 1, one item at a time.
    pub fn reset(&mut self) {
        while self.step_backward() {}
    }

    /// Step forward to the end, one item at a time.
    pub fn show_all(&mut self) {
        while self.step_forward() {}
    }

    /// Step until `index` (clamped to the sequence) is reached.
    pub fn seek(&mut self, index: usize) {
        let target = index.clamp(self.len().min(1), self.len());
        while self.current_index < target && self.step_forward() {}
        while self.current_index > target && self.step_backward() {}
    }

    /// Reset, then swap the source sequence. Leaves the index at 1.
    pub fn set_order_mode(&mut self, mode: OrderMode) {
        self.reset();
        self.order = mode;
        self.initialize();
        debug!(target: "discussion::replay", order = %mode, "order mode changed");
    }

    fn place_chronologically(&mut self, message: Message) {
        let Some(parent_id) = message.parent_id.clone() else {
            self.shown_messages.push(message);
            return;
        };
        let Some(parent_pos) = self.shown_messages.iter().position(|m| m.id == parent_id) else {
            warn!(
                target: "discussion::replay",
                comment_id = %message.id,
                parent_id = %parent_id,
                "parent not shown, message appended at the end"
            );
            self.diagnostics
                .push(LookupFailure::new(LookupStage::Replay, &message.id, &parent_id));
            self.shown_messages.push(message);
            return;
        };

        let shown = &self.shown_messages;
        let siblings = self.children_so_far.entry(parent_id).or_default();
        let last_child_pos = siblings
            .last()
            .and_then(|last| shown.iter().position(|m| &m.id == last));
        let insert_at = match last_child_pos {
            None => parent_pos + 1,
            Some(child_pos) => {
                let child_depth = shown[child_pos].depth;
                let mut pos = child_pos + 1;
                while pos < shown.len() && shown[pos].depth > child_depth {
                    pos += 1;
                }
                pos
            }
        };
        siblings.push(message.id.clone());
        self.shown_messages.insert(insert_at, message);
    }

    fn unplace(&mut self, message: &Message) {
        if let Some(pos) = self.shown_messages.iter().rposition(|m| m.id == message.id) {
            self.shown_messages.remove(pos);
        }
        if let Some(parent_id) = message.parent_id.as_deref() {
            if let Some(siblings) = self.children_so_far.get_mut(parent_id) {
                if let Some(pos) = siblings.iter().rposition(|id| id == &message.id) {
                    siblings.remove(pos);
                }
                if siblings.is_empty() {
                    self.children_so_far.remove(parent_id);
                }
            }
        }
        if let Some(pos) = self
            .diagnostics
            .iter()
            .rposition(|d| d.comment_id == message.id)
        {
            self.diagnostics.remove(pos);
        }
    }
}
