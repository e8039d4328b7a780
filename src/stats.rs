//! Discussion- and user-level statistics over the currently shown state.

use serde::Serialize;

use crate::model::ParticipantNode;
use crate::replay::ShownState;

/// Headline numbers for the whole discussion view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionStats {
    pub participants: usize,
    pub comments: usize,
    /// Participant who sent the most messages.
    pub replied_most: String,
    /// Participant who received the most replies.
    pub received_most: String,
}

impl DiscussionStats {
    pub fn compute(state: &ShownState) -> Self {
        let top_by = |metric: fn(&ParticipantNode) -> u32| {
            let mut best: Option<&ParticipantNode> = None;
            for node in &state.nodes {
                if best.map_or(true, |b| metric(node) > metric(b)) {
                    best = Some(node);
                }
            }
            best.map(|n| n.id.clone()).unwrap_or_default()
        };
        Self {
            participants: state.nodes.len(),
            comments: state.messages.len(),
            replied_most: top_by(|n| n.sent_count),
            received_most: top_by(|n| n.received_count),
        }
    }
}

/// Reply partner and the number of messages exchanged in one direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partner {
    pub username: String,
    pub messages: u32,
}

/// Numbers for one selected participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub username: String,
    pub sent: u32,
    pub received: u32,
    /// Who this user replied to, busiest first.
    pub replied_to: Vec<Partner>,
    /// Who replied to this user, busiest first.
    pub replied_by: Vec<Partner>,
    /// Fraction of shown messages written by this user.
    pub share: f64,
}

impl UserStats {
    /// `None` when the user is not part of the shown graph.
    pub fn compute(state: &ShownState, username: &str) -> Option<Self> {
        let node = state.nodes.iter().find(|n| n.id == username)?;

        let mut replied_to: Vec<Partner> = state
            .links
            .iter()
            .filter(|l| l.source == username)
            .map(|l| Partner {
                username: l.target.clone(),
                messages: l.message_count,
            })
            .collect();
        let mut replied_by: Vec<Partner> = state
            .links
            .iter()
            .filter(|l| l.target == username)
            .map(|l| Partner {
                username: l.source.clone(),
                messages: l.message_count,
            })
            .collect();
        let busiest = |a: &Partner, b: &Partner| {
            b.messages
                .cmp(&a.messages)
                .then_with(|| a.username.cmp(&b.username))
        };
        replied_to.sort_by(busiest);
        replied_by.sort_by(busiest);

        let written = state.messages.iter().filter(|m| m.author == username).count();
        let share = if state.messages.is_empty() {
            0.0
        } else {
            written as f64 / state.messages.len() as f64
        };

        Some(Self {
            username: username.to_string(),
            sent: node.sent_count,
            received: node.received_count,
            replied_to,
            replied_by,
            share,
        })
    }
}
