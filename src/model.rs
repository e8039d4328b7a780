//! Wire and view types for a threaded discussion.
//!
//! [`CommentNode`] is what arrives from the message channel. [`Message`],
//! [`ParticipantNode`], [`InteractionEdge`] and [`AlertEntry`] are the
//! derived records handed to the presentation layer.

use std::collections::BTreeSet;
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Comment type
// ---------------------------------------------------------------------------

/// Kind of a tree node. Unknown strings are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CommentType {
    #[default]
    Comment,
    Alert,
    Configuration,
    Other(String),
}

impl CommentType {
    pub fn is_comment(&self) -> bool {
        matches!(self, CommentType::Comment)
    }
}

impl From<String> for CommentType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "comment" => CommentType::Comment,
            "alert" => CommentType::Alert,
            "configuration" => CommentType::Configuration,
            _ => CommentType::Other(s),
        }
    }
}

impl From<CommentType> for String {
    fn from(t: CommentType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for CommentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentType::Comment => write!(f, "comment"),
            CommentType::Alert => write!(f, "alert"),
            CommentType::Configuration => write!(f, "configuration"),
            CommentType::Other(s) => write!(f, "{s}"),
        }
    }
}

// ---------------------------------------------------------------------------
// CommentNode
// ---------------------------------------------------------------------------

/// One comment (or alert) as stored in the discussion tree.
///
/// `child_idx` and `branch_id` are derived and attached by the tree store;
/// everything else is immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentNode {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "parentId", default, deserialize_with = "opt_string_or_number")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub comment_type: CommentType,
    #[serde(default, deserialize_with = "object_or_null")]
    pub extra_data: Map<String, Value>,
    #[serde(rename = "childIdx", default, skip_serializing_if = "Option::is_none")]
    pub child_idx: Option<usize>,
    #[serde(rename = "branchId", default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
}

impl CommentNode {
    /// A plain comment with no derived fields.
    pub fn comment(
        id: impl Into<String>,
        author: impl Into<String>,
        text: impl Into<String>,
        parent_id: Option<&str>,
        depth: u32,
        timestamp: f64,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            text: text.into(),
            parent_id: parent_id.map(str::to_string),
            depth,
            timestamp,
            comment_type: CommentType::Comment,
            extra_data: Map::new(),
            child_idx: None,
            branch_id: None,
        }
    }

    /// An alert addressed to `recipients`.
    pub fn alert(
        id: impl Into<String>,
        author: impl Into<String>,
        text: impl Into<String>,
        parent_id: &str,
        timestamp: f64,
        recipients: &Recipients,
    ) -> Self {
        let mut node = Self::comment(id, author, text, Some(parent_id), 0, timestamp);
        node.comment_type = CommentType::Alert;
        node.extra_data = recipients.to_extra_data();
        node
    }

    pub fn is_comment(&self) -> bool {
        self.comment_type.is_comment()
    }

    /// Recipients encoded in `extra_data`. A node without recipient data is
    /// addressed to nobody in particular (only elevated viewers see it).
    pub fn recipients(&self) -> Recipients {
        Recipients::from_extra_data(&self.extra_data)
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected string, number or null parent id, got {other}"
        ))),
    }
}

fn object_or_null<'de, D: Deserializer<'de>>(d: D) -> Result<Map<String, Value>, D::Error> {
    match Value::deserialize(d)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

// ---------------------------------------------------------------------------
// Recipients & viewer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientsKind {
    All,
    List,
}

/// Who an alert is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipients {
    #[serde(rename = "type")]
    pub kind: RecipientsKind,
    pub users: BTreeSet<String>,
}

impl Recipients {
    pub fn all() -> Self {
        Self {
            kind: RecipientsKind::All,
            users: BTreeSet::new(),
        }
    }

    pub fn list<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: RecipientsKind::List,
            users: users.into_iter().map(Into::into).collect(),
        }
    }

    /// Reads `recipients_type` and `users_list` (object keys or string array).
    pub fn from_extra_data(extra: &Map<String, Value>) -> Self {
        let kind = match extra.get("recipients_type").and_then(Value::as_str) {
            Some("all") => RecipientsKind::All,
            _ => RecipientsKind::List,
        };
        let users = match extra.get("users_list") {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => BTreeSet::new(),
        };
        Self { kind, users }
    }

    pub fn to_extra_data(&self) -> Map<String, Value> {
        let mut extra = Map::new();
        let kind = match self.kind {
            RecipientsKind::All => "all",
            RecipientsKind::List => "list",
        };
        extra.insert("recipients_type".into(), Value::String(kind.into()));
        let users = self
            .users
            .iter()
            .map(|u| (u.clone(), Value::Bool(true)))
            .collect::<Map<_, _>>();
        extra.insert("users_list".into(), Value::Object(users));
        extra
    }

    pub fn includes(&self, username: &str) -> bool {
        self.kind == RecipientsKind::All || self.users.contains(username)
    }
}

/// Role of the person looking at the discussion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ViewerRole {
    #[default]
    #[serde(alias = "user")]
    User,
    #[serde(alias = "moderator")]
    Moderator,
    #[serde(alias = "root")]
    Root,
}

impl fmt::Display for ViewerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerRole::User => write!(f, "user"),
            ViewerRole::Moderator => write!(f, "moderator"),
            ViewerRole::Root => write!(f, "root"),
        }
    }
}

/// The viewer a projection is computed for.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewer {
    pub username: String,
    pub role: ViewerRole,
}

impl Viewer {
    pub fn new(username: impl Into<String>, role: ViewerRole) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }

    pub fn is_elevated(&self) -> bool {
        self.role != ViewerRole::User
    }

    /// Access filter applied when a non-comment node is projected.
    pub fn may_see(&self, node: &CommentNode) -> bool {
        match node.comment_type {
            CommentType::Comment => true,
            CommentType::Alert => self.is_elevated() || node.recipients().includes(&self.username),
            _ => self.is_elevated(),
        }
    }
}

// ---------------------------------------------------------------------------
// Projected records
// ---------------------------------------------------------------------------

/// A chat message with the fields denormalized for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub author: String,
    pub text: String,
    pub parent_id: Option<String>,
    pub depth: u32,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra_data: Map<String, Value>,
    pub color: String,
    pub num_of_children: usize,
    pub child_idx: Option<usize>,
    pub branch_id: String,
    /// Author of the parent message, empty for the root or when the parent
    /// could not be resolved.
    pub parent_username: String,
}

impl Message {
    /// A reply to a message by the same author.
    pub fn is_self_reply(&self) -> bool {
        self.parent_id.is_some() && self.parent_username == self.author
    }
}

/// One participant in the interaction graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantNode {
    pub id: String,
    pub color: String,
    pub display_name: String,
    pub visual_weight: f64,
    pub sent_count: u32,
    pub received_count: u32,
}

/// Ordered author pair identifying a directed edge (replier -> replied-to).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: String,
    pub target: String,
}

impl EdgeKey {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// Directed reply edge between two distinct authors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEdge {
    pub source: String,
    pub target: String,
    pub message_count: u32,
    pub width: f64,
    pub opacity: f64,
    pub last_timestamp: f64,
}

impl InteractionEdge {
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(self.source.clone(), self.target.clone())
    }
}

/// An alert visible to the current viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEntry {
    /// Number of chat messages shown before this alert.
    pub position: usize,
    pub id: String,
    pub author: String,
    pub text: String,
    pub parent_id: Option<String>,
    pub timestamp: f64,
    pub kind: CommentType,
    pub recipients: Recipients,
}

impl AlertEntry {
    pub fn from_node(node: &CommentNode, position: usize) -> Self {
        Self {
            position,
            id: node.id.clone(),
            author: node.author.clone(),
            text: node.text.clone(),
            parent_id: node.parent_id.clone(),
            timestamp: node.timestamp,
            kind: node.comment_type.clone(),
            recipients: node.recipients(),
        }
    }
}

// ---------------------------------------------------------------------------
// Author colour
// ---------------------------------------------------------------------------

/// Deterministic `#RRGGBB` colour for an author name.
///
/// 32-bit wrapping string hash over UTF-16 code units, low 24 bits.
pub fn author_color(name: &str) -> String {
    let mut hash: i32 = 0;
    for unit in name.encode_utf16() {
        hash = (unit as i32).wrapping_add(hash.wrapping_shl(5).wrapping_sub(hash));
    }
    format!("#{:06X}", hash & 0x00ff_ffff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_author_color_single_char() {
        assert_eq!(author_color("a"), "#000061");
    }

    #[test]
    fn test_author_color_two_chars() {
        // 97 * 31 + 98 = 3105
        assert_eq!(author_color("ab"), "#000C21");
    }

    #[test]
    fn test_author_color_empty_name_is_black() {
        assert_eq!(author_color(""), "#000000");
    }

    #[test]
    fn test_author_color_long_name_wraps_without_panic() {
        let c = author_color("a-very-long-participant-name-that-overflows-i32");
        assert_eq!(c.len(), 7);
        assert!(c.starts_with('#'));
    }

    #[test]
    fn test_comment_node_parses_wire_names() {
        let node: CommentNode = serde_json::from_value(json!({
            "id": 7,
            "author": "ann",
            "text": "hi",
            "parentId": null,
            "depth": 0,
            "timestamp": 12.5,
            "comment_type": "comment",
            "extra_data": {}
        }))
        .unwrap();
        assert_eq!(node.id, "7");
        assert!(node.parent_id.is_none());
        assert!(node.is_comment());
    }

    #[test]
    fn test_unknown_comment_type_round_trips() {
        let t: CommentType = serde_json::from_value(json!("poll")).unwrap();
        assert_eq!(t, CommentType::Other("poll".into()));
        assert_eq!(serde_json::to_value(&t).unwrap(), json!("poll"));
    }

    #[test]
    fn test_recipients_from_object_keys() {
        let extra = json!({"recipients_type": "list", "users_list": {"bob": true, "cy": false}});
        let r = Recipients::from_extra_data(extra.as_object().unwrap());
        assert_eq!(r.kind, RecipientsKind::List);
        assert!(r.includes("bob"));
        assert!(r.includes("cy"));
        assert!(!r.includes("dan"));
    }

    #[test]
    fn test_recipients_missing_is_empty_list() {
        let r = Recipients::from_extra_data(&Map::new());
        assert_eq!(r.kind, RecipientsKind::List);
        assert!(r.users.is_empty());
    }

    #[test]
    fn test_viewer_alert_filter() {
        let alert = CommentNode::alert("x", "mod", "careful", "1", 1.0, &Recipients::list(["bob"]));
        assert!(Viewer::new("bob", ViewerRole::User).may_see(&alert));
        assert!(!Viewer::new("ann", ViewerRole::User).may_see(&alert));
        assert!(Viewer::new("ann", ViewerRole::Moderator).may_see(&alert));
    }

    #[test]
    fn test_viewer_configuration_nodes_elevated_only() {
        let mut node = CommentNode::comment("c", "mod", "cfg", Some("1"), 1, 2.0);
        node.comment_type = CommentType::Configuration;
        assert!(!Viewer::new("ann", ViewerRole::User).may_see(&node));
        assert!(Viewer::new("ann", ViewerRole::Root).may_see(&node));
    }

    #[test]
    fn test_viewer_role_accepts_upper_and_lower_case() {
        let a: ViewerRole = serde_json::from_value(json!("MODERATOR")).unwrap();
        let b: ViewerRole = serde_json::from_value(json!("moderator")).unwrap();
        assert_eq!(a, b);
    }
}
