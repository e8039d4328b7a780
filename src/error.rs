//! Crate-level error type.
//!
//! Core mutation paths (tree insertion, projection, replay stepping) are
//! non-fatal by contract: a structural lookup failure drops the affected
//! effect and is reported as a [`LookupFailure`] diagnostic, while the
//! variants below surface only to callers that asked for a specific result.

use serde::Serialize;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ReplayError>;

/// All errors the crate can return.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// An insertion referenced a parent id that is not present in the tree.
    #[error("parent '{parent_id}' not found for comment '{comment_id}'")]
    ParentNotFound { parent_id: String, comment_id: String },

    /// A non-root comment arrived without a parent id.
    #[error("comment '{comment_id}' has no parent id")]
    MissingParent { comment_id: String },

    /// An operation needed the discussion tree before the session joined.
    #[error("session has not joined a discussion yet")]
    NotJoined,

    /// The session was ended or the viewer was rejected.
    #[error("session terminated")]
    SessionTerminated,

    /// Local navigation was attempted while a moderator controls playback.
    #[error("navigation is controlled by the moderator")]
    ControlLocked,

    /// Configuration values failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a structural lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStage {
    /// Live insertion into the tree store.
    Insert,
    /// Parent-author resolution while projecting.
    Projection,
    /// Positional insertion during chronological replay.
    Replay,
}

/// A diagnosable record of a parent id that could not be resolved.
///
/// The affected effect (insertion, `parent_username`, graph edge) is
/// dropped; the rest of the view stays available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupFailure {
    pub stage: LookupStage,
    pub comment_id: String,
    pub parent_id: String,
}

impl LookupFailure {
    pub fn new(stage: LookupStage, comment_id: &str, parent_id: &str) -> Self {
        Self {
            stage,
            comment_id: comment_id.to_string(),
            parent_id: parent_id.to_string(),
        }
    }
}
