//! Projection and step-wise replay of threaded discussions.
//!
//! A discussion arrives as a comment tree. [`projection::project`] turns it
//! into the flat views a discussion page shows: the chat list, the
//! participant interaction graph and the viewer's alerts. The
//! [`replay::ReplayEngine`] reveals the same content one item at a time and
//! can step back exactly. [`session::DiscussionSession`] ties both to the
//! inbound event channel, and [`player::Player`] adds cancellable auto-play.

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod normalize;
pub mod player;
pub mod projection;
pub mod replay;
pub mod session;
pub mod stats;
pub mod tree;

pub use config::{AppConfig, VisualConfig};
pub use error::{LookupFailure, ReplayError, Result};
pub use model::{
    author_color, AlertEntry, CommentNode, CommentType, InteractionEdge, Message, ParticipantNode,
    Recipients, Viewer, ViewerRole,
};
pub use player::Player;
pub use projection::{project, Projection};
pub use replay::{OrderMode, ReplayEngine, ShownState};
pub use session::{DiscussionSession, NavCommand, SessionEvent, SessionMode};
pub use stats::{DiscussionStats, UserStats};
pub use tree::{TreeNode, TreeStore};
