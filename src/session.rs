//! One viewer's discussion session.
//!
//! ## Design
//! - Every inbound event is processed to completion before the next one;
//!   there is no locking inside a session.
//! - Live mode rebuilds the projection from the tree on every append.
//!   Replay mode drives a [`ReplayEngine`] built from the joined tree.
//! - After every state change the registered listener receives the
//!   current [`ShownState`]; the listener never mutates the session.
//!
//! ## Event flow
//! 1. `joined` loads the tree, metadata and visual settings.
//! 2. `new_comment` / `new_alert` insert into the tree (live updates).
//! 3. `navigate` steps the replay (only while a moderator controls it).
//! 4. `unauthorized` / `end_session` terminate the session.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{VisualConfig, VisualConfigPatch};
use crate::error::{LookupFailure, LookupStage, ReplayError, Result};
use crate::export;
use crate::model::{CommentNode, Message, Viewer};
use crate::projection::{project, Projection};
use crate::replay::{OrderMode, ReplayEngine, ShownState};
use crate::stats::{DiscussionStats, UserStats};
use crate::tree::{TreeNode, TreeStore};

/// Titles longer than this are shortened for display.
pub const TITLE_DISPLAY_LIMIT: usize = 45;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscussionConfiguration {
    pub vis_config: VisualConfig,
    pub language: Option<String>,
}

/// Discussion metadata sent with the joined payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscussionMeta {
    pub id: String,
    pub title: String,
    pub configuration: DiscussionConfiguration,
}

impl DiscussionMeta {
    /// Title cut to [`TITLE_DISPLAY_LIMIT`] characters with a trailing
    /// ` ...` when it was longer.
    pub fn short_title(&self) -> String {
        if self.title.chars().count() > TITLE_DISPLAY_LIMIT {
            let head: String = self.title.chars().take(TITLE_DISPLAY_LIMIT).collect();
            format!("{head} ...")
        } else {
            self.title.clone()
        }
    }
}

/// Initial payload: full tree, metadata and the viewer's own settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedPayload {
    pub tree: TreeNode,
    #[serde(default)]
    pub discussion: DiscussionMeta,
    #[serde(default)]
    pub visual_config: Option<VisualConfig>,
}

impl JoinedPayload {
    /// Parse a joined payload. A bare `{node, children}` tree is accepted
    /// too and gets default metadata.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.get("tree").is_some() {
            Ok(serde_json::from_value(value)?)
        } else {
            Ok(Self {
                tree: serde_json::from_value(value)?,
                discussion: DiscussionMeta::default(),
                visual_config: None,
            })
        }
    }
}

/// Who drives replay navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Navigation follows the moderator's commands from the channel.
    #[default]
    Moderator,
    /// Each viewer navigates on their own.
    SelfControl,
}

/// A replay navigation command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavCommand {
    Next,
    Back,
    Reset,
    ShowAll,
    ChangeOrder(OrderMode),
    ChangeControlMode(ControlMode),
}

/// Everything the message channel can deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Joined(JoinedPayload),
    NewComment { comment: CommentNode },
    NewAlert { alert: CommentNode },
    ConfigurationChanged { settings: VisualConfigPatch },
    Navigate { command: NavCommand },
    Unauthorized,
    EndSession,
}

impl SessionEvent {
    /// Parse one JSON-encoded event.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Live discussion: the view is the full projection of the tree.
    #[default]
    Live,
    /// Recorded discussion: the view is driven by the replay engine.
    Replay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Unauthorized,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Terminated(TerminationReason),
}

/// Receives the shown state after every change.
pub type ViewListener = Box<dyn FnMut(&ShownState) + Send>;

// ---------------------------------------------------------------------------
// DiscussionSession
// ---------------------------------------------------------------------------

/// State of one discussion view for one viewer.
pub struct DiscussionSession {
    viewer: Viewer,
    mode: SessionMode,
    order: OrderMode,
    control: ControlMode,
    meta: DiscussionMeta,
    visual: VisualConfig,
    tree: Option<TreeStore>,
    projection: Projection,
    replay: Option<ReplayEngine>,
    last_message: Option<Message>,
    diagnostics: Vec<LookupFailure>,
    status: SessionStatus,
    listener: Option<ViewListener>,
}

impl DiscussionSession {
    pub fn new(viewer: Viewer, mode: SessionMode) -> Self {
        Self {
            viewer,
            mode,
            order: OrderMode::default(),
            control: ControlMode::default(),
            meta: DiscussionMeta::default(),
            visual: VisualConfig::default(),
            tree: None,
            projection: Projection::default(),
            replay: None,
            last_message: None,
            diagnostics: Vec::new(),
            status: SessionStatus::Active,
            listener: None,
        }
    }

    /// Replay order used when the session joins.
    pub fn with_order(mut self, order: OrderMode) -> Self {
        self.order = order;
        self
    }

    pub fn with_listener<F>(mut self, listener: F) -> Self
    where
        F: FnMut(&ShownState) + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn set_listener<F>(&mut self, listener: F)
    where
        F: FnMut(&ShownState) + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    // -- accessors -----------------------------------------------------------

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn control_mode(&self) -> ControlMode {
        self.control
    }

    /// Order used by the next replay built for this session.
    pub fn order_mode(&self) -> OrderMode {
        self.order
    }

    pub fn meta(&self) -> &DiscussionMeta {
        &self.meta
    }

    pub fn visual_config(&self) -> VisualConfig {
        self.visual
    }

    pub fn tree(&self) -> Option<&TreeStore> {
        self.tree.as_ref()
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn replay(&self) -> Option<&ReplayEngine> {
        self.replay.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.status, SessionStatus::Terminated(_))
    }

    pub fn is_joined(&self) -> bool {
        self.tree.is_some()
    }

    /// Structural lookups that failed so far (dropped insertions, blank
    /// parent usernames, misplaced replay messages).
    pub fn diagnostics(&self) -> Vec<LookupFailure> {
        let mut all = self.diagnostics.clone();
        all.extend(self.projection.diagnostics.iter().cloned());
        if let Some(engine) = &self.replay {
            all.extend(engine.diagnostics().iter().cloned());
        }
        all
    }

    /// What the presentation layer currently shows.
    pub fn shown_state(&self) -> ShownState {
        match (&self.mode, &self.replay) {
            (SessionMode::Replay, Some(engine)) => engine.snapshot(),
            _ => ShownState::from_projection(&self.projection, self.last_message.clone()),
        }
    }

    pub fn discussion_stats(&self) -> DiscussionStats {
        DiscussionStats::compute(&self.shown_state())
    }

    pub fn user_stats(&self, username: &str) -> Option<UserStats> {
        UserStats::compute(&self.shown_state(), username)
    }

    // -- event handling ------------------------------------------------------

    /// Process one inbound event to completion.
    ///
    /// # Errors
    /// `SessionTerminated` once the session has ended and `NotJoined` for
    /// tree events that arrive before `joined`. Structural lookup failures
    /// are not errors; see [`diagnostics`](Self::diagnostics).
    pub fn handle(&mut self, event: SessionEvent) -> Result<()> {
        if self.is_terminated() {
            return Err(ReplayError::SessionTerminated);
        }
        match event {
            SessionEvent::Joined(payload) => {
                self.join(payload);
                Ok(())
            }
            SessionEvent::NewComment { comment } => self.add_comment(comment),
            SessionEvent::NewAlert { alert } => self.add_alert(alert),
            SessionEvent::ConfigurationChanged { settings } => {
                self.apply_configuration(&settings);
                Ok(())
            }
            SessionEvent::Navigate { command } => {
                if !self.accepts_remote(command) {
                    debug!(target: "discussion::session", ?command, "remote navigation ignored in self-control mode");
                    return Ok(());
                }
                self.navigate(command);
                Ok(())
            }
            SessionEvent::Unauthorized => {
                self.terminate(TerminationReason::Unauthorized);
                Ok(())
            }
            SessionEvent::EndSession => {
                self.terminate(TerminationReason::Ended);
                Ok(())
            }
        }
    }

    /// Apply a navigation command issued by this viewer.
    ///
    /// # Errors
    /// `ControlLocked` when a moderator controls navigation and this viewer
    /// is not elevated; `SessionTerminated` after termination.
    pub fn local_command(&mut self, command: NavCommand) -> Result<bool> {
        self.check_local_control(command)?;
        Ok(self.navigate(command))
    }

    /// Whether a channel navigation `command` would be applied. A
    /// control-mode change always is; everything else only while a
    /// moderator drives the replay.
    pub fn accepts_remote(&self, command: NavCommand) -> bool {
        matches!(command, NavCommand::ChangeControlMode(_))
            || self.control == ControlMode::Moderator
    }

    /// Whether this viewer may issue `command` locally right now.
    pub fn check_local_control(&self, command: NavCommand) -> Result<()> {
        if self.is_terminated() {
            return Err(ReplayError::SessionTerminated);
        }
        let may_control = match command {
            NavCommand::ChangeControlMode(_) => self.viewer.is_elevated(),
            _ => self.viewer.is_elevated() || self.control == ControlMode::SelfControl,
        };
        if may_control {
            Ok(())
        } else {
            Err(ReplayError::ControlLocked)
        }
    }

    /// One forward step of the replay, as issued by auto-play.
    pub fn step_forward(&mut self) -> bool {
        self.navigate(NavCommand::Next)
    }

    pub fn at_end(&self) -> bool {
        self.replay.as_ref().map_or(true, ReplayEngine::at_end)
    }

    fn navigate(&mut self, command: NavCommand) -> bool {
        if let NavCommand::ChangeControlMode(mode) = command {
            info!(target: "discussion::session", ?mode, "control mode changed");
            self.control = mode;
            return false;
        }
        if let NavCommand::ChangeOrder(order) = command {
            self.order = order;
        }
        let Some(engine) = self.replay.as_mut() else {
            debug!(target: "discussion::session", ?command, "navigation ignored, no replay loaded");
            return false;
        };
        let before = engine.current_index();
        match command {
            NavCommand::Next => {
                engine.step_forward();
            }
            NavCommand::Back => {
                engine.step_backward();
            }
            NavCommand::Reset => engine.reset(),
            NavCommand::ShowAll => engine.show_all(),
            NavCommand::ChangeOrder(order) => engine.set_order_mode(order),
            NavCommand::ChangeControlMode(_) => {}
        }
        let changed = engine.current_index() != before || matches!(command, NavCommand::ChangeOrder(_));
        if changed {
            self.notify();
        }
        changed
    }

    fn join(&mut self, payload: JoinedPayload) {
        let tree = TreeStore::new(payload.tree);
        self.visual = VisualConfig::resolve(
            &self.viewer,
            payload.discussion.configuration.vis_config,
            payload.visual_config,
        );
        self.meta = payload.discussion;
        self.projection = project(&tree, &self.viewer);
        self.last_message = self.projection.latest_message().cloned();
        self.replay = match self.mode {
            SessionMode::Replay => Some(ReplayEngine::new(&self.projection, self.order)),
            SessionMode::Live => None,
        };
        info!(
            target: "discussion::session",
            discussion = %self.meta.id,
            title = %self.meta.short_title(),
            messages = self.projection.messages.len(),
            mode = ?self.mode,
            "joined discussion"
        );
        self.tree = Some(tree);
        self.notify();
    }

    fn insert(&mut self, node: CommentNode) -> Result<bool> {
        let tree = self.tree.as_mut().ok_or(ReplayError::NotJoined)?;
        let comment_id = node.id.clone();
        let parent_id = node.parent_id.clone().unwrap_or_default();
        match tree.insert(node) {
            Ok(_) => Ok(true),
            Err(ReplayError::ParentNotFound { .. }) | Err(ReplayError::MissingParent { .. }) => {
                warn!(
                    target: "discussion::session",
                    comment_id = %comment_id,
                    parent_id = %parent_id,
                    "dropping node with unresolved parent"
                );
                self.diagnostics
                    .push(LookupFailure::new(LookupStage::Insert, &comment_id, &parent_id));
                Ok(false)
            }
            Err(other) => Err(other),
        }
    }

    fn rebuild(&mut self) {
        let Some(tree) = &self.tree else {
            return;
        };
        self.projection = project(tree, &self.viewer);
        if let Some(engine) = &self.replay {
            let index = engine.current_index();
            let mut rebuilt = ReplayEngine::new(&self.projection, engine.order_mode());
            rebuilt.seek(index);
            self.replay = Some(rebuilt);
        }
    }

    fn add_comment(&mut self, comment: CommentNode) -> Result<()> {
        let id = comment.id.clone();
        if !self.insert(comment)? {
            return Ok(());
        }
        self.rebuild();
        if let Some(message) = self.projection.message(&id) {
            self.last_message = Some(message.clone());
        }
        self.notify();
        Ok(())
    }

    fn add_alert(&mut self, alert: CommentNode) -> Result<()> {
        if !self.insert(alert)? {
            return Ok(());
        }
        self.rebuild();
        self.notify();
        Ok(())
    }

    fn apply_configuration(&mut self, patch: &VisualConfigPatch) {
        if self.viewer.is_elevated() {
            debug!(target: "discussion::session", "configuration change ignored for elevated viewer");
            return;
        }
        self.visual.apply(patch);
        debug!(target: "discussion::session", visual = ?self.visual, "visual configuration updated");
    }

    fn terminate(&mut self, reason: TerminationReason) {
        info!(target: "discussion::session", ?reason, "session terminated");
        self.status = SessionStatus::Terminated(reason);
    }

    fn notify(&mut self) {
        if self.listener.is_none() {
            return;
        }
        let state = self.shown_state();
        if let Some(listener) = self.listener.as_mut() {
            listener(&state);
        }
    }

    // -- export --------------------------------------------------------------

    /// Full tree as pretty JSON with the discussion details attached.
    pub fn export_tree_json(&self) -> Result<String> {
        let tree = self.tree.as_ref().ok_or(ReplayError::NotJoined)?;
        export::tree_json(tree, &self.meta)
    }

    /// Comma-separated export of all projected messages.
    pub fn export_csv(&self) -> String {
        export::messages_csv(&self.projection.messages)
    }
}
