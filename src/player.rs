//! Auto-play and event pumping for a shared [`DiscussionSession`].
//!
//! ## Design
//! - The session lives behind an `Arc<tokio::sync::Mutex<_>>`; the lock is
//!   held for one step at a time, never across a sleep.
//! - Auto-play runs as a spawned task with a cancellation flag that is
//!   checked before every step. Any navigation the session acts on
//!   cancels a running auto-play first, so two step sources never
//!   interleave.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::error::{ReplayError, Result};
use crate::session::{DiscussionSession, NavCommand, SessionEvent};

/// Delay between automatic steps when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1_000);

pub type SharedSession = Arc<Mutex<DiscussionSession>>;

struct Autoplay {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<usize>,
}

/// Drives one session from the event channel and from auto-play.
pub struct Player {
    session: SharedSession,
    autoplay: Option<Autoplay>,
}

impl Player {
    pub fn new(session: DiscussionSession) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            autoplay: None,
        }
    }

    pub fn session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    /// `true` while an auto-play task is still stepping.
    pub fn is_playing(&self) -> bool {
        self.autoplay
            .as_ref()
            .is_some_and(|a| !a.handle.is_finished() && !a.cancel.load(Ordering::SeqCst))
    }

    /// Start stepping forward every `interval` until the end of the replay,
    /// cancellation or termination. A running auto-play is cancelled first.
    ///
    /// # Errors
    /// `ControlLocked` when this viewer may not navigate, `NotJoined` when
    /// no replay is loaded.
    pub async fn simulate(&mut self, interval: Duration) -> Result<()> {
        self.cancel();
        {
            let session = self.session.lock().await;
            session.check_local_control(NavCommand::Next)?;
            if session.replay().is_none() {
                return Err(ReplayError::NotJoined);
            }
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let session = Arc::clone(&self.session);
        info!(target: "discussion::player", interval_ms = interval.as_millis() as u64, "auto-play started");

        let handle = tokio::spawn(async move {
            let mut steps = 0usize;
            loop {
                if flag.load(Ordering::SeqCst) {
                    debug!(target: "discussion::player", steps, "auto-play cancelled");
                    break;
                }
                {
                    let mut session = session.lock().await;
                    if flag.load(Ordering::SeqCst) || session.is_terminated() {
                        break;
                    }
                    if !session.step_forward() {
                        debug!(target: "discussion::player", steps, "auto-play reached the end");
                        break;
                    }
                }
                steps += 1;
                tokio::time::sleep(interval).await;
            }
            steps
        });
        self.autoplay = Some(Autoplay { cancel, handle });
        Ok(())
    }

    /// Signal a running auto-play to stop before its next step.
    pub fn cancel(&mut self) {
        if let Some(autoplay) = self.autoplay.take() {
            autoplay.cancel.store(true, Ordering::SeqCst);
        }
    }

    /// Cancel auto-play and wait for its task, returning the number of steps
    /// it took (0 when nothing was running).
    pub async fn stop(&mut self) -> usize {
        let Some(autoplay) = self.autoplay.take() else {
            return 0;
        };
        autoplay.cancel.store(true, Ordering::SeqCst);
        steps_taken(autoplay.handle.await)
    }

    /// Wait for a running auto-play to finish on its own.
    pub async fn join(&mut self) -> usize {
        let Some(autoplay) = self.autoplay.take() else {
            return 0;
        };
        steps_taken(autoplay.handle.await)
    }

    /// Local navigation: cancels auto-play, then applies `command`.
    pub async fn navigate(&mut self, command: NavCommand) -> Result<bool> {
        self.cancel();
        self.session.lock().await.local_command(command)
    }

    /// Apply one channel event. Remote navigation the session will act on
    /// cancels auto-play too; navigation ignored under self control does not.
    pub async fn handle(&mut self, event: SessionEvent) -> Result<()> {
        let shared = Arc::clone(&self.session);
        let mut session = shared.lock().await;
        if let SessionEvent::Navigate { command } = &event {
            if session.accepts_remote(*command) {
                self.cancel();
            }
        }
        session.handle(event)?;
        if session.is_terminated() {
            self.cancel();
        }
        Ok(())
    }

    /// Consume events until the channel closes or the session terminates.
    /// Non-fatal errors are logged and the loop continues.
    pub async fn run(&mut self, mut events: mpsc::Receiver<SessionEvent>) -> Result<()> {
        while let Some(event) = events.recv().await {
            match self.handle(event).await {
                Ok(()) => {}
                Err(ReplayError::SessionTerminated) => break,
                Err(e) => {
                    warn!(target: "discussion::player", error = %e, "event rejected");
                }
            }
            if self.session.lock().await.is_terminated() {
                info!(target: "discussion::player", "session terminated, leaving event loop");
                break;
            }
        }
        Ok(())
    }
}

/// Steps reported by a finished auto-play task; a failed task counts 0.
fn steps_taken(result: std::result::Result<usize, JoinError>) -> usize {
    match result {
        Ok(steps) => steps,
        Err(e) => {
            warn!(target: "discussion::player", error = %e, "auto-play task failed");
            0
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommentNode, Viewer, ViewerRole};
    use crate::replay::OrderMode;
    use crate::session::{ControlMode, JoinedPayload, SessionMode};
    use crate::tree::TreeNode;

    fn payload(n: usize) -> JoinedPayload {
        let mut children = Vec::new();
        for i in 2..=n {
            children.push(TreeNode::leaf(CommentNode::comment(
                i.to_string(),
                format!("u{}", i % 3),
                "t",
                Some("1"),
                1,
                i as f64,
            )));
        }
        JoinedPayload {
            tree: TreeNode::with_children(
                CommentNode::comment("1", "root", "t", None, 0, 1.0),
                children,
            ),
            discussion: Default::default(),
            visual_config: None,
        }
    }

    async fn joined_player(role: ViewerRole, n: usize) -> Player {
        let session = DiscussionSession::new(Viewer::new("v", role), SessionMode::Replay)
            .with_order(OrderMode::Regular);
        let mut player = Player::new(session);
        player.handle(SessionEvent::Joined(payload(n))).await.unwrap();
        player
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_runs_to_end() {
        let mut player = joined_player(ViewerRole::Moderator, 5).await;
        player.simulate(Duration::from_millis(1_000)).await.unwrap();
        let steps = player.join().await;
        assert_eq!(steps, 4);
        let session = player.session();
        let session = session.lock().await;
        assert!(session.at_end());
        assert_eq!(session.shown_state().messages.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_cancels_autoplay() {
        let mut player = joined_player(ViewerRole::Moderator, 10).await;
        player.simulate(Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        player.navigate(NavCommand::Reset).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        let session = player.session();
        assert_eq!(session.lock().await.replay().unwrap().current_index(), 1);
        assert!(!player.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reports_steps() {
        let mut player = joined_player(ViewerRole::Root, 10).await;
        player.simulate(Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let steps = player.stop().await;
        assert_eq!(steps, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_channel_navigation_keeps_autoplay_running() {
        let mut player = joined_player(ViewerRole::User, 10).await;
        player
            .handle(SessionEvent::Navigate {
                command: NavCommand::ChangeControlMode(ControlMode::SelfControl),
            })
            .await
            .unwrap();
        player.simulate(Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        player
            .handle(SessionEvent::Navigate { command: NavCommand::Next })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        let session = player.session();
        let session = session.lock().await;
        assert_eq!(session.replay().unwrap().current_index(), 10);
        assert!(session.at_end());
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_mode_change_cancels_autoplay() {
        let mut player = joined_player(ViewerRole::User, 10).await;
        player
            .handle(SessionEvent::Navigate {
                command: NavCommand::ChangeControlMode(ControlMode::SelfControl),
            })
            .await
            .unwrap();
        player.simulate(Duration::from_secs(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        player
            .handle(SessionEvent::Navigate {
                command: NavCommand::ChangeControlMode(ControlMode::Moderator),
            })
            .await
            .unwrap();
        assert!(!player.is_playing());
        tokio::time::sleep(Duration::from_secs(20)).await;
        let session = player.session();
        assert_eq!(session.lock().await.replay().unwrap().current_index(), 3);
    }

    #[tokio::test]
    async fn test_failed_autoplay_task_counts_zero_steps() {
        let failed: std::result::Result<usize, JoinError> =
            tokio::spawn(async { panic!("step failed") }).await;
        assert!(failed.is_err());
        assert_eq!(steps_taken(failed), 0);
        assert_eq!(steps_taken(Ok(4)), 4);
    }

    #[tokio::test]
    async fn test_join_without_autoplay_returns_zero() {
        let mut player = joined_player(ViewerRole::Moderator, 3).await;
        assert_eq!(player.join().await, 0);
    }

    #[tokio::test]
    async fn test_simulate_refused_for_locked_user() {
        let mut player = joined_player(ViewerRole::User, 3).await;
        let err = player.simulate(DEFAULT_INTERVAL).await.unwrap_err();
        assert!(matches!(err, ReplayError::ControlLocked));
    }

    #[tokio::test]
    async fn test_run_stops_on_termination() {
        let mut player = joined_player(ViewerRole::Moderator, 3).await;
        let (tx, rx) = mpsc::channel(8);
        tx.send(SessionEvent::Navigate { command: NavCommand::Next }).await.unwrap();
        tx.send(SessionEvent::EndSession).await.unwrap();
        tx.send(SessionEvent::Navigate { command: NavCommand::Next }).await.unwrap();
        player.run(rx).await.unwrap();
        let session = player.session();
        let session = session.lock().await;
        assert!(session.is_terminated());
        assert_eq!(session.replay().unwrap().current_index(), 2);
    }
}
