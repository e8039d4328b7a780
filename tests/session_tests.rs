//! End-to-end tests for sessions fed through the event channel: joining,
//! live updates, moderator-driven replay, auto-play and termination.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use discussion_replay::model::{CommentNode, Recipients, Viewer, ViewerRole};
use discussion_replay::replay::OrderMode;
use discussion_replay::session::{
    ControlMode, DiscussionSession, JoinedPayload, NavCommand, SessionEvent, SessionMode,
    SessionStatus, TerminationReason,
};
use discussion_replay::{Player, ReplayError, ShownState};
use rstest::rstest;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const PAYLOAD: &str = r#"{
    "tree": {
        "node": {"id": 1, "author": "ann", "text": "Agenda?", "timestamp": 100,
                 "comment_type": "comment", "extra_data": null},
        "children": [
            {"node": {"id": 2, "author": "bob", "text": "Budget first", "parentId": 1,
                      "timestamp": 110, "comment_type": "comment"},
             "children": [
                {"node": {"id": 4, "author": "ann", "text": "Agreed", "parentId": 2,
                          "timestamp": 130, "comment_type": "comment"}, "children": []}
             ]},
            {"node": {"id": 3, "author": "cy", "text": "Hiring", "parentId": 1,
                      "timestamp": 120, "comment_type": "comment"}, "children": []},
            {"node": {"id": "a1", "author": "mod", "text": "Five minutes left", "parentId": 1,
                      "timestamp": 125, "comment_type": "alert",
                      "extra_data": {"recipients_type": "all"}}, "children": []}
        ]
    },
    "discussion": {"id": "d-42", "title": "Planning meeting",
                   "configuration": {"vis_config": {"graph": true, "alerts": true,
                                     "statisticsUser": false, "statisticsDiscussion": true}}}
}"#;

fn payload() -> JoinedPayload {
    JoinedPayload::from_json(PAYLOAD).unwrap()
}

fn recording_session(
    viewer: Viewer,
    mode: SessionMode,
) -> (DiscussionSession, Arc<Mutex<Vec<ShownState>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let session = DiscussionSession::new(viewer, mode)
        .with_order(OrderMode::Regular)
        .with_listener(move |s: &ShownState| sink.lock().unwrap().push(s.clone()));
    (session, seen)
}

async fn feed(player: &mut Player, events: Vec<SessionEvent>) {
    let (tx, rx) = mpsc::channel(events.len().max(1));
    for e in events {
        tx.send(e).await.unwrap();
    }
    drop(tx);
    player.run(rx).await.unwrap();
}

// ---------------------------------------------------------------------------
// Live sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_live_join_shows_everything() {
    let (session, seen) = recording_session(Viewer::new("bob", ViewerRole::User), SessionMode::Live);
    let mut player = Player::new(session);
    feed(&mut player, vec![SessionEvent::Joined(payload())]).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let view = &seen[0];
    assert_eq!(view.messages.len(), 4);
    assert_eq!(view.alerts.len(), 1);
    assert_eq!(view.alerts[0].position, 4);
    assert_eq!(view.last_message.as_ref().unwrap().id, "4");

    let session = player.session();
    let session = session.lock().await;
    assert!(!session.visual_config().statistics_user);
    assert_eq!(session.meta().short_title(), "Planning meeting");
}

#[tokio::test]
async fn test_live_updates_arrive_in_order() {
    let (session, seen) = recording_session(Viewer::new("bob", ViewerRole::User), SessionMode::Live);
    let mut player = Player::new(session);
    feed(
        &mut player,
        vec![
            SessionEvent::Joined(payload()),
            SessionEvent::NewComment {
                comment: CommentNode::comment("5", "cy", "Me too", Some("4"), 3, 140.0),
            },
            SessionEvent::NewAlert {
                alert: CommentNode::alert("a2", "mod", "for cy", "5", 141.0, &Recipients::list(["cy"])),
            },
            SessionEvent::NewComment {
                comment: CommentNode::comment("6", "dee", "lost", Some("999"), 1, 150.0),
            },
        ],
    )
    .await;

    let seen = seen.lock().unwrap();
    // join, comment 5, alert a2 (filtered but still a rebuild); the orphan is dropped.
    assert_eq!(seen.len(), 3);
    let last = seen.last().unwrap();
    assert_eq!(last.messages.len(), 5);
    assert_eq!(last.alerts.len(), 1);
    assert_eq!(last.last_message.as_ref().unwrap().id, "5");
    assert!(last.links.iter().any(|l| l.source == "cy" && l.target == "ann"));

    let session = player.session();
    let diags = session.lock().await.diagnostics();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].comment_id, "6");
}

// ---------------------------------------------------------------------------
// Replay sessions
// ---------------------------------------------------------------------------

#[rstest]
#[case(vec![NavCommand::Next], 2)]
#[case(vec![NavCommand::Next, NavCommand::Next, NavCommand::Back], 2)]
#[case(vec![NavCommand::ShowAll], 5)]
#[case(vec![NavCommand::ShowAll, NavCommand::Reset], 1)]
#[case(vec![NavCommand::Back], 1)]
#[tokio::test]
async fn test_moderator_commands_drive_index(#[case] commands: Vec<NavCommand>, #[case] expected: usize) {
    let (session, _) = recording_session(Viewer::new("bob", ViewerRole::User), SessionMode::Replay);
    let mut player = Player::new(session);
    let mut events = vec![SessionEvent::Joined(payload())];
    events.extend(commands.into_iter().map(|command| SessionEvent::Navigate { command }));
    feed(&mut player, events).await;

    let session = player.session();
    assert_eq!(session.lock().await.replay().unwrap().current_index(), expected);
}

#[tokio::test]
async fn test_replay_alert_is_revealed_in_sequence() {
    let (session, _) = recording_session(Viewer::new("bob", ViewerRole::User), SessionMode::Replay);
    let mut player = Player::new(session);
    feed(
        &mut player,
        vec![
            SessionEvent::Joined(payload()),
            SessionEvent::Navigate { command: NavCommand::ShowAll },
        ],
    )
    .await;
    let session = player.session();
    let state = session.lock().await.shown_state();
    assert_eq!(state.alerts.len(), 1);
    assert_eq!(state.alerts[0].id, "a1");
    assert_eq!(state.messages.len(), 4);
}

#[tokio::test]
async fn test_change_order_resets_to_first_item() {
    let (session, _) = recording_session(Viewer::new("m", ViewerRole::Moderator), SessionMode::Replay);
    let mut player = Player::new(session);
    player.handle(SessionEvent::Joined(payload())).await.unwrap();
    player.navigate(NavCommand::ShowAll).await.unwrap();
    player
        .navigate(NavCommand::ChangeOrder(OrderMode::Chronological))
        .await
        .unwrap();
    let session = player.session();
    let session = session.lock().await;
    let engine = session.replay().unwrap();
    assert_eq!(engine.order_mode(), OrderMode::Chronological);
    assert_eq!(engine.current_index(), 1);
    assert_eq!(session.shown_state().messages.len(), 1);
}

#[tokio::test]
async fn test_user_needs_self_control_to_navigate() {
    let (session, _) = recording_session(Viewer::new("bob", ViewerRole::User), SessionMode::Replay);
    let mut player = Player::new(session);
    player.handle(SessionEvent::Joined(payload())).await.unwrap();

    let err = player.navigate(NavCommand::Next).await.unwrap_err();
    assert!(matches!(err, ReplayError::ControlLocked));

    player
        .handle(SessionEvent::Navigate {
            command: NavCommand::ChangeControlMode(ControlMode::SelfControl),
        })
        .await
        .unwrap();
    assert!(player.navigate(NavCommand::Next).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_autoplay_is_cancelled_by_channel_navigation() {
    let (session, seen) = recording_session(Viewer::new("m", ViewerRole::Moderator), SessionMode::Replay);
    let mut player = Player::new(session);
    player.handle(SessionEvent::Joined(payload())).await.unwrap();

    player.simulate(Duration::from_secs(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    player
        .handle(SessionEvent::Navigate { command: NavCommand::Back })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let session = player.session();
    // Two auto-play steps (to index 3), then one step back.
    assert_eq!(session.lock().await.replay().unwrap().current_index(), 2);
    // join + 2 auto steps + back
    assert_eq!(seen.lock().unwrap().len(), 4);
}

// ---------------------------------------------------------------------------
// Termination
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unauthorized_terminates_and_stops_the_loop() {
    let (session, seen) = recording_session(Viewer::new("bob", ViewerRole::User), SessionMode::Live);
    let mut player = Player::new(session);
    feed(
        &mut player,
        vec![
            SessionEvent::Unauthorized,
            SessionEvent::Joined(payload()),
        ],
    )
    .await;
    assert!(seen.lock().unwrap().is_empty());
    let session = player.session();
    assert_eq!(
        session.lock().await.status(),
        SessionStatus::Terminated(TerminationReason::Unauthorized)
    );
}
