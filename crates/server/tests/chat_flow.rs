//! End-to-end chat flow through the router: presence transitions,
//! room joins, message echo, typing relay, and disconnect cleanup.
//! Sessions are driven directly through their handles; the WebSocket
//! transport adds nothing to the semantics under test.

use server::config::{AppState, ChatServerConfig};
use server::models::UserInfo;
use server::protocol::ServerEvent;
use server::session::SessionHandle;
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;

async fn setup() -> (TempDir, AppState) {
    let dir = tempdir().unwrap();
    let config = ChatServerConfig::with_base_dir(dir.path());
    let state = server::build_state(config).await.unwrap();
    (dir, state)
}

async fn make_user(state: &AppState, name: &str) -> UserInfo {
    let user = state
        .auth
        .signup(format!("{}@example.com", name), name.to_string(), "pw".to_string())
        .await
        .unwrap();
    state.auth.get_user(&user.id).await.unwrap()
}

fn assert_no_event(rx: &mut UnboundedReceiver<ServerEvent>) {
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn bad_credential_is_rejected_without_registry_state() {
    use server::auth::IdentityVerifier;

    let (_dir, state) = setup().await;
    let alice = make_user(&state, "alice").await;

    assert!(state.auth.verify("not-a-token").await.is_err());
    assert!(!state.registry.is_online(&alice.id).await);
    assert!(state.registry.snapshot().await.is_empty());
}

#[tokio::test]
async fn end_to_end_messaging_flow() {
    let (_dir, state) = setup().await;

    let alice = make_user(&state, "alice").await;
    let bob = make_user(&state, "bob").await;

    // Alice connects first and goes online
    let (ha, mut rx_a) = SessionHandle::new(alice.clone());
    state.router.connect(ha.clone()).await;
    assert!(state.registry.is_online(&alice.id).await);
    assert!(state.auth.get_user(&alice.id).await.unwrap().is_online);

    // Bob connects; Alice observes the online transition
    let (hb, mut rx_b) = SessionHandle::new(bob.clone());
    state.router.connect(hb.clone()).await;
    match rx_a.try_recv().unwrap() {
        ServerEvent::UserOnline { user_id } => assert_eq!(user_id, bob.id),
        other => panic!("expected user-online, got {:?}", other),
    }
    assert_no_event(&mut rx_b);

    // Both join their conversation's room
    let conv = state.store.find_or_create(&alice.id, &bob.id).await.unwrap();
    let conv_id = conv.read().await.id.clone();
    state.router.handle_join(&ha, &conv_id).await;
    state.router.handle_join(&hb, &conv_id).await;

    // Alice sends; both sessions receive the confirmed echo
    state.router.handle_send(&ha, &conv_id, "hello").await;
    let (a_msg, b_msg) = match (rx_a.try_recv().unwrap(), rx_b.try_recv().unwrap()) {
        (
            ServerEvent::NewMessage { message: a, .. },
            ServerEvent::NewMessage { message: b, conversation },
        ) => {
            assert_eq!(conversation.id, conv_id);
            assert_eq!(conversation.participants.len(), 2);
            (a, b)
        }
        other => panic!("expected new-message on both sessions, got {:?}", other),
    };
    assert_eq!(a_msg.id, b_msg.id);
    assert_eq!(a_msg.ordinal, 0);
    assert_eq!(a_msg.text, "hello");
    assert_eq!(a_msg.sender_id, alice.id);

    let activity_before = conv.read().await.last_activity;

    // Bob replies; ordinals advance, and so does last_activity
    state.router.handle_send(&hb, &conv_id, "hi").await;
    match (rx_a.try_recv().unwrap(), rx_b.try_recv().unwrap()) {
        (
            ServerEvent::NewMessage { message: a, .. },
            ServerEvent::NewMessage { message: b, .. },
        ) => {
            assert_eq!(a.id, b.id);
            assert_eq!(a.ordinal, 1);
            assert_eq!(a.sender_id, bob.id);
        }
        other => panic!("expected new-message on both sessions, got {:?}", other),
    }
    assert!(conv.read().await.last_activity >= activity_before);

    // Alice disconnects; Bob observes the offline transition
    state.router.handle_disconnect(&ha).await;
    match rx_b.try_recv().unwrap() {
        ServerEvent::UserOffline { user_id } => assert_eq!(user_id, alice.id),
        other => panic!("expected user-offline, got {:?}", other),
    }
    assert!(!state.registry.is_online(&alice.id).await);
    assert!(!state.auth.get_user(&alice.id).await.unwrap().is_online);
}

#[tokio::test]
async fn typing_reaches_only_the_peer_and_is_not_persisted() {
    let (_dir, state) = setup().await;

    let alice = make_user(&state, "alice").await;
    let bob = make_user(&state, "bob").await;

    let (ha, mut rx_a) = SessionHandle::new(alice.clone());
    let (hb, mut rx_b) = SessionHandle::new(bob.clone());
    state.router.connect(ha.clone()).await;
    state.router.connect(hb.clone()).await;
    let _ = rx_a.try_recv(); // bob's online transition

    let conv = state.store.find_or_create(&alice.id, &bob.id).await.unwrap();
    let conv_id = conv.read().await.id.clone();
    state.router.handle_join(&ha, &conv_id).await;
    state.router.handle_join(&hb, &conv_id).await;

    state.router.handle_typing(&ha, &conv_id, true).await;

    match rx_b.try_recv().unwrap() {
        ServerEvent::Typing {
            sender_id,
            sender_name,
            is_typing,
        } => {
            assert_eq!(sender_id, alice.id);
            assert_eq!(sender_name, "alice");
            assert!(is_typing);
        }
        other => panic!("expected typing, got {:?}", other),
    }
    // The sender gets no echo, and nothing was persisted
    assert_no_event(&mut rx_a);
    assert!(conv.read().await.messages.is_empty());
}

#[tokio::test]
async fn outsiders_are_dropped_silently() {
    let (_dir, state) = setup().await;

    let alice = make_user(&state, "alice").await;
    let bob = make_user(&state, "bob").await;
    let eve = make_user(&state, "eve").await;

    let (ha, mut rx_a) = SessionHandle::new(alice.clone());
    let (hb, mut rx_b) = SessionHandle::new(bob.clone());
    let (he, mut rx_e) = SessionHandle::new(eve.clone());
    state.router.connect(ha.clone()).await;
    state.router.connect(hb.clone()).await;
    state.router.connect(he.clone()).await;
    while rx_a.try_recv().is_ok() {}
    while rx_b.try_recv().is_ok() {}
    while rx_e.try_recv().is_ok() {}

    let conv = state.store.find_or_create(&alice.id, &bob.id).await.unwrap();
    let conv_id = conv.read().await.id.clone();
    state.router.handle_join(&ha, &conv_id).await;
    state.router.handle_join(&hb, &conv_id).await;

    // Eve's join is ignored without any event back
    state.router.handle_join(&he, &conv_id).await;
    assert_no_event(&mut rx_e);

    // Eve's typing is ignored (she never made it into the room)
    state.router.handle_typing(&he, &conv_id, true).await;
    assert_no_event(&mut rx_a);
    assert_no_event(&mut rx_b);

    // Eve's send gets an error back to her only, and no broadcast
    state.router.handle_send(&he, &conv_id, "intrusion").await;
    assert!(matches!(
        rx_e.try_recv().unwrap(),
        ServerEvent::Error { .. }
    ));
    assert_no_event(&mut rx_a);
    assert_no_event(&mut rx_b);
    assert!(conv.read().await.messages.is_empty());
}

#[tokio::test]
async fn invalid_send_errors_reach_only_the_sender() {
    let (_dir, state) = setup().await;

    let alice = make_user(&state, "alice").await;
    let bob = make_user(&state, "bob").await;

    let (ha, mut rx_a) = SessionHandle::new(alice.clone());
    let (hb, mut rx_b) = SessionHandle::new(bob.clone());
    state.router.connect(ha.clone()).await;
    state.router.connect(hb.clone()).await;
    let _ = rx_a.try_recv();

    let conv = state.store.find_or_create(&alice.id, &bob.id).await.unwrap();
    let conv_id = conv.read().await.id.clone();
    state.router.handle_join(&ha, &conv_id).await;
    state.router.handle_join(&hb, &conv_id).await;

    state.router.handle_send(&ha, &conv_id, "   ").await;

    assert!(matches!(
        rx_a.try_recv().unwrap(),
        ServerEvent::Error { .. }
    ));
    assert_no_event(&mut rx_b);
    assert!(conv.read().await.messages.is_empty());
}

#[tokio::test]
async fn second_connection_wins_and_old_disconnect_is_harmless() {
    let (_dir, state) = setup().await;

    let alice = make_user(&state, "alice").await;
    let bob = make_user(&state, "bob").await;

    let (hb, mut rx_b) = SessionHandle::new(bob.clone());
    state.router.connect(hb.clone()).await;

    // First connection brings Alice online
    let (old, _rx_old) = SessionHandle::new(alice.clone());
    state.router.connect(old.clone()).await;
    assert!(matches!(
        rx_b.try_recv().unwrap(),
        ServerEvent::UserOnline { .. }
    ));

    // Second connection replaces the first; no duplicate transition
    let (new, _rx_new) = SessionHandle::new(alice.clone());
    state.router.connect(new.clone()).await;
    assert_no_event(&mut rx_b);

    // The orphaned connection's disconnect must not take Alice offline
    state.router.handle_disconnect(&old).await;
    assert!(state.registry.is_online(&alice.id).await);
    assert_no_event(&mut rx_b);

    // Closing the live connection does
    state.router.handle_disconnect(&new).await;
    assert!(!state.registry.is_online(&alice.id).await);
    assert!(matches!(
        rx_b.try_recv().unwrap(),
        ServerEvent::UserOffline { .. }
    ));
}
