//! End-to-end router scenarios against recording fakes.

mod common;

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use common::{event, harness, harness_with, test_config};
use muxgram_core::{SessionId, SessionStatus};
use muxgram_telegram::ChatUpdate;

fn sid(s: &str) -> SessionId {
    SessionId::from(s)
}

fn chat_message(thread_id: i64, text: &str) -> ChatUpdate {
    ChatUpdate::Message {
        thread_id: Some(thread_id),
        text: text.to_string(),
        user_id: Some(7),
    }
}

// --- S1: first-event race -------------------------------------------------

#[tokio::test]
async fn s1_concurrent_first_events_create_exactly_one_topic() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());
    // Slow creation widens the race window.
    *h.chat.create_delay.lock().unwrap() = Duration::from_millis(50);

    let a = h
        .router
        .handle_event(event("tool_result", "S1", "ok", None));
    let b = h
        .router
        .handle_event(event("agent_response", "S1", "done", None));
    let (ra, rb) = tokio::join!(a, b);
    ra.unwrap();
    rb.unwrap();

    assert_eq!(h.chat.topic_count(), 1, "exactly one create_forum_topic");
    let record = h.store.get_session(&sid("S1")).unwrap().unwrap();
    assert_eq!(record.thread_id, Some(100));

    // Both rendered messages landed in the created thread, never the
    // general area.
    let threads = h.chat.threads_messaged();
    assert_eq!(threads.len(), 2);
    assert!(threads.iter().all(|t| *t == Some(100)));
}

#[tokio::test]
async fn s1_follow_up_events_reuse_the_topic() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());

    for i in 0..5 {
        h.router
            .handle_event(event("agent_response", "S1", &format!("msg {i}"), None))
            .await
            .unwrap();
    }
    assert_eq!(h.chat.topic_count(), 1);
    assert_eq!(h.chat.message_count(), 5);
}

#[tokio::test]
async fn failed_topic_creation_drops_messages_but_retries_later() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());
    h.chat
        .fail_topic_creation
        .store(true, std::sync::atomic::Ordering::SeqCst);

    h.router
        .handle_event(event("agent_response", "S1", "lost", None))
        .await
        .unwrap();
    // The message was dropped, not sent to the general area.
    assert_eq!(h.chat.message_count(), 0);
    // The session row exists without a thread.
    let record = h.store.get_session(&sid("S1")).unwrap().unwrap();
    assert_eq!(record.thread_id, None);

    // Once the platform recovers, the next event creates the topic.
    h.chat
        .fail_topic_creation
        .store(false, std::sync::atomic::Ordering::SeqCst);
    h.router
        .handle_event(event("agent_response", "S1", "recovered", None))
        .await
        .unwrap();
    assert_eq!(h.chat.topic_count(), 1);
    assert_eq!(h.chat.threads_messaged(), vec![Some(100)]);
}

// --- S2: pane auto-heal ---------------------------------------------------

#[tokio::test]
async fn s2_new_target_in_metadata_heals_the_mapping() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());
    h.mux.set_live("1:0.0", true);
    h.mux.set_live("2:0.0", true);

    h.router
        .handle_event(event(
            "agent_response",
            "S2",
            "hello",
            Some(r#"{"tmuxTarget":"1:0.0","tmuxSocket":"/tmp/tmux-1000/default"}"#),
        ))
        .await
        .unwrap();
    // The CLI moved panes; the next event advertises the new target.
    h.router
        .handle_event(event(
            "tool_start",
            "S2",
            "Bash",
            Some(r#"{"tmuxTarget":"2:0.0"}"#),
        ))
        .await
        .unwrap();

    let record = h.store.get_session(&sid("S2")).unwrap().unwrap();
    assert_eq!(record.tmux_target.unwrap().to_string(), "2:0.0");
    // The socket learned earlier is preserved.
    assert_eq!(record.tmux_socket.as_deref(), Some("/tmp/tmux-1000/default"));

    // A chat reply is injected via the healed target, socket included.
    h.router.handle_chat(chat_message(100, "hello")).await.unwrap();
    let injections = h.mux.injections.lock().unwrap();
    assert_eq!(injections.len(), 1);
    assert_eq!(injections[0].0.target.to_string(), "2:0.0");
    assert_eq!(
        injections[0].0.socket.as_deref(),
        Some(std::path::Path::new("/tmp/tmux-1000/default"))
    );
    assert_eq!(injections[0].1, "hello");
}

// --- S3: self-echo suppression -------------------------------------------

#[tokio::test]
async fn s3_injected_text_is_not_echoed_back() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());
    h.mux.set_live("main:0.0", true);

    h.router
        .handle_event(event(
            "agent_response",
            "S3",
            "ready",
            Some(r#"{"tmuxTarget":"main:0.0"}"#),
        ))
        .await
        .unwrap();
    let before = h.chat.message_count();

    // User replies in the thread; the daemon injects it.
    h.router.handle_chat(chat_message(100, "hello")).await.unwrap();
    assert_eq!(h.mux.injections.lock().unwrap().len(), 1);
    // Success is silent.
    assert_eq!(h.chat.message_count(), before);

    // The hook then reports the same text as user_input.
    h.router
        .handle_event(event("user_input", "S3", "hello", None))
        .await
        .unwrap();
    assert_eq!(h.chat.message_count(), before, "self-echo must be suppressed");

    // A genuinely typed duplicate afterwards is rendered.
    h.router
        .handle_event(event("user_input", "S3", "hello", None))
        .await
        .unwrap();
    assert_eq!(h.chat.message_count(), before + 1);
}

#[tokio::test]
async fn telegram_sourced_user_input_is_never_rendered() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());
    h.router
        .handle_event(event(
            "user_input",
            "S3",
            "typed from chat",
            Some(r#"{"source":"telegram"}"#),
        ))
        .await
        .unwrap();
    assert_eq!(h.chat.message_count(), 0);
}

// --- S4: reactivation -----------------------------------------------------

#[tokio::test]
async fn s4_events_after_end_reactivate_in_the_same_thread() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());

    h.router
        .handle_event(event("agent_response", "S4", "hi", None))
        .await
        .unwrap();
    h.router
        .handle_event(event("session_end", "S4", "", None))
        .await
        .unwrap();
    assert_eq!(
        h.store.get_session(&sid("S4")).unwrap().unwrap().status,
        SessionStatus::Ended
    );
    let before = h.store.get_session(&sid("S4")).unwrap().unwrap().last_activity;

    h.router
        .handle_event(event("agent_response", "S4", "still here", None))
        .await
        .unwrap();

    let record = h.store.get_session(&sid("S4")).unwrap().unwrap();
    assert_eq!(record.status, SessionStatus::Active);
    assert!(record.last_activity >= before);
    // No second topic; the new message landed in the existing thread.
    assert_eq!(h.chat.topic_count(), 1);
    assert_eq!(h.chat.threads_messaged().last(), Some(&Some(100)));
}

// --- S5: multi-tenant isolation -------------------------------------------

#[tokio::test]
async fn s5_unowned_thread_messages_are_ignored_silently() {
    let tmp_a = tempfile::tempdir().unwrap();
    let tmp_b = tempfile::tempdir().unwrap();
    let a = harness(tmp_a.path());
    let b = harness(tmp_b.path());
    a.mux.set_live("main:0.0", true);

    // Daemon A owns thread 100 for its session.
    a.router
        .handle_event(event(
            "agent_response",
            "SA",
            "hi",
            Some(r#"{"tmuxTarget":"main:0.0"}"#),
        ))
        .await
        .unwrap();

    // The same chat message reaches both daemons.
    a.router.handle_chat(chat_message(100, "run tests")).await.unwrap();
    b.router.handle_chat(chat_message(100, "run tests")).await.unwrap();

    assert_eq!(a.mux.injections.lock().unwrap().len(), 1);
    // B has no store row for thread 100: no side-effects, no chat noise.
    assert_eq!(b.mux.injections.lock().unwrap().len(), 0);
    assert_eq!(b.chat.message_count(), 0);
}

#[tokio::test]
async fn general_area_messages_are_ignored() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());
    h.router
        .handle_chat(ChatUpdate::Message {
            thread_id: None,
            text: "stop".to_string(),
            user_id: Some(7),
        })
        .await
        .unwrap();
    assert!(h.mux.keys.lock().unwrap().is_empty());
    assert_eq!(h.chat.message_count(), 0);
}

// --- S6: stale reap -------------------------------------------------------

#[tokio::test]
async fn s6_stale_session_with_dead_pane_is_reaped() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());
    h.mux.set_live("main:0.0", true);

    h.router
        .handle_event(event(
            "agent_response",
            "S6",
            "hi",
            Some(r#"{"tmuxTarget":"main:0.0"}"#),
        ))
        .await
        .unwrap();

    // Backdate the session and kill its pane.
    let old = Utc::now() - ChronoDuration::hours(73);
    h.store.touch(&sid("S6"), old).unwrap();
    h.mux.set_live("main:0.0", false);

    h.router.reap_once(Utc::now()).await.unwrap();

    let record = h.store.get_session(&sid("S6")).unwrap().unwrap();
    assert_eq!(record.status, SessionStatus::Ended);
    assert!(h.chat.closed.lock().unwrap().contains(&100));
    let farewell = h
        .chat
        .messages
        .lock()
        .unwrap()
        .iter()
        .any(|(thread, html)| *thread == Some(100) && html.contains("terminal closed"));
    assert!(farewell, "farewell posted before the thread closes");
}

#[tokio::test]
async fn s6_fresh_sessions_and_live_panes_survive_the_reaper() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());
    h.mux.set_live("main:0.0", true);

    // Fresh session with a live pane.
    h.router
        .handle_event(event(
            "agent_response",
            "FRESH",
            "hi",
            Some(r#"{"tmuxTarget":"main:0.0"}"#),
        ))
        .await
        .unwrap();
    // Stale session but its pane is still alive and unshared.
    h.mux.set_live("other:1.0", true);
    h.router
        .handle_event(event(
            "agent_response",
            "IDLE",
            "hi",
            Some(r#"{"tmuxTarget":"other:1.0"}"#),
        ))
        .await
        .unwrap();
    let old = Utc::now() - ChronoDuration::hours(73);
    h.store.touch(&sid("IDLE"), old).unwrap();

    h.router.reap_once(Utc::now()).await.unwrap();

    assert!(h.store.get_session(&sid("FRESH")).unwrap().unwrap().is_active());
    assert!(h.store.get_session(&sid("IDLE")).unwrap().unwrap().is_active());
    assert!(h.chat.closed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn stale_session_with_recycled_pane_is_reaped() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());
    h.mux.set_live("main:0.0", true);

    h.router
        .handle_event(event(
            "agent_response",
            "OLD",
            "hi",
            Some(r#"{"tmuxTarget":"main:0.0"}"#),
        ))
        .await
        .unwrap();
    let backdated = Utc::now() - ChronoDuration::hours(73);
    h.store.touch(&sid("OLD"), backdated).unwrap();

    // A newer session now owns the same pane; the pane itself is alive.
    h.router
        .handle_event(event(
            "agent_response",
            "NEW",
            "hi",
            Some(r#"{"tmuxTarget":"main:0.0"}"#),
        ))
        .await
        .unwrap();

    h.router.reap_once(Utc::now()).await.unwrap();

    assert_eq!(
        h.store.get_session(&sid("OLD")).unwrap().unwrap().status,
        SessionStatus::Ended
    );
    assert!(h.store.get_session(&sid("NEW")).unwrap().unwrap().is_active());
}

// --- approvals ------------------------------------------------------------

#[tokio::test]
async fn approval_request_sends_three_buttons_and_persists() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());

    h.router
        .handle_event(event("approval_request", "S7", "Allow Bash(rm)?", None))
        .await
        .unwrap();

    let sent = h.chat.button_messages.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let (thread, html, buttons) = &sent[0];
    assert_eq!(*thread, Some(100));
    assert!(html.contains("Allow Bash(rm)?"));
    assert_eq!(buttons.len(), 3);
    assert!(buttons.iter().all(|b| b.data.starts_with("apr:")));
}

#[tokio::test]
async fn approve_button_resolves_once_and_clears_buttons() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());

    h.router
        .handle_event(event("approval_request", "S7", "Allow?", None))
        .await
        .unwrap();
    let data = h.chat.button_messages.lock().unwrap()[0]
        .2
        .iter()
        .find(|b| b.data.ends_with(":a"))
        .unwrap()
        .data
        .clone();

    let press = ChatUpdate::Callback {
        data: data.clone(),
        user_id: 7,
        message_id: Some(1001),
        thread_id: Some(100),
    };
    h.router.handle_chat(press.clone()).await.unwrap();
    assert_eq!(h.chat.cleared.lock().unwrap().len(), 1);
    let outcomes = h.chat.message_count();
    assert!(outcomes >= 1);

    // A duplicate press is a no-op.
    h.router.handle_chat(press).await.unwrap();
    assert_eq!(h.chat.cleared.lock().unwrap().len(), 1);
    assert_eq!(h.chat.message_count(), outcomes);
}

#[tokio::test]
async fn abort_button_ends_the_session_aborted() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());

    h.router
        .handle_event(event("approval_request", "S8", "Allow?", None))
        .await
        .unwrap();
    let data = h.chat.button_messages.lock().unwrap()[0]
        .2
        .iter()
        .find(|b| b.data.ends_with(":x"))
        .unwrap()
        .data
        .clone();

    h.router
        .handle_chat(ChatUpdate::Callback {
            data,
            user_id: 7,
            message_id: Some(1001),
            thread_id: Some(100),
        })
        .await
        .unwrap();

    assert_eq!(
        h.store.get_session(&sid("S8")).unwrap().unwrap().status,
        SessionStatus::Aborted
    );
    assert!(h.chat.closed.lock().unwrap().contains(&100));
}

// --- access control -------------------------------------------------------

#[tokio::test]
async fn unauthorized_users_cannot_inject() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp.path());
    config.allowed_user_ids = vec![42];
    let h = harness_with(config);
    h.mux.set_live("main:0.0", true);

    h.router
        .handle_event(event(
            "agent_response",
            "S9",
            "hi",
            Some(r#"{"tmuxTarget":"main:0.0"}"#),
        ))
        .await
        .unwrap();

    h.router
        .handle_chat(ChatUpdate::Message {
            thread_id: Some(100),
            text: "rm -rf /".to_string(),
            user_id: Some(7),
        })
        .await
        .unwrap();
    assert!(h.mux.injections.lock().unwrap().is_empty());

    // The allowed user gets through.
    h.router
        .handle_chat(ChatUpdate::Message {
            thread_id: Some(100),
            text: "ls".to_string(),
            user_id: Some(42),
        })
        .await
        .unwrap();
    assert_eq!(h.mux.injections.lock().unwrap().len(), 1);
}

// --- command classification on the wire ----------------------------------

#[tokio::test]
async fn interrupt_and_kill_words_send_keys() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());
    h.mux.set_live("main:0.0", true);
    h.router
        .handle_event(event(
            "agent_response",
            "S10",
            "hi",
            Some(r#"{"tmuxTarget":"main:0.0"}"#),
        ))
        .await
        .unwrap();

    h.router.handle_chat(chat_message(100, "stop")).await.unwrap();
    h.router.handle_chat(chat_message(100, "/kill")).await.unwrap();

    let keys = h.mux.keys.lock().unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0].1, muxgram_inject::ControlKey::Escape);
    assert_eq!(keys[1].1, muxgram_inject::ControlKey::CtrlC);
    assert!(h.mux.injections.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cc_prefix_forwards_a_slash_command() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());
    h.mux.set_live("main:0.0", true);
    h.router
        .handle_event(event(
            "agent_response",
            "S11",
            "hi",
            Some(r#"{"tmuxTarget":"main:0.0"}"#),
        ))
        .await
        .unwrap();

    h.router
        .handle_chat(chat_message(100, "cc compact"))
        .await
        .unwrap();
    let slash = h.mux.slash_commands.lock().unwrap();
    assert_eq!(slash.len(), 1);
    assert_eq!(slash[0].1, "compact");
}

#[tokio::test]
async fn injection_failure_reports_recovery_advice_in_thread() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());
    h.mux.set_live("main:0.0", true);
    h.router
        .handle_event(event(
            "agent_response",
            "S12",
            "hi",
            Some(r#"{"tmuxTarget":"main:0.0"}"#),
        ))
        .await
        .unwrap();
    let before = h.chat.message_count();

    // Pane dies between events.
    h.mux.set_live("main:0.0", false);
    h.router.handle_chat(chat_message(100, "hello")).await.unwrap();

    let messages = h.chat.messages.lock().unwrap();
    assert_eq!(messages.len(), before + 1);
    let (thread, html) = messages.last().unwrap();
    assert_eq!(*thread, Some(100));
    assert!(html.contains("pane not found"));
    assert!(html.contains("refresh"));
}

// --- compaction flag ------------------------------------------------------

#[tokio::test]
async fn turn_complete_after_pre_compact_emits_completion_notice() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());

    h.router
        .handle_event(event(
            "pre_compact",
            "S13",
            "",
            Some(r#"{"trigger":"manual"}"#),
        ))
        .await
        .unwrap();
    let after_notice = h.chat.message_count();

    h.router
        .handle_event(event("turn_complete", "S13", "", None))
        .await
        .unwrap();
    assert_eq!(h.chat.message_count(), after_notice + 1);

    // A second turn_complete without a pre_compact is silent.
    h.router
        .handle_event(event("turn_complete", "S13", "", None))
        .await
        .unwrap();
    assert_eq!(h.chat.message_count(), after_notice + 1);
}

// --- restart recovery -----------------------------------------------------

#[tokio::test]
async fn a_restarted_daemon_recovers_sessions_and_routes_replies() {
    let tmp = tempfile::tempdir().unwrap();
    let first = harness(tmp.path());
    first.mux.set_live("main:0.0", true);
    first
        .router
        .handle_event(event(
            "agent_response",
            "R1",
            "hi",
            Some(r#"{"tmuxTarget":"main:0.0","tmuxSocket":"/sock/a"}"#),
        ))
        .await
        .unwrap();

    // A fresh router over the same store, as after a daemon restart.
    let second = common::harness_with_store(test_config(tmp.path()), first.store.clone());
    second.mux.set_live("main:0.0", true);
    assert_eq!(second.router.recover().await.unwrap(), 1);

    // The reply routes straight through the recovered mapping.
    second
        .router
        .handle_chat(chat_message(100, "continue"))
        .await
        .unwrap();
    let injections = second.mux.injections.lock().unwrap();
    assert_eq!(injections.len(), 1);
    assert_eq!(injections[0].0.target.to_string(), "main:0.0");
    assert_eq!(
        injections[0].0.socket.as_deref(),
        Some(std::path::Path::new("/sock/a"))
    );
}

#[tokio::test]
async fn recover_skips_ended_sessions() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());
    h.router
        .handle_event(event("agent_response", "R2", "hi", None))
        .await
        .unwrap();
    h.router
        .handle_event(event("session_end", "R2", "", None))
        .await
        .unwrap();

    let second = common::harness_with_store(test_config(tmp.path()), h.store.clone());
    assert_eq!(second.router.recover().await.unwrap(), 0);
}

// --- topic title enrichment -----------------------------------------------

#[tokio::test]
async fn late_annotations_rename_the_topic_once() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());

    // First event carries no annotations: bare-id title.
    h.router
        .handle_event(event("agent_response", "T1-abcdef", "hi", None))
        .await
        .unwrap();
    assert_eq!(h.chat.topics.lock().unwrap()[0], "T1-abcde");

    // Annotations arrive on a later event.
    h.router
        .handle_event(event(
            "tool_start",
            "T1-abcdef",
            "Bash",
            Some(r#"{"hostname":"devbox","projectDir":"/srv/widget"}"#),
        ))
        .await
        .unwrap();
    {
        let renamed = h.chat.renamed.lock().unwrap();
        assert_eq!(renamed.len(), 1);
        assert_eq!(renamed[0].0, 100);
        assert_eq!(renamed[0].1, "devbox · widget · T1-abcde");
    }

    // The same annotations again do not rename again.
    h.router
        .handle_event(event(
            "tool_result",
            "T1-abcdef",
            "ok",
            Some(r#"{"hostname":"devbox","projectDir":"/srv/widget"}"#),
        ))
        .await
        .unwrap();
    assert_eq!(h.chat.renamed.lock().unwrap().len(), 1);
}

// --- feature flags ---------------------------------------------------------

#[tokio::test]
async fn threads_disabled_sends_unthreaded_and_ignores_replies() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp.path());
    config.use_threads = false;
    let h = harness_with(config);
    h.mux.set_live("main:0.0", true);

    h.router
        .handle_event(event(
            "agent_response",
            "F1",
            "hi",
            Some(r#"{"tmuxTarget":"main:0.0"}"#),
        ))
        .await
        .unwrap();
    assert_eq!(h.chat.topic_count(), 0);
    assert_eq!(h.chat.threads_messaged(), vec![None]);

    // With no threads there is no ownership; inbound replies cannot route.
    h.router.handle_chat(chat_message(100, "hello")).await.unwrap();
    assert!(h.mux.injections.lock().unwrap().is_empty());
}

#[tokio::test]
async fn quiet_mode_skips_tool_traffic_but_not_responses() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp.path());
    config.verbose = false;
    let h = harness_with(config);

    h.router
        .handle_event(event(
            "tool_start",
            "F2",
            "Bash",
            Some(r#"{"tool":"Bash","input":{"command":"ls"}}"#),
        ))
        .await
        .unwrap();
    h.router
        .handle_event(event("tool_result", "F2", "listing", None))
        .await
        .unwrap();
    assert_eq!(h.chat.message_count(), 0);
    assert!(h.chat.button_messages.lock().unwrap().is_empty());
    // The first event still created the topic.
    assert_eq!(h.chat.topic_count(), 1);

    h.router
        .handle_event(event("agent_response", "F2", "done", None))
        .await
        .unwrap();
    assert_eq!(h.chat.message_count(), 1);

    h.router
        .handle_event(event("error", "F2", "boom", None))
        .await
        .unwrap();
    assert_eq!(h.chat.message_count(), 2);
}

#[tokio::test]
async fn approvals_disabled_ignores_requests() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp.path());
    config.approvals_enabled = false;
    let h = harness_with(config);

    h.router
        .handle_event(event("approval_request", "F3", "Allow?", None))
        .await
        .unwrap();
    assert!(h.chat.button_messages.lock().unwrap().is_empty());
}

// --- details buttons --------------------------------------------------------

#[tokio::test]
async fn details_button_serves_the_cached_tool_input() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());

    h.router
        .handle_event(event(
            "tool_start",
            "D1",
            "Bash",
            Some(r#"{"tool":"Bash","input":{"command":"cargo build --release"}}"#),
        ))
        .await
        .unwrap();
    let data = {
        let sent = h.chat.button_messages.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let buttons = &sent[0].2;
        assert_eq!(buttons.len(), 1);
        assert!(buttons[0].data.starts_with("det:"));
        buttons[0].data.clone()
    };

    h.router
        .handle_chat(ChatUpdate::Callback {
            data,
            user_id: 7,
            message_id: Some(1000),
            thread_id: Some(100),
        })
        .await
        .unwrap();

    let messages = h.chat.messages.lock().unwrap();
    let (thread, html) = messages.last().unwrap();
    assert_eq!(*thread, Some(100));
    assert!(html.contains("cargo build --release"));
    assert!(html.contains("<pre>"));
}

#[tokio::test]
async fn unknown_details_key_is_silent() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());
    h.router
        .handle_chat(ChatUpdate::Callback {
            data: "det:no-such-key".to_string(),
            user_id: 7,
            message_id: None,
            thread_id: Some(100),
        })
        .await
        .unwrap();
    assert_eq!(h.chat.message_count(), 0);
}

// --- bounded waits ----------------------------------------------------------

#[tokio::test]
async fn slow_topic_creation_drops_the_racing_message_only() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp.path());
    config.thread_wait = Duration::from_millis(100);
    let h = harness_with(config);
    *h.chat.create_delay.lock().unwrap() = Duration::from_millis(400);

    let leader = h
        .router
        .handle_event(event("agent_response", "W1", "slow-created", None));
    let racer = async {
        // Let the leader win the flight first.
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.router
            .handle_event(event("agent_response", "W1", "dropped", None))
            .await
    };
    let (a, b) = tokio::join!(leader, racer);
    a.unwrap();
    b.unwrap();

    // One topic; the leader's message arrived, the racing one was dropped
    // after its bounded wait (never sent to the general area).
    assert_eq!(h.chat.topic_count(), 1);
    let messages = h.chat.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].1.contains("slow-created"));
    assert_eq!(messages[0].0, Some(100));
}

// --- unknown events -------------------------------------------------------

#[tokio::test]
async fn unknown_event_types_are_dropped_without_session_side_effects() {
    let tmp = tempfile::tempdir().unwrap();
    let h = harness(tmp.path());
    h.router
        .handle_event(event("telemetry_blob", "S14", "x", None))
        .await
        .unwrap();
    assert!(h.store.get_session(&sid("S14")).unwrap().is_none());
    assert_eq!(h.chat.topic_count(), 0);
}
