//! Recording fakes and a wiring harness for end-to-end router tests.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use muxgram_config::{BridgeConfig, RuntimePaths};
use muxgram_core::{Envelope, PaneTarget};
use muxgram_daemon::Router;
use muxgram_inject::{ControlKey, InjectError, InjectResult, Multiplexer, PaneAddress};
use muxgram_ipc::Broadcaster;
use muxgram_store::SessionStore;
use muxgram_telegram::{Button, ChatAdapter, ChatResult};

/// Chat fake: records every call, mints sequential thread and message ids.
#[derive(Default)]
pub struct FakeChat {
    pub topics: Mutex<Vec<String>>,
    pub messages: Mutex<Vec<(Option<i64>, String)>>,
    pub button_messages: Mutex<Vec<(Option<i64>, String, Vec<Button>)>>,
    pub closed: Mutex<Vec<i64>>,
    pub cleared: Mutex<Vec<i64>>,
    pub renamed: Mutex<Vec<(i64, String)>>,
    next_thread: AtomicI64,
    next_message: AtomicI64,
    pub fail_topic_creation: AtomicBool,
    pub create_delay: Mutex<Duration>,
}

impl FakeChat {
    pub fn new() -> Arc<Self> {
        let chat = Self {
            next_thread: AtomicI64::new(100),
            next_message: AtomicI64::new(1000),
            ..Self::default()
        };
        Arc::new(chat)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.lock().unwrap().len()
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn threads_messaged(&self) -> Vec<Option<i64>> {
        self.messages.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl ChatAdapter for FakeChat {
    async fn send_html(&self, thread_id: Option<i64>, html: &str) -> ChatResult<i64> {
        self.messages
            .lock()
            .unwrap()
            .push((thread_id, html.to_string()));
        Ok(self.next_message.fetch_add(1, Ordering::SeqCst))
    }

    async fn send_with_buttons(
        &self,
        thread_id: Option<i64>,
        html: &str,
        buttons: &[Button],
    ) -> ChatResult<i64> {
        self.button_messages
            .lock()
            .unwrap()
            .push((thread_id, html.to_string(), buttons.to_vec()));
        Ok(self.next_message.fetch_add(1, Ordering::SeqCst))
    }

    async fn create_forum_topic(&self, name: &str, _color_index: usize) -> ChatResult<i64> {
        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_topic_creation.load(Ordering::SeqCst) {
            return Err(muxgram_telegram::ChatError::ThreadIdOutOfRange(-1));
        }
        self.topics.lock().unwrap().push(name.to_string());
        Ok(self.next_thread.fetch_add(1, Ordering::SeqCst))
    }

    async fn rename_forum_topic(&self, thread_id: i64, name: &str) -> ChatResult<()> {
        self.renamed
            .lock()
            .unwrap()
            .push((thread_id, name.to_string()));
        Ok(())
    }

    async fn close_forum_topic(&self, thread_id: i64) -> ChatResult<()> {
        self.closed.lock().unwrap().push(thread_id);
        Ok(())
    }

    async fn clear_buttons(&self, message_id: i64) -> ChatResult<()> {
        self.cleared.lock().unwrap().push(message_id);
        Ok(())
    }
}

/// Multiplexer fake: panes listed in `live` validate; everything is
/// recorded.
#[derive(Default)]
pub struct FakeMux {
    pub live: Mutex<HashSet<String>>,
    pub injections: Mutex<Vec<(PaneAddress, String)>>,
    pub keys: Mutex<Vec<(PaneAddress, ControlKey)>>,
    pub slash_commands: Mutex<Vec<(PaneAddress, String)>>,
}

impl FakeMux {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_live(&self, target: &str, alive: bool) {
        let mut live = self.live.lock().unwrap();
        if alive {
            live.insert(target.to_string());
        } else {
            live.remove(target);
        }
    }

    fn check(&self, addr: &PaneAddress) -> InjectResult<()> {
        if self.live.lock().unwrap().contains(&addr.target.to_string()) {
            Ok(())
        } else {
            Err(InjectError::PaneNotFound {
                target: addr.target.to_string(),
            })
        }
    }
}

#[async_trait]
impl Multiplexer for FakeMux {
    async fn validate(&self, addr: &PaneAddress) -> InjectResult<()> {
        self.check(addr)
    }

    async fn inject_text(&self, addr: &PaneAddress, text: &str) -> InjectResult<()> {
        self.check(addr)?;
        self.injections
            .lock()
            .unwrap()
            .push((addr.clone(), text.to_string()));
        Ok(())
    }

    async fn send_key(&self, addr: &PaneAddress, key: ControlKey) -> InjectResult<()> {
        self.check(addr)?;
        self.keys.lock().unwrap().push((addr.clone(), key));
        Ok(())
    }

    async fn send_slash_command(&self, addr: &PaneAddress, command: &str) -> InjectResult<()> {
        self.check(addr)?;
        self.slash_commands
            .lock()
            .unwrap()
            .push((addr.clone(), command.to_string()));
        Ok(())
    }

    async fn discover(&self) -> InjectResult<Option<PaneTarget>> {
        Ok(None)
    }
}

/// A fully wired router over fakes and an in-memory store.
pub struct Harness {
    pub router: Arc<Router>,
    pub chat: Arc<FakeChat>,
    pub mux: Arc<FakeMux>,
    pub store: Arc<SessionStore>,
    pub config: BridgeConfig,
}

pub fn test_config(root: &Path) -> BridgeConfig {
    let paths = RuntimePaths::resolve(Some(root.to_path_buf()), None).unwrap();
    BridgeConfig {
        bot_token: "000:test".to_string(),
        chat_id: -100_500,
        use_threads: true,
        verbose: true,
        approvals_enabled: true,
        stale_timeout: Duration::from_secs(72 * 3600),
        thread_wait: Duration::from_secs(2),
        dedup_window: Duration::from_secs(10),
        approval_ttl: Duration::from_secs(300),
        allowed_user_ids: Vec::new(),
        debug_log: false,
        paths,
    }
}

pub fn harness(root: &Path) -> Harness {
    harness_with(test_config(root))
}

pub fn harness_with(config: BridgeConfig) -> Harness {
    let store = Arc::new(SessionStore::open_in_memory().unwrap());
    harness_with_store(config, store)
}

/// A harness over an existing store, for restart-recovery tests where a
/// second router opens the state a first one left behind.
pub fn harness_with_store(config: BridgeConfig, store: Arc<SessionStore>) -> Harness {
    let chat = FakeChat::new();
    let mux = FakeMux::new();
    let router = Router::new(
        config.clone(),
        store.clone(),
        chat.clone(),
        mux.clone(),
        Broadcaster::detached(),
    );
    Harness {
        router,
        chat,
        mux,
        store,
        config,
    }
}

/// Build an envelope the way the wire does.
pub fn event(kind: &str, session: &str, content: &str, metadata: Option<&str>) -> Envelope {
    let line = match metadata {
        Some(meta) => format!(
            r#"{{"type":"{kind}","sessionId":"{session}","content":{},"metadata":{meta}}}"#,
            serde_json::Value::String(content.to_string())
        ),
        None => format!(
            r#"{{"type":"{kind}","sessionId":"{session}","content":{}}}"#,
            serde_json::Value::String(content.to_string())
        ),
    };
    Envelope::parse_line(&line).unwrap()
}
