//! The event router: consumes hook events and chat updates, enforces the
//! session lifecycle, and performs all side-effects.
//!
//! Per-event failures never tear the daemon down; only store errors
//! propagate, because the daemon cannot run without consistent durable
//! state. Chat and multiplexer failures are logged (and, on the inbound
//! path, reported to the user in the thread).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use muxgram_config::BridgeConfig;
use muxgram_core::{
    classify, ApprovalDecision, ApprovalId, ApprovalRecord, ApprovalStatus, BridgeEvent,
    CallbackData, ChatCommand, Envelope, EventMeta, InputSource, OutboundEvent, PaneTarget,
    SessionId, SessionRecord, SessionStatus,
};
use muxgram_inject::{ControlKey, Multiplexer, PaneAddress};
use muxgram_ipc::Broadcaster;
use muxgram_store::{SessionSeed, SessionStore, StoreResult};
use muxgram_telegram::{Button, ChatAdapter, ChatUpdate};

use crate::caches::{TtlCache, TtlSet};
use crate::coordinator::{Flight, TopicCoordinator, WaitError};
use crate::render;

/// The router and its in-memory caches.
///
/// Caches live here, not as module state; the store is the source of
/// truth and every cache is rebuilt lazily on miss.
pub struct Router {
    config: BridgeConfig,
    store: Arc<SessionStore>,
    chat: Arc<dyn ChatAdapter>,
    mux: Arc<dyn Multiplexer>,
    broadcaster: Broadcaster,
    coordinator: TopicCoordinator,
    thread_cache: RwLock<HashMap<SessionId, i64>>,
    tmux_cache: RwLock<HashMap<SessionId, PaneAddress>>,
    dedup: StdMutex<TtlSet<String>>,
    tool_inputs: StdMutex<TtlCache<String, String>>,
    compacting: StdMutex<HashSet<SessionId>>,
    color_seq: AtomicUsize,
}

impl Router {
    /// Wire up a router.
    pub fn new(
        config: BridgeConfig,
        store: Arc<SessionStore>,
        chat: Arc<dyn ChatAdapter>,
        mux: Arc<dyn Multiplexer>,
        broadcaster: Broadcaster,
    ) -> Arc<Self> {
        let dedup = TtlSet::new(config.dedup_window);
        let tool_inputs = TtlCache::new(std::time::Duration::from_secs(300));
        Arc::new(Self {
            config,
            store,
            chat,
            mux,
            broadcaster,
            coordinator: TopicCoordinator::new(),
            thread_cache: RwLock::new(HashMap::new()),
            tmux_cache: RwLock::new(HashMap::new()),
            dedup: StdMutex::new(dedup),
            tool_inputs: StdMutex::new(tool_inputs),
            compacting: StdMutex::new(HashSet::new()),
            color_seq: AtomicUsize::new(0),
        })
    }

    // ------------------------------------------------------------------
    // Restart recovery
    // ------------------------------------------------------------------

    /// Rebuild the in-memory caches from the store after a restart.
    ///
    /// The caches also rebuild lazily on miss; doing it up front means
    /// the first inbound chat reply after a restart injects without a
    /// store round-trip, and the log shows what was recovered.
    ///
    /// # Errors
    ///
    /// Only store errors propagate.
    pub async fn recover(&self) -> StoreResult<usize> {
        let active = self.store.list_active()?;
        let mut threads = self.thread_cache.write().await;
        let mut panes = self.tmux_cache.write().await;
        for record in &active {
            if let Some(thread) = record.thread_id {
                threads.insert(record.id.clone(), thread);
            }
            if let Some(target) = record.tmux_target.clone() {
                panes.insert(
                    record.id.clone(),
                    PaneAddress::new(target, record.tmux_socket.clone().map(PathBuf::from)),
                );
            }
        }
        info!(sessions = active.len(), "recovered active sessions from store");
        Ok(active.len())
    }

    // ------------------------------------------------------------------
    // Stale-session reaping (driven by the timer in `reaper`)
    // ------------------------------------------------------------------

    /// One reaper tick: expire overdue approvals, then end every stale
    /// session whose pane is gone or has been recycled by another active
    /// session. Sessions without a known pane target are skipped; their
    /// liveness cannot be verified.
    ///
    /// # Errors
    ///
    /// Only store errors propagate.
    pub async fn reap_once(&self, now: chrono::DateTime<Utc>) -> StoreResult<()> {
        let expired = self.store.expire_approvals(now)?;
        if expired > 0 {
            info!(expired, "expired overdue approvals");
        }

        let stale_window = chrono::Duration::from_std(self.config.stale_timeout)
            .unwrap_or_else(|_| chrono::Duration::hours(72));
        for record in self.store.stale_candidates(now - stale_window)? {
            let Some(target) = record.tmux_target.clone() else {
                continue;
            };
            let address = PaneAddress::new(
                target.clone(),
                record.tmux_socket.clone().map(PathBuf::from),
            );
            let pane_gone = self.mux.validate(&address).await.is_err();
            let recycled = self.store.is_target_owned_elsewhere(&target, &record.id)?;
            if !pane_gone && !recycled {
                continue;
            }

            if let Some(thread) = record.thread_id {
                self.send_to_session(&record.id, Some(thread), &render::reaped_farewell())
                    .await;
                if let Err(e) = self.chat.close_forum_topic(thread).await {
                    warn!(session = %record.id, error = %e, "failed to close reaped topic");
                }
            }
            self.store
                .end_session(&record.id, SessionStatus::Ended, now)?;
            self.purge_session_caches(&record.id).await;
            info!(
                session = %record.id,
                target = %target,
                pane_gone,
                recycled,
                "reaped stale session"
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Outbound: hook events
    // ------------------------------------------------------------------

    /// Dispatch one hook event.
    ///
    /// # Errors
    ///
    /// Only store errors propagate; they are fatal to the daemon.
    pub async fn handle_event(&self, env: Envelope) -> StoreResult<()> {
        let id = env.session_id.clone();
        debug!(session = %id, kind = env.event.kind(), "event received");

        let now = Utc::now();
        if let Some(existing) = self.store.get_session(&id)? {
            self.store.touch(&id, now)?;
            self.heal_tmux_mapping(&id, &env.meta).await?;
            self.maybe_enrich_title(&existing, &env.meta).await;
        }

        match &env.event {
            BridgeEvent::Unknown { name, .. } => {
                warn!(session = %id, kind = %name, "dropping unknown event type");
                Ok(())
            }
            BridgeEvent::ApprovalResponse => {
                // Downstream-only in practice; tolerated inbound.
                debug!(session = %id, "ignoring inbound approval_response");
                Ok(())
            }
            BridgeEvent::SessionEnd => self.on_session_end(&id).await,
            BridgeEvent::SessionStart => {
                // Sessions are created on demand; this is informational.
                let _thread = self.ensure_session(&env).await?;
                Ok(())
            }
            BridgeEvent::AgentResponse { text } => {
                let thread = self.ensure_session(&env).await?;
                self.send_to_session(&id, thread, &render::agent_response(text))
                    .await;
                Ok(())
            }
            BridgeEvent::ToolStart { tool, input } => {
                let thread = self.ensure_session(&env).await?;
                if self.config.verbose {
                    self.on_tool_start(&id, thread, tool, input.as_ref()).await;
                }
                Ok(())
            }
            BridgeEvent::ToolResult { tool, output } => {
                let thread = self.ensure_session(&env).await?;
                if self.config.verbose {
                    self.send_to_session(
                        &id,
                        thread,
                        &render::tool_result(tool.as_deref(), output),
                    )
                    .await;
                }
                Ok(())
            }
            BridgeEvent::UserInput { text, source } => {
                let thread = self.ensure_session(&env).await?;
                self.on_user_input(&id, thread, text, *source).await;
                Ok(())
            }
            BridgeEvent::ApprovalRequest { prompt } => {
                let thread = self.ensure_session(&env).await?;
                self.on_approval_request(&id, thread, prompt).await
            }
            BridgeEvent::Error { message, level } => {
                let thread = self.ensure_session(&env).await?;
                self.send_to_session(&id, thread, &render::error(message, level.as_deref()))
                    .await;
                Ok(())
            }
            BridgeEvent::TurnComplete => {
                let thread = self.ensure_session(&env).await?;
                let was_compacting = self
                    .compacting
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
                if was_compacting {
                    self.send_to_session(&id, thread, &render::compaction_done())
                        .await;
                }
                Ok(())
            }
            BridgeEvent::PreCompact { trigger } => {
                let thread = self.ensure_session(&env).await?;
                self.compacting
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(id.clone());
                if self.config.verbose {
                    self.send_to_session(&id, thread, &render::pre_compact(*trigger))
                        .await;
                }
                Ok(())
            }
            BridgeEvent::Command { name } => {
                let thread = self.ensure_session(&env).await?;
                if self.config.verbose {
                    self.send_to_session(&id, thread, &render::command(name))
                        .await;
                }
                Ok(())
            }
        }
    }

    /// When event metadata advertises a pane, adopt it on change. This is
    /// the self-healing path: moving the CLI to a new pane fixes the
    /// mapping on the next event without user action.
    async fn heal_tmux_mapping(&self, id: &SessionId, meta: &EventMeta) -> StoreResult<()> {
        let Some(raw) = meta.tmux_target.as_deref() else {
            return Ok(());
        };
        let target: PaneTarget = match raw.parse() {
            Ok(target) => target,
            Err(e) => {
                warn!(session = %id, error = %e, "ignoring unparseable pane target");
                return Ok(());
            }
        };
        let meta_socket = meta.tmux_socket.clone();

        let cached = self.tmux_cache.read().await.get(id).cloned();
        let target_changed = cached.as_ref().map(|addr| &addr.target) != Some(&target);
        let socket_changed = meta_socket.as_ref().is_some_and(|socket| {
            cached
                .as_ref()
                .and_then(|addr| addr.socket.as_ref())
                .map(|path| path.display().to_string())
                .as_ref()
                != Some(socket)
        });
        if cached.is_some() && !target_changed && !socket_changed {
            return Ok(());
        }

        // The store keeps a previously learned socket when the event
        // carries none; mirror that when rebuilding the cache entry.
        self.store.set_tmux(id, &target, meta_socket.as_deref())?;
        let socket = match meta_socket {
            Some(socket) => Some(PathBuf::from(socket)),
            None => self
                .store
                .get_session(id)?
                .and_then(|record| record.tmux_socket)
                .map(PathBuf::from),
        };
        if target_changed {
            info!(session = %id, target = %target, "pane mapping updated");
        }
        self.tmux_cache
            .write()
            .await
            .insert(id.clone(), PaneAddress::new(target, socket));
        Ok(())
    }

    /// The first event for a session often arrives before the hooks know
    /// the hostname or project directory, so its topic gets a bare-id
    /// title. When annotations show up later, rename the topic once.
    async fn maybe_enrich_title(&self, before: &SessionRecord, meta: &EventMeta) {
        let Some(thread) = before.thread_id else {
            return;
        };
        let gained_hostname = before.hostname.is_none() && meta.hostname.is_some();
        let gained_project = before.project_dir.is_none() && meta.project_dir.is_some();
        if !gained_hostname && !gained_project {
            return;
        }
        let mut enriched = before.clone();
        enriched.hostname = enriched.hostname.or_else(|| meta.hostname.clone());
        enriched.project_dir = enriched.project_dir.or_else(|| meta.project_dir.clone());
        let title = enriched.thread_title();
        if title == before.thread_title() {
            return;
        }
        match self.chat.rename_forum_topic(thread, &title).await {
            Ok(()) => info!(session = %before.id, title, "enriched topic title"),
            Err(e) => debug!(session = %before.id, error = %e, "topic rename failed"),
        }
    }

    /// Make sure a row exists (creating or reactivating), then return the
    /// session's thread, creating the forum topic when it does not exist
    /// yet. `None` means threads are disabled, the bounded wait elapsed,
    /// or creation failed; renderable callers drop their message rather
    /// than post outside the thread.
    async fn ensure_session(&self, env: &Envelope) -> StoreResult<Option<i64>> {
        let id = &env.session_id;
        let now = Utc::now();
        let existing = self.store.get_session(id)?;
        if let Some(record) = &existing {
            if !record.is_active() {
                info!(session = %id, was = %record.status, "reactivating session");
                self.store.reactivate(id, now)?;
            }
        }
        // Idempotent on the id: creates the row, or merges any newly
        // supplied annotations into an existing one.
        let target = env
            .meta
            .tmux_target
            .as_deref()
            .and_then(|raw| raw.parse::<PaneTarget>().ok());
        let seed = SessionSeed {
            hostname: env.meta.hostname.as_deref(),
            project_dir: env.meta.project_dir.as_deref(),
            tmux_target: target.as_ref(),
            tmux_socket: env.meta.tmux_socket.as_deref(),
        };
        self.store
            .create_session(id, self.config.chat_id, seed, now)?;
        if existing.is_none() {
            info!(session = %id, "session created");
        }
        self.wait_for_thread(id).await
    }

    /// Resolve the session's forum thread, bounded by the configured
    /// wait. The fast path is the cache, then the store; otherwise join
    /// (or lead) the single-flight topic creation.
    pub async fn wait_for_thread(&self, id: &SessionId) -> StoreResult<Option<i64>> {
        if !self.config.use_threads {
            return Ok(None);
        }
        if let Some(thread) = self.thread_cache.read().await.get(id) {
            return Ok(Some(*thread));
        }
        let Some(record) = self.store.get_session(id)? else {
            return Ok(None);
        };
        if let Some(thread) = record.thread_id {
            self.thread_cache.write().await.insert(id.clone(), thread);
            return Ok(Some(thread));
        }

        match self.coordinator.begin(id) {
            Flight::Follower(rx) => {
                match TopicCoordinator::wait(rx, self.config.thread_wait).await {
                    Ok(thread) => {
                        self.thread_cache.write().await.insert(id.clone(), thread);
                        Ok(Some(thread))
                    }
                    Err(WaitError::Timeout) => {
                        error!(session = %id, "timed out waiting for topic creation; dropping message");
                        Ok(None)
                    }
                    Err(WaitError::Failed) => {
                        error!(session = %id, "topic creation failed; dropping message");
                        Ok(None)
                    }
                }
            }
            Flight::Leader(leader) => {
                // Leadership won after our store read; re-check in case the
                // previous leader persisted between the two.
                let Some(record) = self.store.get_session(id)? else {
                    leader.fail();
                    return Ok(None);
                };
                if let Some(thread) = record.thread_id {
                    leader.complete(thread);
                    self.thread_cache.write().await.insert(id.clone(), thread);
                    return Ok(Some(thread));
                }
                let color = self.color_seq.fetch_add(1, Ordering::Relaxed);
                match self
                    .chat
                    .create_forum_topic(&record.thread_title(), color)
                    .await
                {
                    Ok(thread) => {
                        self.store.set_thread_id(id, thread)?;
                        info!(session = %id, thread, "forum topic created");
                        leader.complete(thread);
                        self.thread_cache.write().await.insert(id.clone(), thread);
                        Ok(Some(thread))
                    }
                    Err(e) => {
                        error!(session = %id, error = %e, "forum topic creation failed");
                        leader.fail();
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Send into the session's thread, or drop when the thread is
    /// unavailable, never into the chat's general area.
    async fn send_to_session(&self, id: &SessionId, thread: Option<i64>, html: &str) {
        if self.config.use_threads && thread.is_none() {
            error!(session = %id, "no thread available; dropping message");
            return;
        }
        if let Err(e) = self.chat.send_html(thread, html).await {
            warn!(session = %id, error = %e, "chat send failed");
        }
    }

    async fn on_tool_start(
        &self,
        id: &SessionId,
        thread: Option<i64>,
        tool: &str,
        input: Option<&serde_json::Value>,
    ) {
        if self.config.use_threads && thread.is_none() {
            error!(session = %id, "no thread available; dropping message");
            return;
        }
        let body = render::tool_start(tool, input);
        let details = input.and_then(|value| {
            serde_json::to_string_pretty(value).ok().map(|pretty| {
                let key = uuid::Uuid::new_v4().to_string();
                self.tool_inputs
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key.clone(), pretty);
                Button::new("Details", CallbackData::details(&key))
            })
        });
        let result = match details {
            Some(button) => self
                .chat
                .send_with_buttons(thread, &body, std::slice::from_ref(&button))
                .await
                .map(|_| ()),
            None => self.chat.send_html(thread, &body).await.map(|_| ()),
        };
        if let Err(e) = result {
            warn!(session = %id, error = %e, "chat send failed");
        }
    }

    async fn on_user_input(
        &self,
        id: &SessionId,
        thread: Option<i64>,
        text: &str,
        source: InputSource,
    ) {
        if source == InputSource::Telegram {
            // The daemon originated this text; the user already sees it.
            return;
        }
        let key = echo_key(id, text);
        let suppressed = self
            .dedup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take(&key);
        if suppressed {
            debug!(session = %id, "suppressed self-echo of injected input");
            return;
        }
        self.send_to_session(id, thread, &render::user_input(text))
            .await;
    }

    async fn on_approval_request(
        &self,
        id: &SessionId,
        thread: Option<i64>,
        prompt: &str,
    ) -> StoreResult<()> {
        if !self.config.approvals_enabled {
            debug!(session = %id, "approvals disabled; ignoring request");
            return Ok(());
        }
        let now = Utc::now();
        let record = ApprovalRecord {
            id: ApprovalId::generate(),
            session_id: id.clone(),
            prompt: prompt.to_string(),
            created_at: now,
            expires_at: now
                + chrono::Duration::from_std(self.config.approval_ttl)
                    .unwrap_or_else(|_| chrono::Duration::minutes(5)),
            status: ApprovalStatus::Pending,
            message_id: None,
        };
        self.store.insert_approval(&record)?;

        if self.config.use_threads && thread.is_none() {
            error!(session = %id, "no thread for approval request; buttons not sent");
            return Ok(());
        }
        let buttons: Vec<Button> = [
            ApprovalDecision::Approve,
            ApprovalDecision::Reject,
            ApprovalDecision::Abort,
        ]
        .iter()
        .map(|decision| {
            Button::new(
                decision.label(),
                CallbackData::approval(&record.id, *decision),
            )
        })
        .collect();

        match self
            .chat
            .send_with_buttons(thread, &render::approval_prompt(prompt), &buttons)
            .await
        {
            Ok(message_id) => self.store.set_approval_message(&record.id, message_id)?,
            Err(e) => warn!(session = %id, error = %e, "failed to send approval message"),
        }
        Ok(())
    }

    async fn on_session_end(&self, id: &SessionId) -> StoreResult<()> {
        let Some(record) = self.store.get_session(id)? else {
            debug!(session = %id, "session_end for unknown session");
            return Ok(());
        };
        if let Some(thread) = record.thread_id {
            self.send_to_session(id, Some(thread), &render::session_farewell())
                .await;
            if let Err(e) = self.chat.close_forum_topic(thread).await {
                warn!(session = %id, error = %e, "failed to close forum topic");
            }
        }
        self.store.end_session(id, SessionStatus::Ended, Utc::now())?;
        self.purge_session_caches(id).await;
        info!(session = %id, "session ended");
        Ok(())
    }

    pub(crate) async fn purge_session_caches(&self, id: &SessionId) {
        self.thread_cache.write().await.remove(id);
        self.tmux_cache.write().await.remove(id);
        self.compacting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    // ------------------------------------------------------------------
    // Inbound: chat updates
    // ------------------------------------------------------------------

    /// Dispatch one chat update.
    ///
    /// # Errors
    ///
    /// Only store errors propagate.
    pub async fn handle_chat(&self, update: ChatUpdate) -> StoreResult<()> {
        match update {
            ChatUpdate::Message {
                thread_id,
                text,
                user_id,
            } => self.on_chat_message(thread_id, &text, user_id).await,
            ChatUpdate::Callback {
                data,
                user_id,
                message_id,
                thread_id,
            } => self.on_callback(&data, user_id, message_id, thread_id).await,
        }
    }

    fn user_allowed(&self, user_id: Option<u64>) -> bool {
        match user_id {
            Some(user_id) => self.config.is_user_allowed(user_id),
            // No sender identity (channel posts): deny unless open.
            None => self.config.allowed_user_ids.is_empty(),
        }
    }

    async fn on_chat_message(
        &self,
        thread_id: Option<i64>,
        text: &str,
        user_id: Option<u64>,
    ) -> StoreResult<()> {
        // General-area messages have no routing; ignore entirely.
        let Some(thread_id) = thread_id else {
            return Ok(());
        };
        // Not our thread: another daemon on this channel owns it.
        let Some(record) = self.store.get_by_thread_id(thread_id)? else {
            debug!(thread_id, "message in unowned thread; ignoring");
            return Ok(());
        };
        if !self.user_allowed(user_id) {
            debug!(thread_id, ?user_id, "unauthorized sender; ignoring");
            return Ok(());
        }

        let Some(address) = self.resolve_pane(&record).await else {
            self.send_to_session(
                &record.id,
                Some(thread_id),
                &render::injection_failure("no multiplexer session found"),
            )
            .await;
            return Ok(());
        };

        match classify(text) {
            ChatCommand::Interrupt => {
                if let Err(e) = self.mux.send_key(&address, ControlKey::Escape).await {
                    warn!(session = %record.id, error = %e, "interrupt delivery failed");
                    self.send_to_session(
                        &record.id,
                        Some(thread_id),
                        &render::key_failure("Escape", e.user_hint()),
                    )
                    .await;
                }
            }
            ChatCommand::Kill => {
                if let Err(e) = self.mux.send_key(&address, ControlKey::CtrlC).await {
                    warn!(session = %record.id, error = %e, "kill delivery failed");
                    self.send_to_session(
                        &record.id,
                        Some(thread_id),
                        &render::key_failure("Ctrl-C", e.user_hint()),
                    )
                    .await;
                }
            }
            ChatCommand::Forward(rest) => {
                self.record_echo(&record.id, &format!("/{rest}"));
                if let Err(e) = self.mux.send_slash_command(&address, &rest).await {
                    warn!(session = %record.id, error = %e, "slash forward failed");
                    self.send_to_session(
                        &record.id,
                        Some(thread_id),
                        &render::injection_failure(e.user_hint()),
                    )
                    .await;
                }
            }
            ChatCommand::Literal(text) => {
                self.record_echo(&record.id, &text);
                if let Err(e) = self.mux.inject_text(&address, &text).await {
                    warn!(session = %record.id, error = %e, "injection failed");
                    self.send_to_session(
                        &record.id,
                        Some(thread_id),
                        &render::injection_failure(e.user_hint()),
                    )
                    .await;
                }
                // On success the user already sees their message in the
                // thread; confirm only on failure.
            }
        }
        Ok(())
    }

    fn record_echo(&self, id: &SessionId, text: &str) {
        self.dedup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(echo_key(id, text));
    }

    /// Pane address from cache, falling back to the store row (and
    /// repopulating the cache).
    async fn resolve_pane(&self, record: &SessionRecord) -> Option<PaneAddress> {
        if let Some(address) = self.tmux_cache.read().await.get(&record.id) {
            return Some(address.clone());
        }
        let target = record.tmux_target.clone()?;
        let address = PaneAddress::new(target, record.tmux_socket.clone().map(PathBuf::from));
        self.tmux_cache
            .write()
            .await
            .insert(record.id.clone(), address.clone());
        Some(address)
    }

    async fn on_callback(
        &self,
        data: &str,
        user_id: u64,
        message_id: Option<i64>,
        thread_id: Option<i64>,
    ) -> StoreResult<()> {
        if !self.user_allowed(Some(user_id)) {
            debug!(user_id, "unauthorized button press; ignoring");
            return Ok(());
        }
        match CallbackData::parse(data) {
            Some(CallbackData::Approval { id, decision }) => {
                self.on_approval_decision(&id, decision, message_id).await
            }
            Some(CallbackData::Details { key }) => {
                self.on_details(&key, thread_id).await;
                Ok(())
            }
            None => {
                debug!(data, "unrecognized callback payload");
                Ok(())
            }
        }
    }

    async fn on_approval_decision(
        &self,
        approval_id: &ApprovalId,
        decision: ApprovalDecision,
        message_id: Option<i64>,
    ) -> StoreResult<()> {
        let Some(approval) = self.store.get_approval(approval_id)? else {
            debug!(approval = %approval_id, "button press for unknown approval");
            return Ok(());
        };
        let Some(record) = self.store.get_session(&approval.session_id)? else {
            return Ok(());
        };

        let terminal = match decision {
            ApprovalDecision::Approve => ApprovalStatus::Approved,
            ApprovalDecision::Reject | ApprovalDecision::Abort => ApprovalStatus::Rejected,
        };
        // Exactly one terminal transition wins; late or duplicate presses
        // are no-ops.
        if !self.store.resolve_approval(approval_id, terminal)? {
            debug!(approval = %approval_id, "late approval response; ignoring");
            return Ok(());
        }

        if let Some(button_message) = approval.message_id.or(message_id) {
            if let Err(e) = self.chat.clear_buttons(button_message).await {
                debug!(error = %e, "failed to clear approval buttons");
            }
        }
        let thread = record.thread_id;
        self.send_to_session(&record.id, thread, &render::approval_outcome(decision.label()))
            .await;

        // Answer the hook blocked on the socket.
        self.broadcaster.send(&OutboundEvent::ApprovalResponse {
            session_id: record.id.clone(),
            approval_id: approval_id.to_string(),
            approved: decision.is_approved(),
            timestamp: Utc::now(),
        });
        info!(
            session = %record.id,
            approval = %approval_id,
            decision = decision.label(),
            "approval resolved"
        );

        if decision == ApprovalDecision::Abort {
            if let Some(thread) = thread {
                self.send_to_session(&record.id, Some(thread), &render::aborted_farewell())
                    .await;
                if let Err(e) = self.chat.close_forum_topic(thread).await {
                    warn!(error = %e, "failed to close forum topic on abort");
                }
            }
            self.store
                .end_session(&record.id, SessionStatus::Aborted, Utc::now())?;
            self.purge_session_caches(&record.id).await;
        }
        Ok(())
    }

    async fn on_details(&self, key: &str, thread_id: Option<i64>) {
        let Some(thread_id) = thread_id else {
            return;
        };
        let cached = self
            .tool_inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.to_string())
            .cloned();
        match cached {
            Some(pretty) => {
                if let Err(e) = self
                    .chat
                    .send_html(Some(thread_id), &render::details_dump(&pretty))
                    .await
                {
                    warn!(error = %e, "failed to send tool details");
                }
            }
            None => {
                debug!(key, "details requested for expired cache entry");
            }
        }
    }
}

fn echo_key(id: &SessionId, text: &str) -> String {
    format!("{}|{}", id.as_str(), text)
}
