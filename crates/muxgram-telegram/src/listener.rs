//! Long-poll listener: forwards inbound updates to the router.
//!
//! One dispatcher per bot identity; the platform allows a single
//! long-poll consumer. The listener does no routing of its own; it
//! acknowledges button presses and forwards everything addressed to the
//! configured chat into the router's channel.

use teloxide::dispatching::{ShutdownToken, UpdateFilterExt};
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::ThreadId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapter::ChatUpdate;

#[derive(Clone)]
struct ListenerState {
    chat_id: ChatId,
    tx: mpsc::Sender<ChatUpdate>,
}

/// Spawns and owns the long-poll dispatcher.
pub struct TelegramListener;

/// Handle to a running listener; dropping it leaves the task running, call
/// [`ListenerHandle::stop`] for a graceful drain.
pub struct ListenerHandle {
    shutdown: ShutdownToken,
    join: JoinHandle<()>,
}

impl TelegramListener {
    /// Start long-polling `bot`, forwarding updates for `chat_id` to `tx`.
    #[must_use]
    pub fn spawn(bot: Bot, chat_id: i64, tx: mpsc::Sender<ChatUpdate>) -> ListenerHandle {
        let state = ListenerState {
            chat_id: ChatId(chat_id),
            tx,
        };
        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(on_message))
            .branch(Update::filter_callback_query().endpoint(on_callback));

        let mut dispatcher = Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![state])
            .default_handler(|_| async {})
            .build();
        let shutdown = dispatcher.shutdown_token();
        let join = tokio::spawn(async move {
            info!("telegram long-poll started");
            dispatcher.dispatch().await;
            info!("telegram long-poll stopped");
        });
        ListenerHandle { shutdown, join }
    }
}

impl ListenerHandle {
    /// Stop polling and wait for in-flight handlers to drain.
    pub async fn stop(self) {
        match self.shutdown.shutdown() {
            Ok(done) => done.await,
            Err(e) => warn!(error = %e, "listener was not running"),
        }
        if let Err(e) = self.join.await {
            warn!(error = %e, "listener task join failed");
        }
    }
}

fn thread_to_i64(thread: Option<ThreadId>) -> Option<i64> {
    thread.map(|t| i64::from(t.0 .0))
}

async fn on_message(msg: Message, state: ListenerState) -> ResponseResult<()> {
    if msg.chat.id != state.chat_id {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let update = ChatUpdate::Message {
        thread_id: thread_to_i64(msg.thread_id),
        text: text.to_string(),
        user_id: msg.from.as_ref().map(|user| user.id.0),
    };
    if state.tx.send(update).await.is_err() {
        debug!("router channel closed; dropping inbound message");
    }
    Ok(())
}

async fn on_callback(bot: Bot, query: CallbackQuery, state: ListenerState) -> ResponseResult<()> {
    // Acknowledge immediately so the button stops spinning; the router
    // reports the outcome in the thread.
    let _ = bot.answer_callback_query(query.id.clone()).await;

    let Some(data) = query.data.clone() else {
        return Ok(());
    };
    if let Some(message) = &query.message {
        if message.chat().id != state.chat_id {
            return Ok(());
        }
    }
    let update = ChatUpdate::Callback {
        data,
        user_id: query.from.id.0,
        message_id: query.message.as_ref().map(|m| i64::from(m.id().0)),
        thread_id: thread_to_i64(
            query
                .message
                .as_ref()
                .and_then(|m| m.regular_message())
                .and_then(|m| m.thread_id),
        ),
    };
    if state.tx.send(update).await.is_err() {
        debug!("router channel closed; dropping callback");
    }
    Ok(())
}
