//! The teloxide-backed [`ChatAdapter`] implementation.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode, ThreadId};
use tracing::debug;

use crate::adapter::{Button, ChatAdapter};
use crate::error::{ChatError, ChatResult};
use crate::format::{chunk_html, MAX_MESSAGE_LEN};

/// The forum-topic icon colors Telegram accepts, cycled by session.
const TOPIC_COLORS: [(u8, u8, u8); 6] = [
    (0x6F, 0xB9, 0xF0),
    (0xFF, 0xD6, 0x7E),
    (0xCB, 0x86, 0xDB),
    (0x8E, 0xEE, 0x98),
    (0xFF, 0x93, 0xB2),
    (0xFB, 0x6F, 0x5F),
];

/// Outbound Telegram operations against one forum chat.
#[derive(Clone)]
pub struct TelegramChat {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramChat {
    /// Wrap a bot for the given chat.
    #[must_use]
    pub fn new(bot: Bot, chat_id: i64) -> Self {
        Self {
            bot,
            chat_id: ChatId(chat_id),
        }
    }
}

fn to_thread_id(thread_id: i64) -> ChatResult<ThreadId> {
    i32::try_from(thread_id)
        .map(|id| ThreadId(MessageId(id)))
        .map_err(|_| ChatError::ThreadIdOutOfRange(thread_id))
}

fn to_message_id(message_id: i64) -> ChatResult<MessageId> {
    i32::try_from(message_id)
        .map(MessageId)
        .map_err(|_| ChatError::MessageIdOutOfRange(message_id))
}

fn keyboard(buttons: &[Button]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = buttons
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.data.clone()))
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

#[async_trait]
impl ChatAdapter for TelegramChat {
    async fn send_html(&self, thread_id: Option<i64>, html: &str) -> ChatResult<i64> {
        let thread = thread_id.map(to_thread_id).transpose()?;
        let mut first_id: Option<i64> = None;
        for chunk in chunk_html(html, MAX_MESSAGE_LEN) {
            let mut request = self
                .bot
                .send_message(self.chat_id, chunk)
                .parse_mode(ParseMode::Html);
            if let Some(thread) = thread {
                request = request.message_thread_id(thread);
            }
            let sent = request.await?;
            first_id.get_or_insert(i64::from(sent.id.0));
        }
        Ok(first_id.unwrap_or_default())
    }

    async fn send_with_buttons(
        &self,
        thread_id: Option<i64>,
        html: &str,
        buttons: &[Button],
    ) -> ChatResult<i64> {
        let mut request = self
            .bot
            .send_message(self.chat_id, html)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard(buttons));
        if let Some(thread_id) = thread_id {
            request = request.message_thread_id(to_thread_id(thread_id)?);
        }
        let sent = request.await?;
        Ok(i64::from(sent.id.0))
    }

    async fn create_forum_topic(&self, name: &str, color_index: usize) -> ChatResult<i64> {
        let (r, g, b) = TOPIC_COLORS[color_index % TOPIC_COLORS.len()];
        let icon_color = (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b);
        let topic = self
            .bot
            .create_forum_topic(self.chat_id, name, icon_color, String::new())
            .await?;
        let thread_id = i64::from(topic.thread_id.0 .0);
        debug!(thread_id, name, "created forum topic");
        Ok(thread_id)
    }

    async fn rename_forum_topic(&self, thread_id: i64, name: &str) -> ChatResult<()> {
        self.bot
            .edit_forum_topic(self.chat_id, to_thread_id(thread_id)?)
            .name(name.to_string())
            .await?;
        Ok(())
    }

    async fn close_forum_topic(&self, thread_id: i64) -> ChatResult<()> {
        self.bot
            .close_forum_topic(self.chat_id, to_thread_id(thread_id)?)
            .await?;
        Ok(())
    }

    async fn clear_buttons(&self, message_id: i64) -> ChatResult<()> {
        self.bot
            .edit_message_reply_markup(self.chat_id, to_message_id(message_id)?)
            .reply_markup(InlineKeyboardMarkup::new(
                Vec::<Vec<InlineKeyboardButton>>::new(),
            ))
            .await?;
        Ok(())
    }
}
