//! Telegram client using teloxide.

use std::time::Duration;

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileId, MessageEntityKind, MessageId, ReplyParameters};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::chatbot::generator::BoxFuture;
use crate::chatbot::message::split_message;
use crate::chatbot::router::{Attachment, AttachmentFetcher, InboundEvent};

/// Mention handles treated as pinging the whole chat.
const BROADCAST_MENTIONS: &[&str] = &["@all", "@everyone", "@here"];

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
    bot_user_id: i64,
    bot_username: Option<String>,
}

impl TelegramClient {
    pub fn new(bot: Bot, bot_user_id: i64, bot_username: Option<String>) -> Self {
        Self {
            bot,
            bot_user_id,
            bot_username,
        }
    }

    /// Send a reply as one or more plain-text messages, in order.
    ///
    /// Each chunk replies to `reply_to_message_id`. A failed chunk is logged
    /// and the rest are still sent.
    pub async fn send_reply(
        &self,
        chat_id: i64,
        text: &str,
        max_chunk_len: usize,
        reply_to_message_id: Option<i32>,
    ) -> usize {
        let chunks = split_message(text, max_chunk_len);
        let total = chunks.len();
        let mut sent = 0;

        for (i, chunk) in chunks.iter().enumerate() {
            if chunk.trim().is_empty() {
                continue;
            }

            let mut request = self.bot.send_message(ChatId(chat_id), chunk);
            if let Some(msg_id) = reply_to_message_id {
                request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id)));
            }

            match request.await {
                Ok(_) => sent += 1,
                Err(e) => warn!("Failed to send chunk {}/{} to {}: {e}", i + 1, total, chat_id),
            }
        }

        if total > 1 {
            info!("📤 Sent {}/{} chunks to {}", sent, total, chat_id);
        }
        sent
    }

    /// Show "typing..." in the chat until the returned handle is aborted.
    pub fn start_typing(&self, chat_id: i64) -> JoinHandle<()> {
        let bot = self.bot.clone();
        tokio::spawn(async move {
            loop {
                let _ = bot.send_chat_action(ChatId(chat_id), ChatAction::Typing).await;
                tokio::time::sleep(Duration::from_secs(4)).await;
            }
        })
    }

    /// Download a file by file_id.
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, String> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(|e| format!("Failed to get file info: {e}"))?;

        let mut data = Vec::new();
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .map_err(|e| format!("Failed to download file: {e}"))?;

        Ok(data)
    }

    /// Convert a Telegram message to a platform-neutral event.
    pub fn to_inbound_event(&self, msg: &Message) -> Option<InboundEvent> {
        let user = msg.from.as_ref()?;
        let text = msg.text().or_else(|| msg.caption()).unwrap_or("").to_string();

        let entities = msg
            .parse_entities()
            .or_else(|| msg.parse_caption_entities())
            .unwrap_or_default();

        let mut mentions = Vec::new();
        let mut mentions_everyone = false;
        for entity in &entities {
            match entity.kind() {
                MessageEntityKind::Mention => {
                    let handle = entity.text();
                    if BROADCAST_MENTIONS.iter().any(|b| handle.eq_ignore_ascii_case(b)) {
                        mentions_everyone = true;
                    } else if self
                        .bot_username
                        .as_deref()
                        .is_some_and(|u| handle.trim_start_matches('@').eq_ignore_ascii_case(u))
                    {
                        mentions.push(self.bot_user_id);
                    }
                }
                MessageEntityKind::TextMention { user } => mentions.push(user.id.0 as i64),
                _ => {}
            }
        }

        let mut attachments = Vec::new();
        if let Some(largest) = msg.photo().and_then(|sizes| sizes.last()) {
            // Telegram re-encodes photos as JPEG
            attachments.push(Attachment {
                content_type: Some("image/jpeg".to_string()),
                file_id: largest.file.id.0.clone(),
            });
        }
        if let Some(doc) = msg.document() {
            attachments.push(Attachment {
                content_type: doc.mime_type.as_ref().map(|m| m.to_string()),
                file_id: doc.file.id.0.clone(),
            });
        }

        Some(InboundEvent {
            author_id: user.id.0 as i64,
            author_mention: user.mention().unwrap_or_else(|| user.first_name.clone()),
            text,
            is_direct: msg.chat.is_private(),
            mentions,
            mentions_everyone,
            attachments,
        })
    }
}

impl AttachmentFetcher for TelegramClient {
    fn fetch<'a>(&'a self, attachment: &'a Attachment) -> BoxFuture<'a, Result<Vec<u8>, String>> {
        Box::pin(self.download_file(&attachment.file_id))
    }
}
