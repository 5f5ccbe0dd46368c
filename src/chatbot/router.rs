//! Decides which inbound messages the bot answers.
//!
//! Direct messages always qualify. In shared chats the text must start with a
//! trigger phrase or mention the bot (broadcast mentions don't count).

use regex::Regex;
use tracing::{info, warn};

use crate::chatbot::generator::BoxFuture;
use crate::chatbot::message::Image;

/// A file attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Declared MIME type, if the platform provides one.
    pub content_type: Option<String>,
    /// Platform handle used to download the bytes.
    pub file_id: String,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("image/"))
    }
}

/// Platform-neutral view of an incoming message.
#[derive(Debug, Clone, Default)]
pub struct InboundEvent {
    pub author_id: i64,
    /// How to address the author in a reply (e.g. "@tony").
    pub author_mention: String,
    pub text: String,
    /// Private chat with the bot.
    pub is_direct: bool,
    /// User ids mentioned in the message.
    pub mentions: Vec<i64>,
    /// Message pings everyone in the chat.
    pub mentions_everyone: bool,
    pub attachments: Vec<Attachment>,
}

/// A message the bot should answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub user_id: i64,
    pub mention: String,
    pub text: String,
    pub image: Option<Image>,
}

/// Downloads attachment bytes.
pub trait AttachmentFetcher: Send + Sync {
    fn fetch<'a>(&'a self, attachment: &'a Attachment) -> BoxFuture<'a, Result<Vec<u8>, String>>;
}

/// Build a case-insensitive regex matching any trigger phrase at the start of a message.
///
/// Longer phrases are tried first so "hey jarvis" wins over "jarvis".
pub fn trigger_regex(phrases: &[String]) -> Result<Option<Regex>, regex::Error> {
    let mut phrases: Vec<&str> = phrases
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    if phrases.is_empty() {
        return Ok(None);
    }
    phrases.sort_by_key(|p| std::cmp::Reverse(p.chars().count()));

    let alternatives: Vec<String> = phrases
        .iter()
        .map(|p| {
            let escaped = regex::escape(p);
            if p.chars().last().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                format!(r"{escaped}\b")
            } else {
                escaped
            }
        })
        .collect();

    Regex::new(&format!(r"(?i)^\s*(?:{})", alternatives.join("|"))).map(Some)
}

pub struct Router {
    bot_user_id: i64,
    trigger: Option<Regex>,
    mention: Regex,
}

impl Router {
    pub fn new(
        bot_user_id: i64,
        bot_username: Option<&str>,
        trigger: Option<Regex>,
    ) -> Result<Self, regex::Error> {
        let mut pattern = format!(r"<@!?{bot_user_id}>");
        if let Some(username) = bot_username.filter(|u| !u.is_empty()) {
            let username = regex::escape(username.trim_start_matches('@'));
            pattern = format!(r"(?i){pattern}|@{username}\b");
        }

        Ok(Self {
            bot_user_id,
            trigger,
            mention: Regex::new(&pattern)?,
        })
    }

    /// Decide whether the event is for the bot and extract the clean query text.
    pub fn qualify(&self, event: &InboundEvent) -> Option<String> {
        if event.author_id == self.bot_user_id {
            return None;
        }

        let raw = event.text.trim();

        let rest = if event.is_direct {
            raw
        } else if let Some(m) = self.trigger.as_ref().and_then(|t| t.find(raw)) {
            &raw[m.end()..]
        } else if !event.mentions_everyone && event.mentions.contains(&self.bot_user_id) {
            raw
        } else {
            return None;
        };

        let stripped = self.mention.replace_all(rest, "");
        Some(
            stripped
                .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ':' | ';' | '!'))
                .trim()
                .to_string(),
        )
    }

    /// Qualify the event and fetch its first image attachment.
    pub async fn route(&self, event: &InboundEvent, fetcher: &dyn AttachmentFetcher) -> Option<Routed> {
        let text = self.qualify(event)?;

        let image = match event.attachments.iter().find(|a| a.is_image()) {
            Some(attachment) => match fetcher.fetch(attachment).await {
                Ok(data) => {
                    let mime = attachment.content_type.clone().unwrap_or_default();
                    info!("📥 Fetched image ({} bytes, {})", data.len(), mime);
                    Some(Image::new(data, mime))
                }
                Err(e) => {
                    warn!("Failed to fetch attachment, continuing without image: {e}");
                    None
                }
            },
            None => None,
        };

        Some(Routed {
            user_id: event.author_id,
            mention: event.author_mention.clone(),
            text,
            image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT_ID: i64 = 999;

    fn router() -> Router {
        let trigger = trigger_regex(&["jarvis".to_string(), "hey jarvis".to_string()]).unwrap();
        Router::new(BOT_ID, Some("jarvis_bot"), trigger).unwrap()
    }

    fn group(text: &str) -> InboundEvent {
        InboundEvent {
            author_id: 1,
            author_mention: "@tony".to_string(),
            text: text.to_string(),
            ..Default::default()
        }
    }

    struct Fetcher(Result<Vec<u8>, String>);

    impl AttachmentFetcher for Fetcher {
        fn fetch<'a>(&'a self, _attachment: &'a Attachment) -> BoxFuture<'a, Result<Vec<u8>, String>> {
            let result = self.0.clone();
            Box::pin(async move { result })
        }
    }

    #[test]
    fn test_ignores_own_messages() {
        let mut event = group("hello");
        event.author_id = BOT_ID;
        event.is_direct = true;
        assert_eq!(router().qualify(&event), None);
    }

    #[test]
    fn test_direct_message_always_qualifies() {
        let mut event = group("  hello there  ");
        event.is_direct = true;
        assert_eq!(router().qualify(&event).as_deref(), Some("hello there"));
    }

    #[test]
    fn test_group_without_trigger_ignored() {
        assert_eq!(router().qualify(&group("just chatting")), None);
    }

    #[test]
    fn test_trigger_phrase_stripped() {
        assert_eq!(router().qualify(&group("Jarvis, status report")).as_deref(), Some("status report"));
        assert_eq!(router().qualify(&group("hey JARVIS what's up")).as_deref(), Some("what's up"));
    }

    #[test]
    fn test_trigger_needs_word_boundary() {
        assert_eq!(router().qualify(&group("jarvisson is here")), None);
    }

    #[test]
    fn test_trigger_not_in_middle() {
        assert_eq!(router().qualify(&group("ask jarvis about it")), None);
    }

    #[test]
    fn test_mention_qualifies_and_is_stripped() {
        let mut event = group("@jarvis_bot summarize this");
        event.mentions = vec![BOT_ID];
        assert_eq!(router().qualify(&event).as_deref(), Some("summarize this"));

        let mut event = group("<@999> hi");
        event.mentions = vec![BOT_ID];
        assert_eq!(router().qualify(&event).as_deref(), Some("hi"));
    }

    #[test]
    fn test_broadcast_mention_ignored() {
        let mut event = group("@everyone @jarvis_bot meeting now");
        event.mentions = vec![BOT_ID];
        event.mentions_everyone = true;
        assert_eq!(router().qualify(&event), None);
    }

    #[test]
    fn test_mention_of_someone_else_ignored() {
        let mut event = group("@alice hello");
        event.mentions = vec![5];
        assert_eq!(router().qualify(&event), None);
    }

    #[test]
    fn test_mention_only_gives_empty_text() {
        let mut event = group("@jarvis_bot");
        event.mentions = vec![BOT_ID];
        assert_eq!(router().qualify(&event).as_deref(), Some(""));
    }

    #[test]
    fn test_no_triggers_configured() {
        let router = Router::new(BOT_ID, None, trigger_regex(&[]).unwrap()).unwrap();
        assert_eq!(router.qualify(&group("jarvis hi")), None);
    }

    #[tokio::test]
    async fn test_route_fetches_image() {
        let mut event = group("hello");
        event.is_direct = true;
        event.attachments = vec![
            Attachment { content_type: Some("application/pdf".into()), file_id: "a".into() },
            Attachment { content_type: Some("image/png".into()), file_id: "b".into() },
        ];

        let routed = router().route(&event, &Fetcher(Ok(vec![7, 7]))).await.unwrap();
        assert_eq!(routed.user_id, 1);
        assert_eq!(routed.mention, "@tony");
        assert_eq!(routed.text, "hello");
        let image = routed.image.unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(*image.data, vec![7, 7]);
    }

    #[tokio::test]
    async fn test_route_fetch_failure_means_no_image() {
        let mut event = group("look");
        event.is_direct = true;
        event.attachments = vec![Attachment { content_type: Some("image/jpeg".into()), file_id: "x".into() }];

        let routed = router().route(&event, &Fetcher(Err("timeout".into()))).await.unwrap();
        assert_eq!(routed.text, "look");
        assert!(routed.image.is_none());
    }

    #[tokio::test]
    async fn test_route_unqualified_is_none() {
        let routed = router().route(&group("nope"), &Fetcher(Ok(vec![]))).await;
        assert!(routed.is_none());
    }
}
