//! Chatbot engine - relays user messages to the text generator.
//!
//! One request runs through: classify, augment, look up the session, call the
//! generator, fall back if needed, record the exchange, return the reply.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::chatbot::generator::{Completion, TextGenerator};
use crate::chatbot::message::{Image, Turn};
use crate::chatbot::presence::{Presence, PresenceUpdater};
use crate::chatbot::search::WebSearch;
use crate::chatbot::session::SessionStore;
use crate::classifier::{augment, classify, Augmented, Classification, Keywords};

/// Chatbot configuration.
#[derive(Debug, Clone)]
pub struct ChatbotConfig {
    pub max_history_pairs: usize,
    /// Cap on live sessions (None = unbounded).
    pub max_sessions: Option<usize>,
    pub keywords: Keywords,
    /// Reply to an empty mention; `{mention}` is replaced with the author.
    pub acknowledgement: String,
    /// Canned reply to "who made you" questions.
    pub identity_reply: String,
    /// Reply when the generator failed and no fallback answered.
    pub apology: String,
    /// Reply when nothing (generator or fallback) produced an answer.
    pub no_answer: String,
    /// Prompt used when an image arrives without text.
    pub image_prompt: String,
    /// Record failed exchanges (user turn + apology) in the session.
    pub persist_failures: bool,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            max_history_pairs: 10,
            max_sessions: None,
            keywords: Keywords::default(),
            acknowledgement: "At your service {mention}, Sir.".to_string(),
            identity_reply: "I was created by Mr. Stark, Sir. He remains responsible for my development and upkeep.".to_string(),
            apology: "My apologies, Sir. I encountered a problem processing that request.".to_string(),
            no_answer: "I'm afraid I could not find an answer to that, Sir.".to_string(),
            image_prompt: "Describe this image.".to_string(),
            persist_failures: true,
        }
    }
}

/// How a dispatched request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    FallbackUsed,
    Failed,
}

/// The chatbot engine.
pub struct ChatbotEngine {
    config: ChatbotConfig,
    sessions: SessionStore,
    generator: Arc<dyn TextGenerator>,
    search: Option<Arc<dyn WebSearch>>,
    presence: Option<Arc<dyn PresenceUpdater>>,
}

impl ChatbotEngine {
    /// Create a new chatbot engine.
    pub fn new(config: ChatbotConfig, generator: Arc<dyn TextGenerator>) -> Self {
        let sessions = SessionStore::new(config.max_history_pairs, config.max_sessions);
        Self {
            config,
            sessions,
            generator,
            search: None,
            presence: None,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_presence(mut self, presence: Arc<dyn PresenceUpdater>) -> Self {
        self.presence = Some(presence);
        self
    }

    #[cfg(test)]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn notify(&self, presence: Presence) {
        if let Some(ref p) = self.presence {
            p.update(presence);
        }
    }

    /// Handle one qualified message and produce the reply text.
    ///
    /// `mention` is how the author is addressed in the acknowledgement.
    /// Always returns something to send; generator errors never escape.
    pub async fn handle(&self, user_id: i64, mention: &str, text: &str, image: Option<Image>) -> String {
        let text = text.trim();
        if text.is_empty() && image.is_none() {
            return self.acknowledge(mention);
        }

        let classification = classify(text, &self.config.keywords);
        let prompt = match augment(text, classification, Utc::now(), &self.config.identity_reply) {
            Augmented::Canned(reply) => {
                info!("🪪 Identity query from {}, answered directly", user_id);
                return reply;
            }
            Augmented::Prompt(p) if p.is_empty() => self.config.image_prompt.clone(),
            Augmented::Prompt(p) => p,
        };
        if classification == Classification::TimeQuery {
            info!("🕒 Time query from {}, injected UTC time", user_id);
        }

        // Holding the session lock across the call serializes requests per user.
        let session = self.sessions.get_or_create(user_id).await;
        let mut session = session.lock().await;

        self.notify(Presence::Processing);
        let completion = self
            .generator
            .generate(session.transcript(), &prompt, image.as_ref())
            .await;
        self.notify(Presence::Idle);

        let (outcome, reply) = self.resolve(user_id, text, completion).await;
        info!(
            "📨 Reply to {}: {:?}, {} chars",
            user_id,
            outcome,
            reply.chars().count()
        );

        if outcome != Outcome::Failed || self.config.persist_failures {
            session.append(Turn::user(prompt, image));
            session.append(Turn::assistant(reply.clone()));
        }

        reply
    }

    fn acknowledge(&self, mention: &str) -> String {
        let template = &self.config.acknowledgement;
        if mention.is_empty() {
            template.replace(" {mention}", "").replace("{mention}", "")
        } else {
            template.replace("{mention}", mention)
        }
    }

    async fn resolve(&self, user_id: i64, query: &str, completion: Completion) -> (Outcome, String) {
        match completion {
            Completion::Text(text) => (Outcome::Succeeded, text.trim().to_string()),
            Completion::Empty => {
                info!("Empty completion for {}, trying fallback", user_id);
                let reply = self
                    .search_fallback(query)
                    .await
                    .unwrap_or_else(|| self.config.no_answer.clone());
                (Outcome::FallbackUsed, reply)
            }
            Completion::Refused(reason) => {
                info!("Completion refused for {} ({}), trying fallback", user_id, reason);
                let reply = self
                    .search_fallback(query)
                    .await
                    .unwrap_or_else(|| self.config.no_answer.clone());
                (Outcome::FallbackUsed, reply)
            }
            Completion::Failed(e) => {
                warn!("Generation failed for {}: {}", user_id, e);
                match self.search_fallback(query).await {
                    Some(snippet) => (Outcome::FallbackUsed, snippet),
                    None => (Outcome::Failed, self.config.apology.clone()),
                }
            }
        }
    }

    /// Ask the web search collaborator, if any. None means no usable snippet.
    async fn search_fallback(&self, query: &str) -> Option<String> {
        let search = self.search.as_ref()?;
        if query.is_empty() {
            return None;
        }

        match search.search(query).await {
            Ok(snippet) if !snippet.trim().is_empty() => Some(snippet.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!("Web search fallback failed: {}", e);
                None
            }
        }
    }
}
