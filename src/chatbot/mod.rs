//! Chatbot module - relays chat messages to Gemini with per-user memory.

pub mod engine;
pub mod gemini;
pub mod generator;
pub mod message;
pub mod presence;
pub mod router;
pub mod search;
pub mod session;
pub mod telegram;


pub use engine::{ChatbotConfig, ChatbotEngine};
pub use gemini::GeminiClient;
pub use presence::TracingPresence;
pub use router::Router;
pub use search::DuckDuckGo;
pub use telegram::TelegramClient;
