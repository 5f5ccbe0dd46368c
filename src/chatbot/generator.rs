//! Remote text generation seam.
//!
//! The engine only sees [`TextGenerator`] and branches on the [`Completion`]
//! tag; adapters decide what counts as empty or refused.

use std::future::Future;
use std::pin::Pin;

use crate::chatbot::message::{Image, Turn};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of one generation call.
#[derive(Debug)]
pub enum Completion {
    Text(String),
    Empty,
    Refused(String),
    Failed(GenerationError),
}

#[derive(Debug)]
pub enum GenerationError {
    Http(String),
    Api { status: u16, body: String },
    Parse(String),
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::Http(e) => write!(f, "HTTP error: {e}"),
            GenerationError::Api { status, body } => write!(f, "API error {status}: {body}"),
            GenerationError::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for GenerationError {}

/// A stateless completion backend.
pub trait TextGenerator: Send + Sync {
    /// Generate a reply to `prompt` given the prior `history`.
    fn generate<'a>(
        &'a self,
        history: &'a [Turn],
        prompt: &'a str,
        image: Option<&'a Image>,
    ) -> BoxFuture<'a, Completion>;
}
