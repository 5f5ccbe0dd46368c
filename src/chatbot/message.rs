//! Conversation turns and reply segmentation.

use std::sync::Arc;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// An image attached to a user turn: (bytes, media_type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub data: Arc<Vec<u8>>,
    pub mime_type: String,
}

impl Image {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data: Arc::new(data),
            mime_type: mime_type.into(),
        }
    }
}

/// One entry of a session's history. Never edited after it is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub image: Option<Image>,
}

impl Turn {
    pub fn user(text: impl Into<String>, image: Option<Image>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            image,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            image: None,
        }
    }
}

/// Default chunk size for outgoing replies.
pub const MAX_CHUNK_LEN: usize = 2000;

/// Split a reply into chunks of at most `max_len` characters.
///
/// Every chunk except the last is exactly `max_len` characters long and the
/// chunks concatenate back to `text`. Lengths count chars, so a chunk never
/// ends inside a UTF-8 sequence.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for c in text.chars() {
        current.push(c);
        count += 1;
        if count == max_len {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
