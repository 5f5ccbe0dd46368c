//! Keyword intent detection and prompt rewriting.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    TimeQuery,
    IdentityQuery,
    Plain,
}

/// Keyword sets, stored lower-cased.
#[derive(Debug, Clone)]
pub struct Keywords {
    pub time: Vec<String>,
    pub identity: Vec<String>,
}

impl Keywords {
    pub fn new(time: Vec<String>, identity: Vec<String>) -> Self {
        Self {
            time: time.into_iter().map(|k| k.to_lowercase()).collect(),
            identity: identity.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

impl Default for Keywords {
    fn default() -> Self {
        Self::new(default_time_keywords(), default_identity_keywords())
    }
}

pub fn default_time_keywords() -> Vec<String> {
    [
        "what is the time",
        "what's the time",
        "current time",
        "what time is it",
        "time in",
        "what date is it",
        "today's date",
        "date in",
        "day",
        "time now",
        "what day is it",
        "today",
        "date",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub fn default_identity_keywords() -> Vec<String> {
    [
        "who created you",
        "who made you",
        "who built you",
        "who developed you",
        "who is your developer",
        "who owns you",
        "who is your creator",
        "who designed you",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Classify a message. Time keywords win over identity keywords.
pub fn classify(text: &str, keywords: &Keywords) -> Classification {
    let lower = text.to_lowercase();

    if keywords.time.iter().any(|k| lower.contains(k.as_str())) {
        Classification::TimeQuery
    } else if keywords.identity.iter().any(|k| lower.contains(k.as_str())) {
        Classification::IdentityQuery
    } else {
        Classification::Plain
    }
}

/// Result of augmenting a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Augmented {
    /// Send this prompt to the model.
    Prompt(String),
    /// Answer directly without calling the model.
    Canned(String),
}

/// Rewrite the prompt for its classification.
///
/// `now` must be read by the caller right before dispatch.
pub fn augment(
    text: &str,
    classification: Classification,
    now: DateTime<Utc>,
    identity_reply: &str,
) -> Augmented {
    match classification {
        Classification::TimeQuery => Augmented::Prompt(time_prompt(text, now)),
        Classification::IdentityQuery => Augmented::Canned(identity_reply.to_string()),
        Classification::Plain => Augmented::Prompt(text.to_string()),
    }
}

fn time_prompt(query: &str, now: DateTime<Utc>) -> String {
    let utc = now.format("%A, %d %B %Y, %H:%M");
    format!(
        "Sir, the current date and time in UTC is {utc}. \
         Please calculate the local date and time for the following request: \"{query}\". \
         Respond in a structured, analytical tone appropriate for a formal AI assistant."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_time_query() {
        let kw = Keywords::default();
        assert_eq!(classify("what is the time in Tokyo", &kw), Classification::TimeQuery);
        assert_eq!(classify("WHAT TIME IS IT", &kw), Classification::TimeQuery);
    }

    #[test]
    fn test_identity_query() {
        let kw = Keywords::default();
        assert_eq!(classify("who created you", &kw), Classification::IdentityQuery);
        assert_eq!(classify("Hey, Who Made You?", &kw), Classification::IdentityQuery);
    }

    #[test]
    fn test_plain() {
        let kw = Keywords::default();
        assert_eq!(classify("tell me a story", &kw), Classification::Plain);
    }

    #[test]
    fn test_time_wins_over_identity() {
        let kw = Keywords::default();
        assert_eq!(
            classify("who created you and what day is it", &kw),
            Classification::TimeQuery
        );
    }

    #[test]
    fn test_custom_keywords_are_lowercased() {
        let kw = Keywords::new(vec!["CLOCK".into()], vec!["Your Maker".into()]);
        assert_eq!(classify("check the clock", &kw), Classification::TimeQuery);
        assert_eq!(classify("who is your maker", &kw), Classification::IdentityQuery);
        assert_eq!(classify("what day is it", &kw), Classification::Plain);
    }

    #[test]
    fn test_augment_time_includes_utc_and_query() {
        let now = at(2024, 3, 15, 9, 5);
        let out = augment("time in Tokyo", Classification::TimeQuery, now, "unused");
        let Augmented::Prompt(prompt) = out else {
            panic!("expected prompt");
        };
        assert!(prompt.contains("Friday, 15 March 2024, 09:05"));
        assert!(prompt.contains("\"time in Tokyo\""));
    }

    #[test]
    fn test_augment_time_uses_supplied_clock() {
        let a = augment("now", Classification::TimeQuery, at(2024, 1, 1, 0, 0), "");
        let b = augment("now", Classification::TimeQuery, at(2024, 1, 2, 13, 30), "");
        assert_ne!(a, b);
        let Augmented::Prompt(prompt) = b else {
            panic!("expected prompt");
        };
        assert!(prompt.contains("Tuesday, 02 January 2024, 13:30"));
    }

    #[test]
    fn test_augment_identity_is_canned() {
        let out = augment("who made you", Classification::IdentityQuery, Utc::now(), "Mr. Stark.");
        assert_eq!(out, Augmented::Canned("Mr. Stark.".to_string()));
    }

    #[test]
    fn test_augment_plain_passthrough() {
        let out = augment("tell me a story", Classification::Plain, Utc::now(), "");
        assert_eq!(out, Augmented::Prompt("tell me a story".to_string()));
    }
}
