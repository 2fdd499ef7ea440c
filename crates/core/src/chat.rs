//! Chat message and citation types

use serde::{Deserialize, Serialize};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// A source citation attached to an answer
///
/// Citations are emitted once per stream, before the first generated
/// token, so callers can render sources while the answer is streaming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Parent chunk id the citation points at
    pub parent_id: String,
    /// Display title (document title, or first content line)
    pub title: String,
    /// Prettified law identifier, e.g. "Luật 123"
    pub law_id: Option<String>,
    /// Article reference extracted from the text, e.g. "Điều 5"
    pub article_ref: Option<String>,
    /// Truncated content excerpt for display
    pub content: String,
    /// Normalized relevance score in [0, 1]
    pub relevance_score: f32,
}
