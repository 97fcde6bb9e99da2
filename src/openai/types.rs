//! Request-side OpenAI chat types
//!
//! Only the subset the bridge understands: text and image content, the three
//! conversational roles, and the few request knobs that reach the upstream.

use serde::{Deserialize, Deserializer, Serialize};

/// Role of a message author
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Lowercase role name as used in transcript prefixes
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image reference: the OpenAI object form or a bare URL string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ImageUrl {
    Object {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Url(String),
}

impl ImageUrl {
    pub fn url(&self) -> &str {
        match self {
            ImageUrl::Object { url, .. } => url,
            ImageUrl::Url(url) => url,
        }
    }
}

/// A part of multimodal content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
    /// Audio, files and other modalities are accepted and dropped
    #[serde(other)]
    Unsupported,
}

/// Message content - either plain text or multimodal parts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentItem>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl MessageContent {
    /// Text items joined with `separator`; plain text is returned verbatim
    pub fn joined_text(&self, separator: &str) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(items) => items
                .iter()
                .filter_map(|item| match item {
                    ContentItem::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(separator),
        }
    }
}

/// A chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    #[serde(default, deserialize_with = "nullable_content")]
    pub content: MessageContent,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn parts(role: Role, items: Vec<ContentItem>) -> Self {
        Self {
            role,
            content: MessageContent::Parts(items),
        }
    }
}

/// Assistant messages frequently arrive with `"content": null`
fn nullable_content<'de, D>(deserializer: D) -> Result<MessageContent, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<MessageContent>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Chat completion request
///
/// `messages` is kept as raw JSON so that a structurally valid body with bad
/// messages can be reported as `invalid_messages` rather than `invalid_json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Option<serde_json::Value>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub max_tokens: Option<serde_json::Number>,
}

impl ChatCompletionRequest {
    /// Whether an SSE response was asked for; `null` counts as absent
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Positive integer `max_tokens` override
    ///
    /// Zero, negative, fractional or oversized values are ignored.
    pub fn requested_max_tokens(&self) -> Option<u32> {
        self.max_tokens
            .as_ref()
            .and_then(serde_json::Number::as_u64)
            .and_then(|t| u32::try_from(t).ok())
            .filter(|t| *t > 0)
    }
}
