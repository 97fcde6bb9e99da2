//! Conversation normalization
//!
//! Flattens an OpenAI message list into the single prompt, system prompt and
//! optional image that the upstream model accepts.
//!
//! The transcript format is one `"<role>: <text>\n"` line per message. When
//! the conversation ends on a user turn, the anti-echo directive is appended
//! so the model answers once instead of continuing the transcript itself. The
//! same directive closes the system prompt.

use thiserror::Error;
use tracing::debug;

use crate::openai::{ContentItem, Message, MessageContent, Role};

/// Errors produced while normalizing a conversation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("conversation must contain at least one non-system message with text")]
    EmptyConversation,
}

/// A conversation reduced to the upstream's input shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedConversation {
    /// Linear transcript of all non-system turns
    pub prompt: String,
    /// Extracted system prompt followed by the directive
    pub system_prompt: String,
    /// Last image seen in a user turn
    pub image_url: Option<String>,
}

/// Concatenate the text of all system messages, in order
///
/// Array content contributes only its text items. Trailing whitespace of the
/// joined result is trimmed.
pub fn extract_system_prompt(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.joined_text(""))
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}

/// Normalize a conversation for the upstream model
///
/// `messages` is left untouched; the function works on its own copy.
pub fn normalize(
    messages: &[Message],
    directive: &str,
) -> Result<NormalizedConversation, NormalizeError> {
    if messages.is_empty() {
        return Err(NormalizeError::EmptyConversation);
    }

    let system = extract_system_prompt(messages);

    let mut images: Vec<String> = Vec::new();
    let turns: Vec<Message> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .map(|mut message| {
            if message.role == Role::User {
                if let MessageContent::Parts(items) = &mut message.content {
                    let mut text_items = Vec::with_capacity(items.len());
                    for item in items.drain(..) {
                        match item {
                            ContentItem::ImageUrl { image_url } => {
                                images.push(image_url.url().to_string())
                            }
                            ContentItem::Text { .. } => text_items.push(item),
                            ContentItem::Unsupported => {}
                        }
                    }
                    *items = text_items;
                }
            }
            message
        })
        .collect();

    if !turns
        .iter()
        .any(|m| !m.content.joined_text(" ").trim().is_empty())
    {
        return Err(NormalizeError::EmptyConversation);
    }

    let mut prompt = String::new();
    for message in &turns {
        prompt.push_str(message.role.as_str());
        prompt.push_str(": ");
        prompt.push_str(&message.content.joined_text(" "));
        prompt.push('\n');
    }

    if turns.last().map(|m| m.role) == Some(Role::User) {
        prompt.push_str(directive);
        prompt.push('\n');
    }

    if images.len() > 1 {
        debug!(
            images = images.len(),
            "Multiple images in conversation, keeping only the last"
        );
    }
    let image_url = images.pop();

    let system_prompt = if system.is_empty() {
        directive.to_string()
    } else {
        format!("{}\n\n{}", system, directive)
    };

    debug!(
        turns = turns.len(),
        prompt_len = prompt.len(),
        system_prompt_len = system_prompt.len(),
        has_image = image_url.is_some(),
        "Normalized conversation"
    );

    Ok(NormalizedConversation {
        prompt,
        system_prompt,
        image_url,
    })
}
