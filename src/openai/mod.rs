//! OpenAI wire types
//!
//! The request and response shapes of the OpenAI-compatible surface.

pub mod response;
pub mod types;

pub use response::{
    ChatCompletion, Choice, ChoiceMessage, Delta, ModelDescriptor, ModelList, ModelPermission,
    StreamChoice, StreamChunk, Usage,
};
pub use types::{ChatCompletionRequest, ContentItem, ImageUrl, Message, MessageContent, Role};
