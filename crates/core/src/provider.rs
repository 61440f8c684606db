//! Provider trait — the abstraction over the model completion service.
//!
//! The runtime needs exactly one thing from a model: an asynchronous source
//! of text fragments. Fragment boundaries are arbitrary; the tag parser
//! handles splits anywhere, including mid-tag and mid-entity.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::ToolDefinition;

/// A lazy sequence of text fragments from the model.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// What the runtime hands the provider for one model step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (from the agent template)
    pub model: String,

    /// The agent this completion is for
    pub agent_id: String,

    /// System instructions from the template
    #[serde(default)]
    pub system_prompt: String,

    /// The agent's message history
    pub messages: Vec<Message>,

    /// Tools the agent may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// The core Provider trait.
///
/// The step controller calls `stream()` without knowing which backend is
/// answering.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Start a completion and return its fragment stream.
    async fn stream(&self, request: ProviderRequest) -> Result<TextStream, ProviderError>;
}

/// Wrap already-known fragments as a [`TextStream`].
pub fn fragments<I, S>(fragments: I) -> TextStream
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let items: Vec<Result<String, ProviderError>> =
        fragments.into_iter().map(|f| Ok(f.into())).collect();
    Box::pin(futures::stream::iter(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn fragments_preserve_order() {
        let collected: Vec<String> = fragments(["<end", "_turn>", "</end_turn>"])
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(collected, vec!["<end", "_turn>", "</end_turn>"]);
    }
}
