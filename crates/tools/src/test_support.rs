//! Fixtures shared by the tool tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use stepforge_core::agent::AgentState;
use stepforge_core::template::AgentTemplate;
use stepforge_core::tool::{ClientToolRequester, ToolContext, ToolServices};

/// A client that answers every request with the same text and records it.
#[derive(Clone)]
pub struct RecordingClient {
    answer: String,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingClient {
    pub fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            requests: Arc::default(),
        })
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientToolRequester for RecordingClient {
    async fn request_client_tool_call(&self, tool_name: &str, arguments: Value) -> Result<String, String> {
        self.requests.lock().unwrap().push((tool_name.to_string(), arguments));
        Ok(self.answer.clone())
    }
}

pub fn context_with(template: AgentTemplate) -> ToolContext {
    ToolContext {
        agent: Arc::new(AgentState::new(template.id.clone(), Value::Null, 5)),
        template: Arc::new(template),
        services: ToolServices::default(),
    }
}

pub fn context(tools: &[&str]) -> ToolContext {
    context_with(AgentTemplate::model_driven("base", "m").with_tools(tools.iter().copied()))
}

pub fn context_with_client(tools: &[&str], client: Arc<RecordingClient>) -> ToolContext {
    let mut ctx = context(tools);
    ctx.services.client = Some(client);
    ctx
}
