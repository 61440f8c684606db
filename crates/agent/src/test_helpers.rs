//! Shared fixtures for agent tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use stepforge_core::error::ProviderError;
use stepforge_core::event::EventBus;
use stepforge_core::provider::{Provider, ProviderRequest, TextStream, fragments};
use stepforge_tools::{Dispatcher, default_registry};

use crate::controller::StepController;
use crate::program::ProgramLibrary;

/// A provider that replays canned responses per model, split into small
/// chunks so tags straddle fragment boundaries.
#[derive(Clone)]
pub struct ScriptedProvider {
    responses: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
    chunk_size: usize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            responses: Arc::default(),
            requests: Arc::default(),
            chunk_size: 7,
        }
    }

    pub fn with_responses(self, model: &str, responses: &[&str]) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .extend(responses.iter().map(|r| r.to_string()));
        self
    }

    pub fn requests(&self, model: &str) -> Vec<ProviderRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.model == model)
            .cloned()
            .collect()
    }

    pub fn request_count(&self, model: &str) -> usize {
        self.requests(model).len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<TextStream, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let response = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&model)
            .and_then(|queue| queue.pop_front())
            .ok_or_else(|| ProviderError::Exhausted(format!("No scripted response for model {model}")))?;
        Ok(fragments(chunked(&response, self.chunk_size)))
    }
}

/// Split `text` into pieces of at most `size` characters.
pub fn chunked(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size.max(1)).map(|c| c.iter().collect()).collect()
}

pub fn controller_with(provider: ScriptedProvider, programs: ProgramLibrary) -> StepController {
    let dispatcher = Dispatcher::new(Arc::new(default_registry()));
    StepController::new(
        Arc::new(provider),
        dispatcher,
        Arc::new(programs),
        Arc::new(EventBus::default()),
    )
}
