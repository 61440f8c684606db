//! Replay provider — serves model responses from a transcript file.
//!
//! Responses are separated by lines containing only `---`. Each request
//! takes the next response, whichever agent asks, and streams it in fixed
//! size fragments.

use anyhow::Context;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use stepforge_core::error::ProviderError;
use stepforge_core::provider::{Provider, ProviderRequest, TextStream, fragments};

pub struct ReplayProvider {
    responses: Mutex<VecDeque<String>>,
    chunk_size: usize,
}

impl ReplayProvider {
    pub fn parse(transcript: &str, chunk_size: usize) -> Self {
        let mut responses = VecDeque::new();
        let mut current = Vec::new();
        for line in transcript.lines() {
            if line.trim() == "---" {
                responses.push_back(current.join("\n"));
                current.clear();
            } else {
                current.push(line);
            }
        }
        if !current.is_empty() {
            responses.push_back(current.join("\n"));
        }
        Self {
            responses: Mutex::new(responses),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn from_file(path: &Path, chunk_size: usize) -> anyhow::Result<Self> {
        let transcript =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read replay file {}", path.display()))?;
        Ok(Self::parse(&transcript, chunk_size))
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Provider for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<TextStream, ProviderError> {
        let response = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| ProviderError::Exhausted("replay file has no more responses".into()))?;
        debug!(agent_id = %request.agent_id, model = %request.model, bytes = response.len(), "Replaying response");

        let chars: Vec<char> = response.chars().collect();
        let pieces: Vec<String> = chars.chunks(self.chunk_size).map(|c| c.iter().collect()).collect();
        Ok(fragments(pieces))
    }
}
