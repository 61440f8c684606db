//! End-to-end integration tests for the StepForge agent runtime.
//!
//! These tests exercise the full pipeline: provider fragments → tag parser →
//! dispatcher → step controller → coordinator, using the built-in tools and
//! templates.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use stepforge_agent::{AgentStatus, AgentStreamEvent, Coordinator, EventSink, builtin_templates};
use stepforge_config::{AppConfig, RuntimeConfig, template_layers};
use stepforge_core::error::ProviderError;
use stepforge_core::message::Role;
use stepforge_core::provider::{Provider, ProviderRequest, TextStream, fragments};
use stepforge_core::template::{TemplateLayer, TemplateRegistry, TemplateSource};
use stepforge_core::tool::ClientToolRequester;
use stepforge_tools::default_registry;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A provider that replays canned responses per model, cut into chunks.
#[derive(Clone)]
struct ScriptedProvider {
    responses: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
    chunk_size: usize,
}

impl ScriptedProvider {
    fn new(chunk_size: usize) -> Self {
        Self {
            responses: Arc::default(),
            requests: Arc::default(),
            chunk_size,
        }
    }

    fn respond(self, model: &str, responses: &[&str]) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .extend(responses.iter().map(|r| r.to_string()));
        self
    }

    fn requests(&self, model: &str) -> Vec<ProviderRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.model == model)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<TextStream, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let response = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&model)
            .and_then(|q| q.pop_front())
            .ok_or_else(|| ProviderError::Exhausted(format!("no response left for {model}")))?;
        let chars: Vec<char> = response.chars().collect();
        let pieces: Vec<String> = chars.chunks(self.chunk_size).map(|c| c.iter().collect()).collect();
        Ok(fragments(pieces))
    }
}

// ── Mock Client ──────────────────────────────────────────────────────────

struct RecordingClient {
    answer: String,
    requests: Mutex<Vec<(String, Value)>>,
}

impl RecordingClient {
    fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait::async_trait]
impl ClientToolRequester for RecordingClient {
    async fn request_client_tool_call(&self, tool_name: &str, arguments: Value) -> Result<String, String> {
        self.requests.lock().unwrap().push((tool_name.to_string(), arguments));
        Ok(self.answer.clone())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Built-in templates, each on its own model so scripted responses can be
/// routed per agent type.
fn registry() -> TemplateRegistry {
    let templates = builtin_templates("unused")
        .into_iter()
        .map(|mut t| {
            t.model = format!("{}-model", t.id);
            t
        })
        .collect();
    TemplateRegistry::merge([TemplateLayer::new(TemplateSource::Builtin, templates)])
}

fn coordinator(provider: &ScriptedProvider) -> Coordinator {
    Coordinator::builder(Arc::new(registry()), Arc::new(provider.clone()), Arc::new(default_registry()))
        .build()
        .unwrap()
}

const REVIEW: &str = "Checking.<think_deeply><thought>x &lt; y holds</thought></think_deeply>\
<set_output><output>{\"verdict\": \"approve\", \"comments\": [\"tidy\"]}</output></set_output><end_turn/>";

// ═══════════════════════════════════════════════════════════════════════════
// Single agent
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn e2e_structured_output_is_independent_of_chunking() {
    for chunk_size in [1, 2, 5, 64, 1024] {
        let provider = ScriptedProvider::new(chunk_size).respond("reviewer-model", &[REVIEW]);
        let report = coordinator(&provider)
            .run("reviewer", Some("review the change".into()), None)
            .await
            .unwrap();

        assert!(!report.failed, "chunk size {chunk_size}");
        assert_eq!(report.report, json!({"verdict": "approve", "comments": ["tidy"]}));
        assert_eq!(report.steps_used, 1);
        assert_eq!(report.tool_calls_made, 3);
    }
}

#[tokio::test]
async fn e2e_stream_events_follow_dispatch_order() {
    let provider = ScriptedProvider::new(3).respond("reviewer-model", &[REVIEW]);
    let (sink, mut rx) = EventSink::channel();
    let coordinator = Coordinator::builder(Arc::new(registry()), Arc::new(provider), Arc::new(default_registry()))
        .sink(sink)
        .build()
        .unwrap();

    coordinator.run("reviewer", None, None).await.unwrap();

    let mut kinds = Vec::new();
    let mut text = String::new();
    while let Ok(event) = rx.try_recv() {
        match &event {
            AgentStreamEvent::Chunk { content, .. } => text.push_str(content),
            AgentStreamEvent::ToolResult { name, success, .. } => {
                assert!(success, "{name} failed");
                kinds.push(format!("result:{name}"));
            }
            AgentStreamEvent::ToolCall { name, .. } => kinds.push(format!("call:{name}")),
            other => kinds.push(other.event_type().to_string()),
        }
    }
    assert_eq!(text, REVIEW);
    assert_eq!(
        kinds,
        vec![
            "call:think_deeply",
            "call:set_output",
            "call:end_turn",
            "result:think_deeply",
            "result:set_output",
            "result:end_turn",
            "done",
        ]
    );
}

#[tokio::test]
async fn e2e_schema_violation_is_reported_back_to_the_model() {
    let provider = ScriptedProvider::new(7).respond(
        "reviewer-model",
        &[
            "<set_output><output>{\"verdict\": \"maybe\"}</output></set_output>",
            "I cannot decide.",
        ],
    );
    let report = coordinator(&provider).run("reviewer", None, None).await.unwrap();

    assert!(!report.failed);
    assert_eq!(report.report, Value::Null);
    let second = &provider.requests("reviewer-model")[1];
    let feedback = second.messages.last().unwrap();
    assert_eq!(feedback.role, Role::Tool);
    assert!(feedback.content.contains("Error: Invalid parameters for set_output"));
}

#[tokio::test]
async fn e2e_step_budget_bounds_a_looping_model() {
    let looping = "<think_deeply><thought>one more pass</thought></think_deeply>";
    let provider = ScriptedProvider::new(16).respond("base-model", &[looping, looping, looping]);
    let runtime = RuntimeConfig {
        max_agent_steps: 2,
        ..RuntimeConfig::default()
    };
    let coordinator = Coordinator::builder(Arc::new(registry()), Arc::new(provider.clone()), Arc::new(default_registry()))
        .runtime(runtime)
        .build()
        .unwrap();

    let report = coordinator.run("base", Some("think".into()), None).await.unwrap();
    assert!(!report.failed);
    assert_eq!(report.steps_used, 2);
    assert_eq!(provider.requests("base-model").len(), 2);
}

#[tokio::test]
async fn e2e_provider_failure_fails_the_turn_not_the_process() {
    let provider = ScriptedProvider::new(16);
    let coordinator = coordinator(&provider);
    let report = coordinator.run("base", Some("hello".into()), None).await.unwrap();

    assert!(report.failed);
    assert!(report.report["error"].as_str().unwrap().contains("no response left"));
    assert_eq!(coordinator.status(&report.agent_id), Some(AgentStatus::Failed));
}

// ═══════════════════════════════════════════════════════════════════════════
// Agent trees
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn e2e_file_picker_reads_through_the_client_and_reports_to_parent() {
    let provider = ScriptedProvider::new(5)
        .respond(
            "base-model",
            &[
                r#"I'll delegate.<spawn_agents><agents>[{"agent_type": "file_picker", "prompt": "find the tokenizer", "params": {"paths": ["src/lexer.rs"]}}]</agents></spawn_agents>"#,
                "Waiting on the picker.",
            ],
        )
        .respond(
            "file_picker-model",
            &["<send_agent_message><target_agent_id>parent</target_agent_id><prompt>src/lexer.rs has it</prompt></send_agent_message><end_turn/>"],
        );
    let client = RecordingClient::answering("fn tokenize() {}");
    let coordinator = Coordinator::builder(Arc::new(registry()), Arc::new(provider.clone()), Arc::new(default_registry()))
        .client(client.clone())
        .build()
        .unwrap();

    let root = coordinator.run("base", Some("where is the tokenizer?".into()), None).await.unwrap();
    assert!(!root.failed);
    assert_eq!(root.report, json!("Waiting on the picker."));

    let picker = coordinator
        .list()
        .into_iter()
        .find(|a| a.agent_type == "file_picker")
        .unwrap();
    assert_eq!(picker.parent_id.as_deref(), Some(root.agent_id.as_str()));
    let picker_report = coordinator.wait(&picker.agent_id).await.unwrap();
    assert!(!picker_report.failed);

    let requests = client.requests.lock().unwrap().clone();
    assert_eq!(requests, vec![("read_files".to_string(), json!({"paths": ["src/lexer.rs"]}))]);

    let seen = &provider.requests("file_picker-model")[0].messages;
    assert!(seen[0].content.starts_with("find the tokenizer"));
    assert!(seen[0].content.contains("<params>"));
    assert_eq!(seen[1].role, Role::Tool);
    assert!(seen[1].content.contains("fn tokenize() {}"));
}

#[tokio::test]
async fn e2e_rejected_spawn_does_not_block_siblings() {
    let provider = ScriptedProvider::new(9)
        .respond(
            "base-model",
            &[
                r#"<spawn_agents><agents>[{"agent_type": "reviewer", "prompt": "check"}, {"agent_type": "file_picker", "prompt": "no params"}, {"agent_type": "ghost"}]</agents></spawn_agents>"#,
                "Done spawning.",
            ],
        )
        .respond("reviewer-model", &["<end_turn/>"]);
    let coordinator = coordinator(&provider);

    coordinator.run("base", Some("review and pick".into()), None).await.unwrap();

    let second = &provider.requests("base-model")[1];
    let results = &second.messages.last().unwrap().content;
    assert!(results.contains("Spawned agents (1/3 successful):"));
    assert!(results.contains("- file_picker: failed: Invalid input for agent type file_picker: params"));
    assert!(results.contains("- ghost: failed: Agent template ghost does not exist"));

    let reviewer = coordinator
        .list()
        .into_iter()
        .find(|a| a.agent_type == "reviewer")
        .unwrap();
    assert!(!coordinator.wait(&reviewer.agent_id).await.unwrap().failed);

    // The reviewer sees the spawning agent's history.
    let history = &provider.requests("reviewer-model")[0].messages[0].content;
    assert!(history.starts_with("<message_history>"));
}

// ═══════════════════════════════════════════════════════════════════════════
// Template overrides
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn e2e_project_templates_override_builtins() {
    let root = tempfile::tempdir().unwrap();
    let agents = root.path().join(".stepforge/agents");
    std::fs::create_dir_all(&agents).unwrap();
    std::fs::write(
        agents.join("reviewer.toml"),
        "display_name = \"Strict Reviewer\"\ntool_names = [\"set_output\", \"end_turn\"]\noutput_mode = \"structured_output\"\n",
    )
    .unwrap();

    let config = AppConfig::default();
    let mut layers = vec![TemplateLayer::new(TemplateSource::Builtin, builtin_templates(&config.default_model))];
    layers.extend(template_layers(&config, root.path()).unwrap());
    let registry = TemplateRegistry::merge(layers);

    let tools = default_registry();
    registry.validate(|name| tools.contains(name)).unwrap();
    assert_eq!(registry.source("reviewer"), Some(TemplateSource::ProjectLocal));
    assert_eq!(registry.source("base"), Some(TemplateSource::Builtin));
    let reviewer = registry.get("reviewer").unwrap();
    assert_eq!(reviewer.display_name, "Strict Reviewer");
    assert_eq!(reviewer.model, config.default_model);
}
