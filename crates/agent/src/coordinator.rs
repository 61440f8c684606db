//! Multi-agent coordination — spawning, tracking, and messaging.
//!
//! The coordinator owns the tracking map of every agent launched in the
//! session. Each agent runs its turn on its own task; the spawning agent
//! gets the new ids back immediately and keeps working.
//!
//! ```text
//!  spawn_agents ─▶ validate ─▶ seed history ─▶ tokio::spawn(turn) ─▶ monitor
//!                                                                     │
//!                                   status: running ─▶ completed/failed
//! ```
//!
//! Validation happens in a fixed order for every request: the template must
//! exist, the parent's template must list it as spawnable, then the prompt
//! and params must satisfy the child's input schema. A failed request is
//! reported in its own line of the batch result and never stops its
//! siblings.
//!
//! Messages are fire-and-forget. They land in the target's mailbox and are
//! read at the start of the target's next step cycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use stepforge_config::{RuntimeConfig, SessionConfig};
use stepforge_core::agent::{AgentState, InboxMessage};
use stepforge_core::error::{MessagingError, RegistryError, SpawnError};
use stepforge_core::event::{DomainEvent, EventBus};
use stepforge_core::message::{Message, transcript};
use stepforge_core::provider::Provider;
use stepforge_core::spawn::{AgentMessenger, AgentSpawner, Delivery, PARENT_ALIAS, SpawnOutcome, SpawnRequest};
use stepforge_core::template::{AgentTemplate, TemplateRegistry};
use stepforge_core::tool::{ClientToolRequester, ToolServices};
use stepforge_tools::{Dispatcher, ToolRegistry, schema};

use crate::controller::{StepController, TurnContext};
use crate::program::ProgramLibrary;
use crate::runner::{AgentRunner, Mailbox, TurnReport};
use crate::stream_event::EventSink;

/// Lifecycle status of a tracked agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Completed => write!(f, "completed"),
            AgentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A point-in-time view of one tracked agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub agent_type: String,
    pub parent_id: Option<String>,
    pub session_id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub status: AgentStatus,
    /// Messages delivered but not yet read by the agent
    pub pending_messages: usize,
}

#[derive(Debug, Clone)]
enum Lifecycle {
    Running,
    Finished(TurnReport),
}

impl Lifecycle {
    fn status(&self) -> AgentStatus {
        match self {
            Lifecycle::Running => AgentStatus::Running,
            Lifecycle::Finished(report) if report.failed => AgentStatus::Failed,
            Lifecycle::Finished(_) => AgentStatus::Completed,
        }
    }
}

/// Tracking record for one launched agent.
struct AsyncAgentInfo {
    agent_id: String,
    agent_type: String,
    parent_id: Option<String>,
    started_at: DateTime<Utc>,
    /// Written once by the agent's monitor task
    lifecycle: watch::Receiver<Lifecycle>,
    mailbox: Mailbox,
}

struct Inner {
    templates: Arc<TemplateRegistry>,
    provider: Arc<dyn Provider>,
    dispatcher: Dispatcher,
    programs: Arc<ProgramLibrary>,
    client: Option<Arc<dyn ClientToolRequester>>,
    events: Arc<EventBus>,
    runtime: RuntimeConfig,
    session: SessionConfig,
    sink: EventSink,
    agents: Mutex<HashMap<String, AsyncAgentInfo>>,
}

/// Spawns agents, tracks them, and relays their messages. Cheap to clone;
/// every clone shares one tracking map.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

pub struct CoordinatorBuilder {
    templates: Arc<TemplateRegistry>,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    programs: ProgramLibrary,
    client: Option<Arc<dyn ClientToolRequester>>,
    events: Arc<EventBus>,
    runtime: RuntimeConfig,
    session: SessionConfig,
    sink: EventSink,
}

impl CoordinatorBuilder {
    pub fn programs(mut self, programs: ProgramLibrary) -> Self {
        self.programs = programs;
        self
    }

    pub fn client(mut self, client: Arc<dyn ClientToolRequester>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Where every agent's live stream events go.
    pub fn sink(mut self, sink: EventSink) -> Self {
        self.sink = sink;
        self
    }

    /// Check the template registry against the tools and compile every
    /// declared schema, then build the coordinator.
    pub fn build(self) -> Result<Coordinator, RegistryError> {
        self.templates.validate(|name| self.tools.contains(name))?;
        for id in self.templates.ids() {
            let Some(template) = self.templates.get(id) else {
                continue;
            };
            let declared = [
                template.input_schema.prompt.as_ref(),
                template.input_schema.params.as_ref(),
                template.output_schema.as_ref(),
            ];
            for schema_doc in declared.into_iter().flatten() {
                schema::compile(schema_doc).map_err(|reason| RegistryError::InvalidSchema {
                    template_id: id.to_string(),
                    reason,
                })?;
            }
        }

        let dispatcher = Dispatcher::new(self.tools).with_events(self.events.clone());
        debug!(templates = self.templates.len(), "Coordinator ready");
        Ok(Coordinator {
            inner: Arc::new(Inner {
                templates: self.templates,
                provider: self.provider,
                dispatcher,
                programs: Arc::new(self.programs),
                client: self.client,
                events: self.events,
                runtime: self.runtime,
                session: self.session,
                sink: self.sink,
                agents: Mutex::new(HashMap::new()),
            }),
        })
    }
}

impl Coordinator {
    pub fn builder(
        templates: Arc<TemplateRegistry>,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            templates,
            provider,
            tools,
            programs: ProgramLibrary::new(),
            client: None,
            events: Arc::new(EventBus::default()),
            runtime: RuntimeConfig::default(),
            session: SessionConfig::default(),
            sink: EventSink::discard(),
        }
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.inner.templates
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    // ── Launching ─────────────────────────────────────────────────────────

    /// Launch a root agent and return its id without waiting for it.
    pub fn start(&self, agent_type: &str, prompt: Option<String>, params: Option<Value>) -> Result<String, SpawnError> {
        let template = self.template(agent_type)?;
        validate_input(&template, prompt.as_deref(), params.as_ref())?;
        let mut state = AgentState::new(
            agent_type,
            serde_json::json!({ "prompt": prompt, "params": params }),
            self.inner.runtime.max_agent_steps,
        );
        seed(&mut state, &template, &[]);
        Ok(self.launch(state, template))
    }

    /// Launch an agent from a prepared state, keeping its id and history.
    pub fn start_state(&self, state: AgentState) -> Result<String, SpawnError> {
        let template = self.template(&state.agent_type)?;
        Ok(self.launch(state, template))
    }

    /// Launch a root agent and wait for its turn to finish.
    pub async fn run(&self, agent_type: &str, prompt: Option<String>, params: Option<Value>) -> Result<TurnReport, SpawnError> {
        let agent_id = self.start(agent_type, prompt, params)?;
        Ok(self
            .wait(&agent_id)
            .await
            .unwrap_or_else(|| TurnReport::aborted(&agent_id, agent_type, "agent record was pruned before it finished")))
    }

    fn template(&self, agent_type: &str) -> Result<Arc<AgentTemplate>, SpawnError> {
        self.inner
            .templates
            .get(agent_type)
            .ok_or_else(|| SpawnError::UnknownTemplate(agent_type.to_string()))
    }

    fn spawn_child(&self, parent: &AgentState, request: SpawnRequest) -> Result<String, SpawnError> {
        let template = self.template(&request.agent_type)?;
        let allowed = self
            .inner
            .templates
            .get(&parent.agent_type)
            .is_some_and(|t| t.can_spawn(&request.agent_type));
        if !allowed {
            return Err(SpawnError::NotSpawnable {
                parent: parent.agent_type.clone(),
                child: request.agent_type,
            });
        }
        validate_input(&template, request.prompt.as_deref(), request.params.as_ref())?;

        let mut state = AgentState::child_of(
            &parent.agent_id,
            &request.agent_type,
            serde_json::json!({ "prompt": request.prompt, "params": request.params }),
            self.inner.runtime.max_agent_steps,
        );
        seed(&mut state, &template, &parent.messages);
        Ok(self.launch(state, template))
    }

    fn launch(&self, state: AgentState, template: Arc<AgentTemplate>) -> String {
        let agent_id = state.agent_id.clone();
        let agent_type = state.agent_type.clone();
        let parent_id = state.parent_id.clone();
        let mailbox = Mailbox::new();
        let (lifecycle_tx, lifecycle_rx) = watch::channel(Lifecycle::Running);

        self.agents().insert(
            agent_id.clone(),
            AsyncAgentInfo {
                agent_id: agent_id.clone(),
                agent_type: agent_type.clone(),
                parent_id: parent_id.clone(),
                started_at: Utc::now(),
                lifecycle: lifecycle_rx,
                mailbox: mailbox.clone(),
            },
        );
        self.inner.events.publish(DomainEvent::AgentSpawned {
            agent_id: agent_id.clone(),
            parent_id: parent_id.clone(),
            agent_type: agent_type.clone(),
            timestamp: Utc::now(),
        });
        info!(
            agent_id = %agent_id,
            agent_type = %agent_type,
            parent_id = parent_id.as_deref().unwrap_or("-"),
            "Agent launched"
        );

        let work = tokio::spawn(self.clone().run_agent(state, template, mailbox));
        let events = self.inner.events.clone();
        let id = agent_id.clone();
        tokio::spawn(async move {
            let report = match work.await {
                Ok(report) => report,
                Err(e) => {
                    warn!(agent_id = %id, error = %e, "Agent task died");
                    TurnReport::aborted(&id, &agent_type, e)
                }
            };
            events.publish(DomainEvent::AgentFinished {
                agent_id: id.clone(),
                failed: report.failed,
                timestamp: Utc::now(),
            });
            lifecycle_tx.send_replace(Lifecycle::Finished(report));
        });

        agent_id
    }

    async fn run_agent(self, mut state: AgentState, template: Arc<AgentTemplate>, mailbox: Mailbox) -> TurnReport {
        let services = ToolServices {
            client: self.inner.client.clone(),
            spawner: Some(Arc::new(self.clone()) as Arc<dyn AgentSpawner>),
            messenger: Some(Arc::new(self.clone()) as Arc<dyn AgentMessenger>),
        };
        let turn = TurnContext::new(template)
            .with_services(services)
            .with_sink(self.inner.sink.clone());
        let controller = StepController::new(
            self.inner.provider.clone(),
            self.inner.dispatcher.clone(),
            self.inner.programs.clone(),
            self.inner.events.clone(),
        )
        .with_max_tag_len(self.inner.runtime.max_tag_len);

        AgentRunner::new(controller).run_turn(&mut state, &turn, &mailbox).await
    }

    // ── Tracking ──────────────────────────────────────────────────────────

    pub fn status(&self, agent_id: &str) -> Option<AgentStatus> {
        self.agents().get(agent_id).map(|a| a.lifecycle.borrow().status())
    }

    pub fn info(&self, agent_id: &str) -> Option<AgentInfo> {
        self.agents().get(agent_id).map(|a| self.snapshot(a))
    }

    /// Every tracked agent, oldest first.
    pub fn list(&self) -> Vec<AgentInfo> {
        let mut infos: Vec<AgentInfo> = self.agents().values().map(|a| self.snapshot(a)).collect();
        infos.sort_by_key(|i| i.started_at);
        infos
    }

    /// Wait for the agent's turn to finish and return its report.
    ///
    /// Returns `None` for an unknown id.
    pub async fn wait(&self, agent_id: &str) -> Option<TurnReport> {
        let mut lifecycle = self.agents().get(agent_id)?.lifecycle.clone();
        let finished = lifecycle
            .wait_for(|l| matches!(l, Lifecycle::Finished(_)))
            .await
            .ok()?;
        match &*finished {
            Lifecycle::Finished(report) => Some(report.clone()),
            Lifecycle::Running => None,
        }
    }

    /// Forget every finished agent. Returns how many were removed.
    pub fn prune_finished(&self) -> usize {
        let mut agents = self.agents();
        let before = agents.len();
        agents.retain(|_, a| matches!(*a.lifecycle.borrow(), Lifecycle::Running));
        let pruned = before - agents.len();
        if pruned > 0 {
            debug!(pruned, "Pruned finished agents");
        }
        pruned
    }

    fn snapshot(&self, agent: &AsyncAgentInfo) -> AgentInfo {
        AgentInfo {
            agent_id: agent.agent_id.clone(),
            agent_type: agent.agent_type.clone(),
            parent_id: agent.parent_id.clone(),
            session_id: self.inner.session.session_id.clone(),
            user_id: self.inner.session.user_id.clone(),
            started_at: agent.started_at,
            status: agent.lifecycle.borrow().status(),
            pending_messages: agent.mailbox.len(),
        }
    }

    fn agents(&self) -> MutexGuard<'_, HashMap<String, AsyncAgentInfo>> {
        self.inner.agents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AgentSpawner for Coordinator {
    async fn spawn_agents(&self, parent: &AgentState, requests: Vec<SpawnRequest>) -> Vec<SpawnOutcome> {
        requests
            .into_iter()
            .map(|request| {
                let agent_type = request.agent_type.clone();
                let result = self.spawn_child(parent, request);
                if let Err(e) = &result {
                    warn!(parent_id = %parent.agent_id, agent_type = %agent_type, error = %e, "Spawn rejected");
                }
                SpawnOutcome { agent_type, result }
            })
            .collect()
    }
}

#[async_trait]
impl AgentMessenger for Coordinator {
    async fn send_message(&self, sender: &AgentState, target: &str, content: &str) -> Result<Delivery, MessagingError> {
        let target_id = if target == PARENT_ALIAS {
            sender
                .parent_id
                .clone()
                .ok_or_else(|| MessagingError::NoParent(sender.agent_id.clone()))?
        } else {
            target.to_string()
        };

        let (mailbox, recipient_finished) = self
            .agents()
            .get(&target_id)
            .map(|a| (a.mailbox.clone(), a.lifecycle.borrow().status() != AgentStatus::Running))
            .ok_or_else(|| MessagingError::TargetNotFound(target_id.clone()))?;
        mailbox.deliver(InboxMessage::new(&sender.agent_id, content));

        self.inner.events.publish(DomainEvent::MessageRelayed {
            from_agent_id: sender.agent_id.clone(),
            to_agent_id: target_id.clone(),
            timestamp: Utc::now(),
        });
        debug!(from = %sender.agent_id, to = %target_id, recipient_finished, "Message relayed");
        Ok(Delivery {
            recipient: target_id,
            recipient_finished,
        })
    }
}

fn validate_input(template: &AgentTemplate, prompt: Option<&str>, params: Option<&Value>) -> Result<(), SpawnError> {
    let invalid = |what: &str, reason: String| SpawnError::InvalidInput {
        agent_type: template.id.clone(),
        reason: format!("{what}: {reason}"),
    };
    if let Some(schema_doc) = &template.input_schema.prompt {
        let prompt = prompt.map(|p| Value::String(p.to_string())).unwrap_or(Value::Null);
        schema::check(schema_doc, &prompt).map_err(|reason| invalid("prompt", reason))?;
    }
    if let Some(schema_doc) = &template.input_schema.params {
        let params = params.cloned().unwrap_or(Value::Null);
        schema::check(schema_doc, &params).map_err(|reason| invalid("params", reason))?;
    }
    Ok(())
}

/// Build the child's opening messages: the parent's history when the
/// template asks for it, then the prompt with any params appended.
fn seed(state: &mut AgentState, template: &AgentTemplate, history: &[Message]) {
    if template.include_message_history && !history.is_empty() {
        state.messages.push(Message::user(format!(
            "<message_history>\n{}\n</message_history>",
            transcript(history)
        )));
    }

    let mut opening = state.prompt().unwrap_or_default().to_string();
    if let Some(params) = state.params() {
        if !opening.is_empty() {
            opening.push_str("\n\n");
        }
        opening.push_str(&format!("<params>{params}</params>"));
    }
    if !opening.is_empty() {
        state.messages.push(Message::user(opening));
    }
}
