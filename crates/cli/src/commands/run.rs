//! `stepforge run` — Run one agent turn against a replayed transcript.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use stepforge_agent::{AgentStatus, AgentStreamEvent, Coordinator, EventSink, TurnReport};
use stepforge_config::AppConfig;
use stepforge_tools::default_registry;

use crate::local_client::LocalClient;
use crate::replay::ReplayProvider;

pub struct RunArgs {
    pub template: String,
    pub prompt: Option<String>,
    pub params: Option<String>,
    pub replay: PathBuf,
    pub chunk_size: usize,
    pub json: bool,
}

pub async fn run(config: AppConfig, args: RunArgs) -> anyhow::Result<()> {
    let params = args
        .params
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--params must be a JSON object")?;

    let tools = Arc::new(default_registry());
    let registry = super::load_registry(&config, &tools)?;
    let provider = ReplayProvider::from_file(&args.replay, args.chunk_size)?;
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;
    let client = LocalClient::new(cwd, Duration::from_secs(config.runtime.client_tool_timeout_secs));

    let (sink, events) = EventSink::channel();
    let coordinator = Coordinator::builder(Arc::new(registry), Arc::new(provider), tools)
        .client(Arc::new(client))
        .runtime(config.runtime.clone())
        .session(config.session.clone())
        .sink(sink)
        .build()
        .context("Template registry is inconsistent")?;

    let printer = tokio::spawn(print_events(events, args.json));
    let report = coordinator.run(&args.template, args.prompt, params).await?;
    wait_for_everyone(&coordinator).await;
    drop(coordinator);
    printer.await.context("Event printer failed")?;

    print_report(&report, args.json)?;
    if report.failed {
        anyhow::bail!("Agent {} failed", report.agent_id);
    }
    Ok(())
}

/// Children may outlive the root's turn; wait until nothing is running.
async fn wait_for_everyone(coordinator: &Coordinator) {
    loop {
        let running: Vec<String> = coordinator
            .list()
            .into_iter()
            .filter(|a| a.status == AgentStatus::Running)
            .map(|a| a.agent_id)
            .collect();
        if running.is_empty() {
            break;
        }
        for agent_id in running {
            coordinator.wait(&agent_id).await;
        }
    }
}

async fn print_events(mut events: mpsc::UnboundedReceiver<AgentStreamEvent>, json: bool) {
    while let Some(event) = events.recv().await {
        if json {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{line}");
            }
            continue;
        }
        match event {
            AgentStreamEvent::Chunk { content, .. } => print!("{content}"),
            AgentStreamEvent::ToolCall { agent_id, name, .. } => eprintln!("\n  [{}] → {name}", short(&agent_id)),
            AgentStreamEvent::ToolResult {
                agent_id, name, success, ..
            } => {
                let mark = if success { "ok" } else { "error" };
                eprintln!("  [{}] ← {name} ({mark})", short(&agent_id));
            }
            AgentStreamEvent::Error { agent_id, message } => eprintln!("  [{}] error: {message}", short(&agent_id)),
            AgentStreamEvent::Done {
                agent_id,
                steps_used,
                tool_calls_made,
            } => eprintln!(
                "\n  [{}] done after {steps_used} steps, {tool_calls_made} tool calls",
                short(&agent_id)
            ),
        }
    }
}

fn print_report(report: &TurnReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }
    println!();
    match &report.report {
        serde_json::Value::String(text) => println!("{text}"),
        serde_json::Value::Null => println!("(no report)"),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

fn short(agent_id: &str) -> &str {
    agent_id.get(..8).unwrap_or(agent_id)
}
