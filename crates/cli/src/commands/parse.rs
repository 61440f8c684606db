//! `stepforge parse` — Replay a file through the tag parser.
//!
//! The file is cut into fixed-size fragments to mimic a model stream, which
//! makes it easy to check that events do not depend on where the cuts fall.

use anyhow::Context;
use futures::StreamExt;
use std::path::Path;

use stepforge_parser::{TagEvent, TagStreamParser, tag_stream};
use stepforge_tools::default_registry;

pub async fn run(file: &Path, chunk_size: usize, max_tag_len: usize, json: bool) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let events = parse_text(&text, chunk_size, max_tag_len).await;
    if json {
        for event in &events {
            println!("{}", serde_json::to_string(event)?);
        }
    } else {
        for event in &events {
            println!("{}", describe(event));
        }
        println!();
        println!("  {} events from {} bytes", events.len(), text.len());
    }
    Ok(())
}

async fn parse_text(text: &str, chunk_size: usize, max_tag_len: usize) -> Vec<TagEvent> {
    let parser = TagStreamParser::with_max_tag_len(default_registry().tag_schema(), max_tag_len);
    let fragments = futures::stream::iter(chunks(text, chunk_size));

    let mut events = Vec::new();
    let passed: Vec<String> = tag_stream(fragments, parser, |event| events.push(event))
        .collect()
        .await;
    tracing::debug!(fragments = passed.len(), "Stream drained");
    events
}

fn chunks(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size.max(1)).map(|c| c.iter().collect()).collect()
}

fn describe(event: &TagEvent) -> String {
    match event {
        TagEvent::ToolStart { name, errors, .. } if errors.is_empty() => format!("  tool_start  {name}"),
        TagEvent::ToolStart { name, errors, .. } => {
            let errors: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            format!("  tool_start  {name}  [{}]", errors.join("; "))
        }
        TagEvent::ToolEnd { name, params } => {
            let mut keys: Vec<&String> = params.keys().collect();
            keys.sort();
            let rendered: Vec<String> = keys.iter().map(|k| format!("{k}={:?}", params[*k])).collect();
            format!("  tool_end    {name}  {}", rendered.join(" "))
        }
        TagEvent::TagStart { name, .. } => format!("  tag_start   {name}"),
        TagEvent::TagEnd { name } => format!("  tag_end     {name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "Let me look.<read_files><paths>[\"a.rs\"]</paths></read_files><end_turn/>";

    #[tokio::test]
    async fn events_do_not_depend_on_chunk_size() {
        let whole = parse_text(STREAM, STREAM.len(), 4096).await;
        for size in [1, 3, 16] {
            assert_eq!(parse_text(STREAM, size, 4096).await, whole);
        }
        let ends: Vec<&str> = whole
            .iter()
            .filter_map(|e| match e {
                TagEvent::ToolEnd { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ends, vec!["read_files", "end_turn"]);
    }

    #[test]
    fn tool_end_lines_list_params_sorted() {
        let event = TagEvent::ToolEnd {
            name: "write_file".into(),
            params: [("path".to_string(), "a".to_string()), ("content".to_string(), "b".to_string())]
                .into_iter()
                .collect(),
        };
        assert_eq!(describe(&event), "  tool_end    write_file  content=\"b\" path=\"a\"");
    }
}
