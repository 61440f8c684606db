//! `stepforge templates` — List the effective agent templates.

use stepforge_config::AppConfig;
use stepforge_core::template::{Implementation, TemplateRegistry};
use stepforge_tools::default_registry;

pub fn run(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let registry = super::load_registry(config, &default_registry())?;
    for line in describe(&registry, json) {
        println!("{line}");
    }
    Ok(())
}

fn describe(registry: &TemplateRegistry, json: bool) -> Vec<String> {
    registry
        .ids()
        .into_iter()
        .filter_map(|id| Some((registry.get(id)?, registry.source(id)?)))
        .map(|(template, source)| {
            let kind = match &template.implementation {
                Implementation::Model => "model".to_string(),
                Implementation::Program { name } => format!("program:{name}"),
                Implementation::Steps { steps } => format!("steps:{}", steps.len()),
            };
            if json {
                serde_json::json!({
                    "id": template.id,
                    "source": source,
                    "model": template.model,
                    "implementation": kind,
                    "tools": template.tool_names,
                    "spawnable_agents": template.spawnable_agents,
                })
                .to_string()
            } else {
                format!(
                    "  {:<16} {:<14} {:<10} {} tools, spawns [{}]",
                    template.id,
                    source.to_string(),
                    kind,
                    template.tool_names.len(),
                    template.spawnable_agents.join(", ")
                )
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepforge_agent::builtin_layer;

    #[test]
    fn lists_builtins_in_id_order() {
        let registry = TemplateRegistry::merge([builtin_layer("m")]);
        let lines = describe(&registry, false);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].trim_start().starts_with("base"));
        assert!(lines[1].contains("steps:2"));
    }

    #[test]
    fn json_lines_carry_the_source() {
        let registry = TemplateRegistry::merge([builtin_layer("m")]);
        let first: serde_json::Value = serde_json::from_str(&describe(&registry, true)[0]).unwrap();
        assert_eq!(first["id"], "base");
        assert_eq!(first["source"], "builtin");
    }
}
