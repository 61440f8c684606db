pub mod parse;
pub mod run;
pub mod templates;

use anyhow::Context;
use stepforge_agent::builtin_layer;
use stepforge_config::{AppConfig, template_layers};
use stepforge_core::template::TemplateRegistry;
use stepforge_tools::ToolRegistry;

/// Merge the built-in, discovered, and project-local layers and check the
/// result against `tools`.
pub fn load_registry(config: &AppConfig, tools: &ToolRegistry) -> anyhow::Result<TemplateRegistry> {
    let cwd = std::env::current_dir().context("Failed to read the working directory")?;
    let mut layers = vec![builtin_layer(&config.default_model)];
    layers.extend(template_layers(config, &cwd)?);

    let registry = TemplateRegistry::merge(layers);
    registry
        .validate(|name| tools.contains(name))
        .context("Template registry is inconsistent")?;
    Ok(registry)
}
