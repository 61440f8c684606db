//! File-based template overrides.
//!
//! Each `*.toml` file in a template directory declares one agent template.
//! The `id` defaults to the file stem and `model` to the configured default
//! model. Files are read in filename order so the merged registry does not
//! depend on directory iteration order.

use std::path::{Path, PathBuf};
use stepforge_core::template::{AgentTemplate, TemplateLayer, TemplateSource};
use tracing::debug;

use crate::{AppConfig, ConfigError};

/// Parse one template file.
pub fn load_template_file(path: &Path) -> Result<AgentTemplate, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let parse_error = |reason: String| ConfigError::ParseError {
        path: path.to_path_buf(),
        reason,
    };

    let mut table: toml::Table = toml::from_str(&content).map_err(|e| parse_error(e.to_string()))?;
    if !table.contains_key("id") {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| parse_error("template file name is not valid UTF-8".into()))?;
        table.insert("id".into(), toml::Value::String(stem.to_string()));
    }
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| parse_error(e.to_string()))
}

/// Load every `*.toml` template in `dir`. A missing directory yields no
/// templates.
pub fn load_template_dir(dir: &Path) -> Result<Vec<AgentTemplate>, ConfigError> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "Template directory not found, skipping");
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::ReadError {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    paths.iter().map(|p| load_template_file(p)).collect()
}

/// The discovered and project-local layers for `config`, with project
/// paths resolved against `root`.
pub fn template_layers(config: &AppConfig, root: &Path) -> Result<Vec<TemplateLayer>, ConfigError> {
    let mut discovered = Vec::new();
    for dir in &config.templates.discovered_dirs {
        discovered.extend(load_template_dir(dir)?);
    }
    let mut project = load_template_dir(&root.join(&config.templates.project_dir))?;

    for template in discovered.iter_mut().chain(project.iter_mut()) {
        if template.model.is_empty() {
            template.model = config.default_model.clone();
        }
    }

    debug!(
        discovered = discovered.len(),
        project = project.len(),
        "Loaded template overrides"
    );
    Ok(vec![
        TemplateLayer::new(TemplateSource::Discovered, discovered),
        TemplateLayer::new(TemplateSource::ProjectLocal, project),
    ])
}
