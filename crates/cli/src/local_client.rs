//! Local client — executes client-side tools on this machine.
//!
//! Stands in for the remote peer that normally runs `read_files`,
//! `write_file`, and `run_terminal_command`. Paths are resolved against the
//! workspace root, and every round trip is bounded by the configured
//! timeout.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use stepforge_core::tool::ClientToolRequester;

pub struct LocalClient {
    root: PathBuf,
    timeout: Duration,
}

impl LocalClient {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    async fn execute(&self, tool_name: &str, arguments: &Value) -> Result<String, String> {
        match tool_name {
            "read_files" => {
                let paths = arguments["paths"]
                    .as_array()
                    .ok_or("Missing 'paths' argument")?;
                let mut output = Vec::with_capacity(paths.len());
                for path in paths.iter().filter_map(Value::as_str) {
                    let entry = match tokio::fs::read_to_string(self.resolve(path)).await {
                        Ok(content) => format!("<file path=\"{path}\">\n{content}\n</file>"),
                        Err(e) => format!("<file path=\"{path}\" error=\"{e}\"/>"),
                    };
                    output.push(entry);
                }
                Ok(output.join("\n"))
            }
            "write_file" => {
                let path = arguments["path"].as_str().ok_or("Missing 'path' argument")?;
                let content = arguments["content"].as_str().ok_or("Missing 'content' argument")?;
                let target = self.resolve(path);
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| format!("Failed to create directories for {path}: {e}"))?;
                }
                tokio::fs::write(&target, content)
                    .await
                    .map_err(|e| format!("Failed to write {path}: {e}"))?;
                Ok(format!("Wrote {} bytes to {path}", content.len()))
            }
            "run_terminal_command" => {
                let command = arguments["command"].as_str().ok_or("Missing 'command' argument")?;
                let cwd = arguments["cwd"]
                    .as_str()
                    .map(|c| self.resolve(c))
                    .unwrap_or_else(|| self.root.clone());
                run_command(command, &cwd).await
            }
            other => Err(format!("Unsupported client tool: {other}")),
        }
    }
}

#[async_trait]
impl ClientToolRequester for LocalClient {
    async fn request_client_tool_call(&self, tool_name: &str, arguments: Value) -> Result<String, String> {
        debug!(tool = %tool_name, "Executing client tool locally");
        match tokio::time::timeout(self.timeout, self.execute(tool_name, &arguments)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(tool = %tool_name, timeout_secs = self.timeout.as_secs(), "Client tool timed out");
                Err(format!("{tool_name} timed out after {}s", self.timeout.as_secs()))
            }
        }
    }
}

async fn run_command(command: &str, cwd: &Path) -> Result<String, String> {
    debug!(command = %command, "Executing shell command");

    let output = if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", command]).current_dir(cwd).kill_on_drop(true).output().await
    } else {
        Command::new("sh").args(["-c", command]).current_dir(cwd).kill_on_drop(true).output().await
    };
    let output = output.map_err(|e| format!("Failed to start command: {e}"))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let text = if output.status.success() {
        if stderr.is_empty() {
            stdout
        } else {
            format!("{stdout}\n[stderr]: {stderr}")
        }
    } else {
        let code = output.status.code().unwrap_or(-1);
        warn!(command = %command, exit_code = code, "Command failed");
        format!("[exit code: {code}]\n{stdout}\n{stderr}")
    };
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(root: &Path) -> LocalClient {
        LocalClient::new(root, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path());

        let wrote = client
            .request_client_tool_call("write_file", json!({"path": "src/a.rs", "content": "fn a() {}"}))
            .await
            .unwrap();
        assert_eq!(wrote, "Wrote 9 bytes to src/a.rs");

        let read = client
            .request_client_tool_call("read_files", json!({"paths": ["src/a.rs", "missing.rs"]}))
            .await
            .unwrap();
        assert!(read.contains("<file path=\"src/a.rs\">\nfn a() {}\n</file>"));
        assert!(read.contains("<file path=\"missing.rs\" error="));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn commands_run_in_the_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let client = client(dir.path());

        let listing = client
            .request_client_tool_call("run_terminal_command", json!({"command": "ls"}))
            .await
            .unwrap();
        assert!(listing.contains("marker.txt"));

        let failed = client
            .request_client_tool_call("run_terminal_command", json!({"command": "exit 3"}))
            .await
            .unwrap();
        assert!(failed.starts_with("[exit code: 3]"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_commands_time_out() {
        let dir = tempfile::tempdir().unwrap();
        let client = LocalClient::new(dir.path(), Duration::from_millis(50));
        let err = client
            .request_client_tool_call("run_terminal_command", json!({"command": "sleep 5"}))
            .await
            .unwrap_err();
        assert!(err.contains("timed out"));
    }

    #[tokio::test]
    async fn unknown_tools_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = client(dir.path())
            .request_client_tool_call("teleport", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err, "Unsupported client tool: teleport");
    }
}
