//! Subprocess bridge into the forum's own runtime.
//!
//! Plugin and theme lifecycle operations must run inside the forum (PHP)
//! process to see its hooks and settings, so the core shells out to a
//! bridge script:
//!
//! ```text
//! {php_binary} {bridge_script} --action=<verb> --json k=v ...
//! ```
//!
//! Every invocation is a fresh subprocess with the forum root as its
//! working directory; there is no long-lived bridge process and no shared
//! state across calls. The first JSON object found on stdout is the result
//! envelope. A parseable envelope wins over a non-zero exit status; raw
//! stderr is logged either way.

use crate::{
    config::{BridgeConfig, ForumConfig},
    error::{Result, SyncError},
    log,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, process::Stdio, time::Duration};
use tokio::process::Command;

/// Result envelope printed by the bridge script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeEnvelope {
    pub ok: bool,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Driver for the forum-side lifecycle script.
pub struct PluginBridge {
    php_binary: String,
    script: PathBuf,
    forum_root: PathBuf,
    timeout: Duration,
}

impl PluginBridge {
    pub fn new(bridge: &BridgeConfig, forum: &ForumConfig) -> Self {
        Self {
            php_binary: bridge.php_binary.clone(),
            script: bridge.script.clone(),
            forum_root: forum.root.clone(),
            timeout: bridge.timeout(),
        }
    }

    /// Run one bridge action with `k=v` arguments.
    pub async fn call(&self, action: &str, args: &[(&str, &str)]) -> Result<BridgeEnvelope> {
        let rendered = self.render_command(action, args);

        let mut command = Command::new(&self.php_binary);
        command
            .arg(&self.script)
            .arg(format!("--action={action}"))
            .arg("--json")
            .current_dir(&self.forum_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in args {
            command.arg(format!("{key}={value}"));
        }

        let child = command
            .spawn()
            .map_err(|err| SyncError::Bridge(format!("failed to spawn `{rendered}`: {err}")))?;

        // kill_on_drop reaps the child when the timeout wins the race
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                SyncError::Bridge(format!(
                    "`{rendered}` timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|err| SyncError::Bridge(format!("`{rendered}` failed: {err}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            log!("bridge"; "{}", stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match first_json_envelope(&stdout) {
            Some(envelope) => Ok(envelope),
            None if !output.status.success() => Err(SyncError::Bridge(format!(
                "`{rendered}` exited with {}: {}",
                output.status,
                stderr.trim(),
            ))),
            None => Err(SyncError::Bridge(format!(
                "`{rendered}` produced no JSON envelope on stdout"
            ))),
        }
    }

    /// The command line as the user would run it, for error messages.
    fn render_command(&self, action: &str, args: &[(&str, &str)]) -> String {
        let mut rendered = format!(
            "{} {} --action={action} --json",
            self.php_binary,
            self.script.display(),
        );
        for (key, value) in args {
            rendered.push_str(&format!(" {key}={value}"));
        }
        rendered
    }

    /// Install a plugin or theme workspace into the forum.
    pub async fn install(
        &self,
        codename: &str,
        visibility: Option<&str>,
        workspace_type: &str,
    ) -> Result<BridgeEnvelope> {
        let mut args = vec![("codename", codename), ("type", workspace_type)];
        if let Some(visibility) = visibility {
            args.push(("visibility", visibility));
        }
        self.call("plugin:install", &args).await
    }

    /// Activate an installed plugin.
    pub async fn activate(&self, codename: &str) -> Result<BridgeEnvelope> {
        self.call("plugin:activate", &[("codename", codename)]).await
    }

    /// Deactivate an active plugin.
    pub async fn deactivate(&self, codename: &str) -> Result<BridgeEnvelope> {
        self.call("plugin:deactivate", &[("codename", codename)]).await
    }

    /// Uninstall a plugin or theme workspace from the forum.
    pub async fn uninstall(&self, codename: &str, workspace_type: &str) -> Result<BridgeEnvelope> {
        self.call("plugin:uninstall", &[("codename", codename), ("type", workspace_type)]).await
    }

    /// Create a theme row with the minimal valid properties map.
    pub async fn theme_create(&self, name: &str, parent: Option<&str>) -> Result<BridgeEnvelope> {
        let mut args = vec![("name", name)];
        if let Some(parent) = parent {
            args.push(("parent", parent));
        }
        self.call("theme:create", &args).await
    }

    /// Set a single property on a theme.
    pub async fn theme_set_property(
        &self,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<BridgeEnvelope> {
        self.call("theme:set_property", &[("name", name), ("key", key), ("value", value)]).await
    }

    /// Fetch a theme's record as the forum sees it.
    pub async fn theme_get(&self, name: &str) -> Result<BridgeEnvelope> {
        self.call("theme:get", &[("name", name)]).await
    }
}

/// Scan stdout for the first JSON object that parses as an envelope.
///
/// PHP notices and warnings may precede the payload, so every `{` is a
/// candidate start until one yields a valid envelope.
fn first_json_envelope(stdout: &str) -> Option<BridgeEnvelope> {
    let mut offset = 0;
    while let Some(start) = stdout[offset..].find('{') {
        let candidate = &stdout[offset + start..];
        let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<serde_json::Value>();
        if let Some(Ok(value)) = stream.next()
            && value.is_object()
            && let Ok(envelope) = serde_json::from_value::<BridgeEnvelope>(value)
        {
            return Some(envelope);
        }
        offset += start + 1;
    }
    None
}
