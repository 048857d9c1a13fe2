//! The tool catalogue consumed by the transport collaborator.
//!
//! Each verb takes a map of primitive values and returns a [`ToolResult`]:
//! a success bit, a short message, an optional warnings list, and for
//! unrecoverable errors a stable kind string from the error taxonomy.
//! Rendering results for humans (Markdown and friends) happens outside the
//! core.

use crate::{
    bridge::{BridgeEnvelope, PluginBridge},
    db::ForumDb,
    error::SyncError,
    export::ExportStats,
    sync::SyncService,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

/// Uniform result of one tool call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    fn ok(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            warnings: Vec::new(),
            error_kind: None,
            data,
        }
    }

    fn invalid_args(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            warnings: Vec::new(),
            error_kind: Some("Invalid".into()),
            data: None,
        }
    }
}

impl From<SyncError> for ToolResult {
    fn from(err: SyncError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            warnings: Vec::new(),
            error_kind: Some(err.kind().to_owned()),
            data: None,
        }
    }
}

impl From<BridgeEnvelope> for ToolResult {
    fn from(envelope: BridgeEnvelope) -> Self {
        let message = if envelope.ok {
            "done".to_owned()
        } else {
            envelope.error.clone().unwrap_or_else(|| "bridge reported failure".to_owned())
        };
        Self {
            success: envelope.ok,
            message,
            warnings: envelope.warnings,
            error_kind: (!envelope.ok).then(|| "BridgeFailure".to_owned()),
            data: Some(envelope.data),
        }
    }
}

fn stats_json(stats: &ExportStats) -> Value {
    json!({
        "files_written": stats.files_written,
        "covered": stats.covered,
        "duration_ms": stats.duration.as_millis() as u64,
    })
}

/// Fetch a required string argument from the payload.
fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolResult> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolResult::invalid_args(format!("missing required argument `{key}`")))
}

fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// The fixed catalogue of remote operations.
pub struct ToolCatalog {
    service: Arc<SyncService>,
    bridge: PluginBridge,
    db: Arc<dyn ForumDb>,
}

impl ToolCatalog {
    pub fn new(service: Arc<SyncService>, bridge: PluginBridge, db: Arc<dyn ForumDb>) -> Self {
        Self { service, bridge, db }
    }

    /// Verbs this catalogue answers to, for transport discovery.
    pub const fn verbs() -> &'static [&'static str] {
        &[
            "export_templates",
            "export_stylesheets",
            "sync_start",
            "sync_stop",
            "sync_status",
            "list_template_sets",
            "list_templates",
            "get_template",
            "list_themes",
            "get_stylesheet",
            "plugin_install",
            "plugin_activate",
            "plugin_deactivate",
            "plugin_uninstall",
            "theme_install",
            "theme_uninstall",
        ]
    }

    /// Dispatch one verb with its argument payload.
    pub async fn dispatch(&self, verb: &str, args: &Value) -> ToolResult {
        match verb {
            "export_templates" => self.export_templates(args).await,
            "export_stylesheets" => self.export_stylesheets(args).await,
            "sync_start" => self.sync_start(),
            "sync_stop" => self.sync_stop(),
            "sync_status" => self.sync_status(),
            "list_template_sets" => self.list_template_sets().await,
            "list_templates" => self.list_templates(args).await,
            "get_template" => self.get_template(args).await,
            "list_themes" => self.list_themes().await,
            "get_stylesheet" => self.get_stylesheet(args).await,
            "plugin_install" => self.workspace_install(args, "plugin").await,
            "plugin_activate" => self.plugin_activate(args).await,
            "plugin_deactivate" => self.plugin_deactivate(args).await,
            "plugin_uninstall" => self.workspace_uninstall(args, "plugin").await,
            "theme_install" => self.workspace_install(args, "theme").await,
            "theme_uninstall" => self.workspace_uninstall(args, "theme").await,
            _ => ToolResult {
                success: false,
                message: format!("unknown tool verb `{verb}`"),
                warnings: Vec::new(),
                error_kind: Some("NotFound".into()),
                data: None,
            },
        }
    }

    async fn export_templates(&self, args: &Value) -> ToolResult {
        let set_name = match required_str(args, "set_name") {
            Ok(name) => name,
            Err(result) => return result,
        };
        match self.service.export_template_set(set_name).await {
            Ok(stats) => ToolResult::ok(
                format!(
                    "exported {} templates across {} groups",
                    stats.files_written, stats.covered
                ),
                Some(stats_json(&stats)),
            ),
            Err(err) => err.into(),
        }
    }

    async fn export_stylesheets(&self, args: &Value) -> ToolResult {
        let theme_name = match required_str(args, "theme_name") {
            Ok(name) => name,
            Err(result) => return result,
        };
        match self.service.export_theme(theme_name).await {
            Ok(stats) => ToolResult::ok(
                format!("exported {} stylesheets", stats.files_written),
                Some(stats_json(&stats)),
            ),
            Err(err) => err.into(),
        }
    }

    fn sync_start(&self) -> ToolResult {
        match self.service.start_watcher() {
            Ok(state) => {
                ToolResult::ok(format!("watcher {state}"), Some(json!({ "state": state.to_string() })))
            }
            Err(err) => err.into(),
        }
    }

    fn sync_stop(&self) -> ToolResult {
        let state = self.service.stop_watcher();
        ToolResult::ok(format!("watcher {state}"), Some(json!({ "state": state.to_string() })))
    }

    fn sync_status(&self) -> ToolResult {
        let status = self.service.status();
        ToolResult::ok(
            format!("watcher {}", status.state),
            Some(json!({
                "state": status.state.to_string(),
                "sync_root": status.sync_root,
                "forum_url": status.forum_url,
                "debounce_ms": status.debounce_ms,
            })),
        )
    }

    async fn list_template_sets(&self) -> ToolResult {
        match self.db.list_template_sets().await {
            Ok(sets) => {
                let data: Vec<Value> = sets
                    .iter()
                    .map(|(set, templates)| {
                        json!({ "sid": set.sid, "title": set.title, "templates": templates })
                    })
                    .collect();
                ToolResult::ok(format!("{} template sets", data.len()), Some(Value::Array(data)))
            }
            Err(err) => err.into(),
        }
    }

    async fn list_templates(&self, args: &Value) -> ToolResult {
        let set_name = match required_str(args, "set_name") {
            Ok(name) => name,
            Err(result) => return result,
        };
        let set = match self.db.template_set_by_name(set_name).await {
            Ok(Some(set)) => set,
            Ok(None) => return SyncError::not_found("template set", set_name).into(),
            Err(err) => return err.into(),
        };
        match self.db.templates_in_set(set.sid).await {
            Ok(rows) => {
                let titles: Vec<&str> = rows.iter().map(|row| row.title.as_str()).collect();
                ToolResult::ok(
                    format!("{} templates in `{set_name}`", titles.len()),
                    Some(json!(titles)),
                )
            }
            Err(err) => err.into(),
        }
    }

    async fn get_template(&self, args: &Value) -> ToolResult {
        let set_name = match required_str(args, "set_name") {
            Ok(name) => name,
            Err(result) => return result,
        };
        let title = match required_str(args, "title") {
            Ok(title) => title,
            Err(result) => return result,
        };
        let set = match self.db.template_set_by_name(set_name).await {
            Ok(Some(set)) => set,
            Ok(None) => return SyncError::not_found("template set", set_name).into(),
            Err(err) => return err.into(),
        };
        match self.db.template_in_set(set.sid, title).await {
            Ok(Some(row)) => ToolResult::ok(
                format!("template `{title}`"),
                Some(json!({
                    "tid": row.tid,
                    "sid": row.sid,
                    "title": row.title,
                    "template": row.template,
                    "version": row.version,
                })),
            ),
            Ok(None) => SyncError::not_found("template", title).into(),
            Err(err) => err.into(),
        }
    }

    async fn list_themes(&self) -> ToolResult {
        match self.db.list_themes().await {
            Ok(themes) => {
                let data: Vec<Value> = themes
                    .iter()
                    .map(|theme| json!({ "tid": theme.tid, "name": theme.name, "pid": theme.pid }))
                    .collect();
                ToolResult::ok(format!("{} themes", data.len()), Some(Value::Array(data)))
            }
            Err(err) => err.into(),
        }
    }

    async fn get_stylesheet(&self, args: &Value) -> ToolResult {
        let theme_name = match required_str(args, "theme_name") {
            Ok(name) => name,
            Err(result) => return result,
        };
        let name = match required_str(args, "name") {
            Ok(name) => name,
            Err(result) => return result,
        };
        let theme = match self.db.theme_by_name(theme_name).await {
            Ok(Some(theme)) => theme,
            Ok(None) => return SyncError::not_found("theme", theme_name).into(),
            Err(err) => return err.into(),
        };
        match self.db.stylesheet_by_name(theme.tid, name).await {
            Ok(Some(row)) => ToolResult::ok(
                format!("stylesheet `{name}`"),
                Some(json!({
                    "sid": row.sid,
                    "tid": row.tid,
                    "name": row.name,
                    "stylesheet": row.stylesheet,
                    "cachefile": row.cachefile,
                    "lastmodified": row.lastmodified,
                })),
            ),
            Ok(None) => SyncError::not_found("stylesheet", name).into(),
            Err(err) => err.into(),
        }
    }

    async fn workspace_install(&self, args: &Value, workspace_type: &str) -> ToolResult {
        let codename = match required_str(args, "codename") {
            Ok(codename) => codename,
            Err(result) => return result,
        };
        let visibility = optional_str(args, "visibility");
        match self.bridge.install(codename, visibility, workspace_type).await {
            Ok(envelope) => envelope.into(),
            Err(err) => err.into(),
        }
    }

    async fn plugin_activate(&self, args: &Value) -> ToolResult {
        let codename = match required_str(args, "codename") {
            Ok(codename) => codename,
            Err(result) => return result,
        };
        match self.bridge.activate(codename).await {
            Ok(envelope) => envelope.into(),
            Err(err) => err.into(),
        }
    }

    async fn plugin_deactivate(&self, args: &Value) -> ToolResult {
        let codename = match required_str(args, "codename") {
            Ok(codename) => codename,
            Err(result) => return result,
        };
        match self.bridge.deactivate(codename).await {
            Ok(envelope) => envelope.into(),
            Err(err) => err.into(),
        }
    }

    async fn workspace_uninstall(&self, args: &Value, workspace_type: &str) -> ToolResult {
        let codename = match required_str(args, "codename") {
            Ok(codename) => codename,
            Err(result) => return result,
        };
        match self.bridge.uninstall(codename, workspace_type).await {
            Ok(envelope) => envelope.into(),
            Err(err) => err.into(),
        }
    }
}
