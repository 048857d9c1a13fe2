//! Forumsync - disk/database synchronisation for a running forum.

use anyhow::Result;
use clap::Parser;
use forumsync::{
    bridge::{BridgeEnvelope, PluginBridge},
    cli::{Cli, Commands, ExportTarget, PluginAction, ThemeAction},
    config::Config,
    db::{ForumDb, MySqlForumDb},
    log,
    sync::SyncService,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    match &cli.command {
        Commands::Sync => run_sync(&config).await,
        Commands::Export { target } => run_export(&config, target).await,
        Commands::Status => run_status(&config),
        Commands::Plugin { action } => run_plugin(&config, action).await,
        Commands::Theme { action } => run_theme(&config, action).await,
    }
}

/// Connect the shared DB gateway.
async fn connect(config: &Config) -> Result<Arc<dyn ForumDb>> {
    let db = MySqlForumDb::connect(&config.db).await?;
    Ok(Arc::new(db))
}

/// Run the sync service until interrupted.
async fn run_sync(config: &Config) -> Result<()> {
    let db = connect(config).await?;
    let service = SyncService::new(db, config);

    service.start_watcher()?;
    let status = service.status();
    log!("sync"; "mirroring {} into {}", status.forum_url, status.sync_root.display());

    tokio::signal::ctrl_c().await.ok();
    log!("sync"; "shutting down gracefully...");
    service.stop_watcher();
    Ok(())
}

/// One-shot export of a template set or a theme's stylesheets.
async fn run_export(config: &Config, target: &ExportTarget) -> Result<()> {
    let db = connect(config).await?;
    let service = SyncService::new(db, config);

    match target {
        ExportTarget::Templates { set_name } => {
            service.export_template_set(set_name).await?;
        }
        ExportTarget::Stylesheets { theme_name } => {
            service.export_theme(theme_name).await?;
        }
    }
    Ok(())
}

/// Print the effective configuration; a fresh process has no live watcher.
fn run_status(config: &Config) -> Result<()> {
    log!("sync"; "sync_root: {}", config.sync.root.display());
    log!("sync"; "forum_url: {}", config.forum.url);
    log!("sync"; "debounce_ms: {}", config.sync.debounce_ms);
    log!("sync"; "max_file_bytes: {}", config.sync.max_file_bytes);
    Ok(())
}

/// Drive the plugin lifecycle through the bridge.
async fn run_plugin(config: &Config, action: &PluginAction) -> Result<()> {
    let bridge = PluginBridge::new(&config.bridge, &config.forum);

    let envelope = match action {
        PluginAction::Install { codename, visibility } => {
            bridge.install(codename, visibility.as_deref(), "plugin").await?
        }
        PluginAction::Activate { codename } => bridge.activate(codename).await?,
        PluginAction::Deactivate { codename } => bridge.deactivate(codename).await?,
        PluginAction::Uninstall { codename } => bridge.uninstall(codename, "plugin").await?,
    };
    report(envelope)
}

/// Drive the theme lifecycle through the bridge.
async fn run_theme(config: &Config, action: &ThemeAction) -> Result<()> {
    let bridge = PluginBridge::new(&config.bridge, &config.forum);

    let envelope = match action {
        ThemeAction::Install { codename, visibility } => {
            bridge.install(codename, visibility.as_deref(), "theme").await?
        }
        ThemeAction::Uninstall { codename } => bridge.uninstall(codename, "theme").await?,
    };
    report(envelope)
}

/// Surface a bridge envelope as process output and exit status.
fn report(envelope: BridgeEnvelope) -> Result<()> {
    for warning in &envelope.warnings {
        log!("bridge"; "warning: {warning}");
    }

    if envelope.ok {
        log!("bridge"; "ok: {}", envelope.data);
        Ok(())
    } else {
        anyhow::bail!(
            "bridge reported failure: {}",
            envelope.error.unwrap_or_else(|| "no error message".into())
        )
    }
}
