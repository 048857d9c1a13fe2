//! Sync service orchestration.
//!
//! The service owns the watcher, both exporters, both importers, and the
//! cache refresher client; the DB gateway is shared with read-only
//! collaborators. It is created once per process and enforces the one
//! concurrency invariant the core actively mediates: while an exporter
//! runs, the watcher is paused, so the exporter's own atomic writes never
//! feed back into ingestion.

use crate::{
    cache::CacheRefresher,
    config::Config,
    db::ForumDb,
    error::{Result, SyncError},
    export::{ExportStats, StylesheetExporter, TemplateExporter},
    groups::GroupResolver,
    import::{StylesheetImporter, TemplateImporter},
    log,
    router::{PathRouter, RouteKey},
    watch::{FileWatcher, Ingest, WatcherState},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{path::PathBuf, sync::Arc, time::Duration};

/// How long to stay paused after an export so notify delivers the
/// exporter's own write events while they are still discarded.
const RESUME_SETTLE: Duration = Duration::from_millis(100);

/// Snapshot of the service configuration and watcher state.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub state: WatcherState,
    pub sync_root: PathBuf,
    pub forum_url: String,
    pub debounce_ms: u64,
}

/// Routes validated watcher events into the matching importer.
struct IngestPipeline {
    templates: TemplateImporter,
    stylesheets: StylesheetImporter,
}

#[async_trait]
impl Ingest for IngestPipeline {
    async fn ingest(&self, key: RouteKey, bytes: Vec<u8>) -> Result<()> {
        // the DB stores text; reject anything that is not UTF-8
        let body = String::from_utf8(bytes)
            .map_err(|_| SyncError::Invalid("file content is not valid UTF-8".into()))?;

        match key {
            RouteKey::Template { set_name, group: _, title } => {
                let action = self.templates.import(&set_name, &title, &body).await?;
                log!("watch"; "template `{title}` {} in `{set_name}`", action.as_str());
            }
            RouteKey::Stylesheet { theme_name, name } => {
                let (action, cache_fresh) =
                    self.stylesheets.import(&theme_name, &name, &body).await?;
                log!("watch"; "stylesheet `{name}` {} in `{theme_name}`", action.as_str());
                if !cache_fresh {
                    log!("cache"; "CacheStale: forum CSS for `{theme_name}` may lag until the next change");
                }
            }
        }
        Ok(())
    }
}

/// Lifecycle owner of the disk/database synchronisation core.
pub struct SyncService {
    template_exporter: TemplateExporter,
    stylesheet_exporter: StylesheetExporter,
    watcher: Mutex<FileWatcher>,
    sync_root: PathBuf,
    forum_url: String,
    debounce_ms: u64,
}

impl SyncService {
    /// Wire the service from a shared gateway and the loaded configuration.
    ///
    /// Must be called on the tokio runtime (the watcher captures the
    /// current handle for dispatch).
    pub fn new(db: Arc<dyn ForumDb>, config: &Config) -> Self {
        let router = PathRouter::new(config.sync.root.clone());
        let cache = CacheRefresher::new(&config.forum.url, config.forum.token.clone());

        let pipeline = Arc::new(IngestPipeline {
            templates: TemplateImporter::new(Arc::clone(&db)),
            stylesheets: StylesheetImporter::new(Arc::clone(&db), cache),
        });

        let watcher = FileWatcher::new(
            config.sync.root.clone(),
            config.sync.debounce_window(),
            config.sync.max_file_bytes,
            pipeline,
        );

        Self {
            template_exporter: TemplateExporter::new(
                Arc::clone(&db),
                router.clone(),
                GroupResolver::with_default_groups(),
            ),
            stylesheet_exporter: StylesheetExporter::new(db, router),
            watcher: Mutex::new(watcher),
            sync_root: config.sync.root.clone(),
            forum_url: config.forum.url.clone(),
            debounce_ms: config.sync.debounce_ms,
        }
    }

    /// Export a template set to disk, holding the watcher paused throughout.
    pub async fn export_template_set(&self, set_name: &str) -> Result<ExportStats> {
        self.watcher.lock().pause();
        let result = self.template_exporter.export(set_name).await;
        self.resume_after_export().await;

        if let Ok(stats) = &result {
            log!("sync"; "exported {} templates across {} groups in {:.2?}",
                stats.files_written, stats.covered, stats.duration);
        }
        result
    }

    /// Export a theme's stylesheets to disk, holding the watcher paused
    /// throughout.
    pub async fn export_theme(&self, theme_name: &str) -> Result<ExportStats> {
        self.watcher.lock().pause();
        let result = self.stylesheet_exporter.export(theme_name).await;
        self.resume_after_export().await;

        if let Ok(stats) = &result {
            log!("sync"; "exported {} stylesheets in {:.2?}", stats.files_written, stats.duration);
        }
        result
    }

    /// Resume the watcher after an export, on success or error alike.
    async fn resume_after_export(&self) {
        // notify delivers the exporter's final rename a beat after it
        // happens; keep discarding until those events have landed
        tokio::time::sleep(RESUME_SETTLE).await;
        self.watcher.lock().resume();
    }

    /// Start observing the sync root. No-op when already running.
    pub fn start_watcher(&self) -> Result<WatcherState> {
        let mut watcher = self.watcher.lock();
        watcher.start()?;
        Ok(watcher.state())
    }

    /// Stop observing and cancel pending debounces. Idempotent.
    pub fn stop_watcher(&self) -> WatcherState {
        let mut watcher = self.watcher.lock();
        watcher.stop();
        watcher.state()
    }

    /// Current service status.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            state: self.watcher.lock().state(),
            sync_root: self.sync_root.clone(),
            forum_url: self.forum_url.clone(),
            debounce_ms: self.debounce_ms,
        }
    }
}
