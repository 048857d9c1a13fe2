//! Disk → database importers.
//!
//! Importers ingest edited file content back into the forum database. They
//! never retry on their own: errors surface to the caller (the watcher
//! logs them per event, the tool layer reports them verbatim). The on-disk
//! file is never touched here, so a failed import leaves both sides as
//! they were.
//!
//! Template ingestion honours the master/custom inheritance model: a custom
//! row is updated in place, a missing one is inserted with the master's
//! version (or the default version when no master exists). Stylesheet
//! ingestion upserts the row, bumps `lastmodified`, and signals the cache
//! refresher.

use crate::{
    cache::CacheRefresher,
    db::{ForumDb, ImportAction},
    error::{Result, SyncError},
};
use std::sync::Arc;

/// Disk → DB for template bodies.
pub struct TemplateImporter {
    db: Arc<dyn ForumDb>,
}

impl TemplateImporter {
    pub fn new(db: Arc<dyn ForumDb>) -> Self {
        Self { db }
    }

    /// Ingest a template body into the named set.
    pub async fn import(&self, set_name: &str, title: &str, body: &str) -> Result<ImportAction> {
        if body.is_empty() {
            return Err(SyncError::Invalid(format!(
                "refusing to import empty template body for `{title}`"
            )));
        }

        let set = self
            .db
            .template_set_by_name(set_name)
            .await?
            .ok_or_else(|| SyncError::not_found("template set", set_name))?;

        self.db.import_template(set.sid, title, body).await
    }
}

/// Disk → DB for stylesheets, with a cache refresh on every import.
pub struct StylesheetImporter {
    db: Arc<dyn ForumDb>,
    cache: CacheRefresher,
}

impl StylesheetImporter {
    pub fn new(db: Arc<dyn ForumDb>, cache: CacheRefresher) -> Self {
        Self { db, cache }
    }

    /// Ingest a stylesheet body into the named theme.
    ///
    /// The returned flag reports whether the forum confirmed the CSS cache
    /// refresh; `false` means the DB write stands but the cache is stale.
    pub async fn import(
        &self,
        theme_name: &str,
        name: &str,
        css: &str,
    ) -> Result<(ImportAction, bool)> {
        if css.is_empty() {
            return Err(SyncError::Invalid(format!(
                "refusing to import empty stylesheet `{name}`"
            )));
        }

        let theme = self
            .db
            .theme_by_name(theme_name)
            .await?
            .ok_or_else(|| SyncError::not_found("theme", theme_name))?;

        let action = self.db.import_stylesheet(theme.tid, name, css).await?;
        let cache_fresh = self.cache.refresh(theme_name, name).await;

        Ok((action, cache_fresh))
    }
}
