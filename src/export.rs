//! Database → disk exporters.
//!
//! Materialise template sets and theme stylesheets as files under the sync
//! root. Every file lands through an atomic write: the body goes to a
//! `.tmp` sibling in the target directory, then a rename swaps it in, so an
//! external observer only ever sees the old file or the new file.
//!
//! Exports stream rows in `(group, title)` order, which keeps repeated runs
//! byte-identical and directory listings reproducible.

use crate::{
    db::ForumDb,
    error::{Result, SyncError},
    groups::GroupResolver,
    router::PathRouter,
};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::fs;

/// Outcome of one export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportStats {
    /// Files written to disk
    pub files_written: usize,
    /// Group directories (templates) or stylesheet files (themes) covered
    pub covered: usize,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

/// Staging sibling for an atomic write: `name.ext` -> `name.ext.tmp`.
fn staging_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map_or_else(std::ffi::OsString::new, ToOwned::to_owned);
    name.push(".tmp");
    target.with_file_name(name)
}

/// Write `bytes` to `target` atomically.
///
/// The staging file is created in the target's directory so the final
/// rename never crosses a filesystem. On any failure the staging file is
/// removed best-effort and the error propagates.
pub(crate) async fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }

    let staging = staging_path(target);
    let result = async {
        fs::write(&staging, bytes).await?;
        fs::rename(&staging, target).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&staging).await;
    }
    result.map_err(SyncError::from)
}

/// DB → disk for a named template set.
pub struct TemplateExporter {
    db: Arc<dyn ForumDb>,
    router: PathRouter,
    groups: GroupResolver,
}

impl TemplateExporter {
    pub fn new(db: Arc<dyn ForumDb>, router: PathRouter, groups: GroupResolver) -> Self {
        Self { db, router, groups }
    }

    /// Export every template the set sees into its group directory.
    pub async fn export(&self, set_name: &str) -> Result<ExportStats> {
        let start = Instant::now();

        let set = self
            .db
            .template_set_by_name(set_name)
            .await?
            .ok_or_else(|| SyncError::not_found("template set", set_name))?;

        let rows = self.db.templates_in_set(set.sid).await?;

        // Resolve groups up front, then order by (group, title)
        let mut rows: Vec<(&str, &crate::db::Template)> =
            rows.iter().map(|row| (self.groups.resolve(&row.title), row)).collect();
        rows.sort_by(|a, b| (a.0, &a.1.title).cmp(&(b.0, &b.1.title)));

        let mut groups_covered = BTreeSet::new();
        let mut files_written = 0;

        for (group, row) in rows {
            let target = self.router.template_path(&set.title, group, &row.title);
            write_atomic(&target, row.template.as_bytes()).await?;
            groups_covered.insert(group.to_owned());
            files_written += 1;
        }

        Ok(ExportStats {
            files_written,
            covered: groups_covered.len(),
            duration: start.elapsed(),
        })
    }
}

/// DB → disk for a named theme.
pub struct StylesheetExporter {
    db: Arc<dyn ForumDb>,
    router: PathRouter,
}

impl StylesheetExporter {
    pub fn new(db: Arc<dyn ForumDb>, router: PathRouter) -> Self {
        Self { db, router }
    }

    /// Export every stylesheet of the theme into its style directory.
    pub async fn export(&self, theme_name: &str) -> Result<ExportStats> {
        let start = Instant::now();

        let theme = self
            .db
            .theme_by_name(theme_name)
            .await?
            .ok_or_else(|| SyncError::not_found("theme", theme_name))?;

        let rows = self.db.stylesheets_for_theme(theme.tid).await?;

        let mut files_written = 0;
        for row in &rows {
            let target = self.router.stylesheet_path(&theme.name, &row.name);
            write_atomic(&target, row.stylesheet.as_bytes()).await?;
            files_written += 1;
        }

        Ok(ExportStats { files_written, covered: files_written, duration: start.elapsed() })
    }
}
