//! Typed gateway over the forum schema.
//!
//! All database access flows through the [`ForumDb`] trait: exporters and
//! importers share the same capability set, and tests substitute an
//! in-memory implementation. The production gateway wraps a `sqlx` MySQL
//! pool; values are always bound as parameters, while table names come from
//! the configured prefix.
//!
//! Transactions are cursor-scoped: each multi-row operation opens one
//! transaction, commits on success, and rolls back when dropped on error.
//! Connection acquisition happens directly on the calling task; the gateway
//! never wraps itself in an inner executor.

use crate::{config::DbConfig, error::Result};
use async_trait::async_trait;
use sqlx::{
    Row,
    mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow},
};
use std::time::Duration;

/// Template set holding the canonical (master) template bodies
pub const MASTER_SID: i64 = -2;

/// Template set shared by all themes
pub const GLOBAL_SID: i64 = -1;

/// Version stamped on a custom template inserted without a master
pub const DEFAULT_TEMPLATE_VERSION: &str = "1800";

/// Row of `{prefix}templatesets`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSet {
    pub sid: i64,
    pub title: String,
}

/// Row of `{prefix}templates`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub tid: i64,
    pub sid: i64,
    pub title: String,
    pub template: String,
    pub version: String,
}

/// Row of `{prefix}themes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub tid: i64,
    pub name: String,
    pub pid: i64,
    pub def: i64,
    pub properties: String,
    pub stylesheets: String,
    pub allowedgroups: String,
}

/// Row of `{prefix}themestylesheets`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stylesheet {
    pub sid: i64,
    pub tid: i64,
    pub name: String,
    pub stylesheet: String,
    pub cachefile: String,
    pub lastmodified: i64,
}

/// What an import did to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportAction {
    Inserted,
    Updated,
}

impl ImportAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
        }
    }
}

/// Capability set shared by exporters, importers, and read-only helpers.
#[async_trait]
pub trait ForumDb: Send + Sync {
    /// Look up a template set by its unique name.
    async fn template_set_by_name(&self, name: &str) -> Result<Option<TemplateSet>>;

    /// All template sets with their custom-row counts, ordered by name.
    async fn list_template_sets(&self) -> Result<Vec<(TemplateSet, i64)>>;

    /// The effective template view of a set, ordered by title: every master
    /// row overlaid by the set's custom overrides.
    async fn templates_in_set(&self, sid: i64) -> Result<Vec<Template>>;

    /// A single template as the set sees it: the custom row when present,
    /// otherwise the master.
    async fn template_in_set(&self, sid: i64, title: &str) -> Result<Option<Template>>;

    /// Ingest a template body into a set.
    ///
    /// A custom row is updated in place; otherwise one is inserted,
    /// inheriting the master's version when a master exists and
    /// [`DEFAULT_TEMPLATE_VERSION`] when it does not. The whole operation
    /// runs in one transaction.
    async fn import_template(&self, sid: i64, title: &str, body: &str) -> Result<ImportAction>;

    /// Look up a theme by its unique name.
    async fn theme_by_name(&self, name: &str) -> Result<Option<Theme>>;

    /// All themes, ordered by name.
    async fn list_themes(&self) -> Result<Vec<Theme>>;

    /// All stylesheets of a theme, ordered by name.
    async fn stylesheets_for_theme(&self, tid: i64) -> Result<Vec<Stylesheet>>;

    /// A single stylesheet of a theme.
    async fn stylesheet_by_name(&self, tid: i64, name: &str) -> Result<Option<Stylesheet>>;

    /// Ingest a stylesheet body into a theme.
    ///
    /// An existing row is updated and its `lastmodified` bumped; otherwise a
    /// row is inserted with `cachefile` equal to the stylesheet name. Runs
    /// in one transaction.
    async fn import_stylesheet(&self, tid: i64, name: &str, css: &str) -> Result<ImportAction>;
}

/// Production gateway over a pooled MySQL connection.
pub struct MySqlForumDb {
    pool: MySqlPool,
    prefix: String,
}

impl MySqlForumDb {
    /// Connect a pool using the `[db]` configuration section.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_s))
            .connect_with(options)
            .await?;

        Ok(Self { pool, prefix: config.prefix.clone() })
    }

    fn table(&self, entity: &str) -> String {
        format!("{}{}", self.prefix, entity)
    }

    fn template_from_row(row: &MySqlRow) -> Result<Template> {
        Ok(Template {
            tid: row.try_get("tid")?,
            sid: row.try_get("sid")?,
            title: row.try_get("title")?,
            template: row.try_get("template")?,
            version: row.try_get("version")?,
        })
    }

    fn theme_from_row(row: &MySqlRow) -> Result<Theme> {
        Ok(Theme {
            tid: row.try_get("tid")?,
            name: row.try_get("name")?,
            pid: row.try_get("pid")?,
            def: row.try_get("def")?,
            properties: row.try_get("properties")?,
            stylesheets: row.try_get("stylesheets")?,
            allowedgroups: row.try_get("allowedgroups")?,
        })
    }

    fn stylesheet_from_row(row: &MySqlRow) -> Result<Stylesheet> {
        Ok(Stylesheet {
            sid: row.try_get("sid")?,
            tid: row.try_get("tid")?,
            name: row.try_get("name")?,
            stylesheet: row.try_get("stylesheet")?,
            cachefile: row.try_get("cachefile")?,
            lastmodified: row.try_get("lastmodified")?,
        })
    }
}

#[async_trait]
impl ForumDb for MySqlForumDb {
    async fn template_set_by_name(&self, name: &str) -> Result<Option<TemplateSet>> {
        let query =
            format!("SELECT sid, title FROM {} WHERE title = ?", self.table("templatesets"));
        let row = sqlx::query(&query).bind(name).fetch_optional(&self.pool).await?;

        row.map(|row| {
            Ok(TemplateSet { sid: row.try_get("sid")?, title: row.try_get("title")? })
        })
        .transpose()
    }

    async fn list_template_sets(&self) -> Result<Vec<(TemplateSet, i64)>> {
        let query = format!(
            "SELECT s.sid, s.title, COUNT(t.tid) AS templates \
             FROM {} s LEFT JOIN {} t ON t.sid = s.sid \
             GROUP BY s.sid, s.title ORDER BY s.title",
            self.table("templatesets"),
            self.table("templates"),
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                Ok((
                    TemplateSet { sid: row.try_get("sid")?, title: row.try_get("title")? },
                    row.try_get("templates")?,
                ))
            })
            .collect()
    }

    async fn templates_in_set(&self, sid: i64) -> Result<Vec<Template>> {
        let templates = self.table("templates");
        let query = format!(
            "SELECT tid, sid, title, template, version FROM {templates} t \
             WHERE t.sid = ? \
                OR (t.sid = ? AND NOT EXISTS \
                    (SELECT 1 FROM {templates} o WHERE o.sid = ? AND o.title = t.title)) \
             ORDER BY t.title",
        );
        let rows = sqlx::query(&query)
            .bind(sid)
            .bind(MASTER_SID)
            .bind(sid)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::template_from_row).collect()
    }

    async fn template_in_set(&self, sid: i64, title: &str) -> Result<Option<Template>> {
        let query = format!(
            "SELECT tid, sid, title, template, version FROM {} \
             WHERE sid IN (?, ?) AND title = ? ORDER BY sid DESC LIMIT 1",
            self.table("templates"),
        );
        // sid DESC puts the custom row (sid > -2) ahead of the master
        let row = sqlx::query(&query)
            .bind(sid)
            .bind(MASTER_SID)
            .bind(title)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::template_from_row).transpose()
    }

    async fn import_template(&self, sid: i64, title: &str, body: &str) -> Result<ImportAction> {
        let templates = self.table("templates");
        let mut tx = self.pool.begin().await?;

        let custom = sqlx::query(&format!(
            "SELECT tid FROM {templates} WHERE sid = ? AND title = ?"
        ))
        .bind(sid)
        .bind(title)
        .fetch_optional(&mut *tx)
        .await?;

        let action = if let Some(row) = custom {
            let tid: i64 = row.try_get("tid")?;
            sqlx::query(&format!("UPDATE {templates} SET template = ? WHERE tid = ?"))
                .bind(body)
                .bind(tid)
                .execute(&mut *tx)
                .await?;
            ImportAction::Updated
        } else {
            let master = sqlx::query(&format!(
                "SELECT version FROM {templates} WHERE sid = ? AND title = ?"
            ))
            .bind(MASTER_SID)
            .bind(title)
            .fetch_optional(&mut *tx)
            .await?;

            let version = master
                .map(|row| row.try_get::<String, _>("version"))
                .transpose()?
                .unwrap_or_else(|| DEFAULT_TEMPLATE_VERSION.to_owned());

            sqlx::query(&format!(
                "INSERT INTO {templates} (title, template, sid, version, dateline) \
                 VALUES (?, ?, ?, ?, ?)"
            ))
            .bind(title)
            .bind(body)
            .bind(sid)
            .bind(&version)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;
            ImportAction::Inserted
        };

        tx.commit().await?;
        Ok(action)
    }

    async fn theme_by_name(&self, name: &str) -> Result<Option<Theme>> {
        let query = format!(
            "SELECT tid, name, pid, def, properties, stylesheets, allowedgroups \
             FROM {} WHERE name = ?",
            self.table("themes"),
        );
        let row = sqlx::query(&query).bind(name).fetch_optional(&self.pool).await?;

        row.as_ref().map(Self::theme_from_row).transpose()
    }

    async fn list_themes(&self) -> Result<Vec<Theme>> {
        let query = format!(
            "SELECT tid, name, pid, def, properties, stylesheets, allowedgroups \
             FROM {} ORDER BY name",
            self.table("themes"),
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        rows.iter().map(Self::theme_from_row).collect()
    }

    async fn stylesheets_for_theme(&self, tid: i64) -> Result<Vec<Stylesheet>> {
        let query = format!(
            "SELECT sid, tid, name, stylesheet, cachefile, lastmodified \
             FROM {} WHERE tid = ? ORDER BY name",
            self.table("themestylesheets"),
        );
        let rows = sqlx::query(&query).bind(tid).fetch_all(&self.pool).await?;

        rows.iter().map(Self::stylesheet_from_row).collect()
    }

    async fn stylesheet_by_name(&self, tid: i64, name: &str) -> Result<Option<Stylesheet>> {
        let query = format!(
            "SELECT sid, tid, name, stylesheet, cachefile, lastmodified \
             FROM {} WHERE tid = ? AND name = ?",
            self.table("themestylesheets"),
        );
        let row = sqlx::query(&query).bind(tid).bind(name).fetch_optional(&self.pool).await?;

        row.as_ref().map(Self::stylesheet_from_row).transpose()
    }

    async fn import_stylesheet(&self, tid: i64, name: &str, css: &str) -> Result<ImportAction> {
        let stylesheets = self.table("themestylesheets");
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(&format!(
            "SELECT sid FROM {stylesheets} WHERE tid = ? AND name = ?"
        ))
        .bind(tid)
        .bind(name)
        .fetch_optional(&mut *tx)
        .await?;

        let action = if let Some(row) = existing {
            let sid: i64 = row.try_get("sid")?;
            sqlx::query(&format!(
                "UPDATE {stylesheets} SET stylesheet = ?, lastmodified = ? WHERE sid = ?"
            ))
            .bind(css)
            .bind(now)
            .bind(sid)
            .execute(&mut *tx)
            .await?;
            ImportAction::Updated
        } else {
            sqlx::query(&format!(
                "INSERT INTO {stylesheets} (name, tid, attachedto, stylesheet, cachefile, lastmodified) \
                 VALUES (?, ?, '', ?, ?, ?)"
            ))
            .bind(name)
            .bind(tid)
            .bind(css)
            .bind(name)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            ImportAction::Inserted
        };

        tx.commit().await?;
        Ok(action)
    }
}


#[cfg(test)]
mod tests {
    use super::{memory::MemoryDb, *};

    #[tokio::test]
    async fn test_templates_in_set_overlays_master() {
        let db = MemoryDb::new();
        let sid = db.add_template_set("Default Templates");
        db.add_template(MASTER_SID, "index", "<master index>", "1828");
        db.add_template(MASTER_SID, "header", "<master header>", "1828");
        db.add_template(sid, "index", "<custom index>", "1828");

        let rows = db.templates_in_set(sid).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "header");
        assert_eq!(rows[0].template, "<master header>");
        assert_eq!(rows[1].title, "index");
        assert_eq!(rows[1].template, "<custom index>");
    }

    #[tokio::test]
    async fn test_template_in_set_prefers_custom() {
        let db = MemoryDb::new();
        let sid = db.add_template_set("Default Templates");
        db.add_template(MASTER_SID, "index", "<master>", "1828");
        db.add_template(sid, "index", "<custom>", "1828");

        let row = db.template_in_set(sid, "index").await.unwrap().unwrap();
        assert_eq!(row.template, "<custom>");

        let fallback = db.template_in_set(sid, "header").await.unwrap();
        assert!(fallback.is_none());
    }

    #[tokio::test]
    async fn test_import_template_inherits_master_version() {
        let db = MemoryDb::new();
        let sid = db.add_template_set("Default Templates");
        db.add_template(MASTER_SID, "index", "<master>", "1828");

        let action = db.import_template(sid, "index", "<edited>").await.unwrap();
        assert_eq!(action, ImportAction::Inserted);

        let row = db.template(sid, "index").unwrap();
        assert_eq!(row.version, "1828");
        assert_eq!(row.template, "<edited>");
    }

    #[tokio::test]
    async fn test_import_template_defaults_version_without_master() {
        let db = MemoryDb::new();
        let sid = db.add_template_set("Default Templates");

        let action = db.import_template(sid, "my_template", "<body>").await.unwrap();
        assert_eq!(action, ImportAction::Inserted);
        assert_eq!(db.template(sid, "my_template").unwrap().version, DEFAULT_TEMPLATE_VERSION);
    }

    #[tokio::test]
    async fn test_import_stylesheet_upserts() {
        let db = MemoryDb::new();
        let tid = db.add_theme("Default");

        let action = db.import_stylesheet(tid, "global.css", "body {}").await.unwrap();
        assert_eq!(action, ImportAction::Inserted);
        let row = db.stylesheet(tid, "global.css").unwrap();
        assert_eq!(row.cachefile, "global.css");

        let action = db.import_stylesheet(tid, "global.css", "body { margin: 0 }").await.unwrap();
        assert_eq!(action, ImportAction::Updated);
        assert_eq!(db.stylesheet(tid, "global.css").unwrap().stylesheet, "body { margin: 0 }");
    }
}
