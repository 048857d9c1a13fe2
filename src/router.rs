//! Path routing between logical sync keys and disk paths.
//!
//! The router is a pure bijection over the sync root:
//!
//! ```text
//! {sync_root}/template_sets/{set_name}/{group}/{title}.html
//! {sync_root}/styles/{theme_name}/{stylesheet_name}
//! ```
//!
//! Parsing a path back recovers the key exactly as it was built; anything
//! outside the layout is `NotRoutable` and watchers ignore it.

use crate::error::{Result, SyncError};
use std::path::{Component, Path, PathBuf};

/// Directory under the sync root holding template sets
pub const TEMPLATE_SETS_DIR: &str = "template_sets";

/// Directory under the sync root holding theme stylesheets
pub const STYLES_DIR: &str = "styles";

/// A logical entity addressed by the sync layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteKey {
    Template {
        set_name: String,
        /// Group directory the file sits in. On import this decides nothing
        /// about the DB row; the title alone identifies the template.
        group: String,
        title: String,
    },
    Stylesheet {
        theme_name: String,
        /// Full file name including the `.css` suffix, exactly as exported
        name: String,
    },
}

/// Pure mapping between logical keys and disk paths under a sync root.
#[derive(Debug, Clone)]
pub struct PathRouter {
    sync_root: PathBuf,
}

impl PathRouter {
    pub fn new(sync_root: impl Into<PathBuf>) -> Self {
        Self { sync_root: sync_root.into() }
    }

    /// Root of the disk mirror this router serves.
    pub fn sync_root(&self) -> &Path {
        &self.sync_root
    }

    /// Disk path of a template within a set and group.
    pub fn template_path(&self, set_name: &str, group: &str, title: &str) -> PathBuf {
        self.sync_root
            .join(TEMPLATE_SETS_DIR)
            .join(set_name)
            .join(group)
            .join(format!("{title}.html"))
    }

    /// Disk path of a theme stylesheet. `name` keeps its suffix.
    pub fn stylesheet_path(&self, theme_name: &str, name: &str) -> PathBuf {
        self.sync_root.join(STYLES_DIR).join(theme_name).join(name)
    }

    /// Parse a disk path back into its logical key.
    ///
    /// Returns `NotRoutable` for paths outside the sync root, with too few
    /// or too many segments, or with a suffix other than `.html`/`.css`.
    pub fn route(&self, path: &Path) -> Result<RouteKey> {
        let relative = path
            .strip_prefix(&self.sync_root)
            .map_err(|_| SyncError::NotRoutable(path.to_path_buf()))?;

        let segments: Vec<&str> = relative
            .components()
            .map(|c| match c {
                Component::Normal(s) => s.to_str().ok_or(()),
                _ => Err(()),
            })
            .collect::<std::result::Result<_, _>>()
            .map_err(|()| SyncError::NotRoutable(path.to_path_buf()))?;

        match segments.as_slice() {
            [TEMPLATE_SETS_DIR, set_name, group, file] => {
                let title = file
                    .strip_suffix(".html")
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| SyncError::NotRoutable(path.to_path_buf()))?;
                Ok(RouteKey::Template {
                    set_name: (*set_name).to_owned(),
                    group: (*group).to_owned(),
                    title: title.to_owned(),
                })
            }
            [STYLES_DIR, theme_name, file] => {
                if !file.ends_with(".css") || *file == ".css" {
                    return Err(SyncError::NotRoutable(path.to_path_buf()));
                }
                Ok(RouteKey::Stylesheet {
                    theme_name: (*theme_name).to_owned(),
                    name: (*file).to_owned(),
                })
            }
            _ => Err(SyncError::NotRoutable(path.to_path_buf())),
        }
    }

    /// Rebuild the disk path of a key. Inverse of [`route`](Self::route).
    pub fn build(&self, key: &RouteKey) -> PathBuf {
        match key {
            RouteKey::Template { set_name, group, title } => {
                self.template_path(set_name, group, title)
            }
            RouteKey::Stylesheet { theme_name, name } => {
                self.stylesheet_path(theme_name, name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> PathRouter {
        PathRouter::new("/srv/sync")
    }

    #[test]
    fn test_template_path_layout() {
        let path = router().template_path("Default Templates", "header", "header_welcomeblock");
        assert_eq!(
            path,
            PathBuf::from("/srv/sync/template_sets/Default Templates/header/header_welcomeblock.html")
        );
    }

    #[test]
    fn test_stylesheet_path_keeps_suffix() {
        let path = router().stylesheet_path("Default", "global.css");
        assert_eq!(path, PathBuf::from("/srv/sync/styles/Default/global.css"));
    }

    #[test]
    fn test_route_template() {
        let key = router()
            .route(Path::new("/srv/sync/template_sets/Default Templates/header/welcome.html"))
            .unwrap();
        assert_eq!(
            key,
            RouteKey::Template {
                set_name: "Default Templates".into(),
                group: "header".into(),
                title: "welcome".into(),
            }
        );
    }

    #[test]
    fn test_route_stylesheet() {
        let key = router().route(Path::new("/srv/sync/styles/Default/global.css")).unwrap();
        assert_eq!(
            key,
            RouteKey::Stylesheet { theme_name: "Default".into(), name: "global.css".into() }
        );
    }

    #[test]
    fn test_route_outside_sync_root() {
        let err = router().route(Path::new("/tmp/other/global.css")).unwrap_err();
        assert_eq!(err.kind(), "NotRoutable");
    }

    #[test]
    fn test_route_too_few_segments() {
        assert!(router().route(Path::new("/srv/sync/template_sets/Default/a.html")).is_err());
        assert!(router().route(Path::new("/srv/sync/styles/global.css")).is_err());
    }

    #[test]
    fn test_route_too_many_segments() {
        let path = Path::new("/srv/sync/template_sets/Default/header/extra/welcome.html");
        assert!(router().route(path).is_err());
    }

    #[test]
    fn test_route_wrong_suffix() {
        assert!(router().route(Path::new("/srv/sync/template_sets/Default/header/a.txt")).is_err());
        assert!(router().route(Path::new("/srv/sync/styles/Default/global.scss")).is_err());
        // atomic-write staging files must never route
        assert!(router().route(Path::new("/srv/sync/styles/Default/global.css.tmp")).is_err());
    }

    #[test]
    fn test_route_unknown_top_directory() {
        assert!(router().route(Path::new("/srv/sync/cache/Default/global.css")).is_err());
    }

    #[test]
    fn test_bijection_on_keys() {
        let r = router();
        let keys = [
            RouteKey::Template {
                set_name: "Default Templates".into(),
                group: "forumdisplay".into(),
                title: "forumdisplay_threadlist".into(),
            },
            RouteKey::Template {
                set_name: "My Set".into(),
                group: "ungrouped".into(),
                title: "welcome".into(),
            },
            RouteKey::Stylesheet { theme_name: "Default".into(), name: "usercp.css".into() },
        ];
        for key in keys {
            assert_eq!(r.route(&r.build(&key)).unwrap(), key);
        }
    }

    #[test]
    fn test_bijection_on_paths() {
        let r = router();
        let paths = [
            "/srv/sync/template_sets/Default Templates/postbit/postbit_author.html",
            "/srv/sync/styles/Modern/global.css",
        ];
        for path in paths {
            let path = Path::new(path);
            assert_eq!(r.build(&r.route(path).unwrap()), path);
        }
    }
}
