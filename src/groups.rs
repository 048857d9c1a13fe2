//! Template group resolution.
//!
//! The forum's admin UI clusters templates into prefix groups
//! (`forumdisplay_*`, `postbit_*`, ...). The resolver assigns each template
//! title to exactly one group directory so exports land in a stable layout.

/// Reserved directory for titles no group prefix matches
pub const UNGROUPED: &str = "ungrouped";

/// The forum's conventional prefix group catalogue.
///
/// Mirrors the groups the admin template editor shows for a stock install.
const DEFAULT_GROUPS: &[&str] = &[
    "announcement",
    "attachment",
    "calendar",
    "changeuserbox",
    "codebuttons",
    "debug",
    "editpost",
    "error",
    "footer",
    "forumbit",
    "forumdisplay",
    "forumjump",
    "global",
    "header",
    "headerinclude",
    "index",
    "managegroup",
    "member",
    "memberlist",
    "misc",
    "modcp",
    "moderation",
    "multipage",
    "mycode",
    "nav",
    "newreply",
    "newthread",
    "online",
    "polls",
    "portal",
    "post",
    "postbit",
    "posticons",
    "printthread",
    "private",
    "redirect",
    "report",
    "reputation",
    "search",
    "sendthread",
    "showteam",
    "showthread",
    "smilieinsert",
    "stats",
    "task",
    "usercp",
    "video",
    "warning",
    "xmlhttp",
];

/// Assigns template titles to prefix groups.
///
/// Pure and idempotent: the same title always resolves to the same group.
#[derive(Debug, Clone)]
pub struct GroupResolver {
    /// Known group names, sorted for a stable iteration order
    groups: Vec<String>,
}

impl GroupResolver {
    /// Resolver over an explicit group catalogue.
    pub fn new(groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut groups: Vec<String> = groups.into_iter().map(Into::into).collect();
        groups.sort();
        groups.dedup();
        Self { groups }
    }

    /// Resolver over the stock forum group catalogue.
    pub fn with_default_groups() -> Self {
        Self::new(DEFAULT_GROUPS.iter().copied())
    }

    /// Resolve the single group a template title belongs to.
    ///
    /// Longest-prefix match wins; on equal length the lexicographically
    /// smaller group is kept (a tie means one group name is a prefix of
    /// another, degenerate but representable). Titles matching no group
    /// land in [`UNGROUPED`].
    pub fn resolve(&self, title: &str) -> &str {
        let mut best: Option<&str> = None;
        for group in &self.groups {
            if !Self::matches(group, title) {
                continue;
            }
            // Sorted input makes the first match of a given length the
            // lexicographic winner, so a strict `>` keeps it.
            if best.is_none_or(|b| group.len() > b.len()) {
                best = Some(group);
            }
        }
        best.unwrap_or(UNGROUPED)
    }

    /// A group matches a title that equals it or continues it with `_`.
    fn matches(group: &str, title: &str) -> bool {
        title == group
            || (title.starts_with(group) && title.as_bytes().get(group.len()) == Some(&b'_'))
    }
}

impl Default for GroupResolver {
    fn default() -> Self {
        Self::with_default_groups()
    }
}
