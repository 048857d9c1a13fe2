//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap. The CLI is a thin
//! shell over the library; all behaviour lives in the sync core.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Forumsync disk/database synchronisation CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Config file name (default: forumsync.toml)
    #[arg(short = 'C', long, default_value = "forumsync.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the sync service and watch the sync root until interrupted
    Sync,

    /// Export database rows to files under the sync root
    Export {
        #[command(subcommand)]
        target: ExportTarget,
    },

    /// Print the sync service configuration and watcher state
    Status,

    /// Drive the forum-side plugin lifecycle
    Plugin {
        #[command(subcommand)]
        action: PluginAction,
    },

    /// Drive the forum-side theme lifecycle
    Theme {
        #[command(subcommand)]
        action: ThemeAction,
    },
}

/// Export targets
#[derive(Subcommand, Debug, Clone)]
pub enum ExportTarget {
    /// Export a template set as group directories of .html files
    Templates {
        /// Name of the template set, e.g. "Default Templates"
        set_name: String,
    },

    /// Export a theme's stylesheets
    Stylesheets {
        /// Name of the theme, e.g. "Default"
        theme_name: String,
    },
}

/// Plugin lifecycle actions
#[derive(Subcommand, Debug, Clone)]
pub enum PluginAction {
    /// Install a plugin workspace into the forum
    Install {
        /// Workspace codename
        codename: String,

        /// Workspace visibility: "public" or "private"
        #[arg(long)]
        visibility: Option<String>,
    },

    /// Activate an installed plugin
    Activate { codename: String },

    /// Deactivate an active plugin
    Deactivate { codename: String },

    /// Uninstall a plugin from the forum
    Uninstall { codename: String },
}

/// Theme lifecycle actions
#[derive(Subcommand, Debug, Clone)]
pub enum ThemeAction {
    /// Install a theme workspace into the forum
    Install {
        /// Workspace codename
        codename: String,

        /// Workspace visibility: "public" or "private"
        #[arg(long)]
        visibility: Option<String>,
    },

    /// Uninstall a theme from the forum
    Uninstall { codename: String },
}

#[allow(unused)]
impl Cli {
    pub const fn is_sync(&self) -> bool {
        matches!(self.command, Commands::Sync)
    }
    pub const fn is_export(&self) -> bool {
        matches!(self.command, Commands::Export { .. })
    }
    pub const fn is_status(&self) -> bool {
        matches!(self.command, Commands::Status)
    }
}
