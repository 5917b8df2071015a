// CLI commands for plugin management

use crate::download::{Downloader, RegistrySnapshot};
use crate::exec::ExecutableManager;
use crate::registry::{RegistryClient, RegistryConfig};
use crate::select::{HostPlatform, PlatformDetector, PluginConfig, Selector};
use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Plugin engine subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute the plugin selection for this machine
    Select {
        /// Registry base URL (default: https://registry.devstrap.dev)
        #[arg(long)]
        registry: Option<String>,
    },

    /// Select, download, and verify all required plugins
    Sync {
        /// Plugin directory (default: ~/.devstrap/plugins)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Registry base URL
        #[arg(long)]
        registry: Option<String>,
    },

    /// Download one plugin from the registry
    Install {
        /// Plugin name (e.g. tool-git)
        name: String,

        /// Plugin directory (default: ~/.devstrap/plugins)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Registry base URL
        #[arg(long)]
        registry: Option<String>,
    },

    /// List installed plugins
    List {
        /// Plugin directory (default: ~/.devstrap/plugins)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Remove an installed plugin
    Remove {
        /// Plugin name to remove
        name: String,

        /// Plugin directory (default: ~/.devstrap/plugins)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Run an installed plugin
    Run {
        /// Plugin name
        name: String,

        /// Arguments passed through to the plugin
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Plugin directory (default: ~/.devstrap/plugins)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Search the registry snapshot for plugins
    Search {
        /// Search query
        query: String,

        /// Registry base URL
        #[arg(long)]
        registry: Option<String>,
    },
}

impl Commands {
    /// Execute the subcommand.
    pub async fn run(self) -> Result<()> {
        match self {
            Commands::Select { registry } => Self::select_cmd(registry).await,
            Commands::Sync { dir, registry } => Self::sync_cmd(dir, registry).await,
            Commands::Install {
                name,
                dir,
                registry,
            } => Self::install_cmd(name, dir, registry).await,
            Commands::List { dir } => Self::list_cmd(dir).await,
            Commands::Remove { name, dir } => Self::remove_cmd(name, dir).await,
            Commands::Run { name, args, dir } => Self::run_cmd(name, args, dir).await,
            Commands::Search { query, registry } => Self::search_cmd(query, registry).await,
        }
    }

    async fn select_cmd(registry: Option<String>) -> Result<()> {
        let client = registry_client(registry)?;
        let selector = Selector::new(PluginConfig::load(), client, Arc::new(HostPlatform));
        let selection = selector.select_plugins(&CancellationToken::new()).await?;

        if selection.is_empty() {
            println!("No plugins selected for this platform.");
        } else {
            println!("Selected plugins ({}):", selection.len());
            for name in selection {
                println!("  - {name}");
            }
        }
        Ok(())
    }

    async fn sync_cmd(dir: Option<PathBuf>, registry: Option<String>) -> Result<()> {
        let client = registry_client(registry)?;
        let cancel = CancellationToken::new();
        let platform = HostPlatform.detect();

        let selector = Selector::new(PluginConfig::load(), client.clone(), Arc::new(HostPlatform));
        let selection = selector.select_plugins(&cancel).await?;
        println!("Syncing {} plugin(s)...", selection.len());

        let snapshot = RegistrySnapshot::load_or_refresh(
            &snapshot_path(),
            client.as_ref(),
            &platform.os,
            &platform.distribution,
            &cancel,
        )
        .await?;

        let plugin_dir = dir.unwrap_or_else(default_plugin_dir);
        let downloader = Downloader::new(plugin_dir.clone(), platform.platform_key());
        downloader.download_required(&snapshot, &selection).await;

        let mut manager = ExecutableManager::new(plugin_dir);
        manager.discover_plugins().await?;
        println!("✓ {} plugin(s) installed", manager.list_plugins().len());
        Ok(())
    }

    async fn install_cmd(
        name: String,
        dir: Option<PathBuf>,
        registry: Option<String>,
    ) -> Result<()> {
        let client = registry_client(registry)?;
        let cancel = CancellationToken::new();
        let platform = HostPlatform.detect();

        let snapshot = RegistrySnapshot::load_or_refresh(
            &snapshot_path(),
            client.as_ref(),
            &platform.os,
            &platform.distribution,
            &cancel,
        )
        .await?;

        let plugin_dir = dir.unwrap_or_else(default_plugin_dir);
        let downloader = Downloader::new(plugin_dir, platform.platform_key());
        downloader.download_plugin(&snapshot, &name).await?;

        println!("✓ Plugin '{name}' installed");
        Ok(())
    }

    async fn list_cmd(dir: Option<PathBuf>) -> Result<()> {
        let plugin_dir = dir.unwrap_or_else(default_plugin_dir);
        let mut manager = ExecutableManager::new(plugin_dir);
        manager.discover_plugins().await?;

        let plugins = manager.list_plugins();
        if plugins.is_empty() {
            println!("No plugins installed.");
            return Ok(());
        }

        let mut names: Vec<&String> = plugins.keys().collect();
        names.sort();
        println!("Installed plugins ({}):", names.len());
        for name in names {
            let plugin = &plugins[name];
            let note = if plugin.fallback { " (no metadata)" } else { "" };
            println!("  {} v{}{}", plugin.name, plugin.version, note);
        }
        Ok(())
    }

    async fn remove_cmd(name: String, dir: Option<PathBuf>) -> Result<()> {
        let plugin_dir = dir.unwrap_or_else(default_plugin_dir);
        let mut manager = ExecutableManager::new(plugin_dir);
        manager.discover_plugins().await?;
        manager.remove_plugin(&name).await?;
        println!("✓ Plugin '{name}' removed");
        Ok(())
    }

    async fn run_cmd(name: String, args: Vec<String>, dir: Option<PathBuf>) -> Result<()> {
        let plugin_dir = dir.unwrap_or_else(default_plugin_dir);
        let mut manager = ExecutableManager::new(plugin_dir);
        manager.discover_plugins().await?;
        manager.execute_plugin(&name, &args).await?;
        Ok(())
    }

    async fn search_cmd(query: String, registry: Option<String>) -> Result<()> {
        let client = registry_client(registry)?;
        let cancel = CancellationToken::new();
        let platform = HostPlatform.detect();

        let snapshot = RegistrySnapshot::load_or_refresh(
            &snapshot_path(),
            client.as_ref(),
            &platform.os,
            &platform.distribution,
            &cancel,
        )
        .await?;

        let downloader = Downloader::new(default_plugin_dir(), platform.platform_key());
        let results = downloader.search_plugins(&snapshot, &query);

        if results.is_empty() {
            println!("No plugins found for '{query}'.");
            return Ok(());
        }

        let mut names: Vec<&String> = results.keys().collect();
        names.sort();
        println!("Found {} plugin(s) for '{query}':", names.len());
        for name in names {
            let plugin = &results[name];
            println!("  {} v{} - {}", plugin.name, plugin.version, plugin.description);
        }
        Ok(())
    }
}

fn registry_client(base_url: Option<String>) -> Result<Arc<RegistryClient>> {
    let client = match base_url {
        Some(base_url) => RegistryClient::with_config(RegistryConfig {
            base_url,
            ..Default::default()
        })?,
        None => RegistryClient::new()?,
    };
    Ok(Arc::new(client))
}

fn devstrap_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".devstrap")
}

fn default_plugin_dir() -> PathBuf {
    devstrap_home().join("plugins")
}

fn snapshot_path() -> PathBuf {
    devstrap_home().join("cache").join("registry.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_live_under_devstrap_home() {
        assert!(default_plugin_dir().ends_with(".devstrap/plugins"));
        assert!(snapshot_path().ends_with(".devstrap/cache/registry.json"));
    }

    #[test]
    fn registry_client_rejects_bad_override() {
        assert!(registry_client(Some("http://registry.devstrap.dev".to_string())).is_err());
        assert!(registry_client(None).is_ok());
    }
}
