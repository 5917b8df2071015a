// Installed-plugin manager - discovery, install, remove, dispatch

pub mod info;

pub use info::{PluginCommand, PluginInfo};

use crate::error::ExecError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// File-name prefix every plugin executable carries.
pub const PLUGIN_PREFIX: &str = "devstrap-plugin-";

/// Flag a plugin answers with its JSON self-description.
pub const INTROSPECT_FLAG: &str = "--plugin-info";

/// Default bound on an introspection subprocess call.
const INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// File name of a plugin executable under the naming convention.
pub fn plugin_file_name(name: &str) -> String {
    format!("{PLUGIN_PREFIX}{name}{}", std::env::consts::EXE_SUFFIX)
}

/// Full path of a plugin executable inside a plugin directory.
pub fn plugin_file_path(plugin_dir: &Path, name: &str) -> PathBuf {
    plugin_dir.join(plugin_file_name(name))
}

/// Plugin name encoded in a file name, if it follows the convention.
pub fn plugin_name_from_file(file_name: &str) -> Option<&str> {
    let rest = file_name.strip_prefix(PLUGIN_PREFIX)?;
    let suffix = std::env::consts::EXE_SUFFIX;
    let name = if suffix.is_empty() {
        rest
    } else {
        rest.strip_suffix(suffix)?
    };
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Discovers installed plugin binaries, interrogates them over the
/// introspection protocol, and dispatches commands to them.
pub struct ExecutableManager {
    plugin_dir: PathBuf,
    plugins: HashMap<String, PluginInfo>,
    introspection_timeout: Duration,
}

impl ExecutableManager {
    pub fn new(plugin_dir: PathBuf) -> Self {
        Self {
            plugin_dir,
            plugins: HashMap::new(),
            introspection_timeout: INTROSPECTION_TIMEOUT,
        }
    }

    /// Override the introspection subprocess timeout.
    pub fn with_introspection_timeout(mut self, timeout: Duration) -> Self {
        self.introspection_timeout = timeout;
        self
    }

    /// The directory this manager scans.
    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Scan the plugin directory and (re)populate the registry.
    ///
    /// A single bad plugin is skipped with a warning; discovery itself
    /// only fails on directory-level I/O errors.
    pub async fn discover_plugins(&mut self) -> Result<(), ExecError> {
        tokio::fs::create_dir_all(&self.plugin_dir).await?;
        self.plugins.clear();

        let mut entries = tokio::fs::read_dir(&self.plugin_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = plugin_name_from_file(&file_name.to_string_lossy()).map(String::from)
            else {
                debug!(file = %path.display(), "ignoring non-plugin file");
                continue;
            };

            match self.introspect(&name, &path).await {
                Ok(plugin) => {
                    debug!(plugin = %name, version = %plugin.version, "discovered plugin");
                    self.plugins.insert(name, plugin);
                }
                Err(e) => {
                    warn!(plugin = %name, error = %e, "skipping undiscoverable plugin");
                }
            }
        }

        info!(count = self.plugins.len(), "plugin discovery complete");
        Ok(())
    }

    /// Installed plugins by name.
    pub fn list_plugins(&self) -> &HashMap<String, PluginInfo> {
        &self.plugins
    }

    /// A single installed plugin, if known.
    pub fn plugin(&self, name: &str) -> Option<&PluginInfo> {
        self.plugins.get(name)
    }

    /// Copy a plugin executable into the plugin directory under the
    /// naming convention and register it.
    pub async fn install_plugin(&mut self, source: &Path, name: &str) -> Result<(), ExecError> {
        tokio::fs::create_dir_all(&self.plugin_dir).await?;
        let target = plugin_file_path(&self.plugin_dir, name);
        tokio::fs::copy(source, &target).await?;
        set_executable(&target)?;

        let plugin = self.introspect(name, &target).await?;
        info!(plugin = name, path = %target.display(), "plugin installed");
        self.plugins.insert(name.to_string(), plugin);
        Ok(())
    }

    /// Delete a plugin's executable and forget it.
    pub async fn remove_plugin(&mut self, name: &str) -> Result<(), ExecError> {
        let plugin = self
            .plugins
            .remove(name)
            .ok_or_else(|| ExecError::NotInstalled(name.to_string()))?;

        match tokio::fs::remove_file(&plugin.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(plugin = name, "plugin file already gone, forgetting entry");
            }
            Err(e) => return Err(e.into()),
        }
        info!(plugin = name, "plugin removed");
        Ok(())
    }

    /// Run an installed plugin with the given arguments, stdio
    /// inherited. Plugin commands are interactive; nothing is captured.
    pub async fn execute_plugin(&self, name: &str, args: &[String]) -> Result<(), ExecError> {
        let plugin = self
            .plugins
            .get(name)
            .ok_or_else(|| ExecError::NotInstalled(name.to_string()))?;

        debug!(plugin = name, ?args, "executing plugin");
        let status = Command::new(&plugin.path)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;

        if status.success() {
            return Ok(());
        }
        match status.code() {
            Some(code) => Err(ExecError::CommandFailed {
                name: name.to_string(),
                code,
            }),
            None => Err(ExecError::Terminated {
                name: name.to_string(),
            }),
        }
    }

    /// Ask one executable to describe itself.
    ///
    /// Malformed JSON still registers the plugin, with synthesized
    /// fallback metadata; only spawn failures and timeouts are errors.
    async fn introspect(&self, name: &str, path: &Path) -> Result<PluginInfo, ExecError> {
        let output = tokio::time::timeout(
            self.introspection_timeout,
            Command::new(path)
                .arg(INTROSPECT_FLAG)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ExecError::IntrospectionTimeout {
            name: name.to_string(),
            seconds: self.introspection_timeout.as_secs(),
        })??;

        if !output.status.success() {
            warn!(
                plugin = name,
                status = %output.status,
                "introspection exited non-zero, registering with fallback metadata"
            );
            return Ok(PluginInfo::fallback(name, path.to_path_buf()));
        }

        Ok(PluginInfo::from_introspection(
            name,
            path.to_path_buf(),
            &output.stdout,
        ))
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
