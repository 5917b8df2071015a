// Installed-plugin descriptions and the introspection JSON shape

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::warn;

/// One command a plugin declares it can run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginCommand {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub usage: String,

    /// Flag name -> help text
    #[serde(default)]
    pub flags: HashMap<String, String>,
}

/// A locally installed plugin as the manager knows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,

    pub version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub commands: Vec<PluginCommand>,

    /// On-disk path of the executable; filled in by discovery
    #[serde(skip)]
    pub path: PathBuf,

    /// True when introspection output could not be parsed and this
    /// record was synthesized from the file name
    #[serde(skip)]
    pub fallback: bool,
}

impl PluginInfo {
    /// Parse a plugin's introspection output, synthesizing a fallback
    /// record when the output is not valid JSON. The fallback keeps a
    /// broken plugin visible instead of dropping it from discovery.
    pub fn from_introspection(name: &str, path: PathBuf, stdout: &[u8]) -> Self {
        match serde_json::from_slice::<PluginInfo>(stdout) {
            Ok(mut info) => {
                if info.name.is_empty() {
                    info.name = name.to_string();
                }
                info.path = path;
                info
            }
            Err(e) => {
                warn!(
                    plugin = name,
                    error = %e,
                    "introspection output is not valid plugin JSON, registering with fallback metadata"
                );
                Self::fallback(name, path)
            }
        }
    }

    /// Synthesized description for a plugin that failed introspection.
    pub fn fallback(name: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            version: "unknown".to_string(),
            description: format!("{name} (no metadata)"),
            commands: Vec::new(),
            path,
            fallback: true,
        }
    }

    /// Look up a declared command by name.
    pub fn command(&self, name: &str) -> Option<&PluginCommand> {
        self.commands.iter().find(|command| command.name == name)
    }
}
