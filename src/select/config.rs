// Static selection configuration (priorities, platforms, dependencies)
//
// Loaded once at Selector construction from the first candidate path
// that exists, falling back to a minimal built-in default. A user-level
// override document may be merged in on top.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name prefixes with structural meaning in the plugin namespace.
pub const PACKAGE_MANAGER_PREFIX: &str = "package-manager-";
pub const DESKTOP_PREFIX: &str = "desktop-";
pub const TOOL_PREFIX: &str = "tool-";

/// Top-level selection configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginConfig {
    #[serde(default)]
    pub priorities: Priorities,

    /// platform -> distribution -> rules; the "default" distribution
    /// key applies when the detected distribution has no entry
    #[serde(default)]
    pub platforms: HashMap<String, HashMap<String, PlatformRules>>,

    /// plugin name -> dependency declaration
    #[serde(default)]
    pub dependencies: HashMap<String, DependencySpec>,

    #[serde(default)]
    pub selection: SelectionRules,

    #[serde(default)]
    pub overrides: UserOverrides,
}

/// Priority tables. Higher wins.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Priorities {
    /// package-manager name (without prefix) -> priority
    #[serde(default)]
    pub package_managers: HashMap<String, i32>,

    /// desktop-environment name (without prefix) -> priority
    #[serde(default)]
    pub desktops: HashMap<String, i32>,
}

/// Per-platform/per-distribution plugin lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformRules {
    #[serde(default)]
    pub required: Vec<String>,

    #[serde(default)]
    pub optional: Vec<String>,

    /// Whether a detected desktop environment contributes a
    /// synthesized `desktop-<name>` plugin on this platform
    #[serde(default)]
    pub desktop_aware: bool,
}

/// Declared relations of one plugin.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DependencySpec {
    #[serde(default)]
    pub requires: Vec<String>,

    #[serde(default)]
    pub conflicts: Vec<String>,
}

/// Knobs applied during the prioritize-and-filter step.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionRules {
    /// Cap on package-manager plugins after priority sorting
    #[serde(default = "default_max_package_managers")]
    pub max_package_managers: usize,

    /// Whether desktop-prefixed candidates survive filtering
    #[serde(default = "default_true")]
    pub include_desktop: bool,

    /// Names re-added after every filtering step
    #[serde(default)]
    pub always_include: Vec<String>,

    /// Names never selected unless explicitly included by the user
    #[serde(default)]
    pub never_auto_select: Vec<String>,
}

fn default_max_package_managers() -> usize {
    2
}

fn default_true() -> bool {
    true
}

impl Default for SelectionRules {
    fn default() -> Self {
        Self {
            max_package_managers: default_max_package_managers(),
            include_desktop: true,
            always_include: Vec::new(),
            never_auto_select: Vec::new(),
        }
    }
}

/// User-level selection overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserOverrides {
    /// Preferred package manager (without prefix); when its plugin is
    /// a candidate, all other package managers are dropped
    #[serde(default)]
    pub preferred_package_manager: Option<String>,

    /// Plugin names removed from the candidate set
    #[serde(default)]
    pub excluded: Vec<String>,

    /// Plugin names added to the candidate set
    #[serde(default)]
    pub included: Vec<String>,
}

impl PluginConfig {
    /// Load configuration from the first candidate path that exists,
    /// merge user overrides, and fall back to the built-in default.
    pub fn load() -> Self {
        let mut config = Self::load_static();
        if let Some(path) = user_override_path() {
            config.merge_user_overrides(&path);
        }
        config
    }

    fn load_static() -> Self {
        for path in candidate_paths() {
            if !path.is_file() {
                continue;
            }
            match Self::from_file(&path) {
                Ok(config) => {
                    debug!(path = %path.display(), "loaded selection config");
                    return config;
                }
                Err(reason) => {
                    warn!(path = %path.display(), %reason, "ignoring unreadable selection config");
                }
            }
        }
        debug!("no selection config found, using built-in default");
        Self::builtin_default()
    }

    /// Parse a configuration document from a file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        Self::from_str(&contents)
    }

    /// Parse a configuration document from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|e| e.to_string())
    }

    /// Merge a user override document on top of this config.
    pub fn merge_user_overrides(&mut self, path: &Path) {
        if !path.is_file() {
            return;
        }
        #[derive(Deserialize)]
        struct OverrideDoc {
            #[serde(default)]
            overrides: UserOverrides,
        }
        match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|s| toml::from_str::<OverrideDoc>(&s).map_err(|e| e.to_string()))
        {
            Ok(doc) => {
                let user = doc.overrides;
                if user.preferred_package_manager.is_some() {
                    self.overrides.preferred_package_manager = user.preferred_package_manager;
                }
                self.overrides.excluded.extend(user.excluded);
                self.overrides.included.extend(user.included);
                debug!(path = %path.display(), "merged user overrides");
            }
            Err(reason) => {
                warn!(path = %path.display(), %reason, "ignoring unreadable user overrides");
            }
        }
    }

    /// Rules for a platform/distribution pair, falling back to the
    /// platform's "default" entry.
    pub fn platform_rules(&self, os: &str, distribution: &str) -> Option<&PlatformRules> {
        let by_distro = self.platforms.get(os)?;
        by_distro
            .get(distribution)
            .or_else(|| by_distro.get("default"))
    }

    /// Configured priority of a package manager, by plugin name.
    pub fn package_manager_priority(&self, plugin_name: &str) -> i32 {
        plugin_name
            .strip_prefix(PACKAGE_MANAGER_PREFIX)
            .and_then(|name| self.priorities.package_managers.get(name))
            .copied()
            .unwrap_or(0)
    }

    /// Configured priority of a desktop environment, by plugin name.
    pub fn desktop_priority(&self, plugin_name: &str) -> i32 {
        plugin_name
            .strip_prefix(DESKTOP_PREFIX)
            .and_then(|name| self.priorities.desktops.get(name))
            .copied()
            .unwrap_or(0)
    }

    /// Minimal default used when no configuration file is present.
    pub fn builtin_default() -> Self {
        const BUILTIN: &str = r#"
[priorities.package_managers]
apt = 90
dnf = 80
pacman = 80
zypper = 70
brew = 90

[priorities.desktops]
gnome = 50
kde = 50

[platforms.linux.ubuntu]
required = ["package-manager-apt", "tool-git"]
desktop_aware = true

[platforms.linux.debian]
required = ["package-manager-apt", "tool-git"]
desktop_aware = true

[platforms.linux.fedora]
required = ["package-manager-dnf", "tool-git"]
desktop_aware = true

[platforms.linux.arch]
required = ["package-manager-pacman", "tool-git"]
desktop_aware = true

[platforms.linux.default]
required = ["tool-git"]
desktop_aware = true

[platforms.darwin.default]
required = ["package-manager-brew", "tool-git"]

[dependencies."tool-git"]
requires = []

[selection]
max_package_managers = 2
include_desktop = true
"#;
        // The built-in document is a compile-time constant; a parse
        // failure here is a programming error caught by tests.
        Self::from_str(BUILTIN).unwrap_or_default()
    }
}

/// Candidate config paths, searched in order.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("devstrap.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("devstrap").join("config.toml"));
    }
    paths.push(PathBuf::from("/etc/devstrap/config.toml"));
    paths
}

fn user_override_path() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("devstrap").join("overrides.toml"))
}
