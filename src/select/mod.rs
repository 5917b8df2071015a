// Plugin selection - computes the plugin set for the current machine

pub mod config;
pub mod platform;

pub use config::{PluginConfig, DESKTOP_PREFIX, PACKAGE_MANAGER_PREFIX, TOOL_PREFIX};
pub use platform::{DetectedPlatform, HostPlatform, PlatformDetector};

use crate::error::SelectError;
use crate::registry::CatalogSource;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on dependency-resolution passes. Exhausting it while
/// still adding plugins is surfaced as a likely cycle.
const MAX_RESOLUTION_PASSES: usize = 10;

/// Computes, for the detected platform and the user's preferences, the
/// minimal correct set of plugin names to install.
///
/// Selection is synchronous pure computation apart from a single
/// registry round trip, and degrades to the locally-seeded set when
/// the registry is unreachable.
pub struct Selector {
    config: PluginConfig,
    catalog: Arc<dyn CatalogSource>,
    detector: Arc<dyn PlatformDetector>,
}

impl Selector {
    pub fn new(
        config: PluginConfig,
        catalog: Arc<dyn CatalogSource>,
        detector: Arc<dyn PlatformDetector>,
    ) -> Self {
        Self {
            config,
            catalog,
            detector,
        }
    }

    /// Compute the sorted, deduplicated plugin-name selection.
    pub async fn select_plugins(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, SelectError> {
        let platform = self.detector.detect();
        debug!(
            os = %platform.os,
            distribution = %platform.distribution,
            desktop = platform.desktop.as_deref().unwrap_or("none"),
            "selecting plugins"
        );

        let mut selected = self.seed_candidates(&platform);
        self.apply_user_overrides(&mut selected);

        let available = match self
            .catalog
            .compatible_plugins(&platform.os, &platform.distribution, cancel)
            .await
        {
            Ok(plugins) => plugins,
            Err(e) => {
                warn!(
                    error = %e,
                    "registry unavailable, falling back to local selection"
                );
                return Ok(selected.into_iter().collect());
            }
        };
        debug!(count = available.len(), "registry reports compatible plugins");

        let mut selected = self.prioritize_and_filter(selected);
        self.resolve_dependencies(&mut selected)?;
        self.check_conflicts(&selected)?;

        let result: Vec<String> = selected.into_iter().collect();
        info!(count = result.len(), "plugin selection complete");
        Ok(result)
    }

    /// Step 1: seed from the static per-platform required list, plus a
    /// synthesized desktop plugin where the platform is desktop-aware.
    fn seed_candidates(&self, platform: &DetectedPlatform) -> BTreeSet<String> {
        let mut selected = BTreeSet::new();
        match self
            .config
            .platform_rules(&platform.os, &platform.distribution)
        {
            Some(rules) => {
                selected.extend(rules.required.iter().cloned());
                if rules.desktop_aware {
                    if let Some(desktop) = &platform.desktop {
                        selected.insert(format!("{DESKTOP_PREFIX}{desktop}"));
                    }
                }
            }
            None => {
                debug!(
                    os = %platform.os,
                    "no static configuration for platform, using detector fallback"
                );
                selected.extend(platform.fallback_required.iter().cloned());
            }
        }
        selected
    }

    /// Step 2: user overrides - exclusions, inclusions, and the
    /// preferred-package-manager exclusivity rule.
    fn apply_user_overrides(&self, selected: &mut BTreeSet<String>) {
        let overrides = &self.config.overrides;

        for name in &overrides.excluded {
            if selected.remove(name) {
                debug!(plugin = %name, "removed by user exclusion");
            }
        }
        for name in &overrides.included {
            selected.insert(name.clone());
        }

        if let Some(preferred) = &overrides.preferred_package_manager {
            let preferred_plugin = format!("{PACKAGE_MANAGER_PREFIX}{preferred}");
            if selected.contains(&preferred_plugin) {
                selected.retain(|name| {
                    !name.starts_with(PACKAGE_MANAGER_PREFIX) || *name == preferred_plugin
                });
            }
        }
    }

    /// Step 4: partition, sort package managers by priority, truncate,
    /// honor desktop inclusion and the never/always lists.
    fn prioritize_and_filter(&self, selected: BTreeSet<String>) -> BTreeSet<String> {
        let rules = &self.config.selection;

        let mut package_managers = Vec::new();
        let mut desktops = Vec::new();
        let mut others = Vec::new();
        for name in selected {
            if name.starts_with(PACKAGE_MANAGER_PREFIX) {
                package_managers.push(name);
            } else if name.starts_with(DESKTOP_PREFIX) {
                desktops.push(name);
            } else {
                others.push(name);
            }
        }

        package_managers.sort_by(|a, b| {
            self.config
                .package_manager_priority(b)
                .cmp(&self.config.package_manager_priority(a))
                .then_with(|| a.cmp(b))
        });
        package_managers.truncate(rules.max_package_managers);

        let mut result: BTreeSet<String> = package_managers.into_iter().collect();
        if rules.include_desktop {
            result.extend(desktops);
        }
        result.extend(
            others
                .into_iter()
                .filter(|name| !rules.never_auto_select.contains(name)),
        );
        result.extend(rules.always_include.iter().cloned());
        result
    }

    /// Step 5: bounded fixed-point dependency resolution.
    ///
    /// Unavailable dependencies are logged, not fatal. Exhausting the
    /// pass cap while the set is still growing, or a cycle in the
    /// requires graph of the selected set, is a [`SelectError::DependencyCycle`].
    fn resolve_dependencies(&self, selected: &mut BTreeSet<String>) -> Result<(), SelectError> {
        for pass in 0.. {
            let mut added: Vec<String> = Vec::new();
            for name in selected.iter() {
                let Some(spec) = self.config.dependencies.get(name) else {
                    continue;
                };
                for dep in &spec.requires {
                    if selected.contains(dep) || added.contains(dep) {
                        continue;
                    }
                    if self.dependency_available(dep) {
                        debug!(plugin = %name, dependency = %dep, "adding transitive dependency");
                        added.push(dep.clone());
                    } else {
                        warn!(
                            plugin = %name,
                            dependency = %dep,
                            "dependency is not available, skipping"
                        );
                    }
                }
            }
            if added.is_empty() {
                break;
            }
            if pass + 1 >= MAX_RESOLUTION_PASSES {
                added.sort();
                return Err(SelectError::DependencyCycle { members: added });
            }
            selected.extend(added);
        }

        if let Some(members) = self.find_requires_cycle(selected) {
            return Err(SelectError::DependencyCycle { members });
        }
        Ok(())
    }

    /// A dependency counts as available when the dependency table knows
    /// it or its name carries one of the structural prefixes.
    fn dependency_available(&self, name: &str) -> bool {
        self.config.dependencies.contains_key(name)
            || name.starts_with(PACKAGE_MANAGER_PREFIX)
            || name.starts_with(DESKTOP_PREFIX)
            || name.starts_with(TOOL_PREFIX)
    }

    /// Walk the requires graph restricted to the selected set and
    /// report the members of the first cycle found.
    fn find_requires_cycle(&self, selected: &BTreeSet<String>) -> Option<Vec<String>> {
        let mut done: HashSet<&str> = HashSet::new();
        for start in selected {
            if done.contains(start.as_str()) {
                continue;
            }
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            let mut path: Vec<&str> = Vec::new();
            let mut on_path: HashSet<&str> = HashSet::new();
            while let Some((name, next_edge)) = stack.pop() {
                if next_edge == 0 {
                    path.push(name);
                    on_path.insert(name);
                }
                let requires = self
                    .config
                    .dependencies
                    .get(name)
                    .map(|spec| spec.requires.as_slice())
                    .unwrap_or(&[]);
                let mut descended = false;
                for (i, dep) in requires.iter().enumerate().skip(next_edge) {
                    if !selected.contains(dep) {
                        continue;
                    }
                    if on_path.contains(dep.as_str()) {
                        // Found a back edge; report the cycle segment.
                        let cycle_start =
                            path.iter().position(|n| *n == dep.as_str()).unwrap_or(0);
                        let mut members: Vec<String> =
                            path[cycle_start..].iter().map(|n| n.to_string()).collect();
                        members.push(dep.to_string());
                        return Some(members);
                    }
                    if !done.contains(dep.as_str()) {
                        stack.push((name, i + 1));
                        stack.push((dep.as_str(), 0));
                        descended = true;
                        break;
                    }
                }
                if !descended {
                    path.pop();
                    on_path.remove(name);
                    done.insert(name);
                }
            }
        }
        None
    }

    /// Step 6: conflict check, run after dependency resolution so that
    /// newly-added dependencies are also covered.
    fn check_conflicts(&self, selected: &BTreeSet<String>) -> Result<(), SelectError> {
        for name in selected {
            let Some(spec) = self.config.dependencies.get(name) else {
                continue;
            };
            for conflict in &spec.conflicts {
                if selected.contains(conflict) {
                    return Err(SelectError::Conflict {
                        plugin: name.clone(),
                        conflicts_with: conflict.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::registry::PluginMetadata;
    use async_trait::async_trait;

    struct StaticCatalog(Vec<PluginMetadata>);

    #[async_trait]
    impl CatalogSource for StaticCatalog {
        async fn compatible_plugins(
            &self,
            _os: &str,
            _distribution: &str,
            _cancel: &CancellationToken,
        ) -> Result<Vec<PluginMetadata>, RegistryError> {
            Ok(self.0.clone())
        }
    }

    struct FailingCatalog;

    #[async_trait]
    impl CatalogSource for FailingCatalog {
        async fn compatible_plugins(
            &self,
            _os: &str,
            _distribution: &str,
            _cancel: &CancellationToken,
        ) -> Result<Vec<PluginMetadata>, RegistryError> {
            Err(RegistryError::Transport {
                url: "https://registry.devstrap.dev".to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    struct StubDetector(DetectedPlatform);

    impl PlatformDetector for StubDetector {
        fn detect(&self) -> DetectedPlatform {
            self.0.clone()
        }
    }

    fn ubuntu_gnome() -> DetectedPlatform {
        DetectedPlatform {
            os: "linux".to_string(),
            arch: "amd64".to_string(),
            distribution: "ubuntu".to_string(),
            desktop: Some("gnome".to_string()),
            fallback_required: Vec::new(),
        }
    }

    fn selector(config_toml: &str, platform: DetectedPlatform) -> Selector {
        let config = PluginConfig::from_str(config_toml).expect("test config should parse");
        Selector::new(
            config,
            Arc::new(StaticCatalog(Vec::new())),
            Arc::new(StubDetector(platform)),
        )
    }

    const BASE_CONFIG: &str = r#"
[priorities.package_managers]
apt = 90
snap = 10

[platforms.linux.ubuntu]
required = ["package-manager-apt", "tool-git"]
desktop_aware = true
"#;

    #[tokio::test]
    async fn selection_is_deterministic() {
        let s = selector(BASE_CONFIG, ubuntu_gnome());
        let cancel = CancellationToken::new();
        let first = s.select_plugins(&cancel).await.unwrap();
        let second = s.select_plugins(&cancel).await.unwrap();
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(first, sorted, "selection must be lexicographically ordered");
    }

    #[tokio::test]
    async fn seeds_required_and_synthesized_desktop() {
        let s = selector(BASE_CONFIG, ubuntu_gnome());
        let cancel = CancellationToken::new();
        let result = s.select_plugins(&cancel).await.unwrap();
        assert_eq!(
            result,
            vec!["desktop-gnome", "package-manager-apt", "tool-git"]
        );
    }

    #[tokio::test]
    async fn user_exclusion_with_desktop_matches_setup_scenario() {
        let config = r#"
[platforms.linux.ubuntu]
required = ["package-manager-apt", "tool-git"]
desktop_aware = true

[overrides]
excluded = ["tool-git"]
"#;
        let s = selector(config, ubuntu_gnome());
        let cancel = CancellationToken::new();
        let result = s.select_plugins(&cancel).await.unwrap();
        assert_eq!(result, vec!["desktop-gnome", "package-manager-apt"]);
    }

    #[tokio::test]
    async fn no_desktop_plugin_without_detected_desktop() {
        let platform = DetectedPlatform {
            desktop: None,
            ..ubuntu_gnome()
        };
        let s = selector(BASE_CONFIG, platform);
        let cancel = CancellationToken::new();
        let result = s.select_plugins(&cancel).await.unwrap();
        assert_eq!(result, vec!["package-manager-apt", "tool-git"]);
    }

    #[tokio::test]
    async fn unconfigured_platform_uses_detector_fallback() {
        let platform = DetectedPlatform {
            os: "freebsd".to_string(),
            arch: "amd64".to_string(),
            distribution: String::new(),
            desktop: None,
            fallback_required: vec!["package-manager-pkg".to_string()],
        };
        let s = selector(BASE_CONFIG, platform);
        let cancel = CancellationToken::new();
        let result = s.select_plugins(&cancel).await.unwrap();
        assert_eq!(result, vec!["package-manager-pkg"]);
    }

    #[tokio::test]
    async fn preferred_package_manager_is_exclusive() {
        let config = r#"
[platforms.linux.ubuntu]
required = ["package-manager-apt", "package-manager-snap", "tool-git"]

[overrides]
preferred_package_manager = "snap"
"#;
        let s = selector(config, ubuntu_gnome());
        let cancel = CancellationToken::new();
        let result = s.select_plugins(&cancel).await.unwrap();
        assert_eq!(result, vec!["package-manager-snap", "tool-git"]);
    }

    #[tokio::test]
    async fn preferred_package_manager_absent_changes_nothing() {
        let config = r#"
[platforms.linux.ubuntu]
required = ["package-manager-apt", "tool-git"]

[overrides]
preferred_package_manager = "dnf"
"#;
        let s = selector(config, ubuntu_gnome());
        let cancel = CancellationToken::new();
        let result = s.select_plugins(&cancel).await.unwrap();
        assert_eq!(result, vec!["package-manager-apt", "tool-git"]);
    }

    #[tokio::test]
    async fn package_managers_truncated_by_priority() {
        let config = r#"
[priorities.package_managers]
apt = 90
snap = 10
flatpak = 50

[platforms.linux.ubuntu]
required = ["package-manager-apt", "package-manager-snap", "package-manager-flatpak"]

[selection]
max_package_managers = 2
"#;
        let s = selector(config, ubuntu_gnome());
        let cancel = CancellationToken::new();
        let result = s.select_plugins(&cancel).await.unwrap();
        assert_eq!(
            result,
            vec!["package-manager-apt", "package-manager-flatpak"]
        );
    }

    #[tokio::test]
    async fn desktop_candidates_dropped_when_disabled() {
        let config = r#"
[platforms.linux.ubuntu]
required = ["tool-git"]
desktop_aware = true

[selection]
include_desktop = false
"#;
        let s = selector(config, ubuntu_gnome());
        let cancel = CancellationToken::new();
        let result = s.select_plugins(&cancel).await.unwrap();
        assert_eq!(result, vec!["tool-git"]);
    }

    #[tokio::test]
    async fn never_auto_select_and_always_include() {
        let config = r#"
[platforms.linux.ubuntu]
required = ["tool-git", "tool-telemetry"]

[selection]
never_auto_select = ["tool-telemetry"]
always_include = ["tool-shell"]
"#;
        let s = selector(config, ubuntu_gnome());
        let cancel = CancellationToken::new();
        let result = s.select_plugins(&cancel).await.unwrap();
        assert_eq!(result, vec!["tool-git", "tool-shell"]);
    }

    #[tokio::test]
    async fn transitive_dependencies_are_added() {
        let config = r#"
[platforms.linux.ubuntu]
required = ["tool-a"]

[dependencies."tool-a"]
requires = ["tool-b"]

[dependencies."tool-b"]
requires = ["tool-c"]
"#;
        let s = selector(config, ubuntu_gnome());
        let cancel = CancellationToken::new();
        let result = s.select_plugins(&cancel).await.unwrap();
        assert_eq!(result, vec!["tool-a", "tool-b", "tool-c"]);
    }

    #[tokio::test]
    async fn unavailable_dependency_is_skipped_not_fatal() {
        let config = r#"
[platforms.linux.ubuntu]
required = ["tool-a"]

[dependencies."tool-a"]
requires = ["mystery-helper"]
"#;
        let s = selector(config, ubuntu_gnome());
        let cancel = CancellationToken::new();
        let result = s.select_plugins(&cancel).await.unwrap();
        assert_eq!(result, vec!["tool-a"]);
    }

    #[tokio::test]
    async fn mutual_requires_is_a_cycle_error() {
        let config = r#"
[platforms.linux.ubuntu]
required = ["tool-a"]

[dependencies."tool-a"]
requires = ["tool-b"]

[dependencies."tool-b"]
requires = ["tool-a"]
"#;
        let s = selector(config, ubuntu_gnome());
        let cancel = CancellationToken::new();
        let err = s.select_plugins(&cancel).await.unwrap_err();
        match err {
            SelectError::DependencyCycle { members } => {
                assert!(members.contains(&"tool-a".to_string()));
                assert!(members.contains(&"tool-b".to_string()));
            }
            other => panic!("expected cycle error, got {other}"),
        }
    }

    #[tokio::test]
    async fn self_requirement_is_a_cycle_error() {
        let config = r#"
[platforms.linux.ubuntu]
required = ["tool-a"]

[dependencies."tool-a"]
requires = ["tool-a"]
"#;
        let s = selector(config, ubuntu_gnome());
        let cancel = CancellationToken::new();
        let err = s.select_plugins(&cancel).await.unwrap_err();
        assert!(matches!(err, SelectError::DependencyCycle { .. }));
    }

    #[tokio::test]
    async fn conflicts_fail_in_either_order() {
        for (first, second) in [("tool-a", "tool-b"), ("tool-b", "tool-a")] {
            let config = format!(
                r#"
[platforms.linux.ubuntu]
required = ["tool-a", "tool-b"]

[dependencies."{first}"]
conflicts = ["{second}"]
"#
            );
            let s = selector(&config, ubuntu_gnome());
            let cancel = CancellationToken::new();
            let err = s.select_plugins(&cancel).await.unwrap_err();
            match err {
                SelectError::Conflict {
                    plugin,
                    conflicts_with,
                } => {
                    assert_eq!(plugin, first.to_string());
                    assert_eq!(conflicts_with, second.to_string());
                }
                other => panic!("expected conflict error, got {other}"),
            }
        }
    }

    #[tokio::test]
    async fn conflict_check_covers_resolved_dependencies() {
        let config = r#"
[platforms.linux.ubuntu]
required = ["tool-a", "tool-c"]

[dependencies."tool-a"]
requires = ["tool-b"]

[dependencies."tool-b"]
conflicts = ["tool-c"]
"#;
        let s = selector(config, ubuntu_gnome());
        let cancel = CancellationToken::new();
        let err = s.select_plugins(&cancel).await.unwrap_err();
        assert!(matches!(err, SelectError::Conflict { .. }));
    }

    #[tokio::test]
    async fn registry_failure_degrades_to_local_seed() {
        let config = PluginConfig::from_str(
            r#"
[platforms.linux.ubuntu]
required = ["tool-a", "tool-telemetry"]

[dependencies."tool-a"]
requires = ["tool-b"]

[selection]
never_auto_select = ["tool-telemetry"]
"#,
        )
        .unwrap();
        let s = Selector::new(
            config,
            Arc::new(FailingCatalog),
            Arc::new(StubDetector(ubuntu_gnome())),
        );
        let cancel = CancellationToken::new();
        let result = s.select_plugins(&cancel).await.unwrap();
        // Degraded mode returns the seeded set as-is: no dependency
        // resolution, no priority filtering.
        assert_eq!(result, vec!["tool-a", "tool-telemetry"]);
    }
}
