//! Plugin configuration scanning.
//!
//! Plugin configuration is a generic tree of named elements. Text values
//! that plausibly name files or directories become walk roots; everything
//! else is ignored. The "plausibly a path" heuristic is intentionally
//! inexact and is kept as a table of named predicates so it can be extended
//! without touching the traversal.

use super::walk::FileWalker;
use crate::{
    config::{CacheConfig, DirScanConfig, ScanMode},
    host::{ConfigNode, Plugin},
};
use once_cell::sync::Lazy;
use std::path::Path;

/// Attribute marking an element value as an explicit input root.
const CACHE_INPUT_ATTRIBUTE: &str = "cache.input";

/// Element whose value names a descriptor reference; `<value>.xml` is walked
/// alongside the value itself.
const DESCRIPTOR_REF_TAG: &str = "descriptorRef";

/// Values that are never paths.
const SKIP_EXACT: &[&str] = &["true", "false", "utf-8", "null", "\\"];

/// Prefixes of well-known java package roots.
const PACKAGE_PREFIXES: &[&str] = &["com.", "org.", "io.", "java.", "javax."];

/// URL-ish scheme prefixes.
const SCHEME_PREFIXES: &[&str] =
    &["http:", "https:", "scm:", "ssh:", "git:", "svn:", "cp:", "classpath:"];

/// Prefix of an unresolved environment-variable placeholder.
const ENV_PLACEHOLDER_PREFIX: &str = "${env.";

/// The skip predicates, applied in order. A value matching any predicate is
/// not treated as a path candidate.
pub static SKIP_PREDICATES: Lazy<Vec<(&'static str, fn(&str) -> bool)>> = Lazy::new(|| {
    vec![
        ("blank", |value: &str| value.trim().is_empty()),
        ("literal", |value: &str| {
            SKIP_EXACT.iter().any(|literal| value.eq_ignore_ascii_case(literal))
        }),
        ("wildcard", |value: &str| value.contains('*')),
        // `g:a:1.0` is a coordinate, `C:\dir` is not
        ("coordinate", |value: &str| value.contains(':') && !value.contains(":\\")),
        ("package", |value: &str| {
            PACKAGE_PREFIXES.iter().any(|prefix| value.starts_with(prefix))
        }),
        ("env-placeholder", |value: &str| value.starts_with(ENV_PLACEHOLDER_PREFIX)),
        ("scheme", |value: &str| {
            SCHEME_PREFIXES.iter().any(|prefix| value.starts_with(prefix))
        }),
        ("temp-dir", |value: &str| {
            value.starts_with(std::env::temp_dir().to_string_lossy().as_ref())
        }),
    ]
});

/// Returns the name of the first matching skip predicate, if any.
pub fn skip_reason(value: &str) -> Option<&'static str> {
    SKIP_PREDICATES.iter().find(|(_, predicate)| predicate(value)).map(|(name, _)| *name)
}

/// Walks path candidates found in plugin configuration trees.
pub struct PluginScanner<'a, 'w> {
    config: &'a CacheConfig,
    walker: &'a mut FileWalker<'w>,
}

impl<'a, 'w> PluginScanner<'a, 'w> {
    pub fn new(config: &'a CacheConfig, walker: &'a mut FileWalker<'w>) -> Self {
        Self { config, walker }
    }

    /// Scans the plugin's configuration and each execution's configuration.
    pub fn scan_plugin(&mut self, plugin: &Plugin, project_glob: &str) {
        let dir_scan = self
            .config
            .plugin_input(&plugin.artifact_id)
            .map(|input| input.dir_scan.clone())
            .unwrap_or_default();
        if dir_scan.mode == ScanMode::Off {
            trace!("plugin {} has directory scanning turned off", plugin.key());
            return;
        }

        if let Some(configuration) = &plugin.configuration {
            self.scan_node(configuration, &dir_scan, project_glob);
        }
        for execution in &plugin.executions {
            if let Some(configuration) = &execution.configuration {
                self.scan_node(configuration, &dir_scan, project_glob);
            }
        }
    }

    fn scan_node(&mut self, node: &ConfigNode, dir_scan: &DirScanConfig, project_glob: &str) {
        let tag_config = dir_scan
            .tag_scan_configs
            .iter()
            .find(|tag| tag.tag_name == node.name);
        let considered = match dir_scan.mode {
            ScanMode::Off => false,
            ScanMode::Auto => true,
            ScanMode::Custom => tag_config.is_some(),
        };

        if considered {
            let glob = tag_config
                .and_then(|tag| tag.glob.as_deref())
                .unwrap_or(project_glob);
            let recursive = tag_config.map(|tag| tag.recursive).unwrap_or(true);

            if node.attribute(CACHE_INPUT_ATTRIBUTE) == Some("true") {
                if let Some(value) = &node.value {
                    self.walker.walk(Path::new(value), glob, recursive);
                }
            } else if let Some(value) = node.value.as_deref() {
                match skip_reason(value) {
                    Some(reason) => {
                        trace!("not a path candidate ({reason}): {value:?}")
                    }
                    None => {
                        self.walker.walk(Path::new(value), glob, recursive);
                        if node.name == DESCRIPTOR_REF_TAG {
                            self.walker.walk(Path::new(&format!("{value}.xml")), glob, recursive);
                        }
                    }
                }
            }
        }

        for child in &node.children {
            self.scan_node(child, dir_scan, project_glob);
        }
    }
}
