//! Decides whether a filesystem path is excluded from fingerprinting.
//!
//! Exclusions come from three places: the global `input/global/exclude`
//! rules, project properties of the form
//! `cache.exclude.{value|glob|entryType|matcherType}.<k>` (grouped into one
//! exclusion per `<k>`), and the project's own build-output directories,
//! which are always excluded.

use crate::{
    config::{props, CacheConfig, EntryKind, MatcherKind, PathRule},
    host::ProjectModel,
    utils,
};
use glob::Pattern;
use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

/// One exclusion rule anchored at an absolute root.
#[derive(Debug)]
struct Exclusion {
    root: PathBuf,
    matcher: Pattern,
    matcher_kind: MatcherKind,
    /// Whether a `path`-kind matcher was written as an absolute path.
    absolute: bool,
}

impl Exclusion {
    fn matches(&self, path: &Path, project_root: &Path) -> bool {
        if !utils::is_ancestor_of(&self.root, path) && self.root != path {
            return false;
        }
        match self.matcher_kind {
            MatcherKind::Filename => path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| self.matcher.matches(name))
                .unwrap_or_default(),
            MatcherKind::Path => {
                let candidate = if self.absolute {
                    utils::to_slash(path)
                } else {
                    utils::relativize(path, project_root)
                };
                self.matcher.matches(&candidate)
            }
        }
    }
}

/// Answers `excludes(path)` for one project.
#[derive(Debug)]
pub struct ExclusionResolver {
    base_dir: PathBuf,
    direct_files: HashSet<PathBuf>,
    file_rules: Vec<Exclusion>,
    dir_rules: Vec<Exclusion>,
}

impl ExclusionResolver {
    pub fn new(project: &ProjectModel, config: &CacheConfig) -> Self {
        let base_dir =
            utils::canonicalize(&project.base_dir).unwrap_or_else(|_| project.base_dir.clone());
        let mut resolver = Self {
            base_dir,
            direct_files: HashSet::new(),
            file_rules: Vec::new(),
            dir_rules: Vec::new(),
        };

        for rule in &config.global_input().excludes {
            resolver.add_rule(rule);
        }
        for rule in property_exclusions(project) {
            resolver.add_rule(&rule);
        }

        // build outputs are never fingerprint inputs
        for dir in [&project.output_dir, &project.test_output_dir, &project.build_dir] {
            let dir = utils::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
            for rules in [&mut resolver.file_rules, &mut resolver.dir_rules] {
                rules.push(Exclusion {
                    root: dir.clone(),
                    matcher: Pattern::new("*").expect("literal glob"),
                    matcher_kind: MatcherKind::Filename,
                    absolute: false,
                });
            }
        }

        resolver
    }

    fn add_rule(&mut self, rule: &PathRule) {
        let root = if rule.value.is_empty() {
            self.base_dir.clone()
        } else {
            let value = Path::new(&rule.value);
            if value.is_absolute() {
                utils::normalize_lexically(value)
            } else {
                utils::normalize_lexically(&self.base_dir.join(value))
            }
        };
        // roots that don't exist can never match anything
        if !root.exists() {
            trace!("dropping exclusion with nonexistent root \"{}\"", root.display());
            return;
        }
        let root = utils::canonicalize(&root).unwrap_or(root);

        let Some(raw_glob) = rule.glob.as_deref() else {
            // a bare value names one file or one directory subtree
            if root.is_file() {
                self.direct_files.insert(root);
            } else {
                for rules in [&mut self.file_rules, &mut self.dir_rules] {
                    rules.push(Exclusion {
                        root: root.clone(),
                        matcher: Pattern::new("*").expect("literal glob"),
                        matcher_kind: MatcherKind::Filename,
                        absolute: false,
                    });
                }
            }
            return;
        };

        // path-style globs written with platform separators still match
        let normalized = raw_glob.replace('\\', "/");
        let Ok(matcher) = Pattern::new(&normalized) else {
            warn!("ignoring invalid exclusion glob {raw_glob:?}");
            return;
        };
        let absolute = rule.matcher_kind == MatcherKind::Path && Path::new(&normalized).is_absolute();
        let exclusion = Exclusion { root, matcher, matcher_kind: rule.matcher_kind, absolute };
        match rule.entry_kind {
            EntryKind::File => self.file_rules.push(exclusion),
            EntryKind::Dir => self.dir_rules.push(exclusion),
            EntryKind::Any => {
                self.file_rules.push(Exclusion {
                    root: exclusion.root.clone(),
                    matcher: exclusion.matcher.clone(),
                    matcher_kind: exclusion.matcher_kind,
                    absolute: exclusion.absolute,
                });
                self.dir_rules.push(exclusion);
            }
        }
    }

    /// Whether the absolute path is excluded from input discovery.
    pub fn excludes(&self, path: &Path) -> bool {
        if self.direct_files.contains(path) {
            return true;
        }
        let rules = if path.is_dir() { &self.dir_rules } else { &self.file_rules };
        rules.iter().any(|rule| rule.matches(path, &self.base_dir))
    }
}

/// Collects `cache.exclude.{value|glob|entryType|matcherType}.<k>` property
/// groups into rules.
fn property_exclusions(project: &ProjectModel) -> Vec<PathRule> {
    let mut groups: BTreeMap<String, PathRule> = BTreeMap::new();
    for (key, value) in &project.properties {
        let Some(rest) = key.strip_prefix(props::PROJECT_EXCLUDE_PREFIX) else { continue };
        let Some((field, group)) = rest.split_once('.') else { continue };
        let rule = groups.entry(group.to_string()).or_default();
        match field {
            "value" => rule.value = value.clone(),
            "glob" => rule.glob = Some(value.clone()),
            "entryType" => {
                rule.entry_kind = match value.as_str() {
                    "file" => EntryKind::File,
                    "dir" => EntryKind::Dir,
                    _ => EntryKind::Any,
                }
            }
            "matcherType" => {
                rule.matcher_kind =
                    if value == "path" { MatcherKind::Path } else { MatcherKind::Filename }
            }
            other => trace!("ignoring unknown exclusion property field {other:?}"),
        }
    }
    groups.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ConfigNode, Coordinates, Session};
    use std::{collections::BTreeMap, fs};

    fn project(base: &Path) -> ProjectModel {
        ProjectModel {
            coordinates: Coordinates::new("g", "a", "1.0"),
            packaging: "jar".into(),
            base_dir: base.to_path_buf(),
            source_dir: base.join("src/main/java"),
            test_source_dir: base.join("src/test/java"),
            resource_dirs: vec![],
            test_resource_dirs: vec![],
            output_dir: base.join("target/classes"),
            test_output_dir: base.join("target/test-classes"),
            build_dir: base.join("target"),
            dependencies: vec![],
            plugins: vec![],
            properties: BTreeMap::new(),
            remote_repositories: vec![],
            effective_model: ConfigNode::new("project"),
        }
    }

    fn config() -> CacheConfig {
        CacheConfig::initialize(&Session::default(), None).unwrap()
    }

    #[test]
    fn build_outputs_are_always_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join("target/classes")).unwrap();
        fs::write(base.join("target/classes/App.class"), b"x").unwrap();
        let resolver = ExclusionResolver::new(&project(base), &config());
        assert!(resolver.excludes(&base.join("target")));
        assert!(resolver.excludes(&base.join("target/classes/App.class")));
        assert!(!resolver.excludes(&base.join("src")));
    }

    #[test]
    fn property_groups_build_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join("docs")).unwrap();
        fs::write(base.join("docs/notes.md"), b"x").unwrap();
        fs::write(base.join("docs/keep.txt"), b"x").unwrap();

        let mut project = project(base);
        project.properties.insert("cache.exclude.value.1".into(), "docs".into());
        project.properties.insert("cache.exclude.glob.1".into(), "*.md".into());
        project.properties.insert("cache.exclude.entryType.1".into(), "file".into());

        let resolver = ExclusionResolver::new(&project, &config());
        assert!(resolver.excludes(&base.join("docs/notes.md")));
        assert!(!resolver.excludes(&base.join("docs/keep.txt")));
    }

    #[test]
    fn path_matcher_applies_to_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join("src/gen")).unwrap();
        fs::write(base.join("src/gen/Gen.java"), b"x").unwrap();

        let mut project = project(base);
        // platform-style separators normalize to forward slashes
        project.properties.insert("cache.exclude.glob.g".into(), "src\\gen\\*".into());
        project.properties.insert("cache.exclude.matcherType.g".into(), "path".into());

        let resolver = ExclusionResolver::new(&project, &config());
        assert!(resolver.excludes(&base.join("src/gen/Gen.java")));
        assert!(!resolver.excludes(&base.join("src/Other.java")));
    }

    #[test]
    fn nonexistent_roots_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = project(dir.path());
        project.properties.insert("cache.exclude.value.x".into(), "no-such-dir".into());
        project.properties.insert("cache.exclude.glob.x".into(), "*".into());
        let resolver = ExclusionResolver::new(&project, &config());
        assert!(!resolver.excludes(&dir.path().join("no-such-dir/file.txt")));
    }
}
