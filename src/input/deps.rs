//! Dependency and plugin-dependency digests.
//!
//! Which hash a dependency contributes depends on what kind of artifact it
//! is: reactor projects contribute their own project checksum (forcing
//! dependency-ordered fingerprinting), `system`-scope dependencies hash the
//! file at `systemPath` directly, snapshots hash the resolved artifact file,
//! and released external artifacts are treated as immutable and skipped.

use super::{DigestItem, DigestItemKind};
use crate::{
    calculator::ProjectInputCalculator,
    config::CacheConfig,
    error::{CacheError, Result},
    hash::Fingerprint,
    host::{ArtifactResolver, Dependency, ProjectModel, Session},
};
use std::collections::BTreeMap;

pub struct DependencyDigester<'a> {
    project: &'a ProjectModel,
    config: &'a CacheConfig,
    session: &'a Session,
    resolver: &'a dyn ArtifactResolver,
    calculator: &'a ProjectInputCalculator,
}

impl<'a> DependencyDigester<'a> {
    pub fn new(
        project: &'a ProjectModel,
        config: &'a CacheConfig,
        session: &'a Session,
        resolver: &'a dyn ArtifactResolver,
        calculator: &'a ProjectInputCalculator,
    ) -> Self {
        Self { project, config, session, resolver, calculator }
    }

    /// Digest items for the project's declared dependencies, ordered by
    /// versionless key.
    pub fn project_dependency_items(&self) -> Result<Vec<DigestItem>> {
        let digests = self.digest_dependencies(&self.project.dependencies, "")?;
        Ok(digests
            .into_iter()
            .map(|(key, hash)| DigestItem::new(DigestItemKind::Dependency, key, hash))
            .collect())
    }

    /// Digest items for every build plugin's declared dependencies. Entries
    /// are keyed `<pluginKey>|<occurrenceIndex>|<dependencyKey>` so repeated
    /// plugin declarations stay distinguishable.
    pub fn plugin_dependency_items(&self) -> Result<Vec<DigestItem>> {
        let mut occurrences: BTreeMap<String, usize> = BTreeMap::new();
        let mut items = BTreeMap::new();
        for plugin in &self.project.plugins {
            let key = plugin.key();
            let occurrence = *occurrences
                .entry(key.clone())
                .and_modify(|count| *count += 1)
                .or_insert(0);
            let excluded = self
                .config
                .plugin_input(&plugin.artifact_id)
                .map(|input| input.exclude_dependencies)
                .unwrap_or_default();
            if excluded {
                trace!("skipping dependencies of plugin {key}");
                continue;
            }
            let prefix = format!("{key}|{occurrence}|");
            items.extend(self.digest_dependencies(&plugin.dependencies, &prefix)?);
        }
        Ok(items
            .into_iter()
            .map(|(key, hash)| DigestItem::new(DigestItemKind::PluginDependency, key, hash))
            .collect())
    }

    /// Hashes the given dependencies, deduplicated and ordered by
    /// `<prefix><versionless key>`.
    fn digest_dependencies(
        &self,
        dependencies: &[Dependency],
        prefix: &str,
    ) -> Result<BTreeMap<String, Fingerprint>> {
        let mut digests = BTreeMap::new();
        for dependency in dependencies {
            if dependency.is_pom() {
                continue;
            }
            let key = format!("{prefix}{}", dependency.versionless_key());
            if digests.contains_key(&key) {
                continue;
            }
            if let Some(hash) = self.digest_dependency(dependency)? {
                digests.insert(key, hash);
            }
        }
        Ok(digests)
    }

    fn digest_dependency(&self, dependency: &Dependency) -> Result<Option<Fingerprint>> {
        // a reactor module contributes its own project checksum
        if let Some(reactor_project) = self
            .calculator
            .reactor_project(&dependency.group_id, &dependency.artifact_id)
        {
            let info = self.calculator.calculate(&reactor_project)?;
            return Ok(Some(info.checksum.clone()));
        }

        if dependency.is_dynamic() {
            trace!("skipping dynamic dependency {}", dependency.coordinates());
            return Ok(None);
        }

        let algorithm = self.config.hash_algorithm();
        if dependency.is_system_scope() {
            // system scope is a plain file, never resolved remotely
            let path = dependency.system_path.as_ref().ok_or_else(|| {
                CacheError::DependencyNotResolved {
                    project: self.project.coordinates.to_string(),
                    coordinates: dependency.coordinates().to_string(),
                    reason: "system scope without systemPath".to_string(),
                }
            })?;
            return algorithm.hash_file(path).map(Some).map_err(|err| {
                CacheError::DependencyNotResolved {
                    project: self.project.coordinates.to_string(),
                    coordinates: dependency.coordinates().to_string(),
                    reason: err.to_string(),
                }
            });
        }

        if dependency.is_snapshot() {
            let file = self
                .resolver
                .resolve(self.session, dependency, &self.project.remote_repositories)
                .map_err(|err| CacheError::DependencyNotResolved {
                    project: self.project.coordinates.to_string(),
                    coordinates: dependency.coordinates().to_string(),
                    reason: err.to_string(),
                })?;
            return algorithm.hash_file(&file).map(Some).map_err(|err| {
                CacheError::DependencyNotResolved {
                    project: self.project.coordinates.to_string(),
                    coordinates: dependency.coordinates().to_string(),
                    reason: err.to_string(),
                }
            });
        }

        // released external artifacts are immutable
        Ok(None)
    }
}
