//! Project input fingerprinting.
//!
//! For one project this computes [`ProjectsInputInfo`]: the ordered digest
//! items over the normalized effective model, the discovered input files,
//! the dependency hashes and the plugin-dependency hashes, aggregated into
//! the project checksum that keys the cache.

pub mod deps;
pub mod scan;
pub mod walk;

use crate::{
    calculator::ProjectInputCalculator,
    config::{props, CacheConfig},
    error::{CacheError, Result},
    exclude::ExclusionResolver,
    hash::Fingerprint,
    host::{ArtifactResolver, ProjectModel, Session},
    normalize::ModelNormalizer,
    report::Reporter,
    utils,
};
use deps::DependencyDigester;
use rayon::prelude::*;
use scan::PluginScanner;
use serde::{Deserialize, Serialize};
use std::path::Path;
use walk::FileWalker;

/// What a digest item describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DigestItemKind {
    Version,
    Pom,
    File,
    Dependency,
    PluginDependency,
}

/// One fingerprint input: a logical key and the hash it contributed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DigestItem {
    #[serde(rename = "@type")]
    pub kind: DigestItemKind,
    /// Logical key: relative path, dependency key or version string.
    #[serde(rename = "@value")]
    pub value: String,
    #[serde(rename = "@hash")]
    pub hash: Fingerprint,
    #[serde(rename = "@isText", default, skip_serializing_if = "is_false")]
    pub is_text: bool,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl DigestItem {
    pub fn new(kind: DigestItemKind, value: impl Into<String>, hash: Fingerprint) -> Self {
        Self { kind, value: value.into(), hash, is_text: false }
    }
}

/// The complete fingerprint input of one project.
///
/// Recomputing the aggregate over `items` in order yields `checksum`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectsInputInfo {
    #[serde(rename = "@checksum")]
    pub checksum: Fingerprint,
    #[serde(rename = "item", default)]
    pub items: Vec<DigestItem>,
}

impl ProjectsInputInfo {
    /// Aggregates the items, in order, into the project checksum.
    pub fn aggregate(config: &CacheConfig, items: &[DigestItem]) -> Fingerprint {
        let mut checksum = config.hash_algorithm().checksum(items.len() * 32);
        for item in items {
            checksum.update(item.hash.as_bytes());
        }
        checksum.digest()
    }

    pub fn items_of(&self, kind: DigestItemKind) -> impl Iterator<Item = &DigestItem> {
        self.items.iter().filter(move |item| item.kind == kind)
    }
}

/// Computes [`ProjectsInputInfo`] for a single project.
pub struct ProjectInputAnalyzer<'a> {
    project: &'a ProjectModel,
    config: &'a CacheConfig,
    session: &'a Session,
    resolver: &'a dyn ArtifactResolver,
    calculator: &'a ProjectInputCalculator,
    reporter: &'a Reporter,
}

impl<'a> ProjectInputAnalyzer<'a> {
    pub fn new(
        project: &'a ProjectModel,
        config: &'a CacheConfig,
        session: &'a Session,
        resolver: &'a dyn ArtifactResolver,
        calculator: &'a ProjectInputCalculator,
        reporter: &'a Reporter,
    ) -> Self {
        Self { project, config, session, resolver, calculator, reporter }
    }

    pub fn analyze(&self) -> Result<ProjectsInputInfo> {
        if self.session.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        let coordinates = &self.project.coordinates;
        trace!("analyzing inputs of {coordinates}");

        let mut items = Vec::new();
        if self.config.calculate_project_version_checksum() {
            let mut item = DigestItem::new(
                DigestItemKind::Version,
                coordinates.version.clone(),
                self.config.hash_algorithm().hash(coordinates.version.as_bytes()),
            );
            item.is_text = true;
            items.push(item);
        }

        let normalizer = ModelNormalizer::new(&self.project.base_dir, self.config);
        let effective_pom = normalizer.normalize(&self.project.effective_model);
        items.push(DigestItem::new(
            DigestItemKind::Pom,
            "effective-pom",
            self.config.hash_algorithm().hash(effective_pom.as_bytes()),
        ));

        items.extend(self.file_items()?);

        let digester = DependencyDigester::new(
            self.project,
            self.config,
            self.session,
            self.resolver,
            self.calculator,
        );
        items.extend(digester.project_dependency_items()?);
        items.extend(digester.plugin_dependency_items()?);

        let checksum = ProjectsInputInfo::aggregate(self.config, &items);
        let info = ProjectsInputInfo { checksum, items };
        debug!("input checksum of {coordinates} is {}", info.checksum);

        self.baseline_diff(&info);
        Ok(info)
    }

    /// Enumerates, orders and hashes the project's input files.
    fn file_items(&self) -> Result<Vec<DigestItem>> {
        // aggregator projects have no file inputs of their own
        if self.project.is_pom_packaging() {
            return Ok(Vec::new());
        }

        let exclusions = ExclusionResolver::new(self.project, self.config);
        // walk roots come back canonicalized, the base dir must match
        let base_dir = utils::canonicalize(&self.project.base_dir)
            .unwrap_or_else(|_| self.project.base_dir.clone());
        let base_dir = &base_dir;
        let project_glob = self
            .project
            .property(props::PROJECT_INPUT_GLOB)
            .unwrap_or_else(|| self.config.default_glob());
        let global_glob =
            self.config.global_input().glob.clone().unwrap_or_else(|| project_glob.to_string());

        let mut walker = FileWalker::new(base_dir, &exclusions);
        for dir in self.project.input_dirs() {
            walker.walk(&dir, project_glob, true);
        }
        for (key, value) in &self.project.properties {
            if key.starts_with(props::PROJECT_INPUT_PREFIX) && key != props::PROJECT_INPUT_GLOB {
                walker.walk(Path::new(value), project_glob, true);
            }
        }
        for include in &self.config.global_input().includes {
            let glob = include.glob.as_deref().unwrap_or(&global_glob);
            walker.walk(Path::new(&include.value), glob, include.recursive);
        }
        if self.config.process_plugins() {
            let mut scanner = PluginScanner::new(self.config, &mut walker);
            for plugin in &self.project.plugins {
                scanner.scan_plugin(plugin, project_glob);
            }
        }

        if self.session.is_cancelled() {
            return Err(CacheError::Cancelled);
        }

        let files = walker.into_sorted_files();
        let algorithm = self.config.hash_algorithm();
        files
            .par_iter()
            .map(|file| {
                let hash = algorithm.hash_file(file)?;
                Ok(DigestItem::new(
                    DigestItemKind::File,
                    utils::relativize(file, base_dir),
                    hash,
                ))
            })
            .collect()
    }

    /// When a baseline cache is configured, compares this project's digest
    /// items against the baseline record and reports what diverged.
    fn baseline_diff(&self, info: &ProjectsInputInfo) {
        if self.config.baseline_url().is_none() {
            return;
        }
        let coordinates = &self.project.coordinates;
        let Some(baseline) = self.reporter.baseline_record(coordinates) else {
            info!("baseline of {coordinates}: no baseline build found");
            return;
        };

        let mut matched = 0usize;
        let mut out_of_date = 0usize;
        for item in &info.items {
            let baseline_item = baseline
                .input_info()
                .items
                .iter()
                .find(|candidate| candidate.kind == item.kind && candidate.value == item.value);
            match baseline_item {
                Some(candidate) if candidate.hash == item.hash => {
                    matched += 1;
                    trace!("baseline of {coordinates}: {:?} {} MATCHED", item.kind, item.value);
                }
                Some(_) => {
                    out_of_date += 1;
                    info!("baseline of {coordinates}: {:?} {} OUT OF DATE", item.kind, item.value);
                }
                None => {
                    out_of_date += 1;
                    info!(
                        "baseline of {coordinates}: {:?} {} not present in baseline",
                        item.kind, item.value
                    );
                }
            }
        }
        for kind in [
            DigestItemKind::Pom,
            DigestItemKind::File,
            DigestItemKind::Dependency,
            DigestItemKind::PluginDependency,
        ] {
            let current: Vec<_> = info.items_of(kind).collect();
            let stale = current
                .iter()
                .filter(|item| {
                    baseline
                        .input_info()
                        .items
                        .iter()
                        .find(|candidate| {
                            candidate.kind == item.kind && candidate.value == item.value
                        })
                        .map_or(true, |candidate| candidate.hash != item.hash)
                })
                .count();
            info!(
                "baseline of {coordinates}: {kind:?} inputs, {} of {} up to date",
                current.len() - stale,
                current.len()
            );
        }
        debug!("baseline of {coordinates}: {matched} matched, {out_of_date} out of date");
    }
}
