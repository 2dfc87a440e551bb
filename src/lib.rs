#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]

#[macro_use]
extern crate tracing;

pub mod error;
pub use error::{CacheError, CacheIoError, Result, TransportError};

pub mod hash;
pub use hash::{Checksum, Fingerprint, HashAlgorithm};

pub mod config;
pub use config::{CacheConfig, ConfigState};

pub mod host;
pub use host::{
    ArchivePacker, ArtifactResolver, BuildStep, ConfigNode, Coordinates, Dependency,
    LifecyclePhase, ParamValue, Plugin, PluginExecution, ProjectModel, Session, StepExecutor,
};

pub mod exclude;
pub mod normalize;

pub mod input;
pub use input::{DigestItem, DigestItemKind, ProjectsInputInfo};

pub mod calculator;
pub use calculator::ProjectInputCalculator;

pub mod record;
pub use record::{ArtifactEntry, ArtifactRole, BuildRecord, CacheSource, CompletedExecution};

pub mod store;
pub use store::{BuildRecordStore, LocalBuildCache, RemoteBuildCache};

pub mod transport;
pub use transport::RemoteTransport;

pub mod restore;
pub use restore::ArtifactHandle;

pub mod controller;
pub use controller::{BuiltArtifact, BuiltArtifacts, CacheController, CacheResult};

pub mod execution;
pub use execution::{ExecutionOutcome, ExecutionPlan, ExecutionStrategy};

pub mod report;
pub use report::{CacheReport, Reporter};

pub mod utils;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// The per-session cache engine.
///
/// One engine owns the session's configuration, the remote transport, the
/// fingerprint calculator and the record store; the host drives it once per
/// project via [`CacheEngine::execute_project`].
pub struct CacheEngine {
    config: Arc<CacheConfig>,
    session: Arc<Session>,
    calculator: Arc<ProjectInputCalculator>,
    store: Arc<BuildRecordStore>,
    controller: CacheController,
    reporter: Arc<Reporter>,
}

impl CacheEngine {
    /// Convenience function to call `CacheEngineBuilder::default()`.
    pub fn builder() -> CacheEngineBuilder {
        CacheEngineBuilder::default()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn calculator(&self) -> &Arc<ProjectInputCalculator> {
        &self.calculator
    }

    pub fn store(&self) -> &Arc<BuildRecordStore> {
        &self.store
    }

    pub fn controller(&self) -> &CacheController {
        &self.controller
    }

    /// Whether caching is active for this session.
    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Runs one project through the cache decision protocol. With caching
    /// disabled every step simply runs through the host executor.
    pub fn execute_project(
        &self,
        project: &ProjectModel,
        steps: &[BuildStep],
        executor: &dyn StepExecutor,
        packer: &dyn ArchivePacker,
        collect_artifacts: &dyn Fn(&ProjectModel) -> BuiltArtifacts,
    ) -> Result<ExecutionOutcome> {
        if !self.is_enabled() {
            for step in steps {
                executor.execute(project, step)?;
            }
            return Ok(ExecutionOutcome { source: CacheSource::Built, restored: Vec::new() });
        }
        let strategy =
            ExecutionStrategy::new(&self.config, &self.session, &self.controller, executor, packer);
        strategy.execute_project(project, steps, collect_artifacts)
    }

    /// Writes `cache-report.xml` for the session.
    pub fn write_report(&self, path: &Path) -> Result<()> {
        self.reporter.write(path)
    }

    /// Uploads the session report to the remote cache under the build id.
    pub fn publish_report(&self, root: &Coordinates, build_id: &str) -> Result<()> {
        let Some(remote) = self.store.remote() else {
            return Ok(());
        };
        let url = remote.transport().report_url(root, build_id)?;
        let body = self.reporter.report().to_xml()?;
        match remote.transport().put(&url, body.into_bytes()) {
            Ok(()) => {
                info!("published cache report to {url}");
                Ok(())
            }
            Err(err) if remote.transport().fail_fast() => Err(err.into()),
            Err(err) => {
                warn!("cannot publish cache report to {url}: {err}");
                Ok(())
            }
        }
    }
}

/// Builds a [`CacheEngine`] for one session.
#[derive(Default)]
pub struct CacheEngineBuilder {
    cache_root: Option<PathBuf>,
    config_path: Option<PathBuf>,
    resolver: Option<Arc<dyn ArtifactResolver>>,
    projects: Vec<ProjectModel>,
}

impl CacheEngineBuilder {
    /// Root directory of the local store; defaults to the user cache dir.
    #[must_use]
    pub fn cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(root.into());
        self
    }

    /// Default location of the configuration document, overridable by the
    /// `configPath` host property.
    #[must_use]
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// The host's dependency resolver.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn ArtifactResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// The reactor: every project of the session.
    #[must_use]
    pub fn projects(mut self, projects: impl IntoIterator<Item = ProjectModel>) -> Self {
        self.projects.extend(projects);
        self
    }

    pub fn build(self, session: Session) -> Result<CacheEngine> {
        let Self { cache_root, config_path, resolver, projects } = self;
        let resolver =
            resolver.ok_or_else(|| CacheError::config("an artifact resolver is required"))?;

        let config = Arc::new(CacheConfig::initialize(&session, config_path.as_deref())?);
        let session = Arc::new(session);

        let wants_remote = config.remote().enabled;
        let wants_baseline = config.baseline_url().is_some();
        let transport = if config.is_enabled() && (wants_remote || wants_baseline) {
            if config.remote().transport != "http" {
                return Err(CacheError::config(format!(
                    "unsupported remote transport {:?}",
                    config.remote().transport
                )));
            }
            let mut remote_config = config.remote().clone();
            if remote_config.url.is_empty() {
                // baseline-only sessions have no store url of their own
                if let Some(baseline_url) = config.baseline_url() {
                    remote_config.url = baseline_url.to_string();
                }
            }
            Some(Arc::new(RemoteTransport::new(&remote_config, &session)?))
        } else {
            None
        };

        let local = Arc::new(LocalBuildCache::new(
            cache_root.unwrap_or_else(LocalBuildCache::default_root),
            config.max_local_builds_cached(),
        ));
        let remote = transport
            .clone()
            .filter(|_| wants_remote)
            .map(|transport| Arc::new(RemoteBuildCache::new(transport, config.remote())));
        let store = Arc::new(BuildRecordStore::new(local, remote));

        let baseline_source = match (&transport, config.baseline_url()) {
            (Some(transport), Some(url)) => Some((transport.clone(), url.to_string())),
            _ => None,
        };
        let reporter = Arc::new(Reporter::new(baseline_source));

        let calculator = Arc::new(ProjectInputCalculator::new(
            config.clone(),
            session.clone(),
            resolver,
            reporter.clone(),
            projects,
        ));
        let controller = CacheController::new(
            config.clone(),
            session.clone(),
            calculator.clone(),
            store.clone(),
            reporter.clone(),
        );

        debug!(
            "cache engine initialized, state {:?}, local root \"{}\"",
            config.state(),
            store.local().root().display()
        );
        Ok(CacheEngine { config, session, calculator, store, controller, reporter })
    }
}
