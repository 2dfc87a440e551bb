//! Per-project cache resolution and write-back.

use crate::{
    calculator::ProjectInputCalculator,
    config::{props, CacheConfig},
    error::{CacheError, Result},
    host::{ArchivePacker, Coordinates, LifecyclePhase, ProjectModel, Session},
    record::{
        ArtifactEntry, ArtifactRole, BuildRecord, CacheSource, CompletedExecution,
    },
    report::Reporter,
    restore::GENERATED_SOURCES_DIR,
    store::BuildRecordStore,
};
use std::{path::PathBuf, sync::Arc};

/// Outcome of the per-project cache lookup.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
pub enum CacheResult {
    Hit(BuildRecord),
    Miss,
}

impl CacheResult {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheResult::Hit(_))
    }
}

/// An artifact produced by a fresh build, as reported by the host.
#[derive(Clone, Debug)]
pub struct BuiltArtifact {
    pub path: PathBuf,
    pub classifier: Option<String>,
    pub extension: String,
}

/// Everything a fresh build produced.
#[derive(Clone, Debug, Default)]
pub struct BuiltArtifacts {
    pub primary: Option<BuiltArtifact>,
    pub attached: Vec<BuiltArtifact>,
}

/// Looks builds up by fingerprint and commits fresh builds back.
pub struct CacheController {
    config: Arc<CacheConfig>,
    session: Arc<Session>,
    calculator: Arc<ProjectInputCalculator>,
    store: Arc<BuildRecordStore>,
    reporter: Arc<Reporter>,
}

impl CacheController {
    pub fn new(
        config: Arc<CacheConfig>,
        session: Arc<Session>,
        calculator: Arc<ProjectInputCalculator>,
        store: Arc<BuildRecordStore>,
        reporter: Arc<Reporter>,
    ) -> Self {
        Self { config, session, calculator, store, reporter }
    }

    pub fn store(&self) -> &Arc<BuildRecordStore> {
        &self.store
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    pub fn calculator(&self) -> &Arc<ProjectInputCalculator> {
        &self.calculator
    }

    fn lookup_disabled(&self, project: &ProjectModel) -> bool {
        self.config.skip_cache() || project.property(props::PROJECT_SKIP) == Some("true")
    }

    /// Local-then-remote lookup by the project's input fingerprint.
    pub fn lookup(&self, project: &ProjectModel) -> Result<CacheResult> {
        if self.session.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        let coordinates = &project.coordinates;
        if self.lookup_disabled(project) {
            debug!("cache lookup of {coordinates} skipped by configuration");
            return Ok(CacheResult::Miss);
        }

        let info = self.calculator.calculate(project)?;
        let fingerprint = info.checksum.to_hex();

        match self.store.find_local(coordinates, &fingerprint) {
            Ok(Some(record)) => {
                info!("Found cached build, restoring {}:{} from cache", coordinates.group_id, coordinates.artifact_id);
                return Ok(CacheResult::Hit(record));
            }
            Ok(None) => {}
            Err(err @ CacheError::Corrupt(_, _)) if !self.config.remote().fail_fast => {
                warn!("local cached build of {coordinates} is unusable, treating as miss: {err}");
            }
            Err(err) => return Err(err),
        }

        if self.config.remote().enabled {
            match self.store.find_remote(coordinates, &fingerprint) {
                Ok(Some(record)) => {
                    info!("Found cached build, restoring {}:{} from remote cache", coordinates.group_id, coordinates.artifact_id);
                    return Ok(CacheResult::Hit(record));
                }
                Ok(None) => {}
                Err(err @ CacheError::Corrupt(_, _)) if !self.config.remote().fail_fast => {
                    warn!("remote cached build of {coordinates} is unusable, treating as miss: {err}");
                }
                Err(err) => return Err(err),
            }
        }

        debug!("no cached build of {coordinates} with fingerprint {fingerprint}");
        Ok(CacheResult::Miss)
    }

    /// Commits a fresh build: captures artifacts and outputs, stores the
    /// record locally and, when enabled, remotely.
    pub fn commit(
        &self,
        project: &ProjectModel,
        packer: &dyn ArchivePacker,
        built: &BuiltArtifacts,
        executions: Vec<CompletedExecution>,
        highest_completed_phase: LifecyclePhase,
    ) -> Result<()> {
        let coordinates = &project.coordinates;
        let info = self.calculator.calculate(project)?;

        if self.config.skip_save() || project.property(props::PROJECT_SKIP) == Some("true") {
            debug!("not saving build of {coordinates}, save is disabled");
            self.report_built(coordinates, &info.checksum);
            return Ok(());
        }
        // builds that stopped before tests are only cacheable when the
        // compile-phase policy allows it
        if !self.config.cache_compile() && highest_completed_phase < LifecyclePhase::Test {
            debug!(
                "not saving build of {coordinates}, it only reached {highest_completed_phase}"
            );
            self.report_built(coordinates, &info.checksum);
            return Ok(());
        }

        let mut record =
            BuildRecord::new(coordinates, (*info).clone(), highest_completed_phase);
        record.completed_executions.executions = executions;

        let algorithm = self.config.hash_algorithm();
        let mut files: Vec<(String, PathBuf)> = Vec::new();
        let mut scratch: Vec<PathBuf> = Vec::new();

        if let Some(primary) = &built.primary {
            let file_name = file_name_of(&primary.path)?;
            if self.config.is_output_excluded(&file_name) {
                debug!("primary artifact {file_name} excluded from cached outputs");
            } else {
                record.artifacts.primary = Some(ArtifactEntry {
                    role: ArtifactRole::Primary,
                    classifier: primary.classifier.clone(),
                    extension: primary.extension.clone(),
                    file_name: file_name.clone(),
                    hash: algorithm.hash_file(&primary.path)?,
                });
                files.push((file_name, primary.path.clone()));
            }
        }
        for attached in &built.attached {
            let file_name = file_name_of(&attached.path)?;
            if self.config.is_output_excluded(&file_name) {
                debug!("attached artifact {file_name} excluded from cached outputs");
                continue;
            }
            record.artifacts.attached.push(ArtifactEntry {
                role: ArtifactRole::Primary,
                classifier: attached.classifier.clone(),
                extension: attached.extension.clone(),
                file_name: file_name.clone(),
                hash: algorithm.hash_file(&attached.path)?,
            });
            files.push((file_name, attached.path.clone()));
        }

        // capture generated sources and configured extra output dirs
        let generated = project.build_dir.join(GENERATED_SOURCES_DIR);
        if generated.is_dir() {
            if let Some((entry, archive)) = self.pack_dir(
                project,
                packer,
                &generated,
                ArtifactRole::GeneratedSource,
                GENERATED_SOURCES_DIR,
            )? {
                files.push((entry.file_name.clone(), archive.clone()));
                record.artifacts.attached.push(entry);
                scratch.push(archive);
            }
        }
        for dir_name in self.config.attached_output_dirs() {
            let dir = project.build_dir.join(dir_name);
            if !dir.is_dir() {
                continue;
            }
            if let Some((entry, archive)) =
                self.pack_dir(project, packer, &dir, ArtifactRole::ExtraOutput, dir_name)?
            {
                files.push((entry.file_name.clone(), archive.clone()));
                record.artifacts.attached.push(entry);
                scratch.push(archive);
            }
        }

        self.store.put_local(&record, &files)?;
        if self.config.remote().enabled && self.config.remote().save_to_remote {
            self.store.put_remote(&record, &files)?;
        }
        for archive in scratch {
            if let Err(err) = std::fs::remove_file(&archive) {
                trace!("cannot remove scratch archive \"{}\": {err}", archive.display());
            }
        }

        info!("saved build of {coordinates} with fingerprint {}", record.checksum());
        self.report_built(coordinates, &info.checksum);
        Ok(())
    }

    /// Packs one output directory into an archive entry.
    fn pack_dir(
        &self,
        project: &ProjectModel,
        packer: &dyn ArchivePacker,
        dir: &std::path::Path,
        role: ArtifactRole,
        dir_name: &str,
    ) -> Result<Option<(ArtifactEntry, PathBuf)>> {
        let coordinates = &project.coordinates;
        let file_name =
            format!("{}-{}-{dir_name}.zip", coordinates.artifact_id, coordinates.version);
        let archive = project.build_dir.join(&file_name);
        let has_files = packer.pack(dir, &archive, "*", true)?;
        if !has_files {
            trace!("nothing to capture under \"{}\"", dir.display());
            return Ok(None);
        }
        let entry = ArtifactEntry {
            role,
            classifier: Some(dir_name.to_string()),
            extension: "zip".into(),
            file_name,
            hash: self.config.hash_algorithm().hash_file(&archive)?,
        };
        Ok(Some((entry, archive)))
    }

    fn report_built(&self, coordinates: &Coordinates, checksum: &crate::hash::Fingerprint) {
        self.reporter.record_outcome(coordinates, checksum.clone(), CacheSource::Built, None);
    }
}

fn file_name_of(path: &std::path::Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| CacheError::msg(format!("artifact path \"{}\" has no file name", path.display())))
}
