//! Restoring cached artifacts to their on-disk locations.
//!
//! Plain artifact files are copied (or downloaded) to the project build
//! dir; `generatedSource` and `extraOutput` entries are archives and are
//! unpacked through the host's [`ArchivePacker`]. With `lazyRestore`, plain
//! files materialize through an [`ArtifactHandle`]: a single-shot promise
//! that runs the download on the first consumer's thread while later
//! consumers join the finished result.

use crate::{
    config::{props, CacheConfig},
    error::{CacheError, Result},
    hash::HashAlgorithm,
    host::{ArchivePacker, ProjectModel, Session},
    record::{ArtifactEntry, ArtifactRole, BuildRecord, CacheSource},
    store::{BuildRecordStore, LocalBuildCache, RemoteBuildCache},
    utils,
};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
};

/// Directory under the build root where generated sources are captured and
/// restored.
pub const GENERATED_SOURCES_DIR: &str = "generated-sources";

type MaterializeJob = Box<dyn FnOnce() -> Result<PathBuf> + Send>;

enum HandleState {
    Pending(MaterializeJob),
    Running,
    Ready(PathBuf),
    Failed(String),
}

/// Ownership-transfer handle over one artifact's materialization.
///
/// On first `materialize()` the pending download runs synchronously on the
/// caller's thread; concurrent callers block until it finishes and observe
/// the same outcome. A session cancellation before consumption surfaces as
/// [`CacheError::Cancelled`].
pub struct ArtifactHandle {
    file_name: String,
    state: Mutex<HandleState>,
    completed: Condvar,
    cancelled: Arc<AtomicBool>,
}

impl ArtifactHandle {
    /// A handle over an already materialized file.
    pub fn ready(file_name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            file_name: file_name.into(),
            state: Mutex::new(HandleState::Ready(path)),
            completed: Condvar::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle whose materialization is deferred until first consumption.
    pub fn deferred(
        file_name: impl Into<String>,
        cancelled: Arc<AtomicBool>,
        job: MaterializeJob,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            state: Mutex::new(HandleState::Pending(job)),
            completed: Condvar::new(),
            cancelled,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The on-disk path of the artifact, materializing it if needed.
    pub fn materialize(&self) -> Result<PathBuf> {
        let mut state = self.state.lock().expect("artifact handle poisoned");
        loop {
            match &mut *state {
                HandleState::Ready(path) => return Ok(path.clone()),
                HandleState::Failed(reason) => {
                    return Err(CacheError::Restore(self.file_name.clone(), reason.clone()));
                }
                HandleState::Running => {
                    state = self.completed.wait(state).expect("artifact handle poisoned");
                }
                HandleState::Pending(_) => {
                    if self.cancelled.load(Ordering::SeqCst) {
                        return Err(CacheError::Cancelled);
                    }
                    let HandleState::Pending(job) =
                        std::mem::replace(&mut *state, HandleState::Running)
                    else {
                        unreachable!("state changed under the lock");
                    };
                    drop(state);

                    let result = job();
                    let mut state = self.state.lock().expect("artifact handle poisoned");
                    match &result {
                        Ok(path) => *state = HandleState::Ready(path.clone()),
                        Err(err) => *state = HandleState::Failed(err.to_string()),
                    }
                    drop(state);
                    self.completed.notify_all();
                    return result.map_err(|err| match err {
                        CacheError::Cancelled => CacheError::Cancelled,
                        other => CacheError::Restore(self.file_name.clone(), other.to_string()),
                    });
                }
            }
        }
    }
}

/// Restores the artifacts of one cached build.
pub struct ArtifactRestorer<'a> {
    project: &'a ProjectModel,
    record: &'a BuildRecord,
    store: &'a BuildRecordStore,
    packer: &'a dyn ArchivePacker,
    config: &'a CacheConfig,
    session: &'a Session,
}

impl<'a> ArtifactRestorer<'a> {
    pub fn new(
        project: &'a ProjectModel,
        record: &'a BuildRecord,
        store: &'a BuildRecordStore,
        packer: &'a dyn ArchivePacker,
        config: &'a CacheConfig,
        session: &'a Session,
    ) -> Self {
        Self { project, record, store, packer, config, session }
    }

    /// Restores every artifact entry to its canonical location. Plain files
    /// land in the build dir; archives are unpacked. Returns a handle per
    /// plain-file entry.
    pub fn restore(&self) -> Result<Vec<ArtifactHandle>> {
        if self.project.property(props::PROJECT_RESTORE_ARTIFACTS) == Some("false") {
            debug!(
                "artifact restoration of {} disabled by project property",
                self.project.coordinates
            );
            return Ok(Vec::new());
        }

        let lazy = self.record.source == CacheSource::Remote && self.config.remote().lazy_restore;
        let mut handles = Vec::new();
        for entry in self.record.artifact_entries() {
            if self.session.is_cancelled() {
                return Err(CacheError::Cancelled);
            }
            match entry.role {
                ArtifactRole::Primary => {
                    let dest = self.project.build_dir.join(&entry.file_name);
                    let handle = self.file_handle(entry, dest, lazy)?;
                    handles.push(handle);
                }
                ArtifactRole::GeneratedSource => {
                    if self.config.restore_generated_sources() {
                        self.unpack(entry, &self.project.build_dir.join(GENERATED_SOURCES_DIR))?;
                    }
                }
                ArtifactRole::ExtraOutput => {
                    let dir = entry.classifier.as_deref().unwrap_or("extra-output");
                    self.unpack(entry, &self.project.build_dir.join(dir))?;
                }
            }
        }
        info!(
            "restored {} artifacts of {} from {} cache",
            handles.len(),
            self.project.coordinates,
            self.record.source
        );
        Ok(handles)
    }

    /// Copies or schedules the copy of one plain artifact file, verifying
    /// its recorded hash on materialization.
    fn file_handle(
        &self,
        entry: &ArtifactEntry,
        dest: PathBuf,
        lazy: bool,
    ) -> Result<ArtifactHandle> {
        let job = materialize_job(
            self.store.local().clone(),
            self.store.remote().cloned(),
            self.record,
            entry.clone(),
            self.config.hash_algorithm(),
            dest,
        );
        if lazy {
            trace!("deferring restore of {}", entry.file_name);
            Ok(ArtifactHandle::deferred(entry.file_name.clone(), self.session.cancellation(), job))
        } else {
            let handle = ArtifactHandle::deferred(
                entry.file_name.clone(),
                self.session.cancellation(),
                job,
            );
            handle.materialize()?;
            Ok(handle)
        }
    }

    /// Materializes an archive entry into a scratch file and unpacks it.
    fn unpack(&self, entry: &ArtifactEntry, dest_dir: &Path) -> Result<()> {
        let scratch = self.project.build_dir.join(&entry.file_name);
        self.store
            .materialize(self.record, entry, &scratch)
            .map_err(|err| CacheError::Restore(entry.file_name.clone(), err.to_string()))?;
        std::fs::create_dir_all(dest_dir).map_err(|err| CacheError::io(err, dest_dir))?;
        self.packer
            .unpack(&scratch, dest_dir, true)
            .map_err(|err| CacheError::Restore(entry.file_name.clone(), err.to_string()))?;
        if let Err(err) = std::fs::remove_file(&scratch) {
            trace!("cannot remove scratch archive \"{}\": {err}", scratch.display());
        }
        Ok(())
    }
}

/// Builds the deferred materialization closure for one plain-file entry.
fn materialize_job(
    local: Arc<LocalBuildCache>,
    remote: Option<Arc<RemoteBuildCache>>,
    record: &BuildRecord,
    entry: ArtifactEntry,
    algorithm: HashAlgorithm,
    dest: PathBuf,
) -> MaterializeJob {
    let coordinates = record.coordinates.to_coordinates();
    let fingerprint = record.checksum().to_hex();
    Box::new(move || {
        let cached = local.artifact_path(&coordinates, &fingerprint, &entry.file_name);
        if cached.exists() {
            utils::copy_atomic(&cached, &dest)?;
        } else if let Some(remote) = remote {
            remote.download(&coordinates, &fingerprint, &entry.file_name, &dest)?;
        } else {
            return Err(CacheError::msg(format!(
                "artifact not present under \"{}\"",
                cached.display()
            )));
        }
        let actual = algorithm.hash_file(&dest)?;
        if actual != entry.hash {
            return Err(CacheError::Corrupt(
                coordinates.to_string(),
                format!("hash mismatch for {}: {} != {}", entry.file_name, actual, entry.hash),
            ));
        }
        Ok(dest)
    })
}
