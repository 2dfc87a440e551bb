//! Build-record persistence: local filesystem layout plus the optional
//! remote key/value store.

pub mod local;
pub mod remote;

pub use local::LocalBuildCache;
pub use remote::RemoteBuildCache;

use crate::{
    error::Result,
    host::Coordinates,
    record::{ArtifactEntry, BuildRecord},
    utils,
};
use std::{path::Path, sync::Arc};

/// Facade over the local store and the optional remote store.
#[derive(Debug)]
pub struct BuildRecordStore {
    local: Arc<LocalBuildCache>,
    remote: Option<Arc<RemoteBuildCache>>,
}

impl BuildRecordStore {
    pub fn new(local: Arc<LocalBuildCache>, remote: Option<Arc<RemoteBuildCache>>) -> Self {
        Self { local, remote }
    }

    pub fn local(&self) -> &Arc<LocalBuildCache> {
        &self.local
    }

    pub fn remote(&self) -> Option<&Arc<RemoteBuildCache>> {
        self.remote.as_ref()
    }

    pub fn find_local(
        &self,
        coordinates: &Coordinates,
        fingerprint: &str,
    ) -> Result<Option<BuildRecord>> {
        self.local.find(coordinates, fingerprint)
    }

    pub fn find_remote(
        &self,
        coordinates: &Coordinates,
        fingerprint: &str,
    ) -> Result<Option<BuildRecord>> {
        match &self.remote {
            Some(remote) => remote.find(coordinates, fingerprint),
            None => Ok(None),
        }
    }

    pub fn put_local(
        &self,
        record: &BuildRecord,
        files: &[(String, std::path::PathBuf)],
    ) -> Result<()> {
        self.local.put(record, files).map(drop)
    }

    pub fn put_remote(
        &self,
        record: &BuildRecord,
        files: &[(String, std::path::PathBuf)],
    ) -> Result<()> {
        match &self.remote {
            Some(remote) => remote.put(record, files),
            None => Ok(()),
        }
    }

    /// Copies one artifact of the record to `dest`, downloading it from the
    /// remote store when the record came from there.
    pub fn materialize(
        &self,
        record: &BuildRecord,
        entry: &ArtifactEntry,
        dest: &Path,
    ) -> Result<()> {
        let coordinates = record.coordinates.to_coordinates();
        let fingerprint = record.checksum().to_hex();
        let local_path = self.local.artifact_path(&coordinates, &fingerprint, &entry.file_name);
        if local_path.exists() {
            return utils::copy_atomic(&local_path, dest);
        }
        if let Some(remote) = &self.remote {
            remote.download(&coordinates, &fingerprint, &entry.file_name, dest)?;
            return Ok(());
        }
        Err(crate::error::CacheError::Restore(
            entry.file_name.clone(),
            format!("artifact not present under \"{}\"", local_path.display()),
        ))
    }
}
