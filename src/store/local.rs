//! Local filesystem build-record store.
//!
//! Layout, rooted under the configurable cache root:
//!
//! ```text
//! <root>/<cacheImplVersion>/<groupId>/<artifactId>/<fingerprint>/
//!     buildinfo.xml
//!     <primary-artifact-filename>
//!     <attached-artifact-filenames...>
//! ```
//!
//! Every file is written to a `.tmp` sibling and renamed into place, so
//! concurrent writers of the same record converge on last-writer-wins
//! without readers ever seeing a torn record.

use crate::{
    error::{CacheError, Result},
    host::Coordinates,
    record::{BuildRecord, CacheSource, BUILD_INFO_XML, CACHE_IMPL_VERSION},
    utils,
};
use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

#[derive(Debug)]
pub struct LocalBuildCache {
    root: PathBuf,
    max_builds: usize,
}

impl LocalBuildCache {
    pub fn new(root: PathBuf, max_builds: usize) -> Self {
        Self { root, max_builds: max_builds.max(1) }
    }

    /// Default root under the user's home cache directory.
    pub fn default_root() -> PathBuf {
        dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("reactor-cache")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory containing every cached build of the artifact.
    fn artifact_dir(&self, coordinates: &Coordinates) -> PathBuf {
        self.root
            .join(CACHE_IMPL_VERSION)
            .join(&coordinates.group_id)
            .join(&coordinates.artifact_id)
    }

    /// Directory of one record.
    pub fn record_dir(&self, coordinates: &Coordinates, fingerprint: &str) -> PathBuf {
        self.artifact_dir(coordinates).join(fingerprint)
    }

    /// Absolute path of a cached artifact file.
    pub fn artifact_path(
        &self,
        coordinates: &Coordinates,
        fingerprint: &str,
        file_name: &str,
    ) -> PathBuf {
        self.record_dir(coordinates, fingerprint).join(file_name)
    }

    /// Looks the record up by fingerprint. A present but unreadable record
    /// surfaces as [`CacheError::Corrupt`] so the caller can apply the
    /// `failFast` policy.
    pub fn find(&self, coordinates: &Coordinates, fingerprint: &str) -> Result<Option<BuildRecord>> {
        let dir = self.record_dir(coordinates, fingerprint);
        let build_info = dir.join(BUILD_INFO_XML);
        if !build_info.exists() {
            return Ok(None);
        }
        let mut record = BuildRecord::read(&build_info)
            .map_err(|err| CacheError::Corrupt(coordinates.to_string(), err.to_string()))?;
        for entry in record.artifact_entries() {
            if !dir.join(&entry.file_name).exists() {
                return Err(CacheError::Corrupt(
                    coordinates.to_string(),
                    format!("artifact {} missing from {}", entry.file_name, dir.display()),
                ));
            }
        }
        record.source = CacheSource::Local;
        trace!("found local build of {coordinates} under \"{}\"", dir.display());
        Ok(Some(record))
    }

    /// Stores the record and its artifact files, then evicts the oldest
    /// builds beyond the retention limit.
    pub fn put(
        &self,
        record: &BuildRecord,
        files: &[(String, PathBuf)],
    ) -> Result<PathBuf> {
        let coordinates = record.coordinates.to_coordinates();
        let fingerprint = record.checksum().to_hex();
        let dir = self.record_dir(&coordinates, &fingerprint);
        fs::create_dir_all(&dir).map_err(|err| CacheError::io(err, &dir))?;

        for (file_name, source) in files {
            utils::copy_atomic(source, &dir.join(file_name))?;
        }
        let body = record.to_xml()?;
        utils::write_atomic(&dir.join(BUILD_INFO_XML), body.as_bytes())?;
        debug!("stored build of {coordinates} under \"{}\"", dir.display());

        self.evict_stale(&coordinates, &fingerprint);
        Ok(dir)
    }

    /// Keeps the newest `max_builds` records of the artifact, by mtime. The
    /// scan tolerates concurrent writers; removal failures only log.
    fn evict_stale(&self, coordinates: &Coordinates, keep_fingerprint: &str) {
        let artifact_dir = self.artifact_dir(coordinates);
        let Ok(entries) = fs::read_dir(&artifact_dir) else { return };
        let mut records: Vec<(SystemTime, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((modified, entry.path()))
            })
            .collect();
        if records.len() <= self.max_builds {
            return;
        }
        records.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, stale) in records.into_iter().skip(self.max_builds) {
            if stale.file_name().map(|name| name == keep_fingerprint).unwrap_or_default() {
                continue;
            }
            debug!("evicting cached build \"{}\"", stale.display());
            if let Err(err) = fs::remove_dir_all(&stale) {
                warn!("cannot evict \"{}\": {err}", stale.display());
            }
        }
    }
}
