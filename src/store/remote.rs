//! Remote build-record store over the session transport.

use crate::{
    config::RemoteConfig,
    error::{CacheError, Result, TransportError},
    host::Coordinates,
    record::{BuildRecord, CacheSource, BUILD_INFO_XML},
    transport::RemoteTransport,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Debug)]
pub struct RemoteBuildCache {
    transport: Arc<RemoteTransport>,
    save_to_remote: bool,
    save_final: bool,
}

impl RemoteBuildCache {
    pub fn new(transport: Arc<RemoteTransport>, config: &RemoteConfig) -> Self {
        Self { transport, save_to_remote: config.save_to_remote, save_final: config.save_final }
    }

    pub fn transport(&self) -> &Arc<RemoteTransport> {
        &self.transport
    }

    /// Fetches the record by fingerprint, tolerating transport failures per
    /// the configured policy. A document that no longer parses is corrupt.
    pub fn find(&self, coordinates: &Coordinates, fingerprint: &str) -> Result<Option<BuildRecord>> {
        let url = self.transport.record_url(coordinates, fingerprint, BUILD_INFO_XML)?;
        let Some(bytes) = self.transport.get_tolerant(&url)? else {
            return Ok(None);
        };
        let contents = String::from_utf8_lossy(&bytes);
        let mut record = BuildRecord::from_xml(&contents)
            .map_err(|err| CacheError::Corrupt(coordinates.to_string(), err.to_string()))?;
        record.source = CacheSource::Remote;
        trace!("found remote build of {coordinates} at {url}");
        Ok(Some(record))
    }

    /// Uploads the record and its files. An existing record flagged `final`
    /// is never overwritten.
    pub fn put(&self, record: &BuildRecord, files: &[(String, PathBuf)]) -> Result<()> {
        if !self.save_to_remote {
            return Ok(());
        }
        let coordinates = record.coordinates.to_coordinates();
        let fingerprint = record.checksum().to_hex();

        if let Some(existing) = self.find(&coordinates, &fingerprint)? {
            if existing.is_final {
                info!("remote build of {coordinates} is final, keeping the existing record");
                return Ok(());
            }
        }

        let result = self.upload(record, &coordinates, &fingerprint, files);
        match result {
            Ok(()) => Ok(()),
            Err(err) if self.transport.fail_fast() => Err(err.into()),
            Err(err) => {
                warn!("remote save of {coordinates} failed, build continues: {err}");
                Ok(())
            }
        }
    }

    fn upload(
        &self,
        record: &BuildRecord,
        coordinates: &Coordinates,
        fingerprint: &str,
        files: &[(String, PathBuf)],
    ) -> Result<(), TransportError> {
        for (file_name, source) in files {
            let url = self
                .transport
                .record_url(coordinates, fingerprint, file_name)
                .map_err(|err| TransportError::Transport(err.to_string()))?;
            self.transport.put_file(&url, source)?;
        }

        let mut uploaded = record.clone();
        uploaded.is_final = self.save_final;
        let body = uploaded
            .to_xml()
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        let url = self
            .transport
            .record_url(coordinates, fingerprint, BUILD_INFO_XML)
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        self.transport.put(&url, body.into_bytes())?;
        info!("saved build of {coordinates} to remote cache");
        Ok(())
    }

    /// Downloads one artifact of the record into `dest`.
    pub fn download(
        &self,
        coordinates: &Coordinates,
        fingerprint: &str,
        file_name: &str,
        dest: &Path,
    ) -> Result<(), TransportError> {
        let url = self
            .transport
            .record_url(coordinates, fingerprint, file_name)
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        if self.transport.get_to_file(&url, dest)? {
            Ok(())
        } else {
            Err(TransportError::NotFound(url.to_string()))
        }
    }
}
