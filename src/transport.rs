//! GET/PUT/HEAD against the remote cache endpoint.
//!
//! One transport is constructed per session and shared read-only. Transport
//! failures are mapped to the error taxonomy at this boundary; read paths
//! are failure-tolerant unless `failFast` is configured.

use crate::{
    config::RemoteConfig,
    error::{CacheError, Result, TransportError},
    host::{Coordinates, Session},
    record::CACHE_IMPL_VERSION,
    utils,
};
use std::{fs, path::Path, time::Duration};
use url::Url;

/// Shared HTTP-like transport for the remote build cache.
#[derive(Debug)]
pub struct RemoteTransport {
    client: reqwest::blocking::Client,
    base_url: Url,
    credentials: Option<(String, String)>,
    fail_fast: bool,
}

impl RemoteTransport {
    /// Builds the session transport. Credentials are resolved from the
    /// session's server records by `remote.id`.
    pub fn new(config: &RemoteConfig, session: &Session) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|err| CacheError::config(format!("invalid remote url {:?}: {err}", config.url)))?;
        let credentials = session
            .server(&config.id)
            .map(|server| (server.username.clone(), server.password.clone()));
        if credentials.is_none() && !config.id.is_empty() {
            debug!("no server record for remote cache id {:?}, proceeding anonymously", config.id);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .map_err(|err| CacheError::config(format!("cannot build remote client: {err}")))?;
        Ok(Self { client, base_url, credentials, fail_fast: config.fail_fast })
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `<baseUrl>/<cacheImplVersion>/<groupId>/<artifactId>/<fingerprint>/<filename>`
    pub fn record_url(
        &self,
        coordinates: &Coordinates,
        fingerprint: &str,
        file_name: &str,
    ) -> Result<Url> {
        self.join(&[
            CACHE_IMPL_VERSION,
            &coordinates.group_id,
            &coordinates.artifact_id,
            fingerprint,
            file_name,
        ])
    }

    /// Directory URL of one record, without a file name.
    pub fn record_dir_url(&self, coordinates: &Coordinates, fingerprint: &str) -> Result<Url> {
        self.join(&[
            CACHE_IMPL_VERSION,
            &coordinates.group_id,
            &coordinates.artifact_id,
            fingerprint,
        ])
    }

    /// `<baseUrl>/<cacheImplVersion>/<groupId>/<artifactId>/<buildId>/cache-report.xml`
    pub fn report_url(&self, coordinates: &Coordinates, build_id: &str) -> Result<Url> {
        self.join(&[
            CACHE_IMPL_VERSION,
            &coordinates.group_id,
            &coordinates.artifact_id,
            build_id,
            crate::report::CACHE_REPORT_XML,
        ])
    }

    fn join(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CacheError::config(format!("remote url {} cannot carry paths", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Fetches the resource as bytes. `Ok(None)` means not found.
    pub fn get(&self, url: &Url) -> Result<Option<Vec<u8>>, TransportError> {
        trace!("GET {url}");
        let response = self.send(self.client.get(url.clone()))?;
        match self.classify(url, response)? {
            Some(response) => {
                let bytes =
                    response.bytes().map_err(|err| TransportError::Transport(err.to_string()))?;
                Ok(Some(bytes.to_vec()))
            }
            None => Ok(None),
        }
    }

    /// Downloads the resource into `dest`. Returns `false` when not found.
    pub fn get_to_file(&self, url: &Url, dest: &Path) -> Result<bool, TransportError> {
        trace!("GET {url} -> \"{}\"", dest.display());
        let response = self.send(self.client.get(url.clone()))?;
        let Some(mut response) = self.classify(url, response)? else {
            return Ok(false);
        };
        utils::create_parent_dir_all(dest)
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        let mut file =
            fs::File::create(dest).map_err(|err| TransportError::Transport(err.to_string()))?;
        response
            .copy_to(&mut file)
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        Ok(true)
    }

    /// Uploads the given bytes.
    pub fn put(&self, url: &Url, body: Vec<u8>) -> Result<(), TransportError> {
        trace!("PUT {url} ({} bytes)", body.len());
        let response = self.send(self.client.put(url.clone()).body(body))?;
        self.classify(url, response)?
            .map(drop)
            .ok_or_else(|| TransportError::NotFound(url.to_string()))
    }

    /// Uploads the file at `path`.
    pub fn put_file(&self, url: &Url, path: &Path) -> Result<(), TransportError> {
        let file =
            fs::File::open(path).map_err(|err| TransportError::Transport(err.to_string()))?;
        trace!("PUT {url} from \"{}\"", path.display());
        let response = self.send(self.client.put(url.clone()).body(file))?;
        self.classify(url, response)?
            .map(drop)
            .ok_or_else(|| TransportError::NotFound(url.to_string()))
    }

    /// Whether the resource exists.
    pub fn head(&self, url: &Url) -> Result<bool, TransportError> {
        trace!("HEAD {url}");
        let response = self.send(self.client.head(url.clone()))?;
        Ok(self.classify(url, response)?.is_some())
    }

    /// Read with the configured failure policy applied: not-found is empty,
    /// transport failures are logged and empty unless `failFast` is set.
    pub fn get_tolerant(&self, url: &Url) -> Result<Option<Vec<u8>>> {
        match self.get(url) {
            Ok(found) => Ok(found),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) if self.fail_fast => Err(err.into()),
            Err(err) => {
                warn!("remote cache read of {url} failed, continuing without: {err}");
                Ok(None)
            }
        }
    }

    fn send(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<reqwest::blocking::Response, TransportError> {
        let request = match &self.credentials {
            Some((username, password)) => request.basic_auth(username, Some(password)),
            None => request,
        };
        request.send().map_err(|err| TransportError::Transport(err.to_string()))
    }

    fn classify(
        &self,
        url: &Url,
        response: reqwest::blocking::Response,
    ) -> Result<Option<reqwest::blocking::Response>, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(Some(response));
        }
        match status.as_u16() {
            404 => Ok(None),
            401 | 403 => Err(TransportError::Unauthorized(url.to_string())),
            code => Err(TransportError::Transport(format!("{url} answered {code}"))),
        }
    }
}
