//! Per-session cache report and baseline access.
//!
//! The report lists every project's fingerprint and where its build came
//! from. In baseline-diff mode the report of a reference build is fetched
//! from the baseline cache and the per-project baseline records are served
//! to the input analyzer for comparison.

use crate::{
    error::Result,
    hash::Fingerprint,
    host::Coordinates,
    record::{BuildRecord, CacheSource, BUILD_INFO_XML},
    transport::RemoteTransport,
    utils,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};
use url::Url;

/// File name of the serialized report.
pub const CACHE_REPORT_XML: &str = "cache-report.xml";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename = "report")]
pub struct CacheReport {
    pub projects: ReportProjects,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportProjects {
    #[serde(rename = "project", default)]
    pub entries: Vec<ProjectReportEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectReportEntry {
    #[serde(rename = "@groupId")]
    pub group_id: String,
    #[serde(rename = "@artifactId")]
    pub artifact_id: String,
    #[serde(rename = "@checksum")]
    pub checksum: Fingerprint,
    #[serde(rename = "@source")]
    pub source: CacheSource,
    #[serde(rename = "@url", default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CacheReport {
    pub fn entry(&self, coordinates: &Coordinates) -> Option<&ProjectReportEntry> {
        self.projects.entries.iter().find(|entry| {
            entry.group_id == coordinates.group_id && entry.artifact_id == coordinates.artifact_id
        })
    }

    pub fn to_xml(&self) -> Result<String> {
        utils::to_xml_string(self, "report")
    }

    pub fn from_xml(contents: &str) -> Result<Self> {
        utils::from_xml_str("cache-report", contents)
    }
}

/// Collects per-project outcomes and serves the baseline.
pub struct Reporter {
    entries: Mutex<Vec<ProjectReportEntry>>,
    baseline_source: Option<(Arc<RemoteTransport>, String)>,
    baseline: OnceCell<Option<CacheReport>>,
    baseline_records: Mutex<HashMap<(String, String), Option<Arc<BuildRecord>>>>,
}

impl Reporter {
    /// `baseline_source` carries the transport and the configured
    /// `baselineCacheUrl` when baseline-diff mode is on.
    pub fn new(baseline_source: Option<(Arc<RemoteTransport>, String)>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            baseline_source,
            baseline: OnceCell::new(),
            baseline_records: Mutex::new(HashMap::new()),
        }
    }

    /// Records one project's outcome.
    pub fn record_outcome(
        &self,
        coordinates: &Coordinates,
        checksum: Fingerprint,
        source: CacheSource,
        url: Option<String>,
    ) {
        let entry = ProjectReportEntry {
            group_id: coordinates.group_id.clone(),
            artifact_id: coordinates.artifact_id.clone(),
            checksum,
            source,
            url,
        };
        self.entries.lock().expect("report entries poisoned").push(entry);
    }

    pub fn report(&self) -> CacheReport {
        CacheReport {
            projects: ReportProjects {
                entries: self.entries.lock().expect("report entries poisoned").clone(),
            },
        }
    }

    /// Writes `cache-report.xml` to the given directory or file path.
    pub fn write(&self, path: &Path) -> Result<()> {
        let path =
            if path.is_dir() { path.join(CACHE_REPORT_XML) } else { path.to_path_buf() };
        let report = self.report();
        utils::write_xml_file(&report, "report", &path)?;
        debug!("wrote cache report with {} projects to \"{}\"", report.projects.entries.len(), path.display());
        Ok(())
    }

    /// The baseline build record of the project, fetched and memoized on
    /// first request.
    pub fn baseline_record(&self, coordinates: &Coordinates) -> Option<Arc<BuildRecord>> {
        let (transport, _) = self.baseline_source.as_ref()?;
        let report = self.baseline().as_ref()?;
        let entry = report.entry(coordinates)?;

        let key = (entry.group_id.clone(), entry.artifact_id.clone());
        let mut records = self.baseline_records.lock().expect("baseline records poisoned");
        if let Some(cached) = records.get(&key) {
            return cached.clone();
        }
        let record = fetch_baseline_record(transport, entry);
        records.insert(key, record.clone());
        record
    }

    fn baseline(&self) -> &Option<CacheReport> {
        self.baseline.get_or_init(|| {
            let (transport, baseline_url) = self.baseline_source.as_ref()?;
            let url = report_location(baseline_url)?;
            let bytes = transport.get_tolerant(&url).ok().flatten()?;
            match CacheReport::from_xml(&String::from_utf8_lossy(&bytes)) {
                Ok(report) => {
                    info!(
                        "loaded baseline report with {} projects from {url}",
                        report.projects.entries.len()
                    );
                    Some(report)
                }
                Err(err) => {
                    warn!("baseline report at {url} is unreadable: {err}");
                    None
                }
            }
        })
    }
}

fn report_location(baseline_url: &str) -> Option<Url> {
    let url = if baseline_url.ends_with(".xml") {
        baseline_url.to_string()
    } else {
        format!("{}/{}", baseline_url.trim_end_matches('/'), CACHE_REPORT_XML)
    };
    match Url::parse(&url) {
        Ok(url) => Some(url),
        Err(err) => {
            warn!("invalid baseline url {baseline_url:?}: {err}");
            None
        }
    }
}

fn fetch_baseline_record(
    transport: &RemoteTransport,
    entry: &ProjectReportEntry,
) -> Option<Arc<BuildRecord>> {
    let base = entry.url.as_deref()?;
    let url = Url::parse(&format!("{}/{}", base.trim_end_matches('/'), BUILD_INFO_XML)).ok()?;
    let bytes = transport.get_tolerant(&url).ok().flatten()?;
    match BuildRecord::from_xml(&String::from_utf8_lossy(&bytes)) {
        Ok(record) => Some(Arc::new(record)),
        Err(err) => {
            warn!("baseline record at {url} is unreadable: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashAlgorithm;

    #[test]
    fn report_round_trips() {
        let reporter = Reporter::new(None);
        reporter.record_outcome(
            &Coordinates::new("g", "a", "1.0"),
            HashAlgorithm::Sha256.hash(b"a"),
            CacheSource::Local,
            None,
        );
        reporter.record_outcome(
            &Coordinates::new("g", "b", "1.0"),
            HashAlgorithm::Sha256.hash(b"b"),
            CacheSource::Remote,
            Some("http://cache.example.com/cache/v1/g/b/f2".into()),
        );
        let report = reporter.report();
        let parsed = CacheReport::from_xml(&report.to_xml().unwrap()).unwrap();
        assert_eq!(parsed, report);
        assert_eq!(parsed.projects.entries[1].source, CacheSource::Remote);
        assert!(parsed.entry(&Coordinates::new("g", "a", "1.0")).is_some());
        assert!(parsed.entry(&Coordinates::new("g", "missing", "1.0")).is_none());
    }

    #[test]
    fn write_into_directory_uses_canonical_name() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(None);
        reporter.write(dir.path()).unwrap();
        assert!(dir.path().join(CACHE_REPORT_XML).exists());
    }
}
