//! Persisted representation of a cached build.
//!
//! A [`BuildRecord`] is written as `buildinfo.xml` next to the artifacts it
//! indexes, both in the local store layout and in the remote key/value
//! store. Records are immutable once published; writers replace them
//! atomically.

use crate::{
    error::Result,
    hash::Fingerprint,
    host::{Coordinates, LifecyclePhase},
    input::ProjectsInputInfo,
    utils,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Version discriminator of the store layout and record schema.
pub const CACHE_IMPL_VERSION: &str = "v1";

/// File name of the serialized record inside its store directory.
pub const BUILD_INFO_XML: &str = "buildinfo.xml";

/// Where a record was found.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheSource {
    #[default]
    Local,
    Remote,
    /// Not cached; the project was built fresh this session.
    Built,
}

impl std::fmt::Display for CacheSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CacheSource::Local => "LOCAL",
            CacheSource::Remote => "REMOTE",
            CacheSource::Built => "BUILT",
        };
        f.write_str(name)
    }
}

/// Role of an artifact inside a build record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactRole {
    Primary,
    GeneratedSource,
    ExtraOutput,
}

/// One artifact captured with the build. `file_name` is the relative key
/// inside the record's directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    #[serde(rename = "@role")]
    pub role: ArtifactRole,
    #[serde(rename = "@classifier", default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    #[serde(rename = "@extension")]
    pub extension: String,
    #[serde(rename = "@fileName")]
    pub file_name: String,
    #[serde(rename = "@hash")]
    pub hash: Fingerprint,
}

/// A tracked (or informational) plugin parameter snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertySnapshot {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "@tracked", default, skip_serializing_if = "std::ops::Not::not")]
    pub tracked: bool,
}

/// Snapshot of one completed build step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletedExecution {
    #[serde(rename = "@id")]
    pub step_id: String,
    #[serde(rename = "property", default)]
    pub parameters: Vec<PropertySnapshot>,
}

impl CompletedExecution {
    pub fn parameter(&self, name: &str) -> Option<&PropertySnapshot> {
        self.parameters.iter().find(|parameter| parameter.name == name)
    }
}

/// Document container for the completed-step snapshots.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletedExecutions {
    #[serde(rename = "execution", default)]
    pub executions: Vec<CompletedExecution>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordArtifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<ArtifactEntry>,
    #[serde(rename = "attached", default)]
    pub attached: Vec<ArtifactEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordCoordinates {
    #[serde(rename = "@groupId")]
    pub group_id: String,
    #[serde(rename = "@artifactId")]
    pub artifact_id: String,
    #[serde(rename = "@version")]
    pub version: String,
}

impl From<&Coordinates> for RecordCoordinates {
    fn from(coordinates: &Coordinates) -> Self {
        Self {
            group_id: coordinates.group_id.clone(),
            artifact_id: coordinates.artifact_id.clone(),
            version: coordinates.version.clone(),
        }
    }
}

impl RecordCoordinates {
    pub fn to_coordinates(&self) -> Coordinates {
        Coordinates::new(&self.group_id, &self.artifact_id, &self.version)
    }
}

/// A cached build: fingerprint inputs, artifact index and completed-step
/// snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename = "build", rename_all = "camelCase")]
pub struct BuildRecord {
    #[serde(rename = "@schemaVersion")]
    pub schema_version: String,
    /// A final remote record is never overwritten.
    #[serde(rename = "@final", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_final: bool,
    pub coordinates: RecordCoordinates,
    pub projects_input_info: ProjectsInputInfo,
    pub artifacts: RecordArtifacts,
    #[serde(default)]
    pub completed_executions: CompletedExecutions,
    pub highest_completed_phase: LifecyclePhase,
    /// Where this record was loaded from; not part of the document.
    #[serde(skip, default)]
    pub source: CacheSource,
}

impl BuildRecord {
    pub fn new(
        coordinates: &Coordinates,
        input_info: ProjectsInputInfo,
        highest_completed_phase: LifecyclePhase,
    ) -> Self {
        Self {
            schema_version: CACHE_IMPL_VERSION.to_string(),
            is_final: false,
            coordinates: coordinates.into(),
            projects_input_info: input_info,
            artifacts: RecordArtifacts::default(),
            completed_executions: CompletedExecutions::default(),
            highest_completed_phase,
            source: CacheSource::Built,
        }
    }

    pub fn checksum(&self) -> &Fingerprint {
        &self.projects_input_info.checksum
    }

    /// The fingerprint-input snapshot. Alias kept close to the document
    /// element name.
    pub fn input_info(&self) -> &ProjectsInputInfo {
        &self.projects_input_info
    }

    pub fn execution(&self, step_id: &str) -> Option<&CompletedExecution> {
        self.completed_executions.executions.iter().find(|execution| execution.step_id == step_id)
    }

    /// All artifact entries, primary first.
    pub fn artifact_entries(&self) -> impl Iterator<Item = &ArtifactEntry> {
        self.artifacts.primary.iter().chain(self.artifacts.attached.iter())
    }

    pub fn read(path: &Path) -> Result<Self> {
        utils::read_xml_file(path)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        utils::write_xml_file(self, "build", path)
    }

    pub fn to_xml(&self) -> Result<String> {
        utils::to_xml_string(self, "build")
    }

    pub fn from_xml(contents: &str) -> Result<Self> {
        utils::from_xml_str("buildinfo", contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CacheConfig,
        host::Session,
        input::{DigestItem, DigestItemKind},
    };

    fn sample_record() -> BuildRecord {
        let session = Session::default();
        let config = CacheConfig::initialize(&session, None).unwrap();
        let algorithm = config.hash_algorithm();
        let items = vec![
            DigestItem::new(DigestItemKind::Pom, "effective-pom", algorithm.hash(b"<project/>")),
            DigestItem::new(DigestItemKind::File, "src/main/java/Foo.java", algorithm.hash(b"A")),
            DigestItem::new(DigestItemKind::Dependency, "g:lib", algorithm.hash(b"lib")),
        ];
        let info = ProjectsInputInfo {
            checksum: ProjectsInputInfo::aggregate(&config, &items),
            items,
        };
        let mut record = BuildRecord::new(
            &Coordinates::new("g", "a", "1.0"),
            info,
            LifecyclePhase::Package,
        );
        record.artifacts.primary = Some(ArtifactEntry {
            role: ArtifactRole::Primary,
            classifier: None,
            extension: "jar".into(),
            file_name: "a-1.0.jar".into(),
            hash: algorithm.hash(b"jar-bytes"),
        });
        record.artifacts.attached.push(ArtifactEntry {
            role: ArtifactRole::GeneratedSource,
            classifier: Some("sources".into()),
            extension: "zip".into(),
            file_name: "a-1.0-generated-sources.zip".into(),
            hash: algorithm.hash(b"src-bytes"),
        });
        record.completed_executions.executions.push(CompletedExecution {
            step_id: "maven-surefire-plugin:test@default-test".into(),
            parameters: vec![
                PropertySnapshot {
                    name: "skipTests".into(),
                    value: Some("false".into()),
                    tracked: true,
                },
                PropertySnapshot { name: "reportFormat".into(), value: None, tracked: false },
            ],
        });
        record
    }

    #[test]
    fn xml_round_trip_preserves_all_fields() {
        let record = sample_record();
        let xml = record.to_xml().unwrap();
        let parsed = BuildRecord::from_xml(&xml).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn final_flag_survives_round_trip() {
        let mut record = sample_record();
        record.is_final = true;
        let parsed = BuildRecord::from_xml(&record.to_xml().unwrap()).unwrap();
        assert!(parsed.is_final);
    }

    #[test]
    fn source_is_runtime_only() {
        let mut record = sample_record();
        record.source = CacheSource::Remote;
        let parsed = BuildRecord::from_xml(&record.to_xml().unwrap()).unwrap();
        assert_eq!(parsed.source, CacheSource::Built);
    }

    #[test]
    fn write_and_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buildinfo.xml");
        let record = sample_record();
        record.write(&path).unwrap();
        let read_back = BuildRecord::read(&path).unwrap();
        assert_eq!(read_back.checksum(), record.checksum());
        assert_eq!(read_back.artifact_entries().count(), 2);
    }
}
