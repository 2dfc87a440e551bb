//! The host build tool contract.
//!
//! The engine does not execute builds itself. The host drives it per project
//! and per build step, and hands it this view of its module model: resolved
//! [`ProjectModel`]s, the per-step [`StepExecutor`], an [`ArtifactResolver`]
//! for external dependencies and an [`ArchivePacker`] for cached output
//! blobs.

use crate::error::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// `groupId:artifactId:version` coordinates of a project or artifact.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinates {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl Coordinates {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self { group_id: group_id.into(), artifact_id: artifact_id.into(), version: version.into() }
    }

    /// The `groupId:artifactId` pair identifying the project within the
    /// reactor regardless of version.
    pub fn module_key(&self) -> (String, String) {
        (self.group_id.clone(), self.artifact_id.clone())
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

/// Version markers that resolve to a different concrete artifact over time.
const DYNAMIC_VERSIONS: &[&str] = &["LATEST", "RELEASE"];

/// A declared dependency of a project or plugin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    /// The artifact type, e.g. `jar` or `pom`.
    pub kind: Option<String>,
    pub classifier: Option<String>,
    pub scope: Option<String>,
    /// Only present for `system`-scope dependencies.
    pub system_path: Option<PathBuf>,
}

impl Dependency {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            kind: None,
            classifier: None,
            scope: None,
            system_path: None,
        }
    }

    /// The dedup key `groupId:artifactId[:type][:classifier]`, without the
    /// version.
    pub fn versionless_key(&self) -> String {
        let mut key = format!("{}:{}", self.group_id, self.artifact_id);
        if let Some(kind) = &self.kind {
            key.push(':');
            key.push_str(kind);
        }
        if let Some(classifier) = &self.classifier {
            key.push(':');
            key.push_str(classifier);
        }
        key
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(&self.group_id, &self.artifact_id, &self.version)
    }

    pub fn is_pom(&self) -> bool {
        self.kind.as_deref() == Some("pom")
    }

    pub fn is_snapshot(&self) -> bool {
        self.version.contains("SNAPSHOT")
    }

    pub fn is_dynamic(&self) -> bool {
        DYNAMIC_VERSIONS.contains(&self.version.as_str())
    }

    pub fn is_system_scope(&self) -> bool {
        self.scope.as_deref() == Some("system")
    }
}

/// A generic configuration tree of named elements with text, attributes and
/// child elements. Plugin configuration and the effective model are both
/// delivered in this form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigNode {
    pub name: String,
    pub value: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<ConfigNode>,
}

impl ConfigNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: Some(value.into()), ..Default::default() }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&ConfigNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_value(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|c| c.value.as_deref())
    }
}

/// A build plugin declaration with its configuration trees.
#[derive(Clone, Debug, Default)]
pub struct Plugin {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub configuration: Option<ConfigNode>,
    pub executions: Vec<PluginExecution>,
    pub dependencies: Vec<Dependency>,
}

impl Plugin {
    /// The `groupId:artifactId` plugin key.
    pub fn key(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }
}

/// One configured execution of a plugin.
#[derive(Clone, Debug, Default)]
pub struct PluginExecution {
    pub id: String,
    pub goals: Vec<String>,
    pub phase: Option<LifecyclePhase>,
    pub configuration: Option<ConfigNode>,
}

macro_rules! lifecycle_phases {
    ($(($variant:ident, $name:literal)),+ $(,)?) => {
        /// Lifecycle phases in execution order.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum LifecyclePhase {
            $($variant),+
        }

        impl LifecyclePhase {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }
        }

        impl FromStr for LifecyclePhase {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    other => Err(format!("unknown lifecycle phase {other:?}")),
                }
            }
        }
    };
}

lifecycle_phases! {
    (PreClean, "pre-clean"),
    (Clean, "clean"),
    (PostClean, "post-clean"),
    (Validate, "validate"),
    (Initialize, "initialize"),
    (GenerateSources, "generate-sources"),
    (ProcessSources, "process-sources"),
    (GenerateResources, "generate-resources"),
    (ProcessResources, "process-resources"),
    (Compile, "compile"),
    (ProcessClasses, "process-classes"),
    (GenerateTestSources, "generate-test-sources"),
    (ProcessTestSources, "process-test-sources"),
    (GenerateTestResources, "generate-test-resources"),
    (ProcessTestResources, "process-test-resources"),
    (TestCompile, "test-compile"),
    (ProcessTestClasses, "process-test-classes"),
    (Test, "test"),
    (PreparePackage, "prepare-package"),
    (Package, "package"),
    (PreIntegrationTest, "pre-integration-test"),
    (IntegrationTest, "integration-test"),
    (PostIntegrationTest, "post-integration-test"),
    (Verify, "verify"),
    (Install, "install"),
    (Deploy, "deploy"),
}

impl LifecyclePhase {
    /// Whether the phase belongs to the clean lifecycle.
    pub fn is_clean(&self) -> bool {
        *self <= LifecyclePhase::PostClean
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LifecyclePhase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LifecyclePhase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// A single plugin-goal execution attached to a lifecycle phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildStep {
    pub plugin_group_id: String,
    pub plugin_artifact_id: String,
    pub execution_id: String,
    pub goal: String,
    pub phase: LifecyclePhase,
}

impl BuildStep {
    /// Stable identifier recorded with cached executions.
    pub fn id(&self) -> String {
        format!("{}:{}@{}", self.plugin_artifact_id, self.goal, self.execution_id)
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.plugin_artifact_id, self.goal, self.execution_id)
    }
}

/// The fully resolved view of one project in the reactor.
#[derive(Clone, Debug)]
pub struct ProjectModel {
    pub coordinates: Coordinates,
    /// Packaging of the project, e.g. `jar` or `pom`.
    pub packaging: String,
    pub base_dir: PathBuf,
    pub source_dir: PathBuf,
    pub test_source_dir: PathBuf,
    pub resource_dirs: Vec<PathBuf>,
    pub test_resource_dirs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub test_output_dir: PathBuf,
    /// The build root, conventionally `target/`.
    pub build_dir: PathBuf,
    pub dependencies: Vec<Dependency>,
    pub plugins: Vec<Plugin>,
    pub properties: BTreeMap<String, String>,
    /// Remote repository URLs configured for the project.
    pub remote_repositories: Vec<String>,
    /// The effective model after inheritance, profiles and interpolation.
    pub effective_model: ConfigNode,
}

impl ProjectModel {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn is_pom_packaging(&self) -> bool {
        self.packaging == "pom"
    }

    /// All conventional input directories, in walk order.
    pub fn input_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.source_dir.clone()];
        dirs.extend(self.resource_dirs.iter().cloned());
        dirs.push(self.test_source_dir.clone());
        dirs.extend(self.test_resource_dirs.iter().cloned());
        dirs
    }
}

/// Credentials record for a remote server, matched by id.
#[derive(Clone, Debug)]
pub struct Server {
    pub id: String,
    pub username: String,
    pub password: String,
}

/// The host session the engine is scoped to.
#[derive(Debug, Default)]
pub struct Session {
    pub offline: bool,
    pub update_snapshots: bool,
    pub servers: Vec<Server>,
    /// Host-process properties, overriding configuration values.
    pub properties: BTreeMap<String, String>,
    pub(crate) cancelled: Arc<AtomicBool>,
}

impl Session {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn server(&self, id: &str) -> Option<&Server> {
        self.servers.iter().find(|server| server.id == id)
    }

    /// Requests cancellation; in-flight cache operations stop at their next
    /// checkpoint.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// A shareable handle observing this session's cancellation flag.
    pub fn cancellation(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }
}

/// A plugin parameter value as the host sees it at execution time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Flag(bool),
    Path(PathBuf),
    List(Vec<String>),
    Array(Vec<String>),
}

/// Runs a single build step. The engine wraps the host's executor to skip
/// cached steps or delegate to it.
pub trait StepExecutor {
    fn execute(&self, project: &ProjectModel, step: &BuildStep) -> Result<()>;

    /// The current value of a plugin parameter for the given step, or `None`
    /// when the parameter is unset.
    fn parameter_value(
        &self,
        project: &ProjectModel,
        step: &BuildStep,
        name: &str,
    ) -> Option<ParamValue>;
}

/// Resolves a concrete dependency to a local file, honoring the session's
/// offline and update-snapshots settings.
pub trait ArtifactResolver: Send + Sync {
    fn resolve(
        &self,
        session: &Session,
        dependency: &Dependency,
        repositories: &[String],
    ) -> Result<PathBuf>;
}

/// Packs and unpacks cached output archives.
///
/// Implementations must preserve POSIX permissions and mtimes when the flag
/// is set and must include empty directory entries.
pub trait ArchivePacker {
    /// Packs `dir` into `out_file`, returning `false` when nothing matched
    /// the glob.
    fn pack(&self, dir: &Path, out_file: &Path, glob: &str, preserve: bool) -> Result<bool>;

    fn unpack(&self, file: &Path, dest_dir: &Path, preserve: bool) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_ordering_follows_lifecycle() {
        assert!(LifecyclePhase::Clean < LifecyclePhase::Compile);
        assert!(LifecyclePhase::Test < LifecyclePhase::Package);
        assert!(LifecyclePhase::PostClean.is_clean());
        assert!(!LifecyclePhase::Validate.is_clean());
    }

    #[test]
    fn phase_name_round_trip() {
        for phase in [LifecyclePhase::PreClean, LifecyclePhase::ProcessTestClasses, LifecyclePhase::Deploy] {
            assert_eq!(phase.as_str().parse::<LifecyclePhase>().unwrap(), phase);
        }
        assert!("not-a-phase".parse::<LifecyclePhase>().is_err());
    }

    #[test]
    fn versionless_key_includes_type_and_classifier() {
        let mut dep = Dependency::new("g", "a", "1.0");
        assert_eq!(dep.versionless_key(), "g:a");
        dep.kind = Some("jar".into());
        dep.classifier = Some("sources".into());
        assert_eq!(dep.versionless_key(), "g:a:jar:sources");
    }
}
