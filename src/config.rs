//! Typed view over the cache configuration.
//!
//! Configuration is read once per session from an XML document and is
//! immutable afterwards. Host-process properties override the corresponding
//! document values; the exact property names are part of the engine's
//! contract and are listed in [`props`].

use crate::{
    error::{CacheError, Result},
    hash::HashAlgorithm,
    host::{BuildStep, Session},
    utils,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Host-process property names recognized by the engine.
pub mod props {
    /// Overrides the `enabled` flag.
    pub const CACHE_ENABLED: &str = "cache.enabled";
    /// Overrides `remote/@enabled`.
    pub const REMOTE_ENABLED: &str = "remote.enabled";
    /// Overrides `remote/@saveToRemote`.
    pub const REMOTE_SAVE_ENABLED: &str = "remote.save.enabled";
    /// Overrides `remote/@saveFinal`.
    pub const REMOTE_SAVE_FINAL: &str = "remote.save.final";
    /// Overrides `remote/@url`.
    pub const REMOTE_URL: &str = "remote.url";
    /// Overrides `remote/@id`.
    pub const REMOTE_SERVER_ID: &str = "remote.server.id";
    /// Overrides `remote/@failFast`.
    pub const FAIL_FAST: &str = "failFast";
    /// Overrides `remote/baselineUrl`.
    pub const BASELINE_URL: &str = "baselineUrl";
    /// Overrides `remote/@lazyRestore`.
    pub const LAZY_RESTORE: &str = "lazyRestore";
    /// Disables unpacking of `generatedSource` artifacts on restore.
    pub const RESTORE_GENERATED_SOURCES: &str = "restoreGeneratedSources";
    /// Comma-separated `artifactId[:goal]` entries forced to run.
    pub const ALWAYS_RUN_PLUGINS: &str = "alwaysRunPlugins";
    /// Disables cache lookup for the whole session.
    pub const SKIP_CACHE: &str = "skipCache";
    /// Location of the configuration document.
    pub const CONFIG_PATH: &str = "configPath";
    /// Whether builds that only reached the compile phase are committed.
    pub const CACHE_COMPILE: &str = "cacheCompile";
    /// Disables the write-back of new build records.
    pub const SKIP_SAVE: &str = "skipSave";

    /// Per-project property: overrides the glob used for input walks.
    pub const PROJECT_INPUT_GLOB: &str = "cache.input.glob";
    /// Per-project property prefix: additional input walk roots.
    pub const PROJECT_INPUT_PREFIX: &str = "cache.input.";
    /// Per-project property prefix: exclusion groups, see
    /// [`crate::exclude::ExclusionResolver`].
    pub const PROJECT_EXCLUDE_PREFIX: &str = "cache.exclude.";
    /// Per-project property: disables lookup and save for the project.
    pub const PROJECT_SKIP: &str = "cache.skip";
    /// Per-project property: disables artifact restoration on a hit.
    pub const PROJECT_RESTORE_ARTIFACTS: &str = "cache.restoreArtifacts";
}

/// Initialization outcome, one-shot at session start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigState {
    /// Caching is turned off for the session.
    Disabled,
    /// All configuration has been resolved.
    Initialized,
}

fn default_true() -> bool {
    true
}

fn default_glob() -> String {
    "*".to_string()
}

fn default_hash_algorithm() -> String {
    "SHA-256".to_string()
}

fn default_max_builds() -> usize {
    3
}

fn default_transport() -> String {
    "http".to_string()
}

fn default_timeout() -> u64 {
    60
}

/// Root of the configuration document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfigDocument {
    #[serde(rename = "@enabled", default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "@hashAlgorithm", default = "default_hash_algorithm")]
    pub hash_algorithm: String,
    #[serde(rename = "@defaultGlob", default = "default_glob")]
    pub default_glob: String,
    #[serde(rename = "@processPlugins", default = "default_true")]
    pub process_plugins: bool,
    #[serde(rename = "@adjustMetaInfVersion")]
    pub adjust_meta_inf_version: bool,
    #[serde(rename = "@calculateProjectVersionChecksum")]
    pub calculate_project_version_checksum: bool,
    #[serde(rename = "@maxLocalBuildsCached", default = "default_max_builds")]
    pub max_local_builds_cached: usize,
    pub remote: RemoteConfig,
    pub input: InputConfig,
    pub execution_control: ExecutionControl,
    pub output: OutputConfig,
    pub attached_outputs: AttachedOutputs,
    pub multi_module: MultiModule,
    pub project_versioning: ProjectVersioning,
}

impl Default for CacheConfigDocument {
    fn default() -> Self {
        Self {
            enabled: true,
            hash_algorithm: default_hash_algorithm(),
            default_glob: default_glob(),
            process_plugins: true,
            adjust_meta_inf_version: false,
            calculate_project_version_checksum: false,
            max_local_builds_cached: default_max_builds(),
            remote: RemoteConfig::default(),
            input: InputConfig::default(),
            execution_control: ExecutionControl::default(),
            output: OutputConfig::default(),
            attached_outputs: AttachedOutputs::default(),
            multi_module: MultiModule::default(),
            project_versioning: ProjectVersioning::default(),
        }
    }
}

/// Remote store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteConfig {
    #[serde(rename = "@enabled")]
    pub enabled: bool,
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@url")]
    pub url: String,
    #[serde(rename = "@transport", default = "default_transport")]
    pub transport: String,
    #[serde(rename = "@saveToRemote")]
    pub save_to_remote: bool,
    #[serde(rename = "@saveFinal")]
    pub save_final: bool,
    #[serde(rename = "@failFast")]
    pub fail_fast: bool,
    #[serde(rename = "@lazyRestore")]
    pub lazy_restore: bool,
    #[serde(rename = "@timeoutSeconds", default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_url: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            id: String::new(),
            url: String::new(),
            transport: default_transport(),
            save_to_remote: false,
            save_final: false,
            fail_fast: false,
            lazy_restore: false,
            timeout_seconds: default_timeout(),
            baseline_url: None,
        }
    }
}

/// Input enumeration policy.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub global: GlobalInputConfig,
    #[serde(rename = "plugin")]
    pub plugins: Vec<PluginInputConfig>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalInputConfig {
    #[serde(rename = "@glob", skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,
    #[serde(rename = "include")]
    pub includes: Vec<PathRule>,
    #[serde(rename = "exclude")]
    pub excludes: Vec<PathRule>,
}

/// How a matcher value applies to a candidate path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherKind {
    /// Match the glob against the basename only.
    #[default]
    Filename,
    /// Match the glob against the full (or project-relative) path.
    Path,
}

/// Which directory entries a rule applies to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    #[default]
    Any,
}

/// One include or exclude rule.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathRule {
    /// Path relative to the project base dir; empty means the base dir.
    #[serde(rename = "@value")]
    pub value: String,
    #[serde(rename = "@glob", skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,
    #[serde(rename = "@recursive", default = "default_true")]
    pub recursive: bool,
    #[serde(rename = "@matcherKind")]
    pub matcher_kind: MatcherKind,
    #[serde(rename = "@entryKind")]
    pub entry_kind: EntryKind,
}

/// Per-plugin overrides for input discovery.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginInputConfig {
    #[serde(rename = "@artifactId")]
    pub artifact_id: String,
    #[serde(rename = "@excludeDependencies")]
    pub exclude_dependencies: bool,
    /// Effective-model properties dropped before hashing.
    #[serde(rename = "excludeProperty")]
    pub exclude_properties: Vec<String>,
    pub dir_scan: DirScanConfig,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirScanConfig {
    #[serde(rename = "@mode")]
    pub mode: ScanMode,
    #[serde(rename = "tagScan")]
    pub tag_scan_configs: Vec<TagScanConfig>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Do not scan the plugin's configuration at all.
    Off,
    /// Consider every configuration element.
    #[default]
    Auto,
    /// Only consider elements listed in `tagScan` entries.
    Custom,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TagScanConfig {
    #[serde(rename = "@tagName")]
    pub tag_name: String,
    #[serde(rename = "@recursive", default = "default_true")]
    pub recursive: bool,
    #[serde(rename = "@glob", skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,
}

/// Controls which steps always run and which parameters are reconciled.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionControl {
    pub run_always: RunAlways,
    pub reconcile: ReconcileConfig,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunAlways {
    #[serde(rename = "plugin")]
    pub plugins: Vec<PluginMatch>,
    #[serde(rename = "execution")]
    pub executions: Vec<ExecutionMatch>,
    #[serde(rename = "goal")]
    pub goals: Vec<GoalMatch>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PluginMatch {
    #[serde(rename = "@artifactId")]
    pub artifact_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecutionMatch {
    #[serde(rename = "@artifactId")]
    pub artifact_id: String,
    #[serde(rename = "execId", default)]
    pub exec_ids: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GoalMatch {
    #[serde(rename = "@artifactId")]
    pub artifact_id: String,
    #[serde(rename = "goalName", default)]
    pub goals: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    #[serde(rename = "plugin")]
    pub plugins: Vec<PluginReconcile>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PluginReconcile {
    #[serde(rename = "@artifactId")]
    pub artifact_id: String,
    #[serde(rename = "@goal")]
    pub goal: String,
    #[serde(rename = "reconcile", default)]
    pub reconciles: Vec<ReconcileRule>,
}

/// A tracked plugin parameter and its relaxations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRule {
    #[serde(rename = "@propertyName")]
    pub property_name: String,
    /// A current value that makes any cached value acceptable.
    #[serde(rename = "@skipValue", skip_serializing_if = "Option::is_none", default)]
    pub skip_value: Option<String>,
    /// Assumed cached value when the record carries none.
    #[serde(rename = "@defaultValue", skip_serializing_if = "Option::is_none", default)]
    pub default_value: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    #[serde(rename = "excludePattern")]
    pub exclude_patterns: Vec<String>,
}

/// Extra build-output directories captured with the build record.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachedOutputs {
    #[serde(rename = "dirName")]
    pub dir_names: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiModule {
    #[serde(rename = "scanProfile")]
    pub scan_profiles: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectVersioning {
    #[serde(rename = "@adjustMetaInf")]
    pub adjust_meta_inf: bool,
}

/// The resolved, immutable cache configuration for one session.
#[derive(Debug)]
pub struct CacheConfig {
    state: ConfigState,
    doc: CacheConfigDocument,
    hash_algorithm: HashAlgorithm,
    output_exclude_patterns: Vec<Regex>,
    skip_cache: bool,
    skip_save: bool,
    cache_compile: bool,
    restore_generated_sources: bool,
    always_run_plugins: Vec<(String, Option<String>)>,
}

impl CacheConfig {
    /// Resolves the configuration for the session: loads the document named
    /// by the `configPath` property (or `default_path`), then applies the
    /// host-process property overrides.
    pub fn initialize(session: &Session, default_path: Option<&Path>) -> Result<Self> {
        let configured = session.property(props::CONFIG_PATH).map(Path::new);
        let mut doc = match configured.or(default_path) {
            Some(path) if path.exists() => {
                debug!("reading cache config from \"{}\"", path.display());
                utils::read_xml_file::<CacheConfigDocument>(path)
                    .map_err(|err| CacheError::config(err))?
            }
            Some(path) if configured.is_some() => {
                return Err(CacheError::config(format!(
                    "configured cache config \"{}\" does not exist",
                    path.display()
                )));
            }
            _ => CacheConfigDocument::default(),
        };

        apply_overrides(&mut doc, session);

        let state = if doc.enabled { ConfigState::Initialized } else { ConfigState::Disabled };
        let hash_algorithm = HashAlgorithm::by_name(&doc.hash_algorithm)?;

        let output_exclude_patterns = doc
            .output
            .exclude_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|err| {
                    CacheError::config(format!("invalid output exclude pattern {pattern:?}: {err}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let always_run_plugins = session
            .property(props::ALWAYS_RUN_PLUGINS)
            .map(parse_always_run)
            .unwrap_or_default();

        Ok(Self {
            state,
            hash_algorithm,
            output_exclude_patterns,
            skip_cache: bool_property(session, props::SKIP_CACHE).unwrap_or(false),
            skip_save: bool_property(session, props::SKIP_SAVE).unwrap_or(false),
            cache_compile: bool_property(session, props::CACHE_COMPILE).unwrap_or(true),
            restore_generated_sources: bool_property(session, props::RESTORE_GENERATED_SOURCES)
                .unwrap_or(true),
            always_run_plugins,
            doc,
        })
    }

    pub fn state(&self) -> ConfigState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state == ConfigState::Initialized
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn default_glob(&self) -> &str {
        &self.doc.default_glob
    }

    pub fn process_plugins(&self) -> bool {
        self.doc.process_plugins
    }

    pub fn adjust_meta_inf_version(&self) -> bool {
        self.doc.adjust_meta_inf_version || self.doc.project_versioning.adjust_meta_inf
    }

    pub fn calculate_project_version_checksum(&self) -> bool {
        self.doc.calculate_project_version_checksum
    }

    pub fn max_local_builds_cached(&self) -> usize {
        self.doc.max_local_builds_cached.max(1)
    }

    pub fn remote(&self) -> &RemoteConfig {
        &self.doc.remote
    }

    pub fn baseline_url(&self) -> Option<&str> {
        self.doc.remote.baseline_url.as_deref()
    }

    pub fn global_input(&self) -> &GlobalInputConfig {
        &self.doc.input.global
    }

    /// Per-plugin input overrides, matched by artifact id.
    pub fn plugin_input(&self, artifact_id: &str) -> Option<&PluginInputConfig> {
        self.doc.input.plugins.iter().find(|plugin| plugin.artifact_id == artifact_id)
    }

    pub fn scan_profiles(&self) -> &[String] {
        &self.doc.multi_module.scan_profiles
    }

    pub fn attached_output_dirs(&self) -> &[String] {
        &self.doc.attached_outputs.dir_names
    }

    /// Whether a produced file name is dropped from cached outputs.
    pub fn is_output_excluded(&self, file_name: &str) -> bool {
        self.output_exclude_patterns.iter().any(|re| re.is_match(file_name))
    }

    /// Reconciliation rules applying to the given step.
    pub fn reconcile_rules(&self, step: &BuildStep) -> &[ReconcileRule] {
        self.doc
            .execution_control
            .reconcile
            .plugins
            .iter()
            .find(|plugin| {
                plugin.artifact_id == step.plugin_artifact_id && plugin.goal == step.goal
            })
            .map(|plugin| plugin.reconciles.as_slice())
            .unwrap_or_default()
    }

    /// Whether the step is exempt from cache skipping.
    pub fn is_run_always(&self, step: &BuildStep) -> bool {
        let run_always = &self.doc.execution_control.run_always;
        if run_always.plugins.iter().any(|p| p.artifact_id == step.plugin_artifact_id) {
            return true;
        }
        if run_always.executions.iter().any(|e| {
            e.artifact_id == step.plugin_artifact_id
                && e.exec_ids.iter().any(|id| *id == step.execution_id)
        }) {
            return true;
        }
        if run_always.goals.iter().any(|g| {
            g.artifact_id == step.plugin_artifact_id && g.goals.iter().any(|goal| *goal == step.goal)
        }) {
            return true;
        }
        self.always_run_plugins.iter().any(|(artifact_id, goal)| {
            *artifact_id == step.plugin_artifact_id
                && goal.as_ref().map_or(true, |goal| *goal == step.goal)
        })
    }

    pub fn skip_cache(&self) -> bool {
        self.skip_cache
    }

    pub fn skip_save(&self) -> bool {
        self.skip_save
    }

    pub fn cache_compile(&self) -> bool {
        self.cache_compile
    }

    pub fn restore_generated_sources(&self) -> bool {
        self.restore_generated_sources
    }
}

fn apply_overrides(doc: &mut CacheConfigDocument, session: &Session) {
    if let Some(enabled) = bool_property(session, props::CACHE_ENABLED) {
        doc.enabled = enabled;
    }
    if let Some(enabled) = bool_property(session, props::REMOTE_ENABLED) {
        doc.remote.enabled = enabled;
    }
    if let Some(save) = bool_property(session, props::REMOTE_SAVE_ENABLED) {
        doc.remote.save_to_remote = save;
    }
    if let Some(save_final) = bool_property(session, props::REMOTE_SAVE_FINAL) {
        doc.remote.save_final = save_final;
    }
    if let Some(url) = session.property(props::REMOTE_URL) {
        doc.remote.url = url.to_string();
    }
    if let Some(id) = session.property(props::REMOTE_SERVER_ID) {
        doc.remote.id = id.to_string();
    }
    if let Some(fail_fast) = bool_property(session, props::FAIL_FAST) {
        doc.remote.fail_fast = fail_fast;
    }
    if let Some(url) = session.property(props::BASELINE_URL) {
        doc.remote.baseline_url = Some(url.to_string());
    }
    if let Some(lazy) = bool_property(session, props::LAZY_RESTORE) {
        doc.remote.lazy_restore = lazy;
    }
}

fn bool_property(session: &Session, key: &str) -> Option<bool> {
    session.property(key).map(|value| value.eq_ignore_ascii_case("true"))
}

fn parse_always_run(value: &str) -> Vec<(String, Option<String>)> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((artifact_id, goal)) => (artifact_id.to_string(), Some(goal.to_string())),
            None => (entry.to_string(), None),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::LifecyclePhase;
    use std::collections::BTreeMap;

    const CONFIG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<cache enabled="true" hashAlgorithm="XX" defaultGlob="*" processPlugins="true">
  <remote enabled="true" id="build-cache" url="http://cache.example.com/cache" saveToRemote="true">
    <baselineUrl>http://cache.example.com/baseline</baselineUrl>
  </remote>
  <input>
    <global glob="*.java">
      <include value="folder_outside_src"/>
      <exclude glob="*.xml"/>
    </global>
    <plugin artifactId="maven-surefire-plugin" excludeDependencies="true">
      <excludeProperty>argLine</excludeProperty>
      <dirScan mode="custom">
        <tagScan tagName="suiteXmlFiles" recursive="false"/>
      </dirScan>
    </plugin>
  </input>
  <executionControl>
    <runAlways>
      <plugin artifactId="maven-failsafe-plugin"/>
      <goal artifactId="maven-deploy-plugin">
        <goalName>deploy</goalName>
      </goal>
    </runAlways>
    <reconcile>
      <plugin artifactId="maven-surefire-plugin" goal="test">
        <reconcile propertyName="skipTests" skipValue="true"/>
      </plugin>
    </reconcile>
  </executionControl>
  <output>
    <excludePattern>.*\.log</excludePattern>
  </output>
</cache>
"#;

    fn step(artifact_id: &str, goal: &str) -> BuildStep {
        BuildStep {
            plugin_group_id: "org.apache.maven.plugins".into(),
            plugin_artifact_id: artifact_id.into(),
            execution_id: "default".into(),
            goal: goal.into(),
            phase: LifecyclePhase::Test,
        }
    }

    fn config_from(document: &str, properties: BTreeMap<String, String>) -> CacheConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache-config.xml");
        std::fs::write(&path, document).unwrap();
        let session = Session { properties, ..Default::default() };
        CacheConfig::initialize(&session, Some(&path)).unwrap()
    }

    #[test]
    fn document_round_trips() {
        let doc: CacheConfigDocument = utils::from_xml_str("config", CONFIG).unwrap();
        assert!(doc.enabled);
        assert_eq!(doc.hash_algorithm, "XX");
        assert_eq!(doc.input.global.glob.as_deref(), Some("*.java"));
        assert_eq!(doc.input.plugins.len(), 1);
        assert_eq!(doc.input.plugins[0].dir_scan.mode, ScanMode::Custom);
        let rendered = utils::to_xml_string(&doc, "cache").unwrap();
        let reparsed: CacheConfigDocument = utils::from_xml_str("config", &rendered).unwrap();
        assert_eq!(reparsed.remote.url, doc.remote.url);
        assert_eq!(reparsed.execution_control.reconcile.plugins.len(), 1);
    }

    #[test]
    fn resolved_accessors() {
        let config = config_from(CONFIG, BTreeMap::new());
        assert!(config.is_enabled());
        assert_eq!(config.hash_algorithm(), HashAlgorithm::Xx);
        assert!(config.remote().enabled);
        assert!(config.is_run_always(&step("maven-failsafe-plugin", "integration-test")));
        assert!(config.is_run_always(&step("maven-deploy-plugin", "deploy")));
        assert!(!config.is_run_always(&step("maven-deploy-plugin", "other")));
        assert_eq!(config.reconcile_rules(&step("maven-surefire-plugin", "test")).len(), 1);
        assert!(config.is_output_excluded("build.log"));
        assert!(!config.is_output_excluded("app.jar"));
    }

    #[test]
    fn properties_override_document() {
        let mut properties = BTreeMap::new();
        properties.insert(props::REMOTE_ENABLED.to_string(), "false".to_string());
        properties.insert(props::REMOTE_URL.to_string(), "http://other".to_string());
        properties.insert(props::SKIP_CACHE.to_string(), "true".to_string());
        properties
            .insert(props::ALWAYS_RUN_PLUGINS.to_string(), "a-plugin, b-plugin:run".to_string());
        let config = config_from(CONFIG, properties);
        assert!(!config.remote().enabled);
        assert_eq!(config.remote().url, "http://other");
        assert!(config.skip_cache());
        assert!(config.is_run_always(&step("a-plugin", "whatever")));
        assert!(config.is_run_always(&step("b-plugin", "run")));
        assert!(!config.is_run_always(&step("b-plugin", "other")));
    }

    #[test]
    fn disabled_state() {
        let mut properties = BTreeMap::new();
        properties.insert(props::CACHE_ENABLED.to_string(), "false".to_string());
        let config = config_from(CONFIG, properties);
        assert_eq!(config.state(), ConfigState::Disabled);
    }

    #[test]
    fn unknown_algorithm_fails_initialization() {
        let document = CONFIG.replace("hashAlgorithm=\"XX\"", "hashAlgorithm=\"CRC-7\"");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache-config.xml");
        std::fs::write(&path, document).unwrap();
        let err = CacheConfig::initialize(&Session::default(), Some(&path)).unwrap_err();
        assert!(matches!(err, CacheError::UnknownAlgorithm { .. }));
    }
}
