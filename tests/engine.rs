//! End-to-end engine scenarios against a mock host.

use pretty_assertions::assert_eq;
use reactor_cache::{
    controller::{BuiltArtifact, BuiltArtifacts},
    host::{
        ArchivePacker, ArtifactResolver, BuildStep, ConfigNode, Coordinates, Dependency,
        LifecyclePhase, ParamValue, ProjectModel, Session, StepExecutor,
    },
    input::DigestItemKind,
    CacheEngine, Result,
};
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Resolver that counts invocations; these tests only use reactor, system
/// and released dependencies, so any call is unexpected.
#[derive(Default)]
struct CountingResolver {
    calls: AtomicUsize,
}

impl ArtifactResolver for CountingResolver {
    fn resolve(
        &self,
        _session: &Session,
        dependency: &Dependency,
        _repositories: &[String],
    ) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(reactor_cache::CacheError::msg(format!(
            "unexpected resolution of {}",
            dependency.coordinates()
        )))
    }
}

/// Records which steps actually ran and serves parameter values.
#[derive(Default)]
struct RecordingExecutor {
    executed: Mutex<Vec<String>>,
    parameters: HashMap<(String, String), ParamValue>,
}

impl RecordingExecutor {
    fn with_parameter(mut self, step_id: &str, name: &str, value: ParamValue) -> Self {
        self.parameters.insert((step_id.to_string(), name.to_string()), value);
        self
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl StepExecutor for RecordingExecutor {
    fn execute(&self, _project: &ProjectModel, step: &BuildStep) -> Result<()> {
        self.executed.lock().unwrap().push(step.id());
        Ok(())
    }

    fn parameter_value(
        &self,
        _project: &ProjectModel,
        step: &BuildStep,
        name: &str,
    ) -> Option<ParamValue> {
        self.parameters.get(&(step.id(), name.to_string())).cloned()
    }
}

/// Packer stub; the scenarios here produce no archive outputs.
struct NoArchives;

impl ArchivePacker for NoArchives {
    fn pack(&self, _dir: &Path, _out_file: &Path, _glob: &str, _preserve: bool) -> Result<bool> {
        Ok(false)
    }

    fn unpack(&self, _file: &Path, _dest_dir: &Path, _preserve: bool) -> Result<()> {
        Ok(())
    }
}

fn project(base: &Path) -> ProjectModel {
    ProjectModel {
        coordinates: Coordinates::new("g", "a", "1.0"),
        packaging: "jar".into(),
        base_dir: base.to_path_buf(),
        source_dir: base.join("src/main/java"),
        test_source_dir: base.join("src/test/java"),
        resource_dirs: vec![base.join("src/main/resources")],
        test_resource_dirs: vec![base.join("src/test/resources")],
        output_dir: base.join("target/classes"),
        test_output_dir: base.join("target/test-classes"),
        build_dir: base.join("target"),
        dependencies: vec![],
        plugins: vec![],
        properties: BTreeMap::new(),
        remote_repositories: vec![],
        effective_model: ConfigNode::with_value("project", "g:a:1.0"),
    }
}

fn step(artifact_id: &str, goal: &str, phase: LifecyclePhase) -> BuildStep {
    BuildStep {
        plugin_group_id: "org.apache.maven.plugins".into(),
        plugin_artifact_id: artifact_id.into(),
        execution_id: format!("default-{goal}"),
        goal: goal.into(),
        phase,
    }
}

fn default_steps() -> Vec<BuildStep> {
    vec![
        step("maven-compiler-plugin", "compile", LifecyclePhase::Compile),
        step("maven-surefire-plugin", "test", LifecyclePhase::Test),
        step("maven-jar-plugin", "jar", LifecyclePhase::Package),
    ]
}

fn engine(
    cache_root: &Path,
    projects: Vec<ProjectModel>,
    resolver: Arc<CountingResolver>,
    config_path: Option<&Path>,
) -> CacheEngine {
    let mut builder = CacheEngine::builder()
        .cache_root(cache_root)
        .resolver(resolver)
        .projects(projects);
    if let Some(path) = config_path {
        builder = builder.config_path(path);
    }
    builder.build(Session::default()).unwrap()
}

fn jar_producer(bytes: &'static [u8]) -> impl Fn(&ProjectModel) -> BuiltArtifacts {
    move |project: &ProjectModel| {
        let jar = project.build_dir.join("a-1.0.jar");
        fs::create_dir_all(project.build_dir.as_path()).unwrap();
        fs::write(&jar, bytes).unwrap();
        BuiltArtifacts {
            primary: Some(BuiltArtifact { path: jar, classifier: None, extension: "jar".into() }),
            attached: vec![],
        }
    }
}

#[test]
fn hit_restores_previous_build() {
    init_tracing();
    let workspace = tempfile::tempdir().unwrap();
    let base = workspace.path().join("p");
    fs::create_dir_all(base.join("src/main/java")).unwrap();
    fs::write(base.join("src/main/java/Foo.java"), b"A").unwrap();
    let cache_root = workspace.path().join("cache");
    let resolver = Arc::new(CountingResolver::default());
    let steps = default_steps();

    // first run builds and stores a record
    let first = engine(&cache_root, vec![project(&base)], resolver.clone(), None);
    let executor = RecordingExecutor::default();
    let outcome = first
        .execute_project(&project(&base), &steps, &executor, &NoArchives, &jar_producer(b"JAR-A"))
        .unwrap();
    assert_eq!(outcome.source, reactor_cache::CacheSource::Built);
    assert_eq!(executor.executed().len(), 3);

    let fingerprint = first.calculator().calculate(&project(&base)).unwrap().checksum.to_hex();
    let record_dir = cache_root.join("v1/g/a").join(&fingerprint);
    assert!(record_dir.join("buildinfo.xml").exists());
    assert!(record_dir.join("a-1.0.jar").exists());

    // second run finds the record and skips every step
    fs::remove_dir_all(base.join("target")).unwrap();
    let second = engine(&cache_root, vec![project(&base)], resolver.clone(), None);
    let executor = RecordingExecutor::default();
    let outcome = second
        .execute_project(&project(&base), &steps, &executor, &NoArchives, &jar_producer(b"NEVER"))
        .unwrap();
    assert_eq!(outcome.source, reactor_cache::CacheSource::Local);
    assert!(executor.executed().is_empty());
    assert_eq!(fs::read(base.join("target/a-1.0.jar")).unwrap(), b"JAR-A");
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn source_change_misses_and_stores_new_record() {
    init_tracing();
    let workspace = tempfile::tempdir().unwrap();
    let base = workspace.path().join("p");
    fs::create_dir_all(base.join("src/main/java")).unwrap();
    fs::write(base.join("src/main/java/Foo.java"), b"A").unwrap();
    let cache_root = workspace.path().join("cache");
    let resolver = Arc::new(CountingResolver::default());
    let steps = default_steps();

    let first = engine(&cache_root, vec![project(&base)], resolver.clone(), None);
    first
        .execute_project(
            &project(&base),
            &steps,
            &RecordingExecutor::default(),
            &NoArchives,
            &jar_producer(b"JAR-A"),
        )
        .unwrap();
    let fingerprint_a = first.calculator().calculate(&project(&base)).unwrap().checksum.to_hex();

    fs::write(base.join("src/main/java/Foo.java"), b"B").unwrap();
    let second = engine(&cache_root, vec![project(&base)], resolver.clone(), None);
    let executor = RecordingExecutor::default();
    let outcome = second
        .execute_project(&project(&base), &steps, &executor, &NoArchives, &jar_producer(b"JAR-B"))
        .unwrap();
    assert_eq!(outcome.source, reactor_cache::CacheSource::Built);
    assert_eq!(executor.executed().len(), 3);

    let fingerprint_b = second.calculator().calculate(&project(&base)).unwrap().checksum.to_hex();
    assert_ne!(fingerprint_a, fingerprint_b);
    assert!(cache_root.join("v1/g/a").join(&fingerprint_b).join("buildinfo.xml").exists());
}

#[test]
fn system_scope_dependency_is_hashed_directly() {
    init_tracing();
    let workspace = tempfile::tempdir().unwrap();
    let base = workspace.path().join("p");
    fs::create_dir_all(base.join("src/main/java")).unwrap();
    fs::write(base.join("src/main/java/Foo.java"), b"A").unwrap();
    let libs = workspace.path().join("libs");
    fs::create_dir_all(&libs).unwrap();
    fs::write(libs.join("local.jar"), b"abc").unwrap();

    let with_system_dep = |base: &Path| {
        let mut model = project(base);
        model.dependencies.push(Dependency {
            scope: Some("system".into()),
            system_path: Some(libs.join("local.jar")),
            ..Dependency::new("ext", "sys", "1.0")
        });
        model
    };

    let resolver = Arc::new(CountingResolver::default());
    let cache_root = workspace.path().join("cache");
    let first = engine(&cache_root, vec![with_system_dep(&base)], resolver.clone(), None);
    let info_a = first.calculator().calculate(&with_system_dep(&base)).unwrap();
    assert!(info_a.items_of(DigestItemKind::Dependency).any(|item| item.value == "ext:sys"));
    // system scope never goes through the resolver
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);

    fs::write(libs.join("local.jar"), b"abd").unwrap();
    let second = engine(&cache_root, vec![with_system_dep(&base)], resolver.clone(), None);
    let info_b = second.calculator().calculate(&with_system_dep(&base)).unwrap();
    assert_ne!(info_a.checksum, info_b.checksum);
}

#[test]
fn includes_and_excludes_shape_the_file_list() {
    init_tracing();
    let workspace = tempfile::tempdir().unwrap();
    let base = workspace.path().join("p");
    fs::create_dir_all(base.join("src/main/java")).unwrap();
    fs::create_dir_all(base.join("folder_outside_src")).unwrap();
    fs::write(base.join("src/main/java/Keep.java"), b"k").unwrap();
    fs::write(base.join("src/main/java/Drop.xml"), b"d").unwrap();
    fs::write(base.join("folder_outside_src/Keep.txt"), b"k").unwrap();
    fs::write(base.join("folder_outside_src/excluded_by_full_filename.txt"), b"x").unwrap();

    let config_path = workspace.path().join("cache-config.xml");
    fs::write(
        &config_path,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<cache>
  <input>
    <global>
      <include value="folder_outside_src"/>
      <exclude glob="*.xml"/>
      <exclude glob="excluded_by_full_filename.txt"/>
    </global>
  </input>
</cache>
"#,
    )
    .unwrap();

    let resolver = Arc::new(CountingResolver::default());
    let cache_root = workspace.path().join("cache");
    let engine = engine(&cache_root, vec![project(&base)], resolver, Some(&config_path));
    let info = engine.calculator().calculate(&project(&base)).unwrap();
    let files: Vec<&str> =
        info.items_of(DigestItemKind::File).map(|item| item.value.as_str()).collect();
    assert_eq!(files, vec!["folder_outside_src/Keep.txt", "src/main/java/Keep.java"]);
}

#[test]
fn skip_value_keeps_cached_build_usable() {
    init_tracing();
    let workspace = tempfile::tempdir().unwrap();
    let base = workspace.path().join("p");
    fs::create_dir_all(base.join("src/main/java")).unwrap();
    fs::write(base.join("src/main/java/Foo.java"), b"A").unwrap();

    let config_path = workspace.path().join("cache-config.xml");
    fs::write(
        &config_path,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<cache>
  <executionControl>
    <reconcile>
      <plugin artifactId="maven-surefire-plugin" goal="test">
        <reconcile propertyName="skipTests" skipValue="true"/>
      </plugin>
    </reconcile>
  </executionControl>
</cache>
"#,
    )
    .unwrap();

    let resolver = Arc::new(CountingResolver::default());
    let cache_root = workspace.path().join("cache");
    let steps = default_steps();
    let test_step_id = steps[1].id();

    // cached build ran with skipTests=false
    let first = engine(&cache_root, vec![project(&base)], resolver.clone(), Some(&config_path));
    let executor = RecordingExecutor::default().with_parameter(
        &test_step_id,
        "skipTests",
        ParamValue::Flag(false),
    );
    first
        .execute_project(&project(&base), &steps, &executor, &NoArchives, &jar_producer(b"JAR-A"))
        .unwrap();

    // current build passes skipTests=true: cached outputs are acceptable
    fs::remove_dir_all(base.join("target")).unwrap();
    let second = engine(&cache_root, vec![project(&base)], resolver.clone(), Some(&config_path));
    let executor = RecordingExecutor::default().with_parameter(
        &test_step_id,
        "skipTests",
        ParamValue::Flag(true),
    );
    let outcome = second
        .execute_project(&project(&base), &steps, &executor, &NoArchives, &jar_producer(b"NEVER"))
        .unwrap();
    assert_eq!(outcome.source, reactor_cache::CacheSource::Local);
    assert!(executor.executed().is_empty());
    assert!(base.join("target/a-1.0.jar").exists());
}

#[test]
fn diverged_tracked_parameter_falls_back_to_a_full_build() {
    init_tracing();
    let workspace = tempfile::tempdir().unwrap();
    let base = workspace.path().join("p");
    fs::create_dir_all(base.join("src/main/java")).unwrap();
    fs::write(base.join("src/main/java/Foo.java"), b"A").unwrap();

    let config_path = workspace.path().join("cache-config.xml");
    fs::write(
        &config_path,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<cache>
  <executionControl>
    <reconcile>
      <plugin artifactId="maven-surefire-plugin" goal="test">
        <reconcile propertyName="argLine"/>
      </plugin>
    </reconcile>
  </executionControl>
</cache>
"#,
    )
    .unwrap();

    let resolver = Arc::new(CountingResolver::default());
    let cache_root = workspace.path().join("cache");
    let steps = default_steps();
    let test_step_id = steps[1].id();

    let first = engine(&cache_root, vec![project(&base)], resolver.clone(), Some(&config_path));
    let executor = RecordingExecutor::default().with_parameter(
        &test_step_id,
        "argLine",
        ParamValue::Text("-Xmx512m".into()),
    );
    first
        .execute_project(&project(&base), &steps, &executor, &NoArchives, &jar_producer(b"JAR-A"))
        .unwrap();

    let second = engine(&cache_root, vec![project(&base)], resolver.clone(), Some(&config_path));
    let executor = RecordingExecutor::default().with_parameter(
        &test_step_id,
        "argLine",
        ParamValue::Text("-Xmx4g".into()),
    );
    let outcome = second
        .execute_project(&project(&base), &steps, &executor, &NoArchives, &jar_producer(b"JAR-A2"))
        .unwrap();
    assert_eq!(outcome.source, reactor_cache::CacheSource::Built);
    assert_eq!(executor.executed().len(), 3);
}

#[test]
fn session_report_lists_every_project() {
    init_tracing();
    let workspace = tempfile::tempdir().unwrap();
    let base = workspace.path().join("p");
    fs::create_dir_all(base.join("src/main/java")).unwrap();
    fs::write(base.join("src/main/java/Foo.java"), b"A").unwrap();
    let cache_root = workspace.path().join("cache");
    let resolver = Arc::new(CountingResolver::default());

    let engine = engine(&cache_root, vec![project(&base)], resolver, None);
    engine
        .execute_project(
            &project(&base),
            &default_steps(),
            &RecordingExecutor::default(),
            &NoArchives,
            &jar_producer(b"JAR-A"),
        )
        .unwrap();
    engine.write_report(workspace.path()).unwrap();

    let contents = fs::read_to_string(workspace.path().join("cache-report.xml")).unwrap();
    let report = reactor_cache::CacheReport::from_xml(&contents).unwrap();
    assert_eq!(report.projects.entries.len(), 1);
    assert_eq!(report.projects.entries[0].artifact_id, "a");
    assert_eq!(report.projects.entries[0].source, reactor_cache::CacheSource::Built);
}
