//! Wrapping of the host's per-step executor.
//!
//! For each project the ordered build steps fall into three contiguous
//! segments: `clean` (clean-lifecycle phases, always executed), `cached`
//! (everything the cached record covers, skipped on a usable hit) and
//! `post-cached` (phases past the record, always executed). A hit is usable
//! once every tracked plugin parameter reconciles against the cached
//! snapshot.

use crate::{
    config::{CacheConfig, ReconcileRule},
    controller::{BuiltArtifacts, CacheController, CacheResult},
    error::{CacheError, Result},
    host::{
        ArchivePacker, BuildStep, LifecyclePhase, ParamValue, ProjectModel, Session, StepExecutor,
    },
    record::{BuildRecord, CacheSource, CompletedExecution, PropertySnapshot},
    restore::{ArtifactHandle, ArtifactRestorer},
    utils,
};
use std::path::Path;

/// The three contiguous step segments of one project.
#[derive(Debug, Default)]
pub struct ExecutionPlan<'s> {
    pub clean: Vec<&'s BuildStep>,
    pub cached: Vec<&'s BuildStep>,
    pub post_cached: Vec<&'s BuildStep>,
}

impl<'s> ExecutionPlan<'s> {
    /// Partitions the steps by phase around `highest_completed_phase`.
    pub fn partition(steps: &'s [BuildStep], highest_completed_phase: LifecyclePhase) -> Self {
        let mut plan = ExecutionPlan::default();
        for step in steps {
            if step.phase.is_clean() {
                plan.clean.push(step);
            } else if step.phase <= highest_completed_phase {
                plan.cached.push(step);
            } else {
                plan.post_cached.push(step);
            }
        }
        plan
    }
}

/// What the strategy did for one project.
pub struct ExecutionOutcome {
    pub source: CacheSource,
    /// Handles of restored plain-file artifacts; empty for fresh builds.
    pub restored: Vec<ArtifactHandle>,
}

/// Drives one project's steps through the cache decision protocol.
pub struct ExecutionStrategy<'a> {
    config: &'a CacheConfig,
    session: &'a Session,
    controller: &'a CacheController,
    executor: &'a dyn StepExecutor,
    packer: &'a dyn ArchivePacker,
}

impl<'a> ExecutionStrategy<'a> {
    pub fn new(
        config: &'a CacheConfig,
        session: &'a Session,
        controller: &'a CacheController,
        executor: &'a dyn StepExecutor,
        packer: &'a dyn ArchivePacker,
    ) -> Self {
        Self { config, session, controller, executor, packer }
    }

    /// Runs the project's steps, skipping whatever a usable cached build
    /// covers. `collect_artifacts` is consulted after a fresh build to
    /// gather what the build produced.
    pub fn execute_project(
        &self,
        project: &ProjectModel,
        steps: &[BuildStep],
        collect_artifacts: &dyn Fn(&ProjectModel) -> BuiltArtifacts,
    ) -> Result<ExecutionOutcome> {
        let coordinates = &project.coordinates;
        let lookup = self.controller.lookup(project)?;

        let CacheResult::Hit(record) = lookup else {
            debug!("cache miss for {coordinates}, running a full build");
            return self.build_fresh(project, steps, None, collect_artifacts);
        };

        let plan = ExecutionPlan::partition(steps, record.highest_completed_phase);
        self.run_steps(project, &plan.clean)?;

        if let Some((step, rule)) = self.reconcile(project, &plan, &record) {
            info!(
                "cached build of {coordinates} rejected, tracked parameter {} of {step} diverged",
                rule.property_name
            );
            let remaining: Vec<&BuildStep> =
                plan.cached.iter().chain(plan.post_cached.iter()).copied().collect();
            return self.build_fresh(project, steps, Some(&remaining), collect_artifacts);
        }

        for step in &plan.cached {
            if self.config.is_run_always(step) {
                debug!("step {step} of {coordinates} is marked always-run");
                self.executor.execute(project, step)?;
            } else {
                trace!("skipping cached step {step} of {coordinates}");
            }
        }

        let restorer = ArtifactRestorer::new(
            project,
            &record,
            self.controller.store(),
            self.packer,
            self.config,
            self.session,
        );
        let restored = match restorer.restore() {
            Ok(restored) => restored,
            Err(CacheError::Cancelled) => return Err(CacheError::Cancelled),
            Err(err) if self.config.remote().fail_fast => return Err(err),
            Err(err) => {
                warn!("restore of {coordinates} failed, falling back to a full build: {err}");
                let remaining: Vec<&BuildStep> =
                    plan.cached.iter().chain(plan.post_cached.iter()).copied().collect();
                return self.build_fresh(project, steps, Some(&remaining), collect_artifacts);
            }
        };

        self.run_steps(project, &plan.post_cached)?;

        let url = match record.source {
            CacheSource::Remote => self
                .controller
                .store()
                .remote()
                .and_then(|remote| {
                    remote
                        .transport()
                        .record_dir_url(coordinates, &record.checksum().to_hex())
                        .ok()
                })
                .map(|url| url.to_string()),
            _ => None,
        };
        self.controller.reporter().record_outcome(
            coordinates,
            record.checksum().clone(),
            record.source,
            url,
        );
        Ok(ExecutionOutcome { source: record.source, restored })
    }

    /// Runs a fresh build. When `remaining` is given, the clean segment
    /// already ran and only those steps are left; otherwise every step runs.
    fn build_fresh(
        &self,
        project: &ProjectModel,
        steps: &[BuildStep],
        remaining: Option<&[&BuildStep]>,
        collect_artifacts: &dyn Fn(&ProjectModel) -> BuiltArtifacts,
    ) -> Result<ExecutionOutcome> {
        let mut executed: Vec<&BuildStep> = Vec::new();
        match remaining {
            Some(remaining) => {
                for step in remaining {
                    self.executor.execute(project, step)?;
                    executed.push(*step);
                }
            }
            None => {
                for step in steps {
                    self.executor.execute(project, step)?;
                    if !step.phase.is_clean() {
                        executed.push(step);
                    }
                }
            }
        }

        let highest_completed_phase = executed
            .iter()
            .map(|step| step.phase)
            .max()
            .unwrap_or(LifecyclePhase::Validate);
        let executions = self.snapshot_executions(project, &executed);
        let built = collect_artifacts(project);
        self.controller.commit(project, self.packer, &built, executions, highest_completed_phase)?;
        Ok(ExecutionOutcome { source: CacheSource::Built, restored: Vec::new() })
    }

    fn run_steps(&self, project: &ProjectModel, steps: &[&BuildStep]) -> Result<()> {
        for step in steps {
            if self.session.is_cancelled() {
                return Err(CacheError::Cancelled);
            }
            self.executor.execute(project, step)?;
        }
        Ok(())
    }

    /// Snapshots the tracked parameters of every executed step for the
    /// build record.
    fn snapshot_executions(
        &self,
        project: &ProjectModel,
        executed: &[&BuildStep],
    ) -> Vec<CompletedExecution> {
        executed
            .iter()
            .map(|step| {
                let parameters = self
                    .config
                    .reconcile_rules(step)
                    .iter()
                    .map(|rule| PropertySnapshot {
                        name: rule.property_name.clone(),
                        value: self
                            .executor
                            .parameter_value(project, step, &rule.property_name)
                            .map(|value| render_param(&value, &project.base_dir)),
                        tracked: true,
                    })
                    .collect();
                CompletedExecution { step_id: step.id(), parameters }
            })
            .collect()
    }

    /// Checks every tracked parameter of the cached segment. Returns the
    /// first diverging step and rule, if any.
    fn reconcile<'s>(
        &self,
        project: &ProjectModel,
        plan: &ExecutionPlan<'s>,
        record: &BuildRecord,
    ) -> Option<(&'s BuildStep, ReconcileRule)> {
        for step in &plan.cached {
            let rules = self.config.reconcile_rules(step);
            if rules.is_empty() {
                continue;
            }
            let cached_execution = record.execution(&step.id());
            for rule in rules {
                let current = self
                    .executor
                    .parameter_value(project, step, &rule.property_name)
                    .map(|value| render_param(&value, &project.base_dir));
                let cached = cached_execution
                    .and_then(|execution| execution.parameter(&rule.property_name))
                    .and_then(|parameter| parameter.value.clone());
                if !reconcile_matches(rule, current.as_deref(), cached.as_deref()) {
                    debug!(
                        "parameter {} of {step}: current {current:?}, cached {cached:?}",
                        rule.property_name
                    );
                    return Some((*step, rule.clone()));
                }
            }
        }
        None
    }
}

/// Canonical rendering of a parameter value for comparison and snapshots.
pub fn render_param(value: &ParamValue, base_dir: &Path) -> String {
    match value {
        ParamValue::Text(text) => text.clone(),
        ParamValue::Flag(flag) => flag.to_string(),
        ParamValue::Path(path) => utils::relativize(path, base_dir),
        ParamValue::List(items) => format!("[{}]", items.join(", ")),
        ParamValue::Array(items) => format!("{{{}}}", items.join(",")),
    }
}

/// The tracked-parameter matching rules.
fn reconcile_matches(rule: &ReconcileRule, current: Option<&str>, cached: Option<&str>) -> bool {
    if let (Some(skip_value), Some(current)) = (rule.skip_value.as_deref(), current) {
        // the cached build is more complete and still acceptable
        if current == skip_value {
            return true;
        }
    }
    match (current, cached) {
        (Some(current), Some(cached)) => current == cached,
        (Some(current), None) => rule.default_value.as_deref() == Some(current),
        (None, None) => rule.default_value.is_none(),
        (None, Some(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn rule(name: &str, skip: Option<&str>, default: Option<&str>) -> ReconcileRule {
        ReconcileRule {
            property_name: name.into(),
            skip_value: skip.map(str::to_string),
            default_value: default.map(str::to_string),
        }
    }

    #[test]
    fn partition_is_contiguous_by_phase() {
        let step = |phase: LifecyclePhase, goal: &str| BuildStep {
            plugin_group_id: "g".into(),
            plugin_artifact_id: "p".into(),
            execution_id: "default".into(),
            goal: goal.into(),
            phase,
        };
        let steps = vec![
            step(LifecyclePhase::Clean, "clean"),
            step(LifecyclePhase::Compile, "compile"),
            step(LifecyclePhase::Test, "test"),
            step(LifecyclePhase::Package, "jar"),
            step(LifecyclePhase::Install, "install"),
        ];
        let plan = ExecutionPlan::partition(&steps, LifecyclePhase::Package);
        assert_eq!(plan.clean.len(), 1);
        assert_eq!(plan.cached.len(), 3);
        assert_eq!(plan.post_cached.len(), 1);
        assert_eq!(plan.post_cached[0].goal, "install");
    }

    #[test]
    fn equal_values_match() {
        let rule = rule("skipTests", None, None);
        assert!(reconcile_matches(&rule, Some("false"), Some("false")));
        assert!(!reconcile_matches(&rule, Some("true"), Some("false")));
        assert!(reconcile_matches(&rule, None, None));
        assert!(!reconcile_matches(&rule, None, Some("false")));
    }

    #[test]
    fn skip_value_relaxes_mismatch() {
        let rule = rule("skipTests", Some("true"), None);
        // current=true, cached=false: the cached build ran the tests
        assert!(reconcile_matches(&rule, Some("true"), Some("false")));
        assert!(reconcile_matches(&rule, Some("true"), None));
        assert!(!reconcile_matches(&rule, Some("false"), Some("true")));
    }

    #[test]
    fn default_value_stands_in_for_absent_cached() {
        let rule = rule("reportFormat", None, Some("brief"));
        assert!(reconcile_matches(&rule, Some("brief"), None));
        assert!(!reconcile_matches(&rule, Some("plain"), None));
        assert!(!reconcile_matches(&rule, None, None));
    }

    #[test]
    fn param_rendering() {
        let base = PathBuf::from("/work/app");
        assert_eq!(render_param(&ParamValue::Text("x".into()), &base), "x");
        assert_eq!(render_param(&ParamValue::Flag(true), &base), "true");
        assert_eq!(
            render_param(&ParamValue::Path(PathBuf::from("/work/app/target/out")), &base),
            "target/out"
        );
        assert_eq!(
            render_param(&ParamValue::List(vec!["a".into(), "b".into()]), &base),
            "[a, b]"
        );
        assert_eq!(
            render_param(&ParamValue::Array(vec!["a".into(), "b".into()]), &base),
            "{a,b}"
        );
    }
}
