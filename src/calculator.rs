//! Per-reactor memoization of project input fingerprints.
//!
//! Each project's [`ProjectsInputInfo`] is computed exactly once per
//! session. Concurrent callers for the same project block on the in-flight
//! computation and receive the same result; a recursive request from the
//! thread that is already computing the project means the reactor has a
//! dependency cycle.

use crate::{
    config::CacheConfig,
    error::{CacheError, Result},
    host::{ArtifactResolver, Coordinates, ProjectModel, Session},
    input::{ProjectInputAnalyzer, ProjectsInputInfo},
    report::Reporter,
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Condvar, Mutex},
    thread::{self, ThreadId},
};

enum Slot {
    InProgress(ThreadId),
    Done(Result<Arc<ProjectsInputInfo>, String>),
}

pub struct ProjectInputCalculator {
    config: Arc<CacheConfig>,
    session: Arc<Session>,
    resolver: Arc<dyn ArtifactResolver>,
    reporter: Arc<Reporter>,
    reactor: BTreeMap<(String, String), Arc<ProjectModel>>,
    slots: Mutex<HashMap<Coordinates, Slot>>,
    completed: Condvar,
}

impl ProjectInputCalculator {
    pub fn new(
        config: Arc<CacheConfig>,
        session: Arc<Session>,
        resolver: Arc<dyn ArtifactResolver>,
        reporter: Arc<Reporter>,
        projects: impl IntoIterator<Item = ProjectModel>,
    ) -> Self {
        let reactor = projects
            .into_iter()
            .map(|project| (project.coordinates.module_key(), Arc::new(project)))
            .collect();
        Self {
            config,
            session,
            resolver,
            reporter,
            reactor,
            slots: Mutex::new(HashMap::new()),
            completed: Condvar::new(),
        }
    }

    /// Looks a reactor module up by group and artifact id.
    pub fn reactor_project(&self, group_id: &str, artifact_id: &str) -> Option<Arc<ProjectModel>> {
        self.reactor.get(&(group_id.to_string(), artifact_id.to_string())).cloned()
    }

    /// The project's input info, computing it on first request.
    ///
    /// Safe to call concurrently from different project threads; reactor
    /// dependencies are computed recursively on the calling thread.
    pub fn calculate(&self, project: &ProjectModel) -> Result<Arc<ProjectsInputInfo>> {
        if self.session.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        let coordinates = project.coordinates.clone();
        let current = thread::current().id();

        let mut slots = self.slots.lock().expect("fingerprint memo poisoned");
        loop {
            match slots.get(&coordinates) {
                None => {
                    slots.insert(coordinates.clone(), Slot::InProgress(current));
                    break;
                }
                Some(Slot::InProgress(owner)) if *owner == current => {
                    return Err(CacheError::config(format!(
                        "dependency cycle in reactor while fingerprinting {coordinates}"
                    )));
                }
                Some(Slot::InProgress(_)) => {
                    slots = self.completed.wait(slots).expect("fingerprint memo poisoned");
                }
                Some(Slot::Done(result)) => {
                    return result.clone().map_err(CacheError::Message);
                }
            }
        }
        drop(slots);

        trace!("computing input info of {coordinates}");
        let analyzer = ProjectInputAnalyzer::new(
            project,
            &self.config,
            &self.session,
            self.resolver.as_ref(),
            self,
            &self.reporter,
        );
        let result = analyzer.analyze().map(Arc::new);

        let stored = match &result {
            Ok(info) => Ok(info.clone()),
            Err(err) => Err(err.to_string()),
        };
        let mut slots = self.slots.lock().expect("fingerprint memo poisoned");
        slots.insert(coordinates, Slot::Done(stored));
        drop(slots);
        self.completed.notify_all();

        result
    }
}
