//! In-flight deployment tracking.
//!
//! The registry is the single source of truth for "is a run active for this
//! site". `try_begin` is an atomic check-and-insert; the webhook receiver's
//! `is_active` lookup is only an advisory fast path.
//!
//! Finished runs are kept in a bounded, newest-first history so operators can
//! see what happened to a fire-and-forget deployment. Nothing is persisted.

use serde::Serialize;
use siteferry_core::{DeploymentRun, RunOutcome, SiteId, Stage};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub struct DeploymentRegistry {
    inner: Mutex<RegistryInner>,
    history_limit: usize,
}

#[derive(Default)]
struct RegistryInner {
    active: HashMap<SiteId, ActiveRun>,
    recent: VecDeque<DeploymentRun>,
    next_token: u64,
}

/// An active run and the token of the claim that owns it
struct ActiveRun {
    token: u64,
    run: DeploymentRun,
}

impl RegistryInner {
    /// Remove the active entry for `site_id` only if `token` still owns it.
    fn take_owned(&mut self, site_id: &SiteId, token: u64) -> Option<DeploymentRun> {
        let owned = self
            .active
            .get(site_id)
            .is_some_and(|active| active.token == token);
        if !owned {
            return None;
        }
        self.active.remove(site_id).map(|active| active.run)
    }
}

/// Point-in-time view of the registry
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub active: Vec<DeploymentRun>,
    pub recent: Vec<DeploymentRun>,
}

impl DeploymentRegistry {
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            history_limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `site_id` active. Returns false, changing nothing, if it already is.
    pub fn try_begin(&self, site_id: &SiteId) -> bool {
        self.begin(site_id).is_some()
    }

    /// Insert a new active run, returning the token that owns it.
    fn begin(&self, site_id: &SiteId) -> Option<u64> {
        let mut inner = self.lock();
        if inner.active.contains_key(site_id) {
            return None;
        }
        inner.next_token += 1;
        let token = inner.next_token;
        inner.active.insert(
            site_id.clone(),
            ActiveRun {
                token,
                run: DeploymentRun::new(site_id.clone()),
            },
        );
        Some(token)
    }

    /// Remove `site_id` from the active set, whether or not it was there.
    pub fn end(&self, site_id: &SiteId) {
        self.lock().active.remove(site_id);
    }

    pub fn is_active(&self, site_id: &SiteId) -> bool {
        self.lock().active.contains_key(site_id)
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// `try_begin` returning a guard that releases the site when dropped.
    ///
    /// The guard only ever touches the run it claimed; a later run for the
    /// same site is never affected by an older guard.
    pub fn claim(self: &Arc<Self>, site_id: &SiteId) -> Option<RunGuard> {
        let token = self.begin(site_id)?;
        Some(RunGuard {
            registry: Arc::clone(self),
            site_id: site_id.clone(),
            token,
            released: false,
        })
    }

    fn set_stage_owned(&self, site_id: &SiteId, token: u64, stage: Stage) {
        let mut inner = self.lock();
        if let Some(active) = inner.active.get_mut(site_id)
            && active.token == token
        {
            active.run.stage = stage;
        }
    }

    fn release_owned(&self, site_id: &SiteId, token: u64) {
        self.lock().take_owned(site_id, token);
    }

    /// Close the run owned by `token` and move it into the history.
    fn finish_owned(
        &self,
        site_id: &SiteId,
        token: u64,
        outcome: RunOutcome,
    ) -> Option<DeploymentRun> {
        let mut inner = self.lock();
        let mut run = inner.take_owned(site_id, token)?;
        run.finish(outcome);

        if self.history_limit > 0 {
            inner.recent.push_front(run.clone());
            inner.recent.truncate(self.history_limit);
        }
        Some(run)
    }

    /// The active run for a site, or else its most recent finished run.
    pub fn latest(&self, site_id: &SiteId) -> Option<DeploymentRun> {
        let inner = self.lock();
        inner
            .active
            .get(site_id)
            .map(|active| &active.run)
            .or_else(|| inner.recent.iter().find(|run| &run.site_id == site_id))
            .cloned()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.lock();
        let mut active: Vec<DeploymentRun> = inner
            .active
            .values()
            .map(|active| active.run.clone())
            .collect();
        active.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        RegistrySnapshot {
            active,
            recent: inner.recent.iter().cloned().collect(),
        }
    }
}

/// Ownership of one site's active slot.
///
/// Dropping the guard always ends the run, so a failed or panicking run
/// cannot leave its site stuck as "in progress".
pub struct RunGuard {
    registry: Arc<DeploymentRegistry>,
    site_id: SiteId,
    token: u64,
    released: bool,
}

impl RunGuard {
    pub fn site_id(&self) -> &SiteId {
        &self.site_id
    }

    pub fn set_stage(&self, stage: Stage) {
        self.registry.set_stage_owned(&self.site_id, self.token, stage);
    }

    /// Record the outcome and release the site.
    pub fn finish(mut self, outcome: RunOutcome) -> Option<DeploymentRun> {
        self.released = true;
        self.registry.finish_owned(&self.site_id, self.token, outcome)
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.released {
            self.registry.release_owned(&self.site_id, self.token);
        }
    }
}
