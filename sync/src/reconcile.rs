//! Reconciliation between optimistically added uploads and the remote listing.

use crate::model::{PhotoRecord, SyncStatus};
use crate::scheduler::{Scheduler, TaskToken};
use crate::SyncError;
use api_client::MediaStore;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tokio::sync::watch;
use tokio::time::Duration;

/// How long an unconfirmed upload may stay in the gallery.
pub const DEFAULT_OPTIMISTIC_EXPIRY: Duration = Duration::from_secs(90);
/// Maximum distance between upload times for a record without a remote id
/// to be matched against a listed one.
pub const DEFAULT_MATCH_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Merge the optimistic set in front of the authoritative listing.
///
/// Optimistic records whose remote id appears in `authoritative` are
/// dropped; records without a remote id are always kept. No two records in
/// the result share a remote id: if `authoritative` itself lists an id more
/// than once, only its first occurrence is kept.
pub fn merge(authoritative: &[PhotoRecord], optimistic: &[PhotoRecord]) -> Vec<PhotoRecord> {
    let listed: HashSet<&str> = authoritative
        .iter()
        .filter_map(PhotoRecord::remote_key)
        .collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut merged = Vec::with_capacity(authoritative.len() + optimistic.len());

    for record in optimistic {
        match record.remote_key() {
            Some(id) if listed.contains(id) || !seen.insert(id) => continue,
            _ => merged.push(record.clone()),
        }
    }
    for record in authoritative {
        match record.remote_key() {
            Some(id) if !seen.insert(id) => continue,
            _ => merged.push(record.clone()),
        }
    }
    merged
}

fn is_same_upload(local: &PhotoRecord, listed: &PhotoRecord, window: Duration) -> bool {
    if local.file_name != listed.file_name || local.uploader_name != listed.uploader_name {
        return false;
    }
    let delta = (local.uploaded_at - listed.uploaded_at)
        .num_milliseconds()
        .unsigned_abs();
    u128::from(delta) <= window.as_millis()
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub optimistic_expiry: Duration,
    pub match_window: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            optimistic_expiry: DEFAULT_OPTIMISTIC_EXPIRY,
            match_window: DEFAULT_MATCH_WINDOW,
        }
    }
}

/// What happened to a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The listing was applied; carries the number of listed photos.
    Applied(usize),
    /// A newer fetch started while this one was in flight.
    Superseded,
}

struct EngineState {
    optimistic: Vec<PhotoRecord>,
    authoritative: Vec<PhotoRecord>,
    confirmed: HashSet<String>,
    expiry_tokens: HashMap<String, TaskToken>,
    load_error: Option<String>,
    activated: bool,
    in_flight: usize,
    fetch_generation: u64,
    shut_down: bool,
    view: watch::Sender<Vec<PhotoRecord>>,
}

impl EngineState {
    fn publish(&self) {
        self.view
            .send_replace(merge(&self.authoritative, &self.optimistic));
    }

    fn expire(&mut self, record_id: &str) {
        self.expiry_tokens.remove(record_id);
        let before = self.optimistic.len();
        self.optimistic.retain(|p| p.id != record_id);
        if self.optimistic.len() != before {
            tracing::info!(record = %record_id, "Unconfirmed upload expired from gallery");
            self.publish();
        }
    }

    /// Replace the listing and drop every optimistic record it confirms.
    /// Returns the expiry timers that no longer apply.
    fn apply_listing(&mut self, mut listed: Vec<PhotoRecord>, window: Duration) -> Vec<TaskToken> {
        for record in listed.iter_mut() {
            record.status = SyncStatus::Confirmed;
        }
        let listed_ids: HashSet<String> = listed
            .iter()
            .filter_map(|r| r.remote_key().map(str::to_string))
            .collect();
        let optimistic_ids: HashSet<&str> = self
            .optimistic
            .iter()
            .filter_map(PhotoRecord::remote_key)
            .collect();

        // A listed photo already confirmed earlier, or claimed by remote id,
        // cannot also confirm a record that lacks one.
        let mut claimed: Vec<bool> = listed
            .iter()
            .map(|r| match r.remote_key() {
                Some(id) => optimistic_ids.contains(id) || self.confirmed.contains(id),
                None => true,
            })
            .collect();

        let mut matched_locals: HashSet<String> = HashSet::new();
        for local in self.optimistic.iter().rev().filter(|p| p.remote_key().is_none()) {
            let hit = listed
                .iter()
                .enumerate()
                .position(|(i, r)| !claimed[i] && is_same_upload(local, r, window));
            if let Some(i) = hit {
                claimed[i] = true;
                matched_locals.insert(local.id.clone());
            }
        }

        let before = self.optimistic.len();
        let mut released = Vec::new();
        let mut kept = Vec::with_capacity(self.optimistic.len());
        for record in self.optimistic.drain(..) {
            let confirmed = match record.remote_key() {
                Some(id) => listed_ids.contains(id),
                None => matched_locals.contains(&record.id),
            };
            if confirmed {
                if let Some(token) = self.expiry_tokens.remove(&record.id) {
                    released.push(token);
                }
            } else {
                kept.push(record);
            }
        }
        let confirmed_now = before - kept.len();
        self.optimistic = kept;
        if confirmed_now > 0 {
            tracing::info!(count = confirmed_now, "Optimistic uploads confirmed by listing");
        }

        self.confirmed.extend(listed_ids);
        self.authoritative = listed;
        self.publish();
        released
    }
}

/// Counts one fetch as loading until dropped, whether or not it completed.
struct Loading(Rc<RefCell<EngineState>>);

impl Loading {
    fn start(state: &Rc<RefCell<EngineState>>) -> Self {
        state.borrow_mut().in_flight += 1;
        Loading(state.clone())
    }
}

impl Drop for Loading {
    fn drop(&mut self) {
        if let Ok(mut state) = self.0.try_borrow_mut() {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }
}

/// Owns the optimistic and authoritative photo sets and exposes only their
/// merged view.
pub struct ReconciliationEngine<S: MediaStore> {
    store: Rc<S>,
    state: Rc<RefCell<EngineState>>,
    scheduler: Scheduler,
    settings: EngineSettings,
}

impl<S: MediaStore> ReconciliationEngine<S> {
    pub fn new(store: Rc<S>, settings: EngineSettings) -> Self {
        let (view, _) = watch::channel(Vec::new());
        let state = EngineState {
            optimistic: Vec::new(),
            authoritative: Vec::new(),
            confirmed: HashSet::new(),
            expiry_tokens: HashMap::new(),
            load_error: None,
            activated: false,
            in_flight: 0,
            fetch_generation: 0,
            shut_down: false,
            view,
        };
        ReconciliationEngine {
            store,
            state: Rc::new(RefCell::new(state)),
            scheduler: Scheduler::new(),
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Snapshot of the merged gallery, optimistic records first.
    pub fn gallery(&self) -> Vec<PhotoRecord> {
        self.state.borrow().view.borrow().clone()
    }

    /// Receive the merged gallery every time it changes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<PhotoRecord>> {
        self.state.borrow().view.subscribe()
    }

    /// Standing error from the initial load, cleared by the next successful fetch.
    pub fn load_error(&self) -> Option<String> {
        self.state.borrow().load_error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().in_flight > 0
    }

    pub fn optimistic_len(&self) -> usize {
        self.state.borrow().optimistic.len()
    }

    pub fn is_optimistic(&self, record_id: &str) -> bool {
        self.state
            .borrow()
            .optimistic
            .iter()
            .any(|p| p.id == record_id)
    }

    /// Whether a remote id has ever been reported by the listing.
    pub fn is_confirmed(&self, remote_id: &str) -> bool {
        self.state.borrow().confirmed.contains(remote_id)
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    /// Put freshly uploaded records in front of the gallery and start their
    /// expiry timers. Records whose remote id the listing already reported
    /// are not reintroduced.
    pub fn record_upload(&self, records: Vec<PhotoRecord>) {
        let fresh_ids: Vec<String> = {
            let mut state = self.state.borrow_mut();
            if state.shut_down {
                return;
            }
            let mut fresh = Vec::with_capacity(records.len());
            for mut record in records {
                let already_confirmed = record.is_confirmed()
                    || record
                        .remote_key()
                        .is_some_and(|id| state.confirmed.contains(id));
                if already_confirmed {
                    tracing::debug!(record = %record.id, "Skipping upload already in listing");
                    continue;
                }
                if state.optimistic.iter().any(|p| p.id == record.id) {
                    continue;
                }
                record.status = SyncStatus::Optimistic;
                fresh.push(record);
            }
            let ids = fresh.iter().map(|r| r.id.clone()).collect();
            state.optimistic.splice(0..0, fresh);
            state.publish();
            ids
        };
        for id in &fresh_ids {
            self.schedule_expiry(id, self.settings.optimistic_expiry);
        }
    }

    /// Remove `record_id` from the optimistic set after `after` unless it has
    /// been confirmed by then. Rescheduling replaces the previous timer.
    pub fn schedule_expiry(&self, record_id: &str, after: Duration) {
        if !self.is_optimistic(record_id) {
            return;
        }
        let weak = Rc::downgrade(&self.state);
        let id = record_id.to_string();
        let token = self.scheduler.schedule(after, move || {
            if let Some(state) = weak.upgrade() {
                state.borrow_mut().expire(&id);
            }
        });
        let previous = self
            .state
            .borrow_mut()
            .expiry_tokens
            .insert(record_id.to_string(), token);
        if let Some(previous) = previous {
            self.scheduler.cancel(previous);
        }
    }

    /// Apply an authoritative listing directly.
    pub fn reconcile_with_fetch(&self, authoritative: Vec<PhotoRecord>) {
        let released = {
            let mut state = self.state.borrow_mut();
            if state.shut_down {
                return;
            }
            state.apply_listing(authoritative, self.settings.match_window)
        };
        for token in released {
            self.scheduler.cancel(token);
        }
    }

    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    async fn fetch(&self) -> Result<FetchOutcome, SyncError> {
        let generation = {
            let mut state = self.state.borrow_mut();
            if state.shut_down {
                return Err(SyncError::ShutDown);
            }
            state.fetch_generation += 1;
            state.fetch_generation
        };

        let loading = Loading::start(&self.state);
        let result = self.store.list_photos().await;
        drop(loading);

        let (outcome, released) = {
            let mut state = self.state.borrow_mut();
            if state.shut_down {
                tracing::debug!("Dropping listing that arrived after shutdown");
                return Err(SyncError::ShutDown);
            }
            if generation != state.fetch_generation {
                tracing::debug!(generation, "Dropping superseded listing");
                return Ok(FetchOutcome::Superseded);
            }
            let descriptors = result.map_err(|e| SyncError::ApiClientError(e.to_string()))?;
            let listed: Vec<PhotoRecord> = descriptors
                .iter()
                .map(|d| PhotoRecord::from_descriptor(d, SyncStatus::Confirmed))
                .collect();
            let count = listed.len();
            let released = state.apply_listing(listed, self.settings.match_window);
            state.load_error = None;
            (FetchOutcome::Applied(count), released)
        };
        for token in released {
            self.scheduler.cancel(token);
        }
        tracing::info!(?outcome, "Gallery listing fetched");
        Ok(outcome)
    }

    /// Perform the initial load once. Failure leaves the gallery untouched
    /// and is reported through [`ReconciliationEngine::load_error`].
    pub async fn activate(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.activated {
                return;
            }
            state.activated = true;
        }
        match self.fetch().await {
            Ok(_) | Err(SyncError::ShutDown) => {}
            Err(e) => {
                tracing::error!(error = %e, "Initial gallery load failed");
                self.state.borrow_mut().load_error = Some(format!(
                    "Failed to load photos from the media store. Please check your configuration. ({})",
                    e
                ));
            }
        }
    }

    /// Re-fetch on demand. A failure is returned to the caller and leaves
    /// the gallery as it was.
    pub async fn refresh(&self) -> Result<FetchOutcome, SyncError> {
        let outcome = self.fetch().await;
        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "Gallery refresh failed");
        }
        outcome
    }

    /// Cancel every pending timer and ignore fetches still in flight.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            state.expiry_tokens.clear();
        }
        self.scheduler.shutdown();
        tracing::debug!("Reconciliation engine shut down");
    }
}

impl<S: MediaStore> Drop for ReconciliationEngine<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
