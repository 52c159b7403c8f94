use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use storage::repository::{PersistenceAdapter, ProgressRecord, Storage, UiStateRecord};
use tokio::task::JoinHandle;
use walkthrough_core::Clock;
use walkthrough_core::model::{
    ComponentId, CurrentStep, ResumeDecision, ResumeOfferView, StepChange, TourKey,
    TourProgress, TourSession, TourState, UiStateBag, UiStateError,
};

use crate::config::WalkthroughConfig;
use crate::error::WalkthroughError;
use crate::notify::{ChangeBatch, Subscribers, Subscription};
use crate::persistence::{PersistenceHandle, PersistenceWorker};
use crate::resume_advisor::ResumeAdvisor;
use crate::ui_state_store::UiStateStore;

/// How `end_tour` stops the tour. Both leave the tour non-resumable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Finished,
    Cancelled,
}

#[derive(Debug, Default)]
struct PendingChanges {
    step: bool,
    persist_progress: bool,
    components: Vec<ComponentId>,
    ui_reset: bool,
}

impl PendingChanges {
    fn is_empty(&self) -> bool {
        !self.step && self.components.is_empty() && !self.ui_reset
    }

    fn touch_component(&mut self, id: &ComponentId) {
        if !self.components.contains(id) {
            self.components.push(id.clone());
        }
    }
}

/// One logical operation spanning tour progress and UI state.
///
/// Obtained through `WalkthroughController::update`; everything done here
/// is committed (persisted and announced) as a single batch, or rolled back
/// entirely if the closure returns an error.
pub struct Update<'a> {
    clock: &'a Clock,
    session: &'a mut TourSession,
    ui_state: &'a mut UiStateStore,
    advisor: &'a mut ResumeAdvisor,
    pending: &'a mut PendingChanges,
}

impl Update<'_> {
    /// # Errors
    ///
    /// Returns `TourError::InvalidConfiguration` if `total_steps` is zero.
    pub fn start_tour(&mut self, total_steps: u32) -> Result<CurrentStep, WalkthroughError> {
        self.session.start(total_steps, self.clock.now())?;
        if self.advisor.supersede() {
            tracing::info!("pending resume offer superseded by a fresh start");
        }
        tracing::info!(total_steps, "tour started");
        self.mark_progress();
        Ok(self.session.current_step())
    }

    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the tour is active.
    pub fn next_step(&mut self) -> Result<CurrentStep, WalkthroughError> {
        let change = self.session.next(self.clock.now())?;
        self.log_change(change);
        self.mark_progress();
        Ok(self.session.current_step())
    }

    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the tour is active.
    pub fn previous_step(&mut self) -> Result<CurrentStep, WalkthroughError> {
        let change = self.session.previous(self.clock.now())?;
        self.log_change(change);
        self.mark_progress();
        Ok(self.session.current_step())
    }

    /// # Errors
    ///
    /// Returns `TourError::OutOfRange` for an index past the last step, or
    /// `TourError::NotActive` unless the tour is active.
    pub fn go_to_step(&mut self, index: u32) -> Result<CurrentStep, WalkthroughError> {
        let change = self.session.jump_to(index, self.clock.now())?;
        self.log_change(change);
        self.mark_progress();
        Ok(self.session.current_step())
    }

    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the tour is active.
    pub fn pause_tour(&mut self) -> Result<CurrentStep, WalkthroughError> {
        self.session.pause(self.clock.now())?;
        tracing::info!("tour paused");
        self.mark_progress();
        Ok(self.session.current_step())
    }

    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the tour is paused.
    pub fn resume_tour(&mut self) -> Result<CurrentStep, WalkthroughError> {
        self.session.resume_paused(self.clock.now())?;
        tracing::info!("tour resumed from pause");
        self.mark_progress();
        Ok(self.session.current_step())
    }

    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the tour is active or paused.
    pub fn end_tour(&mut self, reason: EndReason) -> Result<CurrentStep, WalkthroughError> {
        let now = self.clock.now();
        match reason {
            EndReason::Finished => self.session.finish(now)?,
            EndReason::Cancelled => self.session.cancel(now)?,
        }
        tracing::info!(?reason, "tour ended");
        self.mark_progress();
        Ok(self.session.current_step())
    }

    /// Shallow-merge `partial` into the bag for `id`.
    pub fn set_ui_state(&mut self, id: impl Into<ComponentId>, partial: UiStateBag) {
        let id = id.into();
        tracing::debug!(component = %id, fields = partial.len(), "ui state write");
        self.pending.touch_component(&id);
        self.ui_state.set(id, partial);
    }

    /// Merge a typed view into the bag for `id`.
    ///
    /// # Errors
    ///
    /// Returns `UiStateError` if `view` does not serialize to a JSON object.
    pub fn set_ui_view<T: Serialize>(
        &mut self,
        id: impl Into<ComponentId>,
        view: &T,
    ) -> Result<(), WalkthroughError> {
        let partial = UiStateBag::from_view(view)?;
        self.set_ui_state(id, partial);
        Ok(())
    }

    pub fn clear_component(&mut self, id: impl Into<ComponentId>) {
        let id = id.into();
        let existed = self.ui_state.remove(&id);
        tracing::debug!(component = %id, existed, "ui state cleared");
        self.pending.touch_component(&id);
    }

    pub fn reset_ui_state(&mut self) {
        self.ui_state.reset();
        tracing::info!("ui state reset");
        self.pending.ui_reset = true;
    }

    #[must_use]
    pub fn current_step(&self) -> CurrentStep {
        self.session.current_step()
    }

    #[must_use]
    pub fn ui_state(&self, id: &ComponentId) -> UiStateBag {
        self.ui_state.get(id)
    }

    fn mark_progress(&mut self) {
        self.pending.step = true;
        self.pending.persist_progress = true;
    }

    fn log_change(&self, change: StepChange) {
        match change {
            StepChange::Moved { from, to } => tracing::debug!(from, to, "step changed"),
            StepChange::Unchanged => tracing::debug!("step unchanged; checkpoint refreshed"),
            StepChange::Finished => tracing::info!("tour finished"),
        }
    }
}

/// Composition root of the walkthrough engine.
///
/// Constructed once at application start and passed by reference to every
/// collaborator. Mutations are synchronous; persistence is written behind by
/// a background task. Call `shutdown` to flush before exit.
pub struct WalkthroughController {
    tour_key: TourKey,
    clock: Clock,
    session: TourSession,
    ui_state: UiStateStore,
    advisor: ResumeAdvisor,
    subscribers: Subscribers,
    persistence: PersistenceHandle,
    worker: Option<JoinHandle<()>>,
}

impl WalkthroughController {
    /// Load persisted records for the configured tour and compute the resume
    /// offer. Must be called from within a Tokio runtime.
    ///
    /// Unreadable or malformed records are logged and treated as absent.
    pub async fn open(storage: &Storage, config: WalkthroughConfig) -> Self {
        let adapter = Arc::clone(&storage.records);
        let tour_key = config.tour_key().clone();
        let clock = config.clock();

        let progress = load_progress(adapter.as_ref(), &tour_key).await;
        let ui_record = load_ui_state(adapter.as_ref(), &tour_key).await;
        let advisor = ResumeAdvisor::check_resumable(progress.as_ref(), &clock);
        if let Some(offer) = advisor.offer() {
            tracing::info!(
                tour = %tour_key,
                step = offer.step_index(),
                total = offer.total_steps(),
                "resumable tour found"
            );
        }

        let (persistence, worker) = PersistenceWorker::spawn(adapter);
        tracing::info!(tour = %tour_key, "walkthrough controller opened");

        Self {
            tour_key,
            clock,
            session: TourSession::idle(),
            ui_state: UiStateStore::from_record(ui_record),
            advisor,
            subscribers: Subscribers::default(),
            persistence,
            worker: Some(worker),
        }
    }

    /// Open a controller backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `WalkthroughError::Sqlite` if the database cannot be opened or
    /// migrated.
    pub async fn open_sqlite(
        db_url: &str,
        config: WalkthroughConfig,
    ) -> Result<Self, WalkthroughError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::open(&storage, config).await)
    }

    #[must_use]
    pub fn tour_key(&self) -> &TourKey {
        &self.tour_key
    }

    // ─── Reads ──────────────────────────────────────────────────────────────

    #[must_use]
    pub fn current_step(&self) -> CurrentStep {
        self.session.current_step()
    }

    #[must_use]
    pub fn tour_state(&self) -> TourState {
        self.session.state()
    }

    #[must_use]
    pub fn progress(&self) -> Option<&TourProgress> {
        self.session.progress()
    }

    /// Bag for `id`; empty if the component never wrote anything.
    #[must_use]
    pub fn ui_state(&self, id: &ComponentId) -> UiStateBag {
        self.ui_state.get(id)
    }

    /// Read a component's bag through a typed view.
    ///
    /// # Errors
    ///
    /// Returns `UiStateError` if the stored fields do not fit `T`.
    pub fn ui_view<T: DeserializeOwned>(&self, id: &ComponentId) -> Result<T, UiStateError> {
        self.ui_state.get(id).to_view()
    }

    /// Startup resume offer, memoized at `open`. `None` once resolved.
    #[must_use]
    pub fn resume_offer(&self) -> Option<ResumeOfferView> {
        self.advisor.offer().map(|offer| offer.view())
    }

    #[must_use]
    pub fn resume_resolution(&self) -> Option<ResumeDecision> {
        self.advisor.resolution()
    }

    // ─── Subscriptions ──────────────────────────────────────────────────────

    /// Register a listener called once per committed operation.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChangeBatch) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(Arc::new(listener))
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    // ─── Mutations ──────────────────────────────────────────────────────────

    /// Run several mutations as one logical operation.
    ///
    /// On success the changes are persisted and exactly one `ChangeBatch` is
    /// published (none if nothing was touched). On error every in-memory
    /// change made by `f` is rolled back and nothing is published.
    ///
    /// # Errors
    ///
    /// Returns whatever error `f` returns.
    pub fn update<R>(
        &mut self,
        f: impl FnOnce(&mut Update<'_>) -> Result<R, WalkthroughError>,
    ) -> Result<R, WalkthroughError> {
        let session_before = self.session.clone();
        let ui_before = self.ui_state.clone();
        let advisor_before = self.advisor.clone();
        let mut pending = PendingChanges::default();

        let result = {
            let mut update = Update {
                clock: &self.clock,
                session: &mut self.session,
                ui_state: &mut self.ui_state,
                advisor: &mut self.advisor,
                pending: &mut pending,
            };
            f(&mut update)
        };

        match result {
            Ok(value) => {
                self.commit(pending);
                Ok(value)
            }
            Err(err) => {
                self.session = session_before;
                self.ui_state = ui_before;
                self.advisor = advisor_before;
                tracing::debug!(error = %err, "walkthrough update rejected");
                Err(err)
            }
        }
    }

    /// Commit an operation that cannot fail; no rollback snapshot is taken.
    fn apply(&mut self, f: impl FnOnce(&mut Update<'_>)) {
        let mut pending = PendingChanges::default();
        f(&mut Update {
            clock: &self.clock,
            session: &mut self.session,
            ui_state: &mut self.ui_state,
            advisor: &mut self.advisor,
            pending: &mut pending,
        });
        self.commit(pending);
    }

    /// # Errors
    ///
    /// Returns `TourError::InvalidConfiguration` if `total_steps` is zero.
    pub fn start_tour(&mut self, total_steps: u32) -> Result<CurrentStep, WalkthroughError> {
        self.update(|u| u.start_tour(total_steps))
    }

    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the tour is active.
    pub fn next_step(&mut self) -> Result<CurrentStep, WalkthroughError> {
        self.update(|u| u.next_step())
    }

    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the tour is active.
    pub fn previous_step(&mut self) -> Result<CurrentStep, WalkthroughError> {
        self.update(|u| u.previous_step())
    }

    /// # Errors
    ///
    /// Returns `TourError::OutOfRange` for an index past the last step, or
    /// `TourError::NotActive` unless the tour is active.
    pub fn go_to_step(&mut self, index: u32) -> Result<CurrentStep, WalkthroughError> {
        self.update(|u| u.go_to_step(index))
    }

    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the tour is active.
    pub fn pause_tour(&mut self) -> Result<CurrentStep, WalkthroughError> {
        self.update(|u| u.pause_tour())
    }

    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the tour is paused.
    pub fn resume_tour(&mut self) -> Result<CurrentStep, WalkthroughError> {
        self.update(|u| u.resume_tour())
    }

    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the tour is active or paused.
    pub fn end_tour(&mut self, reason: EndReason) -> Result<CurrentStep, WalkthroughError> {
        self.update(|u| u.end_tour(reason))
    }

    /// Shallow-merge `partial` into the bag for `id`. Empty or identical
    /// writes still persist and notify.
    pub fn set_ui_state(&mut self, id: impl Into<ComponentId>, partial: UiStateBag) {
        let id = id.into();
        self.apply(|u| u.set_ui_state(id, partial));
    }

    /// # Errors
    ///
    /// Returns `UiStateError` if `view` does not serialize to a JSON object.
    pub fn set_ui_view<T: Serialize>(
        &mut self,
        id: impl Into<ComponentId>,
        view: &T,
    ) -> Result<(), WalkthroughError> {
        let id = id.into();
        self.update(|u| u.set_ui_view(id, view))
    }

    pub fn clear_component(&mut self, id: impl Into<ComponentId>) {
        let id = id.into();
        self.apply(|u| u.clear_component(id));
    }

    /// Drop every UI-state bag without touching tour progress.
    pub fn reset_ui_state(&mut self) {
        self.apply(|u| u.reset_ui_state());
    }

    // ─── Resume offer resolution ────────────────────────────────────────────

    /// Continue the persisted tour from its recorded step. The persisted
    /// record is left as is.
    ///
    /// # Errors
    ///
    /// Returns `ResumeError::AlreadyResolved` or `ResumeError::NoOffer`.
    pub fn resume(&mut self) -> Result<CurrentStep, WalkthroughError> {
        let offer = self.advisor.resolve(ResumeDecision::Resume)?;
        self.session = TourSession::resumed(*offer.progress())?;
        tracing::info!(
            tour = %self.tour_key,
            step = offer.step_index(),
            total = offer.total_steps(),
            "resumed interrupted tour"
        );
        self.commit(PendingChanges {
            step: true,
            ..PendingChanges::default()
        });
        Ok(self.session.current_step())
    }

    /// Discard the persisted progress and start the same tour from step 0.
    ///
    /// # Errors
    ///
    /// Returns `ResumeError::AlreadyResolved` or `ResumeError::NoOffer`.
    pub fn restart(&mut self) -> Result<CurrentStep, WalkthroughError> {
        let offer = self.advisor.resolve(ResumeDecision::Restart)?;
        tracing::info!(tour = %self.tour_key, "restarting interrupted tour");
        self.session.start(offer.total_steps(), self.clock.now())?;
        self.commit(PendingChanges {
            step: true,
            persist_progress: true,
            ..PendingChanges::default()
        });
        Ok(self.session.current_step())
    }

    /// Decline the offer; the tour stays idle and nothing is persisted.
    ///
    /// # Errors
    ///
    /// Returns `ResumeError::AlreadyResolved` or `ResumeError::NoOffer`.
    pub fn dismiss(&mut self) -> Result<(), WalkthroughError> {
        self.advisor.resolve(ResumeDecision::Dismiss)?;
        tracing::info!(tour = %self.tour_key, "resume offer dismissed");
        Ok(())
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────────

    /// Wait until every write issued so far has reached storage.
    pub async fn flush(&self) {
        self.persistence.flush().await;
    }

    /// Flush pending writes and stop the background writer.
    pub async fn shutdown(mut self) {
        self.persistence.flush().await;
        let tour_key = self.tour_key.clone();
        let worker = self.worker.take();
        drop(self);
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                tracing::warn!(error = %err, "persistence worker ended abnormally");
            }
        }
        tracing::info!(tour = %tour_key, "walkthrough controller shut down");
    }

    fn commit(&mut self, pending: PendingChanges) {
        if pending.is_empty() {
            return;
        }

        if pending.persist_progress {
            self.persist_progress();
        }
        if pending.ui_reset || !pending.components.is_empty() {
            self.persist_ui_state(pending.ui_reset);
        }

        let batch = ChangeBatch {
            step: pending.step.then(|| self.session.current_step()),
            components: pending.components,
            ui_reset: pending.ui_reset,
        };
        self.subscribers.publish(&batch);
    }

    fn persist_progress(&self) {
        let Some(progress) = self.session.progress() else {
            return;
        };
        match ProgressRecord::from_progress(progress).to_json() {
            Ok(json) => self.persistence.save(self.tour_key.progress_key(), json),
            Err(err) => {
                tracing::warn!(tour = %self.tour_key, error = %err, "progress not persisted");
            }
        }
    }

    fn persist_ui_state(&self, reset: bool) {
        if reset && self.ui_state.is_empty() {
            self.persistence.clear(self.tour_key.ui_state_key());
            return;
        }
        match self.ui_state.to_record().to_json() {
            Ok(json) => self.persistence.save(self.tour_key.ui_state_key(), json),
            Err(err) => {
                tracing::warn!(tour = %self.tour_key, error = %err, "ui state not persisted");
            }
        }
    }
}

async fn load_progress(adapter: &dyn PersistenceAdapter, key: &TourKey) -> Option<TourProgress> {
    let raw = match adapter.load(&key.progress_key()).await {
        Ok(raw) => raw?,
        Err(err) => {
            tracing::warn!(tour = %key, error = %err, "could not load tour progress");
            return None;
        }
    };
    match ProgressRecord::from_json(&raw).map(ProgressRecord::into_progress) {
        Ok(Ok(progress)) => Some(progress),
        Ok(Err(err)) => {
            tracing::warn!(tour = %key, error = %err, "ignoring invalid tour progress");
            None
        }
        Err(err) => {
            tracing::warn!(tour = %key, error = %err, "ignoring unreadable tour progress");
            None
        }
    }
}

async fn load_ui_state(adapter: &dyn PersistenceAdapter, key: &TourKey) -> UiStateRecord {
    let raw = match adapter.load(&key.ui_state_key()).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return UiStateRecord::default(),
        Err(err) => {
            tracing::warn!(tour = %key, error = %err, "could not load ui state");
            return UiStateRecord::default();
        }
    };
    UiStateRecord::from_json(&raw).unwrap_or_else(|err| {
        tracing::warn!(tour = %key, error = %err, "ignoring unreadable ui state");
        UiStateRecord::default()
    })
}
