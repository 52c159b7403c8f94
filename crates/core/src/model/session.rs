use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::progress::{TourError, TourProgress};

/// Lifecycle of a tour within the current process.
///
/// Only `active` reaches storage, so `Finished` and `Cancelled` are
/// indistinguishable after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TourState {
    Idle,
    Active,
    Paused,
    Finished,
    Cancelled,
}

/// What a navigation call did to the step index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepChange {
    Moved { from: u32, to: u32 },
    Unchanged,
    Finished,
}

/// Step snapshot handed to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentStep {
    pub index: u32,
    pub total: u32,
    pub active: bool,
    pub state: TourState,
}

/// Tour state machine: `Idle → Active → {Paused, Finished, Cancelled}`,
/// `Paused → {Active, Cancelled}`. `start` re-initializes from any state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TourSession {
    state: TourState,
    progress: Option<TourProgress>,
}

impl Default for TourSession {
    fn default() -> Self {
        Self::idle()
    }
}

impl TourSession {
    #[must_use]
    pub fn idle() -> Self {
        Self {
            state: TourState::Idle,
            progress: None,
        }
    }

    /// Continue a previously persisted tour exactly where it stopped.
    ///
    /// # Errors
    ///
    /// Returns `TourError::NotActive` if the persisted tour was finished or
    /// cancelled.
    pub fn resumed(progress: TourProgress) -> Result<Self, TourError> {
        if !progress.is_active() {
            return Err(TourError::NotActive {
                state: TourState::Finished,
            });
        }
        Ok(Self {
            state: TourState::Active,
            progress: Some(progress),
        })
    }

    #[must_use]
    pub fn state(&self) -> TourState {
        self.state
    }

    #[must_use]
    pub fn progress(&self) -> Option<&TourProgress> {
        self.progress.as_ref()
    }

    #[must_use]
    pub fn current_step(&self) -> CurrentStep {
        match &self.progress {
            Some(p) => CurrentStep {
                index: p.step_index(),
                total: p.total_steps(),
                active: p.is_active(),
                state: self.state,
            },
            None => CurrentStep {
                index: 0,
                total: 0,
                active: false,
                state: self.state,
            },
        }
    }

    /// Begin (or begin again) at step 0.
    ///
    /// # Errors
    ///
    /// Returns `TourError::InvalidConfiguration` if `total_steps` is zero; the
    /// session is left untouched in that case.
    pub fn start(&mut self, total_steps: u32, now: DateTime<Utc>) -> Result<(), TourError> {
        let progress = TourProgress::start(total_steps, now)?;
        self.progress = Some(progress);
        self.state = TourState::Active;
        Ok(())
    }

    /// Advance one step. Reaching or leaving the last step finishes the tour
    /// instead of wrapping.
    ///
    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the session is `Active`.
    pub fn next(&mut self, now: DateTime<Utc>) -> Result<StepChange, TourError> {
        let progress = self.active_progress_mut()?;
        if progress.is_last_step() {
            progress.deactivate(now);
            self.state = TourState::Finished;
            return Ok(StepChange::Finished);
        }
        let from = progress.step_index();
        progress.set_step(from + 1, now)?;
        if progress.is_last_step() {
            progress.deactivate(now);
            self.state = TourState::Finished;
            return Ok(StepChange::Finished);
        }
        Ok(StepChange::Moved { from, to: from + 1 })
    }

    /// Retreat one step. At step 0 this only refreshes the checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the session is `Active`.
    pub fn previous(&mut self, now: DateTime<Utc>) -> Result<StepChange, TourError> {
        let progress = self.active_progress_mut()?;
        let from = progress.step_index();
        if from == 0 {
            progress.touch(now);
            return Ok(StepChange::Unchanged);
        }
        progress.set_step(from - 1, now)?;
        Ok(StepChange::Moved { from, to: from - 1 })
    }

    /// Jump directly to `index`. Landing on the last step finishes the tour,
    /// the same as walking there with `next`.
    ///
    /// # Errors
    ///
    /// Returns `TourError::OutOfRange` if `index >= total_steps`, or
    /// `TourError::NotActive` unless the session is `Active`. Either way the
    /// session is unchanged.
    pub fn jump_to(&mut self, index: u32, now: DateTime<Utc>) -> Result<StepChange, TourError> {
        let progress = self.active_progress_mut()?;
        let from = progress.step_index();
        progress.set_step(index, now)?;
        if progress.is_last_step() {
            progress.deactivate(now);
            self.state = TourState::Finished;
            Ok(StepChange::Finished)
        } else if from == index {
            Ok(StepChange::Unchanged)
        } else {
            Ok(StepChange::Moved { from, to: index })
        }
    }

    /// Soft stop; the tour stays resumable.
    ///
    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the session is `Active`.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), TourError> {
        self.active_progress_mut()?.touch(now);
        self.state = TourState::Paused;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the session is `Paused`.
    pub fn resume_paused(&mut self, now: DateTime<Utc>) -> Result<(), TourError> {
        match (self.state, self.progress.as_mut()) {
            (TourState::Paused, Some(progress)) => {
                progress.touch(now);
                self.state = TourState::Active;
                Ok(())
            }
            (state, _) => Err(TourError::NotActive { state }),
        }
    }

    /// Stop without completing. A cancelled tour is never resumable.
    ///
    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the session is `Active` or `Paused`.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), TourError> {
        match (self.state, self.progress.as_mut()) {
            (TourState::Active | TourState::Paused, Some(progress)) => {
                progress.deactivate(now);
                self.state = TourState::Cancelled;
                Ok(())
            }
            (state, _) => Err(TourError::NotActive { state }),
        }
    }

    /// Complete the tour on the spot, wherever it currently is.
    ///
    /// # Errors
    ///
    /// Returns `TourError::NotActive` unless the session is `Active` or `Paused`.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<(), TourError> {
        match (self.state, self.progress.as_mut()) {
            (TourState::Active | TourState::Paused, Some(progress)) => {
                progress.deactivate(now);
                self.state = TourState::Finished;
                Ok(())
            }
            (state, _) => Err(TourError::NotActive { state }),
        }
    }

    fn active_progress_mut(&mut self) -> Result<&mut TourProgress, TourError> {
        match (self.state, self.progress.as_mut()) {
            (TourState::Active, Some(progress)) => Ok(progress),
            (state, _) => Err(TourError::NotActive { state }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn started(total: u32) -> TourSession {
        let mut session = TourSession::idle();
        session.start(total, fixed_now()).unwrap();
        session
    }

    #[test]
    fn walking_forward_finishes_the_tour() {
        for total in 2..=7 {
            let mut session = started(total);
            for _ in 0..total - 1 {
                session.next(fixed_now()).unwrap();
            }
            assert_eq!(session.state(), TourState::Finished);
            let step = session.current_step();
            assert!(!step.active);
            assert_eq!(step.index, total - 1);
        }
    }

    #[test]
    fn single_step_tour_finishes_on_first_next() {
        let mut session = started(1);
        assert_eq!(session.state(), TourState::Active);
        assert_eq!(session.next(fixed_now()).unwrap(), StepChange::Finished);
        assert_eq!(session.current_step().index, 0);
        assert!(matches!(
            session.next(fixed_now()),
            Err(TourError::NotActive {
                state: TourState::Finished
            })
        ));
    }

    #[test]
    fn jumping_to_the_last_step_finishes_like_walking_there() {
        let mut walked = started(3);
        walked.next(fixed_now()).unwrap();
        walked.next(fixed_now()).unwrap();

        let mut jumped = started(3);
        assert_eq!(jumped.jump_to(2, fixed_now()).unwrap(), StepChange::Finished);

        assert_eq!(jumped.current_step(), walked.current_step());
        assert_eq!(jumped.state(), TourState::Finished);
        assert!(matches!(
            jumped.previous(fixed_now()),
            Err(TourError::NotActive {
                state: TourState::Finished
            })
        ));
    }

    #[test]
    fn jumping_short_of_the_last_step_stays_active() {
        let mut session = started(4);
        assert_eq!(
            session.jump_to(2, fixed_now()).unwrap(),
            StepChange::Moved { from: 0, to: 2 }
        );
        assert_eq!(session.state(), TourState::Active);
        assert_eq!(session.previous(fixed_now()).unwrap(), StepChange::Moved { from: 2, to: 1 });
    }

    #[test]
    fn previous_at_first_step_only_restamps() {
        let mut session = started(3);
        let later = fixed_now() + Duration::seconds(10);
        assert_eq!(session.previous(later).unwrap(), StepChange::Unchanged);
        let progress = session.progress().unwrap();
        assert_eq!(progress.step_index(), 0);
        assert_eq!(progress.last_updated_at(), later);
    }

    #[test]
    fn jump_out_of_range_leaves_session_unchanged() {
        let mut session = started(5);
        session.next(fixed_now()).unwrap();
        let before = session.clone();
        let err = session
            .jump_to(10, fixed_now() + Duration::seconds(1))
            .unwrap_err();
        assert_eq!(
            err,
            TourError::OutOfRange {
                index: 10,
                total_steps: 5
            }
        );
        assert_eq!(session, before);
    }

    #[test]
    fn pause_blocks_navigation_until_resumed() {
        let mut session = started(5);
        session.pause(fixed_now()).unwrap();
        assert!(session.current_step().active);
        assert!(session.next(fixed_now()).is_err());
        session.resume_paused(fixed_now()).unwrap();
        assert_eq!(
            session.next(fixed_now()).unwrap(),
            StepChange::Moved { from: 0, to: 1 }
        );
    }

    #[test]
    fn cancel_from_pause_is_terminal_until_restart() {
        let mut session = started(5);
        session.pause(fixed_now()).unwrap();
        session.cancel(fixed_now()).unwrap();
        assert_eq!(session.state(), TourState::Cancelled);
        assert!(!session.current_step().active);
        assert!(session.resume_paused(fixed_now()).is_err());

        session.start(5, fixed_now()).unwrap();
        assert_eq!(session.state(), TourState::Active);
        assert_eq!(session.current_step().index, 0);
    }

    #[test]
    fn idle_session_rejects_navigation() {
        let mut session = TourSession::idle();
        assert!(matches!(
            session.previous(fixed_now()),
            Err(TourError::NotActive {
                state: TourState::Idle
            })
        ));
        assert_eq!(session.current_step().total, 0);
    }

    #[test]
    fn resumed_requires_active_progress() {
        let done = TourProgress::from_persisted(2, 5, false, fixed_now()).unwrap();
        assert!(TourSession::resumed(done).is_err());

        let live = TourProgress::from_persisted(2, 5, true, fixed_now()).unwrap();
        let session = TourSession::resumed(live).unwrap();
        assert_eq!(session.state(), TourState::Active);
        assert_eq!(session.current_step().index, 2);
    }
}
