use chrono::{DateTime, Utc};
use thiserror::Error;

use super::session::TourState;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TourError {
    #[error("a tour needs at least one step (got {total_steps})")]
    InvalidConfiguration { total_steps: u32 },

    #[error("step {index} is out of range for a {total_steps}-step tour")]
    OutOfRange { index: u32, total_steps: u32 },

    #[error("tour is not active (state: {state:?})")]
    NotActive { state: TourState },

    #[error("invalid persisted progress: {0}")]
    InvalidPersistedState(String),
}

/// Position within a tour plus the checkpoint of its last mutation.
///
/// `step_index < total_steps` always holds; `total_steps` is fixed once the
/// progress is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TourProgress {
    step_index: u32,
    total_steps: u32,
    active: bool,
    last_updated_at: DateTime<Utc>,
}

impl TourProgress {
    /// Fresh progress at step 0.
    ///
    /// # Errors
    ///
    /// Returns `TourError::InvalidConfiguration` if `total_steps` is zero.
    pub fn start(total_steps: u32, now: DateTime<Utc>) -> Result<Self, TourError> {
        if total_steps == 0 {
            return Err(TourError::InvalidConfiguration { total_steps });
        }
        Ok(Self {
            step_index: 0,
            total_steps,
            active: true,
            last_updated_at: now,
        })
    }

    /// Rehydrate progress from a persisted record.
    ///
    /// # Errors
    ///
    /// Returns `TourError::InvalidPersistedState` if the record breaks the
    /// step/total invariant.
    pub fn from_persisted(
        step_index: u32,
        total_steps: u32,
        active: bool,
        last_updated_at: DateTime<Utc>,
    ) -> Result<Self, TourError> {
        if total_steps == 0 {
            return Err(TourError::InvalidPersistedState(
                "total_steps must be positive".into(),
            ));
        }
        if step_index >= total_steps {
            return Err(TourError::InvalidPersistedState(format!(
                "step_index {step_index} exceeds total_steps {total_steps}"
            )));
        }
        Ok(Self {
            step_index,
            total_steps,
            active,
            last_updated_at,
        })
    }

    #[must_use]
    pub fn step_index(&self) -> u32 {
        self.step_index
    }

    #[must_use]
    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn last_updated_at(&self) -> DateTime<Utc> {
        self.last_updated_at
    }

    #[must_use]
    pub fn is_last_step(&self) -> bool {
        self.step_index + 1 == self.total_steps
    }

    /// `round(100 * step_index / total_steps)`, half rounding up.
    #[must_use]
    pub fn percent_complete(&self) -> u8 {
        let step = u64::from(self.step_index);
        let total = u64::from(self.total_steps);
        let pct = (200 * step + total) / (2 * total);
        u8::try_from(pct.min(100)).unwrap_or(100)
    }

    pub(crate) fn set_step(&mut self, index: u32, now: DateTime<Utc>) -> Result<(), TourError> {
        if index >= self.total_steps {
            return Err(TourError::OutOfRange {
                index,
                total_steps: self.total_steps,
            });
        }
        self.step_index = index;
        self.last_updated_at = now;
        Ok(())
    }

    pub(crate) fn deactivate(&mut self, now: DateTime<Utc>) {
        self.active = false;
        self.last_updated_at = now;
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn start_rejects_empty_tour() {
        let err = TourProgress::start(0, fixed_now()).unwrap_err();
        assert_eq!(err, TourError::InvalidConfiguration { total_steps: 0 });
    }

    #[test]
    fn percent_complete_rounds() {
        let at = |step, total| {
            TourProgress::from_persisted(step, total, true, fixed_now())
                .unwrap()
                .percent_complete()
        };
        assert_eq!(at(0, 5), 0);
        assert_eq!(at(2, 5), 40);
        assert_eq!(at(1, 3), 33);
        assert_eq!(at(2, 3), 67);
        assert_eq!(at(1, 8), 13);
    }

    #[test]
    fn from_persisted_rejects_step_past_end() {
        let err = TourProgress::from_persisted(5, 5, true, fixed_now()).unwrap_err();
        assert!(matches!(err, TourError::InvalidPersistedState(_)));
        assert!(TourProgress::from_persisted(0, 0, false, fixed_now()).is_err());
    }

    #[test]
    fn set_step_keeps_state_on_out_of_range() {
        let mut progress = TourProgress::start(3, fixed_now()).unwrap();
        let later = fixed_now() + chrono::Duration::seconds(5);
        let err = progress.set_step(3, later).unwrap_err();
        assert_eq!(
            err,
            TourError::OutOfRange {
                index: 3,
                total_steps: 3
            }
        );
        assert_eq!(progress.step_index(), 0);
        assert_eq!(progress.last_updated_at(), fixed_now());
    }
}
