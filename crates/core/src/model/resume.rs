use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::progress::TourProgress;
use crate::time::Clock;

/// How the user answered a resume prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeDecision {
    Resume,
    Restart,
    Dismiss,
}

/// Proposal to continue an interrupted tour. Derived at startup, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeOffer {
    progress: TourProgress,
    elapsed: Duration,
}

/// Presentation shape of a `ResumeOffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeOfferView {
    pub step_index: u32,
    pub total_steps: u32,
    pub elapsed_seconds: u64,
    pub percent_complete: u8,
}

impl ResumeOffer {
    /// Offer to resume `progress` if it is still active and got past step 0.
    ///
    /// There is no staleness cut-off; elapsed time is informational only.
    #[must_use]
    pub fn evaluate(progress: &TourProgress, clock: &Clock) -> Option<Self> {
        if !progress.is_active() || progress.step_index() == 0 {
            return None;
        }
        Some(Self {
            progress: *progress,
            elapsed: clock.elapsed_since(progress.last_updated_at()),
        })
    }

    #[must_use]
    pub fn progress(&self) -> &TourProgress {
        &self.progress
    }

    #[must_use]
    pub fn step_index(&self) -> u32 {
        self.progress.step_index()
    }

    #[must_use]
    pub fn total_steps(&self) -> u32 {
        self.progress.total_steps()
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    #[must_use]
    pub fn last_updated_at(&self) -> DateTime<Utc> {
        self.progress.last_updated_at()
    }

    #[must_use]
    pub fn percent_complete(&self) -> u8 {
        self.progress.percent_complete()
    }

    #[must_use]
    pub fn view(&self) -> ResumeOfferView {
        ResumeOfferView {
            step_index: self.step_index(),
            total_steps: self.total_steps(),
            elapsed_seconds: u64::try_from(self.elapsed.num_seconds()).unwrap_or(0),
            percent_complete: self.percent_complete(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{fixed_clock, fixed_now};

    fn progress(step: u32, total: u32, active: bool) -> TourProgress {
        TourProgress::from_persisted(step, total, active, fixed_now()).unwrap()
    }

    #[test]
    fn offers_only_for_active_tours_past_first_step() {
        let clock = fixed_clock();
        assert!(ResumeOffer::evaluate(&progress(2, 5, true), &clock).is_some());
        assert!(ResumeOffer::evaluate(&progress(0, 5, true), &clock).is_none());
        assert!(ResumeOffer::evaluate(&progress(2, 5, false), &clock).is_none());
    }

    #[test]
    fn view_reports_elapsed_and_percent() {
        let mut clock = fixed_clock();
        clock.advance(Duration::minutes(3));
        let offer = ResumeOffer::evaluate(&progress(2, 5, true), &clock).unwrap();
        assert_eq!(
            offer.view(),
            ResumeOfferView {
                step_index: 2,
                total_steps: 5,
                elapsed_seconds: 180,
                percent_complete: 40,
            }
        );
    }

    #[test]
    fn view_serializes_camel_case() {
        let offer = ResumeOffer::evaluate(&progress(3, 4, true), &fixed_clock()).unwrap();
        let json = serde_json::to_value(offer.view()).unwrap();
        assert_eq!(json["stepIndex"], 3);
        assert_eq!(json["percentComplete"], 75);
        assert_eq!(json["elapsedSeconds"], 0);
    }
}
