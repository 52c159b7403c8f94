use walkthrough_core::Clock;
use walkthrough_core::model::{ResumeDecision, ResumeOffer, TourProgress};

use crate::error::ResumeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OfferSlot {
    Empty,
    Pending(ResumeOffer),
    Resolved(ResumeDecision),
}

/// Startup check for an interrupted tour, computed once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeAdvisor {
    slot: OfferSlot,
}

impl ResumeAdvisor {
    /// Inspect the persisted progress and memoize the resulting offer, if any.
    #[must_use]
    pub fn check_resumable(persisted: Option<&TourProgress>, clock: &Clock) -> Self {
        let slot = persisted
            .and_then(|progress| ResumeOffer::evaluate(progress, clock))
            .map_or(OfferSlot::Empty, OfferSlot::Pending);
        Self { slot }
    }

    /// The unresolved offer. `None` once the user has answered it.
    #[must_use]
    pub fn offer(&self) -> Option<&ResumeOffer> {
        match &self.slot {
            OfferSlot::Pending(offer) => Some(offer),
            OfferSlot::Empty | OfferSlot::Resolved(_) => None,
        }
    }

    #[must_use]
    pub fn resolution(&self) -> Option<ResumeDecision> {
        match self.slot {
            OfferSlot::Resolved(decision) => Some(decision),
            OfferSlot::Empty | OfferSlot::Pending(_) => None,
        }
    }

    /// Answer the offer exactly once.
    ///
    /// # Errors
    ///
    /// Returns `ResumeError::AlreadyResolved` on a second call, or
    /// `ResumeError::NoOffer` if no offer was produced at startup.
    pub fn resolve(&mut self, decision: ResumeDecision) -> Result<ResumeOffer, ResumeError> {
        match self.slot {
            OfferSlot::Pending(offer) => {
                self.slot = OfferSlot::Resolved(decision);
                Ok(offer)
            }
            OfferSlot::Resolved(_) => Err(ResumeError::AlreadyResolved),
            OfferSlot::Empty => Err(ResumeError::NoOffer),
        }
    }

    /// A fresh tour was started while the offer was still open; treat that
    /// as the user choosing to restart.
    pub(crate) fn supersede(&mut self) -> bool {
        if matches!(self.slot, OfferSlot::Pending(_)) {
            self.slot = OfferSlot::Resolved(ResumeDecision::Restart);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walkthrough_core::time::{fixed_clock, fixed_now};

    fn persisted(step: u32, active: bool) -> TourProgress {
        TourProgress::from_persisted(step, 5, active, fixed_now()).unwrap()
    }

    #[test]
    fn no_record_means_no_offer() {
        let mut advisor = ResumeAdvisor::check_resumable(None, &fixed_clock());
        assert!(advisor.offer().is_none());
        assert_eq!(
            advisor.resolve(ResumeDecision::Resume),
            Err(ResumeError::NoOffer)
        );
    }

    #[test]
    fn step_zero_is_not_worth_resuming() {
        let advisor = ResumeAdvisor::check_resumable(Some(&persisted(0, true)), &fixed_clock());
        assert!(advisor.offer().is_none());
    }

    #[test]
    fn offer_resolves_exactly_once() {
        let mut advisor =
            ResumeAdvisor::check_resumable(Some(&persisted(2, true)), &fixed_clock());
        assert_eq!(advisor.offer().map(ResumeOffer::step_index), Some(2));

        let offer = advisor.resolve(ResumeDecision::Dismiss).unwrap();
        assert_eq!(offer.total_steps(), 5);
        assert!(advisor.offer().is_none());
        assert_eq!(advisor.resolution(), Some(ResumeDecision::Dismiss));
        assert_eq!(
            advisor.resolve(ResumeDecision::Resume),
            Err(ResumeError::AlreadyResolved)
        );
    }

    #[test]
    fn supersede_only_touches_pending_offers() {
        let mut empty = ResumeAdvisor::check_resumable(Some(&persisted(3, false)), &fixed_clock());
        assert!(!empty.supersede());

        let mut pending =
            ResumeAdvisor::check_resumable(Some(&persisted(3, true)), &fixed_clock());
        assert!(pending.supersede());
        assert_eq!(pending.resolution(), Some(ResumeDecision::Restart));
    }
}
