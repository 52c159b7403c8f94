use walkthrough_core::Clock;
use walkthrough_core::model::TourKey;

/// Settings for one `WalkthroughController`.
#[derive(Debug, Clone)]
pub struct WalkthroughConfig {
    tour_key: TourKey,
    clock: Clock,
}

impl WalkthroughConfig {
    #[must_use]
    pub fn new(tour_key: impl Into<TourKey>) -> Self {
        Self {
            tour_key: tour_key.into(),
            clock: Clock::system(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn tour_key(&self) -> &TourKey {
        &self.tour_key
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }
}
