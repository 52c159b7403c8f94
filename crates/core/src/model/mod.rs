mod ids;
mod progress;
mod resume;
mod session;
mod ui_state;

pub use ids::{ComponentId, TourKey};
pub use progress::{TourError, TourProgress};
pub use resume::{ResumeDecision, ResumeOffer, ResumeOfferView};
pub use session::{CurrentStep, StepChange, TourSession, TourState};
pub use ui_state::{PanelPosition, PanelState, UiStateBag, UiStateError};
