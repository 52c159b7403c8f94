#![forbid(unsafe_code)]

pub mod config;
pub mod controller;
pub mod error;
pub mod notify;
mod persistence;
pub mod resume_advisor;
pub mod ui_state_store;

pub use walkthrough_core::Clock;

pub use config::WalkthroughConfig;
pub use controller::{EndReason, Update, WalkthroughController};
pub use error::{ResumeError, WalkthroughError};
pub use notify::{ChangeBatch, StepAnnouncer, Subscription};
pub use resume_advisor::ResumeAdvisor;
pub use ui_state_store::UiStateStore;
