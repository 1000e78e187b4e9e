//! Account onboarding: the funding wizard behind the "Raiden account" page.
//!
//! The coordinator owns the wizard step, drives keystore download, ETH
//! funding (faucet or wallet provider) and the optional mainnet token swap,
//! and polls the backend for the status of those background tasks. Rendering
//! code only ever sees snapshots and the UI flags projected from them.

pub mod ack;
pub mod coordinator;
pub mod model;
pub mod routes;
pub mod state;
pub mod task;
pub mod ui;

pub use ack::{AckItem, AckPrompt};
pub use coordinator::{
    CoordinatorDeps, ErrorNotice, OnboardingCoordinator, OnboardingEvent, OnboardingSnapshot,
};
pub use model::{EthAmount, Network, OnboardingSession, SessionConstants};
pub use routes::{OnboardingRouteState, fatal_routes, onboarding_routes};
pub use state::Step;
pub use task::{BackgroundTask, PollOutcome, TaskKind, TaskStatus};
pub use ui::{UiFlags, project};
