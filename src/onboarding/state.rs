//! Onboarding state machine: tracks which step of the wizard the account is in.

use serde::{Deserialize, Serialize};

/// The steps of the account onboarding wizard.
///
/// Progresses linearly: KeystoreDownload → FundingRequest →
/// FundingConfirmed → SwapOffer → Complete. `SwapOffer` only exists when a
/// token swap is offered; otherwise FundingConfirmed goes straight to Complete.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    KeystoreDownload,
    FundingRequest,
    FundingConfirmed,
    SwapOffer,
    Complete,
}

impl Step {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: Step) -> bool {
        use Step::*;
        matches!(
            (self, target),
            (KeystoreDownload, FundingRequest)
                | (FundingRequest, FundingConfirmed)
                | (FundingConfirmed, SwapOffer)
                | (FundingConfirmed, Complete)
                | (SwapOffer, Complete)
        )
    }

    /// Whether this step is terminal (onboarding is done).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// The step that follows `self`, given whether a swap is offered.
    pub fn next(&self, swap_enabled: bool) -> Option<Step> {
        use Step::*;
        match self {
            KeystoreDownload => Some(FundingRequest),
            FundingRequest => Some(FundingConfirmed),
            FundingConfirmed if swap_enabled => Some(SwapOffer),
            FundingConfirmed => Some(Complete),
            SwapOffer => Some(Complete),
            Complete => None,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::KeystoreDownload => "keystore_download",
            Self::FundingRequest => "funding_request",
            Self::FundingConfirmed => "funding_confirmed",
            Self::SwapOffer => "swap_offer",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// A recorded step change.
#[derive(Debug, Clone, Serialize)]
pub struct StepTransition {
    pub from: Step,
    pub to: Step,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Current step plus the history of how it got there.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepState {
    pub step: Step,
    pub transitions: Vec<StepTransition>,
}

impl StepState {
    /// Move to `target` if the transition is valid from the current step.
    pub fn transition_to(&mut self, target: Step) -> Result<Step, String> {
        if !self.step.can_transition_to(target) {
            return Err(format!("Cannot transition from {} to {}", self.step, target));
        }
        self.transitions.push(StepTransition {
            from: self.step,
            to: target,
            timestamp: chrono::Utc::now(),
        });
        self.step = target;
        Ok(target)
    }

    /// Advance to the next step. Returns an error if already at terminal step.
    pub fn advance(&mut self, swap_enabled: bool) -> Result<Step, String> {
        let next = self
            .step
            .next(swap_enabled)
            .ok_or_else(|| "Already at terminal step".to_string())?;
        self.transition_to(next)
    }
}
