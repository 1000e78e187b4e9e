//! UI projection: derives the page's CSS state classes from a snapshot.
//!
//! Nothing here is stored; the front-end re-renders from [`project`] after
//! every event.

use serde::Serialize;

use super::coordinator::{ErrorNotice, OnboardingSnapshot};
use super::state::Step;
use super::task::TaskKind;

pub const CLASS_VISIBLE: &str = "is-visible";
pub const CLASS_ACTIVE: &str = "active";
pub const CLASS_HIDE_WHEN_DISABLED: &str = "hide-when-disabled";
pub const CLASS_DISABLED: &str = "disabled";
pub const CLASS_CLIPBOARD: &str = "clipboard";

/// Flags for one wizard step panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFlags {
    pub step: Step,
    pub visible: bool,
    pub active: bool,
    pub done: bool,
}

impl StepFlags {
    pub fn css_classes(&self) -> Vec<&'static str> {
        let mut classes = Vec::new();
        if self.visible {
            classes.push(CLASS_VISIBLE);
        }
        if self.active {
            classes.push(CLASS_ACTIVE);
        }
        classes
    }
}

/// Flags for an action button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFlags {
    pub enabled: bool,
    pub css_classes: Vec<&'static str>,
}

impl ActionFlags {
    fn new(enabled: bool) -> Self {
        let mut css_classes = vec![CLASS_HIDE_WHEN_DISABLED];
        if !enabled {
            css_classes.push(CLASS_DISABLED);
        }
        Self {
            enabled,
            css_classes,
        }
    }
}

/// Address shown next to the copy-to-clipboard button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipboardFlags {
    pub address: String,
    pub css_classes: Vec<&'static str>,
}

impl ClipboardFlags {
    fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            css_classes: vec![CLASS_CLIPBOARD],
        }
    }
}

/// Everything the page needs to render the wizard.
#[derive(Debug, Clone, Serialize)]
pub struct UiFlags {
    pub steps: Vec<StepFlags>,
    pub clipboard: Option<ClipboardFlags>,
    pub keystore_link: bool,
    pub funding_button: ActionFlags,
    pub swap_button: ActionFlags,
    pub decline_swap_button: ActionFlags,
    /// The "no-web3" panel: no faucet and no wallet, or a fatal error.
    pub no_web3: bool,
    /// Kind of the task currently being polled, for the spinner.
    pub pending: Option<TaskKind>,
    pub error: Option<ErrorNotice>,
    /// Fatal errors are not dismissable and disable every action.
    pub fatal: bool,
}

impl UiFlags {
    /// Persistent error state for a session that could not be initialized.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            steps: Vec::new(),
            clipboard: None,
            keystore_link: false,
            funding_button: ActionFlags::new(false),
            swap_button: ActionFlags::new(false),
            decline_swap_button: ActionFlags::new(false),
            no_web3: true,
            pending: None,
            error: Some(ErrorNotice {
                kind: "config".to_string(),
                message: message.into(),
            }),
            fatal: true,
        }
    }
}

/// Project a snapshot onto UI flags.
pub fn project(snapshot: &OnboardingSnapshot) -> UiFlags {
    let current = snapshot.step;
    let steps = [
        Step::KeystoreDownload,
        Step::FundingRequest,
        Step::FundingConfirmed,
        Step::SwapOffer,
        Step::Complete,
    ]
    .into_iter()
    .filter(|s| *s != Step::SwapOffer || snapshot.swap_available)
    .map(|step| StepFlags {
        step,
        visible: step <= current,
        active: step == current,
        done: step < current,
    })
    .collect();

    let pending = snapshot.pending_task().map(|t| t.kind);
    let can_fund_at_all = snapshot.faucet_available || snapshot.wallet_present;

    let funding_enabled = current == Step::FundingRequest
        && pending.is_none()
        && snapshot.all_acknowledged
        && can_fund_at_all;
    let swap_enabled = current == Step::SwapOffer && pending.is_none() && snapshot.all_acknowledged;

    UiFlags {
        steps,
        clipboard: Some(ClipboardFlags::new(&snapshot.address)),
        keystore_link: true,
        funding_button: ActionFlags::new(funding_enabled),
        swap_button: ActionFlags::new(swap_enabled),
        decline_swap_button: ActionFlags::new(current == Step::SwapOffer && pending.is_none()),
        no_web3: current == Step::FundingRequest && !can_fund_at_all,
        pending,
        error: snapshot.error.clone(),
        fatal: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::ack::AckItem;
    use crate::onboarding::task::BackgroundTask;

    fn snapshot(step: Step) -> OnboardingSnapshot {
        OnboardingSnapshot {
            address: "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".to_string(),
            network: "goerli".to_string(),
            chain_id: 5,
            configuration_file: "c.toml".to_string(),
            required_amount: "0.125 ETH".to_string(),
            faucet_available: true,
            wallet_present: false,
            swap_available: false,
            step,
            tasks: Vec::new(),
            acknowledgements: Vec::new(),
            all_acknowledged: true,
            error: None,
        }
    }

    #[test]
    fn current_step_is_active_and_previous_are_visible() {
        let flags = project(&snapshot(Step::FundingRequest));
        let keystore = &flags.steps[0];
        assert!(keystore.visible && keystore.done && !keystore.active);
        let funding = &flags.steps[1];
        assert_eq!(funding.css_classes(), vec![CLASS_VISIBLE, CLASS_ACTIVE]);
        let confirmed = &flags.steps[2];
        assert!(confirmed.css_classes().is_empty());
    }

    #[test]
    fn address_carries_clipboard_class() {
        let flags = project(&snapshot(Step::KeystoreDownload));
        let clipboard = flags.clipboard.unwrap();
        assert_eq!(clipboard.address, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert_eq!(clipboard.css_classes, vec![CLASS_CLIPBOARD]);
        assert!(UiFlags::fatal("broken").clipboard.is_none());
    }

    #[test]
    fn swap_step_hidden_without_swap() {
        let flags = project(&snapshot(Step::Complete));
        assert!(flags.steps.iter().all(|s| s.step != Step::SwapOffer));

        let mut snap = snapshot(Step::SwapOffer);
        snap.swap_available = true;
        let flags = project(&snap);
        assert!(flags.steps.iter().any(|s| s.step == Step::SwapOffer && s.active));
        assert!(flags.swap_button.enabled);
    }

    #[test]
    fn funding_button_disabled_while_pending() {
        let mut snap = snapshot(Step::FundingRequest);
        assert!(project(&snap).funding_button.enabled);

        snap.tasks.push(BackgroundTask::new(TaskKind::Funding));
        let flags = project(&snap);
        assert!(!flags.funding_button.enabled);
        assert!(flags.funding_button.css_classes.contains(&CLASS_DISABLED));
        assert!(flags.funding_button.css_classes.contains(&CLASS_HIDE_WHEN_DISABLED));
        assert_eq!(flags.pending, Some(TaskKind::Funding));
    }

    #[test]
    fn funding_button_gated_by_acknowledgements() {
        let mut snap = snapshot(Step::FundingRequest);
        snap.acknowledgements = vec![AckItem {
            name: "backup".to_string(),
            acknowledged: false,
        }];
        snap.all_acknowledged = false;
        assert!(!project(&snap).funding_button.enabled);
    }

    #[test]
    fn no_web3_without_faucet_or_wallet() {
        let mut snap = snapshot(Step::FundingRequest);
        snap.faucet_available = false;
        let flags = project(&snap);
        assert!(flags.no_web3);
        assert!(!flags.funding_button.enabled);

        snap.wallet_present = true;
        assert!(!project(&snap).no_web3);
    }

    #[test]
    fn fatal_flags_disable_everything() {
        let flags = UiFlags::fatal("bad address");
        assert!(flags.fatal && flags.no_web3);
        assert!(!flags.funding_button.enabled);
        assert_eq!(flags.error.unwrap().kind, "config");
    }
}
