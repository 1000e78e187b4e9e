//! OnboardingCoordinator: owns the wizard step, the background tasks and the
//! acknowledgement checklist, and is the only thing allowed to mutate them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{
    FaucetService, OnboardingBackend, SwapRequest, TaskStatusReport, TransactionRequest,
    WalletProvider,
};
use crate::config::CoordinatorConfig;
use crate::error::{BackendError, Error, OnboardingError, Result, WalletError};
use crate::exchange::{self, SwapCosts};

use super::ack::{AckItem, AckPrompt};
use super::model::{OnboardingSession, SessionConstants};
use super::state::{Step, StepState};
use super::task::{BackgroundTask, PollOutcome, TaskKind, TaskStatus};

/// External collaborators of the coordinator.
#[derive(Clone)]
pub struct CoordinatorDeps {
    pub backend: Arc<dyn OnboardingBackend>,
    pub faucet: Option<Arc<dyn FaucetService>>,
    pub wallet: Option<Arc<dyn WalletProvider>>,
}

/// Something the UI should react to.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OnboardingEvent {
    StepChanged { from: Step, to: Step },
    TaskStarted { task: BackgroundTask },
    TaskUpdated { task: BackgroundTask },
    TaskResolved { task: BackgroundTask },
    /// A cancelled task was dropped without resolving.
    TaskDiscarded { task: BackgroundTask },
    Error { kind: String, message: String },
    ErrorDismissed,
    Reset,
}

/// Dismissable error message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorNotice {
    pub kind: String,
    pub message: String,
}

impl From<&OnboardingError> for ErrorNotice {
    fn from(err: &OnboardingError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Read-only view of the coordinator, used for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct OnboardingSnapshot {
    pub address: String,
    pub network: String,
    pub chain_id: u64,
    pub configuration_file: String,
    pub required_amount: String,
    pub faucet_available: bool,
    pub wallet_present: bool,
    pub swap_available: bool,
    pub step: Step,
    pub tasks: Vec<BackgroundTask>,
    pub acknowledgements: Vec<AckItem>,
    pub all_acknowledged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorNotice>,
}

impl OnboardingSnapshot {
    pub fn task(&self, kind: TaskKind) -> Option<&BackgroundTask> {
        self.tasks.iter().find(|t| t.kind == kind)
    }

    pub fn pending_task(&self) -> Option<&BackgroundTask> {
        self.tasks.iter().find(|t| t.is_pending())
    }
}

/// One task slot per kind.
struct TaskSlot {
    task: BackgroundTask,
    cancel: CancellationToken,
    handle: Option<JoinHandle<PollOutcome>>,
}

#[derive(Default)]
struct CoordinatorState {
    steps: StepState,
    tasks: HashMap<TaskKind, TaskSlot>,
    acks: AckPrompt,
    error: Option<ErrorNotice>,
}

/// Drives the account onboarding wizard.
///
/// Cheap to clone; clones share the same state. Poll loops run as spawned
/// tokio tasks holding a detached clone, so once the last caller-held clone
/// is dropped every poll loop is cancelled.
#[derive(Clone)]
pub struct OnboardingCoordinator {
    session: Arc<OnboardingSession>,
    config: CoordinatorConfig,
    deps: CoordinatorDeps,
    state: Arc<RwLock<CoordinatorState>>,
    events: broadcast::Sender<OnboardingEvent>,
    shutdown: CancellationToken,
    /// Cancels `shutdown` when the last owning clone goes away. `None` on
    /// detached clones.
    drop_guard: Option<Arc<DropGuard>>,
}

impl OnboardingCoordinator {
    /// Parse the embedded session constants and build a coordinator at
    /// `Step::KeystoreDownload`.
    pub fn initialize(
        constants: SessionConstants,
        deps: CoordinatorDeps,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        let session = constants.into_session()?;
        Ok(Self::new(session, deps, config))
    }

    pub fn new(
        session: OnboardingSession,
        deps: CoordinatorDeps,
        config: CoordinatorConfig,
    ) -> Self {
        let (events, _rx) = broadcast::channel(config.event_capacity.max(1));
        let state = CoordinatorState {
            acks: AckPrompt::new(session.acknowledgements.iter().cloned()),
            ..Default::default()
        };
        info!(
            address = %session.address,
            network = %session.network,
            faucet = session.faucet_available,
            "Onboarding session initialized"
        );
        let shutdown = CancellationToken::new();
        Self {
            session: Arc::new(session),
            config,
            deps,
            state: Arc::new(RwLock::new(state)),
            events,
            drop_guard: Some(Arc::new(shutdown.clone().drop_guard())),
            shutdown,
        }
    }

    /// A clone that does not keep the session alive. Used by poll loops.
    fn detached(&self) -> Self {
        Self {
            drop_guard: None,
            ..self.clone()
        }
    }

    pub fn session(&self) -> &OnboardingSession {
        &self.session
    }

    /// Subscribe to coordinator events.
    pub fn subscribe(&self) -> broadcast::Receiver<OnboardingEvent> {
        self.events.subscribe()
    }

    pub async fn current_step(&self) -> Step {
        self.state.read().await.steps.step
    }

    /// Whether the optional swap step is part of this session.
    pub fn swap_enabled(&self) -> bool {
        self.config.enable_swap && self.session.swap_available()
    }

    pub fn wallet_present(&self) -> bool {
        self.deps.wallet.is_some()
    }

    pub async fn snapshot(&self) -> OnboardingSnapshot {
        let state = self.state.read().await;
        let mut tasks: Vec<BackgroundTask> = state.tasks.values().map(|s| s.task.clone()).collect();
        tasks.sort_by_key(|t| t.created_at);
        OnboardingSnapshot {
            address: self.session.checksum_address(),
            network: self.session.network.to_string(),
            chain_id: self.session.chain_id,
            configuration_file: self.session.configuration_file.clone(),
            required_amount: self.session.required_amount.formatted(),
            faucet_available: self.session.faucet_available,
            wallet_present: self.wallet_present(),
            swap_available: self.swap_enabled(),
            step: state.steps.step,
            tasks,
            acknowledgements: state.acks.items().to_vec(),
            all_acknowledged: state.acks.all_acknowledged(),
            error: state.error.clone(),
        }
    }

    // ── Keystore ────────────────────────────────────────────────────────

    /// KeystoreDownload → FundingRequest. Later calls are no-ops.
    pub async fn on_keystore_downloaded(&self) -> Step {
        let mut state = self.state.write().await;
        if state.steps.step != Step::KeystoreDownload {
            debug!(step = %state.steps.step, "Keystore already downloaded, ignoring");
            return state.steps.step;
        }
        self.transition(&mut state, Step::FundingRequest);
        state.steps.step
    }

    /// Fetch the keystore, write it to `dest_dir/<address>.json` and advance.
    pub async fn download_keystore(&self, dest_dir: &Path) -> Result<PathBuf> {
        let bytes = self.deps.backend.keystore().await?;
        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(format!("{}.json", self.session.checksum_address()));
        tokio::fs::write(&path, &bytes).await?;
        info!(path = %path.display(), "Keystore saved");
        self.on_keystore_downloaded().await;
        Ok(path)
    }

    // ── Acknowledgements ────────────────────────────────────────────────

    pub async fn acknowledge(&self, item: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.acks.acknowledge(item) {
            return Err(OnboardingError::UnknownAcknowledgement(item.to_string()).into());
        }
        debug!(item, pending = state.acks.pending(), "Acknowledged");
        Ok(())
    }

    pub async fn all_acknowledged(&self) -> bool {
        self.state.read().await.acks.all_acknowledged()
    }

    /// Clear the error notice. Returns whether there was one.
    pub async fn dismiss_error(&self) -> bool {
        let mut state = self.state.write().await;
        let Some(notice) = state.error.take() else {
            return false;
        };
        debug!(kind = %notice.kind, "Error notice dismissed");
        self.emit(OnboardingEvent::ErrorDismissed);
        true
    }

    // ── Funding ─────────────────────────────────────────────────────────

    /// Ask the faucet, or the wallet provider when there is no faucet, for the
    /// required amount and start polling for the confirmed balance.
    pub async fn request_funding(&self) -> Result<BackgroundTask> {
        let faucet_available = self.session.faucet_available;
        let wallet_present = self.wallet_present();
        let task = self
            .reserve_task(TaskKind::Funding, Step::FundingRequest, "request_funding", || {
                if !faucet_available && !wallet_present {
                    return Err(OnboardingError::NoWallet);
                }
                Ok(())
            })
            .await?;

        let submission = self.submit_funding().await;
        self.start_task(task, submission).await
    }

    async fn submit_funding(&self) -> Result<String> {
        let session = &self.session;
        if session.faucet_available {
            let faucet = self
                .deps
                .faucet
                .as_ref()
                .ok_or_else(|| BackendError::NotConfigured("faucet".into()))?;
            return Ok(faucet.request_funds(session.address, session.network).await?);
        }

        let wallet = self.deps.wallet.as_ref().ok_or(OnboardingError::NoWallet)?;
        let chain_id = wallet.chain_id().await?;
        if chain_id != session.chain_id {
            return Err(WalletError::WrongChain {
                expected: session.chain_id,
                actual: chain_id,
            }
            .into());
        }
        let from = wallet.request_account().await?;
        let gas_price = self.deps.backend.gas_price().await?;
        let tx = TransactionRequest {
            from,
            to: session.address,
            value: session.required_amount.wei,
            gas_price,
        };
        info!(%from, to = %tx.to, value = %tx.value, "Submitting funding transaction");
        Ok(wallet.send_transaction(&tx).await?)
    }

    // ── Swap ────────────────────────────────────────────────────────────

    /// Quote the cost of buying `amount` of `token`.
    pub async fn quote_swap(&self, token: &str, amount: Decimal) -> Result<SwapCosts> {
        self.ensure_swap_enabled()?;
        let quote = self.deps.backend.swap_quote(token, amount).await?;
        Ok(exchange::calculate_costs(&quote, self.session.network)?)
    }

    /// Buy `amount` of `token`. Only valid in `Step::SwapOffer`.
    pub async fn request_swap(&self, token: &str, amount: Decimal) -> Result<BackgroundTask> {
        self.ensure_swap_enabled()?;
        let task = self
            .reserve_task(TaskKind::Swap, Step::SwapOffer, "request_swap", || Ok(()))
            .await?;

        let request = SwapRequest {
            account: self.session.address,
            token: token.to_string(),
            amount,
        };
        info!(token, %amount, "Submitting swap");
        let submission = self
            .deps
            .backend
            .submit_swap(&request)
            .await
            .map_err(Error::from);
        self.start_task(task, submission).await
    }

    /// Skip the optional swap: SwapOffer → Complete.
    pub async fn decline_swap(&self) -> Result<Step> {
        let mut state = self.state.write().await;
        if state.steps.step != Step::SwapOffer {
            return Err(OnboardingError::InvalidStep {
                action: "decline_swap".into(),
                step: state.steps.step,
            }
            .into());
        }
        if let Some(slot) = state.tasks.get(&TaskKind::Swap).filter(|s| s.task.is_pending()) {
            return Err(OnboardingError::TaskInProgress {
                kind: TaskKind::Swap.to_string(),
                id: slot.task.id,
            }
            .into());
        }
        self.transition(&mut state, Step::Complete);
        Ok(state.steps.step)
    }

    fn ensure_swap_enabled(&self) -> std::result::Result<(), OnboardingError> {
        if self.swap_enabled() {
            Ok(())
        } else {
            Err(OnboardingError::SwapUnavailable {
                network: self.session.network.to_string(),
            })
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Cancel every scheduled poll and return to the initial state.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        for slot in state.tasks.values() {
            slot.cancel.cancel();
        }
        state.tasks.clear();
        state.steps = StepState::default();
        state.acks.clear();
        state.error = None;
        info!("Onboarding session reset");
        self.emit(OnboardingEvent::Reset);
    }

    /// Cancel all polling for good; later task requests fail with
    /// `SessionClosed`. Dropping the last owning clone has the same effect.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the poll loop of the current `kind` task to finish.
    ///
    /// Returns `None` if no poll loop is running or another caller is already
    /// waiting on it.
    pub async fn wait_for(&self, kind: TaskKind) -> Option<PollOutcome> {
        let handle = {
            let mut state = self.state.write().await;
            state.tasks.get_mut(&kind)?.handle.take()?
        };
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(%kind, "Poll loop panicked: {e}");
                None
            }
        }
    }

    // ── Task plumbing ───────────────────────────────────────────────────

    /// Validate preconditions and claim the `kind` slot before any await, so
    /// two concurrent requests cannot both start a task.
    async fn reserve_task<F>(
        &self,
        kind: TaskKind,
        required_step: Step,
        action: &str,
        precheck: F,
    ) -> Result<BackgroundTask>
    where
        F: FnOnce() -> std::result::Result<(), OnboardingError>,
    {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let result = (|| {
            if self.shutdown.is_cancelled() {
                return Err(OnboardingError::SessionClosed);
            }
            if state.steps.step != required_step {
                return Err(OnboardingError::InvalidStep {
                    action: action.to_string(),
                    step: state.steps.step,
                });
            }
            if let Some(slot) = state.tasks.get(&kind).filter(|s| s.task.is_pending()) {
                return Err(OnboardingError::TaskInProgress {
                    kind: kind.to_string(),
                    id: slot.task.id,
                });
            }
            if !state.acks.all_acknowledged() {
                return Err(OnboardingError::AcknowledgementsPending {
                    pending: state.acks.pending(),
                });
            }
            precheck()
        })();

        if let Err(err) = result {
            warn!(%kind, action, "Rejected: {err}");
            // Duplicate requests leave the state untouched.
            if !matches!(err, OnboardingError::TaskInProgress { .. }) {
                state.error = Some(ErrorNotice::from(&err));
                self.emit_error(&err);
            }
            return Err(err.into());
        }

        let task = BackgroundTask::new(kind);
        if let Some(previous) = state.tasks.insert(
            kind,
            TaskSlot {
                task: task.clone(),
                cancel: self.shutdown.child_token(),
                handle: None,
            },
        ) {
            previous.cancel.cancel();
        }
        state.error = None;
        Ok(task)
    }

    /// Record the submission result and, on success, spawn the poll loop.
    async fn start_task(
        &self,
        task: BackgroundTask,
        submission: Result<String>,
    ) -> Result<BackgroundTask> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let Some(slot) = state.tasks.get_mut(&task.kind).filter(|s| s.task.id == task.id) else {
            warn!(task_id = %task.id, "Task discarded while submitting");
            return Err(failure_error(task.kind, "session was reset".to_string()).into());
        };

        let reference = match submission {
            Ok(reference) => reference,
            Err(e) => {
                let reason = e.to_string();
                slot.task.status = TaskStatus::Failed;
                slot.task.failure = Some(reason.clone());
                let failed = slot.task.clone();
                let err = failure_error(task.kind, reason);
                warn!(task_id = %task.id, kind = %task.kind, "Submission failed: {err}");
                state.error = Some(ErrorNotice::from(&err));
                self.emit(OnboardingEvent::TaskResolved { task: failed });
                self.emit_error(&err);
                return Err(err.into());
            }
        };

        slot.task.reference = Some(reference.clone());
        let started = slot.task.clone();
        let cancel = slot.cancel.clone();

        let this = self.detached();
        let (kind, task_id) = (started.kind, started.id);
        slot.handle = Some(tokio::spawn(async move {
            this.poll_task(kind, task_id, cancel).await
        }));

        info!(task_id = %task_id, %kind, reference = %reference, "Background task started");
        self.emit(OnboardingEvent::TaskStarted {
            task: started.clone(),
        });
        Ok(started)
    }

    /// Poll the backend until the task resolves, fails or is cancelled.
    ///
    /// Each query is issued only after the previous one returned. Transient
    /// backend errors back off exponentially and fail the task after
    /// `max_transient_failures` in a row.
    pub async fn poll_task(
        &self,
        kind: TaskKind,
        task_id: Uuid,
        cancel: CancellationToken,
    ) -> PollOutcome {
        let mut delay = self.config.poll_interval;
        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(%task_id, "Polling cancelled");
                    self.discard(kind, task_id).await;
                    return PollOutcome::Cancelled;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let Some(task) = self.record_poll(kind, task_id).await else {
                debug!(%task_id, "Task superseded, stopping poll");
                return PollOutcome::Cancelled;
            };

            let result = self.query_status(&task).await;
            if cancel.is_cancelled() {
                self.discard(kind, task_id).await;
                return PollOutcome::Cancelled;
            }

            match result {
                Ok(report) => {
                    failures = 0;
                    delay = self.config.poll_interval;
                    match report.status {
                        TaskStatus::Pending => {
                            debug!(%task_id, attempts = task.attempts, "Task still pending");
                        }
                        TaskStatus::Succeeded => {
                            self.resolve(kind, task_id, TaskStatus::Succeeded, None).await;
                            return PollOutcome::Succeeded;
                        }
                        TaskStatus::Failed => {
                            let reason = report
                                .reason
                                .unwrap_or_else(|| format!("{kind} task failed"));
                            self.resolve(kind, task_id, TaskStatus::Failed, Some(reason.clone()))
                                .await;
                            return PollOutcome::Failed(reason);
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    if failures >= self.config.max_transient_failures {
                        let reason = format!("status unavailable after {failures} attempts: {e}");
                        self.resolve(kind, task_id, TaskStatus::Failed, Some(reason.clone()))
                            .await;
                        return PollOutcome::Failed(reason);
                    }
                    delay = self.backoff(failures);
                    warn!(%task_id, failures, retry_in = ?delay, "Transient polling error: {e}");
                }
            }
        }
    }

    fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        let base = self.config.backoff_base.saturating_mul(1u32 << exp);
        let capped = base.min(self.config.max_backoff);
        let jitter_ms = (capped.as_millis() as u64) / 10;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        capped + Duration::from_millis(jitter)
    }

    async fn query_status(
        &self,
        task: &BackgroundTask,
    ) -> std::result::Result<TaskStatusReport, BackendError> {
        match task.kind {
            TaskKind::Funding => {
                let detail = self.deps.backend.configuration_detail().await?;
                Ok(detail.funding_status(self.session.required_amount.wei))
            }
            TaskKind::Swap => {
                let reference = task.reference.as_deref().unwrap_or_default();
                self.deps.backend.swap_status(reference).await
            }
        }
    }

    /// Count a poll attempt. Returns `None` when `task_id` is no longer the
    /// pending task of its kind.
    async fn record_poll(&self, kind: TaskKind, task_id: Uuid) -> Option<BackgroundTask> {
        let mut state = self.state.write().await;
        let slot = state
            .tasks
            .get_mut(&kind)
            .filter(|s| s.task.id == task_id && s.task.is_pending())?;
        slot.task.record_poll();
        let task = slot.task.clone();
        self.emit(OnboardingEvent::TaskUpdated { task: task.clone() });
        Some(task)
    }

    /// Drop the slot of a cancelled task unless it was replaced meanwhile.
    async fn discard(&self, kind: TaskKind, task_id: Uuid) {
        let mut state = self.state.write().await;
        if !state.tasks.get(&kind).is_some_and(|s| s.task.id == task_id) {
            return;
        }
        if let Some(slot) = state.tasks.remove(&kind) {
            debug!(%task_id, %kind, "Cancelled task discarded");
            self.emit(OnboardingEvent::TaskDiscarded { task: slot.task });
        }
    }

    /// Apply a task resolution. Stale resolutions are ignored.
    async fn resolve(
        &self,
        kind: TaskKind,
        task_id: Uuid,
        status: TaskStatus,
        reason: Option<String>,
    ) {
        let mut state = self.state.write().await;
        let Some(slot) = state
            .tasks
            .get_mut(&kind)
            .filter(|s| s.task.id == task_id && s.task.is_pending())
        else {
            debug!(%task_id, "Ignoring stale task resolution");
            return;
        };

        slot.task.status = status;
        slot.task.failure = reason.clone();
        let resolved = slot.task.clone();
        info!(%task_id, %kind, %status, attempts = resolved.attempts, "Background task resolved");
        self.emit(OnboardingEvent::TaskResolved { task: resolved });

        match status {
            TaskStatus::Succeeded => {
                let (from, to) = match kind {
                    TaskKind::Funding => (Step::FundingRequest, Step::FundingConfirmed),
                    TaskKind::Swap => (Step::SwapOffer, Step::Complete),
                };
                if state.steps.step != from {
                    warn!(
                        step = %state.steps.step,
                        %kind,
                        "Task succeeded outside its step, ignoring"
                    );
                    return;
                }
                self.transition(&mut state, to);
                if to == Step::FundingConfirmed {
                    let next = if self.swap_enabled() {
                        Step::SwapOffer
                    } else {
                        Step::Complete
                    };
                    self.transition(&mut state, next);
                }
            }
            TaskStatus::Failed => {
                let err = failure_error(kind, reason.unwrap_or_default());
                state.error = Some(ErrorNotice::from(&err));
                self.emit_error(&err);
            }
            TaskStatus::Pending => {}
        }
    }

    fn transition(&self, state: &mut CoordinatorState, to: Step) {
        let from = state.steps.step;
        match state.steps.transition_to(to) {
            Ok(_) => {
                info!(%from, %to, "Onboarding step changed");
                self.emit(OnboardingEvent::StepChanged { from, to });
            }
            Err(e) => warn!("Failed to change onboarding step: {e}"),
        }
    }

    fn emit(&self, event: OnboardingEvent) {
        // Ok if nobody is listening.
        let _ = self.events.send(event);
    }

    fn emit_error(&self, err: &OnboardingError) {
        self.emit(OnboardingEvent::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        });
    }
}

fn failure_error(kind: TaskKind, reason: String) -> OnboardingError {
    match kind {
        TaskKind::Funding => OnboardingError::FundingFailed { reason },
        TaskKind::Swap => OnboardingError::SwapFailed { reason },
    }
}
