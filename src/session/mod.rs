mod poller;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::PollingConfig;
use crate::disposition::submitter::{DispositionSink, ProxyError, SubmitReceipt};
use crate::disposition::DispositionRecord;
use crate::provider::control::ControlCommand;
use crate::provider::listen::{self, ListenTarget};
use crate::provider::{CallProvider, ProviderError};
use crate::validation::ValidationError;

use poller::StatusPoller;

/// `endedBy` when the agent hangs up from the console.
pub const ENDED_BY_AGENT: &str = "agent";
/// `endedBy` after a successful transfer.
pub const ENDED_BY_TRANSFER: &str = "transferred";
/// `endedBy` when the provider reports the end without a reason.
pub const ENDED_BY_CUSTOMER: &str = "customer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Idle,
    Initiating,
    ResolvingListenUrl,
    Active,
    Ending,
    Ended,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Initiating => "initiating",
            Self::ResolvingListenUrl => "resolving the listen URL",
            Self::Active => "active",
            Self::Ending => "ending",
            Self::Ended => "ended",
        })
    }
}

/// Identity and timing of the current (or just finished) call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDetails {
    pub call_id: String,
    pub phone_number: String,
    pub customer_name: String,
    pub listen_url: String,
    pub control_url: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_by: Option<String>,
    /// Whole seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub call: Option<CallDetails>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The call reached `Ended` and is ready for a disposition. Sent exactly
    /// once per call, whoever ended it.
    Ended(CallDetails),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    #[error("Cannot {action} while the session is {state}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },
    #[error("{0} is already in progress")]
    CommandInFlight(&'static str),
    #[error("Session was reset")]
    Cancelled,
}

/// Lifecycle position. Each variant owns the resources of its phase, so
/// leaving a phase (by any path) releases them: the cancel guards abort the
/// pending provider request and dropping `StatusPoller` stops its task.
enum Phase {
    Idle,
    Initiating {
        _cancel: DropGuard,
    },
    ResolvingListenUrl {
        _cancel: DropGuard,
    },
    Active {
        call: CallDetails,
        _poller: StatusPoller,
    },
    Ending {
        call: CallDetails,
    },
    Ended {
        call: CallDetails,
    },
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Idle => SessionState::Idle,
            Phase::Initiating { .. } => SessionState::Initiating,
            Phase::ResolvingListenUrl { .. } => SessionState::ResolvingListenUrl,
            Phase::Active { .. } => SessionState::Active,
            Phase::Ending { .. } => SessionState::Ending,
            Phase::Ended { .. } => SessionState::Ended,
        }
    }

    fn call(&self) -> Option<&CallDetails> {
        match self {
            Phase::Active { call, .. } | Phase::Ending { call } | Phase::Ended { call } => Some(call),
            _ => None,
        }
    }
}

struct Inner {
    phase: Phase,
    /// Bumped on every initiate and reset; async work started under an older
    /// generation must not touch the phase.
    generation: u64,
    in_flight: HashSet<&'static str>,
}

impl Inner {
    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidState {
            action,
            state: self.phase.state(),
        }
    }

    /// The end guard: `Active -> Ending` as a single check-and-set. Returns
    /// `None` if someone else already started ending the call. Stops the
    /// status poller.
    fn begin_ending(&mut self) -> Option<CallDetails> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Active { call, .. } => {
                self.phase = Phase::Ending { call: call.clone() };
                Some(call)
            }
            other => {
                self.phase = other;
                None
            }
        }
    }

    /// `Ending -> Ended`, stamping the end time, who ended it, and the
    /// duration (the provider's figure when known, wall clock otherwise).
    fn complete_ending(&mut self, ended_by: &str, duration: Option<u64>) -> Option<CallDetails> {
        let Phase::Ending { call } = &self.phase else {
            return None;
        };
        let mut call = call.clone();
        let now = Utc::now();
        let elapsed = (now - call.started_at).num_seconds().max(0) as u64;
        call.ended_at = Some(now);
        call.ended_by = Some(ended_by.to_string());
        call.duration = Some(duration.unwrap_or(elapsed));
        self.in_flight.clear();
        self.phase = Phase::Ended { call: call.clone() };
        Some(call)
    }
}

fn guarded() -> (CancellationToken, DropGuard) {
    let token = CancellationToken::new();
    (token.clone(), token.drop_guard())
}

/// The agent's single call session: placing a call, steering it, ending it,
/// and carrying the finished call into disposition capture.
#[derive(Clone)]
pub struct CallSession {
    provider: Arc<dyn CallProvider>,
    sink: Arc<dyn DispositionSink>,
    polling: PollingConfig,
    events: mpsc::Sender<SessionEvent>,
    inner: Arc<Mutex<Inner>>,
}

/// Handle held by the status poller so a forgotten session is not kept alive
/// by its own timer.
#[derive(Clone)]
pub(crate) struct WeakCallSession {
    provider: Arc<dyn CallProvider>,
    sink: Arc<dyn DispositionSink>,
    polling: PollingConfig,
    events: mpsc::Sender<SessionEvent>,
    inner: Weak<Mutex<Inner>>,
}

impl WeakCallSession {
    pub(crate) fn upgrade(&self) -> Option<CallSession> {
        Some(CallSession {
            provider: self.provider.clone(),
            sink: self.sink.clone(),
            polling: self.polling.clone(),
            events: self.events.clone(),
            inner: self.inner.upgrade()?,
        })
    }
}

impl CallSession {
    pub fn new(
        provider: Arc<dyn CallProvider>,
        sink: Arc<dyn DispositionSink>,
        polling: PollingConfig,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            provider,
            sink,
            polling,
            events,
            inner: Arc::new(Mutex::new(Inner {
                phase: Phase::Idle,
                generation: 0,
                in_flight: HashSet::new(),
            })),
        }
    }

    fn downgrade(&self) -> WeakCallSession {
        WeakCallSession {
            provider: self.provider.clone(),
            sink: self.sink.clone(),
            polling: self.polling.clone(),
            events: self.events.clone(),
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.phase.state()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        SessionSnapshot {
            state: inner.phase.state(),
            call: inner.phase.call().cloned(),
        }
    }

    /// The finished call awaiting a disposition, if any.
    pub async fn pending_disposition(&self) -> Option<CallDetails> {
        match &self.inner.lock().await.phase {
            Phase::Ended { call } => Some(call.clone()),
            _ => None,
        }
    }

    /// Place a call and wait until it can be monitored and controlled.
    ///
    /// `Idle -> Initiating -> ResolvingListenUrl -> Active`. Any failure on
    /// the way puts the session back to `Idle` with nothing created.
    pub async fn initiate(
        &self,
        phone_number: &str,
        customer_name: &str,
    ) -> Result<CallDetails, SessionError> {
        let phone_number = phone_number.trim();
        if phone_number.is_empty() {
            return Err(ValidationError::EmptyPhoneNumber.into());
        }
        let customer_name = customer_name.trim();

        let (generation, cancel) = {
            let mut inner = self.inner.lock().await;
            if !matches!(inner.phase, Phase::Idle) {
                return Err(inner.invalid("place a call"));
            }
            inner.generation += 1;
            let (cancel, guard) = guarded();
            inner.phase = Phase::Initiating { _cancel: guard };
            (inner.generation, cancel)
        };
        let started_at = Utc::now();

        tracing::info!(phone_number, "Initiating call");
        let initiated = tokio::select! {
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            result = self.provider.initiate_call(phone_number, customer_name) => result,
        };
        let initiated = match initiated {
            Ok(call) => call,
            Err(e) => {
                self.abort(generation, &e).await;
                return Err(e.into());
            }
        };
        let call_id = initiated.call_id;

        let cancel = {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                return Err(SessionError::Cancelled);
            }
            let (cancel, guard) = guarded();
            inner.phase = Phase::ResolvingListenUrl { _cancel: guard };
            cancel
        };

        let target = match initiated.listen_url.filter(|url| !url.is_empty()) {
            Some(url) => Ok(ListenTarget::from_listen_url(url, 0)),
            None => {
                tracing::info!(call_id = %call_id, "Waiting for listen URL");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                    result = listen::resolve_listen_url(self.provider.as_ref(), &call_id, &self.polling) => result,
                }
            }
        };
        let target = match target {
            Ok(target) => target,
            Err(e) => {
                self.abort(generation, &e).await;
                return Err(e.into());
            }
        };

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            return Err(SessionError::Cancelled);
        }
        let call = CallDetails {
            call_id,
            phone_number: phone_number.to_string(),
            customer_name: customer_name.to_string(),
            listen_url: target.listen_url,
            control_url: target.control_url,
            started_at,
            ended_at: None,
            ended_by: None,
            duration: None,
        };
        inner.phase = Phase::Active {
            call: call.clone(),
            _poller: self.start_poller(&call.call_id),
        };
        tracing::info!(call_id = %call.call_id, control_url = %call.control_url, "Call active");
        Ok(call)
    }

    /// Send an agent command to the live call.
    ///
    /// Returns the finished call when the command ended it (`end-call`, or a
    /// transfer that went through).
    pub async fn send_command(
        &self,
        command: ControlCommand,
    ) -> Result<Option<CallDetails>, SessionError> {
        command.validate()?;
        match command {
            ControlCommand::EndCall => self.end_call().await.map(Some),
            ControlCommand::Transfer { .. } => {
                self.dispatch(&command).await?;
                Ok(self.end_locally(ENDED_BY_TRANSFER).await)
            }
            _ => {
                self.dispatch(&command).await?;
                Ok(None)
            }
        }
    }

    /// Hang up from the console.
    ///
    /// Takes the end guard before the provider request goes out, so a
    /// poll-detected end arriving meanwhile is dropped. If the provider
    /// refuses, the call goes back to `Active` with a fresh status poller.
    pub async fn end_call(&self) -> Result<CallDetails, SessionError> {
        let (generation, call) = {
            let mut inner = self.inner.lock().await;
            match inner.begin_ending() {
                Some(call) => (inner.generation, call),
                None => return Err(inner.invalid("end the call")),
            }
        };

        tracing::info!(call_id = %call.call_id, "Ending call");
        if let Err(e) = self
            .provider
            .send_control(&call.control_url, &ControlCommand::EndCall)
            .await
        {
            tracing::warn!(call_id = %call.call_id, "End-call command failed, call stays active: {e}");
            self.resume_active(generation).await;
            return Err(e.into());
        }

        let ended = {
            let mut inner = self.inner.lock().await;
            if inner.generation != generation {
                return Err(SessionError::Cancelled);
            }
            inner.complete_ending(ENDED_BY_AGENT, None)
        };
        match ended {
            Some(call) => {
                self.announce_end(&call).await;
                Ok(call)
            }
            None => Err(SessionError::Cancelled),
        }
    }

    /// Record and forward the disposition for the ended call.
    ///
    /// Input is validated before anything is sent. On success the session is
    /// back to `Idle`; on a proxy failure it stays `Ended` so the agent can
    /// resubmit.
    pub async fn submit_disposition(
        &self,
        disposition: &str,
        notes: &str,
    ) -> Result<SubmitReceipt, SessionError> {
        let call = {
            let inner = self.inner.lock().await;
            match &inner.phase {
                Phase::Ended { call } => call.clone(),
                _ => return Err(inner.invalid("submit a disposition")),
            }
        };
        let record = DispositionRecord::new(call, disposition, notes)?;

        const KIND: &str = "submit-disposition";
        if !self.inner.lock().await.in_flight.insert(KIND) {
            return Err(SessionError::CommandInFlight(KIND));
        }
        let result = self.sink.submit(&record).await;

        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(KIND);
        let receipt = match result {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(call_id = %record.call.call_id, "Disposition not recorded: {e}");
                return Err(e.into());
            }
        };

        if matches!(&inner.phase, Phase::Ended { call } if call.call_id == record.call.call_id) {
            inner.phase = Phase::Idle;
        }
        tracing::info!(
            call_id = %record.call.call_id,
            disposition = %record.disposition,
            "Disposition recorded"
        );
        Ok(receipt)
    }

    /// Drop the ended call without recording a disposition.
    pub async fn cancel_disposition(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.phase, Phase::Ended { .. }) {
            return Err(inner.invalid("cancel the disposition"));
        }
        inner.phase = Phase::Idle;
        inner.in_flight.clear();
        tracing::info!("Disposition discarded");
        Ok(())
    }

    /// Abandon whatever is in progress and go back to `Idle`, stopping every
    /// pending request and timer.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        let previous = inner.phase.state();
        inner.generation += 1;
        inner.phase = Phase::Idle;
        inner.in_flight.clear();
        tracing::info!(%previous, "Session reset");
    }

    /// Called by the status poller when the provider reports the call ended.
    /// Ignored unless that call is still `Active` here.
    pub(crate) async fn end_externally(
        &self,
        call_id: &str,
        reason: Option<String>,
        duration: Option<f64>,
    ) -> Option<CallDetails> {
        let ended = {
            let mut inner = self.inner.lock().await;
            let live = matches!(&inner.phase, Phase::Active { call, .. } if call.call_id == call_id);
            if !live {
                tracing::debug!(call_id, state = %inner.phase.state(), "Dropping poll-detected end");
                return None;
            }
            inner.begin_ending()?;
            let ended_by = reason
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| ENDED_BY_CUSTOMER.to_string());
            inner.complete_ending(&ended_by, duration.map(|d| d.round().max(0.0) as u64))
        }?;

        tracing::info!(
            call_id,
            ended_by = ended.ended_by.as_deref().unwrap_or_default(),
            "Call ended by provider"
        );
        self.announce_end(&ended).await;
        Some(ended)
    }

    /// Send a non-ending command, one per kind at a time.
    async fn dispatch(&self, command: &ControlCommand) -> Result<(), SessionError> {
        let kind = command.kind();
        let (call_id, control_url) = {
            let mut inner = self.inner.lock().await;
            let Phase::Active { call, .. } = &inner.phase else {
                return Err(inner.invalid(kind));
            };
            let target = (call.call_id.clone(), call.control_url.clone());
            if !inner.in_flight.insert(kind) {
                return Err(SessionError::CommandInFlight(kind));
            }
            target
        };

        let result = self.provider.send_control(&control_url, command).await;
        self.inner.lock().await.in_flight.remove(kind);

        match result {
            Ok(()) => {
                tracing::info!(call_id = %call_id, kind, "Command sent");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(call_id = %call_id, kind, "Command failed: {e}");
                Err(e.into())
            }
        }
    }

    /// End without a provider round trip (the provider already hung up our
    /// side, e.g. after a transfer). A no-op if the call is already ending.
    async fn end_locally(&self, ended_by: &str) -> Option<CallDetails> {
        let ended = {
            let mut inner = self.inner.lock().await;
            inner.begin_ending()?;
            inner.complete_ending(ended_by, None)
        }?;
        tracing::info!(call_id = %ended.call_id, ended_by, "Call ended");
        self.announce_end(&ended).await;
        Some(ended)
    }

    async fn resume_active(&self, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            return;
        }
        if let Phase::Ending { call } = std::mem::replace(&mut inner.phase, Phase::Idle) {
            let poller = self.start_poller(&call.call_id);
            inner.phase = Phase::Active {
                call,
                _poller: poller,
            };
        }
    }

    async fn abort(&self, generation: u64, err: &ProviderError) {
        let mut inner = self.inner.lock().await;
        if inner.generation == generation {
            tracing::warn!(state = %inner.phase.state(), "Call setup failed: {err}");
            inner.phase = Phase::Idle;
        }
    }

    fn start_poller(&self, call_id: &str) -> StatusPoller {
        StatusPoller::start(
            self.downgrade(),
            call_id.to_string(),
            self.polling.status_interval(),
        )
    }

    async fn announce_end(&self, call: &CallDetails) {
        if self
            .events
            .send(SessionEvent::Ended(call.clone()))
            .await
            .is_err()
        {
            tracing::debug!(call_id = %call.call_id, "No listener for session events");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use tokio::time::sleep;

    use super::*;
    use crate::provider::{CallStatus, InitiatedCall};

    /// A finished call, for tests elsewhere in the crate.
    pub(crate) fn ended_call() -> CallDetails {
        let started_at = Utc::now() - chrono::Duration::seconds(90);
        CallDetails {
            call_id: "call-1".into(),
            phone_number: "+15550100".into(),
            customer_name: "Ann".into(),
            listen_url: "wss://calls.example/call-1/listen".into(),
            control_url: "https://calls.example/call-1/control".into(),
            started_at,
            ended_at: Some(Utc::now()),
            ended_by: Some("customer-ended-call".into()),
            duration: Some(90),
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        /// Lookup number from which the call is in progress; `None` never.
        ready_on: Option<u32>,
        fail_initiate: bool,
        initiates: AtomicU32,
        lookups: AtomicU32,
        ended: AtomicBool,
        fail_controls: AtomicBool,
        controls: std::sync::Mutex<Vec<ControlCommand>>,
        /// When set, control commands wait for a permit before answering.
        hold_controls: AtomicBool,
        release: Notify,
        control_started: Notify,
    }

    impl FakeProvider {
        fn ready_on(n: u32) -> Self {
            Self {
                ready_on: Some(n),
                ..Default::default()
            }
        }

        fn lookups(&self) -> u32 {
            self.lookups.load(Ordering::SeqCst)
        }

        fn sent(&self) -> Vec<ControlCommand> {
            self.controls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CallProvider for FakeProvider {
        async fn initiate_call(&self, _: &str, _: &str) -> Result<InitiatedCall, ProviderError> {
            self.initiates.fetch_add(1, Ordering::SeqCst);
            if self.fail_initiate {
                return Err(ProviderError::Api {
                    status: 400,
                    message: "Invalid phone number".into(),
                    details: serde_json::Value::Null,
                });
            }
            Ok(InitiatedCall {
                call_id: "call-1".into(),
                listen_url: None,
            })
        }

        async fn call_status(&self, _: &str) -> Result<CallStatus, ProviderError> {
            let n = self.lookups.fetch_add(1, Ordering::SeqCst) + 1;
            if self.ended.load(Ordering::SeqCst) {
                return Ok(CallStatus {
                    status: "ended".into(),
                    ended_reason: Some("customer-ended-call".into()),
                    duration: Some(42.4),
                    ..Default::default()
                });
            }
            let ready = self.ready_on.is_some_and(|r| n >= r);
            Ok(CallStatus {
                status: if ready { "in-progress" } else { "queued" }.into(),
                listen_url: ready.then(|| "wss://calls.example/call-1/listen".to_string()),
                ..Default::default()
            })
        }

        async fn send_control(&self, _: &str, command: &ControlCommand) -> Result<(), ProviderError> {
            self.controls.lock().unwrap().push(command.clone());
            self.control_started.notify_one();
            if self.hold_controls.load(Ordering::SeqCst) {
                self.release.notified().await;
            }
            if self.fail_controls.load(Ordering::SeqCst) {
                return Err(ProviderError::Request("connection reset".into()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeSink {
        submissions: AtomicU32,
        fail: AtomicBool,
    }

    #[async_trait]
    impl DispositionSink for FakeSink {
        async fn submit(&self, _: &DispositionRecord) -> Result<SubmitReceipt, ProxyError> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProxyError::Request("backend down".into()));
            }
            Ok(SubmitReceipt::default())
        }
    }

    struct Harness {
        session: CallSession,
        provider: Arc<FakeProvider>,
        sink: Arc<FakeSink>,
        events: mpsc::Receiver<SessionEvent>,
    }

    fn harness(provider: FakeProvider) -> Harness {
        harness_with(provider, PollingConfig::default())
    }

    fn harness_with(provider: FakeProvider, polling: PollingConfig) -> Harness {
        let provider = Arc::new(provider);
        let sink = Arc::new(FakeSink::default());
        let (tx, events) = mpsc::channel(8);
        let session = CallSession::new(provider.clone(), sink.clone(), polling, tx);
        Harness {
            session,
            provider,
            sink,
            events,
        }
    }

    async fn active_harness() -> Harness {
        let h = harness(FakeProvider::ready_on(1));
        h.session.initiate("+15550100", "Ann").await.unwrap();
        h
    }

    #[tokio::test(start_paused = true)]
    async fn becomes_active_after_fifth_lookup() {
        let h = harness(FakeProvider::ready_on(5));

        let call = h.session.initiate(" +15550100 ", "Ann").await.unwrap();

        assert_eq!(h.provider.lookups(), 5);
        assert_eq!(h.session.state().await, SessionState::Active);
        assert_eq!(call.phone_number, "+15550100");
        assert_eq!(call.control_url, "https://calls.example/call-1/control");
        assert!(call.ended_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_timeout_leaves_no_session() {
        let h = harness(FakeProvider::default());

        let err = h.session.initiate("+15550100", "").await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Provider(ProviderError::ResolutionTimeout { attempts: 30 })
        ));
        assert_eq!(h.provider.lookups(), 30);
        let snapshot = h.session.snapshot().await;
        assert_eq!(snapshot.state, SessionState::Idle);
        assert!(snapshot.call.is_none());
    }

    #[tokio::test]
    async fn empty_phone_number_never_reaches_provider() {
        let h = harness(FakeProvider::ready_on(1));

        let err = h.session.initiate("   ", "Ann").await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Validation(ValidationError::EmptyPhoneNumber)
        ));
        assert_eq!(h.provider.initiates.load(Ordering::SeqCst), 0);
        assert_eq!(h.session.state().await, SessionState::Idle);
    }

    #[tokio::test]
    async fn provider_rejection_returns_to_idle() {
        let h = harness(FakeProvider {
            fail_initiate: true,
            ..Default::default()
        });

        let err = h.session.initiate("+15550100", "Ann").await.unwrap_err();

        assert!(matches!(err, SessionError::Provider(ProviderError::Api { status: 400, .. })));
        assert_eq!(h.session.state().await, SessionState::Idle);
        assert_eq!(h.provider.lookups(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_initiate_rejected_while_active() {
        let h = active_harness().await;
        let err = h.session.initiate("+15550199", "Bob").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState {
                state: SessionState::Active,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_detected_end_produces_one_snapshot() {
        let mut h = active_harness().await;
        h.provider.ended.store(true, Ordering::SeqCst);

        let Some(SessionEvent::Ended(call)) = h.events.recv().await else {
            panic!("expected an end event");
        };

        assert_eq!(call.ended_by.as_deref(), Some("customer-ended-call"));
        assert_eq!(call.duration, Some(42));
        assert!(call.ended_at.is_some());
        assert_eq!(h.session.pending_disposition().await, Some(call));

        // The poller is gone: no further lookups or events.
        let lookups = h.provider.lookups();
        sleep(Duration::from_secs(30)).await;
        assert_eq!(h.provider.lookups(), lookups);
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn status_poll_runs_every_three_seconds() {
        let h = active_harness().await;
        let before = h.provider.lookups();

        sleep(Duration::from_millis(9_500)).await;

        assert_eq!(h.provider.lookups() - before, 3);
        assert_eq!(h.session.state().await, SessionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_intervals_still_poll_and_detect_end() {
        let mut h = harness_with(
            FakeProvider::ready_on(1),
            PollingConfig {
                resolve_interval_ms: 0,
                resolve_attempts: 0,
                status_interval_ms: 0,
            },
        );

        h.session.initiate("+15550100", "Ann").await.unwrap();
        assert_eq!(h.provider.lookups(), 1);

        h.provider.ended.store(true, Ordering::SeqCst);
        let event = tokio::time::timeout(Duration::from_secs(1), h.events.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(SessionEvent::Ended(_))));
        assert_eq!(h.session.state().await, SessionState::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_end_wins_over_racing_poll_end() {
        let mut h = active_harness().await;
        h.provider.hold_controls.store(true, Ordering::SeqCst);

        let session = h.session.clone();
        let ending = tokio::spawn(async move { session.end_call().await });
        h.provider.control_started.notified().await;

        // Provider reports the end while our end-call is still in flight.
        assert_eq!(h.session.state().await, SessionState::Ending);
        let dropped = h
            .session
            .end_externally("call-1", Some("customer-ended-call".into()), Some(12.0))
            .await;
        assert!(dropped.is_none());

        h.provider.release.notify_one();
        let call = ending.await.unwrap().unwrap();

        assert_eq!(call.ended_by.as_deref(), Some(ENDED_BY_AGENT));
        let Some(SessionEvent::Ended(event_call)) = h.events.recv().await else {
            panic!("expected an end event");
        };
        assert_eq!(event_call.ended_at, call.ended_at);
        assert!(h.events.try_recv().is_err());
        assert_eq!(h.provider.sent(), vec![ControlCommand::EndCall]);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_end_after_poll_end_is_dropped() {
        let mut h = active_harness().await;
        h.provider.ended.store(true, Ordering::SeqCst);
        let Some(SessionEvent::Ended(first)) = h.events.recv().await else {
            panic!("expected an end event");
        };

        let err = h.session.end_call().await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::InvalidState {
                state: SessionState::Ended,
                ..
            }
        ));
        assert!(h.provider.sent().is_empty());
        assert_eq!(h.session.pending_disposition().await, Some(first));
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_end_call_resumes_polling() {
        let mut h = active_harness().await;
        h.provider.fail_controls.store(true, Ordering::SeqCst);

        let err = h.session.end_call().await.unwrap_err();
        assert!(matches!(err, SessionError::Provider(ProviderError::Request(_))));
        assert_eq!(h.session.state().await, SessionState::Active);

        h.provider.ended.store(true, Ordering::SeqCst);
        let Some(SessionEvent::Ended(call)) = h.events.recv().await else {
            panic!("expected an end event");
        };
        assert_eq!(call.ended_by.as_deref(), Some("customer-ended-call"));
    }

    #[tokio::test]
    async fn commands_need_an_active_call() {
        let h = harness(FakeProvider::ready_on(1));

        let err = h
            .session
            .send_command(ControlCommand::say("hello"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::InvalidState {
                state: SessionState::Idle,
                ..
            }
        ));
        assert!(h.provider.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn same_kind_command_rejected_while_in_flight() {
        let h = active_harness().await;
        h.provider.hold_controls.store(true, Ordering::SeqCst);

        let session = h.session.clone();
        let first = tokio::spawn(async move {
            session
                .send_command(ControlCommand::transfer("+15550111", None))
                .await
        });
        h.provider.control_started.notified().await;

        let err = h
            .session
            .send_command(ControlCommand::transfer("+15550111", None))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::CommandInFlight("transfer")));

        h.provider.release.notify_one();
        let ended = first.await.unwrap().unwrap();
        assert_eq!(
            ended.and_then(|c| c.ended_by),
            Some(ENDED_BY_TRANSFER.to_string())
        );
        assert_eq!(h.provider.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn say_keeps_call_active() {
        let h = active_harness().await;

        let ended = h
            .session
            .send_command(ControlCommand::say("one moment please"))
            .await
            .unwrap();

        assert!(ended.is_none());
        assert_eq!(h.session.state().await, SessionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_disposition_sends_nothing() {
        let mut h = active_harness().await;
        h.session.end_call().await.unwrap();
        h.events.recv().await;

        let err = h.session.submit_disposition("", "notes").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Validation(ValidationError::MissingDisposition)
        ));
        let err = h.session.submit_disposition("SALE", "").await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(ValidationError::EmptyNotes)));

        assert_eq!(h.sink.submissions.load(Ordering::SeqCst), 0);
        assert_eq!(h.session.state().await, SessionState::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn proxy_failure_keeps_record_for_retry() {
        let mut h = active_harness().await;
        h.session.end_call().await.unwrap();
        h.events.recv().await;
        h.sink.fail.store(true, Ordering::SeqCst);

        let err = h
            .session
            .submit_disposition("SALE", "sold annual plan")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Proxy(_)));
        assert_eq!(h.session.state().await, SessionState::Ended);

        h.sink.fail.store(false, Ordering::SeqCst);
        h.session
            .submit_disposition("SALE", "sold annual plan")
            .await
            .unwrap();
        assert_eq!(h.session.state().await, SessionState::Idle);
        assert_eq!(h.sink.submissions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_disposition_returns_to_idle() {
        let mut h = active_harness().await;
        h.session.end_call().await.unwrap();
        h.events.recv().await;

        h.session.cancel_disposition().await.unwrap();

        assert_eq!(h.session.state().await, SessionState::Idle);
        assert!(h.session.pending_disposition().await.is_none());
        assert_eq!(h.sink.submissions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_during_resolution_stops_polling() {
        let h = harness(FakeProvider::default());
        let session = h.session.clone();
        let initiating = tokio::spawn(async move { session.initiate("+15550100", "Ann").await });

        sleep(Duration::from_secs(5)).await;
        assert_eq!(h.session.state().await, SessionState::ResolvingListenUrl);
        h.session.reset().await;

        assert!(matches!(
            initiating.await.unwrap(),
            Err(SessionError::Cancelled)
        ));
        let lookups = h.provider.lookups();
        sleep(Duration::from_secs(60)).await;
        assert_eq!(h.provider.lookups(), lookups);
        assert_eq!(h.session.state().await, SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_while_active_stops_status_poller() {
        let mut h = active_harness().await;

        h.session.reset().await;
        h.provider.ended.store(true, Ordering::SeqCst);
        let lookups = h.provider.lookups();
        sleep(Duration::from_secs(30)).await;

        assert_eq!(h.provider.lookups(), lookups);
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_session_stops_status_poller() {
        let h = active_harness().await;
        let provider = h.provider.clone();
        drop(h);

        let lookups = provider.lookups();
        sleep(Duration::from_secs(30)).await;
        assert!(provider.lookups() <= lookups + 1);
    }
}
