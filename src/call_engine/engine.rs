//! Call Engine - Zustandsautomat für genau eine Session
//!
//! Alle Übergänge laufen seriell über eine FIFO-Queue. Signaling-Operationen
//! (accept, reject, bye, dispose) werden abgesetzt und nie abgewartet; ihr
//! Fehlschlagen kommt als `EngineInput::OperationFailed` zurück.

use super::media::{AudioOutput, NotificationPermission, Notifier, RemoteStream, Ringer};
use super::session::{CallSession, CallState, TerminationCause};
use super::timer::{format_duration, TickTimer, TICK_PERIOD};
use crate::bus::{
    CallEvent, CallSnapshot, EngineHandle, EngineInput, OperatorIntent, SessionEvent, TimerKind,
};
use crate::devices::{BoundDevices, DeviceKind, DeviceRegistry, DEFAULT_DEVICE_ID};
use crate::i18n::{self, Dictionary};
use crate::signaling::{
    AcceptOptions, AudioConstraint, ClickToCallBridge, InboundSession, MediaTrack,
    SessionDelegate, SessionOperation, SessionState, SignalingError, BUSY_HERE_CODE,
    BUSY_HERE_REASON,
};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Gründe, aus denen ein Input verworfen wird
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallEngineError {
    #[error("No active call")]
    NoActiveCall,

    #[error("Already in a call")]
    AlreadyInCall,

    #[error("Session {0} is no longer current")]
    StaleSession(Uuid),

    #[error("Expected state {expected:?}, found {actual:?}")]
    InvalidState {
        expected: CallState,
        actual: CallState,
    },
}

// ============================================================================
// COLLABORATORS
// ============================================================================

/// Alles, was die CallEngine von außen benötigt
pub struct EngineParts {
    pub registry: Arc<DeviceRegistry>,
    /// Schreibseite der gebundenen Geräte (Leseseite hält die Registry)
    pub bound_devices: watch::Sender<BoundDevices>,
    pub audio_output: Arc<dyn AudioOutput>,
    pub ringer: Arc<dyn Ringer>,
    pub notifier: Arc<dyn Notifier>,
    pub click_to_call: Option<Arc<dyn ClickToCallBridge>>,
    pub dictionary: Arc<Dictionary>,
}

// ============================================================================
// CALL ENGINE
// ============================================================================

pub struct CallEngine {
    state: CallState,
    session: Option<CallSession>,
    do_not_disturb: bool,
    parts: EngineParts,
    input_tx: mpsc::UnboundedSender<EngineInput>,
    event_tx: broadcast::Sender<CallEvent>,
    snapshot_tx: watch::Sender<CallSnapshot>,
}

impl CallEngine {
    /// Erstellt eine neue CallEngine samt Eingangs-Queue
    pub fn new(parts: EngineParts) -> (Self, mpsc::UnboundedReceiver<EngineInput>) {
        let (input_tx, inbox) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(100);
        let (snapshot_tx, _) = watch::channel(CallSnapshot::idle());

        let engine = Self {
            state: CallState::Idle,
            session: None,
            do_not_disturb: false,
            parts,
            input_tx,
            event_tx,
            snapshot_tx,
        };
        (engine, inbox)
    }

    /// Gibt einen Zugang zur Eingangs-Queue zurück
    pub fn handle(&self) -> EngineHandle {
        EngineHandle::new(self.input_tx.clone())
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.event_tx.subscribe()
    }

    /// Sender für spätere Abonnenten, nachdem die Engine in ihren Task gewandert ist
    pub fn event_sender(&self) -> broadcast::Sender<CallEvent> {
        self.event_tx.clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Gibt den aktuellen Call-Status zurück
    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    pub fn is_do_not_disturb(&self) -> bool {
        self.do_not_disturb
    }

    /// Läuft noch ein Klingel- oder Gesprächszähler?
    pub fn has_active_timers(&self) -> bool {
        self.session.as_ref().is_some_and(CallSession::has_timers)
    }

    pub fn snapshot(&self) -> CallSnapshot {
        let mut snapshot = CallSnapshot::idle();
        snapshot.state = self.state;
        snapshot.do_not_disturb = self.do_not_disturb;

        if let Some(session) = &self.session {
            snapshot.session_id = Some(session.id);
            snapshot.direction = Some(session.direction);
            snapshot.caller_id = Some(session.display_name.clone());
            snapshot.muted = session.muted;
            snapshot.input_device = session.input_device.clone();
            snapshot.output_device = session.output_device.clone();
        }
        snapshot
    }

    /// Verarbeitet die Queue, bis der Task abgebrochen wird
    pub async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<EngineInput>) {
        tracing::info!("Call engine started");
        while let Some(input) = inbox.recv().await {
            self.process(input);
        }
    }

    /// Verarbeitet genau einen Input
    pub fn process(&mut self, input: EngineInput) {
        let result = match input {
            EngineInput::Invite(session) => self.on_invite(session),
            EngineInput::Session { session_id, event } => match event {
                SessionEvent::Cancel => self.on_remote_cancel(session_id),
                SessionEvent::Bye => self.on_remote_bye(session_id),
                SessionEvent::TrackReady(tracks) => self.on_track_ready(session_id, &tracks),
            },
            EngineInput::TransportFault { reason } => {
                self.on_transport_fault(reason);
                Ok(())
            }
            EngineInput::RegistrationFailed { reason } => {
                tracing::warn!("Registration failed: {}", reason);
                self.emit(CallEvent::Failure {
                    code: i18n::REGISTER_FAILED,
                    detail: reason,
                });
                Ok(())
            }
            EngineInput::Intent(intent) => self.on_intent(intent),
            EngineInput::ClickToCall { number } => self.on_click_to_call(number),
            EngineInput::Tick { session_id, timer } => self.on_tick(session_id, timer),
            EngineInput::NotificationPermission {
                session_id,
                granted,
            } => self.on_notification_permission(session_id, granted),
            EngineInput::OperationFailed {
                session_id,
                operation,
                error,
            } => {
                self.on_operation_failed(session_id, operation, error);
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::debug!("Input discarded: {}", e);
        }
    }

    // ========================================================================
    // INBOUND
    // ========================================================================

    fn on_invite(&mut self, handle: Arc<dyn InboundSession>) -> Result<(), CallEngineError> {
        let identity = handle.remote_identity();

        if self.session.is_some() {
            tracing::info!("Rejecting invite from {}: already in a call", identity.number);
            spawn_logged(
                SessionOperation::Reject,
                handle.reject(BUSY_HERE_CODE, BUSY_HERE_REASON),
            );
            return Err(CallEngineError::AlreadyInCall);
        }

        if self.do_not_disturb {
            tracing::info!("Rejecting invite from {}: do not disturb", identity.number);
            spawn_logged(
                SessionOperation::Reject,
                handle.reject(BUSY_HERE_CODE, BUSY_HERE_REASON),
            );
            return Ok(());
        }

        let mut session = CallSession::inbound(Arc::clone(&handle));
        let session_id = session.id;
        let caller_id = session.display_name.clone();

        tracing::info!("New incoming call from {} <{}>", caller_id, session.number);

        handle.set_delegate(Some(SessionDelegate::new(session_id, self.input_tx.clone())));
        self.parts.ringer.start_loop();
        session.ring_timer = Some(TickTimer::start(
            session_id,
            TimerKind::Ring,
            TICK_PERIOD,
            self.input_tx.clone(),
        ));

        self.session = Some(session);
        self.set_state(CallState::RingingInbound);

        self.notify_incoming(session_id, &caller_id);
        self.emit(CallEvent::IncomingCall {
            session_id,
            caller_id,
        });
        self.emit(CallEvent::RingTime(format_duration(Duration::ZERO)));
        Ok(())
    }

    fn notify_incoming(&self, session_id: Uuid, caller_id: &str) {
        match self.parts.notifier.permission() {
            NotificationPermission::Granted => self.show_incoming_notification(caller_id),
            NotificationPermission::Denied => {
                tracing::debug!("Notifications denied, skipping desktop notification");
            }
            NotificationPermission::Default => {
                let request = self.parts.notifier.request_permission();
                let tx = self.input_tx.clone();
                tokio::spawn(async move {
                    let granted = request.await == NotificationPermission::Granted;
                    let _ = tx.send(EngineInput::NotificationPermission {
                        session_id,
                        granted,
                    });
                });
            }
        }
    }

    fn on_notification_permission(
        &mut self,
        session_id: Uuid,
        granted: bool,
    ) -> Result<(), CallEngineError> {
        self.ensure(session_id, CallState::RingingInbound)?;
        if granted {
            let caller_id = self.current(session_id)?.display_name.clone();
            self.show_incoming_notification(&caller_id);
        }
        Ok(())
    }

    fn show_incoming_notification(&self, caller_id: &str) {
        let dictionary = &self.parts.dictionary;
        let body = format!(
            "{}{}",
            dictionary.code(i18n::INBOUND_CALL_DESCRIPTION),
            caller_id
        );
        self.parts
            .notifier
            .show(dictionary.code(i18n::INBOUND_CALL_LABEL), &body);
    }

    fn on_remote_cancel(&mut self, session_id: Uuid) -> Result<(), CallEngineError> {
        self.ensure(session_id, CallState::RingingInbound)?;
        tracing::info!("Invite {} canceled by remote", session_id);

        let dispose = self.current(session_id)?.handle.dispose();
        self.spawn_operation(session_id, SessionOperation::Dispose, dispose);
        self.teardown(TerminationCause::RemoteCancel, false);
        Ok(())
    }

    // ========================================================================
    // OPERATOR INTENTS
    // ========================================================================

    fn on_intent(&mut self, intent: OperatorIntent) -> Result<(), CallEngineError> {
        match intent {
            OperatorIntent::Answer { session_id } => self.answer(session_id),
            OperatorIntent::Decline { session_id } => self.decline(session_id),
            OperatorIntent::Hangup => self.hangup(),
            OperatorIntent::Mute => self.set_muted(true),
            OperatorIntent::UnMute => self.set_muted(false),
            OperatorIntent::ToggleDoNotDisturb => {
                self.do_not_disturb = !self.do_not_disturb;
                tracing::info!("Do not disturb: {}", self.do_not_disturb);
                self.publish_snapshot();
                self.emit(CallEvent::DoNotDisturbChanged(self.do_not_disturb));
                Ok(())
            }
        }
    }

    fn answer(&mut self, session_id: Uuid) -> Result<(), CallEngineError> {
        self.ensure(session_id, CallState::RingingInbound)?;
        self.parts.ringer.stop();

        let input = self.parts.registry.resolve(DeviceKind::Input);
        let output = self.parts.registry.resolve(DeviceKind::Output);
        let audio = if input == DEFAULT_DEVICE_ID {
            AudioConstraint::Default
        } else {
            AudioConstraint::Exact(input.clone())
        };

        let input_tx = self.input_tx.clone();
        let session = self.current(session_id)?;
        session.ring_timer = None;
        session.input_device = Some(input.clone());
        session.output_device = Some(output.clone());

        let accept = session.handle.accept(AcceptOptions {
            audio,
            video: false,
        });
        session.talk_timer = Some(TickTimer::start(
            session_id,
            TimerKind::Talk,
            TICK_PERIOD,
            input_tx,
        ));
        let direction = session.direction;
        let caller_id = session.display_name.clone();

        self.spawn_operation(session_id, SessionOperation::Accept, accept);
        self.parts.bound_devices.send_replace(BoundDevices {
            input: Some(input),
            output: Some(output),
        });

        tracing::info!("Call {} answered", session_id);
        self.emit(CallEvent::PromptDismissed { session_id });
        self.set_state(CallState::Active);
        self.emit(CallEvent::Answered {
            session_id,
            direction,
            caller_id,
        });
        self.emit(CallEvent::TalkTime(format_duration(Duration::ZERO)));
        Ok(())
    }

    fn decline(&mut self, session_id: Uuid) -> Result<(), CallEngineError> {
        self.ensure(session_id, CallState::RingingInbound)?;
        tracing::info!("Call {} declined", session_id);
        self.teardown(TerminationCause::LocalReject, true);
        Ok(())
    }

    fn hangup(&mut self) -> Result<(), CallEngineError> {
        match (self.state, self.session.as_ref().map(|s| s.id)) {
            (CallState::Active, Some(_)) => {
                self.teardown(TerminationCause::LocalHangup, true);
                Ok(())
            }
            (CallState::RingingInbound, Some(session_id)) => self.decline(session_id),
            _ => Err(CallEngineError::NoActiveCall),
        }
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), CallEngineError> {
        if self.state != CallState::Active {
            return Err(CallEngineError::InvalidState {
                expected: CallState::Active,
                actual: self.state,
            });
        }
        let session = self.session.as_mut().ok_or(CallEngineError::NoActiveCall)?;
        if session.muted == muted {
            return Ok(());
        }

        session.muted = muted;
        session.handle.set_local_audio_muted(muted);
        tracing::debug!("Call {} muted: {}", session.id, muted);

        self.publish_snapshot();
        self.emit(CallEvent::MuteChanged(muted));
        Ok(())
    }

    // ========================================================================
    // MEDIA
    // ========================================================================

    fn on_track_ready(
        &mut self,
        session_id: Uuid,
        tracks: &[MediaTrack],
    ) -> Result<(), CallEngineError> {
        self.ensure(session_id, CallState::Active)?;

        // Ausgabegerät gilt so, wie es beim Anhängen der Spur gewählt ist
        let output = self.parts.registry.resolve(DeviceKind::Output);

        let session = self.current(session_id)?;
        if session.media_bound {
            tracing::debug!("Remote media for {} already bound", session_id);
            return Ok(());
        }

        let stream = RemoteStream::from_tracks(tracks);
        if stream.is_empty() {
            tracing::warn!("Call {} delivered no audio tracks", session_id);
            return Ok(());
        }

        session.media_bound = true;
        session.output_device = Some(output.clone());
        let input = session.input_device.clone();

        self.parts.bound_devices.send_replace(BoundDevices {
            input,
            output: Some(output.clone()),
        });
        self.publish_snapshot();

        let audio = &self.parts.audio_output;
        audio.attach(stream);

        if audio.supports_sink_selection() {
            let route = audio.set_sink(&output);
            tokio::spawn(async move {
                match route.await {
                    Ok(()) => tracing::info!("Audio output routed to {}", output),
                    Err(e) => tracing::warn!("Error routing audio output: {}", e),
                }
            });
        } else {
            tracing::info!("Audio output routing not supported, using default sink");
        }

        audio.play();
        Ok(())
    }

    // ========================================================================
    // REMOTE / TRANSPORT
    // ========================================================================

    fn on_remote_bye(&mut self, session_id: Uuid) -> Result<(), CallEngineError> {
        self.current(session_id)?;
        tracing::info!("Call {} ended by remote", session_id);
        self.teardown(TerminationCause::RemoteBye, false);
        Ok(())
    }

    fn on_transport_fault(&mut self, reason: String) {
        tracing::error!("Signaling transport fault: {}", reason);
        if self.session.is_some() {
            self.teardown(TerminationCause::TransportFault, false);
        }
        self.emit(CallEvent::Failure {
            code: i18n::TRANSPORT_FAILED,
            detail: reason,
        });
    }

    fn on_operation_failed(
        &mut self,
        session_id: Uuid,
        operation: SessionOperation,
        error: SignalingError,
    ) {
        tracing::warn!("{:?} for call {} failed: {}", operation, session_id, error);

        if operation == SessionOperation::Accept
            && self.ensure(session_id, CallState::Active).is_ok()
        {
            self.teardown(TerminationCause::AcceptFailed, false);
            self.emit(CallEvent::Failure {
                code: i18n::ACCEPT_FAILED,
                detail: error.to_string(),
            });
        }
    }

    fn on_tick(&mut self, session_id: Uuid, timer: TimerKind) -> Result<(), CallEngineError> {
        let session = self.current(session_id)?;
        let display = match timer {
            TimerKind::Ring => session.ring_timer.as_ref().map(TickTimer::formatted),
            TimerKind::Talk => session.talk_timer.as_ref().map(TickTimer::formatted),
        }
        .ok_or(CallEngineError::StaleSession(session_id))?;

        match timer {
            TimerKind::Ring => self.emit(CallEvent::RingTime(display)),
            TimerKind::Talk => self.emit(CallEvent::TalkTime(display)),
        }
        Ok(())
    }

    // ========================================================================
    // CLICK TO CALL
    // ========================================================================

    fn on_click_to_call(&mut self, number: String) -> Result<(), CallEngineError> {
        if self.session.is_some() {
            tracing::warn!("Click-to-call to {} ignored: already in a call", number);
            return Err(CallEngineError::AlreadyInCall);
        }

        tracing::info!("Click-to-call requested: {}", number);

        if self.parts.notifier.permission() == NotificationPermission::Granted {
            self.parts
                .notifier
                .show(self.parts.dictionary.code(i18n::OUTBOUND_CALL_LABEL), &number);
        }

        if let Some(bridge) = &self.parts.click_to_call {
            let dial = bridge.dial(&number);
            let target = number.clone();
            tokio::spawn(async move {
                if let Err(e) = dial.await {
                    tracing::warn!("Click-to-call to {} failed: {:#}", target, e);
                }
            });
        }

        self.emit(CallEvent::OutboundRequested { number });
        Ok(())
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    /// Baut die aktuelle Session ab
    ///
    /// Der lokale Zustand wird sofort bereinigt; `send_signal` setzt bye
    /// bzw. reject ab, ohne auf das Ergebnis zu warten.
    fn teardown(&mut self, cause: TerminationCause, send_signal: bool) {
        let was_ringing = self.state == CallState::RingingInbound;

        let (session_id, signal) = {
            let Some(session) = self.session.as_mut() else {
                return;
            };
            session.terminal = true;
            session.clear_timers();
            session.handle.set_delegate(None);

            let signal = send_signal.then(|| termination_signal(session.handle.as_ref()));
            (session.id, signal)
        };

        if let Some((operation, request)) = signal {
            self.spawn_operation(session_id, operation, request);
        }

        if was_ringing {
            self.parts.ringer.stop();
            self.emit(CallEvent::PromptDismissed { session_id });
        }

        self.parts.bound_devices.send_replace(BoundDevices::default());

        tracing::info!("Call {} terminated: {:?}", session_id, cause);
        self.set_state(CallState::Terminated);
        self.emit(CallEvent::Ended { session_id, cause });

        self.session = None;
        self.set_state(CallState::Idle);
    }

    /// Prüft, ob `session_id` die aktuelle Session im erwarteten Zustand ist
    fn ensure(&self, session_id: Uuid, expected: CallState) -> Result<(), CallEngineError> {
        match &self.session {
            Some(session) if session.id == session_id && !session.terminal => {
                if self.state == expected {
                    Ok(())
                } else {
                    Err(CallEngineError::InvalidState {
                        expected,
                        actual: self.state,
                    })
                }
            }
            _ => Err(CallEngineError::StaleSession(session_id)),
        }
    }

    fn current(&mut self, session_id: Uuid) -> Result<&mut CallSession, CallEngineError> {
        self.session
            .as_mut()
            .filter(|s| s.id == session_id && !s.terminal)
            .ok_or(CallEngineError::StaleSession(session_id))
    }

    fn spawn_operation(
        &self,
        session_id: Uuid,
        operation: SessionOperation,
        request: BoxFuture<'static, Result<(), SignalingError>>,
    ) {
        let tx = self.input_tx.clone();
        tokio::spawn(async move {
            if let Err(error) = request.await {
                let _ = tx.send(EngineInput::OperationFailed {
                    session_id,
                    operation,
                    error,
                });
            }
        });
    }

    /// Aktualisiert den State und sendet Event
    fn set_state(&mut self, state: CallState) {
        self.state = state;
        if let Some(session) = self.session.as_mut() {
            session.state = state;
        }
        let snapshot = self.publish_snapshot();
        self.emit(CallEvent::StateChanged(snapshot));
    }

    fn publish_snapshot(&self) -> CallSnapshot {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_replace(snapshot.clone());
        snapshot
    }

    fn emit(&self, event: CallEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl std::fmt::Debug for CallEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallEngine")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("do_not_disturb", &self.do_not_disturb)
            .finish()
    }
}

/// bye für etablierte Sessions, sonst reject mit 486
fn termination_signal(
    handle: &dyn InboundSession,
) -> (SessionOperation, BoxFuture<'static, Result<(), SignalingError>>) {
    if handle.state() == SessionState::Established {
        (SessionOperation::Bye, handle.bye())
    } else {
        (
            SessionOperation::Reject,
            handle.reject(BUSY_HERE_CODE, BUSY_HERE_REASON),
        )
    }
}

/// Für Sessions, die nie zur aktuellen Session wurden
fn spawn_logged(
    operation: SessionOperation,
    request: BoxFuture<'static, Result<(), SignalingError>>,
) {
    tokio::spawn(async move {
        if let Err(e) = request.await {
            tracing::warn!("{:?} failed: {}", operation, e);
        }
    });
}

// ============================================================================
// TESTS
// ============================================================================
