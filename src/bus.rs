//! Event-Bus zwischen Signaling, CallEngine und Oberfläche
//!
//! Richtung ist fest: alles was die CallEngine verändert kommt als
//! `EngineInput` über eine einzige FIFO-Queue herein, alles was sie
//! mitteilt geht als `CallEvent` bzw. `CallSnapshot` hinaus.

use crate::call_engine::{CallDirection, CallState, TerminationCause};
use crate::signaling::{InboundSession, MediaTrack, SessionOperation, SignalingError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

// ============================================================================
// INPUTS
// ============================================================================

/// Ereignisse einer laufenden Session (vom Session-Delegate gemeldet)
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Bye,
    Cancel,
    TrackReady(Vec<MediaTrack>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Ring,
    Talk,
}

/// Absichten des Benutzers, die die CallEngine betreffen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorIntent {
    /// Annehmen im Incoming-Call Dialog
    Answer { session_id: Uuid },
    /// Ablehnen im Incoming-Call Dialog
    Decline { session_id: Uuid },
    Mute,
    UnMute,
    Hangup,
    ToggleDoNotDisturb,
}

/// Alles was einen Übergang der CallEngine auslösen kann
pub enum EngineInput {
    Invite(Arc<dyn InboundSession>),
    Session {
        session_id: Uuid,
        event: SessionEvent,
    },
    TransportFault {
        reason: String,
    },
    RegistrationFailed {
        reason: String,
    },
    Intent(OperatorIntent),
    ClickToCall {
        number: String,
    },
    Tick {
        session_id: Uuid,
        timer: TimerKind,
    },
    NotificationPermission {
        session_id: Uuid,
        granted: bool,
    },
    OperationFailed {
        session_id: Uuid,
        operation: SessionOperation,
        error: SignalingError,
    },
}

// ============================================================================
// OUTPUTS
// ============================================================================

/// Abgeleiteter Zustand für Host und Oberfläche
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    pub state: CallState,
    pub session_id: Option<Uuid>,
    pub direction: Option<CallDirection>,
    pub caller_id: Option<String>,
    pub muted: bool,
    pub do_not_disturb: bool,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

impl CallSnapshot {
    pub fn idle() -> Self {
        Self {
            state: CallState::Idle,
            session_id: None,
            direction: None,
            caller_id: None,
            muted: false,
            do_not_disturb: false,
            input_device: None,
            output_device: None,
        }
    }
}

/// Events die von der CallEngine ausgelöst werden
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    StateChanged(CallSnapshot),
    IncomingCall {
        session_id: Uuid,
        caller_id: String,
    },
    RingTime(String),
    /// Der Incoming-Call Dialog muss geschlossen werden
    PromptDismissed {
        session_id: Uuid,
    },
    Answered {
        session_id: Uuid,
        direction: CallDirection,
        caller_id: String,
    },
    TalkTime(String),
    MuteChanged(bool),
    Ended {
        session_id: Uuid,
        cause: TerminationCause,
    },
    DoNotDisturbChanged(bool),
    OutboundRequested {
        number: String,
    },
    /// Fehlermeldung für den Benutzer (`code` ist ein Label-Code)
    Failure {
        code: &'static str,
        detail: String,
    },
}

// ============================================================================
// ENGINE HANDLE
// ============================================================================

/// Klonbarer Zugang zur Eingangs-Queue der CallEngine
///
/// Wird an die Signaling-Engine, den Presenter und den Host verteilt.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineInput>,
}

impl EngineHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<EngineInput>) -> Self {
        Self { tx }
    }

    /// Meldet eine eingehende Einladung
    pub fn invite(&self, session: Arc<dyn InboundSession>) {
        self.send(EngineInput::Invite(session));
    }

    /// Meldet einen fatalen Transportfehler der Signaling-Engine
    pub fn transport_fault(&self, reason: impl Into<String>) {
        self.send(EngineInput::TransportFault {
            reason: reason.into(),
        });
    }

    pub fn registration_failed(&self, reason: impl Into<String>) {
        self.send(EngineInput::RegistrationFailed {
            reason: reason.into(),
        });
    }

    pub fn intent(&self, intent: OperatorIntent) {
        self.send(EngineInput::Intent(intent));
    }

    /// Click-to-Call aus dem CRM
    pub fn click_to_call(&self, number: impl Into<String>) {
        self.send(EngineInput::ClickToCall {
            number: number.into(),
        });
    }

    fn send(&self, input: EngineInput) {
        if self.tx.send(input).is_err() {
            tracing::warn!("Call engine is not running, input dropped");
        }
    }
}
