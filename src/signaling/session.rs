//! Session-Schnittstelle zur Signaling-Engine
//!
//! Die Engine selbst (SIP über WebSocket, SDP, ICE) ist extern. Hier steht
//! nur, was sie für eine eingehende Session bereitstellen muss.

use crate::bus::{EngineInput, SessionEvent};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// SIP Status für "Busy Here"
pub const BUSY_HERE_CODE: u16 = 486;
pub const BUSY_HERE_REASON: &str = "Busy Here";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOperation {
    Accept,
    Reject,
    Bye,
    Dispose,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("{operation:?} failed: {reason}")]
    OperationFailed {
        operation: SessionOperation,
        reason: String,
    },

    #[error("Registration rejected: {status_code} {reason}")]
    RegistrationRejected { status_code: u16, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SESSION TYPES
// ============================================================================

/// Identität der Gegenstelle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteIdentity {
    pub display_name: Option<String>,
    pub number: String,
}

impl RemoteIdentity {
    /// Anzeigename, ersatzweise die Rufnummer
    pub fn caller_id(&self) -> String {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.number.clone(),
        }
    }
}

/// Zustand der Session aus Sicht der Signaling-Engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initial,
    Establishing,
    Established,
    Terminating,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioConstraint {
    /// Systemstandard
    Default,
    /// Exakt dieses Gerät
    Exact(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptOptions {
    pub audio: AudioConstraint,
    pub video: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Ausgehandelter Empfangs-Track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
}

// ============================================================================
// SESSION DELEGATE
// ============================================================================

/// Rückkanal für die Signaling-Engine
///
/// Wird beim Anlegen der Session registriert und beim Abbau wieder
/// entfernt. Jeder Aufruf landet in der Eingangs-Queue der CallEngine.
#[derive(Debug, Clone)]
pub struct SessionDelegate {
    session_id: Uuid,
    tx: mpsc::UnboundedSender<EngineInput>,
}

impl SessionDelegate {
    pub(crate) fn new(session_id: Uuid, tx: mpsc::UnboundedSender<EngineInput>) -> Self {
        Self { session_id, tx }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Gegenstelle hat aufgelegt
    pub fn on_bye(&self) {
        self.deliver(SessionEvent::Bye);
    }

    /// Gegenstelle hat die Einladung zurückgezogen
    pub fn on_cancel(&self) {
        self.deliver(SessionEvent::Cancel);
    }

    /// Empfangs-Tracks sind bereit
    pub fn on_track_ready(&self, tracks: Vec<MediaTrack>) {
        self.deliver(SessionEvent::TrackReady(tracks));
    }

    fn deliver(&self, event: SessionEvent) {
        let input = EngineInput::Session {
            session_id: self.session_id,
            event,
        };
        if self.tx.send(input).is_err() {
            tracing::debug!("Call engine gone, session {} event dropped", self.session_id);
        }
    }
}

// ============================================================================
// INBOUND SESSION
// ============================================================================

/// Eingehende Session, wie sie die Signaling-Engine liefert
///
/// Alle Operationen können asynchron fehlschlagen.
pub trait InboundSession: Send + Sync {
    fn remote_identity(&self) -> RemoteIdentity;

    fn state(&self) -> SessionState;

    /// Registriert (`Some`) oder entfernt (`None`) den Delegate
    fn set_delegate(&self, delegate: Option<SessionDelegate>);

    fn accept(&self, options: AcceptOptions) -> BoxFuture<'static, Result<(), SignalingError>>;

    fn reject(
        &self,
        status_code: u16,
        reason_phrase: &str,
    ) -> BoxFuture<'static, Result<(), SignalingError>>;

    fn bye(&self) -> BoxFuture<'static, Result<(), SignalingError>>;

    fn dispose(&self) -> BoxFuture<'static, Result<(), SignalingError>>;

    /// Schaltet den lokalen Audio-Track stumm
    fn set_local_audio_muted(&self, muted: bool);
}
