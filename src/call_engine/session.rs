//! Call-Session Datenmodell

use super::timer::TickTimer;
use crate::signaling::InboundSession;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// CALL STATE
// ============================================================================

/// Aktueller Status des Telefons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    /// Kein Anruf
    Idle,
    /// Eingehender Anruf wartet auf Antwort
    RingingInbound,
    /// Anruf aktiv
    Active,
    /// Anruf wird abgebaut
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Grund für das Ende einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    LocalReject,
    LocalHangup,
    RemoteCancel,
    RemoteBye,
    TransportFault,
    AcceptFailed,
}

// ============================================================================
// CALL SESSION
// ============================================================================

/// Die eine Session, die die CallEngine zu jeder Zeit höchstens besitzt
pub struct CallSession {
    pub(crate) id: Uuid,
    pub(crate) direction: CallDirection,
    pub(crate) display_name: String,
    pub(crate) number: String,
    pub(crate) state: CallState,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) ring_timer: Option<TickTimer>,
    pub(crate) talk_timer: Option<TickTimer>,
    pub(crate) input_device: Option<String>,
    pub(crate) output_device: Option<String>,
    pub(crate) muted: bool,
    /// Ab hier wird jedes Ereignis zu dieser Session verworfen
    pub(crate) terminal: bool,
    pub(crate) media_bound: bool,
    pub(crate) handle: Arc<dyn InboundSession>,
}

impl CallSession {
    pub fn inbound(handle: Arc<dyn InboundSession>) -> Self {
        let identity = handle.remote_identity();

        Self {
            id: Uuid::new_v4(),
            direction: CallDirection::Inbound,
            display_name: identity.caller_id(),
            number: identity.number,
            state: CallState::RingingInbound,
            created_at: Utc::now(),
            ring_timer: None,
            talk_timer: None,
            input_device: None,
            output_device: None,
            muted: false,
            terminal: false,
            media_bound: false,
            handle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    /// Anzeigename bzw. Rufnummer
    pub fn caller_id(&self) -> &str {
        &self.display_name
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn has_timers(&self) -> bool {
        self.ring_timer.is_some() || self.talk_timer.is_some()
    }

    /// Bricht beide Zähler ab
    pub(crate) fn clear_timers(&mut self) {
        self.ring_timer = None;
        self.talk_timer = None;
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("caller_id", &self.display_name)
            .field("state", &self.state)
            .field("muted", &self.muted)
            .field("terminal", &self.terminal)
            .finish()
    }
}
