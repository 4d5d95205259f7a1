//! Signaling Module - Schnittstelle zur SIP-over-WebSocket Engine
//!
//! Dieses Modul beschreibt, was die externe Engine liefern muss:
//! - Eingehende Sessions mit Delegate-Rückkanal
//! - Transportstart und Registrierung
//! - Click-to-Call Brücke zum CRM
//!

mod session;
mod user_agent;

pub use session::{
    AcceptOptions, AudioConstraint, InboundSession, MediaTrack, RemoteIdentity, SessionDelegate,
    SessionOperation, SessionState, SignalingError, TrackKind, BUSY_HERE_CODE, BUSY_HERE_REASON,
};
pub use user_agent::{SignalingEngine, UserAgent};

use futures::future::BoxFuture;

/// Brücke zum ausgehenden Wählen im CRM
pub trait ClickToCallBridge: Send + Sync {
    fn dial(&self, number: &str) -> BoxFuture<'static, anyhow::Result<()>>;
}
