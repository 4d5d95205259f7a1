//! Call Engine Module - Zustandsautomat für Anrufe
//!
//! Dieses Modul verwaltet:
//! - Lebenszyklus der einen Call-Session
//! - Klingel- und Gesprächszähler
//! - Anbindung der Gegenstellen-Audio an die Wiedergabe
//! - Klingelton und Desktop-Benachrichtigungen

mod engine;
mod media;
mod session;
mod timer;

pub use engine::{CallEngine, CallEngineError, EngineParts};
pub use media::{AudioOutput, MediaError, NotificationPermission, Notifier, RemoteStream, Ringer};
pub use session::{CallDirection, CallSession, CallState, TerminationCause};
pub use timer::{format_duration, TickTimer, TICK_PERIOD};
