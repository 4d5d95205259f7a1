//! Presenter Module - Call-Oberfläche
//!
//! Dieses Modul verwaltet:
//! - Sichtbarkeit und Inhalt des Call-Menüs
//! - Incoming-Call Dialog und Warnungen
//! - Idempotente Bindung der Benutzeraktionen

mod listeners;
mod surface;

pub use listeners::{BindingId, Intent, IntentHandler, ListenerRegistry, Listeners};
pub use surface::{
    CallSurfacePresenter, CallSurfaceState, CallSurfaceUpdate, CallSurfaceView, PromptDecision,
    PromptResponder, SurfaceField, SurfacePart,
};
