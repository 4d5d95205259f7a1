//! Call-Oberfläche
//!
//! Der Presenter hält eine abgeleitete Projektion (`CallSurfaceState`) und
//! schreibt nur die geänderten Fragmente in die View. Er reagiert auf
//! `CallEvent`s und `DeviceEvent`s und schickt Benutzeraktionen als
//! `OperatorIntent` zurück an die CallEngine.

use super::listeners::{BindingId, Intent, IntentHandler, ListenerRegistry, Listeners};
use crate::bus::{CallEvent, EngineHandle, OperatorIntent};
use crate::call_engine::{format_duration, AudioOutput, CallDirection};
use crate::devices::{DeviceEvent, DeviceKind, DeviceOption, DeviceRegistry};
use crate::i18n::{self, Dictionary};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

/// Nur während eines Gesprächs gebunden
const CALL_INTENTS: [Intent; 3] = [Intent::Mute, Intent::UnMute, Intent::Hangup];

// ============================================================================
// VIEW CAPABILITY
// ============================================================================

/// Sichtbare Teile der Oberfläche
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfacePart {
    /// Das gesamte Call-Menü
    Surface,
    /// Mute/Hangup während eines Anrufs
    CallOptions,
    /// Geräteauswahl
    SettingsOptions,
    /// Einstellungs-Button vor einem Anruf
    SettingsButton,
}

/// Textfelder der Oberfläche
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceField {
    CallType,
    CallerId,
    TalkTime,
    RingTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptDecision {
    Accept,
    Reject,
}

/// Einmaliger Rückruf aus dem Incoming-Call Dialog
pub type PromptResponder = Box<dyn FnOnce(PromptDecision) + Send>;

/// Was die Host-Seite zum Rendern bereitstellen muss
pub trait CallSurfaceView: Send + Sync {
    fn set_visible(&self, part: SurfacePart, visible: bool);

    fn render_text(&self, field: SurfaceField, text: &str);

    fn render_options(&self, kind: DeviceKind, options: &[DeviceOption], selected: Option<&str>);

    fn render_muted(&self, muted: bool);

    fn render_do_not_disturb(&self, enabled: bool);

    fn bind(&self, intent: Intent, handler: IntentHandler) -> BindingId;

    fn unbind(&self, intent: Intent, binding: BindingId);

    fn show_incoming_prompt(&self, caller_id: &str, respond: PromptResponder);

    /// Schließt den Dialog ohne Entscheidung
    fn dismiss_incoming_prompt(&self);

    fn show_warning(&self, message: &str);
}

// ============================================================================
// SURFACE STATE
// ============================================================================

/// Abgeleitete Projektion, nie maßgeblich
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSurfaceState {
    pub call_type: Option<CallDirection>,
    pub caller_id: String,
    pub talk_time: String,
    pub input_options: Vec<DeviceOption>,
    pub output_options: Vec<DeviceOption>,
    pub muted: bool,
}

impl Default for CallSurfaceState {
    fn default() -> Self {
        Self {
            call_type: None,
            caller_id: String::new(),
            talk_time: format_duration(Duration::ZERO),
            input_options: Vec::new(),
            output_options: Vec::new(),
            muted: false,
        }
    }
}

/// Teil-Update; nur gesetzte Felder werden angewendet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallSurfaceUpdate {
    pub call_type: Option<CallDirection>,
    pub caller_id: Option<String>,
    pub talk_time: Option<String>,
    pub input_options: Option<Vec<DeviceOption>>,
    pub output_options: Option<Vec<DeviceOption>>,
    pub muted: Option<bool>,
}

// ============================================================================
// PRESENTER
// ============================================================================

pub struct CallSurfacePresenter {
    view: Arc<dyn CallSurfaceView>,
    registry: Arc<DeviceRegistry>,
    audio_output: Arc<dyn AudioOutput>,
    engine: EngineHandle,
    dictionary: Arc<Dictionary>,
    listeners: ListenerRegistry,
    state: CallSurfaceState,
    visible: bool,
    settings_options_visible: bool,
}

impl CallSurfacePresenter {
    pub fn new(
        view: Arc<dyn CallSurfaceView>,
        registry: Arc<DeviceRegistry>,
        audio_output: Arc<dyn AudioOutput>,
        engine: EngineHandle,
        dictionary: Arc<Dictionary>,
    ) -> Self {
        Self {
            view,
            registry,
            audio_output,
            engine,
            dictionary,
            listeners: ListenerRegistry::new(),
            state: CallSurfaceState::default(),
            visible: false,
            settings_options_visible: false,
        }
    }

    /// Grundzustand vor dem ersten Anruf
    pub fn start(&mut self) {
        self.hide();
        self.reset();
        self.update(CallSurfaceUpdate {
            input_options: Some(self.registry.options(DeviceKind::Input)),
            output_options: Some(self.registry.options(DeviceKind::Output)),
            ..Default::default()
        });

        let engine = self.engine.clone();
        let listeners = Listeners::new()
            .on(Intent::DoNotDisturb, move |_| {
                engine.intent(OperatorIntent::ToggleDoNotDisturb)
            });
        self.add_listeners(listeners);
        self.add_listeners(self.device_listeners(DeviceKind::Input));
        self.add_listeners(self.device_listeners(DeviceKind::Output));
    }

    pub fn state(&self) -> &CallSurfaceState {
        &self.state
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Zeigt das Call-Menü mit den Anruf-Optionen
    pub fn show(&mut self) {
        self.visible = true;
        self.settings_options_visible = false;
        self.view.set_visible(SurfacePart::Surface, true);
        self.view.set_visible(SurfacePart::CallOptions, true);
        self.view.set_visible(SurfacePart::SettingsOptions, false);
        self.view.set_visible(SurfacePart::SettingsButton, false);
    }

    /// Versteckt das Call-Menü und gibt die Einstellungen wieder frei
    pub fn hide(&mut self) {
        self.visible = false;
        self.settings_options_visible = true;
        self.view.set_visible(SurfacePart::Surface, false);
        self.view.set_visible(SurfacePart::CallOptions, false);
        self.view.set_visible(SurfacePart::SettingsOptions, true);
        self.view.set_visible(SurfacePart::SettingsButton, true);
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
        self.view.set_visible(SurfacePart::Surface, self.visible);
    }

    pub fn toggle_settings_options(&mut self) {
        self.settings_options_visible = !self.settings_options_visible;
        self.view
            .set_visible(SurfacePart::SettingsOptions, self.settings_options_visible);
    }

    pub fn update(&mut self, update: CallSurfaceUpdate) {
        if let Some(direction) = update.call_type {
            self.state.call_type = Some(direction);
            let label = match direction {
                CallDirection::Inbound => i18n::INBOUND_CALL_LABEL,
                CallDirection::Outbound => i18n::OUTBOUND_CALL_LABEL,
            };
            self.view
                .render_text(SurfaceField::CallType, self.dictionary.code(label));
        }

        if let Some(caller_id) = update.caller_id {
            self.view.render_text(SurfaceField::CallerId, &caller_id);
            self.state.caller_id = caller_id;
        }

        if let Some(talk_time) = update.talk_time {
            self.view.render_text(SurfaceField::TalkTime, &talk_time);
            self.state.talk_time = talk_time;
        }

        if let Some(options) = update.input_options {
            self.render_options(DeviceKind::Input, &options);
            self.state.input_options = options;
        }

        if let Some(options) = update.output_options {
            self.render_options(DeviceKind::Output, &options);
            self.state.output_options = options;
        }

        if let Some(muted) = update.muted {
            self.state.muted = muted;
            self.view.render_muted(muted);
        }
    }

    pub fn add_listeners(&mut self, listeners: Listeners) {
        self.listeners.attach(self.view.as_ref(), listeners);
    }

    /// Setzt Anrufer, Gesprächszeit und Anruftyp zurück
    ///
    /// Beliebig oft aufrufbar. Die Gerätelisten bleiben erhalten.
    pub fn reset(&mut self) {
        let baseline = CallSurfaceState::default();

        self.state.call_type = None;
        self.state.caller_id = baseline.caller_id;
        self.state.talk_time = baseline.talk_time;
        self.state.muted = false;

        self.view.render_text(SurfaceField::CallType, "");
        self.view.render_text(SurfaceField::CallerId, "");
        self.view
            .render_text(SurfaceField::TalkTime, &self.state.talk_time);
        self.view.render_muted(false);
        self.audio_output.clear();
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    pub fn apply_call_event(&mut self, event: &CallEvent) {
        match event {
            CallEvent::IncomingCall {
                session_id,
                caller_id,
            } => self.show_prompt(*session_id, caller_id),
            CallEvent::RingTime(time) => self.view.render_text(SurfaceField::RingTime, time),
            CallEvent::PromptDismissed { .. } => self.view.dismiss_incoming_prompt(),
            CallEvent::Answered {
                direction,
                caller_id,
                ..
            } => {
                self.update(CallSurfaceUpdate {
                    call_type: Some(*direction),
                    caller_id: Some(caller_id.clone()),
                    ..Default::default()
                });
                self.add_listeners(self.call_listeners());
                self.show();
            }
            CallEvent::TalkTime(time) => self.update(CallSurfaceUpdate {
                talk_time: Some(time.clone()),
                ..Default::default()
            }),
            CallEvent::MuteChanged(muted) => self.update(CallSurfaceUpdate {
                muted: Some(*muted),
                ..Default::default()
            }),
            CallEvent::Ended { session_id, cause } => {
                tracing::debug!("Clearing call surface for {} ({:?})", session_id, cause);
                for intent in CALL_INTENTS {
                    self.listeners.detach(self.view.as_ref(), intent);
                }
                self.hide();
                self.reset();
            }
            CallEvent::DoNotDisturbChanged(enabled) => self.view.render_do_not_disturb(*enabled),
            CallEvent::Failure { code, detail } => {
                tracing::debug!("Showing failure {}: {}", code, detail);
                self.view.show_warning(self.dictionary.code(code));
            }
            CallEvent::OutboundRequested { number } => {
                tracing::debug!("Outbound call to {} handed to the CRM", number);
            }
            CallEvent::StateChanged(_) => {}
        }
    }

    pub fn apply_device_event(&mut self, event: &DeviceEvent) {
        let DeviceEvent::OptionsChanged { kind, options } = event;

        let update = match kind {
            DeviceKind::Input => CallSurfaceUpdate {
                input_options: Some(options.clone()),
                ..Default::default()
            },
            DeviceKind::Output => CallSurfaceUpdate {
                output_options: Some(options.clone()),
                ..Default::default()
            },
        };
        self.update(update);
        self.add_listeners(self.device_listeners(*kind));
    }

    /// Verarbeitet Events, bis beide Quellen geschlossen sind
    pub async fn run(
        mut self,
        mut calls: broadcast::Receiver<CallEvent>,
        mut devices: broadcast::Receiver<DeviceEvent>,
    ) {
        let mut calls_open = true;
        let mut devices_open = true;

        while calls_open || devices_open {
            tokio::select! {
                event = calls.recv(), if calls_open => match event {
                    Ok(event) => self.apply_call_event(&event),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("Call surface skipped {} call events", n)
                    }
                    Err(RecvError::Closed) => calls_open = false,
                },
                event = devices.recv(), if devices_open => match event {
                    Ok(event) => self.apply_device_event(&event),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("Call surface skipped {} device events", n)
                    }
                    Err(RecvError::Closed) => devices_open = false,
                },
            }
        }
        tracing::debug!("Call surface presenter stopped");
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    fn show_prompt(&self, session_id: Uuid, caller_id: &str) {
        let engine = self.engine.clone();
        self.view.show_incoming_prompt(
            caller_id,
            Box::new(move |decision| {
                let intent = match decision {
                    PromptDecision::Accept => OperatorIntent::Answer { session_id },
                    PromptDecision::Reject => OperatorIntent::Decline { session_id },
                };
                engine.intent(intent);
            }),
        );
    }

    fn render_options(&self, kind: DeviceKind, options: &[DeviceOption]) {
        let selected = self.registry.selected_value(kind, options);
        self.view.render_options(kind, options, selected.as_deref());
    }

    fn call_listeners(&self) -> Listeners {
        let mute = self.engine.clone();
        let unmute = self.engine.clone();
        let hangup = self.engine.clone();

        Listeners::new()
            .on(Intent::Mute, move |_| mute.intent(OperatorIntent::Mute))
            .on(Intent::UnMute, move |_| unmute.intent(OperatorIntent::UnMute))
            .on(Intent::Hangup, move |_| hangup.intent(OperatorIntent::Hangup))
    }

    fn device_listeners(&self, kind: DeviceKind) -> Listeners {
        let registry = Arc::clone(&self.registry);
        let intent = match kind {
            DeviceKind::Input => Intent::AudioInput,
            DeviceKind::Output => Intent::Speaker,
        };

        Listeners::new().on(intent, move |value| {
            let Some(value) = value else {
                return;
            };
            let device_id = kind.device_id_from_value(&value);
            if let Err(e) = registry.select(kind, &device_id) {
                tracing::warn!("Failed to store {:?} selection: {}", kind, e);
            }
        })
    }
}

impl std::fmt::Debug for CallSurfacePresenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSurfacePresenter")
            .field("state", &self.state)
            .field("visible", &self.visible)
            .field("listeners", &self.listeners)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
