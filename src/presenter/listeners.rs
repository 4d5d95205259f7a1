//! Bindung von Benutzeraktionen an Handler
//!
//! Pro Intent ist höchstens ein Handler gebunden. Vor jedem Binden wird
//! ein bestehender Handler entfernt, wiederholtes Anhängen stapelt also
//! keine Handler.

use super::surface::CallSurfaceView;
use std::collections::HashMap;
use std::sync::Arc;

/// Benutzeraktion auf der Call-Oberfläche
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Mute,
    UnMute,
    Hangup,
    AudioInput,
    Speaker,
    DoNotDisturb,
}

impl Intent {
    pub fn name(self) -> &'static str {
        match self {
            Intent::Mute => "mute",
            Intent::UnMute => "unMute",
            Intent::Hangup => "hangup",
            Intent::AudioInput => "audioInput",
            Intent::Speaker => "speaker",
            Intent::DoNotDisturb => "doNotDisturb",
        }
    }
}

/// Handler erhält den gewählten Wert (bei Auswahllisten) oder `None`
pub type IntentHandler = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// Von der Oberfläche vergebene Kennung einer Bindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(pub u64);

/// Menge von Handlern, die gemeinsam angehängt werden
#[derive(Clone, Default)]
pub struct Listeners {
    entries: Vec<(Intent, IntentHandler)>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        mut self,
        intent: Intent,
        handler: impl Fn(Option<String>) + Send + Sync + 'static,
    ) -> Self {
        self.entries.push((intent, Arc::new(handler)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn intents(&self) -> impl Iterator<Item = Intent> + '_ {
        self.entries.iter().map(|(intent, _)| *intent)
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(intent, _)| intent.name()))
            .finish()
    }
}

/// Merkt sich die aktiven Bindungen pro Intent
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    bound: HashMap<Intent, BindingId>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bindet alle Handler, vorherige Bindungen desselben Intents werden ersetzt
    pub fn attach(&mut self, view: &dyn CallSurfaceView, listeners: Listeners) {
        for (intent, handler) in listeners.entries {
            if let Some(previous) = self.bound.remove(&intent) {
                view.unbind(intent, previous);
            }
            let binding = view.bind(intent, handler);
            self.bound.insert(intent, binding);
        }
    }

    pub fn detach(&mut self, view: &dyn CallSurfaceView, intent: Intent) {
        if let Some(binding) = self.bound.remove(&intent) {
            view.unbind(intent, binding);
        }
    }

    pub fn is_bound(&self, intent: Intent) -> bool {
        self.bound.contains_key(&intent)
    }
}
