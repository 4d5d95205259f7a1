//! Device Registry & Preference Manager
//!
//! Hält die zuletzt enumerierten Audio-Geräte, vergleicht jede neue
//! Enumeration mit dem Cache und benachrichtigt Abonnenten nur bei
//! Änderungen. Die Geräte-Präferenz des Benutzers wird im Host-Store
//! persistiert und gegen die aktuelle Enumeration aufgelöst.

use crate::storage::{KeyValueStore, StorageError};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Sentinel für "Systemstandard"
pub const DEFAULT_DEVICE_ID: &str = "default";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    #[error("Audio permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device enumeration failed: {0}")]
    Enumeration(String),

    #[error("Failed to persist device preference: {0}")]
    Storage(String),
}

impl From<StorageError> for DeviceError {
    fn from(e: StorageError) -> Self {
        DeviceError::Storage(e.to_string())
    }
}

// ============================================================================
// DEVICE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Input,
    Output,
}

impl DeviceKind {
    fn preference_key(self) -> &'static str {
        match self {
            DeviceKind::Input => "active-audio-input",
            DeviceKind::Output => "active-speaker",
        }
    }

    fn option_prefix(self) -> &'static str {
        match self {
            DeviceKind::Input => "input-",
            DeviceKind::Output => "output-",
        }
    }

    fn placeholder_label(self) -> &'static str {
        match self {
            DeviceKind::Input => "Microphone",
            DeviceKind::Output => "Speaker",
        }
    }

    /// Wert eines Eintrags in der Auswahlliste (`input-<id>` / `output-<id>`)
    pub fn option_value(self, device_id: &str) -> String {
        format!("{}{}", self.option_prefix(), device_id)
    }

    /// Umkehrung von `option_value`; rohe IDs werden unverändert durchgereicht
    pub fn device_id_from_value(self, value: &str) -> String {
        value
            .strip_prefix(self.option_prefix())
            .unwrap_or(value)
            .to_string()
    }
}

/// Ein enumeriertes Gerät. Wird nie verändert, nur komplett ersetzt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub kind: DeviceKind,
    pub label: String,
    pub raw_hardware_id: String,
}

/// Eintrag in einer Geräte-Auswahlliste
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOption {
    pub value: String,
    pub text: String,
    pub disabled: bool,
}

/// Geräte, die gerade an einen aktiven Anruf gebunden sind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundDevices {
    pub input: Option<String>,
    pub output: Option<String>,
}

impl BoundDevices {
    fn get(&self, kind: DeviceKind) -> Option<&str> {
        match kind {
            DeviceKind::Input => self.input.as_deref(),
            DeviceKind::Output => self.output.as_deref(),
        }
    }
}

/// Events die von der DeviceRegistry ausgelöst werden
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Die Geräteliste einer Art hat sich geändert (vollständige neue Liste)
    OptionsChanged {
        kind: DeviceKind,
        options: Vec<DeviceOption>,
    },
}

// ============================================================================
// MEDIA DEVICES CAPABILITY
// ============================================================================

/// Plattform-Zugriff auf Audio-Geräte
pub trait MediaDevices: Send + Sync {
    /// Fordert Mikrofon-Zugriff an
    fn request_permission(&self) -> BoxFuture<'static, Result<(), DeviceError>>;

    /// Listet alle Ein- und Ausgabegeräte auf
    fn enumerate(&self) -> BoxFuture<'static, Result<Vec<DeviceDescriptor>, DeviceError>>;
}

/// Kürzt Labels für die kompakte Anzeige
///
/// `"USB Headset (0b0e:245d)"` wird zu `"USB Headset"`, leere Labels
/// werden durch einen generischen Platzhalter ersetzt.
pub fn normalize_label(label: &str, kind: DeviceKind) -> String {
    if label.trim().is_empty() {
        return kind.placeholder_label().to_string();
    }

    match label.find('(') {
        Some(idx) if idx > 0 => label[..idx].trim_end().to_string(),
        _ => label.to_string(),
    }
}

// ============================================================================
// DEVICE REGISTRY
// ============================================================================

pub struct DeviceRegistry {
    media: Arc<dyn MediaDevices>,
    store: Arc<dyn KeyValueStore>,
    inputs: Mutex<Vec<DeviceDescriptor>>,
    outputs: Mutex<Vec<DeviceDescriptor>>,
    bound: watch::Receiver<BoundDevices>,
    event_tx: broadcast::Sender<DeviceEvent>,
}

impl DeviceRegistry {
    /// Erstellt eine neue Registry
    ///
    /// `bound` wird von der CallEngine geschrieben und markiert Geräte,
    /// die gerade im Anruf verwendet werden.
    pub fn new(
        media: Arc<dyn MediaDevices>,
        store: Arc<dyn KeyValueStore>,
        bound: watch::Receiver<BoundDevices>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(32);

        Self {
            media,
            store,
            inputs: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
            bound,
            event_tx,
        }
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_tx.subscribe()
    }

    /// Fordert den Mikrofon-Zugriff bei der Plattform an
    pub async fn request_permission(&self) -> Result<(), DeviceError> {
        self.media.request_permission().await
    }

    /// Enumeriert die Geräte neu und meldet geänderte Listen
    ///
    /// Gibt die Anzahl der versendeten Notifications zurück. Bei einem
    /// Fehler bleibt der Cache unverändert.
    pub async fn refresh(&self) -> Result<usize, DeviceError> {
        let devices = match self.media.enumerate().await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::error!("Error enumerating devices: {}", e);
                return Err(e);
            }
        };

        let (inputs, outputs): (Vec<_>, Vec<_>) = devices
            .into_iter()
            .partition(|d| d.kind == DeviceKind::Input);

        let mut notified = 0;
        for (kind, fresh) in [(DeviceKind::Input, inputs), (DeviceKind::Output, outputs)] {
            let changed = {
                let mut cached = self.cache(kind).lock();
                if *cached == fresh {
                    false
                } else {
                    *cached = fresh;
                    true
                }
            };

            if changed {
                let options = self.options(kind);
                tracing::debug!("{:?} devices changed, {} option(s)", kind, options.len());
                let _ = self.event_tx.send(DeviceEvent::OptionsChanged { kind, options });
                notified += 1;
            }
        }

        Ok(notified)
    }

    /// Startet das periodische Polling der Geräteliste
    ///
    /// Der erste Durchlauf erfolgt nach einer vollen Periode; die initiale
    /// Enumeration übernimmt der Aufrufer.
    pub fn spawn_poll_loop(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                // Fehler sind bereits geloggt, der nächste Tick versucht es erneut
                let _ = self.refresh().await;
            }
        })
    }

    /// Aktuelle Geräte einer Art
    pub fn devices(&self, kind: DeviceKind) -> Vec<DeviceDescriptor> {
        self.cache(kind).lock().clone()
    }

    /// Baut die Auswahlliste aus dem Cache
    pub fn options(&self, kind: DeviceKind) -> Vec<DeviceOption> {
        let bound = self.bound.borrow().get(kind).map(str::to_string);

        self.cache(kind)
            .lock()
            .iter()
            .map(|device| DeviceOption {
                value: kind.option_value(&device.id),
                text: normalize_label(&device.label, kind),
                disabled: bound.as_deref() == Some(device.id.as_str()),
            })
            .collect()
    }

    /// Speichert die Auswahl des Benutzers
    ///
    /// Wirkt erst beim nächsten Annehmen (Input) bzw. beim nächsten
    /// Track-Attach (Output), nicht auf einen laufenden Stream.
    pub fn select(&self, kind: DeviceKind, device_id: &str) -> Result<(), DeviceError> {
        tracing::info!("Selected {:?} device: {}", kind, device_id);
        self.store.set(
            kind.preference_key(),
            Value::String(kind.option_value(device_id)),
        )?;
        Ok(())
    }

    /// Persistierte Präferenz, ungeprüft (Sentinel wenn keine gespeichert)
    pub fn active(&self, kind: DeviceKind) -> String {
        match self.store.get(kind.preference_key()) {
            Ok(Some(Value::String(value))) => kind.device_id_from_value(&value),
            Ok(Some(other)) => {
                tracing::warn!("Ignoring malformed {:?} preference: {}", kind, other);
                DEFAULT_DEVICE_ID.to_string()
            }
            Ok(None) => DEFAULT_DEVICE_ID.to_string(),
            Err(e) => {
                tracing::error!("Failed to read {:?} preference: {}", kind, e);
                DEFAULT_DEVICE_ID.to_string()
            }
        }
    }

    /// Präferenz aufgelöst gegen die letzte Enumeration
    ///
    /// Ein Gerät, das nicht mehr vorhanden ist, ergibt den Sentinel.
    pub fn resolve(&self, kind: DeviceKind) -> String {
        let preferred = self.active(kind);
        if preferred == DEFAULT_DEVICE_ID {
            return preferred;
        }

        let present = self.cache(kind).lock().iter().any(|d| d.id == preferred);
        if present {
            preferred
        } else {
            tracing::warn!(
                "The {:?} device used before ({}) is no longer available, default settings applied",
                kind,
                preferred
            );
            DEFAULT_DEVICE_ID.to_string()
        }
    }

    /// Wert, der in einer Auswahlliste vorausgewählt werden soll
    ///
    /// Präferenz falls vorhanden, sonst der Standard-Eintrag, sonst der erste.
    pub fn selected_value(&self, kind: DeviceKind, options: &[DeviceOption]) -> Option<String> {
        let resolved = kind.option_value(&self.resolve(kind));
        let fallback = kind.option_value(DEFAULT_DEVICE_ID);

        options
            .iter()
            .find(|o| o.value == resolved)
            .or_else(|| options.iter().find(|o| o.value == fallback))
            .or_else(|| options.first())
            .map(|o| o.value.clone())
    }

    fn cache(&self, kind: DeviceKind) -> &Mutex<Vec<DeviceDescriptor>> {
        match kind {
            DeviceKind::Input => &self.inputs,
            DeviceKind::Output => &self.outputs,
        }
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("inputs", &self.inputs.lock().len())
            .field("outputs", &self.outputs.lock().len())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::test_support::{descriptor, FakeMediaDevices};

    fn registry(
        media: &Arc<FakeMediaDevices>,
    ) -> (Arc<DeviceRegistry>, watch::Sender<BoundDevices>) {
        let (bound_tx, bound_rx) = watch::channel(BoundDevices::default());
        let registry = DeviceRegistry::new(
            Arc::clone(media) as Arc<dyn MediaDevices>,
            Arc::new(MemoryStore::new()),
            bound_rx,
        );
        (Arc::new(registry), bound_tx)
    }

    fn drain(rx: &mut broadcast::Receiver<DeviceEvent>) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(
            normalize_label("USB Headset (0b0e:245d)", DeviceKind::Input),
            "USB Headset"
        );
        assert_eq!(normalize_label("", DeviceKind::Input), "Microphone");
        assert_eq!(normalize_label("   ", DeviceKind::Output), "Speaker");
        assert_eq!(normalize_label("(virtual)", DeviceKind::Output), "(virtual)");
        assert_eq!(normalize_label("Built-in", DeviceKind::Output), "Built-in");
    }

    #[test]
    fn test_option_value_roundtrip() {
        let value = DeviceKind::Output.option_value("abc");
        assert_eq!(value, "output-abc");
        assert_eq!(DeviceKind::Output.device_id_from_value(&value), "abc");
        assert_eq!(DeviceKind::Input.device_id_from_value("raw-id"), "raw-id");
    }

    #[tokio::test]
    async fn test_identical_enumerations_do_not_notify() {
        let media = Arc::new(FakeMediaDevices::new(vec![
            descriptor(DeviceKind::Input, "mic-a", "MicA"),
            descriptor(DeviceKind::Output, "spk-a", "SpeakerA"),
        ]));
        let (registry, _bound) = registry(&media);
        let mut rx = registry.subscribe();

        assert_eq!(registry.refresh().await.unwrap(), 2);
        assert_eq!(drain(&mut rx).len(), 2);

        assert_eq!(registry.refresh().await.unwrap(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_one_new_device_sends_full_list_once() {
        let media = Arc::new(FakeMediaDevices::new(vec![descriptor(
            DeviceKind::Input,
            "mic-a",
            "MicA",
        )]));
        let (registry, _bound) = registry(&media);
        registry.refresh().await.unwrap();
        let mut rx = registry.subscribe();

        media.set_devices(vec![
            descriptor(DeviceKind::Input, "mic-a", "MicA"),
            descriptor(DeviceKind::Input, "mic-b", "MicB (1234:abcd)"),
        ]);
        assert_eq!(registry.refresh().await.unwrap(), 1);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        let DeviceEvent::OptionsChanged { kind, options } = &events[0];
        assert_eq!(*kind, DeviceKind::Input);
        assert_eq!(
            options,
            &vec![
                DeviceOption {
                    value: "input-mic-a".to_string(),
                    text: "MicA".to_string(),
                    disabled: false,
                },
                DeviceOption {
                    value: "input-mic-b".to_string(),
                    text: "MicB".to_string(),
                    disabled: false,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_bound_device_is_disabled() {
        let media = Arc::new(FakeMediaDevices::new(vec![
            descriptor(DeviceKind::Input, "mic-a", "MicA"),
            descriptor(DeviceKind::Input, "mic-b", "MicB"),
        ]));
        let (registry, bound) = registry(&media);
        registry.refresh().await.unwrap();

        bound.send_replace(BoundDevices {
            input: Some("mic-b".to_string()),
            output: None,
        });

        let options = registry.options(DeviceKind::Input);
        assert!(!options[0].disabled);
        assert!(options[1].disabled);
    }

    #[tokio::test]
    async fn test_resolve_falls_back_when_device_is_gone() {
        let media = Arc::new(FakeMediaDevices::new(vec![descriptor(
            DeviceKind::Output,
            "spk-a",
            "SpeakerA",
        )]));
        let (registry, _bound) = registry(&media);
        registry.refresh().await.unwrap();

        assert_eq!(registry.resolve(DeviceKind::Output), DEFAULT_DEVICE_ID);

        registry.select(DeviceKind::Output, "spk-a").unwrap();
        assert_eq!(registry.active(DeviceKind::Output), "spk-a");
        assert_eq!(registry.resolve(DeviceKind::Output), "spk-a");

        media.set_devices(vec![descriptor(DeviceKind::Output, "spk-b", "SpeakerB")]);
        registry.refresh().await.unwrap();

        assert_eq!(registry.active(DeviceKind::Output), "spk-a");
        assert_eq!(registry.resolve(DeviceKind::Output), DEFAULT_DEVICE_ID);
    }

    #[tokio::test]
    async fn test_selected_value_prefers_persisted_then_default() {
        let media = Arc::new(FakeMediaDevices::new(vec![
            descriptor(DeviceKind::Input, "mic-a", "MicA"),
            descriptor(DeviceKind::Input, DEFAULT_DEVICE_ID, "Default - MicB"),
            descriptor(DeviceKind::Input, "mic-b", "MicB"),
        ]));
        let (registry, _bound) = registry(&media);
        registry.refresh().await.unwrap();
        let options = registry.options(DeviceKind::Input);

        assert_eq!(
            registry.selected_value(DeviceKind::Input, &options),
            Some("input-default".to_string())
        );

        registry.select(DeviceKind::Input, "mic-b").unwrap();
        assert_eq!(
            registry.selected_value(DeviceKind::Input, &options),
            Some("input-mic-b".to_string())
        );

        assert_eq!(registry.selected_value(DeviceKind::Input, &[]), None);
    }

    #[tokio::test]
    async fn test_failed_enumeration_keeps_cache() {
        let media = Arc::new(FakeMediaDevices::new(vec![descriptor(
            DeviceKind::Input,
            "mic-a",
            "MicA",
        )]));
        let (registry, _bound) = registry(&media);
        registry.refresh().await.unwrap();

        media.fail_enumeration(true);
        assert!(registry.refresh().await.is_err());
        assert_eq!(registry.devices(DeviceKind::Input).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_refreshes_every_period() {
        let media = Arc::new(FakeMediaDevices::new(Vec::new()));
        let (registry, _bound) = registry(&media);

        let handle = Arc::clone(&registry).spawn_poll_loop(Duration::from_secs(10));
        tokio::task::yield_now().await;
        assert_eq!(media.enumerations(), 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(media.enumerations(), 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(media.enumerations(), 2);

        handle.abort();
    }
}
