//! CRM Softphone - Telefonie-Kern für die Einbettung in eine CRM-Seite
//!
//! Ein Anruf zur Zeit, ausgehandelt über eine externe SIP-over-WebSocket
//! Engine. Enthalten sind:
//! - Zustandsautomat für die eine Call-Session
//! - Audio-Geräte und gespeicherte Präferenzen
//! - Presenter für die Call-Oberfläche

pub mod bus;
pub mod call_engine;
pub mod config;
pub mod devices;
pub mod i18n;
pub mod presenter;
pub mod signaling;
pub mod storage;

#[cfg(test)]
mod test_support;

use bus::{CallEvent, CallSnapshot, EngineHandle};
use call_engine::{AudioOutput, CallEngine, EngineParts, Notifier, Ringer};
use config::{ConfigError, SoftphoneConfig, StorageConfig};
use devices::{BoundDevices, DeviceError, DeviceRegistry, MediaDevices};
use presenter::{CallSurfacePresenter, CallSurfaceView};
use signaling::{ClickToCallBridge, SignalingEngine, UserAgent};
use std::sync::Arc;
use storage::{KeyValueStore, NamespacedStore, SqliteStore, StorageError};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum SoftphoneError {
    #[error("Audio permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

// ============================================================================
// LOGGING
// ============================================================================

/// Installiert den tracing Subscriber (weitere Aufrufe sind wirkungslos)
pub fn init_logging() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "softphone_lib=debug".parse() {
        filter = filter.add_directive(directive);
    }

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// ============================================================================
// HOST CONTEXT
// ============================================================================

/// Fähigkeiten, die die einbettende Seite bereitstellt
pub struct HostContext {
    pub view: Arc<dyn CallSurfaceView>,
    pub audio_output: Arc<dyn AudioOutput>,
    pub ringer: Arc<dyn Ringer>,
    pub notifier: Arc<dyn Notifier>,
    pub media_devices: Arc<dyn MediaDevices>,
    pub store: Arc<dyn KeyValueStore>,
    pub click_to_call: Option<Arc<dyn ClickToCallBridge>>,
}

/// Öffnet den SQLite-Store laut Konfiguration
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>, SoftphoneError> {
    let store = match &config.database_path {
        Some(path) => SqliteStore::open(path)?,
        None => SqliteStore::open_default()?,
    };
    Ok(Arc::new(store))
}

// ============================================================================
// SOFTPHONE
// ============================================================================

/// Besitzer aller laufenden Komponenten
pub struct Softphone {
    config: SoftphoneConfig,
    engine: EngineHandle,
    registry: Arc<DeviceRegistry>,
    events: broadcast::Sender<CallEvent>,
    snapshot: watch::Receiver<CallSnapshot>,
    tasks: Vec<JoinHandle<()>>,
}

impl Softphone {
    /// Initialisiert das Telefon
    ///
    /// Ohne Mikrofon-Zugriff ist die gesamte Telefonie unbenutzbar: der
    /// Benutzer sieht einmalig eine Warnung, es wird nichts gestartet.
    pub async fn init(config: SoftphoneConfig, host: HostContext) -> Result<Self, SoftphoneError> {
        init_logging();
        config.validate()?;

        tracing::info!("Initializing softphone for {}", config.account.uri());

        let dictionary = Arc::new(config.labels.clone());
        let store: Arc<dyn KeyValueStore> = Arc::new(NamespacedStore::new(
            host.store,
            config.storage.namespace.clone(),
        ));

        let (bound_tx, bound_rx) = watch::channel(BoundDevices::default());
        let registry = Arc::new(DeviceRegistry::new(host.media_devices, store, bound_rx));

        if let Err(e) = registry.request_permission().await {
            tracing::error!("Audio permission refused: {}", e);
            host.view
                .show_warning(dictionary.code(i18n::PERMISSION_DENIED));
            return Err(match e {
                DeviceError::PermissionDenied(reason) => SoftphoneError::PermissionDenied(reason),
                other => SoftphoneError::Device(other),
            });
        }

        let (engine, inbox) = CallEngine::new(EngineParts {
            registry: Arc::clone(&registry),
            bound_devices: bound_tx,
            audio_output: Arc::clone(&host.audio_output),
            ringer: host.ringer,
            notifier: host.notifier,
            click_to_call: host.click_to_call,
            dictionary: Arc::clone(&dictionary),
        });
        let handle = engine.handle();
        let events = engine.event_sender();
        let snapshot = engine.watch_snapshot();
        let call_rx = engine.subscribe();
        let device_rx = registry.subscribe();

        let mut presenter = CallSurfacePresenter::new(
            host.view,
            Arc::clone(&registry),
            host.audio_output,
            handle.clone(),
            dictionary,
        );
        presenter.start();

        // Fehler sind geloggt, das Polling versucht es erneut
        let _ = registry.refresh().await;

        let tasks = vec![
            tokio::spawn(engine.run(inbox)),
            tokio::spawn(presenter.run(call_rx, device_rx)),
            Arc::clone(&registry).spawn_poll_loop(config.device_poll_interval()),
        ];

        tracing::info!("Softphone initialized");

        Ok(Self {
            config,
            engine: handle,
            registry,
            events,
            snapshot,
            tasks,
        })
    }

    /// Zugang für Signaling-Engine und Host
    pub fn engine(&self) -> EngineHandle {
        self.engine.clone()
    }

    pub fn registry(&self) -> Arc<DeviceRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// Aktueller Zustand des Telefons
    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot.clone()
    }

    /// Erstellt den User Agent für die gegebene Signaling-Engine
    pub fn user_agent(&self, engine: Arc<dyn SignalingEngine>) -> Arc<UserAgent> {
        Arc::new(UserAgent::new(
            engine,
            self.config.account.clone(),
            self.engine.clone(),
        ))
    }

    /// Stoppt alle Hintergrund-Tasks
    pub fn shutdown(self) {
        tracing::info!("Shutting down softphone");
    }
}

impl Drop for Softphone {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Softphone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Softphone")
            .field("account", &self.config.account.uri())
            .field("snapshot", &*self.snapshot.borrow())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
