//! User Agent - Anbindung der Signaling-Engine
//!
//! Startet den Transport und registriert das Konto kurz nach jedem
//! Connect. Eingehende Sessions und Transportfehler meldet die Engine
//! direkt über den `EngineHandle`.

use super::session::SignalingError;
use crate::bus::EngineHandle;
use crate::config::SipAccountConfig;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Maximale Wartezeit auf die Antwort zum REGISTER
const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// SIGNALING ENGINE
// ============================================================================

/// Externe SIP-over-WebSocket Engine
pub trait SignalingEngine: Send + Sync {
    /// Baut den Transport zum Server auf
    fn start(&self, account: &SipAccountConfig) -> BoxFuture<'static, Result<(), SignalingError>>;

    fn register(&self, expires_secs: u32) -> BoxFuture<'static, Result<(), SignalingError>>;

    fn is_registered(&self) -> bool;

    /// True solange die Engine selbst einen Reconnect versucht
    fn is_reconnecting(&self) -> bool;
}

// ============================================================================
// AGENT STATE
// ============================================================================

#[derive(Debug, Clone, Default)]
struct AgentState {
    started: bool,
    registering: bool,
}

// ============================================================================
// USER AGENT
// ============================================================================

pub struct UserAgent {
    engine: Arc<dyn SignalingEngine>,
    account: SipAccountConfig,
    calls: EngineHandle,
    state: RwLock<AgentState>,
}

impl UserAgent {
    pub fn new(
        engine: Arc<dyn SignalingEngine>,
        account: SipAccountConfig,
        calls: EngineHandle,
    ) -> Self {
        Self {
            engine,
            account,
            calls,
            state: RwLock::new(AgentState::default()),
        }
    }

    /// Startet den Transport
    pub async fn start(&self) -> Result<(), SignalingError> {
        match self.account.transport_url() {
            Ok(url) => tracing::info!("User Agent connecting to {}", url),
            Err(e) => return Err(SignalingError::Transport(e.to_string())),
        }

        if let Err(e) = self.engine.start(&self.account).await {
            tracing::error!("User Agent failed to start: {}", e);
            self.calls.transport_fault(e.to_string());
            return Err(e);
        }

        self.state.write().started = true;
        tracing::info!("User Agent started as {}", self.account.uri());
        Ok(())
    }

    /// Vom Host aufzurufen, sobald der Transport verbunden ist
    ///
    /// Plant die Registrierung nach `register_delay_ms`, außer die Engine
    /// verbindet sich gerade neu oder eine Registrierung läuft bereits.
    pub fn on_transport_connected(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.engine.is_reconnecting() || self.state.read().registering {
            tracing::debug!("Transport connected, registration skipped");
            return None;
        }

        let agent = Arc::clone(self);
        let delay = self.account.register_delay();
        Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            agent.register().await;
        }))
    }

    /// Vom Host aufzurufen bei einem fatalen Transportfehler
    pub fn on_transport_error(&self, reason: &str) {
        tracing::error!("Signaling transport error: {}", reason);
        self.calls.transport_fault(reason);
    }

    /// Registriert das Konto, sofern nicht bereits registriert
    ///
    /// Gibt zurück, ob ein REGISTER erfolgreich war.
    pub async fn register(&self) -> bool {
        {
            let mut state = self.state.write();
            if state.registering || self.engine.is_registered() {
                return false;
            }
            state.registering = true;
        }

        tracing::info!("Sending registration for {}", self.account.uri());

        let result = tokio::select! {
            result = self.engine.register(self.account.register_expires_secs) => result,
            _ = tokio::time::sleep(REGISTER_TIMEOUT) => {
                Err(SignalingError::Transport("Registration timeout".to_string()))
            }
        };

        self.state.write().registering = false;

        match result {
            Ok(()) => {
                tracing::info!("Registered as {}", self.account.uri());
                true
            }
            Err(e) => {
                tracing::warn!("Registration failed: {}", e);
                self.calls.registration_failed(e.to_string());
                false
            }
        }
    }

    pub fn is_started(&self) -> bool {
        self.state.read().started
    }

    pub fn is_registered(&self) -> bool {
        self.engine.is_registered()
    }
}

impl std::fmt::Debug for UserAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserAgent")
            .field("uri", &self.account.uri())
            .field("state", &*self.state.read())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EngineInput;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeEngine {
        registrations: AtomicUsize,
        registered: Arc<AtomicBool>,
        reconnecting: AtomicBool,
        reject: AtomicBool,
    }

    impl SignalingEngine for FakeEngine {
        fn start(
            &self,
            _account: &SipAccountConfig,
        ) -> BoxFuture<'static, Result<(), SignalingError>> {
            Box::pin(async { Ok(()) })
        }

        fn register(&self, _expires_secs: u32) -> BoxFuture<'static, Result<(), SignalingError>> {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            let reject = self.reject.load(Ordering::SeqCst);
            let registered = Arc::clone(&self.registered);
            Box::pin(async move {
                if reject {
                    return Err(SignalingError::RegistrationRejected {
                        status_code: 403,
                        reason: "Forbidden".to_string(),
                    });
                }
                registered.store(true, Ordering::SeqCst);
                Ok(())
            })
        }

        fn is_registered(&self) -> bool {
            self.registered.load(Ordering::SeqCst)
        }

        fn is_reconnecting(&self) -> bool {
            self.reconnecting.load(Ordering::SeqCst)
        }
    }

    fn agent(engine: Arc<FakeEngine>) -> (Arc<UserAgent>, mpsc::UnboundedReceiver<EngineInput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let agent = UserAgent::new(engine, SipAccountConfig::default(), EngineHandle::new(tx));
        (Arc::new(agent), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_registers_after_delay() {
        let engine = Arc::new(FakeEngine::default());
        let (agent, _rx) = agent(Arc::clone(&engine));

        agent.start().await.unwrap();
        assert!(agent.is_started());

        let task = agent.on_transport_connected().unwrap();

        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert_eq!(engine.registrations.load(Ordering::SeqCst), 0);

        task.await.unwrap();
        assert_eq!(engine.registrations.load(Ordering::SeqCst), 1);
        assert!(agent.is_registered());
    }

    #[tokio::test]
    async fn test_already_registered_is_not_registered_again() {
        let engine = Arc::new(FakeEngine::default());
        let (agent, _rx) = agent(Arc::clone(&engine));

        assert!(agent.register().await);
        assert!(!agent.register().await);
        assert_eq!(engine.registrations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reconnecting_skips_registration() {
        let engine = Arc::new(FakeEngine::default());
        engine.reconnecting.store(true, Ordering::SeqCst);
        let (agent, _rx) = agent(Arc::clone(&engine));

        assert!(agent.on_transport_connected().is_none());
    }

    #[tokio::test]
    async fn test_rejected_registration_is_reported() {
        let engine = Arc::new(FakeEngine::default());
        engine.reject.store(true, Ordering::SeqCst);
        let (agent, mut rx) = agent(Arc::clone(&engine));

        assert!(!agent.register().await);

        match rx.try_recv() {
            Ok(EngineInput::RegistrationFailed { reason }) => assert!(reason.contains("403")),
            _ => panic!("expected registration failure"),
        }
    }

    #[tokio::test]
    async fn test_transport_error_is_forwarded() {
        let engine = Arc::new(FakeEngine::default());
        let (agent, mut rx) = agent(engine);

        agent.on_transport_error("socket closed");

        assert!(matches!(
            rx.try_recv(),
            Ok(EngineInput::TransportFault { reason }) if reason == "socket closed"
        ));
    }
}
