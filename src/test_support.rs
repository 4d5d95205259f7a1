//! Test-Doubles für Host-Fähigkeiten und Signaling

use crate::call_engine::{
    AudioOutput, MediaError, NotificationPermission, Notifier, RemoteStream, Ringer,
};
use crate::devices::{DeviceDescriptor, DeviceError, DeviceKind, DeviceOption, MediaDevices};
use crate::presenter::{
    BindingId, CallSurfaceView, Intent, IntentHandler, PromptDecision, PromptResponder,
    SurfaceField, SurfacePart,
};
use crate::signaling::{
    AcceptOptions, InboundSession, RemoteIdentity, SessionDelegate, SessionOperation, SessionState,
    SignalingError,
};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

pub fn descriptor(kind: DeviceKind, id: &str, label: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        id: id.to_string(),
        kind,
        label: label.to_string(),
        raw_hardware_id: format!("hw-{}", id),
    }
}

// ============================================================================
// MEDIA DEVICES
// ============================================================================

#[derive(Default)]
pub struct FakeMediaDevices {
    devices: Mutex<Vec<DeviceDescriptor>>,
    fail: AtomicBool,
    deny: AtomicBool,
    enumerations: AtomicUsize,
}

impl FakeMediaDevices {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices: Mutex::new(devices),
            ..Default::default()
        }
    }

    pub fn set_devices(&self, devices: Vec<DeviceDescriptor>) {
        *self.devices.lock() = devices;
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn deny_permission(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }
}

impl MediaDevices for FakeMediaDevices {
    fn request_permission(&self) -> BoxFuture<'static, Result<(), DeviceError>> {
        let deny = self.deny.load(Ordering::SeqCst);
        Box::pin(async move {
            if deny {
                Err(DeviceError::PermissionDenied("NotAllowedError".to_string()))
            } else {
                Ok(())
            }
        })
    }

    fn enumerate(&self) -> BoxFuture<'static, Result<Vec<DeviceDescriptor>, DeviceError>> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail.load(Ordering::SeqCst) {
            Err(DeviceError::Enumeration("device busy".to_string()))
        } else {
            Ok(self.devices.lock().clone())
        };
        Box::pin(async move { result })
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Zeichnet jede Operation beim Aufruf auf
pub struct FakeSession {
    identity: RemoteIdentity,
    state: Mutex<SessionState>,
    delegate: Mutex<Option<SessionDelegate>>,
    calls: Mutex<Vec<String>>,
    accepted_with: Mutex<Option<AcceptOptions>>,
    fail_accept: AtomicBool,
    fail_bye: AtomicBool,
    muted: AtomicBool,
}

impl FakeSession {
    pub fn new(display_name: Option<&str>, number: &str) -> Arc<Self> {
        Arc::new(Self {
            identity: RemoteIdentity {
                display_name: display_name.map(str::to_string),
                number: number.to_string(),
            },
            state: Mutex::new(SessionState::Initial),
            delegate: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            accepted_with: Mutex::new(None),
            fail_accept: AtomicBool::new(false),
            fail_bye: AtomicBool::new(false),
            muted: AtomicBool::new(false),
        })
    }

    pub fn fail_accept(&self) {
        self.fail_accept.store(true, Ordering::SeqCst);
    }

    pub fn fail_bye(&self) {
        self.fail_bye.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn delegate(&self) -> Option<SessionDelegate> {
        self.delegate.lock().clone()
    }

    pub fn accepted_with(&self) -> Option<AcceptOptions> {
        self.accepted_with.lock().clone()
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

fn outcome(
    operation: SessionOperation,
    fail: bool,
) -> BoxFuture<'static, Result<(), SignalingError>> {
    Box::pin(async move {
        if fail {
            Err(SignalingError::OperationFailed {
                operation,
                reason: "transaction timeout".to_string(),
            })
        } else {
            Ok(())
        }
    })
}

impl InboundSession for FakeSession {
    fn remote_identity(&self) -> RemoteIdentity {
        self.identity.clone()
    }

    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_delegate(&self, delegate: Option<SessionDelegate>) {
        *self.delegate.lock() = delegate;
    }

    fn accept(&self, options: AcceptOptions) -> BoxFuture<'static, Result<(), SignalingError>> {
        self.record("accept".to_string());
        *self.accepted_with.lock() = Some(options);

        let fail = self.fail_accept.load(Ordering::SeqCst);
        if !fail {
            *self.state.lock() = SessionState::Established;
        }
        outcome(SessionOperation::Accept, fail)
    }

    fn reject(
        &self,
        status_code: u16,
        reason_phrase: &str,
    ) -> BoxFuture<'static, Result<(), SignalingError>> {
        self.record(format!("reject {} {}", status_code, reason_phrase));
        *self.state.lock() = SessionState::Terminated;
        outcome(SessionOperation::Reject, false)
    }

    fn bye(&self) -> BoxFuture<'static, Result<(), SignalingError>> {
        self.record("bye".to_string());
        *self.state.lock() = SessionState::Terminated;
        outcome(SessionOperation::Bye, self.fail_bye.load(Ordering::SeqCst))
    }

    fn dispose(&self) -> BoxFuture<'static, Result<(), SignalingError>> {
        self.record("dispose".to_string());
        *self.state.lock() = SessionState::Terminated;
        outcome(SessionOperation::Dispose, false)
    }

    fn set_local_audio_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }
}

// ============================================================================
// HOST MEDIA
// ============================================================================

pub struct FakeAudioOutput {
    sink_support: AtomicBool,
    attached: Mutex<Vec<RemoteStream>>,
    sinks: Mutex<Vec<String>>,
    plays: AtomicUsize,
    clears: AtomicUsize,
}

impl FakeAudioOutput {
    pub fn new(sink_support: bool) -> Self {
        Self {
            sink_support: AtomicBool::new(sink_support),
            attached: Mutex::new(Vec::new()),
            sinks: Mutex::new(Vec::new()),
            plays: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
        }
    }

    pub fn set_sink_support(&self, supported: bool) {
        self.sink_support.store(supported, Ordering::SeqCst);
    }

    pub fn attached(&self) -> Vec<RemoteStream> {
        self.attached.lock().clone()
    }

    pub fn sinks(&self) -> Vec<String> {
        self.sinks.lock().clone()
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl AudioOutput for FakeAudioOutput {
    fn attach(&self, stream: RemoteStream) {
        self.attached.lock().push(stream);
    }

    fn supports_sink_selection(&self) -> bool {
        self.sink_support.load(Ordering::SeqCst)
    }

    fn set_sink(&self, device_id: &str) -> BoxFuture<'static, Result<(), MediaError>> {
        self.sinks.lock().push(device_id.to_string());
        Box::pin(async { Ok(()) })
    }

    fn play(&self) {
        self.plays.fetch_add(1, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeRinger {
    playing: AtomicBool,
    starts: AtomicUsize,
}

impl FakeRinger {
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

impl Ringer for FakeRinger {
    fn start_loop(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.playing.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }
}

pub struct FakeNotifier {
    permission: Mutex<NotificationPermission>,
    grant_on_request: AtomicBool,
    shown: Mutex<Vec<(String, String)>>,
}

impl FakeNotifier {
    pub fn new(permission: NotificationPermission) -> Self {
        Self {
            permission: Mutex::new(permission),
            grant_on_request: AtomicBool::new(false),
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn set_permission(&self, permission: NotificationPermission) {
        *self.permission.lock() = permission;
    }

    pub fn grant_on_request(&self, grant: bool) {
        self.grant_on_request.store(grant, Ordering::SeqCst);
    }

    pub fn shown(&self) -> Vec<(String, String)> {
        self.shown.lock().clone()
    }
}

impl Notifier for FakeNotifier {
    fn permission(&self) -> NotificationPermission {
        *self.permission.lock()
    }

    fn request_permission(&self) -> BoxFuture<'static, NotificationPermission> {
        let result = if self.grant_on_request.load(Ordering::SeqCst) {
            NotificationPermission::Granted
        } else {
            NotificationPermission::Denied
        };
        *self.permission.lock() = result;
        Box::pin(async move { result })
    }

    fn show(&self, title: &str, body: &str) {
        self.shown.lock().push((title.to_string(), body.to_string()));
    }
}

// ============================================================================
// VIEW
// ============================================================================

/// Aufgezeichneter Zustand der Oberfläche
#[derive(Default)]
pub struct FakeView {
    visible: Mutex<HashMap<SurfacePart, bool>>,
    texts: Mutex<HashMap<SurfaceField, String>>,
    options: Mutex<HashMap<DeviceKind, (Vec<DeviceOption>, Option<String>)>>,
    muted: Mutex<Option<bool>>,
    do_not_disturb: Mutex<Option<bool>>,
    bindings: Mutex<HashMap<Intent, (BindingId, IntentHandler)>>,
    unbinds: AtomicUsize,
    next_binding: AtomicU64,
    prompt: Mutex<Option<(String, PromptResponder)>>,
    dismissals: AtomicUsize,
    warnings: Mutex<Vec<String>>,
    renders: Mutex<Vec<String>>,
}

impl FakeView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_visible(&self, part: SurfacePart) -> Option<bool> {
        self.visible.lock().get(&part).copied()
    }

    pub fn text(&self, field: SurfaceField) -> Option<String> {
        self.texts.lock().get(&field).cloned()
    }

    pub fn options(&self, kind: DeviceKind) -> Option<(Vec<DeviceOption>, Option<String>)> {
        self.options.lock().get(&kind).cloned()
    }

    pub fn muted(&self) -> Option<bool> {
        *self.muted.lock()
    }

    pub fn do_not_disturb(&self) -> Option<bool> {
        *self.do_not_disturb.lock()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.lock().len()
    }

    pub fn is_bound(&self, intent: Intent) -> bool {
        self.bindings.lock().contains_key(&intent)
    }

    pub fn unbinds(&self) -> usize {
        self.unbinds.load(Ordering::SeqCst)
    }

    /// Simuliert eine Benutzeraktion
    pub fn fire(&self, intent: Intent, value: Option<&str>) {
        let handler = self.bindings.lock().get(&intent).map(|(_, h)| Arc::clone(h));
        if let Some(handler) = handler {
            handler(value.map(str::to_string));
        }
    }

    pub fn prompt_caller(&self) -> Option<String> {
        self.prompt.lock().as_ref().map(|(caller, _)| caller.clone())
    }

    /// Beantwortet den offenen Incoming-Call Dialog
    pub fn respond(&self, decision: PromptDecision) -> bool {
        let responder = self.prompt.lock().take();
        match responder {
            Some((_, respond)) => {
                respond(decision);
                true
            }
            None => false,
        }
    }

    pub fn dismissals(&self) -> usize {
        self.dismissals.load(Ordering::SeqCst)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    /// Reihenfolge der Render-Aufrufe (für Teil-Updates)
    pub fn take_renders(&self) -> Vec<String> {
        std::mem::take(&mut *self.renders.lock())
    }
}

impl CallSurfaceView for FakeView {
    fn set_visible(&self, part: SurfacePart, visible: bool) {
        self.visible.lock().insert(part, visible);
    }

    fn render_text(&self, field: SurfaceField, text: &str) {
        self.renders.lock().push(format!("{:?}", field));
        self.texts.lock().insert(field, text.to_string());
    }

    fn render_options(&self, kind: DeviceKind, options: &[DeviceOption], selected: Option<&str>) {
        self.renders.lock().push(format!("{:?}Options", kind));
        self.options
            .lock()
            .insert(kind, (options.to_vec(), selected.map(str::to_string)));
    }

    fn render_muted(&self, muted: bool) {
        self.renders.lock().push("Muted".to_string());
        *self.muted.lock() = Some(muted);
    }

    fn render_do_not_disturb(&self, enabled: bool) {
        *self.do_not_disturb.lock() = Some(enabled);
    }

    fn bind(&self, intent: Intent, handler: IntentHandler) -> BindingId {
        let id = BindingId(self.next_binding.fetch_add(1, Ordering::SeqCst));
        self.bindings.lock().insert(intent, (id, handler));
        id
    }

    fn unbind(&self, intent: Intent, binding: BindingId) {
        let mut bindings = self.bindings.lock();
        if bindings.get(&intent).is_some_and(|(id, _)| *id == binding) {
            bindings.remove(&intent);
            self.unbinds.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn show_incoming_prompt(&self, caller_id: &str, respond: PromptResponder) {
        *self.prompt.lock() = Some((caller_id.to_string(), respond));
    }

    fn dismiss_incoming_prompt(&self) {
        self.dismissals.fetch_add(1, Ordering::SeqCst);
        self.prompt.lock().take();
    }

    fn show_warning(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }
}
