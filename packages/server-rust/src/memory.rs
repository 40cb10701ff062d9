//! In-memory collaborators.
//!
//! Stand-ins for the bus transport, the backend and the document store. They
//! record every interaction so tests and the harness binary can inspect what
//! the mediator did.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chooser_core::VarDict;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;

use crate::request::RequestId;
use crate::traits::{
    BackendCall, BackendReply, BackendRequest, DocumentRegistry, FileChooserBackend,
    RequestTransport,
};

// ---------------------------------------------------------------------------
// RecordingTransport
// ---------------------------------------------------------------------------

/// A `Response` signal captured by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedResponse {
    pub id: RequestId,
    pub code: u32,
    pub results: VarDict,
}

/// Transport that records exports, unexports and emitted responses.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    exported: Mutex<Vec<RequestId>>,
    unexported: Mutex<Vec<RequestId>>,
    responses: Mutex<Vec<RecordedResponse>>,
    fail_exports: AtomicBool,
    response_signal: Notify,
}

impl RecordingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent exports fail.
    pub fn fail_exports(&self, fail: bool) {
        self.fail_exports.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn exported(&self) -> Vec<RequestId> {
        self.exported.lock().clone()
    }

    #[must_use]
    pub fn unexported(&self) -> Vec<RequestId> {
        self.unexported.lock().clone()
    }

    #[must_use]
    pub fn responses(&self) -> Vec<RecordedResponse> {
        self.responses.lock().clone()
    }

    /// Waits until at least `count` responses have been emitted.
    pub async fn wait_for_responses(&self, count: usize) -> Vec<RecordedResponse> {
        loop {
            let notified = self.response_signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let responses = self.responses();
            if responses.len() >= count {
                return responses;
            }
            notified.await;
        }
    }

    /// Waits until at least `count` requests have been unexported.
    pub async fn wait_for_unexports(&self, count: usize) -> Vec<RequestId> {
        loop {
            let notified = self.response_signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let unexported = self.unexported();
            if unexported.len() >= count {
                return unexported;
            }
            notified.await;
        }
    }
}

impl RequestTransport for RecordingTransport {
    fn export(&self, id: &RequestId) -> anyhow::Result<()> {
        if self.fail_exports.load(Ordering::SeqCst) {
            anyhow::bail!("object path {id} is already in use");
        }
        self.exported.lock().push(id.clone());
        Ok(())
    }

    fn unexport(&self, id: &RequestId) {
        self.unexported.lock().push(id.clone());
        self.response_signal.notify_waiters();
    }

    fn emit_response(&self, id: &RequestId, code: u32, results: VarDict) {
        self.responses.lock().push(RecordedResponse {
            id: id.clone(),
            code,
            results,
        });
        self.response_signal.notify_waiters();
    }
}

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// One queued backend behaviour.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Answer immediately.
    Reply(u32, VarDict),
    /// Fail as if the backend crashed or the bus call errored.
    Fail(String),
    /// Wait for the gate to be opened, then answer.
    Gated(Arc<Notify>, u32, VarDict),
}

/// Which backend method was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMethod {
    OpenFile,
    SaveFile,
}

/// Backend that plays back queued replies and records calls.
///
/// With an empty queue every call is answered with code 1 (cancelled).
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<(BackendMethod, BackendCall)>>,
    closes: Arc<AtomicU32>,
    unreachable: AtomicBool,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next reply.
    pub fn push(&self, reply: ScriptedReply) {
        self.replies.lock().push_back(reply);
    }

    /// Makes `create_request` fail, as when the backend's bus name has no owner.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<(BackendMethod, BackendCall)> {
        self.calls.lock().clone()
    }

    /// Number of backend requests closed by cancellation.
    #[must_use]
    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    async fn play(&self, method: BackendMethod, call: BackendCall) -> anyhow::Result<BackendReply> {
        self.calls.lock().push((method, call));
        let reply = self.replies.lock().pop_front();
        match reply {
            None => Ok((1, VarDict::new())),
            Some(ScriptedReply::Reply(code, results)) => Ok((code, results)),
            Some(ScriptedReply::Fail(message)) => Err(anyhow::anyhow!(message)),
            Some(ScriptedReply::Gated(gate, code, results)) => {
                gate.notified().await;
                Ok((code, results))
            }
        }
    }
}

struct ScriptedBackendRequest {
    closes: Arc<AtomicU32>,
}

impl BackendRequest for ScriptedBackendRequest {
    fn close(&self) -> anyhow::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl FileChooserBackend for ScriptedBackend {
    fn create_request(&self, request_id: &RequestId) -> anyhow::Result<Box<dyn BackendRequest>> {
        if self.unreachable.load(Ordering::SeqCst) {
            anyhow::bail!("backend has no owner, cannot create {request_id}");
        }
        Ok(Box::new(ScriptedBackendRequest {
            closes: Arc::clone(&self.closes),
        }))
    }

    async fn open_file(&self, call: BackendCall) -> anyhow::Result<BackendReply> {
        self.play(BackendMethod::OpenFile, call).await
    }

    async fn save_file(&self, call: BackendCall) -> anyhow::Result<BackendReply> {
        self.play(BackendMethod::SaveFile, call).await
    }
}

// ---------------------------------------------------------------------------
// MemoryDocumentRegistry
// ---------------------------------------------------------------------------

/// Arguments of one `register` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub uri: String,
    pub app_id: String,
    pub for_save: bool,
    pub writable: bool,
}

/// Document registry that hands out `file:///run/user/doc/<id>/<name>` URIs.
#[derive(Debug)]
pub struct MemoryDocumentRegistry {
    mount_point: String,
    next_id: AtomicU32,
    failing: Mutex<HashSet<String>>,
    registrations: Mutex<Vec<Registration>>,
}

impl MemoryDocumentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mount_point: "/run/user/doc".to_string(),
            next_id: AtomicU32::new(1),
            failing: Mutex::new(HashSet::new()),
            registrations: Mutex::new(Vec::new()),
        }
    }

    /// Makes registration of `uri` fail.
    pub fn fail_for(&self, uri: impl Into<String>) {
        self.failing.lock().insert(uri.into());
    }

    #[must_use]
    pub fn registrations(&self) -> Vec<Registration> {
        self.registrations.lock().clone()
    }
}

impl Default for MemoryDocumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentRegistry for MemoryDocumentRegistry {
    fn register(&self, uri: &str, app_id: &str, for_save: bool, writable: bool) -> anyhow::Result<String> {
        self.registrations.lock().push(Registration {
            uri: uri.to_string(),
            app_id: app_id.to_string(),
            for_save,
            writable,
        });

        if self.failing.lock().contains(uri) {
            anyhow::bail!("permission denied");
        }
        let path = uri
            .strip_prefix("file://")
            .ok_or_else(|| anyhow::anyhow!("unsupported uri scheme"))?;
        let name = path.rsplit('/').next().unwrap_or_default();
        if name.is_empty() {
            anyhow::bail!("not a file");
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(format!("file://{}/{id:x}/{name}", self.mount_point))
    }
}
