//! Per-call request records and the table that owns their exported handles.
//!
//! A `Request` is shared by `Arc` between the inbound call, the backend
//! completion task and the assembly worker. Its mutable state sits behind a
//! single `parking_lot::Mutex`; the only way to touch it is through a
//! [`RequestGuard`], so every state transition happens under the lock.
//!
//! Lifecycle: created → exported → responded or cancelled → unexported.
//! `unexport` is idempotent, which is what guarantees a single `Response`
//! per request even when cancellation races with assembly.

use std::fmt;
use std::sync::{Arc, Weak};

use chooser_core::{ResponseCode, ResponsePayload, VarDict};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::PortalError;
use crate::traits::{BackendRequest, RequestTransport};

/// Object path identifying one request, e.g.
/// `/org/freedesktop/portal/desktop/request/1_42/t1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Builds the request path for `sender` (a unique bus name such as
    /// `:1.42`) and `token`.
    #[must_use]
    pub fn new(prefix: &str, sender: &str, token: &str) -> Self {
        let sender = sender.trim_start_matches(':').replace('.', "_");
        Self(format!("{prefix}/{sender}/{token}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who is calling, as resolved by the transport.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    /// Unique bus name of the caller.
    pub sender: String,
    /// Application id, or `None` if it could not be determined. Unsandboxed
    /// callers have an empty app id, which is valid.
    pub app_id: Option<String>,
}

fn is_valid_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn generate_token() -> String {
    format!("t{}", uuid::Uuid::new_v4().simple())
}

// ---------------------------------------------------------------------------
// RequestRegistry
// ---------------------------------------------------------------------------

/// Owning table of exported requests, keyed by request path.
///
/// Entries are weak: the strong references belong to whichever context is
/// currently driving the request. Entries exist only while a request is
/// exported.
pub struct RequestRegistry {
    requests: DashMap<RequestId, Weak<Request>>,
    transport: Arc<dyn RequestTransport>,
    path_prefix: String,
}

impl RequestRegistry {
    /// Creates an empty registry publishing through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn RequestTransport>, path_prefix: impl Into<String>) -> Self {
        Self {
            requests: DashMap::new(),
            transport,
            path_prefix: path_prefix.into(),
        }
    }

    /// Creates a request for `caller`.
    ///
    /// `handle_token` is the client-chosen last path element; an absent or
    /// malformed token is replaced by a generated one.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::AppIdUnavailable` if the caller's app id is unknown.
    pub fn create(
        self: &Arc<Self>,
        caller: &CallerIdentity,
        handle_token: Option<&str>,
    ) -> Result<Arc<Request>, PortalError> {
        let app_id = caller
            .app_id
            .clone()
            .ok_or_else(|| PortalError::AppIdUnavailable {
                sender: caller.sender.clone(),
            })?;

        let token = match handle_token {
            Some(token) if is_valid_token(token) => token.to_string(),
            Some(token) => {
                warn!(sender = %caller.sender, token, "ignoring invalid handle token");
                generate_token()
            }
            None => generate_token(),
        };

        let id = RequestId::new(&self.path_prefix, &caller.sender, &token);
        debug!(request = %id, app_id = %app_id, "request created");

        Ok(Arc::new(Request {
            id,
            app_id,
            state: Mutex::new(RequestState::default()),
            registry: Arc::clone(self),
        }))
    }

    /// Looks up a live exported request.
    pub fn get(&self, id: &RequestId) -> Option<Arc<Request>> {
        self.requests.get(id).and_then(|entry| entry.value().upgrade())
    }

    /// Returns the number of exported requests that are still alive.
    #[must_use]
    pub fn count(&self) -> usize {
        self.requests
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    /// Handles an external cancellation of `id`.
    ///
    /// Forwards the close to the backend handle and unexports the request.
    /// Returns `false` if no such request is exported.
    pub fn close(&self, id: &RequestId) -> bool {
        let Some(request) = self.get(id) else {
            debug!(request = %id, "close for unknown request");
            return false;
        };
        let mut guard = request.lock();
        if !guard.is_exported() {
            return false;
        }
        guard.close_backend();
        guard.unexport();
        true
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RequestState {
    exported: bool,
    for_save: bool,
    response: Option<ResponseCode>,
    results: Option<VarDict>,
    backend: Option<Box<dyn BackendRequest>>,
}

/// One in-flight file chooser operation.
pub struct Request {
    id: RequestId,
    app_id: String,
    state: Mutex<RequestState>,
    registry: Arc<RequestRegistry>,
}

impl Request {
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Acquires the request lock.
    ///
    /// Must not be held across an `.await` or handed to another thread.
    pub fn lock(self: &Arc<Self>) -> RequestGuard<'_> {
        RequestGuard {
            request: self,
            state: self.state.lock(),
        }
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        if !self.state.get_mut().exported {
            return;
        }
        warn!(request = %self.id, "request dropped while exported, withdrawing");
        self.registry
            .requests
            .remove_if(&self.id, |_, weak| weak.strong_count() == 0);
        self.registry.transport.unexport(&self.id);
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a request's mutable state.
pub struct RequestGuard<'a> {
    request: &'a Arc<Request>,
    state: MutexGuard<'a, RequestState>,
}

impl RequestGuard<'_> {
    /// A new strong reference to the locked request.
    #[must_use]
    pub fn request(&self) -> Arc<Request> {
        Arc::clone(self.request)
    }

    #[must_use]
    pub fn is_exported(&self) -> bool {
        self.state.exported
    }

    #[must_use]
    pub fn for_save(&self) -> bool {
        self.state.for_save
    }

    /// Marks the request as a save, so documents are registered for writing.
    pub fn set_for_save(&mut self) {
        self.state.for_save = true;
    }

    /// Attaches the backend-side handle used to forward cancellation.
    pub fn attach_backend(&mut self, handle: Box<dyn BackendRequest>) {
        self.state.backend = Some(handle);
    }

    /// Publishes the request so the client can address it.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::DuplicateRequest` if another live request
    /// already owns this path, or `PortalError::Export` if the transport
    /// refuses the export.
    pub fn export(&mut self) -> Result<(), PortalError> {
        if self.state.exported {
            return Ok(());
        }
        let request = self.request;
        let registry = &request.registry;

        let entry = registry.requests.entry(request.id.clone());
        if let Entry::Occupied(existing) = &entry {
            if existing.get().strong_count() > 0 {
                return Err(PortalError::DuplicateRequest {
                    id: request.id.to_string(),
                });
            }
        }
        entry.insert(Arc::downgrade(request));

        if let Err(e) = registry.transport.export(&request.id) {
            self.remove_from_registry();
            return Err(PortalError::Export(e));
        }

        self.state.exported = true;
        debug!(request = %request.id, "request exported");
        Ok(())
    }

    /// Withdraws the request. A no-op if it is not exported.
    pub fn unexport(&mut self) {
        if !self.state.exported {
            return;
        }
        self.state.exported = false;
        self.remove_from_registry();
        self.request.registry.transport.unexport(&self.request.id);
        debug!(request = %self.request.id, "request unexported");
    }

    /// Emits the `Response` signal. Has no effect unless exported.
    pub fn emit_response(&self, code: ResponseCode, payload: &ResponsePayload) {
        if !self.state.exported {
            return;
        }
        self.request
            .registry
            .transport
            .emit_response(&self.request.id, code.as_u32(), payload.to_vardict());
    }

    /// Stores the backend's answer for the assembly stage.
    pub fn record_completion(&mut self, code: ResponseCode, results: VarDict) {
        self.state.response = Some(code);
        self.state.results = Some(results);
    }

    /// Takes the stored backend answer. A request that never completed
    /// reads as `Other` with no results.
    pub fn take_completion(&mut self) -> (ResponseCode, VarDict) {
        (
            self.state.response.unwrap_or(ResponseCode::Other),
            self.state.results.take().unwrap_or_default(),
        )
    }

    /// Forwards cancellation to the backend-side handle, if one is attached.
    pub(crate) fn close_backend(&mut self) {
        if let Some(backend) = self.state.backend.take() {
            if let Err(e) = backend.close() {
                warn!(request = %self.request.id, error = %e, "failed to close backend request");
            }
        }
    }

    fn remove_from_registry(&self) {
        let ours = Arc::as_ptr(self.request);
        self.request
            .registry
            .requests
            .remove_if(&self.request.id, |_, weak| std::ptr::eq(weak.as_ptr(), ours));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
