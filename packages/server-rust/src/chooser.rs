//! The `FileChooser` portal front: entry points for `OpenFile`, `SaveFile`
//! and request cancellation.
//!
//! Each call runs validate → project → create + export → dispatch under the
//! request lock and returns the request handle immediately. The result
//! arrives later as a `Response` signal on that handle.

use std::sync::Arc;

use chooser_core::{project_options, validate_options, Value, VarDict};
use tracing::{debug, info_span};

use crate::assembler::ResponseAssembler;
use crate::bridge::{BackendBridge, ChooserOperation};
use crate::config::ChooserConfig;
use crate::error::PortalError;
use crate::request::{CallerIdentity, RequestId, RequestRegistry};
use crate::traits::{BackendCall, DocumentRegistry, FileChooserBackend, RequestTransport};
use crate::worker::BackgroundWorker;

/// Option carrying the client-chosen request token. Never forwarded.
const HANDLE_TOKEN_KEY: &str = "handle_token";

/// Mediates file chooser calls between untrusted clients and the backend.
pub struct FileChooser {
    registry: Arc<RequestRegistry>,
    bridge: BackendBridge,
    worker: BackgroundWorker<ResponseAssembler>,
}

impl FileChooser {
    /// Wires the mediator to its collaborators and starts the assembly worker.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, or if
    /// `config.assembly_queue_capacity` is zero.
    pub fn new(
        config: &ChooserConfig,
        backend: Arc<dyn FileChooserBackend>,
        documents: Arc<dyn DocumentRegistry>,
        transport: Arc<dyn RequestTransport>,
    ) -> Self {
        let registry = Arc::new(RequestRegistry::new(
            transport,
            config.request_path_prefix.clone(),
        ));
        let worker = BackgroundWorker::start(
            ResponseAssembler::new(documents),
            config.assembly_queue_capacity,
        );
        let assembly = worker
            .handle()
            .expect("freshly started worker has a handle");
        let bridge = BackendBridge::new(backend, assembly, tokio::runtime::Handle::current());

        Self {
            registry,
            bridge,
            worker,
        }
    }

    /// Handles `OpenFile`.
    ///
    /// # Errors
    ///
    /// See [`FileChooser::save_file`].
    pub fn open_file(
        &self,
        caller: &CallerIdentity,
        parent_window: &str,
        title: &str,
        options: &VarDict,
    ) -> Result<RequestId, PortalError> {
        self.handle(ChooserOperation::OpenFile, caller, parent_window, title, options)
    }

    /// Handles `SaveFile`.
    ///
    /// # Errors
    ///
    /// Returns `PortalError::InvalidArgument` for malformed filters or
    /// choices, `PortalError::AppIdUnavailable` if the caller cannot be
    /// identified, `PortalError::Backend` if the backend cannot be reached,
    /// and `PortalError::Export`/`DuplicateRequest` if the handle cannot be
    /// published. In every error case nothing reaches the backend.
    pub fn save_file(
        &self,
        caller: &CallerIdentity,
        parent_window: &str,
        title: &str,
        options: &VarDict,
    ) -> Result<RequestId, PortalError> {
        self.handle(ChooserOperation::SaveFile, caller, parent_window, title, options)
    }

    /// Handles an external `Close` on a request handle.
    ///
    /// Returns `false` if the handle is not (or no longer) exported.
    pub fn close_request(&self, id: &RequestId) -> bool {
        self.registry.close(id)
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.registry.count()
    }

    /// Stops the assembly worker.
    ///
    /// The assembly in progress finishes and emits its response. Requests
    /// queued behind it are unexported without a response, and requests still
    /// waiting on the backend are unexported when their call completes.
    pub async fn shutdown(&mut self) {
        self.worker.stop().await;
    }

    fn handle(
        &self,
        operation: ChooserOperation,
        caller: &CallerIdentity,
        parent_window: &str,
        title: &str,
        options: &VarDict,
    ) -> Result<RequestId, PortalError> {
        let span = info_span!("file_chooser", method = operation.name(), sender = %caller.sender);
        let _enter = span.enter();

        let token = options.get(HANDLE_TOKEN_KEY).and_then(Value::as_str);
        let request = self.registry.create(caller, token)?;
        let mut guard = request.lock();

        if let Err(e) = validate_options(options) {
            debug!(error = %e, "rejecting options");
            return Err(e.into());
        }
        let projected = project_options(options, operation.schema());

        let backend_request = self
            .bridge
            .backend()
            .create_request(request.id())
            .map_err(PortalError::Backend)?;
        guard.attach_backend(backend_request);
        if let Err(e) = guard.export() {
            guard.close_backend();
            return Err(e);
        }

        let call = BackendCall {
            request_id: request.id().clone(),
            app_id: request.app_id().to_string(),
            parent_window: parent_window.to_string(),
            title: title.to_string(),
            options: projected,
        };
        self.bridge.dispatch(&mut guard, operation, call);

        Ok(request.id().clone())
    }
}
