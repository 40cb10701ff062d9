//! Backend bridge: forwards a sanitized call to the backend without blocking
//! the caller, and hands the outcome to the assembly worker.

use std::sync::Arc;

use chooser_core::{OptionKey, ResponseCode, VarDict, OPEN_FILE_OPTIONS, SAVE_FILE_OPTIONS};
use tokio::runtime::Handle;
use tracing::{info_span, warn, Instrument};

use crate::request::{Request, RequestGuard};
use crate::traits::{BackendCall, BackendReply, FileChooserBackend};
use crate::worker::WorkerHandle;

/// The two file chooser operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChooserOperation {
    OpenFile,
    SaveFile,
}

impl ChooserOperation {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::OpenFile => "OpenFile",
            Self::SaveFile => "SaveFile",
        }
    }

    /// Options this operation forwards to the backend.
    #[must_use]
    pub fn schema(self) -> &'static [OptionKey] {
        match self {
            Self::OpenFile => OPEN_FILE_OPTIONS,
            Self::SaveFile => SAVE_FILE_OPTIONS,
        }
    }
}

/// Dispatches operations to the backend and routes completions to assembly.
pub struct BackendBridge {
    backend: Arc<dyn FileChooserBackend>,
    assembly: WorkerHandle<Arc<Request>>,
    runtime: Handle,
}

impl BackendBridge {
    #[must_use]
    pub fn new(
        backend: Arc<dyn FileChooserBackend>,
        assembly: WorkerHandle<Arc<Request>>,
        runtime: Handle,
    ) -> Self {
        Self {
            backend,
            assembly,
            runtime,
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn FileChooserBackend> {
        &self.backend
    }

    /// Starts the backend call for the locked request and returns at once.
    ///
    /// Save operations mark the request `for_save` first. The backend call
    /// runs on its own task with no timeout; it never holds the request lock.
    pub fn dispatch(&self, guard: &mut RequestGuard<'_>, operation: ChooserOperation, call: BackendCall) {
        if operation == ChooserOperation::SaveFile {
            guard.set_for_save();
        }

        let request = guard.request();
        let backend = Arc::clone(&self.backend);
        let assembly = self.assembly.clone();
        let span = info_span!("backend_call", request = %request.id(), method = operation.name());

        self.runtime.spawn(
            async move {
                let reply = match operation {
                    ChooserOperation::OpenFile => backend.open_file(call).await,
                    ChooserOperation::SaveFile => backend.save_file(call).await,
                };
                complete(&request, reply);

                if let Err(e) = assembly.submit(Arc::clone(&request)).await {
                    warn!(error = %e, "assembly worker gone, dropping response");
                    request.lock().unexport();
                }
            }
            .instrument(span),
        );
    }
}

/// Records a backend outcome on the request. A failed call becomes code 2
/// with no results; the client only ever sees a `Response`.
fn complete(request: &Arc<Request>, reply: anyhow::Result<BackendReply>) {
    let (code, results) = match reply {
        Ok((raw, results)) => (ResponseCode::from_raw(raw), results),
        Err(e) => {
            warn!(error = %e, "backend call failed");
            (ResponseCode::Other, VarDict::new())
        }
    };
    request.lock().record_completion(code, results);
}

#[cfg(test)]
mod tests {
    use chooser_core::Value;

    use super::*;
    use crate::memory::RecordingTransport;
    use crate::request::{CallerIdentity, RequestRegistry};

    fn request() -> Arc<Request> {
        let registry = Arc::new(RequestRegistry::new(Arc::new(RecordingTransport::new()), "/r"));
        let caller = CallerIdentity {
            sender: ":1.3".to_string(),
            app_id: Some(String::new()),
        };
        registry.create(&caller, None).unwrap()
    }

    #[test]
    fn operation_schemas() {
        assert_eq!(ChooserOperation::OpenFile.schema(), OPEN_FILE_OPTIONS);
        assert_eq!(ChooserOperation::SaveFile.schema(), SAVE_FILE_OPTIONS);
        assert_eq!(ChooserOperation::SaveFile.name(), "SaveFile");
    }

    #[test]
    fn backend_failure_completes_as_other() {
        let request = request();
        complete(&request, Err(anyhow::anyhow!("connection reset")));
        let (code, results) = request.lock().take_completion();
        assert_eq!(code, ResponseCode::Other);
        assert!(results.is_empty());
    }

    #[test]
    fn backend_reply_is_recorded() {
        let request = request();
        let mut results = VarDict::new();
        results.insert("uris".to_string(), Value::str_array(["file:///a"]));
        complete(&request, Ok((0, results.clone())));
        assert_eq!(request.lock().take_completion(), (ResponseCode::Success, results));
    }

    #[test]
    fn unknown_backend_code_is_kept() {
        let request = request();
        complete(&request, Ok((9, VarDict::new())));
        assert_eq!(request.lock().take_completion().0, ResponseCode::Unrecognized(9));
    }
}
