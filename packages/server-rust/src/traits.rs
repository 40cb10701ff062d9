use async_trait::async_trait;
use chooser_core::VarDict;

use crate::request::RequestId;

/// Arguments forwarded to the backend for one open or save call.
///
/// `options` has already been projected through the operation's allow-list.
#[derive(Debug, Clone)]
pub struct BackendCall {
    pub request_id: RequestId,
    pub app_id: String,
    pub parent_window: String,
    pub title: String,
    pub options: VarDict,
}

/// Raw backend answer: response code and result dictionary.
pub type BackendReply = (u32, VarDict);

/// The privileged, out-of-process file chooser implementation.
#[async_trait]
pub trait FileChooserBackend: Send + Sync {
    /// Creates the backend-side counterpart of a request so it can later be
    /// closed. Failing here means the backend cannot be reached at all.
    fn create_request(&self, request_id: &RequestId) -> anyhow::Result<Box<dyn BackendRequest>>;

    /// Shows an open dialog. Completes when the user is done; never times out.
    async fn open_file(&self, call: BackendCall) -> anyhow::Result<BackendReply>;

    /// Shows a save dialog. Completes when the user is done; never times out.
    async fn save_file(&self, call: BackendCall) -> anyhow::Result<BackendReply>;
}

/// Backend-side handle of one request.
pub trait BackendRequest: Send + Sync {
    /// Asks the backend to dismiss its dialog.
    fn close(&self) -> anyhow::Result<()>;
}

/// Converts a real file URI into a sandbox-safe document URI.
///
/// Registration may perform blocking I/O and is only ever called from the
/// assembly worker's blocking context.
pub trait DocumentRegistry: Send + Sync {
    /// Registers `uri` for `app_id`. `for_save` marks a file that may not
    /// exist yet; `writable` grants write access to the exported document.
    fn register(&self, uri: &str, app_id: &str, for_save: bool, writable: bool) -> anyhow::Result<String>;
}

/// The bus-facing side of a request: publication and the `Response` signal.
pub trait RequestTransport: Send + Sync {
    /// Publishes the request object so the client can address it.
    fn export(&self, id: &RequestId) -> anyhow::Result<()>;

    /// Withdraws the request object.
    fn unexport(&self, id: &RequestId);

    /// Emits the terminal `Response` signal on the request object.
    fn emit_response(&self, id: &RequestId, code: u32, results: VarDict);
}
