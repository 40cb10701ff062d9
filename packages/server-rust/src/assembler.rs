//! Response assembly: turns a finished backend call into the client's `Response`.
//!
//! Runs on the assembly worker. Document registration may block, so each
//! request is assembled inside `spawn_blocking` while holding its lock.

use std::sync::Arc;

use async_trait::async_trait;
use chooser_core::options::selected_choices_type;
use chooser_core::{ResponseCode, ResponsePayload, Value, ValueType, VarDict};
use tracing::{debug, warn};

use crate::request::Request;
use crate::traits::DocumentRegistry;
use crate::worker::BackgroundRunnable;

/// Assembly-worker runnable: one task per completed request.
pub struct ResponseAssembler {
    documents: Arc<dyn DocumentRegistry>,
}

impl ResponseAssembler {
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentRegistry>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl BackgroundRunnable for ResponseAssembler {
    type Task = Arc<Request>;

    async fn run(&mut self, request: Arc<Request>) {
        let documents = Arc::clone(&self.documents);
        let id = request.id().clone();
        let joined =
            tokio::task::spawn_blocking(move || assemble(&request, documents.as_ref())).await;
        if let Err(e) = joined {
            warn!(request = %id, error = %e, "response assembly panicked");
        }
    }

    /// A request still queued at shutdown never gets a payload; it is
    /// withdrawn so the client sees the handle go away.
    async fn discard(&mut self, request: Arc<Request>) {
        debug!(request = %request.id(), "assembly stopped, withdrawing request");
        request.lock().unexport();
    }
}

/// Builds the response for a completed request and emits it if the request
/// is still exported.
///
/// Holds the request lock for the whole assembly.
pub fn assemble(request: &Arc<Request>, documents: &dyn DocumentRegistry) {
    let mut guard = request.lock();
    let for_save = guard.for_save();
    let (code, results) = guard.take_completion();

    let payload = if code == ResponseCode::Success {
        build_payload(request, &results, for_save, documents)
    } else {
        ResponsePayload::default()
    };

    if guard.is_exported() {
        guard.emit_response(code, &payload);
        guard.unexport();
    } else {
        debug!(request = %request.id(), "request closed before response, discarding");
    }
}

fn typed<'a>(results: &'a VarDict, key: &str, expected: &ValueType) -> Option<&'a Value> {
    results
        .get(key)
        .filter(|value| &value.value_type() == expected)
}

fn build_payload(
    request: &Request,
    results: &VarDict,
    for_save: bool,
    documents: &dyn DocumentRegistry,
) -> ResponsePayload {
    let writable = results
        .get("writable")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let choices = typed(results, "choices", &selected_choices_type()).cloned();

    let uris = typed(results, "uris", &ValueType::array_of(ValueType::Str))
        .and_then(Value::as_items)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|uri| {
            match documents.register(uri, request.app_id(), for_save, writable) {
                Ok(document) => {
                    debug!(request = %request.id(), uri, document = %document, "converted uri");
                    Some(document)
                }
                Err(e) => {
                    warn!(request = %request.id(), uri, error = %e, "failed to register document");
                    None
                }
            }
        })
        .collect();

    ResponsePayload { uris, choices }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDocumentRegistry, RecordingTransport, Registration};
    use crate::request::{CallerIdentity, RequestRegistry};

    fn setup() -> (Arc<Request>, Arc<RecordingTransport>, MemoryDocumentRegistry) {
        let transport = Arc::new(RecordingTransport::new());
        let registry = Arc::new(RequestRegistry::new(transport.clone(), "/r"));
        let caller = CallerIdentity {
            sender: ":1.7".to_string(),
            app_id: Some("org.example.Editor".to_string()),
        };
        let request = registry.create(&caller, Some("t1")).unwrap();
        request.lock().export().unwrap();
        (request, transport, MemoryDocumentRegistry::new())
    }

    fn results(uris: &[&str]) -> VarDict {
        let mut results = VarDict::new();
        results.insert("uris".to_string(), Value::str_array(uris.iter().copied()));
        results
    }

    fn uris_of(results: &VarDict) -> Vec<String> {
        results["uris"]
            .as_items()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn failed_registration_drops_only_that_uri() {
        let (request, transport, docs) = setup();
        docs.fail_for("file:///home/u/b.txt");
        request.lock().record_completion(
            ResponseCode::Success,
            results(&["file:///home/u/a.txt", "file:///home/u/b.txt", "file:///home/u/c.txt"]),
        );

        assemble(&request, &docs);

        let responses = transport.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].code, 0);
        assert_eq!(
            uris_of(&responses[0].results),
            vec!["file:///run/user/doc/1/a.txt", "file:///run/user/doc/2/c.txt"]
        );
        assert_eq!(docs.registrations().len(), 3);
        assert!(!request.lock().is_exported());
    }

    #[test]
    fn non_success_skips_registration() {
        let (request, transport, docs) = setup();
        request
            .lock()
            .record_completion(ResponseCode::Cancelled, results(&["file:///home/u/a.txt"]));

        assemble(&request, &docs);

        assert!(docs.registrations().is_empty());
        let responses = transport.responses();
        assert_eq!(responses[0].code, 1);
        assert!(uris_of(&responses[0].results).is_empty());
        assert!(!responses[0].results.contains_key("choices"));
    }

    #[test]
    fn writable_and_for_save_reach_registry() {
        let (request, _, docs) = setup();
        let mut answer = results(&["file:///home/u/new.txt"]);
        answer.insert("writable".to_string(), Value::Bool(true));
        {
            let mut guard = request.lock();
            guard.set_for_save();
            guard.record_completion(ResponseCode::Success, answer);
        }

        assemble(&request, &docs);

        assert_eq!(
            docs.registrations(),
            vec![Registration {
                uri: "file:///home/u/new.txt".to_string(),
                app_id: "org.example.Editor".to_string(),
                for_save: true,
                writable: true,
            }]
        );
    }

    #[test]
    fn mistyped_writable_defaults_to_false() {
        let (request, _, docs) = setup();
        let mut answer = results(&["file:///home/u/a.txt"]);
        answer.insert("writable".to_string(), Value::from("true"));
        request.lock().record_completion(ResponseCode::Success, answer);

        assemble(&request, &docs);

        assert!(!docs.registrations()[0].writable);
    }

    #[test]
    fn selected_choices_are_copied_through() {
        let (request, transport, docs) = setup();
        let selected = Value::array(
            ValueType::Struct(vec![ValueType::Str, ValueType::Str]),
            vec![Value::Struct(vec![Value::from("encoding"), Value::from("latin1")])],
        )
        .unwrap();
        let mut answer = results(&[]);
        answer.insert("choices".to_string(), selected.clone());
        request.lock().record_completion(ResponseCode::Success, answer);

        assemble(&request, &docs);

        assert_eq!(transport.responses()[0].results.get("choices"), Some(&selected));
    }

    #[test]
    fn closed_request_discards_payload() {
        let (request, transport, docs) = setup();
        request
            .lock()
            .record_completion(ResponseCode::Success, results(&["file:///home/u/a.txt"]));
        request.lock().unexport();

        assemble(&request, &docs);

        assert!(transport.responses().is_empty());
        assert_eq!(transport.unexported().len(), 1);
    }

    #[tokio::test]
    async fn runnable_assembles_on_blocking_pool() {
        let (request, transport, docs) = setup();
        request
            .lock()
            .record_completion(ResponseCode::Success, results(&["file:///home/u/a.txt"]));

        let mut assembler = ResponseAssembler::new(Arc::new(docs));
        assembler.run(Arc::clone(&request)).await;

        assert_eq!(uris_of(&transport.responses()[0].results).len(), 1);
    }

    #[tokio::test]
    async fn discarded_request_is_unexported_without_response() {
        let (request, transport, docs) = setup();
        request
            .lock()
            .record_completion(ResponseCode::Success, results(&["file:///home/u/a.txt"]));

        let mut assembler = ResponseAssembler::new(Arc::new(docs));
        assembler.discard(Arc::clone(&request)).await;

        assert!(transport.responses().is_empty());
        assert_eq!(transport.unexported(), vec![request.id().clone()]);
        assert!(!request.lock().is_exported());
    }
}
