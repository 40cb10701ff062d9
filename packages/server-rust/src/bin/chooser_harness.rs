//! Runs one file chooser request against in-memory collaborators and prints
//! the emitted `Response` as JSON.
//!
//! Useful for checking how a given option bag is validated, projected and
//! answered without a session bus.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chooser_core::{Value, VarDict};
use chooser_server::logging::{self, LogFormat};
use chooser_server::memory::{
    MemoryDocumentRegistry, RecordingTransport, ScriptedBackend, ScriptedReply,
};
use chooser_server::{CallerIdentity, ChooserConfig, FileChooser};
use clap::Parser;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "chooser-harness", about = "Exercise the file chooser mediator in-process")]
struct Args {
    /// JSON file holding the client option dictionary.
    #[arg(long)]
    options: Option<PathBuf>,

    /// Issue `SaveFile` instead of `OpenFile`.
    #[arg(long)]
    save: bool,

    /// Dialog title passed to the backend.
    #[arg(long, default_value = "Open File")]
    title: String,

    /// App id of the simulated caller.
    #[arg(long, default_value = "")]
    app_id: String,

    /// URI the simulated backend selects. Repeatable.
    #[arg(long = "select")]
    selected: Vec<String>,

    /// URI whose document registration fails. Repeatable.
    #[arg(long = "fail-uri")]
    failing: Vec<String>,

    /// Response code the simulated backend answers with.
    #[arg(long, default_value_t = 0)]
    response_code: u32,

    /// Simulate a backend crash after dispatch.
    #[arg(long)]
    backend_fails: bool,

    /// Capacity of the assembly queue.
    #[arg(long, env = "CHOOSER_QUEUE_CAPACITY", default_value_t = 256)]
    queue_capacity: usize,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn load_options(path: Option<&PathBuf>) -> anyhow::Result<VarDict> {
    let Some(path) = path else {
        return Ok(VarDict::new());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.log_format, "info")?;

    let options = load_options(args.options.as_ref())?;

    let backend = Arc::new(ScriptedBackend::new());
    if args.backend_fails {
        backend.push(ScriptedReply::Fail("simulated backend failure".to_string()));
    } else {
        let mut results = VarDict::new();
        results.insert("uris".to_string(), Value::str_array(args.selected.iter().cloned()));
        backend.push(ScriptedReply::Reply(args.response_code, results));
    }

    let documents = Arc::new(MemoryDocumentRegistry::new());
    for uri in &args.failing {
        documents.fail_for(uri.clone());
    }
    let transport = Arc::new(RecordingTransport::new());

    let config = ChooserConfig {
        assembly_queue_capacity: args.queue_capacity.max(1),
        ..ChooserConfig::default()
    };
    let mut chooser = FileChooser::new(&config, backend.clone(), documents, transport.clone());

    let caller = CallerIdentity {
        sender: ":1.1".to_string(),
        app_id: Some(args.app_id.clone()),
    };
    let id = if args.save {
        chooser.save_file(&caller, "", &args.title, &options)?
    } else {
        chooser.open_file(&caller, "", &args.title, &options)?
    };
    info!(request = %id, "request dispatched");

    let responses = tokio::time::timeout(Duration::from_secs(10), transport.wait_for_responses(1))
        .await
        .context("no response within 10s")?;
    let forwarded = backend
        .calls()
        .into_iter()
        .next()
        .map(|(_, call)| call.options)
        .unwrap_or_default();

    let report = serde_json::json!({
        "forwarded_options": forwarded,
        "response": responses[0],
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    chooser.shutdown().await;
    Ok(())
}
