use sagecompass::config::FileLoader;
use sagecompass::evidence::{phase_namespace, EvidenceStore, InMemoryStore};
use sagecompass::graph::{assemble_from_files, AssemblyError};
use sagecompass::phases::PROBLEM_FRAMING;
use sagecompass::provider::{ChatModel, HttpChatModel};
use sagecompass::state::Message;
use std::sync::Arc;

const USAGE: &str = "usage: sagecompass <config_dir> <question...>";

fn http_model(loader: &FileLoader, agent: &str) -> Result<Arc<dyn ChatModel>, AssemblyError> {
    let resolved = loader.resolve_agent_model(agent)?;
    let model = HttpChatModel::new(resolved.kind, resolved.api_key, resolved.params)?;
    Ok(Arc::new(model))
}

fn seeded_store(loader: &FileLoader) -> Result<Arc<dyn EvidenceStore>, String> {
    let store = InMemoryStore::new();
    let namespace = phase_namespace(PROBLEM_FRAMING);
    for (key, value) in loader
        .load_context_documents(PROBLEM_FRAMING)
        .map_err(|err| err.to_string())?
    {
        store
            .put(&namespace, &key, value)
            .map_err(|err| err.to_string())?;
    }
    Ok(Arc::new(store))
}

fn run() -> Result<(), String> {
    let mut args = std::env::args().skip(1);
    let config_dir = args.next().ok_or_else(|| USAGE.to_string())?;
    let question = args.collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        return Err(USAGE.to_string());
    }

    let loader = FileLoader::new(config_dir);
    let store = seeded_store(&loader)?;
    let graph = assemble_from_files(&loader, |agent| http_model(&loader, agent), Some(store))
        .map_err(|err| err.to_string())?;

    let outcome = graph
        .invoke(None, vec![Message::human(question)])
        .map_err(|err| err.to_string())?;
    for reply in outcome.replies() {
        println!("{reply}");
    }
    for (name, entry) in &outcome.state.phases {
        if entry.is_complete() {
            let data = serde_json::to_string_pretty(&entry.data).map_err(|err| err.to_string())?;
            println!("\n[{name}]\n{data}");
        }
    }
    println!("\nthread: {}  status: {}", outcome.thread_id, outcome.status);
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
