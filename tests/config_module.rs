use sagecompass::config::{ConfigError, ConfigLayout, EngineSettings, FileLoader};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
    fs::write(path, contents).expect("write");
}

fn seed_agent(root: &Path) {
    write(
        root,
        "config/provider/openai.yaml",
        r#"
module: openai
class: ChatOpenAI
key_env: SAGE_TEST_OPENAI_KEY
defaults:
  model: gpt-4o-mini
  temperature: 0.2
"#,
    );
    write(
        root,
        "agents/problem_framing/config.yaml",
        "provider: openai\nparams:\n  temperature: 0.0\n",
    );
    write(root, "agents/problem_framing/system.prompt", "Frame {task_input}.\n");
}

#[test]
fn config_module_layout_paths_follow_convention() {
    let layout = ConfigLayout::new("/srv/sage");
    assert_eq!(
        layout.guardrails_path(),
        Path::new("/srv/sage/config/guardrails.yaml")
    );
    assert_eq!(
        layout.provider_path("openai"),
        Path::new("/srv/sage/config/provider/openai.yaml")
    );
    assert_eq!(
        layout.agent_file("ambiguity_scan", "system.prompt"),
        Path::new("/srv/sage/agents/ambiguity_scan/system.prompt")
    );
    assert_eq!(
        layout.context_dir("problem_framing"),
        Path::new("/srv/sage/context/problem_framing")
    );
}

#[test]
fn config_module_engine_settings_default_when_absent() {
    let dir = tempdir().expect("tempdir");
    let loader = FileLoader::new(dir.path());
    assert_eq!(loader.load_engine_settings().expect("settings"), EngineSettings::default());
    assert!(loader.load_guardrails_config().expect("guardrails").is_none());
}

#[test]
fn config_module_engine_settings_fill_defaults_and_validate() {
    let dir = tempdir().expect("tempdir");
    write(dir.path(), "config/engine.yaml", "max_rounds: 2\nhilp_enabled: true\n");
    let settings = FileLoader::new(dir.path())
        .load_engine_settings()
        .expect("settings");
    assert_eq!(settings.max_rounds, 2);
    assert!(settings.hilp_enabled);
    assert_eq!(settings.max_context_retrieval_rounds, 1);
    assert_eq!(settings.importance_threshold, 0.9);

    let dir = tempdir().expect("tempdir");
    write(dir.path(), "config/engine.yaml", "max_rounds: 0\n");
    assert!(matches!(
        FileLoader::new(dir.path()).load_engine_settings(),
        Err(ConfigError::Settings(_))
    ));

    let dir = tempdir().expect("tempdir");
    write(dir.path(), "config/engine.yaml", "max_round: 2\n");
    assert!(matches!(
        FileLoader::new(dir.path()).load_engine_settings(),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn config_module_resolves_provider_with_agent_overrides() {
    let dir = tempdir().expect("tempdir");
    seed_agent(dir.path());
    let loader = FileLoader::new(dir.path());

    let resolved = loader
        .resolve_agent_model_with_env("problem_framing", |name| {
            (name == "SAGE_TEST_OPENAI_KEY").then(|| "sk-test".to_string())
        })
        .expect("resolved");
    assert_eq!(resolved.provider_name, "openai");
    assert_eq!(resolved.api_key, "sk-test");
    assert_eq!(resolved.params["model"], serde_json::json!("gpt-4o-mini"));
    assert_eq!(resolved.params["temperature"], serde_json::json!(0.0));
}

#[test]
fn config_module_missing_api_key_names_the_variable() {
    let dir = tempdir().expect("tempdir");
    seed_agent(dir.path());
    let err = FileLoader::new(dir.path())
        .resolve_agent_model_with_env("problem_framing", |_| Some("  ".to_string()))
        .expect_err("blank key");
    match err {
        ConfigError::MissingApiKey { provider, env } => {
            assert_eq!(provider, "openai");
            assert_eq!(env, "SAGE_TEST_OPENAI_KEY");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn config_module_missing_agent_config_is_reported() {
    let dir = tempdir().expect("tempdir");
    let err = FileLoader::new(dir.path())
        .resolve_agent_model_with_env("ambiguity_scan", |_| None)
        .expect_err("missing config");
    assert!(matches!(err, ConfigError::MissingFile { .. }));
}

#[test]
fn config_module_caches_file_reads() {
    let dir = tempdir().expect("tempdir");
    seed_agent(dir.path());
    let loader = FileLoader::new(dir.path());

    let first = loader.load_agent_prompts("problem_framing").expect("prompts");
    let cached = loader.cached_file_count();
    write(dir.path(), "agents/problem_framing/system.prompt", "Changed on disk.\n");
    let second = loader.load_agent_prompts("problem_framing").expect("prompts");

    assert_eq!(first, second);
    assert_eq!(second.system, "Frame {task_input}.\n");
    assert_eq!(loader.cached_file_count(), cached);
}

#[test]
fn config_module_few_shots_require_examples() {
    let dir = tempdir().expect("tempdir");
    seed_agent(dir.path());
    write(
        dir.path(),
        "agents/problem_framing/few-shots.prompt",
        "Input: {task_input}\nOutput: {output}",
    );
    let err = FileLoader::new(dir.path())
        .load_agent_prompts("problem_framing")
        .expect_err("examples missing");
    assert!(matches!(err, ConfigError::Prompt { .. }));

    let dir = tempdir().expect("tempdir");
    assert!(matches!(
        FileLoader::new(dir.path()).load_agent_prompts("problem_framing"),
        Err(ConfigError::MissingFile { .. })
    ));
}

#[test]
fn config_module_loads_context_documents_sorted_by_key() {
    let dir = tempdir().expect("tempdir");
    write(dir.path(), "context/problem_framing/retail_churn.md", "Churn notes.");
    write(dir.path(), "context/problem_framing/a-pricing.txt", "Pricing notes.");
    write(dir.path(), "context/problem_framing/ignored.json", "{}");
    let loader = FileLoader::new(dir.path());

    let docs = loader
        .load_context_documents("problem_framing")
        .expect("documents");
    let keys: Vec<&str> = docs.iter().map(|(key, _)| key.as_str()).collect();
    assert_eq!(keys, vec!["a-pricing", "retail_churn"]);
    assert_eq!(docs[1].1.title, "retail churn");
    assert_eq!(docs[1].1.agents, vec!["problem_framing".to_string()]);

    assert!(loader
        .load_context_documents("goals_kpis")
        .expect("missing dir")
        .is_empty());
}

#[test]
fn config_module_shipped_resources_are_consistent() {
    let loader = FileLoader::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("resources"));
    assert_eq!(loader.load_engine_settings().expect("settings"), EngineSettings::default());
    let guardrails = loader
        .load_guardrails_config()
        .expect("guardrails")
        .expect("guardrails file");
    assert!(guardrails.allowed_topics().iter().any(|topic| topic == "churn"));
    for agent in ["problem_framing", "ambiguity_scan", "ambiguity_clarification"] {
        loader.load_agent_prompts(agent).expect("prompts");
        loader
            .resolve_agent_model_with_env(agent, |_| Some("sk-test".to_string()))
            .expect("model config");
    }
    assert!(!loader
        .load_context_documents("problem_framing")
        .expect("context")
        .is_empty());
}
