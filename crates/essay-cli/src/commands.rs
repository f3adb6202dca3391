//! CLI commands implementation

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use llm_core::{Config, Model, OllamaClient, SearchProvider};
use revision_loop::{
    CheckpointStore, FileCheckpointStore, LoopConfig, OllamaCompletion, OllamaQueries,
    RevisionLoop, Run, RunInput, WebSearch,
};
use tracing::debug;

use crate::progress::{self, Spinner};

// ANSI color codes
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Options for `essay run`
#[derive(Debug, Default)]
pub struct RunArgs {
    pub task: String,
    pub revision_number: Option<i64>,
    pub max_revisions: Option<i64>,
    pub model: Option<String>,
    pub search: Option<SearchProvider>,
    pub no_checkpoint: bool,
    pub json: bool,
}

/// Load essay.toml from an explicit path, or discover it, or use defaults
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => Config::load_from(p),
        None => Config::load_or_default(),
    }
}

async fn checkpoint_store(config: &Config) -> Result<FileCheckpointStore> {
    let store = match &config.checkpoints.dir {
        Some(dir) => FileCheckpointStore::with_dir(dir.clone()).await,
        None => FileCheckpointStore::new().await,
    };
    store.context("Failed to open run directory")
}

async fn ensure_ollama(config: &Config) -> Result<()> {
    let client = OllamaClient::new(config.ollama_url())?;
    if !client.health_check().await.unwrap_or(false) {
        anyhow::bail!("Ollama is not reachable at {}", config.ollama_url());
    }

    let available = client.list_models().await?;
    let missing = missing_models(&available, &[config.models.default.as_str(), config.researcher_model()]);
    if !missing.is_empty() {
        anyhow::bail!(
            "Model not pulled: {} (try: ollama pull {})",
            missing.join(", "),
            missing[0]
        );
    }
    Ok(())
}

/// Configured models that Ollama does not have, without duplicates
fn missing_models(available: &[Model], wanted: &[&str]) -> Vec<String> {
    let mut missing: Vec<String> = Vec::new();
    for name in wanted {
        if !available.iter().any(|m| m.matches(name)) && !missing.iter().any(|m| m == name) {
            missing.push(name.to_string());
        }
    }
    missing
}

/// Whether `essay run` saves checkpoints
fn run_checkpoints(config: &Config, no_checkpoint: bool) -> bool {
    config.checkpoints.enabled && !no_checkpoint
}

async fn build_loop(config: &Config, checkpoints: bool) -> Result<RevisionLoop> {
    let completion = OllamaCompletion::from_config(config)?;
    let queries = OllamaQueries::from_config(config)?;
    let search = WebSearch::from_config(config)?;
    debug!(
        model = %config.models.default,
        researcher = %config.researcher_model(),
        search = %search.provider(),
        "Collaborators ready"
    );

    let loop_config = LoopConfig::default()
        .with_max_queries(config.search.max_queries)
        .with_max_results(config.search.max_results);

    let mut driver = RevisionLoop::new(Arc::new(completion), Arc::new(queries), Arc::new(search))
        .with_config(loop_config);

    if checkpoints {
        let store = checkpoint_store(config).await?;
        debug!(dir = %store.base_dir().display(), "Checkpointing runs");
        driver = driver.with_checkpoints(Arc::new(store));
    }
    Ok(driver)
}

/// Draft an essay for a task
pub async fn run(config: Config, args: RunArgs) -> Result<()> {
    let mut config = config;
    if let Some(model) = args.model {
        config.models.default = model;
    }
    if let Some(provider) = args.search {
        config.search.provider = provider;
    }

    ensure_ollama(&config).await?;
    let driver = build_loop(&config, run_checkpoints(&config, args.no_checkpoint)).await?;

    let input = RunInput::new(args.task)
        .with_revision_number(args.revision_number.unwrap_or(config.revisions.revision_number))
        .with_max_revisions(args.max_revisions.unwrap_or(config.revisions.max_revisions));

    let run = driver.start(input).await?;
    if !args.json {
        println!("{}Run{} {}", BOLD, RESET, run.run_id());
    }
    drive(run, args.json).await
}

/// Continue a checkpointed run. The run store is opened even when
/// `checkpoints.enabled` is off, like the `runs` commands do.
pub async fn resume(config: Config, run_id: &str, json: bool) -> Result<()> {
    ensure_ollama(&config).await?;
    let driver = build_loop(&config, true).await?;
    let run = driver
        .resume(run_id)
        .await
        .with_context(|| format!("Failed to resume run {}", run_id))?;

    if !json {
        println!("{}Resuming{} {} at {}", BOLD, RESET, run.run_id(), run.stage());
    }
    drive(run, json).await
}

/// Step a run to Terminal, printing one line per transition
async fn drive(mut run: Run, json: bool) -> Result<()> {
    loop {
        let stage = run.stage();
        let mut spinner = (!json).then(|| {
            let mut s = Spinner::new(progress::stage_activity(stage, run.state().revision_number()));
            s.start();
            s
        });

        let result = run.step().await;
        if let Some(ref mut s) = spinner {
            s.stop().await;
        }

        match result {
            Ok(Some(snapshot)) => {
                if json {
                    println!("{}", serde_json::to_string(&snapshot)?);
                } else {
                    println!("{}", progress::snapshot_line(&snapshot));
                }
            }
            Ok(None) => break,
            Err(e) => {
                if !json {
                    progress::print_failure(stage, &e);
                    if let Some(hint) = resume_hint(run.run_id(), run.is_checkpointed()) {
                        println!("{}{}{}", DIM, hint, RESET);
                    }
                }
                return Err(e.into());
            }
        }
    }

    let outcome = run.finish().await?;
    if json {
        let output = serde_json::json!({
            "run_id": outcome.run_id,
            "revision_number": outcome.state.revision_number(),
            "drafting_passes": outcome.state.drafting_passes(),
            "draft": outcome.draft,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!();
        println!("{}", outcome.draft);
    }
    progress::flush_stdout();
    Ok(())
}

/// Only checkpointed runs can be picked up again
fn resume_hint(run_id: &str, checkpointed: bool) -> Option<String> {
    checkpointed.then(|| format!("Resume with: essay resume {}", run_id))
}

/// List checkpointed runs
pub async fn runs_list(config: Config) -> Result<()> {
    let store = checkpoint_store(&config).await?;
    let runs = store.list().await?;

    if runs.is_empty() {
        println!("No saved runs in {}", store.base_dir().display());
        return Ok(());
    }

    println!("{}Runs{}", BOLD, RESET);
    for run in &runs {
        println!("  {}", run.short_description());
    }
    Ok(())
}

/// Show the latest checkpoint of a run
pub async fn runs_show(config: Config, run_id: &str, json: bool) -> Result<()> {
    let store = checkpoint_store(&config).await?;
    let checkpoint = store
        .load(run_id)
        .await?
        .with_context(|| format!("Run not found: {}", run_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
        return Ok(());
    }

    let state = &checkpoint.state;
    println!("{}Run{} {}", BOLD, RESET, checkpoint.run_id);
    println!("  Task:     {}", state.task());
    println!("  Next:     {}", checkpoint.next);
    println!(
        "  Revision: {}/{} ({} drafting passes)",
        state.revision_number(),
        state.max_revisions(),
        state.drafting_passes()
    );
    println!("  Notes:    {}", state.research_notes().len());
    println!("  Updated:  {}", checkpoint.updated_at.format("%Y-%m-%d %H:%M:%S"));

    if let Some(ref critique) = state.critique {
        println!();
        println!("{}Latest critique{}", BOLD, RESET);
        println!("{}", critique);
    }
    if let Some(ref draft) = state.draft {
        println!();
        println!("{}Latest draft{}", BOLD, RESET);
        println!("{}", draft);
    }
    Ok(())
}

/// Delete a run
pub async fn runs_rm(config: Config, run_id: &str) -> Result<()> {
    let store = checkpoint_store(&config).await?;
    store.delete(run_id).await?;
    println!("Deleted run {}", run_id);
    Ok(())
}

/// Write a commented essay.toml
pub fn config_init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(llm_core::config::CONFIG_FILE_NAME));
    if path.exists() && !force {
        anyhow::bail!("Config file already exists: {} (use --force)", path.display());
    }

    std::fs::write(&path, Config::template())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Print the effective configuration
pub fn config_show(config: &Config) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render config")?;
    print!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_init_refuses_overwrite() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("essay.toml");

        config_init(Some(path.clone()), false).unwrap();
        assert!(config_init(Some(path.clone()), false).is_err());
        config_init(Some(path.clone()), true).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.search.max_queries, 3);
    }

    #[test]
    fn test_resume_hint_needs_checkpoints() {
        assert_eq!(
            resume_hint("abc", true).as_deref(),
            Some("Resume with: essay resume abc")
        );
        assert!(resume_hint("abc", false).is_none());
    }

    #[test]
    fn test_run_checkpoints_honours_flag_and_config() {
        let mut config = Config::default_minimal();
        assert!(run_checkpoints(&config, false));
        assert!(!run_checkpoints(&config, true));

        config.checkpoints.enabled = false;
        assert!(!run_checkpoints(&config, false));
    }

    #[tokio::test]
    async fn test_resume_store_opens_with_checkpoints_disabled() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default_minimal();
        config.checkpoints.enabled = false;
        config.checkpoints.dir = Some(dir.path().to_path_buf());

        let driver = build_loop(&config, true).await.unwrap();
        assert!(driver.has_checkpoints());

        let err = driver.resume("missing-run").await.err().expect("resume should fail");
        assert!(matches!(err, revision_loop::LoopError::RunNotFound(_)));
    }

    #[test]
    fn test_missing_models() {
        let available: Vec<Model> =
            serde_json::from_str(r#"[{"name": "llama3.2:latest"}, {"name": "qwen2.5:7b"}]"#).unwrap();

        assert!(missing_models(&available, &["llama3.2", "qwen2.5:7b"]).is_empty());
        assert_eq!(
            missing_models(&available, &["mistral", "mistral"]),
            vec!["mistral".to_string()]
        );
    }

    #[test]
    fn test_load_config_missing_path_errors() {
        assert!(load_config(Some(Path::new("/nonexistent/essay.toml"))).is_err());
    }
}
