pub mod config;
pub mod protocols;
pub mod reconcile;
pub mod sequence;
pub mod serve;
pub mod tools;

use anyhow::Context;
use chainpilot_core::config::Config;
use chainpilot_core::engine::{Collaborators, Engine};
use chainpilot_core::queue::TokioJobQueue;
use chainpilot_core::store::{MemorySequenceStore, RedbSequenceStore};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| format!("failed to load config from {}", path.display()))
}

/// Registries only: in-memory store, no reconcile worker.
pub fn catalogue_engine(config: Config) -> anyhow::Result<Engine> {
    let collaborators = Collaborators::with_store(&config, Arc::new(MemorySequenceStore::new()));
    let (queue, _jobs) = TokioJobQueue::new();
    let engine = Engine::assemble_with_queue(config, collaborators, Arc::new(queue), None)?;
    Ok(engine)
}

pub fn open_store(root: &Path, config: &Config) -> anyhow::Result<RedbSequenceStore> {
    let path = config.storage_path(root);
    RedbSequenceStore::open(&path)
        .with_context(|| format!("failed to open sequence store at {}", path.display()))
}

pub fn parse_id(raw: &str) -> anyhow::Result<Uuid> {
    raw.parse::<Uuid>()
        .with_context(|| format!("invalid sequence id: {raw}"))
}
