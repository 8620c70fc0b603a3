use crate::output::print_json;
use chainpilot_core::engine::Engine;
use std::path::Path;

use super::{load_config, parse_id};

/// One reconcile pass, run in the foreground.
pub fn run(root: &Path, config_path: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    let config = load_config(config_path)?;
    let root = root.to_path_buf();

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async move {
        let engine = Engine::from_config(config, &root)?;
        engine.reconcile(id).await
    })?;

    if json {
        return print_json(&report);
    }
    println!(
        "Sequence {}: {} confirmed, {} failed, {} still outstanding",
        report.sequence_id, report.confirmed, report.failed, report.outstanding
    );
    if report.outstanding > 0 {
        println!("Outstanding transactions are re-checked by a running `chainpilot serve`.");
    }
    Ok(())
}
