use crate::output::{print_json, print_table};
use std::path::Path;

use super::{catalogue_engine, load_config};

pub fn run(config_path: &Path, describe: bool, json: bool) -> anyhow::Result<()> {
    let engine = catalogue_engine(load_config(config_path)?)?;

    if describe {
        print!("{}", engine.describe_protocols());
        return Ok(());
    }

    let summaries = engine.protocols.summaries();
    if json {
        return print_json(&summaries);
    }

    let rows = summaries
        .iter()
        .map(|s| {
            let actions = s
                .actions
                .iter()
                .map(|a| {
                    if a.is_default {
                        format!("{}*", a.action)
                    } else {
                        a.action.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            let chains = s
                .metadata
                .supported_chains
                .iter()
                .map(|id| engine.chains.label(*id))
                .collect::<Vec<_>>()
                .join(", ");
            vec![s.metadata.name.clone(), actions, chains]
        })
        .collect();
    print_table(&["PROTOCOL", "ACTIONS", "CHAINS"], rows);
    println!("\n* default protocol for the action");
    Ok(())
}
