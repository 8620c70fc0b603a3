use crate::output::{print_json, print_table};
use std::path::Path;

use super::{catalogue_engine, load_config};

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let engine = catalogue_engine(load_config(config_path)?)?;
    let tools = engine.tools.get_all();

    if json {
        return print_json(&tools);
    }
    let rows = tools
        .into_iter()
        .map(|t| vec![t.name, t.description])
        .collect();
    print_table(&["TOOL", "DESCRIPTION"], rows);
    Ok(())
}
