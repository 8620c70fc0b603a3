use crate::output::{print_json, print_table};
use chainpilot_core::sequence::StoredSequence;
use chainpilot_core::store::SequenceStore;
use chainpilot_core::types::TransactionStatus;
use clap::Subcommand;
use std::path::Path;

use super::{load_config, open_store, parse_id};

#[derive(Subcommand)]
pub enum SequenceSubcommand {
    /// List stored sequences, newest first
    List {
        /// Only sequences owned by this user
        #[arg(long)]
        user: Option<String>,
    },

    /// Show one sequence with its transactions
    Show {
        /// Sequence id
        id: String,
    },

    /// Delete a stored sequence
    Delete {
        /// Sequence id
        id: String,
    },
}

pub fn run(
    root: &Path,
    config_path: &Path,
    subcmd: SequenceSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(root, &config)?;
    match subcmd {
        SequenceSubcommand::List { user } => list(&store, user.as_deref(), json),
        SequenceSubcommand::Show { id } => show(&store, &id, json),
        SequenceSubcommand::Delete { id } => delete(&store, &id, json),
    }
}

/// One word for the whole sequence, as shown in listings.
fn overall_status(sequence: &StoredSequence) -> &'static str {
    if sequence.has_failed() {
        "FAILED"
    } else if sequence.all_terminal() {
        "CONFIRMED"
    } else if sequence.has_ongoing() {
        "IN_FLIGHT"
    } else {
        "READY"
    }
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn list(store: &dyn SequenceStore, user: Option<&str>, json: bool) -> anyhow::Result<()> {
    let sequences = match user {
        Some(user) => store.list_by_user(user)?,
        None => store.list()?,
    };

    if json {
        return print_json(&sequences);
    }
    if sequences.is_empty() {
        println!("No sequences.");
        return Ok(());
    }

    let rows = sequences
        .iter()
        .map(|s| {
            vec![
                s.id.to_string(),
                s.user_id.clone(),
                s.actions.len().to_string(),
                overall_status(s).to_string(),
                s.created_at.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "USER", "ACTIONS", "STATUS", "CREATED"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(store: &dyn SequenceStore, id: &str, json: bool) -> anyhow::Result<()> {
    let sequence = store.get(parse_id(id)?)?;

    if json {
        return print_json(&sequence);
    }

    println!("Sequence: {}", sequence.id);
    println!("User:     {}", sequence.user_id);
    println!("Status:   {}", overall_status(&sequence));
    println!("Created:  {}", sequence.created_at.to_rfc3339());
    for (n, stored) in sequence.actions.iter().enumerate() {
        let action = &stored.action;
        println!(
            "\n{}. {} [{} via {} on chain {}] {}",
            n + 1,
            stored.description,
            action.kind,
            action.protocol,
            action.chain_id,
            action.status
        );
        for (index, tx) in action.transactions.iter().enumerate() {
            let mut line = format!("   tx {index}: {}", tx.status);
            if let Some(hash) = tx.hash {
                line.push_str(&format!(" {hash}"));
            }
            if tx.status == TransactionStatus::Failed {
                if let Some(message) = &tx.message {
                    line.push_str(&format!(" ({message})"));
                }
            }
            println!("{line}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// delete
// ---------------------------------------------------------------------------

fn delete(store: &dyn SequenceStore, id: &str, json: bool) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    if !store.delete(id)? {
        anyhow::bail!("sequence not found: {id}");
    }
    if json {
        print_json(&serde_json::json!({ "deleted": id }))
    } else {
        println!("Deleted sequence {id}");
        Ok(())
    }
}
