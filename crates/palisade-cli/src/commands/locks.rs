//! Locks command implementation.

use std::io::Write;

use clap::Subcommand;
use palisade_security::{FileLockStore, Lock, LockStore, LockTable, LockType};
use tracing::info;

use crate::cli::CommandContext;
use crate::error::CliError;
use crate::output::{write_structured, write_table};

#[derive(Debug, Subcommand)]
pub enum LocksCommand {
    /// List persisted locks
    List {
        /// Only locks at or below this folder
        #[arg(long, default_value = "/")]
        folder: String,
    },
    /// Remove persisted locks. Only run this while the engine is stopped.
    Clear {
        /// Only drop temporary locks
        #[arg(long)]
        temporary_only: bool,
        /// Confirm the removal
        #[arg(long)]
        yes: bool,
    },
}

impl LocksCommand {
    pub fn execute(&self, ctx: &CommandContext, out: &mut dyn Write) -> Result<(), CliError> {
        let path = ctx.lock_store_path();
        let store = FileLockStore::new(&path);
        let target = path.display().to_string();
        let stored = store.load().map_err(|e| CliError::lock_store(&target, e))?;

        match self {
            Self::List { folder } => {
                let table = LockTable::new();
                table.restore(stored);
                let locks = table.locked_resources(folder);
                if !write_structured(out, ctx.format, &locks)? {
                    write_table(out, &["PATH", "TYPE", "OWNER", "PROJECT"], &rows(&locks))?;
                }
            }
            Self::Clear { temporary_only, yes } => {
                if !yes {
                    return Err(CliError::Validation(
                        "refusing to clear locks without --yes".to_string(),
                    ));
                }
                let before = stored.len();
                let kept: Vec<Lock> = if *temporary_only {
                    stored
                        .into_iter()
                        .filter(|l| l.lock_type != LockType::Temporary)
                        .collect()
                } else {
                    Vec::new()
                };
                store.save(&kept).map_err(|e| CliError::lock_store(&target, e))?;
                let removed = before - kept.len();
                info!(store = %target, removed, "Locks cleared");
                writeln!(out, "Removed {} lock(s), {} kept", removed, kept.len())?;
            }
        }
        Ok(())
    }
}

fn rows(locks: &[Lock]) -> Vec<Vec<String>> {
    locks
        .iter()
        .map(|l| {
            vec![
                l.root_path.clone(),
                format!("{:?}", l.lock_type).to_lowercase(),
                l.owner.to_string(),
                l.project.to_string(),
            ]
        })
        .collect()
}
