use std::{
    collections::BTreeSet,
    error::Error,
    fs,
    io::{self, BufRead, Write},
    path::PathBuf,
};

use clap::Subcommand;
use tabled::settings::{Panel, Style};
use tabled::{Table, Tabled};

use crate::{
    drivers::procon2::hid_report::{decode, Button},
    macros::storage::{MacroEntry, MacroStore},
};

#[derive(Subcommand, Debug, Clone)]
pub enum MacrosCommand {
    /// List all saved macros in slot order
    List,
    /// Display information about a macro
    Info { id: u32 },
    /// Rename a macro
    Rename { id: u32, name: String },
    /// Delete a macro and its trace file
    Delete {
        id: u32,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Copy the trace file of a macro to the given path
    Export { id: u32, dest: PathBuf },
}

#[derive(Tabled)]
struct MacroRow {
    #[tabled(rename = "Slot")]
    slot: usize,
    #[tabled(rename = "Id")]
    id: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Frames")]
    frames: u32,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl MacroRow {
    fn new(slot: usize, entry: &MacroEntry) -> Self {
        Self {
            slot,
            id: entry.id,
            name: entry.name.clone(),
            frames: entry.frame_count,
            duration: format_duration(entry.duration_ms as u64),
            created: entry.created.clone(),
        }
    }
}

#[derive(Tabled)]
struct MacroInfo {
    #[tabled(rename = "Id")]
    id: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "File")]
    filename: String,
    #[tabled(rename = "Format")]
    version: u16,
    #[tabled(rename = "Frames")]
    frames: u32,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Buttons Used")]
    buttons: String,
}

pub fn handle_macros(dir: PathBuf, cmd: MacrosCommand) -> Result<(), Box<dyn Error>> {
    let store = MacroStore::new(dir);
    match cmd {
        MacrosCommand::List => {
            let entries = store.list()?;
            let count = entries.len();
            let rows: Vec<MacroRow> = entries
                .iter()
                .enumerate()
                .map(|(slot, entry)| MacroRow::new(slot, entry))
                .collect();
            let mut table = Table::new(rows);
            table
                .with(Style::modern_rounded())
                .with(Panel::header("Macros"));
            println!("{table}");
            println!("Found {count} macro(s) in {}", store.dir().display());
        }
        MacrosCommand::Info { id } => {
            let entry = store.get(id)?;
            let (header, frames) = store.read_trace(id)?;
            let used: BTreeSet<Button> = frames
                .iter()
                .flat_map(|(_, report)| decode(report).buttons.pressed().collect::<Vec<_>>())
                .collect();
            let buttons = if used.is_empty() {
                "-".to_string()
            } else {
                used.iter()
                    .map(|b| b.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let info = MacroInfo {
                id,
                name: entry.name,
                filename: entry.filename,
                version: header.version,
                frames: header.frame_count,
                duration: format_duration(header.duration_us as u64 / 1000),
                buttons,
            };
            let mut table = Table::new(vec![info]);
            table
                .with(Style::modern_rounded())
                .with(Panel::header("Macro"));
            println!("{table}");
        }
        MacrosCommand::Rename { id, name } => {
            if name.trim().is_empty() {
                return Err("Name must not be empty".into());
            }
            store.rename(id, &name)?;
            println!("Renamed macro {id} to {name}");
        }
        MacrosCommand::Delete { id, yes } => {
            let entry = store.get(id)?;
            if !yes && !confirm(&format!("Delete macro {id} ({})?", entry.name))? {
                println!("Aborted");
                return Ok(());
            }
            store.delete(id)?;
            println!("Deleted macro {id}");
        }
        MacrosCommand::Export { id, dest } => {
            let entry = store.get(id)?;
            let dest = if dest.is_dir() {
                dest.join(&entry.filename)
            } else {
                dest
            };
            fs::copy(store.trace_path(&entry), &dest)?;
            println!("Exported macro {id} to {}", dest.display());
        }
    }

    Ok(())
}

/// Ask a yes/no question on stdin. Anything but "y" or "yes" is a no.
fn confirm(question: &str) -> io::Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Format milliseconds as seconds (e.g. "1.25s")
pub fn format_duration(ms: u64) -> String {
    format!("{}.{:02}s", ms / 1000, (ms % 1000) / 10)
}
