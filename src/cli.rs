use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "deadline-board",
    version,
    about = "Month/week deadline board over a directory of JSON task files"
)]
pub struct Cli {
    /// Path to a YAML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Directory holding the task files (overrides the config file)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the board over HTTP
    Serve {
        /// Address to bind
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the board for a year
    List {
        /// Year to show (defaults to the current year)
        #[arg(long)]
        year: Option<i32>,
    },
    /// Add a new item under a program
    Add {
        /// Program the item belongs to
        program: String,
        /// Deadline in YYYY-MM-DD format
        deadline: String,
        /// Display name
        name: String,
    },
    /// Move an item to a new deadline
    Reschedule {
        /// Task file, relative to the data directory
        file: String,
        /// New deadline in YYYY-MM-DD format
        deadline: String,
    },
}
