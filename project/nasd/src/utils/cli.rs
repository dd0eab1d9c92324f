use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "NAS_CONFIG", default_value = "/etc/nasd/config.json")]
    pub config: PathBuf,

    /// Directory holding the index database, overrides `dataDir`
    #[arg(long, env = "NAS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log filter, e.g. `info` or `nasd=debug,sqlx=warn`
    #[arg(long, env = "NAS_LOG", default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the storage core with its background backup and reclamation tasks
    Run,
    /// Run every reclamation sweep once and exit
    Sweep,
    /// Mirror the index to every volume once and exit
    BackupIndex,
    /// List the children of a logical directory
    Ls {
        #[arg(value_name = "LOGICAL_PATH", default_value = "/")]
        path: String,
    },
}
