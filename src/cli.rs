use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "profile-extractor",
    version,
    about = "Extract LinkedIn profiles from CSV exports and publish them to Google Sheets"
)]
pub struct Cli {
    /// Directory holding the session database and notification buffer.
    #[arg(long, global = true, default_value = ".profile-extractor")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse CSV files and report the deduplicated profiles.
    Ingest(IngestArgs),
    /// Parse CSV files and overwrite the configured sheet with the result.
    Export(ExportArgs),
    /// Finish a pending export with the code from the Google redirect.
    Callback(CallbackArgs),
    /// Parse CSV files and save the result as a local CSV.
    ExportCsv(ExportCsvArgs),
    ReadSheet,
    Status,
    Logout,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[arg(long)]
    pub csv_out: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Wait on the loopback redirect URI for the authorization code.
    #[arg(long, default_value_t = false)]
    pub listen: bool,

    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct CallbackArgs {
    #[arg(long)]
    pub code: String,
}

#[derive(Args, Debug, Clone)]
pub struct ExportCsvArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[arg(long)]
    pub out: PathBuf,
}
