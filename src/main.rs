mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use profile_extractor_lib::{commands, init_tracing, App, AppError};
use serde_json::Value;
use tracing::error;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        let fatal = err
            .chain()
            .filter_map(|cause| cause.downcast_ref::<AppError>())
            .any(|app_err| !app_err.is_recoverable());
        std::process::exit(if fatal { 2 } else { 1 });
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let app = App::initialize(&cli.data_dir)
        .with_context(|| format!("failed to initialize {}", cli.data_dir.display()))?;

    let result = dispatch(&app, cli.command).await;
    app.finish();

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

async fn dispatch(app: &App, command: Commands) -> Result<Value> {
    let value = match command {
        Commands::Ingest(args) => {
            serde_json::to_value(commands::ingest(app, &args.files, args.csv_out.as_deref()).await?)?
        }
        Commands::Export(args) => serde_json::to_value(
            commands::export(app, &args.files, args.listen, args.timeout_secs).await?,
        )?,
        Commands::Callback(args) => serde_json::to_value(commands::callback(app, &args.code).await?)?,
        Commands::ExportCsv(args) => {
            serde_json::to_value(commands::export_csv(app, &args.files, &args.out).await?)?
        }
        Commands::ReadSheet => serde_json::to_value(commands::read_sheet(app).await?)?,
        Commands::Status => serde_json::to_value(commands::status(app)?)?,
        Commands::Logout => serde_json::to_value(commands::logout(app)?)?,
    };
    Ok(value)
}
