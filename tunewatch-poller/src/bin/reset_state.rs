//! Maintenance utility: drop and recreate every tunewatch table.
//!
//! Destroys all tracked artists, the dedup ledger, channel configuration,
//! and registered users. Refuses to run without `--yes`.

use anyhow::{bail, Context, Result};
use clap::Parser;
use tunewatch_common::config::resolve_data_folder;
use tunewatch_common::db::{create_all_tables, drop_all_tables, init_database};

#[derive(Parser, Debug)]
#[command(name = "reset-state")]
#[command(about = "Drop and recreate all tunewatch tables")]
#[command(version)]
struct Args {
    /// Data folder containing the state database
    #[arg(short, long, env = "TUNEWATCH_DATA_FOLDER")]
    data_folder: Option<String>,

    /// Actually perform the reset
    #[arg(long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    if !args.yes {
        bail!("refusing to reset without --yes (this deletes all tracked state)");
    }

    let data_folder = resolve_data_folder(args.data_folder.as_deref(), "TUNEWATCH_DATA_FOLDER")
        .context("Failed to resolve data folder")?;
    let db_path = data_folder.join("tunewatch.db");

    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;

    drop_all_tables(&pool).await.context("Failed to drop tables")?;
    create_all_tables(&pool).await.context("Failed to recreate tables")?;

    println!("Reset complete: {}", db_path.display());
    Ok(())
}
