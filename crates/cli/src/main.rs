use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use safarai_core::{build_itinerary_prompt, parse_itinerary, validate_trip_request, TripRequest};
use safarai_observability::init_tracing;
use safarai_storage::{SessionRepository, Store, TripRepository};

#[derive(Debug, Parser)]
#[command(name = "safarai")]
#[command(about = "Safarai itinerary and maintenance tools")]
struct Cli {
    /// SQLite database used by the storage commands.
    #[arg(long, env = "SAFARAI_DATABASE_URL", global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract the day-by-day schedule from generated itinerary text.
    ParseItinerary {
        /// Text file to read, or `-` for stdin.
        input: PathBuf,
    },
    /// Validate a trip form (JSON) and print the prompt sent to the model.
    Prompt {
        #[arg(long)]
        trip: PathBuf,
    },
    /// Print the stored trips of a user.
    Trips { user_id: String },
    /// Delete sessions that have expired.
    PurgeSessions,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("safarai_cli");
    let cli = Cli::parse();

    match cli.command {
        Command::ParseItinerary { input } => {
            let raw = read_input(&input)?;
            let itinerary = parse_itinerary(&raw).context("no itinerary found in input")?;
            println!("{}", serde_json::to_string_pretty(&itinerary)?);
        }
        Command::Prompt { trip } => {
            let raw = read_input(&trip)?;
            let request: TripRequest =
                serde_json::from_str(&raw).context("trip file is not valid JSON")?;
            let valid = validate_trip_request(&request).context("invalid trip details")?;
            println!("{}", build_itinerary_prompt(&valid));
        }
        Command::Trips { user_id } => {
            let store = open_store(cli.database_url.as_deref()).await?;
            let trips = store.list_trips_for_user(&user_id).await?;
            println!("{}", serde_json::to_string_pretty(&trips)?);
        }
        Command::PurgeSessions => {
            let store = open_store(cli.database_url.as_deref()).await?;
            let purged = store.purge_expired(chrono::Utc::now()).await?;
            println!("purged {purged} expired sessions from {} store", store.backend());
        }
    }

    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed reading stdin")?;
        return Ok(buffer);
    }
    fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))
}

async fn open_store(database_url: Option<&str>) -> Result<Store> {
    let url = require_database_url(database_url)?;
    Store::sqlite(url)
        .await
        .with_context(|| format!("failed opening database {url}"))
}

fn require_database_url(database_url: Option<&str>) -> Result<&str> {
    database_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .context("this command needs --database-url (or SAFARAI_DATABASE_URL)")
}
