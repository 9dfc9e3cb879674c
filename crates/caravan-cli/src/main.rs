//! Caravan CLI - manage travel clients, trips, and bookings from the terminal
//!
//! Works against a local database and exchanges changes with a peer API on
//! demand via `caravan sync`.

use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use caravan_core::export::{render_clients_csv, render_json_export};
use caravan_core::services::{ClientCreateOutcome, DatabaseService};
use caravan_core::sync::{SyncClient, SyncClientError};
use caravan_core::{Booking, BookingId, Client, ClientDraft, ClientId, Trip, TripId};
use chrono::{DateTime, NaiveDate};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use thiserror::Error;

#[derive(Parser)]
#[command(name = "caravan")]
#[command(about = "Manage travel clients, trips, and bookings from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to local database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage clients
    Client {
        #[command(subcommand)]
        command: ClientCommands,
    },
    /// Manage trips
    Trip {
        #[command(subcommand)]
        command: TripCommands,
    },
    /// Manage bookings
    Booking {
        #[command(subcommand)]
        command: BookingCommands,
    },
    /// Exchange changes with a peer API
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Copy the database into a timestamped backup file
    Backup {
        /// Backup directory
        #[arg(long, value_name = "DIR", default_value = "./backups")]
        dir: PathBuf,
    },
    /// Export records
    Export {
        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ClientCommands {
    /// Create a new client
    #[command(alias = "new")]
    Add {
        /// Full name
        name: String,
        /// Email address
        #[arg(long)]
        email: Option<String>,
        /// Phone number
        #[arg(long)]
        phone: Option<String>,
        /// Date of birth (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        dob: Option<NaiveDate>,
        /// Create even when potential duplicates are found
        #[arg(long)]
        force: bool,
    },
    /// List clients
    List {
        /// Filter by name, email, or phone substring
        #[arg(short, long)]
        query: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one client with bookings and history
    Show {
        /// Client ID or unique ID prefix
        id: String,
    },
    /// Delete a client and its bookings
    Delete {
        /// Client ID or unique ID prefix
        id: String,
    },
    /// Merge two duplicate clients into one
    Merge {
        /// First client ID or unique ID prefix
        id: String,
        /// Second client ID or unique ID prefix
        other_id: String,
    },
}

#[derive(Subcommand)]
enum TripCommands {
    /// Create a new trip
    #[command(alias = "new")]
    Add {
        /// Trip name
        name: String,
    },
    /// List trips
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a trip and its bookings
    Delete {
        /// Trip ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
enum BookingCommands {
    /// Book a client onto a trip
    #[command(alias = "new")]
    Add {
        /// Client ID or unique ID prefix
        #[arg(long)]
        client: String,
        /// Trip ID or unique ID prefix
        #[arg(long)]
        trip: String,
    },
    /// List bookings
    List {
        /// Only bookings for this client ID or prefix
        #[arg(long)]
        client: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a booking
    Delete {
        /// Booking ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Send local changes to a peer API
    Push {
        /// Peer API base URL
        #[arg(long, value_name = "URL")]
        api: String,
        /// Resend changes recorded after this feed sequence
        #[arg(long, default_value = "0")]
        after: i64,
    },
    /// Fetch and apply changes from a peer API
    Pull {
        /// Peer API base URL
        #[arg(long, value_name = "URL")]
        api: String,
    },
    /// Show local feed position and peer cursors
    Status,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] caravan_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncClientError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Record ID cannot be empty")]
    EmptyId,
    #[error("Client not found for id/prefix: {0}")]
    ClientNotFound(String),
    #[error("Trip not found for id/prefix: {0}")]
    TripNotFound(String),
    #[error("Booking not found for id/prefix: {0}")]
    BookingNotFound(String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error("{0} potential duplicate(s) found; re-run with --force to create anyway")]
    DuplicatesFound(usize),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum ExportFormat {
    Json,
    Csv,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("caravan=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Client { command } => match command {
            ClientCommands::Add {
                name,
                email,
                phone,
                dob,
                force,
            } => run_client_add(&name, email, phone, dob, force, &db_path).await?,
            ClientCommands::List { query, json } => {
                run_client_list(query.as_deref(), json, &db_path).await?;
            }
            ClientCommands::Show { id } => run_client_show(&id, &db_path).await?,
            ClientCommands::Delete { id } => run_client_delete(&id, &db_path).await?,
            ClientCommands::Merge { id, other_id } => {
                run_client_merge(&id, &other_id, &db_path).await?;
            }
        },
        Commands::Trip { command } => match command {
            TripCommands::Add { name } => run_trip_add(&name, &db_path).await?,
            TripCommands::List { json } => run_trip_list(json, &db_path).await?,
            TripCommands::Delete { id } => run_trip_delete(&id, &db_path).await?,
        },
        Commands::Booking { command } => match command {
            BookingCommands::Add { client, trip } => {
                run_booking_add(&client, &trip, &db_path).await?;
            }
            BookingCommands::List { client, json } => {
                run_booking_list(client.as_deref(), json, &db_path).await?;
            }
            BookingCommands::Delete { id } => run_booking_delete(&id, &db_path).await?,
        },
        Commands::Sync { command } => match command {
            SyncCommands::Push { api, after } => run_sync_push(&api, after, &db_path).await?,
            SyncCommands::Pull { api } => run_sync_pull(&api, &db_path).await?,
            SyncCommands::Status => run_sync_status(&db_path).await?,
        },
        Commands::Backup { dir } => run_backup(&dir, &db_path).await?,
        Commands::Export { format, output } => {
            run_export(format, output.as_deref(), &db_path).await?;
        }
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}

async fn run_client_add(
    name: &str,
    email: Option<String>,
    phone: Option<String>,
    dob: Option<NaiveDate>,
    force: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let draft = ClientDraft {
        name: name.to_string(),
        email,
        phone,
        dob,
    };

    let service = open_service(db_path).await?;
    match service.create_client(&draft, force).await? {
        ClientCreateOutcome::Created(client) => {
            println!("{}", client.id);
            Ok(())
        }
        ClientCreateOutcome::DuplicatesFound(candidates) => {
            eprintln!("Potential duplicates of '{}':", draft.name);
            for candidate in &candidates {
                eprintln!(
                    "  {:.2}  {}  {}",
                    candidate.score,
                    short_id(&candidate.client.id.as_str()),
                    describe_client(&candidate.client)
                );
            }
            Err(CliError::DuplicatesFound(candidates.len()))
        }
    }
}

async fn run_client_list(
    query: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let clients = service.list_clients(query).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&clients)?);
    } else {
        for line in format_client_lines(&clients) {
            println!("{line}");
        }
    }

    Ok(())
}

async fn run_client_show(id: &str, db_path: &Path) -> Result<(), CliError> {
    let identifier = normalize_identifier(id)?;
    let service = open_service(db_path).await?;
    let client = resolve_client(&service, &identifier).await?;

    println!("id:       {}", client.id);
    println!("name:     {}", client.name);
    println!("email:    {}", client.email.as_deref().unwrap_or("-"));
    println!("phone:    {}", client.phone.as_deref().unwrap_or("-"));
    println!(
        "dob:      {}",
        client
            .dob
            .map_or_else(|| "-".to_string(), |dob| dob.to_string())
    );
    println!("created:  {}", format_timestamp(client.created_at));
    println!("updated:  {}", format_timestamp(client.updated_at));

    let bookings = service.list_bookings(Some(&client.id)).await?;
    if !bookings.is_empty() {
        println!("bookings:");
        for booking in &bookings {
            let trip_name = match service.get_trip(&booking.trip_id).await? {
                Some(trip) => trip.name,
                None => booking.trip_id.as_str(),
            };
            println!("  {}  {}", short_id(&booking.id.as_str()), trip_name);
        }
    }

    let history = service.client_audit(&client.id).await?;
    if !history.is_empty() {
        println!("history:");
        for entry in &history {
            println!("  {}  {}", format_timestamp(entry.timestamp), entry.action);
        }
    }

    Ok(())
}

async fn run_client_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let identifier = normalize_identifier(id)?;
    let service = open_service(db_path).await?;
    let client = resolve_client(&service, &identifier).await?;

    service.delete_client(&client.id).await?;
    println!("{}", client.id);
    Ok(())
}

async fn run_client_merge(id: &str, other_id: &str, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let first = resolve_client(&service, &normalize_identifier(id)?).await?;
    let second = resolve_client(&service, &normalize_identifier(other_id)?).await?;

    let merged = service.merge_clients(&first.id, &second.id).await?;
    println!("{}", merged.id);
    Ok(())
}

async fn run_trip_add(name: &str, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let trip = service.create_trip(name).await?;
    println!("{}", trip.id);
    Ok(())
}

async fn run_trip_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let trips = service.list_trips().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&trips)?);
    } else {
        for trip in &trips {
            println!(
                "{:<13}  {}",
                short_id(&trip.id.as_str()),
                compact_preview(&trip.name, 40)
            );
        }
    }

    Ok(())
}

async fn run_trip_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let identifier = normalize_identifier(id)?;
    let service = open_service(db_path).await?;
    let trip = resolve_trip(&service, &identifier).await?;

    service.delete_trip(&trip.id).await?;
    println!("{}", trip.id);
    Ok(())
}

async fn run_booking_add(client: &str, trip: &str, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let client = resolve_client(&service, &normalize_identifier(client)?).await?;
    let trip = resolve_trip(&service, &normalize_identifier(trip)?).await?;

    let booking = service.create_booking(&client.id, &trip.id).await?;
    println!("{}", booking.id);
    Ok(())
}

async fn run_booking_list(
    client: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let client_id = match client {
        Some(query) => Some(
            resolve_client(&service, &normalize_identifier(query)?)
                .await?
                .id,
        ),
        None => None,
    };
    let bookings = service.list_bookings(client_id.as_ref()).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&bookings)?);
        return Ok(());
    }

    for booking in &bookings {
        let client_name = match service.get_client(&booking.client_id).await? {
            Some(client) => client.name,
            None => booking.client_id.as_str(),
        };
        let trip_name = match service.get_trip(&booking.trip_id).await? {
            Some(trip) => trip.name,
            None => booking.trip_id.as_str(),
        };
        println!(
            "{:<13}  {:<24}  {}",
            short_id(&booking.id.as_str()),
            compact_preview(&client_name, 24),
            trip_name
        );
    }

    Ok(())
}

async fn run_booking_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let identifier = normalize_identifier(id)?;
    let service = open_service(db_path).await?;
    let booking = resolve_booking(&service, &identifier).await?;

    service.delete_booking(&booking.id).await?;
    println!("{}", booking.id);
    Ok(())
}

async fn run_sync_push(api: &str, after: i64, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let changes = service.pull_changes(after).await?;
    if changes.is_empty() {
        println!("Nothing to push");
        return Ok(());
    }

    let client = SyncClient::new(api)?;
    client.push(&changes).await?;
    println!("Pushed {} change(s) to {}", changes.len(), client.base_url());
    Ok(())
}

async fn run_sync_pull(api: &str, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let client = SyncClient::new(api)?;

    let cursor = service.cursor(client.base_url()).await?;
    tracing::info!(peer = client.base_url(), cursor, "pulling changes");
    let changes = client.pull(cursor).await?;
    if changes.is_empty() {
        println!("Already up to date");
        return Ok(());
    }

    let summary = service.apply_changes(&changes).await?;
    let last_sequence = changes
        .iter()
        .map(|change| change.sequence)
        .max()
        .unwrap_or(cursor);
    service.set_cursor(client.base_url(), last_sequence).await?;

    println!(
        "Applied {} change(s) from {} ({} discarded, {} skipped)",
        summary.applied,
        client.base_url(),
        summary.discarded,
        summary.skipped
    );
    Ok(())
}

async fn run_sync_status(db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let stats = service.stats().await?;
    let latest = service.latest_sequence().await?;

    println!("Feed sequence: {latest}");
    println!(
        "Records: {} client(s), {} trip(s), {} booking(s), {} outbox entries",
        stats.clients, stats.trips, stats.bookings, stats.outbox_entries
    );

    let cursors = service.cursors().await?;
    if cursors.is_empty() {
        println!("No peer cursors");
    } else {
        println!("Peer cursors:");
        for (peer, sequence) in cursors {
            println!("  {peer}  {sequence}");
        }
    }

    Ok(())
}

async fn run_backup(backup_dir: &Path, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let backup_path = service.backup_to(backup_dir).await?;
    println!("{}", backup_path.display());
    Ok(())
}

async fn run_export(
    format: ExportFormat,
    output_path: Option<&Path>,
    db_path: &Path,
) -> Result<(), CliError> {
    let service = open_service(db_path).await?;
    let bundle = service.export_bundle().await?;
    let rendered = match format {
        ExportFormat::Json => render_json_export(&bundle)?,
        ExportFormat::Csv => render_clients_csv(&bundle.clients),
    };

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }

    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "caravan", buffer);
}

async fn resolve_client(service: &DatabaseService, query: &str) -> Result<Client, CliError> {
    if let Ok(id) = query.parse::<ClientId>() {
        if let Some(client) = service.get_client(&id).await? {
            return Ok(client);
        }
    }

    let mut matches: Vec<Client> = service
        .list_clients(None)
        .await?
        .into_iter()
        .filter(|client| client.id.as_str().starts_with(query))
        .collect();

    match matches.len() {
        0 => Err(CliError::ClientNotFound(query.to_string())),
        1 => Ok(matches.remove(0)),
        _ => Err(ambiguous(query, matches.iter().map(|c| c.id.as_str()))),
    }
}

async fn resolve_trip(service: &DatabaseService, query: &str) -> Result<Trip, CliError> {
    if let Ok(id) = query.parse::<TripId>() {
        if let Some(trip) = service.get_trip(&id).await? {
            return Ok(trip);
        }
    }

    let mut matches: Vec<Trip> = service
        .list_trips()
        .await?
        .into_iter()
        .filter(|trip| trip.id.as_str().starts_with(query))
        .collect();

    match matches.len() {
        0 => Err(CliError::TripNotFound(query.to_string())),
        1 => Ok(matches.remove(0)),
        _ => Err(ambiguous(query, matches.iter().map(|t| t.id.as_str()))),
    }
}

async fn resolve_booking(service: &DatabaseService, query: &str) -> Result<Booking, CliError> {
    if let Ok(id) = query.parse::<BookingId>() {
        if let Some(booking) = service.get_booking(&id).await? {
            return Ok(booking);
        }
    }

    let mut matches: Vec<Booking> = service
        .list_bookings(None)
        .await?
        .into_iter()
        .filter(|booking| booking.id.as_str().starts_with(query))
        .collect();

    match matches.len() {
        0 => Err(CliError::BookingNotFound(query.to_string())),
        1 => Ok(matches.remove(0)),
        _ => Err(ambiguous(query, matches.iter().map(|b| b.id.as_str()))),
    }
}

fn ambiguous(query: &str, ids: impl Iterator<Item = String>) -> CliError {
    let options = ids
        .take(3)
        .map(|id| short_id(&id))
        .collect::<Vec<_>>()
        .join(", ");
    CliError::AmbiguousId(format!(
        "ID prefix '{query}' is ambiguous; matches: {options}"
    ))
}

fn format_client_lines(clients: &[Client]) -> Vec<String> {
    clients
        .iter()
        .map(|client| {
            let short_id = short_id(&client.id.as_str());
            let name = compact_preview(&client.name, 24);
            let email = client.email.as_deref().unwrap_or("-");
            let phone = client.phone.as_deref().unwrap_or("-");
            format!("{short_id:<13}  {name:<24}  {email:<28}  {phone}")
        })
        .collect()
}

fn describe_client(client: &Client) -> String {
    let mut parts = vec![client.name.clone()];
    if let Some(email) = client.email.as_deref() {
        parts.push(format!("<{email}>"));
    }
    if let Some(phone) = client.phone.as_deref() {
        parts.push(phone.to_string());
    }
    if let Some(dob) = client.dob {
        parts.push(dob.to_string());
    }
    parts.join("  ")
}

fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

fn compact_preview(value: &str, max_chars: usize) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn format_timestamp(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |datetime| datetime.format("%Y-%m-%d %H:%M").to_string(),
    )
}

fn normalize_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyId)
    } else {
        Ok(trimmed.to_string())
    }
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("CARAVAN_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("caravan")
        .join("caravan.db")
}

async fn open_service(db_path: &Path) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(db_path).await?)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    use caravan_core::db::{ClientRepository, Database, LibSqlClientRepository};
    use caravan_core::services::{ClientCreateOutcome, DatabaseService};
    use caravan_core::{Client, ClientDraft};

    use super::{
        compact_preview, describe_client, format_timestamp, normalize_identifier, resolve_client,
        resolve_db_path, run_backup, run_client_add, run_client_delete, run_completions,
        run_export, short_id, CliError, CompletionShell, ExportFormat,
    };

    #[test]
    fn normalize_identifier_trims_and_rejects_empty() {
        assert_eq!(normalize_identifier("  abc  ").unwrap(), "abc");
        assert!(matches!(normalize_identifier(" \t "), Err(CliError::EmptyId)));
    }

    #[test]
    fn compact_preview_truncates_with_ellipsis() {
        assert_eq!(
            compact_preview("Alexandra   Catherine Smith", 20),
            "Alexandra Catheri..."
        );
        assert_eq!(compact_preview("Short name", 20), "Short name");
    }

    #[test]
    fn short_id_keeps_first_thirteen_chars() {
        assert_eq!(
            short_id("0198c5f2-3a61-7000-8000-000000000000"),
            "0198c5f2-3a61"
        );
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn format_timestamp_renders_utc_minutes() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00");
        assert_eq!(format_timestamp(86_400_000), "1970-01-02 00:00");
    }

    #[test]
    fn describe_client_lists_contact_details() {
        let plain = client_fixture("11111111-1111-7111-8111-111111111111", "Alice Smith");
        assert_eq!(describe_client(&plain), "Alice Smith");

        let mut with_contact = client_fixture("11111111-1111-7111-8111-222222222222", "Bob Jones");
        with_contact.email = Some("bob@example.com".to_string());
        with_contact.phone = Some("555-0100".to_string());
        assert_eq!(
            describe_client(&with_contact),
            "Bob Jones  <bob@example.com>  555-0100"
        );
    }

    #[test]
    fn resolve_db_path_prefers_explicit_flag() {
        let explicit = PathBuf::from("/tmp/explicit.db");
        assert_eq!(resolve_db_path(Some(explicit.clone())), explicit);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_client_matches_exact_and_prefix_ids() {
        let db_path = unique_test_db_path();
        {
            let db = Database::open(&db_path).await.unwrap();
            let repo = LibSqlClientRepository::new(db.connection());
            repo.create(&client_fixture(
                "aaaaaaaa-aaaa-7aaa-8aaa-111111111111",
                "Prefix One",
            ))
            .await
            .unwrap();
            repo.create(&client_fixture(
                "aaaaaaaa-aaaa-7aaa-8aaa-222222222222",
                "Prefix Two",
            ))
            .await
            .unwrap();
        }

        let service = DatabaseService::open_path(&db_path).await.unwrap();

        let exact = resolve_client(&service, "aaaaaaaa-aaaa-7aaa-8aaa-111111111111")
            .await
            .unwrap();
        assert_eq!(exact.name, "Prefix One");

        let by_prefix = resolve_client(&service, "aaaaaaaa-aaaa-7aaa-8aaa-2")
            .await
            .unwrap();
        assert_eq!(by_prefix.name, "Prefix Two");

        let ambiguous = resolve_client(&service, "aaaaaaaa-aaaa").await.unwrap_err();
        assert!(matches!(ambiguous, CliError::AmbiguousId(_)));

        let missing = resolve_client(&service, "ffffffff").await.unwrap_err();
        assert!(matches!(missing, CliError::ClientNotFound(_)));

        drop(service);
        cleanup_db_files(&db_path);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_client_add_pauses_until_forced() {
        let db_path = unique_test_db_path();
        {
            let service = DatabaseService::open_path(&db_path).await.unwrap();
            let draft = ClientDraft {
                name: "Alice Smith".to_string(),
                email: Some("alice@example.com".to_string()),
                phone: Some("+1 (555) 010-1234".to_string()),
                dob: None,
            };
            match service.create_client(&draft, false).await.unwrap() {
                ClientCreateOutcome::Created(_) => {}
                ClientCreateOutcome::DuplicatesFound(_) => {
                    panic!("fresh database has no duplicates")
                }
            }
        }

        let error = run_client_add(
            "Alyce Smith",
            None,
            Some("555 010 1234".to_string()),
            None,
            false,
            &db_path,
        )
        .await
        .unwrap_err();
        assert!(matches!(error, CliError::DuplicatesFound(1)));

        run_client_add(
            "Alyce Smith",
            None,
            Some("555 010 1234".to_string()),
            None,
            true,
            &db_path,
        )
        .await
        .unwrap();

        let service = DatabaseService::open_path(&db_path).await.unwrap();
        assert_eq!(service.list_clients(None).await.unwrap().len(), 2);

        drop(service);
        cleanup_db_files(&db_path);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_client_delete_cascades_to_bookings() {
        let db_path = unique_test_db_path();
        let client_id;
        {
            let service = DatabaseService::open_path(&db_path).await.unwrap();
            let draft = ClientDraft {
                name: "Cascade Client".to_string(),
                email: None,
                phone: None,
                dob: None,
            };
            let client = match service.create_client(&draft, false).await.unwrap() {
                ClientCreateOutcome::Created(client) => client,
                ClientCreateOutcome::DuplicatesFound(_) => {
                    panic!("fresh database has no duplicates")
                }
            };
            let trip = service.create_trip("Lisbon").await.unwrap();
            service.create_booking(&client.id, &trip.id).await.unwrap();
            client_id = client.id;
        }

        run_client_delete(&client_id.as_str(), &db_path)
            .await
            .unwrap();

        let service = DatabaseService::open_path(&db_path).await.unwrap();
        assert_eq!(service.get_client(&client_id).await.unwrap(), None);
        assert!(service.list_bookings(None).await.unwrap().is_empty());

        drop(service);
        cleanup_db_files(&db_path);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_export_writes_json_and_csv_files() {
        let db_path = unique_test_db_path();
        {
            let service = DatabaseService::open_path(&db_path).await.unwrap();
            let draft = ClientDraft {
                name: "Export Me".to_string(),
                email: None,
                phone: None,
                dob: None,
            };
            service.create_client(&draft, false).await.unwrap();
        }

        let json_path = std::env::temp_dir().join(format!(
            "caravan-export-test-{}.json",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |duration| duration.as_nanos())
        ));
        run_export(ExportFormat::Json, Some(&json_path), &db_path)
            .await
            .unwrap();
        let exported = std::fs::read_to_string(&json_path).unwrap();
        assert!(exported.contains("\"Export Me\""));

        let csv_path = json_path.with_extension("csv");
        run_export(ExportFormat::Csv, Some(&csv_path), &db_path)
            .await
            .unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert!(csv.starts_with("id,name,email,phone,dob,created_at,updated_at"));
        assert!(csv.contains("Export Me"));

        let _ = std::fs::remove_file(json_path);
        let _ = std::fs::remove_file(csv_path);
        cleanup_db_files(&db_path);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_backup_writes_timestamped_copy() {
        let db_path = unique_test_db_path();
        {
            let service = DatabaseService::open_path(&db_path).await.unwrap();
            service.create_trip("Porto").await.unwrap();
        }

        let backup_dir = std::env::temp_dir().join(format!(
            "caravan-backup-test-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |duration| duration.as_nanos())
        ));
        run_backup(&backup_dir, &db_path).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(&backup_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let _ = std::fs::remove_dir_all(&backup_dir);
        cleanup_db_files(&db_path);
    }

    #[test]
    fn run_completions_writes_bash_script_file() {
        let output_path = std::env::temp_dir().join(format!(
            "caravan-completions-test-{}.bash",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |duration| duration.as_nanos())
        ));

        run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();

        let script = std::fs::read_to_string(&output_path).unwrap();
        assert!(script.contains("_caravan()"));
        assert!(script.contains("complete -F _caravan"));
        assert!(script.contains(" default caravan"));

        let _ = std::fs::remove_file(output_path);
    }

    fn client_fixture(id: &str, name: &str) -> Client {
        Client {
            id: id.parse().unwrap(),
            name: name.to_string(),
            email: None,
            phone: None,
            normalized_phone: None,
            dob: None,
            created_at: 1_000,
            updated_at: 1_000,
        }
    }

    fn unique_test_db_path() -> PathBuf {
        static NEXT_TEST_DB_ID: AtomicU64 = AtomicU64::new(0);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_nanos());
        let sequence = NEXT_TEST_DB_ID.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("caravan-cli-test-{timestamp}-{sequence}.db"))
    }

    fn cleanup_db_files(path: &PathBuf) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
    }
}
