//! # Conductor Scanner
//!
//! Reads scanned QR payloads or typed booking codes from stdin and validates
//! them against the local record store, printing what each scan did.
//!
//! ## Usage
//! ```bash
//! # Validate as conductor-7, one identifier per line
//! cargo run -p villagelink-booking --bin conductor -- --actor conductor-7
//!
//! # Use a specific config file
//! cargo run -p villagelink-booking --bin conductor -- --config ./booking.toml
//! ```
//!
//! A line may override the actor: `TKT-0123456789 driver-2`.

use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use villagelink_booking::memory::RecordingLedger;
use villagelink_booking::{BookingConfig, BookingError, HmacCredentialIssuer, ValidationGateway};
use villagelink_core::SystemClock;
use villagelink_db::{Database, DbConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut actor = String::from("conductor");
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--actor" | "-a" => {
                if i + 1 < args.len() {
                    actor = args[i + 1].clone();
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("VillageLink Conductor Scanner");
                println!();
                println!("Usage: conductor [OPTIONS] < scans.txt");
                println!();
                println!("Options:");
                println!("  -a, --actor <ID>     Validating actor id (default: conductor)");
                println!("  -c, --config <PATH>  booking.toml to load");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = BookingConfig::load_or_default(config_path);
    config.validate()?;

    let db_path = config
        .database_path()
        .ok_or("Could not determine database path")?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::new(DbConfig::new(db_path.clone())).await?;
    info!(path = %db_path.display(), "Database opened");

    let ledger = Arc::new(RecordingLedger::new());
    let gateway = ValidationGateway::new(
        Arc::new(db.records()),
        Arc::new(HmacCredentialIssuer::new(
            config.credential.signing_key.as_bytes(),
        )?),
        ledger.clone(),
        Arc::new(SystemClock),
    )
    .with_platform_fee(config.platform_fee())
    .with_manual_entry(config.validation.allow_manual_entry);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let Some(raw) = parts.next() else {
            continue;
        };
        let scanned_by = parts.next().unwrap_or(&actor);

        match gateway.validate(raw, scanned_by).await {
            Ok(outcome) => println!(
                "✓ {} {:?}: {} → {} (earned {})",
                outcome.code,
                outcome.action,
                outcome.previous_status,
                outcome.status,
                outcome.earnings
            ),
            Err(BookingError::AlreadyUsed { code, status }) => {
                println!("✗ {code} already used ({status})")
            }
            Err(e) => {
                warn!(?e, raw, "Scan rejected");
                println!("✗ {e}");
            }
        }
    }

    info!(credits = ledger.credits().len(), "Scanner finished");
    db.close().await;
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - Default: INFO, with debug for villagelink crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,villagelink=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
