//! # Seed Data Generator
//!
//! Populates the database with committed records for development, so the
//! validation gateway and the read-model poller have something to work on.
//!
//! ## Usage
//! ```bash
//! # Generate 200 records (default)
//! cargo run -p villagelink-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p villagelink-db --bin seed -- --count 1000
//!
//! # Specify database path
//! cargo run -p villagelink-db --bin seed -- --db ./data/booking.db
//! ```
//!
//! ## Generated Records
//! - Kinds rotate: ticket, pass, rental, parcel
//! - Payment methods rotate: online, cash, wallet coin
//! - Cash records start `pending`, the rest `paid`
//! - Prices come from the fare composer, so they obey the same formula the
//!   booking flow uses

use chrono::Utc;
use std::env;
use uuid::Uuid;
use villagelink_core::code::code_for;
use villagelink_core::{
    compose, AddOn, AddOns, CommitPayload, CommittedRecord, Money, PaymentMethod, RecordKind,
};
use villagelink_db::{Database, DbConfig};

/// Village pairs served by the demo routes, with distance in metres.
const ROUTES: &[(&str, &str, u32)] = &[
    ("Rampur", "Sitapur", 12_400),
    ("Bhojpur", "Ara", 8_100),
    ("Kheri", "Lakhimpur", 21_750),
    ("Nandgaon", "Barsana", 6_300),
    ("Madhubani", "Darbhanga", 31_200),
    ("Tilhar", "Shahjahanpur", 17_900),
];

const OWNERS: &[&str] = &["passenger-1", "passenger-2", "passenger-3", "passenger-4"];

const METHODS: &[PaymentMethod] = &[
    PaymentMethod::Online,
    PaymentMethod::Cash,
    PaymentMethod::WalletCoin,
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./villagelink_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("VillageLink Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of records to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./villagelink_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 VillageLink Seed Data Generator");
    println!("==================================");
    println!("Database: {}", db_path);
    println!("Records:  {}", count);
    println!();

    let config = DbConfig::new(&db_path);
    let db = Database::new(config).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.records().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} records", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Generating records...");

    let start = std::time::Instant::now();
    let mut generated = 0;

    for seed in 0..count {
        let record = generate_record(seed);

        if let Err(e) = db.records().insert(&record).await {
            eprintln!("Failed to insert {}: {}", record.code, e);
            continue;
        }

        generated += 1;
        if generated % 50 == 0 {
            println!("  Generated {} records...", generated);
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} records in {:?}", generated, elapsed);

    let active = db.records().list_active_for_owner(OWNERS[0]).await?;
    println!("  Active for {}: {}", OWNERS[0], active.len());

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Generates one committed record with deterministic, varied data.
fn generate_record(seed: usize) -> CommittedRecord {
    let (origin, destination, distance_m) = ROUTES[seed % ROUTES.len()];
    let kind = RecordKind::ALL[seed % RecordKind::ALL.len()];
    let method = METHODS[seed % METHODS.len()];
    let passenger_count = 1 + (seed % 4) as u32;

    let mut add_ons = AddOns::default();
    add_ons.set(AddOn::Insurance, seed % 3 == 0);
    add_ons.set(AddOn::Livestock, seed % 7 == 0);

    // Base fare: ₹1.50 per km, surge on every fifth record
    let base = Money::from_paise((distance_m as i64 * 150) / 1000);
    let surge = if seed % 5 == 0 {
        Money::from_rupees(5)
    } else {
        Money::zero()
    };
    let fees: Vec<Money> = add_ons.enabled().map(|_| Money::from_rupees(1)).collect();
    let quote = compose(base, surge, Money::zero(), Money::zero(), passenger_count, &fees);

    let record_id = Uuid::new_v4();
    let payload = CommitPayload {
        record_id,
        code: code_for(kind, record_id),
        kind,
        owner_id: OWNERS[seed % OWNERS.len()].to_string(),
        origin: origin.to_string(),
        destination: destination.to_string(),
        distance_m,
        passenger_count,
        add_ons,
        gift_recipient: None,
        payment_method: method,
        total_price: quote.total_fare(),
        quoted_at: Utc::now(),
    };

    let settlement_reference = match method {
        PaymentMethod::Cash => None,
        _ => Some(format!("seed-{:06}", seed)),
    };

    payload.into_record(method.initial_status(), settlement_reference, Utc::now())
}
