//! # Seed Data Generator
//!
//! Populates a development database with garages and a stock catalog.
//!
//! ## Usage
//! ```bash
//! # Two garages (default)
//! cargo run -p garage-db --bin seed
//!
//! # Custom garage count and database path
//! cargo run -p garage-db --bin seed -- --garages 5 --db ./data/garage.db
//! ```
//!
//! Each garage gets the same catalog of spare parts, lubricants and service
//! offerings, with stock ids `{garage}-{code}` so several garages can share
//! one database.

use chrono::Utc;
use std::env;

use garage_core::{Garage, Money, StockCatalog, StockItem};
use garage_db::{Database, DbConfig};

/// (catalog, code, name, unit price in major units, quantity on hand)
const CATALOG: &[(StockCatalog, &str, &str, i64, i64)] = &[
    (StockCatalog::SparePart, "BRK-PAD", "Brake pad set", 1_200, 40),
    (StockCatalog::SparePart, "OIL-FLT", "Oil filter", 250, 60),
    (StockCatalog::SparePart, "AIR-FLT", "Air filter", 400, 35),
    (StockCatalog::SparePart, "SPK-PLG", "Spark plug", 180, 120),
    (StockCatalog::SparePart, "WPR-BLD", "Wiper blade", 350, 50),
    (StockCatalog::SparePart, "CLT-PLT", "Clutch plate", 2_800, 8),
    (StockCatalog::SparePart, "BAT-12V", "Battery 12V 35Ah", 4_500, 6),
    (StockCatalog::Lube, "OIL-530", "Engine oil 5W-30 (1L)", 350, 80),
    (StockCatalog::Lube, "OIL-1040", "Engine oil 10W-40 (1L)", 320, 70),
    (StockCatalog::Lube, "CLN-1L", "Coolant (1L)", 220, 45),
    (StockCatalog::Lube, "BRK-FLD", "Brake fluid DOT4", 280, 30),
    (StockCatalog::Service, "SVC-GEN", "General service", 1_500, 0),
    (StockCatalog::Service, "SVC-WASH", "Wash and polish", 600, 0),
    (StockCatalog::Service, "SVC-ALGN", "Wheel alignment", 800, 0),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut garages: usize = 2;
    let mut db_path = String::from("./garage_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--garages" | "-g" => {
                if i + 1 < args.len() {
                    garages = args[i + 1].parse().unwrap_or(2);
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
                println!("Garage Ledger Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -g, --garages <N>  Number of garages to create (default: 2)");
                println!("  -d, --db <PATH>    Database file path (default: ./garage_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Garage Ledger Seed Data Generator");
    println!("=================================");
    println!("Database: {}", db_path);
    println!("Garages:  {}", garages);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let start = std::time::Instant::now();
    let mut stocked = 0;

    for n in 1..=garages {
        let garage_id = format!("garage-{}", n);
        if db.garages().get_by_id(&garage_id).await?.is_some() {
            println!("⚠ {} already exists, skipping", garage_id);
            continue;
        }

        let now = Utc::now();
        db.garages()
            .insert(&Garage {
                id: garage_id.clone(),
                name: format!("Garage {}", n),
                address: Some(format!("{} Service Road", n * 10)),
                phone: Some(format!("+91 80 4000 {:04}", n)),
                email: Some(format!("garage{}@example.com", n)),
                created_at: now,
            })
            .await?;

        for (catalog, code, name, price, quantity) in CATALOG {
            let item = StockItem {
                id: format!("{}-{}", garage_id, code.to_lowercase()),
                garage_id: garage_id.clone(),
                catalog: *catalog,
                name: name.to_string(),
                code: Some(code.to_string()),
                quantity: *quantity,
                unit_price: Money::from_major(*price),
                updated_at: now,
            };
            if let Err(e) = db.stock().insert(&item).await {
                eprintln!("Failed to insert {}: {}", item.id, e);
                continue;
            }
            stocked += 1;
        }

        println!("  ✓ {} with {} stock items", garage_id, db.stock().count_by_garage(&garage_id).await?);
    }

    println!();
    println!("✓ Inserted {} stock items in {:?}", stocked, start.elapsed());
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}
