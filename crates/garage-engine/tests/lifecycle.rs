//! End-to-end lifecycle: job card → invoice → payments → cash book.

use chrono::{Duration, NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;

use garage_core::{
    new_id, CompleteJobCard, CustomerDetails, Garage, InvoiceStatus, ItemKind, JobCardStatus, LineItemSpec, Money,
    NewJobCard, PaymentMethod, PaymentRequest, PaymentStatus, StockCatalog, StockItem, StockRef, TransactionType,
    VehicleDetails,
};
use garage_db::{Database, DbConfig, StockPolicy};
use garage_engine::{EngineConfig, FixedClock, GarageEngine};

const GARAGE: &str = "north-1";
const PADS: &str = "north-1-brk-pad";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 14).unwrap()
}

async fn seed(db: &Database) {
    db.garages()
        .insert(&Garage {
            id: GARAGE.to_string(),
            name: "North Service Centre".to_string(),
            address: Some("12 Ring Road".to_string()),
            phone: None,
            email: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    db.stock()
        .insert(&StockItem {
            id: PADS.to_string(),
            garage_id: GARAGE.to_string(),
            catalog: StockCatalog::SparePart,
            name: "Brake pad set".to_string(),
            code: Some("BRK-PAD".to_string()),
            quantity: 20,
            unit_price: Money::from_major(100),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
}

async fn engine_with(config: EngineConfig) -> GarageEngine {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    seed(&db).await;
    GarageEngine::with_clock(db, config, Arc::new(FixedClock::on(today())))
}

async fn engine() -> GarageEngine {
    engine_with(EngineConfig::in_memory()).await
}

fn brake_pads(quantity: i64) -> LineItemSpec {
    LineItemSpec::new(ItemKind::SparePart, "Brake pad set", quantity, Money::from_major(100))
        .with_stock(StockRef::new(StockCatalog::SparePart, PADS))
}

fn new_card() -> NewJobCard {
    NewJobCard {
        vehicle: VehicleDetails {
            number_plate: "KA01AB1234".to_string(),
            make: Some("Maruti".to_string()),
            model: Some("Swift".to_string()),
            ..Default::default()
        },
        customer: CustomerDetails {
            name: Some("Asha Rao".to_string()),
            phone: Some("98450 00001".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn on_hand(engine: &GarageEngine) -> i64 {
    engine.database().stock().quantity(PADS).await.unwrap().unwrap()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn item_totals_roll_into_card_subtotal() {
    let engine = engine().await;
    let card = engine.job_cards().create(GARAGE, new_card()).await.unwrap();

    let spec = brake_pads(2)
        .with_discount(Money::from_major(10))
        .with_tax(Money::from_major(5));
    let card = engine.job_cards().add_item(&card.id, spec).await.unwrap();

    assert_eq!(card.items()[0].total(), Money::from_major(195));
    assert_eq!(card.subtotal(), Money::from_major(195));
    assert_eq!(card.total(), Money::from_major(195));
    assert_eq!(on_hand(&engine).await, 18);
}

#[tokio::test]
async fn completion_generates_sent_invoice() {
    let engine = engine().await;
    let card = engine.job_cards().create(GARAGE, new_card()).await.unwrap();
    let spec = brake_pads(2)
        .with_discount(Money::from_major(10))
        .with_tax(Money::from_major(5));
    engine.job_cards().add_item(&card.id, spec).await.unwrap();

    let outcome = engine
        .job_cards()
        .complete(
            &card.id,
            CompleteJobCard {
                labour: Some(Money::from_major(50)),
                discount: Some(Money::from_major(20)),
                tax: Some(Money::from_major(10)),
                generate_invoice: true,
                due_days: Some(7),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let card = outcome.job_card;
    assert_eq!(card.status(), JobCardStatus::Completed);
    assert_eq!(card.total(), Money::from_major(235));

    let invoice = outcome.invoice.expect("invoice generated");
    assert_eq!(invoice.status(), InvoiceStatus::Sent);
    assert_eq!(invoice.subtotal(), Money::from_major(245));
    assert_eq!(invoice.total(), Money::from_major(235));
    assert_eq!(invoice.due_date, Some(today() + Duration::days(7)));
    assert_eq!(invoice.job_card_id.as_deref(), Some(card.id.as_str()));
    assert_eq!(invoice.customer.name, "Asha Rao");
    assert_eq!(invoice.vehicle.number.as_deref(), Some("KA01AB1234"));
    assert_eq!(invoice.invoice_number, "INV-north-1-20250614-0001");

    let stored = engine.invoices().list_by_job_card(&card.id).await.unwrap();
    assert_eq!(stored, vec![invoice]);
}

#[tokio::test]
async fn payments_settle_invoice_and_feed_cash_book() {
    let engine = engine().await;
    let card = engine.job_cards().create(GARAGE, new_card()).await.unwrap();
    engine.job_cards().add_item(&card.id, brake_pads(2)).await.unwrap();
    let outcome = engine
        .job_cards()
        .complete(
            &card.id,
            CompleteJobCard {
                labour: Some(Money::from_major(45)),
                generate_invoice: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let invoice = outcome.invoice.unwrap();
    assert_eq!(invoice.total(), Money::from_major(245));

    let first = engine
        .invoices()
        .add_payment(&invoice.id, PaymentRequest::new(Money::from_major(100)).with_method(PaymentMethod::Card))
        .await
        .unwrap();
    assert_eq!(first.invoice.payment_status(), PaymentStatus::Partial);
    assert_eq!(first.invoice.due(), Money::from_major(145));
    assert_eq!(first.invoice.status(), InvoiceStatus::PartiallyPaid);

    let second = engine
        .invoices()
        .add_payment(&invoice.id, PaymentRequest::new(Money::from_major(145)))
        .await
        .unwrap();
    assert_eq!(second.invoice.payment_status(), PaymentStatus::Paid);
    assert_eq!(second.invoice.due(), Money::zero());
    assert_eq!(second.invoice.status(), InvoiceStatus::Paid);
    assert_eq!(second.invoice.paid_date(), Some(today()));

    let entries = engine.cash_book().list_by_garage(GARAGE).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.details.links.job_card_id.as_deref() == Some(card.id.as_str())));
    assert_eq!(entries[1].running_balance(), Money::from_major(245));

    let summary = engine.invoices().summary(GARAGE).await.unwrap();
    assert_eq!(summary.counts.paid, 1);
    assert_eq!(summary.amounts.collected, Money::from_major(245));
    assert_eq!(summary.amounts.outstanding, Money::zero());
}

#[tokio::test]
async fn ledger_running_balances() {
    let engine = engine().await;
    let book = engine.cash_book();

    book.add_credit(GARAGE, "SERVICE_PAYMENT", Money::from_major(500), "Full service").await.unwrap();
    book.add_debit(GARAGE, "SALARY", Money::from_major(200), "Helper wages").await.unwrap();
    book.add_credit(GARAGE, "SPARE_PART_SALE", Money::from_major(50), "Bulb").await.unwrap();

    let balances: Vec<Money> = book
        .list_by_garage(GARAGE)
        .await
        .unwrap()
        .iter()
        .map(|e| e.running_balance())
        .collect();
    assert_eq!(
        balances,
        vec![Money::from_major(500), Money::from_major(300), Money::from_major(350)]
    );
    assert_eq!(book.net_balance(GARAGE, None).await.unwrap(), Money::from_major(350));
    assert_eq!(
        book.list_by_type(GARAGE, TransactionType::Debit).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn removing_item_returns_stock() {
    let engine = engine().await;
    let card = engine.job_cards().create(GARAGE, new_card()).await.unwrap();
    let card = engine.job_cards().add_item(&card.id, brake_pads(3)).await.unwrap();
    assert_eq!(on_hand(&engine).await, 17);

    let item_id = card.items()[0].id.clone();
    engine.job_cards().remove_item(&card.id, &item_id).await.unwrap();
    assert_eq!(on_hand(&engine).await, 20);
}

#[tokio::test]
async fn strict_stock_policy_rolls_back_shortfall() {
    let mut config = EngineConfig::in_memory();
    config.inventory.stock_policy = StockPolicy::Strict;
    let engine = engine_with(config).await;
    let card = engine.job_cards().create(GARAGE, new_card()).await.unwrap();

    let err = engine.job_cards().add_item(&card.id, brake_pads(25)).await.unwrap_err();
    assert_eq!(err.kind(), garage_core::ErrorKind::Conflict);

    let unknown = LineItemSpec::new(ItemKind::SparePart, "Ghost part", 1, Money::from_major(1))
        .with_stock(StockRef::new(StockCatalog::SparePart, "no-such-part"));
    let err = engine.job_cards().add_item(&card.id, unknown).await.unwrap_err();
    assert_eq!(err.kind(), garage_core::ErrorKind::NotFound);

    let reloaded = engine.job_cards().get(&card.id).await.unwrap();
    assert!(reloaded.items().is_empty());
    assert_eq!(on_hand(&engine).await, 20);
}

#[tokio::test]
async fn best_effort_skips_unknown_stock() {
    let engine = engine().await;
    let card = engine.job_cards().create(GARAGE, new_card()).await.unwrap();

    let unknown = LineItemSpec::new(ItemKind::SparePart, "Special order", 1, Money::from_major(80))
        .with_stock(StockRef::new(StockCatalog::SparePart, "no-such-part"));
    let card = engine.job_cards().add_item(&card.id, unknown).await.unwrap();
    assert_eq!(card.total(), Money::from_major(80));

    let card = engine.job_cards().add_item(&card.id, brake_pads(25)).await.unwrap();
    assert_eq!(card.items().len(), 2);
    assert_eq!(on_hand(&engine).await, -5);
}

#[tokio::test]
async fn deleting_job_card_unlinks_invoices() {
    let engine = engine().await;
    let card = engine.job_cards().create(GARAGE, new_card()).await.unwrap();
    engine.job_cards().add_item(&card.id, brake_pads(1)).await.unwrap();
    let invoice = engine
        .invoices()
        .create_from_job_card(&card.id, Default::default())
        .await
        .unwrap();

    engine.job_cards().delete(&card.id).await.unwrap();

    let kept = engine.invoices().get(&invoice.id).await.unwrap();
    assert_eq!(kept.job_card_id, None);
    assert_eq!(kept.customer.name, "Asha Rao");
    assert_eq!(kept.total(), invoice.total());
    assert_eq!(on_hand(&engine).await, 20);
}

// =============================================================================
// Concurrency
// =============================================================================

/// Two engines over one SQLite file, as two processes would be.
struct SharedFile {
    path: PathBuf,
}

impl SharedFile {
    fn new() -> Self {
        SharedFile {
            path: std::env::temp_dir().join(format!("garage-lifecycle-{}.db", new_id())),
        }
    }

    async fn engine(&self) -> GarageEngine {
        let mut config = EngineConfig::default();
        config.database.path = self.path.clone();
        config.database.max_connections = 4;
        let db = Database::new(config.database.db_config()).await.unwrap();
        GarageEngine::with_clock(db, config, Arc::new(FixedClock::on(today())))
    }
}

impl Drop for SharedFile {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut name = self.path.clone().into_os_string();
            name.push(suffix);
            let _ = std::fs::remove_file(PathBuf::from(name));
        }
    }
}

#[tokio::test]
async fn concurrent_invoice_numbers_are_unique_and_dense() {
    let file = SharedFile::new();
    let a = file.engine().await;
    seed(a.database()).await;
    let b = file.engine().await;

    let mut handles = Vec::new();
    for n in 0..12 {
        let engine = if n % 2 == 0 { a.clone() } else { b.clone() };
        handles.push(tokio::spawn(async move {
            engine
                .invoices()
                .create(garage_core::NewInvoice {
                    garage_id: GARAGE.to_string(),
                    customer: garage_core::InvoiceCustomer::named(format!("Customer {}", n)),
                    items: vec![LineItemSpec::new(ItemKind::Service, "Wash", 1, Money::from_major(10))],
                    ..Default::default()
                })
                .await
                .unwrap()
                .invoice_number
        }));
    }

    let mut numbers = Vec::new();
    for handle in handles {
        numbers.push(handle.await.unwrap());
    }
    numbers.sort();

    let expected: Vec<String> = (1..=12).map(|seq| format!("INV-north-1-20250614-{:04}", seq)).collect();
    assert_eq!(numbers, expected);

    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn concurrent_ledger_appends_keep_balances_consistent() {
    let file = SharedFile::new();
    let a = file.engine().await;
    seed(a.database()).await;
    let b = file.engine().await;

    let mut handles = Vec::new();
    for n in 0..20i64 {
        let engine = if n % 2 == 0 { a.clone() } else { b.clone() };
        handles.push(tokio::spawn(async move {
            let amount = Money::from_major(n + 1);
            if n % 3 == 0 {
                engine.cash_book().add_debit(GARAGE, "EXPENSE", amount, "Sundry").await
            } else {
                engine.cash_book().add_credit(GARAGE, "OTHER_INCOME", amount, "Counter sale").await
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let entries = a.cash_book().list_by_garage(GARAGE).await.unwrap();
    assert_eq!(entries.len(), 20);

    let mut running = Money::zero();
    for (index, entry) in entries.iter().enumerate() {
        running += entry.signed_amount();
        assert_eq!(entry.position(), index as i64 + 1);
        assert_eq!(entry.running_balance(), running);
    }
    assert_eq!(a.cash_book().net_balance(GARAGE, None).await.unwrap(), running);

    a.close().await;
    b.close().await;
}
