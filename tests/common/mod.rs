#![allow(dead_code)]

use chrono::Utc;
use rust_decimal::Decimal;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use uuid::Uuid;
use wastepay::application::lifecycle::{CollectionService, LifecycleManager, OrderService};
use wastepay::application::payments::PaymentService;
use wastepay::application::wallet::WalletEngine;
use wastepay::config::EngineConfig;
use wastepay::domain::actor::Actor;
use wastepay::domain::collection::{CollectionDraft, CollectionRequest, QuantityUnit, WasteType};
use wastepay::domain::job::GeoPoint;
use wastepay::domain::order::{GeoAddress, Order, OrderDraft};
use wastepay::infrastructure::in_memory::{InMemoryJobStore, InMemoryPaymentStore, InMemoryWalletStore};
use wastepay::infrastructure::notifier::RecordingNotifier;

/// Every service wired to one set of in-memory stores.
pub struct Platform {
    pub collections: CollectionService,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub wallets: WalletEngine,
    pub notifier: RecordingNotifier,
}

impl Platform {
    pub fn new() -> Self {
        let config = EngineConfig::default();
        let collection_store = Arc::new(InMemoryJobStore::<CollectionRequest>::new());
        let order_store = Arc::new(InMemoryJobStore::<Order>::new());
        let payment_store = Arc::new(InMemoryPaymentStore::new());
        let notifier = RecordingNotifier::new();

        Self {
            collections: LifecycleManager::new(
                collection_store.clone(),
                payment_store.clone(),
                Arc::new(notifier.clone()),
                config.clone(),
            ),
            orders: LifecycleManager::new(
                order_store.clone(),
                payment_store.clone(),
                Arc::new(notifier.clone()),
                config.clone(),
            ),
            payments: PaymentService::new(
                payment_store,
                collection_store,
                order_store,
                Arc::new(notifier.clone()),
            ),
            wallets: WalletEngine::new(
                Arc::new(InMemoryWalletStore::new()),
                Arc::new(notifier.clone()),
                config,
            ),
            notifier,
        }
    }
}

pub fn mcp() -> Actor {
    Actor::mcp(Uuid::new_v4())
}

pub fn partner() -> Actor {
    Actor::partner(Uuid::new_v4())
}

pub fn collection_draft(price: Decimal) -> CollectionDraft {
    CollectionDraft {
        waste_type: Some(WasteType::Plastic),
        quantity: Some(Decimal::from(12)),
        unit: Some(QuantityUnit::Kg),
        scheduled_date: Some(Utc::now()),
        price: Some(price),
        ..Default::default()
    }
}

fn address(lng: f64, lat: f64) -> GeoAddress {
    GeoAddress {
        street: None,
        city: Some("Pune".into()),
        state: Some("MH".into()),
        country: Some("IN".into()),
        zip_code: Some("411001".into()),
        coordinates: GeoPoint(lng, lat),
    }
}

pub fn order_draft(price: Decimal) -> OrderDraft {
    OrderDraft {
        pickup_address: Some(address(73.85, 18.52)),
        delivery_address: Some(address(73.91, 18.56)),
        price: Some(price),
        estimated_pickup_time: Some(Utc::now()),
        ..Default::default()
    }
}

/// Writes a ledger replay file with the standard header.
pub fn ledger_csv(rows: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "type,user,counterparty,amount,reference").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file.flush().unwrap();
    file
}
