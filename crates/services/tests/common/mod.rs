#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use services::{ChangeBatch, Clock, Subscription, WalkthroughConfig, WalkthroughController};
use storage::repository::{InMemoryStore, PersistenceAdapter, ProgressRecord, Storage};

pub const TOUR: &str = "gas-laws";

pub async fn open_with(store: &InMemoryStore, clock: Clock) -> WalkthroughController {
    let storage = Storage::from_adapter(store.clone());
    WalkthroughController::open(&storage, WalkthroughConfig::new(TOUR).with_clock(clock)).await
}

pub async fn persisted_progress(store: &InMemoryStore) -> Option<ProgressRecord> {
    let raw = store.load(&format!("{TOUR}/progress")).await.unwrap()?;
    Some(ProgressRecord::from_json(&raw).unwrap())
}

/// Collects every published batch.
pub fn record_batches(
    controller: &WalkthroughController,
) -> (Arc<Mutex<Vec<ChangeBatch>>>, Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sub = controller.subscribe(move |batch: &ChangeBatch| {
        sink.lock().unwrap().push(batch.clone());
    });
    (seen, sub)
}
