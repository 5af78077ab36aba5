//! Process-local operation counters, reported by `guildvault status`.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::economy::ErrorKind;

static PURCHASES: AtomicU64 = AtomicU64::new(0);
static UNITS_SOLD: AtomicU64 = AtomicU64::new(0);
static CHECKINS: AtomicU64 = AtomicU64::new(0);
static TRANSFERS: AtomicU64 = AtomicU64::new(0);
static ITEMS_USED: AtomicU64 = AtomicU64::new(0);

static REJECTED: OnceLock<Mutex<HashMap<ErrorKind, u64>>> = OnceLock::new();

pub fn inc_purchase(units: u32) {
    PURCHASES.fetch_add(1, Ordering::Relaxed);
    UNITS_SOLD.fetch_add(u64::from(units), Ordering::Relaxed);
}

pub fn inc_checkin() {
    CHECKINS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_transfer() {
    TRANSFERS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_item_used() {
    ITEMS_USED.fetch_add(1, Ordering::Relaxed);
}

fn rejected_lock() -> &'static Mutex<HashMap<ErrorKind, u64>> {
    REJECTED.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Count an operation that returned an error of `kind`.
pub fn record_rejection(kind: ErrorKind) {
    if let Ok(mut guard) = rejected_lock().lock() {
        let count = guard.entry(kind).or_default();
        *count = count.saturating_add(1);
    }
}

#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub purchases: u64,
    pub units_sold: u64,
    pub checkins: u64,
    pub transfers: u64,
    pub items_used: u64,
    pub rejected: HashMap<ErrorKind, u64>,
}

impl Snapshot {
    pub fn total_rejected(&self) -> u64 {
        self.rejected.values().sum()
    }
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        purchases: PURCHASES.load(Ordering::Relaxed),
        units_sold: UNITS_SOLD.load(Ordering::Relaxed),
        checkins: CHECKINS.load(Ordering::Relaxed),
        transfers: TRANSFERS.load(Ordering::Relaxed),
        items_used: ITEMS_USED.load(Ordering::Relaxed),
        rejected: rejected_lock()
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default(),
    }
}
