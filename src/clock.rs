//! Clock Abstraction
//!
//! Watermarks are calendar dates, so the only thing the sync engine asks the
//! clock is "what day is it". Production reads the UTC calendar date, the same
//! zone the match listing uses for its lower bound; tests and DST use a
//! `SimulatedClock` that only moves when told to.

use chrono::{Days, NaiveDate};
use parking_lot::Mutex;
use std::sync::Arc;

/// Clock trait for date operations
pub trait SyncClock: Send + Sync + 'static {
    /// Current calendar date
    fn today(&self) -> NaiveDate;

    /// Whether `date` is the current calendar date
    fn is_today(&self, date: NaiveDate) -> bool {
        self.today() == date
    }
}

/// Production clock: current UTC date
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SyncClock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Utc::now().date_naive()
    }
}

/// Simulated clock for deterministic testing
///
/// Clones share state.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    date: Arc<Mutex<NaiveDate>>,
}

impl SimulatedClock {
    pub fn new(date: NaiveDate) -> Self {
        SimulatedClock {
            date: Arc::new(Mutex::new(date)),
        }
    }

    /// Move the clock forward by whole days
    pub fn advance_days(&self, days: u64) {
        let mut date = self.date.lock();
        if let Some(next) = date.checked_add_days(Days::new(days)) {
            *date = next;
        }
    }

    pub fn set(&self, date: NaiveDate) {
        *self.date.lock() = date;
    }
}

impl SyncClock for SimulatedClock {
    fn today(&self) -> NaiveDate {
        *self.date.lock()
    }
}
