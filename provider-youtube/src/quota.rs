//! Daily quota-unit accounting
//!
//! The Data API charges every request a fixed number of units against a
//! per-project daily budget. The tracker reserves units before a request is
//! sent and rolls over at the next UTC midnight. Usage survives a restart
//! through [`QuotaTracker::restore`] with a snapshot the host persisted.

use bridge_traits::playlist::QuotaStatus;
use bridge_traits::time::Clock;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Default project budget.
pub const DEFAULT_DAILY_QUOTA: u32 = 10_000;

/// Unit cost of a call, by operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCost {
    /// `*.list`
    List,
    /// `search.list`
    Search,
    /// `*.insert`, `*.update`, `*.delete`
    Write,
}

impl QuotaCost {
    pub fn units(&self) -> u32 {
        match self {
            QuotaCost::List => 1,
            QuotaCost::Search => 100,
            QuotaCost::Write => 50,
        }
    }
}

#[derive(Debug)]
struct QuotaWindow {
    day: NaiveDate,
    used: u32,
}

pub struct QuotaTracker {
    limit: u32,
    clock: Arc<dyn Clock>,
    window: Mutex<QuotaWindow>,
}

impl QuotaTracker {
    pub fn new(limit: u32, clock: Arc<dyn Clock>) -> Self {
        let day = clock.now().date_naive();
        Self {
            limit,
            clock,
            window: Mutex::new(QuotaWindow { day, used: 0 }),
        }
    }

    fn next_reset(now: DateTime<Utc>) -> DateTime<Utc> {
        let tomorrow = now.date_naive() + Duration::days(1);
        tomorrow.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
    }

    fn current(&self) -> std::sync::MutexGuard<'_, QuotaWindow> {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        let today = self.clock.now().date_naive();
        if window.day != today {
            debug!(used = window.used, "Quota window rolled over");
            window.day = today;
            window.used = 0;
        }
        window
    }

    /// Seconds until the budget resets.
    pub fn secs_until_reset(&self) -> u64 {
        let now = self.clock.now();
        (Self::next_reset(now) - now).num_seconds().max(1) as u64
    }

    /// Reserve units for one request.
    ///
    /// # Errors
    /// Returns the seconds until reset when the budget cannot cover `cost`.
    pub fn try_reserve(&self, cost: QuotaCost) -> Result<(), u64> {
        let mut window = self.current();
        let units = cost.units();
        if window.used.saturating_add(units) > self.limit {
            drop(window);
            let retry_after = self.secs_until_reset();
            warn!(
                units,
                limit = self.limit,
                retry_after_secs = retry_after,
                "YouTube daily quota exhausted"
            );
            return Err(retry_after);
        }
        window.used += units;
        Ok(())
    }

    /// Count units spent by an earlier process in the current window.
    /// Snapshots from another window are ignored.
    pub fn restore(&self, saved: &QuotaStatus) {
        let now = self.clock.now();
        if saved.resets_at != Self::next_reset(now) {
            debug!(resets_at = %saved.resets_at, "Ignoring quota snapshot from another day");
            return;
        }
        let mut window = self.current();
        window.used = window.used.max(saved.used.min(self.limit));
        debug!(used = window.used, "Restored quota usage");
    }

    /// The server reported the budget as spent; stop sending until reset.
    pub fn mark_exhausted(&self) {
        let mut window = self.current();
        window.used = self.limit;
    }

    pub fn status(&self) -> QuotaStatus {
        let used = self.current().used;
        QuotaStatus {
            used,
            limit: self.limit,
            resets_at: Self::next_reset(self.clock.now()),
        }
    }
}
