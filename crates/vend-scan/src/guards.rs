//! # Scan Guards
//!
//! Pre-dispatch defenses against adversarial input. All three guards are
//! single-slot or bounded state machines over the injected clock; none of
//! them allocate per scan beyond the storm guard's timestamp window.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DuplicateWindow        same raw value twice within 600 ms              │
//! │                         (scanner double-fire, camera frame repeat)      │
//! │                                                                         │
//! │  KeyedDuplicateWindow   same (intent, mode, value) within 800 ms        │
//! │                         (semantic duplicate past mode routing)          │
//! │                                                                         │
//! │  StormGuard             > 12 scans in 2000 ms → 1500 ms cooldown        │
//! │                         (stuck trigger, malicious flood)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both duplicate windows deliberately remember only the LAST accepted entry:
//! alternating A, B, A, B scans are all legitimate (an operator ringing up
//! two different products in turn) and must pass.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::clock::Clock;

// =============================================================================
// Duplicate windows
// =============================================================================

/// Single-slot duplicate suppressor keyed by an arbitrary value.
///
/// The check and the record are separate so callers can suppress against
/// the slot without occupying it: purchase scans are peeked at the raw
/// window but only recorded once their confirmation resolves, otherwise
/// the parked scan's own entry would swallow a deliberate rescan right
/// after confirming. A window of 0 disables the guard entirely.
pub struct DuplicateWindow<K: PartialEq> {
    window_ms: u64,
    clock: Arc<dyn Clock>,
    last: Option<(K, u64)>,
}

impl<K: PartialEq> DuplicateWindow<K> {
    pub fn new(window_ms: u64, clock: Arc<dyn Clock>) -> Self {
        DuplicateWindow {
            window_ms,
            clock,
            last: None,
        }
    }

    /// Returns true if `key` matches the slot within the window (caller
    /// should drop the scan). Does not touch the slot.
    pub fn is_duplicate(&self, key: &K) -> bool {
        if self.window_ms == 0 {
            return false;
        }
        match &self.last {
            Some((last_key, at)) => {
                last_key == key && self.clock.now_ms().saturating_sub(*at) <= self.window_ms
            }
            None => false,
        }
    }

    /// Installs `key` as the new slot occupant.
    pub fn record(&mut self, key: K) {
        if self.window_ms == 0 {
            return;
        }
        self.last = Some((key, self.clock.now_ms()));
    }

    /// Check and record in one step, for guards where every checked scan
    /// should also occupy the slot.
    pub fn check_and_record(&mut self, key: K) -> bool {
        if self.is_duplicate(&key) {
            return true;
        }
        self.record(key);
        false
    }
}

// =============================================================================
// Storm guard
// =============================================================================

/// Verdict from the storm guard for one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StormVerdict {
    /// Under the rate limit; proceed.
    Pass,
    /// Over the limit and this is the first drop of the cooldown: the
    /// operator should be told once.
    DropWithNotice,
    /// Still inside the cooldown; drop without repeating the notice.
    DropSilently,
}

/// Sliding-window rate limiter with a cooldown latch.
///
/// More than `max_scans` accepted scans inside `window_ms` trips a
/// `cooldown_ms` lockout during which every scan is dropped. The notice
/// fires once per cooldown, not once per dropped scan.
pub struct StormGuard {
    max_scans: usize,
    window_ms: u64,
    cooldown_ms: u64,
    clock: Arc<dyn Clock>,

    timestamps: VecDeque<u64>,
    cooldown_until: Option<u64>,
    noticed: bool,
}

impl StormGuard {
    pub const DEFAULT_MAX_SCANS: usize = 12;
    pub const DEFAULT_WINDOW_MS: u64 = 2000;
    pub const DEFAULT_COOLDOWN_MS: u64 = 1500;

    pub fn new(max_scans: usize, window_ms: u64, cooldown_ms: u64, clock: Arc<dyn Clock>) -> Self {
        StormGuard {
            max_scans,
            window_ms,
            cooldown_ms,
            clock,
            timestamps: VecDeque::new(),
            cooldown_until: None,
            noticed: false,
        }
    }

    pub fn with_defaults(clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Self::DEFAULT_MAX_SCANS,
            Self::DEFAULT_WINDOW_MS,
            Self::DEFAULT_COOLDOWN_MS,
            clock,
        )
    }

    /// Admits or drops one scan attempt.
    pub fn check(&mut self) -> StormVerdict {
        let now = self.clock.now_ms();

        if let Some(until) = self.cooldown_until {
            if now < until {
                return StormVerdict::DropSilently;
            }
            // Cooldown elapsed: clean slate.
            self.cooldown_until = None;
            self.noticed = false;
            self.timestamps.clear();
        }

        self.timestamps.push_back(now);
        while let Some(&front) = self.timestamps.front() {
            if now.saturating_sub(front) > self.window_ms {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }

        if self.timestamps.len() > self.max_scans {
            warn!(
                count = self.timestamps.len(),
                window_ms = self.window_ms,
                "scan storm detected; entering cooldown"
            );
            self.cooldown_until = Some(now + self.cooldown_ms);
            self.timestamps.clear();
            if self.noticed {
                return StormVerdict::DropSilently;
            }
            self.noticed = true;
            return StormVerdict::DropWithNotice;
        }

        debug!(count = self.timestamps.len(), "storm guard pass");
        StormVerdict::Pass
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
