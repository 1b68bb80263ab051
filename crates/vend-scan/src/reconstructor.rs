//! # Keystroke Stream Reconstructor
//!
//! Hardware scanners are wired to emit characters as if typed on a keyboard,
//! at a much higher and more regular cadence than a human. This module
//! isolates a complete scanned value from a live input stream without a
//! protocol delimiter guaranteed to be present.
//!
//! ## Burst Detection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  scanner:  8 9 0 1 2 3 4 5 ⏎      gaps ≈ 10-30 ms, very regular        │
//! │  human:    8 .... 9 ..... 0       gaps ≈ 100-400 ms, irregular          │
//! │                                                                         │
//! │  append rule:  gap > max_interval  → discard stale partial, restart     │
//! │  commit rule:  accept only if                                           │
//! │                  len ≥ min_length                                       │
//! │                  duration ≤ max_duration                                │
//! │                  avg gap ≤ max_interval                                 │
//! │                                                                         │
//! │  Scanners that never send a terminator are handled by the idle-commit   │
//! │  deadline: if no character arrives for idle_commit_ms, the buffer is    │
//! │  committed as if a terminator had been seen.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two ingestion entry points funnel into one buffer: [`Reconstructor::feed_key`]
//! for platforms that expose discrete key events, and
//! [`Reconstructor::feed_text`] for platforms that only expose the hidden
//! input field's cumulative value.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::clock::Clock;

/// Named terminator keys a scanner may send after the payload.
const TERMINATOR_KEYS: [&str; 4] = ["Enter", "Tab", "Return", "NumpadEnter"];

/// Where a committed scan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanSource {
    /// Keyboard-wedge hardware scanner.
    Hid,
    /// Camera decoder (joins the pipeline past the reconstructor).
    Camera,
}

/// A discrete barcode value reconstructed from the input stream.
///
/// Produced once per physical scan; never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedScan {
    pub value: String,
    pub source: ScanSource,
    /// Symbology tag when the decoder knows it (camera path only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl CommittedScan {
    pub fn hid(value: impl Into<String>) -> Self {
        CommittedScan {
            value: value.into(),
            source: ScanSource::Hid,
            format: None,
        }
    }

    pub fn camera(value: impl Into<String>, format: Option<String>) -> Self {
        CommittedScan {
            value: value.into(),
            source: ScanSource::Camera,
            format,
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Timing thresholds for burst detection.
#[derive(Debug, Clone)]
pub struct ReconstructorConfig {
    /// Minimum accepted barcode length. Default: 4.
    pub min_length: usize,

    /// Maximum gap between consecutive characters of one burst. Default: 80 ms.
    pub max_interval_ms: u64,

    /// Maximum total burst duration. Default: 1200 ms.
    pub max_duration_ms: u64,

    /// Idle gap after which the buffer auto-commits. Default: 120 ms.
    pub idle_commit_ms: u64,
}

impl Default for ReconstructorConfig {
    fn default() -> Self {
        ReconstructorConfig {
            min_length: 4,
            max_interval_ms: 80,
            max_duration_ms: 1200,
            idle_commit_ms: 120,
        }
    }
}

// =============================================================================
// Reconstructor
// =============================================================================

/// The keystroke stream reconstructor.
///
/// Owns its buffer and timing state as plain fields (no globals); the idle
/// commit is host-polled via [`Reconstructor::poll_idle`] against the
/// injected clock, so behavior is fully deterministic under test.
pub struct Reconstructor {
    config: ReconstructorConfig,
    clock: Arc<dyn Clock>,

    buffer: String,
    first_at_ms: u64,
    last_at_ms: u64,
    idle_deadline_ms: Option<u64>,

    /// Last observed cumulative text-field value (feed_text path).
    last_text: String,

    /// When the last accepted commit happened; feeds the scanner-health
    /// indicator and the post-commit grace window.
    last_commit_at_ms: Option<u64>,
}

impl Reconstructor {
    pub fn new(config: ReconstructorConfig, clock: Arc<dyn Clock>) -> Self {
        Reconstructor {
            config,
            clock,
            buffer: String::new(),
            first_at_ms: 0,
            last_at_ms: 0,
            idle_deadline_ms: None,
            last_text: String::new(),
            last_commit_at_ms: None,
        }
    }

    /// Feeds one discrete key event.
    ///
    /// A terminator key commits immediately; exactly one printable character
    /// appends; anything else (modifiers, arrows, multi-char chords) is
    /// ignored.
    pub fn feed_key(&mut self, key: &str) -> Option<CommittedScan> {
        if Self::is_terminator_key(key) {
            return self.commit();
        }
        let mut chars = key.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_control() => {
                self.append(c);
                None
            }
            _ => {
                trace!(key, "ignored non-printable key");
                None
            }
        }
    }

    /// Feeds the cumulative value of the hidden input field.
    ///
    /// Computes the suffix delta since the last observed value. A shorter
    /// (or non-prefix) value means the field was edited/cleared: the buffer
    /// is discarded and reseeded from the new value as a fresh sequence.
    /// Terminator characters inside the delta route through the commit
    /// path in order, so one call can yield multiple commits.
    pub fn feed_text(&mut self, value: &str) -> Vec<CommittedScan> {
        // No-op re-render: same value observed again.
        if value == self.last_text {
            return Vec::new();
        }

        let delta: String = if value.len() >= self.last_text.len() && value.starts_with(&self.last_text) {
            value[self.last_text.len()..].to_string()
        } else {
            // Deletion or mid-string edit: reseed from scratch.
            debug!(
                old_len = self.last_text.len(),
                new_len = value.len(),
                "text shrank or diverged; reseeding buffer"
            );
            self.reset_buffer();
            value.to_string()
        };
        self.last_text = value.to_string();

        let mut commits = Vec::new();
        for c in delta.chars() {
            if matches!(c, '\n' | '\t' | '\r') {
                if let Some(scan) = self.commit() {
                    commits.push(scan);
                }
            } else if !c.is_control() {
                self.append(c);
            }
        }
        commits
    }

    /// Host-driven timer tick: commits the buffer if the idle deadline has
    /// passed. Call this from a periodic timer (or after `idle_deadline`).
    pub fn poll_idle(&mut self) -> Option<CommittedScan> {
        match self.idle_deadline_ms {
            Some(deadline) if self.clock.now_ms() >= deadline => self.commit(),
            _ => None,
        }
    }

    /// The instant the idle timer would fire, for hosts that arm a real
    /// timer instead of polling blindly.
    pub fn idle_deadline(&self) -> Option<u64> {
        self.idle_deadline_ms
    }

    /// Whether an accepted commit happened within the last `window_ms`.
    ///
    /// Lets other code distinguish a just-happened hardware commit from a
    /// subsequent manual submit action on the same input.
    pub fn committed_within(&self, window_ms: u64) -> bool {
        self.last_commit_at_ms
            .map(|at| self.clock.now_ms().saturating_sub(at) <= window_ms)
            .unwrap_or(false)
    }

    /// When the last accepted commit happened (scanner-health feed).
    pub fn last_commit_at(&self) -> Option<u64> {
        self.last_commit_at_ms
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn is_terminator_key(key: &str) -> bool {
        TERMINATOR_KEYS.contains(&key) || matches!(key, "\n" | "\t" | "\r")
    }

    /// Append rule: a stale partial (gap beyond max_interval) is discarded
    /// rather than concatenated, then the idle deadline is (re)armed.
    fn append(&mut self, c: char) {
        let now = self.clock.now_ms();
        if self.buffer.is_empty() || now.saturating_sub(self.last_at_ms) > self.config.max_interval_ms
        {
            self.reset_buffer();
            self.first_at_ms = now;
        }
        self.buffer.push(c);
        self.last_at_ms = now;
        self.idle_deadline_ms = Some(now + self.config.idle_commit_ms);
    }

    /// Clears the buffer; also cancels any pending idle deadline.
    fn reset_buffer(&mut self) {
        self.buffer.clear();
        self.idle_deadline_ms = None;
    }

    /// Commit rule: accept only if the buffered sequence looks like a
    /// scanner burst; otherwise discard silently (manual typing or a stray
    /// fragment). An empty buffer is a no-op.
    fn commit(&mut self) -> Option<CommittedScan> {
        if self.buffer.is_empty() {
            return None;
        }

        let value = std::mem::take(&mut self.buffer);
        self.idle_deadline_ms = None;

        let len = value.chars().count();
        let duration = self.last_at_ms.saturating_sub(self.first_at_ms);
        // avg interval = duration / (len - 1); compared cross-multiplied to
        // stay in integer space. A single character's "average" is the
        // duration itself (zero).
        let avg_ok = if len > 1 {
            duration <= self.config.max_interval_ms * (len as u64 - 1)
        } else {
            duration <= self.config.max_interval_ms
        };

        let accepted =
            len >= self.config.min_length && duration <= self.config.max_duration_ms && avg_ok;

        if !accepted {
            debug!(len, duration, "buffer discarded: not a scanner burst");
            return None;
        }

        self.last_commit_at_ms = Some(self.clock.now_ms());
        debug!(len, duration, "scan committed");
        Some(CommittedScan::hid(value))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn recon(clock: &ManualClock) -> Reconstructor {
        Reconstructor::new(ReconstructorConfig::default(), Arc::new(clock.clone()))
    }

    /// Feeds each char with the given gap between them.
    fn burst(r: &mut Reconstructor, clock: &ManualClock, text: &str, gap_ms: u64) {
        for c in text.chars() {
            clock.advance(gap_ms);
            assert!(r.feed_key(&c.to_string()).is_none());
        }
    }

    #[test]
    fn test_fast_burst_plus_enter_commits_once() {
        let clock = ManualClock::new();
        let mut r = recon(&clock);

        burst(&mut r, &clock, "12345678", 20);
        let scan = r.feed_key("Enter").unwrap();
        assert_eq!(scan.value, "12345678");
        assert_eq!(scan.source, ScanSource::Hid);

        // Buffer consumed: a second Enter is a no-op.
        assert!(r.feed_key("Enter").is_none());
    }

    #[test]
    fn test_slow_typing_commits_nothing() {
        let clock = ManualClock::new();
        let mut r = recon(&clock);

        // >80 ms gaps: each char discards the previous partial, so Enter
        // sees a 1-char buffer and rejects it on length.
        burst(&mut r, &clock, "12345678", 200);
        assert!(r.feed_key("Enter").is_none());
    }

    #[test]
    fn test_too_short_burst_rejected() {
        let clock = ManualClock::new();
        let mut r = recon(&clock);

        burst(&mut r, &clock, "123", 10);
        assert!(r.feed_key("Enter").is_none());
    }

    #[test]
    fn test_idle_commit_without_terminator() {
        let clock = ManualClock::new();
        let mut r = recon(&clock);

        burst(&mut r, &clock, "5449000000996", 15);
        assert!(r.poll_idle().is_none()); // deadline not reached yet

        clock.advance(121);
        let scan = r.poll_idle().unwrap();
        assert_eq!(scan.value, "5449000000996");

        // Deadline cleared after commit.
        assert!(r.poll_idle().is_none());
    }

    #[test]
    fn test_stale_partial_discarded_and_idle_timer_rearmed() {
        let clock = ManualClock::new();
        let mut r = recon(&clock);

        burst(&mut r, &clock, "12", 10);
        let stale_deadline = r.idle_deadline().unwrap();

        // Gap far beyond max_interval: append resets the buffer and the
        // deadline, so the stale partial never idle-commits.
        clock.advance(500);
        r.feed_key("9");
        assert!(r.idle_deadline().unwrap() > stale_deadline);

        burst(&mut r, &clock, "8765", 10);
        clock.advance(121);
        assert_eq!(r.poll_idle().unwrap().value, "98765");
    }

    #[test]
    fn test_tab_and_literal_newline_terminate() {
        let clock = ManualClock::new();

        for terminator in ["Tab", "NumpadEnter", "Return", "\n", "\t", "\r"] {
            let mut r = recon(&clock);
            burst(&mut r, &clock, "4006381333931", 10);
            let scan = r.feed_key(terminator).unwrap();
            assert_eq!(scan.value, "4006381333931");
        }
    }

    #[test]
    fn test_modifier_keys_ignored() {
        let clock = ManualClock::new();
        let mut r = recon(&clock);

        burst(&mut r, &clock, "12", 10);
        r.feed_key("Shift");
        r.feed_key("ArrowLeft");
        burst(&mut r, &clock, "34", 10);

        clock.advance(121);
        assert_eq!(r.poll_idle().unwrap().value, "1234");
    }

    #[test]
    fn test_text_delta_walk_commits_on_embedded_terminator() {
        let clock = ManualClock::new();
        let mut r = recon(&clock);

        assert!(r.feed_text("1234").is_empty());
        clock.advance(20);
        assert!(r.feed_text("12345678").is_empty());
        clock.advance(20);

        let commits = r.feed_text("12345678\n");
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].value, "12345678");
    }

    #[test]
    fn test_identical_text_twice_is_noop() {
        let clock = ManualClock::new();
        let mut r = recon(&clock);

        r.feed_text("12345678");
        let deadline = r.idle_deadline();

        // No-op re-render must not re-trigger processing (deadline stays).
        clock.advance(50);
        assert!(r.feed_text("12345678").is_empty());
        assert_eq!(r.idle_deadline(), deadline);

        clock.advance(121);
        assert_eq!(r.poll_idle().unwrap().value, "12345678");
    }

    #[test]
    fn test_shorter_text_reseeds_buffer() {
        let clock = ManualClock::new();
        let mut r = recon(&clock);

        r.feed_text("999999");
        clock.advance(20);

        // Deletion: not diffed, the buffer restarts from the new value.
        r.feed_text("1234");
        clock.advance(20);
        r.feed_text("12345678");

        clock.advance(121);
        assert_eq!(r.poll_idle().unwrap().value, "12345678");
    }

    #[test]
    fn test_burst_duration_cap() {
        let clock = ManualClock::new();
        let mut r = recon(&clock);

        // 20 chars at 70 ms each: every gap passes the interval check but
        // total duration (1330 ms) exceeds max_duration.
        burst(&mut r, &clock, "11111111112222222222", 70);
        assert!(r.feed_key("Enter").is_none());
    }

    #[test]
    fn test_post_commit_grace_window() {
        let clock = ManualClock::new();
        let mut r = recon(&clock);

        assert!(!r.committed_within(300));

        burst(&mut r, &clock, "12345678", 10);
        r.feed_key("Enter").unwrap();
        assert!(r.committed_within(300));

        clock.advance(400);
        assert!(!r.committed_within(300));
    }

    #[test]
    fn test_committed_scan_wire_form() {
        // HID scans carry no symbology tag and must not serialize a null
        // format field; camera scans spell the source in caps on the wire.
        let json = serde_json::to_value(CommittedScan::hid("12345678")).unwrap();
        assert_eq!(json, serde_json::json!({ "value": "12345678", "source": "HID" }));

        let scan = CommittedScan::camera("4006381333931", Some("EAN_13".to_string()));
        let json = serde_json::to_value(&scan).unwrap();
        assert_eq!(json["source"], "CAMERA");
        assert_eq!(json["format"], "EAN_13");

        let back: CommittedScan = serde_json::from_value(json).unwrap();
        assert_eq!(back, scan);
    }
}
