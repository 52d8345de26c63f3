/// Change detection: decides whether a tick repaints the panel or leaves it alone.
use chrono::{NaiveDateTime, Timelike};
use std::fmt;
use tokio::time::Instant;
use tracing::debug;

use crate::content::ContentSnapshot;

/// Digest of the display-relevant parts of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    /// `clock` is the time shown on screen when the layout has a live clock. It only counts
    /// to the minute; the snapshot's capture time never counts.
    pub fn of(snapshot: &ContentSnapshot, clock: Option<NaiveDateTime>) -> Self {
        let mut canonical = String::new();
        for (name, value) in snapshot.fields() {
            canonical.push_str(name);
            canonical.push('=');
            canonical.push_str(&value.canonical());
            canonical.push('\n');
        }
        if let Some(clock) = clock.map(truncate_to_minute) {
            canonical.push_str(&format!("@clock={}", clock.format("%Y-%m-%dT%H:%M")));
        }
        if snapshot.photo().is_some() {
            canonical.push_str("@photo");
        }
        Fingerprint(md5::compute(canonical.as_bytes()).0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..4] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

pub fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepaintReason {
    FirstRun,
    ContentChanged,
    /// Periodic refresh to clear e-ink ghosting
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Repaint(RepaintReason),
    Skip,
}

/// Refresh bookkeeping kept for the whole process lifetime
#[derive(Debug, Default)]
pub struct RefreshState {
    pub total_repaints: u64,
    /// Unchanged ticks since the last repaint of any kind
    pub ticks_since_forced_repaint: u32,
    pub last_fingerprint: Option<Fingerprint>,
    pub last_repaint_at: Option<Instant>,
    /// Clock minute on the panel, when the layout shows a live clock
    pub last_clock_minute: Option<NaiveDateTime>,
}

impl RefreshState {
    pub fn record_repaint(&mut self, at: Instant, clock_minute: Option<NaiveDateTime>) {
        self.total_repaints += 1;
        self.last_repaint_at = Some(at);
        self.last_clock_minute = clock_minute;
    }

    /// The panel no longer shows what the last fingerprint describes; the next tick repaints.
    pub fn forget_fingerprint(&mut self) {
        self.last_fingerprint = None;
    }
}

pub struct ChangeDetector {
    /// Unchanged ticks before a forced repaint; 0 disables forcing
    forced_repaint_period: u32,
}

impl ChangeDetector {
    pub fn new(forced_repaint_period: u32) -> Self {
        Self {
            forced_repaint_period,
        }
    }

    pub fn decide(&self, fp: Fingerprint, state: &mut RefreshState) -> Decision {
        let decision = match state.last_fingerprint {
            None => Decision::Repaint(RepaintReason::FirstRun),
            Some(last) if last != fp => Decision::Repaint(RepaintReason::ContentChanged),
            Some(_)
                if self.forced_repaint_period > 0
                    && state.ticks_since_forced_repaint + 1 >= self.forced_repaint_period =>
            {
                Decision::Repaint(RepaintReason::Forced)
            }
            Some(_) => Decision::Skip,
        };

        match decision {
            Decision::Repaint(_) => {
                state.last_fingerprint = Some(fp);
                state.ticks_since_forced_repaint = 0;
            }
            Decision::Skip => {
                state.ticks_since_forced_repaint += 1;
                debug!(
                    "Content {} unchanged ({}/{} ticks before forced repaint)",
                    fp, state.ticks_since_forced_repaint, self.forced_repaint_period
                );
            }
        }
        decision
    }
}
