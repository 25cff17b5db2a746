//! Time manager — the game tick clock and scheduled events.
//!
//! Game ticks advance in proportion to wall-clock time scaled by
//! `time_scale`. Scheduled events sit in a min-heap keyed by trigger tick;
//! each advance pops everything due and reinserts repeating events.

use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Milliseconds of scaled wall time per game tick.
pub const TICK_MS: f64 = 100.0;

/// A scheduled event. Ordered by trigger tick (earliest first in the
/// heap), ties by id for determinism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub id: String,
    pub event_type: String,
    pub trigger_tick: u64,
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Reinsertion interval in ticks for repeating events.
    #[serde(default)]
    pub repeat_every: Option<u64>,
}

// Reversed ordering so `BinaryHeap` (a max-heap) behaves as a min-heap on
// trigger tick.
impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .trigger_tick
            .cmp(&self.trigger_tick)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Result of a clock advance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickAdvance {
    pub ticks_elapsed: u64,
    /// Events that came due, in trigger order.
    pub due: Vec<ScheduledEvent>,
}

/// The game clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeManager {
    ticks: u64,
    time_scale: f64,
    scheduled: BinaryHeap<ScheduledEvent>,
    /// Wall-clock instant of the last advance. Reset on load so downtime
    /// does not replay as a burst of ticks.
    last_advance: DateTime<Utc>,
    /// Sub-tick carry between advances.
    #[serde(skip)]
    remainder_ms: f64,
}

impl TimeManager {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            ticks: 0,
            time_scale: 1.0,
            scheduled: BinaryHeap::new(),
            last_advance: now,
            remainder_ms: 0.0,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    /// Set the tick speed multiplier. Values at or below zero pause the
    /// clock.
    pub fn set_time_scale(&mut self, scale: f64) {
        self.time_scale = scale.max(0.0);
    }

    /// Re-anchor the wall clock after a load, discarding downtime.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        self.last_advance = now;
        self.remainder_ms = 0.0;
    }

    /// Advance the clock to `now`, popping every event whose trigger tick
    /// has been reached. Repeating events are reinserted at
    /// `trigger + repeat_every`.
    pub fn advance(&mut self, now: DateTime<Utc>) -> TickAdvance {
        let elapsed_ms = (now - self.last_advance).num_milliseconds().max(0) as f64;
        self.last_advance = now;

        let scaled = elapsed_ms * self.time_scale + self.remainder_ms;
        let ticks_elapsed = (scaled / TICK_MS).floor() as u64;
        self.remainder_ms = scaled - ticks_elapsed as f64 * TICK_MS;
        self.ticks += ticks_elapsed;

        let mut due = Vec::new();
        while let Some(head) = self.scheduled.peek() {
            if head.trigger_tick > self.ticks {
                break;
            }
            let event = self.scheduled.pop().expect("peeked");
            if let Some(every) = event.repeat_every.filter(|e| *e > 0) {
                let mut next = event.clone();
                next.trigger_tick = event.trigger_tick + every;
                self.scheduled.push(next);
            }
            due.push(event);
        }

        TickAdvance { ticks_elapsed, due }
    }

    /// Queue an event.
    pub fn schedule(&mut self, event: ScheduledEvent) {
        self.scheduled.push(event);
    }

    /// Cancel all scheduled entries with the given id. Returns how many
    /// were dropped (a repeating event has exactly one entry at a time).
    pub fn cancel(&mut self, id: &str) -> usize {
        let before = self.scheduled.len();
        let kept: BinaryHeap<ScheduledEvent> = self
            .scheduled
            .drain()
            .filter(|e| e.id != id)
            .collect();
        self.scheduled = kept;
        before - self.scheduled.len()
    }

    pub fn pending_events(&self) -> usize {
        self.scheduled.len()
    }

    /// Earliest pending trigger tick.
    pub fn next_trigger(&self) -> Option<u64> {
        self.scheduled.peek().map(|e| e.trigger_tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn after_ms(ms: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::milliseconds(ms)
    }

    fn event(id: &str, trigger_tick: u64, repeat_every: Option<u64>) -> ScheduledEvent {
        ScheduledEvent {
            id: id.into(),
            event_type: "spawn_wave".into(),
            trigger_tick,
            params: Map::new(),
            repeat_every,
        }
    }

    #[test]
    fn ticks_follow_scaled_wall_time() {
        let mut tm = TimeManager::new(t0());
        let adv = tm.advance(after_ms(1000));
        assert_eq!(adv.ticks_elapsed, 10);
        assert_eq!(tm.ticks(), 10);
    }

    #[test]
    fn sub_tick_remainder_carries() {
        let mut tm = TimeManager::new(t0());
        tm.advance(after_ms(150)); // 1 tick + 50ms carry
        assert_eq!(tm.ticks(), 1);
        tm.advance(after_ms(200)); // +50ms = 1 more tick
        assert_eq!(tm.ticks(), 2);
    }

    #[test]
    fn time_scale_doubles_tick_rate() {
        let mut tm = TimeManager::new(t0());
        tm.set_time_scale(2.0);
        tm.advance(after_ms(1000));
        assert_eq!(tm.ticks(), 20);
    }

    #[test]
    fn zero_scale_pauses() {
        let mut tm = TimeManager::new(t0());
        tm.set_time_scale(0.0);
        tm.advance(after_ms(60_000));
        assert_eq!(tm.ticks(), 0);
    }

    #[test]
    fn due_events_pop_in_trigger_order() {
        let mut tm = TimeManager::new(t0());
        tm.schedule(event("late", 9, None));
        tm.schedule(event("early", 2, None));
        tm.schedule(event("future", 100, None));

        let adv = tm.advance(after_ms(1000)); // 10 ticks
        let ids: Vec<&str> = adv.due.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert_eq!(tm.pending_events(), 1);
    }

    #[test]
    fn repeating_event_reinserts() {
        let mut tm = TimeManager::new(t0());
        tm.schedule(event("pulse", 5, Some(5)));

        let adv = tm.advance(after_ms(1000)); // 10 ticks: fires at 5 and 10
        assert_eq!(adv.due.len(), 2);
        assert_eq!(tm.next_trigger(), Some(15));
    }

    #[test]
    fn cancel_removes_pending() {
        let mut tm = TimeManager::new(t0());
        tm.schedule(event("a", 50, None));
        tm.schedule(event("b", 60, None));
        assert_eq!(tm.cancel("a"), 1);
        assert_eq!(tm.cancel("a"), 0);
        assert_eq!(tm.pending_events(), 1);
    }

    #[test]
    fn resume_discards_downtime() {
        let mut tm = TimeManager::new(t0());
        tm.advance(after_ms(500));
        assert_eq!(tm.ticks(), 5);
        // Simulated restart an hour later.
        tm.resume(after_ms(3_600_000));
        let adv = tm.advance(after_ms(3_600_100));
        assert_eq!(adv.ticks_elapsed, 1);
    }

    #[test]
    fn serde_roundtrip_keeps_schedule() {
        let mut tm = TimeManager::new(t0());
        tm.schedule(event("a", 50, Some(10)));
        tm.advance(after_ms(300));

        let yaml = serde_yaml::to_string(&tm).unwrap();
        let mut restored: TimeManager = serde_yaml::from_str(&yaml).unwrap();
        restored.resume(after_ms(300));
        assert_eq!(restored.ticks(), tm.ticks());
        assert_eq!(restored.next_trigger(), Some(50));
    }
}
