//! The sampling-cycle state machine.
//!
//! Consumes raw sensor bus lines and groups their readings into wall-clock
//! cycles of a fixed interval. The bus carries no probe inventory, so cycle
//! completion is inferred: probes report in a repeating round-robin order,
//! and an address repeating before the deadline rolls over means a full
//! round has passed. The accumulated batch is handed out exactly once per
//! completed cycle; the rest of the cycle is skipped until the next
//! deadline crossing.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use crate::bus::parse::{parse_reading, ParseError};

/// Per-address slot within the current cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    /// No reading for this address yet in the current cycle.
    Pending,

    /// Latest temperature seen for this address in the current cycle.
    Collected(f64),
}

/// Result of feeding one bus line to the collector.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// First reading for this address in the current cycle; batch updated.
    Stored,

    /// An address repeated: the cycle is complete and `batch` must be
    /// delivered to the sink. Emitted at most once per cycle.
    CycleComplete {
        /// The repeated address that closed the cycle.
        trigger: String,
        /// Snapshot of every reading collected this cycle.
        batch: Batch,
    },

    /// The batch was already handed out this cycle; line skipped unparsed.
    AlreadyFlushed,

    /// The line does not match the wire format.
    Invalid(ParseError),
}

/// One entry of a completed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    /// Sensor address.
    pub address: String,

    /// Latest temperature collected for the address this cycle.
    pub temperature: f64,
}

/// Snapshot of collected readings handed to the sink on cycle completion.
///
/// Contains one item per address that actually reported this cycle, in
/// address order. Addresses known from earlier cycles but silent in this
/// one are not included.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub items: Vec<BatchItem>,
}

/// Sampling-cycle state machine. See the module docs for the protocol.
///
/// Time is passed in by the caller, so the state machine is a pure
/// function of its inputs and can be driven synthetically in tests.
pub struct CycleCollector {
    interval: Duration,

    /// Wall-clock instant at which the current cycle ends. Advanced by one
    /// `interval` per crossing, never re-armed from the current time.
    deadline: SystemTime,

    /// Set once the batch has been handed out for the current cycle.
    flushed: bool,

    slots: BTreeMap<String, Slot>,
}

impl CycleCollector {
    /// Create a collector.
    ///
    /// The initial deadline is `now` itself, so the first line processed
    /// always begins a fresh cycle.
    pub fn new(interval: Duration, now: SystemTime) -> Self {
        Self {
            interval,
            deadline: now,
            flushed: false,
            slots: BTreeMap::new(),
        }
    }

    /// Feed one raw bus line observed at `now`.
    ///
    /// Evaluation order is fixed: the deadline check runs first and may
    /// start a new cycle; then the flushed short-circuit skips the line
    /// unparsed; only then is the line parsed and folded into the batch.
    pub fn handle_line(&mut self, line: &str, now: SystemTime) -> LineOutcome {
        if now >= self.deadline {
            self.deadline += self.interval;
            // Lazy reset: keep the keys, clear the values, so every known
            // address must report again before it counts as collected.
            for slot in self.slots.values_mut() {
                *slot = Slot::Pending;
            }
            self.flushed = false;
        }

        if self.flushed {
            return LineOutcome::AlreadyFlushed;
        }

        let reading = match parse_reading(line) {
            Ok(reading) => reading,
            Err(e) => return LineOutcome::Invalid(e),
        };

        let repeat = match self.slots.entry(reading.address.clone()) {
            Entry::Occupied(mut entry) => {
                let repeat = matches!(entry.get(), Slot::Collected(_));
                entry.insert(Slot::Collected(reading.temperature));
                repeat
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot::Collected(reading.temperature));
                false
            }
        };

        if repeat {
            // Repeating address: the round-robin has wrapped. The repeat
            // value is already folded in; hand out the batch.
            self.flushed = true;
            LineOutcome::CycleComplete {
                trigger: reading.address,
                batch: self.batch(),
            }
        } else {
            LineOutcome::Stored
        }
    }

    /// Number of addresses ever seen on the bus.
    pub fn known_addresses(&self) -> usize {
        self.slots.len()
    }

    fn batch(&self) -> Batch {
        let items = self
            .slots
            .iter()
            .filter_map(|(address, slot)| match slot {
                Slot::Collected(temperature) => Some(BatchItem {
                    address: address.clone(),
                    temperature: *temperature,
                }),
                Slot::Pending => None,
            })
            .collect();

        Batch { items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(10);

    fn start() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000)
    }

    /// Collector whose first cycle starts at `start()`.
    fn collector() -> CycleCollector {
        CycleCollector::new(INTERVAL, start())
    }

    fn at(secs: u64) -> SystemTime {
        start() + Duration::from_secs(secs)
    }

    fn items(batch: &Batch) -> Vec<(&str, f64)> {
        batch
            .items
            .iter()
            .map(|i| (i.address.as_str(), i.temperature))
            .collect()
    }

    // -- Round-robin collection --

    #[test]
    fn test_two_probe_round_robin_flushes_latest_values() {
        // interval = 10s; A,B then A again closes the cycle with the
        // latest value for each address, and a late B is skipped.
        let mut c = collector();

        assert_eq!(c.handle_line("R=28FF T=20.5", at(1)), LineOutcome::Stored);
        assert_eq!(c.handle_line("R=29AA T=21.0", at(2)), LineOutcome::Stored);

        let LineOutcome::CycleComplete { trigger, batch } =
            c.handle_line("R=28FF T=20.6", at(3))
        else {
            panic!("expected CycleComplete");
        };
        assert_eq!(trigger, "28FF");
        assert_eq!(items(&batch), vec![("28FF", 20.6), ("29AA", 21.0)]);

        assert_eq!(
            c.handle_line("R=29AA T=21.1", at(4)),
            LineOutcome::AlreadyFlushed
        );
    }

    #[test]
    fn test_single_probe_cycle_completes_on_second_reading() {
        let mut c = collector();

        assert_eq!(c.handle_line("R=28FF T=20.5", at(1)), LineOutcome::Stored);

        let LineOutcome::CycleComplete { batch, .. } = c.handle_line("R=28FF T=20.7", at(2))
        else {
            panic!("expected CycleComplete");
        };
        assert_eq!(items(&batch), vec![("28FF", 20.7)]);
    }

    #[test]
    fn test_flush_happens_once_per_cycle() {
        let mut c = collector();

        c.handle_line("R=A T=1.0", at(1));
        c.handle_line("R=B T=2.0", at(2));
        assert!(matches!(
            c.handle_line("R=A T=1.1", at(3)),
            LineOutcome::CycleComplete { .. }
        ));

        // Every further line this cycle is skipped, repeats included.
        for (secs, line) in [(4, "R=B T=2.1"), (5, "R=A T=1.2"), (6, "R=C T=3.0")] {
            assert_eq!(
                c.handle_line(line, at(secs)),
                LineOutcome::AlreadyFlushed,
                "line at t={secs} should be skipped"
            );
        }
    }

    #[test]
    fn test_next_cycle_flushes_again_after_deadline() {
        let mut c = collector();

        c.handle_line("R=A T=1.0", at(1));
        c.handle_line("R=B T=2.0", at(2));
        assert!(matches!(
            c.handle_line("R=A T=1.1", at(3)),
            LineOutcome::CycleComplete { .. }
        ));

        // First line processed in cycle 1 armed the deadline at start+10.
        assert_eq!(c.handle_line("R=A T=5.0", at(11)), LineOutcome::Stored);
        assert_eq!(c.handle_line("R=B T=6.0", at(12)), LineOutcome::Stored);

        let LineOutcome::CycleComplete { batch, .. } = c.handle_line("R=A T=5.5", at(13))
        else {
            panic!("expected CycleComplete in second cycle");
        };
        assert_eq!(items(&batch), vec![("A", 5.5), ("B", 6.0)]);
    }

    // -- Deadline handling --

    #[test]
    fn test_deadline_boundary_is_inclusive() {
        let mut c = collector();

        c.handle_line("R=A T=1.0", at(1)); // arms deadline at start+10
        c.handle_line("R=B T=2.0", at(2));

        // Exactly at the deadline a new cycle begins, so this repeat is a
        // first sighting, not a cycle close.
        assert_eq!(c.handle_line("R=A T=1.5", at(10)), LineOutcome::Stored);
    }

    #[test]
    fn test_deadline_crossing_resets_collected_values() {
        let mut c = collector();

        c.handle_line("R=A T=1.0", at(1));
        c.handle_line("R=B T=2.0", at(2));

        // Deadline passes with no repeat; the next line starts a new cycle.
        assert_eq!(c.handle_line("R=B T=7.0", at(11)), LineOutcome::Stored);
        c.handle_line("R=C T=8.0", at(12));

        let LineOutcome::CycleComplete { batch, .. } = c.handle_line("R=B T=7.5", at(13))
        else {
            panic!("expected CycleComplete");
        };

        // A reported only in the dead cycle: it must not leak its stale
        // value into this flush.
        assert_eq!(items(&batch), vec![("B", 7.5), ("C", 8.0)]);
        assert_eq!(c.known_addresses(), 3);
    }

    #[test]
    fn test_unrepeated_cycle_never_flushes() {
        let mut c = collector();

        // One reading, then silence past the deadline: no flush happens
        // for that cycle at all.
        assert_eq!(c.handle_line("R=A T=1.0", at(1)), LineOutcome::Stored);

        // The next reading crosses the deadline and resumes the normal
        // pattern in a fresh cycle.
        assert_eq!(c.handle_line("R=A T=2.0", at(11)), LineOutcome::Stored);
        let LineOutcome::CycleComplete { batch, .. } = c.handle_line("R=A T=2.5", at(12))
        else {
            panic!("expected CycleComplete");
        };
        assert_eq!(items(&batch), vec![("A", 2.5)]);
    }

    #[test]
    fn test_deadline_advances_one_interval_per_line() {
        // After a long stall the deadline lags by several intervals and
        // advances only one interval per processed line, wiping the batch
        // each time until it catches up with the wall clock.
        let mut c = collector();

        assert_eq!(c.handle_line("R=A T=1.0", at(25)), LineOutcome::Stored); // deadline -> +10
        assert_eq!(c.handle_line("R=A T=2.0", at(26)), LineOutcome::Stored); // deadline -> +20, reset
        assert_eq!(c.handle_line("R=A T=3.0", at(27)), LineOutcome::Stored); // deadline -> +30, reset

        // Deadline (+30) is now ahead of the clock; the repeat counts.
        let LineOutcome::CycleComplete { batch, .. } = c.handle_line("R=A T=4.0", at(28))
        else {
            panic!("expected CycleComplete");
        };
        assert_eq!(items(&batch), vec![("A", 4.0)]);
    }

    // -- Invalid lines --

    #[test]
    fn test_invalid_line_mutates_nothing() {
        let mut c = collector();

        c.handle_line("R=A T=1.0", at(1));
        assert!(matches!(
            c.handle_line("garbage", at(2)),
            LineOutcome::Invalid(_)
        ));
        c.handle_line("R=B T=2.0", at(3));

        let LineOutcome::CycleComplete { batch, .. } = c.handle_line("R=A T=1.5", at(4))
        else {
            panic!("expected CycleComplete");
        };
        assert_eq!(items(&batch), vec![("A", 1.5), ("B", 2.0)]);
    }

    #[test]
    fn test_invalid_line_while_flushed_is_skipped_unparsed() {
        let mut c = collector();

        c.handle_line("R=A T=1.0", at(1));
        c.handle_line("R=A T=1.1", at(2));

        // The flushed short-circuit runs before parsing, so even garbage
        // is reported as skipped rather than invalid.
        assert_eq!(c.handle_line("garbage", at(3)), LineOutcome::AlreadyFlushed);
    }

    #[test]
    fn test_invalid_line_can_still_cross_deadline() {
        let mut c = collector();

        c.handle_line("R=A T=1.0", at(1));
        c.handle_line("R=A T=1.1", at(2)); // flushed

        // A garbage line past the deadline still starts the new cycle
        // before being rejected by the parser.
        assert!(matches!(
            c.handle_line("garbage", at(11)),
            LineOutcome::Invalid(_)
        ));
        assert_eq!(c.handle_line("R=A T=9.0", at(12)), LineOutcome::Stored);
    }
}
