//! Agent wiring: bus consumption, cycle collection, batch delivery.

use std::time::SystemTime;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::LineSource;
use crate::collector::{CycleCollector, LineOutcome};
use crate::config::Config;
use crate::sink::Sink;

/// Counters reported when the agent stops.
#[derive(Debug, Default, Clone, Copy)]
pub struct AgentStats {
    /// Lines pulled from the bus.
    pub lines: u64,

    /// Lines that failed wire-format parsing.
    pub invalid: u64,

    /// Batches handed to the sink.
    pub flushes: u64,

    /// Batches the sink failed to deliver.
    pub delivery_failures: u64,
}

/// Agent runs the sampling loop: pull a line, advance the cycle state
/// machine, deliver the batch when a cycle completes.
///
/// All mutable state is owned here exclusively; there is exactly one
/// logical loop and no locking.
pub struct Agent<L, S> {
    source: L,
    sink: S,
    collector: CycleCollector,
    stats: AgentStats,
}

impl<L: LineSource, S: Sink> Agent<L, S> {
    pub fn new(cfg: &Config, source: L, sink: S) -> Self {
        Self {
            source,
            sink,
            collector: CycleCollector::new(cfg.interval, SystemTime::now()),
            stats: AgentStats::default(),
        }
    }

    /// Run until the bus closes or `cancel` fires.
    ///
    /// Cancellation is observed at the line-read suspension point, so an
    /// in-flight delivery always completes before shutdown. Read errors
    /// are fatal and propagate; the source is released on every exit path.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<AgentStats> {
        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("termination requested, stopping bus consumption");
                    break;
                }
                line = self.source.next_line() => line,
            };

            match line {
                Ok(Some(line)) => self.handle_line(&line).await,
                Ok(None) => {
                    warn!("line source closed");
                    break;
                }
                Err(e) => return Err(e).context("reading from sensor bus"),
            }
        }

        info!(
            lines = self.stats.lines,
            invalid = self.stats.invalid,
            flushes = self.stats.flushes,
            delivery_failures = self.stats.delivery_failures,
            probes = self.collector.known_addresses(),
            "agent stopped",
        );

        Ok(self.stats)
    }

    async fn handle_line(&mut self, line: &str) {
        self.stats.lines += 1;

        match self.collector.handle_line(line, SystemTime::now()) {
            LineOutcome::Stored => {}
            LineOutcome::AlreadyFlushed => {
                debug!("batch already sent this cycle, line skipped");
            }
            LineOutcome::Invalid(e) => {
                self.stats.invalid += 1;
                warn!(error = %e, "invalid line received");
            }
            LineOutcome::CycleComplete { trigger, batch } => {
                self.stats.flushes += 1;
                info!(
                    trigger = %trigger,
                    items = batch.items.len(),
                    sink = self.sink.name(),
                    "cycle complete, sending batch",
                );

                // Failure is reported only; the cycle stays flushed.
                if let Err(e) = self.sink.send(&batch).await {
                    self.stats.delivery_failures += 1;
                    warn!(sink = self.sink.name(), error = %e, "batch delivery failed");
                }
            }
        }
    }
}
