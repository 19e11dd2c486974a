//! Delivery of completed batches to the monitoring backend.

pub mod zabbix;

use anyhow::Result;

use crate::collector::Batch;

/// Sink delivers a completed cycle batch to the monitoring backend.
///
/// Delivery is fire-and-forget: the caller reports failures but never
/// retries, and a failed delivery does not reopen the cycle.
pub trait Sink: Send {
    /// Returns the sink's name for logging.
    fn name(&self) -> &str;

    /// Deliver one batch. Called at most once per sampling cycle.
    fn send(&self, batch: &Batch) -> impl std::future::Future<Output = Result<()>> + Send;
}
