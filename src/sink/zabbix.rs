//! Zabbix trapper delivery via the `zabbix_sender` utility.
//!
//! Each batch item becomes one input line on the sender's stdin, keyed as
//! `<key>[<address>]` for the configured host. The child is always waited
//! on, even when nothing was written or a write failed part-way.

use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::collector::{Batch, BatchItem};
use crate::config::ZabbixConfig;

use super::Sink;

/// Sends batches to a Zabbix server by piping items into `zabbix_sender`.
pub struct ZabbixSender {
    cfg: ZabbixConfig,
}

impl ZabbixSender {
    pub fn new(cfg: ZabbixConfig) -> Self {
        Self { cfg }
    }
}

impl Sink for ZabbixSender {
    fn name(&self) -> &str {
        "zabbix"
    }

    async fn send(&self, batch: &Batch) -> Result<()> {
        let mut child = Command::new("zabbix_sender")
            .arg("-z")
            .arg(&self.cfg.server)
            .arg("-p")
            .arg(self.cfg.port.to_string())
            .arg("-s")
            .arg(&self.cfg.host)
            .arg("-i")
            .arg("-")
            .stdin(Stdio::piped())
            .spawn()
            .context("spawning zabbix_sender")?;

        let mut stdin = child
            .stdin
            .take()
            .context("zabbix_sender stdin not captured")?;

        let write_result = async {
            for item in &batch.items {
                stdin
                    .write_all(format_item(&self.cfg.key, item).as_bytes())
                    .await?;
            }
            stdin.shutdown().await
        }
        .await;

        // Close the conduit and reap the child no matter how far the
        // writes got.
        drop(stdin);
        let status = child.wait().await.context("waiting for zabbix_sender")?;

        write_result.context("writing items to zabbix_sender")?;

        if !status.success() {
            bail!("zabbix_sender exited with {status}");
        }

        debug!(items = batch.items.len(), "batch delivered");

        Ok(())
    }
}

/// Format one batch item as a `zabbix_sender` input line.
///
/// The leading `-` stands for the host given with `-s` on the sender's
/// command line.
fn format_item(key: &str, item: &BatchItem) -> String {
    format!("- {}[{}] {}\n", key, item.address, item.temperature)
}
