// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Retention-based garbage collection of the chain index.
//!
//! Reverted rows are kept until they age out together with everything else,
//! so a deep reorg never resurrects deleted history. A grace period on top of
//! the configured retention keeps rows eligible for revert a little longer
//! than the retention window itself.

use super::ddl::stmts;
use super::{ChainStore, SqliteChainIndexer, StateEvents};
use crate::shim::clock::{ChainEpoch, EPOCH_DURATION_SECONDS};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

pub(super) const CLEANUP_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);

/// Extra epochs kept beyond the configured retention window.
const GRACE_EPOCHS: ChainEpoch = 10;

impl<CS, SE> SqliteChainIndexer<CS, SE>
where
    CS: ChainStore + Send + Sync + 'static,
    SE: StateEvents + Send + Sync + 'static,
{
    pub(super) fn spawn_gc_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.gc_loop().await })
    }

    /// Sweeps once immediately, then every [`CLEANUP_INTERVAL`] until the
    /// engine shuts down.
    async fn gc_loop(&self) {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if self.is_closed() {
                        return;
                    }
                    self.gc().await;
                }
            }
        }
    }

    /// Runs one garbage collection sweep. Tipset rows (with their events, via
    /// cascade) and eth tx hashes are collected independently; a failure in
    /// one sweep is logged and does not abort the other.
    pub async fn gc(&self) {
        let _writer = self.writer_lk.lock().await;
        if self.gc_retention_epochs <= 0 {
            debug!("gc retention epochs is not set, skipping index gc");
            return;
        }
        info!("starting chain index gc");
        let head = self.cs.heaviest_tipset();

        let removal_epoch = head.epoch() - self.gc_retention_epochs - GRACE_EPOCHS;
        if removal_epoch <= 0 {
            info!("chain is younger than the retention window, no tipsets to gc");
        } else {
            match sqlx::query(stmts::REMOVE_TIPSETS_BEFORE_HEIGHT)
                .bind(removal_epoch)
                .execute(&self.db)
                .await
            {
                Ok(res) => info!(
                    "gc'd {} tipset messages before epoch {removal_epoch}",
                    res.rows_affected()
                ),
                Err(e) => error!("failed to gc tipsets before epoch {removal_epoch}: {e}"),
            }
        }

        // eth tx hashes are not tied to an epoch; their age is measured in
        // wall-clock time derived from the head timestamp
        let retention_secs = (self.gc_retention_epochs + GRACE_EPOCHS) * EPOCH_DURATION_SECONDS;
        let gc_time = head.min_timestamp() as i64 - retention_secs;
        if gc_time <= 0 {
            info!("gc cutoff predates the unix epoch, no eth tx hashes to gc");
            return;
        }
        match sqlx::query(stmts::REMOVE_ETH_HASHES_OLDER_THAN)
            .bind(gc_time)
            .execute(&self.db)
            .await
        {
            Ok(res) => info!(
                "gc'd {} eth tx hashes inserted before {}",
                res.rows_affected(),
                format_timestamp(gc_time)
            ),
            Err(e) => error!(
                "failed to gc eth tx hashes inserted before {}: {e}",
                format_timestamp(gc_time)
            ),
        }
    }
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
