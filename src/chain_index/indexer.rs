// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::ddl::{self, stmts};
use super::{ChainIndexerConfig, ChainStore, Error, IndexValidation, StateEvents};
use crate::blocks::Tipset;
use crate::eth::{EthChainId, EthHash, EthTx};
use crate::message::SignedMessage;
use crate::shim::clock::ChainEpoch;
use crate::utils::sqlite::{init_db, open_file};
use anyhow::{Context as _, anyhow};
use cid::Cid;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-subscriber buffer of pending update notifications. A subscriber that
/// falls further behind than this misses notifications rather than slowing
/// down the writer.
const UPDATE_CHANNEL_CAP: usize = 16;

/// The chain index engine. All mutations run behind a single writer lock and
/// inside one sqlite transaction each, so observers only ever see the index
/// before or after a chain-state transition, never mid-write.
///
/// `CS` supplies tipset contents, `SE` derives execution events; both are
/// only consulted while the writer lock is held.
pub struct SqliteChainIndexer<CS, SE> {
    pub(crate) db: SqlitePool,
    pub(super) cs: Arc<CS>,
    pub(super) state_events: Arc<SE>,
    pub(super) eth_chain_id: EthChainId,
    pub(super) gc_retention_epochs: i64,
    // serializes apply, revert, gc and validation against each other
    pub(super) writer_lk: tokio::sync::Mutex<()>,
    pub(super) closed: parking_lot::RwLock<bool>,
    update_subs: parking_lot::Mutex<HashMap<u64, flume::Sender<()>>>,
    sub_id_counter: AtomicU64,
    pub(super) cancel: CancellationToken,
    gc_handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<CS, SE> SqliteChainIndexer<CS, SE>
where
    CS: ChainStore + Send + Sync + 'static,
    SE: StateEvents + Send + Sync + 'static,
{
    /// Creates an engine over an already-opened pool: applies the schema,
    /// then prepares every statement so malformed SQL fails construction.
    pub async fn new(
        db: SqlitePool,
        cs: Arc<CS>,
        state_events: Arc<SE>,
        config: &ChainIndexerConfig,
    ) -> anyhow::Result<Self> {
        init_db(
            &db,
            "chain index",
            ddl::DDLS.iter().map(|&ddl| sqlx::query(ddl)),
            vec![],
        )
        .await
        .context("failed to init chain index database")?;
        ddl::prepare_statements(&db).await?;

        Ok(Self {
            db,
            cs,
            state_events,
            eth_chain_id: config.eth_chain_id,
            gc_retention_epochs: config.gc_retention_epochs,
            writer_lk: tokio::sync::Mutex::new(()),
            closed: parking_lot::RwLock::new(false),
            update_subs: parking_lot::Mutex::new(HashMap::new()),
            sub_id_counter: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            gc_handle: parking_lot::Mutex::new(None),
        })
    }

    /// Opens (or creates) the index database at `path` and builds an engine
    /// over it.
    pub async fn open(
        path: &Path,
        cs: Arc<CS>,
        state_events: Arc<SE>,
        config: &ChainIndexerConfig,
    ) -> anyhow::Result<Self> {
        let db = open_file(path)
            .await
            .context("failed to open chain index database")?;
        Self::new(db, cs, state_events, config).await
    }

    /// Starts the background garbage collection task. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.gc_handle.lock();
        if handle.is_some() {
            return;
        }
        *handle = Some(self.spawn_gc_loop());
        info!("chain indexer started");
    }

    /// Shuts the engine down: rejects new work, stops the garbage collector
    /// and closes the database. In-flight writes holding the writer lock run
    /// to completion first. Idempotent.
    pub async fn close(&self) -> anyhow::Result<()> {
        {
            let mut closed = self.closed.write();
            if *closed {
                return Ok(());
            }
            *closed = true;
        }
        self.cancel.cancel();
        // dropping the senders disconnects all subscribers
        self.update_subs.lock().clear();

        let handle = self.gc_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("chain index gc task failed to shut down cleanly: {e}");
            }
        }

        // waits for the writer lock holder; the pool refuses new acquires
        let _writer = self.writer_lk.lock().await;
        self.db.close().await;
        info!("chain indexer closed");
        Ok(())
    }

    pub(super) fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.is_closed() {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    /// Advances the index to a new chain head: indexes `to` and derives the
    /// events that `to`'s execution produced for the messages of `from`.
    /// Atomic; on error the index is left exactly as it was.
    pub async fn apply(&self, from: &Tipset, to: &Tipset) -> Result<(), Error> {
        let _writer = self.writer_lk.lock().await;
        self.ensure_open()?;

        debug!(from = from.epoch(), to = to.epoch(), "applying tipset");
        let mut tx = self.db.begin().await?;
        self.index_tipset_with_parent_events(tx.as_mut(), from, to)
            .await
            .with_context(|| format!("error indexing tipset at epoch {}", to.epoch()))?;
        tx.commit().await.context("error applying tipset")?;

        self.notify_update_subs();
        Ok(())
    }

    /// Unwinds the chain head from `from` back to its parent `to`: `from`'s
    /// rows are soft-tombstoned via the `reverted` flag, never deleted, and
    /// the events attributed to `to` (which `from`'s execution derived) are
    /// marked reverted as well.
    pub async fn revert(&self, from: &Tipset, to: &Tipset) -> Result<(), Error> {
        let _writer = self.writer_lk.lock().await;
        self.ensure_open()?;

        debug!(from = from.epoch(), to = to.epoch(), "reverting tipset");
        let revert_key = from.key().cid().to_bytes();
        let events_key = to.key().cid().to_bytes();

        let mut tx = self.db.begin().await?;
        sqlx::query(stmts::UPDATE_TIPSET_TO_REVERTED)
            .bind(&revert_key)
            .execute(tx.as_mut())
            .await
            .context("error marking tipset reverted")?;
        // the parent may never have been indexed (e.g. a fresh index); make
        // sure it is present and non-reverted before it becomes the head
        self.index_tipset(tx.as_mut(), to)
            .await
            .with_context(|| format!("error indexing tipset at epoch {}", to.epoch()))?;
        sqlx::query(stmts::UPDATE_EVENTS_TO_REVERTED)
            .bind(&events_key)
            .execute(tx.as_mut())
            .await
            .context("error marking events reverted")?;
        tx.commit().await.context("error reverting tipset")?;

        self.notify_update_subs();
        Ok(())
    }

    /// Indexes the Ethereum transaction hash of a delegated-signature message
    /// observed outside a tipset, e.g. on mempool admission. Messages with
    /// other signature types are ignored.
    pub async fn index_signed_message(&self, msg: &SignedMessage) -> Result<(), Error> {
        if !msg.is_delegated() {
            return Ok(());
        }
        let _writer = self.writer_lk.lock().await;
        self.ensure_open()?;

        let mut tx = self.db.begin().await?;
        self.index_signed_message_with(tx.as_mut(), msg).await?;
        tx.commit().await.context("error indexing signed message")?;
        Ok(())
    }

    /// Records an Ethereum tx hash to message cid mapping. Re-indexing an
    /// existing hash refreshes its insertion time, restarting its retention
    /// clock.
    pub async fn index_eth_tx_hash(&self, tx_hash: &EthHash, msg_cid: Cid) -> Result<(), Error> {
        let _writer = self.writer_lk.lock().await;
        self.ensure_open()?;

        let mut tx = self.db.begin().await?;
        index_eth_tx_hash_with(tx.as_mut(), tx_hash, msg_cid).await?;
        tx.commit().await.context("error indexing eth tx hash")?;
        Ok(())
    }

    /// Looks up the message cid a derived Ethereum transaction hash maps to.
    pub async fn get_msg_cid_from_eth_hash(
        &self,
        tx_hash: &EthHash,
    ) -> Result<Option<Cid>, Error> {
        self.ensure_open()?;
        let bytes: Option<Vec<u8>> = sqlx::query_scalar(stmts::GET_MSG_CID_FROM_ETH_HASH)
            .bind(tx_hash.to_string())
            .fetch_optional(&self.db)
            .await?;
        match bytes {
            Some(bytes) => Ok(Some(
                Cid::try_from(bytes.as_slice()).context("invalid message cid in index")?,
            )),
            None => Ok(None),
        }
    }

    /// Checks the index at one epoch against the store's canonical chain.
    /// Reports whether the height is a null round and, otherwise, the indexed
    /// tipset with its non-reverted message and event counts.
    ///
    /// `backfill` on a missing entry is not supported by this engine; missing
    /// history is repaired by the startup reconciliation layer instead.
    pub async fn chain_validate_index(
        &self,
        epoch: ChainEpoch,
        backfill: bool,
    ) -> Result<IndexValidation, Error> {
        if backfill {
            return Err(anyhow!(
                "backfill is not supported; re-run with reconciliation enabled to repair missing history"
            )
            .into());
        }
        // exclude concurrent apply/revert so the validated snapshot is stable
        let _writer = self.writer_lk.lock().await;
        self.ensure_open()?;

        let head = self.cs.heaviest_tipset();
        if epoch >= head.epoch() {
            return Err(anyhow!(
                "cannot validate index at epoch {epoch}: chain head is at {}",
                head.epoch()
            )
            .into());
        }

        let is_empty: bool = sqlx::query_scalar(stmts::IS_INDEX_EMPTY)
            .fetch_one(&self.db)
            .await?;
        if is_empty {
            return Err(anyhow!("cannot validate index at epoch {epoch}: index is empty").into());
        }

        let (reverted_count, non_reverted_count): (i64, i64) =
            sqlx::query_as(stmts::COUNT_TIPSETS_AT_HEIGHT)
                .bind(epoch)
                .fetch_one(&self.db)
                .await?;

        if reverted_count == 0 && non_reverted_count == 0 {
            let min_height: Option<i64> = sqlx::query_scalar(stmts::GET_MIN_NON_REVERTED_HEIGHT)
                .fetch_one(&self.db)
                .await?;
            if let Some(min_height) = min_height
                && epoch < min_height
            {
                return Err(anyhow!(
                    "cannot validate index at epoch {epoch}: index only covers epochs >= {min_height}"
                )
                .into());
            }
            // nothing was ever indexed at this height, so the chain skipped it
            return Ok(IndexValidation {
                tipset_key_cid: None,
                height: epoch,
                non_reverted_message_count: 0,
                non_reverted_events_count: 0,
                is_null_round: true,
            });
        }
        if non_reverted_count == 0 {
            return Err(anyhow!(
                "index corruption at epoch {epoch}: all {reverted_count} known tipsets are reverted"
            )
            .into());
        }

        let key_bytes: Vec<u8> = sqlx::query_scalar(stmts::GET_NON_REVERTED_TIPSET_AT_HEIGHT)
            .bind(epoch)
            .fetch_one(&self.db)
            .await?;
        let message_count: i64 = sqlx::query_scalar(stmts::GET_NON_REVERTED_MESSAGE_COUNT)
            .bind(&key_bytes)
            .fetch_one(&self.db)
            .await?;
        let events_count: i64 = sqlx::query_scalar(stmts::GET_NON_REVERTED_EVENT_COUNT)
            .bind(&key_bytes)
            .fetch_one(&self.db)
            .await?;
        let tipset_key_cid =
            Cid::try_from(key_bytes.as_slice()).context("invalid tipset key cid in index")?;

        Ok(IndexValidation {
            tipset_key_cid: Some(tipset_key_cid),
            height: epoch,
            non_reverted_message_count: message_count as u64,
            non_reverted_events_count: events_count as u64,
            is_null_round: false,
        })
    }

    /// Registers for index-update notifications, delivered after every
    /// committed `apply` or `revert`. The returned id is the handle for
    /// [`Self::unsubscribe_updates`]; dropping the receiver has the same
    /// effect lazily.
    pub fn subscribe_updates(&self) -> (u64, flume::Receiver<()>) {
        let id = self.sub_id_counter.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = flume::bounded(UPDATE_CHANNEL_CAP);
        self.update_subs.lock().insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe_updates(&self, id: u64) {
        self.update_subs.lock().remove(&id);
    }

    fn notify_update_subs(&self) {
        self.update_subs.lock().retain(|id, sub| {
            match sub.try_send(()) {
                Ok(()) => true,
                // a slow subscriber misses this update; it must not stall the
                // writer
                Err(flume::TrySendError::Full(())) => {
                    warn!(sub = *id, "dropping index update notification for slow subscriber");
                    true
                }
                Err(flume::TrySendError::Disconnected(())) => false,
            }
        });
    }

    async fn index_tipset_with_parent_events(
        &self,
        conn: &mut SqliteConnection,
        parent: &Tipset,
        current: &Tipset,
    ) -> anyhow::Result<()> {
        // the parent may be unindexed when the engine attaches to a chain
        // mid-history; its rows must exist before events can reference them
        self.index_tipset(conn, parent).await?;
        self.index_tipset(conn, current).await?;
        self.index_events(conn, parent, current).await
    }

    /// Indexes the messages of one tipset plus the eth tx hashes of its
    /// delegated-signature messages. A tipset already present in the index is
    /// only restored to non-reverted; its rows are not re-derived.
    async fn index_tipset(&self, conn: &mut SqliteConnection, ts: &Tipset) -> anyhow::Result<()> {
        let key_bytes = ts.key().cid().to_bytes();
        if restore_tipset_if_exists(conn, &key_bytes).await? {
            return Ok(());
        }

        let height = ts.epoch();
        let msgs = self
            .cs
            .messages_for_tipset(ts)
            .context("failed to get messages for tipset")?;

        if msgs.is_empty() {
            // a tipset with no messages gets a placeholder row so that it is
            // still marked as indexed
            sqlx::query(stmts::INSERT_TIPSET_MESSAGE)
                .bind(&key_bytes)
                .bind(height)
                .bind(0)
                .bind(Option::<Vec<u8>>::None)
                .bind(-1)
                .execute(&mut *conn)
                .await
                .context("failed to insert empty tipset")?;
            return Ok(());
        }

        for (i, msg) in msgs.iter().enumerate() {
            sqlx::query(stmts::INSERT_TIPSET_MESSAGE)
                .bind(&key_bytes)
                .bind(height)
                .bind(0)
                .bind(msg.cid().to_bytes())
                .bind(i as i64)
                .execute(&mut *conn)
                .await
                .context("failed to insert tipset message")?;
        }

        for header in ts.block_headers() {
            let (_, secp_msgs) = self
                .cs
                .messages_for_block(header)
                .context("failed to get messages for block")?;
            for smsg in &secp_msgs {
                if !smsg.is_delegated() {
                    continue;
                }
                self.index_signed_message_with(&mut *conn, smsg)
                    .await
                    .with_context(|| {
                        format!("failed to index eth tx hash for message {}", smsg.cid())
                    })?;
            }
        }

        Ok(())
    }

    /// Indexes the events that `current`'s execution produced for the
    /// messages included in `parent`, attributing them to `parent`. If events
    /// for `parent` exist already they are restored instead of re-derived;
    /// execution is deterministic for a given parent/child pair.
    async fn index_events(
        &self,
        conn: &mut SqliteConnection,
        parent: &Tipset,
        current: &Tipset,
    ) -> anyhow::Result<()> {
        let parent_key_bytes = parent.key().cid().to_bytes();

        let has_events: bool = sqlx::query_scalar(stmts::HAS_EVENTS_FOR_TIPSET)
            .bind(&parent_key_bytes)
            .fetch_one(&mut *conn)
            .await?;
        if has_events {
            sqlx::query(stmts::UPDATE_EVENTS_TO_NON_REVERTED)
                .bind(&parent_key_bytes)
                .execute(&mut *conn)
                .await
                .context("failed to restore events")?;
            return Ok(());
        }

        let msgs = self
            .cs
            .messages_for_tipset(parent)
            .context("failed to get messages for tipset")?;
        for msg in &msgs {
            let events = self
                .state_events
                .events_for_message(msg.cid(), parent, current)
                .with_context(|| format!("failed to load events for message {}", msg.cid()))?;
            if events.is_empty() {
                continue;
            }

            let message_id: i64 = sqlx::query_scalar(stmts::GET_MSG_ID_FOR_MSG_CID_AND_TIPSET)
                .bind(&parent_key_bytes)
                .bind(msg.cid().to_bytes())
                .fetch_optional(&mut *conn)
                .await?
                .with_context(|| format!("message {} not indexed for tipset", msg.cid()))?;

            for (i, event) in events.iter().enumerate() {
                let res = sqlx::query(stmts::INSERT_EVENT)
                    .bind(message_id)
                    .bind(&parent_key_bytes)
                    .bind(i as i64)
                    .bind(event.emitter as i64)
                    .bind(0)
                    .execute(&mut *conn)
                    .await
                    .context("failed to insert event")?;
                let event_id = res.last_insert_rowid();
                for entry in &event.entries {
                    sqlx::query(stmts::INSERT_EVENT_ENTRY)
                        .bind(event_id)
                        .bind(entry.flags as i64)
                        .bind(&entry.key)
                        .bind(entry.codec as i64)
                        .bind(&entry.value)
                        .execute(&mut *conn)
                        .await
                        .context("failed to insert event entry")?;
                }
            }
        }

        Ok(())
    }

    async fn index_signed_message_with(
        &self,
        conn: &mut SqliteConnection,
        msg: &SignedMessage,
    ) -> anyhow::Result<()> {
        let eth_tx = EthTx::from_signed_message(self.eth_chain_id, msg)
            .context("error converting filecoin message to eth tx")?;
        let tx_hash = eth_tx.eth_hash().context("error hashing transaction")?;
        index_eth_tx_hash_with(conn, &tx_hash, msg.cid()).await
    }
}

async fn restore_tipset_if_exists(
    conn: &mut SqliteConnection,
    key_bytes: &[u8],
) -> anyhow::Result<bool> {
    let exists: bool = sqlx::query_scalar(stmts::HAS_TIPSET)
        .bind(key_bytes)
        .fetch_one(&mut *conn)
        .await?;
    if exists {
        sqlx::query(stmts::UPDATE_TIPSET_TO_NON_REVERTED)
            .bind(key_bytes)
            .execute(&mut *conn)
            .await
            .context("failed to restore tipset")?;
    }
    Ok(exists)
}

async fn index_eth_tx_hash_with(
    conn: &mut SqliteConnection,
    tx_hash: &EthHash,
    msg_cid: Cid,
) -> anyhow::Result<()> {
    sqlx::query(stmts::INSERT_ETH_TX_HASH)
        .bind(tx_hash.to_string())
        .bind(msg_cid.to_bytes())
        .execute(conn)
        .await
        .context("failed to insert eth tx hash")?;
    Ok(())
}
