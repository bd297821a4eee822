// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A materialized index over canonical chain history, ported from
//! <https://github.com/filecoin-project/lotus/blob/v1.34.3/chainindex>.
//!
//! The index persists four kinds of rows in sqlite: tipsets with the
//! messages they contain, Ethereum tx-hash mappings for delegated-signature
//! messages, and events produced by message execution together with their
//! entries. The engine is fed `apply`/`revert` notifications by an external
//! chain follower and keeps the index consistent across reorgs by flipping
//! `reverted` flags rather than deleting rows; deletion only happens in the
//! background garbage collector once rows age out of the retention window.
//!
//! Events follow Filecoin's deferred execution model: a message included in
//! tipset `T` only produces its events when `T`'s successor executes, but
//! the events are attributed (and indexed against) `T`.

mod ddl;
mod gc;
mod indexer;

pub use indexer::SqliteChainIndexer;

use crate::blocks::{RawBlockHeader, Tipset};
use crate::eth::{EthChainId, MAINNET_ETH_CHAIN_ID};
use crate::message::{ChainMessage, SignedMessage};
use crate::shim::{clock::ChainEpoch, message::Message};
use cid::Cid;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Actor id of the actor that emitted an event.
pub type ActorID = u64;

#[derive(Debug, Error)]
pub enum Error {
    /// The engine has been shut down; no further mutations are accepted.
    #[error("chain indexer has been closed")]
    Closed,
    #[error("chain index database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The chain-store collaborator the indexer reads tipset contents from. The
/// store is the source of truth; the index only ever materializes what the
/// store can already derive.
pub trait ChainStore {
    /// The current canonical chain head.
    fn heaviest_tipset(&self) -> Arc<Tipset>;

    /// Ordered, de-duplicated messages of a tipset, the same sequence the VM
    /// executes.
    fn messages_for_tipset(&self, ts: &Tipset) -> anyhow::Result<Vec<ChainMessage>>;

    /// The unsigned (BLS) and signed (SECP/delegated) messages of one block.
    fn messages_for_block(
        &self,
        header: &RawBlockHeader,
    ) -> anyhow::Result<(Vec<Message>, Vec<SignedMessage>)>;
}

/// The state-execution collaborator used to derive events. Event derivation
/// needs both tipsets of a parent/child pair: the message is included in
/// `inclusion` but its effects only materialize when `execution` runs.
pub trait StateEvents {
    fn events_for_message(
        &self,
        msg_cid: Cid,
        inclusion: &Tipset,
        execution: &Tipset,
    ) -> anyhow::Result<Vec<Event>>;
}

/// An event emitted during message execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub emitter: ActorID,
    pub entries: Vec<EventEntry>,
}

/// One key/value attribute of an [`Event`]. Entry order within an event is
/// meaningful and preserved by the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventEntry {
    pub flags: u64,
    pub key: String,
    pub codec: u64,
    pub value: Vec<u8>,
}

/// Configuration of the chain indexer, as wired in by the daemon config.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChainIndexerConfig {
    /// Whether the index is maintained at all.
    pub enable_indexer: bool,
    /// How many epochs of history to retain before the garbage collector
    /// removes rows. Non-positive disables GC.
    pub gc_retention_epochs: i64,
    /// Whether an empty index should be reconciled against the chain store on
    /// startup. Consumed by the (external) reconciliation layer, not by the
    /// engine itself.
    pub reconcile_empty_index: bool,
    /// Upper bound on tipsets examined during reconciliation. Consumed by the
    /// (external) reconciliation layer, not by the engine itself.
    pub max_reconcile_tipsets: u64,
    /// Chain id used when deriving Ethereum transaction hashes.
    pub eth_chain_id: EthChainId,
}

impl Default for ChainIndexerConfig {
    fn default() -> Self {
        Self {
            enable_indexer: false,
            gc_retention_epochs: 0,
            reconcile_empty_index: false,
            max_reconcile_tipsets: 3 * 2880, // three days of epochs
            eth_chain_id: MAINNET_ETH_CHAIN_ID,
        }
    }
}

/// Result of validating the index at one epoch, surfaced to the RPC layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexValidation {
    /// Key cid of the non-reverted tipset found at the epoch, if any.
    pub tipset_key_cid: Option<Cid>,
    pub height: ChainEpoch,
    pub non_reverted_message_count: u64,
    pub non_reverted_events_count: u64,
    /// True when the chain has no tipset at this height.
    pub is_null_round: bool,
}
