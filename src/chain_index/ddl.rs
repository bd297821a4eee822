// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Schema and statements of the chain index database.
//!
//! `tipset_message` is the spine of the index: one row per message per
//! tipset, or a single placeholder row with a NULL `message_cid` for tipsets
//! that contain no messages (so an indexed empty tipset is distinguishable
//! from an unindexed one). `event` rows hang off their inclusion
//! `tipset_message` row and cascade away with it; `eth_tx_hash` rows live on
//! their own wall-clock retention schedule.

use anyhow::Context as _;
use sqlx::{Executor as _, SqlitePool};

/// Schema, applied in order by `init_db` on an empty database.
pub(super) const DDLS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tipset_message (
        id INTEGER PRIMARY KEY,
        tipset_key_cid BLOB NOT NULL,
        height INTEGER NOT NULL,
        reverted INTEGER NOT NULL,
        message_cid BLOB,
        message_index INTEGER,
        UNIQUE (tipset_key_cid, message_cid)
    )",
    "CREATE INDEX IF NOT EXISTS tipset_message_height ON tipset_message (height)",
    "CREATE INDEX IF NOT EXISTS tipset_message_cid ON tipset_message (message_cid)",
    "CREATE TABLE IF NOT EXISTS eth_tx_hash (
        tx_hash TEXT PRIMARY KEY,
        message_cid BLOB NOT NULL,
        inserted_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
    )",
    "CREATE INDEX IF NOT EXISTS eth_tx_hash_inserted_at ON eth_tx_hash (inserted_at)",
    "CREATE TABLE IF NOT EXISTS event (
        id INTEGER PRIMARY KEY,
        message_id INTEGER NOT NULL,
        tipset_key_cid BLOB NOT NULL,
        event_index INTEGER NOT NULL,
        emitter_id INTEGER NOT NULL,
        reverted INTEGER NOT NULL,
        FOREIGN KEY (message_id) REFERENCES tipset_message (id) ON DELETE CASCADE
    )",
    "CREATE INDEX IF NOT EXISTS event_tipset_key_cid ON event (tipset_key_cid)",
    "CREATE TABLE IF NOT EXISTS event_entry (
        event_id INTEGER NOT NULL,
        flags INTEGER NOT NULL,
        key TEXT NOT NULL,
        codec INTEGER NOT NULL,
        value BLOB NOT NULL,
        FOREIGN KEY (event_id) REFERENCES event (id) ON DELETE CASCADE
    )",
    "CREATE INDEX IF NOT EXISTS event_entry_event_id ON event_entry (event_id)",
];

pub(super) mod stmts {
    pub const INSERT_TIPSET_MESSAGE: &str = "INSERT INTO tipset_message \
        (tipset_key_cid, height, reverted, message_cid, message_index) \
        VALUES (?, ?, ?, ?, ?) \
        ON CONFLICT (tipset_key_cid, message_cid) DO UPDATE SET reverted = 0";

    pub const HAS_TIPSET: &str =
        "SELECT EXISTS (SELECT 1 FROM tipset_message WHERE tipset_key_cid = ?)";

    pub const UPDATE_TIPSET_TO_REVERTED: &str =
        "UPDATE tipset_message SET reverted = 1 WHERE tipset_key_cid = ?";

    pub const UPDATE_TIPSET_TO_NON_REVERTED: &str =
        "UPDATE tipset_message SET reverted = 0 WHERE tipset_key_cid = ?";

    pub const REMOVE_TIPSETS_BEFORE_HEIGHT: &str = "DELETE FROM tipset_message WHERE height < ?";

    pub const INSERT_ETH_TX_HASH: &str = "INSERT INTO eth_tx_hash (tx_hash, message_cid) \
        VALUES (?, ?) \
        ON CONFLICT (tx_hash) DO UPDATE SET inserted_at = strftime('%s', 'now')";

    pub const GET_MSG_CID_FROM_ETH_HASH: &str =
        "SELECT message_cid FROM eth_tx_hash WHERE tx_hash = ?";

    pub const REMOVE_ETH_HASHES_OLDER_THAN: &str =
        "DELETE FROM eth_tx_hash WHERE inserted_at < ?";

    pub const GET_MSG_ID_FOR_MSG_CID_AND_TIPSET: &str = "SELECT id FROM tipset_message \
        WHERE tipset_key_cid = ? AND message_cid = ? AND reverted = 0";

    pub const INSERT_EVENT: &str = "INSERT INTO event \
        (message_id, tipset_key_cid, event_index, emitter_id, reverted) \
        VALUES (?, ?, ?, ?, ?)";

    pub const INSERT_EVENT_ENTRY: &str = "INSERT INTO event_entry \
        (event_id, flags, key, codec, value) \
        VALUES (?, ?, ?, ?, ?)";

    pub const UPDATE_EVENTS_TO_REVERTED: &str =
        "UPDATE event SET reverted = 1 WHERE tipset_key_cid = ?";

    pub const UPDATE_EVENTS_TO_NON_REVERTED: &str =
        "UPDATE event SET reverted = 0 WHERE tipset_key_cid = ?";

    pub const HAS_EVENTS_FOR_TIPSET: &str =
        "SELECT EXISTS (SELECT 1 FROM event WHERE tipset_key_cid = ?)";

    pub const COUNT_TIPSETS_AT_HEIGHT: &str = "SELECT \
        COUNT(CASE WHEN reverted = 1 THEN 1 END), \
        COUNT(CASE WHEN reverted = 0 THEN 1 END) \
        FROM (SELECT tipset_key_cid, MAX(reverted) AS reverted \
              FROM tipset_message WHERE height = ? GROUP BY tipset_key_cid)";

    pub const GET_NON_REVERTED_TIPSET_AT_HEIGHT: &str = "SELECT tipset_key_cid \
        FROM tipset_message WHERE height = ? AND reverted = 0 LIMIT 1";

    pub const GET_NON_REVERTED_MESSAGE_COUNT: &str = "SELECT COUNT(*) FROM tipset_message \
        WHERE tipset_key_cid = ? AND reverted = 0 AND message_cid IS NOT NULL";

    pub const GET_NON_REVERTED_EVENT_COUNT: &str = "SELECT COUNT(*) FROM event \
        WHERE tipset_key_cid = ? AND reverted = 0";

    pub const IS_INDEX_EMPTY: &str =
        "SELECT NOT EXISTS (SELECT 1 FROM tipset_message LIMIT 1)";

    pub const GET_MIN_NON_REVERTED_HEIGHT: &str =
        "SELECT MIN(height) FROM tipset_message WHERE reverted = 0";

    /// All statements with a human-readable name for prepare-time diagnostics.
    pub const ALL: &[(&str, &str)] = &[
        ("insert_tipset_message", INSERT_TIPSET_MESSAGE),
        ("has_tipset", HAS_TIPSET),
        ("update_tipset_to_reverted", UPDATE_TIPSET_TO_REVERTED),
        ("update_tipset_to_non_reverted", UPDATE_TIPSET_TO_NON_REVERTED),
        ("remove_tipsets_before_height", REMOVE_TIPSETS_BEFORE_HEIGHT),
        ("insert_eth_tx_hash", INSERT_ETH_TX_HASH),
        ("get_msg_cid_from_eth_hash", GET_MSG_CID_FROM_ETH_HASH),
        ("remove_eth_hashes_older_than", REMOVE_ETH_HASHES_OLDER_THAN),
        (
            "get_msg_id_for_msg_cid_and_tipset",
            GET_MSG_ID_FOR_MSG_CID_AND_TIPSET,
        ),
        ("insert_event", INSERT_EVENT),
        ("insert_event_entry", INSERT_EVENT_ENTRY),
        ("update_events_to_reverted", UPDATE_EVENTS_TO_REVERTED),
        ("update_events_to_non_reverted", UPDATE_EVENTS_TO_NON_REVERTED),
        ("has_events_for_tipset", HAS_EVENTS_FOR_TIPSET),
        ("count_tipsets_at_height", COUNT_TIPSETS_AT_HEIGHT),
        (
            "get_non_reverted_tipset_at_height",
            GET_NON_REVERTED_TIPSET_AT_HEIGHT,
        ),
        ("get_non_reverted_message_count", GET_NON_REVERTED_MESSAGE_COUNT),
        ("get_non_reverted_event_count", GET_NON_REVERTED_EVENT_COUNT),
        ("is_index_empty", IS_INDEX_EMPTY),
        ("get_min_non_reverted_height", GET_MIN_NON_REVERTED_HEIGHT),
    ];
}

/// Prepares every statement once at construction time so that malformed SQL
/// fails engine creation instead of the first mutation that reaches it.
pub(super) async fn prepare_statements(db: &SqlitePool) -> anyhow::Result<()> {
    for (name, sql) in stmts::ALL {
        db.prepare(sql)
            .await
            .with_context(|| format!("failed to prepare statement {name}"))?;
    }
    Ok(())
}
