// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use nunny::Vec as NonEmpty;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::blocks::RawBlockHeader;
use crate::shim::clock::ChainEpoch;

/// A set of `CID`s forming a unique key for a Tipset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TipsetKey(NonEmpty<Cid>);

impl TipsetKey {
    pub fn cids(&self) -> &[Cid] {
        &self.0
    }

    /// The content identifier of the key itself: `dag-cbor` + `blake2b-256`
    /// over the concatenated block cids, matching `TipSetKey.Cid()` in go.
    /// This is the identity under which tipsets are persisted in the index.
    pub fn cid(&self) -> Cid {
        let mut bytes = Vec::new();
        for cid in self.0.iter() {
            bytes.extend(cid.to_bytes());
        }
        Cid::new_v1(
            fvm_ipld_encoding::DAG_CBOR,
            Code::Blake2b256.digest(&bytes),
        )
    }
}

impl From<NonEmpty<Cid>> for TipsetKey {
    fn from(cids: NonEmpty<Cid>) -> Self {
        Self(cids)
    }
}

impl fmt::Display for TipsetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self
            .0
            .iter()
            .map(|cid| cid.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{{{s}}}")
    }
}

/// An immutable set of blocks at the same height with the same parent set.
#[derive(Clone, Debug)]
pub struct Tipset {
    headers: NonEmpty<RawBlockHeader>,
    // key is lazily initialized via `fn key()`.
    key: OnceLock<TipsetKey>,
}

impl PartialEq for Tipset {
    fn eq(&self, other: &Self) -> bool {
        self.headers == other.headers
    }
}

impl Eq for Tipset {}

impl From<RawBlockHeader> for Tipset {
    fn from(header: RawBlockHeader) -> Self {
        Self {
            headers: nunny::vec![header],
            key: OnceLock::new(),
        }
    }
}

impl Tipset {
    pub fn new(headers: NonEmpty<RawBlockHeader>) -> Self {
        Self {
            headers,
            key: OnceLock::new(),
        }
    }

    /// Returns the smallest timestamp of all blocks in the tipset
    pub fn min_timestamp(&self) -> u64 {
        self.headers
            .iter()
            .map(|header| header.timestamp)
            .min()
            .expect("Infallible")
    }

    /// Returns epoch of the tipset.
    pub fn epoch(&self) -> ChainEpoch {
        self.headers.first().epoch
    }

    /// Returns all blocks in tipset.
    pub fn block_headers(&self) -> &NonEmpty<RawBlockHeader> {
        &self.headers
    }

    /// Returns the tipset's calculated key.
    pub fn key(&self) -> &TipsetKey {
        self.key.get_or_init(|| {
            let mut cids = nunny::vec![self.headers.first().cid()];
            for header in self.headers.iter().skip(1) {
                cids.push(header.cid());
            }
            TipsetKey::from(cids)
        })
    }
}
