// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::blocks::TipsetKey;
use crate::shim::{address::Address, clock::ChainEpoch};
use crate::utils::cid::CidCborExt as _;
use cid::Cid;
use fvm_ipld_encoding::tuple::*;

/// The fields of a block header the index cares about. The header is hashed
/// as a whole (`dag-cbor` + `blake2b-256`) to produce the block cid that
/// tipset keys are built from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize_tuple, Deserialize_tuple)]
pub struct RawBlockHeader {
    /// The actor address of the miner that produced the block
    pub miner_address: Address,
    /// The tipset this block was mined on top of
    pub parents: TipsetKey,
    /// The chain epoch the block belongs to
    pub epoch: ChainEpoch,
    /// The root cid of the message collection included in the block
    pub messages: Cid,
    /// The block timestamp, in seconds since the unix epoch
    pub timestamp: u64,
}

impl RawBlockHeader {
    pub fn cid(&self) -> Cid {
        Cid::from_cbor_blake2b256(self).expect("block header serialization is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cid::Cid;
    use multihash_codetable::{Code, MultihashDigest};

    fn dummy_cid(i: u64) -> Cid {
        Cid::new_v1(
            fvm_ipld_encoding::DAG_CBOR,
            Code::Blake2b256.digest(&i.to_be_bytes()),
        )
    }

    #[test]
    fn header_cid_depends_on_contents() {
        let header = RawBlockHeader {
            miner_address: Address::new_id(1000),
            parents: TipsetKey::from(nunny::vec![dummy_cid(0)]),
            epoch: 1,
            messages: dummy_cid(1),
            timestamp: 100,
        };
        let mut other = header.clone();
        assert_eq!(header.cid(), other.cid());
        other.epoch = 2;
        assert_ne!(header.cid(), other.cid());
    }
}
