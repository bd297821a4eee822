// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::utils::cid::CidCborExt as _;
use cid::Cid;

pub use fvm_shared4::message::Message;

/// Extension methods for [`Message`].
pub trait MessageExt {
    /// The canonical cid of an unsigned message: `dag-cbor` + `blake2b-256`
    /// over the tuple encoding, matching `abi.CidBuilder` in go.
    fn cid(&self) -> Cid;
}

impl MessageExt for Message {
    fn cid(&self) -> Cid {
        Cid::from_cbor_blake2b256(self).expect("message serialization is infallible")
    }
}
