// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod signed_message;

pub use signed_message::SignedMessage;

use crate::shim::message::{Message, MessageExt as _};
use cid::Cid;

/// Enum to encapsulate signed and unsigned messages. Useful when the message
/// type is unknown.
#[derive(Clone, Debug, PartialEq)]
pub enum ChainMessage {
    Unsigned(Message),
    Signed(SignedMessage),
}

impl ChainMessage {
    pub fn cid(&self) -> Cid {
        match self {
            ChainMessage::Unsigned(msg) => msg.cid(),
            ChainMessage::Signed(msg) => msg.cid(),
        }
    }

    pub fn message(&self) -> &Message {
        match self {
            ChainMessage::Unsigned(msg) => msg,
            ChainMessage::Signed(msg) => msg.message(),
        }
    }
}
