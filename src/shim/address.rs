// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use fvm_shared4::address::{Address, Payload};

/// The singleton Ethereum Account Manager actor (`f010`). Messages sent to it
/// with the `CreateExternal` method correspond to Ethereum contract creation.
pub const ETHEREUM_ACCOUNT_MANAGER_ACTOR: Address = Address::new_id(10);

/// The `f4` address namespace managed by the Ethereum Account Manager.
pub const ETHEREUM_ADDRESS_MANAGER_ACTOR_ID: u64 = 10;
