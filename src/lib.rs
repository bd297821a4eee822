// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A materialized, queryable sqlite index over the canonical Filecoin chain:
//! tipsets, the messages they contain, Ethereum-style transaction hashes
//! derived from delegated-signature messages, and execution-produced events.
//!
//! The index is kept consistent across chain reorganizations: applying and
//! reverting tipsets toggles `reverted` flags instead of rewriting history,
//! and a background garbage collector trims rows that fall out of the
//! configured retention window.
//!
//! The engine in [`chain_index`] is the write coordinator; the chain store
//! and state execution are consumed as collaborator traits at the boundary.

pub mod blocks;
pub mod chain_index;
pub mod eth;
pub mod message;
pub mod shim;
pub mod utils;
