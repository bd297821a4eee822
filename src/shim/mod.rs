// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Thin wrappers over the `fvm_shared` primitives the index works with,
//! keeping the rest of the crate insulated from the FVM crate surface.

pub mod address;
pub mod clock;
pub mod crypto;
pub mod econ;
pub mod message;
