// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use fvm_shared4::clock::ChainEpoch;

/// Duration of each tipset epoch in seconds.
pub const EPOCH_DURATION_SECONDS: i64 = 30;
