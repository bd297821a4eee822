// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod header;
mod tipset;

pub use header::RawBlockHeader;
pub use tipset::{Tipset, TipsetKey};
