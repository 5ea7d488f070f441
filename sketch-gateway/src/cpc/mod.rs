// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Compressed Probabilistic Counting sketches.
//!
//! Every input sets one bit of a conceptual `k x 64` matrix: the row comes
//! from the low bits of the hash, the column from the number of leading
//! zeros of its other half. A sketch starts with a sparse set of coupons
//! and is promoted to one 64-bit mask per row once it holds 3k/32 coupons.

mod confidence;
mod estimator;
mod serialization;
mod sketch;
mod union;

pub use sketch::CpcSketch;
pub use union::CpcUnion;

/// Default log2 of K.
pub const DEFAULT_LG_K: u8 = 11;
/// Min log2 of K.
pub const MIN_LG_K: u8 = 4;
/// Max log2 of K.
pub const MAX_LG_K: u8 = 26;

/// Coupon of a hash pair: `row << 6 | col`.
fn row_col(lg_k: u8, h1: u64, h2: u64) -> u32 {
    let k = 1u64 << lg_k;
    let col = h2.leading_zeros().min(63);
    let row = (h1 & (k - 1)) as u32;
    (row << 6) | col
}

/// Flavor names by coupon count, used in debug strings.
fn flavor(lg_k: u8, num_coupons: u64) -> &'static str {
    let k = 1u64 << lg_k;
    if num_coupons == 0 {
        "EMPTY"
    } else if num_coupons << 5 < 3 * k {
        "SPARSE"
    } else if num_coupons << 1 < k {
        "HYBRID"
    } else if num_coupons << 3 < 27 * k {
        "PINNED"
    } else {
        "SLIDING"
    }
}
