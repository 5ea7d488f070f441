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

//! HyperLogLog sketches.
//!
//! Three target HLL types are supported, trading precision for memory:
//!
//! - [`HllType::Hll4`]: 4 bits per bucket (most compact)
//! - [`HllType::Hll6`]: 6 bits per bucket (balanced)
//! - [`HllType::Hll8`]: 8 bits per bucket (highest precision)
//!
//! The target type only decides the serialized layout. In memory a sketch
//! starts as a short list of coupons, grows into a coupon hash set and is
//! finally promoted to an array of 8-bit registers.
//!
//! # Coupons
//!
//! A coupon is a 32-bit value encoding both a slot number (26 bits) and a value (6 bits).
//! The slot identifies which bucket to update, and the value represents the number of
//! leading zeros in the hash plus one.

use std::fmt;

use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::murmur3_128;

mod coupons;
mod estimator;
mod registers;
mod serialization;
mod sketch;
mod union;

pub use sketch::HllSketch;
pub use union::HllUnion;

/// Smallest supported lg_k.
pub const MIN_LG_K: u8 = 4;
/// Largest supported lg_k.
pub const MAX_LG_K: u8 = 21;
/// Default lg_k.
pub const DEFAULT_LG_K: u8 = 12;

/// Target HLL type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HllType {
    #[default]
    Hll4 = 0,
    Hll6 = 1,
    Hll8 = 2,
}

impl HllType {
    pub const fn name(self) -> &'static str {
        match self {
            HllType::Hll4 => "HLL_4",
            HllType::Hll6 => "HLL_6",
            HllType::Hll8 => "HLL_8",
        }
    }
}

impl TryFrom<u8> for HllType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(HllType::Hll4),
            1 => Ok(HllType::Hll6),
            2 => Ok(HllType::Hll8),
            _ => Err(Error::invalid_argument(format!(
                "HLL type must be 0 (HLL_4), 1 (HLL_6) or 2 (HLL_8), got {value}"
            ))),
        }
    }
}

impl fmt::Display for HllType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const KEY_BITS_26: u32 = 26;
const KEY_MASK_26: u32 = (1 << KEY_BITS_26) - 1;

const COUPON_RSE_FACTOR: f64 = 0.409; // at transition point not the asymptote
const COUPON_RSE: f64 = COUPON_RSE_FACTOR / (1 << 13) as f64;

const HIP_RSE_FACTOR: f64 = 0.832_554_611_157_697_7; // sqrt(ln 2)
const NON_HIP_RSE_FACTOR: f64 = 1.038_961_528_208_567_5; // sqrt(3 ln 2 - 1)

/// Extract slot number (low 26 bits) from coupon
#[inline]
fn get_slot(coupon: u32) -> u32 {
    coupon & KEY_MASK_26
}

/// Extract value (upper 6 bits) from coupon
#[inline]
fn get_value(coupon: u32) -> u8 {
    (coupon >> KEY_BITS_26) as u8
}

/// Pack slot number and value into a coupon
///
/// Format: [value (6 bits) << 26] | [slot (26 bits)]
#[inline]
fn pack_coupon(slot: u32, value: u8) -> u32 {
    ((value as u32) << KEY_BITS_26) | (slot & KEY_MASK_26)
}

/// Coupon of a raw input.
fn coupon(data: &[u8]) -> u32 {
    let (lo, hi) = murmur3_128(data, DEFAULT_UPDATE_SEED);
    let addr26 = lo as u32 & KEY_MASK_26;
    let value = hi.leading_zeros().min(62) + 1;
    value << KEY_BITS_26 | addr26
}

/// Estimate of the number of distinct coupons behind `count` observed ones.
fn coupon_estimate(count: usize) -> f64 {
    let slots = (1u64 << KEY_BITS_26) as f64;
    let est = -slots * (1.0 - count as f64 / slots).ln();
    est.max(count as f64)
}
