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

//! Compact image layout shared by theta and tuple sketches.
//!
//! ```text
//! byte 0     preamble longs: 1 empty or single entry, 2 exact, 3 estimation
//! byte 1     serial version (3)
//! byte 2     family id
//! byte 3     sketch type (0 for theta, 1 for tuple)
//! byte 4     unused
//! byte 5     flags
//! bytes 6-7  seed hash
//! bytes 8-11 number of entries (preamble longs >= 2)
//! bytes 12-15 unused
//! bytes 16-23 theta (preamble longs == 3)
//! entries    hash (u64) followed by the summary bytes
//! ```
//!
//! Ordered theta sketches with entries also have a bit-packed form that
//! stores the deltas between consecutive hashes:
//!
//! ```text
//! byte 0     preamble longs: 1 exact, 2 estimation
//! byte 1     serial version (4)
//! byte 2     family id
//! byte 3     bits per delta
//! byte 4     bytes of the entry count
//! byte 5     flags
//! bytes 6-7  seed hash
//! bytes 8-15 theta (preamble longs == 2)
//! then       entry count, little-endian, in the declared number of bytes
//! then       deltas, most significant bit first, padded to a whole byte
//! ```

pub(crate) const SERIAL_VERSION: u8 = 3;
pub(crate) const PACKED_SERIAL_VERSION: u8 = 4;

pub(crate) const PACKED_PREAMBLE_LONGS_EXACT: u8 = 1;
pub(crate) const PACKED_PREAMBLE_LONGS_ESTIMATION: u8 = 2;

pub(crate) const PREAMBLE_LONGS_EMPTY_OR_SINGLE: u8 = 1;
pub(crate) const PREAMBLE_LONGS_EXACT: u8 = 2;
pub(crate) const PREAMBLE_LONGS_ESTIMATION: u8 = 3;

pub(crate) const FLAG_IS_READ_ONLY: u8 = 1 << 1;
pub(crate) const FLAG_IS_EMPTY: u8 = 1 << 2;
pub(crate) const FLAG_IS_COMPACT: u8 = 1 << 3;
pub(crate) const FLAG_IS_ORDERED: u8 = 1 << 4;

pub(crate) const HASH_SIZE_BYTES: usize = 8;

fn low_bits_mask(bits: u8) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Appends `values`, each `bits` wide, most significant bit first.
pub(crate) fn pack_bits(values: impl IntoIterator<Item = u64>, bits: u8, out: &mut Vec<u8>) {
    let mask = low_bits_mask(bits);
    let mut acc: u128 = 0;
    let mut filled = 0u32;
    for value in values {
        acc = (acc << bits) | u128::from(value & mask);
        filled += u32::from(bits);
        while filled >= 8 {
            filled -= 8;
            out.push((acc >> filled) as u8);
        }
        acc &= (1u128 << filled) - 1;
    }
    if filled > 0 {
        out.push((acc << (8 - filled)) as u8);
    }
}

/// Reads `count` values of `bits` each, as written by [`pack_bits`]. Returns
/// `None` if `bytes` is too short.
pub(crate) fn unpack_bits(bytes: &[u8], bits: u8, count: usize) -> Option<Vec<u64>> {
    let needed = count.checked_mul(usize::from(bits))?.div_ceil(8);
    if needed > bytes.len() {
        return None;
    }
    let mask = low_bits_mask(bits);
    let mut input = bytes.iter();
    let mut acc: u128 = 0;
    let mut filled = 0u32;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        while filled < u32::from(bits) {
            acc = (acc << 8) | u128::from(*input.next()?);
            filled += 8;
        }
        filled -= u32::from(bits);
        values.push((acc >> filled) as u64 & mask);
        acc &= (1u128 << filled) - 1;
    }
    Some(values)
}
