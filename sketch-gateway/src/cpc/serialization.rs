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

//! Binary image of a CPC sketch.
//!
//! ```text
//! byte 0      preamble ints: 2 empty, 4 merged, 8 with HIP state
//! byte 1      serial version
//! byte 2      family id (16)
//! byte 3      lg_k
//! byte 4      window offset (windowed form only)
//! byte 5      flags
//! bytes 6..8  seed hash
//! u32         number of coupons
//! u32         number of table entries
//! f64, f64    kxp and HIP accumulator, when FLAG_HAS_HIP is set
//! ...         payload: k window bytes, then table entries (u32 row_col,
//!             ascending), or k row masks (u64)
//! ```
//!
//! Sparse sketches carry only the table. Dense sketches carry an 8-bit
//! window per row plus the coupons outside it that disagree with the
//! window's assumption (zeros left of it, ones right of it), or the raw
//! row masks when that is smaller.

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::family::Family;
use crate::codec::make_error;
use crate::cpc::CpcSketch;
use crate::cpc::MAX_LG_K;
use crate::cpc::MIN_LG_K;
use crate::cpc::sketch::Coupons;
use crate::cpc::sketch::row_cols_of;
use crate::error::Error;
use crate::hash::compute_seed_hash;

pub(super) const SERIAL_VERSION: u8 = 1;
pub(super) const FLAG_COMPRESSED: u8 = 1;
pub(super) const FLAG_HAS_HIP: u8 = 2;
pub(super) const FLAG_HAS_TABLE: u8 = 3;
pub(super) const FLAG_HAS_WINDOW: u8 = 4;
pub(super) const FLAG_HAS_ROWS: u8 = 5;

const PREAMBLE_INTS_EMPTY: u8 = 2;
const PREAMBLE_INTS_MERGED: u8 = 4;
const PREAMBLE_INTS_HIP: u8 = 8;

fn has(flags: u8, flag: u8) -> bool {
    flags & (1 << flag) != 0
}

/// Window offset that keeps most of each row's bits inside the window.
fn window_offset(lg_k: u8, num_coupons: u64) -> u8 {
    let k = 1i64 << lg_k;
    let tmp = ((num_coupons as i64) << 3) - 19 * k;
    if tmp < 0 {
        0
    } else {
        (tmp >> (lg_k + 3)).min(56) as u8
    }
}

/// The coupons a windowed image stores explicitly.
fn surprises(rows: &[u64], offset: u8) -> Vec<u32> {
    let mut row_cols = vec![];
    let window_mask = 0xFFu64 << offset;
    let below = (1u64 << offset) - 1;
    for (row, mask) in rows.iter().enumerate() {
        let mut exceptions = (!mask & below) | (mask & !(window_mask | below));
        while exceptions != 0 {
            let col = exceptions.trailing_zeros();
            row_cols.push(((row as u32) << 6) | col);
            exceptions &= exceptions - 1;
        }
    }
    row_cols
}

impl CpcSketch {
    /// Upper bound on the serialized size of a sketch with this lg_k.
    ///
    /// # Panics
    ///
    /// If lg_k is not in range [4, 26]
    pub fn max_serialized_bytes(lg_k: u8) -> usize {
        assert!(
            (MIN_LG_K..=MAX_LG_K).contains(&lg_k),
            "lg_k out of range; got {lg_k}",
        );
        4 * PREAMBLE_INTS_HIP as usize + 8 * (1usize << lg_k)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let k = 1usize << self.lg_k();
        let hip = self.hip_state();
        if self.is_empty() {
            let mut bytes = SketchBytes::with_capacity(8);
            self.write_header(&mut bytes, PREAMBLE_INTS_EMPTY, 0, 0);
            return bytes.into_bytes();
        }

        let mut flags = 0;
        let preamble_ints = match hip {
            Some(_) => {
                flags |= 1 << FLAG_HAS_HIP;
                PREAMBLE_INTS_HIP
            }
            None => PREAMBLE_INTS_MERGED,
        };

        enum Payload<'a> {
            Table(Vec<u32>),
            Window(u8, Vec<u32>, &'a [u64]),
            Rows(&'a [u64]),
        }
        let payload = match self.coupons() {
            Coupons::Sparse(_) => Payload::Table(self.row_cols()),
            Coupons::Dense(rows) => {
                let offset = window_offset(self.lg_k(), self.num_coupons());
                let table = surprises(rows, offset);
                if k + 4 * table.len() < 8 * k {
                    Payload::Window(offset, table, rows)
                } else {
                    Payload::Rows(rows)
                }
            }
        };
        let (offset, payload_len) = match &payload {
            Payload::Table(table) => {
                flags |= 1 << FLAG_HAS_TABLE;
                (0, 4 * table.len())
            }
            Payload::Window(offset, table, _) => {
                flags |= (1 << FLAG_HAS_TABLE) | (1 << FLAG_HAS_WINDOW);
                (*offset, k + 4 * table.len())
            }
            Payload::Rows(_) => {
                flags |= 1 << FLAG_HAS_ROWS;
                (0, 8 * k)
            }
        };

        let mut bytes = SketchBytes::with_capacity(4 * preamble_ints as usize + payload_len);
        self.write_header(&mut bytes, preamble_ints, offset, flags);
        bytes.write_u32_le(self.num_coupons() as u32);
        match &payload {
            Payload::Table(table) | Payload::Window(_, table, _) => {
                bytes.write_u32_le(table.len() as u32)
            }
            Payload::Rows(_) => bytes.write_u32_le(0),
        }
        if let Some((kxp, hip_est_accum)) = hip {
            bytes.write_f64_le(kxp);
            bytes.write_f64_le(hip_est_accum);
        }
        match payload {
            Payload::Table(table) => {
                for row_col in table {
                    bytes.write_u32_le(row_col);
                }
            }
            Payload::Window(offset, table, rows) => {
                for mask in rows {
                    bytes.write_u8((*mask >> offset) as u8);
                }
                for row_col in table {
                    bytes.write_u32_le(row_col);
                }
            }
            Payload::Rows(rows) => {
                for mask in rows {
                    bytes.write_u64_le(*mask);
                }
            }
        }
        bytes.into_bytes()
    }

    fn write_header(&self, bytes: &mut SketchBytes, preamble_ints: u8, offset: u8, flags: u8) {
        bytes.write_u8(preamble_ints);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::CPC.id);
        bytes.write_u8(self.lg_k());
        bytes.write_u8(offset);
        bytes.write_u8(flags);
        bytes.write_u16_le(self.seed_hash());
    }

    /// Deserialize an image, checking its seed hash against `seed`.
    pub fn deserialize(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        let mut cursor = SketchSlice::new(bytes);
        let preamble_ints = cursor.read_u8().map_err(make_error("preamble_ints"))?;
        let serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
        let family_id = cursor.read_u8().map_err(make_error("family_id"))?;
        let lg_k = cursor.read_u8().map_err(make_error("lg_k"))?;
        let offset = cursor.read_u8().map_err(make_error("window_offset"))?;
        let flags = cursor.read_u8().map_err(make_error("flags"))?;
        let stored_seed_hash = cursor.read_u16_le().map_err(make_error("seed_hash"))?;

        Family::CPC.validate_id(family_id)?;
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(SERIAL_VERSION, serial_version));
        }
        if !(MIN_LG_K..=MAX_LG_K).contains(&lg_k) {
            return Err(Error::corrupt(format!("CPC lg_k out of range: {lg_k}")));
        }
        if has(flags, FLAG_COMPRESSED) {
            return Err(Error::corrupt("compressed CPC images are not supported"));
        }
        let expected_seed_hash = compute_seed_hash(seed);
        if stored_seed_hash != expected_seed_hash {
            return Err(Error::seed_mismatch(expected_seed_hash, stored_seed_hash));
        }

        let expected_preamble = if has(flags, FLAG_HAS_HIP) {
            PREAMBLE_INTS_HIP
        } else if flags == 0 {
            PREAMBLE_INTS_EMPTY
        } else {
            PREAMBLE_INTS_MERGED
        };
        if preamble_ints != expected_preamble {
            return Err(Error::corrupt(format!(
                "CPC preamble ints {preamble_ints} disagree with flags {flags:#04x}"
            )));
        }
        if flags == 0 {
            return Ok(CpcSketch::with_seed(lg_k, seed));
        }

        let num_coupons = cursor.read_u32_le().map_err(make_error("num_coupons"))? as u64;
        let table_len = cursor.read_u32_le().map_err(make_error("table_len"))? as usize;
        let hip = if has(flags, FLAG_HAS_HIP) {
            let kxp = cursor.read_f64_le().map_err(make_error("kxp"))?;
            let hip_est_accum = cursor.read_f64_le().map_err(make_error("hip_est_accum"))?;
            Some((kxp, hip_est_accum))
        } else {
            None
        };

        let k = 1usize << lg_k;
        let mut rows = vec![0u64; k];
        if has(flags, FLAG_HAS_ROWS) {
            if cursor.remaining() / 8 < k {
                return Err(Error::insufficient_data("rows"));
            }
            for mask in rows.iter_mut() {
                *mask = cursor.read_u64_le().map_err(make_error("rows"))?;
            }
        } else {
            if has(flags, FLAG_HAS_WINDOW) {
                if offset > 56 {
                    return Err(Error::corrupt(format!("CPC window offset {offset} above 56")));
                }
                let mut window = vec![0u8; k];
                cursor.read_exact(&mut window).map_err(make_error("window"))?;
                let below = (1u64 << offset) - 1;
                for (mask, bits) in rows.iter_mut().zip(window) {
                    *mask = below | (u64::from(bits) << offset);
                }
            }
            if !has(flags, FLAG_HAS_TABLE) {
                return Err(Error::corrupt("CPC image carries no coupon payload"));
            }
            if cursor.remaining() / 4 < table_len {
                return Err(Error::insufficient_data("table").with_context("len", table_len));
            }
            for _ in 0..table_len {
                let row_col = cursor.read_u32_le().map_err(make_error("table"))?;
                let row = (row_col >> 6) as usize;
                if row >= k {
                    return Err(Error::corrupt("CPC coupon row outside the sketch")
                        .with_context("row", row));
                }
                // table entries flip the window's assumption
                rows[row] ^= 1u64 << (row_col & 63);
            }
        }

        let sketch = CpcSketch::from_parts(lg_k, seed, row_cols_of(&rows), hip);
        if sketch.num_coupons() != num_coupons {
            return Err(Error::corrupt("CPC coupon count disagrees with payload")
                .with_context("declared", num_coupons)
                .with_context("found", sketch.num_coupons()));
        }
        Ok(sketch)
    }
}
