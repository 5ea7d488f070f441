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

use std::fmt;

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::make_error;
use crate::common::NumStdDev;
use crate::common::binomial_bounds;
use crate::error::Error;
use crate::hash::compute_seed_hash;
use crate::theta::MAX_THETA;
use crate::theta::Summary;
use crate::theta::max_retained;
use crate::theta::serialization::FLAG_IS_COMPACT;
use crate::theta::serialization::FLAG_IS_EMPTY;
use crate::theta::serialization::FLAG_IS_ORDERED;
use crate::theta::serialization::FLAG_IS_READ_ONLY;
use crate::theta::serialization::HASH_SIZE_BYTES;
use crate::theta::serialization::PACKED_PREAMBLE_LONGS_ESTIMATION;
use crate::theta::serialization::PACKED_PREAMBLE_LONGS_EXACT;
use crate::theta::serialization::PACKED_SERIAL_VERSION;
use crate::theta::serialization::PREAMBLE_LONGS_EMPTY_OR_SINGLE;
use crate::theta::serialization::PREAMBLE_LONGS_ESTIMATION;
use crate::theta::serialization::PREAMBLE_LONGS_EXACT;
use crate::theta::serialization::SERIAL_VERSION;
use crate::theta::serialization::pack_bits;
use crate::theta::serialization::unpack_bits;

/// Immutable theta or tuple sketch, as produced by `compact()`, by a set
/// operation, or by deserialization.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactSketch<S> {
    entries: Vec<(u64, S)>,
    theta: u64,
    seed_hash: u16,
    is_empty: bool,
    is_ordered: bool,
}

impl<S: Summary> CompactSketch<S> {
    /// Assemble a sketch, sorting entries by hash when `ordered` is set.
    pub(crate) fn from_parts(
        mut entries: Vec<(u64, S)>,
        theta: u64,
        seed_hash: u16,
        is_empty: bool,
        ordered: bool,
    ) -> Self {
        if ordered {
            entries.sort_unstable_by_key(|e| e.0);
        }
        let is_ordered = ordered || entries.len() <= 1;
        Self {
            entries,
            theta,
            seed_hash,
            is_empty,
            is_ordered,
        }
    }

    /// An empty sketch for the given seed.
    pub fn empty(seed: u64) -> Self {
        Self::from_parts(vec![], MAX_THETA, compute_seed_hash(seed), true, true)
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    pub fn is_ordered(&self) -> bool {
        self.is_ordered
    }

    pub fn is_estimation_mode(&self) -> bool {
        self.theta < MAX_THETA && !self.is_empty
    }

    /// Return theta as a fraction (0.0 to 1.0)
    pub fn theta(&self) -> f64 {
        self.theta as f64 / MAX_THETA as f64
    }

    /// Return theta as u64
    pub fn theta64(&self) -> u64 {
        self.theta
    }

    pub fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    pub fn num_retained(&self) -> usize {
        self.entries.len()
    }

    /// Retained hashes with their summaries.
    pub fn iter(&self) -> impl Iterator<Item = &(u64, S)> + '_ {
        self.entries.iter()
    }

    pub fn estimate(&self) -> f64 {
        if self.is_empty {
            return 0.0;
        }
        self.entries.len() as f64 / self.theta()
    }

    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        if !self.is_estimation_mode() {
            return self.entries.len() as f64;
        }
        binomial_bounds::lower_bound(self.entries.len() as u64, self.theta(), num_std_dev)
    }

    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        if !self.is_estimation_mode() {
            return self.entries.len() as f64;
        }
        binomial_bounds::upper_bound(
            self.entries.len() as u64,
            self.theta(),
            num_std_dev,
            self.is_empty,
        )
    }

    /// Number of retained hashes strictly below `theta`.
    pub(crate) fn count_below(&self, theta: u64) -> usize {
        if self.is_ordered {
            self.entries.partition_point(|e| e.0 < theta)
        } else {
            self.entries.iter().filter(|e| e.0 < theta).count()
        }
    }

    /// Largest image a sketch of nominal size 2^lg_k can serialize to.
    pub fn max_serialized_size(lg_k: u8) -> usize {
        8 * PREAMBLE_LONGS_ESTIMATION as usize
            + max_retained(lg_k) * (HASH_SIZE_BYTES + S::SIZE_BYTES)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let is_estimation_mode = self.is_estimation_mode();
        let preamble_longs = if is_estimation_mode {
            PREAMBLE_LONGS_ESTIMATION
        } else if self.is_empty || self.entries.len() == 1 {
            PREAMBLE_LONGS_EMPTY_OR_SINGLE
        } else {
            PREAMBLE_LONGS_EXACT
        };
        let entry_bytes = HASH_SIZE_BYTES + S::SIZE_BYTES;
        let capacity = 8 * preamble_longs as usize + entry_bytes * self.entries.len();
        let mut bytes = SketchBytes::with_capacity(capacity);

        let mut flags = FLAG_IS_READ_ONLY | FLAG_IS_COMPACT;
        if self.is_ordered {
            flags |= FLAG_IS_ORDERED;
        }
        if self.is_empty {
            flags |= FLAG_IS_EMPTY;
        }

        bytes.write_u8(preamble_longs);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(S::FAMILY.id);
        bytes.write_u8(S::SKETCH_TYPE);
        bytes.write_u8(0);
        bytes.write_u8(flags);
        bytes.write_u16_le(self.seed_hash);

        if preamble_longs > PREAMBLE_LONGS_EMPTY_OR_SINGLE {
            bytes.write_u32_le(self.entries.len() as u32);
            bytes.write_u32_le(0);
        }
        if preamble_longs > PREAMBLE_LONGS_EXACT {
            bytes.write_u64_le(self.theta);
        }
        if !self.is_empty {
            for (hash, summary) in &self.entries {
                bytes.write_u64_le(*hash);
                summary.write(&mut bytes);
            }
        }
        bytes.into_bytes()
    }

    /// Deserialize an image, checking its seed hash against `seed`.
    ///
    /// Theta images may be in either the standard or the bit-packed form.
    pub fn deserialize(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        if S::SIZE_BYTES == 0 && bytes.get(1) == Some(&PACKED_SERIAL_VERSION) {
            return Self::deserialize_packed(bytes, seed);
        }
        let mut cursor = SketchSlice::new(bytes);

        let preamble_longs = cursor.read_u8().map_err(make_error("preamble_longs"))?;
        let serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
        let family_id = cursor.read_u8().map_err(make_error("family_id"))?;
        let sketch_type = cursor.read_u8().map_err(make_error("sketch_type"))?;
        let _unused = cursor.read_u8().map_err(make_error("unused"))?;
        let flags = cursor.read_u8().map_err(make_error("flags"))?;
        let stored_seed_hash = cursor.read_u16_le().map_err(make_error("seed_hash"))?;

        S::FAMILY.validate_id(family_id)?;
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(SERIAL_VERSION, serial_version));
        }
        S::FAMILY.validate_pre_longs(preamble_longs)?;
        if S::SKETCH_TYPE != 0 && sketch_type != S::SKETCH_TYPE {
            return Err(Error::corrupt(format!(
                "unexpected sketch type {sketch_type} in {} image",
                S::LABEL
            )));
        }

        let is_empty = flags & FLAG_IS_EMPTY != 0;
        let is_ordered = flags & FLAG_IS_ORDERED != 0;
        if is_empty {
            return Ok(Self::from_parts(vec![], MAX_THETA, stored_seed_hash, true, true));
        }

        let expected_seed_hash = compute_seed_hash(seed);
        if stored_seed_hash != expected_seed_hash {
            return Err(Error::seed_mismatch(expected_seed_hash, stored_seed_hash));
        }

        let (num_entries, theta) = if preamble_longs == PREAMBLE_LONGS_EMPTY_OR_SINGLE {
            (1, MAX_THETA)
        } else {
            let num_entries = cursor.read_u32_le().map_err(make_error("num_entries"))? as usize;
            let _unused = cursor.read_u32_le().map_err(make_error("unused"))?;
            let theta = if preamble_longs == PREAMBLE_LONGS_ESTIMATION {
                cursor.read_u64_le().map_err(make_error("theta"))?
            } else {
                MAX_THETA
            };
            (num_entries, theta)
        };

        if cursor.remaining() / (HASH_SIZE_BYTES + S::SIZE_BYTES) < num_entries {
            return Err(
                Error::insufficient_data("entries").with_context("num_entries", num_entries)
            );
        }
        let mut entries = Vec::with_capacity(num_entries);
        for _ in 0..num_entries {
            let hash = cursor.read_u64_le().map_err(make_error("hash"))?;
            let summary = S::read(&mut cursor).map_err(make_error("summary"))?;
            if hash == 0 || hash >= theta {
                return Err(Error::corrupt("retained hash is outside [1, theta)")
                    .with_context("hash", hash)
                    .with_context("theta", theta));
            }
            entries.push((hash, summary));
        }

        Ok(Self {
            entries,
            theta,
            seed_hash: stored_seed_hash,
            is_empty: false,
            is_ordered,
        })
    }

    fn deserialize_packed(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        let mut cursor = SketchSlice::new(bytes);

        let preamble_longs = cursor.read_u8().map_err(make_error("preamble_longs"))?;
        let _serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
        let family_id = cursor.read_u8().map_err(make_error("family_id"))?;
        let entry_bits = cursor.read_u8().map_err(make_error("entry_bits"))?;
        let num_entries_bytes = cursor.read_u8().map_err(make_error("num_entries_bytes"))?;
        let _flags = cursor.read_u8().map_err(make_error("flags"))?;
        let stored_seed_hash = cursor.read_u16_le().map_err(make_error("seed_hash"))?;

        S::FAMILY.validate_id(family_id)?;
        if preamble_longs != PACKED_PREAMBLE_LONGS_EXACT
            && preamble_longs != PACKED_PREAMBLE_LONGS_ESTIMATION
        {
            return Err(Error::corrupt(format!(
                "invalid preamble longs {preamble_longs} in packed {} image",
                S::LABEL
            )));
        }
        if !(1..=64).contains(&entry_bits) || !(1..=4).contains(&num_entries_bytes) {
            return Err(Error::corrupt("invalid bit packing header")
                .with_context("entry_bits", entry_bits)
                .with_context("num_entries_bytes", num_entries_bytes));
        }

        let expected_seed_hash = compute_seed_hash(seed);
        if stored_seed_hash != expected_seed_hash {
            return Err(Error::seed_mismatch(expected_seed_hash, stored_seed_hash));
        }

        let theta = if preamble_longs == PACKED_PREAMBLE_LONGS_ESTIMATION {
            cursor.read_u64_le().map_err(make_error("theta"))?
        } else {
            MAX_THETA
        };
        let mut num_entries = 0usize;
        for shift in 0..num_entries_bytes {
            let byte = cursor.read_u8().map_err(make_error("num_entries"))?;
            num_entries |= usize::from(byte) << (8 * u32::from(shift));
        }

        let packed = &bytes[bytes.len() - cursor.remaining()..];
        let deltas = unpack_bits(packed, entry_bits, num_entries).ok_or_else(|| {
            Error::insufficient_data("entries").with_context("num_entries", num_entries)
        })?;
        let mut entries = Vec::with_capacity(num_entries);
        let mut previous = 0u64;
        for delta in deltas {
            let hash = previous
                .checked_add(delta)
                .filter(|hash| *hash > previous && *hash < theta)
                .ok_or_else(|| {
                    Error::corrupt("packed hashes must increase within [1, theta)")
                        .with_context("previous", previous)
                        .with_context("delta", delta)
                })?;
            entries.push((hash, S::default()));
            previous = hash;
        }

        Ok(Self {
            entries,
            theta,
            seed_hash: stored_seed_hash,
            is_empty: false,
            is_ordered: true,
        })
    }
}

impl CompactSketch<()> {
    /// Serialize in the bit-packed form when the sketch is ordered and has
    /// more than a lone exact entry, in the standard form otherwise.
    pub fn serialize_packed(&self) -> Vec<u8> {
        let is_estimation_mode = self.is_estimation_mode();
        let packable = self.is_ordered
            && !self.entries.is_empty()
            && (self.entries.len() > 1 || is_estimation_mode);
        if !packable {
            return self.serialize();
        }

        let mut previous = 0u64;
        let deltas: Vec<u64> = self
            .entries
            .iter()
            .map(|(hash, _)| {
                let delta = hash.wrapping_sub(previous);
                previous = *hash;
                delta
            })
            .collect();
        let all_bits = deltas.iter().fold(0u64, |acc, delta| acc | delta);
        let entry_bits = (u64::BITS - all_bits.leading_zeros()) as u8;
        let num_entries = self.entries.len() as u32;
        let num_entries_bytes = (u32::BITS - num_entries.leading_zeros()).div_ceil(8) as usize;
        let preamble_longs = if is_estimation_mode {
            PACKED_PREAMBLE_LONGS_ESTIMATION
        } else {
            PACKED_PREAMBLE_LONGS_EXACT
        };

        let packed_len = (deltas.len() * usize::from(entry_bits)).div_ceil(8);
        let capacity = 8 * preamble_longs as usize + num_entries_bytes + packed_len;
        let mut bytes = SketchBytes::with_capacity(capacity);
        bytes.write_u8(preamble_longs);
        bytes.write_u8(PACKED_SERIAL_VERSION);
        bytes.write_u8(<() as Summary>::FAMILY.id);
        bytes.write_u8(entry_bits);
        bytes.write_u8(num_entries_bytes as u8);
        bytes.write_u8(FLAG_IS_READ_ONLY | FLAG_IS_COMPACT | FLAG_IS_ORDERED);
        bytes.write_u16_le(self.seed_hash);
        if is_estimation_mode {
            bytes.write_u64_le(self.theta);
        }
        bytes.write(&num_entries.to_le_bytes()[..num_entries_bytes]);

        let mut bytes = bytes.into_bytes();
        pack_bits(deltas, entry_bits, &mut bytes);
        bytes
    }
}

impl<S: Summary> fmt::Display for CompactSketch<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### {} sketch summary:", S::LABEL)?;
        writeln!(f, "   num retained entries : {}", self.num_retained())?;
        writeln!(f, "   seed hash            : {}", self.seed_hash)?;
        writeln!(f, "   empty?               : {}", self.is_empty)?;
        writeln!(f, "   ordered?             : {}", self.is_ordered)?;
        writeln!(f, "   estimation mode?     : {}", self.is_estimation_mode())?;
        writeln!(f, "   theta (fraction)     : {}", self.theta())?;
        writeln!(f, "   theta (raw 64-bit)   : {}", self.theta)?;
        writeln!(f, "   estimate             : {}", self.estimate())?;
        writeln!(f, "   lower bound 95% conf : {}", self.lower_bound(NumStdDev::Two))?;
        writeln!(f, "   upper bound 95% conf : {}", self.upper_bound(NumStdDev::Two))?;
        writeln!(f, "### End sketch summary")
    }
}
