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

use std::cmp::Ordering;

use super::INIT_NUM_SECTIONS;
use super::MIN_K;
use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::make_error;
use crate::common::random::XorShift64;
use crate::common::sorted_view::QuantileItem;
use crate::error::Error;

/// Nominal capacity is this many times the compacted part of the buffer.
const MULTIPLIER: u32 = 2;

/// One level of a REQ sketch.
///
/// Items are kept in buffer order. A high-rank-accuracy compactor receives new
/// items at the front and compacts its smallest items; a low-rank-accuracy one
/// appends at the back and compacts its largest.
#[derive(Debug, Clone)]
pub(super) struct Compactor {
    lg_weight: u8,
    hra: bool,
    coin: bool,
    sorted: bool,
    section_size_raw: f32,
    section_size: u32,
    num_sections: u8,
    state: u64,
    items: Vec<f32>,
}

impl Compactor {
    pub fn new(hra: bool, lg_weight: u8, section_size: u32) -> Self {
        Self {
            lg_weight,
            hra,
            coin: false,
            sorted: true,
            section_size_raw: section_size as f32,
            section_size,
            num_sections: INIT_NUM_SECTIONS,
            state: 0,
            items: Vec::new(),
        }
    }

    pub fn lg_weight(&self) -> u8 {
        self.lg_weight
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[f32] {
        &self.items
    }

    pub fn nom_capacity(&self) -> u32 {
        (MULTIPLIER * self.num_sections as u32).saturating_mul(self.section_size)
    }

    pub fn append(&mut self, item: f32) {
        if self.hra {
            self.items.insert(0, item);
        } else {
            self.items.push(item);
        }
        self.sorted = false;
    }

    pub fn sort(&mut self) {
        if !self.sorted {
            self.items.sort_by(cmp_items);
            self.sorted = true;
        }
    }

    /// Weight of the items below (or at, when inclusive) `item`.
    pub fn compute_weight(&self, item: f32, inclusive: bool) -> u64 {
        let count = if self.sorted {
            if inclusive {
                self.items.partition_point(|&x| x <= item)
            } else {
                self.items.partition_point(|&x| x < item)
            }
        } else {
            self.items
                .iter()
                .filter(|&&x| if inclusive { x <= item } else { x < item })
                .count()
        };
        (count as u64) << self.lg_weight
    }

    /// Moves half of the compactible region into `next`. Returns the number
    /// of items removed from this level and the number promoted.
    pub fn compact(&mut self, next: &mut Compactor, rng: &mut XorShift64) -> (usize, usize) {
        self.sort();
        let secs_to_compact = ((!self.state).trailing_zeros() + 1).min(self.num_sections as u32);
        let (low, high) = self.compaction_range(secs_to_compact);
        debug_assert!(high - low >= 2, "compaction range too small");

        if self.state & 1 == 1 {
            self.coin = !self.coin;
        } else {
            self.coin = rng.next_bit() == 1;
        }

        let offset = usize::from(self.coin);
        let promoted: Vec<f32> = self.items[low..high]
            .iter()
            .skip(offset)
            .step_by(2)
            .copied()
            .collect();
        let removed = high - low;
        let num_promoted = promoted.len();
        self.items.drain(low..high);
        next.merge_sorted(promoted);

        self.state += 1;
        self.ensure_enough_sections();
        (removed, num_promoted)
    }

    /// Folds another compactor of the same height into this one.
    pub fn merge(&mut self, other: &Compactor) {
        debug_assert_eq!(self.lg_weight, other.lg_weight);
        self.state |= other.state;
        while self.ensure_enough_sections() {}
        self.sort();
        let mut incoming = other.items.clone();
        if !other.sorted {
            incoming.sort_by(cmp_items);
        }
        self.merge_sorted(incoming);
    }

    fn merge_sorted(&mut self, incoming: Vec<f32>) {
        debug_assert!(self.sorted || self.items.is_empty());
        let current = std::mem::take(&mut self.items);
        let mut merged = Vec::with_capacity(current.len() + incoming.len());
        let (mut i, mut j) = (0, 0);
        while i < current.len() && j < incoming.len() {
            if cmp_items(&incoming[j], &current[i]).is_lt() {
                merged.push(incoming[j]);
                j += 1;
            } else {
                merged.push(current[i]);
                i += 1;
            }
        }
        merged.extend_from_slice(&current[i..]);
        merged.extend_from_slice(&incoming[j..]);
        self.items = merged;
        self.sorted = true;
    }

    fn ensure_enough_sections(&mut self) -> bool {
        let ssr = self.section_size_raw / std::f32::consts::SQRT_2;
        let ne = nearest_even(ssr);
        let due = 1u64
            .checked_shl(self.num_sections as u32 - 1)
            .is_some_and(|threshold| self.state >= threshold);
        if due && ne >= MIN_K as u32 && self.num_sections <= u8::MAX / 2 {
            self.section_size_raw = ssr;
            self.section_size = ne;
            self.num_sections <<= 1;
            return true;
        }
        false
    }

    fn compaction_range(&self, secs_to_compact: u32) -> (usize, usize) {
        let num_items = self.items.len() as u32;
        let mut non_compact = self.nom_capacity() / 2
            + (self.num_sections as u32 - secs_to_compact) * self.section_size;
        if (num_items.saturating_sub(non_compact)) & 1 == 1 {
            non_compact += 1;
        }
        let non_compact = non_compact.min(num_items) as usize;
        let num_items = num_items as usize;
        if self.hra {
            (0, num_items - non_compact)
        } else {
            (non_compact, num_items)
        }
    }

    pub fn serialize(&self, bytes: &mut SketchBytes) {
        bytes.write_u64_le(self.state);
        bytes.write_f32_le(self.section_size_raw);
        bytes.write_u8(self.lg_weight);
        bytes.write_u8(self.num_sections);
        bytes.write_u16_le(0);
        bytes.write_u32_le(self.items.len() as u32);
        for &item in &self.items {
            bytes.write_f32_le(item);
        }
    }

    pub fn serialized_size(&self) -> usize {
        8 + 4 + 1 + 1 + 2 + 4 + self.items.len() * 4
    }

    pub fn deserialize(
        slice: &mut SketchSlice<'_>,
        k: u16,
        hra: bool,
        sorted: bool,
        expected_lg_weight: u8,
    ) -> Result<Self, Error> {
        let state = slice.read_u64_le().map_err(make_error("state"))?;
        let section_size_raw = slice.read_f32_le().map_err(make_error("section_size"))?;
        let lg_weight = slice.read_u8().map_err(make_error("lg_weight"))?;
        let num_sections = slice.read_u8().map_err(make_error("num_sections"))?;
        let _unused = slice.read_u16_le().map_err(make_error("unused"))?;
        let num_items = slice.read_u32_le().map_err(make_error("num_items"))? as usize;

        if lg_weight != expected_lg_weight {
            return Err(Error::corrupt(format!(
                "compactor at height {expected_lg_weight} declares lg_weight {lg_weight}"
            )));
        }
        let sections_valid = num_sections % INIT_NUM_SECTIONS == 0
            && (num_sections / INIT_NUM_SECTIONS).is_power_of_two();
        // Sections only ever shrink from k.
        let section_size_valid = section_size_raw.is_finite()
            && section_size_raw >= 1.0
            && section_size_raw <= f32::from(k);
        if !sections_valid || !section_size_valid {
            return Err(Error::corrupt("invalid compactor sections")
                .with_context("num_sections", num_sections)
                .with_context("section_size_raw", section_size_raw));
        }
        let items = read_items(slice, num_items)?;

        Ok(Self {
            lg_weight,
            hra,
            coin: false,
            sorted: sorted || lg_weight > 0,
            section_size_raw,
            section_size: nearest_even(section_size_raw),
            num_sections,
            state,
            items,
        })
    }

    /// A level-0 compactor rebuilt from the raw items of a tiny image.
    pub fn from_raw_items(hra: bool, section_size: u32, sorted: bool, items: Vec<f32>) -> Self {
        let mut compactor = Self::new(hra, 0, section_size);
        compactor.items = items;
        compactor.sorted = sorted;
        compactor
    }
}

pub(super) fn read_items(slice: &mut SketchSlice<'_>, count: usize) -> Result<Vec<f32>, Error> {
    if count.saturating_mul(4) > slice.remaining() {
        return Err(Error::insufficient_data("items"));
    }
    (0..count)
        .map(|_| slice.read_f32_le().map_err(make_error("items")))
        .collect()
}

fn nearest_even(value: f32) -> u32 {
    ((value / 2.0).round() as u32) << 1
}

fn cmp_items(a: &f32, b: &f32) -> Ordering {
    <f32 as QuantileItem>::cmp(a, b)
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn test_nearest_even() {
        assert_that!(nearest_even(12.0), eq(12));
        assert_that!(nearest_even(12.0 / std::f32::consts::SQRT_2), eq(8));
        assert_that!(nearest_even(5.0), eq(6));
    }

    #[test]
    fn test_hra_appends_at_front() {
        let mut compactor = Compactor::new(true, 0, 12);
        for i in 1..=3 {
            compactor.append(i as f32);
        }
        assert_eq!(compactor.items(), &[3.0, 2.0, 1.0]);
        compactor.sort();
        assert_eq!(compactor.items(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_compact_halves_region() {
        let mut rng = XorShift64::seeded(7);
        let mut level0 = Compactor::new(false, 0, 12);
        let mut level1 = Compactor::new(false, 1, 12);
        for i in 0..72 {
            level0.append(i as f32);
        }
        let (removed, promoted) = level0.compact(&mut level1, &mut rng);
        assert_that!(removed, eq(2 * promoted));
        assert_that!(level0.num_items() + removed, eq(72));
        assert_that!(level1.num_items(), eq(promoted));
        // low-rank accuracy keeps the smallest items at full weight
        assert_that!(level0.items()[0], eq(0.0));
        assert_that!(level0.compute_weight(10.0, true) + level1.compute_weight(10.0, true), eq(11));
    }
}
