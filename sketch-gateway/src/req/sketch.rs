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

use log::debug;

use super::DEFAULT_K;
use super::INIT_NUM_SECTIONS;
use super::MAX_K;
use super::MIN_K;
use super::compactor::Compactor;
use super::compactor::read_items;
use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::family::Family;
use crate::codec::make_error;
use crate::common::NumStdDev;
use crate::common::random::XorShift64;
use crate::common::sorted_view::SortedView;
use crate::error::Error;

const SERIAL_VERSION: u8 = 1;
const PREAMBLE_INTS_MIN: u8 = 2;
const PREAMBLE_INTS_FULL: u8 = 4;

const FLAG_EMPTY: u8 = 1 << 2;
const FLAG_HRA: u8 = 1 << 3;
const FLAG_RAW_ITEMS: u8 = 1 << 4;
const FLAG_LEVEL_ZERO_SORTED: u8 = 1 << 5;

/// Level weights are powers of two below 2^64.
const MAX_LEVELS: u8 = 64;

const FIXED_RSE_FACTOR: f64 = 0.084;

fn relative_rse_factor() -> f64 {
    (0.0512 / INIT_NUM_SECTIONS as f64).sqrt()
}

/// Relative Error Quantiles sketch over `f32` items.
///
/// Accuracy is relative to the distance from one end of the rank domain:
/// with high-rank accuracy (HRA) the largest items are the most precise, with
/// low-rank accuracy the smallest ones are.
#[derive(Debug, Clone)]
pub struct ReqSketch {
    k: u16,
    hra: bool,
    n: u64,
    min_item: Option<f32>,
    max_item: Option<f32>,
    compactors: Vec<Compactor>,
    num_retained: usize,
    max_nom_size: usize,
    rng: XorShift64,
}

impl Default for ReqSketch {
    fn default() -> Self {
        Self::new(DEFAULT_K, true)
    }
}

impl ReqSketch {
    /// # Panics
    ///
    /// If k is odd or not in [4, 1024].
    pub fn new(k: u16, hra: bool) -> Self {
        assert!(
            (MIN_K..=MAX_K).contains(&k) && k % 2 == 0,
            "k must be even and in [{MIN_K}, {MAX_K}], got {k}"
        );
        Self::with_compactors(k, hra, 0, None, None, vec![Compactor::new(hra, 0, k as u32)])
    }

    fn with_compactors(
        k: u16,
        hra: bool,
        n: u64,
        min_item: Option<f32>,
        max_item: Option<f32>,
        compactors: Vec<Compactor>,
    ) -> Self {
        let mut sketch = Self {
            k,
            hra,
            n,
            min_item,
            max_item,
            compactors,
            num_retained: 0,
            max_nom_size: 0,
            rng: XorShift64::default(),
        };
        sketch.update_num_retained();
        sketch.update_max_nom_size();
        sketch
    }

    pub fn k(&self) -> u16 {
        self.k
    }

    /// Whether the sketch favours high ranks.
    pub fn is_hra(&self) -> bool {
        self.hra
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn num_retained(&self) -> usize {
        self.num_retained
    }

    pub fn num_levels(&self) -> usize {
        self.compactors.len()
    }

    pub fn is_estimation_mode(&self) -> bool {
        self.compactors.len() > 1
    }

    pub fn min_item(&self) -> Option<f32> {
        self.min_item
    }

    pub fn max_item(&self) -> Option<f32> {
        self.max_item
    }

    /// Updates the sketch with a new item. NaN is ignored.
    pub fn update(&mut self, item: f32) {
        if item.is_nan() {
            return;
        }
        self.track_min_max(item);
        self.compactors[0].append(item);
        self.num_retained += 1;
        self.n += 1;
        if self.num_retained >= self.max_nom_size {
            self.compress();
        }
    }

    /// Merges another sketch into this one.
    ///
    /// # Errors
    ///
    /// `IncompatibleOperands` if the two sketches favour different ends of the
    /// rank domain; this sketch is unchanged in that case.
    pub fn merge(&mut self, other: &ReqSketch) -> Result<(), Error> {
        if other.is_empty() {
            return Ok(());
        }
        if self.hra != other.hra {
            return Err(Error::incompatible(
                "cannot merge high-rank and low-rank accuracy REQ sketches",
            ));
        }

        self.n += other.n;
        if let (Some(min), Some(max)) = (other.min_item, other.max_item) {
            self.track_min_max(min);
            self.track_min_max(max);
        }
        while self.compactors.len() < other.compactors.len() {
            self.grow();
        }
        for (mine, theirs) in self.compactors.iter_mut().zip(&other.compactors) {
            mine.merge(theirs);
        }
        self.update_max_nom_size();
        self.update_num_retained();
        if self.num_retained >= self.max_nom_size {
            self.compress();
        }
        debug!(
            "REQ merge left {} levels holding {} items",
            self.compactors.len(),
            self.num_retained
        );
        Ok(())
    }

    /// Normalized rank of `item`; 0 for an empty sketch.
    pub fn rank(&self, item: f32, inclusive: bool) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let weight: u64 = self
            .compactors
            .iter()
            .map(|compactor| compactor.compute_weight(item, inclusive))
            .sum();
        weight as f64 / self.n as f64
    }

    /// Item at the given normalized rank, or `None` for an empty sketch.
    ///
    /// # Panics
    ///
    /// Panics if rank is not in [0.0, 1.0].
    pub fn quantile(&self, rank: f64, inclusive: bool) -> Option<f32> {
        assert!((0.0..=1.0).contains(&rank), "rank must be in [0.0, 1.0]");
        self.sorted_view().quantile(rank, inclusive)
    }

    pub fn cdf(&self, split_points: &[f32], inclusive: bool) -> Result<Vec<f64>, Error> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        self.sorted_view().cdf(split_points, inclusive)
    }

    pub fn pmf(&self, split_points: &[f32], inclusive: bool) -> Result<Vec<f64>, Error> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        self.sorted_view().pmf(split_points, inclusive)
    }

    /// Approximate lower bound of the true rank behind an estimated `rank`.
    pub fn rank_lower_bound(&self, rank: f64, num_std_dev: NumStdDev) -> f64 {
        if self.is_exact_rank(rank) {
            return rank;
        }
        let (relative, fixed) = self.rank_errors(rank);
        let nsd = num_std_dev.as_f64();
        (rank - nsd * relative).max(rank - nsd * fixed)
    }

    /// Approximate upper bound of the true rank behind an estimated `rank`.
    pub fn rank_upper_bound(&self, rank: f64, num_std_dev: NumStdDev) -> f64 {
        if self.is_exact_rank(rank) {
            return rank;
        }
        let (relative, fixed) = self.rank_errors(rank);
        let nsd = num_std_dev.as_f64();
        (rank + nsd * relative).min(rank + nsd * fixed)
    }

    fn rank_errors(&self, rank: f64) -> (f64, f64) {
        let k = self.k as f64;
        let distance = if self.hra { 1.0 - rank } else { rank };
        (relative_rse_factor() / k * distance, FIXED_RSE_FACTOR / k)
    }

    fn is_exact_rank(&self, rank: f64) -> bool {
        let base_cap = self.k as u64 * INIT_NUM_SECTIONS as u64;
        if self.compactors.len() == 1 || self.n <= base_cap {
            return true;
        }
        let threshold = base_cap as f64 / self.n as f64;
        if self.hra {
            rank >= 1.0 - threshold
        } else {
            rank <= threshold
        }
    }

    fn sorted_view(&self) -> SortedView<f32> {
        SortedView::from_weighted(self.compactors.iter().flat_map(|compactor| {
            let weight = 1u64 << compactor.lg_weight();
            compactor.items().iter().map(move |&item| (item, weight))
        }))
    }

    fn track_min_max(&mut self, item: f32) {
        self.min_item = Some(self.min_item.map_or(item, |min| min.min(item)));
        self.max_item = Some(self.max_item.map_or(item, |max| max.max(item)));
    }

    fn grow(&mut self) {
        let lg_weight = self.compactors.len() as u8;
        self.compactors
            .push(Compactor::new(self.hra, lg_weight, self.k as u32));
        self.update_max_nom_size();
    }

    fn update_max_nom_size(&mut self) {
        self.max_nom_size = self
            .compactors
            .iter()
            .map(|compactor| compactor.nom_capacity() as usize)
            .sum();
    }

    fn update_num_retained(&mut self) {
        self.num_retained = self.compactors.iter().map(Compactor::num_items).sum();
    }

    fn compress(&mut self) {
        let mut height = 0;
        while height < self.compactors.len() {
            let level = &self.compactors[height];
            if level.num_items() >= level.nom_capacity() as usize {
                if height + 1 >= self.compactors.len() {
                    self.grow();
                }
                let (lower, upper) = self.compactors.split_at_mut(height + 1);
                let (removed, promoted) = lower[height].compact(&mut upper[0], &mut self.rng);
                self.num_retained -= removed - promoted;
                self.update_max_nom_size();
            }
            if self.num_retained < self.max_nom_size {
                break;
            }
            height += 1;
        }
    }

    /// Serializes the sketch to bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let is_empty = self.is_empty();
        let raw_items = self.n <= MIN_K as u64;
        let level_zero = &self.compactors[0];

        let mut flags = 0;
        if is_empty {
            flags |= FLAG_EMPTY;
        }
        if self.hra {
            flags |= FLAG_HRA;
        }
        if raw_items {
            flags |= FLAG_RAW_ITEMS;
        }
        if level_zero.is_sorted() {
            flags |= FLAG_LEVEL_ZERO_SORTED;
        }

        let mut size = 8;
        if self.is_estimation_mode() {
            size += 16;
        }
        size += self
            .compactors
            .iter()
            .map(Compactor::serialized_size)
            .sum::<usize>();
        let mut bytes = SketchBytes::with_capacity(size);

        bytes.write_u8(if self.is_estimation_mode() {
            PREAMBLE_INTS_FULL
        } else {
            PREAMBLE_INTS_MIN
        });
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::REQ.id);
        bytes.write_u8(flags);
        bytes.write_u16_le(self.k);
        bytes.write_u8(self.compactors.len() as u8);
        bytes.write_u8(if raw_items { self.n as u8 } else { 0 });

        if is_empty {
            return bytes.into_bytes();
        }
        if self.is_estimation_mode() {
            bytes.write_u64_le(self.n);
            bytes.write_f32_le(self.min_item.unwrap_or(f32::NAN));
            bytes.write_f32_le(self.max_item.unwrap_or(f32::NAN));
        }
        if raw_items {
            for &item in level_zero.items() {
                bytes.write_f32_le(item);
            }
        } else {
            for compactor in &self.compactors {
                compactor.serialize(&mut bytes);
            }
        }
        bytes.into_bytes()
    }

    /// Deserializes a sketch from bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = SketchSlice::new(bytes);

        let preamble_ints = cursor.read_u8().map_err(make_error("preamble_ints"))?;
        let serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
        let family_id = cursor.read_u8().map_err(make_error("family_id"))?;
        let flags = cursor.read_u8().map_err(make_error("flags"))?;
        let k = cursor.read_u16_le().map_err(make_error("k"))?;
        let num_levels = cursor.read_u8().map_err(make_error("num_levels"))?;
        let num_raw_items = cursor.read_u8().map_err(make_error("num_raw_items"))?;

        Family::REQ.validate_id(family_id)?;
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(SERIAL_VERSION, serial_version));
        }
        let expected_preamble = if num_levels > 1 {
            PREAMBLE_INTS_FULL
        } else {
            PREAMBLE_INTS_MIN
        };
        if preamble_ints != expected_preamble {
            return Err(Error::corrupt(format!(
                "invalid preamble ints: expected {expected_preamble}, got {preamble_ints}"
            )));
        }
        if !(MIN_K..=MAX_K).contains(&k) || k % 2 != 0 {
            return Err(Error::corrupt(format!("k out of range: {k}")));
        }

        let hra = flags & FLAG_HRA != 0;
        if flags & FLAG_EMPTY != 0 {
            return Ok(Self::new(k, hra));
        }
        let level_zero_sorted = flags & FLAG_LEVEL_ZERO_SORTED != 0;

        if flags & FLAG_RAW_ITEMS != 0 {
            let items = read_items(&mut cursor, num_raw_items as usize)?;
            let level_zero = Compactor::from_raw_items(hra, k as u32, level_zero_sorted, items);
            return Ok(Self::exact(k, hra, level_zero));
        }
        if num_levels == 0 || num_levels > MAX_LEVELS {
            return Err(Error::corrupt(format!(
                "num_levels must be in [1, {MAX_LEVELS}], got {num_levels}"
            )));
        }

        let estimation = if num_levels > 1 {
            let n = cursor.read_u64_le().map_err(make_error("n"))?;
            let min_item = cursor.read_f32_le().map_err(make_error("min_item"))?;
            let max_item = cursor.read_f32_le().map_err(make_error("max_item"))?;
            Some((n, min_item, max_item))
        } else {
            None
        };

        let mut compactors = Vec::with_capacity(num_levels as usize);
        for height in 0..num_levels {
            compactors.push(Compactor::deserialize(
                &mut cursor,
                k,
                hra,
                level_zero_sorted,
                height,
            )?);
        }

        match estimation {
            Some((n, min_item, max_item)) => {
                let sketch = Self::with_compactors(
                    k,
                    hra,
                    n,
                    Some(min_item),
                    Some(max_item),
                    compactors,
                );
                let weight = sketch.compactors.iter().try_fold(0u64, |total, c| {
                    (c.num_items() as u64)
                        .checked_mul(1u64 << c.lg_weight())
                        .and_then(|weight| total.checked_add(weight))
                });
                match weight {
                    Some(weight) if weight <= n => Ok(sketch),
                    _ => Err(Error::corrupt("retained weight exceeds n").with_context("n", n)),
                }
            }
            None => {
                let level_zero = compactors.swap_remove(0);
                Ok(Self::exact(k, hra, level_zero))
            }
        }
    }

    /// A single-level sketch whose n and min/max follow from its items.
    fn exact(k: u16, hra: bool, level_zero: Compactor) -> Self {
        let n = level_zero.num_items() as u64;
        let mut sketch = Self::with_compactors(k, hra, n, None, None, vec![level_zero]);
        let items = sketch.compactors[0].items().to_vec();
        for item in items {
            sketch.track_min_max(item);
        }
        sketch
    }
}

impl fmt::Display for ReqSketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### REQ sketch summary:")?;
        writeln!(f, "   K              : {}", self.k)?;
        writeln!(f, "   High Rank Acc  : {}", self.hra)?;
        writeln!(f, "   Empty          : {}", self.is_empty())?;
        writeln!(f, "   Estimation mode: {}", self.is_estimation_mode())?;
        writeln!(f, "   Sorted         : {}", self.compactors[0].is_sorted())?;
        writeln!(f, "   N              : {}", self.n)?;
        writeln!(f, "   Levels         : {}", self.compactors.len())?;
        writeln!(f, "   Retained items : {}", self.num_retained)?;
        writeln!(f, "   Capacity items : {}", self.max_nom_size)?;
        if let (Some(min), Some(max)) = (self.min_item, self.max_item) {
            writeln!(f, "   Min item      : {min}")?;
            writeln!(f, "   Max item      : {max}")?;
        }
        writeln!(f, "### End sketch summary")
    }
}
