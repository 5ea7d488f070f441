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
use std::fmt;

use log::debug;

use super::DEFAULT_K;
use super::DEFAULT_M;
use super::MAX_K;
use super::MIN_K;
use super::helper::compute_total_capacity;
use super::helper::level_capacity;
use super::helper::sum_the_sample_weights;
use super::helper::ub_on_num_levels;
use super::serialization::DATA_START;
use super::serialization::DATA_START_SINGLE_ITEM;
use super::serialization::EMPTY_SIZE_BYTES;
use super::serialization::FLAG_EMPTY;
use super::serialization::FLAG_LEVEL_ZERO_SORTED;
use super::serialization::FLAG_SINGLE_ITEM;
use super::serialization::PREAMBLE_INTS_FULL;
use super::serialization::PREAMBLE_INTS_SHORT;
use super::serialization::SERIAL_VERSION_1;
use super::serialization::SERIAL_VERSION_2;
use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::family::Family;
use crate::codec::make_error;
use crate::common::random::XorShift64;
use crate::common::sorted_view::QuantileItem;
use crate::common::sorted_view::SortedView;
use crate::error::Error;

/// Item types a [`KllSketch`] can hold.
pub trait KllItem: QuantileItem + fmt::Display {
    const SIZE_BYTES: usize;

    fn serialize(value: &Self, bytes: &mut SketchBytes);

    fn deserialize(input: &mut SketchSlice<'_>) -> Result<Self, Error>;
}

impl KllItem for f32 {
    const SIZE_BYTES: usize = 4;

    fn serialize(value: &Self, bytes: &mut SketchBytes) {
        bytes.write_f32_le(*value);
    }

    fn deserialize(input: &mut SketchSlice<'_>) -> Result<Self, Error> {
        input.read_f32_le().map_err(make_error("item"))
    }
}

/// KLL sketch for estimating quantiles and ranks.
///
/// See the [kll module level documentation](crate::kll) for more.
#[allow(private_bounds)]
#[derive(Debug, Clone)]
pub struct KllSketch<T: KllItem> {
    k: u16,
    min_k: u16,
    n: u64,
    is_level_zero_sorted: bool,
    levels: Vec<Vec<T>>,
    min_item: Option<T>,
    max_item: Option<T>,
    rng: XorShift64,
}

impl<T: KllItem> Default for KllSketch<T> {
    fn default() -> Self {
        Self::new(DEFAULT_K)
    }
}

#[allow(private_bounds)]
impl<T: KllItem> KllSketch<T> {
    /// Creates a new sketch with the given value of k.
    ///
    /// # Panics
    ///
    /// Panics if k is not in [MIN_K, MAX_K].
    pub fn new(k: u16) -> Self {
        assert!(
            (MIN_K..=MAX_K).contains(&k),
            "k must be in [{MIN_K}, {MAX_K}], got {k}"
        );
        Self::make(k, k, 0, vec![Vec::new()], None, None, false)
    }

    pub fn k(&self) -> u16 {
        self.k
    }

    /// The smallest k among all sketches merged into this one.
    pub fn min_k(&self) -> u16 {
        self.min_k
    }

    /// Total weight of the stream.
    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn num_retained(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_estimation_mode(&self) -> bool {
        self.levels.len() > 1
    }

    pub fn min_item(&self) -> Option<&T> {
        self.min_item.as_ref()
    }

    pub fn max_item(&self) -> Option<&T> {
        self.max_item.as_ref()
    }

    /// Updates the sketch with a new item. NaN is ignored.
    pub fn update(&mut self, item: T) {
        if T::is_nan(&item) {
            return;
        }
        self.update_min_max(&item);
        self.internal_update(item);
    }

    /// Merges another sketch into this one.
    pub fn merge(&mut self, other: &KllSketch<T>) {
        if other.is_empty() {
            return;
        }

        self.update_min_max_from_other(other);

        let final_n = self.n + other.n;
        for item in &other.levels[0] {
            self.internal_update(item.clone());
        }

        if other.levels.len() >= 2 {
            self.merge_higher_levels(other);
        }

        self.n = final_n;
        if other.is_estimation_mode() {
            self.min_k = self.min_k.min(other.min_k);
        }

        debug_assert_eq!(self.total_weight(), Some(self.n), "total weight does not match n");
    }

    /// Normalized rank of `item`; 0 for an empty sketch.
    pub fn rank(&self, item: &T, inclusive: bool) -> f64 {
        self.sorted_view().rank(item, inclusive)
    }

    /// Item at the given normalized rank, or `None` for an empty sketch.
    ///
    /// # Panics
    ///
    /// Panics if rank is not in [0.0, 1.0].
    pub fn quantile(&self, rank: f64, inclusive: bool) -> Option<T> {
        assert!((0.0..=1.0).contains(&rank), "rank must be in [0.0, 1.0]");
        self.sorted_view().quantile(rank, inclusive)
    }

    /// CDF at the given split points; empty for an empty sketch.
    pub fn cdf(&self, split_points: &[T], inclusive: bool) -> Result<Vec<f64>, Error> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        self.sorted_view().cdf(split_points, inclusive)
    }

    /// PMF over the intervals the split points define; empty for an empty sketch.
    pub fn pmf(&self, split_points: &[T], inclusive: bool) -> Result<Vec<f64>, Error> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        self.sorted_view().pmf(split_points, inclusive)
    }

    /// Normalized rank error for the smallest k merged so far.
    pub fn normalized_rank_error(&self, pmf: bool) -> f64 {
        normalized_rank_error(self.min_k, pmf)
    }

    pub(crate) fn sorted_view(&self) -> SortedView<T> {
        SortedView::from_weighted(self.levels.iter().enumerate().flat_map(|(level, items)| {
            let weight = 1u64 << level;
            items.iter().map(move |item| (item.clone(), weight))
        }))
    }

    /// Largest image a sketch of the given k can produce after `n` updates.
    pub fn max_serialized_size(k: u16, n: u64) -> usize {
        let num_levels = ub_on_num_levels(n);
        let max_num_items = compute_total_capacity(k, DEFAULT_M, num_levels) as usize;
        DATA_START + num_levels * 4 + (max_num_items + 2) * T::SIZE_BYTES
    }

    /// Serializes the sketch to bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let size = self.serialized_size();
        let mut bytes = SketchBytes::with_capacity(size);

        let is_empty = self.is_empty();
        let is_single_item = self.n == 1;

        let preamble_ints = if is_empty || is_single_item {
            PREAMBLE_INTS_SHORT
        } else {
            PREAMBLE_INTS_FULL
        };
        let serial_version = if is_single_item {
            SERIAL_VERSION_2
        } else {
            SERIAL_VERSION_1
        };

        let mut flags = 0;
        if is_empty {
            flags |= FLAG_EMPTY;
        }
        if self.is_level_zero_sorted {
            flags |= FLAG_LEVEL_ZERO_SORTED;
        }
        if is_single_item {
            flags |= FLAG_SINGLE_ITEM;
        }

        bytes.write_u8(preamble_ints);
        bytes.write_u8(serial_version);
        bytes.write_u8(Family::KLL.id);
        bytes.write_u8(flags);
        bytes.write_u16_le(self.k);
        bytes.write_u8(DEFAULT_M);
        bytes.write_u8(0);

        if is_empty {
            return bytes.into_bytes();
        }

        if !is_single_item {
            bytes.write_u64_le(self.n);
            bytes.write_u16_le(self.min_k);
            bytes.write_u8(self.levels.len() as u8);
            bytes.write_u8(0);

            for offset in self.level_offsets().iter().take(self.levels.len()) {
                bytes.write_u32_le(*offset);
            }

            if let Some(min_item) = &self.min_item {
                T::serialize(min_item, &mut bytes);
            }
            if let Some(max_item) = &self.max_item {
                T::serialize(max_item, &mut bytes);
            }
        }

        for level in &self.levels {
            for item in level {
                T::serialize(item, &mut bytes);
            }
        }

        bytes.into_bytes()
    }

    /// Deserializes a sketch from bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<KllSketch<T>, Error> {
        let mut cursor = SketchSlice::new(bytes);

        let preamble_ints = cursor.read_u8().map_err(make_error("preamble_ints"))?;
        let serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
        let family_id = cursor.read_u8().map_err(make_error("family_id"))?;
        let flags = cursor.read_u8().map_err(make_error("flags"))?;
        let k = cursor.read_u16_le().map_err(make_error("k"))?;
        let m = cursor.read_u8().map_err(make_error("m"))?;
        let _unused = cursor.read_u8().map_err(make_error("unused"))?;

        Family::KLL.validate_id(family_id)?;
        if m != DEFAULT_M {
            return Err(Error::corrupt(format!(
                "invalid m: expected {DEFAULT_M}, got {m}"
            )));
        }
        if serial_version != SERIAL_VERSION_1 && serial_version != SERIAL_VERSION_2 {
            return Err(Error::unsupported_serial_version(
                SERIAL_VERSION_1,
                serial_version,
            ));
        }

        let is_empty = (flags & FLAG_EMPTY) != 0;
        let is_single_item = (flags & FLAG_SINGLE_ITEM) != 0;
        let is_level_zero_sorted = (flags & FLAG_LEVEL_ZERO_SORTED) != 0;
        let expected_preamble = if is_empty || is_single_item {
            PREAMBLE_INTS_SHORT
        } else {
            PREAMBLE_INTS_FULL
        };
        if preamble_ints != expected_preamble {
            return Err(Error::corrupt(format!(
                "invalid preamble ints: expected {expected_preamble}, got {preamble_ints}"
            )));
        }

        if k < MIN_K {
            return Err(Error::corrupt(format!("k out of range: {k}")));
        }

        if is_empty {
            return Ok(Self::make(
                k,
                k,
                0,
                vec![Vec::new()],
                None,
                None,
                is_level_zero_sorted,
            ));
        }

        let (n, min_k, num_levels) = if is_single_item {
            (1u64, k, 1usize)
        } else {
            let n = cursor.read_u64_le().map_err(make_error("n"))?;
            let min_k = cursor.read_u16_le().map_err(make_error("min_k"))?;
            let num_levels = cursor.read_u8().map_err(make_error("num_levels"))?;
            let _unused = cursor.read_u8().map_err(make_error("unused2"))?;
            (n, min_k, num_levels as usize)
        };

        if num_levels == 0 {
            return Err(Error::corrupt("num_levels must be > 0"));
        }
        if min_k < MIN_K || min_k > k {
            return Err(Error::corrupt(format!(
                "min_k must be in [{MIN_K}, {k}], got {min_k}"
            )));
        }

        let capacity = compute_total_capacity(k, DEFAULT_M, num_levels);
        let mut level_offsets = Vec::with_capacity(num_levels + 1);
        if is_single_item {
            level_offsets.push(capacity - 1);
        } else {
            for _ in 0..num_levels {
                level_offsets.push(cursor.read_u32_le().map_err(make_error("levels"))?);
            }
        }
        level_offsets.push(capacity);

        if level_offsets[0] > capacity {
            return Err(Error::corrupt("levels[0] exceeds capacity"));
        }
        if level_offsets.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(Error::corrupt("levels array must be non-decreasing"));
        }

        let (min_item, max_item) = if is_single_item {
            (None, None)
        } else {
            (
                Some(T::deserialize(&mut cursor)?),
                Some(T::deserialize(&mut cursor)?),
            )
        };

        let mut levels = Vec::with_capacity(num_levels);
        for level in 0..num_levels {
            let size = (level_offsets[level + 1] - level_offsets[level]) as usize;
            if size * T::SIZE_BYTES > cursor.remaining() {
                return Err(Error::insufficient_data("items"));
            }
            let mut items = Vec::with_capacity(size);
            for _ in 0..size {
                items.push(T::deserialize(&mut cursor)?);
            }
            levels.push(items);
        }

        let mut sketch = Self::make(
            k,
            min_k,
            n,
            levels,
            min_item,
            max_item,
            is_level_zero_sorted,
        );

        if is_single_item {
            if let Some(item) = sketch.levels[0].first().cloned() {
                sketch.min_item = Some(item.clone());
                sketch.max_item = Some(item);
            }
        }
        if sketch.total_weight() != Some(sketch.n) {
            return Err(Error::corrupt("level sizes do not add up to n")
                .with_context("n", sketch.n));
        }

        Ok(sketch)
    }

    fn make(
        k: u16,
        min_k: u16,
        n: u64,
        levels: Vec<Vec<T>>,
        min_item: Option<T>,
        max_item: Option<T>,
        is_level_zero_sorted: bool,
    ) -> Self {
        Self {
            k,
            min_k,
            n,
            is_level_zero_sorted,
            levels,
            min_item,
            max_item,
            rng: XorShift64::default(),
        }
    }

    fn capacity(&self) -> usize {
        compute_total_capacity(self.k, DEFAULT_M, self.levels.len()) as usize
    }

    fn level_offsets(&self) -> Vec<u32> {
        let capacity = self.capacity() as u32;
        let retained = self.num_retained() as u32;
        debug_assert!(capacity >= retained, "capacity must be >= retained");

        let mut offsets = Vec::with_capacity(self.levels.len() + 1);
        let mut offset = capacity - retained;
        offsets.push(offset);
        for level in &self.levels {
            offset += level.len() as u32;
            offsets.push(offset);
        }
        offsets
    }

    fn serialized_size(&self) -> usize {
        if self.is_empty() {
            return EMPTY_SIZE_BYTES;
        }
        if self.n == 1 {
            return DATA_START_SINGLE_ITEM + T::SIZE_BYTES;
        }
        DATA_START + self.levels.len() * 4 + (self.num_retained() + 2) * T::SIZE_BYTES
    }

    fn update_min_max(&mut self, item: &T) {
        match (&self.min_item, &self.max_item) {
            (Some(min), Some(max)) => {
                if T::cmp(item, min) == Ordering::Less {
                    self.min_item = Some(item.clone());
                }
                if T::cmp(max, item) == Ordering::Less {
                    self.max_item = Some(item.clone());
                }
            }
            _ => {
                self.min_item = Some(item.clone());
                self.max_item = Some(item.clone());
            }
        }
    }

    fn update_min_max_from_other(&mut self, other: &KllSketch<T>) {
        if let Some(other_min) = &other.min_item {
            self.update_min_max(other_min);
        }
        if let Some(other_max) = &other.max_item {
            self.update_min_max(other_max);
        }
    }

    fn internal_update(&mut self, item: T) {
        if self.num_retained() >= self.capacity() {
            self.compress_while_updating();
        }
        self.n += 1;
        self.is_level_zero_sorted = false;
        self.levels[0].insert(0, item);
    }

    fn compress_while_updating(&mut self) {
        let level = self.find_level_to_compact();
        if level + 1 == self.levels.len() {
            self.levels.push(Vec::new());
        }

        let current = std::mem::take(&mut self.levels[level]);
        let above = std::mem::take(&mut self.levels[level + 1]);
        let sort_first = level == 0 && !self.is_level_zero_sorted;
        let (leftover, above) = compact_pair(current, above, sort_first, self.rng.next_bit());
        self.levels[level + 1] = above;
        self.levels[level] = leftover;
    }

    fn find_level_to_compact(&self) -> usize {
        let num_levels = self.levels.len();
        (0..num_levels)
            .find(|&level| {
                self.levels[level].len() as u32
                    >= level_capacity(self.k, num_levels, level, DEFAULT_M)
            })
            // some level is full whenever the sketch is at capacity
            .unwrap_or(0)
    }

    fn merge_higher_levels(&mut self, other: &KllSketch<T>) {
        let provisional_levels = self.levels.len().max(other.levels.len());
        let mut self_levels = std::mem::take(&mut self.levels);
        let mut work_levels = vec![Vec::new(); provisional_levels];
        work_levels[0] = std::mem::take(&mut self_levels[0]);

        for level in 1..provisional_levels {
            let left = self_levels
                .get_mut(level)
                .map(std::mem::take)
                .unwrap_or_default();
            let right = other.levels.get(level).cloned().unwrap_or_default();
            work_levels[level] = merge_sorted_vec(left, right);
        }

        self.levels = general_compress(
            work_levels,
            self.k,
            self.is_level_zero_sorted,
            &mut self.rng,
        );
        debug!(
            "KLL merge left {} levels holding {} items",
            self.levels.len(),
            self.num_retained()
        );
    }

    fn total_weight(&self) -> Option<u64> {
        sum_the_sample_weights(self.levels.iter().map(Vec::len))
    }
}

impl<T: KllItem> fmt::Display for KllSketch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### KLL sketch summary:")?;
        writeln!(f, "   K              : {}", self.k)?;
        writeln!(f, "   min K          : {}", self.min_k)?;
        writeln!(f, "   M              : {DEFAULT_M}")?;
        writeln!(f, "   N              : {}", self.n)?;
        writeln!(
            f,
            "   Epsilon        : {:.2}%",
            self.normalized_rank_error(false) * 100.0
        )?;
        writeln!(
            f,
            "   Epsilon PMF    : {:.2}%",
            self.normalized_rank_error(true) * 100.0
        )?;
        writeln!(f, "   Empty          : {}", self.is_empty())?;
        writeln!(f, "   Estimation mode: {}", self.is_estimation_mode())?;
        writeln!(f, "   Levels         : {}", self.levels.len())?;
        writeln!(f, "   Sorted         : {}", self.is_level_zero_sorted)?;
        writeln!(f, "   Capacity items : {}", self.capacity())?;
        writeln!(f, "   Retained items : {}", self.num_retained())?;
        if let (Some(min), Some(max)) = (&self.min_item, &self.max_item) {
            writeln!(f, "   Min item      : {min}")?;
            writeln!(f, "   Max item      : {max}")?;
        }
        writeln!(f, "### End sketch summary")
    }
}

pub(super) fn normalized_rank_error(k: u16, pmf: bool) -> f64 {
    let k = k as f64;
    if pmf {
        2.446 / k.powf(0.9433)
    } else {
        2.296 / k.powf(0.9723)
    }
}

/// Halves `current` into `above`. An odd item stays behind; returns the new
/// contents of both levels.
fn compact_pair<T: KllItem>(
    mut current: Vec<T>,
    above: Vec<T>,
    sort_first: bool,
    coin: usize,
) -> (Vec<T>, Vec<T>) {
    let mut leftover = Vec::new();
    if current.len() % 2 == 1 {
        leftover.push(current.remove(0));
    }
    if sort_first {
        current.sort_by(T::cmp);
    }

    let use_up = above.is_empty();
    let promoted = downsample(current, coin, use_up);
    (leftover, merge_sorted_vec(promoted, above))
}

fn downsample<T: KllItem>(items: Vec<T>, coin: usize, use_up: bool) -> Vec<T> {
    let len = items.len();
    debug_assert!(len % 2 == 0, "length must be even");
    let offset = coin & 1;
    let parity = if use_up && len > 0 {
        (len - 1 - offset) % 2
    } else {
        offset
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| (idx % 2 == parity).then_some(item))
        .collect()
}

fn merge_sorted_vec<T: KllItem>(left: Vec<T>, right: Vec<T>) -> Vec<T> {
    if left.is_empty() {
        return right;
    }
    if right.is_empty() {
        return left;
    }
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left_iter = left.into_iter().peekable();
    let mut right_iter = right.into_iter().peekable();

    while let (Some(l), Some(r)) = (left_iter.peek(), right_iter.peek()) {
        let next = if T::cmp(l, r) == Ordering::Less {
            left_iter.next()
        } else {
            right_iter.next()
        };
        merged.extend(next);
    }
    merged.extend(left_iter);
    merged.extend(right_iter);
    merged
}

fn general_compress<T: KllItem>(
    mut levels_in: Vec<Vec<T>>,
    k: u16,
    is_level_zero_sorted: bool,
    rng: &mut XorShift64,
) -> Vec<Vec<T>> {
    let mut current_num_levels = levels_in.len();
    let mut current_item_count: usize = levels_in.iter().map(Vec::len).sum();
    let mut target_item_count = compute_total_capacity(k, DEFAULT_M, current_num_levels) as usize;
    let mut levels_out = Vec::with_capacity(current_num_levels + 1);

    let mut current_level = 0usize;
    while current_level < current_num_levels {
        if current_level + 1 >= levels_in.len() {
            levels_in.push(Vec::new());
        }

        let raw_pop = levels_in[current_level].len();
        let cap = level_capacity(k, current_num_levels, current_level, DEFAULT_M) as usize;

        if current_item_count < target_item_count || raw_pop < cap {
            levels_out.push(std::mem::take(&mut levels_in[current_level]));
        } else {
            let current = std::mem::take(&mut levels_in[current_level]);
            let above = std::mem::take(&mut levels_in[current_level + 1]);
            let above_len = above.len();
            let sort_first = current_level == 0 && !is_level_zero_sorted;
            let (leftover, above) = compact_pair(current, above, sort_first, rng.next_bit());
            let promoted_len = above.len() - above_len;
            levels_in[current_level + 1] = above;
            levels_out.push(leftover);

            current_item_count = current_item_count.saturating_sub(promoted_len);

            if current_level == current_num_levels - 1 {
                current_num_levels += 1;
                target_item_count += level_capacity(k, current_num_levels, 0, DEFAULT_M) as usize;
                if levels_in.len() < current_num_levels + 1 {
                    levels_in.resize_with(current_num_levels + 1, Vec::new);
                }
            }
        }
        current_level += 1;
    }

    levels_out.truncate(current_num_levels);
    levels_out
}
