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

use super::MAX_LG_MAX_MAP_SIZE;
use super::MIN_LG_MAX_MAP_SIZE;
use super::reverse_purge_item_hash_map::ReversePurgeItemHashMap;
use super::serialization::DATA_START;
use super::serialization::EMPTY_FLAG_MASK;
use super::serialization::PREAMBLE_LONGS_EMPTY;
use super::serialization::PREAMBLE_LONGS_NONEMPTY;
use super::serialization::SERIAL_VERSION;
use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::family::Family;
use crate::codec::make_error;
use crate::error::Error;

const LG_MIN_MAP_SIZE: u8 = 3;
const SAMPLE_SIZE: usize = 1024;
const EPSILON_FACTOR: f64 = 3.5;
const LOAD_FACTOR_NUMERATOR: usize = 3;
const LOAD_FACTOR_DENOMINATOR: usize = 4;

/// Which side of the error the result of a frequent items query may be on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Every returned item is truly above the threshold; some may be missed.
    NoFalsePositives,
    /// Every item above the threshold is returned; some may not belong.
    NoFalseNegatives,
}

impl ErrorType {
    /// Resolves `"NO_FALSE_POSITIVES"` or `"NO_FALSE_NEGATIVES"`.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "NO_FALSE_POSITIVES" => Ok(ErrorType::NoFalsePositives),
            "NO_FALSE_NEGATIVES" => Ok(ErrorType::NoFalseNegatives),
            _ => Err(Error::invalid_argument(format!("unknown error type: {name:?}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorType::NoFalsePositives => "NO_FALSE_POSITIVES",
            ErrorType::NoFalseNegatives => "NO_FALSE_NEGATIVES",
        }
    }
}

/// One item of a frequent items query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub item: String,
    pub estimate: i64,
    pub lower_bound: i64,
    pub upper_bound: i64,
}

/// Frequent items sketch over UTF-8 strings with `i64` weights.
#[derive(Debug, Clone)]
pub struct FrequentStringsSketch {
    lg_max_map_size: u8,
    cur_map_cap: usize,
    offset: i64,
    stream_weight: i64,
    sample_size: usize,
    hash_map: ReversePurgeItemHashMap,
}

impl FrequentStringsSketch {
    /// Creates a sketch whose map grows up to `2^lg_max_map_size` slots.
    ///
    /// # Panics
    ///
    /// Panics if `lg_max_map_size` is not in `3..=26`.
    pub fn new(lg_max_map_size: u8) -> Self {
        assert!(
            (MIN_LG_MAX_MAP_SIZE..=MAX_LG_MAX_MAP_SIZE).contains(&lg_max_map_size),
            "lg_max_map_size must be in [{MIN_LG_MAX_MAP_SIZE}, {MAX_LG_MAX_MAP_SIZE}], got {lg_max_map_size}"
        );
        Self::with_lg_map_sizes(lg_max_map_size, LG_MIN_MAP_SIZE)
    }

    pub fn is_empty(&self) -> bool {
        self.hash_map.num_active() == 0
    }

    pub fn num_active_items(&self) -> usize {
        self.hash_map.num_active()
    }

    pub fn total_weight(&self) -> i64 {
        self.stream_weight
    }

    pub fn lg_max_map_size(&self) -> u8 {
        self.lg_max_map_size
    }

    pub fn lg_cur_map_size(&self) -> u8 {
        self.hash_map.lg_length()
    }

    /// Estimated weight of `item`, or 0 if it is not tracked.
    pub fn estimate(&self, item: &str) -> i64 {
        let value = self.hash_map.get(item);
        if value > 0 { value + self.offset } else { 0 }
    }

    pub fn lower_bound(&self, item: &str) -> i64 {
        self.hash_map.get(item)
    }

    pub fn upper_bound(&self, item: &str) -> i64 {
        self.hash_map.get(item) + self.offset
    }

    /// Upper bound on the error of any single estimate.
    pub fn maximum_error(&self) -> i64 {
        self.offset
    }

    /// A priori error bound as a fraction of the total weight.
    pub fn epsilon(&self) -> f64 {
        epsilon_for_lg(self.lg_max_map_size)
    }

    pub fn maximum_map_capacity(&self) -> usize {
        (1usize << self.lg_max_map_size) * LOAD_FACTOR_NUMERATOR / LOAD_FACTOR_DENOMINATOR
    }

    pub fn update(&mut self, item: &str) {
        self.update_with_count(item, 1);
    }

    /// Adds `count` occurrences of `item`. A zero count is ignored.
    ///
    /// # Panics
    ///
    /// Panics if `count` is negative.
    pub fn update_with_count(&mut self, item: &str, count: i64) {
        if count == 0 {
            return;
        }
        assert!(count > 0, "count may not be negative");
        self.stream_weight += count;
        self.hash_map.adjust_or_put_value(item, count);
        self.maybe_resize_or_purge();
    }

    /// Merges another sketch into this one.
    pub fn merge(&mut self, other: &FrequentStringsSketch) {
        if other.is_empty() {
            return;
        }
        let merged_total = self.stream_weight + other.stream_weight;
        for (item, count) in other.hash_map.iter() {
            self.update_with_count(item, count);
        }
        self.offset += other.offset;
        self.stream_weight = merged_total;
    }

    /// Returns the items whose bound selected by `error_type` exceeds
    /// `threshold`, sorted by estimate in descending order. Thresholds below
    /// the maximum error are raised to it, so 0 means the maximum error.
    pub fn frequent_items(&self, error_type: ErrorType, threshold: i64) -> Vec<Row> {
        let threshold = threshold.max(self.offset);
        let mut rows: Vec<Row> = self
            .hash_map
            .active()
            .filter_map(|(item, count)| {
                let lower = count;
                let upper = count + self.offset;
                let include = match error_type {
                    ErrorType::NoFalseNegatives => upper > threshold,
                    ErrorType::NoFalsePositives => lower > threshold,
                };
                include.then(|| Row {
                    item: item.to_owned(),
                    estimate: upper,
                    lower_bound: lower,
                    upper_bound: upper,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.estimate.cmp(&a.estimate).then_with(|| a.item.cmp(&b.item)));
        rows
    }

    /// Serializes this sketch into a byte vector.
    pub fn serialize(&self) -> Vec<u8> {
        if self.is_empty() {
            let mut bytes = SketchBytes::with_capacity(8);
            self.write_preamble(&mut bytes, PREAMBLE_LONGS_EMPTY, EMPTY_FLAG_MASK);
            return bytes.into_bytes();
        }

        let active = self.hash_map.active().collect::<Vec<_>>();
        let items_len: usize = active.iter().map(|(item, _)| 4 + item.len()).sum();
        let mut bytes = SketchBytes::with_capacity(DATA_START + active.len() * 8 + items_len);
        self.write_preamble(&mut bytes, PREAMBLE_LONGS_NONEMPTY, 0);
        bytes.write_u32_le(active.len() as u32);
        bytes.write_u32_le(0);
        bytes.write_i64_le(self.stream_weight);
        bytes.write_i64_le(self.offset);
        for (_, count) in &active {
            bytes.write_i64_le(*count);
        }
        for (item, _) in &active {
            bytes.write_u32_le(item.len() as u32);
            bytes.write(item.as_bytes());
        }
        bytes.into_bytes()
    }

    /// Deserializes a sketch from bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = SketchSlice::new(bytes);
        let pre_longs = cursor.read_u8().map_err(make_error("preamble_longs"))? & 0x3f;
        let serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
        let family_id = cursor.read_u8().map_err(make_error("family_id"))?;
        let lg_max = cursor.read_u8().map_err(make_error("lg_max_map_size"))?;
        let lg_cur = cursor.read_u8().map_err(make_error("lg_cur_map_size"))?;
        let flags = cursor.read_u8().map_err(make_error("flags"))?;
        let _unused = cursor.read_u16_le().map_err(make_error("unused"))?;

        Family::FREQUENCY.validate_id(family_id)?;
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(SERIAL_VERSION, serial_version));
        }
        if !(MIN_LG_MAX_MAP_SIZE..=MAX_LG_MAX_MAP_SIZE).contains(&lg_max) {
            return Err(Error::corrupt(format!("lg_max_map_size out of range: {lg_max}")));
        }
        if lg_cur > lg_max {
            return Err(Error::corrupt(format!(
                "lg_cur_map_size {lg_cur} exceeds lg_max_map_size {lg_max}"
            )));
        }

        if flags & EMPTY_FLAG_MASK != 0 {
            if pre_longs != PREAMBLE_LONGS_EMPTY {
                return Err(Error::corrupt(format!(
                    "empty sketch with preamble longs {pre_longs}"
                )));
            }
            return Ok(Self::with_lg_map_sizes(lg_max, lg_cur));
        }
        if pre_longs != PREAMBLE_LONGS_NONEMPTY {
            return Err(Error::corrupt(format!(
                "non-empty sketch with preamble longs {pre_longs}"
            )));
        }

        let active_items = cursor.read_u32_le().map_err(make_error("active_items"))? as usize;
        let _pad = cursor.read_u32_le().map_err(make_error("pad"))?;
        let stream_weight = cursor.read_i64_le().map_err(make_error("stream_weight"))?;
        let offset = cursor.read_i64_le().map_err(make_error("offset"))?;
        if active_items.saturating_mul(12) > cursor.remaining() {
            return Err(Error::insufficient_data("values"));
        }

        let mut values = Vec::with_capacity(active_items);
        let mut total = 0i64;
        for _ in 0..active_items {
            let value = cursor.read_i64_le().map_err(make_error("value"))?;
            if value <= 0 {
                return Err(Error::corrupt(format!("non-positive item count: {value}")));
            }
            total = total
                .checked_add(value)
                .filter(|total| *total <= stream_weight)
                .ok_or_else(|| {
                    Error::corrupt("item counts exceed the stream weight")
                        .with_context("stream_weight", stream_weight)
                })?;
            values.push(value);
        }
        if offset < 0 {
            return Err(Error::corrupt(format!("negative max error: {offset}")));
        }

        let mut sketch = Self::with_lg_map_sizes(lg_max, lg_cur);
        for value in values {
            let len = cursor.read_u32_le().map_err(make_error("item_len"))? as usize;
            if len > cursor.remaining() {
                return Err(Error::insufficient_data("item"));
            }
            let mut raw = vec![0u8; len];
            cursor.read_exact(&mut raw).map_err(make_error("item"))?;
            let item = String::from_utf8(raw)
                .map_err(|err| Error::corrupt("item is not valid UTF-8").set_source(err))?;
            sketch.update_with_count(&item, value);
        }
        sketch.stream_weight = stream_weight;
        sketch.offset = offset;
        Ok(sketch)
    }

    fn write_preamble(&self, bytes: &mut SketchBytes, pre_longs: u8, flags: u8) {
        bytes.write_u8(pre_longs);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::FREQUENCY.id);
        bytes.write_u8(self.lg_max_map_size);
        bytes.write_u8(self.hash_map.lg_length());
        bytes.write_u8(flags);
        bytes.write_u16_le(0);
    }

    fn maybe_resize_or_purge(&mut self) {
        if self.hash_map.num_active() <= self.cur_map_cap {
            return;
        }
        if self.hash_map.lg_length() < self.lg_max_map_size {
            self.hash_map.resize(self.hash_map.length() * 2);
            self.cur_map_cap = self.hash_map.capacity();
        } else {
            self.offset += self.hash_map.purge(self.sample_size);
            debug_assert!(
                self.hash_map.num_active() <= self.maximum_map_capacity(),
                "purge did not reduce number of active items"
            );
        }
    }

    fn with_lg_map_sizes(lg_max_map_size: u8, lg_cur_map_size: u8) -> Self {
        let lg_max = lg_max_map_size.max(LG_MIN_MAP_SIZE);
        let lg_cur = lg_cur_map_size.clamp(LG_MIN_MAP_SIZE, lg_max);
        let hash_map = ReversePurgeItemHashMap::new(1usize << lg_cur);
        let cur_map_cap = hash_map.capacity();
        let max_map_cap = (1usize << lg_max) * LOAD_FACTOR_NUMERATOR / LOAD_FACTOR_DENOMINATOR;
        Self {
            lg_max_map_size: lg_max,
            cur_map_cap,
            offset: 0,
            stream_weight: 0,
            sample_size: SAMPLE_SIZE.min(max_map_cap),
            hash_map,
        }
    }
}

impl fmt::Display for FrequentStringsSketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### Frequent items sketch summary:")?;
        writeln!(f, "   lg cur map size  : {}", self.lg_cur_map_size())?;
        writeln!(f, "   lg max map size  : {}", self.lg_max_map_size)?;
        writeln!(f, "   num active items : {}", self.num_active_items())?;
        writeln!(f, "   total weight     : {}", self.stream_weight)?;
        writeln!(f, "   max error        : {}", self.offset)?;
        writeln!(f, "### End sketch summary")
    }
}

fn epsilon_for_lg(lg_max_map_size: u8) -> f64 {
    EPSILON_FACTOR / (1u64 << lg_max_map_size) as f64
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn test_empty() {
        let sketch = FrequentStringsSketch::new(5);
        assert!(sketch.is_empty());
        assert_that!(sketch.estimate("a"), eq(0));
        assert_that!(sketch.maximum_error(), eq(0));
        assert!(sketch.frequent_items(ErrorType::NoFalseNegatives, 0).is_empty());

        let bytes = sketch.serialize();
        assert_eq!(bytes, vec![1, 1, 10, 5, 3, 5, 0, 0]);
        let decoded = FrequentStringsSketch::deserialize(&bytes).unwrap();
        assert!(decoded.is_empty());
        assert_that!(decoded.lg_max_map_size(), eq(5));
    }

    #[test]
    fn test_exact_counts_below_capacity() {
        let mut sketch = FrequentStringsSketch::new(5);
        sketch.update("a");
        sketch.update("a");
        sketch.update_with_count("b", 5);
        sketch.update_with_count("c", 0);
        assert_that!(sketch.estimate("a"), eq(2));
        assert_that!(sketch.lower_bound("b"), eq(5));
        assert_that!(sketch.upper_bound("b"), eq(5));
        assert_that!(sketch.estimate("c"), eq(0));
        assert_that!(sketch.total_weight(), eq(7));
        assert_that!(sketch.num_active_items(), eq(2));
    }

    #[test]
    fn test_purge_bounds_hold() {
        let mut sketch = FrequentStringsSketch::new(6);
        for i in 0..1000 {
            sketch.update(&format!("item{}", i % 50));
            if i % 4 == 0 {
                sketch.update("heavy");
            }
        }
        assert_that!(sketch.num_active_items(), le(sketch.maximum_map_capacity()));
        assert_that!(sketch.maximum_error(), gt(0));
        assert_that!(sketch.lower_bound("heavy"), le(250));
        assert_that!(sketch.upper_bound("heavy"), ge(250));

        let rows = sketch.frequent_items(ErrorType::NoFalseNegatives, 0);
        assert_eq!(rows[0].item, "heavy");
    }

    #[test]
    fn test_frequent_items_sorted() {
        let mut sketch = FrequentStringsSketch::new(5);
        sketch.update_with_count("x", 1);
        sketch.update_with_count("y", 10);
        sketch.update_with_count("z", 4);
        let rows = sketch.frequent_items(ErrorType::NoFalsePositives, 2);
        let items: Vec<&str> = rows.iter().map(|r| r.item.as_str()).collect();
        assert_eq!(items, vec!["y", "z"]);
        assert_that!(rows[0].estimate, eq(10));
    }

    #[test]
    fn test_error_type_names() {
        assert_that!(
            ErrorType::from_name("NO_FALSE_POSITIVES").unwrap(),
            eq(ErrorType::NoFalsePositives)
        );
        assert_that!(ErrorType::NoFalseNegatives.name(), eq("NO_FALSE_NEGATIVES"));
        assert!(ErrorType::from_name("no_false_positives").is_err());
    }

    #[test]
    fn test_merge_and_round_trip() {
        let mut a = FrequentStringsSketch::new(5);
        a.update("a");
        a.update("a");
        a.update("c");
        let b = a.clone();
        a.merge(&b);
        assert_that!(a.estimate("a"), eq(4));
        assert_that!(a.estimate("c"), eq(2));
        assert_that!(a.total_weight(), eq(6));

        let decoded = FrequentStringsSketch::deserialize(&a.serialize()).unwrap();
        assert_that!(decoded.estimate("a"), eq(4));
        assert_that!(decoded.estimate("c"), eq(2));
        assert_that!(decoded.total_weight(), eq(6));
    }

    #[test]
    fn test_display() {
        let mut sketch = FrequentStringsSketch::new(5);
        sketch.update_with_count("a", 4);
        sketch.update_with_count("c", 2);
        let expected = "### Frequent items sketch summary:\n   lg cur map size  : 3\n   lg max map size  : 5\n   num active items : 2\n   total weight     : 6\n   max error        : 0\n### End sketch summary\n";
        assert_eq!(sketch.to_string(), expected);
    }

    #[test]
    fn test_deserialize_rejects_truncated_items() {
        let mut sketch = FrequentStringsSketch::new(5);
        sketch.update("hello");
        let bytes = sketch.serialize();
        let err = FrequentStringsSketch::deserialize(&bytes[..bytes.len() - 2]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CorruptFormat);
    }

    #[test]
    fn test_deserialize_rejects_inconsistent_weights() {
        let mut sketch = FrequentStringsSketch::new(5);
        sketch.update_with_count("a", 3);
        sketch.update_with_count("b", 2);
        let bytes = sketch.serialize();
        assert!(FrequentStringsSketch::deserialize(&bytes).is_ok());

        // Stream weight at 16, max error at 24, first count at 32.
        let patches: [(usize, i64); 4] = [(32, i64::MAX), (32, i64::MAX - 1), (16, 1), (24, -1)];
        for (at, value) in patches {
            let mut bad = bytes.clone();
            bad[at..at + 8].copy_from_slice(&value.to_le_bytes());
            let err = FrequentStringsSketch::deserialize(&bad).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::CorruptFormat);
        }
    }
}
