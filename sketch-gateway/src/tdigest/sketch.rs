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

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use super::DEFAULT_K;
use super::MIN_K;
use super::serialization::FLAGS_IS_EMPTY;
use super::serialization::FLAGS_IS_SINGLE_VALUE;
use super::serialization::FLAGS_REVERSE_MERGE;
use super::serialization::PREAMBLE_LONGS_EMPTY_OR_SINGLE;
use super::serialization::PREAMBLE_LONGS_MULTIPLE;
use super::serialization::SERIAL_VERSION;
use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::family::Family;
use crate::codec::make_error;
use crate::error::Error;

const BUFFER_MULTIPLIER: usize = 4;

/// T-Digest sketch for estimating quantiles and ranks.
///
/// See the [module documentation](super) for more details.
#[derive(Debug, Clone, PartialEq)]
pub struct TDigest {
    k: u16,

    reverse_merge: bool,
    min: f64,
    max: f64,

    centroids: Vec<Centroid>,
    centroids_weight: u64,
    centroids_capacity: usize,
    buffer: Vec<f64>,
}

impl Default for TDigest {
    fn default() -> Self {
        TDigest::new(DEFAULT_K)
    }
}

impl TDigest {
    /// Creates a tdigest instance with the given value of k.
    ///
    /// # Panics
    ///
    /// If k is less than 10
    pub fn new(k: u16) -> Self {
        assert!(k >= MIN_K, "k must be at least {MIN_K}, got {k}");

        let centroids_capacity = centroids_capacity(k);
        TDigest {
            k,
            reverse_merge: false,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            centroids: Vec::with_capacity(centroids_capacity),
            centroids_weight: 0,
            centroids_capacity,
            buffer: Vec::with_capacity(centroids_capacity * BUFFER_MULTIPLIER),
        }
    }

    pub fn k(&self) -> u16 {
        self.k
    }

    /// Update this TDigest with the given value (`NaN` values are ignored).
    pub fn update(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }

        if self.buffer.len() >= self.centroids_capacity * BUFFER_MULTIPLIER {
            self.compress();
        }

        self.buffer.push(value);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Merges another digest into this one. The other digest's k is ignored.
    pub fn merge(&mut self, other: &TDigest) {
        if other.is_empty() {
            return;
        }
        let mut incoming = Vec::with_capacity(
            self.buffer.len() + other.buffer.len() + other.centroids.len(),
        );
        incoming.extend(self.buffer.iter().map(|&mean| Centroid { mean, weight: 1 }));
        incoming.extend(other.buffer.iter().map(|&mean| Centroid { mean, weight: 1 }));
        incoming.extend_from_slice(&other.centroids);
        let weight = self.buffer.len() as u64 + other.total_weight();
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.merge_centroids(incoming, weight);
    }

    /// Returns true if TDigest has not seen any data.
    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty() && self.buffer.is_empty()
    }

    /// Returns minimum value seen by TDigest.
    pub fn min_value(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.min)
    }

    /// Returns maximum value seen by TDigest.
    pub fn max_value(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.max)
    }

    /// Returns total weight.
    pub fn total_weight(&self) -> u64 {
        self.centroids_weight + (self.buffer.len() as u64)
    }

    /// Number of centroids plus buffered values.
    pub fn num_retained(&self) -> usize {
        self.centroids.len() + self.buffer.len()
    }

    /// Approximate normalized rank of `value`; 0 for an empty digest.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for NaN.
    pub fn rank(&self, value: f64) -> Result<f64, Error> {
        if value.is_nan() {
            return Err(Error::invalid_argument("rank is undefined for NaN"));
        }
        if self.is_empty() {
            return Ok(0.0);
        }
        Ok(self.compressed().rank_of_compressed(value))
    }

    /// Compute approximate quantile value corresponding to the given normalized rank.
    /// Returns `None` for an empty digest.
    ///
    /// # Panics
    ///
    /// If rank is not in [0.0, 1.0].
    pub fn quantile(&self, rank: f64) -> Option<f64> {
        assert!((0.0..=1.0).contains(&rank), "rank must be in [0.0, 1.0]");
        if self.is_empty() {
            return None;
        }
        Some(self.compressed().quantile_of_compressed(rank))
    }

    /// CDF at the given split points; empty for an empty digest.
    pub fn cdf(&self, split_points: &[f64]) -> Result<Vec<f64>, Error> {
        check_split_points(split_points)?;
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let digest = self.compressed();
        let mut ranks: Vec<f64> = split_points
            .iter()
            .map(|&point| digest.rank_of_compressed(point))
            .collect();
        ranks.push(1.0);
        Ok(ranks)
    }

    /// PMF over the intervals the split points define; empty for an empty digest.
    pub fn pmf(&self, split_points: &[f64]) -> Result<Vec<f64>, Error> {
        let mut buckets = self.cdf(split_points)?;
        for i in (1..buckets.len()).rev() {
            buckets[i] -= buckets[i - 1];
        }
        Ok(buckets)
    }

    /// Serializes the digest after folding in any buffered values.
    pub fn serialize(&self) -> Vec<u8> {
        let digest = self.compressed();
        digest.serialize_compressed()
    }

    /// Deserializes a digest from bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<TDigest, Error> {
        let mut cursor = SketchSlice::new(bytes);

        let preamble_longs = cursor.read_u8().map_err(make_error("preamble_longs"))?;
        let serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
        let family_id = cursor.read_u8().map_err(make_error("family_id"))?;
        Family::TDIGEST.validate_id(family_id)?;
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(SERIAL_VERSION, serial_version));
        }
        let k = cursor.read_u16_le().map_err(make_error("k"))?;
        if k < MIN_K {
            return Err(Error::corrupt(format!("k must be at least {MIN_K}, got {k}")));
        }
        let flags = cursor.read_u8().map_err(make_error("flags"))?;
        let _unused = cursor.read_u16_le().map_err(make_error("unused"))?;

        let is_empty = flags & FLAGS_IS_EMPTY != 0;
        let is_single_value = flags & FLAGS_IS_SINGLE_VALUE != 0;
        let expected_preamble = if is_empty || is_single_value {
            PREAMBLE_LONGS_EMPTY_OR_SINGLE
        } else {
            PREAMBLE_LONGS_MULTIPLE
        };
        if preamble_longs != expected_preamble {
            return Err(Error::corrupt(format!(
                "invalid preamble longs: expected {expected_preamble}, got {preamble_longs}"
            )));
        }

        let mut digest = TDigest::new(k);
        digest.reverse_merge = flags & FLAGS_REVERSE_MERGE != 0;
        if is_empty {
            return Ok(digest);
        }
        if is_single_value {
            let value = cursor.read_f64_le().map_err(make_error("single_value"))?;
            if value.is_nan() {
                return Err(Error::corrupt("single value is NaN"));
            }
            digest.min = value;
            digest.max = value;
            digest.centroids.push(Centroid {
                mean: value,
                weight: 1,
            });
            digest.centroids_weight = 1;
            return Ok(digest);
        }

        let num_centroids = cursor.read_u32_le().map_err(make_error("num_centroids"))? as usize;
        let num_buffered = cursor.read_u32_le().map_err(make_error("num_buffered"))? as usize;
        digest.min = cursor.read_f64_le().map_err(make_error("min"))?;
        digest.max = cursor.read_f64_le().map_err(make_error("max"))?;
        let needed = num_centroids
            .saturating_mul(16)
            .saturating_add(num_buffered.saturating_mul(8));
        if needed > cursor.remaining() {
            return Err(Error::insufficient_data("centroids"));
        }

        digest.centroids.reserve(num_centroids);
        for _ in 0..num_centroids {
            let mean = cursor.read_f64_le().map_err(make_error("centroid_mean"))?;
            let weight = cursor.read_u64_le().map_err(make_error("centroid_weight"))?;
            if mean.is_nan() || weight == 0 {
                return Err(Error::corrupt("invalid centroid")
                    .with_context("mean", mean)
                    .with_context("weight", weight));
            }
            digest.centroids_weight = digest
                .centroids_weight
                .checked_add(weight)
                .ok_or_else(|| Error::corrupt("centroid weights overflow"))?;
            digest.centroids.push(Centroid { mean, weight });
        }
        for _ in 0..num_buffered {
            let value = cursor.read_f64_le().map_err(make_error("buffered_value"))?;
            if value.is_nan() {
                return Err(Error::corrupt("buffered value is NaN"));
            }
            digest.buffer.push(value);
        }
        if digest.is_empty() || digest.min.is_nan() || digest.max.is_nan() {
            return Err(Error::corrupt("multi-value image carries no usable values"));
        }
        Ok(digest)
    }

    fn serialize_compressed(&self) -> Vec<u8> {
        let is_empty = self.is_empty();
        let is_single_value = self.total_weight() == 1;

        let mut flags = 0;
        if is_empty {
            flags |= FLAGS_IS_EMPTY;
        }
        if is_single_value {
            flags |= FLAGS_IS_SINGLE_VALUE;
        }
        if self.reverse_merge {
            flags |= FLAGS_REVERSE_MERGE;
        }

        let size = 8 + 24 + self.centroids.len() * 16 + self.buffer.len() * 8;
        let mut bytes = SketchBytes::with_capacity(size);
        bytes.write_u8(if is_empty || is_single_value {
            PREAMBLE_LONGS_EMPTY_OR_SINGLE
        } else {
            PREAMBLE_LONGS_MULTIPLE
        });
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::TDIGEST.id);
        bytes.write_u16_le(self.k);
        bytes.write_u8(flags);
        bytes.write_u16_le(0);

        if is_empty {
            return bytes.into_bytes();
        }
        if is_single_value {
            bytes.write_f64_le(self.min);
            return bytes.into_bytes();
        }

        bytes.write_u32_le(self.centroids.len() as u32);
        bytes.write_u32_le(self.buffer.len() as u32);
        bytes.write_f64_le(self.min);
        bytes.write_f64_le(self.max);
        for centroid in &self.centroids {
            bytes.write_f64_le(centroid.mean);
            bytes.write_u64_le(centroid.weight);
        }
        for &value in &self.buffer {
            bytes.write_f64_le(value);
        }
        bytes.into_bytes()
    }

    /// This digest with its buffer folded into the centroids.
    fn compressed(&self) -> Cow<'_, TDigest> {
        if self.buffer.is_empty() {
            Cow::Borrowed(self)
        } else {
            let mut digest = self.clone();
            digest.compress();
            Cow::Owned(digest)
        }
    }

    fn rank_of_compressed(&self, value: f64) -> f64 {
        debug_assert!(self.buffer.is_empty());
        if value < self.min {
            return 0.0;
        }
        if value > self.max {
            return 1.0;
        }
        if self.centroids.len() == 1 {
            return 0.5;
        }

        let centroids_weight = self.centroids_weight as f64;
        let first = self.centroids[0];
        let last = self.centroids[self.centroids.len() - 1];

        // left tail
        if value < first.mean {
            if first.mean - self.min > 0. {
                if value == self.min {
                    return 0.5 / centroids_weight;
                }
                return (1.
                    + (value - self.min) / (first.mean - self.min)
                        * (first.weight as f64 / 2. - 1.))
                    / centroids_weight;
            }
            return 0.0;
        }

        // right tail
        if value > last.mean {
            if self.max - last.mean > 0. {
                if value == self.max {
                    return 1. - 0.5 / centroids_weight;
                }
                return 1.
                    - (1.
                        + (self.max - value) / (self.max - last.mean)
                            * (last.weight as f64 / 2. - 1.))
                        / centroids_weight;
            }
            return 1.0;
        }

        let mut lower = self.centroids.partition_point(|c| c.mean < value);
        let mut upper = lower + self.centroids[lower..].partition_point(|c| c.mean <= value);
        if value < self.centroids[lower].mean {
            lower -= 1;
        }
        if upper == self.centroids.len() || self.centroids[upper - 1].mean >= value {
            upper -= 1;
        }

        let lower_c = self.centroids[lower];
        let upper_c = self.centroids[upper];
        let mut weight_below: f64 = self.centroids[..lower]
            .iter()
            .map(|c| c.weight as f64)
            .sum();
        weight_below += lower_c.weight as f64 / 2.;

        let mut weight_delta: f64 = self.centroids[lower..upper]
            .iter()
            .map(|c| c.weight as f64)
            .sum();
        weight_delta -= lower_c.weight as f64 / 2.;
        weight_delta += upper_c.weight as f64 / 2.;

        if upper_c.mean - lower_c.mean > 0. {
            (weight_below
                + weight_delta * (value - lower_c.mean) / (upper_c.mean - lower_c.mean))
                / centroids_weight
        } else {
            (weight_below + weight_delta / 2.) / centroids_weight
        }
    }

    fn quantile_of_compressed(&self, rank: f64) -> f64 {
        debug_assert!(self.buffer.is_empty());
        if self.centroids.len() == 1 {
            return self.centroids[0].mean;
        }

        // at least 2 centroids
        let centroids_weight = self.centroids_weight as f64;
        let num_centroids = self.centroids.len();
        let weight = rank * centroids_weight;
        if weight < 1. {
            return self.min;
        }
        if weight > centroids_weight - 1. {
            return self.max;
        }
        let first = self.centroids[0];
        let first_weight = first.weight as f64;
        if first_weight > 1. && weight < first_weight / 2. {
            return self.min
                + (((weight - 1.) / ((first_weight / 2.) - 1.)) * (first.mean - self.min));
        }
        let last = self.centroids[num_centroids - 1];
        let last_weight = last.weight as f64;
        if last_weight > 1. && (centroids_weight - weight <= last_weight / 2.) {
            return self.max
                - (((centroids_weight - weight - 1.) / ((last_weight / 2.) - 1.))
                    * (self.max - last.mean));
        }

        // interpolate between extremes
        let mut weight_so_far = first_weight / 2.;
        for pair in self.centroids.windows(2) {
            let (left, right) = (pair[0], pair[1]);
            let dw = (left.weight + right.weight) as f64 / 2.;
            if weight_so_far + dw > weight {
                // the target weight is between these two centroids
                let mut left_weight = 0.;
                if left.weight == 1 {
                    if weight - weight_so_far < 0.5 {
                        return left.mean;
                    }
                    left_weight = 0.5;
                }
                let mut right_weight = 0.;
                if right.weight == 1 {
                    if weight_so_far + dw - weight <= 0.5 {
                        return right.mean;
                    }
                    right_weight = 0.5;
                }
                let w1 = weight - weight_so_far - left_weight;
                let w2 = weight_so_far + dw - weight - right_weight;
                return weighted_average(left.mean, w1, right.mean, w2);
            }
            weight_so_far += dw;
        }

        // between the last centroid and max
        let w1 = weight - (centroids_weight - last_weight / 2.);
        let w2 = (last_weight / 2.) - w1;
        weighted_average(last.mean, w1, self.max, w2)
    }

    /// Process buffered values and merge centroids if needed.
    fn compress(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let incoming: Vec<Centroid> = self
            .buffer
            .iter()
            .map(|&mean| Centroid { mean, weight: 1 })
            .collect();
        let weight = self.buffer.len() as u64;
        self.merge_centroids(incoming, weight);
    }

    /// Merges the given centroids into this TDigest and clears the buffer.
    ///
    /// `buffer` must hold at least one centroid and no NaN means.
    fn merge_centroids(&mut self, mut buffer: Vec<Centroid>, weight: u64) {
        buffer.extend(std::mem::take(&mut self.centroids));
        buffer.sort_by(centroid_cmp);
        if self.reverse_merge {
            buffer.reverse();
        }
        self.centroids_weight += weight;

        let len = buffer.len();
        let mut current = 1;
        let mut weight_so_far = 0.;
        let centroids_weight = self.centroids_weight as f64;
        let normalizer = scale_function::normalizer((2 * self.k as usize) as f64, centroids_weight);
        let mut merged: Vec<Centroid> = Vec::with_capacity(self.centroids_capacity);
        merged.push(buffer[0]);
        while current < len {
            let c = buffer[current];
            let last = merged.len() - 1;
            let proposed_weight = (merged[last].weight + c.weight) as f64;
            let mut add_this = false;
            if (current != 1) && (current != (len - 1)) {
                let q0 = weight_so_far / centroids_weight;
                let q2 = (weight_so_far + proposed_weight) / centroids_weight;
                add_this = proposed_weight
                    <= (centroids_weight
                        * scale_function::max(q0, normalizer)
                            .min(scale_function::max(q2, normalizer)));
            }
            if add_this {
                // merge into existing centroid
                merged[last].add(c);
            } else {
                // copy to a new centroid
                weight_so_far += merged[last].weight as f64;
                merged.push(c);
            }
            current += 1;
        }

        if self.reverse_merge {
            merged.reverse();
        }
        self.min = self.min.min(merged[0].mean);
        self.max = self.max.max(merged[merged.len() - 1].mean);
        self.centroids = merged;
        self.reverse_merge = !self.reverse_merge;
        self.buffer.clear();
    }
}

impl fmt::Display for TDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### t-Digest summary:")?;
        writeln!(f, "   Nominal k          : {}", self.k)?;
        writeln!(f, "   Centroids          : {}", self.centroids.len())?;
        writeln!(f, "   Buffered           : {}", self.buffer.len())?;
        writeln!(f, "   Centroids capacity : {}", self.centroids_capacity)?;
        writeln!(
            f,
            "   Buffer capacity    : {}",
            self.centroids_capacity * BUFFER_MULTIPLIER
        )?;
        writeln!(f, "   Centroids Weight   : {}", self.centroids_weight)?;
        writeln!(f, "   Total Weight       : {}", self.total_weight())?;
        writeln!(f, "   Reverse Merge      : {}", self.reverse_merge)?;
        if !self.is_empty() {
            writeln!(f, "   Min                : {}", self.min)?;
            writeln!(f, "   Max                : {}", self.max)?;
        }
        writeln!(f, "### End t-Digest summary")
    }
}

fn centroids_capacity(k: u16) -> usize {
    let fudge = if k < 30 { 30 } else { 10 };
    (k as usize * 2) + fudge
}

fn check_split_points(split_points: &[f64]) -> Result<(), Error> {
    if split_points.iter().any(|p| p.is_nan()) {
        return Err(Error::invalid_argument("split points must not contain NaN"));
    }
    if split_points.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(Error::invalid_argument(
            "split points must be unique and monotonically increasing",
        ));
    }
    Ok(())
}

fn centroid_cmp(a: &Centroid, b: &Centroid) -> Ordering {
    // NaN never reaches a centroid
    a.mean.partial_cmp(&b.mean).unwrap_or(Ordering::Equal)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Centroid {
    mean: f64,
    weight: u64,
}

impl Centroid {
    fn add(&mut self, other: Centroid) {
        if self.weight != 0 {
            let total_weight = self.weight + other.weight;
            self.mean += (other.weight as f64) * (other.mean - self.mean) / (total_weight as f64);
            self.weight = total_weight;
        } else {
            self.mean = other.mean;
            self.weight = other.weight;
        }
    }
}

/// Generates cluster sizes proportional to `q*(1-q)`.
///
/// The use of a normalizing function results in a strictly bounded number of clusters no matter
/// how many samples.
mod scale_function {
    pub(super) fn max(q: f64, normalizer: f64) -> f64 {
        q * (1. - q) / normalizer
    }

    pub(super) fn normalizer(compression: f64, n: f64) -> f64 {
        compression / z(compression, n)
    }

    pub(super) fn z(compression: f64, n: f64) -> f64 {
        4. * (n / compression).ln() + 24.
    }
}

const fn weighted_average(x1: f64, w1: f64, x2: f64, w2: f64) -> f64 {
    (x1 * w1 + x2 * w2) / (w1 + w2)
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    fn filled(from: usize, to: usize) -> TDigest {
        let mut digest = TDigest::new(DEFAULT_K);
        for i in from..=to {
            digest.update(i as f64);
        }
        digest
    }

    #[test]
    fn test_empty() {
        let digest = TDigest::new(100);
        assert!(digest.is_empty());
        assert_that!(digest.min_value(), none());
        assert_that!(digest.quantile(0.5), none());
        assert_that!(digest.rank(1.0).unwrap(), eq(0.0));
        assert!(digest.cdf(&[1.0]).unwrap().is_empty());
        let restored = TDigest::deserialize(&digest.serialize()).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn test_small_exact_queries() {
        let mut digest = filled(1, 10);
        digest.merge(&filled(11, 20));
        assert_that!(digest.total_weight(), eq(20));
        assert_that!(digest.rank(10.0).unwrap(), near(0.475, 1e-12));
        assert_that!(digest.quantile(0.5), some(eq(11.0)));
        assert_that!(digest.rank(0.0).unwrap(), eq(0.0));
        assert_that!(digest.rank(25.0).unwrap(), eq(1.0));
        assert_that!(digest.min_value(), some(eq(1.0)));
        assert_that!(digest.max_value(), some(eq(20.0)));
    }

    #[test]
    fn test_nan_is_ignored_and_rejected_as_query() {
        let mut digest = TDigest::new(100);
        digest.update(f64::NAN);
        assert!(digest.is_empty());
        digest.update(1.0);
        assert!(digest.rank(f64::NAN).is_err());
    }

    #[test]
    fn test_large_stream_accuracy() {
        let digest = filled(1, 100_000);
        assert_that!(digest.quantile(0.5).unwrap(), near(50_000.0, 500.0));
        assert_that!(digest.quantile(0.99).unwrap(), near(99_000.0, 200.0));
        assert_that!(digest.rank(25_000.0).unwrap(), near(0.25, 0.005));
        let pmf = digest.pmf(&[50_000.0]).unwrap();
        assert_that!(pmf.len(), eq(2));
        assert_that!(pmf[0] + pmf[1], near(1.0, 1e-9));
    }

    #[test]
    fn test_serialization_round_trip() {
        let digest = filled(1, 10_000);
        let bytes = digest.serialize();
        let restored = TDigest::deserialize(&bytes).unwrap();
        assert_eq!(restored.serialize(), bytes);
        assert_that!(restored.total_weight(), eq(10_000));

        let mut single = TDigest::new(100);
        single.update(4.5);
        let bytes = single.serialize();
        assert_that!(bytes.len(), eq(16));
        let restored = TDigest::deserialize(&bytes).unwrap();
        assert_that!(restored.quantile(0.3), some(eq(4.5)));
    }

    #[test]
    fn test_deserialize_rejects_truncated() {
        let bytes = filled(1, 100).serialize();
        let err = TDigest::deserialize(&bytes[..bytes.len() - 1]).unwrap_err();
        assert_that!(err.kind(), eq(crate::error::ErrorKind::CorruptFormat));
    }
}
