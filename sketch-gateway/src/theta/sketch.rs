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

//! Update theta sketch.

use crate::common::NumStdDev;
use crate::common::ResizeFactor;
use crate::common::binomial_bounds;
use crate::common::canonical_double;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::theta::CompactThetaSketch;
use crate::theta::DEFAULT_LG_K;
use crate::theta::MAX_LG_K;
use crate::theta::MAX_THETA;
use crate::theta::MIN_LG_K;
use crate::theta::ThetaHashTable;

/// Mutable theta sketch for building from input data
#[derive(Debug, Clone)]
pub struct ThetaSketch {
    table: ThetaHashTable<()>,
}

impl ThetaSketch {
    /// Create a new builder for ThetaSketch
    ///
    /// # Examples
    ///
    /// ```
    /// # use sketch_gateway::theta::ThetaSketch;
    /// let sketch = ThetaSketch::builder().lg_k(12).build();
    /// assert_eq!(sketch.lg_k(), 12);
    /// ```
    pub fn builder() -> ThetaSketchBuilder {
        ThetaSketchBuilder::default()
    }

    /// Update the sketch with raw bytes. Empty input is ignored.
    pub fn update_bytes(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let hash = self.table.hash_bytes(data);
        self.table.upsert(hash, |_| ());
    }

    /// Update the sketch with the UTF-8 bytes of a string.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sketch_gateway::theta::ThetaSketch;
    /// let mut sketch = ThetaSketch::builder().build();
    /// sketch.update_str("apple");
    /// assert_eq!(sketch.estimate(), 1.0);
    /// ```
    pub fn update_str(&mut self, value: &str) {
        self.update_bytes(value.as_bytes());
    }

    pub fn update_i64(&mut self, value: i64) {
        self.update_bytes(&value.to_le_bytes());
    }

    pub fn update_u64(&mut self, value: u64) {
        self.update_bytes(&value.to_le_bytes());
    }

    /// Update the sketch with a f64 value; `-0.0` and `0.0` count once, as do all NaNs.
    pub fn update_f64(&mut self, value: f64) {
        self.update_bytes(&canonical_double(value).to_le_bytes());
    }

    /// Return cardinality estimate
    pub fn estimate(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.num_retained() as f64 / self.theta()
    }

    /// Return theta as a fraction (0.0 to 1.0)
    pub fn theta(&self) -> f64 {
        self.table.theta() as f64 / MAX_THETA as f64
    }

    /// Return theta as u64
    pub fn theta64(&self) -> u64 {
        self.table.theta()
    }

    /// Check if sketch is empty
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Check if sketch is in estimation mode
    pub fn is_estimation_mode(&self) -> bool {
        self.table.theta() < MAX_THETA && !self.is_empty()
    }

    pub fn num_retained(&self) -> usize {
        self.table.num_retained()
    }

    pub fn lg_k(&self) -> u8 {
        self.table.lg_nom_size()
    }

    pub fn seed(&self) -> u64 {
        self.table.seed()
    }

    pub fn seed_hash(&self) -> u16 {
        self.table.seed_hash()
    }

    /// Trim the sketch to nominal size k
    pub fn trim(&mut self) {
        self.table.trim();
    }

    /// Reset the sketch to empty state
    pub fn reset(&mut self) {
        self.table.reset();
    }

    /// Return iterator over hash values
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.table.iter().map(|(hash, _)| hash)
    }

    /// Returns the approximate lower error bound given the specified number of Standard Deviations.
    ///
    /// ```
    /// use sketch_gateway::common::NumStdDev;
    /// use sketch_gateway::theta::ThetaSketch;
    ///
    /// let mut sketch = ThetaSketch::builder().lg_k(12).build();
    /// for i in 0..10000 {
    ///     sketch.update_i64(i);
    /// }
    ///
    /// let estimate = sketch.estimate();
    /// assert!(sketch.lower_bound(NumStdDev::Two) <= estimate);
    /// assert!(estimate <= sketch.upper_bound(NumStdDev::Two));
    /// ```
    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        if !self.is_estimation_mode() {
            return self.num_retained() as f64;
        }
        binomial_bounds::lower_bound(self.num_retained() as u64, self.theta(), num_std_dev)
    }

    /// Returns the approximate upper error bound given the specified number of Standard Deviations.
    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        if !self.is_estimation_mode() {
            return self.num_retained() as f64;
        }
        binomial_bounds::upper_bound(
            self.num_retained() as u64,
            self.theta(),
            num_std_dev,
            self.is_empty(),
        )
    }

    /// Ordered compact copy of the sketch.
    pub fn compact(&self) -> CompactThetaSketch {
        CompactThetaSketch::from_parts(
            self.table.iter().collect(),
            self.table.theta(),
            self.seed_hash(),
            self.is_empty(),
            true,
        )
    }

    /// Serialize in compact form.
    ///
    /// ```
    /// # use sketch_gateway::theta::CompactThetaSketch;
    /// # use sketch_gateway::theta::ThetaSketch;
    /// let mut sketch = ThetaSketch::builder().build();
    /// sketch.update_str("apple");
    /// let bytes = sketch.serialize();
    /// let restored = CompactThetaSketch::deserialize(&bytes, 9001).unwrap();
    /// assert_eq!(sketch.estimate(), restored.estimate());
    /// ```
    pub fn serialize(&self) -> Vec<u8> {
        self.compact().serialize()
    }
}

/// Builder for ThetaSketch
#[derive(Debug)]
pub struct ThetaSketchBuilder {
    lg_k: u8,
    resize_factor: ResizeFactor,
    sampling_probability: f32,
    seed: u64,
}

impl Default for ThetaSketchBuilder {
    fn default() -> Self {
        Self {
            lg_k: DEFAULT_LG_K,
            resize_factor: ResizeFactor::X8,
            sampling_probability: 1.0,
            seed: DEFAULT_UPDATE_SEED,
        }
    }
}

impl ThetaSketchBuilder {
    /// Set lg_k (log2 of nominal size k).
    ///
    /// # Panics
    ///
    /// If lg_k is not in range [5, 26]
    pub fn lg_k(mut self, lg_k: u8) -> Self {
        assert!(
            (MIN_LG_K..=MAX_LG_K).contains(&lg_k),
            "lg_k must be in [{MIN_LG_K}, {MAX_LG_K}], got {lg_k}"
        );
        self.lg_k = lg_k;
        self
    }

    pub fn resize_factor(mut self, factor: ResizeFactor) -> Self {
        self.resize_factor = factor;
        self
    }

    /// Set sampling probability p.
    ///
    /// # Panics
    ///
    /// Panics if p is not in range (0.0, 1.0]
    pub fn sampling_probability(mut self, probability: f32) -> Self {
        assert!(
            probability > 0.0 && probability <= 1.0,
            "sampling_probability must be in (0.0, 1.0], got {probability}"
        );
        self.sampling_probability = probability;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> ThetaSketch {
        ThetaSketch {
            table: ThetaHashTable::new(
                self.lg_k,
                self.resize_factor,
                self.sampling_probability,
                self.seed,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    #[test]
    fn test_exact_mode() {
        let mut sketch = ThetaSketch::builder().lg_k(10).build();
        for i in 0..500 {
            sketch.update_i64(i);
            sketch.update_i64(i);
        }
        sketch.update_str("");
        assert_that!(sketch.estimate(), eq(500.0));
        assert!(!sketch.is_estimation_mode());
        assert_that!(sketch.lower_bound(NumStdDev::Three), eq(500.0));
    }

    #[test]
    fn test_estimation_mode_accuracy() {
        let mut sketch = ThetaSketch::builder().lg_k(12).build();
        for i in 0..100_000 {
            sketch.update_i64(i);
        }
        assert!(sketch.is_estimation_mode());
        assert_that!(sketch.estimate(), near(100_000.0, 5_000.0));
        assert_that!(sketch.lower_bound(NumStdDev::Three), le(sketch.estimate()));
        assert_that!(sketch.upper_bound(NumStdDev::Three), ge(sketch.estimate()));
    }

    #[test]
    fn test_sampling_marks_non_empty() {
        let mut sketch = ThetaSketch::builder().sampling_probability(0.001).build();
        sketch.update_str("a");
        assert!(!sketch.is_empty());
        assert_that!(sketch.theta(), near(0.001, 1e-6));
        let compact = sketch.compact();
        assert!(!compact.is_empty());
    }

    #[test]
    fn test_signed_zero_counts_once() {
        let mut sketch = ThetaSketch::builder().build();
        sketch.update_f64(0.0);
        sketch.update_f64(-0.0);
        assert_that!(sketch.num_retained(), eq(1));
    }
}
