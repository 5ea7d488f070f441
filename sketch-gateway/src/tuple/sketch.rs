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

//! Update tuple sketch.

use log::debug;

use crate::common::NumStdDev;
use crate::common::ResizeFactor;
use crate::common::binomial_bounds;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::policy::Policy;
use crate::theta::DEFAULT_LG_K;
use crate::theta::MAX_LG_K;
use crate::theta::MAX_THETA;
use crate::theta::MIN_LG_K;
use crate::theta::ThetaHashTable;
use crate::tuple::CompactTupleSketch;

/// Mutable tuple sketch. Every update folds its value into the summary of
/// the key with the sketch's policy.
#[derive(Debug, Clone)]
pub struct TupleSketch {
    table: ThetaHashTable<i64>,
    policy: Policy,
}

impl TupleSketch {
    /// Create a new builder for TupleSketch
    ///
    /// # Examples
    ///
    /// ```
    /// # use sketch_gateway::policy::Policy;
    /// # use sketch_gateway::tuple::TupleSketch;
    /// let mut sketch = TupleSketch::builder().policy(Policy::Max).build();
    /// sketch.update_str("x", 3);
    /// sketch.update_str("x", 7);
    /// assert_eq!(sketch.compact().iter().next().map(|e| e.1), Some(7));
    /// ```
    pub fn builder() -> TupleSketchBuilder {
        TupleSketchBuilder::default()
    }

    /// Update the summary of a key given as raw bytes. Empty keys are ignored.
    pub fn update_bytes(&mut self, key: &[u8], value: i64) {
        if key.is_empty() {
            return;
        }
        let hash = self.table.hash_bytes(key);
        let policy = self.policy;
        self.table.upsert(hash, |current| {
            policy.fold(current.unwrap_or(policy.create_initial()), value)
        });
    }

    pub fn update_str(&mut self, key: &str, value: i64) {
        self.update_bytes(key.as_bytes(), value);
    }

    pub fn update_i64(&mut self, key: i64, value: i64) {
        self.update_bytes(&key.to_le_bytes(), value);
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn estimate(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.num_retained() as f64 / self.theta()
    }

    pub fn theta(&self) -> f64 {
        self.table.theta() as f64 / MAX_THETA as f64
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

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

    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        if !self.is_estimation_mode() {
            return self.num_retained() as f64;
        }
        binomial_bounds::lower_bound(self.num_retained() as u64, self.theta(), num_std_dev)
    }

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

    /// Trim the sketch to nominal size k
    pub fn trim(&mut self) {
        self.table.trim();
    }

    pub fn reset(&mut self) {
        self.table.reset();
    }

    /// Ordered compact copy of the sketch.
    pub fn compact(&self) -> CompactTupleSketch {
        CompactTupleSketch::from_parts(
            self.table.iter().collect(),
            self.table.theta(),
            self.seed_hash(),
            self.is_empty(),
            true,
        )
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.compact().serialize()
    }
}

/// Builder for TupleSketch
#[derive(Debug)]
pub struct TupleSketchBuilder {
    lg_k: u8,
    sampling_probability: f32,
    seed: u64,
    policy: Policy,
}

impl Default for TupleSketchBuilder {
    fn default() -> Self {
        Self {
            lg_k: DEFAULT_LG_K,
            sampling_probability: 1.0,
            seed: DEFAULT_UPDATE_SEED,
            policy: Policy::default(),
        }
    }
}

impl TupleSketchBuilder {
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

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> TupleSketch {
        debug!(
            "new tuple sketch lg_k={} policy={}",
            self.lg_k,
            self.policy.name()
        );
        TupleSketch {
            table: ThetaHashTable::new(
                self.lg_k,
                ResizeFactor::X8,
                self.sampling_probability,
                self.seed,
            ),
            policy: self.policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    fn folded(policy: Policy) -> i64 {
        let mut sketch = TupleSketch::builder().policy(policy).build();
        for value in [3, 7, 5] {
            sketch.update_str("x", value);
        }
        let compact = sketch.compact();
        assert_that!(compact.num_retained(), eq(1));
        compact.iter().map(|e| e.1).sum()
    }

    #[test]
    fn test_policy_folds_repeated_key() {
        assert_that!(folded(Policy::Max), eq(7));
        assert_that!(folded(Policy::Sum), eq(15));
        assert_that!(folded(Policy::One), eq(1));
        assert_that!(folded(Policy::Min), eq(3));
        assert_that!(folded(Policy::Nop), eq(0));
    }

    #[test]
    fn test_estimation_mode() {
        let mut sketch = TupleSketch::builder().lg_k(10).build();
        for i in 0..50_000 {
            sketch.update_i64(i, 1);
        }
        assert!(sketch.is_estimation_mode());
        assert_that!(sketch.estimate(), near(50_000.0, 50_000.0 * 0.1));
        assert_that!(sketch.compact().sum_estimate(), near(50_000.0, 50_000.0 * 0.1));
    }
}
