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

use std::collections::HashSet;
use std::fmt;

use log::debug;

use crate::common::NumStdDev;
use crate::common::canonical_double;
use crate::cpc::DEFAULT_LG_K;
use crate::cpc::MAX_LG_K;
use crate::cpc::MIN_LG_K;
use crate::cpc::confidence::hip_confidence_lb;
use crate::cpc::confidence::hip_confidence_ub;
use crate::cpc::confidence::icon_confidence_lb;
use crate::cpc::confidence::icon_confidence_ub;
use crate::cpc::estimator::icon_estimate;
use crate::cpc::flavor;
use crate::cpc::row_col;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;
use crate::hash::murmur3_128;

/// Coupon storage.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Coupons {
    /// Fewer than 3k/32 coupons, kept as `row << 6 | col`.
    Sparse(HashSet<u32>),
    /// One column mask per row.
    Dense(Vec<u64>),
}

/// A Compressed Probabilistic Counting sketch.
#[derive(Debug, Clone, PartialEq)]
pub struct CpcSketch {
    // immutable config variables
    lg_k: u8,
    seed: u64,

    // sketch state
    /// The number of coupons collected so far.
    num_coupons: u64,
    coupons: Coupons,

    // estimator state
    /// Whether the sketch is a result of merging.
    ///
    /// If `false`, the HIP (Historical Inverse Probability) estimator is used.
    /// If `true`, the ICON (Inter-Column Optimal) Estimator is fallback in use.
    merge_flag: bool,
    // the following variables are only valid in HIP estimator
    /// A pre-calculated probability factor (`k * p`) used to compute the increment delta.
    kxp: f64,
    /// The accumulated cardinality estimate.
    hip_est_accum: f64,
}

impl Default for CpcSketch {
    fn default() -> Self {
        Self::new(DEFAULT_LG_K)
    }
}

impl CpcSketch {
    /// Creates a new `CpcSketch` with the given `lg_k` and default seed.
    pub fn new(lg_k: u8) -> Self {
        Self::with_seed(lg_k, DEFAULT_UPDATE_SEED)
    }

    /// Creates a new `CpcSketch` with the given `lg_k` and `seed`.
    ///
    /// # Panics
    ///
    /// If lg_k is not in range [4, 26]
    pub fn with_seed(lg_k: u8, seed: u64) -> Self {
        assert!(
            (MIN_LG_K..=MAX_LG_K).contains(&lg_k),
            "lg_k out of range; got {lg_k}",
        );

        Self {
            lg_k,
            seed,
            num_coupons: 0,
            coupons: Coupons::Sparse(HashSet::new()),
            merge_flag: false,
            kxp: (1u64 << lg_k) as f64,
            hip_est_accum: 0.0,
        }
    }

    /// A merged sketch holding exactly `row_cols`.
    pub(crate) fn from_row_cols(
        lg_k: u8,
        seed: u64,
        row_cols: impl IntoIterator<Item = u32>,
    ) -> Self {
        let mut sketch = Self::with_seed(lg_k, seed);
        sketch.merge_flag = true;
        for row_col in row_cols {
            sketch.insert(row_col);
        }
        sketch
    }

    /// Restore a sketch from its serialized parts.
    pub(crate) fn from_parts(
        lg_k: u8,
        seed: u64,
        row_cols: impl IntoIterator<Item = u32>,
        hip: Option<(f64, f64)>,
    ) -> Self {
        let mut sketch = Self::from_row_cols(lg_k, seed, row_cols);
        if let Some((kxp, hip_est_accum)) = hip {
            sketch.merge_flag = false;
            sketch.kxp = kxp;
            sketch.hip_est_accum = hip_est_accum;
        }
        sketch
    }

    /// Return the parameter lg_k.
    pub fn lg_k(&self) -> u8 {
        self.lg_k
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn seed_hash(&self) -> u16 {
        compute_seed_hash(self.seed)
    }

    pub fn num_coupons(&self) -> u64 {
        self.num_coupons
    }

    pub fn is_merged(&self) -> bool {
        self.merge_flag
    }

    pub(crate) fn hip_state(&self) -> Option<(f64, f64)> {
        if self.merge_flag {
            None
        } else {
            Some((self.kxp, self.hip_est_accum))
        }
    }

    pub(crate) fn coupons(&self) -> &Coupons {
        &self.coupons
    }

    /// Returns the best estimate of the cardinality of the sketch.
    pub fn estimate(&self) -> f64 {
        if !self.merge_flag {
            self.hip_est_accum
        } else {
            icon_estimate(self.lg_k, self.num_coupons)
        }
    }

    /// Returns the best estimate of the lower bound of the confidence interval given `kappa`.
    pub fn lower_bound(&self, kappa: NumStdDev) -> f64 {
        if !self.merge_flag {
            hip_confidence_lb(self.lg_k, self.num_coupons, self.hip_est_accum, kappa)
        } else {
            icon_confidence_lb(self.lg_k, self.num_coupons, kappa)
        }
    }

    /// Returns the best estimate of the upper bound of the confidence interval given `kappa`.
    pub fn upper_bound(&self, kappa: NumStdDev) -> f64 {
        if !self.merge_flag {
            hip_confidence_ub(self.lg_k, self.num_coupons, self.hip_est_accum, kappa)
        } else {
            icon_confidence_ub(self.lg_k, self.num_coupons, kappa)
        }
    }

    /// Returns true if the sketch is empty.
    pub fn is_empty(&self) -> bool {
        self.num_coupons == 0
    }

    /// Update the sketch with raw bytes. Empty input is ignored.
    pub fn update_bytes(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let (h1, h2) = murmur3_128(data, self.seed);
        let row_col = row_col(self.lg_k, h1, h2);
        if self.insert(row_col) {
            self.update_hip(row_col);
        }
    }

    pub fn update_str(&mut self, value: &str) {
        self.update_bytes(value.as_bytes());
    }

    pub fn update_i64(&mut self, value: i64) {
        self.update_bytes(&value.to_le_bytes());
    }

    pub fn update_u64(&mut self, value: u64) {
        self.update_bytes(&value.to_le_bytes());
    }

    /// Update the sketch with a f64 value.
    pub fn update_f64(&mut self, value: f64) {
        // Canonicalize double for compatibility with Java
        self.update_bytes(&canonical_double(value).to_le_bytes());
    }

    fn update_hip(&mut self, row_col: u32) {
        let k = (1u64 << self.lg_k) as f64;
        let col = row_col & 63;
        self.hip_est_accum += k / self.kxp;
        self.kxp -= f64::exp2(-(col as f64 + 1.0)); // notice the "+1"
    }

    /// Set one coupon. Returns true if it was novel.
    pub(crate) fn insert(&mut self, row_col: u32) -> bool {
        let is_novel = match &mut self.coupons {
            Coupons::Sparse(set) => set.insert(row_col),
            Coupons::Dense(rows) => {
                let row = (row_col >> 6) as usize;
                let bit = 1u64 << (row_col & 63);
                let novel = rows[row] & bit == 0;
                rows[row] |= bit;
                novel
            }
        };
        if is_novel {
            self.num_coupons += 1;
            let k = 1u64 << self.lg_k;
            if self.num_coupons << 5 >= 3 * k {
                self.promote_sparse_to_dense();
            }
        }
        is_novel
    }

    fn promote_sparse_to_dense(&mut self) {
        let Coupons::Sparse(set) = &self.coupons else {
            return;
        };
        debug!(
            "promoting CPC sketch with {} coupons to dense rows at lg_k={}",
            set.len(),
            self.lg_k
        );
        let mut rows = vec![0u64; 1 << self.lg_k];
        for row_col in set {
            rows[(row_col >> 6) as usize] |= 1u64 << (row_col & 63);
        }
        self.coupons = Coupons::Dense(rows);
    }

    /// All coupons, in ascending order.
    pub(crate) fn row_cols(&self) -> Vec<u32> {
        match &self.coupons {
            Coupons::Sparse(set) => {
                let mut row_cols: Vec<u32> = set.iter().copied().collect();
                row_cols.sort_unstable();
                row_cols
            }
            Coupons::Dense(rows) => row_cols_of(rows),
        }
    }
}

/// Coupons set in `rows`, in ascending order.
pub(super) fn row_cols_of(rows: &[u64]) -> Vec<u32> {
    let mut row_cols = vec![];
    for (row, mask) in rows.iter().enumerate() {
        let mut mask = *mask;
        while mask != 0 {
            let col = mask.trailing_zeros();
            row_cols.push(((row as u32) << 6) | col);
            mask &= mask - 1;
        }
    }
    row_cols
}

impl fmt::Display for CpcSketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### CPC sketch summary:")?;
        writeln!(f, "   lg_k           : {}", self.lg_k)?;
        writeln!(f, "   seed hash      : {:x}", self.seed_hash())?;
        writeln!(f, "   C              : {}", self.num_coupons)?;
        writeln!(f, "   flavor         : {}", flavor(self.lg_k, self.num_coupons))?;
        writeln!(f, "   merged         : {}", self.merge_flag)?;
        if !self.merge_flag {
            writeln!(f, "   HIP estimate   : {}", self.hip_est_accum)?;
            writeln!(f, "   kxp            : {}", self.kxp)?;
        }
        writeln!(f, "   estimate       : {}", self.estimate())?;
        writeln!(f, "### End sketch summary")
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;

    const RELATIVE_ERROR_FOR_LG_K_11: f64 = 0.05;

    #[test]
    fn test_empty() {
        let sketch = CpcSketch::new(11);
        assert!(sketch.is_empty());
        assert_that!(sketch.estimate(), eq(0.0));
        assert_that!(sketch.lower_bound(NumStdDev::One), eq(0.0));
        assert_that!(sketch.upper_bound(NumStdDev::One), eq(0.0));
    }

    #[test]
    fn test_one_value() {
        let mut sketch = CpcSketch::new(11);
        sketch.update_i64(1);
        sketch.update_i64(1);
        assert!(!sketch.is_empty());
        assert_that!(sketch.estimate(), eq(1.0));
        assert_that!(sketch.estimate(), ge(sketch.lower_bound(NumStdDev::One)));
        assert_that!(sketch.estimate(), le(sketch.upper_bound(NumStdDev::One)));
    }

    #[test]
    fn test_many_values() {
        const N: i64 = 10000;
        let mut sketch = CpcSketch::new(11);
        for i in 0..N {
            sketch.update_i64(i);
        }
        assert!(matches!(sketch.coupons(), Coupons::Dense(_)));
        assert_that!(
            sketch.estimate(),
            near(N as f64, RELATIVE_ERROR_FOR_LG_K_11 * N as f64)
        );
        assert_that!(sketch.estimate(), ge(sketch.lower_bound(NumStdDev::One)));
        assert_that!(sketch.estimate(), le(sketch.upper_bound(NumStdDev::One)));
    }

    #[test]
    fn test_merged_sketch_uses_icon() {
        let mut sketch = CpcSketch::new(11);
        for i in 0..10_000 {
            sketch.update_i64(i);
        }
        let merged = CpcSketch::from_row_cols(11, DEFAULT_UPDATE_SEED, sketch.row_cols());
        assert!(merged.is_merged());
        assert_that!(merged.num_coupons(), eq(sketch.num_coupons()));
        assert_that!(merged.estimate(), near(10_000.0, 10_000.0 * 0.05));
    }

    #[test]
    fn test_debug_string() {
        let mut sketch = CpcSketch::new(10);
        sketch.update_str("a");
        let text = sketch.to_string();
        let text = text.as_str();
        assert_that!(text, contains_substring("### CPC sketch summary:"));
        assert_that!(text, contains_substring("   flavor         : SPARSE\n"));
    }
}
