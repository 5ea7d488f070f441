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

//! N-way union of compact sketches.

use log::debug;

use crate::common::ResizeFactor;
use crate::error::Error;
use crate::hash::compute_seed_hash;
use crate::policy::Policy;
use crate::theta::CompactSketch;
use crate::theta::MAX_THETA;
use crate::theta::Summary;
use crate::theta::ThetaHashTable;

/// Stateful union gadget.
///
/// The result keeps at most 2^lg_k entries: the smallest hashes below the
/// minimum theta of all operands. Summaries of keys present in several
/// operands are folded with the union's policy, so the result does not
/// depend on the order of updates.
#[derive(Debug, Clone)]
pub struct Union<S> {
    table: ThetaHashTable<S>,
    union_theta: u64,
    seed_hash: u16,
    policy: Policy,
    lg_k: u8,
}

impl<S: Summary> Union<S> {
    pub fn new(lg_k: u8, seed: u64, policy: Policy) -> Self {
        Self {
            table: ThetaHashTable::new(lg_k, ResizeFactor::X8, 1.0, seed),
            union_theta: MAX_THETA,
            seed_hash: compute_seed_hash(seed),
            policy,
            lg_k,
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    /// Fold one operand into the union. Empty operands are skipped.
    ///
    /// # Errors
    ///
    /// `IncompatibleOperands` if the operand was built with another seed. The
    /// union is unchanged in that case.
    pub fn update(&mut self, sketch: &CompactSketch<S>) -> Result<(), Error> {
        if sketch.is_empty() {
            return Ok(());
        }
        if sketch.seed_hash() != self.seed_hash {
            return Err(Error::incompatible("operands were built with different seeds")
                .with_context("union_seed_hash", self.seed_hash)
                .with_context("operand_seed_hash", sketch.seed_hash()));
        }

        self.table.mark_non_empty();
        self.union_theta = self.union_theta.min(sketch.theta64());
        let policy = self.policy;
        for &(hash, summary) in sketch.iter() {
            if hash >= self.union_theta {
                if sketch.is_ordered() {
                    break;
                }
                continue;
            }
            self.table.upsert(hash, |current| match current {
                None => summary,
                Some(existing) => existing.merge(summary, policy),
            });
        }
        self.union_theta = self.union_theta.min(self.table.theta());
        debug!(
            "union absorbed {} entries, theta now {}",
            sketch.num_retained(),
            self.union_theta
        );
        Ok(())
    }

    /// Ordered result of everything absorbed so far.
    pub fn result(&self) -> CompactSketch<S> {
        if self.table.is_empty() {
            return CompactSketch::from_parts(vec![], MAX_THETA, self.seed_hash, true, true);
        }
        let mut theta = self.union_theta.min(self.table.theta());
        let mut entries: Vec<(u64, S)> = self.table.iter().filter(|e| e.0 < theta).collect();
        let k = 1usize << self.lg_k;
        if entries.len() > k {
            entries.select_nth_unstable_by_key(k, |e| e.0);
            theta = entries[k].0;
            entries.truncate(k);
        }
        CompactSketch::from_parts(entries, theta, self.seed_hash, false, true)
    }

    pub fn reset(&mut self) {
        self.table.reset();
        self.union_theta = MAX_THETA;
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;
    use crate::error::ErrorKind;
    use crate::theta::ThetaSketch;

    fn sketch(range: std::ops::Range<i64>, seed: u64) -> ThetaSketch {
        let mut sketch = ThetaSketch::builder().lg_k(10).seed(seed).build();
        for i in range {
            sketch.update_i64(i);
        }
        sketch
    }

    #[test]
    fn test_exact_union() {
        let mut union = Union::<()>::new(12, 9001, Policy::Sum);
        union.update(&sketch(0..1000, 9001).compact()).unwrap();
        union.update(&sketch(500..1500, 9001).compact()).unwrap();
        assert_that!(union.result().estimate(), eq(1500.0));
    }

    #[test]
    fn test_result_is_trimmed_to_k() {
        let mut union = Union::<()>::new(10, 9001, Policy::Sum);
        union.update(&sketch(0..20_000, 9001).compact()).unwrap();
        union.update(&sketch(10_000..30_000, 9001).compact()).unwrap();
        let result = union.result();
        assert_that!(result.num_retained(), le(1024));
        assert_that!(result.estimate(), near(30_000.0, 30_000.0 * 0.1));
    }

    #[test]
    fn test_seed_mismatch_leaves_union_untouched() {
        let mut union = Union::<()>::new(10, 9001, Policy::Sum);
        union.update(&sketch(0..10, 9001).compact()).unwrap();
        let err = union.update(&sketch(0..10, 1).compact()).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::IncompatibleOperands));
        assert_that!(union.result().estimate(), eq(10.0));
    }
}
