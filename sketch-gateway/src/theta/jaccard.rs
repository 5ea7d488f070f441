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

//! Jaccard similarity of two sketched sets.

use crate::common::bounds_on_ratios;
use crate::error::Error;
use crate::hash::compute_seed_hash;
use crate::policy::Policy;
use crate::theta::CompactSketch;
use crate::theta::Intersection;
use crate::theta::MAX_LG_K;
use crate::theta::MIN_LG_K;
use crate::theta::Summary;
use crate::theta::Union;

/// Similarity ratio with its confidence interval, all in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub lower: f64,
    pub estimate: f64,
    pub upper: f64,
}

impl Similarity {
    const IDENTICAL: Similarity = Similarity {
        lower: 1.0,
        estimate: 1.0,
        upper: 1.0,
    };

    const DISJOINT: Similarity = Similarity {
        lower: 0.0,
        estimate: 0.0,
        upper: 0.0,
    };

    /// `[lower, estimate, upper]`, the order the boundary returns them in.
    pub fn to_array(self) -> [f64; 3] {
        [self.lower, self.estimate, self.upper]
    }
}

/// |A ∩ B| / |A ∪ B|, computed from the union and intersection of the sketches.
///
/// Both empty gives 1; exactly one empty gives 0.
///
/// # Errors
///
/// `IncompatibleOperands` if the operands were built with different seeds.
pub fn jaccard<S: Summary>(
    a: &CompactSketch<S>,
    b: &CompactSketch<S>,
    seed: u64,
) -> Result<Similarity, Error> {
    let seed_hash = compute_seed_hash(seed);
    for operand in [a, b] {
        if !operand.is_empty() && operand.seed_hash() != seed_hash {
            return Err(Error::incompatible("operands were built with different seeds")
                .with_context("expected_seed_hash", seed_hash)
                .with_context("operand_seed_hash", operand.seed_hash()));
        }
    }
    if a.is_empty() && b.is_empty() {
        return Ok(Similarity::IDENTICAL);
    }
    if a.is_empty() || b.is_empty() {
        return Ok(Similarity::DISJOINT);
    }

    let union_ab = union_of(a, b, seed)?;
    if is_identical(a, b, &union_ab) {
        return Ok(Similarity::IDENTICAL);
    }

    let mut intersection = Intersection::<S>::new(seed, Policy::Nop);
    intersection.update(a)?;
    intersection.update(b)?;
    intersection.update(&union_ab)?;
    let inter_abu = intersection.result()?;

    let theta_b = inter_abu.theta64();
    let count_b = inter_abu.num_retained() as u64;
    let count_a = if union_ab.theta64() == theta_b {
        union_ab.num_retained() as u64
    } else {
        union_ab.count_below(theta_b) as u64
    };
    let f = inter_abu.theta();
    Ok(Similarity {
        lower: bounds_on_ratios::lower_bound_for_b_over_a(count_a, count_b, f),
        estimate: bounds_on_ratios::estimate_of_b_over_a(count_a, count_b),
        upper: bounds_on_ratios::upper_bound_for_b_over_a(count_a, count_b, f),
    })
}

fn union_of<S: Summary>(
    a: &CompactSketch<S>,
    b: &CompactSketch<S>,
    seed: u64,
) -> Result<CompactSketch<S>, Error> {
    let count = (a.num_retained() + b.num_retained()).max(1);
    let lg_k = count
        .next_power_of_two()
        .trailing_zeros()
        .clamp(MIN_LG_K as u32, MAX_LG_K as u32) as u8;
    let mut union = Union::new(lg_k, seed, Policy::Nop);
    union.update(a)?;
    union.update(b)?;
    Ok(union.result())
}

fn is_identical<S: Summary>(
    a: &CompactSketch<S>,
    b: &CompactSketch<S>,
    union_ab: &CompactSketch<S>,
) -> bool {
    a.num_retained() == b.num_retained()
        && a.theta64() == b.theta64()
        && union_ab.num_retained() == a.num_retained()
        && union_ab.theta64() == a.theta64()
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;
    use crate::theta::ThetaSketch;

    fn sketch(range: std::ops::Range<i64>) -> CompactSketch<()> {
        let mut sketch = ThetaSketch::builder().lg_k(10).build();
        for i in range {
            sketch.update_i64(i);
        }
        sketch.compact()
    }

    #[test]
    fn test_boundaries() {
        let a = sketch(0..5000);
        let empty = CompactSketch::empty(9001);
        assert_eq!(jaccard(&a, &a, 9001).unwrap(), Similarity::IDENTICAL);
        assert_eq!(jaccard(&a, &empty, 9001).unwrap(), Similarity::DISJOINT);
        assert_eq!(jaccard(&empty, &empty, 9001).unwrap(), Similarity::IDENTICAL);
    }

    #[test]
    fn test_exact_half_overlap() {
        let s = jaccard(&sketch(0..100), &sketch(50..150), 9001).unwrap();
        assert_that!(s.estimate, near(50.0 / 150.0, 1e-9));
        assert_that!(s.lower, eq(s.estimate));
        assert_that!(s.upper, eq(s.estimate));
    }

    #[test]
    fn test_estimated_overlap_is_bracketed() {
        let s = jaccard(&sketch(0..20_000), &sketch(10_000..30_000), 9001).unwrap();
        assert_that!(s.estimate, near(1.0 / 3.0, 0.06));
        assert_that!(s.lower, le(s.estimate));
        assert_that!(s.upper, ge(s.estimate));
        assert_that!(s.lower, ge(0.0));
        assert_that!(s.upper, le(1.0));
    }
}
