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

//! Set operations over facades.
//!
//! Every entry point validates its operands before any engine combine runs:
//! Theta, Tuple and CPC operands must carry the seed hash of the expected
//! seed, and tuple operands whose policy is known must agree with the
//! operation's policy. Operands are borrowed and never modified; results are
//! new sketches. The `*_sources` forms deserialize their operands first.

use log::debug;
use log::warn;

use crate::buffer::ByteSource;
use crate::error::Error;
use crate::facade::CompactThetaFacade;
use crate::facade::CompactTupleFacade;
use crate::facade::CpcFacade;
use crate::facade::HllFacade;
use crate::facade::check_in_range;
use crate::hash::compute_seed_hash;
use crate::hll::HllType;
use crate::hll::HllUnion;
use crate::policy::Policy;
use crate::theta;
use crate::theta::CompactSketch;
use crate::theta::Intersection;
use crate::theta::Similarity;
use crate::theta::Summary;
use crate::theta::Union;

/// N-way union of theta sketches.
///
/// # Errors
///
/// `InvalidArgument` for an out of range `lg_k`; `IncompatibleOperands` if a
/// non-empty operand was built with a seed other than `seed`.
pub fn theta_union(
    operands: &[&CompactThetaFacade],
    lg_k: u8,
    seed: u64,
) -> Result<CompactThetaFacade, Error> {
    check_in_range("lg_k", lg_k, theta::MIN_LG_K..=theta::MAX_LG_K)?;
    let sketches: Vec<&CompactSketch<()>> = operands.iter().map(|f| f.sketch()).collect();
    check_seeds(&sketches, seed)?;
    let result = union_of(&sketches, lg_k, seed, Policy::Nop)?;
    Ok(CompactThetaFacade::from_parts(result, seed))
}

/// N-way union of tuple sketches, folding summaries with `policy`.
///
/// # Errors
///
/// As [`theta_union`], plus `IncompatibleOperands` if an operand's known
/// policy differs from `policy`.
pub fn tuple_union(
    operands: &[&CompactTupleFacade],
    lg_k: u8,
    seed: u64,
    policy: Policy,
) -> Result<CompactTupleFacade, Error> {
    check_in_range("lg_k", lg_k, theta::MIN_LG_K..=theta::MAX_LG_K)?;
    check_policies(operands.iter().map(|f| f.policy()), policy)?;
    let sketches: Vec<&CompactSketch<i64>> = operands.iter().map(|f| f.sketch()).collect();
    check_seeds(&sketches, seed)?;
    let result = union_of(&sketches, lg_k, seed, policy)?;
    Ok(CompactTupleFacade::from_parts(result, seed, Some(policy)))
}

/// N-way union of HLL sketches of any lg_k and type.
///
/// The result has the smallest lg_k among `lg_k` and the operands, in the
/// [`HllType::Hll4`] layout.
pub fn hll_union(operands: &[&HllFacade], lg_k: u8) -> Result<HllFacade, Error> {
    check_in_range("lg_k", lg_k, crate::hll::MIN_LG_K..=crate::hll::MAX_LG_K)?;
    debug!("HLL union of {} operands at lg_k={lg_k}", operands.len());
    let mut union = HllUnion::new(lg_k);
    for operand in operands {
        union.update(operand.sketch());
    }
    Ok(HllFacade::from(union.result(HllType::Hll4)))
}

/// N-way union of CPC sketches.
///
/// # Errors
///
/// `IncompatibleOperands` if any operand, empty or not, was built with a seed
/// other than `seed`.
pub fn cpc_union(operands: &[&CpcFacade], lg_k: u8, seed: u64) -> Result<CpcFacade, Error> {
    check_in_range("lg_k", lg_k, crate::cpc::MIN_LG_K..=crate::cpc::MAX_LG_K)?;
    let expected = compute_seed_hash(seed);
    for operand in operands {
        let actual = operand.sketch().seed_hash();
        if actual != expected {
            return Err(reject_seed(expected, actual));
        }
    }
    debug!("CPC union of {} operands at lg_k={lg_k}", operands.len());
    let mut union = crate::cpc::CpcUnion::new(lg_k, seed);
    for operand in operands {
        union.update(operand.sketch())?;
    }
    Ok(CpcFacade::from(union.result()))
}

/// Entries present in both theta sketches.
pub fn theta_intersection(
    a: &CompactThetaFacade,
    b: &CompactThetaFacade,
) -> Result<CompactThetaFacade, Error> {
    let seed = a.seed();
    check_seeds(&[a.sketch(), b.sketch()], seed)?;
    let result = intersection_of(a.sketch(), b.sketch(), seed, Policy::Nop)?;
    Ok(CompactThetaFacade::from_parts(result, seed))
}

/// Entries present in both tuple sketches, summaries folded with `policy`.
pub fn tuple_intersection(
    a: &CompactTupleFacade,
    b: &CompactTupleFacade,
    policy: Policy,
) -> Result<CompactTupleFacade, Error> {
    check_policies([a.policy(), b.policy()], policy)?;
    let seed = a.seed();
    check_seeds(&[a.sketch(), b.sketch()], seed)?;
    let result = intersection_of(a.sketch(), b.sketch(), seed, policy)?;
    Ok(CompactTupleFacade::from_parts(result, seed, Some(policy)))
}

/// Entries of `a` that are not in `b`.
pub fn theta_a_not_b(
    a: &CompactThetaFacade,
    b: &CompactThetaFacade,
) -> Result<CompactThetaFacade, Error> {
    check_seeds(&[a.sketch(), b.sketch()], a.seed())?;
    debug!("theta a_not_b");
    let result = theta::a_not_b(a.sketch(), b.sketch())?;
    Ok(CompactThetaFacade::from_parts(result, a.seed()))
}

/// Entries of `a` that are not in `b`, keeping the summaries of `a`.
///
/// # Errors
///
/// `IncompatibleOperands` on a seed mismatch or if both operands have known
/// but different policies.
pub fn tuple_a_not_b(
    a: &CompactTupleFacade,
    b: &CompactTupleFacade,
) -> Result<CompactTupleFacade, Error> {
    if let (Some(policy), Some(other)) = (a.policy(), b.policy()) {
        check_policies([Some(other)], policy)?;
    }
    check_seeds(&[a.sketch(), b.sketch()], a.seed())?;
    debug!("tuple a_not_b");
    let result = theta::a_not_b(a.sketch(), b.sketch())?;
    Ok(CompactTupleFacade::from_parts(result, a.seed(), a.policy()))
}

/// Jaccard similarity of two theta sketches with its confidence interval.
///
/// Both empty gives `(1, 1, 1)`, exactly one empty gives `(0, 0, 0)`.
pub fn theta_jaccard(a: &CompactThetaFacade, b: &CompactThetaFacade) -> Result<Similarity, Error> {
    check_seeds(&[a.sketch(), b.sketch()], a.seed())?;
    theta::jaccard(a.sketch(), b.sketch(), a.seed())
}

/// [`theta_union`] over serialized operands.
pub fn theta_union_sources<'a>(
    operands: impl IntoIterator<Item = ByteSource<'a>>,
    lg_k: u8,
    seed: u64,
) -> Result<CompactThetaFacade, Error> {
    let operands = theta_operands(operands, seed)?;
    theta_union(&operands.iter().collect::<Vec<_>>(), lg_k, seed)
}

/// [`tuple_union`] over serialized operands.
///
/// Images do not record a policy, so deserialized operands never fail the
/// policy check; their summaries are folded with `policy` as given.
pub fn tuple_union_sources<'a>(
    operands: impl IntoIterator<Item = ByteSource<'a>>,
    lg_k: u8,
    seed: u64,
    policy: Policy,
) -> Result<CompactTupleFacade, Error> {
    let operands = tuple_operands(operands, seed)?;
    tuple_union(&operands.iter().collect::<Vec<_>>(), lg_k, seed, policy)
}

/// [`hll_union`] over serialized operands.
pub fn hll_union_sources<'a>(
    operands: impl IntoIterator<Item = ByteSource<'a>>,
    lg_k: u8,
) -> Result<HllFacade, Error> {
    let operands = operands
        .into_iter()
        .map(HllFacade::deserialize)
        .collect::<Result<Vec<_>, _>>()?;
    hll_union(&operands.iter().collect::<Vec<_>>(), lg_k)
}

/// [`cpc_union`] over serialized operands.
pub fn cpc_union_sources<'a>(
    operands: impl IntoIterator<Item = ByteSource<'a>>,
    lg_k: u8,
    seed: u64,
) -> Result<CpcFacade, Error> {
    let operands = operands
        .into_iter()
        .map(|source| CpcFacade::deserialize(source, seed))
        .collect::<Result<Vec<_>, _>>()?;
    cpc_union(&operands.iter().collect::<Vec<_>>(), lg_k, seed)
}

/// [`theta_intersection`] over serialized operands.
pub fn theta_intersection_sources(
    a: ByteSource<'_>,
    b: ByteSource<'_>,
    seed: u64,
) -> Result<CompactThetaFacade, Error> {
    let a = CompactThetaFacade::deserialize(a, seed)?;
    let b = CompactThetaFacade::deserialize(b, seed)?;
    theta_intersection(&a, &b)
}

/// [`tuple_intersection`] over serialized operands.
///
/// As with [`tuple_union_sources`], the operands carry no policy to check.
pub fn tuple_intersection_sources(
    a: ByteSource<'_>,
    b: ByteSource<'_>,
    seed: u64,
    policy: Policy,
) -> Result<CompactTupleFacade, Error> {
    let a = CompactTupleFacade::deserialize(a, seed)?;
    let b = CompactTupleFacade::deserialize(b, seed)?;
    tuple_intersection(&a, &b, policy)
}

/// [`theta_a_not_b`] over serialized operands.
pub fn theta_a_not_b_sources(
    a: ByteSource<'_>,
    b: ByteSource<'_>,
    seed: u64,
) -> Result<CompactThetaFacade, Error> {
    let a = CompactThetaFacade::deserialize(a, seed)?;
    let b = CompactThetaFacade::deserialize(b, seed)?;
    theta_a_not_b(&a, &b)
}

/// [`tuple_a_not_b`] over serialized operands.
pub fn tuple_a_not_b_sources(
    a: ByteSource<'_>,
    b: ByteSource<'_>,
    seed: u64,
) -> Result<CompactTupleFacade, Error> {
    let a = CompactTupleFacade::deserialize(a, seed)?;
    let b = CompactTupleFacade::deserialize(b, seed)?;
    tuple_a_not_b(&a, &b)
}

/// [`theta_jaccard`] over serialized operands.
pub fn theta_jaccard_sources(
    a: ByteSource<'_>,
    b: ByteSource<'_>,
    seed: u64,
) -> Result<Similarity, Error> {
    let a = CompactThetaFacade::deserialize(a, seed)?;
    let b = CompactThetaFacade::deserialize(b, seed)?;
    theta_jaccard(&a, &b)
}

fn theta_operands<'a>(
    operands: impl IntoIterator<Item = ByteSource<'a>>,
    seed: u64,
) -> Result<Vec<CompactThetaFacade>, Error> {
    operands
        .into_iter()
        .map(|source| CompactThetaFacade::deserialize(source, seed))
        .collect()
}

fn tuple_operands<'a>(
    operands: impl IntoIterator<Item = ByteSource<'a>>,
    seed: u64,
) -> Result<Vec<CompactTupleFacade>, Error> {
    operands
        .into_iter()
        .map(|source| CompactTupleFacade::deserialize(source, seed))
        .collect()
}

fn union_of<S: Summary>(
    sketches: &[&CompactSketch<S>],
    lg_k: u8,
    seed: u64,
    policy: Policy,
) -> Result<CompactSketch<S>, Error> {
    debug!(
        "{} union of {} operands at lg_k={lg_k} policy={policy}",
        S::LABEL,
        sketches.len()
    );
    let mut union = Union::new(lg_k, seed, policy);
    for sketch in sketches {
        union.update(sketch)?;
    }
    Ok(union.result())
}

fn intersection_of<S: Summary>(
    a: &CompactSketch<S>,
    b: &CompactSketch<S>,
    seed: u64,
    policy: Policy,
) -> Result<CompactSketch<S>, Error> {
    debug!("{} intersection policy={policy}", S::LABEL);
    let mut intersection = Intersection::new(seed, policy);
    intersection.update(a)?;
    intersection.update(b)?;
    intersection.result()
}

/// Non-empty operands must carry the seed hash of `seed`. Empty images carry
/// whatever seed hash their writer used and take part in no combine.
fn check_seeds<S: Summary>(sketches: &[&CompactSketch<S>], seed: u64) -> Result<(), Error> {
    let expected = compute_seed_hash(seed);
    for sketch in sketches {
        if !sketch.is_empty() && sketch.seed_hash() != expected {
            return Err(reject_seed(expected, sketch.seed_hash()));
        }
    }
    Ok(())
}

fn reject_seed(expected: u16, actual: u16) -> Error {
    warn!("rejecting operand with seed hash {actual}, expected {expected}");
    Error::incompatible("operands were built with different seeds")
        .with_context("expected_seed_hash", expected)
        .with_context("operand_seed_hash", actual)
}

fn check_policies(
    policies: impl IntoIterator<Item = Option<Policy>>,
    policy: Policy,
) -> Result<(), Error> {
    for operand_policy in policies.into_iter().flatten() {
        if operand_policy != policy {
            warn!("rejecting tuple operand with policy {operand_policy}, expected {policy}");
            return Err(Error::incompatible("operands were built with different policies")
                .with_context("expected_policy", policy)
                .with_context("operand_policy", operand_policy));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;
    use crate::error::ErrorKind;
    use crate::facade::CardinalityQuery;
    use crate::facade::Facade;
    use crate::facade::ThetaFacade;
    use crate::facade::TupleFacade;
    use crate::hash::DEFAULT_UPDATE_SEED;

    const SEED: u64 = DEFAULT_UPDATE_SEED;

    fn theta(range: std::ops::Range<i64>, seed: u64) -> CompactThetaFacade {
        let mut facade = ThetaFacade::new(12, seed, 1.0).unwrap();
        for i in range {
            facade.update_i64(i);
        }
        facade.compact()
    }

    fn tuple(policy: &str, entries: &[(&str, i64)]) -> CompactTupleFacade {
        let mut facade = TupleFacade::new(12, SEED, 1.0, policy).unwrap();
        for (key, value) in entries {
            facade.update_str(key, *value);
        }
        facade.compact()
    }

    #[test]
    fn test_theta_union_is_order_independent() {
        let a = theta(0..3_000, SEED);
        let b = theta(2_000..6_000, SEED);
        let c = theta(5_000..9_000, SEED);
        let abc = theta_union(&[&a, &b, &c], 12, SEED).unwrap();
        let cba = theta_union(&[&c, &b, &a], 12, SEED).unwrap();
        assert_eq!(abc.to_bytes(), cba.to_bytes());
        let ab_c = theta_union(&[&theta_union(&[&a, &b], 12, SEED).unwrap(), &c], 12, SEED);
        assert_eq!(ab_c.unwrap().to_bytes(), abc.to_bytes());
        assert_that!(abc.estimate(), near(9_000.0, 9_000.0 * 0.05));
    }

    #[test]
    fn test_seed_mismatch_rejected_before_combine() {
        let a = theta(0..100, SEED);
        let b = theta(0..100, 42);
        let err = theta_union(&[&a, &b], 12, SEED).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::IncompatibleOperands));
        let err = theta_intersection(&a, &b).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::IncompatibleOperands));
        let err = theta_jaccard(&a, &b).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::IncompatibleOperands));
    }

    #[test]
    fn test_tuple_policy_mismatch() {
        let max = tuple("MAX", &[("x", 3)]);
        let sum = tuple("SUM", &[("x", 4)]);
        let err = tuple_union(&[&max, &sum], 12, SEED, Policy::Max).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::IncompatibleOperands));
        let err = tuple_intersection(&max, &max, Policy::Sum).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::IncompatibleOperands));
        let err = tuple_a_not_b(&max, &sum).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::IncompatibleOperands));

        let unknown =
            CompactTupleFacade::deserialize(ByteSource::from(sum.to_bytes()), SEED).unwrap();
        let result = tuple_union(&[&max, &unknown], 12, SEED, Policy::Max).unwrap();
        assert_that!(result.sketch().iter().next().map(|e| e.1), some(eq(4)));
    }

    #[test]
    fn test_tuple_intersection_folds_with_policy() {
        let a = tuple("SUM", &[("x", 3), ("y", 1)]);
        let b = tuple("SUM", &[("x", 7), ("z", 1)]);
        let result = tuple_intersection(&a, &b, Policy::Sum).unwrap();
        assert_that!(result.num_retained(), eq(1));
        assert_that!(result.sum_estimate(), eq(10.0));

        let diff = tuple_a_not_b(&a, &b).unwrap();
        assert_that!(diff.num_retained(), eq(1));
        assert_that!(diff.sum_estimate(), eq(1.0));
    }

    #[test]
    fn test_jaccard_edges() {
        let a = theta(0..1_000, SEED);
        let empty = theta(0..0, SEED);
        assert_eq!(theta_jaccard(&a, &a).unwrap().to_array(), [1.0, 1.0, 1.0]);
        assert_eq!(theta_jaccard(&a, &empty).unwrap().to_array(), [0.0, 0.0, 0.0]);
        assert_eq!(theta_jaccard(&empty, &empty).unwrap().to_array(), [1.0, 1.0, 1.0]);

        let half = theta(500..1_500, SEED);
        let similarity = theta_jaccard(&a, &half).unwrap();
        assert_that!(similarity.estimate, near(1.0 / 3.0, 0.01));
        assert_that!(similarity.lower, le(similarity.estimate));
        assert_that!(similarity.upper, ge(similarity.estimate));
    }

    #[test]
    fn test_sources_forms() {
        let a = theta(0..2_000, SEED).to_bytes();
        let b = theta(1_000..3_000, SEED).to_bytes();
        let union = theta_union_sources([ByteSource::from(&a), ByteSource::from(&b)], 12, SEED);
        assert_that!(union.unwrap().estimate(), near(3_000.0, 150.0));

        let inter = theta_intersection_sources(ByteSource::from(&a), ByteSource::from(&b), SEED);
        assert_that!(inter.unwrap().estimate(), near(1_000.0, 50.0));

        let err = theta_a_not_b_sources(ByteSource::from(&a), ByteSource::from(&b), 1).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::SeedMismatch));
    }

    #[test]
    fn test_hll_and_cpc_unions() {
        let mut a = HllFacade::new(12, HllType::Hll4).unwrap();
        let mut b = HllFacade::new(11, HllType::Hll8).unwrap();
        let mut c = CpcFacade::new(11, SEED).unwrap();
        let mut d = CpcFacade::new(11, SEED).unwrap();
        for i in 0..2_000 {
            a.update_i64(i);
            b.update_i64(i + 1_000);
            c.update_i64(i);
            d.update_i64(i + 1_000);
        }
        let ab = hll_union(&[&a, &b], 12).unwrap();
        let ba = hll_union(&[&b, &a], 12).unwrap();
        assert_eq!(ab.to_bytes(), ba.to_bytes());
        assert_that!(ab.estimate(), near(3_000.0, 150.0));

        let cd = cpc_union(&[&c, &d], 11, SEED).unwrap();
        let dc = cpc_union(&[&d, &c], 11, SEED).unwrap();
        assert_eq!(cd.to_bytes(), dc.to_bytes());
        assert_that!(cd.estimate(), near(3_000.0, 150.0));

        let foreign = CpcFacade::new(11, 5).unwrap();
        let err = cpc_union(&[&c, &foreign], 11, SEED).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::IncompatibleOperands));
    }
}
