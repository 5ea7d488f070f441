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

use log::debug;

use super::CardinalityQuery;
use super::Facade;
use super::check_in_range;
use super::std_dev;
use crate::buffer::ByteSource;
use crate::codec::family::Family;
use crate::common::is_probability;
use crate::error::Error;
use crate::policy::Policy;
use crate::theta::CompactThetaSketch;
use crate::theta::MAX_LG_K;
use crate::theta::MIN_LG_K;
use crate::tuple::CompactTupleSketch;
use crate::tuple::TupleSketch;

/// Mutable tuple sketch with `i64` summaries.
#[derive(Debug, Clone)]
pub struct TupleFacade {
    sketch: TupleSketch,
}

impl TupleFacade {
    /// # Errors
    ///
    /// `InvalidArgument` for an out of range `lg_k` or `p`, or an unknown
    /// policy name.
    pub fn new(lg_k: u8, seed: u64, p: f32, policy_name: &str) -> Result<Self, Error> {
        check_in_range("lg_k", lg_k, MIN_LG_K..=MAX_LG_K)?;
        if !is_probability(p) {
            return Err(Error::invalid_argument("sampling probability must be in (0, 1]")
                .with_context("p", p));
        }
        let policy = Policy::resolve(policy_name)?;
        debug!("creating tuple sketch lg_k={lg_k} p={p} policy={policy}");
        let sketch = TupleSketch::builder()
            .lg_k(lg_k)
            .seed(seed)
            .sampling_probability(p)
            .policy(policy)
            .build();
        Ok(Self { sketch })
    }

    pub fn sketch(&self) -> &TupleSketch {
        &self.sketch
    }

    pub fn policy(&self) -> Policy {
        self.sketch.policy()
    }

    pub fn seed(&self) -> u64 {
        self.sketch.seed()
    }

    pub fn is_empty(&self) -> bool {
        self.sketch.is_empty()
    }

    pub fn update_str(&mut self, key: &str, value: i64) {
        self.sketch.update_str(key, value);
    }

    pub fn update_i64(&mut self, key: i64, value: i64) {
        self.sketch.update_i64(key, value);
    }

    pub fn compact(&self) -> CompactTupleFacade {
        CompactTupleFacade {
            sketch: self.sketch.compact(),
            seed: self.sketch.seed(),
            policy: Some(self.sketch.policy()),
        }
    }

    pub fn max_serialized_size(lg_k: u8) -> Result<usize, Error> {
        check_in_range("lg_k", lg_k, MIN_LG_K..=MAX_LG_K)?;
        Ok(CompactTupleSketch::max_serialized_size(lg_k))
    }
}

impl Facade for TupleFacade {
    const FAMILY: Family = Family::TUPLE;

    fn to_bytes(&self) -> Vec<u8> {
        self.sketch.serialize()
    }

    fn debug_string(&self) -> String {
        self.sketch.compact().to_string()
    }
}

impl CardinalityQuery for TupleFacade {
    fn estimate(&self) -> f64 {
        self.sketch.estimate()
    }

    fn lower_bound(&self, num_std_dev: u8) -> Result<f64, Error> {
        Ok(self.sketch.lower_bound(std_dev(num_std_dev)?))
    }

    fn upper_bound(&self, num_std_dev: u8) -> Result<f64, Error> {
        Ok(self.sketch.upper_bound(std_dev(num_std_dev)?))
    }
}

/// Read-only tuple sketch.
///
/// Images do not record the policy their summaries were folded with, so a
/// deserialized sketch has no known policy.
#[derive(Debug, Clone)]
pub struct CompactTupleFacade {
    sketch: CompactTupleSketch,
    seed: u64,
    policy: Option<Policy>,
}

impl CompactTupleFacade {
    /// # Errors
    ///
    /// `SeedMismatch` if a non-empty image was built with a seed other than `seed`.
    pub fn deserialize(source: ByteSource<'_>, seed: u64) -> Result<Self, Error> {
        let image = source.resolve_image()?;
        let sketch = CompactTupleSketch::deserialize(&image, seed)?;
        Ok(Self {
            sketch,
            seed,
            policy: None,
        })
    }

    /// Converts a theta image, giving every retained entry the summary `value`.
    pub fn from_theta(source: ByteSource<'_>, value: i64, seed: u64) -> Result<Self, Error> {
        let image = source.resolve_image()?;
        let theta = CompactThetaSketch::deserialize(&image, seed)?;
        Ok(Self {
            sketch: CompactTupleSketch::from_theta(&theta, value),
            seed,
            policy: None,
        })
    }

    pub(crate) fn from_parts(
        sketch: CompactTupleSketch,
        seed: u64,
        policy: Option<Policy>,
    ) -> Self {
        Self {
            sketch,
            seed,
            policy,
        }
    }

    pub fn sketch(&self) -> &CompactTupleSketch {
        &self.sketch
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Policy the summaries were folded with, when known.
    pub fn policy(&self) -> Option<Policy> {
        self.policy
    }

    pub fn is_empty(&self) -> bool {
        self.sketch.is_empty()
    }

    pub fn theta(&self) -> f64 {
        self.sketch.theta()
    }

    pub fn num_retained(&self) -> usize {
        self.sketch.num_retained()
    }

    /// Keeps the entries with `low <= summary <= high`.
    pub fn filter(&self, low: i64, high: i64) -> Result<Self, Error> {
        if low > high {
            return Err(Error::invalid_argument("filter range is empty")
                .with_context("low", low)
                .with_context("high", high));
        }
        Ok(Self {
            sketch: self.sketch.filter(low, high),
            seed: self.seed,
            policy: self.policy,
        })
    }

    /// Estimated total of all summaries in the input.
    pub fn sum_estimate(&self) -> f64 {
        self.sketch.sum_estimate()
    }
}

impl Facade for CompactTupleFacade {
    const FAMILY: Family = Family::TUPLE;

    fn to_bytes(&self) -> Vec<u8> {
        self.sketch.serialize()
    }

    fn debug_string(&self) -> String {
        self.sketch.to_string()
    }
}

impl CardinalityQuery for CompactTupleFacade {
    fn estimate(&self) -> f64 {
        self.sketch.estimate()
    }

    fn lower_bound(&self, num_std_dev: u8) -> Result<f64, Error> {
        Ok(self.sketch.lower_bound(std_dev(num_std_dev)?))
    }

    fn upper_bound(&self, num_std_dev: u8) -> Result<f64, Error> {
        Ok(self.sketch.upper_bound(std_dev(num_std_dev)?))
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;
    use crate::codec::Encoding;
    use crate::error::ErrorKind;
    use crate::facade::ThetaFacade;
    use crate::hash::DEFAULT_UPDATE_SEED;

    fn summary_of(facade: &TupleFacade) -> i64 {
        let compact = facade.compact();
        let mut summaries = compact.sketch().iter().map(|(_, summary)| *summary);
        summaries.next().unwrap_or_default()
    }

    #[test]
    fn test_policy_folds_updates() {
        for (name, expected) in [("MAX", 7), ("SUM", 15), ("", 15), ("ONE", 1), ("MIN", 3)] {
            let mut facade = TupleFacade::new(12, DEFAULT_UPDATE_SEED, 1.0, name).unwrap();
            for value in [3, 7, 5] {
                facade.update_str("x", value);
            }
            assert_that!(summary_of(&facade), eq(expected));
        }
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let err = TupleFacade::new(12, DEFAULT_UPDATE_SEED, 1.0, "sum").unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::InvalidArgument));
    }

    #[test]
    fn test_round_trip_forgets_policy() {
        let mut facade = TupleFacade::new(12, DEFAULT_UPDATE_SEED, 1.0, "MAX").unwrap();
        facade.update_i64(1, 10);
        facade.update_i64(2, 20);
        assert_that!(facade.compact().policy(), some(eq(Policy::Max)));

        let encoded = facade.serialize(Encoding::BinaryCompressed).unwrap();
        let decoded =
            CompactTupleFacade::deserialize(ByteSource::from(&encoded), DEFAULT_UPDATE_SEED)
                .unwrap();
        assert_that!(decoded.policy(), none());
        assert_that!(decoded.estimate(), eq(2.0));
        assert_that!(decoded.sum_estimate(), eq(30.0));
        let text = decoded.debug_string();
        assert_that!(text.as_str(), contains_substring("### Tuple sketch summary:"));
    }

    #[test]
    fn test_from_theta_and_filter() {
        let mut theta = ThetaFacade::new(12, DEFAULT_UPDATE_SEED, 1.0).unwrap();
        for key in ["a", "b", "c", "d"] {
            theta.update_str(key);
        }
        let bytes = theta.to_bytes();
        let tuple =
            CompactTupleFacade::from_theta(ByteSource::from(&bytes), 5, DEFAULT_UPDATE_SEED)
                .unwrap();
        assert_that!(tuple.sum_estimate(), eq(20.0));
        assert_that!(tuple.filter(0, 4).unwrap().num_retained(), eq(0));
        assert_that!(tuple.filter(5, 5).unwrap().num_retained(), eq(4));
        assert!(tuple.filter(6, 5).is_err());

        let err = CompactTupleFacade::from_theta(ByteSource::from(&bytes), 5, 1).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::SeedMismatch));
    }
}
