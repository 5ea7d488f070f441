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

use super::Facade;
use super::QuantileQuery;
use super::check_rank;
use super::not_nan;
use super::std_dev;
use crate::buffer::ByteSource;
use crate::codec::family::Family;
use crate::error::Error;
use crate::req::MAX_K;
use crate::req::MIN_K;
use crate::req::ReqSketch;

/// Relative error quantiles sketch over `f32` items.
#[derive(Debug, Clone)]
pub struct ReqFacade {
    sketch: ReqSketch,
}

impl ReqFacade {
    /// Creates a sketch whose accuracy favors high ranks when `hra` is set.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless `k` is even and in `4..=1024`.
    pub fn new(k: u16, hra: bool) -> Result<Self, Error> {
        if !(MIN_K..=MAX_K).contains(&k) || k % 2 != 0 {
            return Err(Error::invalid_argument(format!(
                "k must be even and in [{MIN_K}, {MAX_K}], got {k}"
            )));
        }
        debug!("creating REQ sketch k={k} hra={hra}");
        Ok(Self {
            sketch: ReqSketch::new(k, hra),
        })
    }

    pub fn deserialize(source: ByteSource<'_>) -> Result<Self, Error> {
        let image = source.resolve_image()?;
        let sketch = ReqSketch::deserialize(&image)?;
        Ok(Self { sketch })
    }

    pub fn sketch(&self) -> &ReqSketch {
        &self.sketch
    }

    pub fn k(&self) -> u16 {
        self.sketch.k()
    }

    pub fn is_hra(&self) -> bool {
        self.sketch.is_hra()
    }

    pub fn is_empty(&self) -> bool {
        self.sketch.is_empty()
    }

    /// Adds one item. NaN is ignored.
    pub fn update(&mut self, item: f32) {
        self.sketch.update(item);
    }

    /// # Errors
    ///
    /// `IncompatibleOperands` if the sketches favor different ends of the rank
    /// domain.
    pub fn merge(&mut self, other: &ReqFacade) -> Result<(), Error> {
        debug!(
            "merging REQ sketch n={} into n={}",
            other.sketch.n(),
            self.sketch.n()
        );
        self.sketch.merge(&other.sketch)
    }

    pub fn merge_source(&mut self, source: ByteSource<'_>) -> Result<(), Error> {
        let other = ReqFacade::deserialize(source)?;
        self.merge(&other)
    }

    /// Lower bound of the true rank behind an estimated normalized `rank`.
    pub fn rank_lower_bound(&self, rank: f64, num_std_dev: u8) -> Result<f64, Error> {
        check_rank(rank)?;
        Ok(self.sketch.rank_lower_bound(rank, std_dev(num_std_dev)?))
    }

    /// Upper bound of the true rank behind an estimated normalized `rank`.
    pub fn rank_upper_bound(&self, rank: f64, num_std_dev: u8) -> Result<f64, Error> {
        check_rank(rank)?;
        Ok(self.sketch.rank_upper_bound(rank, std_dev(num_std_dev)?))
    }
}

impl Facade for ReqFacade {
    const FAMILY: Family = Family::REQ;

    fn to_bytes(&self) -> Vec<u8> {
        self.sketch.serialize()
    }

    fn debug_string(&self) -> String {
        self.sketch.to_string()
    }
}

impl QuantileQuery for ReqFacade {
    type Item = f32;

    fn rank(&self, item: f32, inclusive: bool) -> Result<f64, Error> {
        not_nan(item as f64)?;
        Ok(self.sketch.rank(item, inclusive))
    }

    fn quantile(&self, rank: f64, inclusive: bool) -> Result<f32, Error> {
        check_rank(rank)?;
        self.sketch
            .quantile(rank, inclusive)
            .ok_or_else(|| Error::empty_sketch("quantile"))
    }

    fn pmf(&self, split_points: &[f32], inclusive: bool) -> Result<Vec<f64>, Error> {
        self.sketch.pmf(split_points, inclusive)
    }

    fn cdf(&self, split_points: &[f32], inclusive: bool) -> Result<Vec<f64>, Error> {
        self.sketch.cdf(split_points, inclusive)
    }

    fn min_item(&self) -> Result<f32, Error> {
        self.sketch
            .min_item()
            .ok_or_else(|| Error::empty_sketch("min_item"))
    }

    fn max_item(&self) -> Result<f32, Error> {
        self.sketch
            .max_item()
            .ok_or_else(|| Error::empty_sketch("max_item"))
    }

    fn n(&self) -> u64 {
        self.sketch.n()
    }

    fn num_retained(&self) -> usize {
        self.sketch.num_retained()
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_rejects_bad_k() {
        for k in [0u16, 2, 13, 1026] {
            let err = ReqFacade::new(k, true).unwrap_err();
            assert_that!(err.kind(), eq(ErrorKind::InvalidArgument));
        }
    }

    #[test]
    fn test_merge_rejects_mixed_accuracy() {
        let mut hra = ReqFacade::new(12, true).unwrap();
        let mut lra = ReqFacade::new(12, false).unwrap();
        hra.update(1.0);
        lra.update(2.0);
        let before = hra.to_bytes();
        let err = hra.merge(&lra).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::IncompatibleOperands));
        assert_eq!(hra.to_bytes(), before);
    }

    #[test]
    fn test_rank_bounds_widen_with_std_dev() {
        let mut facade = ReqFacade::new(12, true).unwrap();
        for i in 0..100_000 {
            facade.update(i as f32);
        }
        let rank = facade.rank(50_000.0, true).unwrap();
        let lower1 = facade.rank_lower_bound(rank, 1).unwrap();
        let lower3 = facade.rank_lower_bound(rank, 3).unwrap();
        let upper1 = facade.rank_upper_bound(rank, 1).unwrap();
        let upper3 = facade.rank_upper_bound(rank, 3).unwrap();
        assert_that!(lower3, le(lower1));
        assert_that!(lower1, le(rank));
        assert_that!(upper1, ge(rank));
        assert_that!(upper3, ge(upper1));
        assert!(facade.rank_lower_bound(rank, 0).is_err());
        assert!(facade.rank_upper_bound(1.5, 2).is_err());
    }

    #[test]
    fn test_empty_conventions() {
        let facade = ReqFacade::new(12, false).unwrap();
        assert_that!(facade.rank(3.0, false).unwrap(), eq(0.0));
        assert!(facade.pmf(&[1.0], false).unwrap().is_empty());
        assert_that!(facade.quantile(0.0, true).unwrap_err().kind(), eq(ErrorKind::EmptySketch));
        assert_that!(facade.min_item().unwrap_err().kind(), eq(ErrorKind::EmptySketch));
    }
}
