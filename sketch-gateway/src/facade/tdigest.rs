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
use crate::buffer::ByteSource;
use crate::codec::family::Family;
use crate::error::Error;
use crate::tdigest::MIN_K;
use crate::tdigest::TDigest;

/// T-Digest over `f64` values.
///
/// The digest interpolates between centroids, so its rank and quantile
/// queries do not distinguish inclusive from exclusive search; the
/// `inclusive` flag of [`QuantileQuery`] is accepted and ignored.
#[derive(Debug, Clone)]
pub struct TDigestFacade {
    digest: TDigest,
}

impl TDigestFacade {
    /// # Errors
    ///
    /// `InvalidArgument` if `k` is below 10.
    pub fn new(k: u16) -> Result<Self, Error> {
        if k < MIN_K {
            return Err(Error::invalid_argument(format!(
                "k must be at least {MIN_K}, got {k}"
            )));
        }
        debug!("creating t-digest k={k}");
        Ok(Self {
            digest: TDigest::new(k),
        })
    }

    pub fn deserialize(source: ByteSource<'_>) -> Result<Self, Error> {
        let image = source.resolve_image()?;
        let digest = TDigest::deserialize(&image)?;
        Ok(Self { digest })
    }

    pub fn digest(&self) -> &TDigest {
        &self.digest
    }

    pub fn k(&self) -> u16 {
        self.digest.k()
    }

    pub fn is_empty(&self) -> bool {
        self.digest.is_empty()
    }

    /// Adds one value. NaN is ignored.
    pub fn update(&mut self, value: f64) {
        self.digest.update(value);
    }

    pub fn merge(&mut self, other: &TDigestFacade) {
        debug!(
            "merging t-digest weight={} into weight={}",
            other.digest.total_weight(),
            self.digest.total_weight()
        );
        self.digest.merge(&other.digest);
    }

    pub fn merge_source(&mut self, source: ByteSource<'_>) -> Result<(), Error> {
        let other = TDigestFacade::deserialize(source)?;
        self.merge(&other);
        Ok(())
    }

    pub fn total_weight(&self) -> u64 {
        self.digest.total_weight()
    }
}

impl Facade for TDigestFacade {
    const FAMILY: Family = Family::TDIGEST;

    fn to_bytes(&self) -> Vec<u8> {
        self.digest.serialize()
    }

    fn debug_string(&self) -> String {
        self.digest.to_string()
    }
}

impl QuantileQuery for TDigestFacade {
    type Item = f64;

    fn rank(&self, item: f64, _inclusive: bool) -> Result<f64, Error> {
        self.digest.rank(item)
    }

    fn quantile(&self, rank: f64, _inclusive: bool) -> Result<f64, Error> {
        check_rank(rank)?;
        self.digest
            .quantile(rank)
            .ok_or_else(|| Error::empty_sketch("quantile"))
    }

    fn pmf(&self, split_points: &[f64], _inclusive: bool) -> Result<Vec<f64>, Error> {
        self.digest.pmf(split_points)
    }

    fn cdf(&self, split_points: &[f64], _inclusive: bool) -> Result<Vec<f64>, Error> {
        self.digest.cdf(split_points)
    }

    fn min_item(&self) -> Result<f64, Error> {
        self.digest
            .min_value()
            .ok_or_else(|| Error::empty_sketch("min_item"))
    }

    fn max_item(&self) -> Result<f64, Error> {
        self.digest
            .max_value()
            .ok_or_else(|| Error::empty_sketch("max_item"))
    }

    fn n(&self) -> u64 {
        self.digest.total_weight()
    }

    fn num_retained(&self) -> usize {
        self.digest.num_retained()
    }
}
